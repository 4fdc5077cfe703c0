//! One-second cooperative countdown for timed exercises.

/// Result of a single countdown tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Remaining(u32),
    /// Reached zero on this tick; reported once
    Expired,
    /// Already expired or stopped
    Idle,
}

/// Countdown driven by the host's one-second timer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    running: bool,
}

impl Countdown {
    pub fn start(seconds: u32) -> Self {
        Self {
            remaining: seconds,
            running: seconds > 0,
        }
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            Tick::Expired
        } else {
            Tick::Remaining(self.remaining)
        }
    }

    /// Halt without expiring (answer submitted, exercise left)
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_once() {
        let mut countdown = Countdown::start(2);
        assert_eq!(countdown.tick(), Tick::Remaining(1));
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.tick(), Tick::Idle);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn test_stopped_countdown_never_expires() {
        let mut countdown = Countdown::start(1);
        countdown.stop();
        assert_eq!(countdown.tick(), Tick::Idle);
        assert!(!countdown.is_running());
    }
}

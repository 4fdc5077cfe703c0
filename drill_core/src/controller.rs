//! Session progression state machine.
//!
//! The controller owns the current position, attempt counts and review queue
//! for one session and decides, answer by answer, whether to stay, defer,
//! advance or terminate:
//!
//! - **Active**: first pass over `0..N`. A correct answer schedules an
//!   advance; an incorrect one consumes an attempt, and reaching the mode's
//!   ceiling defers the index into the review queue and schedules an advance.
//! - **EnteringReview**: transient. The queue is re-validated; an empty queue
//!   completes the session, otherwise attempts are reset and review begins.
//! - **Review**: second pass over the queue. Exhaustion advances without
//!   re-deferring, so the session always terminates.
//! - **Completed**: terminal. The "no next index" sentinel is emitted once.
//!
//! The controller never calls back into the host. Every operation returns
//! the [`EngineEvent`]s it produced, and delayed advances are explicit
//! timers the host fires with [`SessionController::fire_timer`].

use crate::attempts::AttemptTracker;
use crate::policy::{FeedbackCue, ModePolicy};
use crate::review_queue::ReviewQueue;
use crate::{Error, Result, SessionMode, SessionPhase};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Handle for a scheduled advance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TimerId(u64);

/// Something the host must react to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Show this exercise next; `None` means the session is over
    Advanced(Option<usize>),
    /// Message for the learner, already filtered for the mode
    Feedback(String),
    /// Call `fire_timer(timer)` once `delay` has elapsed
    AdvanceScheduled { timer: TimerId, delay: Duration },
    PhaseChanged(SessionPhase),
    Completed,
}

/// Attempt budget of the current exercise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AttemptsInfo {
    pub current: u32,
    pub max: u32,
    pub remaining: u32,
}

/// Position within the current pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressInfo {
    pub current: usize,
    pub total: usize,
}

/// Read-only projection for progress display
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ControllerView {
    pub phase: SessionPhase,
    pub current_index: Option<usize>,
    pub attempts_info: AttemptsInfo,
    pub progress_info: ProgressInfo,
}

/// State machine driving one session over `total` exercises
#[derive(Debug)]
pub struct SessionController {
    policy: ModePolicy,
    total: usize,
    phase: SessionPhase,
    current: Option<usize>,
    attempts: AttemptTracker,
    queue: ReviewQueue,
    completed: HashSet<usize>,
    pending: Option<TimerId>,
    next_timer: u64,
    review_total: usize,
    review_position: usize,
    terminal_emitted: bool,
    torn_down: bool,
}

impl SessionController {
    /// Start a session at index 0
    pub fn new(policy: ModePolicy, total: usize) -> Result<Self> {
        if total == 0 {
            return Err(Error::Session("cannot start a session without exercises".into()));
        }

        tracing::info!(
            "Starting {} session over {} exercises (max {} attempts)",
            policy.mode,
            total,
            policy.max_attempts
        );

        Ok(Self {
            policy,
            total,
            phase: SessionPhase::Active,
            current: Some(0),
            attempts: AttemptTracker::new(),
            queue: ReviewQueue::new(),
            completed: HashSet::new(),
            pending: None,
            next_timer: 0,
            review_total: 0,
            review_position: 0,
            terminal_emitted: false,
            torn_down: false,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.policy.mode
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Indices still waiting for the review pass
    pub fn pending_review(&self) -> Vec<usize> {
        self.queue.iter().collect()
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Exercises answered correctly so far, each counted once
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn has_pending_advance(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn view(&self) -> ControllerView {
        let reviewing = self.phase == SessionPhase::Review;
        let max = self.policy.ceiling(reviewing);
        let current = self
            .current
            .map(|i| self.attempts.count_for(i))
            .unwrap_or(0);

        let progress_info = match self.phase {
            SessionPhase::Review => ProgressInfo {
                current: self.review_position,
                total: self.review_total,
            },
            SessionPhase::Completed => ProgressInfo {
                current: self.total,
                total: self.total,
            },
            SessionPhase::Active | SessionPhase::EnteringReview => ProgressInfo {
                current: self.current.map_or(self.total, |i| i + 1),
                total: self.total,
            },
        };

        ControllerView {
            phase: self.phase,
            current_index: self.current,
            attempts_info: AttemptsInfo {
                current,
                max,
                remaining: max.saturating_sub(current),
            },
            progress_info,
        }
    }

    /// Evaluate an answer for `index`
    ///
    /// Answers for anything but the current index, or arriving while an
    /// advance is already scheduled, are ignored.
    pub fn handle_answer(&mut self, index: usize, correct: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.accepts(index) {
            tracing::debug!(
                "Ignoring {} answer for exercise {} (current {:?}, phase {:?})",
                if correct { "correct" } else { "incorrect" },
                index,
                self.current,
                self.phase
            );
            return events;
        }

        if correct {
            self.completed.insert(index);
            self.attempts.reset(index);
            self.queue.remove(index);
            tracing::debug!("Exercise {} answered correctly", index);

            self.push_feedback(FeedbackCue::Correct, &mut events);
            self.schedule_advance(self.policy.correct_delay, &mut events);
            return events;
        }

        let reviewing = self.phase == SessionPhase::Review;
        let ceiling = self.policy.ceiling(reviewing);
        let count = self.attempts.record_attempt(index);

        if count < ceiling {
            self.push_feedback(
                FeedbackCue::Retry {
                    attempt: count,
                    max: ceiling,
                },
                &mut events,
            );
            return events;
        }

        if reviewing {
            tracing::info!("Exercise {} exhausted during review, moving on", index);
            self.push_feedback(FeedbackCue::ReviewExhausted, &mut events);
        } else {
            tracing::info!("Exercise {} exhausted after {} attempts, deferring", index, count);
            self.queue.enqueue(index);
            self.push_feedback(FeedbackCue::Exhausted, &mut events);
        }
        self.schedule_advance(self.policy.exhausted_delay, &mut events);
        events
    }

    /// A timed exercise ran out; consumes an attempt like a wrong answer
    pub fn handle_timeout(&mut self, index: usize) -> Vec<EngineEvent> {
        tracing::debug!("Countdown expired on exercise {}", index);
        self.handle_answer(index, false)
    }

    /// The backend reported a mastery loss for `index`
    ///
    /// During the first pass this defers the exercise and advances without
    /// consuming further attempts. Review never re-defers, so it is ignored
    /// there.
    pub fn handle_mastery_degraded(&mut self, index: usize) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.phase != SessionPhase::Active
            || !self.accepts(index)
            || self.completed.contains(&index)
        {
            return events;
        }

        tracing::info!("Mastery degraded on exercise {}, deferring to review", index);
        self.queue.enqueue(index);
        self.schedule_advance(self.policy.degraded_delay, &mut events);
        events
    }

    /// Leave the current exercise without answering it
    ///
    /// Behaves like an exhausted-attempt advance but consumes no attempt.
    /// Any scheduled advance is superseded.
    pub fn continue_to_next(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.torn_down || self.phase.is_terminal() {
            return events;
        }

        self.pending = None;
        if self.phase == SessionPhase::Active {
            if let Some(index) = self.current {
                if !self.completed.contains(&index) {
                    tracing::info!("Skipping exercise {} without penalty", index);
                    self.queue.enqueue(index);
                }
            }
        }

        self.advance(&mut events);
        events
    }

    /// Apply a scheduled advance
    ///
    /// Unknown, superseded or cleared timers are no-ops.
    pub fn fire_timer(&mut self, timer: TimerId) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.torn_down || self.pending != Some(timer) {
            tracing::debug!("Ignoring stale timer {:?}", timer);
            return events;
        }

        self.pending = None;
        self.advance(&mut events);
        events
    }

    /// Clear pending timers and stop reacting to anything
    pub fn teardown(&mut self) {
        if let Some(timer) = self.pending.take() {
            tracing::debug!("Cleared pending timer {:?} on teardown", timer);
        }
        self.torn_down = true;
    }

    fn accepts(&self, index: usize) -> bool {
        !self.torn_down
            && matches!(self.phase, SessionPhase::Active | SessionPhase::Review)
            && self.current == Some(index)
            && self.pending.is_none()
    }

    fn push_feedback(&self, cue: FeedbackCue, events: &mut Vec<EngineEvent>) {
        if let Some(message) = self.policy.feedback_for(cue) {
            events.push(EngineEvent::Feedback(message));
        }
    }

    fn schedule_advance(&mut self, delay: Duration, events: &mut Vec<EngineEvent>) {
        if self.phase == SessionPhase::Active && self.current == Some(self.total - 1) {
            self.set_phase(SessionPhase::EnteringReview, events);
        }

        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending = Some(timer);
        events.push(EngineEvent::AdvanceScheduled { timer, delay });
    }

    fn advance(&mut self, events: &mut Vec<EngineEvent>) {
        match self.phase {
            SessionPhase::Active => match self.current {
                Some(i) if i + 1 < self.total => {
                    self.current = Some(i + 1);
                    events.push(EngineEvent::Advanced(Some(i + 1)));
                }
                _ => {
                    self.set_phase(SessionPhase::EnteringReview, events);
                    self.enter_review(events);
                }
            },
            SessionPhase::EnteringReview => self.enter_review(events),
            SessionPhase::Review => self.next_review_item(events),
            SessionPhase::Completed => {}
        }
    }

    fn enter_review(&mut self, events: &mut Vec<EngineEvent>) {
        let completed = &self.completed;
        self.queue.filter_still_pending(|i| completed.contains(&i));

        if self.queue.is_empty() {
            self.complete(events);
            return;
        }

        for index in self.queue.iter() {
            self.attempts.reset(index);
        }
        self.review_total = self.queue.len();
        self.review_position = 0;

        tracing::info!("Entering review with {} pending exercises", self.review_total);
        self.set_phase(SessionPhase::Review, events);
        self.push_feedback(FeedbackCue::EnteringReview, events);
        self.next_review_item(events);
    }

    fn next_review_item(&mut self, events: &mut Vec<EngineEvent>) {
        match self.queue.dequeue_first() {
            Some(index) => {
                self.review_position += 1;
                self.current = Some(index);
                events.push(EngineEvent::Advanced(Some(index)));
            }
            None => self.complete(events),
        }
    }

    fn complete(&mut self, events: &mut Vec<EngineEvent>) {
        self.current = None;
        self.pending = None;
        self.set_phase(SessionPhase::Completed, events);

        if !self.terminal_emitted {
            self.terminal_emitted = true;
            tracing::info!(
                "Session complete: {}/{} exercises answered correctly",
                self.completed.len(),
                self.total
            );
            events.push(EngineEvent::Advanced(None));
            events.push(EngineEvent::Completed);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase, events: &mut Vec<EngineEvent>) {
        if self.phase != phase {
            tracing::debug!("Phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            events.push(EngineEvent::PhaseChanged(phase));
        }
    }
}

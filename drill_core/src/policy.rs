//! Mode-dependent policy lookup.
//!
//! Every mode-specific constant the engine uses comes from one
//! [`ModePolicy`], resolved once when a session starts:
//! - Detection: 3 attempts, 3-day new-word protection, no retry or
//!   exhaustion commentary, silent auto-advance
//! - Practice: 2 attempts, 1-day protection, feedback filtered through a
//!   content allow-list

use crate::{Config, SessionMode};
use std::time::Duration;

/// Content filter applied to every feedback message before it reaches the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedbackFilter {
    /// Every message is shown
    PassThrough,
    /// Only messages containing one of these lowercase markers are shown
    AllowList(Vec<String>),
}

impl FeedbackFilter {
    pub fn allow_list<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FeedbackFilter::AllowList(
            markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    pub fn allows(&self, message: &str) -> bool {
        match self {
            FeedbackFilter::PassThrough => true,
            FeedbackFilter::AllowList(markers) => {
                let lowered = message.to_lowercase();
                markers.iter().any(|m| lowered.contains(m.as_str()))
            }
        }
    }
}

/// What the controller wants to tell the learner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackCue {
    Correct,
    Retry { attempt: u32, max: u32 },
    Exhausted,
    EnteringReview,
    ReviewExhausted,
}

impl FeedbackCue {
    fn is_negative(&self) -> bool {
        matches!(
            self,
            FeedbackCue::Retry { .. } | FeedbackCue::Exhausted | FeedbackCue::ReviewExhausted
        )
    }

    pub fn message(&self) -> String {
        match self {
            FeedbackCue::Correct => "Correct!".to_string(),
            FeedbackCue::Retry { attempt, max } => {
                format!("Incorrect, try again ({}/{}).", attempt, max)
            }
            FeedbackCue::Exhausted => {
                "Out of attempts! We'll review this one at the end.".to_string()
            }
            FeedbackCue::EnteringReview => "Let's review the pending words.".to_string(),
            FeedbackCue::ReviewExhausted => {
                "Moving on, the correct answer is highlighted.".to_string()
            }
        }
    }
}

/// Resolved constants for one session mode
#[derive(Clone, Debug, PartialEq)]
pub struct ModePolicy {
    pub mode: SessionMode,
    pub max_attempts: u32,
    pub review_attempts: u32,
    pub suppress_incorrect_feedback: bool,
    pub new_word_protection_days: u32,
    pub min_exercises_before_degradation: u32,
    pub correct_delay: Duration,
    pub exhausted_delay: Duration,
    pub degraded_delay: Duration,
    pub feedback: FeedbackFilter,
}

impl ModePolicy {
    /// Built-in policy for a mode
    pub fn for_mode(mode: SessionMode) -> Self {
        Self::from_config(mode, Config::defaults())
    }

    /// Policy for a mode as configured
    pub fn from_config(mode: SessionMode, config: &Config) -> Self {
        let row = config.policy.row(mode);
        let feedback = match mode {
            SessionMode::Detection => FeedbackFilter::PassThrough,
            SessionMode::Practice => FeedbackFilter::allow_list(&config.feedback.allow_markers),
        };

        Self {
            mode,
            max_attempts: row.max_attempts.max(1),
            review_attempts: row.review_attempts.max(1),
            suppress_incorrect_feedback: row.suppress_incorrect_feedback,
            new_word_protection_days: row.new_word_protection_days,
            min_exercises_before_degradation: row.min_exercises_before_degradation,
            correct_delay: Duration::from_millis(config.timing.correct_delay_ms),
            exhausted_delay: Duration::from_millis(row.exhausted_delay_ms),
            degraded_delay: Duration::from_millis(config.timing.degraded_delay_ms),
            feedback,
        }
    }

    /// Attempt ceiling for the given pass
    pub fn ceiling(&self, reviewing: bool) -> u32 {
        if reviewing {
            self.review_attempts
        } else {
            self.max_attempts
        }
    }

    /// Render a cue, or `None` if this mode keeps quiet about it
    pub fn feedback_for(&self, cue: FeedbackCue) -> Option<String> {
        if self.suppress_incorrect_feedback && cue.is_negative() {
            return None;
        }

        let message = cue.message();
        if self.feedback.allows(&message) {
            Some(message)
        } else {
            tracing::debug!("Suppressed {} feedback: {:?}", self.mode, message);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let detection = ModePolicy::for_mode(SessionMode::Detection);
        assert_eq!(detection.max_attempts, 3);
        assert_eq!(detection.new_word_protection_days, 3);
        assert!(detection.suppress_incorrect_feedback);
        assert_eq!(detection.exhausted_delay, Duration::from_millis(2000));

        let practice = ModePolicy::for_mode(SessionMode::Practice);
        assert_eq!(practice.max_attempts, 2);
        assert_eq!(practice.new_word_protection_days, 1);
        assert!(!practice.suppress_incorrect_feedback);
        assert_eq!(practice.min_exercises_before_degradation, 5);
    }

    #[test]
    fn test_detection_is_silent_on_failure() {
        let policy = ModePolicy::for_mode(SessionMode::Detection);
        assert_eq!(policy.feedback_for(FeedbackCue::Exhausted), None);
        assert_eq!(
            policy.feedback_for(FeedbackCue::Retry { attempt: 1, max: 3 }),
            None
        );
        assert_eq!(
            policy.feedback_for(FeedbackCue::Correct).as_deref(),
            Some("Correct!")
        );
    }

    #[test]
    fn test_practice_filters_routine_retry_chatter() {
        let policy = ModePolicy::for_mode(SessionMode::Practice);
        assert_eq!(
            policy.feedback_for(FeedbackCue::Retry { attempt: 1, max: 2 }),
            None
        );
        // Exclamation marker
        assert!(policy.feedback_for(FeedbackCue::Exhausted).is_some());
        // Review cue
        assert!(policy.feedback_for(FeedbackCue::EnteringReview).is_some());
        assert_eq!(policy.feedback_for(FeedbackCue::ReviewExhausted), None);
    }

    #[test]
    fn test_allow_list_comes_from_config() {
        let mut config = Config::default();
        config.feedback.allow_markers = vec!["TRY AGAIN".into()];
        let policy = ModePolicy::from_config(SessionMode::Practice, &config);

        assert!(policy
            .feedback_for(FeedbackCue::Retry { attempt: 1, max: 2 })
            .is_some());
        assert!(policy.feedback_for(FeedbackCue::Correct).is_none());
    }

    #[test]
    fn test_ceiling_per_pass() {
        let policy = ModePolicy::for_mode(SessionMode::Practice);
        assert_eq!(policy.ceiling(false), 2);
        assert_eq!(policy.ceiling(true), 1);
    }
}

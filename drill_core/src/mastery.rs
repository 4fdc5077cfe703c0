//! Mastery level change detection.
//!
//! Turns a backend answer-submission result into at most one UI-facing
//! [`MasteryChangeEvent`]. The notifier holds a single slot: a new event
//! replaces any event the host has not dismissed yet.

use crate::SubmissionResult;
use serde::{Deserialize, Serialize};

/// Highest mastery level the backend assigns
pub const FULL_MASTERY_LEVEL: u8 = 5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Increase,
    Decrease,
}

/// Display-once notice that a word crossed a mastery boundary
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MasteryChangeEvent {
    pub word: String,
    pub word_translation: String,
    pub previous_level: u8,
    pub new_level: u8,
    pub change_type: ChangeType,
    pub message: Option<String>,
}

/// Derive the change event for one submission, if any
///
/// `word` and `translation` are used when the backend result does not name
/// the word itself.
pub fn detect_change(
    result: &SubmissionResult,
    word: &str,
    translation: &str,
) -> Option<MasteryChangeEvent> {
    let word = result.word.as_deref().unwrap_or(word).to_string();
    let word_translation = result
        .word_translation
        .as_deref()
        .unwrap_or(translation)
        .to_string();

    let (change_type, message) =
        if result.mastery_updated && result.mastery_level > result.previous_mastery_level {
            let message = if result.mastery_level >= FULL_MASTERY_LEVEL {
                format!("Fully mastered! \"{}\" is now part of your vocabulary.", word)
            } else {
                format!("Level up! Your mastery of \"{}\" improved.", word)
            };
            (ChangeType::Increase, message)
        } else if result.mastery_decreased {
            let message = result
                .degradation_message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| {
                    format!("Keep practicing \"{}\", you'll win it back!", word)
                });
            (ChangeType::Decrease, message)
        } else {
            return None;
        };

    Some(MasteryChangeEvent {
        word,
        word_translation,
        previous_level: result.previous_mastery_level,
        new_level: result.mastery_level,
        change_type,
        message: Some(message),
    })
}

/// Single-slot holder for the change event awaiting display
#[derive(Clone, Debug, Default)]
pub struct MasteryChangeNotifier {
    slot: Option<MasteryChangeEvent>,
}

impl MasteryChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a submission result; a qualifying change replaces the slot
    pub fn observe(
        &mut self,
        result: &SubmissionResult,
        word: &str,
        translation: &str,
    ) -> Option<&MasteryChangeEvent> {
        let event = detect_change(result, word, translation)?;
        if let Some(previous) = self.slot.as_ref() {
            tracing::debug!("Replacing undismissed mastery change for {}", previous.word);
        }
        tracing::info!(
            "Mastery {:?} for {}: {} -> {}",
            event.change_type,
            event.word,
            event.previous_level,
            event.new_level
        );
        self.slot = Some(event);
        self.slot.as_ref()
    }

    pub fn pending(&self) -> Option<&MasteryChangeEvent> {
        self.slot.as_ref()
    }

    /// Take the event once it has been shown
    pub fn dismiss(&mut self) -> Option<MasteryChangeEvent> {
        self.slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(updated: bool, decreased: bool, previous: u8, level: u8) -> SubmissionResult {
        SubmissionResult {
            correct: updated,
            mastery_level: level,
            previous_mastery_level: previous,
            mastery_updated: updated,
            mastery_decreased: decreased,
            ..Default::default()
        }
    }

    #[test]
    fn test_decrease_produces_single_event() {
        let mut notifier = MasteryChangeNotifier::new();
        let event = notifier
            .observe(&result(false, true, 3, 2), "yaku", "agua")
            .cloned()
            .unwrap();

        assert_eq!(event.change_type, ChangeType::Decrease);
        assert_eq!(event.previous_level, 3);
        assert_eq!(event.new_level, 2);
        assert!(event.message.unwrap().contains("yaku"));

        assert!(notifier.dismiss().is_some());
        assert!(notifier.pending().is_none());
    }

    #[test]
    fn test_backend_message_preferred_on_decrease() {
        let mut res = result(false, true, 2, 1);
        res.degradation_message = Some("You lost a star".into());
        let event = detect_change(&res, "wasi", "casa").unwrap();
        assert_eq!(event.message.as_deref(), Some("You lost a star"));
    }

    #[test]
    fn test_increase_messages() {
        let level_up = detect_change(&result(true, false, 2, 3), "inti", "sol").unwrap();
        assert_eq!(level_up.change_type, ChangeType::Increase);
        assert!(level_up.message.unwrap().starts_with("Level up"));

        let mastered = detect_change(&result(true, false, 4, 5), "inti", "sol").unwrap();
        assert!(mastered.message.unwrap().starts_with("Fully mastered"));
    }

    #[test]
    fn test_no_event_without_boundary_crossing() {
        assert!(detect_change(&result(false, false, 2, 2), "a", "b").is_none());
        // Updated flag without an actual increase
        assert!(detect_change(&result(true, false, 3, 3), "a", "b").is_none());
    }

    #[test]
    fn test_new_event_overwrites_slot() {
        let mut notifier = MasteryChangeNotifier::new();
        notifier.observe(&result(true, false, 1, 2), "inti", "sol");
        notifier.observe(&result(false, true, 3, 2), "killa", "luna");

        let event = notifier.dismiss().unwrap();
        assert_eq!(event.word, "killa");
        assert!(notifier.dismiss().is_none());
    }

    #[test]
    fn test_backend_word_overrides_context() {
        let mut res = result(true, false, 1, 2);
        res.word = Some("mayu".into());
        res.word_translation = Some("río".into());
        let event = detect_change(&res, "yaku", "agua").unwrap();
        assert_eq!(event.word, "mayu");
        assert_eq!(event.word_translation, "río");
    }
}

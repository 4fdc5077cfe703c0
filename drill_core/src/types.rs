//! Core domain types for the Drill exercise engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercises and the batches a session runs over
//! - Session modes and phases
//! - Backend answer-submission results and abandonment consequences
//! - Vocabulary items used for display context

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend identifier of a single exercise
pub type ExerciseId = u64;

/// Backend identifier of an exercise session
pub type SessionId = u64;

// ============================================================================
// Mode and Phase
// ============================================================================

/// Flow a session runs under; fixed for the lifetime of the session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Follow-up drill after a camera object detection
    Detection,
    /// Standalone category drill
    Practice,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Detection => "detection",
            SessionMode::Practice => "practice",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detection" => Ok(SessionMode::Detection),
            "practice" => Ok(SessionMode::Practice),
            other => Err(Error::Other(format!("Unknown session mode: {}", other))),
        }
    }
}

/// Progression phase of a session controller
///
/// `Active → EnteringReview → Review` happens at most once per session and
/// `Completed` is terminal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Active,
    EnteringReview,
    Review,
    Completed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed)
    }
}

// ============================================================================
// Exercises
// ============================================================================

/// Presentation type of an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    MultipleChoice,
    Anagram,
    Matching,
    FillBlanks,
    Pronunciation,
    #[serde(other)]
    Unknown,
}

/// Optional per-exercise tuning sent by the backend
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ExerciseMetadata {
    /// Countdown in seconds; expiry counts as an incorrect answer
    #[serde(default)]
    pub time_limit: Option<u32>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single exercise as loaded from the backend
///
/// Required fields are optional at the type level so a malformed record
/// still loads; the session skips it instead of failing the whole batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: ExerciseId,
    #[serde(rename = "type", default)]
    pub kind: Option<ExerciseKind>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub distractors: Option<Vec<String>>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub metadata: Option<ExerciseMetadata>,
    /// Target-language word the exercise drills
    #[serde(default)]
    pub word: Option<String>,
    /// Learner-language translation of `word`
    #[serde(default)]
    pub translation: Option<String>,
}

fn default_difficulty() -> u8 {
    1
}

/// Separator between the two sides of a matching answer
pub const MATCHING_SEPARATOR: char = '→';

impl Exercise {
    /// True when type, question and answer are all present and non-empty
    pub fn is_well_formed(&self) -> bool {
        let present = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        self.kind.is_some() && present(&self.question) && present(&self.answer)
    }

    /// Countdown length for this exercise, if any
    pub fn time_limit(&self) -> Option<u32> {
        self.metadata
            .as_ref()
            .and_then(|m| m.time_limit)
            .filter(|secs| *secs > 0)
    }

    /// Grade a user answer locally
    ///
    /// Comparison is trimmed and case-insensitive. Matching answers compare
    /// each side of the `left→right` pair independently.
    pub fn check_answer(&self, user_answer: &str) -> bool {
        let Some(expected) = self.answer.as_deref() else {
            return false;
        };

        if self.kind == Some(ExerciseKind::Matching) {
            let split = |s: &str| {
                s.split_once(MATCHING_SEPARATOR)
                    .map(|(l, r)| (normalize(l), normalize(r)))
            };
            return match (split(expected), split(user_answer)) {
                (Some(e), Some(u)) => e == u,
                _ => normalize(expected) == normalize(user_answer),
            };
        }

        normalize(expected) == normalize(user_answer)
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Either response shape accepted from `fetchExercises`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExercisePayload {
    Session {
        session_id: Option<SessionId>,
        exercises: Vec<Exercise>,
    },
    Bare(Vec<Exercise>),
}

/// Normalized exercise batch a session runs over
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseBatch {
    pub session_id: Option<SessionId>,
    pub exercises: Vec<Exercise>,
}

impl From<ExercisePayload> for ExerciseBatch {
    fn from(payload: ExercisePayload) -> Self {
        match payload {
            ExercisePayload::Session {
                session_id,
                exercises,
            } => ExerciseBatch {
                session_id,
                exercises,
            },
            ExercisePayload::Bare(exercises) => ExerciseBatch {
                session_id: None,
                exercises,
            },
        }
    }
}

impl ExerciseBatch {
    /// Parse either payload shape from raw JSON
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let payload: ExercisePayload = serde_json::from_str(json)?;
        Ok(payload.into())
    }
}

// ============================================================================
// Backend results
// ============================================================================

/// Result of `submitAnswer`
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SubmissionResult {
    pub correct: bool,
    #[serde(default)]
    pub mastery_level: u8,
    #[serde(default)]
    pub previous_mastery_level: u8,
    #[serde(default)]
    pub mastery_updated: bool,
    #[serde(default)]
    pub mastery_decreased: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub degradation_message: Option<String>,
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub word_translation: Option<String>,
}

/// One word whose mastery an abandonment would touch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffectedWord {
    pub word: String,
    pub spanish: String,
    pub current_level: u8,
    pub would_degrade: bool,
    pub potential_new_level: u8,
}

/// Backend-computed penalty preview for quitting an unfinished session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbandonmentConsequence {
    pub mode: SessionMode,
    pub failure_penalty: u32,
    pub total_words_affected: u32,
    #[serde(default)]
    pub affected_words: Vec<AffectedWord>,
    #[serde(default)]
    pub warning_message: Option<String>,
}

impl AbandonmentConsequence {
    /// Gate for showing the detailed confirmation
    pub fn has_consequence(&self) -> bool {
        self.total_words_affected > 0 || !self.affected_words.is_empty()
    }

    /// Words that would lose a mastery level
    pub fn degrading_words(&self) -> impl Iterator<Item = &AffectedWord> {
        self.affected_words.iter().filter(|w| w.would_degrade)
    }
}

/// Answer to `checkAbandonmentPenalty`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PenaltyCheck {
    Consequence(AbandonmentConsequence),
    /// Server already finalized the session
    AlreadyCompleted,
}

/// Answer to `abandonSession`
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AbandonReceipt {
    /// Session had already been completed server-side; treated as success
    #[serde(default)]
    pub was_completed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Vocabulary
// ============================================================================

/// A word in the learner's vocabulary
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VocabularyItem {
    pub word: String,
    pub translation: String,
    pub mastery_level: u8,
    pub first_detected: DateTime<Utc>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub exercises_completed: u32,
}

/// Ordering requested from `fetchVocabulary`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VocabularySort {
    #[default]
    Recent,
    Mastery,
    NeedsPractice,
}

/// Filter passed to `fetchVocabulary`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VocabularyFilter {
    #[serde(default)]
    pub sort_by: VocabularySort,
    #[serde(default)]
    pub mastery_min: Option<u8>,
    #[serde(default)]
    pub mastery_max: Option<u8>,
    #[serde(default)]
    pub mode: Option<SessionMode>,
}

impl VocabularyFilter {
    pub fn matches(&self, item: &VocabularyItem) -> bool {
        self.mastery_min.map_or(true, |min| item.mastery_level >= min)
            && self.mastery_max.map_or(true, |max| item.mastery_level <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(kind: Option<ExerciseKind>, answer: Option<&str>) -> Exercise {
        Exercise {
            id: 1,
            kind,
            question: Some("¿Cómo se dice agua?".into()),
            answer: answer.map(str::to_string),
            distractors: None,
            difficulty: 1,
            metadata: None,
            word: Some("yaku".into()),
            translation: Some("agua".into()),
        }
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        assert!(exercise(Some(ExerciseKind::MultipleChoice), Some("yaku")).is_well_formed());
        assert!(!exercise(None, Some("yaku")).is_well_formed());
        assert!(!exercise(Some(ExerciseKind::Anagram), None).is_well_formed());
        assert!(!exercise(Some(ExerciseKind::Anagram), Some("  ")).is_well_formed());
    }

    #[test]
    fn test_check_answer_is_case_and_space_insensitive() {
        let ex = exercise(Some(ExerciseKind::FillBlanks), Some("Yaku"));
        assert!(ex.check_answer("  yaku "));
        assert!(!ex.check_answer("wasi"));
    }

    #[test]
    fn test_check_matching_answer() {
        let ex = exercise(Some(ExerciseKind::Matching), Some("agua→yaku"));
        assert!(ex.check_answer("Agua → Yaku"));
        assert!(!ex.check_answer("agua→wasi"));
    }

    #[test]
    fn test_payload_shapes_normalize() {
        let wrapped = r#"{"session_id": 42, "exercises": [{"id": 1, "type": "anagram", "question": "q", "answer": "a"}]}"#;
        let batch = ExerciseBatch::from_json(wrapped).unwrap();
        assert_eq!(batch.session_id, Some(42));
        assert_eq!(batch.exercises.len(), 1);
        assert_eq!(batch.exercises[0].kind, Some(ExerciseKind::Anagram));

        let bare = r#"[{"id": 7, "type": "multiple_choice", "question": "q", "answer": "a"}]"#;
        let batch = ExerciseBatch::from_json(bare).unwrap();
        assert_eq!(batch.session_id, None);
        assert_eq!(batch.exercises[0].id, 7);
    }

    #[test]
    fn test_unknown_kind_and_time_limit() {
        let json = r#"{"id": 3, "type": "hologram", "question": "q", "answer": "a", "metadata": {"time_limit": 30, "time_bonus": 5}}"#;
        let ex: Exercise = serde_json::from_str(json).unwrap();
        assert_eq!(ex.kind, Some(ExerciseKind::Unknown));
        assert_eq!(ex.time_limit(), Some(30));
        assert!(ex.metadata.unwrap().extra.contains_key("time_bonus"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Detection".parse::<SessionMode>().unwrap(), SessionMode::Detection);
        assert_eq!("practice".parse::<SessionMode>().unwrap(), SessionMode::Practice);
        assert!("camera".parse::<SessionMode>().is_err());
    }
}

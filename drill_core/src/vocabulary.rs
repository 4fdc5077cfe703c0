//! Display context derived from the learner's vocabulary.
//!
//! New words are protected from degradation for the mode's protection
//! window; older words that have been practiced enough lose a level after
//! `max_attempts` consecutive failures.

use crate::policy::ModePolicy;
use crate::VocabularyItem;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Vocabulary snapshot evaluated against one mode's policy
#[derive(Clone, Debug)]
pub struct VocabularyContext {
    items: HashMap<String, VocabularyItem>,
    protection: Duration,
    failure_limit: u32,
    min_exercises: u32,
    now: DateTime<Utc>,
}

impl VocabularyContext {
    pub fn new(items: Vec<VocabularyItem>, policy: &ModePolicy, now: DateTime<Utc>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.word.to_lowercase(), item))
                .collect(),
            protection: Duration::days(i64::from(policy.new_word_protection_days)),
            failure_limit: policy.max_attempts,
            min_exercises: policy.min_exercises_before_degradation,
            now,
        }
    }

    pub fn get(&self, word: &str) -> Option<&VocabularyItem> {
        self.items.get(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Word was first seen inside the protection window
    ///
    /// Unknown words are new by definition and therefore protected.
    pub fn is_protected(&self, word: &str) -> bool {
        self.get(word)
            .map_or(true, |item| self.now - item.first_detected <= self.protection)
    }

    pub fn is_minimally_practiced(&self, word: &str) -> bool {
        self.get(word)
            .is_some_and(|item| item.exercises_completed >= self.min_exercises)
    }

    pub fn consecutive_failures(&self, word: &str) -> u32 {
        self.get(word).map_or(0, |item| item.consecutive_failures)
    }

    /// Failures left before the word can lose a level
    pub fn failures_until_degradation(&self, word: &str) -> u32 {
        self.failure_limit
            .saturating_sub(self.consecutive_failures(word))
    }

    /// One more failure would cost this word a mastery level
    pub fn at_risk(&self, word: &str) -> bool {
        match self.get(word) {
            Some(item) => {
                item.mastery_level > 1
                    && !self.is_protected(word)
                    && self.is_minimally_practiced(word)
                    && item.consecutive_failures + 1 >= self.failure_limit
            }
            None => false,
        }
    }
}

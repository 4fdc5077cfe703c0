//! Backend collaborator interface.
//!
//! The engine talks to the mastery-tracking service only through
//! [`LearningApi`]. Retries, backoff and authentication are the
//! implementation's concern. [`LocalBackend`] is an in-process
//! implementation used by the terminal host and the tests.

use crate::policy::ModePolicy;
use crate::{
    AbandonReceipt, AbandonmentConsequence, AffectedWord, ApiError, Exercise, ExerciseBatch,
    ExerciseId, PenaltyCheck, SessionId, SessionMode, SubmissionResult, VocabularyFilter,
    VocabularyItem, VocabularySort,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Shared handle to a backend implementation
pub type SharedApi = Arc<dyn LearningApi>;

#[async_trait]
pub trait LearningApi: Send + Sync {
    /// Exercises for a detected or chosen label, normalized to a batch
    async fn fetch_exercises(&self, label: &str) -> ApiResult<ExerciseBatch>;

    async fn submit_answer(
        &self,
        exercise_id: ExerciseId,
        answer: &str,
        mode: SessionMode,
    ) -> ApiResult<SubmissionResult>;

    async fn check_abandonment_penalty(
        &self,
        session_id: SessionId,
        mode: SessionMode,
    ) -> ApiResult<PenaltyCheck>;

    /// Idempotent; an already finalized session is not an error
    async fn abandon_session(
        &self,
        session_id: SessionId,
        mode: SessionMode,
    ) -> ApiResult<AbandonReceipt>;

    /// Best-effort progress bookkeeping
    async fn record_progress(&self, mode: SessionMode, category: Option<&str>) -> ApiResult<()>;

    async fn fetch_vocabulary(&self, filter: &VocabularyFilter) -> ApiResult<Vec<VocabularyItem>>;
}

/// Backend operation, used to inject failures into [`LocalBackend`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchExercises,
    SubmitAnswer,
    CheckPenalty,
    Abandon,
    RecordProgress,
    FetchVocabulary,
}

#[derive(Debug, Default)]
struct ServerSession {
    solved: HashSet<ExerciseId>,
    completed: bool,
    abandoned: bool,
}

#[derive(Debug, Default)]
struct BackendState {
    vocabulary: HashMap<String, VocabularyItem>,
    sessions: HashMap<SessionId, ServerSession>,
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
    progress: Vec<(SessionMode, Option<String>)>,
}

/// In-process backend with the same mastery rules as the service
///
/// A correct answer raises the word one level (max 5). A word loses a level
/// after `max_attempts` consecutive failures, unless it is still inside the
/// mode's protection window or has fewer than the minimum completed
/// exercises.
#[derive(Debug)]
pub struct LocalBackend {
    session_id: SessionId,
    exercises: Vec<Exercise>,
    state: Mutex<BackendState>,
}

impl LocalBackend {
    pub fn new(session_id: SessionId, exercises: Vec<Exercise>) -> Self {
        let mut state = BackendState::default();
        state.sessions.insert(session_id, ServerSession::default());
        Self {
            session_id,
            exercises,
            state: Mutex::new(state),
        }
    }

    pub fn from_batch(batch: ExerciseBatch) -> Self {
        Self::new(batch.session_id.unwrap_or(1), batch.exercises)
    }

    pub fn with_vocabulary(self, items: Vec<VocabularyItem>) -> Self {
        {
            let mut state = self.state.lock();
            for item in items {
                state.vocabulary.insert(item.word.to_lowercase(), item);
            }
        }
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Make every later call of `op` fail with a network error
    pub fn fail(&self, op: Operation) {
        self.state.lock().failing.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.state.lock().failing.remove(&op);
    }

    /// Finalize a session server-side, as if another client finished it
    pub fn complete_on_server(&self, session_id: SessionId) {
        self.state
            .lock()
            .sessions
            .entry(session_id)
            .or_default()
            .completed = true;
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn progress_records(&self) -> Vec<(SessionMode, Option<String>)> {
        self.state.lock().progress.clone()
    }

    pub fn vocabulary_item(&self, word: &str) -> Option<VocabularyItem> {
        self.state.lock().vocabulary.get(&word.to_lowercase()).cloned()
    }

    fn enter(&self, op: Operation) -> ApiResult<parking_lot::MutexGuard<'_, BackendState>> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if state.failing.contains(&op) {
            tracing::debug!("Injected failure for {:?}", op);
            return Err(ApiError::Network(format!("{:?} unavailable", op)));
        }
        Ok(state)
    }

    fn affected_words(
        &self,
        state: &BackendState,
        session: &ServerSession,
        mode: SessionMode,
    ) -> Vec<AffectedWord> {
        let policy = ModePolicy::for_mode(mode);
        let penalty = failure_penalty(mode);
        let now = Utc::now();

        self.exercises
            .iter()
            .filter(|ex| !session.solved.contains(&ex.id))
            .filter_map(|ex| ex.word.as_deref())
            .filter_map(|word| state.vocabulary.get(&word.to_lowercase()))
            .filter(|vocab| vocab.mastery_level > 1)
            .map(|vocab| {
                let recent = now - vocab.first_detected
                    <= Duration::days(i64::from(policy.new_word_protection_days));
                let practiced =
                    vocab.exercises_completed >= policy.min_exercises_before_degradation;
                let would_degrade = vocab.consecutive_failures + penalty >= policy.max_attempts
                    && !recent
                    && practiced;
                AffectedWord {
                    word: vocab.word.clone(),
                    spanish: vocab.translation.clone(),
                    current_level: vocab.mastery_level,
                    would_degrade,
                    potential_new_level: if would_degrade {
                        vocab.mastery_level - 1
                    } else {
                        vocab.mastery_level
                    },
                }
            })
            .collect()
    }
}

/// Failures charged to every unsolved word on abandonment
fn failure_penalty(mode: SessionMode) -> u32 {
    match mode {
        SessionMode::Detection => 1,
        SessionMode::Practice => 2,
    }
}

#[async_trait]
impl LearningApi for LocalBackend {
    async fn fetch_exercises(&self, label: &str) -> ApiResult<ExerciseBatch> {
        let _state = self.enter(Operation::FetchExercises)?;
        if label.trim().is_empty() {
            return Err(ApiError::Status {
                code: 400,
                message: "label is required".into(),
            });
        }
        tracing::debug!("Serving {} exercises for {:?}", self.exercises.len(), label);
        Ok(ExerciseBatch {
            session_id: Some(self.session_id),
            exercises: self.exercises.clone(),
        })
    }

    async fn submit_answer(
        &self,
        exercise_id: ExerciseId,
        answer: &str,
        mode: SessionMode,
    ) -> ApiResult<SubmissionResult> {
        let mut state = self.enter(Operation::SubmitAnswer)?;
        let exercise = self
            .exercises
            .iter()
            .find(|ex| ex.id == exercise_id)
            .ok_or_else(|| ApiError::Status {
                code: 404,
                message: format!("exercise {} not found", exercise_id),
            })?;

        let correct = exercise.check_answer(answer);
        if correct {
            if let Some(session) = state.sessions.get_mut(&self.session_id) {
                session.solved.insert(exercise_id);
            }
        }

        let Some(word) = exercise.word.clone() else {
            return Ok(SubmissionResult {
                correct,
                ..Default::default()
            });
        };

        let policy = ModePolicy::for_mode(mode);
        let now = Utc::now();
        let translation = exercise.translation.clone().unwrap_or_default();
        let vocab = state
            .vocabulary
            .entry(word.to_lowercase())
            .or_insert_with(|| VocabularyItem {
                word: word.clone(),
                translation: translation.clone(),
                mastery_level: 1,
                first_detected: now,
                consecutive_failures: 0,
                exercises_completed: 0,
            });

        let previous = vocab.mastery_level;
        let mut result = SubmissionResult {
            correct,
            previous_mastery_level: previous,
            word: Some(vocab.word.clone()),
            word_translation: Some(vocab.translation.clone()),
            ..Default::default()
        };

        if correct {
            vocab.consecutive_failures = 0;
            vocab.exercises_completed += 1;
            vocab.mastery_level = (vocab.mastery_level + 1).min(crate::mastery::FULL_MASTERY_LEVEL);
            result.mastery_updated = vocab.mastery_level > previous;
        } else {
            vocab.consecutive_failures += 1;
            let protected = now - vocab.first_detected
                <= Duration::days(i64::from(policy.new_word_protection_days));
            let practiced = vocab.exercises_completed >= policy.min_exercises_before_degradation;

            if vocab.consecutive_failures >= policy.max_attempts
                && !protected
                && practiced
                && vocab.mastery_level > 1
            {
                vocab.mastery_level -= 1;
                vocab.consecutive_failures = 0;
                result.mastery_decreased = true;
                result.degradation_message = Some(format!(
                    "\"{}\" dropped to level {} after repeated mistakes.",
                    vocab.word, vocab.mastery_level
                ));
            }
        }

        result.mastery_level = vocab.mastery_level;
        result.consecutive_failures = vocab.consecutive_failures;
        Ok(result)
    }

    async fn check_abandonment_penalty(
        &self,
        session_id: SessionId,
        mode: SessionMode,
    ) -> ApiResult<PenaltyCheck> {
        let state = self.enter(Operation::CheckPenalty)?;
        let session = state.sessions.get(&session_id).ok_or(ApiError::Status {
            code: 404,
            message: "session not found".into(),
        })?;

        if session.completed {
            return Ok(PenaltyCheck::AlreadyCompleted);
        }

        let affected_words = self.affected_words(&state, session, mode);
        let degrading = affected_words.iter().filter(|w| w.would_degrade).count();
        let warning_message = if affected_words.is_empty() {
            "If you leave now: no penalties for existing words.".to_string()
        } else if degrading > 0 {
            format!("If you leave now: {} word(s) could lose a mastery star.", degrading)
        } else {
            "If you leave now: some words will accumulate failures, none will lose stars yet."
                .to_string()
        };

        Ok(PenaltyCheck::Consequence(AbandonmentConsequence {
            mode,
            failure_penalty: failure_penalty(mode),
            total_words_affected: affected_words.len() as u32,
            affected_words,
            warning_message: Some(warning_message),
        }))
    }

    async fn abandon_session(
        &self,
        session_id: SessionId,
        mode: SessionMode,
    ) -> ApiResult<AbandonReceipt> {
        let mut state = self.enter(Operation::Abandon)?;
        let (completed, abandoned) = match state.sessions.get(&session_id) {
            Some(session) => (session.completed, session.abandoned),
            None => {
                return Err(ApiError::Status {
                    code: 404,
                    message: "session not found".into(),
                })
            }
        };

        if completed {
            return Ok(AbandonReceipt {
                was_completed: true,
                message: Some("session already finished".into()),
            });
        }
        if abandoned {
            return Ok(AbandonReceipt {
                was_completed: false,
                message: Some("session already abandoned".into()),
            });
        }

        let penalty = failure_penalty(mode);
        let unsolved: Vec<String> = {
            let session = &state.sessions[&session_id];
            self.exercises
                .iter()
                .filter(|ex| !session.solved.contains(&ex.id))
                .filter_map(|ex| ex.word.as_deref().map(str::to_lowercase))
                .collect()
        };
        for word in unsolved {
            if let Some(vocab) = state.vocabulary.get_mut(&word) {
                vocab.consecutive_failures += penalty;
            }
        }
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.abandoned = true;
        }

        Ok(AbandonReceipt {
            was_completed: false,
            message: Some("session abandoned".into()),
        })
    }

    async fn record_progress(&self, mode: SessionMode, category: Option<&str>) -> ApiResult<()> {
        let mut state = self.enter(Operation::RecordProgress)?;
        state.progress.push((mode, category.map(str::to_string)));
        Ok(())
    }

    async fn fetch_vocabulary(&self, filter: &VocabularyFilter) -> ApiResult<Vec<VocabularyItem>> {
        let state = self.enter(Operation::FetchVocabulary)?;
        let mut items: Vec<VocabularyItem> = state
            .vocabulary
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();

        match filter.sort_by {
            VocabularySort::Recent => items.sort_by(|a, b| b.first_detected.cmp(&a.first_detected)),
            VocabularySort::Mastery => items.sort_by(|a, b| b.mastery_level.cmp(&a.mastery_level)),
            VocabularySort::NeedsPractice => items.sort_by(|a, b| {
                a.mastery_level
                    .cmp(&b.mastery_level)
                    .then(b.consecutive_failures.cmp(&a.consecutive_failures))
            }),
        }
        Ok(items)
    }
}

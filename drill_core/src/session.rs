//! One running exercise session.
//!
//! [`ExerciseSession`] wires the progression controller to the backend:
//! answers are graded locally so feedback is immediate, then submitted for
//! mastery bookkeeping. Backend results arrive later and may report a
//! mastery change or a degradation that defers the exercise.
//!
//! The session stays single-threaded. Network work is split out into
//! [`Submission`] values that hold no borrow of the session, so the host
//! can await them while still handling timers and input. Results that
//! arrive after teardown are discarded.

use crate::abandonment::{AbandonOutcome, AbandonmentGuard, ExitCheck};
use crate::api::SharedApi;
use crate::controller::{ControllerView, EngineEvent, SessionController, TimerId};
use crate::countdown::{Countdown, Tick};
use crate::mastery::{MasteryChangeEvent, MasteryChangeNotifier};
use crate::policy::ModePolicy;
use crate::registry::SessionRegistry;
use crate::vocabulary::VocabularyContext;
use crate::{
    ApiError, Exercise, ExerciseBatch, ExerciseId, Result, SessionId, SessionMode, SessionPhase,
    SubmissionResult, VocabularyFilter,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared flag cleared when the session is torn down
#[derive(Clone, Debug)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Backend submission detached from the session
pub struct Submission {
    api: SharedApi,
    liveness: Liveness,
    index: usize,
    exercise_id: ExerciseId,
    answer: String,
    mode: SessionMode,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("index", &self.index)
            .field("exercise_id", &self.exercise_id)
            .finish()
    }
}

/// How a submission ended
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionOutcome {
    Delivered { index: usize, result: SubmissionResult },
    Failed { index: usize, error: ApiError },
    /// Session was torn down; nothing may be applied
    Discarded,
}

impl Submission {
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn send(self) -> SubmissionOutcome {
        if !self.liveness.is_alive() {
            return SubmissionOutcome::Discarded;
        }

        let outcome = self
            .api
            .submit_answer(self.exercise_id, &self.answer, self.mode)
            .await;

        if !self.liveness.is_alive() {
            tracing::debug!("Discarding submission for exercise {} after teardown", self.exercise_id);
            return SubmissionOutcome::Discarded;
        }

        match outcome {
            Ok(result) => SubmissionOutcome::Delivered {
                index: self.index,
                result,
            },
            Err(error) => SubmissionOutcome::Failed {
                index: self.index,
                error,
            },
        }
    }
}

/// Everything an answer produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnswerReport {
    pub events: Vec<EngineEvent>,
    pub mastery: Option<MasteryChangeEvent>,
}

pub struct ExerciseSession {
    instance: Uuid,
    api: SharedApi,
    registry: SessionRegistry,
    session_id: Option<SessionId>,
    category: Option<String>,
    exercises: Vec<Exercise>,
    controller: SessionController,
    notifier: MasteryChangeNotifier,
    guard: AbandonmentGuard,
    countdown: Option<Countdown>,
    liveness: Liveness,
    started: bool,
    progress_recorded: bool,
}

impl std::fmt::Debug for ExerciseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseSession")
            .field("instance", &self.instance)
            .field("session_id", &self.session_id)
            .field("controller", &self.controller)
            .finish()
    }
}

impl ExerciseSession {
    pub fn new(
        api: SharedApi,
        registry: SessionRegistry,
        policy: ModePolicy,
        batch: ExerciseBatch,
        category: Option<String>,
    ) -> Result<Self> {
        let controller = SessionController::new(policy, batch.exercises.len())?;
        let guard = AbandonmentGuard::new(api.clone(), registry.clone());
        let instance = Uuid::new_v4();

        tracing::debug!(
            "Session instance {} bound to backend session {:?}",
            instance,
            batch.session_id
        );

        Ok(Self {
            instance,
            api,
            registry,
            session_id: batch.session_id,
            category,
            exercises: batch.exercises,
            controller,
            notifier: MasteryChangeNotifier::new(),
            guard,
            countdown: None,
            liveness: Liveness::new(),
            started: false,
            progress_recorded: false,
        })
    }

    /// Fetch exercises for `label` and build a session over them
    pub async fn load(
        api: SharedApi,
        registry: SessionRegistry,
        policy: ModePolicy,
        label: &str,
        category: Option<String>,
    ) -> Result<Self> {
        let batch = api.fetch_exercises(label).await?;
        Self::new(api, registry, policy, batch, category)
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn mode(&self) -> SessionMode {
        self.controller.mode()
    }

    pub fn phase(&self) -> SessionPhase {
        self.controller.phase()
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn current_exercise(&self) -> Option<&Exercise> {
        self.controller
            .current_index()
            .and_then(|i| self.exercises.get(i))
    }

    pub fn view(&self) -> ControllerView {
        self.controller.view()
    }

    pub fn pending_review(&self) -> Vec<usize> {
        self.controller.pending_review()
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown
            .as_ref()
            .filter(|c| c.is_running())
            .map(Countdown::remaining)
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn pending_mastery_change(&self) -> Option<&MasteryChangeEvent> {
        self.notifier.pending()
    }

    pub fn dismiss_mastery_change(&mut self) -> Option<MasteryChangeEvent> {
        self.notifier.dismiss()
    }

    pub fn is_closed(&self) -> bool {
        !self.liveness.is_alive()
    }

    /// Show the first exercise, skipping malformed ones
    pub fn begin(&mut self) -> Vec<EngineEvent> {
        if self.started || self.is_closed() {
            return Vec::new();
        }
        self.started = true;
        let first = self.controller.current_index();
        self.settle(vec![EngineEvent::Advanced(first)])
    }

    /// Grade an answer locally and prepare its backend submission
    ///
    /// Answers the controller would ignore produce no submission.
    pub fn evaluate(&mut self, index: usize, answer: &str) -> (Vec<EngineEvent>, Option<Submission>) {
        if !self.accepting(index) {
            tracing::debug!("Ignoring answer for exercise {}", index);
            return (Vec::new(), None);
        }
        let Some(exercise) = self.exercises.get(index) else {
            return (Vec::new(), None);
        };

        let correct = exercise.check_answer(answer);
        let submission = Submission {
            api: self.api.clone(),
            liveness: self.liveness.clone(),
            index,
            exercise_id: exercise.id,
            answer: answer.to_string(),
            mode: self.mode(),
        };

        let events = self.controller.handle_answer(index, correct);
        (self.settle(events), Some(submission))
    }

    /// Fold a finished submission back into the session
    pub fn apply_submission(&mut self, outcome: SubmissionOutcome) -> AnswerReport {
        if self.is_closed() {
            return AnswerReport::default();
        }

        match outcome {
            SubmissionOutcome::Delivered { index, result } => {
                let (word, translation) = self
                    .exercises
                    .get(index)
                    .map(|ex| {
                        (
                            ex.word.clone().unwrap_or_default(),
                            ex.translation.clone().unwrap_or_default(),
                        )
                    })
                    .unwrap_or_default();

                let mastery = self.notifier.observe(&result, &word, &translation).cloned();
                let events = if result.mastery_decreased && !result.correct {
                    let events = self.controller.handle_mastery_degraded(index);
                    self.settle(events)
                } else {
                    Vec::new()
                };
                AnswerReport { events, mastery }
            }
            SubmissionOutcome::Failed { index, error } => {
                tracing::warn!("Submitting exercise {} failed: {}", index, error);
                AnswerReport::default()
            }
            SubmissionOutcome::Discarded => AnswerReport::default(),
        }
    }

    /// Grade, submit and apply in one step
    pub async fn answer(&mut self, index: usize, answer: &str) -> AnswerReport {
        let (mut events, submission) = self.evaluate(index, answer);
        let Some(submission) = submission else {
            return AnswerReport {
                events,
                mastery: None,
            };
        };

        let outcome = submission.send().await;
        let mut report = self.apply_submission(outcome);
        events.append(&mut report.events);
        report.events = events;
        report
    }

    /// Skip the current exercise without penalty
    pub fn continue_to_next(&mut self) -> Vec<EngineEvent> {
        let events = self.controller.continue_to_next();
        self.settle(events)
    }

    pub fn fire_timer(&mut self, timer: TimerId) -> Vec<EngineEvent> {
        let events = self.controller.fire_timer(timer);
        self.settle(events)
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let Some(countdown) = self.countdown.as_mut() else {
            return Vec::new();
        };
        if countdown.tick() != Tick::Expired {
            return Vec::new();
        }

        let Some(index) = self.controller.current_index() else {
            return Vec::new();
        };
        let events = self.controller.handle_timeout(index);
        let events = self.settle(events);

        // Attempts left: the same exercise gets a fresh countdown
        if !self.controller.has_pending_advance() && self.controller.current_index() == Some(index)
        {
            self.arm_countdown(index);
        }
        events
    }

    /// Vocabulary snapshot for display, evaluated against this session's mode
    pub async fn vocabulary_context(&self) -> Result<VocabularyContext> {
        let filter = VocabularyFilter {
            mode: Some(self.mode()),
            ..Default::default()
        };
        let items = self.api.fetch_vocabulary(&filter).await?;
        Ok(VocabularyContext::new(
            items,
            self.controller.policy(),
            Utc::now(),
        ))
    }

    /// Learner wants to leave
    ///
    /// Closes the session when no confirmation is needed.
    pub async fn request_exit(&mut self) -> ExitCheck {
        let (mode, phase) = (self.mode(), self.phase());
        let check = self.guard.check_exit(self.session_id, mode, phase).await;

        if check == ExitCheck::AlreadyComplete {
            self.record_progress();
        }
        if check.can_close() {
            self.close();
        }
        check
    }

    /// Learner confirmed leaving; retry by calling again after a failure
    pub async fn confirm_abandon(&mut self) -> AbandonOutcome {
        let mode = self.mode();
        let outcome = self.guard.confirm(self.session_id, mode).await;
        if outcome == AbandonOutcome::AlreadyComplete {
            self.record_progress();
        }
        if outcome.is_success() {
            self.close();
        }
        outcome
    }

    pub fn cancel_exit(&mut self) {
        self.guard.cancel();
    }

    /// Leave without backend acknowledgment
    pub fn force_exit(&mut self) {
        self.guard.force_exit(self.session_id);
        self.close();
    }

    /// Release the session; later timers and results are ignored
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        tracing::debug!("Closing session instance {}", self.instance);
        self.controller.teardown();
        self.countdown = None;
        self.liveness.kill();
    }

    fn accepting(&self, index: usize) -> bool {
        !self.is_closed()
            && !self.controller.has_pending_advance()
            && matches!(self.phase(), SessionPhase::Active | SessionPhase::Review)
            && self.controller.current_index() == Some(index)
    }

    fn malformed_current(&self) -> Option<usize> {
        let index = self.controller.current_index()?;
        if !self.accepting(index) {
            return None;
        }
        match self.exercises.get(index) {
            Some(ex) if ex.is_well_formed() => None,
            _ => Some(index),
        }
    }

    fn arm_countdown(&mut self, index: usize) {
        self.countdown = self
            .exercises
            .get(index)
            .and_then(Exercise::time_limit)
            .map(Countdown::start);
    }

    /// Track side effects of controller events and skip malformed exercises
    fn settle(&mut self, mut batch: Vec<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        loop {
            for event in &batch {
                match event {
                    EngineEvent::Advanced(Some(index)) => self.arm_countdown(*index),
                    EngineEvent::AdvanceScheduled { .. } => {
                        if let Some(countdown) = self.countdown.as_mut() {
                            countdown.stop();
                        }
                    }
                    EngineEvent::Completed => self.on_completed(),
                    _ => {}
                }
            }
            out.append(&mut batch);

            match self.malformed_current() {
                Some(index) => {
                    tracing::warn!("Exercise {} is malformed, skipping", index);
                    batch = self.controller.continue_to_next();
                }
                None => break,
            }
        }
        out
    }

    fn on_completed(&mut self) {
        self.countdown = None;
        if let Some(id) = self.session_id {
            self.registry.mark_completed(id);
        }
        self.record_progress();
    }

    /// Fire-and-forget progress record; failures are only logged
    fn record_progress(&mut self) {
        if self.progress_recorded {
            return;
        }
        self.progress_recorded = true;

        let api = self.api.clone();
        let mode = self.mode();
        let category = self.category.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = api.record_progress(mode, category.as_deref()).await {
                        tracing::warn!("Recording progress failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("No async runtime, progress not recorded"),
        }
    }
}

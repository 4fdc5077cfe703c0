//! Exit handling for unfinished sessions.
//!
//! Leaving an unfinished session costs the learner failures on the words
//! they did not solve. The guard previews that cost, asks the host to
//! confirm, and only reports an abandonment once the backend acknowledged
//! it. A failed abandon is never silently treated as success; the host may
//! retry, cancel, or force an exit that skips the backend.

use crate::api::SharedApi;
use crate::registry::{SessionRegistry, SessionStatus};
use crate::{AbandonmentConsequence, ApiError, PenaltyCheck, SessionId, SessionMode, SessionPhase};

/// What the host should do after an exit request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitCheck {
    /// Nothing to lose; close immediately
    AlreadyComplete,
    /// Already abandoned by this guard or a peer; close immediately
    AlreadyAbandoned,
    /// No backend session to abandon; close immediately
    Untracked,
    /// Another exit check is still running; ignore this request
    InProgress,
    /// Ask the learner to confirm, showing the previewed consequence
    Confirm(AbandonmentConsequence),
    /// Penalty preview failed; ask with a generic confirmation
    ConfirmGeneric,
}

impl ExitCheck {
    /// Host can close without asking
    pub fn can_close(&self) -> bool {
        matches!(
            self,
            ExitCheck::AlreadyComplete | ExitCheck::AlreadyAbandoned | ExitCheck::Untracked
        )
    }
}

/// Result of a confirmed abandon
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbandonOutcome {
    Abandoned,
    /// Backend reported the session finished; treated as success
    AlreadyComplete,
    /// Backend did not acknowledge; offer retry, cancel or force exit
    Failed(ApiError),
}

impl AbandonOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, AbandonOutcome::Failed(_))
    }
}

/// Per-session exit state machine
pub struct AbandonmentGuard {
    api: SharedApi,
    registry: SessionRegistry,
    exiting: bool,
    abandoned: bool,
}

impl std::fmt::Debug for AbandonmentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbandonmentGuard")
            .field("exiting", &self.exiting)
            .field("abandoned", &self.abandoned)
            .finish()
    }
}

impl AbandonmentGuard {
    pub fn new(api: SharedApi, registry: SessionRegistry) -> Self {
        Self {
            api,
            registry,
            exiting: false,
            abandoned: false,
        }
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Decide whether leaving needs confirmation
    ///
    /// Completed sessions, locally or per the registry, short-circuit without
    /// a backend call.
    pub async fn check_exit(
        &mut self,
        session_id: Option<SessionId>,
        mode: SessionMode,
        phase: SessionPhase,
    ) -> ExitCheck {
        if self.abandoned {
            return ExitCheck::AlreadyAbandoned;
        }
        if phase == SessionPhase::Completed {
            return ExitCheck::AlreadyComplete;
        }
        let Some(id) = session_id else {
            return ExitCheck::Untracked;
        };

        match self.registry.status(id) {
            SessionStatus::Completed => return ExitCheck::AlreadyComplete,
            SessionStatus::Abandoned => return ExitCheck::AlreadyAbandoned,
            SessionStatus::Unknown => {}
        }

        if self.exiting {
            tracing::debug!("Exit check for session {} already running", id);
            return ExitCheck::InProgress;
        }
        self.exiting = true;

        match self.api.check_abandonment_penalty(id, mode).await {
            Ok(PenaltyCheck::Consequence(consequence)) => {
                tracing::info!(
                    "Session {}: leaving affects {} word(s)",
                    id,
                    consequence.total_words_affected
                );
                ExitCheck::Confirm(consequence)
            }
            Ok(PenaltyCheck::AlreadyCompleted) | Err(ApiError::AlreadyCompleted) => {
                self.exiting = false;
                self.registry.mark_completed(id);
                ExitCheck::AlreadyComplete
            }
            Err(e) => {
                tracing::warn!("Penalty preview for session {} failed: {}", id, e);
                ExitCheck::ConfirmGeneric
            }
        }
    }

    /// Ask the backend to abandon; safe to call again after a failure
    pub async fn confirm(&mut self, session_id: Option<SessionId>, mode: SessionMode) -> AbandonOutcome {
        if self.abandoned {
            return AbandonOutcome::Abandoned;
        }
        let Some(id) = session_id else {
            self.exiting = false;
            self.abandoned = true;
            return AbandonOutcome::Abandoned;
        };

        match self.api.abandon_session(id, mode).await {
            Ok(receipt) if receipt.was_completed => self.finish_completed(id),
            Err(ApiError::AlreadyCompleted) => self.finish_completed(id),
            Ok(_) => {
                self.exiting = false;
                self.abandoned = true;
                self.registry.mark_abandoned(id);
                AbandonOutcome::Abandoned
            }
            Err(e) => {
                tracing::warn!("Abandoning session {} failed: {}", id, e);
                AbandonOutcome::Failed(e)
            }
        }
    }

    /// Learner chose to keep going
    pub fn cancel(&mut self) {
        self.exiting = false;
    }

    /// Give up on the backend and leave anyway
    ///
    /// The session is recorded as abandoned locally only.
    pub fn force_exit(&mut self, session_id: Option<SessionId>) {
        tracing::warn!("Force exit of session {:?} without backend acknowledgment", session_id);
        self.exiting = false;
        self.abandoned = true;
        if let Some(id) = session_id {
            self.registry.mark_abandoned(id);
        }
    }

    fn finish_completed(&mut self, id: SessionId) -> AbandonOutcome {
        self.exiting = false;
        self.registry.mark_completed(id);
        AbandonOutcome::AlreadyComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{exercise, seasoned};
    use crate::api::{LocalBackend, Operation};
    use std::sync::Arc;

    fn setup() -> (Arc<LocalBackend>, SessionRegistry, AbandonmentGuard) {
        let backend = Arc::new(
            LocalBackend::new(42, vec![exercise(1, "yaku", "agua")])
                .with_vocabulary(vec![seasoned("yaku", 3, 0)]),
        );
        let registry = SessionRegistry::new();
        let guard = AbandonmentGuard::new(backend.clone(), registry.clone());
        (backend, registry, guard)
    }

    #[tokio::test]
    async fn test_failed_abandon_then_retry() {
        let (backend, registry, mut guard) = setup();

        let check = guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        let consequence = match check {
            ExitCheck::Confirm(consequence) => consequence,
            other => panic!("expected confirmation, got {:?}", other),
        };
        assert!(consequence.has_consequence());

        backend.fail(Operation::Abandon);
        let outcome = guard.confirm(Some(42), SessionMode::Practice).await;
        assert!(matches!(outcome, AbandonOutcome::Failed(ApiError::Network(_))));
        assert!(!guard.is_abandoned());
        assert_eq!(registry.status(42), SessionStatus::Unknown);

        backend.recover(Operation::Abandon);
        let outcome = guard.confirm(Some(42), SessionMode::Practice).await;
        assert_eq!(outcome, AbandonOutcome::Abandoned);
        assert!(guard.is_abandoned());
        assert_eq!(registry.status(42), SessionStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_completed_phase_skips_backend() {
        let (backend, _registry, mut guard) = setup();
        let check = guard
            .check_exit(Some(42), SessionMode::Detection, SessionPhase::Completed)
            .await;
        assert_eq!(check, ExitCheck::AlreadyComplete);
        assert_eq!(backend.call_count(Operation::CheckPenalty), 0);
    }

    #[tokio::test]
    async fn test_registry_completion_skips_backend() {
        let (backend, registry, mut guard) = setup();
        registry.mark_completed(42);
        let check = guard
            .check_exit(Some(42), SessionMode::Detection, SessionPhase::Active)
            .await;
        assert!(check.can_close());
        assert_eq!(backend.call_count(Operation::CheckPenalty), 0);
    }

    #[tokio::test]
    async fn test_server_side_completion_is_success() {
        let (backend, registry, mut guard) = setup();
        backend.complete_on_server(42);

        let check = guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Review)
            .await;
        assert_eq!(check, ExitCheck::AlreadyComplete);
        assert!(registry.is_completed(42));
        assert!(!guard.is_exiting());
    }

    #[tokio::test]
    async fn test_preview_failure_falls_back_to_generic() {
        let (backend, _registry, mut guard) = setup();
        backend.fail(Operation::CheckPenalty);
        let check = guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        assert_eq!(check, ExitCheck::ConfirmGeneric);
    }

    #[tokio::test]
    async fn test_duplicate_request_while_exiting() {
        let (_backend, _registry, mut guard) = setup();
        guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        let second = guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        assert_eq!(second, ExitCheck::InProgress);

        guard.cancel();
        let third = guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        assert!(matches!(third, ExitCheck::Confirm(_)));
    }

    #[tokio::test]
    async fn test_force_exit_marks_locally() {
        let (backend, registry, mut guard) = setup();
        backend.fail(Operation::Abandon);
        guard
            .check_exit(Some(42), SessionMode::Practice, SessionPhase::Active)
            .await;
        assert!(!guard.confirm(Some(42), SessionMode::Practice).await.is_success());

        guard.force_exit(Some(42));
        assert!(guard.is_abandoned());
        assert_eq!(registry.status(42), SessionStatus::Abandoned);
        assert_eq!(backend.call_count(Operation::Abandon), 1);
    }
}

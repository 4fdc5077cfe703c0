//! Process-wide record of finalized sessions.
//!
//! One [`SessionRegistry`] is created by the host and cloned into every
//! session and peer component that needs completion status. Entries are
//! append-only; a missing entry means "unknown", not "incomplete".

use crate::SessionId;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Final state recorded for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Abandoned,
    Unknown,
}

/// Notification sent to subscribers when a session is finalized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    Completed(SessionId),
    Abandoned(SessionId),
}

struct RegistryInner {
    finalized: RwLock<HashMap<SessionId, SessionStatus>>,
    sender: broadcast::Sender<RegistryEvent>,
}

/// Shared handle to the registry
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("finalized", &self.inner.finalized.read().len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                finalized: RwLock::new(HashMap::new()),
                sender,
            }),
        }
    }

    /// Record a completion; returns false if the session was already finalized
    pub fn mark_completed(&self, id: SessionId) -> bool {
        self.finalize(id, SessionStatus::Completed)
    }

    /// Record an abandonment; returns false if the session was already finalized
    pub fn mark_abandoned(&self, id: SessionId) -> bool {
        self.finalize(id, SessionStatus::Abandoned)
    }

    pub fn status(&self, id: SessionId) -> SessionStatus {
        self.inner
            .finalized
            .read()
            .get(&id)
            .copied()
            .unwrap_or(SessionStatus::Unknown)
    }

    pub fn is_completed(&self, id: SessionId) -> bool {
        self.status(id) == SessionStatus::Completed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.sender.subscribe()
    }

    fn finalize(&self, id: SessionId, status: SessionStatus) -> bool {
        {
            let mut finalized = self.inner.finalized.write();
            if finalized.contains_key(&id) {
                tracing::debug!("Session {} already finalized, keeping first status", id);
                return false;
            }
            finalized.insert(id, status);
        }

        let event = match status {
            SessionStatus::Abandoned => RegistryEvent::Abandoned(id),
            _ => RegistryEvent::Completed(id),
        };
        tracing::info!("Session {} finalized as {:?}", id, status);
        // No subscribers is fine
        let _ = self.inner.sender.send(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absence_is_unknown() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.status(9), SessionStatus::Unknown);
        assert!(!registry.is_completed(9));
    }

    #[test]
    fn test_first_status_wins() {
        let registry = SessionRegistry::new();
        assert!(registry.mark_completed(1));
        assert!(!registry.mark_abandoned(1));
        assert!(!registry.mark_completed(1));
        assert_eq!(registry.status(1), SessionStatus::Completed);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let peer = registry.clone();
        registry.mark_abandoned(4);
        assert_eq!(peer.status(4), SessionStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let registry = SessionRegistry::new();
        let mut rx = registry.subscribe();

        registry.mark_completed(7);
        registry.mark_completed(7);
        registry.mark_abandoned(8);

        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Completed(7));
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::Abandoned(8));
        assert!(rx.try_recv().is_err());
    }
}

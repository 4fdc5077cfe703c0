#![forbid(unsafe_code)]

//! Core engine for vocabulary exercise sessions.
//!
//! This crate provides:
//! - Domain types (exercises, submission results, vocabulary)
//! - Mode policy and configuration
//! - The session progression state machine
//! - Mastery change notices and the finalized-session registry
//! - Backend interface and abandonment handling

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod policy;
pub mod attempts;
pub mod review_queue;
pub mod countdown;
pub mod controller;
pub mod mastery;
pub mod vocabulary;
pub mod registry;
pub mod api;
pub mod abandonment;
pub mod session;

// Re-export commonly used types
pub use error::{ApiError, Error, Result};
pub use types::*;
pub use config::Config;
pub use policy::{FeedbackFilter, ModePolicy};
pub use controller::{ControllerView, EngineEvent, SessionController, TimerId};
pub use mastery::{ChangeType, MasteryChangeEvent, MasteryChangeNotifier};
pub use registry::{SessionRegistry, SessionStatus};
pub use api::{LearningApi, LocalBackend, SharedApi};
pub use abandonment::{AbandonOutcome, AbandonmentGuard, ExitCheck};
pub use session::{AnswerReport, ExerciseSession, Submission, SubmissionOutcome};

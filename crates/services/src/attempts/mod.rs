//! The timed attempt engine.
//!
//! `QuizLoader` resumes or creates an attempt, `AttemptSession` wires the
//! `AnswerRegistry`, `DraftCache`, `DeadlineClock` and `Finalizer` together,
//! and `AttemptService` is the storage-backed entry point.

mod activity;
mod deadline;
mod draft;
mod finalizer;
mod latch;
mod loader;
mod registry;
mod service;
mod session;

#[cfg(test)]
mod fixtures;

pub use activity::{ActivityRecorder, DailyActivity};
pub use deadline::DeadlineClock;
pub use draft::DraftCache;
pub use finalizer::{Finalized, Finalizer};
pub use latch::{AttemptLatch, LatchState};
pub use loader::{LoadedAttempt, QuizLoader};
pub use registry::{AnswerRegistry, PersistTask, Selection};
pub use service::AttemptService;
pub use session::{AttemptProgress, AttemptReview, AttemptSession, QuestionView};

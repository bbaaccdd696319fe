#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempts;
pub mod error;
pub mod settings;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use attempts::{
    ActivityRecorder, AnswerRegistry, AttemptProgress, AttemptReview, AttemptService,
    AttemptSession, DailyActivity, DeadlineClock, DraftCache, Finalizer, PersistTask,
    QuestionView, QuizLoader, Selection,
};
pub use error::{AppServicesError, AttemptError};
pub use settings::EngineSettings;

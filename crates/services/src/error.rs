//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{OptionId, QuestionId, QuizError, SetId};
use storage::drafts::DraftStoreError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the attempt engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("quiz set {0} not found")]
    NotFound(SetId),
    #[error("failed to load quiz content: {0}")]
    LoadFailure(#[source] StorageError),
    #[error("attempt already submitted")]
    AlreadySubmitted,
    #[error("attempt is being submitted")]
    Finalizing,
    #[error("attempt has not been submitted yet")]
    NotSubmitted,
    #[error("question {0} is not part of this set")]
    UnknownQuestion(QuestionId),
    #[error("option {option} is not an option of question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Domain(#[from] quiz_core::Error),
}

impl From<QuizError> for AttemptError {
    fn from(value: QuizError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<quiz_core::model::AttemptError> for AttemptError {
    fn from(value: quiz_core::model::AttemptError) -> Self {
        Self::Domain(value.into())
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Drafts(#[from] DraftStoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

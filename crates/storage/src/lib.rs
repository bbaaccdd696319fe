#![forbid(unsafe_code)]

pub mod drafts;
pub mod repository;
pub mod sqlite;

pub use drafts::{DraftKey, DraftStore, DraftStoreError, FileDraftStore, InMemoryDraftStore, LocalDraft};
pub use repository::{
    ActivityRepository, AnswerRepository, AttemptRepository, FinalizeWrite, InMemoryRepository,
    QuizRepository, Storage, StorageError,
};

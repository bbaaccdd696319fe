use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::UserId;
use storage::repository::{ActivityRepository, StorageError};

/// Bookkeeping that runs after an attempt is submitted.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` when the completion cannot be recorded.
    async fn record_completion(
        &self,
        user_id: UserId,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Counts completions per UTC day in the activity table.
#[derive(Clone)]
pub struct DailyActivity {
    repository: Arc<dyn ActivityRepository>,
}

impl DailyActivity {
    #[must_use]
    pub fn new(repository: Arc<dyn ActivityRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl ActivityRecorder for DailyActivity {
    async fn record_completion(
        &self,
        user_id: UserId,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let day = submitted_at.date_naive();
        let completed = self.repository.record_completion(user_id, day).await?;
        tracing::debug!(user_id = %user_id, %day, completed, "daily activity recorded");
        Ok(())
    }
}

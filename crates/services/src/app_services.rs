use std::path::Path;
use std::sync::Arc;

use storage::drafts::{DraftStore, FileDraftStore};
use storage::repository::Storage;

use crate::Clock;
use crate::attempts::AttemptService;
use crate::error::AppServicesError;
use crate::settings::EngineSettings;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    attempts: Arc<AttemptService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and a directory of JSON drafts.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// draft directory cannot be created.
    pub async fn new_sqlite(
        db_url: &str,
        draft_dir: &Path,
        clock: Clock,
        settings: EngineSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let drafts: Arc<dyn DraftStore> = Arc::new(FileDraftStore::open(draft_dir)?);
        tracing::debug!(db_url, draft_dir = %draft_dir.display(), "app services ready");
        Ok(Self::from_storage(&storage, drafts, clock, settings))
    }

    #[must_use]
    pub fn from_storage(
        storage: &Storage,
        drafts: Arc<dyn DraftStore>,
        clock: Clock,
        settings: EngineSettings,
    ) -> Self {
        let attempts = Arc::new(AttemptService::new(clock, storage, drafts).with_settings(settings));
        Self { attempts }
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }
}

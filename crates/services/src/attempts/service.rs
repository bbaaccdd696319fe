use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{Attempt, SetId, UserId};
use quiz_core::streak::current_streak;
use storage::drafts::DraftStore;
use storage::repository::{
    ActivityRepository, AnswerRepository, AttemptRepository, QuizRepository, Storage,
};

use super::activity::{ActivityRecorder, DailyActivity};
use super::loader::QuizLoader;
use super::session::AttemptSession;
use crate::error::AttemptError;
use crate::settings::EngineSettings;

/// How many activity days are scanned when computing a streak.
const STREAK_WINDOW_DAYS: u32 = 366;

/// Storage-backed entry point for attempts.
#[derive(Clone)]
pub struct AttemptService {
    clock: Clock,
    settings: EngineSettings,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
    activity: Arc<dyn ActivityRepository>,
    recorder: Arc<dyn ActivityRecorder>,
    drafts: Arc<dyn DraftStore>,
}

impl AttemptService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, drafts: Arc<dyn DraftStore>) -> Self {
        Self {
            clock,
            settings: EngineSettings::default(),
            quizzes: Arc::clone(&storage.quizzes),
            attempts: Arc::clone(&storage.attempts),
            answers: Arc::clone(&storage.answers),
            activity: Arc::clone(&storage.activity),
            recorder: Arc::new(DailyActivity::new(Arc::clone(&storage.activity))),
            drafts,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the post-submit bookkeeping collaborator.
    #[must_use]
    pub fn with_activity_recorder(mut self, recorder: Arc<dyn ActivityRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    fn loader(&self) -> QuizLoader {
        QuizLoader::new(
            self.clock,
            Arc::clone(&self.quizzes),
            Arc::clone(&self.attempts),
            Arc::clone(&self.answers),
            Arc::clone(&self.drafts),
        )
    }

    /// Opens (resumes or starts) an attempt and returns the live session.
    ///
    /// # Errors
    ///
    /// See [`QuizLoader::load`].
    pub async fn open(
        &self,
        user_id: UserId,
        set_id: SetId,
        attempt_hint: Option<&str>,
    ) -> Result<Arc<AttemptSession>, AttemptError> {
        let loaded = self.loader().load(user_id, set_id, attempt_hint).await?;
        Ok(AttemptSession::open(
            loaded,
            Arc::clone(&self.attempts),
            Arc::clone(&self.answers),
            Arc::clone(&self.recorder),
            self.settings,
            self.clock,
        ))
    }

    /// Previous attempts of `user_id` on `set_id`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` on backend failures.
    pub async fn history(
        &self,
        user_id: UserId,
        set_id: SetId,
        limit: u32,
    ) -> Result<Vec<Attempt>, AttemptError> {
        Ok(self.attempts.list_attempts(user_id, set_id, limit).await?)
    }

    /// Consecutive days (ending today or yesterday) with a completed attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` on backend failures.
    pub async fn streak(&self, user_id: UserId) -> Result<u32, AttemptError> {
        let days = self
            .activity
            .activity_days(user_id, STREAK_WINDOW_DAYS)
            .await?;
        Ok(current_streak(&days, self.clock.now().date_naive()))
    }
}

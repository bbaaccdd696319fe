use async_trait::async_trait;
use chrono::NaiveDate;
use quiz_core::model::{
    AnswerOption, AnswerRecord, Attempt, AttemptId, Question, QuestionId, QuizSet, SetId,
    Submission, UserId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of a conditional finalize write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeWrite {
    /// This call moved the attempt from in-progress to submitted.
    Applied,
    /// An earlier write already submitted the attempt; carries the stored outcome.
    AlreadySubmitted(Submission),
}

/// Read access to quiz content plus the writes used for seeding.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or update a quiz set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the set cannot be stored.
    async fn upsert_set(&self, set: &QuizSet) -> Result<(), StorageError>;

    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Persist or update an answer option.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the option cannot be stored.
    async fn upsert_option(&self, option: &AnswerOption) -> Result<(), StorageError>;

    /// Fetch a quiz set by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing set is `Ok(None)`.
    async fn get_set(&self, id: SetId) -> Result<Option<QuizSet>, StorageError>;

    /// Questions of a set ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn questions_for_set(&self, set_id: SetId) -> Result<Vec<Question>, StorageError>;

    /// All options of every question of a set, ordered by question then position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn options_for_set(&self, set_id: SetId) -> Result<Vec<AnswerOption>, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Fetch an attempt only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing or foreign attempt is `Ok(None)`.
    async fn get_attempt_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<Attempt>, StorageError>;

    /// Move an in-progress attempt to submitted.
    ///
    /// The write is conditional on the stored status so repeating it is safe.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn finalize_attempt(
        &self,
        id: AttemptId,
        submission: &Submission,
    ) -> Result<FinalizeWrite, StorageError>;

    /// Attempts of a user for a set, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts(
        &self,
        user_id: UserId,
        set_id: SetId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Insert or replace the selection for `(attempt_id, question_id)`.
    ///
    /// A record older than the stored one is ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn answers_for_attempt(&self, id: AttemptId)
    -> Result<Vec<AnswerRecord>, StorageError>;
}

/// Daily-activity bookkeeping used for study streaks.
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Count one completed attempt for `user_id` on `day`. Returns the day's total.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the counter cannot be updated.
    async fn record_completion(&self, user_id: UserId, day: NaiveDate)
    -> Result<u32, StorageError>;

    /// Days with at least one completion, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn activity_days(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError>;
}

/// Switches for simulating backend failures in tests.
#[derive(Debug, Default)]
struct Faults {
    answer_writes: AtomicBool,
    content_reads: AtomicBool,
    finalize_failures: AtomicU32,
    activity_writes: AtomicBool,
}

fn injected() -> StorageError {
    StorageError::Connection("injected failure".into())
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sets: Arc<Mutex<HashMap<SetId, QuizSet>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    options: Arc<Mutex<Vec<AnswerOption>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    answers: Arc<Mutex<HashMap<(AttemptId, QuestionId), AnswerRecord>>>,
    activity: Arc<Mutex<HashMap<(UserId, NaiveDate), u32>>>,
    faults: Arc<Faults>,
    finalize_writes: Arc<AtomicUsize>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent answer upsert fail (or succeed again).
    pub fn fail_answer_writes(&self, fail: bool) {
        self.faults.answer_writes.store(fail, Ordering::SeqCst);
    }

    /// Make question/option reads fail (or succeed again).
    pub fn fail_content_reads(&self, fail: bool) {
        self.faults.content_reads.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` finalize writes fail.
    pub fn fail_next_finalizes(&self, count: u32) {
        self.faults.finalize_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_activity_writes(&self, fail: bool) {
        self.faults.activity_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of finalize writes that actually transitioned an attempt.
    #[must_use]
    pub fn applied_finalizes(&self) -> usize {
        self.finalize_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_set(&self, set: &QuizSet) -> Result<(), StorageError> {
        let mut guard = self.sets.lock().map_err(poisoned)?;
        guard.insert(set.id(), set.clone());
        Ok(())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        guard.insert(question.id, question.clone());
        Ok(())
    }

    async fn upsert_option(&self, option: &AnswerOption) -> Result<(), StorageError> {
        let mut guard = self.options.lock().map_err(poisoned)?;
        guard.retain(|o| o.id != option.id);
        guard.push(option.clone());
        Ok(())
    }

    async fn get_set(&self, id: SetId) -> Result<Option<QuizSet>, StorageError> {
        let guard = self.sets.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn questions_for_set(&self, set_id: SetId) -> Result<Vec<Question>, StorageError> {
        if self.faults.content_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let guard = self.questions.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .values()
            .filter(|q| q.set_id == set_id)
            .cloned()
            .collect();
        out.sort_by_key(|q| (q.position, q.id));
        Ok(out)
    }

    async fn options_for_set(&self, set_id: SetId) -> Result<Vec<AnswerOption>, StorageError> {
        if self.faults.content_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let questions = self.questions.lock().map_err(poisoned)?;
        let guard = self.options.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .iter()
            .filter(|o| {
                questions
                    .get(&o.question_id)
                    .is_some_and(|q| q.set_id == set_id)
            })
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.question_id, o.position, o.id));
        Ok(out)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        if guard.contains_key(&attempt.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn get_attempt_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard.get(&id).filter(|a| a.user_id() == user_id).cloned())
    }

    async fn finalize_attempt(
        &self,
        id: AttemptId,
        submission: &Submission,
    ) -> Result<FinalizeWrite, StorageError> {
        let pending = self.faults.finalize_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.faults
                .finalize_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(injected());
        }

        let mut guard = self.attempts.lock().map_err(poisoned)?;
        let attempt = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        if let Some(stored) = attempt.submission() {
            return Ok(FinalizeWrite::AlreadySubmitted(stored.clone()));
        }
        attempt
            .submit(submission.clone())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.finalize_writes.fetch_add(1, Ordering::SeqCst);
        Ok(FinalizeWrite::Applied)
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        set_id: SetId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .values()
            .filter(|a| a.belongs_to(user_id, set_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        if self.faults.answer_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut guard = self.answers.lock().map_err(poisoned)?;
        let key = (record.attempt_id, record.question_id);
        let stale = guard
            .get(&key)
            .is_some_and(|existing| existing.updated_at > record.updated_at);
        if !stale {
            guard.insert(key, record.clone());
        }
        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        id: AttemptId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self.answers.lock().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .values()
            .filter(|r| r.attempt_id == id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.question_id);
        Ok(out)
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn record_completion(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<u32, StorageError> {
        if self.faults.activity_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut guard = self.activity.lock().map_err(poisoned)?;
        let count = guard.entry((user_id, day)).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn activity_days(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let guard = self.activity.lock().map_err(poisoned)?;
        let mut days: Vec<_> = guard
            .iter()
            .filter(|((user, _), count)| *user == user_id && **count > 0)
            .map(|((_, day), _)| *day)
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(days)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub activity: Arc<dyn ActivityRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Wraps an existing in-memory repository so tests keep a handle for
    /// fault injection.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        Self {
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            activity: Arc::new(repo.clone()),
        }
    }
}

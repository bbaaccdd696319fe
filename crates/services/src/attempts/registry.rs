use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use quiz_core::model::{AnswerRecord, AttemptId, OptionId, QuestionId, QuizContent};
use quiz_core::{Clock, Deadline};
use storage::repository::{AnswerRepository, StorageError};
use tokio::task::JoinHandle;

use super::draft::DraftCache;
use super::latch::AttemptLatch;
use crate::error::AttemptError;

/// Background upsert of one answer. Dropping it detaches the write.
#[derive(Debug)]
pub struct PersistTask {
    handle: Option<JoinHandle<bool>>,
}

impl PersistTask {
    fn skipped() -> Self {
        Self { handle: None }
    }

    /// Waits for the write. `true` when the server accepted it.
    pub async fn wait(self) -> bool {
        match self.handle {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        }
    }
}

/// Outcome of [`AnswerRegistry::choose`].
#[derive(Debug)]
pub enum Selection {
    Recorded(PersistTask),
    /// The attempt no longer accepts answers.
    Ignored,
}

impl Selection {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Selection::Recorded(_))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    answers: HashMap<QuestionId, OptionId>,
    flags: HashSet<QuestionId>,
    last_stamp: Option<DateTime<Utc>>,
}

/// In-memory source of truth for selections and flags of one attempt.
///
/// Mutations land in memory and in the local draft before any network call
/// starts; the server upsert runs as a detached task whose failure is only
/// logged.
///
/// The latch is checked under the state lock, and the finalizer snapshots
/// under the same lock after claiming it, so every accepted answer is scored.
pub struct AnswerRegistry {
    attempt_id: AttemptId,
    content: Arc<QuizContent>,
    deadline: Option<Deadline>,
    state: Mutex<RegistryState>,
    draft: DraftCache,
    answers: Arc<dyn AnswerRepository>,
    latch: Arc<AttemptLatch>,
    clock: Clock,
}

impl AnswerRegistry {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempt_id: AttemptId,
        content: Arc<QuizContent>,
        deadline: Option<Deadline>,
        answers: HashMap<QuestionId, OptionId>,
        flags: HashSet<QuestionId>,
        draft: DraftCache,
        repository: Arc<dyn AnswerRepository>,
        latch: Arc<AttemptLatch>,
        clock: Clock,
    ) -> Self {
        Self {
            attempt_id,
            content,
            deadline,
            state: Mutex::new(RegistryState {
                answers,
                flags,
                last_stamp: None,
            }),
            draft,
            answers: repository,
            latch,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_question(&self, question: QuestionId) -> Result<(), AttemptError> {
        if self.content.contains_question(question) {
            Ok(())
        } else {
            Err(AttemptError::UnknownQuestion(question))
        }
    }

    fn past_deadline(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| deadline.is_expired(self.clock.now()))
    }

    /// Selects `option` for `question`.
    ///
    /// Once the attempt is submitting or submitted, or its deadline has
    /// passed, the call is a no-op and returns `Selection::Ignored`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` or `AttemptError::UnknownOption`
    /// when the pair is not part of the set.
    pub fn choose(
        &self,
        question: QuestionId,
        option: OptionId,
    ) -> Result<Selection, AttemptError> {
        self.check_question(question)?;
        if self.content.option(question, option).is_none() {
            return Err(AttemptError::UnknownOption { question, option });
        }

        let record = {
            let mut state = self.lock();
            if !self.latch.is_open() || self.past_deadline() {
                tracing::debug!(attempt_id = %self.attempt_id, question_id = %question, "answer ignored; attempt closed");
                return Ok(Selection::Ignored);
            }
            state.answers.insert(question, option);
            let stamp = self.next_stamp(&mut state);
            self.draft.snapshot(&state.answers, &state.flags);
            AnswerRecord {
                attempt_id: self.attempt_id,
                question_id: question,
                selected_option_id: option,
                updated_at: stamp,
            }
        };

        Ok(Selection::Recorded(self.persist(record)))
    }

    /// Re-sends the current selection of each listed question.
    pub fn resync(&self, questions: &[QuestionId]) -> Vec<PersistTask> {
        let mut records = Vec::with_capacity(questions.len());
        {
            let mut state = self.lock();
            for question in questions {
                let Some(option) = state.answers.get(question).copied() else {
                    continue;
                };
                let updated_at = self.next_stamp(&mut state);
                records.push(AnswerRecord {
                    attempt_id: self.attempt_id,
                    question_id: *question,
                    selected_option_id: option,
                    updated_at,
                });
            }
        }
        records.into_iter().map(|r| self.persist(r)).collect()
    }

    /// Strictly increasing per registry so rapid re-selections keep their order.
    fn next_stamp(&self, state: &mut RegistryState) -> DateTime<Utc> {
        let now = self.clock.now();
        let stamp = match state.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        state.last_stamp = Some(stamp);
        stamp
    }

    fn persist(&self, record: AnswerRecord) -> PersistTask {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(attempt_id = %record.attempt_id, "no runtime; answer kept in draft only");
            return PersistTask::skipped();
        };
        let repository = Arc::clone(&self.answers);
        let handle = runtime.spawn(async move {
            match repository.upsert_answer(&record).await {
                Ok(()) => {
                    tracing::debug!(
                        attempt_id = %record.attempt_id,
                        question_id = %record.question_id,
                        "answer persisted"
                    );
                    true
                }
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %record.attempt_id,
                        question_id = %record.question_id,
                        error = %err,
                        "answer persist failed; draft keeps it"
                    );
                    false
                }
            }
        });
        PersistTask {
            handle: Some(handle),
        }
    }

    /// Sets the flag on `question`. Returns `false` once the attempt is closed.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn flag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.set_flag(question, Some(true))
    }

    /// Clears the flag on `question`. Returns `false` once the attempt is closed.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn unflag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.set_flag(question, Some(false))
    }

    /// Flips the flag on `question`. Returns `false` once the attempt is closed.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn toggle_flag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.set_flag(question, None)
    }

    fn set_flag(&self, question: QuestionId, flagged: Option<bool>) -> Result<bool, AttemptError> {
        self.check_question(question)?;
        let mut state = self.lock();
        if !self.latch.is_open() {
            return Ok(false);
        }
        let flagged = flagged.unwrap_or_else(|| !state.flags.contains(&question));
        if flagged {
            state.flags.insert(question);
        } else {
            state.flags.remove(&question);
        }
        self.draft.snapshot(&state.answers, &state.flags);
        Ok(true)
    }

    #[must_use]
    pub fn selected(&self, question: QuestionId) -> Option<OptionId> {
        self.lock().answers.get(&question).copied()
    }

    #[must_use]
    pub fn is_flagged(&self, question: QuestionId) -> bool {
        self.lock().flags.contains(&question)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.lock().answers.len()
    }

    #[must_use]
    pub fn flagged_count(&self) -> usize {
        self.lock().flags.len()
    }

    /// Replaces the local answers with the server's record, keeping only pairs
    /// that belong to the set. Used when another writer submitted the attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the answers cannot be read; local answers
    /// are kept in that case.
    pub async fn adopt_server_answers(&self) -> Result<(), StorageError> {
        let records = self.answers.answers_for_attempt(self.attempt_id).await?;
        let answers: HashMap<_, _> = records
            .into_iter()
            .filter(|r| self.content.option(r.question_id, r.selected_option_id).is_some())
            .map(|r| (r.question_id, r.selected_option_id))
            .collect();
        self.lock().answers = answers;
        Ok(())
    }

    /// Copies of the current answers and flags.
    #[must_use]
    pub fn snapshot(&self) -> (HashMap<QuestionId, OptionId>, HashSet<QuestionId>) {
        let state = self.lock();
        (state.answers.clone(), state.flags.clone())
    }
}

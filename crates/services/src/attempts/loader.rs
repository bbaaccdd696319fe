use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{
    Attempt, AttemptId, OptionId, QuestionId, QuizContent, SetId, UserId,
};
use storage::drafts::{DraftKey, DraftStore};
use storage::repository::{AnswerRepository, AttemptRepository, QuizRepository};

use super::draft::DraftCache;
use crate::error::AttemptError;

/// Everything needed to run an attempt session.
pub struct LoadedAttempt {
    pub content: Arc<QuizContent>,
    pub attempt: Attempt,
    /// Server answers, plus draft answers for the questions the server lacks.
    pub answers: HashMap<QuestionId, OptionId>,
    pub flags: HashSet<QuestionId>,
    /// Questions whose answer came from the local draft.
    pub draft_filled: Vec<QuestionId>,
    /// `true` when an existing attempt was adopted from the hint.
    pub resumed: bool,
    pub draft: DraftCache,
}

/// Fetches quiz content and resumes or creates the attempt.
#[derive(Clone)]
pub struct QuizLoader {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
    drafts: Arc<dyn DraftStore>,
}

impl QuizLoader {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        answers: Arc<dyn AnswerRepository>,
        drafts: Arc<dyn DraftStore>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            attempts,
            answers,
            drafts,
        }
    }

    /// Loads `set_id` for `user_id`.
    ///
    /// `attempt_hint` is an untrusted attempt id (for example from a resume
    /// link). It is adopted only when it parses, exists, belongs to the user
    /// and targets the same set; otherwise a fresh attempt is created.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotFound` for an unknown set,
    /// `AttemptError::LoadFailure` when content, attempt or answers cannot be
    /// read, `AttemptError::Domain` for inconsistent content and
    /// `AttemptError::Storage` when a new attempt cannot be created.
    pub async fn load(
        &self,
        user_id: UserId,
        set_id: SetId,
        attempt_hint: Option<&str>,
    ) -> Result<LoadedAttempt, AttemptError> {
        let (set, questions, options) = tokio::try_join!(
            self.quizzes.get_set(set_id),
            self.quizzes.questions_for_set(set_id),
            self.quizzes.options_for_set(set_id),
        )
        .map_err(AttemptError::LoadFailure)?;
        let set = set.ok_or(AttemptError::NotFound(set_id))?;
        let content = Arc::new(QuizContent::assemble(set, questions, options)?);

        let (attempt, resumed) = match self.resolve_hint(user_id, set_id, attempt_hint).await? {
            Some(attempt) => (attempt, true),
            None => (self.create(user_id, set_id).await?, false),
        };

        let draft = DraftCache::new(
            Arc::clone(&self.drafts),
            DraftKey::new(set_id, attempt.id()),
            self.clock,
        );

        let mut answers = if resumed {
            self.server_answers(&content, attempt.id()).await?
        } else {
            HashMap::new()
        };

        let mut flags = HashSet::new();
        let mut draft_filled = Vec::new();
        if attempt.is_submitted() {
            // Anything left locally predates the submission.
            draft.purge();
        } else if let Some(local) = draft.restore() {
            draft_filled = DraftCache::merge_gaps(&local, &content, &mut answers);
            flags = DraftCache::restore_flags(&local, &content);
        }

        tracing::info!(
            attempt_id = %attempt.id(),
            set_id = %set_id,
            resumed,
            status = attempt.status().as_str(),
            answered = answers.len(),
            draft_filled = draft_filled.len(),
            "attempt loaded"
        );

        Ok(LoadedAttempt {
            content,
            attempt,
            answers,
            flags,
            draft_filled,
            resumed,
            draft,
        })
    }

    async fn resolve_hint(
        &self,
        user_id: UserId,
        set_id: SetId,
        hint: Option<&str>,
    ) -> Result<Option<Attempt>, AttemptError> {
        let Some(raw) = hint.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        let id: AttemptId = match raw.parse() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(hint = raw, error = %err, "ignoring malformed attempt id");
                return Ok(None);
            }
        };

        let found = self
            .attempts
            .get_attempt_for_user(id, user_id)
            .await
            .map_err(AttemptError::LoadFailure)?;
        match found {
            Some(attempt) if attempt.belongs_to(user_id, set_id) => Ok(Some(attempt)),
            Some(_) => {
                tracing::warn!(attempt_id = %id, set_id = %set_id, "attempt belongs to another set");
                Ok(None)
            }
            None => {
                tracing::warn!(attempt_id = %id, "attempt not found for user");
                Ok(None)
            }
        }
    }

    async fn create(&self, user_id: UserId, set_id: SetId) -> Result<Attempt, AttemptError> {
        let attempt = Attempt::start(AttemptId::generate(), user_id, set_id, self.clock.now());
        self.attempts.create_attempt(&attempt).await?;
        tracing::info!(attempt_id = %attempt.id(), set_id = %set_id, "attempt created");
        Ok(attempt)
    }

    async fn server_answers(
        &self,
        content: &QuizContent,
        attempt_id: AttemptId,
    ) -> Result<HashMap<QuestionId, OptionId>, AttemptError> {
        let records = self
            .answers
            .answers_for_attempt(attempt_id)
            .await
            .map_err(AttemptError::LoadFailure)?;

        let mut answers = HashMap::with_capacity(records.len());
        for record in records {
            if content
                .option(record.question_id, record.selected_option_id)
                .is_some()
            {
                answers.insert(record.question_id, record.selected_option_id);
            } else {
                tracing::warn!(
                    attempt_id = %attempt_id,
                    question_id = %record.question_id,
                    "dropping answer that no longer matches the set"
                );
            }
        }
        Ok(answers)
    }
}

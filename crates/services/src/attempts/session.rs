use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use quiz_core::model::{
    Attempt, AttemptId, AttemptStatus, OptionId, OptionView, QuestionId, QuizContent, SetId,
    Submission, SubmitReason,
};
use quiz_core::review::{self, ReviewCounts, ReviewFilter, ReviewItem};
use quiz_core::{Clock, Deadline};
use storage::repository::{AnswerRepository, AttemptRepository};
use tokio::sync::watch;

use super::activity::ActivityRecorder;
use super::deadline::DeadlineClock;
use super::finalizer::Finalizer;
use super::latch::{AttemptLatch, LatchState};
use super::loader::LoadedAttempt;
use super::registry::{AnswerRegistry, PersistTask, Selection};
use crate::error::AttemptError;
use crate::settings::EngineSettings;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// Snapshot of an attempt in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptProgress {
    pub status: AttemptStatus,
    pub total: u32,
    pub answered: u32,
    pub flagged: u32,
    /// `None` for untimed sets.
    pub remaining: Option<Duration>,
}

/// A question as shown to the student. Correctness and the explanation are
/// only filled in once the attempt is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub position: u32,
    pub prompt: String,
    pub explanation: Option<String>,
    pub options: Vec<OptionView>,
    pub selected: Option<OptionId>,
    pub flagged: bool,
}

/// Post-submission results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReview {
    pub submission: Submission,
    pub filter: ReviewFilter,
    /// Items matching `filter`, in question order.
    pub items: Vec<ReviewItem>,
    /// Counts over all questions, regardless of `filter`.
    pub counts: ReviewCounts,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A live attempt: content, answers, the deadline clock and the finalizer.
///
/// Sessions are shared behind `Arc`; the deadline clock only holds a weak
/// reference, so dropping the last `Arc` stops the clock.
pub struct AttemptSession {
    content: Arc<QuizContent>,
    attempt: Mutex<Attempt>,
    deadline: Option<Deadline>,
    latch: Arc<AttemptLatch>,
    registry: AnswerRegistry,
    finalizer: Finalizer,
    clock_handle: Mutex<DeadlineClock>,
    draft_filled: Vec<QuestionId>,
    resumed: bool,
    pending_resync: Mutex<Vec<PersistTask>>,
    settings: EngineSettings,
    clock: Clock,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AttemptSession {
    /// Wires a loaded attempt into a running session.
    ///
    /// Starts the deadline clock for timed in-progress attempts (an already
    /// expired deadline submits right away) and, when enabled, re-sends
    /// answers recovered from the local draft.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime for a timed attempt.
    #[must_use]
    pub fn open(
        loaded: LoadedAttempt,
        attempts: Arc<dyn AttemptRepository>,
        answers: Arc<dyn AnswerRepository>,
        activity: Arc<dyn ActivityRecorder>,
        settings: EngineSettings,
        clock: Clock,
    ) -> Arc<Self> {
        let LoadedAttempt {
            content,
            attempt,
            answers: selected,
            flags,
            draft_filled,
            resumed,
            draft,
        } = loaded;

        let deadline = Deadline::for_attempt(attempt.started_at(), content.set().time_limit_minutes());
        let latch = Arc::new(AttemptLatch::new(attempt.is_submitted()));
        let registry = AnswerRegistry::new(
            attempt.id(),
            Arc::clone(&content),
            deadline,
            selected,
            flags,
            draft.clone(),
            answers,
            Arc::clone(&latch),
            clock,
        );
        let finalizer = Finalizer::new(
            attempt.id(),
            attempt.user_id(),
            attempt.started_at(),
            deadline,
            Arc::clone(&content),
            attempts,
            activity,
            draft,
            Arc::clone(&latch),
            clock,
        );

        let session = Arc::new(Self {
            content,
            attempt: Mutex::new(attempt),
            deadline,
            latch,
            registry,
            finalizer,
            clock_handle: Mutex::new(DeadlineClock::disabled()),
            draft_filled,
            resumed,
            pending_resync: Mutex::new(Vec::new()),
            settings,
            clock,
        });

        if session.latch.is_open() {
            if settings.resync_draft_answers() && !session.draft_filled.is_empty() {
                let tasks = session.registry.resync(&session.draft_filled);
                *lock(&session.pending_resync) = tasks;
            }
            session.arm();
        }
        session
    }

    fn arm(self: &Arc<Self>) {
        let Some(deadline) = self.deadline else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let clock = DeadlineClock::start(
            deadline,
            self.clock,
            self.settings.tick_interval(),
            move || async move {
                if let Some(session) = weak.upgrade() {
                    session.expire().await;
                }
            },
        );
        *lock(&self.clock_handle) = clock;
    }

    /// Auto-submit path. Retries failed writes a bounded number of times.
    ///
    /// A submit already in flight is waited out; if its write fails the
    /// expiry takes over.
    async fn expire(&self) {
        let retries = self.settings.finalize_retries();
        let mut attempt_no = 0_u32;
        loop {
            match self.finalize(SubmitReason::Timeup).await {
                Ok(_) | Err(AttemptError::AlreadySubmitted) => return,
                Err(AttemptError::Finalizing) => {
                    if self.latch.settled().await == LatchState::Submitted {
                        return;
                    }
                    tracing::info!(
                        attempt_id = %self.attempt_id(),
                        "concurrent submit failed; auto-submit takes over"
                    );
                }
                Err(err) if attempt_no < retries => {
                    attempt_no += 1;
                    tracing::warn!(
                        attempt_id = %self.attempt_id(),
                        retry = attempt_no,
                        error = %err,
                        "auto-submit failed; retrying"
                    );
                    tokio::time::sleep(self.settings.finalize_retry_delay()).await;
                }
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %self.attempt_id(),
                        error = %err,
                        "auto-submit gave up; attempt stays in progress"
                    );
                    return;
                }
            }
        }
    }

    async fn finalize(&self, reason: SubmitReason) -> Result<Submission, AttemptError> {
        let finalized = self.finalizer.finalize(&self.registry, reason).await?;
        lock(&self.clock_handle).stop();
        if !finalized.applied {
            if let Err(err) = self.registry.adopt_server_answers().await {
                tracing::warn!(attempt_id = %self.attempt_id(), error = %err, "review may show local answers");
            }
        }

        let mut attempt = lock(&self.attempt);
        if !attempt.is_submitted() {
            if let Err(err) = attempt.submit(finalized.submission.clone()) {
                tracing::warn!(attempt_id = %attempt.id(), error = %err, "stored submission rejected locally");
            }
        }
        Ok(finalized.submission)
    }

    /// Manual submit.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted`/`AttemptError::Finalizing` when
    /// another submit won, or `AttemptError::Storage` when the write failed
    /// (the attempt stays in progress and the call may be repeated).
    pub async fn submit(&self) -> Result<Submission, AttemptError> {
        self.finalize(SubmitReason::Manual).await
    }

    /// # Errors
    ///
    /// See [`AnswerRegistry::choose`].
    pub fn choose(&self, question: QuestionId, option: OptionId) -> Result<Selection, AttemptError> {
        self.registry.choose(question, option)
    }

    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn flag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.registry.flag(question)
    }

    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn unflag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.registry.unflag(question)
    }

    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn toggle_flag(&self, question: QuestionId) -> Result<bool, AttemptError> {
        self.registry.toggle_flag(question)
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        lock(&self.attempt).id()
    }

    #[must_use]
    pub fn set_id(&self) -> SetId {
        self.content.set().id()
    }

    /// Copy of the attempt as currently known to this session.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        lock(&self.attempt).clone()
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        lock(&self.attempt).status()
    }

    #[must_use]
    pub fn content(&self) -> &QuizContent {
        &self.content
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    #[must_use]
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn draft_filled(&self) -> &[QuestionId] {
        &self.draft_filled
    }

    /// Background re-sends of draft-recovered answers started at open.
    #[must_use]
    pub fn take_resync_tasks(&self) -> Vec<PersistTask> {
        std::mem::take(&mut *lock(&self.pending_resync))
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        lock(&self.clock_handle).is_running()
    }

    /// Time left before auto-submit; `None` for untimed sets.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.deadline?;
        if self.latch.is_submitted() {
            return Some(Duration::ZERO);
        }
        lock(&self.clock_handle).remaining().or_else(|| {
            deadline
                .remaining(self.clock.now())
                .to_std()
                .ok()
        })
    }

    /// Receives every tick of the deadline clock.
    #[must_use]
    pub fn subscribe_remaining(&self) -> Option<watch::Receiver<Duration>> {
        lock(&self.clock_handle).subscribe()
    }

    #[must_use]
    pub fn progress(&self) -> AttemptProgress {
        AttemptProgress {
            status: self.status(),
            total: self.content.total_questions(),
            answered: u32::try_from(self.registry.answered_count()).unwrap_or(u32::MAX),
            flagged: u32::try_from(self.registry.flagged_count()).unwrap_or(u32::MAX),
            remaining: self.remaining(),
        }
    }

    /// # Errors
    ///
    /// Returns `AttemptError::UnknownQuestion` for a question outside the set.
    pub fn question_view(&self, question: QuestionId) -> Result<QuestionView, AttemptError> {
        let q = self
            .content
            .question(question)
            .ok_or(AttemptError::UnknownQuestion(question))?;
        let reveal = self.latch.is_submitted();
        Ok(QuestionView {
            id: q.id,
            position: q.position,
            prompt: q.prompt.clone(),
            explanation: if reveal { q.explanation.clone() } else { None },
            options: self
                .content
                .options_for(q.id)
                .iter()
                .map(|o| OptionView::from_option(o, reveal))
                .collect(),
            selected: self.registry.selected(q.id),
            flagged: self.registry.is_flagged(q.id),
        })
    }

    /// Every question of the set, in order.
    #[must_use]
    pub fn question_views(&self) -> Vec<QuestionView> {
        self.content
            .questions()
            .iter()
            .filter_map(|q| self.question_view(q.id).ok())
            .collect()
    }

    /// Classifies each question once the attempt is submitted.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotSubmitted` while the attempt is in progress.
    pub fn review(&self, filter: ReviewFilter) -> Result<AttemptReview, AttemptError> {
        let submission = lock(&self.attempt)
            .submission()
            .cloned()
            .ok_or(AttemptError::NotSubmitted)?;
        let (answers, flags) = self.registry.snapshot();
        let all = review::project(&self.content, &answers, &flags);
        let counts = review::counts(&all);
        let items = review::filter_items(&all, filter)
            .into_iter()
            .cloned()
            .collect();
        Ok(AttemptReview {
            submission,
            filter,
            items,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempts::activity::DailyActivity;
    use crate::attempts::fixtures::{oid, qid, seed};
    use crate::attempts::loader::QuizLoader;
    use quiz_core::review::QuestionOutcome;
    use quiz_core::time::fixed_clock;
    use storage::drafts::InMemoryDraftStore;
    use storage::repository::InMemoryRepository;

    async fn open(repo: &InMemoryRepository, limit: Option<u32>) -> Arc<AttemptSession> {
        let set_id = seed(repo, limit).await;
        let loaded = QuizLoader::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(InMemoryDraftStore::new()),
        )
        .load(quiz_core::model::UserId::new(1), set_id, None)
        .await
        .unwrap();
        AttemptSession::open(
            loaded,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(DailyActivity::new(Arc::new(repo.clone()))),
            EngineSettings::default(),
            fixed_clock(),
        )
    }

    #[tokio::test]
    async fn options_hide_correctness_until_submitted() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, None).await;

        let before = session.question_view(qid(1)).unwrap();
        assert!(before.options.iter().all(|o| o.is_correct.is_none()));
        assert!(before.explanation.is_none());

        session.submit().await.unwrap();
        let after = session.question_view(qid(1)).unwrap();
        assert_eq!(after.options[0].is_correct, Some(true));
        assert!(after.explanation.is_some());
    }

    #[tokio::test]
    async fn review_requires_submission_and_classifies_questions() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, None).await;
        session.choose(qid(1), oid(1, 0)).unwrap();
        session.choose(qid(2), oid(2, 1)).unwrap();
        session.flag(qid(3)).unwrap();

        assert!(matches!(
            session.review(ReviewFilter::All),
            Err(AttemptError::NotSubmitted)
        ));
        session.submit().await.unwrap();

        let review = session.review(ReviewFilter::Wrong).unwrap();
        assert_eq!(review.items.len(), 1);
        assert_eq!(review.items[0].question_id, qid(2));
        assert_eq!(review.counts.correct, 1);
        assert_eq!(review.counts.unanswered, 3);
        assert_eq!(review.counts.flagged, 1);

        let flagged = session.review(ReviewFilter::Flagged).unwrap();
        assert_eq!(flagged.items[0].outcome, QuestionOutcome::Unanswered);
    }

    #[tokio::test]
    async fn progress_tracks_answers_and_flags() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, Some(20)).await;
        session.choose(qid(4), oid(4, 2)).unwrap();
        session.toggle_flag(qid(4)).unwrap();

        let progress = session.progress();
        assert_eq!(progress.total, 5);
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.flagged, 1);
        assert_eq!(progress.status, AttemptStatus::InProgress);
        assert!(progress.remaining.is_some());
        assert!(session.is_ticking());

        session.submit().await.unwrap();
        assert!(!session.is_ticking());
        assert_eq!(session.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answers_racing_submit_are_either_scored_or_ignored() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, None).await;

        let chooser = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for round in 0..500_u64 {
                    for q in 1..=5 {
                        let _ = session.choose(qid(q), oid(q, round % 2));
                    }
                }
            })
        };
        let submission = session.submit().await.unwrap();
        chooser.join().unwrap();

        let review = session.review(ReviewFilter::All).unwrap();
        assert_eq!(review.counts.correct, submission.score);
        assert_eq!(
            session.progress().answered,
            review.counts.correct + review.counts.wrong
        );
    }

    #[tokio::test]
    async fn answers_after_submit_are_ignored() {
        let repo = InMemoryRepository::new();
        let session = open(&repo, None).await;
        session.submit().await.unwrap();
        assert!(!session.choose(qid(1), oid(1, 0)).unwrap().is_recorded());
        assert_eq!(session.progress().answered, 0);
        assert!(matches!(
            session.submit().await,
            Err(AttemptError::AlreadySubmitted)
        ));
    }
}

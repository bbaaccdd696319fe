use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::{Clock, Deadline};
use quiz_core::model::{AttemptId, QuizContent, Submission, SubmitReason, UserId};
use quiz_core::scoring::build_submission;
use storage::repository::{AttemptRepository, FinalizeWrite};

use super::activity::ActivityRecorder;
use super::draft::DraftCache;
use super::latch::{AttemptLatch, LatchState};
use super::registry::AnswerRegistry;
use crate::error::AttemptError;

/// Result of a finalize call that reached storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub submission: Submission,
    /// `false` when another writer had already submitted the attempt; the
    /// stored outcome is returned instead of the local one.
    pub applied: bool,
}

/// One-shot transition of an attempt to submitted.
pub struct Finalizer {
    attempt_id: AttemptId,
    user_id: UserId,
    started_at: DateTime<Utc>,
    deadline: Option<Deadline>,
    content: Arc<QuizContent>,
    attempts: Arc<dyn AttemptRepository>,
    activity: Arc<dyn ActivityRecorder>,
    draft: DraftCache,
    latch: Arc<AttemptLatch>,
    clock: Clock,
}

impl Finalizer {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempt_id: AttemptId,
        user_id: UserId,
        started_at: DateTime<Utc>,
        deadline: Option<Deadline>,
        content: Arc<QuizContent>,
        attempts: Arc<dyn AttemptRepository>,
        activity: Arc<dyn ActivityRecorder>,
        draft: DraftCache,
        latch: Arc<AttemptLatch>,
        clock: Clock,
    ) -> Self {
        Self {
            attempt_id,
            user_id,
            started_at,
            deadline,
            content,
            attempts,
            activity,
            draft,
            latch,
            clock,
        }
    }

    /// Scores the registry's answers and writes the submission.
    ///
    /// The latch is claimed before the first await. On success the latch is
    /// completed and the local draft purged; activity bookkeeping runs last
    /// and its failure is only logged.
    ///
    /// A submit at or past the deadline is recorded as `Timeup`, and a
    /// `Timeup` submit is never stamped before the deadline.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` or `AttemptError::Finalizing`
    /// when the latch is already taken, and `AttemptError::Storage` when the
    /// write fails. A failed write releases the latch.
    pub async fn finalize(
        &self,
        registry: &AnswerRegistry,
        reason: SubmitReason,
    ) -> Result<Finalized, AttemptError> {
        self.latch.try_begin().map_err(|state| match state {
            LatchState::Finalizing => AttemptError::Finalizing,
            LatchState::Open | LatchState::Submitted => AttemptError::AlreadySubmitted,
        })?;

        let (submitted_at, reason) = self.stamp(reason);
        let (answers, _) = registry.snapshot();
        let submission = build_submission(
            &self.content,
            &answers,
            self.started_at,
            submitted_at,
            reason,
        );

        let write = match self.attempts.finalize_attempt(self.attempt_id, &submission).await {
            Ok(write) => write,
            Err(err) => {
                self.latch.release();
                tracing::warn!(
                    attempt_id = %self.attempt_id,
                    reason = reason.as_str(),
                    error = %err,
                    "finalize write failed"
                );
                return Err(err.into());
            }
        };

        self.latch.complete();
        self.draft.purge();

        let finalized = match write {
            FinalizeWrite::Applied => {
                tracing::info!(
                    attempt_id = %self.attempt_id,
                    reason = reason.as_str(),
                    score = submission.score,
                    total = submission.total_questions,
                    "attempt submitted"
                );
                self.record_activity(submission.submitted_at).await;
                Finalized {
                    submission,
                    applied: true,
                }
            }
            FinalizeWrite::AlreadySubmitted(stored) => {
                tracing::info!(
                    attempt_id = %self.attempt_id,
                    reason = stored.reason.as_str(),
                    "attempt was already submitted elsewhere"
                );
                Finalized {
                    submission: stored,
                    applied: false,
                }
            }
        };
        Ok(finalized)
    }

    fn stamp(&self, reason: SubmitReason) -> (DateTime<Utc>, SubmitReason) {
        let now = self.clock.now();
        match self.deadline {
            Some(deadline) if reason == SubmitReason::Timeup => {
                (now.max(deadline.at()), SubmitReason::Timeup)
            }
            Some(deadline) if deadline.is_expired(now) => (now, SubmitReason::Timeup),
            _ => (now, reason),
        }
    }

    async fn record_activity(&self, submitted_at: DateTime<Utc>) {
        if let Err(err) = self
            .activity
            .record_completion(self.user_id, submitted_at)
            .await
        {
            tracing::warn!(attempt_id = %self.attempt_id, error = %err, "activity bookkeeping failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempts::activity::DailyActivity;
    use crate::attempts::fixtures::{content, oid, qid};
    use quiz_core::model::{Attempt, SetId};
    use quiz_core::time::{fixed_clock, fixed_now};
    use std::collections::{HashMap, HashSet};
    use storage::drafts::{DraftKey, InMemoryDraftStore};
    use storage::repository::{ActivityRepository, InMemoryRepository};

    struct Harness {
        finalizer: Finalizer,
        registry: AnswerRegistry,
        repo: InMemoryRepository,
        drafts: InMemoryDraftStore,
        key: DraftKey,
        latch: Arc<AttemptLatch>,
    }

    async fn harness() -> Harness {
        harness_at(fixed_clock()).await
    }

    async fn harness_at(clock: Clock) -> Harness {
        let repo = InMemoryRepository::new();
        let attempt = Attempt::start(AttemptId::generate(), UserId::new(1), SetId::new(1), fixed_now());
        repo.create_attempt(&attempt).await.unwrap();

        let content = Arc::new(content(Some(20)));
        let drafts = InMemoryDraftStore::new();
        let key = DraftKey::new(SetId::new(1), attempt.id());
        let draft = DraftCache::new(Arc::new(drafts.clone()), key, clock);
        let latch = Arc::new(AttemptLatch::new(false));
        let answers = HashMap::from([(qid(1), oid(1, 0)), (qid(2), oid(2, 0)), (qid(3), oid(3, 1))]);
        let deadline = Deadline::for_attempt(attempt.started_at(), Some(20));
        let registry = AnswerRegistry::new(
            attempt.id(),
            Arc::clone(&content),
            None,
            answers,
            HashSet::new(),
            draft.clone(),
            Arc::new(repo.clone()),
            Arc::clone(&latch),
            clock,
        );
        registry.flag(qid(5)).unwrap();
        let finalizer = Finalizer::new(
            attempt.id(),
            attempt.user_id(),
            attempt.started_at(),
            deadline,
            content,
            Arc::new(repo.clone()),
            Arc::new(DailyActivity::new(Arc::new(repo.clone()))),
            draft,
            Arc::clone(&latch),
            clock,
        );
        Harness {
            finalizer,
            registry,
            repo,
            drafts,
            key,
            latch,
        }
    }

    #[tokio::test]
    async fn scores_writes_and_purges_draft() {
        let h = harness().await;
        assert!(h.drafts.contains(&h.key));

        let done = h.finalizer.finalize(&h.registry, SubmitReason::Manual).await.unwrap();

        assert!(done.applied);
        assert_eq!(done.submission.score, 2);
        assert_eq!(done.submission.total_questions, 5);
        assert_eq!(done.submission.time_spent_seconds, Some(0));
        assert!(h.latch.is_submitted());
        assert!(!h.drafts.contains(&h.key));
        assert_eq!(h.repo.applied_finalizes(), 1);

        let days = h.repo.activity_days(UserId::new(1), 7).await.unwrap();
        assert_eq!(days, vec![fixed_now().date_naive()]);
    }

    #[tokio::test]
    async fn second_call_is_rejected_without_a_write() {
        let h = harness().await;
        h.finalizer.finalize(&h.registry, SubmitReason::Manual).await.unwrap();
        let again = h.finalizer.finalize(&h.registry, SubmitReason::Timeup).await;
        assert!(matches!(again, Err(AttemptError::AlreadySubmitted)));
        assert_eq!(h.repo.applied_finalizes(), 1);
    }

    #[tokio::test]
    async fn failed_write_releases_latch_and_keeps_draft() {
        let h = harness().await;
        h.repo.fail_next_finalizes(1);

        let err = h.finalizer.finalize(&h.registry, SubmitReason::Timeup).await;
        assert!(matches!(err, Err(AttemptError::Storage(_))));
        assert!(h.latch.is_open());
        assert!(h.drafts.contains(&h.key));

        let done = h.finalizer.finalize(&h.registry, SubmitReason::Timeup).await.unwrap();
        assert_eq!(done.submission.reason, SubmitReason::Timeup);
    }

    #[tokio::test]
    async fn timeup_is_stamped_at_the_deadline() {
        let h = harness().await;
        let done = h.finalizer.finalize(&h.registry, SubmitReason::Timeup).await.unwrap();
        assert_eq!(done.submission.submitted_at, fixed_now() + chrono::Duration::minutes(20));
        assert_eq!(done.submission.time_spent_seconds, Some(1200));
    }

    #[tokio::test]
    async fn late_manual_submit_counts_as_timeup() {
        let h = harness_at(Clock::fixed(fixed_now() + chrono::Duration::minutes(25))).await;
        let done = h.finalizer.finalize(&h.registry, SubmitReason::Manual).await.unwrap();
        assert_eq!(done.submission.reason, SubmitReason::Timeup);
        assert_eq!(done.submission.time_spent_seconds, Some(1200));
    }

    #[tokio::test]
    async fn activity_failure_does_not_block_submit() {
        let h = harness().await;
        h.repo.fail_activity_writes(true);
        let done = h.finalizer.finalize(&h.registry, SubmitReason::Manual).await.unwrap();
        assert!(done.applied);
        assert!(h.latch.is_submitted());
    }
}

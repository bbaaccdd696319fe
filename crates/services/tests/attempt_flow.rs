use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    AnswerOption, Attempt, AttemptId, AttemptStatus, OptionId, Question, QuestionId, QuizSet,
    SetId, Submission, SubmitReason, UserId,
};
use quiz_core::review::ReviewFilter;
use quiz_core::time::fixed_now;
use services::{AttemptError, AttemptService, Clock, EngineSettings, Selection};
use storage::drafts::InMemoryDraftStore;
use storage::repository::{
    AnswerRepository, AttemptRepository, FinalizeWrite, InMemoryRepository, QuizRepository,
    Storage, StorageError,
};

const USER: UserId = UserId::new(7);

fn qid(n: u64) -> QuestionId {
    QuestionId::new(n)
}

fn oid(question: u64, slot: u64) -> OptionId {
    OptionId::new(question * 10 + slot)
}

/// Five questions with four options each; slot 0 is the correct one.
async fn seed(repo: &InMemoryRepository, limit: Option<u32>) -> SetId {
    let set = QuizSet::new(SetId::new(3), "Genetics", None, Some("BIO201".into()), None, limit)
        .unwrap();
    repo.upsert_set(&set).await.unwrap();
    for q in 1..=5_u64 {
        repo.upsert_question(&Question {
            id: qid(q),
            set_id: set.id(),
            prompt: format!("Question {q}"),
            explanation: None,
            position: u32::try_from(q).unwrap(),
        })
        .await
        .unwrap();
        for slot in 0..4_u64 {
            repo.upsert_option(&AnswerOption {
                id: oid(q, slot),
                question_id: qid(q),
                text: format!("Option {slot}"),
                is_correct: slot == 0,
                position: u32::try_from(slot).unwrap(),
            })
            .await
            .unwrap();
        }
    }
    set.id()
}

fn service(repo: &InMemoryRepository, drafts: &InMemoryDraftStore, clock: Clock) -> AttemptService {
    AttemptService::new(clock, &Storage::from_in_memory(repo), Arc::new(drafts.clone()))
}

/// Attempt store whose finalize write takes `delay` before reaching `inner`.
struct SlowFinalize {
    inner: InMemoryRepository,
    delay: Duration,
}

#[async_trait]
impl AttemptRepository for SlowFinalize {
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        self.inner.create_attempt(attempt).await
    }

    async fn get_attempt_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        self.inner.get_attempt_for_user(id, user_id).await
    }

    async fn finalize_attempt(
        &self,
        id: AttemptId,
        submission: &Submission,
    ) -> Result<FinalizeWrite, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.finalize_attempt(id, submission).await
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        set_id: SetId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        self.inner.list_attempts(user_id, set_id, limit).await
    }
}

#[tokio::test]
async fn scoring_counts_correct_wrong_and_blank() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, None).await;
    let svc = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()));
    let session = svc.open(USER, set_id, None).await.unwrap();

    for (q, slot) in [(1, 0), (2, 0), (3, 0), (4, 2)] {
        session.choose(qid(q), oid(q, slot)).unwrap();
        // answered count moves before any persist completes
    }
    assert_eq!(session.progress().answered, 4);

    let submission = session.submit().await.unwrap();
    assert_eq!(submission.score, 3);
    assert_eq!(submission.total_questions, 5);
    assert_eq!(submission.time_spent_seconds, None);
    assert_eq!(submission.reason, SubmitReason::Manual);
}

#[tokio::test]
async fn concurrent_submits_write_once() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, Some(10)).await;
    let svc = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()));
    let session = svc.open(USER, set_id, None).await.unwrap();
    session.choose(qid(1), oid(1, 0)).unwrap();

    let (first, second) = tokio::join!(session.submit(), session.submit());

    let oks = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1);
    let err = first.err().or(second.err()).unwrap();
    assert!(matches!(
        err,
        AttemptError::AlreadySubmitted | AttemptError::Finalizing
    ));
    assert_eq!(repo.applied_finalizes(), 1);
    assert_eq!(svc.streak(USER).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_minute_limit_auto_submits_once() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, Some(1)).await;
    let svc = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()));
    let session = svc.open(USER, set_id, None).await.unwrap();
    session.choose(qid(2), oid(2, 0)).unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(session.status(), AttemptStatus::InProgress);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let attempt = session.attempt();
    assert_eq!(attempt.status(), AttemptStatus::Submitted);
    let submission = attempt.submission().unwrap();
    assert_eq!(submission.reason, SubmitReason::Timeup);
    assert_eq!(submission.score, 1);
    assert_eq!(submission.time_spent_seconds, Some(60));
    assert_eq!(submission.submitted_at, fixed_now() + chrono::Duration::minutes(1));
    assert_eq!(repo.applied_finalizes(), 1);
    assert!(!session.is_ticking());

    assert!(matches!(
        session.submit().await,
        Err(AttemptError::AlreadySubmitted)
    ));
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(repo.applied_finalizes(), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_retries_failed_finalize_writes() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, Some(1)).await;
    let settings = EngineSettings::default()
        .with_finalize_retries(3)
        .with_finalize_retry_delay(Duration::from_secs(1));
    let svc = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()))
        .with_settings(settings);
    let session = svc.open(USER, set_id, None).await.unwrap();
    repo.fail_next_finalizes(2);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(session.status(), AttemptStatus::InProgress);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.status(), AttemptStatus::Submitted);
    assert_eq!(repo.applied_finalizes(), 1);
}

#[tokio::test(start_paused = true)]
async fn resuming_after_the_deadline_submits_immediately() {
    let repo = InMemoryRepository::new();
    let drafts = InMemoryDraftStore::new();
    let set_id = seed(&repo, Some(20)).await;

    let first = service(&repo, &drafts, Clock::fixed(fixed_now()));
    let attempt_id = {
        let session = first.open(USER, set_id, None).await.unwrap();
        session.attempt_id()
    };

    // Reloading half an hour later must not grant a fresh 20 minutes.
    let later = Clock::fixed(fixed_now() + chrono::Duration::minutes(30));
    let hint = attempt_id.to_string();
    let session = service(&repo, &drafts, later)
        .open(USER, set_id, Some(&hint))
        .await
        .unwrap();
    assert!(session.resumed());
    assert_eq!(
        session.deadline().unwrap().at(),
        fixed_now() + chrono::Duration::minutes(20)
    );

    tokio::time::sleep(Duration::from_millis(1)).await;
    let attempt = session.attempt();
    assert_eq!(attempt.submission().unwrap().reason, SubmitReason::Timeup);
    assert_eq!(attempt.submission().unwrap().time_spent_seconds, Some(1200));
}

#[tokio::test]
async fn flag_then_unflag_leaves_flagged_review_empty() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, None).await;
    let svc = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()));
    let session = svc.open(USER, set_id, None).await.unwrap();

    session.flag(qid(2)).unwrap();
    session.unflag(qid(2)).unwrap();
    session.submit().await.unwrap();

    let review = session.review(ReviewFilter::Flagged).unwrap();
    assert!(review.items.is_empty());
    assert_eq!(review.counts.flagged, 0);
    assert_eq!(session.review(ReviewFilter::All).unwrap().items.len(), 5);
}

#[tokio::test]
async fn failed_persist_is_recovered_from_draft_on_reload() {
    let repo = InMemoryRepository::new();
    let drafts = InMemoryDraftStore::new();
    let set_id = seed(&repo, Some(30)).await;
    let svc = service(&repo, &drafts, Clock::fixed(fixed_now()));

    let session = svc.open(USER, set_id, None).await.unwrap();
    let attempt_id = session.attempt_id();

    let Selection::Recorded(saved) = session.choose(qid(1), oid(1, 0)).unwrap() else {
        panic!("selection ignored");
    };
    assert!(saved.wait().await);

    repo.fail_answer_writes(true);
    let Selection::Recorded(lost) = session.choose(qid(2), oid(2, 3)).unwrap() else {
        panic!("selection ignored");
    };
    assert!(!lost.wait().await);
    session.flag(qid(5)).unwrap();
    drop(session);

    repo.fail_answer_writes(false);
    let hint = attempt_id.to_string();
    let resumed = svc.open(USER, set_id, Some(&hint)).await.unwrap();

    assert!(resumed.resumed());
    assert_eq!(resumed.attempt_id(), attempt_id);
    assert_eq!(resumed.draft_filled(), &[qid(2)]);
    let view = resumed.question_view(qid(2)).unwrap();
    assert_eq!(view.selected, Some(oid(2, 3)));
    assert!(resumed.question_view(qid(5)).unwrap().flagged);
    assert_eq!(resumed.progress().answered, 2);

    for task in resumed.take_resync_tasks() {
        assert!(task.wait().await);
    }
    let server = repo.answers_for_attempt(attempt_id).await.unwrap();
    assert_eq!(server.len(), 2);
}

#[tokio::test]
async fn foreign_attempt_hint_is_not_adopted() {
    let repo = InMemoryRepository::new();
    let drafts = InMemoryDraftStore::new();
    let set_id = seed(&repo, None).await;
    let svc = service(&repo, &drafts, Clock::fixed(fixed_now()));

    let theirs = svc.open(UserId::new(99), set_id, None).await.unwrap();
    theirs.choose(qid(1), oid(1, 0)).unwrap();

    let hint = theirs.attempt_id().to_string();
    let mine = svc.open(USER, set_id, Some(&hint)).await.unwrap();
    assert!(!mine.resumed());
    assert_ne!(mine.attempt_id(), theirs.attempt_id());
    assert_eq!(mine.progress().answered, 0);
}

#[tokio::test]
async fn history_lists_newest_attempt_first() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, None).await;

    let early = service(&repo, &InMemoryDraftStore::new(), Clock::fixed(fixed_now()));
    let first = early.open(USER, set_id, None).await.unwrap();
    first.submit().await.unwrap();

    let late = service(
        &repo,
        &InMemoryDraftStore::new(),
        Clock::fixed(fixed_now() + chrono::Duration::hours(2)),
    );
    let second = late.open(USER, set_id, None).await.unwrap();

    let history = late.history(USER, set_id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id(), second.attempt_id());
    assert_eq!(history[1].status(), AttemptStatus::Submitted);
}

#[tokio::test(start_paused = true)]
async fn expiry_takes_over_when_a_racing_manual_submit_fails() {
    let repo = InMemoryRepository::new();
    let set_id = seed(&repo, Some(1)).await;
    let storage = Storage {
        attempts: Arc::new(SlowFinalize {
            inner: repo.clone(),
            delay: Duration::from_secs(2),
        }),
        ..Storage::from_in_memory(&repo)
    };
    let svc = AttemptService::new(
        Clock::fixed(fixed_now()),
        &storage,
        Arc::new(InMemoryDraftStore::new()),
    );
    let session = svc.open(USER, set_id, None).await.unwrap();
    session.choose(qid(1), oid(1, 0)).unwrap();

    tokio::time::sleep(Duration::from_millis(59_500)).await;
    repo.fail_next_finalizes(1);
    let manual = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(matches!(manual.await.unwrap(), Err(AttemptError::Storage(_))));

    let attempt = session.attempt();
    assert_eq!(attempt.status(), AttemptStatus::Submitted);
    let submission = attempt.submission().unwrap();
    assert_eq!(submission.reason, SubmitReason::Timeup);
    assert_eq!(submission.score, 1);
    assert_eq!(repo.applied_finalizes(), 1);
    assert!(!session.choose(qid(2), oid(2, 0)).unwrap().is_recorded());
}

#[tokio::test]
async fn review_follows_the_stored_answers_when_another_writer_submitted() {
    let repo = InMemoryRepository::new();
    let drafts = InMemoryDraftStore::new();
    let set_id = seed(&repo, None).await;
    let svc = service(&repo, &drafts, Clock::fixed(fixed_now()));

    let stale = svc.open(USER, set_id, None).await.unwrap();
    let hint = stale.attempt_id().to_string();
    let other = svc.open(USER, set_id, Some(&hint)).await.unwrap();
    assert!(other.resumed());

    let Selection::Recorded(saved) = other.choose(qid(1), oid(1, 0)).unwrap() else {
        panic!("selection ignored");
    };
    assert!(saved.wait().await);
    let stored = other.submit().await.unwrap();
    assert_eq!(stored.score, 1);

    let adopted = stale.submit().await.unwrap();
    assert_eq!(adopted, stored);
    assert_eq!(repo.applied_finalizes(), 1);

    let review = stale.review(ReviewFilter::All).unwrap();
    assert_eq!(review.counts.correct, review.submission.score);
    assert_eq!(stale.question_view(qid(1)).unwrap().selected, Some(oid(1, 0)));
}

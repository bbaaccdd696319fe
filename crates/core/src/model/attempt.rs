use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{AttemptId, OptionId, QuestionId, SetId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt already submitted")]
    AlreadySubmitted,

    #[error("score ({score}) exceeds total questions ({total})")]
    ScoreExceedsTotal { score: u32, total: u32 },

    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("attempt status does not match its submission fields")]
    StatusMismatch,

    #[error("invalid attempt status: {0}")]
    InvalidStatus(String),

    #[error("invalid submit reason: {0}")]
    InvalidReason(String),
}

//
// ─── STATUS & REASON ───────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. `InProgress -> Submitted` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidStatus` for unknown values.
    pub fn parse(value: &str) -> Result<Self, AttemptError> {
        match value {
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            other => Err(AttemptError::InvalidStatus(other.to_owned())),
        }
    }
}

/// What triggered the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitReason {
    /// The student confirmed the submit.
    Manual,
    /// The deadline elapsed.
    Timeup,
}

impl SubmitReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitReason::Manual => "manual",
            SubmitReason::Timeup => "timeup",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidReason` for unknown values.
    pub fn parse(value: &str) -> Result<Self, AttemptError> {
        match value {
            "manual" => Ok(Self::Manual),
            "timeup" => Ok(Self::Timeup),
            other => Err(AttemptError::InvalidReason(other.to_owned())),
        }
    }
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

/// Frozen outcome of a finalized attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub submitted_at: DateTime<Utc>,
    pub score: u32,
    pub total_questions: u32,
    /// Seconds between start and submit, clamped to the time limit.
    /// `None` for untimed sets.
    pub time_spent_seconds: Option<u32>,
    pub reason: SubmitReason,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One student's session answering a quiz set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    user_id: UserId,
    set_id: SetId,
    started_at: DateTime<Utc>,
    submission: Option<Submission>,
}

impl Attempt {
    /// A brand-new in-progress attempt.
    #[must_use]
    pub fn start(id: AttemptId, user_id: UserId, set_id: SetId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            set_id,
            started_at,
            submission: None,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::StatusMismatch` when `status` disagrees with
    /// the presence of a submission, or the validation errors of `submit`.
    pub fn from_persisted(
        id: AttemptId,
        user_id: UserId,
        set_id: SetId,
        started_at: DateTime<Utc>,
        status: AttemptStatus,
        submission: Option<Submission>,
    ) -> Result<Self, AttemptError> {
        let mut attempt = Self::start(id, user_id, set_id, started_at);
        match (status, submission) {
            (AttemptStatus::InProgress, None) => Ok(attempt),
            (AttemptStatus::Submitted, Some(submission)) => {
                attempt.submit(submission)?;
                Ok(attempt)
            }
            _ => Err(AttemptError::StatusMismatch),
        }
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn set_id(&self) -> SetId {
        self.set_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        if self.submission.is_some() {
            AttemptStatus::Submitted
        } else {
            AttemptStatus::InProgress
        }
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }

    #[must_use]
    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// True when the attempt was started by `user_id` for `set_id`.
    #[must_use]
    pub fn belongs_to(&self, user_id: UserId, set_id: SetId) -> bool {
        self.user_id == user_id && self.set_id == set_id
    }

    /// Applies the one irreversible transition to `Submitted`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` on a second call,
    /// `AttemptError::ScoreExceedsTotal` or `AttemptError::InvalidTimeRange`
    /// for inconsistent submissions. The attempt is untouched on error.
    pub fn submit(&mut self, submission: Submission) -> Result<(), AttemptError> {
        if self.submission.is_some() {
            return Err(AttemptError::AlreadySubmitted);
        }
        if submission.score > submission.total_questions {
            return Err(AttemptError::ScoreExceedsTotal {
                score: submission.score,
                total: submission.total_questions,
            });
        }
        if submission.submitted_at < self.started_at {
            return Err(AttemptError::InvalidTimeRange);
        }
        self.submission = Some(submission);
        Ok(())
    }
}

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// Server-side selection for one question of one attempt.
///
/// `(attempt_id, question_id)` is unique; writes are upserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub selected_option_id: OptionId,
    pub updated_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

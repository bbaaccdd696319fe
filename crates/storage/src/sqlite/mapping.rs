use quiz_core::model::{
    AnswerOption, AnswerRecord, Attempt, AttemptId, AttemptStatus, OptionId, Question, QuestionId,
    QuizSet, SetId, Submission, SubmitReason, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn opt_u32(row: &SqliteRow, field: &'static str) -> Result<Option<u32>, StorageError> {
    row.try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(|v| u32_from_i64(field, v))
        .transpose()
}

pub(crate) fn attempt_id_from_str(raw: &str) -> Result<AttemptId, StorageError> {
    raw.parse().map_err(ser)
}

pub(crate) fn map_set_row(row: &SqliteRow) -> Result<QuizSet, StorageError> {
    QuizSet::new(
        SetId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        row.try_get("course_code").map_err(ser)?,
        row.try_get("level").map_err(ser)?,
        opt_u32(row, "time_limit_minutes")?,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    Ok(Question {
        id: QuestionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        set_id: SetId::new(i64_to_u64("set_id", row.try_get("set_id").map_err(ser)?)?),
        prompt: row.try_get("prompt").map_err(ser)?,
        explanation: row.try_get("explanation").map_err(ser)?,
        position: u32_from_i64("position", row.try_get("position").map_err(ser)?)?,
    })
}

pub(crate) fn map_option_row(row: &SqliteRow) -> Result<AnswerOption, StorageError> {
    Ok(AnswerOption {
        id: OptionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        question_id: QuestionId::new(i64_to_u64(
            "question_id",
            row.try_get("question_id").map_err(ser)?,
        )?),
        text: row.try_get("text").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        position: u32_from_i64("position", row.try_get("position").map_err(ser)?)?,
    })
}

/// Reads the submission columns; `None` while the attempt is in progress.
pub(crate) fn map_submission(row: &SqliteRow) -> Result<Option<Submission>, StorageError> {
    let submitted_at: Option<chrono::DateTime<chrono::Utc>> =
        row.try_get("submitted_at").map_err(ser)?;
    let Some(submitted_at) = submitted_at else {
        return Ok(None);
    };
    let reason: Option<String> = row.try_get("submit_reason").map_err(ser)?;
    let reason = reason.ok_or_else(|| StorageError::Serialization("missing submit_reason".into()))?;

    Ok(Some(Submission {
        submitted_at,
        score: opt_u32(row, "score")?
            .ok_or_else(|| StorageError::Serialization("missing score".into()))?,
        total_questions: opt_u32(row, "total_questions")?
            .ok_or_else(|| StorageError::Serialization("missing total_questions".into()))?,
        time_spent_seconds: opt_u32(row, "time_spent_seconds")?,
        reason: SubmitReason::parse(&reason).map_err(ser)?,
    }))
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<Attempt, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;

    Attempt::from_persisted(
        attempt_id_from_str(&id)?,
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        SetId::new(i64_to_u64("set_id", row.try_get("set_id").map_err(ser)?)?),
        row.try_get("started_at").map_err(ser)?,
        AttemptStatus::parse(&status).map_err(ser)?,
        map_submission(row)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<AnswerRecord, StorageError> {
    let attempt_id: String = row.try_get("attempt_id").map_err(ser)?;
    Ok(AnswerRecord {
        attempt_id: attempt_id_from_str(&attempt_id)?,
        question_id: QuestionId::new(i64_to_u64(
            "question_id",
            row.try_get("question_id").map_err(ser)?,
        )?),
        selected_option_id: OptionId::new(i64_to_u64(
            "selected_option_id",
            row.try_get("selected_option_id").map_err(ser)?,
        )?),
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

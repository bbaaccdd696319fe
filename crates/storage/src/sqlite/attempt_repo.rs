use quiz_core::model::{Attempt, AttemptId, SetId, Submission, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_attempt_row, map_submission};
use crate::repository::{AttemptRepository, FinalizeWrite, StorageError};

const ATTEMPT_COLUMNS: &str = "id, user_id, set_id, status, started_at, submitted_at, score, \
     total_questions, time_spent_seconds, submit_reason";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn create_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let submission = attempt.submission();
        let result = sqlx::query(
            r"
            INSERT INTO attempts (
                id, user_id, set_id, status, started_at, submitted_at,
                score, total_questions, time_spent_seconds, submit_reason
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(attempt.id().to_string())
        .bind(id_i64("user_id", attempt.user_id().value())?)
        .bind(id_i64("set_id", attempt.set_id().value())?)
        .bind(attempt.status().as_str())
        .bind(attempt.started_at())
        .bind(submission.map(|s| s.submitted_at))
        .bind(submission.map(|s| i64::from(s.score)))
        .bind(submission.map(|s| i64::from(s.total_questions)))
        .bind(submission.and_then(|s| s.time_spent_seconds).map(i64::from))
        .bind(submission.map(|s| s.reason.as_str()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(conn(e)),
        }
    }

    async fn get_attempt_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1 AND user_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn finalize_attempt(
        &self,
        id: AttemptId,
        submission: &Submission,
    ) -> Result<FinalizeWrite, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE attempts
            SET status = 'submitted',
                submitted_at = ?2,
                score = ?3,
                total_questions = ?4,
                time_spent_seconds = ?5,
                submit_reason = ?6
            WHERE id = ?1 AND status = 'in_progress'
            ",
        )
        .bind(id.to_string())
        .bind(submission.submitted_at)
        .bind(i64::from(submission.score))
        .bind(i64::from(submission.total_questions))
        .bind(submission.time_spent_seconds.map(i64::from))
        .bind(submission.reason.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if result.rows_affected() > 0 {
            return Ok(FinalizeWrite::Applied);
        }

        // Nothing moved: either the row is gone or someone else submitted first.
        let row = sqlx::query(
            r"
                SELECT submitted_at, score, total_questions, time_spent_seconds, submit_reason
                FROM attempts
                WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_submission(&row)?
            .map(FinalizeWrite::AlreadySubmitted)
            .ok_or_else(|| StorageError::Serialization("submitted attempt without outcome".into()))
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        set_id: SetId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = ?1 AND set_id = ?2 \
             ORDER BY started_at DESC, id DESC \
             LIMIT ?3"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(id_i64("set_id", set_id.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }
}

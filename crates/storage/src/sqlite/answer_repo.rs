use quiz_core::model::{AnswerRecord, AttemptId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_answer_row};
use crate::repository::{AnswerRepository, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO attempt_answers (attempt_id, question_id, selected_option_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                selected_option_id = excluded.selected_option_id,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= attempt_answers.updated_at
            ",
        )
        .bind(record.attempt_id.to_string())
        .bind(id_i64("question_id", record.question_id.value())?)
        .bind(id_i64("selected_option_id", record.selected_option_id.value())?)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn answers_for_attempt(
        &self,
        id: AttemptId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT attempt_id, question_id, selected_option_id, updated_at
                FROM attempt_answers
                WHERE attempt_id = ?1
                ORDER BY question_id ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }
}

use quiz_core::model::{AnswerOption, Question, QuizSet, SetId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_option_row, map_question_row, map_set_row};
use crate::repository::{QuizRepository, StorageError};

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_set(&self, set: &QuizSet) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quiz_sets (id, title, description, course_code, level, time_limit_minutes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                course_code = excluded.course_code,
                level = excluded.level,
                time_limit_minutes = excluded.time_limit_minutes
            ",
        )
        .bind(id_i64("set_id", set.id().value())?)
        .bind(set.title())
        .bind(set.description())
        .bind(set.course_code())
        .bind(set.level())
        .bind(set.time_limit_minutes().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (id, set_id, prompt, explanation, position)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                set_id = excluded.set_id,
                prompt = excluded.prompt,
                explanation = excluded.explanation,
                position = excluded.position
            ",
        )
        .bind(id_i64("question_id", question.id.value())?)
        .bind(id_i64("set_id", question.set_id.value())?)
        .bind(&question.prompt)
        .bind(question.explanation.as_deref())
        .bind(i64::from(question.position))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn upsert_option(&self, option: &AnswerOption) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO answer_options (id, question_id, text, is_correct, position)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                question_id = excluded.question_id,
                text = excluded.text,
                is_correct = excluded.is_correct,
                position = excluded.position
            ",
        )
        .bind(id_i64("option_id", option.id.value())?)
        .bind(id_i64("question_id", option.question_id.value())?)
        .bind(&option.text)
        .bind(option.is_correct)
        .bind(i64::from(option.position))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_set(&self, id: SetId) -> Result<Option<QuizSet>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, description, course_code, level, time_limit_minutes
                FROM quiz_sets
                WHERE id = ?1
            ",
        )
        .bind(id_i64("set_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_set_row).transpose()
    }

    async fn questions_for_set(&self, set_id: SetId) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, set_id, prompt, explanation, position
                FROM questions
                WHERE set_id = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_i64("set_id", set_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }

    async fn options_for_set(&self, set_id: SetId) -> Result<Vec<AnswerOption>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT o.id, o.question_id, o.text, o.is_correct, o.position
                FROM answer_options o
                JOIN questions q ON q.id = o.question_id
                WHERE q.set_id = ?1
                ORDER BY q.position ASC, q.id ASC, o.position ASC, o.id ASC
            ",
        )
        .bind(id_i64("set_id", set_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_option_row).collect()
    }
}

use chrono::NaiveDate;
use quiz_core::model::UserId;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};
use crate::repository::{ActivityRepository, StorageError};

#[async_trait::async_trait]
impl ActivityRepository for SqliteRepository {
    async fn record_completion(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<u32, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let row = sqlx::query(
            r"
            INSERT INTO daily_activity (user_id, day, completed)
            VALUES (?1, ?2, 1)
            ON CONFLICT(user_id, day) DO UPDATE SET
                completed = daily_activity.completed + 1
            RETURNING completed
            ",
        )
        .bind(user)
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let completed: i64 = row.try_get("completed").map_err(ser)?;
        u32::try_from(completed).map_err(ser)
    }

    async fn activity_days(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT day
                FROM daily_activity
                WHERE user_id = ?1 AND completed > 0
                ORDER BY day DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| row.try_get::<NaiveDate, _>("day").map_err(ser))
            .collect()
    }
}

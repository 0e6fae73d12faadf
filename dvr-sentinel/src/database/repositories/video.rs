//! Recording repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::VideoDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::datetime_to_ms;
use crate::domain::TimeWindow;

/// Recording repository trait.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Register a recording. Returns `None` if the path is already known.
    async fn add_video(
        &self,
        path: &str,
        thumbnail_path: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<VideoDbModel>>;

    /// Recordings inside the half-open window, oldest first.
    async fn list_videos(&self, window: &TimeWindow) -> Result<Vec<VideoDbModel>>;

    async fn contains_path(&self, path: &str) -> Result<bool>;
}

/// SQLx implementation of VideoRepository.
pub struct SqlxVideoRepository {
    pool: SqlitePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn add_video(
        &self,
        path: &str,
        thumbnail_path: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<VideoDbModel>> {
        let recorded_at_ms = datetime_to_ms(recorded_at);
        retry_on_sqlite_busy("add_video", || async {
            let video = sqlx::query_as::<_, VideoDbModel>(
                r#"
                INSERT INTO video (path, thumbnail_path, recorded_at)
                VALUES (?, ?, ?)
                ON CONFLICT (path) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(path)
            .bind(thumbnail_path)
            .bind(recorded_at_ms)
            .fetch_optional(&self.pool)
            .await?;
            Ok(video)
        })
        .await
    }

    async fn list_videos(&self, window: &TimeWindow) -> Result<Vec<VideoDbModel>> {
        let key = window.key();
        let videos = sqlx::query_as::<_, VideoDbModel>(
            r#"
            SELECT * FROM video
            WHERE recorded_at >= ? AND recorded_at < ?
            ORDER BY recorded_at, id
            "#,
        )
        .bind(key.start_ms)
        .bind(key.end_ms)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = videos.len(), window = %window, "Loaded recordings for window");
        Ok(videos)
    }

    async fn contains_path(&self, path: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM video WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 > 0)
    }
}

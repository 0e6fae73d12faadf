//! Report delivery record repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::ReportRecordDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::datetime_to_ms;
use crate::domain::TimeWindow;
use crate::{Error, Result};

/// Durable store of report delivery records.
///
/// Records are never deleted. The store enforces at most one record per
/// window key, so `create_pending` is safe to call from concurrent tasks.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Record for the window, or `None` if the window was never attempted.
    async fn get_record(&self, window: &TimeWindow) -> Result<Option<ReportRecordDbModel>>;

    /// Create a pending record for the window, or return the existing one.
    async fn create_pending(
        &self,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReportRecordDbModel>;

    /// Mark a record delivered. Delivered records are left untouched.
    async fn mark_delivered(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Record a failed attempt on an undelivered record.
    async fn mark_failed(&self, id: i64, reason: &str, at: DateTime<Utc>) -> Result<()>;

    /// All pending or failed records, oldest window first.
    async fn list_undelivered(&self) -> Result<Vec<ReportRecordDbModel>>;
}

/// SQLx implementation of ReportRepository.
pub struct SqlxReportRepository {
    pool: SqlitePool,
}

impl SqlxReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_by_id(&self, id: i64) -> Result<ReportRecordDbModel> {
        sqlx::query_as::<_, ReportRecordDbModel>("SELECT * FROM report_status WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("ReportRecord", id.to_string()))
    }
}

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn get_record(&self, window: &TimeWindow) -> Result<Option<ReportRecordDbModel>> {
        let key = window.key();
        let record = sqlx::query_as::<_, ReportRecordDbModel>(
            "SELECT * FROM report_status WHERE window_start = ? AND window_end = ?",
        )
        .bind(key.start_ms)
        .bind(key.end_ms)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn create_pending(
        &self,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReportRecordDbModel> {
        let key = window.key();
        let now_ms = datetime_to_ms(now);

        retry_on_sqlite_busy("create_pending_report", || async {
            // The unique index on (window_start, window_end) makes the
            // check-then-create atomic: a concurrent insert is ignored and both
            // callers read back the same row.
            sqlx::query(
                r#"
                INSERT INTO report_status
                    (window_start, window_end, delivered, attempt_count, attempted_at, created_at)
                VALUES (?, ?, 0, 0, ?, ?)
                ON CONFLICT (window_start, window_end) DO NOTHING
                "#,
            )
            .bind(key.start_ms)
            .bind(key.end_ms)
            .bind(now_ms)
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        self.get_record(window)
            .await?
            .ok_or_else(|| Error::not_found("ReportRecord", window.to_string()))
    }

    async fn mark_delivered(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let at_ms = datetime_to_ms(at);
        let affected = retry_on_sqlite_busy("mark_report_delivered", || async {
            let result = sqlx::query(
                r#"
                UPDATE report_status SET
                    delivered = 1,
                    delivered_at = ?,
                    attempted_at = ?,
                    failure_reason = NULL,
                    attempt_count = attempt_count + 1
                WHERE id = ? AND delivered = 0
                "#,
            )
            .bind(at_ms)
            .bind(at_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            // Either already delivered (keep the first delivery time) or missing.
            self.get_by_id(id).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, reason: &str, at: DateTime<Utc>) -> Result<()> {
        let at_ms = datetime_to_ms(at);
        let affected = retry_on_sqlite_busy("mark_report_failed", || async {
            let result = sqlx::query(
                r#"
                UPDATE report_status SET
                    failure_reason = ?,
                    attempted_at = ?,
                    attempt_count = attempt_count + 1
                WHERE id = ? AND delivered = 0
                "#,
            )
            .bind(reason)
            .bind(at_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            let existing = self.get_by_id(id).await?;
            tracing::warn!(
                id,
                delivered = existing.delivered,
                "Ignoring failure mark on an already delivered report"
            );
        }
        Ok(())
    }

    async fn list_undelivered(&self) -> Result<Vec<ReportRecordDbModel>> {
        let records = sqlx::query_as::<_, ReportRecordDbModel>(
            "SELECT * FROM report_status WHERE delivered = 0 ORDER BY window_start, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

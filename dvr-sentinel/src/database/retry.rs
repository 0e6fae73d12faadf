//! Busy-retry for SQLite writes that race the retry worker or the scanner.

use rand::random;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

const MAX_BUSY_RETRIES: u32 = 8;
const FIRST_DELAY: Duration = Duration::from_millis(10);
const DELAY_CAP: Duration = Duration::from_secs(2);

fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(err) = err else {
        return false;
    };
    // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
    if let sqlx::Error::Database(db) = err
        && matches!(db.code().as_deref(), Some("5" | "6"))
    {
        return true;
    }
    let text = err.to_string().to_ascii_lowercase();
    text.contains("database is locked") || text.contains("database is busy")
}

/// Doubling delay from `FIRST_DELAY` with up to 25% jitter, never above `DELAY_CAP`.
fn busy_delay(retry: u32) -> Duration {
    let base = FIRST_DELAY.saturating_mul(1 << retry.min(16)).min(DELAY_CAP);
    let jitter = base.mul_f64(random::<f64>() * 0.25);
    (base + jitter).min(DELAY_CAP)
}

/// Runs `op` until it returns something other than a busy/locked error or the
/// retries run out.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retry < MAX_BUSY_RETRIES && is_busy(&err) => err,
            Err(err) => return Err(err),
        };
        let delay = busy_delay(retry);
        retry += 1;
        debug!(op = op_name, retry, ?delay, "SQLite busy: {}", err);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_busy_delay_is_capped() {
        assert!(busy_delay(0) >= FIRST_DELAY);
        for retry in 0..40 {
            assert!(busy_delay(retry) <= DELAY_CAP);
        }
    }

    #[tokio::test]
    async fn test_non_busy_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_on_sqlite_busy("insert_report", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::validation("bad input"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_error_is_retried_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value = retry_on_sqlite_busy("insert_report", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::DatabaseSqlx(sqlx::Error::Protocol(
                        "database is locked".to_string(),
                    )))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;

use crate::error::AppError;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Connection-level failures are worth retrying; statement errors are not.
fn is_transient(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

/// Run a storage call up to `MAX_ATTEMPTS` times, backing off between
/// transient failures. Exhaustion surfaces as a retryable 503; anything
/// else propagates immediately.
pub async fn with_retry<T, F, Fut>(op: &'static str, mut call: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                if attempt >= MAX_ATTEMPTS {
                    tracing::warn!(op, attempts = attempt, error = %e, "giving up on transient failure");
                    return Err(AppError::Transient(e.to_string()));
                }
                tracing::debug!(op, attempt, error = %e, "transient failure, retrying");
                tokio::time::sleep(BACKOFF_BASE * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(AppError::Database(e)),
        }
    }
}

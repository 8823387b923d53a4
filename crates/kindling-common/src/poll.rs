//! Timeout-bounded polling

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::{Error, Result};

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = Result<Option<T>>;

/// Poll `check_fn` every `interval` until it yields a value, fails, or
/// `timeout` elapses.
pub async fn wait_with_timeout<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    description: &str,
    mut check_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let start = Instant::now();

    loop {
        match check_fn().await? {
            Some(value) => return Ok(value),
            None => {
                if start.elapsed() >= timeout {
                    return Err(Error::timeout(description));
                }
                debug!("Waiting for {}...", description);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

// Retry logic with exponential backoff for collaborator calls

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Execute an operation with bounded retries and exponential backoff.
///
/// `max_attempts` counts the first try; the delay before attempt n+1 is
/// `base_delay * 2^(n-1)`. The last error is returned once the budget is
/// exhausted.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, base_delay: Duration, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);

                if attempt < attempts - 1 {
                    // Saturate rather than overflow for absurd attempt counts
                    let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Agent invocation failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.expect("at least one attempt ran"))
}

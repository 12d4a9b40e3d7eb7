//! Classified retry logic for report downloads
//!
//! Account-level download failures come in three classes, and the retry loop
//! treats each differently:
//! - **abort**: the request is permanently invalid for this account; the
//!   retry budget is exhausted at once and the account is given up for the pass.
//! - **retry**: a transient backend/network failure; consumes one try from the
//!   bounded budget and re-attempts immediately.
//! - **rate-limited**: the server asked for a pause; the wait honors the
//!   server-specified delay (with optional jitter) and does not consume the
//!   budget.
//!
//! Classification happens once, at the API-client boundary, through the
//! [`Classify`] trait -- the loop never inspects error message text.

use crate::config::RetryPolicy;
use crate::error::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry class of an account-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Permanently invalid for this account; do not retry
    Abort,
    /// Transient; retry against the bounded budget
    Retry,
    /// Paced; wait the given delay, then retry without consuming the budget
    RateLimited(Duration),
}

/// Trait for errors that carry a retry classification
pub trait Classify {
    /// The retry class governing how the download loop treats this error
    fn class(&self) -> ErrorClass;
}

impl Classify for ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            ApiError::InvalidCustomer
            | ApiError::CustomerNotFound
            | ApiError::PermissionDenied
            | ApiError::MalformedQuery(_) => ErrorClass::Abort,
            ApiError::Backend(_)
            | ApiError::Network(_)
            | ApiError::Tls(_)
            | ApiError::Unknown(_) => ErrorClass::Retry,
            ApiError::RateLimited { retry_after } => ErrorClass::RateLimited(*retry_after),
        }
    }
}

/// Execute one download attempt sequence under the classified retry policy
///
/// Returns the first success, the first abort-class error, or the last
/// retry-class error once the budget (`policy.max_tries` attempts) is spent.
/// Rate-limited errors pace the loop but never spend the budget.
pub async fn download_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut tries: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if tries > 0 {
                    tracing::info!(tries = tries + 1, "download succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => match e.class() {
                ErrorClass::Abort => {
                    tracing::warn!(error = %e, "abort-class error, giving up on this account");
                    return Err(e);
                }
                ErrorClass::RateLimited(delay) => {
                    let wait = if policy.jitter { add_jitter(delay) } else { delay };
                    tracing::warn!(
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, pacing next attempt"
                    );
                    tokio::time::sleep(wait).await;
                }
                ErrorClass::Retry => {
                    tries += 1;
                    if tries >= policy.max_tries {
                        tracing::warn!(
                            error = %e,
                            tries = tries,
                            "retry budget exhausted"
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        error = %e,
                        tries = tries,
                        max_tries = policy.max_tries,
                        "transient error, retrying"
                    );
                }
            },
        }
    }
}

/// Add random jitter to a delay so paced retries across workers do not
/// re-synchronize into the same instant
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual wait lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

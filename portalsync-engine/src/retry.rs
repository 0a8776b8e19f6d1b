//! Bounded retry with fixed backoff.

use std::fmt::Display;
use std::time::Duration;

use portalsync_core::Settings;

use crate::runlog::RunLog;

/// How many times to attempt an operation, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    limit: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `limit` is coerced to at least one attempt.
    pub fn new(limit: u32, backoff: Duration) -> Self {
        Self {
            limit: limit.max(1),
            backoff,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.effective_retry_limit(), settings.retry_delay())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Run `op` until it succeeds or `policy.limit()` attempts have failed.
///
/// `op` receives the 1-based attempt number. Every failed attempt is logged
/// as FAIL with its number; the error text is included only while another
/// attempt remains; the caller reports the final error.
pub fn with_retry<T, E, F>(
    policy: &RetryPolicy,
    log: &mut RunLog,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    log.info(format!("{label} succeeded on attempt {attempt}"));
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.limit => {
                log.fail(format!(
                    "{label}: attempt {attempt} of {} failed: {err}",
                    policy.limit
                ));
                if !policy.backoff.is_zero() {
                    tracing::debug!("retrying {label} in {:?}", policy.backoff);
                    std::thread::sleep(policy.backoff);
                }
            }
            Err(err) => {
                log.fail(format!(
                    "{label}: attempt {attempt} of {} failed, giving up",
                    policy.limit
                ));
                return Err(err);
            }
        }
    }
}

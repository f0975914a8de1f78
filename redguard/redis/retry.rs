use std::fmt;

use chrono::Duration;
use redis::{RedisError, RedisResult};

/// Default retry budget when no per-call or configured value is supplied.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 10;
/// Default inter-attempt delay in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: i64 = 250;

/// The bounded retry loop over a fallible redis operation.
///
/// Runs the fallible block, classifies each failure via
/// [`should_retry`](crate::redis::should_retry), and either re-raises
/// immediately (fatal), or sleeps the policy's delay, runs the failure block
/// (typically a reconnect) and tries again, up to the policy's attempt budget.
///
/// A macro rather than a function so the fallible block and the failure block
/// can both mutably borrow the caller's state (e.g. the facade's connection
/// handle), which closures can't express.
///
/// The failure block must evaluate to `Result<(), RedisGuardErr>`; its errors
/// propagate, ending the loop early - a reconnect going wrong in a
/// non-suppressible way is itself significant.
#[macro_export]
macro_rules! redis_retry {
    ($policy:expr, $host:expr, $fallible:block) => {
        $crate::redis_retry!($policy, $host, $fallible, { Ok(()) })
    };

    ($policy:expr, $host:expr, $fallible:block, $on_failure:block) => {{
        let policy: $crate::redis::RetryPolicy = $policy;
        let host: &str = $host;
        let mut current_attempt: usize = 0;

        loop {
            match $fallible {
                Ok(r) => break Ok(r),
                Err(e) => {
                    if !$crate::redis::should_retry(&e, host) {
                        break Err($crate::redis::RedisGuardErr::Fatal(e));
                    }
                    if current_attempt >= policy.attempts() {
                        break Err($crate::redis::RedisGuardErr::RetryExhausted {
                            attempts: policy.attempts(),
                            last: e,
                        });
                    }
                    $crate::redis::sleep_between_attempts(&policy, current_attempt);
                    match $on_failure {
                        Ok(()) => {}
                        Err(reconnect_err) => break Err(reconnect_err),
                    }
                    current_attempt += 1;
                }
            }
        }
    }};
}

/// Bounds for the retry loop: how many retries after the initial attempt, and
/// how long to sleep between them.
///
/// `attempts == 0` disables retrying: the first failure is surfaced
/// immediately, with no sleep and no failure callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_ATTEMPTS,
            Duration::milliseconds(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// A policy allowing `attempts` retries with a fixed `delay` between them.
    pub fn new(attempts: usize, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that surfaces the first failure immediately.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::zero())
    }

    /// The number of retries allowed after the initial attempt.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// The fixed delay slept between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run a plain closure under this policy.
    ///
    /// Use the underlying [`redis_retry!`](crate::redis_retry) macro when the
    /// operation needs mutable borrows, or when a failure callback should run
    /// between attempts.
    pub fn call<T>(
        self,
        host: &str,
        mut fallible: impl FnMut() -> RedisResult<T>,
    ) -> Result<T, RedisGuardErr> {
        crate::redis_retry!(self, host, { fallible() })
    }
}

/// What a guarded call surfaces when it doesn't succeed: either the retry
/// budget ran out on retry-worthy failures, or a failure was fatal and is
/// passed through unmodified.
#[derive(Debug)]
pub enum RedisGuardErr {
    /// The whole attempt budget was consumed; wraps the last recorded error.
    RetryExhausted {
        /// The configured retry count that was exhausted.
        attempts: usize,
        /// The error raised by the final attempt.
        last: RedisError,
    },
    /// Not retry-worthy; surfaced on the first occurrence.
    Fatal(RedisError),
}

impl RedisGuardErr {
    /// The underlying client error (the last one recorded when exhausted).
    pub fn last_error(&self) -> &RedisError {
        match self {
            RedisGuardErr::RetryExhausted { last, .. } => last,
            RedisGuardErr::Fatal(e) => e,
        }
    }

    /// True when the retry budget was consumed, rather than a fatal failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RedisGuardErr::RetryExhausted { .. })
    }
}

impl fmt::Display for RedisGuardErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisGuardErr::RetryExhausted { attempts, last } => write!(
                f,
                "Redis retries exhausted after {} retries. Last error: {}",
                attempts, last
            ),
            RedisGuardErr::Fatal(e) => write!(f, "Non-retryable redis error: {}", e),
        }
    }
}

impl std::error::Error for RedisGuardErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last_error())
    }
}

#[doc(hidden)]
pub fn sleep_between_attempts(policy: &RetryPolicy, failed_attempt_no: usize) {
    tracing::debug!(
        "Redis operation failed, sleeping {}ms before retry {}/{}.",
        policy.delay.num_milliseconds(),
        failed_attempt_no + 1,
        policy.attempts
    );
    std::thread::sleep(policy.delay.to_std().unwrap_or_default());
}

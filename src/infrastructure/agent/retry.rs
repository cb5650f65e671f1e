//! Provider retry policy.
//!
//! One policy applies to every provider adapter: errors are classified as
//! rate-limit, transient, or fatal from their message text, rate-limit waits
//! honor a parsed reset time, and transient waits follow a doubling backoff.

use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::time::sleep;
use tracing::warn;

use crate::domain::errors::{CoreError, CoreResult};

const RATE_LIMIT_MARKERS: [&str; 5] =
    ["hit your limit", "rate limit", "usage limit", "429", "quota"];

const TRANSIENT_MARKERS: [&str; 8] = [
    "timeout",
    "connection",
    "500",
    "502",
    "503",
    "504",
    "temporarily",
    "try again",
];

const AUTH_MARKERS: [&str; 2] = ["401", "unauthorized"];

/// Classification of a provider error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimit,
    Transient,
    Fatal,
}

/// Rate-limit detection. Idempotent, and its acceptance set is closed under
/// ASCII case changes.
pub fn is_rate_limit_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn is_transient_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn is_auth_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    AUTH_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify an error message. Rate-limit markers win over transient ones;
/// authentication failures are always fatal.
pub fn classify(message: &str) -> ErrorClass {
    if is_auth_error(message) {
        ErrorClass::Fatal
    } else if is_rate_limit_error(message) {
        ErrorClass::RateLimit
    } else if is_transient_error(message) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Parse a reset time like `resets 5pm`, `resets 5:30pm`, or `resets 17:00`
/// out of a rate-limit message. A reset time in the past means tomorrow at
/// the same wall-clock time.
pub fn parse_reset_time(message: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = message.to_ascii_lowercase();
    let idx = lower.find("reset")?;
    let rest = &lower[idx..];
    let digit_start = rest.find(|c: char| c.is_ascii_digit())?;
    // Digits must follow the marker closely; anything further away is some
    // other number in the message.
    if digit_start > 12 {
        return None;
    }
    let tail = &rest[digit_start..];

    let hour_digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
    let mut hour: u32 = hour_digits.parse().ok()?;
    let mut after = &tail[hour_digits.len()..];

    let mut minute: u32 = 0;
    if let Some(stripped) = after.strip_prefix(':') {
        let minute_digits: String = stripped.chars().take_while(char::is_ascii_digit).collect();
        minute = minute_digits.parse().ok()?;
        after = &stripped[minute_digits.len()..];
    }

    match after.trim_start() {
        s if s.starts_with("pm") && hour != 12 => hour += 12,
        s if s.starts_with("am") && hour == 12 => hour = 0,
        _ => {}
    }

    if hour > 23 || minute > 59 {
        return None;
    }

    let reset = now.date().and_hms_opt(hour, minute, 0)?;
    Some(if reset <= now {
        reset + chrono::Duration::days(1)
    } else {
        reset
    })
}

/// Retry timing knobs. Defaults are the production policy; tests shrink them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
    /// First transient wait; doubles per retry.
    pub transient_initial: Duration,
    pub transient_cap: Duration,
    /// Wait when a rate-limit message has no parsable reset time.
    pub rate_limit_fallback: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 100,
            max_transient_retries: 10,
            transient_initial: Duration::from_secs(30),
            transient_cap: Duration::from_secs(600),
            rate_limit_fallback: Duration::from_secs(60),
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(7200),
        }
    }
}

impl RetryPolicy {
    pub fn with_caps(max_rate_limit_retries: u32, max_transient_retries: u32) -> Self {
        Self {
            max_rate_limit_retries,
            max_transient_retries,
            ..Self::default()
        }
    }

    /// Wait before the next attempt after a rate-limit error: reset time plus
    /// a 10 s buffer, clamped to `[min_wait, max_wait]`.
    pub fn rate_limit_wait(&self, message: &str, now: NaiveDateTime) -> Duration {
        match parse_reset_time(message, now) {
            None => self.rate_limit_fallback,
            Some(reset) => {
                let until = (reset - now).num_seconds().max(0) as u64 + 10;
                Duration::from_secs(until).clamp(self.min_wait, self.max_wait)
            }
        }
    }

    /// Exponential transient backoff: initial * 2^attempt, capped.
    pub fn transient_backoff(&self, attempt: u32) -> Duration {
        let millis = self
            .transient_initial
            .as_millis()
            .saturating_mul(1u128 << attempt.min(63))
            .min(self.transient_cap.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// Drive an operation through the retry ladder.
    ///
    /// Rate-limit and transient failures sleep and retry up to their caps;
    /// fatal failures surface immediately, with authentication text promoted
    /// to `CoreError::Auth`.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let mut rate_limit_attempts = 0u32;
        let mut transient_attempts = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let text = err.to_string();

            match classify(&text) {
                ErrorClass::RateLimit if rate_limit_attempts < self.max_rate_limit_retries => {
                    rate_limit_attempts += 1;
                    let wait = self.rate_limit_wait(&text, Local::now().naive_local());
                    warn!(
                        attempt = rate_limit_attempts,
                        max = self.max_rate_limit_retries,
                        wait_secs = wait.as_secs(),
                        "rate limit hit, waiting for reset"
                    );
                    sleep(wait).await;
                }
                ErrorClass::Transient if transient_attempts < self.max_transient_retries => {
                    let wait = self.transient_backoff(transient_attempts);
                    transient_attempts += 1;
                    warn!(
                        attempt = transient_attempts,
                        max = self.max_transient_retries,
                        wait_secs = wait.as_secs(),
                        error = %text,
                        "transient provider error, backing off"
                    );
                    sleep(wait).await;
                }
                ErrorClass::RateLimit => return Err(CoreError::RateLimit(text)),
                ErrorClass::Transient => return Err(CoreError::Transient(text)),
                ErrorClass::Fatal if is_auth_error(&text) => return Err(CoreError::Auth(text)),
                ErrorClass::Fatal => return Err(err),
            }
        }
    }
}

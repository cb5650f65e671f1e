//! Rate-limit recovery scenarios against the shared retry policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use proofloop::domain::errors::{CoreError, CoreResult};
use proofloop::infrastructure::agent::RetryPolicy;

fn clock(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 8, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// At 4:59pm, a "resets 5pm" rate limit waits one minute plus the 10 s
/// buffer: between 70 and 80 seconds.
#[test]
fn reset_at_five_pm_waits_just_past_the_hour() {
    let policy = RetryPolicy::default();
    let wait = policy.rate_limit_wait("rate limit hit; resets 5pm", clock(16, 59));
    assert!(wait >= Duration::from_secs(70));
    assert!(wait <= Duration::from_secs(80));
}

/// A rate-limited first call retries and succeeds; the caller sees one
/// successful result and no surfaced error, so no iteration is charged.
#[tokio::test]
async fn rate_limited_call_recovers_invisibly() {
    let policy = RetryPolicy {
        rate_limit_fallback: Duration::from_millis(2),
        min_wait: Duration::from_millis(1),
        max_wait: Duration::from_millis(5),
        ..RetryPolicy::default()
    };
    let calls = Arc::new(AtomicU32::new(0));

    let result: CoreResult<&str> = policy
        .execute(|| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CoreError::Provider("rate limit hit; resets 5pm".into()))
                } else {
                    Ok("proceeded")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "proceeded");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

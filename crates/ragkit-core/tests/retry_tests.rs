use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ragkit_core::retry::with_backoff;
use ragkit_core::{Error, RetryPolicy};

#[test]
fn delay_grows_exponentially_and_is_capped() {
    let p = RetryPolicy { max_attempts: 5, base_delay_ms: 100, max_delay_ms: 350 };
    assert_eq!(p.delay_for(1), Duration::from_millis(100));
    assert_eq!(p.delay_for(2), Duration::from_millis(200));
    assert_eq!(p.delay_for(3), Duration::from_millis(350));
    assert_eq!(p.delay_for(80), Duration::from_millis(350));
}

#[test]
fn zero_attempts_is_invalid() {
    let p = RetryPolicy { max_attempts: 0, ..RetryPolicy::default() };
    assert!(matches!(p.validate(), Err(Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_until_success() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::default();
    let out = with_backoff(&policy, "probe", move || async move {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(Error::backend("memory", "down"))
        } else {
            Ok(7)
        }
    })
    .await
    .unwrap();
    assert_eq!(out, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_bounded() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy { max_attempts: 2, ..RetryPolicy::default() };
    let err = with_backoff(&policy, "probe", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(Error::backend("memory", "down"))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn caller_errors_are_not_retried() {
    let counter = AtomicU32::new(0);
    let calls = &counter;
    let err = with_backoff(&RetryPolicy::default(), "probe", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(Error::DimensionMismatch { expected: 4, actual: 3 })
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

//! Admission limiter behaviour under concurrent load
//!
//! Time-sensitive tests run with a paused clock so window waits resolve
//! instantly and deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use storyflow_llm::{ConcurrencyLimiter, LlmError};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_never_more_than_capacity_outstanding() {
    let limiter = ConcurrencyLimiter::new(2, None);
    let holding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..5u64 {
        let limiter = limiter.clone();
        let holding = Arc::clone(&holding);
        let peak = Arc::clone(&peak);
        let completed = Arc::clone(&completed);
        handles.push(tokio::spawn(async move {
            let mut ticket = limiter.acquire().await.unwrap();
            let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(limiter.outstanding() <= 2);

            tokio::time::sleep(Duration::from_millis(10 + i)).await;

            holding.fetch_sub(1, Ordering::SeqCst);
            limiter.release(&mut ticket);
            completed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(completed.load(Ordering::SeqCst), 5);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rolling_window_delays_excess_calls() {
    let limiter = ConcurrencyLimiter::new(10, Some((2, Duration::from_secs(60))));
    let start = Instant::now();

    let _a = limiter.acquire().await.unwrap();
    let _b = limiter.acquire().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    let _c = limiter.acquire().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_window_counts_admissions_not_holders() {
    let limiter = ConcurrencyLimiter::new(1, Some((1, Duration::from_secs(30))));
    let start = Instant::now();

    let first = limiter.acquire().await.unwrap();
    drop(first);

    // Slot is free but the window is still full.
    let _second = limiter.acquire().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let limiter = ConcurrencyLimiter::new(1, None);
    let mut ticket = limiter.acquire().await.unwrap();

    limiter.release(&mut ticket);
    limiter.release(&mut ticket);
    ticket.release();

    assert!(ticket.is_released());
    assert_eq!(limiter.outstanding(), 0);

    let _next = limiter.acquire().await.unwrap();
    assert_eq!(limiter.outstanding(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_wait_does_not_leak_a_slot() {
    let limiter = ConcurrencyLimiter::new(1, None);
    let held = limiter.acquire().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
    assert!(waited.is_err(), "acquire should still be waiting");

    drop(held);
    assert_eq!(limiter.outstanding(), 0);

    let ticket = tokio::time::timeout(Duration::from_millis(50), limiter.acquire())
        .await
        .expect("slot should be free")
        .unwrap();
    assert_eq!(limiter.outstanding(), 1);
    drop(ticket);
}

#[tokio::test]
async fn test_closed_limiter_rejects_acquire() {
    let limiter = ConcurrencyLimiter::new(2, None);
    limiter.close();

    let result = limiter.acquire().await;
    assert!(matches!(result, Err(LlmError::Cancelled)));
}

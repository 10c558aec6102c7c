// ============================================================================
// Rate Limiter Tests
// ============================================================================
//
// Fixed-window throttling properties:
// - exactly `limit` attempts pass within a window, the next is denied
// - a window's denial does not carry into the next window
// - remaining_attempts counts down without consuming attempts
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use warden::{Config, MemoryStore, Purpose, RateLimiter, Store};

fn test_limiter() -> (Arc<MemoryStore>, RateLimiter<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(Config::default());
    (store.clone(), RateLimiter::new(store, config))
}

#[tokio::test]
async fn exactly_limit_attempts_pass_then_deny() {
    let (_, limiter) = test_limiter();
    let window = Duration::from_secs(900);

    for attempt in 1..=7 {
        assert!(
            limiter.is_allowed("ratelimit:test:exact", 7, window).await.unwrap(),
            "attempt {} should pass",
            attempt
        );
    }
    assert!(!limiter.is_allowed("ratelimit:test:exact", 7, window).await.unwrap());
    assert!(!limiter.is_allowed("ratelimit:test:exact", 7, window).await.unwrap());
}

#[tokio::test]
async fn denial_resets_after_window_elapses() {
    let (store, limiter) = test_limiter();
    let window = Duration::from_secs(900);

    for _ in 0..4 {
        limiter.is_allowed("ratelimit:test:reset", 3, window).await.unwrap();
    }
    assert!(!limiter.is_allowed("ratelimit:test:reset", 3, window).await.unwrap());

    store.advance(Duration::from_secs(901));

    assert!(limiter.is_allowed("ratelimit:test:reset", 3, window).await.unwrap());
    assert_eq!(
        limiter
            .remaining_attempts("ratelimit:test:reset", 3)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn remaining_attempts_counts_down() {
    let (_, limiter) = test_limiter();
    let window = Duration::from_secs(900);
    let key = "ratelimit:test:remaining";

    assert_eq!(limiter.remaining_attempts(key, 10).await.unwrap(), 10);

    for used in 1..=10u32 {
        limiter.is_allowed(key, 10, window).await.unwrap();
        assert_eq!(
            limiter.remaining_attempts(key, 10).await.unwrap(),
            10 - used
        );
    }
}

// The concrete login scenario: 11 rapid attempts against a 10-per-15-min
// policy come back true ten times then false, leaving zero attempts.
#[tokio::test]
async fn login_scenario_ten_pass_eleventh_denied() {
    let (_, limiter) = test_limiter();
    let key = "ratelimit:login:user@example.com";
    let window = Duration::from_millis(900_000);

    let mut outcomes = Vec::new();
    for _ in 0..11 {
        outcomes.push(limiter.is_allowed(key, 10, window).await.unwrap());
    }

    assert_eq!(outcomes[..10], [true; 10]);
    assert!(!outcomes[10]);
    assert_eq!(limiter.remaining_attempts(key, 10).await.unwrap(), 0);
}

#[tokio::test]
async fn purposes_use_independent_counters() {
    let (_, limiter) = test_limiter();

    for _ in 0..3 {
        assert!(limiter.check_password_reset("b@example.com").await.unwrap());
    }
    assert!(!limiter.check_password_reset("b@example.com").await.unwrap());

    // Exhausting password reset leaves login and verification untouched
    assert!(limiter.check_login("b@example.com").await.unwrap());
    assert!(limiter
        .check_email_verification("b@example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn failed_attempts_still_consume_budget() {
    // Attempt-based throttling: the counter moves before the guarded
    // action runs, so there is no way to hand an attempt back.
    let (_, limiter) = test_limiter();

    for _ in 0..3 {
        limiter.check(Purpose::PasswordReset, "c@example.com").await.unwrap();
    }
    assert_eq!(
        limiter
            .remaining(Purpose::PasswordReset, "c@example.com")
            .await
            .unwrap(),
        0
    );
}

// ============================================================================
// Redis-backed tests
// ============================================================================

// Note: These tests require a running Redis instance
// Run with: docker run -d -p 6379:6379 redis:7

#[tokio::test]
#[ignore] // Requires Redis
async fn redis_login_scenario() {
    let store = Arc::new(
        warden::RedisStore::connect(
            "redis://127.0.0.1:6379",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to connect to Redis"),
    );
    let limiter = RateLimiter::new(store.clone(), Arc::new(Config::default()));

    // Unique key per run so leftovers from prior runs cannot interfere
    let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());

    for _ in 0..10 {
        assert!(limiter
            .is_allowed(&key, 10, Duration::from_secs(900))
            .await
            .unwrap());
    }
    assert!(!limiter
        .is_allowed(&key, 10, Duration::from_secs(900))
        .await
        .unwrap());
    assert_eq!(limiter.remaining_attempts(&key, 10).await.unwrap(), 0);

    store.del(&key).await.ok();
}

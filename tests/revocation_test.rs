// ============================================================================
// Revocation Tests
// ============================================================================
//
// Bulk session destruction after a security event:
// - fast path through the per-user session index
// - empty index with the fallback scan disabled: no keyspace scan at all
// - budgeted fallback scan over legacy, untrusted session payloads
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use warden::{Config, MemoryStore, SessionManager, SessionStatus, Store};

fn manager_with(config: Config) -> (Arc<MemoryStore>, SessionManager<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), SessionManager::new(store, Arc::new(config)))
}

fn legacy_payload(user_id: &str) -> String {
    format!(r#"{{"user_id":"{}"}}"#, user_id)
}

#[tokio::test]
async fn indexed_revocation_destroys_every_tracked_session() {
    let (store, sessions) = manager_with(Config::default());

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            sessions
                .create_session("u1", serde_json::Value::Null)
                .await
                .unwrap(),
        );
    }

    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert_eq!(revoked, 3);

    for sid in &ids {
        assert_eq!(
            sessions.validate_session(sid).await.unwrap(),
            SessionStatus::Missing
        );
        assert_eq!(
            store.get(&format!("session_user:{}", sid)).await.unwrap(),
            None
        );
    }
    assert!(store.smembers("user_sessions:u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn revocation_count_skips_already_expired_records() {
    let (store, sessions) = manager_with(Config::default());

    sessions
        .create_session("u1", serde_json::Value::Null)
        .await
        .unwrap();
    sessions
        .create_session("u1", serde_json::Value::Null)
        .await
        .unwrap();

    // Past the idle timeout the records are gone, but the index (14-day
    // TTL) still carries both ids.
    store.advance(Duration::from_secs(3601));
    assert_eq!(store.smembers("user_sessions:u1").await.unwrap().len(), 2);

    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert_eq!(revoked, 0);
}

#[tokio::test]
async fn revocation_does_not_cross_users() {
    let (_, sessions) = manager_with(Config::default());

    let mine = sessions
        .create_session("u1", serde_json::Value::Null)
        .await
        .unwrap();
    let theirs = sessions
        .create_session("u2", serde_json::Value::Null)
        .await
        .unwrap();

    assert_eq!(sessions.revoke_user_sessions("u1").await.unwrap(), 1);
    assert_eq!(
        sessions.validate_session(&mine).await.unwrap(),
        SessionStatus::Missing
    );
    assert!(matches!(
        sessions.validate_session(&theirs).await.unwrap(),
        SessionStatus::Active { .. }
    ));
}

#[tokio::test]
async fn empty_index_with_fallback_disabled_returns_zero_without_scanning() {
    let (store, sessions) = manager_with(Config::default());

    // Legacy sessions exist, but with the fallback off they must not be
    // touched, and no payload may be inspected.
    for i in 0..4 {
        store
            .set_ex(&format!("sess:legacy-{}", i), &legacy_payload("u1"), 3600)
            .await
            .unwrap();
    }

    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert_eq!(revoked, 0);
    assert_eq!(store.inspected(), 0);
    assert_eq!(
        store.get("sess:legacy-0").await.unwrap(),
        Some(legacy_payload("u1"))
    );
}

#[tokio::test]
async fn fallback_scan_revokes_matching_legacy_sessions() {
    let mut config = Config::default();
    config.revocation.fallback_scan_enabled = true;
    let (store, sessions) = manager_with(config);

    for i in 0..3 {
        store
            .set_ex(&format!("sess:legacy-{}", i), &legacy_payload("u1"), 3600)
            .await
            .unwrap();
    }
    store
        .set_ex("sess:other", &legacy_payload("u2"), 3600)
        .await
        .unwrap();

    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert_eq!(revoked, 3);

    assert_eq!(store.get("sess:legacy-0").await.unwrap(), None);
    // Another user's session survives
    assert_eq!(
        store.get("sess:other").await.unwrap(),
        Some(legacy_payload("u2"))
    );
}

#[tokio::test]
async fn fallback_scan_respects_key_budget() {
    let mut config = Config::default();
    config.revocation.fallback_scan_enabled = true;
    config.revocation.scan_key_budget = 2;
    config.revocation.scan_page_size = 2;
    let (store, sessions) = manager_with(config);

    for i in 0..5 {
        store
            .set_ex(&format!("sess:legacy-{}", i), &legacy_payload("u1"), 3600)
            .await
            .unwrap();
    }

    // Bounded best-effort: at most 2 keys inspected, at most 2 revoked.
    // The remaining sessions stay live until the operator raises the
    // budget and retries.
    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert!(store.inspected() <= 2, "inspected {} keys", store.inspected());
    assert!(revoked <= 2);

    let mut surviving = 0;
    for i in 0..5 {
        if store
            .get(&format!("sess:legacy-{}", i))
            .await
            .unwrap()
            .is_some()
        {
            surviving += 1;
        }
    }
    assert_eq!(surviving as u64, 5 - revoked);
}

#[tokio::test]
async fn fallback_scan_skips_malformed_payloads() {
    let mut config = Config::default();
    config.revocation.fallback_scan_enabled = true;
    let (store, sessions) = manager_with(config);

    store
        .set_ex("sess:good", &legacy_payload("u1"), 3600)
        .await
        .unwrap();
    store.set_ex("sess:garbage", "{not json", 3600).await.unwrap();
    store
        .set_ex("sess:no-owner", r#"{"version":1}"#, 3600)
        .await
        .unwrap();
    store.set_ex("sess:array", r#"[1,2,3]"#, 3600).await.unwrap();

    let revoked = sessions.revoke_user_sessions("u1").await.unwrap();
    assert_eq!(revoked, 1);

    // Malformed historical payloads are left alone, not treated as errors
    assert!(store.get("sess:garbage").await.unwrap().is_some());
    assert!(store.get("sess:no-owner").await.unwrap().is_some());
    assert!(store.get("sess:array").await.unwrap().is_some());
}

#[tokio::test]
async fn repeated_revocation_is_idempotent() {
    let (_, sessions) = manager_with(Config::default());

    sessions
        .create_session("u1", serde_json::Value::Null)
        .await
        .unwrap();

    assert_eq!(sessions.revoke_user_sessions("u1").await.unwrap(), 1);
    assert_eq!(sessions.revoke_user_sessions("u1").await.unwrap(), 0);
}

// ============================================================================
// Redis-backed tests
// ============================================================================

// Note: These tests require a running Redis instance
// Run with: docker run -d -p 6379:6379 redis:7

#[tokio::test]
#[ignore] // Requires Redis
async fn redis_indexed_revocation() {
    let store = Arc::new(
        warden::RedisStore::connect(
            "redis://127.0.0.1:6379",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to connect to Redis"),
    );

    // Unique user per run so leftovers from prior runs cannot interfere
    let user_id = format!("warden-test-{}", uuid::Uuid::new_v4());
    let sessions = SessionManager::new(store.clone(), Arc::new(Config::default()));

    let sid_a = sessions
        .create_session(&user_id, serde_json::Value::Null)
        .await
        .unwrap();
    let sid_b = sessions
        .create_session(&user_id, serde_json::Value::Null)
        .await
        .unwrap();

    assert_eq!(sessions.revoke_user_sessions(&user_id).await.unwrap(), 2);
    assert_eq!(
        sessions.validate_session(&sid_a).await.unwrap(),
        SessionStatus::Missing
    );
    assert_eq!(
        sessions.validate_session(&sid_b).await.unwrap(),
        SessionStatus::Missing
    );
}

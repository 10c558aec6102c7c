// ============================================================================
// Session Management
// ============================================================================
//
// Session records, the per-user session index, and revocation:
// - "sess:{session_id}"          -> SessionPayload JSON, idle-timeout expiry
// - "user_sessions:{user_id}"    -> set of tracked session ids, index TTL
// - "session_user:{session_id}"  -> owning user id, index TTL
//
// The index exists so that revocation after a security event can destroy
// every session a user owns without reading payloads. Sessions created
// before indexing existed are only reachable through the budgeted
// fallback scan.
//
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::WardenResult;
use crate::metrics;
use crate::store::Store;

pub const SESSION_PAYLOAD_VERSION: u8 = 1;

fn default_payload_version() -> u8 {
    SESSION_PAYLOAD_VERSION
}

/// Versioned session payload.
///
/// `user_id` is the owning identity and is required: any stored value
/// that does not carry one is not a session this subsystem recognizes.
/// `created_at` (unix seconds) drives the absolute timeout and is stamped
/// on first observation for sessions predating the field. `data` is
/// opaque to the subsystem and belongs to the application layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default = "default_payload_version")]
    pub version: u8,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SessionPayload {
    pub fn new(user_id: &str, data: serde_json::Value) -> Self {
        Self {
            version: SESSION_PAYLOAD_VERSION,
            user_id: user_id.to_string(),
            created_at: Some(Utc::now().timestamp()),
            data,
        }
    }
}

/// Outcome of a per-request session check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active { user_id: String },
    /// Idle-expired or never existed
    Missing,
    /// Positively rejected by the absolute age check (or unreadable)
    Expired,
}

pub struct SessionManager<S> {
    store: Arc<S>,
    config: Arc<Config>,
}

impl<S: Store> SessionManager<S> {
    pub fn new(store: Arc<S>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}{}", self.config.prefixes.session, session_id)
    }

    fn owner_key(&self, session_id: &str) -> String {
        format!("{}{}", self.config.prefixes.session_user, session_id)
    }

    fn index_key(&self, user_id: &str) -> String {
        format!("{}{}", self.config.prefixes.user_sessions, user_id)
    }

    /// Create a session record for an authenticated user and register it
    /// in the user's session index. Indexing is best-effort: its failure
    /// is logged and swallowed so it can never fail the login flow.
    pub async fn create_session(
        &self,
        user_id: &str,
        data: serde_json::Value,
    ) -> WardenResult<String> {
        let session_id = Uuid::new_v4().to_string();
        let payload = SessionPayload::new(user_id, data);
        self.store
            .set_ex(
                &self.session_key(&session_id),
                &serde_json::to_string(&payload)?,
                self.config.idle_timeout.as_secs(),
            )
            .await?;

        if let Err(e) = self.track_user_session(user_id, &session_id).await {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to index session; revocation fast path will not see it"
            );
        }

        tracing::info!(user_id = %user_id, session_id = %session_id, "Created session");
        Ok(session_id)
    }

    /// Register a session in the user's index and write its owner
    /// pointer, as one ordered pipeline. No-op when either id is empty.
    pub async fn track_user_session(&self, user_id: &str, session_id: &str) -> WardenResult<()> {
        if user_id.is_empty() || session_id.is_empty() {
            return Ok(());
        }
        self.store
            .sadd_and_set(
                &self.index_key(user_id),
                session_id,
                &self.owner_key(session_id),
                user_id,
                self.config.index_ttl.as_secs(),
            )
            .await?;
        tracing::debug!(user_id = %user_id, session_id = %session_id, "Tracked session");
        Ok(())
    }

    /// Rewrite a session payload. This is a state-changing write, so it
    /// re-arms the idle window. Reads never do.
    pub async fn update_session(
        &self,
        session_id: &str,
        payload: &SessionPayload,
    ) -> WardenResult<()> {
        self.store
            .set_ex(
                &self.session_key(session_id),
                &serde_json::to_string(payload)?,
                self.config.idle_timeout.as_secs(),
            )
            .await
    }

    /// Check a session against the absolute clock.
    ///
    /// The idle clock is the store's own expiry on the record and needs no
    /// check here: an idle-expired session is simply `Missing`. A session
    /// older than the absolute TTL is destroyed and reported `Expired` no
    /// matter how recently it was touched.
    pub async fn validate_session(&self, session_id: &str) -> WardenResult<SessionStatus> {
        let key = self.session_key(session_id);
        let raw = match self.store.get(&key).await? {
            Some(raw) => raw,
            None => return Ok(SessionStatus::Missing),
        };

        let mut payload = match serde_json::from_str::<SessionPayload>(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Destroying session with unreadable payload"
                );
                self.store.del(&key).await?;
                return Ok(SessionStatus::Expired);
            }
        };

        let now = Utc::now().timestamp();
        match payload.created_at {
            None => {
                // First observation of a pre-schema session: stamp it.
                payload.created_at = Some(now);
                self.update_session(session_id, &payload).await?;
                Ok(SessionStatus::Active {
                    user_id: payload.user_id,
                })
            }
            Some(created_at) => {
                if now - created_at > self.config.absolute_ttl.as_secs() as i64 {
                    self.store.del(&key).await?;
                    metrics::SESSIONS_EXPIRED_ABSOLUTE_TOTAL.inc();
                    tracing::info!(
                        user_id = %payload.user_id,
                        session_id = %session_id,
                        age_secs = now - created_at,
                        "Session exceeded absolute age, destroyed"
                    );
                    Ok(SessionStatus::Expired)
                } else {
                    Ok(SessionStatus::Active {
                        user_id: payload.user_id,
                    })
                }
            }
        }
    }

    /// Explicit logout. Owner pointer and index entry self-heal through
    /// their own TTLs.
    pub async fn destroy_session(&self, session_id: &str) -> WardenResult<bool> {
        let removed = self.store.del(&self.session_key(session_id)).await?;
        if removed {
            tracing::info!(session_id = %session_id, "Destroyed session");
        }
        Ok(removed)
    }

    /// Destroy every session owned by `user_id`. Returns the number of
    /// session records whose deletion hit an existing key (tracked ids may
    /// already have idle-expired; zero is a valid outcome).
    ///
    /// A session established concurrently with this call can slip past an
    /// empty index read; there is no locking here. Repeating the call is
    /// idempotent, and the fallback scan is the operational remedy for
    /// pre-index sessions.
    pub async fn revoke_user_sessions(&self, user_id: &str) -> WardenResult<u64> {
        let index_key = self.index_key(user_id);
        let tracked = self.store.smembers(&index_key).await?;

        if !tracked.is_empty() {
            // One pipeline: session records (counted), owner pointers and
            // the index itself (uncounted).
            let mut keys: Vec<String> =
                tracked.iter().map(|sid| self.session_key(sid)).collect();
            keys.extend(tracked.iter().map(|sid| self.owner_key(sid)));
            keys.push(index_key);

            let results = self.store.del_batch(&keys).await?;
            let destroyed = results
                .iter()
                .take(tracked.len())
                .filter(|removed| **removed)
                .count() as u64;

            metrics::SESSIONS_REVOKED_TOTAL.inc_by(destroyed);
            tracing::info!(
                user_id = %user_id,
                tracked = tracked.len(),
                destroyed = destroyed,
                "Revoked all indexed sessions"
            );
            return Ok(destroyed);
        }

        if !self.config.revocation.fallback_scan_enabled {
            self.store.del(&index_key).await?;
            tracing::debug!(user_id = %user_id, "No tracked sessions, fallback scan disabled");
            return Ok(0);
        }

        let destroyed = self.revoke_by_scan(user_id).await?;
        self.store.del(&index_key).await?;
        metrics::SESSIONS_REVOKED_TOTAL.inc_by(destroyed);
        Ok(destroyed)
    }

    /// Budgeted keyspace scan for sessions created before indexing
    /// existed. Best-effort: the scan stops once the inspection budget is
    /// spent, even mid-cursor, and may under-revoke.
    async fn revoke_by_scan(&self, user_id: &str) -> WardenResult<u64> {
        metrics::REVOCATION_FALLBACK_SCANS_TOTAL.inc();

        let budget = self.config.revocation.scan_key_budget;
        let pattern = format!("{}*", self.config.prefixes.session);
        let mut cursor = 0u64;
        let mut inspected = 0u64;
        let mut destroyed = 0u64;

        loop {
            let (next, mut keys) = self
                .store
                .scan_page(cursor, &pattern, self.config.revocation.scan_page_size)
                .await?;

            let remaining = (budget - inspected) as usize;
            let truncated = keys.len() > remaining;
            if truncated {
                keys.truncate(remaining);
            }

            if !keys.is_empty() {
                inspected += keys.len() as u64;
                let payloads = self.store.mget(&keys).await?;

                let mut matched = Vec::new();
                for (key, raw) in keys.iter().zip(payloads) {
                    let Some(raw) = raw else { continue };
                    // Historical data is untrusted: anything that does not
                    // match the payload schema is skipped, not an error.
                    match serde_json::from_str::<SessionPayload>(&raw) {
                        Ok(payload) if payload.user_id == user_id => matched.push(key.clone()),
                        Ok(_) | Err(_) => {}
                    }
                }

                if !matched.is_empty() {
                    // Owner pointers go in the same pipeline so the keys
                    // do not end up re-orphaned.
                    let mut del_keys = matched.clone();
                    for key in &matched {
                        if let Some(sid) = key.strip_prefix(&self.config.prefixes.session) {
                            del_keys.push(self.owner_key(sid));
                        }
                    }
                    let results = self.store.del_batch(&del_keys).await?;
                    destroyed += results
                        .iter()
                        .take(matched.len())
                        .filter(|removed| **removed)
                        .count() as u64;
                }
            }

            if inspected >= budget {
                if truncated || next != 0 {
                    tracing::warn!(
                        user_id = %user_id,
                        inspected = inspected,
                        budget = budget,
                        "Fallback scan stopped at inspection budget, revocation may be \
                         incomplete; raise REVOCATION_SCAN_KEY_BUDGET and retry"
                    );
                    metrics::REVOCATION_SCAN_BUDGET_EXHAUSTED_TOTAL.inc();
                }
                break;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::info!(
            user_id = %user_id,
            destroyed = destroyed,
            inspected = inspected,
            "Fallback scan revocation finished"
        );
        Ok(destroyed)
    }
}

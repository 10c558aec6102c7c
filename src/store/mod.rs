// ============================================================================
// Store Abstraction
// ============================================================================
//
// The key-value operations the subsystem needs from its shared store:
// values with expiry, atomic increment, sets, cursor-paged scans, batched
// reads, and pipelined deletes.
//
// Two implementations:
// - RedisStore: production backend over a managed Redis connection
// - MemoryStore: in-process backend with a virtual clock, used by tests
//
// ============================================================================

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::WardenResult;

/// Operations provided by the shared counter/session store.
///
/// Atomicity is limited to what the store natively offers: single-command
/// atomicity (`incr`, `set_ex`) and ordered batch execution without
/// cross-command rollback (`del_batch`, `sadd_and_set`). Nothing here
/// takes a lock; callers must tolerate partial batch effects and rely on
/// idempotent retries. Cancellation is the caller's concern: apply a
/// request-scoped deadline around store calls.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// GET - string value by key
    async fn get(&self, key: &str) -> WardenResult<Option<String>>;

    /// SETEX - set key to value with expiry in seconds
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> WardenResult<()>;

    /// DEL - returns whether the key existed
    async fn del(&self, key: &str) -> WardenResult<bool>;

    /// Pipelined DELs; `result[i]` reports whether `keys[i]` existed.
    ///
    /// Not all-or-nothing: a crash mid-pipeline can leave a suffix of the
    /// keys undeleted.
    async fn del_batch(&self, keys: &[String]) -> WardenResult<Vec<bool>>;

    /// INCR - atomic increment, returns the post-increment count
    async fn incr(&self, key: &str) -> WardenResult<i64>;

    /// PTTL - remaining lifetime in milliseconds (-2 missing, -1 no expiry)
    async fn pttl(&self, key: &str) -> WardenResult<i64>;

    /// PEXPIRE - arm expiry in milliseconds, returns whether the key exists
    async fn pexpire(&self, key: &str, ttl_ms: i64) -> WardenResult<bool>;

    /// GET parsed as an integer counter; absent key is None
    async fn get_i64(&self, key: &str) -> WardenResult<Option<i64>>;

    /// SADD - add a member to a set
    async fn sadd(&self, key: &str, member: &str) -> WardenResult<()>;

    /// SMEMBERS - all members of a set (empty for an absent key)
    async fn smembers(&self, key: &str) -> WardenResult<Vec<String>>;

    /// EXPIRE - arm expiry in seconds, returns whether the key exists
    async fn expire(&self, key: &str, ttl_secs: i64) -> WardenResult<bool>;

    /// MGET - batched read; preserves key order, None for absent keys
    async fn mget(&self, keys: &[String]) -> WardenResult<Vec<Option<String>>>;

    /// One page of a cursor-based key scan matching `pattern`.
    ///
    /// Start with cursor 0; a returned cursor of 0 means the scan is
    /// complete. `count` is a hint, not a guarantee: pages may be larger
    /// or smaller, and keys may be reported more than once.
    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> WardenResult<(u64, Vec<String>)>;

    /// SADD + EXPIRE + SETEX issued as one ordered pipeline: registers
    /// `member` in the set at `set_key`, bounds the set's lifetime, and
    /// writes a companion key carrying the same TTL.
    async fn sadd_and_set(
        &self,
        set_key: &str,
        member: &str,
        kv_key: &str,
        kv_value: &str,
        ttl_secs: u64,
    ) -> WardenResult<()>;

    /// PING - connectivity check
    async fn ping(&self) -> WardenResult<()>;
}

//! Challenge and verification-token storage.
//!
//! Two backends share one contract:
//! - `Memory`: a mutex-guarded map, for single-instance deployments
//! - `Redis`: shared state across instances; attempts run as one Lua script
//!
//! In both, judging an attempt and updating the record is a single atomic
//! step per challenge id, so concurrent verifies of the same id cannot both
//! succeed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aktar_common::AktarError;
use aktar_common::constants::redis_keys::{CAPTCHA_PREFIX, TOKEN_PREFIX};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use super::{StoredChallenge, StoredToken, token_digest};

/// Result of submitting one selection against a stored challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Correct; the challenge is gone
    Verified,
    /// Wrong; the challenge stays live
    Wrong { remaining: u32 },
    /// Wrong and out of attempts; the challenge is gone
    Exhausted,
    /// Unknown, expired, or already consumed
    Invalid,
}

/// Backend-dispatching store handle
#[derive(Clone)]
pub enum ChallengeStore {
    Memory(Arc<MemoryStore>),
    Redis(RedisStore),
}

impl ChallengeStore {
    pub async fn insert_challenge(
        &self,
        challenge_id: &str,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<(), AktarError> {
        match self {
            Self::Memory(m) => {
                m.insert_challenge(challenge_id, challenge).await;
                Ok(())
            }
            Self::Redis(r) => r.insert_challenge(challenge_id, challenge, ttl_secs).await,
        }
    }

    /// Judge `selected` and update the record in one step
    pub async fn attempt(
        &self,
        challenge_id: &str,
        selected: u8,
        max_attempts: u32,
        now: i64,
    ) -> Result<AttemptOutcome, AktarError> {
        match self {
            Self::Memory(m) => Ok(m.attempt(challenge_id, selected, max_attempts, now).await),
            Self::Redis(r) => r.attempt(challenge_id, selected, max_attempts, now).await,
        }
    }

    pub async fn insert_token(
        &self,
        token: &str,
        record: StoredToken,
        ttl_secs: u64,
    ) -> Result<(), AktarError> {
        match self {
            Self::Memory(m) => {
                m.insert_token(token, record).await;
                Ok(())
            }
            Self::Redis(r) => r.insert_token(token, record, ttl_secs).await,
        }
    }

    /// Remove the token; true only for the first caller inside its window
    pub async fn consume_token(&self, token: &str, now: i64) -> Result<bool, AktarError> {
        match self {
            Self::Memory(m) => Ok(m.consume_token(token, now).await),
            Self::Redis(r) => r.consume_token(token).await,
        }
    }

    /// Backend reachability, for readiness checks
    pub async fn ping(&self) -> bool {
        match self {
            Self::Memory(_) => true,
            Self::Redis(r) => r.ping().await,
        }
    }

    /// Live challenges (memory backend only; Redis reports 0)
    #[cfg(test)]
    pub async fn challenge_count(&self) -> usize {
        match self {
            Self::Memory(m) => m.challenges.lock().await.len(),
            Self::Redis(_) => 0,
        }
    }

    /// Correct index of a live challenge (memory backend only)
    #[cfg(test)]
    pub async fn peek_answer(&self, challenge_id: &str) -> Option<u8> {
        match self {
            Self::Memory(m) => m
                .challenges
                .lock()
                .await
                .get(challenge_id)
                .map(|c| c.correct_index),
            Self::Redis(_) => None,
        }
    }
}

// === Memory backend ===

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    challenges: Mutex<HashMap<String, StoredChallenge>>,
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_challenge(&self, challenge_id: &str, challenge: StoredChallenge) {
        self.challenges
            .lock()
            .await
            .insert(challenge_id.to_string(), challenge);
    }

    pub async fn attempt(
        &self,
        challenge_id: &str,
        selected: u8,
        max_attempts: u32,
        now: i64,
    ) -> AttemptOutcome {
        // Held for the whole check-and-update
        let mut challenges = self.challenges.lock().await;

        let Some(challenge) = challenges.get_mut(challenge_id) else {
            return AttemptOutcome::Invalid;
        };

        if now >= challenge.expires_at {
            challenges.remove(challenge_id);
            return AttemptOutcome::Invalid;
        }

        if selected == challenge.correct_index {
            challenges.remove(challenge_id);
            return AttemptOutcome::Verified;
        }

        challenge.attempts += 1;
        if challenge.attempts >= max_attempts {
            challenges.remove(challenge_id);
            AttemptOutcome::Exhausted
        } else {
            AttemptOutcome::Wrong {
                remaining: max_attempts - challenge.attempts,
            }
        }
    }

    pub async fn insert_token(&self, token: &str, record: StoredToken) {
        self.tokens.lock().await.insert(token_digest(token), record);
    }

    pub async fn consume_token(&self, token: &str, now: i64) -> bool {
        match self.tokens.lock().await.remove(&token_digest(token)) {
            Some(record) => now < record.expires_at,
            None => false,
        }
    }

    /// Drop expired challenges and tokens; returns how many were removed
    pub async fn purge_expired(&self, now: i64) -> usize {
        let mut removed = 0;

        let mut challenges = self.challenges.lock().await;
        let before = challenges.len();
        challenges.retain(|_, c| c.expires_at > now);
        removed += before - challenges.len();
        drop(challenges);

        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        removed += before - tokens.len();

        removed
    }
}

/// Background worker that evicts expired entries from the memory store
pub async fn store_sweeper(
    store: Arc<MemoryStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Challenge sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let removed = store.purge_expired(chrono::Utc::now().timestamp()).await;
                if removed > 0 {
                    tracing::debug!(removed = removed, "Purged expired challenges and tokens");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Challenge sweeper shutting down");
                break;
            }
        }
    }
}

// === Redis backend ===

/// Returns 0 verified, n > 0 remaining attempts, -1 invalid, -2 exhausted.
const ATTEMPT_SCRIPT: &str = r#"
local correct = redis.call('HGET', KEYS[1], 'correct')
if not correct then
    return -1
end
if tonumber(redis.call('HGET', KEYS[1], 'expires_at')) <= tonumber(ARGV[3]) then
    redis.call('DEL', KEYS[1])
    return -1
end
if tonumber(ARGV[1]) == tonumber(correct) then
    redis.call('DEL', KEYS[1])
    return 0
end
local attempts = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
local max = tonumber(ARGV[2])
if attempts >= max then
    redis.call('DEL', KEYS[1])
    return -2
end
return max - attempts
"#;

/// Redis-backed store (auto-reconnecting connection manager)
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    attempt_script: Arc<redis::Script>,
}

fn redis_err(e: redis::RedisError) -> AktarError {
    AktarError::Redis(e.to_string())
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            attempt_script: Arc::new(redis::Script::new(ATTEMPT_SCRIPT)),
        }
    }

    async fn insert_challenge(
        &self,
        challenge_id: &str,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<(), AktarError> {
        let key = format!("{}{}", CAPTCHA_PREFIX, challenge_id);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[
                    ("correct", challenge.correct_index as i64),
                    ("attempts", challenge.attempts as i64),
                    ("created_at", challenge.created_at),
                    ("expires_at", challenge.expires_at),
                ],
            )
            .ignore()
            .expire(&key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(())
    }

    async fn attempt(
        &self,
        challenge_id: &str,
        selected: u8,
        max_attempts: u32,
        now: i64,
    ) -> Result<AttemptOutcome, AktarError> {
        let key = format!("{}{}", CAPTCHA_PREFIX, challenge_id);
        let mut conn = self.conn.clone();

        let code: i64 = self
            .attempt_script
            .key(&key)
            .arg(selected as i64)
            .arg(max_attempts as i64)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(match code {
            0 => AttemptOutcome::Verified,
            -2 => AttemptOutcome::Exhausted,
            n if n > 0 => AttemptOutcome::Wrong {
                remaining: n as u32,
            },
            _ => AttemptOutcome::Invalid,
        })
    }

    async fn insert_token(
        &self,
        token: &str,
        record: StoredToken,
        ttl_secs: u64,
    ) -> Result<(), AktarError> {
        let key = format!("{}{}", TOKEN_PREFIX, token_digest(token));
        let value = serde_json::json!({
            "challenge_id": record.challenge_id,
            "issued_at": record.issued_at,
            "expires_at": record.expires_at,
        });

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, value.to_string(), ttl_secs)
            .await
            .map_err(redis_err)
    }

    async fn consume_token(&self, token: &str) -> Result<bool, AktarError> {
        let key = format!("{}{}", TOKEN_PREFIX, token_digest(token));
        let mut conn = self.conn.clone();

        // DEL reports how many keys it removed; only one caller can see 1
        let removed: i64 = conn.del(&key).await.map_err(redis_err)?;
        Ok(removed == 1)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(correct_index: u8, expires_at: i64) -> StoredChallenge {
        StoredChallenge {
            correct_index,
            attempts: 0,
            created_at: 0,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_attempt_lifecycle() {
        let store = MemoryStore::new();
        store.insert_challenge("c1", stored(2, 1_000)).await;

        assert_eq!(
            store.attempt("c1", 0, 3, 10).await,
            AttemptOutcome::Wrong { remaining: 2 }
        );
        assert_eq!(store.attempt("c1", 2, 3, 10).await, AttemptOutcome::Verified);
        assert_eq!(store.attempt("c1", 2, 3, 10).await, AttemptOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal() {
        let store = MemoryStore::new();
        store.insert_challenge("c1", stored(1, 1_000)).await;

        assert_eq!(
            store.attempt("c1", 0, 3, 10).await,
            AttemptOutcome::Wrong { remaining: 2 }
        );
        assert_eq!(
            store.attempt("c1", 0, 3, 10).await,
            AttemptOutcome::Wrong { remaining: 1 }
        );
        assert_eq!(store.attempt("c1", 0, 3, 10).await, AttemptOutcome::Exhausted);
        assert_eq!(store.attempt("c1", 1, 3, 10).await, AttemptOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_expired_challenge_is_invalid() {
        let store = MemoryStore::new();
        store.insert_challenge("c1", stored(0, 100)).await;
        assert_eq!(store.attempt("c1", 0, 3, 100).await, AttemptOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_token_single_use_and_expiry() {
        let store = MemoryStore::new();
        let record = StoredToken {
            challenge_id: "c1".to_string(),
            issued_at: 0,
            expires_at: 100,
        };
        store.insert_token("t1", record.clone()).await;
        assert!(store.consume_token("t1", 50).await);
        assert!(!store.consume_token("t1", 50).await);

        store.insert_token("t2", record).await;
        assert!(!store.consume_token("t2", 100).await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.insert_challenge("old", stored(0, 50)).await;
        store.insert_challenge("new", stored(0, 500)).await;
        assert_eq!(store.purge_expired(100).await, 1);
        assert_eq!(store.attempt("new", 0, 3, 100).await, AttemptOutcome::Verified);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_correct_attempts_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.insert_challenge("c1", stored(4, 1_000)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.attempt("c1", 4, 3, 10).await })
            })
            .collect();

        let mut verified = 0;
        for handle in handles {
            if handle.await.unwrap() == AttemptOutcome::Verified {
                verified += 1;
            }
        }
        assert_eq!(verified, 1);
    }
}

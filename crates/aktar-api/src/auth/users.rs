//! In-process user directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use aktar_common::{AktarError, UserProfile};
use tokio::sync::RwLock;

/// Stored account
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: u64,
    pub nickname: String,
    pub city: String,
    pub is_admin: bool,
    pub password_hash: String,
    /// SHA-256 of the recovery code, base64
    pub recovery_hash: String,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            nickname: self.nickname.clone(),
            city: self.city.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// Accounts keyed by case-folded nickname
pub struct UserDirectory {
    by_nickname: RwLock<HashMap<String, UserRecord>>,
    next_id: AtomicU64,
}

/// Nicknames compare case-insensitively ("Ayşe" == "ayşe")
fn fold(nickname: &str) -> String {
    nickname.trim().to_lowercase()
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            by_nickname: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a new account; the id is assigned here
    pub async fn create(
        &self,
        nickname: &str,
        city: &str,
        is_admin: bool,
        password_hash: String,
        recovery_hash: String,
    ) -> Result<UserRecord, AktarError> {
        let key = fold(nickname);
        let mut users = self.by_nickname.write().await;

        if users.contains_key(&key) {
            return Err(AktarError::NicknameTaken);
        }

        let record = UserRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            nickname: nickname.trim().to_string(),
            city: city.trim().to_string(),
            is_admin,
            password_hash,
            recovery_hash,
        };
        users.insert(key, record.clone());

        Ok(record)
    }

    pub async fn find_by_nickname(&self, nickname: &str) -> Option<UserRecord> {
        self.by_nickname.read().await.get(&fold(nickname)).cloned()
    }

    pub async fn find_by_id(&self, id: u64) -> Option<UserRecord> {
        self.by_nickname
            .read()
            .await
            .values()
            .find(|u| u.id == id)
            .cloned()
    }

    /// Replace password and recovery hashes if the stored recovery hash
    /// still equals `expected_recovery_hash`.
    ///
    /// Compare and write happen under one write lock, so a recovery code is
    /// spent at most once.
    pub async fn rotate_credentials(
        &self,
        nickname: &str,
        expected_recovery_hash: &str,
        password_hash: String,
        recovery_hash: String,
    ) -> Result<u64, AktarError> {
        let mut users = self.by_nickname.write().await;
        let user = users
            .get_mut(&fold(nickname))
            .filter(|u| u.recovery_hash == expected_recovery_hash)
            .ok_or(AktarError::Auth)?;
        user.password_hash = password_hash;
        user.recovery_hash = recovery_hash;
        Ok(user.id)
    }

    pub async fn len(&self) -> usize {
        self.by_nickname.read().await.len()
    }
}

//! Who is logged in.
//!
//! Token and user live in one persisted blob, so they are always written and
//! cleared together.

use std::sync::Arc;

use aktar_common::{AktarError, UserProfile, constants::storage_keys};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ClientError;
use crate::storage::{Storage, heal, read_present};

/// Persisted `{ token, user }` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user: UserProfile,
}

pub struct SessionStore {
    storage: Arc<dyn Storage>,
    state: watch::Sender<Option<SessionData>>,
}

impl SessionStore {
    /// Rehydrate from storage; malformed blobs are dropped
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let initial = read_present(storage.as_ref(), storage_keys::SESSION).and_then(|raw| {
            match serde_json::from_str::<SessionData>(&raw) {
                Ok(session) if !session.token.trim().is_empty() => Some(session),
                Ok(_) => {
                    heal(storage.as_ref(), storage_keys::SESSION, "empty token");
                    None
                }
                Err(e) => {
                    heal(storage.as_ref(), storage_keys::SESSION, &e.to_string());
                    None
                }
            }
        });

        let (state, _) = watch::channel(initial);
        Self { storage, state }
    }

    /// Persist a new session; readers see it immediately
    pub fn set_auth(&self, token: impl Into<String>, user: UserProfile) -> Result<(), ClientError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AktarError::Validation("Oturum anahtarı boş olamaz".to_string()).into());
        }

        let session = SessionData { token, user };
        let blob = serde_json::to_string(&session)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.storage.set(storage_keys::SESSION, &blob)?;

        tracing::debug!(user_id = session.user.id, "Session stored");
        self.state.send_replace(Some(session));
        Ok(())
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Replace the stored profile, keeping the token
    pub fn refresh_user(&self, user: UserProfile) -> Result<(), ClientError> {
        match self.token() {
            Some(token) => self.set_auth(token, user),
            None => Ok(()),
        }
    }

    /// Forget token and user together. Idempotent.
    pub fn clear_auth(&self) -> Result<(), ClientError> {
        self.storage.remove(storage_keys::SESSION)?;
        if self.state.send_replace(None).is_some() {
            tracing::debug!("Session cleared");
        }
        Ok(())
    }

    /// Change notifications; the receiver starts at the current value
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionData>> {
        self.state.subscribe()
    }
}

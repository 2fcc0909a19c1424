//! Startup wiring for the client-side stores.

use std::sync::Arc;

use crate::cart::CartStore;
use crate::error::ClientError;
use crate::session::SessionStore;
use crate::storage::{Storage, purge_legacy_keys};
use crate::theme::ThemeStore;

/// Session, cart, and theme over one storage backend
pub struct ClientStores {
    pub session: Arc<SessionStore>,
    pub cart: Arc<CartStore>,
    pub theme: Arc<ThemeStore>,
}

impl ClientStores {
    /// Purge keys left by earlier builds, then load every store.
    ///
    /// Legacy keys are gone before any store reads, so stale values never
    /// surface.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self, ClientError> {
        purge_legacy_keys(storage.as_ref())?;

        Ok(Self {
            session: Arc::new(SessionStore::load(storage.clone())),
            cart: Arc::new(CartStore::load(storage.clone())),
            theme: Arc::new(ThemeStore::load(storage)),
        })
    }
}

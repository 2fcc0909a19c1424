//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::captcha::{ChallengeGenerator, ChallengeStore, ChallengeVerifier, MemoryStore, RedisStore};
use crate::config::{AppConfig, StoreBackend};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Challenge and verification-token storage
    pub store: ChallengeStore,

    /// CAPTCHA generator
    pub generator: Arc<ChallengeGenerator>,

    /// CAPTCHA verifier
    pub verifier: Arc<ChallengeVerifier>,

    /// Registration / login
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Create application state, connecting to Redis when configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = match config.captcha.backend {
            StoreBackend::Memory => ChallengeStore::Memory(Arc::new(MemoryStore::new())),
            StoreBackend::Redis => {
                let client = redis::Client::open(config.redis_url.as_str())
                    .context("Failed to create Redis client")?;

                // Connection manager handles reconnection
                let conn = ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")?;

                ChallengeStore::Redis(RedisStore::new(conn))
            }
        };

        let generator = Arc::new(ChallengeGenerator::new(&config.captcha));
        let verifier = Arc::new(ChallengeVerifier::new(&config.captcha));
        let auth = Arc::new(AuthService::new(&config.auth));

        if let Some(seed) = &config.auth.admin_seed {
            auth.seed_admin(seed)
                .await
                .context("Failed to seed admin account")?;
        }

        Ok(Self {
            config,
            store,
            generator,
            verifier,
            auth,
        })
    }
}

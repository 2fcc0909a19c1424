//! Configuration management for the Aktar API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use aktar_common::constants::{
    CAPTCHA_TTL_SECS, DEFAULT_CIRCLE_COUNT, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REDIS_URL, JWT_TTL_SECS, MIN_PASSWORD_LEN, VERIFICATION_TOKEN_TTL_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL (only used by the redis backend)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// CAPTCHA configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Where challenges and verification tokens live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; single instance deployments and tests
    Memory,
    /// Shared Redis; required when running several API instances
    Redis,
}

/// CAPTCHA-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Circles drawn per challenge
    #[serde(default = "default_circle_count")]
    pub circle_count: usize,

    /// Wrong selections before the challenge is invalidated
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Verification token validity in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    #[serde(default = "default_min_radius")]
    pub min_radius: u32,

    #[serde(default = "default_max_radius")]
    pub max_radius: u32,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            circle_count: default_circle_count(),
            max_attempts: default_max_attempts(),
            challenge_ttl_secs: default_challenge_ttl(),
            token_ttl_secs: default_token_ttl(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            min_radius: default_min_radius(),
            max_radius: default_max_radius(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. When absent an ephemeral one is generated.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// JWT validity in seconds
    #[serde(default = "default_jwt_ttl")]
    pub jwt_ttl_secs: u64,

    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    /// Admin account created at startup if the nickname is free
    #[serde(default)]
    pub admin_seed: Option<AdminSeed>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_ttl_secs: default_jwt_ttl(),
            min_password_len: default_min_password_len(),
            admin_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeed {
    pub nickname: String,
    pub password: String,
    #[serde(default = "default_admin_city")]
    pub city: String,
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_backend() -> StoreBackend { StoreBackend::Memory }
fn default_circle_count() -> usize { DEFAULT_CIRCLE_COUNT }
fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_challenge_ttl() -> u64 { CAPTCHA_TTL_SECS }
fn default_token_ttl() -> u64 { VERIFICATION_TOKEN_TTL_SECS }
fn default_canvas_width() -> u32 { 320 }
fn default_canvas_height() -> u32 { 200 }
fn default_min_radius() -> u32 { 18 }
fn default_max_radius() -> u32 { 30 }
fn default_jwt_ttl() -> u64 { JWT_TTL_SECS }
fn default_min_password_len() -> usize { MIN_PASSWORD_LEN }
fn default_admin_city() -> String { "İstanbul".to_string() }

impl AppConfig {
    /// Load configuration from file and `AKTAR__*` environment variables,
    /// with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        if !Path::new(config_path).exists() {
            tracing::warn!(path = config_path, "Config file not found, using defaults and environment");
        }

        let mut config = Self::from_sources(config_path, Self::environment())?;

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref secret) = args.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("AKTAR")
            .separator("__")
            .try_parsing(true)
    }

    /// Layer the (optional) file under the environment
    fn from_sources(config_path: &str, env: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(env)
            .build()
            .context("Failed to load config")?;

        settings
            .try_deserialize()
            .context("Failed to parse config")
    }

    /// Reject settings the generator or verifier cannot work with
    pub fn validate(&self) -> Result<()> {
        let c = &self.captcha;
        if !(2..=u8::MAX as usize).contains(&c.circle_count) {
            anyhow::bail!("captcha.circle_count must be between 2 and 255");
        }
        if c.max_attempts == 0 {
            anyhow::bail!("captcha.max_attempts must be at least 1");
        }
        if c.min_radius < 8 || c.min_radius > c.max_radius {
            anyhow::bail!("captcha radius bounds are inverted or below 8px");
        }
        if c.canvas_width < 4 * c.max_radius || c.canvas_height < 4 * c.max_radius {
            anyhow::bail!("captcha canvas is too small for the configured radius");
        }
        if c.challenge_ttl_secs == 0 || c.token_ttl_secs == 0 {
            anyhow::bail!("captcha TTLs must be positive");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            captcha: CaptchaConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

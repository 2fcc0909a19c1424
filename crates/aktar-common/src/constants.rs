//! Shared constants for Aktar components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default API HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Number of circles drawn per challenge
pub const DEFAULT_CIRCLE_COUNT: usize = 6;

/// Wrong selections allowed before a challenge is invalidated
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// CAPTCHA challenge expiry (5 minutes)
pub const CAPTCHA_TTL_SECS: u64 = 300;

/// Verification token validity (2 minutes)
pub const VERIFICATION_TOKEN_TTL_SECS: u64 = 120;

/// JWT validity (7 days)
pub const JWT_TTL_SECS: u64 = 7 * 24 * 3600;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Nickname length bounds
pub const NICKNAME_MIN_LEN: usize = 3;
pub const NICKNAME_MAX_LEN: usize = 32;

/// Redis key prefixes
pub mod redis_keys {
    /// CAPTCHA challenge: captcha:{challenge_id}
    pub const CAPTCHA_PREFIX: &str = "captcha:";

    /// Verification token: captcha_token:{sha256(token)}
    pub const TOKEN_PREFIX: &str = "captcha_token:";
}

/// Client persisted storage keys
pub mod storage_keys {
    /// Session blob `{ token, user }`
    pub const SESSION: &str = "aktar:session";

    /// Cart line items
    pub const CART: &str = "aktar:cart";

    /// Theme scalar
    pub const THEME: &str = "aktar:theme";

    /// Ad-hoc keys written by earlier storefront builds, purged on startup
    pub const LEGACY: &[&str] = &[
        "token",
        "user",
        "authToken",
        "cart",
        "cartItems",
        "theme",
        "darkMode",
    ];
}

/// HTTP header names
pub mod headers {
    /// Bearer token header
    pub const AUTHORIZATION: &str = "Authorization";
}

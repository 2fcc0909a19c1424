//! Common error types for Aktar components.

use thiserror::Error;

/// Common errors across Aktar components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AktarError {
    /// Missing or malformed input, rejected before any state change.
    /// The payload is already a user-facing message.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Challenge is missing, expired, or already consumed.
    /// Deliberately not broken down further.
    #[error("Challenge invalid or expired")]
    ChallengeInvalid,

    /// Wrong circle selected; the challenge is still live
    #[error("Wrong selection ({remaining} attempts left)")]
    WrongSelection { remaining: u32 },

    /// Wrong circle selected and the attempt budget is spent
    #[error("Attempts exhausted")]
    AttemptsExhausted,

    /// Requested quantity is above last-known stock
    #[error("Insufficient stock for {product_id}: {available} available")]
    InsufficientStock { product_id: String, available: u32 },

    /// Bad credentials or bad/missing captcha token
    #[error("Authentication failed")]
    Auth,

    /// Nickname already registered
    #[error("Nickname taken")]
    NicknameTaken,

    /// Redis connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AktarError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::ChallengeInvalid => 400,
            Self::WrongSelection { .. } => 400,
            Self::AttemptsExhausted => 400,
            Self::InsufficientStock { .. } => 409,
            Self::Auth => 401,
            Self::NicknameTaken => 409,
            Self::Redis(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Backend details stay in the logs; the auth and challenge variants
    /// collapse every failure mode into one sentence.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::ChallengeInvalid => "Doğrulama geçersiz veya süresi dolmuş".to_string(),
            Self::WrongSelection { remaining } => {
                format!("Yanlış seçim, {remaining} deneme hakkınız kaldı")
            }
            Self::AttemptsExhausted => {
                "Çok fazla hatalı deneme, lütfen yeni doğrulama isteyin".to_string()
            }
            Self::InsufficientStock { available, .. } => {
                format!("Yetersiz stok (mevcut: {available})")
            }
            Self::Auth => "Kullanıcı adı, şifre veya doğrulama hatalı".to_string(),
            Self::NicknameTaken => "Bu kullanıcı adı zaten kullanılıyor".to_string(),
            Self::Redis(_) | Self::Internal(_) => {
                "Sunucu hatası, lütfen tekrar deneyin".to_string()
            }
        }
    }

    /// Transient backend failure; the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

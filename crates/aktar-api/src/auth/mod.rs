//! Captcha-gated registration and login.
//!
//! Every credential-bearing call must present a verification token earned
//! from the CAPTCHA; the token is redeemed before credentials are looked at.

mod password;
mod token;
mod users;

pub use users::{UserDirectory, UserRecord};

use aktar_common::constants::{NICKNAME_MAX_LEN, NICKNAME_MIN_LEN};
use aktar_common::{
    AktarError, AuthPayload, LoginRequest, RegisterPayload, RegisterRequest, UserProfile,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::captcha::{ChallengeStore, ChallengeVerifier};
use crate::config::{AdminSeed, AuthConfig};

const CITY_MAX_LEN: usize = 64;

/// Authentication service
pub struct AuthService {
    users: UserDirectory,
    jwt_secret: String,
    jwt_ttl: u64,
    min_password_len: usize,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let jwt_secret = match config.jwt_secret.clone() {
            Some(secret) => secret,
            None => {
                tracing::warn!("Using ephemeral JWT secret (sessions end on restart)");
                crate::captcha::random_id(32)
            }
        };

        Self {
            users: UserDirectory::new(),
            jwt_secret,
            jwt_ttl: config.jwt_ttl_secs,
            min_password_len: config.min_password_len,
        }
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Create the configured admin account if its nickname is free
    pub async fn seed_admin(&self, seed: &AdminSeed) -> Result<(), AktarError> {
        if self.users.find_by_nickname(&seed.nickname).await.is_some() {
            tracing::info!(nickname = %seed.nickname, "Admin account already present");
            return Ok(());
        }

        let password_hash = hash_blocking(seed.password.clone()).await?;
        let (_, recovery_hash) = recovery_code();
        let user = self
            .users
            .create(&seed.nickname, &seed.city, true, password_hash, recovery_hash)
            .await?;

        tracing::info!(user_id = user.id, nickname = %user.nickname, "Admin account created");
        Ok(())
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        store: &ChallengeStore,
        verifier: &ChallengeVerifier,
    ) -> Result<RegisterPayload, AktarError> {
        self.validate_registration(&req)?;
        verifier.redeem(store, &req.captcha_token).await?;

        let password_hash = hash_blocking(req.password).await?;
        let (recovery_code, recovery_hash) = recovery_code();
        let user = self
            .users
            .create(&req.nickname, &req.city, false, password_hash, recovery_hash)
            .await?;

        tracing::info!(user_id = user.id, "User registered");

        Ok(RegisterPayload {
            token: self.issue(&user)?,
            user: user.profile(),
            recovery_code,
        })
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        store: &ChallengeStore,
        verifier: &ChallengeVerifier,
    ) -> Result<AuthPayload, AktarError> {
        if req.nickname.trim().is_empty() || req.password.is_empty() {
            return Err(AktarError::Validation(
                "Kullanıcı adı ve şifre gerekli".to_string(),
            ));
        }
        verifier.redeem(store, &req.captcha_token).await?;

        let user = self.users.find_by_nickname(&req.nickname).await;
        let candidate = req.password;
        let matched = match &user {
            Some(u) => {
                let phc = u.password_hash.clone();
                blocking(move || password::verify_password(&candidate, &phc)).await?
            }
            None => blocking(move || password::verify_against_dummy(&candidate)).await?,
        };

        match user {
            Some(user) if matched => {
                tracing::info!(user_id = user.id, "User logged in");
                Ok(AuthPayload {
                    token: self.issue(&user)?,
                    user: user.profile(),
                })
            }
            _ => {
                tracing::debug!("Login rejected");
                Err(AktarError::Auth)
            }
        }
    }

    /// Resolve a bearer token to the current profile.
    ///
    /// The admin flag comes from the directory, not the token, so a demoted
    /// user loses it without waiting for expiry.
    pub async fn current_user(&self, bearer: &str) -> Result<UserProfile, AktarError> {
        let claims = token::validate(bearer, &self.jwt_secret)?;
        let id: u64 = claims.sub.parse().map_err(|_| AktarError::Auth)?;

        self.users
            .find_by_id(id)
            .await
            .map(|u| u.profile())
            .ok_or(AktarError::Auth)
    }

    /// Reset a password with the recovery code; returns a fresh code
    pub async fn recover(
        &self,
        nickname: &str,
        code: &str,
        new_password: String,
    ) -> Result<String, AktarError> {
        self.check_password(&new_password)?;

        // Cheap reject before hashing; the rotation below re-checks under lock
        let presented = digest(code.trim());
        let user = self
            .users
            .find_by_nickname(nickname)
            .await
            .ok_or(AktarError::Auth)?;
        if presented != user.recovery_hash {
            return Err(AktarError::Auth);
        }

        let password_hash = hash_blocking(new_password).await?;
        let (recovery_code, recovery_hash) = recovery_code();
        let user_id = self
            .users
            .rotate_credentials(nickname, &presented, password_hash, recovery_hash)
            .await?;

        tracing::info!(user_id = user_id, "Password reset with recovery code");
        Ok(recovery_code)
    }

    fn issue(&self, user: &UserRecord) -> Result<String, AktarError> {
        token::issue(
            user.id,
            &user.nickname,
            user.is_admin,
            &self.jwt_secret,
            self.jwt_ttl,
        )
    }

    fn validate_registration(&self, req: &RegisterRequest) -> Result<(), AktarError> {
        let nickname = req.nickname.trim();
        let len = nickname.chars().count();
        if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
            return Err(AktarError::Validation(format!(
                "Kullanıcı adı {NICKNAME_MIN_LEN}-{NICKNAME_MAX_LEN} karakter olmalı"
            )));
        }
        if !nickname
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(AktarError::Validation(
                "Kullanıcı adı yalnızca harf, rakam, _ ve . içerebilir".to_string(),
            ));
        }

        self.check_password(&req.password)?;
        if req.password != req.confirm_password {
            return Err(AktarError::Validation("Şifreler eşleşmiyor".to_string()));
        }

        let city = req.city.trim();
        if city.is_empty() || city.chars().count() > CITY_MAX_LEN {
            return Err(AktarError::Validation("Geçerli bir şehir girin".to_string()));
        }

        Ok(())
    }

    fn check_password(&self, password: &str) -> Result<(), AktarError> {
        if password.chars().count() < self.min_password_len {
            return Err(AktarError::Validation(format!(
                "Şifre en az {} karakter olmalı",
                self.min_password_len
            )));
        }
        Ok(())
    }
}

/// Argon2 is deliberately slow; keep it off the async workers
async fn blocking<T, F>(f: F) -> Result<T, AktarError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AktarError::Internal(format!("blocking task failed: {e}")))
}

async fn hash_blocking(plain: String) -> Result<String, AktarError> {
    blocking(move || password::hash_password(&plain)).await?
}

fn digest(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value.as_bytes()))
}

/// Returns (code shown to the user, hash to store). Format: `XXXXX-XXXXX`.
fn recovery_code() -> (String, String) {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();

    let mut code: String = (0..10)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    code.insert(5, '-');

    let hash = digest(&code);
    (code, hash)
}

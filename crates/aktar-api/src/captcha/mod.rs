//! Broken-circle CAPTCHA generation and verification.
//!
//! A challenge is a handful of non-overlapping circles, exactly one of which
//! is drawn with an angular gap. The user clicks the broken one; a correct
//! click earns a short-lived verification token that login/register redeem
//! once.
//!
//! ```text
//! create ──► Created ──wrong──► Created ── ... ──► Exhausted
//!               │
//!               ├──correct──► Verified (token issued)
//!               └──ttl──────► Expired
//! ```

mod generator;
mod store;
mod verifier;

pub use generator::ChallengeGenerator;
pub use store::{AttemptOutcome, ChallengeStore, MemoryStore, RedisStore, store_sweeper};
pub use verifier::ChallengeVerifier;

use aktar_common::{PublicChallenge, PublicCircle};

/// A circle as the server knows it
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub id: u8,
    pub x: u32,
    pub y: u32,
    pub radius: u32,
    pub is_broken: bool,
    pub gap_rotation_degrees: u16,
}

/// Full challenge, including the answer.
///
/// Deliberately not `Serialize`; the only way out to a client is
/// [`Challenge::public_view`].
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub circles: Vec<Circle>,
    pub correct_index: u8,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Challenge {
    /// Strip everything that would identify the broken circle
    pub fn public_view(&self, image: String, width: u32, height: u32) -> PublicChallenge {
        PublicChallenge {
            captcha_id: self.id.clone(),
            circles: self
                .circles
                .iter()
                .map(|c| PublicCircle {
                    id: c.id,
                    x: c.x,
                    y: c.y,
                    radius: c.radius,
                })
                .collect(),
            image,
            width,
            height,
            expires_at: self.expires_at,
        }
    }

    /// What the store needs to judge an attempt
    pub fn to_stored(&self) -> StoredChallenge {
        StoredChallenge {
            correct_index: self.correct_index,
            attempts: 0,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Server-side challenge record, keyed by challenge id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChallenge {
    pub correct_index: u8,
    /// Wrong selections so far
    pub attempts: u32,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Server-side verification token record, keyed by token hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub challenge_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Random URL-safe identifier of `len` bytes of entropy
pub(crate) fn random_id(len: usize) -> String {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use rand::Rng;

    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Store key for a verification token; raw tokens are never persisted
pub(crate) fn token_digest(token: &str) -> String {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use sha2::{Digest, Sha256};

    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

//! CAPTCHA verification logic.

use aktar_common::{AktarError, VerifiedToken};

use super::{AttemptOutcome, ChallengeStore, StoredToken, random_id};
use crate::config::CaptchaConfig;

/// CAPTCHA verifier service
pub struct ChallengeVerifier {
    /// Circles per challenge; bounds `selected_index`
    circle_count: usize,
    /// Wrong selections allowed per challenge
    max_attempts: u32,
    /// Verification token TTL in seconds
    pub token_ttl: u64,
}

impl ChallengeVerifier {
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            circle_count: config.circle_count,
            max_attempts: config.max_attempts,
            token_ttl: config.token_ttl_secs,
        }
    }

    /// Verify a circle selection.
    ///
    /// On success the challenge is consumed and a single-use token bound to
    /// it is returned.
    pub async fn verify(
        &self,
        store: &ChallengeStore,
        challenge_id: &str,
        selected_index: i64,
    ) -> Result<VerifiedToken, AktarError> {
        if challenge_id.trim().is_empty() {
            return Err(AktarError::Validation("Doğrulama kimliği eksik".to_string()));
        }
        let selected = u8::try_from(selected_index)
            .ok()
            .filter(|&i| (i as usize) < self.circle_count)
            .ok_or_else(|| AktarError::Validation("Geçersiz daire seçimi".to_string()))?;

        let now = chrono::Utc::now().timestamp();
        let outcome = store
            .attempt(challenge_id, selected, self.max_attempts, now)
            .await?;

        match outcome {
            AttemptOutcome::Verified => {
                let token = random_id(32);
                let expires_at = now + self.token_ttl as i64;
                store
                    .insert_token(
                        &token,
                        StoredToken {
                            challenge_id: challenge_id.to_string(),
                            issued_at: now,
                            expires_at,
                        },
                        self.token_ttl,
                    )
                    .await?;

                tracing::info!(challenge_id = %challenge_id, "CAPTCHA verified successfully");

                Ok(VerifiedToken { token, expires_at })
            }
            AttemptOutcome::Wrong { remaining } => {
                tracing::debug!(
                    challenge_id = %challenge_id,
                    remaining = remaining,
                    "CAPTCHA verification failed"
                );
                Err(AktarError::WrongSelection { remaining })
            }
            AttemptOutcome::Exhausted => {
                tracing::warn!(challenge_id = %challenge_id, "CAPTCHA attempts exhausted");
                Err(AktarError::AttemptsExhausted)
            }
            AttemptOutcome::Invalid => {
                tracing::debug!(challenge_id = %challenge_id, "CAPTCHA challenge invalid or expired");
                Err(AktarError::ChallengeInvalid)
            }
        }
    }

    /// Redeem a verification token for one login/register call
    pub async fn redeem(&self, store: &ChallengeStore, token: &str) -> Result<(), AktarError> {
        if token.is_empty() {
            return Err(AktarError::Auth);
        }

        let now = chrono::Utc::now().timestamp();
        if store.consume_token(token, now).await? {
            Ok(())
        } else {
            Err(AktarError::Auth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::{ChallengeGenerator, MemoryStore, StoredChallenge};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        store: ChallengeStore,
        generator: ChallengeGenerator,
        verifier: ChallengeVerifier,
    }

    fn fixture() -> Fixture {
        let config = CaptchaConfig::default();
        Fixture {
            store: ChallengeStore::Memory(Arc::new(MemoryStore::new())),
            generator: ChallengeGenerator::new(&config),
            verifier: ChallengeVerifier::new(&config),
        }
    }

    /// Issue a challenge and return (id, correct index)
    async fn issue(f: &Fixture) -> (String, i64) {
        let challenge = f.generator.build().unwrap();
        f.store
            .insert_challenge(&challenge.id, challenge.to_stored(), 300)
            .await
            .unwrap();
        (challenge.id, challenge.correct_index as i64)
    }

    fn wrong_index(correct: i64) -> i64 {
        (correct + 1) % DEFAULT_COUNT
    }

    const DEFAULT_COUNT: i64 = aktar_common::constants::DEFAULT_CIRCLE_COUNT as i64;

    #[tokio::test]
    async fn test_correct_selection_issues_token_once() {
        let f = fixture();
        let (id, correct) = issue(&f).await;

        let token = assert_ok!(f.verifier.verify(&f.store, &id, correct).await);
        assert!(!token.token.is_empty());

        let second = f.verifier.verify(&f.store, &id, correct).await;
        assert_eq!(second.unwrap_err(), AktarError::ChallengeInvalid);
    }

    #[tokio::test]
    async fn test_three_wrong_then_correct_fails() {
        let f = fixture();
        let (id, correct) = issue(&f).await;
        let wrong = wrong_index(correct);

        assert_eq!(
            f.verifier.verify(&f.store, &id, wrong).await.unwrap_err(),
            AktarError::WrongSelection { remaining: 2 }
        );
        assert_eq!(
            f.verifier.verify(&f.store, &id, wrong).await.unwrap_err(),
            AktarError::WrongSelection { remaining: 1 }
        );
        assert_eq!(
            f.verifier.verify(&f.store, &id, wrong).await.unwrap_err(),
            AktarError::AttemptsExhausted
        );
        assert_eq!(
            f.verifier.verify(&f.store, &id, correct).await.unwrap_err(),
            AktarError::ChallengeInvalid
        );
    }

    #[tokio::test]
    async fn test_out_of_range_index_does_not_cost_attempt() {
        let f = fixture();
        let (id, correct) = issue(&f).await;

        for bad in [-1, DEFAULT_COUNT, 10_000] {
            assert!(matches!(
                f.verifier.verify(&f.store, &id, bad).await,
                Err(AktarError::Validation(_))
            ));
        }
        assert_ok!(f.verifier.verify(&f.store, &id, correct).await);
    }

    #[tokio::test]
    async fn test_unknown_and_expired_look_the_same() {
        let f = fixture();
        f.store
            .insert_challenge(
                "stale",
                StoredChallenge {
                    correct_index: 0,
                    attempts: 0,
                    created_at: 0,
                    expires_at: 1,
                },
                300,
            )
            .await
            .unwrap();

        let unknown = f.verifier.verify(&f.store, "nope", 0).await.unwrap_err();
        let expired = f.verifier.verify(&f.store, "stale", 0).await.unwrap_err();
        assert_eq!(unknown, expired);
        assert_eq!(unknown.user_message(), expired.user_message());
    }

    #[tokio::test]
    async fn test_token_redeemed_once() {
        let f = fixture();
        let (id, correct) = issue(&f).await;
        let token = f.verifier.verify(&f.store, &id, correct).await.unwrap();

        assert_ok!(f.verifier.redeem(&f.store, &token.token).await);
        assert_err!(f.verifier.redeem(&f.store, &token.token).await);
        assert_err!(f.verifier.redeem(&f.store, "").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifies_single_success() {
        let f = Arc::new(fixture());
        let (id, correct) = issue(&f).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                let id = id.clone();
                tokio::spawn(async move { f.verifier.verify(&f.store, &id, correct).await.is_ok() })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}

//! Opt-out links for contact senders.

use chrono::{DateTime, Duration, Utc};
use domains::{BlockTokens, DomainError, EmailAddress};
use tracing::debug;

use crate::signer::TimedSigner;

/// Namespace keeping block tokens apart from session cookies.
pub const BLOCK_TOKEN_SALT: &str = "block-email";

pub struct SignedBlockTokens {
    signer: TimedSigner,
}

impl SignedBlockTokens {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            signer: TimedSigner::new(secret, BLOCK_TOKEN_SALT),
        }
    }
}

impl BlockTokens for SignedBlockTokens {
    fn issue(&self, email: &EmailAddress, now: DateTime<Utc>) -> Result<String, DomainError> {
        self.signer
            .sign(email.as_str(), now)
            .map_err(|err| DomainError::upstream(anyhow::anyhow!(err)))
    }

    fn verify(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<EmailAddress, DomainError> {
        let payload = self.signer.unsign(token, max_age, now).map_err(|err| {
            debug!(error = %err, "block token rejected");
            DomainError::InvalidToken
        })?;
        EmailAddress::parse(&payload).map_err(|_| DomainError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_for_thirty_days_then_expires() {
        let tokens = SignedBlockTokens::new(b"top-secret");
        let issued = Utc::now();
        let email = EmailAddress::parse("a@x.com").unwrap();
        let token = tokens.issue(&email, issued).unwrap();

        let max_age = Duration::days(30);
        let verified = tokens
            .verify(&token, max_age, issued + Duration::days(30))
            .unwrap();
        assert_eq!(verified, email);

        assert!(matches!(
            tokens.verify(&token, max_age, issued + Duration::days(30) + Duration::seconds(1)),
            Err(DomainError::InvalidToken)
        ));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let issuer = SignedBlockTokens::new(b"one-secret");
        let verifier = SignedBlockTokens::new(b"other-secret");
        let now = Utc::now();
        let token = issuer
            .issue(&EmailAddress::parse("a@x.com").unwrap(), now)
            .unwrap();
        assert!(matches!(
            verifier.verify(&token, Duration::days(30), now),
            Err(DomainError::InvalidToken)
        ));
    }
}

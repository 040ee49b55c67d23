//! # TimedSigner
//!
//! Tamper-proof, self-contained tokens: HS256 JWTs carrying the payload in
//! `sub`, the issue time in `iat` and the signer's salt in `aud`. JWTs are
//! URL-safe base64 and dots, so they travel in a path segment or a cookie.
//!
//! The salt is checked on every verify, so a token minted under one salt
//! never verifies under another. Age is measured against the caller's clock
//! rather than a baked-in `exp`, since the allowed age is the verifier's call.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignerError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token was issued for another purpose")]
    WrongPurpose,

    #[error("token expired {age_secs}s after issue (max {max_age_secs}s)")]
    Expired { age_secs: i64, max_age_secs: i64 },

    #[error("token could not be encoded: {0}")]
    Encode(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    aud: String,
    iat: i64,
}

#[derive(Clone)]
pub struct TimedSigner {
    salt: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TimedSigner {
    pub fn new(secret: &[u8], salt: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[salt]);
        validation.set_required_spec_claims(&["aud", "sub"]);
        validation.validate_exp = false;

        Self {
            salt: salt.to_string(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn sign(&self, payload: &str, issued_at: DateTime<Utc>) -> Result<String, SignerError> {
        let claims = Claims {
            sub: payload.to_string(),
            aud: self.salt.clone(),
            iat: issued_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| SignerError::Encode(err.to_string()))
    }

    /// Checks the signature first, then the salt and the age. Returns the payload.
    pub fn unsign(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, SignerError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => SignerError::BadSignature,
                ErrorKind::InvalidAudience => SignerError::WrongPurpose,
                _ => SignerError::Malformed,
            })?
            .claims;

        let age_secs = now.timestamp() - claims.iat;
        if age_secs > max_age.num_seconds() {
            return Err(SignerError::Expired {
                age_secs,
                max_age_secs: max_age.num_seconds(),
            });
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn round_trips_within_max_age() {
        let signer = TimedSigner::new(b"secret", "block-email");
        let token = signer.sign("a@x.com", at(1_000)).unwrap();
        assert_eq!(token.matches('.').count(), 2);
        assert_eq!(
            signer.unsign(&token, Duration::seconds(60), at(1_060)).unwrap(),
            "a@x.com"
        );
    }

    #[test]
    fn rejects_expired_tokens() {
        let signer = TimedSigner::new(b"secret", "block-email");
        let token = signer.sign("a@x.com", at(1_000)).unwrap();
        assert_eq!(
            signer.unsign(&token, Duration::seconds(60), at(1_061)),
            Err(SignerError::Expired {
                age_secs: 61,
                max_age_secs: 60
            })
        );
    }

    #[test]
    fn salts_separate_namespaces() {
        let block = TimedSigner::new(b"secret", "block-email");
        let session = TimedSigner::new(b"secret", "admin-session");
        let token = block.sign("a@x.com", at(1_000)).unwrap();
        assert_eq!(
            session.unsign(&token, Duration::days(1), at(1_000)),
            Err(SignerError::WrongPurpose)
        );
    }

    #[test]
    fn other_secrets_fail_the_signature() {
        let issuer = TimedSigner::new(b"secret", "block-email");
        let verifier = TimedSigner::new(b"another", "block-email");
        let token = issuer.sign("a@x.com", at(1_000)).unwrap();
        assert_eq!(
            verifier.unsign(&token, Duration::days(1), at(1_000)),
            Err(SignerError::BadSignature)
        );
    }

    #[test]
    fn any_altered_character_is_detected() {
        let signer = TimedSigner::new(b"secret", "block-email");
        let token = signer.sign("a@x.com", at(1_000)).unwrap();
        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered == token {
                continue;
            }
            assert!(
                signer
                    .unsign(&tampered, Duration::days(30), at(1_000))
                    .is_err(),
                "flip at {i} went unnoticed"
            );
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = TimedSigner::new(b"secret", "block-email");
        assert_eq!(
            signer.unsign("no-dots-here", Duration::days(1), at(0)),
            Err(SignerError::Malformed)
        );
    }
}

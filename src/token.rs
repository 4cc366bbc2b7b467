//!
//! beacon token codec
//! ------------------
//! Signed, time-bounded claims shared by the bearer-token and session-cookie
//! credential paths. Tokens are HS256-signed against one process-wide secret;
//! a claim carries the principal id as `sub`, an expiry, and optionally an
//! `aud` tag for purpose-scoped tokens (e.g. account verification links)
//! that must never be accepted as session credentials.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AppError, AppResult};

/// Audience tag carried by account-verification tokens.
pub const ACCOUNT_VERIFICATION_AUDIENCE: &str = "account:verification";

/// Decode failure kinds. All of them surface to callers as
/// `AppError::InvalidCredentials`, with the kind preserved in the code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature does not verify")]
    SignatureMismatch,
    #[error("token audience does not match")]
    AudienceMismatch,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed_token",
            TokenError::Expired => "expired_token",
            TokenError::SignatureMismatch => "signature_mismatch",
            TokenError::AudienceMismatch => "audience_mismatch",
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::invalid_credentials(err.code().to_string(), err.to_string())
    }
}

/// Claim set carried by every token. Created at issuance, consumed (never
/// mutated) by `TokenCodec::decode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaim {
    /// Principal id, as a string.
    pub sub: String,
    /// Expiry, epoch seconds.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// A freshly issued access token in its external shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Encoder/decoder bound to the process-wide signing secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a claim for `subject` expiring after `ttl`. An `audience`
    /// scopes the token to one purpose; session tokens carry none.
    pub fn encode(&self, subject: &str, ttl: Duration, audience: Option<&str>) -> AppResult<String> {
        let claim = TokenClaim {
            sub: subject.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
            aud: audience.map(|a| a.to_string()),
        };
        encode(&Header::default(), &claim, &self.encoding)
            .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
    }

    /// Issue a bearer access token for `subject` in its external shape.
    pub fn issue(&self, subject: &str, ttl: Duration) -> AppResult<IssuedToken> {
        let expires_at = Utc::now() + ttl;
        let access_token = self.encode(subject, ttl, None)?;
        Ok(IssuedToken { access_token, token_type: "bearer".into(), expires_at })
    }

    /// Verify signature and expiry, and enforce the audience both ways:
    /// an expected audience must match the claim's, and a claim carrying an
    /// audience is refused when none is expected. Expiry is checked with
    /// zero leeway.
    pub fn decode(&self, token: &str, expected_audience: Option<&str>) -> Result<TokenClaim, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match expected_audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        let data = decode::<TokenClaim>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                ErrorKind::InvalidAudience => TokenError::AudienceMismatch,
                ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => TokenError::AudienceMismatch,
                _ => TokenError::Malformed,
            }
        })?;
        // A purpose-scoped token must not pass where a plain session token
        // is expected.
        if expected_audience.is_none() && data.claims.aud.is_some() {
            return Err(TokenError::AudienceMismatch);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret")
    }

    #[test]
    fn round_trip_preserves_subject() {
        let c = codec();
        let tok = c.encode("user-1", Duration::minutes(5), None).unwrap();
        let claim = c.decode(&tok, None).expect("decode");
        assert_eq!(claim.sub, "user-1");
        assert!(claim.aud.is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let c = codec();
        let tok = c.encode("user-1", Duration::seconds(-60), None).unwrap();
        assert_eq!(c.decode(&tok, None), Err(TokenError::Expired));
    }

    #[test]
    fn wrong_secret_is_signature_mismatch() {
        let tok = codec().encode("user-1", Duration::minutes(5), None).unwrap();
        let other = TokenCodec::new("another-secret");
        assert_eq!(other.decode(&tok, None), Err(TokenError::SignatureMismatch));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(codec().decode("not.a.token", None), Err(TokenError::Malformed));
    }

    #[test]
    fn audience_is_enforced_both_ways() {
        let c = codec();
        let scoped = c
            .encode("user-1", Duration::minutes(5), Some(ACCOUNT_VERIFICATION_AUDIENCE))
            .unwrap();
        // matching expectation passes
        assert!(c.decode(&scoped, Some(ACCOUNT_VERIFICATION_AUDIENCE)).is_ok());
        // a scoped token cannot stand in for a session token
        assert_eq!(c.decode(&scoped, None), Err(TokenError::AudienceMismatch));
        // a plain token cannot pass an audience expectation
        let plain = c.encode("user-1", Duration::minutes(5), None).unwrap();
        assert_eq!(
            c.decode(&plain, Some(ACCOUNT_VERIFICATION_AUDIENCE)),
            Err(TokenError::AudienceMismatch)
        );
    }

    #[test]
    fn issue_reports_expiry() {
        let issued = codec().issue("user-1", Duration::minutes(10)).unwrap();
        assert_eq!(issued.token_type, "bearer");
        assert!(issued.expires_at > Utc::now());
    }
}

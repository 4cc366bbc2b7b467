use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::principal::Principal;
use crate::error::{AppError, AppResult};
use crate::token::{TokenClaim, TokenCodec, TokenError};

/// Resolves a claim subject to a principal. Implemented by the user
/// repository; a lookup miss is not an error, it maps to
/// `PrincipalNotFound` in the validator.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_principal(&self, id: Uuid) -> AppResult<Option<Principal>>;
}

/// Accepts a bearer token and/or a session cookie value and produces an
/// authenticated principal. Both carriers hold the same signed-claim
/// format; the bearer token takes priority and the cookie is a deliberate
/// fallback, consulted only when the bearer is absent or fails to decode.
pub struct CredentialValidator<L> {
    codec: TokenCodec,
    users: L,
}

impl<L: UserLookup> CredentialValidator<L> {
    pub fn new(codec: TokenCodec, users: L) -> Self {
        Self { codec, users }
    }

    pub fn codec(&self) -> &TokenCodec { &self.codec }

    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        cookie: Option<&str>,
    ) -> AppResult<Principal> {
        if bearer.is_none() && cookie.is_none() {
            return Err(AppError::unauthenticated("no bearer token or session cookie supplied"));
        }

        let mut claim: Option<TokenClaim> = None;
        let mut last_err: Option<TokenError> = None;

        if let Some(token) = bearer {
            match self.codec.decode(token, None) {
                Ok(c) => claim = Some(c),
                Err(e) => {
                    warn!(target: "beacon::auth", "invalid bearer token: {e}");
                    last_err = Some(e);
                }
            }
        }
        if claim.is_none() {
            if let Some(token) = cookie {
                match self.codec.decode(token, None) {
                    Ok(c) => claim = Some(c),
                    Err(e) => {
                        warn!(target: "beacon::auth", "invalid session cookie: {e}");
                        last_err = Some(e);
                    }
                }
            }
        }

        let Some(claim) = claim else {
            // at least one credential was present and failed to decode
            return Err(last_err.map(AppError::from).unwrap_or_else(|| {
                AppError::invalid_credentials("invalid_credentials", "could not validate credentials")
            }));
        };

        let subject = Uuid::parse_str(&claim.sub)
            .map_err(|_| AppError::invalid_credentials("malformed_token", "token subject is not a valid id"))?;
        match self.users.find_principal(subject).await? {
            Some(principal) => Ok(principal),
            None => Err(AppError::principal_not_found("user referenced by the token does not exist")),
        }
    }
}

pub fn require_active(principal: &Principal) -> AppResult<()> {
    if !principal.is_active {
        return Err(AppError::inactive("inactive user"));
    }
    Ok(())
}

/// Privilege check, distinct from active-status: only `is_superuser`
/// qualifies. Merely being active is not sufficient.
pub fn require_superuser(principal: &Principal) -> AppResult<()> {
    if !principal.is_superuser {
        return Err(AppError::privilege("the user doesn't have enough privileges"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(active: bool, superuser: bool) -> Principal {
        Principal { id: Uuid::new_v4(), is_active: active, is_superuser: superuser }
    }

    #[test]
    fn active_check() {
        assert!(require_active(&principal(true, false)).is_ok());
        assert!(require_active(&principal(false, false)).is_err());
    }

    #[test]
    fn superuser_check_ignores_active_flag() {
        // an active non-superuser must NOT pass a superuser gate
        assert!(require_superuser(&principal(true, false)).is_err());
        assert!(require_superuser(&principal(false, true)).is_ok());
        assert!(require_superuser(&principal(true, true)).is_ok());
    }
}

//! Central identity handling: resolving signed credentials to a Principal
//! and the derived authorization checks composed by request handlers.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod validator;

pub use principal::Principal;
pub use validator::{require_active, require_superuser, CredentialValidator, UserLookup};

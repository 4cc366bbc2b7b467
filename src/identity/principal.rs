use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated identity resolved from a validated credential.
/// Produced only by the credential validator, never built by request
/// handlers; immutable for the lifetime of one request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub is_active: bool,
    pub is_superuser: bool,
}

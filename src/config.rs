//! Process configuration, read once from the environment at startup and
//! passed by value to the server.

use base64::Engine;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Settings {
    pub http_port: u16,
    /// Process-wide signing secret shared by every token carrier.
    pub secret_key: String,
    pub access_token_ttl_minutes: i64,
    /// Per-subscriber event queue capacity.
    pub subscriber_queue: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let secret_key = match std::env::var("BEACON_SECRET_KEY") {
            Ok(s) if !s.trim().is_empty() => s,
            _ => {
                warn!("BEACON_SECRET_KEY is unset; generated a random secret, issued tokens will not survive a restart");
                random_secret()
            }
        };
        Self {
            http_port: env_parse("BEACON_HTTP_PORT", 8000),
            secret_key,
            access_token_ttl_minutes: env_parse("BEACON_TOKEN_TTL_MINUTES", 60 * 24),
            subscriber_queue: env_parse("BEACON_EVENT_QUEUE", crate::notify::DEFAULT_SUBSCRIBER_QUEUE),
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_ttl_minutes)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

fn random_secret() -> String {
    // 256-bit random secret, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

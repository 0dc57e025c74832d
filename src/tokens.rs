use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::SecurityConfig;
use crate::error::{Error, Result};

pub const PREFERENCES_ACTION: &str = "customer_news_preferences";
pub const PAGINATE_ACTION: &str = "customer_news_paginate";

const TOKEN_LEN: usize = 10;
const KEY_CONTEXT: &str = "customer-news 2024 request tokens";

/// Issues and checks short, time-bounded tokens tying an action to a user.
///
/// A token is valid during the tick it was issued in and the one after, so
/// it lives between half and the whole configured lifetime.
#[derive(Clone)]
pub struct RequestTokens {
    key: [u8; 32],
    lifetime: Duration,
}

impl std::fmt::Debug for RequestTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTokens")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl RequestTokens {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            lifetime: lifetime.max(Duration::from_secs(2)),
        }
    }

    /// Uses the configured secret, or a per-process one when none is set.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let lifetime = Duration::from_secs(config.token_lifetime);
        if config.token_secret.is_empty() {
            tracing::debug!("No token secret configured, tokens are valid for this process only");
            Self::new(&process_secret(), lifetime)
        } else {
            Self::new(&config.token_secret, lifetime)
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, action: &str, user_id: &str) -> String {
        self.issue_at(action, user_id, unix_now())
    }

    pub fn verify(&self, action: &str, user_id: &str, token: &str) -> bool {
        self.verify_at(action, user_id, token, unix_now())
    }

    /// Like `verify`, mapping a rejection to `Error::InvalidToken`.
    pub fn check(&self, action: &str, user_id: &str, token: &str) -> Result<()> {
        if self.verify(action, user_id, token) {
            Ok(())
        } else {
            tracing::warn!("Rejected {} token for user {}", action, user_id);
            Err(Error::InvalidToken(action.to_string()))
        }
    }

    fn tick(&self, unix_secs: u64) -> u64 {
        let half = (self.lifetime.as_secs() / 2).max(1);
        unix_secs / half
    }

    fn token_for_tick(&self, tick: u64, action: &str, user_id: &str) -> String {
        let message = format!("{}|{}|{}", tick, action, user_id);
        let hash = blake3::keyed_hash(&self.key, message.as_bytes());
        hash.to_hex()[..TOKEN_LEN].to_string()
    }

    fn issue_at(&self, action: &str, user_id: &str, unix_secs: u64) -> String {
        self.token_for_tick(self.tick(unix_secs), action, user_id)
    }

    fn verify_at(&self, action: &str, user_id: &str, token: &str, unix_secs: u64) -> bool {
        if token.len() != TOKEN_LEN {
            return false;
        }

        let tick = self.tick(unix_secs);
        [Some(tick), tick.checked_sub(1)]
            .into_iter()
            .flatten()
            .any(|t| constant_time_eq(&self.token_for_tick(t, action, user_id), token))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 32 random bytes from the OS-seeded thread RNG, hex encoded.
fn process_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    blake3::Hash::from(bytes).to_hex().to_string()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

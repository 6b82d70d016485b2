//! Session token store: random tokens, hashed at rest, with TTL and
//! per-user caps.
//!
//! The raw token exists in exactly one place, the return value of
//! [`TokenStore::create`]. Lookups key on the SHA-256 of the raw token, so a
//! leaked store dump cannot be replayed as credentials. Expired entries are
//! swept lazily on every create, validate, and count.

use crate::canonical::sha256_hex;
use crate::capability::SessionType;
use crate::config::SessionConfig;
use crate::error::{Error, Result, TokenErrorCode};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Tokens never carry fewer than 32 random bytes regardless of config.
const MIN_TOKEN_BYTES: usize = 32;

/// Everything stored about one session token. The raw token is not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub session_type: SessionType,
    /// Opaque host-defined payload.
    pub data: Option<Value>,
}

/// Options for [`TokenStore::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Clamped to the configured maximum.
    pub ttl_hours: Option<u32>,
    pub client_ip: Option<String>,
    pub session_type: Option<SessionType>,
    pub data: Option<Value>,
}

/// Result of validating a token.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    pub valid: bool,
    pub metadata: Option<SessionRecord>,
    pub reason: Option<String>,
}

impl TokenValidation {
    fn invalid(reason: &str) -> Self {
        TokenValidation {
            valid: false,
            metadata: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// In-memory token store keyed by token hash.
#[derive(Debug)]
pub struct TokenStore {
    config: SessionConfig,
    entries: Mutex<HashMap<String, SessionRecord>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        TokenStore::new(SessionConfig::default())
    }
}

impl TokenStore {
    pub fn new(config: SessionConfig) -> Self {
        TokenStore {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a new token for `user_id`. The returned string is the only copy
    /// of the raw token; it cannot be retrieved again.
    pub fn create(&self, user_id: &str, options: CreateOptions) -> Result<String> {
        let now = Utc::now();
        let ttl_hours = options
            .ttl_hours
            .unwrap_or(self.config.default_ttl_hours)
            .min(self.config.max_ttl_hours);

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut entries, now);

        let active = entries.values().filter(|r| r.user_id == user_id).count();
        if active >= self.config.max_tokens_per_user {
            return Err(Error::TokenError {
                code: TokenErrorCode::MaxTokensPerUser,
            });
        }

        let byte_length = self.config.token_byte_length.max(MIN_TOKEN_BYTES);
        let mut bytes = vec![0u8; byte_length];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let raw_token = hex::encode(&bytes);

        let record = SessionRecord {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours as i64),
            client_ip: options.client_ip,
            session_type: options.session_type.unwrap_or(SessionType::Api),
            data: options.data,
        };
        entries.insert(sha256_hex(raw_token.as_bytes()), record);

        tracing::debug!(user = %user_id, ttl_hours, "session token issued");
        Ok(raw_token)
    }

    /// Validate a raw token, optionally binding it to the presenting IP.
    pub fn validate(&self, token: &str, client_ip: Option<&str>) -> TokenValidation {
        let now = Utc::now();
        let key = sha256_hex(token.as_bytes());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut entries, now);

        let Some(record) = entries.get(&key) else {
            return TokenValidation::invalid("unknown token");
        };
        if record.expires_at <= now {
            entries.remove(&key);
            return TokenValidation::invalid("token expired");
        }
        if self.config.bind_to_client_ip {
            if let (Some(bound), Some(presented)) = (record.client_ip.as_deref(), client_ip) {
                if bound != presented {
                    return TokenValidation::invalid("client IP mismatch");
                }
            }
        }
        TokenValidation {
            valid: true,
            metadata: Some(record.clone()),
            reason: None,
        }
    }

    /// Remove one token. Returns whether it existed.
    pub fn invalidate(&self, token: &str) -> bool {
        let key = sha256_hex(token.as_bytes());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
            .is_some()
    }

    /// Remove every token belonging to `user_id`. Returns how many were
    /// dropped.
    pub fn invalidate_all(&self, user_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, record| record.user_id != user_id);
        before - entries.len()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut entries, now)
    }

    /// Live tokens currently held by `user_id`.
    pub fn active_token_count(&self, user_id: &str) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut entries, now);
        entries.values().filter(|r| r.user_id == user_id).count()
    }
}

fn sweep(entries: &mut HashMap<String, SessionRecord>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, record| record.expires_at > now);
    before - entries.len()
}

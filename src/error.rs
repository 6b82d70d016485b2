//! Rampart error types.
//!
//! Recoverable limit errors (rate, quota, token cap, skill workflow) carry
//! enough structure for callers to surface a retry hint. Capability, schema,
//! and validation denials are results, not errors, except for
//! navigation blocks which are raised as typed errors so callers cannot
//! ignore them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which sliding-window limit was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    Minute,
    Hourly,
    Concurrent,
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitKind::Minute => write!(f, "minute"),
            RateLimitKind::Hourly => write!(f, "hourly"),
            RateLimitKind::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Fixed per-session quota resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaResource {
    Cron,
    Webhook,
    Budget,
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaResource::Cron => write!(f, "cron"),
            QuotaResource::Webhook => write!(f, "webhook"),
            QuotaResource::Budget => write!(f, "budget"),
        }
    }
}

/// Why a navigation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationBlockCategory {
    EmptyUrl,
    InvalidUrl,
    DangerousProtocol,
    UnsupportedProtocol,
    Homograph,
    CloudMetadata,
    PrivateNetwork,
    NotAllowlisted,
    Blocklisted,
    RedirectChain,
}

impl std::fmt::Display for NavigationBlockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NavigationBlockCategory::EmptyUrl => "empty-url",
            NavigationBlockCategory::InvalidUrl => "invalid-url",
            NavigationBlockCategory::DangerousProtocol => "dangerous-protocol",
            NavigationBlockCategory::UnsupportedProtocol => "unsupported-protocol",
            NavigationBlockCategory::Homograph => "homograph",
            NavigationBlockCategory::CloudMetadata => "cloud-metadata",
            NavigationBlockCategory::PrivateNetwork => "private-network",
            NavigationBlockCategory::NotAllowlisted => "not-allowlisted",
            NavigationBlockCategory::Blocklisted => "blocklisted",
            NavigationBlockCategory::RedirectChain => "redirect-chain",
        };
        write!(f, "{s}")
    }
}

/// Token store failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenErrorCode {
    MaxTokensPerUser,
}

/// Skill installation workflow failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillErrorCode {
    MaxPendingExceeded,
    NotFound,
    InvalidStatus,
}

/// Rampart error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A sliding-window rate limit was exhausted.
    #[error("rate limit exceeded ({kind}): {current}/{limit}, retry in {retry_after_ms} ms")]
    RateLimitExceeded {
        kind: RateLimitKind,
        limit: u32,
        current: u32,
        retry_after_ms: u64,
    },

    /// A fixed per-session quota was exhausted.
    #[error("quota exceeded ({resource}): {current}/{limit}")]
    QuotaExceeded {
        resource: QuotaResource,
        limit: f64,
        current: f64,
    },

    /// Navigation refused by a guard category.
    #[error("navigation blocked ({category}): {reason}")]
    BlockedNavigation {
        category: NavigationBlockCategory,
        reason: String,
    },

    /// Navigation refused by the per-session rate limit.
    #[error("navigation rate limit exceeded, retry in {retry_after_ms} ms")]
    NavigationRateLimit { retry_after_ms: u64 },

    /// Session token store failure.
    #[error("token error: {code:?}")]
    TokenError { code: TokenErrorCode },

    /// Skill installation workflow failure.
    #[error("skill installation error for '{skill_id}': {code:?}")]
    SkillInstallation {
        skill_id: String,
        code: SkillErrorCode,
    },

    /// Shipper or file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Event or config serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for rampart operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Retry hint in milliseconds, when the error is recoverable by waiting.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Error::RateLimitExceeded { retry_after_ms, .. }
            | Error::NavigationRateLimit { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

//! Typed configuration for the security middleware.
//!
//! Rampart consumes a single [`SecurityConfig`] record; loading it from disk
//! or a UI is the host's concern. Every section ships working defaults, and
//! every field carries `#[serde(default)]` semantics so partial documents
//! deserialize cleanly.

use serde::{Deserialize, Serialize};

/// Top-level configuration record, one section per engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub prompt_sanitizer: SanitizerConfig,
    pub output_redaction: RedactionConfig,
    pub tool_policy: ToolPolicyConfig,
    pub browser_guard: BrowserGuardConfig,
    pub webhook: WebhookConfig,
    pub session: SessionConfig,
    pub skill_gate: SkillGateConfig,
    pub audit: AuditConfig,
}

/// Inbound sanitizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub enabled: bool,
    pub log_events: bool,
    /// When set, high-risk input is replaced by a blocked-content sentinel
    /// instead of being wrapped.
    pub strict_mode: bool,
    pub high_risk_threshold: u32,
    pub strip_unicode: bool,
    pub normalize_whitespace: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        SanitizerConfig {
            enabled: true,
            log_events: true,
            strict_mode: false,
            high_risk_threshold: 50,
            strip_unicode: true,
            normalize_whitespace: true,
        }
    }
}

/// Outbound redactor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Restrict the pattern sweep to high-confidence catalogue entries.
    pub strict_patterns: bool,
    pub detect_entropy: bool,
    pub detect_base64: bool,
    pub entropy_threshold: f64,
    pub min_entropy_length: usize,
    /// Placeholder template; `{TYPE}` is replaced by the match kind.
    pub placeholder: String,
    /// Exact substrings that are never redacted.
    pub whitelist: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        RedactionConfig {
            strict_patterns: false,
            detect_entropy: true,
            detect_base64: true,
            entropy_threshold: 4.5,
            min_entropy_length: 20,
            placeholder: "[REDACTED:{TYPE}]".to_string(),
            whitelist: Vec::new(),
        }
    }
}

/// Tool policy engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicyConfig {
    pub capability_checks: bool,
    pub schema_validation: bool,
    pub rate_limits: RateLimitConfig,
    pub confirmation_gate: ConfirmationConfig,
}

impl Default for ToolPolicyConfig {
    fn default() -> Self {
        ToolPolicyConfig {
            capability_checks: true,
            schema_validation: true,
            rate_limits: RateLimitConfig::default(),
            confirmation_gate: ConfirmationConfig::default(),
        }
    }
}

/// Sliding-window and quota limits, per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_tool_calls_per_minute: u32,
    pub max_tool_calls_per_hour: u32,
    pub max_concurrent_executions: u32,
    pub max_cron_jobs_per_session: u32,
    pub max_webhooks_per_session: u32,
    /// Daily token spend budget in USD, reset at UTC midnight.
    pub max_daily_token_budget_usd: f64,
    pub window_size_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_tool_calls_per_minute: 20,
            max_tool_calls_per_hour: 100,
            max_concurrent_executions: 5,
            max_cron_jobs_per_session: 10,
            max_webhooks_per_session: 5,
            max_daily_token_budget_usd: 5.0,
            window_size_ms: 3_600_000,
        }
    }
}

/// Confirmation gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Pending confirmation lifetime.
    pub timeout_ms: u64,
    pub require_high: bool,
    pub require_medium: bool,
    pub require_low: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        ConfirmationConfig {
            timeout_ms: 300_000,
            require_high: true,
            require_medium: true,
            require_low: false,
        }
    }
}

/// Navigation guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserGuardConfig {
    pub max_navigations_per_minute: u32,
    pub max_navigations_per_hour: u32,
    pub max_redirect_chain_length: u32,
    pub allow_data_urls: bool,
    pub block_homograph_attacks: bool,
    /// When non-empty, hosts must match an entry (`*.` prefix = subdomains).
    pub domain_allowlist: Vec<String>,
    pub domain_blocklist: Vec<String>,
}

impl Default for BrowserGuardConfig {
    fn default() -> Self {
        BrowserGuardConfig {
            max_navigations_per_minute: 30,
            max_navigations_per_hour: 300,
            max_redirect_chain_length: 10,
            allow_data_urls: false,
            block_homograph_attacks: true,
            domain_allowlist: Vec::new(),
            domain_blocklist: Vec::new(),
        }
    }
}

/// Webhook authenticator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub require_hmac: bool,
    /// CIDR rules; bare IPs are treated as /32. Empty permits all sources.
    pub ip_allowlist: Vec<String>,
    /// Default HMAC algorithm name: sha1, sha256, sha384, or sha512.
    pub algorithm: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            require_hmac: true,
            ip_allowlist: Vec::new(),
            algorithm: "sha256".to_string(),
        }
    }
}

/// Session token store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_ttl_hours: u32,
    pub default_ttl_hours: u32,
    pub bind_to_client_ip: bool,
    pub token_byte_length: usize,
    pub max_tokens_per_user: usize,
    pub cleanup_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_ttl_hours: 8,
            default_ttl_hours: 4,
            bind_to_client_ip: false,
            token_byte_length: 32,
            max_tokens_per_user: 10,
            cleanup_interval_ms: 300_000,
        }
    }
}

/// Skill gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillGateConfig {
    pub auto_install: bool,
    pub require_owner_approval: bool,
    pub verify_hashes: bool,
    /// Hash algorithm name: sha256, sha384, or sha512.
    pub hash_algorithm: String,
    pub approval_expiration_ms: u64,
    pub max_pending_approvals: usize,
}

impl Default for SkillGateConfig {
    fn default() -> Self {
        SkillGateConfig {
            auto_install: false,
            require_owner_approval: true,
            verify_hashes: true,
            hash_algorithm: "sha256".to_string(),
            approval_expiration_ms: 86_400_000,
            max_pending_approvals: 50,
        }
    }
}

/// Audit logger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub hash_chain: bool,
    pub shipper: ShipperConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            hash_chain: true,
            shipper: ShipperConfig::default(),
        }
    }
}

/// Which shipper the audit logger hands events to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// `file`, `console`, or `custom` (host supplies the implementation).
    #[serde(rename = "type")]
    pub shipper_type: String,
    pub file_path: Option<String>,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        ShipperConfig {
            shipper_type: "console".to_string(),
            file_path: None,
            batch_size: 10,
            flush_interval_ms: 5000,
        }
    }
}

//! Tool policy engine: capability matrix, rate limiter, schema validator,
//! and confirmation gate layered over every tool dispatch.
//!
//! Checks short-circuit on the first denial. Capability denial and schema
//! failure come back as decisions with `allowed=false`; rate and quota
//! exhaustion are typed errors because the caller can retry them. A denied
//! capability can never be rescued by the later layers.

use crate::capability::{Capability, CapabilityMatrix, SessionType};
use crate::config::ToolPolicyConfig;
use crate::confirmation::{
    classify_action, classify_command, ActionClassification, ConfirmOutcome, ConfirmationGate,
    PendingConfirmation,
};
use crate::error::Result;
use crate::patterns::{ActionCategory, Severity};
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::schema::{SchemaRegistry, SchemaViolation};
use serde_json::Value;

/// One tool invocation to be authorized.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub session_id: String,
    pub session_type: SessionType,
    pub capability: Capability,
    pub tool_name: String,
    /// Logical action name for the fixed classification table, when the
    /// tool name alone is not specific enough.
    pub action: Option<String>,
    pub args: Value,
}

/// The engine's verdict on one tool call.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_confirmation: bool,
    /// Present when a confirmation was enqueued for this call.
    pub confirmation: Option<PendingConfirmation>,
    pub classification: Option<ActionClassification>,
    /// Populated on denial; the structured refusal handed back to the model.
    pub reason: Option<String>,
    pub rate: Option<RateLimitStatus>,
    pub violations: Vec<SchemaViolation>,
    pub warnings: Vec<String>,
}

impl PolicyDecision {
    fn denied(reason: String) -> Self {
        PolicyDecision {
            allowed: false,
            requires_confirmation: false,
            confirmation: None,
            classification: None,
            reason: Some(reason),
            rate: None,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// The four-layer policy stack. Each engine instance owns its own rate and
/// confirmation state.
#[derive(Debug)]
pub struct ToolPolicyEngine {
    config: ToolPolicyConfig,
    capabilities: CapabilityMatrix,
    rate_limiter: RateLimiter,
    schemas: SchemaRegistry,
    confirmations: ConfirmationGate,
}

impl Default for ToolPolicyEngine {
    fn default() -> Self {
        ToolPolicyEngine::new(ToolPolicyConfig::default())
    }
}

impl ToolPolicyEngine {
    pub fn new(config: ToolPolicyConfig) -> Self {
        ToolPolicyEngine::with_matrix(config, CapabilityMatrix::default_matrix())
    }

    pub fn with_matrix(config: ToolPolicyConfig, capabilities: CapabilityMatrix) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limits.clone());
        let confirmations = ConfirmationGate::new(config.confirmation_gate.clone());
        ToolPolicyEngine {
            config,
            capabilities,
            rate_limiter,
            schemas: SchemaRegistry::with_builtins(),
            confirmations,
        }
    }

    pub fn capabilities(&self) -> &CapabilityMatrix {
        &self.capabilities
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    /// Authorize one tool call.
    ///
    /// Returns `Err` only for recoverable limit errors; policy denials are
    /// `Ok` decisions with `allowed=false`.
    pub fn check_tool_call(&self, request: &ToolCallRequest) -> Result<PolicyDecision> {
        // (a) Capability matrix.
        let capability_check = self
            .capabilities
            .check(request.session_type, request.capability);
        if self.config.capability_checks && !capability_check.allowed {
            tracing::warn!(
                session = %request.session_id,
                tool = %request.tool_name,
                capability = ?request.capability,
                "tool call denied by capability matrix"
            );
            return Ok(PolicyDecision::denied(format!(
                "capability {:?} denied for session type {:?}",
                request.capability, request.session_type
            )));
        }

        // (b) Rate limiter. Errors propagate with retry hints.
        let rate = self.rate_limiter.check_tool_call(&request.session_id)?;

        // (c) Schema validator.
        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        if self.config.schema_validation {
            let validation = self.schemas.validate(&request.tool_name, &request.args);
            warnings = validation.warnings;
            if !validation.valid {
                violations = validation.violations;
                return Ok(PolicyDecision {
                    allowed: false,
                    requires_confirmation: false,
                    confirmation: None,
                    classification: None,
                    reason: Some(format!(
                        "arguments for '{}' failed schema validation",
                        request.tool_name
                    )),
                    rate: Some(rate),
                    violations,
                    warnings,
                })
            }
        }

        // (d) Confirmation gate. Destructive-pattern details take priority
        // over a bare capability confirm.
        let classification = self.classify(request);
        let pattern_requires = classification
            .as_ref()
            .map(|c| self.confirmations.severity_requires(c.severity))
            .unwrap_or(false);
        let requires_confirmation = capability_check.requires_confirmation || pattern_requires;

        let (confirmation, effective) = if requires_confirmation {
            let effective = classification.clone().unwrap_or_else(|| {
                capability_confirmation_classification(request.capability)
            });
            let pending = self.confirmations.create_pending(
                &request.session_id,
                &request.tool_name,
                request.args.clone(),
                &effective,
            );
            (Some(pending), Some(effective))
        } else {
            (None, classification.clone())
        };

        Ok(PolicyDecision {
            allowed: true,
            requires_confirmation,
            confirmation,
            classification: effective,
            reason: None,
            rate: Some(rate),
            violations,
            warnings,
        })
    }

    /// Present a confirmation ID for a previously gated call.
    pub fn confirm(&self, id: &str, session_id: &str) -> ConfirmOutcome {
        self.confirmations.confirm(id, session_id)
    }

    fn classify(&self, request: &ToolCallRequest) -> Option<ActionClassification> {
        if request.tool_name == "bash" {
            if let Some(command) = request.args.get("command").and_then(Value::as_str) {
                if let Some(c) = classify_command(command) {
                    return Some(c);
                }
            }
        }
        let action = request.action.as_deref().unwrap_or(&request.tool_name);
        classify_action(action)
    }
}

fn capability_confirmation_classification(capability: Capability) -> ActionClassification {
    let category = if capability.is_irreversible() {
        ActionCategory::Destructive
    } else {
        ActionCategory::Security
    };
    ActionClassification {
        category,
        severity: Severity::High,
        description: format!("capability {capability:?} requires confirmation"),
        matched: format!("{capability:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfirmationConfig, RateLimitConfig};
    use serde_json::json;

    fn request(session_type: SessionType, capability: Capability, tool: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            session_id: "sess-1".to_string(),
            session_type,
            capability,
            tool_name: tool.to_string(),
            action: None,
            args,
        }
    }

    #[test]
    fn test_guest_denied_without_consuming_rate() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::Guest,
            Capability::FileRead,
            "fileRead",
            json!({"path": "/tmp/x"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.as_deref().unwrap().contains("denied"));
        // The denial never reached the rate limiter.
        assert!(decision.rate.is_none());
    }

    #[test]
    fn test_allowed_call_reports_remaining() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::FileRead,
            "fileRead",
            json!({"path": "/tmp/x"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(decision.allowed);
        assert!(!decision.requires_confirmation);
        assert!(decision.rate.unwrap().remaining_minute < 20);
    }

    #[test]
    fn test_rate_limit_error_propagates() {
        let config = ToolPolicyConfig {
            rate_limits: RateLimitConfig {
                max_tool_calls_per_minute: 3,
                ..RateLimitConfig::default()
            },
            ..ToolPolicyConfig::default()
        };
        let engine = ToolPolicyEngine::new(config);
        let req = request(
            SessionType::MainStandard,
            Capability::FileRead,
            "fileRead",
            json!({"path": "/tmp/x"}),
        );
        for _ in 0..3 {
            engine.check_tool_call(&req).unwrap();
        }
        let err = engine.check_tool_call(&req).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::RateLimitExceeded {
                kind: crate::error::RateLimitKind::Minute,
                limit: 3,
                current: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_schema_failure_is_denial_not_error() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::ShellSandboxed,
            "bash",
            json!({"cmd": "ls"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(!decision.allowed);
        assert!(!decision.violations.is_empty());
    }

    #[test]
    fn test_destructive_command_requires_confirmation() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::ShellSandboxed,
            "bash",
            json!({"command": "rm -rf /srv/data"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(decision.allowed);
        assert!(decision.requires_confirmation);
        let pending = decision.confirmation.unwrap();
        assert_eq!(pending.session_id, "sess-1");
        let classification = decision.classification.unwrap();
        assert_eq!(classification.category, ActionCategory::Destructive);
        assert_eq!(classification.severity, Severity::High);
    }

    #[test]
    fn test_benign_command_passes_without_confirmation() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::ShellSandboxed,
            "bash",
            json!({"command": "cargo test"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(decision.allowed);
        assert!(!decision.requires_confirmation);
        assert!(decision.confirmation.is_none());
    }

    #[test]
    fn test_capability_confirm_without_pattern() {
        // MainStandard FileDelete is `confirm` in the default matrix, with a
        // tool that has no registered schema or destructive pattern.
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::FileDelete,
            "fileTrash",
            json!({"path": "/tmp/x"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(decision.allowed);
        assert!(decision.requires_confirmation);
        let classification = decision.classification.unwrap();
        assert_eq!(classification.category, ActionCategory::Destructive);
    }

    #[test]
    fn test_confirm_consumed_once() {
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::MainStandard,
            Capability::ShellSandboxed,
            "bash",
            json!({"command": "git push --force origin main"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        let pending = decision.confirmation.unwrap();
        assert!(engine.confirm(&pending.id, "sess-1").is_confirmed());
        assert!(!engine.confirm(&pending.id, "sess-1").is_confirmed());
    }

    #[test]
    fn test_severity_filter_can_disable_medium() {
        let config = ToolPolicyConfig {
            confirmation_gate: ConfirmationConfig {
                require_medium: false,
                ..ConfirmationConfig::default()
            },
            ..ToolPolicyConfig::default()
        };
        let engine = ToolPolicyEngine::new(config);
        // git reset --hard classifies as medium severity.
        let req = request(
            SessionType::MainStandard,
            Capability::ShellSandboxed,
            "bash",
            json!({"command": "git reset --hard HEAD~3"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(decision.allowed);
        assert!(!decision.requires_confirmation);
        // The classification is still reported for auditing.
        assert!(decision.classification.is_some());
    }

    #[test]
    fn test_denied_capability_not_escalated_by_confirmation() {
        // Sandbox may not run bash no matter what confirmation flow follows.
        let engine = ToolPolicyEngine::default();
        let req = request(
            SessionType::Sandbox,
            Capability::ShellSandboxed,
            "bash",
            json!({"command": "ls"}),
        );
        let decision = engine.check_tool_call(&req).unwrap();
        assert!(!decision.allowed);
        assert!(decision.confirmation.is_none());
    }
}

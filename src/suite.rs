//! The policy bundle: one struct owning every engine plus the audit logger.
//!
//! Hosts construct a [`SecuritySuite`] from a [`SecurityConfig`] and route
//! the whole conversation flow through it: inbound content, tool
//! dispatch, navigation, webhook ingress, outbound text. Each policy
//! decision made here emits exactly one audit event. Engines remain usable
//! standalone; the suite only adds the wiring.

use crate::audit::{AuditLogger, AuditOutcome, AuditParams, AuditShipper};
use crate::capability::Capability;
use crate::config::SecurityConfig;
use crate::error::{Error, Result};
use crate::navigation::NavigationGuard;
use crate::redactor::{MonitoredRedactor, Redacted};
use crate::sanitizer::{SanitizeAction, Sanitized, Sanitizer, SourceContext};
use crate::skill_gate::SkillGate;
use crate::token_store::TokenStore;
use crate::tool_policy::{PolicyDecision, ToolCallRequest, ToolPolicyEngine};
use crate::webhook::{VerificationOutcome, WebhookAuthenticator};
use serde_json::{json, Value};
use std::sync::Arc;

/// Every policy engine behind one front door.
pub struct SecuritySuite {
    sanitizer: Sanitizer,
    redactor: MonitoredRedactor,
    tool_policy: ToolPolicyEngine,
    navigation: NavigationGuard,
    webhook: WebhookAuthenticator,
    tokens: TokenStore,
    skills: SkillGate,
    audit: AuditLogger,
}

impl SecuritySuite {
    pub fn new(config: SecurityConfig) -> Self {
        let audit = AuditLogger::new(config.audit.clone());
        SecuritySuite::build(config, audit)
    }

    /// Use a host-supplied shipper (the `custom` shipper type).
    pub fn with_shipper(config: SecurityConfig, shipper: Arc<dyn AuditShipper>) -> Self {
        let audit = AuditLogger::with_shipper(config.audit.clone(), shipper);
        SecuritySuite::build(config, audit)
    }

    fn build(config: SecurityConfig, audit: AuditLogger) -> Self {
        SecuritySuite {
            sanitizer: Sanitizer::new(config.prompt_sanitizer.clone()),
            redactor: MonitoredRedactor::new(config.output_redaction.clone()),
            tool_policy: ToolPolicyEngine::new(config.tool_policy.clone()),
            navigation: NavigationGuard::new(config.browser_guard.clone()),
            webhook: WebhookAuthenticator::new(config.webhook.clone()),
            tokens: TokenStore::new(config.session.clone()),
            skills: SkillGate::new(config.skill_gate.clone()),
            audit,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn skills(&self) -> &SkillGate {
        &self.skills
    }

    pub fn tool_policy(&self) -> &ToolPolicyEngine {
        &self.tool_policy
    }

    pub fn navigation(&self) -> &NavigationGuard {
        &self.navigation
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn redactor(&self) -> &MonitoredRedactor {
        &self.redactor
    }

    /// Sanitize inbound content and record the decision.
    pub async fn sanitize_inbound(
        &self,
        content: &str,
        source: &str,
        session_id: &str,
        ctx: &SourceContext<'_>,
    ) -> Result<Sanitized> {
        let result = self.sanitizer.sanitize(content, source, ctx);
        let outcome = match result.action {
            SanitizeAction::Blocked => AuditOutcome::Blocked,
            _ => AuditOutcome::Success,
        };
        self.audit
            .log(AuditParams {
                session_id: session_id.to_string(),
                channel: source.to_string(),
                tool_name: "inbound-sanitizer".to_string(),
                args: Some(json!({
                    "content_hash": result.original_hash,
                    "content_len": content.len(),
                })),
                outcome: Some(outcome),
                metadata: Some(json!({
                    "risk_score": result.risk_score,
                    "categories": result.categories,
                    "action": result.action,
                })),
                ..AuditParams::default()
            })
            .await?;
        Ok(result)
    }

    /// Redact outbound text and record the decision.
    pub async fn redact_outbound(
        &self,
        text: &str,
        session_id: &str,
        channel: &str,
    ) -> Result<Redacted> {
        let result = self.redactor.redact(text);
        self.audit
            .log(AuditParams {
                session_id: session_id.to_string(),
                channel: channel.to_string(),
                tool_name: "outbound-redactor".to_string(),
                args: Some(json!({"content_len": text.len()})),
                outcome: Some(AuditOutcome::Success),
                metadata: Some(json!({
                    "modified": result.modified,
                    "counts_by_kind": result.counts_by_kind,
                })),
                ..AuditParams::default()
            })
            .await?;
        Ok(result)
    }

    /// Authorize one tool call, folding in the navigation guard for
    /// browser navigation, and record the decision.
    pub async fn authorize_tool_call(&self, request: &ToolCallRequest) -> Result<PolicyDecision> {
        if request.capability == Capability::BrowserNavigate {
            if let Some(url) = request.args.get("url").and_then(Value::as_str) {
                if let Err(err) = self.navigation.check_navigation(&request.session_id, url) {
                    self.log_tool_outcome(request, AuditOutcome::Blocked, Some(err.to_string()))
                        .await?;
                    return Err(err);
                }
            }
        }

        match self.tool_policy.check_tool_call(request) {
            Ok(decision) if decision.allowed => {
                if request.capability == Capability::BrowserNavigate {
                    self.navigation.record_navigation(&request.session_id);
                }
                self.log_tool_outcome(request, AuditOutcome::Success, None)
                    .await?;
                Ok(decision)
            }
            Ok(decision) => {
                self.log_tool_outcome(request, AuditOutcome::Blocked, decision.reason.clone())
                    .await?;
                Ok(decision)
            }
            Err(err) => {
                self.log_tool_outcome(request, AuditOutcome::Error, Some(err.to_string()))
                    .await?;
                Err(err)
            }
        }
    }

    /// Verify webhook ingress and record the decision.
    pub async fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        secret: &[u8],
        source_ip: Option<&str>,
        session_id: &str,
    ) -> Result<VerificationOutcome> {
        let outcome = self.webhook.verify(payload, signature_header, secret, source_ip);
        self.audit
            .log(AuditParams {
                session_id: session_id.to_string(),
                channel: "webhook".to_string(),
                tool_name: "webhook-authenticator".to_string(),
                args: Some(json!({"payload_len": payload.len()})),
                outcome: Some(if outcome.valid {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Blocked
                }),
                error_message: outcome.reason.clone(),
                ..AuditParams::default()
            })
            .await?;
        Ok(outcome)
    }

    /// Present a confirmation ID for a previously gated tool call.
    pub fn confirm(&self, id: &str, session_id: &str) -> crate::confirmation::ConfirmOutcome {
        self.tool_policy.confirm(id, session_id)
    }

    /// Flush and close the audit pipeline.
    pub async fn close(&self) -> Result<()> {
        self.audit.flush().await?;
        self.audit.close().await
    }

    async fn log_tool_outcome(
        &self,
        request: &ToolCallRequest,
        outcome: AuditOutcome,
        error_message: Option<String>,
    ) -> Result<()> {
        self.audit
            .log(AuditParams {
                session_id: request.session_id.clone(),
                channel: "tool-dispatch".to_string(),
                tool_name: request.tool_name.clone(),
                args: Some(request.args.clone()),
                outcome: Some(outcome),
                error_message,
                ..AuditParams::default()
            })
            .await
            .map(|_| ())
    }
}

/// Structured refusal handed back to the model when a tool call is denied.
pub fn refusal_message(decision: &PolicyDecision) -> String {
    let reason = decision
        .reason
        .as_deref()
        .unwrap_or("policy denied the request");
    format!("<tool-call-refused reason=\"{}\"/>", crate::sanitizer::xml_escape(reason))
}

/// Structured refusal for a navigation error.
pub fn navigation_refusal(err: &Error) -> String {
    match err {
        Error::BlockedNavigation { category, reason } => format!(
            "<navigation-refused category=\"{category}\" reason=\"{}\"/>",
            crate::sanitizer::xml_escape(reason)
        ),
        Error::NavigationRateLimit { retry_after_ms } => format!(
            "<navigation-refused category=\"rate-limit\" retry-after-ms=\"{retry_after_ms}\"/>"
        ),
        other => format!(
            "<navigation-refused reason=\"{}\"/>",
            crate::sanitizer::xml_escape(&other.to_string())
        ),
    }
}

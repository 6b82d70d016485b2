//! Confirmation gate: classifies risky actions and holds them until a human
//! presents the matching confirmation ID.
//!
//! IDs come from the OS CSPRNG, so possession of an ID is the proof of
//! having seen the confirmation prompt. A pending confirmation belongs to
//! exactly one session and is consumed on first use.

use crate::config::ConfirmationConfig;
use crate::patterns::{ActionCategory, Severity, DESTRUCTIVE_COMMANDS};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Why an action needs confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionClassification {
    pub category: ActionCategory,
    pub severity: Severity,
    pub description: String,
    /// The pattern text or action name that triggered the classification.
    pub matched: String,
}

/// Classify a shell command against the destructive-command catalogue.
/// When several rules match, the highest severity wins.
pub fn classify_command(command: &str) -> Option<ActionClassification> {
    DESTRUCTIVE_COMMANDS
        .iter()
        .filter_map(|rule| {
            rule.regex.find(command).map(|m| ActionClassification {
                category: rule.category,
                severity: rule.severity,
                description: rule.description.to_string(),
                matched: m.as_str().to_string(),
            })
        })
        .max_by_key(|c| c.severity)
}

/// Classify a non-shell tool action by name.
pub fn classify_action(action: &str) -> Option<ActionClassification> {
    let (category, severity, description) = match action {
        "file-delete" => (
            ActionCategory::Destructive,
            Severity::High,
            "Deletes a file the middleware cannot restore",
        ),
        "config-write" => (
            ActionCategory::Configuration,
            Severity::High,
            "Mutates host configuration",
        ),
        "skill-install" => (
            ActionCategory::Security,
            Severity::Medium,
            "Installs third-party code",
        ),
        "webhook-delete" => (
            ActionCategory::Configuration,
            Severity::Medium,
            "Removes a registered webhook",
        ),
        "cron-delete" => (
            ActionCategory::Configuration,
            Severity::Medium,
            "Removes a scheduled job",
        ),
        "session-create" => (
            ActionCategory::Configuration,
            Severity::Low,
            "Opens a new session",
        ),
        _ => return None,
    };
    Some(ActionClassification {
        category,
        severity,
        description: description.to_string(),
        matched: action.to_string(),
    })
}

/// A decision waiting on a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: String,
    pub session_id: String,
    pub action: String,
    pub params: Value,
    pub reason: String,
    pub category: ActionCategory,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of presenting a confirmation ID.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// The pending record, now consumed.
    Confirmed(PendingConfirmation),
    NotFound,
    /// The record exists but belongs to a different session.
    WrongSession,
    Expired,
}

impl ConfirmOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmOutcome::Confirmed(_))
    }
}

/// Holds pending confirmations for one policy engine instance.
#[derive(Debug)]
pub struct ConfirmationGate {
    config: ConfirmationConfig,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        ConfirmationGate::new(ConfirmationConfig::default())
    }
}

impl ConfirmationGate {
    pub fn new(config: ConfirmationConfig) -> Self {
        ConfirmationGate {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the severity filter demands confirmation at this level.
    pub fn severity_requires(&self, severity: Severity) -> bool {
        match severity {
            Severity::High => self.config.require_high,
            Severity::Medium => self.config.require_medium,
            Severity::Low => self.config.require_low,
        }
    }

    /// Enqueue a pending confirmation and return the record (including the
    /// ID handed to the human).
    pub fn create_pending(
        &self,
        session_id: &str,
        action: &str,
        params: Value,
        classification: &ActionClassification,
    ) -> PendingConfirmation {
        let now = Utc::now();
        let record = PendingConfirmation {
            id: unguessable_id(),
            session_id: session_id.to_string(),
            action: action.to_string(),
            params,
            reason: classification.description.clone(),
            category: classification.category,
            severity: classification.severity,
            created_at: now,
            expires_at: now + Duration::milliseconds(self.config.timeout_ms as i64),
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        purge_expired(&mut pending, now);
        pending.insert(record.id.clone(), record.clone());
        record
    }

    /// Consume a confirmation. Succeeds only when the record exists, belongs
    /// to `session_id`, and has not expired.
    pub fn confirm(&self, id: &str, session_id: &str) -> ConfirmOutcome {
        let now = Utc::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(record) = pending.remove(id) else {
            return ConfirmOutcome::NotFound;
        };
        if record.expires_at <= now {
            return ConfirmOutcome::Expired;
        }
        if record.session_id != session_id {
            // Not consumed: the rightful session can still present it.
            pending.insert(id.to_string(), record);
            return ConfirmOutcome::WrongSession;
        }
        ConfirmOutcome::Confirmed(record)
    }

    /// Number of live pending confirmations.
    pub fn pending_count(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        purge_expired(&mut pending, now);
        pending.len()
    }
}

fn purge_expired(pending: &mut HashMap<String, PendingConfirmation>, now: DateTime<Utc>) {
    pending.retain(|_, record| record.expires_at > now);
}

fn unguessable_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

//! Capability matrix: which session types may invoke which capabilities,
//! and whether a human confirmation is needed first.
//!
//! Lookups fail closed: a (session type, capability) pair with no entry is
//! denied. Matrices are plain data and can be loaded from or saved to YAML
//! documents so deployments can tighten the defaults without recompiling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session types, ordered roughly by trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    MainElevated,
    MainStandard,
    Sandbox,
    Webhook,
    Cron,
    Api,
    Guest,
}

impl SessionType {
    pub const ALL: [SessionType; 7] = [
        SessionType::MainElevated,
        SessionType::MainStandard,
        SessionType::Sandbox,
        SessionType::Webhook,
        SessionType::Cron,
        SessionType::Api,
        SessionType::Guest,
    ];
}

/// Named permissions checked before a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ShellUnrestricted,
    ShellSandboxed,
    ShellReadOnly,
    BrowserCdp,
    BrowserScreenshot,
    BrowserNavigate,
    FileRead,
    FileWrite,
    FileDelete,
    CanvasEval,
    NodeInvoke,
    SessionSend,
    SessionHistoryOwn,
    SessionHistoryOther,
    SessionCreate,
    CronCreate,
    CronDelete,
    CronList,
    WebhookRegister,
    WebhookDelete,
    SkillInstall,
    SkillExecute,
    ConfigRead,
    ConfigWrite,
}

impl Capability {
    pub const ALL: [Capability; 24] = [
        Capability::ShellUnrestricted,
        Capability::ShellSandboxed,
        Capability::ShellReadOnly,
        Capability::BrowserCdp,
        Capability::BrowserScreenshot,
        Capability::BrowserNavigate,
        Capability::FileRead,
        Capability::FileWrite,
        Capability::FileDelete,
        Capability::CanvasEval,
        Capability::NodeInvoke,
        Capability::SessionSend,
        Capability::SessionHistoryOwn,
        Capability::SessionHistoryOther,
        Capability::SessionCreate,
        Capability::CronCreate,
        Capability::CronDelete,
        Capability::CronList,
        Capability::WebhookRegister,
        Capability::WebhookDelete,
        Capability::SkillInstall,
        Capability::SkillExecute,
        Capability::ConfigRead,
        Capability::ConfigWrite,
    ];

    /// Executes code or commands on the host.
    pub fn is_execution(self) -> bool {
        matches!(
            self,
            Capability::ShellUnrestricted
                | Capability::ShellSandboxed
                | Capability::ShellReadOnly
                | Capability::CanvasEval
                | Capability::NodeInvoke
                | Capability::SkillExecute
        )
    }

    /// Mutates state visible outside the calling session.
    pub fn is_shared_state_write(self) -> bool {
        matches!(
            self,
            Capability::FileWrite
                | Capability::FileDelete
                | Capability::CronCreate
                | Capability::CronDelete
                | Capability::WebhookRegister
                | Capability::WebhookDelete
                | Capability::SkillInstall
                | Capability::ConfigWrite
        )
    }

    /// Deletes something that cannot be recovered by the middleware.
    pub fn is_irreversible(self) -> bool {
        matches!(
            self,
            Capability::FileDelete | Capability::CronDelete | Capability::WebhookDelete
        )
    }
}

/// Outcome of a matrix lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Confirm,
    Deny,
}

/// Result of a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityCheck {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub decision: Decision,
}

/// The (session type, capability) → decision table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityMatrix {
    rules: HashMap<SessionType, HashMap<Capability, Decision>>,
}

impl CapabilityMatrix {
    /// Empty matrix: everything denied.
    pub fn deny_all() -> Self {
        CapabilityMatrix::default()
    }

    /// The built-in baseline.
    ///
    /// Guest has no entries at all. Main-elevated confirms only irreversible
    /// deletes. Sandbox gets read-only introspection and nothing that
    /// executes or writes shared state.
    pub fn default_matrix() -> Self {
        use Capability as C;
        use Decision::{Allow, Confirm};
        use SessionType as S;

        let mut m = CapabilityMatrix::default();

        for cap in C::ALL {
            let decision = if cap.is_irreversible() { Confirm } else { Allow };
            m.set(S::MainElevated, cap, decision);
        }

        for (cap, decision) in [
            (C::ShellSandboxed, Allow),
            (C::ShellReadOnly, Allow),
            (C::BrowserScreenshot, Allow),
            (C::BrowserNavigate, Allow),
            (C::FileRead, Allow),
            (C::FileWrite, Allow),
            (C::FileDelete, Confirm),
            (C::CanvasEval, Allow),
            (C::NodeInvoke, Confirm),
            (C::SessionSend, Allow),
            (C::SessionHistoryOwn, Allow),
            (C::SessionCreate, Allow),
            (C::CronCreate, Allow),
            (C::CronDelete, Confirm),
            (C::CronList, Allow),
            (C::WebhookRegister, Confirm),
            (C::WebhookDelete, Confirm),
            (C::SkillInstall, Confirm),
            (C::SkillExecute, Allow),
            (C::ConfigRead, Allow),
            (C::ConfigWrite, Confirm),
        ] {
            m.set(S::MainStandard, cap, decision);
        }

        for (cap, decision) in [
            (C::FileRead, Allow),
            (C::SessionHistoryOwn, Allow),
            (C::ConfigRead, Allow),
        ] {
            m.set(S::Sandbox, cap, decision);
        }

        for (cap, decision) in [
            (C::SessionSend, Allow),
            (C::FileRead, Allow),
            (C::CronList, Allow),
        ] {
            m.set(S::Webhook, cap, decision);
        }

        for (cap, decision) in [
            (C::ShellSandboxed, Allow),
            (C::BrowserNavigate, Allow),
            (C::FileRead, Allow),
            (C::FileWrite, Allow),
            (C::SessionSend, Allow),
            (C::CronList, Allow),
        ] {
            m.set(S::Cron, cap, decision);
        }

        for (cap, decision) in [
            (C::ShellReadOnly, Allow),
            (C::BrowserNavigate, Allow),
            (C::FileRead, Allow),
            (C::FileWrite, Confirm),
            (C::SessionSend, Allow),
            (C::SessionHistoryOwn, Allow),
            (C::SessionCreate, Allow),
            (C::CronCreate, Allow),
            (C::CronList, Allow),
            (C::WebhookRegister, Confirm),
            (C::ConfigRead, Allow),
        ] {
            m.set(S::Api, cap, decision);
        }

        // Guest: no entries; every lookup falls through to Deny.

        m
    }

    pub fn set(&mut self, session: SessionType, capability: Capability, decision: Decision) {
        self.rules
            .entry(session)
            .or_default()
            .insert(capability, decision);
    }

    /// Look up the decision for a pair; missing entries deny.
    pub fn decision(&self, session: SessionType, capability: Capability) -> Decision {
        self.rules
            .get(&session)
            .and_then(|caps| caps.get(&capability))
            .copied()
            .unwrap_or(Decision::Deny)
    }

    pub fn check(&self, session: SessionType, capability: Capability) -> CapabilityCheck {
        let decision = self.decision(session, capability);
        CapabilityCheck {
            allowed: decision != Decision::Deny,
            requires_confirmation: decision == Decision::Confirm,
            decision,
        }
    }

    /// Load a matrix from a YAML document.
    pub fn from_yaml(doc: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(doc)
    }

    /// Serialize the matrix to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_denies_everything() {
        let m = CapabilityMatrix::default_matrix();
        for cap in Capability::ALL {
            let check = m.check(SessionType::Guest, cap);
            assert!(!check.allowed, "guest should be denied {cap:?}");
        }
    }

    #[test]
    fn test_elevated_confirms_only_irreversible() {
        let m = CapabilityMatrix::default_matrix();
        for cap in Capability::ALL {
            let check = m.check(SessionType::MainElevated, cap);
            assert!(check.allowed, "elevated should reach {cap:?}");
            assert_eq!(
                check.requires_confirmation,
                cap.is_irreversible(),
                "confirmation mismatch for {cap:?}"
            );
        }
    }

    #[test]
    fn test_sandbox_denies_execution_and_shared_writes() {
        let m = CapabilityMatrix::default_matrix();
        for cap in Capability::ALL {
            if cap.is_execution() || cap.is_shared_state_write() {
                assert!(
                    !m.check(SessionType::Sandbox, cap).allowed,
                    "sandbox must not reach {cap:?}"
                );
            }
        }
        assert!(m.check(SessionType::Sandbox, Capability::FileRead).allowed);
    }

    #[test]
    fn test_decision_maps_to_check_fields() {
        let m = CapabilityMatrix::default_matrix();
        for session in SessionType::ALL {
            for cap in Capability::ALL {
                let decision = m.decision(session, cap);
                let check = m.check(session, cap);
                assert_eq!(check.allowed, decision != Decision::Deny);
                assert_eq!(check.requires_confirmation, decision == Decision::Confirm);
            }
        }
    }

    #[test]
    fn test_unknown_pair_fails_closed() {
        let m = CapabilityMatrix::deny_all();
        let check = m.check(SessionType::MainElevated, Capability::FileRead);
        assert!(!check.allowed);
        assert_eq!(check.decision, Decision::Deny);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let m = CapabilityMatrix::default_matrix();
        let yaml = m.to_yaml().unwrap();
        let back = CapabilityMatrix::from_yaml(&yaml).unwrap();
        for session in SessionType::ALL {
            for cap in Capability::ALL {
                assert_eq!(m.decision(session, cap), back.decision(session, cap));
            }
        }
    }

    #[test]
    fn test_override_tightens_default() {
        let mut m = CapabilityMatrix::default_matrix();
        m.set(
            SessionType::MainStandard,
            Capability::BrowserNavigate,
            Decision::Deny,
        );
        assert!(
            !m.check(SessionType::MainStandard, Capability::BrowserNavigate)
                .allowed
        );
    }
}

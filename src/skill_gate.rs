//! Skill gate: approval workflow, content hash verification, and the
//! installation registry for third-party extensions.
//!
//! Approval records move `pending → approved | denied` exactly once;
//! pending records age into `expired` lazily on access. Hash verification
//! compares digests in constant time and supports SRI-style
//! `algo-base64(hash)` strings for manifest interop.

use crate::config::SkillGateConfig;
use crate::error::{Error, Result, SkillErrorCode};
use crate::patterns::{Severity, DESTRUCTIVE_COMMANDS, INJECTION_PATTERNS};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::HashMap;
use std::sync::Mutex;
use subtle::ConstantTimeEq;

/// Hash algorithms accepted for skill content verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn parse(name: &str) -> Option<HashAlgorithm> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Lifecycle of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// What the requester wants installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRequest {
    pub skill_id: String,
    pub name: String,
    pub version: Option<String>,
    pub source: Option<String>,
    pub requested_by: String,
    /// Expected content hash, hex-encoded, when the manifest pinned one.
    pub content_hash: Option<String>,
}

/// One approval workflow record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: String,
    pub request: SkillRequest,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
}

/// Registry entry for an installed skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledSkill {
    pub skill_id: String,
    pub content_hash: String,
    pub version: Option<String>,
    pub installed_at: DateTime<Utc>,
}

/// Advisory finding from pre-approval content inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillFinding {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
}

/// The skill approval gate and installation registry.
#[derive(Debug)]
pub struct SkillGate {
    config: SkillGateConfig,
    algorithm: HashAlgorithm,
    approvals: Mutex<HashMap<String, ApprovalRecord>>,
    installed: Mutex<HashMap<String, InstalledSkill>>,
}

impl Default for SkillGate {
    fn default() -> Self {
        SkillGate::new(SkillGateConfig::default())
    }
}

impl SkillGate {
    pub fn new(config: SkillGateConfig) -> Self {
        let algorithm =
            HashAlgorithm::parse(&config.hash_algorithm).unwrap_or(HashAlgorithm::Sha256);
        SkillGate {
            config,
            algorithm,
            approvals: Mutex::new(HashMap::new()),
            installed: Mutex::new(HashMap::new()),
        }
    }

    /// File a request. With `auto_install` the record is approved on the
    /// spot; otherwise it waits as `pending`.
    pub fn request_approval(&self, request: SkillRequest) -> Result<ApprovalRecord> {
        let now = Utc::now();
        let mut approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        expire_stale(&mut approvals, now, self.config.approval_expiration_ms);

        if self.config.auto_install {
            let record = ApprovalRecord {
                id: approval_id(),
                request,
                status: ApprovalStatus::Approved,
                requested_at: now,
                decided_at: Some(now),
                decided_by: Some("auto-install".to_string()),
                reason: Some("auto-install enabled".to_string()),
            };
            approvals.insert(record.id.clone(), record.clone());
            return Ok(record);
        }

        let pending = approvals
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .count();
        if pending >= self.config.max_pending_approvals {
            return Err(Error::SkillInstallation {
                skill_id: request.skill_id,
                code: SkillErrorCode::MaxPendingExceeded,
            });
        }

        let record = ApprovalRecord {
            id: approval_id(),
            request,
            status: ApprovalStatus::Pending,
            requested_at: now,
            decided_at: None,
            decided_by: None,
            reason: None,
        };
        approvals.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn approve(&self, id: &str, by: &str, reason: Option<&str>) -> Result<ApprovalRecord> {
        self.decide(id, by, reason, ApprovalStatus::Approved)
    }

    pub fn deny(&self, id: &str, by: &str, reason: Option<&str>) -> Result<ApprovalRecord> {
        self.decide(id, by, reason, ApprovalStatus::Denied)
    }

    fn decide(
        &self,
        id: &str,
        by: &str,
        reason: Option<&str>,
        status: ApprovalStatus,
    ) -> Result<ApprovalRecord> {
        let now = Utc::now();
        let mut approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        expire_stale(&mut approvals, now, self.config.approval_expiration_ms);

        let record = approvals.get_mut(id).ok_or_else(|| Error::SkillInstallation {
            skill_id: id.to_string(),
            code: SkillErrorCode::NotFound,
        })?;
        if record.status != ApprovalStatus::Pending {
            return Err(Error::SkillInstallation {
                skill_id: record.request.skill_id.clone(),
                code: SkillErrorCode::InvalidStatus,
            });
        }
        record.status = status;
        record.decided_at = Some(now);
        record.decided_by = Some(by.to_string());
        record.reason = reason.map(str::to_string);
        Ok(record.clone())
    }

    /// Fetch a record, applying lazy expiry first.
    pub fn get_approval(&self, id: &str) -> Option<ApprovalRecord> {
        let now = Utc::now();
        let mut approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        expire_stale(&mut approvals, now, self.config.approval_expiration_ms);
        approvals.get(id).cloned()
    }

    /// Live pending count, after lazy expiry.
    pub fn pending_count(&self) -> usize {
        let now = Utc::now();
        let mut approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        expire_stale(&mut approvals, now, self.config.approval_expiration_ms);
        approvals
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .count()
    }

    /// Verify skill content against an expected hex digest.
    ///
    /// Always `true` when hash verification is disabled. Comparison is
    /// constant-time over the decoded bytes; a malformed expected hash
    /// verifies as `false`, never as an error.
    pub fn verify_skill_content(&self, content: &[u8], expected_hex: &str) -> bool {
        if !self.config.verify_hashes {
            return true;
        }
        let Ok(expected) = hex::decode(expected_hex.trim()) else {
            return false;
        };
        let actual = self.algorithm.digest(content);
        if expected.len() != actual.len() {
            return false;
        }
        bool::from(expected.as_slice().ct_eq(actual.as_slice()))
    }

    /// Verify against an SRI string (`algo-base64(hash)`).
    pub fn verify_sri(&self, content: &[u8], sri: &str) -> bool {
        if !self.config.verify_hashes {
            return true;
        }
        let Some((algorithm, expected_hex)) = parse_sri(sri) else {
            return false;
        };
        let Ok(expected) = hex::decode(&expected_hex) else {
            return false;
        };
        let actual = algorithm.digest(content);
        if expected.len() != actual.len() {
            return false;
        }
        bool::from(expected.as_slice().ct_eq(actual.as_slice()))
    }

    /// Record a completed installation.
    pub fn register_installation(
        &self,
        skill_id: &str,
        content_hash: &str,
        version: Option<&str>,
    ) {
        let entry = InstalledSkill {
            skill_id: skill_id.to_string(),
            content_hash: content_hash.to_string(),
            version: version.map(str::to_string),
            installed_at: Utc::now(),
        };
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(skill_id.to_string(), entry);
    }

    pub fn is_installed(&self, skill_id: &str) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(skill_id)
    }

    pub fn get_installed_skill(&self, skill_id: &str) -> Option<InstalledSkill> {
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(skill_id)
            .cloned()
    }

    /// Advisory scan of skill text for injected instructions and dangerous
    /// shell patterns. Findings inform the approver; they do not decide.
    pub fn inspect_content(&self, text: &str) -> Vec<SkillFinding> {
        let mut findings = Vec::new();
        for pattern in INJECTION_PATTERNS.iter() {
            if let Some(m) = pattern.regex.find(text) {
                findings.push(SkillFinding {
                    kind: pattern.kind.to_string(),
                    severity: pattern.severity,
                    description: pattern.description.to_string(),
                    evidence: m.as_str().chars().take(80).collect(),
                });
            }
        }
        for rule in DESTRUCTIVE_COMMANDS.iter() {
            if let Some(m) = rule.regex.find(text) {
                findings.push(SkillFinding {
                    kind: rule.category.to_string(),
                    severity: rule.severity,
                    description: rule.description.to_string(),
                    evidence: m.as_str().chars().take(80).collect(),
                });
            }
        }
        findings
    }
}

/// Parse an SRI string into its algorithm and hex digest.
pub fn parse_sri(sri: &str) -> Option<(HashAlgorithm, String)> {
    let (algo, b64) = sri.trim().split_once('-')?;
    let algorithm = HashAlgorithm::parse(algo)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
    Some((algorithm, hex::encode(bytes)))
}

/// Build an SRI string for content.
pub fn create_sri_hash(content: &[u8], algorithm: HashAlgorithm) -> String {
    let digest = algorithm.digest(content);
    format!(
        "{}-{}",
        algorithm.name(),
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

fn expire_stale(
    approvals: &mut HashMap<String, ApprovalRecord>,
    now: DateTime<Utc>,
    expiration_ms: u64,
) {
    let max_age = Duration::milliseconds(expiration_ms as i64);
    for record in approvals.values_mut() {
        if record.status == ApprovalStatus::Pending && now - record.requested_at > max_age {
            record.status = ApprovalStatus::Expired;
        }
    }
}

fn approval_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

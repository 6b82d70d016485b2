//! Webhook authentication: HMAC signature verification plus a source-IP
//! CIDR allowlist.
//!
//! Signature comparison is constant-time over the decoded bytes. Hex decode
//! failures and length mismatches return `valid=false` instead of erroring,
//! so a malformed header cannot distinguish itself from a wrong signature.

use crate::config::WebhookConfig;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Supported HMAC digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HmacAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HmacAlgorithm::Sha1 => "sha1",
            HmacAlgorithm::Sha256 => "sha256",
            HmacAlgorithm::Sha384 => "sha384",
            HmacAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse a case-insensitive algorithm name.
    pub fn parse(name: &str) -> Option<HmacAlgorithm> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Some(HmacAlgorithm::Sha1),
            "sha256" => Some(HmacAlgorithm::Sha256),
            "sha384" => Some(HmacAlgorithm::Sha384),
            "sha512" => Some(HmacAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Result of verifying one signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub algorithm: HmacAlgorithm,
    pub reason: Option<String>,
}

impl VerificationOutcome {
    fn invalid(algorithm: HmacAlgorithm, reason: &str) -> Self {
        VerificationOutcome {
            valid: false,
            algorithm,
            reason: Some(reason.to_string()),
        }
    }
}

/// Parsed form of a signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Algorithm named in the header, when the `algo=hex` form was used.
    pub algorithm: Option<HmacAlgorithm>,
    pub hex: String,
}

/// Parse `<hex>`, `<algo>=<hex>`, or `v<n>=<hex>` signature headers.
pub fn parse_signature_header(header: &str) -> ParsedSignature {
    let header = header.trim();
    if let Some((prefix, hex)) = header.split_once('=') {
        if let Some(algorithm) = HmacAlgorithm::parse(prefix) {
            return ParsedSignature {
                algorithm: Some(algorithm),
                hex: hex.to_string(),
            };
        }
        let mut chars = prefix.chars();
        if chars.next() == Some('v') && chars.clone().next().is_some() && chars.all(|c| c.is_ascii_digit()) {
            return ParsedSignature {
                algorithm: None,
                hex: hex.to_string(),
            };
        }
    }
    ParsedSignature {
        algorithm: None,
        hex: header.to_string(),
    }
}

/// HMAC of `payload` under `secret`, as raw bytes.
pub fn compute_hmac(algorithm: HmacAlgorithm, secret: &[u8], payload: &[u8]) -> Vec<u8> {
    match algorithm {
        HmacAlgorithm::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha384 => {
            let mut mac =
                Hmac::<Sha384>::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(secret).expect("HMAC can take key of any size");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// HMAC of `payload` under `secret`, hex-encoded. The form a well-behaved
/// sender puts in its signature header.
pub fn compute_signature(algorithm: HmacAlgorithm, secret: &[u8], payload: &[u8]) -> String {
    hex::encode(compute_hmac(algorithm, secret, payload))
}

/// Verify a signature header against the payload.
///
/// The algorithm named in the header (if any) overrides `algorithm`.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    algorithm: HmacAlgorithm,
) -> VerificationOutcome {
    let parsed = parse_signature_header(signature_header);
    let algorithm = parsed.algorithm.unwrap_or(algorithm);

    let Ok(signature_bytes) = hex::decode(parsed.hex.as_bytes()) else {
        return VerificationOutcome::invalid(algorithm, "signature is not valid hex");
    };

    let expected = compute_hmac(algorithm, secret, payload);
    if signature_bytes.len() != expected.len() {
        return VerificationOutcome::invalid(algorithm, "signature length mismatch");
    }

    if bool::from(signature_bytes.as_slice().ct_eq(expected.as_slice())) {
        VerificationOutcome {
            valid: true,
            algorithm,
            reason: None,
        }
    } else {
        VerificationOutcome::invalid(algorithm, "signature mismatch")
    }
}

/// One parsed CIDR rule.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CidrRule {
    base: u32,
    mask: u32,
}

fn parse_ipv4(ip: &str) -> Option<u32> {
    let mut value = 0u32;
    let mut parts = 0;
    for part in ip.split('.') {
        let octet: u8 = part.parse().ok()?;
        value = (value << 8) | octet as u32;
        parts += 1;
    }
    if parts == 4 {
        Some(value)
    } else {
        None
    }
}

fn parse_cidr(rule: &str) -> Option<CidrRule> {
    let (base, bits) = match rule.split_once('/') {
        Some((base, bits)) => (base, bits.parse::<u32>().ok()?),
        None => (rule, 32),
    };
    if bits > 32 {
        return None;
    }
    let base = parse_ipv4(base)?;
    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    Some(CidrRule { base, mask })
}

/// Does `ip` fall inside `cidr`? Bare IPs are /32. Malformed inputs never
/// match.
pub fn ip_matches_cidr(ip: &str, cidr: &str) -> bool {
    let (Some(ip), Some(rule)) = (parse_ipv4(ip), parse_cidr(cidr)) else {
        return false;
    };
    (ip & rule.mask) == (rule.base & rule.mask)
}

/// Source-IP allowlist built from CIDR rules.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    rules: Vec<CidrRule>,
}

impl IpAllowlist {
    /// Parse rules, skipping malformed entries with a warning.
    pub fn new(rules: &[String]) -> Self {
        let mut parsed = Vec::new();
        for rule in rules {
            match parse_cidr(rule) {
                Some(r) => parsed.push(r),
                None => tracing::warn!(rule = %rule, "skipping malformed CIDR rule"),
            }
        }
        IpAllowlist { rules: parsed }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        IpAllowlist::new(&config.ip_allowlist)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// An empty allowlist permits every source.
    pub fn check(&self, ip: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let Some(ip) = parse_ipv4(ip) else {
            return false;
        };
        self.rules
            .iter()
            .any(|rule| (ip & rule.mask) == (rule.base & rule.mask))
    }
}

/// Webhook authenticator combining HMAC verification and the IP allowlist.
#[derive(Debug, Clone)]
pub struct WebhookAuthenticator {
    config: WebhookConfig,
    allowlist: IpAllowlist,
    default_algorithm: HmacAlgorithm,
}

impl Default for WebhookAuthenticator {
    fn default() -> Self {
        WebhookAuthenticator::new(WebhookConfig::default())
    }
}

impl WebhookAuthenticator {
    pub fn new(config: WebhookConfig) -> Self {
        let allowlist = IpAllowlist::from_config(&config);
        let default_algorithm =
            HmacAlgorithm::parse(&config.algorithm).unwrap_or(HmacAlgorithm::Sha256);
        WebhookAuthenticator {
            config,
            allowlist,
            default_algorithm,
        }
    }

    /// Verify one inbound webhook request.
    ///
    /// `signature_header` may be absent only when HMAC is not required.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        secret: &[u8],
        source_ip: Option<&str>,
    ) -> VerificationOutcome {
        if let Some(ip) = source_ip {
            if !self.allowlist.check(ip) {
                return VerificationOutcome::invalid(
                    self.default_algorithm,
                    "source IP not on allowlist",
                );
            }
        }
        match signature_header {
            Some(header) => verify_signature(payload, header, secret, self.default_algorithm),
            None if self.config.require_hmac => {
                VerificationOutcome::invalid(self.default_algorithm, "missing signature header")
            }
            None => VerificationOutcome {
                valid: true,
                algorithm: self.default_algorithm,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"super-secret-signing-key";
    const PAYLOAD: &[u8] = br#"{"event":"push","ref":"main"}"#;

    #[test]
    fn test_roundtrip_verifies() {
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = verify_signature(PAYLOAD, &sig, SECRET, HmacAlgorithm::Sha256);
        assert!(outcome.valid, "{:?}", outcome.reason);
    }

    #[test]
    fn test_algo_prefixed_header() {
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = verify_signature(
            PAYLOAD,
            &format!("sha256={sig}"),
            SECRET,
            HmacAlgorithm::Sha256,
        );
        assert!(outcome.valid);
        // Case-insensitive algorithm names.
        let outcome = verify_signature(
            PAYLOAD,
            &format!("SHA256={sig}"),
            SECRET,
            HmacAlgorithm::Sha256,
        );
        assert!(outcome.valid);
    }

    #[test]
    fn test_versioned_header() {
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = verify_signature(PAYLOAD, &format!("v1={sig}"), SECRET, HmacAlgorithm::Sha256);
        assert!(outcome.valid);
    }

    #[test]
    fn test_header_algorithm_overrides_default() {
        let sig = compute_signature(HmacAlgorithm::Sha512, SECRET, PAYLOAD);
        let outcome = verify_signature(
            PAYLOAD,
            &format!("sha512={sig}"),
            SECRET,
            HmacAlgorithm::Sha256,
        );
        assert!(outcome.valid);
        assert_eq!(outcome.algorithm, HmacAlgorithm::Sha512);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = verify_signature(b"tampered", &sig, SECRET, HmacAlgorithm::Sha256);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = verify_signature(PAYLOAD, &sig, b"other-secret", HmacAlgorithm::Sha256);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_flipped_signature_byte_rejected() {
        let mut sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD).into_bytes();
        sig[0] = if sig[0] == b'0' { b'1' } else { b'0' };
        let sig = String::from_utf8(sig).unwrap();
        let outcome = verify_signature(PAYLOAD, &sig, SECRET, HmacAlgorithm::Sha256);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_bad_hex_is_invalid_not_error() {
        let outcome = verify_signature(PAYLOAD, "not-hex!!", SECRET, HmacAlgorithm::Sha256);
        assert!(!outcome.valid);
        assert!(outcome.reason.unwrap().contains("hex"));
    }

    #[test]
    fn test_length_mismatch_is_invalid() {
        let outcome = verify_signature(PAYLOAD, "deadbeef", SECRET, HmacAlgorithm::Sha256);
        assert!(!outcome.valid);
        assert!(outcome.reason.unwrap().contains("length"));
    }

    #[test]
    fn test_all_algorithms_roundtrip() {
        for algorithm in [
            HmacAlgorithm::Sha1,
            HmacAlgorithm::Sha256,
            HmacAlgorithm::Sha384,
            HmacAlgorithm::Sha512,
        ] {
            let sig = compute_signature(algorithm, SECRET, PAYLOAD);
            assert!(
                verify_signature(PAYLOAD, &sig, SECRET, algorithm).valid,
                "algorithm {algorithm:?}"
            );
        }
    }

    #[test]
    fn test_cidr_matching() {
        assert!(ip_matches_cidr("1.2.3.4", "0.0.0.0/0"));
        assert!(ip_matches_cidr("255.255.255.255", "0.0.0.0/0"));
        assert!(ip_matches_cidr("10.1.2.3", "10.0.0.0/8"));
        assert!(!ip_matches_cidr("11.1.2.3", "10.0.0.0/8"));
        assert!(ip_matches_cidr("192.168.4.77", "192.168.4.0/24"));
        assert!(!ip_matches_cidr("192.168.5.77", "192.168.4.0/24"));
        assert!(ip_matches_cidr("203.0.113.9", "203.0.113.9"));
        assert!(ip_matches_cidr("203.0.113.9", "203.0.113.9/32"));
        assert!(!ip_matches_cidr("203.0.113.8", "203.0.113.9/32"));
    }

    #[test]
    fn test_malformed_cidr_never_matches() {
        assert!(!ip_matches_cidr("1.2.3.4", "10.0.0.0/33"));
        assert!(!ip_matches_cidr("1.2.3.4", "not-an-ip/8"));
        assert!(!ip_matches_cidr("1.2.3", "10.0.0.0/8"));
    }

    #[test]
    fn test_empty_allowlist_permits_all() {
        let allowlist = IpAllowlist::new(&[]);
        assert!(allowlist.check("198.51.100.7"));
    }

    #[test]
    fn test_allowlist_filters() {
        let allowlist = IpAllowlist::new(&["10.0.0.0/8".to_string(), "203.0.113.9".to_string()]);
        assert!(allowlist.check("10.9.8.7"));
        assert!(allowlist.check("203.0.113.9"));
        assert!(!allowlist.check("203.0.113.10"));
        assert!(!allowlist.check("bogus"));
    }

    #[test]
    fn test_authenticator_requires_signature() {
        let auth = WebhookAuthenticator::default();
        let outcome = auth.verify(PAYLOAD, None, SECRET, None);
        assert!(!outcome.valid);

        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        let outcome = auth.verify(PAYLOAD, Some(&sig), SECRET, None);
        assert!(outcome.valid);
    }

    #[test]
    fn test_authenticator_checks_source_ip() {
        let auth = WebhookAuthenticator::new(WebhookConfig {
            ip_allowlist: vec!["192.0.2.0/24".to_string()],
            ..WebhookConfig::default()
        });
        let sig = compute_signature(HmacAlgorithm::Sha256, SECRET, PAYLOAD);
        assert!(auth.verify(PAYLOAD, Some(&sig), SECRET, Some("192.0.2.55")).valid);
        let outcome = auth.verify(PAYLOAD, Some(&sig), SECRET, Some("198.51.100.1"));
        assert!(!outcome.valid);
        assert!(outcome.reason.unwrap().contains("allowlist"));
    }
}

//! Navigation guard: protocol, homograph, metadata, private-network,
//! allowlist, and rate checks over every URL the agent wants to visit.
//!
//! The homograph scan runs over the raw hostname exactly as it appeared in
//! the request; Punycode or other normalization would hide the confusable
//! codepoints it is looking for. Normalized (lowercased) hosts are only used
//! afterwards, for the catalogue and allowlist comparisons.

use crate::config::BrowserGuardConfig;
use crate::error::{Error, NavigationBlockCategory, Result};
use crate::patterns::{confusable_ascii, ALLOWED_PROTOCOLS, DANGEROUS_PROTOCOLS, METADATA_HOSTS};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// A navigation that passed every gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationApproval {
    pub protocol: String,
    /// Lowercased host; `None` for `about:` URLs.
    pub host: Option<String>,
}

/// Per-session navigation guard.
#[derive(Debug)]
pub struct NavigationGuard {
    config: BrowserGuardConfig,
    sessions: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for NavigationGuard {
    fn default() -> Self {
        NavigationGuard::new(BrowserGuardConfig::default())
    }
}

impl NavigationGuard {
    pub fn new(config: BrowserGuardConfig) -> Self {
        NavigationGuard {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Run the full gate sequence for one URL.
    pub fn check_navigation(&self, session_id: &str, url: &str) -> Result<NavigationApproval> {
        let url = url.trim();
        if url.is_empty() {
            return Err(blocked(NavigationBlockCategory::EmptyUrl, "empty URL"));
        }

        // Protocol gates.
        let Some(protocol) = extract_protocol(url) else {
            return Err(blocked(
                NavigationBlockCategory::InvalidUrl,
                "URL has no parseable scheme",
            ));
        };
        if DANGEROUS_PROTOCOLS.contains(&protocol.as_str())
            && !(protocol == "data" && self.config.allow_data_urls)
        {
            return Err(blocked(
                NavigationBlockCategory::DangerousProtocol,
                &format!("protocol '{protocol}:' is not navigable"),
            ));
        }
        if !ALLOWED_PROTOCOLS.contains(&protocol.as_str())
            && !(protocol == "data" && self.config.allow_data_urls)
        {
            return Err(blocked(
                NavigationBlockCategory::UnsupportedProtocol,
                &format!("protocol '{protocol}:' is not supported"),
            ));
        }
        // Internal pages carry no host; nothing further to check.
        if protocol == "about" || protocol == "data" {
            return Ok(NavigationApproval {
                protocol,
                host: None,
            });
        }

        // Raw hostname, pre-normalization, for the homograph scan.
        let Some(raw_host) = extract_raw_host(url) else {
            return Err(blocked(
                NavigationBlockCategory::InvalidUrl,
                "URL has no host",
            ));
        };
        if self.config.block_homograph_attacks {
            if let Some((c, lookalike)) = raw_host
                .chars()
                .find_map(|c| confusable_ascii(c).map(|a| (c, a)))
            {
                return Err(blocked(
                    NavigationBlockCategory::Homograph,
                    &format!(
                        "hostname contains confusable codepoint U+{:04X} (looks like '{lookalike}')",
                        c as u32
                    ),
                ));
            }
        }

        let host = raw_host.to_lowercase();
        let bare_host = host.trim_start_matches('[').trim_end_matches(']');

        // Cloud metadata endpoints.
        if let Some((_, what)) = METADATA_HOSTS.iter().find(|(h, _)| *h == bare_host) {
            return Err(blocked(
                NavigationBlockCategory::CloudMetadata,
                &format!("host is a {what}"),
            ));
        }

        // Private / internal networks.
        if let Some(reason) = private_network_reason(bare_host) {
            return Err(blocked(NavigationBlockCategory::PrivateNetwork, reason));
        }

        // Allowlist, then blocklist.
        if !self.config.domain_allowlist.is_empty()
            && !self
                .config
                .domain_allowlist
                .iter()
                .any(|entry| domain_matches(bare_host, entry))
        {
            return Err(blocked(
                NavigationBlockCategory::NotAllowlisted,
                &format!("host '{bare_host}' is not on the allowlist"),
            ));
        }
        if self
            .config
            .domain_blocklist
            .iter()
            .any(|entry| domain_matches(bare_host, entry))
        {
            return Err(blocked(
                NavigationBlockCategory::Blocklisted,
                &format!("host '{bare_host}' is blocklisted"),
            ));
        }

        // Per-session rate.
        self.check_rate(session_id)?;

        Ok(NavigationApproval {
            protocol,
            host: Some(host),
        })
    }

    /// Record a completed navigation against the session's windows.
    pub fn record_navigation(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let window = sessions.entry(session_id.to_string()).or_default();
        let now = Instant::now();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= HOUR {
                window.pop_front();
            } else {
                break;
            }
        }
        window.push_back(now);
    }

    /// Reject redirect chains longer than the configured maximum.
    pub fn check_redirect_chain(&self, length: u32) -> Result<()> {
        if length > self.config.max_redirect_chain_length {
            return Err(blocked(
                NavigationBlockCategory::RedirectChain,
                &format!(
                    "redirect chain length {length} exceeds maximum {}",
                    self.config.max_redirect_chain_length
                ),
            ));
        }
        Ok(())
    }

    fn check_rate(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let Some(window) = sessions.get_mut(session_id) else {
            return Ok(());
        };
        let now = Instant::now();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= HOUR {
                window.pop_front();
            } else {
                break;
            }
        }
        let minute_count = window
            .iter()
            .filter(|t| now.duration_since(**t) < MINUTE)
            .count() as u32;
        if minute_count >= self.config.max_navigations_per_minute {
            let retry = window
                .iter()
                .find(|t| now.duration_since(**t) < MINUTE)
                .map(|t| (MINUTE - now.duration_since(*t)).as_millis() as u64)
                .unwrap_or(0);
            return Err(Error::NavigationRateLimit {
                retry_after_ms: retry,
            });
        }
        if window.len() as u32 >= self.config.max_navigations_per_hour {
            let retry = window
                .front()
                .map(|t| (HOUR - now.duration_since(*t)).as_millis() as u64)
                .unwrap_or(0);
            return Err(Error::NavigationRateLimit {
                retry_after_ms: retry,
            });
        }
        Ok(())
    }
}

fn blocked(category: NavigationBlockCategory, reason: &str) -> Error {
    Error::BlockedNavigation {
        category,
        reason: reason.to_string(),
    }
}

/// Scheme of the URL, lowercased, when it has one.
fn extract_protocol(url: &str) -> Option<String> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        || !scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Host component exactly as written, without userinfo or port.
fn extract_raw_host(url: &str) -> Option<String> {
    let rest = url.split_once("://")?.1;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    // Bracketed IPv6 keeps its brackets; otherwise strip the port.
    let host = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => host_port,
        }
    } else {
        host_port.split(':').next().unwrap_or("")
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn parse_ipv4(host: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = host.split('.');
    for octet in &mut octets {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

/// Why a host counts as private/internal, if it does.
fn private_network_reason(host: &str) -> Option<&'static str> {
    if host == "localhost" || host.ends_with(".localhost") {
        return Some("loopback hostname");
    }
    if host == "::1" {
        return Some("IPv6 loopback");
    }
    if host.starts_with("fe80:") {
        return Some("IPv6 link-local address");
    }
    if let Some([a, b, _, _]) = parse_ipv4(host) {
        return match (a, b) {
            (10, _) => Some("RFC 1918 private range 10.0.0.0/8"),
            (172, 16..=31) => Some("RFC 1918 private range 172.16.0.0/12"),
            (192, 168) => Some("RFC 1918 private range 192.168.0.0/16"),
            (127, _) => Some("IPv4 loopback"),
            (169, 254) => Some("IPv4 link-local range 169.254.0.0/16"),
            (100, 64..=127) => Some("carrier-grade NAT range 100.64.0.0/10"),
            (0, 0) if host == "0.0.0.0" => Some("unspecified address"),
            _ => None,
        };
    }
    None
}

/// Exact match, or subdomain match for entries written as `*.domain`.
fn domain_matches(host: &str, entry: &str) -> bool {
    let entry = entry.to_lowercase();
    if let Some(suffix) = entry.strip_prefix("*.") {
        host.len() > suffix.len() && host.ends_with(suffix) && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
    } else {
        host == entry
    }
}

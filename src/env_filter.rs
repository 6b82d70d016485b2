//! Environment-variable filter for sandboxed child processes.
//!
//! Allowlist first, blocklist second: a variable must be explicitly safe by
//! name, and even then a credential-shaped name is dropped. Entries the
//! host passes as `additional` bypass both lists; they are the host's
//! deliberate choice.

use crate::patterns::{ENV_ALLOWLIST, ENV_ALLOWLIST_PREFIXES, ENV_BLOCKLIST};
use std::collections::HashMap;

/// Is this variable name safe to forward by itself?
pub fn is_safe_env_var(name: &str) -> bool {
    let allowlisted = ENV_ALLOWLIST.contains(&name)
        || ENV_ALLOWLIST_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix));
    if !allowlisted {
        return false;
    }
    !ENV_BLOCKLIST.iter().any(|re| re.is_match(name))
}

/// Build the environment for a sandboxed process.
///
/// Returns only variables whose names pass [`is_safe_env_var`], then merges
/// in `additional` unfiltered.
pub fn build_safe_env(
    process_env: &HashMap<String, String>,
    additional: Option<&HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut safe: HashMap<String, String> = process_env
        .iter()
        .filter(|(name, _)| is_safe_env_var(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    if let Some(extra) = additional {
        for (name, value) in extra {
            safe.insert(name.clone(), value.clone());
        }
    }
    safe
}

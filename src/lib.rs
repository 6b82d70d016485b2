//! Rampart: defense-in-depth security middleware for AI agent hosts.
//!
//! The crate mediates three flows (untrusted inbound content headed for a
//! model prompt, tool invocations the model requests, and outbound content
//! returned to users) through a set of interacting policy engines:
//!
//! - [`sanitizer`]: prompt-injection detection and untrusted-input framing
//! - [`redactor`]: secret and high-entropy token redaction
//! - [`tool_policy`]: capability matrix, rate limits, schema validation,
//!   and the confirmation gate
//! - [`navigation`]: URL protocol/SSRF/homograph/allowlist guard
//! - [`webhook`]: HMAC verification and source-IP allowlisting
//! - [`token_store`]: short-lived session tokens, hashed at rest
//! - [`skill_gate`]: extension approval workflow and hash verification
//! - [`audit`]: hash-chained audit events with pluggable shippers
//!
//! [`suite::SecuritySuite`] bundles the engines behind one front door and
//! emits one audit event per policy decision. Each engine is also usable
//! standalone.

pub mod audit;
pub mod canonical;
pub mod capability;
pub mod config;
pub mod confirmation;
pub mod entropy;
pub mod env_filter;
pub mod error;
pub mod navigation;
pub mod patterns;
pub mod rate_limit;
pub mod redactor;
pub mod sanitizer;
pub mod schema;
pub mod skill_gate;
pub mod suite;
pub mod token_store;
pub mod tool_policy;
pub mod webhook;

pub use config::SecurityConfig;
pub use error::{Error, Result};
pub use suite::SecuritySuite;

//! Audit logger: structured events, a deterministic hash chain, and a
//! pluggable async shipper.
//!
//! Chain append is serialized by an internal async mutex so concurrent
//! `log` calls produce a totally ordered chain, and events reach the
//! shipper in chain order. A shipper failure propagates to the caller but
//! the failing event has already been linked; the chain never loses or
//! reorders entries because of I/O.

use crate::canonical::{hash_args, sha256_hex};
use crate::config::{AuditConfig, ShipperConfig};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Grace period for draining the buffered shipper on close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Tool names whose events default to warning severity.
const HIGH_RISK_TOOLS: &[&str] = &["bash", "fileWrite", "fileDelete", "browserNavigate", "skillInstall"];

/// How a policy decision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Blocked,
    Error,
}

impl AuditOutcome {
    fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Blocked => "blocked",
            AuditOutcome::Error => "error",
        }
    }
}

/// Event severity for downstream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One audit event. `args_hash` stands in for the arguments themselves;
/// payloads never enter the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UTC ISO-8601.
    pub timestamp: String,
    /// UUID v4.
    pub event_id: String,
    pub session_id: String,
    pub channel: String,
    pub tool_name: String,
    /// SHA-256 of the canonical JSON of the arguments.
    pub args_hash: String,
    pub outcome: AuditOutcome,
    pub severity: AuditSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Hash of one event: SHA-256 over the pipe-joined canonical fields.
pub fn event_hash(event: &AuditEvent) -> String {
    let joined = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        event.timestamp,
        event.event_id,
        event.session_id,
        event.channel,
        event.tool_name,
        event.args_hash,
        event.outcome.as_str(),
        event.previous_hash.as_deref().unwrap_or("")
    );
    sha256_hex(joined.as_bytes())
}

/// Inputs for one `log` call.
#[derive(Debug, Clone, Default)]
pub struct AuditParams {
    pub session_id: String,
    pub channel: String,
    pub tool_name: String,
    pub args: Option<Value>,
    pub outcome: Option<AuditOutcome>,
    /// Inferred from outcome and tool name when absent.
    pub severity: Option<AuditSeverity>,
    pub user_id: Option<String>,
    pub metadata: Option<Value>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

fn infer_severity(outcome: AuditOutcome, tool_name: &str) -> AuditSeverity {
    match outcome {
        AuditOutcome::Error => AuditSeverity::Error,
        AuditOutcome::Blocked => AuditSeverity::Warning,
        AuditOutcome::Success => {
            if HIGH_RISK_TOOLS.contains(&tool_name) {
                AuditSeverity::Warning
            } else {
                AuditSeverity::Info
            }
        }
    }
}

/// Destination for audit events.
#[async_trait]
pub trait AuditShipper: Send + Sync {
    async fn ship(&self, event: &AuditEvent) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends newline-delimited JSON to a file, creating directories as needed.
#[derive(Debug, Clone)]
pub struct FileShipper {
    path: PathBuf,
}

impl FileShipper {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileShipper { path: path.into() }
    }
}

#[async_trait]
impl AuditShipper for FileShipper {
    async fn ship(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Prints a one-line human summary per event.
#[derive(Debug, Clone, Default)]
pub struct ConsoleShipper;

#[async_trait]
impl AuditShipper for ConsoleShipper {
    async fn ship(&self, event: &AuditEvent) -> Result<()> {
        println!(
            "[{}] {:?} {:?} session={} tool={} args={}",
            event.timestamp,
            event.severity,
            event.outcome,
            event.session_id,
            event.tool_name,
            &event.args_hash[..12.min(event.args_hash.len())]
        );
        Ok(())
    }
}

/// Wraps another shipper, batching events by count and flushing on an
/// interval. Failed events are dropped individually after the error is
/// reported; they never wedge the buffer.
pub struct BufferedShipper {
    inner: Arc<dyn AuditShipper>,
    buffer: Arc<Mutex<Vec<AuditEvent>>>,
    batch_size: usize,
    flush_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BufferedShipper {
    /// When called inside a tokio runtime, also spawns the periodic flush
    /// task; otherwise flushing happens on batch overflow and `flush`/`close`.
    pub fn new(inner: Arc<dyn AuditShipper>, batch_size: usize, flush_interval: Duration) -> Self {
        let buffer: Arc<Mutex<Vec<AuditEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let flush_task = if tokio::runtime::Handle::try_current().is_ok() && !flush_interval.is_zero()
        {
            let task_inner = Arc::clone(&inner);
            let task_buffer = Arc::clone(&buffer);
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(flush_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let drained: Vec<AuditEvent> = {
                        let mut buf = task_buffer.lock().await;
                        buf.drain(..).collect()
                    };
                    for event in &drained {
                        if let Err(err) = task_inner.ship(event).await {
                            tracing::warn!(error = %err, event_id = %event.event_id, "periodic flush failed for event");
                        }
                    }
                }
            }))
        } else {
            None
        };
        BufferedShipper {
            inner,
            buffer,
            batch_size: batch_size.max(1),
            flush_task: std::sync::Mutex::new(flush_task),
        }
    }

    pub fn from_config(inner: Arc<dyn AuditShipper>, config: &ShipperConfig) -> Self {
        BufferedShipper::new(
            inner,
            config.batch_size,
            Duration::from_millis(config.flush_interval_ms),
        )
    }

    async fn drain(&self) -> Result<()> {
        let drained: Vec<AuditEvent> = {
            let mut buf = self.buffer.lock().await;
            buf.drain(..).collect()
        };
        let mut first_error = None;
        for event in &drained {
            if let Err(err) = self.inner.ship(event).await {
                tracing::warn!(error = %err, event_id = %event.event_id, "shipping failed for event");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuditShipper for BufferedShipper {
    async fn ship(&self, event: &AuditEvent) -> Result<()> {
        let should_flush = {
            let mut buf = self.buffer.lock().await;
            buf.push(event.clone());
            buf.len() >= self.batch_size
        };
        if should_flush {
            self.drain().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.drain().await?;
        self.inner.flush().await
    }

    async fn close(&self) -> Result<()> {
        if let Some(task) = self.flush_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        let drained = tokio::time::timeout(CLOSE_GRACE, self.drain()).await;
        match drained {
            Ok(result) => {
                result?;
                self.inner.close().await
            }
            Err(_) => {
                tracing::warn!("buffered shipper close timed out before draining");
                self.inner.close().await
            }
        }
    }
}

struct ChainState {
    last_hash: Option<String>,
    events: Vec<AuditEvent>,
}

/// The audit logger. One instance per host process.
pub struct AuditLogger {
    config: AuditConfig,
    shipper: Arc<dyn AuditShipper>,
    chain: Mutex<ChainState>,
}

impl AuditLogger {
    /// Build a logger with the shipper selected by config (`file` or
    /// `console`; `custom` callers use [`AuditLogger::with_shipper`]).
    pub fn new(config: AuditConfig) -> Self {
        let shipper = shipper_from_config(&config.shipper);
        AuditLogger::with_shipper(config, shipper)
    }

    pub fn with_shipper(config: AuditConfig, shipper: Arc<dyn AuditShipper>) -> Self {
        AuditLogger {
            config,
            shipper,
            chain: Mutex::new(ChainState {
                last_hash: None,
                events: Vec::new(),
            }),
        }
    }

    /// Append one event to the chain and ship it. Returns the event ID.
    ///
    /// Shipper errors propagate, but only after the event has been linked
    /// into the in-memory chain, so ordering survives I/O failures.
    pub async fn log(&self, params: AuditParams) -> Result<String> {
        let outcome = params.outcome.unwrap_or(AuditOutcome::Success);
        let severity = params
            .severity
            .unwrap_or_else(|| infer_severity(outcome, &params.tool_name));
        let mut event = AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            event_id: Uuid::new_v4().to_string(),
            session_id: params.session_id,
            channel: params.channel,
            tool_name: params.tool_name,
            args_hash: hash_args(params.args.as_ref()),
            outcome,
            severity,
            user_id: params.user_id,
            previous_hash: None,
            metadata: params.metadata,
            duration_ms: params.duration_ms,
            error_message: params.error_message,
        };

        if !self.config.enabled {
            return Ok(event.event_id);
        }

        // Chain linkage and shipping stay under one lock so delivery order
        // matches chain order.
        let mut chain = self.chain.lock().await;
        if self.config.hash_chain {
            event.previous_hash = chain.last_hash.clone();
            chain.last_hash = Some(event_hash(&event));
        }
        chain.events.push(event.clone());
        let event_id = event.event_id.clone();
        self.shipper.ship(&event).await?;
        Ok(event_id)
    }

    /// Copy of the in-memory chain, oldest first.
    pub async fn chain_snapshot(&self) -> Vec<AuditEvent> {
        self.chain.lock().await.events.clone()
    }

    pub async fn flush(&self) -> Result<()> {
        self.shipper.flush().await
    }

    pub async fn close(&self) -> Result<()> {
        self.shipper.close().await
    }
}

fn shipper_from_config(config: &ShipperConfig) -> Arc<dyn AuditShipper> {
    match config.shipper_type.as_str() {
        "file" => match &config.file_path {
            Some(path) => Arc::new(FileShipper::new(path)),
            None => {
                tracing::warn!("file shipper configured without file_path; using console");
                Arc::new(ConsoleShipper)
            }
        },
        "console" => Arc::new(ConsoleShipper),
        other => {
            tracing::warn!(shipper = %other, "unknown shipper type; using console");
            Arc::new(ConsoleShipper)
        }
    }
}

/// Chain verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub events_verified: usize,
    /// Index of the first broken link, `-1` when the chain is intact.
    pub broken_at_index: i64,
    pub error: Option<String>,
}

/// Replay the hash computation over a chain of events.
pub fn verify_chain(events: &[AuditEvent]) -> ChainVerification {
    if events.is_empty() {
        return ChainVerification {
            valid: true,
            events_verified: 0,
            broken_at_index: -1,
            error: None,
        };
    }
    for i in 1..events.len() {
        let expected = event_hash(&events[i - 1]);
        if events[i].previous_hash.as_deref() != Some(expected.as_str()) {
            return ChainVerification {
                valid: false,
                events_verified: i,
                broken_at_index: i as i64,
                error: Some(format!(
                    "previous_hash mismatch at index {i}: expected {expected}, found {}",
                    events[i].previous_hash.as_deref().unwrap_or("<none>")
                )),
            };
        }
    }
    ChainVerification {
        valid: true,
        events_verified: events.len(),
        broken_at_index: -1,
        error: None,
    }
}

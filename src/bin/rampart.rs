use clap::{Parser, Subcommand};
use rampart::audit::{self, AuditEvent};
use rampart::config::{RedactionConfig, SanitizerConfig};
use rampart::redactor::Redactor;
use rampart::sanitizer::{Sanitizer, SourceContext};
use std::io::Read;
use std::path::PathBuf;
use std::process;

const EXIT_INVALID: i32 = 1;
const EXIT_IO_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "rampart", about = "Rampart security middleware operator tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the hash chain of an exported audit log (NDJSON)
    VerifyChain { log_file: PathBuf },
    /// Scan text for prompt-injection patterns (`-` reads stdin)
    Scan {
        input: PathBuf,
        /// Block high-risk content instead of wrapping it
        #[arg(long)]
        strict: bool,
        /// Source tag recorded in the envelope
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Redact secrets from text (`-` reads stdin)
    Redact {
        input: PathBuf,
        /// Only apply high-confidence patterns
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::VerifyChain { log_file } => {
            let events = match read_events(&log_file) {
                Ok(events) => events,
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(EXIT_IO_ERROR);
                }
            };
            let result = audit::verify_chain(&events);
            if result.valid {
                println!("chain OK: {} events verified", result.events_verified);
            } else {
                eprintln!(
                    "chain BROKEN at index {}: {}",
                    result.broken_at_index,
                    result.error.unwrap_or_default()
                );
                process::exit(EXIT_INVALID);
            }
        }
        Commands::Scan {
            input,
            strict,
            source,
        } => {
            let content = read_input(&input);
            let sanitizer = Sanitizer::new(SanitizerConfig {
                strict_mode: strict,
                log_events: false,
                ..SanitizerConfig::default()
            });
            let result = sanitizer.sanitize(&content, &source, &SourceContext::default());
            println!(
                "detected={} high_risk={} risk_score={} action={:?}",
                result.detected, result.high_risk, result.risk_score, result.action
            );
            for category in &result.categories {
                println!("  category: {category}");
            }
            if result.detected {
                process::exit(EXIT_INVALID);
            }
        }
        Commands::Redact { input, strict } => {
            let content = read_input(&input);
            let redactor = Redactor::new(RedactionConfig {
                strict_patterns: strict,
                ..RedactionConfig::default()
            });
            let result = redactor.redact(&content);
            print!("{}", result.text);
            if result.modified {
                for (kind, count) in &result.counts_by_kind {
                    eprintln!("redacted {count} x {kind}");
                }
            }
        }
    }
}

fn read_events(path: &PathBuf) -> Result<Vec<AuditEvent>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let mut events = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(line)
            .map_err(|e| format!("bad event at line {}: {e}", i + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn read_input(path: &PathBuf) -> String {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("error reading stdin: {e}");
            process::exit(EXIT_IO_ERROR);
        }
        buf
    } else {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                process::exit(EXIT_IO_ERROR);
            }
        }
    }
}

//! # DumbORB CLI Entry Point
//!
//! Dispatches JSON-RPC call envelopes against the demo bridge and prints the
//! response envelopes, one per line.
//!
//! ## Usage
//!
//! ```bash
//! # One call
//! dumborb call '{"method": "calc.add", "params": [1, 2], "id": 1}'
//!
//! # Several calls in the same scope, so reference handles carry over
//! dumborb call '{"method": "counters.shared", "params": []}' \
//!              '{"method": ".obj[1].inc", "params": []}'
//!
//! # Envelopes from a file holding one envelope or an array of them
//! dumborb call -f calls.json
//!
//! # Every callable method name
//! dumborb methods
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to follow dispatch.

use std::fs;

use anyhow::{Context, Result};
use argh::FromArgs;
use serde_json::Value as JsonValue;

use dumborb_bridge::{Bridge, BridgeConfig, CallContext};
use dumborb_cli::demo;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// DumbORB - JSON-RPC bridge demo
struct Cli {
    /// path to a JSON bridge configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Methods(MethodsArgs),
}

/// Arguments for dispatching call envelopes.
///
/// All envelopes of one invocation share a scope, so a callable reference
/// returned by one call can be used by the next.
///
/// # Output Format
///
/// One raw JSON response envelope per line on stdout. A malformed envelope
/// prints its 590 envelope and exits non-zero.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// dispatch call envelopes against the demo bridge
struct CallArgs {
    /// call envelopes as JSON strings, dispatched in order
    #[argh(positional)]
    envelopes: Vec<String>,

    /// read envelopes from a file holding one envelope or an array of them
    #[argh(option, short = 'f')]
    file: Option<String>,

    /// include traces in application errors
    #[argh(switch, short = 'd')]
    diagnostics: bool,

    /// caller name handed to members with a local `user` parameter
    #[argh(option, short = 'u')]
    user: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "methods")]
/// print every callable method name
struct MethodsArgs {}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Responses go to stdout, so logs stay on stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let global = demo::global_bridge(config)?;
    let session = demo::session(&global)?;

    match cli.command {
        Commands::Call(args) => run_call(&session, args),
        Commands::Methods(_) => {
            for name in session.list_methods() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
    let Some(path) = path else {
        return Ok(BridgeConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
    let config = BridgeConfig::from_json_str(&text).with_context(|| format!("invalid config {}", path))?;
    tracing::info!("loaded config from {}", path);
    Ok(config)
}

/// Collects the envelopes named on the command line, file first.
fn collect_envelopes(args: &CallArgs) -> Result<Vec<JsonValue>> {
    let mut envelopes = Vec::new();
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        match serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path))? {
            JsonValue::Array(batch) => envelopes.extend(batch),
            single => envelopes.push(single),
        }
    }
    for raw in &args.envelopes {
        let envelope = serde_json::from_str(raw).with_context(|| format!("invalid JSON: {}", raw))?;
        envelopes.push(envelope);
    }
    if envelopes.is_empty() {
        anyhow::bail!("no envelope given; pass one as an argument or use --file");
    }
    Ok(envelopes)
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if an envelope cannot be read, or if a call fails at the
/// transport level (malformed envelope, permanent application error).
fn run_call(session: &Bridge, args: CallArgs) -> Result<()> {
    let envelopes = collect_envelopes(&args)?;

    let mut ctx = CallContext::new().with_diagnostics(args.diagnostics);
    if let Some(user) = args.user {
        ctx.insert(demo::User(user));
    }

    for envelope in &envelopes {
        match session.call(&ctx, envelope) {
            Ok(response) => println!("{}", serde_json::to_string(&response)?),
            Err(e) => {
                let id = envelope.get("id").cloned().unwrap_or(JsonValue::Null);
                if let Some(response) = e.to_response(id) {
                    println!("{}", serde_json::to_string(&response)?);
                }
                return Err(e.into());
            }
        }
    }
    Ok(())
}

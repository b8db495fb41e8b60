#![warn(clippy::all, clippy::pedantic)]

use clap::Parser;
use hookwarden::{Decision, HookEnvelope, Mediator, config};
use std::io::Read;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Guardrail mediator for agent-runtime hook events. Invoked by the host
/// once per event with the JSON envelope on stdin.
#[derive(Debug, Parser)]
#[command(name = "hookwarden", version)]
struct Cli {
    /// Override the envelope's hook_event_name.
    #[arg(long)]
    event: Option<String>,

    /// Alternate config file path.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries exactly one JSON decision; diagnostics go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already set");
    }

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut raw = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut raw) {
        tracing::warn!(error = %err, "failed to read stdin");
    }

    let envelope = match HookEnvelope::parse(&raw, cli.event.as_deref()) {
        Ok(envelope) => envelope,
        Err(err) => {
            // Envelope errors are recoverable: allow and exit clean.
            tracing::warn!(error = %err, "unusable hook envelope");
            return emit(&Decision::Allow);
        }
    };

    let config = config::load(cli.config.as_deref()).unwrap_or_else(|err| {
        tracing::error!(error = %err, "config load failed; continuing with defaults");
        config::defaults_with_env()
    });

    let mut mediator = Mediator::new(config);
    let decision = mediator.handle(&envelope).await;
    emit(&decision)
}

fn emit(decision: &Decision) -> i32 {
    use std::io::Write;
    let encoded = decision.to_json().to_string();
    let mut stdout = std::io::stdout();
    if writeln!(stdout, "{encoded}").and_then(|()| stdout.flush()).is_err() {
        // The host cannot see our decision; nothing left to fail open with.
        return 2;
    }
    0
}

//! # Callguard - Live Call Scam Screening Console
//!
//! Entry point for the callguard console. It captures microphone audio,
//! streams it to a remote scam-analysis service over a WebSocket, and
//! renders the analysis as it arrives: a running transcript, the voices
//! on the call, and a risk verdict that only ever escalates.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: socket I/O and session control run on the tokio runtime
//! - **modules**: each pipeline stage lives in its own module (mod statements)
//! - **Result<T, E>**: startup failures propagate with the ? operator
//! - **static**: a global atomic flag carries the shutdown signal
//!
//! ## Application Architecture:
//! - **config**: endpoint and session settings (files + environment variables)
//! - **audio**: microphone capture and PCM block encoding
//! - **transport**: the WebSocket session state machine
//! - **protocol**: decoding of inbound analysis messages
//! - **analysis**: speaker registry, transcript, risk ladder
//! - **session**: one object owning one call end to end
//! - **error**: error types shared across the pipeline

// Module declarations - These tell Rust about our other source files
mod analysis;   // Call state aggregation (analysis/ directory)
mod audio;      // Microphone capture and encoding (audio/ directory)
mod config;     // Configuration management (config.rs)
mod error;      // Error handling types (error.rs)
mod protocol;   // Analysis service wire protocol (protocol.rs)
mod roster;     // Known-caller directory (roster.rs)
mod session;    // Call session ownership (session.rs)
mod transport;  // WebSocket session transport (transport.rs)

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis::highlight::{self, Segment, Severity};
use analysis::{Aggregator, RiskLevel, StateDelta, TranscriptEntry};
use config::AppConfig;
use roster::{CallerRoster, RosterEntry};
use session::{CallSession, Presenter};

/// Global shutdown signal, set by the signal handler task and polled by
/// the main loop. AtomicBool keeps it safe to touch from any thread.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for the console output
/// 3. **Builds the known-caller roster** used to classify voices
/// 4. **Starts one call session** against the analysis endpoint
/// 5. **Waits** until the session ends or the user interrupts, then
///    tears down in order (microphone first, socket second)
///
/// ## Error Handling:
/// Startup failures (bad config, unreachable service, missing microphone)
/// return an error and the program exits with a message. Everything after
/// startup degrades locally instead: a lost socket stops capture, a bad
/// message is dropped, and the process keeps running until interrupted.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting callguard v{}", env!("CARGO_PKG_VERSION"));
    info!("Analysis endpoint: {}", config.ws_url());

    let roster = build_roster();
    info!("Known-caller roster loaded: {} entries", roster.len());

    let mut session = CallSession::new(config, roster, Box::new(ConsolePresenter));
    info!("Call session {} ready", session.id());

    // Set up signal handlers for graceful shutdown (Ctrl+C, SIGTERM)
    setup_signal_handlers();

    session.start().await?;

    // Wait for either the session to end on its own (socket closed or
    // failed) or a shutdown signal from the user.
    tokio::select! {
        _ = session.wait_closed() => {
            warn!("Session ended on its own");
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, ending call...");
        }
    }

    session.stop().await;
    info!("Call ended gracefully");
    Ok(())
}

/// The user's side of the safe list. The ids must match the speaker ids
/// the analysis service assigns to enrolled voices; everyone absent here
/// starts out unclassified.
fn build_roster() -> CallerRoster {
    CallerRoster::new().with_entry(RosterEntry::new("me", "You").as_self())
}

/// Renders aggregation changes as console lines through the logger.
///
/// Highlighted phrases are wrapped inline: `*advisory*` and `!danger!`.
/// Risk changes print the ladder position plus the current rationale.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn present(&mut self, delta: &StateDelta, state: &Aggregator) {
        if let Some(entry) = &delta.new_entry {
            info!(
                "[{}] {}: {}",
                entry.timestamp,
                entry.speaker_label,
                render_line(entry)
            );
        }

        if delta.speakers_changed {
            let roll: Vec<String> = state
                .speakers()
                .iter()
                .map(|speaker| match speaker.role.as_deref() {
                    Some(role) => format!(
                        "{} [{}, {}]",
                        speaker.display_name,
                        speaker.classification.as_str(),
                        role
                    ),
                    None => format!(
                        "{} [{}]",
                        speaker.display_name,
                        speaker.classification.as_str()
                    ),
                })
                .collect();
            info!("Speakers: {}", roll.join(", "));
        }

        if delta.risk_changed {
            let risk = state.risk();
            let headline = match (risk.level, state.known_caller_name()) {
                (RiskLevel::Safe, Some(name)) => format!("Known caller: {}", name),
                _ => risk.level.headline().to_string(),
            };
            info!(
                "Risk: {} | {} {}",
                risk.level.label(),
                headline,
                risk.rationale_or_default(state.has_known_caller())
            );
        }
    }
}

/// Flattens a transcript entry into one console line, highlight markers
/// included.
fn render_line(entry: &TranscriptEntry) -> String {
    let mut line = String::new();
    for segment in highlight::project(&entry.text, &entry.highlights) {
        match segment {
            Segment::Plain(text) => line.push_str(&text),
            Segment::Highlighted {
                text,
                severity: Severity::Advisory,
            } => {
                line.push('*');
                line.push_str(&text);
                line.push('*');
            }
            Segment::Highlighted {
                text,
                severity: Severity::Danger,
            } => {
                line.push('!');
                line.push_str(&text);
                line.push('!');
            }
        }
    }
    if let Some(level) = entry.risk_annotation {
        line.push_str(" <");
        line.push_str(level.as_str());
        line.push('>');
    }
    line
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "callguard=info")
/// - If not set, defaults to "callguard=debug,tungstenite=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callguard=debug,tungstenite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown.
///
/// Listens for SIGTERM and SIGINT in a background task; whichever lands
/// first flips the global shutdown flag for the main loop to notice.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set.
///
/// Polls the flag every 100ms; plenty responsive for an interactive
/// console without wasting cycles.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

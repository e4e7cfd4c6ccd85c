//! # Call Session
//!
//! Exclusive owner of everything one call needs: the transport, the
//! microphone capture controller, the analysis aggregator, and the
//! consumer loop gluing them together. A session lives for exactly one
//! call; the next call builds a fresh session.
//!
//! ## Lifecycle:
//! `start` dials the service, waits for the session to open (the bounded
//! wait lives here, not in the transport), and only then starts capture,
//! so no audio is ever produced without a live socket to carry it. `stop`
//! tears down in the documented order: microphone first, socket second.
//! The two activities stay independently cancellable in between:
//! stopping capture leaves the socket open, while losing the socket
//! force-stops capture from the consumer loop.
//!
//! ## Key Rust Concepts:
//! - **Arc<Mutex<T>>**: the capture controller and aggregator are shared
//!   between the session and its consumer task
//! - **JoinHandle**: the consumer loop is awaited during shutdown so the
//!   final events are processed before the session reports stopped
//! - **Trait objects**: rendering goes through `Box<dyn Presenter>`, so
//!   the state machine never depends on how output is drawn

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::aggregator::{Aggregator, StateDelta};
use crate::audio::capture::CaptureController;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::protocol;
use crate::roster::CallerRoster;
use crate::transport::{SessionState, SessionTransport, TransportEvent};

/// Renders aggregation changes to the user. Implementations are handed
/// the delta plus the full state, synchronously, from the consumer loop.
pub trait Presenter: Send {
    fn present(&mut self, delta: &StateDelta, state: &Aggregator);
}

/// One call, from dial to teardown.
pub struct CallSession {
    id: Uuid,
    config: AppConfig,
    capture: Arc<Mutex<CaptureController>>,
    aggregator: Arc<Mutex<Aggregator>>,
    presenter: Arc<Mutex<Box<dyn Presenter>>>,
    transport: Option<Arc<SessionTransport>>,
    consumer: Option<JoinHandle<()>>,
    started: bool,
    created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(config: AppConfig, roster: CallerRoster, presenter: Box<dyn Presenter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            capture: Arc::new(Mutex::new(CaptureController::new())),
            aggregator: Arc::new(Mutex::new(Aggregator::new(roster))),
            presenter: Arc::new(Mutex::new(presenter)),
            transport: None,
            consumer: None,
            started: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True while the consumer loop is running, i.e. the call is up or
    /// still winding down.
    pub fn is_live(&self) -> bool {
        self.consumer
            .as_ref()
            .map(|consumer| !consumer.is_finished())
            .unwrap_or(false)
    }

    /// Brings the call up: dial, wait for open, start the microphone,
    /// spawn the consumer loop.
    ///
    /// The transport has no deadline of its own, so the bounded wait
    /// happens here by polling session state. Not reaching open in time
    /// is a capture-start failure: the microphone is never touched.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.is_live() {
            debug!("Call {} already in progress; start ignored", self.id);
            return Ok(());
        }
        if self.started {
            return Err(AppError::Transport(
                "call session is one-shot; create a new one for the next call".to_string(),
            ));
        }
        self.started = true;

        info!(
            "Starting call {} at {}",
            self.id,
            self.created_at.format("%H:%M:%S")
        );
        self.aggregator.lock().unwrap().reset();

        let (transport, events) = SessionTransport::new(
            self.config.ws_url(),
            self.config.session.send_window_frames,
        );
        let transport = Arc::new(transport);

        let dialer = transport.clone();
        tokio::spawn(async move {
            if let Err(err) = dialer.connect().await {
                warn!("Connect attempt failed: {}", err);
            }
        });

        let deadline = Duration::from_millis(self.config.session.connect_timeout_ms);
        let interval = Duration::from_millis(self.config.session.connect_poll_interval_ms);
        if !wait_for_state(&transport, SessionState::Open, deadline, interval).await {
            transport.close();
            return Err(AppError::Capture(format!(
                "session not open after {}ms; capture never started",
                deadline.as_millis()
            )));
        }

        // The session is open; every captured frame goes straight at the
        // transport, which drops it again the moment the session is not.
        let sender = transport.clone();
        let capture_result = self.capture.lock().unwrap().start(move |frame| {
            sender.send(&frame);
        });
        if let Err(err) = capture_result {
            error!("Microphone unavailable: {}", err);
            transport.close();
            return Err(err);
        }

        self.consumer = Some(self.spawn_consumer(events));
        self.transport = Some(transport);
        info!("Call {} live against {}", self.id, self.config.ws_url());
        Ok(())
    }

    /// Single consumer of everything the session delivers. All state
    /// mutation happens here, synchronously per event, preserving arrival
    /// order.
    fn spawn_consumer(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) -> JoinHandle<()> {
        let aggregator = self.aggregator.clone();
        let presenter = self.presenter.clone();
        let capture = self.capture.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Opened => {
                        debug!("Analysis session reported open");
                    }
                    TransportEvent::Text(raw) => match protocol::decode_text(&raw) {
                        Ok(event) => {
                            let mut state = aggregator.lock().unwrap();
                            let delta = state.apply_event(event);
                            if !delta.is_empty() {
                                presenter.lock().unwrap().present(&delta, &state);
                            }
                        }
                        Err(err) => {
                            // One bad message; analysis state is untouched.
                            warn!("Dropping undecodable analysis message: {}", err);
                        }
                    },
                    TransportEvent::Binary(len) => {
                        debug!("Analysis service sent {} binary bytes", len);
                    }
                    TransportEvent::Failed(message) => {
                        error!("Analysis session failed: {}", message);
                    }
                    TransportEvent::Closed { clean } => {
                        // The socket is gone; the microphone must not
                        // outlive it.
                        capture.lock().unwrap().stop();
                        if clean {
                            info!("Analysis session closed");
                        } else {
                            warn!("Analysis session lost");
                        }
                        break;
                    }
                }
            }
        })
    }

    /// Blocks until the consumer loop ends, which happens when the
    /// session closes or fails. Cancellation-safe; the loop keeps its
    /// handle for [`CallSession::stop`] to reap.
    pub async fn wait_closed(&mut self) {
        if let Some(consumer) = self.consumer.as_mut() {
            let _ = consumer.await;
            self.consumer = None;
        }
    }

    /// Ends the call: microphone first, then the socket, then waits for
    /// the consumer loop to drain. Safe to call any number of times, in
    /// any state.
    pub async fn stop(&mut self) {
        let had_call = self.transport.is_some()
            || self.consumer.is_some()
            || self.capture.lock().unwrap().is_active();
        if !had_call {
            debug!("No call in progress; stop ignored");
            return;
        }

        info!("Stopping call {}", self.id);

        // Audio stops before the socket closes, so no frame can chase a
        // session that is already going down.
        self.capture.lock().unwrap().stop();

        if let Some(transport) = self.transport.take() {
            transport.close();
        }

        if let Some(mut consumer) = self.consumer.take() {
            let grace = Duration::from_millis(self.config.session.connect_timeout_ms);
            match tokio::time::timeout(grace, &mut consumer).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Consumer loop ended abnormally: {}", err),
                Err(_) => {
                    warn!(
                        "Session did not confirm close within {}ms; abandoning it",
                        grace.as_millis()
                    );
                    consumer.abort();
                }
            }
        }

        let state = self.aggregator.lock().unwrap();
        info!(
            "Call {} ended: {} transcript entries, {} speakers, final risk {}",
            self.id,
            state.entry_count(),
            state.speakers().len(),
            state.risk().level.as_str()
        );
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if let Ok(mut capture) = self.capture.lock() {
            capture.stop();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
    }
}

/// Polls the transport until it reaches `target`, a terminal state, or
/// the deadline. Returns true only on `target`.
async fn wait_for_state(
    transport: &SessionTransport,
    target: SessionState,
    deadline: Duration,
    interval: Duration,
) -> bool {
    let started = Instant::now();
    loop {
        let state = transport.state();
        if state == target {
            return true;
        }
        if state.is_terminal() {
            return false;
        }
        if started.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

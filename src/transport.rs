//! # Session Transport
//!
//! One WebSocket session to the analysis service: binary PCM frames go
//! up, JSON analysis events come down. The transport owns the socket and
//! a strict lifecycle state machine; everything above it talks in frames
//! and [`TransportEvent`]s and never touches the socket directly.
//!
//! ## Session Lifecycle:
//! ```text
//! idle -> connecting -> open -> closing -> closed
//!              |          |
//!              +----------+--> errored
//! ```
//!
//! Closed and errored are both terminal. A transport is one-shot: once it
//! reaches a terminal state it stays there, and a new call builds a new
//! transport. Connect requests while connecting or open are ignored;
//! connect requests on a dead transport are refused.
//!
//! ## Send Discipline:
//! Frames are accepted only while the session is open. Anything else is
//! dropped on the floor, never queued; stale audio from before the
//! session opened must not arrive at the service. The outbound channel is
//! bounded for the same reason: if the socket cannot drain fast enough,
//! dropping the newest frame beats buffering seconds of lag.

use std::sync::{Arc, Mutex, RwLock};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::audio::{encoder, AudioFrame};
use crate::error::{AppError, AppResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Errored => "errored",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

/// What the socket delivered, in arrival order. `Closed` is always the
/// final event of a session and is emitted exactly once.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    /// One JSON analysis message, still undecoded.
    Text(String),
    /// Binary inbound is unexpected; only its size is reported.
    Binary(usize),
    Failed(String),
    Closed { clean: bool },
}

struct TransportShared {
    url: String,
    state: RwLock<SessionState>,
    frame_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportShared {
    fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    /// Marks the session failed and finalizes it. A failure that lands
    /// while we are already closing is demoted to a clean shutdown.
    ///
    /// The whole transition happens under the state lock so that the
    /// reader and writer can both report the same breakage and still
    /// produce exactly one final event.
    fn fail(&self, message: String) {
        let mut state = self.state.write().unwrap();
        match *state {
            SessionState::Closed | SessionState::Errored => {}
            SessionState::Closing => {
                *state = SessionState::Closed;
                debug!("Ignoring transport error during close: {}", message);
                self.frame_tx.lock().unwrap().take();
                let _ = self.event_tx.send(TransportEvent::Closed { clean: true });
            }
            _ => {
                *state = SessionState::Errored;
                error!("Transport failure: {}", message);
                self.frame_tx.lock().unwrap().take();
                let _ = self.event_tx.send(TransportEvent::Failed(message));
                let _ = self.event_tx.send(TransportEvent::Closed { clean: false });
            }
        }
    }

    /// Orderly final transition, idempotent against both terminal states.
    fn finish_closed(&self, clean: bool) {
        let mut state = self.state.write().unwrap();
        if state.is_terminal() {
            return;
        }
        *state = SessionState::Closed;
        self.frame_tx.lock().unwrap().take();
        let _ = self.event_tx.send(TransportEvent::Closed { clean });
    }
}

/// Handle to one analysis session. Cheap to share behind an [`Arc`];
/// `send` is callable from any thread, including the audio callback.
pub struct SessionTransport {
    shared: Arc<TransportShared>,
    send_window: usize,
}

impl SessionTransport {
    /// Creates an idle transport and the event stream its session will
    /// feed. `send_window` bounds the outbound frame queue.
    pub fn new(url: String, send_window: usize) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Self {
            shared: Arc::new(TransportShared {
                url,
                state: RwLock::new(SessionState::Idle),
                frame_tx: Mutex::new(None),
                event_tx,
            }),
            send_window,
        };
        (transport, event_rx)
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Dials the service and, on success, spawns the reader and writer
    /// tasks for the session. Returns once the handshake settles; there
    /// is no built-in deadline, callers poll [`SessionTransport::state`]
    /// against their own.
    ///
    /// Calling this while connecting or open is a no-op; calling it on a
    /// finished transport is an error.
    pub async fn connect(&self) -> AppResult<()> {
        {
            let mut state = self.shared.state.write().unwrap();
            match *state {
                SessionState::Idle => {
                    *state = SessionState::Connecting;
                }
                SessionState::Connecting | SessionState::Open => {
                    debug!("Session already {}; connect ignored", state.as_str());
                    return Ok(());
                }
                other => {
                    return Err(AppError::Transport(format!(
                        "session already {}; transports are one-shot",
                        other.as_str()
                    )));
                }
            }
        }

        info!("Connecting to {}", self.shared.url);
        let ws_stream = match connect_async(self.shared.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                if self.shared.state() == SessionState::Closing {
                    // close() won the race; the failure is moot.
                    self.shared.finish_closed(true);
                    return Ok(());
                }
                let message = format!("handshake with {} failed: {}", self.shared.url, err);
                self.shared.fail(message.clone());
                return Err(AppError::Transport(message));
            }
        };

        let opened = {
            let mut state = self.shared.state.write().unwrap();
            if *state == SessionState::Connecting {
                *state = SessionState::Open;
                true
            } else {
                false
            }
        };
        if !opened {
            // close() arrived mid-handshake; abandon the fresh socket.
            info!("Session closed during handshake; dropping socket");
            self.shared.finish_closed(true);
            return Ok(());
        }

        let (sink, source) = ws_stream.split();
        let (frame_tx, frame_rx) = mpsc::channel(self.send_window);
        *self.shared.frame_tx.lock().unwrap() = Some(frame_tx);

        info!("Session open to {}", self.shared.url);
        let _ = self.shared.event_tx.send(TransportEvent::Opened);

        tokio::spawn(run_writer(sink, frame_rx, self.shared.clone()));
        tokio::spawn(run_reader(source, self.shared.clone()));
        Ok(())
    }

    /// Hands one audio frame to the session. Returns true when the frame
    /// was accepted. Frames offered while the session is not open, or
    /// while the send window is full, are dropped.
    pub fn send(&self, frame: &AudioFrame) -> bool {
        let state = self.state();
        if state != SessionState::Open {
            debug!(
                "Dropping {}-byte frame; session is {}",
                frame.byte_len(),
                state.as_str()
            );
            return false;
        }

        let guard = self.shared.frame_tx.lock().unwrap();
        match guard.as_ref() {
            Some(sender) => match sender.try_send(encoder::frame_to_bytes(&frame.samples)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Send window full; dropping audio frame");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    /// Begins an orderly shutdown. The writer drains what it has, sends
    /// the protocol close frame, and the session finishes closed once the
    /// server acknowledges. A no-op unless the session is connecting or
    /// open.
    pub fn close(&self) {
        let proceed = {
            let mut state = self.shared.state.write().unwrap();
            match *state {
                SessionState::Open | SessionState::Connecting => {
                    *state = SessionState::Closing;
                    true
                }
                _ => false,
            }
        };
        if !proceed {
            debug!("No live session; close ignored");
            return;
        }
        info!("Closing session to {}", self.shared.url);
        // Dropping the frame sender ends the writer, which says goodbye.
        self.shared.frame_tx.lock().unwrap().take();
    }
}

/// Drains the outbound frame channel into the socket. Once the channel
/// closes, sends the protocol close frame if this is an orderly shutdown.
async fn run_writer(
    mut sink: WsSink,
    mut frame_rx: mpsc::Receiver<Vec<u8>>,
    shared: Arc<TransportShared>,
) {
    while let Some(frame) = frame_rx.recv().await {
        if let Err(err) = sink.send(Message::Binary(frame)).await {
            shared.fail(format!("send failed: {}", err));
            return;
        }
    }
    if shared.state() == SessionState::Closing {
        if let Err(err) = sink.send(Message::Close(None)).await {
            debug!("Close frame not delivered: {}", err);
        }
    }
}

/// Forwards inbound traffic as events until the socket ends, then
/// finalizes the session.
async fn run_reader(mut source: WsSource, shared: Arc<TransportShared>) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let _ = shared.event_tx.send(TransportEvent::Text(text));
            }
            Ok(Message::Binary(data)) => {
                debug!("Unexpected binary payload: {} bytes", data.len());
                let _ = shared.event_tx.send(TransportEvent::Binary(data.len()));
            }
            Ok(Message::Close(frame)) => {
                match frame {
                    Some(frame) => info!("Server closed the session: {} {}", frame.code, frame.reason),
                    None => info!("Server closed the session"),
                }
                break;
            }
            // Ping and pong are answered by the protocol library.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Frame(_)) => {}
            Err(err) => {
                shared.fail(format!("receive failed: {}", err));
                return;
            }
        }
    }

    match shared.state() {
        SessionState::Closing => shared.finish_closed(true),
        state if state.is_terminal() => {}
        _ => {
            warn!("Session ended by the server");
            shared.finish_closed(false);
        }
    }
}

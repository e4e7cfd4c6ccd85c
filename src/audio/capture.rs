//! # Microphone Capture
//!
//! Owns the microphone device stream and the sampling pipeline. Frames come
//! out through a caller-supplied callback at a fixed cadence: one
//! 4096-sample mono block at 16 kHz roughly every 256 ms.
//!
//! ## Lifecycle:
//! 1. **start(on_frame)**: acquire the default input device, open a stream,
//!    begin delivering frames; fails cleanly with nothing acquired
//! 2. **Running**: the device callback feeds the block assembler; complete
//!    frames go straight to `on_frame`
//! 3. **stop()**: signal the worker, stop callbacks, drop the stream handle,
//!    release the device, in that order, swallowing teardown errors
//!
//! `start` on a running controller and `stop` on a stopped one are both
//! no-ops, so the lifecycle is idempotent at both ends.
//!
//! ## Threading:
//! The platform stream handle is not `Send`, so a dedicated worker thread
//! builds and owns it, parking on a stop channel until teardown. Frame
//! callbacks run on the device's callback thread and must stay cheap: they
//! only assemble blocks and forward them.

use crate::audio::buffer::BlockAssembler;
use crate::audio::{AudioFrame, BLOCK_SIZE, SAMPLE_RATE};
use crate::error::{AppError, AppResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Controller for the exclusive microphone stream.
///
/// ## State:
/// Holds the worker handle while capture is active, `None` otherwise. All
/// stop paths funnel through `stop()`, including drop, so the device is
/// released on every exit path.
pub struct CaptureController {
    worker: Option<CaptureWorker>,
}

/// Handle to the thread that owns the platform stream.
struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl CaptureController {
    /// Create a stopped controller.
    pub fn new() -> Self {
        Self { worker: None }
    }

    /// Acquire the microphone and begin delivering frames to `on_frame`.
    ///
    /// ## Behavior:
    /// - Already running: no-op, returns Ok
    /// - Device acquisition fails: returns a capture error and the
    ///   controller stays stopped; nothing is partially started
    ///
    /// ## Parameters:
    /// - **on_frame**: invoked once per complete block, on the device's
    ///   callback thread
    pub fn start<F>(&mut self, on_frame: F) -> AppResult<()>
    where
        F: Fn(AudioFrame) + Send + 'static,
    {
        if self.worker.is_some() {
            debug!("Capture already running; start request ignored");
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture_worker(on_frame, ready_tx, stop_rx))
            .map_err(|err| AppError::Capture(format!("failed to spawn capture thread: {}", err)))?;

        // Block until the worker reports device acquisition. The worker
        // handle is only stored on success, so a failed start leaves the
        // controller in the stopped state.
        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                info!(
                    "Audio capture started ({} Hz mono, {}-sample blocks)",
                    SAMPLE_RATE, BLOCK_SIZE
                );
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(AppError::Capture(message))
            }
            Err(_) => {
                let _ = handle.join();
                Err(AppError::Capture(
                    "capture worker exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Tear down the capture pipeline.
    ///
    /// ## Teardown order:
    /// Signal the worker, which pauses the stream (callbacks stop), drops
    /// the stream handle, and releases the device. Teardown errors are
    /// logged and swallowed; calling this on a stopped controller is a no-op.
    pub fn stop(&mut self) {
        match self.worker.take() {
            Some(worker) => {
                let _ = worker.stop_tx.send(());
                if worker.handle.join().is_err() {
                    warn!("Capture worker panicked during teardown");
                }
                info!("Audio capture stopped");
            }
            None => {
                debug!("Capture already stopped; stop request ignored");
            }
        }
    }

    /// Whether the microphone stream is currently held.
    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runtime stream errors surface here, on the device callback thread.
/// Capture keeps running; a device that disappears simply stops producing
/// callbacks, matching the stop-silently contract for mid-call failures.
fn log_stream_error(err: cpal::StreamError) {
    warn!("Capture stream error: {}", err);
}

/// Body of the capture worker thread: open the device, stream until told to
/// stop, then tear down in order.
fn run_capture_worker<F>(
    on_frame: F,
    ready_tx: mpsc::Sender<Result<(), String>>,
    stop_rx: mpsc::Receiver<()>,
) where
    F: Fn(AudioFrame) + Send + 'static,
{
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err("no input device available".to_string()));
            return;
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let default_config = match device.default_input_config() {
        Ok(config) => config,
        Err(err) => {
            let _ = ready_tx.send(Err(format!("failed to query input config: {}", err)));
            return;
        }
    };
    let sample_format = default_config.sample_format();
    let stream_config: cpal::StreamConfig = default_config.into();

    info!(
        "Opening capture device '{}' at {} Hz, {} channel(s), {:?} samples",
        device_name, stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let mut assembler = BlockAssembler::new(stream_config.sample_rate.0, stream_config.channels);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in assembler.push(data) {
                    on_frame(frame);
                }
            },
            log_stream_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                for frame in assembler.push(&floats) {
                    on_frame(frame);
                }
            },
            log_stream_error,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(format!("unsupported input sample format: {:?}", other)));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(format!("failed to open capture stream: {}", err)));
            return;
        }
    };

    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start capture stream: {}", err)));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop. A dropped sender also unblocks the worker, so an
    // owner that disappears without calling stop still releases the device.
    let _ = stop_rx.recv();

    // Teardown order: stop callbacks, drop the stream handle, then let the
    // device handle fall out of scope. Errors are swallowed.
    if let Err(err) = stream.pause() {
        debug!("Capture stream pause failed during teardown: {}", err);
    }
    drop(stream);
    debug!("Capture device '{}' released", device_name);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stopping a controller that never started must be a harmless no-op,
    /// and repeating it must not change anything.
    #[test]
    fn test_stop_is_idempotent_without_start() {
        let mut controller = CaptureController::new();
        assert!(!controller.is_active());
        controller.stop();
        controller.stop();
        assert!(!controller.is_active());
    }

    #[test]
    fn test_default_controller_is_stopped() {
        let controller = CaptureController::default();
        assert!(!controller.is_active());
    }
}

//! Voice mode: capture, recognition, and dispatch wired together.
//!
//! Three execution contexts run for the lifetime of voice mode: a capture
//! thread polling the audio source and assembling fixed frames, a
//! recognition task driving the backend stream, and a dispatch task owning
//! the actuator connection. The only state shared between recognition and
//! dispatch is the pending batch slot; everything else moves by value
//! through channels.

use crate::audio::frame::FrameAssembler;
use crate::audio::recorder::AudioSource;
use crate::defaults;
use crate::error::Result;
use crate::recognition::backend::{SpeechBackend, StreamParams};
use crate::recognition::client::{RecognitionClient, RecognitionSettings};
use crate::relay::batch::PendingBatch;
use crate::relay::dispatcher::{Dispatcher, DispatcherSettings};
use crate::relay::link::LinkConnector;
use crate::status::StatusTx;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task;

/// Everything voice mode needs to know that is not a collaborator.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub params: StreamParams,
    pub recognition: RecognitionSettings,
    pub dispatch: DispatcherSettings,
    /// Verbosity level (0=status only, 1=recognized/sent lines, 2=stream diagnostics)
    pub verbosity: u8,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            params: StreamParams::default(),
            recognition: RecognitionSettings::default(),
            dispatch: DispatcherSettings::default(),
            verbosity: 0,
        }
    }
}

/// Voice mode entry point.
pub struct VoiceMode {
    settings: VoiceSettings,
}

impl VoiceMode {
    pub fn new(settings: VoiceSettings) -> Self {
        Self { settings }
    }

    /// Start voice mode and return a handle to await or stop it.
    ///
    /// Acquires the audio source before spawning anything, so a missing
    /// device fails here rather than inside a detached context. Frames that
    /// arrive while the capture-to-recognition channel is full are dropped
    /// (degraded mode); capture order is never reordered.
    pub fn start(
        self,
        mut audio_source: Box<dyn AudioSource>,
        backend: Arc<dyn SpeechBackend>,
        connector: Arc<dyn LinkConnector>,
        status: StatusTx,
    ) -> Result<VoiceModeHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(PendingBatch::new());
        let (frame_tx, frame_rx) = mpsc::channel(defaults::FRAME_CHANNEL_CAPACITY);

        audio_source.start()?;
        let source_is_finite = audio_source.is_finite();

        // Capture thread: poll the source, assemble frames, hand them off.
        // Dropping the sender on exit terminates the frame sequence.
        let capture_running = running.clone();
        let mut assembler = FrameAssembler::new(self.settings.sample_rate, self.settings.frame_ms);
        let verbosity = self.settings.verbosity;
        let capture = thread::spawn(move || {
            let poll_interval = Duration::from_millis(16);

            let mut consecutive_errors: u32 = 0;
            const MAX_CONSECUTIVE_ERRORS: u32 = 10;

            while capture_running.load(Ordering::SeqCst) {
                let samples = match audio_source.read_samples() {
                    Ok(s) => {
                        consecutive_errors = 0;
                        s
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            eprintln!(
                                "voxrelay: audio capture failed {consecutive_errors} times in a row: {e}"
                            );
                            eprintln!("voxrelay: check your microphone connection and try again");
                            break;
                        }
                        thread::sleep(poll_interval);
                        continue;
                    }
                };

                if samples.is_empty() {
                    if source_is_finite {
                        // File/replay source exhausted
                        break;
                    }
                    // Live source: empty read is normal while the device
                    // spins up. Keep polling.
                    thread::sleep(poll_interval);
                    continue;
                }

                for frame in assembler.push(&samples) {
                    // Channel full → drop this frame rather than stall the
                    // hardware callback.
                    if frame_tx.try_send(frame).is_err() && verbosity >= 2 {
                        eprintln!("voxrelay: frame channel full, dropping frame");
                    }
                }

                thread::sleep(poll_interval);
            }

            if let Err(e) = audio_source.stop() {
                eprintln!("voxrelay: failed to stop audio capture: {e}");
            }
        });

        let recognition = task::spawn(
            RecognitionClient::new(
                backend,
                self.settings.params.clone(),
                self.settings.recognition.clone(),
                frame_rx,
                pending.clone(),
                status.clone(),
                running.clone(),
                self.settings.verbosity,
            )
            .run(),
        );

        let dispatch = task::spawn(
            Dispatcher::new(
                connector,
                self.settings.dispatch.clone(),
                pending,
                status,
                running.clone(),
                self.settings.verbosity,
            )
            .run(),
        );

        Ok(VoiceModeHandle {
            running,
            capture: Some(capture),
            recognition: Some(recognition),
            dispatch: Some(dispatch),
        })
    }
}

/// Handle to running voice mode.
pub struct VoiceModeHandle {
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<()>>,
    recognition: Option<task::JoinHandle<Result<()>>>,
    dispatch: Option<task::JoinHandle<Result<()>>>,
}

impl VoiceModeHandle {
    /// Returns true until `stop` has been called or a context gave up.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until the recognition or dispatch context finishes on its own —
    /// a fatal error, or the frame sequence ending for a finite source.
    pub async fn wait(&mut self) -> Result<()> {
        match (self.recognition.take(), self.dispatch.take()) {
            (Some(mut recognition), Some(mut dispatch)) => {
                tokio::select! {
                    result = &mut recognition => {
                        self.dispatch = Some(dispatch);
                        flatten(result)
                    }
                    result = &mut dispatch => {
                        self.recognition = Some(recognition);
                        flatten(result)
                    }
                }
            }
            (Some(recognition), None) => flatten(recognition.await),
            (None, Some(dispatch)) => flatten(dispatch.await),
            (None, None) => Ok(()),
        }
    }

    /// Stop voice mode. Idempotent: a second call finds nothing left to
    /// release and returns immediately.
    ///
    /// Signals all contexts, waits briefly for the capture thread (which
    /// owns the microphone release), and bounds the wait for both tasks so
    /// shutdown can never deadlock on a frame that will not arrive.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(capture) = self.capture.take() {
            let deadline = Instant::now() + Duration::from_secs(1);
            while !capture.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if capture.is_finished() {
                if capture.join().is_err() {
                    eprintln!("voxrelay: capture thread panicked");
                }
            } else {
                // Detached; it dies with the process.
                eprintln!("voxrelay: shutdown timeout, detaching capture thread");
            }
        }

        for (name, handle) in [
            ("recognition", self.recognition.take()),
            ("dispatch", self.dispatch.take()),
        ] {
            let Some(handle) = handle else { continue };
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(result) => {
                    if let Err(e) = flatten(result) {
                        eprintln!("voxrelay: {name} ended with error: {e}");
                    }
                }
                Err(_) => {
                    eprintln!("voxrelay: shutdown timeout waiting for {name}");
                }
            }
        }
    }
}

fn flatten(result: std::result::Result<Result<()>, task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(crate::error::VoxrelayError::Other(format!(
            "voice mode context panicked: {e}"
        ))),
    }
}

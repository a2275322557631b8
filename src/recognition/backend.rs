//! The speech backend seam: an opaque bidirectional recognition stream.
//!
//! A stream is opened per session and split into two halves so audio can be
//! pushed while events are awaited concurrently: a `FrameSink` carrying PCM
//! toward the backend and an `EventSource` yielding transcription events
//! back. Implementations: the websocket backend (`recognition::ws`) and the
//! scripted fake below.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One transcription result from the backend.
///
/// Successive events for the same utterance revise the transcript; `is_final`
/// marks the backend's last revision. Events are transient — consumed once
/// by the extractor and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionEvent {
    /// The transcript text, whitespace-delimited tokens.
    pub transcript: String,
    /// Whether the backend considers this utterance complete.
    pub is_final: bool,
}

impl TranscriptionEvent {
    /// An interim (revisable) event.
    pub fn interim(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: false,
        }
    }

    /// A final event.
    pub fn final_result(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: true,
        }
    }
}

/// Parameters for opening a recognition stream.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub language: String,
    pub interim_results: bool,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            sample_rate: crate::defaults::SAMPLE_RATE,
            language: crate::defaults::LANGUAGE.to_string(),
            interim_results: true,
        }
    }
}

/// Outbound half of a recognition stream: accepts PCM frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Push one frame of samples toward the backend.
    async fn push_frame(&mut self, samples: &[i16]) -> Result<()>;

    /// Close the outbound half, ending the session.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a recognition stream: yields transcription events.
#[async_trait]
pub trait EventSource: Send {
    /// Await the next event. `Ok(None)` means the backend closed the stream.
    ///
    /// Implementations never yield events with an absent transcript; results
    /// without alternatives are skipped at this boundary.
    async fn next_event(&mut self) -> Result<Option<TranscriptionEvent>>;
}

/// Factory for recognition streams.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Open a fresh bidirectional stream.
    async fn open_stream(
        &self,
        params: &StreamParams,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn EventSource>)>;
}

/// One scripted step of a fake recognition session.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield this event.
    Event(TranscriptionEvent),
    /// Report the stream as closed by the backend (forces a reopen).
    CloseStream,
}

/// Scripted backend for testing.
///
/// Each `open_stream` call consumes the next session script; when the
/// scripts run out, sessions yield no events (the source stays pending so
/// the client keeps forwarding frames until capture ends). Frames pushed
/// and sessions opened are counted for assertions.
#[derive(Clone)]
pub struct ScriptedBackend {
    sessions: Arc<Mutex<VecDeque<VecDeque<ScriptStep>>>>,
    open_errors: Arc<Mutex<VecDeque<crate::error::VoxrelayError>>>,
    opened: Arc<AtomicUsize>,
    frames_pushed: Arc<AtomicU64>,
    event_gap: Duration,
}

impl ScriptedBackend {
    /// A backend whose first session yields the given events.
    pub fn new(events: Vec<TranscriptionEvent>) -> Self {
        Self::with_sessions(vec![events.into_iter().map(ScriptStep::Event).collect()])
    }

    /// A backend with one script per session, consumed in order.
    pub fn with_sessions(sessions: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(
                sessions.into_iter().map(VecDeque::from).collect(),
            )),
            open_errors: Arc::new(Mutex::new(VecDeque::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            frames_pushed: Arc::new(AtomicU64::new(0)),
            event_gap: Duration::from_millis(10),
        }
    }

    /// Queue errors to be returned by the next `open_stream` calls, before
    /// any scripted session is handed out.
    pub fn with_open_errors(self, errors: Vec<crate::error::VoxrelayError>) -> Self {
        if let Ok(mut queue) = self.open_errors.lock() {
            queue.extend(errors);
        }
        self
    }

    /// Delay between scripted events.
    pub fn with_event_gap(mut self, gap: Duration) -> Self {
        self.event_gap = gap;
        self
    }

    /// Number of streams opened so far.
    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Total frames pushed across all sessions.
    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    async fn open_stream(
        &self,
        _params: &StreamParams,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn EventSource>)> {
        if let Ok(mut errors) = self.open_errors.lock()
            && let Some(err) = errors.pop_front()
        {
            return Err(err);
        }

        self.opened.fetch_add(1, Ordering::SeqCst);

        let script = self
            .sessions
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_default();

        let sink = ScriptedSink {
            frames_pushed: self.frames_pushed.clone(),
        };
        let source = ScriptedSource {
            script,
            event_gap: self.event_gap,
            ready_at: None,
        };
        Ok((Box::new(sink), Box::new(source)))
    }
}

struct ScriptedSink {
    frames_pushed: Arc<AtomicU64>,
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn push_frame(&mut self, _samples: &[i16]) -> Result<()> {
        self.frames_pushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct ScriptedSource {
    script: VecDeque<ScriptStep>,
    event_gap: Duration,
    // Deadline survives a dropped poll: callers race next_event against
    // frame arrival in a select, and a fresh sleep per poll would reset
    // the gap each time a frame won.
    ready_at: Option<tokio::time::Instant>,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<Option<TranscriptionEvent>> {
        let deadline = *self
            .ready_at
            .get_or_insert_with(|| tokio::time::Instant::now() + self.event_gap);
        tokio::time::sleep_until(deadline).await;
        self.ready_at = None;
        match self.script.pop_front() {
            Some(ScriptStep::Event(event)) => Ok(Some(event)),
            Some(ScriptStep::CloseStream) => Ok(None),
            None => {
                // Script exhausted: stay silent until the session is dropped.
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

//! The recognition session loop.
//!
//! Owns the capture-to-recognition frame channel and one live backend
//! stream at a time. Backend session lifetimes are bounded, so the loop
//! counts forwarded frames and cycles to a fresh stream when the cap is
//! reached; the frame that trips the cap is carried into the new stream
//! so the cap costs reconnect latency, never audio. Transient open
//! failures retry with exponential backoff up to a consecutive-failure
//! bound; authentication failures abort voice mode.

use crate::audio::frame::AudioFrame;
use crate::defaults;
use crate::error::{Result, VoxrelayError};
use crate::recognition::backend::{SpeechBackend, StreamParams, TranscriptionEvent};
use crate::recognition::extract::CommandExtractor;
use crate::relay::batch::PendingBatch;
use crate::retry::backoff_delay;
use crate::status::StatusTx;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Session-loop policy knobs.
#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    /// Frames forwarded per stream before it is cycled.
    pub frames_per_stream: u64,
    /// Consecutive stream-open failures tolerated before escalating.
    pub max_retries: u32,
    /// Backoff base/ceiling for reopen attempts, in milliseconds.
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            frames_per_stream: defaults::frames_per_stream(
                defaults::STREAM_LIFETIME_SECS,
                defaults::FRAME_MS,
            ),
            max_retries: defaults::MAX_STREAM_RETRIES,
            reconnect_base_ms: defaults::RECONNECT_BASE_MS,
            reconnect_max_ms: defaults::RECONNECT_MAX_MS,
        }
    }
}

/// Drives frames into the backend and extracted batches out to the relay.
pub struct RecognitionClient {
    backend: Arc<dyn SpeechBackend>,
    params: StreamParams,
    settings: RecognitionSettings,
    frames: mpsc::Receiver<AudioFrame>,
    extractor: CommandExtractor,
    pending: Arc<PendingBatch>,
    status: StatusTx,
    running: Arc<AtomicBool>,
    verbosity: u8,
}

impl RecognitionClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        params: StreamParams,
        settings: RecognitionSettings,
        frames: mpsc::Receiver<AudioFrame>,
        pending: Arc<PendingBatch>,
        status: StatusTx,
        running: Arc<AtomicBool>,
        verbosity: u8,
    ) -> Self {
        Self {
            backend,
            params,
            settings,
            frames,
            extractor: CommandExtractor::new(),
            pending,
            status,
            running,
            verbosity,
        }
    }

    /// Run until the frame sequence terminates, shutdown is signaled, or a
    /// fatal error occurs.
    pub async fn run(self) -> Result<()> {
        let RecognitionClient {
            backend,
            params,
            settings,
            mut frames,
            mut extractor,
            pending,
            status,
            running,
            verbosity,
        } = self;

        let mut consecutive_retries: u32 = 0;
        let mut carry: Option<AudioFrame> = None;

        'session: loop {
            if !running.load(Ordering::SeqCst) {
                return Ok(());
            }

            let (mut sink, mut source) = match backend.open_stream(&params).await {
                Ok(pair) => {
                    consecutive_retries = 0;
                    pair
                }
                Err(e @ VoxrelayError::StreamAuth { .. }) => return Err(e),
                Err(e) => {
                    consecutive_retries += 1;
                    if consecutive_retries > settings.max_retries {
                        return Err(VoxrelayError::StreamTransient {
                            message: format!(
                                "recognition stream failed {} times in a row: {}",
                                consecutive_retries, e
                            ),
                        });
                    }
                    // Quota exhaustion backs off one step steeper than a
                    // plain transient failure.
                    let attempt = if matches!(e, VoxrelayError::BackendQuota { .. }) {
                        consecutive_retries + 1
                    } else {
                        consecutive_retries
                    };
                    if verbosity >= 1 {
                        eprintln!(
                            "voxrelay: recognition stream open failed (attempt {}): {}",
                            consecutive_retries, e
                        );
                    }
                    tokio::time::sleep(backoff_delay(
                        attempt,
                        settings.reconnect_base_ms,
                        settings.reconnect_max_ms,
                    ))
                    .await;
                    continue 'session;
                }
            };

            let mut frames_in_stream: u64 = 0;

            // Re-push the frame that tripped the previous session's cap.
            if let Some(frame) = carry.take() {
                match sink.push_frame(&frame.samples).await {
                    Ok(()) => frames_in_stream = 1,
                    Err(e) => {
                        if verbosity >= 1 {
                            eprintln!("voxrelay: recognition send failed: {}", e);
                        }
                        carry = Some(frame);
                        tokio::time::sleep(backoff_delay(
                            1,
                            settings.reconnect_base_ms,
                            settings.reconnect_max_ms,
                        ))
                        .await;
                        continue 'session;
                    }
                }
            }

            loop {
                if !running.load(Ordering::SeqCst) {
                    let _ = sink.close().await;
                    return Ok(());
                }

                tokio::select! {
                    maybe_frame = frames.recv() => match maybe_frame {
                        None => {
                            // Capture ended: the frame sequence terminated.
                            let _ = sink.close().await;
                            return Ok(());
                        }
                        Some(frame) => {
                            if frames_in_stream >= settings.frames_per_stream {
                                if verbosity >= 2 {
                                    eprintln!(
                                        "voxrelay: recognition stream lifetime reached, reopening"
                                    );
                                }
                                let _ = sink.close().await;
                                carry = Some(frame);
                                continue 'session;
                            }
                            if let Err(e) = sink.push_frame(&frame.samples).await {
                                if verbosity >= 1 {
                                    eprintln!("voxrelay: recognition send failed: {}", e);
                                }
                                carry = Some(frame);
                                tokio::time::sleep(backoff_delay(
                                    1,
                                    settings.reconnect_base_ms,
                                    settings.reconnect_max_ms,
                                ))
                                .await;
                                continue 'session;
                            }
                            frames_in_stream += 1;
                        }
                    },
                    event = source.next_event() => match event {
                        Ok(Some(event)) => {
                            accept_event(&mut extractor, &pending, &status, verbosity, &event);
                        }
                        Ok(None) => {
                            if verbosity >= 2 {
                                eprintln!("voxrelay: recognition backend closed stream, reopening");
                            }
                            let _ = sink.close().await;
                            continue 'session;
                        }
                        Err(e) => {
                            if verbosity >= 1 {
                                eprintln!("voxrelay: recognition receive failed: {}", e);
                            }
                            let _ = sink.close().await;
                            tokio::time::sleep(backoff_delay(
                                1,
                                settings.reconnect_base_ms,
                                settings.reconnect_max_ms,
                            ))
                            .await;
                            continue 'session;
                        }
                    },
                }
            }
        }
    }
}

/// Feed one event through the extractor; accepted batches go to the pending
/// slot and a recognized notification carries the batch's last token.
fn accept_event(
    extractor: &mut CommandExtractor,
    pending: &PendingBatch,
    status: &StatusTx,
    verbosity: u8,
    event: &TranscriptionEvent,
) {
    if let Some(tokens) = extractor.accept(event) {
        if verbosity >= 1 {
            eprintln!("voxrelay: recognized {}", tokens.join(" "));
        }
        let last = tokens.last().cloned();
        pending.replace(tokens);
        if let Some(last) = last {
            status.recognized(&last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::backend::ScriptedBackend;
    use crate::status::{StatusUpdate, status_channel};
    use std::time::Duration;

    fn fast_settings(frames_per_stream: u64, max_retries: u32) -> RecognitionSettings {
        RecognitionSettings {
            frames_per_stream,
            max_retries,
            reconnect_base_ms: 1,
            reconnect_max_ms: 4,
        }
    }

    fn client(
        backend: Arc<dyn SpeechBackend>,
        settings: RecognitionSettings,
        frames: mpsc::Receiver<AudioFrame>,
        pending: Arc<PendingBatch>,
        status: StatusTx,
    ) -> RecognitionClient {
        RecognitionClient::new(
            backend,
            StreamParams::default(),
            settings,
            frames,
            pending,
            status,
            Arc::new(AtomicBool::new(true)),
            0,
        )
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let backend = ScriptedBackend::new(vec![]).with_open_errors(vec![
            VoxrelayError::StreamAuth {
                message: "bad credentials".into(),
            },
        ]);
        let (_tx, rx) = mpsc::channel(4);
        let (status, _status_rx) = status_channel();

        let result = client(
            Arc::new(backend),
            fast_settings(100, 5),
            rx,
            Arc::new(PendingBatch::new()),
            status,
        )
        .run()
        .await;

        assert!(matches!(result, Err(VoxrelayError::StreamAuth { .. })));
    }

    #[tokio::test]
    async fn transient_failures_escalate_after_bounded_retries() {
        let open_errors = (0..3)
            .map(|i| VoxrelayError::StreamTransient {
                message: format!("refused {i}"),
            })
            .collect();
        let backend = ScriptedBackend::new(vec![]).with_open_errors(open_errors);
        let (_tx, rx) = mpsc::channel(4);
        let (status, _status_rx) = status_channel();

        let result = client(
            Arc::new(backend),
            fast_settings(100, 2),
            rx,
            Arc::new(PendingBatch::new()),
            status,
        )
        .run()
        .await;

        match result {
            Err(VoxrelayError::StreamTransient { message }) => {
                assert!(message.contains("3 times in a row"), "got: {message}");
            }
            other => panic!("expected escalated transient error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_cycles_at_lifetime_cap_without_losing_frames() {
        let backend = ScriptedBackend::with_sessions(vec![vec![], vec![], vec![]]);
        let probe = backend.clone();
        let (tx, rx) = mpsc::channel(16);
        let (status, _status_rx) = status_channel();

        let task = tokio::spawn(
            client(
                Arc::new(backend),
                fast_settings(2, 5),
                rx,
                Arc::new(PendingBatch::new()),
                status,
            )
            .run(),
        );

        for sequence in 0..5u64 {
            tx.send(AudioFrame::new(vec![0i16; 16], sequence))
                .await
                .unwrap();
        }
        drop(tx);

        task.await.unwrap().unwrap();

        // 2 frames per stream, 5 frames total → three sessions, no frame lost
        assert_eq!(probe.frames_pushed(), 5);
        assert!(probe.streams_opened() >= 3);
    }

    #[tokio::test]
    async fn events_produce_batches_and_notifications() {
        let backend = ScriptedBackend::new(vec![
            TranscriptionEvent::interim("왼쪽"),
            TranscriptionEvent::interim("왼쪽"),
            TranscriptionEvent::interim("오른쪽"),
        ])
        .with_event_gap(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel(4);
        let (status, status_rx) = status_channel();
        let pending = Arc::new(PendingBatch::new());

        let task = tokio::spawn(
            client(
                Arc::new(backend),
                fast_settings(100, 5),
                rx,
                pending.clone(),
                status,
            )
            .run(),
        );

        // Give the scripted events time to flow, then end capture.
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(tx);
        task.await.unwrap().unwrap();

        // Duplicate suppressed; the last distinct batch is pending
        assert_eq!(pending.take(), Some(vec!["오른쪽".to_string()]));

        let updates: Vec<_> = status_rx.try_iter().collect();
        assert_eq!(
            updates,
            vec![
                StatusUpdate::Recognized("왼쪽".into()),
                StatusUpdate::Recognized("오른쪽".into()),
            ]
        );
    }

    #[tokio::test]
    async fn backend_close_triggers_reopen() {
        use crate::recognition::backend::ScriptStep;

        let backend = ScriptedBackend::with_sessions(vec![
            vec![
                ScriptStep::Event(TranscriptionEvent::interim("정지")),
                ScriptStep::CloseStream,
            ],
            vec![],
        ])
        .with_event_gap(Duration::from_millis(1));
        let probe = backend.clone();
        let (tx, rx) = mpsc::channel(4);
        let (status, _status_rx) = status_channel();
        let pending = Arc::new(PendingBatch::new());

        let task = tokio::spawn(
            client(
                Arc::new(backend),
                fast_settings(100, 5),
                rx,
                pending.clone(),
                status,
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(tx);
        task.await.unwrap().unwrap();

        assert_eq!(pending.take(), Some(vec!["정지".to_string()]));
        assert_eq!(probe.streams_opened(), 2);
    }
}

//! Websocket speech backend.
//!
//! Speaks the streaming recognition protocol: one JSON init message
//! describing the audio, then raw little-endian PCM in binary frames;
//! the service answers with JSON result messages carrying zero or more
//! alternatives per result. Results without alternatives are skipped here
//! so downstream components never see them.

use crate::error::{Result, VoxrelayError};
use crate::recognition::backend::{
    EventSource, FrameSink, SpeechBackend, StreamParams, TranscriptionEvent,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize)]
struct StreamInit<'a> {
    config: StreamInitConfig<'a>,
}

#[derive(Serialize)]
struct StreamInitConfig<'a> {
    sample_rate: u32,
    language: &'a str,
    interim_results: bool,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<RecognizeAlternative>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct RecognizeAlternative {
    transcript: String,
}

/// Classify a websocket connect failure.
///
/// 401/403 means the credentials are bad — retrying cannot help. 429 is the
/// backend shedding load. Everything else is worth a fresh attempt.
fn classify_connect_error(err: &tungstenite::Error) -> VoxrelayError {
    if let tungstenite::Error::Http(resp) = err {
        let code = resp.status().as_u16();
        if code == 401 || code == 403 {
            return VoxrelayError::StreamAuth {
                message: err.to_string(),
            };
        }
        if code == 429 {
            return VoxrelayError::BackendQuota {
                message: err.to_string(),
            };
        }
    }
    VoxrelayError::StreamTransient {
        message: err.to_string(),
    }
}

/// Parse one service message into a transcription event.
///
/// Returns `None` for messages with no results or no alternatives, and for
/// text that is not valid JSON — all dropped silently per the error policy.
fn parse_event(text: &str) -> Option<TranscriptionEvent> {
    let response: RecognizeResponse = serde_json::from_str(text).ok()?;
    let result = response.results.into_iter().next()?;
    let is_final = result.is_final;
    let alternative = result.alternatives.into_iter().next()?;
    Some(TranscriptionEvent {
        transcript: alternative.transcript,
        is_final,
    })
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Recognition backend over a websocket endpoint.
pub struct WsSpeechBackend {
    endpoint: String,
}

impl WsSpeechBackend {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SpeechBackend for WsSpeechBackend {
    async fn open_stream(
        &self,
        params: &StreamParams,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn EventSource>)> {
        let (ws, _) = connect_async(&self.endpoint)
            .await
            .map_err(|e| classify_connect_error(&e))?;

        let (mut tx, rx) = ws.split();

        let init = StreamInit {
            config: StreamInitConfig {
                sample_rate: params.sample_rate,
                language: &params.language,
                interim_results: params.interim_results,
            },
        };
        let init_json =
            serde_json::to_string(&init).map_err(|e| VoxrelayError::StreamTransient {
                message: format!("failed to encode stream init: {}", e),
            })?;
        tx.send(Message::Text(init_json.into()))
            .await
            .map_err(|e| VoxrelayError::StreamTransient {
                message: format!("failed to send stream init: {}", e),
            })?;

        Ok((Box::new(WsFrameSink { tx }), Box::new(WsEventSource { rx })))
    }
}

struct WsFrameSink {
    tx: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn push_frame(&mut self, samples: &[i16]) -> Result<()> {
        self.tx
            .send(Message::Binary(samples_to_bytes(samples).into()))
            .await
            .map_err(|e| VoxrelayError::StreamTransient {
                message: format!("failed to push audio frame: {}", e),
            })
    }

    async fn close(&mut self) -> Result<()> {
        // A close error during teardown is not actionable
        let _ = self.tx.close().await;
        Ok(())
    }
}

struct WsEventSource {
    rx: SplitStream<WsStream>,
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn next_event(&mut self) -> Result<Option<TranscriptionEvent>> {
        loop {
            match self.rx.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_event(text.as_str()) {
                        return Ok(Some(event));
                    }
                    // Malformed or empty result — drop and keep listening
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => {
                    // Binary/ping/pong from the service carry no results
                }
                Some(Err(e)) => {
                    return Err(VoxrelayError::StreamTransient {
                        message: format!("recognition stream read failed: {}", e),
                    });
                }
            }
        }
    }
}

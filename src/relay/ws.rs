//! Websocket command link.
//!
//! One text frame out per command, one text frame back per acknowledgment.
//! The stream stays unsplit: the protocol is strictly request-then-response,
//! so there is never a concurrent send and receive on the same link.

use crate::error::{Result, VoxrelayError};
use crate::relay::link::{CommandLink, LinkConnector};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the actuator's websocket endpoint.
pub struct WsLinkConnector {
    endpoint: String,
}

impl WsLinkConnector {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl LinkConnector for WsLinkConnector {
    async fn connect(&self) -> Result<Box<dyn CommandLink>> {
        let (ws, _) =
            connect_async(&self.endpoint)
                .await
                .map_err(|e| VoxrelayError::DispatchConnectionLost {
                    message: format!("failed to connect to {}: {}", self.endpoint, e),
                })?;
        Ok(Box::new(WsCommandLink { ws }))
    }
}

/// One open websocket session to the actuator.
pub struct WsCommandLink {
    ws: WsStream,
}

#[async_trait]
impl CommandLink for WsCommandLink {
    async fn send(&mut self, command: &str) -> Result<()> {
        self.ws
            .send(Message::Text(command.to_string().into()))
            .await
            .map_err(|e| VoxrelayError::DispatchConnectionLost {
                message: format!("failed to send command: {}", e),
            })
    }

    async fn recv_ack(&mut self) -> Result<String> {
        loop {
            match self.ws.next().await {
                None => {
                    return Err(VoxrelayError::DispatchConnectionLost {
                        message: "connection closed while awaiting acknowledgment".to_string(),
                    });
                }
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) => {
                    return Err(VoxrelayError::DispatchConnectionLost {
                        message: "actuator closed the connection".to_string(),
                    });
                }
                Some(Ok(_)) => {
                    // Ping/pong/binary are not acknowledgments
                }
                Some(Err(e)) => {
                    return Err(VoxrelayError::DispatchConnectionLost {
                        message: format!("failed to read acknowledgment: {}", e),
                    });
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.ws.close(None).await;
        Ok(())
    }
}

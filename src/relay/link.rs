//! The command link seam: a persistent connection to the remote actuator.
//!
//! The protocol is strict request/response: one text frame per command, one
//! text frame per acknowledgment, no pipelining. A `LinkConnector` produces
//! fresh links so the dispatcher owns reconnection policy; implementations:
//! the websocket link (`relay::ws`) and the mock below.

use crate::error::{Result, VoxrelayError};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One open session to the command sink.
#[async_trait]
pub trait CommandLink: Send {
    /// Send one command as a single text frame.
    async fn send(&mut self, command: &str) -> Result<()>;

    /// Await the acknowledgment for the last command sent.
    async fn recv_ack(&mut self) -> Result<String>;

    /// Close the session. Errors during teardown are not actionable.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for command links.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Open a fresh session to the actuator.
    async fn connect(&self) -> Result<Box<dyn CommandLink>>;
}

/// What a mock link observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Sent(String),
    Acked(String),
    Closed,
}

/// Mock connector for testing the dispatcher.
///
/// All links produced by one connector share counters and the event record,
/// so failure indices keep counting across reconnects. Acks echo the command
/// as `ok:<command>`.
#[derive(Clone)]
pub struct MockLinkConnector {
    events: Arc<Mutex<Vec<LinkEvent>>>,
    connect_errors: Arc<Mutex<VecDeque<VoxrelayError>>>,
    connect_delay: Duration,
    connects: Arc<AtomicUsize>,
    send_counter: Arc<AtomicUsize>,
    ack_counter: Arc<AtomicUsize>,
    failing_sends: Arc<Mutex<HashSet<usize>>>,
    hanging_acks: Arc<Mutex<HashSet<usize>>>,
}

impl MockLinkConnector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            connect_errors: Arc::new(Mutex::new(VecDeque::new())),
            connect_delay: Duration::ZERO,
            connects: Arc::new(AtomicUsize::new(0)),
            send_counter: Arc::new(AtomicUsize::new(0)),
            ack_counter: Arc::new(AtomicUsize::new(0)),
            failing_sends: Arc::new(Mutex::new(HashSet::new())),
            hanging_acks: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue errors returned by the next `connect` calls, in order.
    pub fn with_connect_errors(self, errors: Vec<VoxrelayError>) -> Self {
        if let Ok(mut queue) = self.connect_errors.lock() {
            queue.extend(errors);
        }
        self
    }

    /// Delay every successful connect by this long.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Make the Nth send overall (0-based, counted across reconnects) fail.
    pub fn with_send_failure_at(self, index: usize) -> Self {
        if let Ok(mut set) = self.failing_sends.lock() {
            set.insert(index);
        }
        self
    }

    /// Make the Nth acknowledgment overall never arrive.
    pub fn with_ack_hang_at(self, index: usize) -> Self {
        if let Ok(mut set) = self.hanging_acks.lock() {
            set.insert(index);
        }
        self
    }

    /// Everything links produced by this connector observed, in order.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Commands that were successfully sent, in order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::Sent(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// How many connect attempts succeeded.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn record(&self, event: LinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Default for MockLinkConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkConnector for MockLinkConnector {
    async fn connect(&self) -> Result<Box<dyn CommandLink>> {
        if let Ok(mut errors) = self.connect_errors.lock()
            && let Some(err) = errors.pop_front()
        {
            return Err(err);
        }
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.record(LinkEvent::Connected);
        Ok(Box::new(MockCommandLink {
            connector: self.clone(),
            last_command: None,
        }))
    }
}

/// Link handed out by `MockLinkConnector`.
pub struct MockCommandLink {
    connector: MockLinkConnector,
    last_command: Option<String>,
}

#[async_trait]
impl CommandLink for MockCommandLink {
    async fn send(&mut self, command: &str) -> Result<()> {
        let index = self.connector.send_counter.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .connector
            .failing_sends
            .lock()
            .map(|set| set.contains(&index))
            .unwrap_or(false);
        if fails {
            return Err(VoxrelayError::DispatchConnectionLost {
                message: format!("send failed for {command}"),
            });
        }
        self.connector.record(LinkEvent::Sent(command.to_string()));
        self.last_command = Some(command.to_string());
        Ok(())
    }

    async fn recv_ack(&mut self) -> Result<String> {
        let index = self.connector.ack_counter.fetch_add(1, Ordering::SeqCst);
        let hangs = self
            .connector
            .hanging_acks
            .lock()
            .map(|set| set.contains(&index))
            .unwrap_or(false);
        if hangs {
            std::future::pending::<()>().await;
            unreachable!()
        }
        let ack = format!("ok:{}", self.last_command.as_deref().unwrap_or(""));
        self.connector.record(LinkEvent::Acked(ack.clone()));
        Ok(ack)
    }

    async fn close(&mut self) -> Result<()> {
        self.connector.record(LinkEvent::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_link_acks_echo_the_command() {
        let connector = MockLinkConnector::new();
        let mut link = connector.connect().await.unwrap();

        link.send("앞으로").await.unwrap();
        assert_eq!(link.recv_ack().await.unwrap(), "ok:앞으로");

        assert_eq!(
            connector.events(),
            vec![
                LinkEvent::Connected,
                LinkEvent::Sent("앞으로".into()),
                LinkEvent::Acked("ok:앞으로".into()),
            ]
        );
    }

    #[tokio::test]
    async fn scripted_connect_errors_come_first() {
        let connector = MockLinkConnector::new().with_connect_errors(vec![
            VoxrelayError::DispatchConnectionLost {
                message: "refused".into(),
            },
        ]);

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn send_failure_indices_count_across_links() {
        let connector = MockLinkConnector::new().with_send_failure_at(1);

        let mut first = connector.connect().await.unwrap();
        first.send("a").await.unwrap();

        let mut second = connector.connect().await.unwrap();
        assert!(second.send("b").await.is_err());
        second.send("c").await.unwrap();

        assert_eq!(connector.sent_commands(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn hanging_ack_never_resolves() {
        let connector = MockLinkConnector::new().with_ack_hang_at(0);
        let mut link = connector.connect().await.unwrap();
        link.send("정지").await.unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(50), link.recv_ack()).await;
        assert!(waited.is_err(), "hanging ack should never resolve");
    }
}

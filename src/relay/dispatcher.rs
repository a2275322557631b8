//! The command dispatcher.
//!
//! Owns the single outbound connection to the actuator and drains the
//! pending batch slot: take-and-clear, then send each token and await its
//! acknowledgment before the next (strict request/response, no pipelining).
//! A lost connection or a late acknowledgment drops the rest of the batch
//! and reconnects with exponential backoff; a bounded run of consecutive
//! connect failures escalates to fatal. The dispatcher never touches the
//! recognition context except through the pending slot.

use crate::defaults;
use crate::error::{Result, VoxrelayError};
use crate::relay::batch::PendingBatch;
use crate::relay::link::{CommandLink, LinkConnector};
use crate::retry::backoff_delay;
use crate::status::StatusTx;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Connection lifecycle of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
}

/// Dispatch policy knobs.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// How long to wait for each acknowledgment before treating the
    /// connection as lost.
    pub ack_timeout: Duration,
    /// Consecutive connect failures tolerated before escalating.
    pub max_consecutive_failures: u32,
    /// Backoff base/ceiling for reconnect attempts, in milliseconds.
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// How often to check the pending slot while connected and idle.
    pub idle_poll: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(defaults::ACK_TIMEOUT_MS),
            max_consecutive_failures: defaults::MAX_DISPATCH_FAILURES,
            reconnect_base_ms: defaults::RECONNECT_BASE_MS,
            reconnect_max_ms: defaults::RECONNECT_MAX_MS,
            idle_poll: Duration::from_millis(defaults::IDLE_POLL_MS),
        }
    }
}

/// Drains pending batches over a persistent actuator connection.
pub struct Dispatcher {
    connector: Arc<dyn LinkConnector>,
    settings: DispatcherSettings,
    pending: Arc<PendingBatch>,
    status: StatusTx,
    running: Arc<AtomicBool>,
    verbosity: u8,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        settings: DispatcherSettings,
        pending: Arc<PendingBatch>,
        status: StatusTx,
        running: Arc<AtomicBool>,
        verbosity: u8,
    ) -> Self {
        Self {
            connector,
            settings,
            pending,
            status,
            running,
            verbosity,
        }
    }

    /// Run until shutdown is signaled or connect failures exhaust the bound.
    ///
    /// On shutdown, one final non-blocking take-and-send runs so a batch
    /// recognized just before the flag flipped is not silently lost; a
    /// failure during that drain is reported, not retried.
    pub async fn run(self) -> Result<()> {
        let mut state = DispatchState::Disconnected;
        let mut link: Option<Box<dyn CommandLink>> = None;
        let mut batch: Option<Vec<String>> = None;
        let mut consecutive_failures: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            match state {
                DispatchState::Disconnected => {
                    state = DispatchState::Connecting;
                }
                DispatchState::Connecting => match self.connector.connect().await {
                    Ok(new_link) => {
                        consecutive_failures = 0;
                        link = Some(new_link);
                        state = DispatchState::Connected;
                        if self.verbosity >= 2 {
                            eprintln!("voxrelay: relay connected");
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures > self.settings.max_consecutive_failures {
                            return Err(VoxrelayError::DispatchConnectionLost {
                                message: format!(
                                    "relay connect failed {} times in a row: {}",
                                    consecutive_failures, e
                                ),
                            });
                        }
                        if self.verbosity >= 1 {
                            eprintln!(
                                "voxrelay: relay connect failed (attempt {}): {}",
                                consecutive_failures, e
                            );
                        }
                        tokio::time::sleep(backoff_delay(
                            consecutive_failures,
                            self.settings.reconnect_base_ms,
                            self.settings.reconnect_max_ms,
                        ))
                        .await;
                        state = DispatchState::Disconnected;
                    }
                },
                DispatchState::Connected => match self.pending.take() {
                    Some(tokens) => {
                        batch = Some(tokens);
                        state = DispatchState::Draining;
                    }
                    None => {
                        tokio::time::sleep(self.settings.idle_poll).await;
                    }
                },
                DispatchState::Draining => {
                    let tokens = batch.take().unwrap_or_default();
                    let Some(active) = link.as_mut() else {
                        state = DispatchState::Disconnected;
                        continue;
                    };
                    match self.drain_batch(active.as_mut(), &tokens).await {
                        Ok(()) => {
                            state = DispatchState::Connected;
                        }
                        Err(e) => {
                            // The unsent remainder of the batch is dropped;
                            // the next pending batch resumes after
                            // reconnection.
                            if self.verbosity >= 1 {
                                eprintln!("voxrelay: dispatch failed: {}", e);
                            }
                            link = None;
                            state = DispatchState::Disconnected;
                        }
                    }
                }
            }
        }

        // Final drain on shutdown: finish the cycle the flag interrupted,
        // or a batch recognized just before the flag flipped.
        if let Some(mut active) = link.take() {
            if let Some(tokens) = batch.take().or_else(|| self.pending.take())
                && let Err(e) = self.drain_batch(active.as_mut(), &tokens).await
            {
                if self.verbosity >= 1 {
                    eprintln!("voxrelay: final dispatch failed: {}", e);
                }
            }
            let _ = active.close().await;
        }
        Ok(())
    }

    /// One dispatch cycle: send every token in order, each acknowledged
    /// before the next, then notify with the last token sent.
    async fn drain_batch(&self, link: &mut dyn CommandLink, batch: &[String]) -> Result<()> {
        for token in batch {
            link.send(token).await?;
            let ack = tokio::time::timeout(self.settings.ack_timeout, link.recv_ack())
                .await
                .map_err(|_| VoxrelayError::DispatchConnectionLost {
                    message: format!("acknowledgment for {token} timed out"),
                })??;
            if self.verbosity >= 1 {
                eprintln!("voxrelay: sent {} (ack: {})", token, ack);
            }
        }
        if let Some(last) = batch.last() {
            self.status.sent(last);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::link::{LinkEvent, MockLinkConnector};
    use crate::status::{StatusUpdate, status_channel};

    fn fast_settings() -> DispatcherSettings {
        DispatcherSettings {
            ack_timeout: Duration::from_millis(50),
            max_consecutive_failures: 3,
            reconnect_base_ms: 1,
            reconnect_max_ms: 4,
            idle_poll: Duration::from_millis(2),
        }
    }

    fn dispatcher(
        connector: &MockLinkConnector,
        pending: Arc<PendingBatch>,
        status: StatusTx,
        running: Arc<AtomicBool>,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::new(connector.clone()),
            fast_settings(),
            pending,
            status,
            running,
            0,
        )
    }

    #[tokio::test]
    async fn tokens_are_sent_in_order_each_acked_before_the_next() {
        let connector = MockLinkConnector::new();
        let pending = Arc::new(PendingBatch::new());
        let (status, status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        pending.replace(vec!["왼쪽".to_string(), "정지".to_string()]);

        let task = tokio::spawn(
            dispatcher(&connector, pending.clone(), status, running.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();

        assert_eq!(
            connector.events(),
            vec![
                LinkEvent::Connected,
                LinkEvent::Sent("왼쪽".into()),
                LinkEvent::Acked("ok:왼쪽".into()),
                LinkEvent::Sent("정지".into()),
                LinkEvent::Acked("ok:정지".into()),
                LinkEvent::Closed,
            ]
        );
        assert_eq!(
            status_rx.try_iter().collect::<Vec<_>>(),
            vec![StatusUpdate::Sent("정지".into())]
        );
    }

    #[tokio::test]
    async fn overwritten_batch_is_never_sent() {
        let connector =
            MockLinkConnector::new().with_connect_delay(Duration::from_millis(30));
        let pending = Arc::new(PendingBatch::new());
        let (status, _status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        pending.replace(vec!["왼쪽".to_string()]);
        pending.replace(vec!["오른쪽".to_string()]);

        let task = tokio::spawn(
            dispatcher(&connector, pending.clone(), status, running.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();

        assert_eq!(connector.sent_commands(), vec!["오른쪽"]);
    }

    #[tokio::test]
    async fn mid_send_failure_reconnects_and_resumes_with_next_batch() {
        // Second send of the first batch fails; its remainder is dropped.
        let connector = MockLinkConnector::new().with_send_failure_at(1);
        let pending = Arc::new(PendingBatch::new());
        let (status, status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        pending.replace(vec!["앞으로".to_string(), "왼쪽".to_string()]);

        let task = tokio::spawn(
            dispatcher(&connector, pending.clone(), status, running.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        pending.replace(vec!["정지".to_string()]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();

        assert_eq!(connector.sent_commands(), vec!["앞으로", "정지"]);
        assert_eq!(connector.connects(), 2);
        // Only the batch that fully drained produced a Sent notification
        assert_eq!(
            status_rx.try_iter().collect::<Vec<_>>(),
            vec![StatusUpdate::Sent("정지".into())]
        );
    }

    #[tokio::test]
    async fn hung_acknowledgment_is_treated_as_lost_connection() {
        let connector = MockLinkConnector::new().with_ack_hang_at(0);
        let pending = Arc::new(PendingBatch::new());
        let (status, _status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        pending.replace(vec!["앞으로".to_string()]);

        let task = tokio::spawn(
            dispatcher(&connector, pending.clone(), status, running.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        pending.replace(vec!["정지".to_string()]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();

        // The first send went out but its ack never arrived; the dispatcher
        // reconnected and drained the next batch normally.
        assert_eq!(connector.sent_commands(), vec!["앞으로", "정지"]);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn connect_failures_escalate_after_the_bound() {
        let errors = (0..4)
            .map(|i| VoxrelayError::DispatchConnectionLost {
                message: format!("refused {i}"),
            })
            .collect();
        let connector = MockLinkConnector::new().with_connect_errors(errors);
        let pending = Arc::new(PendingBatch::new());
        let (status, _status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        let result = dispatcher(&connector, pending, status, running).run().await;

        match result {
            Err(VoxrelayError::DispatchConnectionLost { message }) => {
                assert!(message.contains("4 times in a row"), "got: {message}");
            }
            other => panic!("expected escalated connect failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_pending_at_shutdown_is_drained_once() {
        let connector = MockLinkConnector::new();
        let pending = Arc::new(PendingBatch::new());
        let (status, _status_rx) = status_channel();
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(
            dispatcher(&connector, pending.clone(), status, running.clone()).run(),
        );

        // Let it connect, then stop and immediately queue a batch; the final
        // drain must pick it up whether or not the idle poll saw it first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        pending.replace(vec!["정지".to_string()]);
        running.store(false, Ordering::SeqCst);
        task.await.unwrap().unwrap();

        assert_eq!(connector.sent_commands(), vec!["정지"]);
        assert!(connector.events().contains(&LinkEvent::Closed));
    }
}

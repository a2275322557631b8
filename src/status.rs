//! Status notifications for the display surface.
//!
//! Producers (recognition, dispatch) must never block on the display, so
//! notifications travel over a bounded channel with fire-and-forget sends:
//! when the consumer falls behind, updates are dropped. Only the latest
//! value is meaningful to a status display.

use crate::defaults;

/// One notification for the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// A command token was recognized (not yet transmitted).
    Recognized(String),
    /// A command batch finished transmitting; carries the last token sent.
    Sent(String),
}

impl StatusUpdate {
    /// The token this update carries.
    pub fn token(&self) -> &str {
        match self {
            StatusUpdate::Recognized(token) | StatusUpdate::Sent(token) => token,
        }
    }
}

/// Cloneable producer handle for status notifications.
#[derive(Debug, Clone)]
pub struct StatusTx {
    tx: crossbeam_channel::Sender<StatusUpdate>,
}

impl StatusTx {
    /// Notify that a token was recognized. Drops the update if the channel
    /// is full or the consumer is gone.
    pub fn recognized(&self, token: &str) {
        let _ = self
            .tx
            .try_send(StatusUpdate::Recognized(token.to_string()));
    }

    /// Notify that a batch was sent, carrying its last token.
    pub fn sent(&self, token: &str) {
        let _ = self.tx.try_send(StatusUpdate::Sent(token.to_string()));
    }
}

/// Create a status channel with the default capacity.
pub fn status_channel() -> (StatusTx, crossbeam_channel::Receiver<StatusUpdate>) {
    status_channel_with_capacity(defaults::STATUS_CHANNEL_CAPACITY)
}

/// Create a status channel with an explicit capacity.
pub fn status_channel_with_capacity(
    capacity: usize,
) -> (StatusTx, crossbeam_channel::Receiver<StatusUpdate>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (StatusTx { tx }, rx)
}

//! The single-slot pending command batch.
//!
//! This is the only state shared between the recognition context and the
//! dispatch context. It holds at most one batch: a newer batch overwrites
//! an unconsumed one (latest wins), and the dispatcher's `take` is an
//! atomic check-and-clear. Both operations hold the lock only long enough
//! to swap the option, so neither context can stall the other.

use std::sync::Mutex;

/// Mutex-protected slot holding the latest unconsumed command batch.
#[derive(Debug, Default)]
pub struct PendingBatch {
    slot: Mutex<Option<Vec<String>>>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a batch, overwriting any unconsumed one.
    ///
    /// Empty batches are ignored; the extractor never produces them, and an
    /// empty pending batch would only make the dispatcher spin.
    pub fn replace(&self, tokens: Vec<String>) {
        if tokens.is_empty() {
            return;
        }
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tokens);
        }
    }

    /// Atomically take and clear the pending batch, if any.
    pub fn take(&self) -> Option<Vec<String>> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Whether a batch is currently pending.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn take_clears_the_slot() {
        let pending = PendingBatch::new();
        pending.replace(vec!["앞으로".to_string()]);

        assert!(pending.is_pending());
        assert_eq!(pending.take(), Some(vec!["앞으로".to_string()]));
        assert!(!pending.is_pending());
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn newer_batch_overwrites_unconsumed_one() {
        let pending = PendingBatch::new();
        pending.replace(vec!["왼쪽".to_string()]);
        pending.replace(vec!["오른쪽".to_string()]);

        assert_eq!(pending.take(), Some(vec!["오른쪽".to_string()]));
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn empty_batch_is_never_stored() {
        let pending = PendingBatch::new();
        pending.replace(Vec::new());
        assert!(!pending.is_pending());

        // And must not clobber a real pending batch
        pending.replace(vec!["정지".to_string()]);
        pending.replace(Vec::new());
        assert_eq!(pending.take(), Some(vec!["정지".to_string()]));
    }

    #[test]
    fn concurrent_writers_and_taker_never_observe_partial_batches() {
        let pending = Arc::new(PendingBatch::new());
        let writer_pending = pending.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..1000 {
                writer_pending.replace(vec![format!("t{i}"), format!("t{i}")]);
            }
        });

        let mut taken = 0;
        while !writer.is_finished() {
            if let Some(batch) = pending.take() {
                // Both tokens must come from the same replace call
                assert_eq!(batch.len(), 2);
                assert_eq!(batch[0], batch[1]);
                taken += 1;
            }
        }
        writer.join().unwrap();
        let _ = taken;
    }
}

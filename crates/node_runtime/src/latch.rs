use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

/// Countdown gate the process blocks on before exiting.
///
/// Opens once [`count_down`](Self::count_down) has been called `count`
/// times; further calls are ignored.
#[derive(Debug)]
pub struct ShutdownLatch {
    remaining: AtomicUsize,
    open_tx: watch::Sender<bool>,
}

impl ShutdownLatch {
    pub fn new(count: usize) -> Self {
        let (open_tx, _) = watch::channel(count == 0);
        Self {
            remaining: AtomicUsize::new(count),
            open_tx,
        }
    }

    pub fn count_down(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.open_tx.send_replace(true);
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open_tx.borrow()
    }

    /// Resolves once the latch is open.
    pub async fn wait(&self) {
        let mut rx = self.open_tx.subscribe();
        // the sender lives in `self`, so this only errors if it was dropped
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new(1)
    }
}

// Timer-based debounce for search input
//
// A buffer that restarts a quiet-period timer on each new value and emits
// the settled value once input stops changing. Independent of any UI layer;
// the console feeds raw keystroke-level updates in and commits only what
// comes out the channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default quiet period before a search value is committed
pub const DEFAULT_QUIET_MS: u64 = 300;

pub struct Debouncer {
    quiet: Duration,
    generation: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<String>,
}

impl Debouncer {
    /// Returns the debouncer and the channel on which settled values arrive
    pub fn new(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                quiet,
                generation: Arc::new(AtomicU64::new(0)),
                tx,
            },
            rx,
        )
    }

    /// Submit a new raw value; any earlier value that has not yet settled
    /// is superseded and never emitted.
    pub fn submit(&self, value: impl Into<String>) {
        let value = value.into();
        let generation = self.generation.clone();
        let id = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tx = self.tx.clone();
        let quiet = self.quiet;

        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            // A newer submission bumps the counter and makes this one stale
            if generation.load(Ordering::SeqCst) == id {
                let _ = tx.send(value);
            }
        });
    }
}

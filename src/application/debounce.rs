//! Cancel-and-rearm debounce primitive.
//!
//! The pending tick is held as an explicit cancellation token: triggering
//! cancels the previous token before arming a new one, so at most one tick is
//! ever pending and the invariant is directly observable.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

type PendingSlot = Arc<Mutex<Option<(u64, CancellationToken)>>>;

/// Cloneable debouncer handle; clones share the same pending slot.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    handler: Handler,
    pending: PendingSlot,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new<F>(delay: Duration, handler: F) -> Self
    where
        F: Fn() -> HandlerFuture + Send + Sync + 'static,
    {
        Self {
            delay,
            handler: Arc::new(handler),
            pending: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Restart the debounce window. The handler runs once, `delay` after the
    /// last trigger of a burst.
    pub fn trigger(&self) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        {
            let mut pending = lock(&self.pending);
            if let Some((_, old)) = pending.take() {
                old.cancel();
            }
            *pending = Some((generation, token.clone()));
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(this.delay) => {
                    this.clear_if_current(generation);
                    (this.handler)().await;
                }
            }
        });
    }

    /// Drop the pending tick, if any.
    pub fn cancel(&self) {
        if let Some((_, token)) = lock(&self.pending).take() {
            token.cancel();
        }
    }

    /// Whether a tick is currently pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    fn clear_if_current(&self, generation: u64) {
        let mut pending = lock(&self.pending);
        if matches!(pending.as_ref(), Some((current, _)) if *current == generation) {
            *pending = None;
        }
    }
}

fn lock(slot: &PendingSlot) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

//! Time-to-live cache for prompt blocks.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    computed_at: Instant,
}

/// One lazily rebuilt value.
///
/// The value is recomputed on the first read after `ttl` has elapsed. A
/// failed rebuild keeps serving the previous value, if there is one.
#[derive(Debug)]
pub struct TtlCache<T> {
    slot: Mutex<Option<Cached<T>>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut, E>(&self, ttl: Duration, rebuild: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.computed_at.elapsed() < ttl {
                return Ok(cached.value.clone());
            }
        }

        match rebuild().await {
            Ok(value) => {
                *slot = Some(Cached {
                    value: value.clone(),
                    computed_at: Instant::now(),
                });
                Ok(value)
            }
            Err(e) => match slot.as_ref() {
                Some(stale) => Ok(stale.value.clone()),
                None => Err(e),
            },
        }
    }

    /// Drop the cached value so the next read rebuilds it.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

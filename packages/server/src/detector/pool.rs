use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use crossbeam::queue::ArrayQueue;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed set of reusable items (model sessions) handed out one caller at a time.
///
/// Items go back to the queue when their [`Lease`] drops, wherever that
/// happens. A caller abandoned mid-job therefore cannot shrink the pool.
pub struct SessionPool<T> {
    items: Arc<ArrayQueue<T>>,
    permits: Arc<Semaphore>,
}

/// Exclusive use of one pooled item.
pub struct Lease<T> {
    item: Option<T>,
    items: Arc<ArrayQueue<T>>,
    // Released after `Drop::drop` has pushed the item back.
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> SessionPool<T> {
    pub fn new(items: Vec<T>) -> Result<Self> {
        let capacity = items.len();
        if capacity == 0 {
            return Err(anyhow!("session pool needs at least one item"));
        }
        let queue = ArrayQueue::new(capacity);
        for item in items {
            if queue.push(item).is_err() {
                return Err(anyhow!("session pool overflow"));
            }
        }
        Ok(Self {
            items: Arc::new(queue),
            permits: Arc::new(Semaphore::new(capacity)),
        })
    }

    pub async fn checkout(&self) -> Result<Lease<T>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("session pool closed"))?;
        let item = self
            .items
            .pop()
            .ok_or_else(|| anyhow!("no pooled session available"))?;
        Ok(Lease {
            item: Some(item),
            items: Arc::clone(&self.items),
            _permit: permit,
        })
    }

    /// Run `job` on the blocking pool with a leased item.
    ///
    /// The lease travels with the job, so the item is returned when the job
    /// ends even if this future was dropped in the meantime.
    pub async fn run_blocking<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut lease = self.checkout().await?;
        tokio::task::spawn_blocking(move || job(&mut *lease))
            .await
            .map_err(|e| anyhow!("inference task failed: {e}"))
    }

    pub fn available(&self) -> usize {
        self.items.len()
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the item.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            // Capacity equals the permit count, so this cannot overflow.
            let _ = self.items.push(item);
        }
    }
}

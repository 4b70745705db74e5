//! Request Concurrency Governor
//!
//! Bounds how many pipelines run at once. Requests beyond `max_concurrent`
//! wait in a FIFO queue of at most `max_queue_size`; a full queue rejects
//! with [`EngineError::Backpressure`].
//!
//! A finishing unit of work hands its slot directly to the oldest waiter, so
//! completion is the only event that admits a queued request.

use sdk::errors::EngineError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::config::GovernorConfig;

#[derive(Debug, Default)]
struct State {
    running: usize,
    queue: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    max_concurrent: usize,
    max_queue_size: usize,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Every update is a single field write, so a poisoned state is still valid
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Give the slot to the next live waiter, or free it
    fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.queue.pop_front() {
            if waiter.send(()).is_ok() {
                tracing::debug!("Admitted queued request ({} still waiting)", state.queue.len());
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }
}

/// FIFO admission control over opaque async work
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    inner: Arc<Inner>,
}

impl ConcurrencyGovernor {
    pub fn new(max_concurrent: usize, max_queue_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                max_queue_size,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new(config.max_concurrent, config.max_queue_size)
    }

    /// Run `work` once admitted
    ///
    /// # Errors
    ///
    /// `Backpressure` when the queue is full, `GovernorClosed` after
    /// [`close`](Self::close).
    pub async fn submit<F, T>(&self, work: F) -> Result<T, EngineError>
    where
        F: Future<Output = T>,
    {
        let _slot = self.acquire().await?;
        Ok(work.await)
    }

    async fn acquire(&self) -> Result<Slot, EngineError> {
        let receiver = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(EngineError::GovernorClosed);
            }
            if state.running < self.inner.max_concurrent {
                state.running += 1;
                return Ok(Slot {
                    inner: Arc::clone(&self.inner),
                });
            }
            if state.queue.len() >= self.inner.max_queue_size {
                tracing::warn!(
                    "Rejecting request: {} running, {} queued",
                    state.running,
                    state.queue.len()
                );
                return Err(EngineError::Backpressure {
                    queued: state.queue.len(),
                    limit: self.inner.max_queue_size,
                });
            }

            let (sender, receiver) = oneshot::channel();
            state.queue.push_back(sender);
            tracing::debug!("Queued request at position {}", state.queue.len());
            receiver
        };

        let mut waiter = Waiter {
            receiver: Some(receiver),
            inner: Arc::clone(&self.inner),
        };
        waiter.admitted().await?;

        Ok(Slot {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Reject new work and wake every waiter with `GovernorClosed`
    ///
    /// Running work is not interrupted.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.queue.clear();
    }

    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

/// Held while admitted work runs; dropping it admits the next waiter
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Queued request; passes on a slot granted after it was abandoned
struct Waiter {
    receiver: Option<oneshot::Receiver<()>>,
    inner: Arc<Inner>,
}

impl Waiter {
    async fn admitted(&mut self) -> Result<(), EngineError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(EngineError::GovernorClosed);
        };
        let result = receiver.await;
        self.receiver = None;
        result.map_err(|_| EngineError::GovernorClosed)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if receiver.try_recv().is_ok() {
                self.inner.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_runs_immediately_below_limit() {
        let governor = ConcurrencyGovernor::new(2, 2);
        let value = governor.submit(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(governor.running(), 0);
    }

    #[tokio::test]
    async fn test_queue_full_rejects() {
        let governor = ConcurrencyGovernor::new(1, 1);
        let gate = Arc::new(Notify::new());

        let g = governor.clone();
        let n = Arc::clone(&gate);
        let running = tokio::spawn(async move { g.submit(async move { n.notified().await }).await });
        while governor.running() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let g = governor.clone();
        let queued = tokio::spawn(async move { g.submit(async { 1 }).await });

        while governor.queued() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let rejected = governor.submit(async { 2 }).await;
        assert!(matches!(
            rejected,
            Err(EngineError::Backpressure { queued: 1, limit: 1 })
        ));

        gate.notify_one();
        running.await.unwrap().unwrap();
        assert_eq!(queued.await.unwrap().unwrap(), 1);
        assert_eq!(governor.running(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_leak_slot() {
        let governor = ConcurrencyGovernor::new(1, 4);
        let gate = Arc::new(Notify::new());

        let g = governor.clone();
        let n = Arc::clone(&gate);
        let running = tokio::spawn(async move { g.submit(async move { n.notified().await }).await });
        while governor.running() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let g = governor.clone();
        let abandoned = tokio::spawn(async move { g.submit(async { 0 }).await });
        while governor.queued() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        abandoned.abort();
        let _ = abandoned.await;

        gate.notify_one();
        running.await.unwrap().unwrap();

        assert_eq!(governor.submit(async { 3 }).await.unwrap(), 3);
        assert_eq!(governor.running(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_new_and_queued_work() {
        let governor = ConcurrencyGovernor::new(1, 4);
        let gate = Arc::new(Notify::new());

        let g = governor.clone();
        let n = Arc::clone(&gate);
        let running = tokio::spawn(async move { g.submit(async move { n.notified().await }).await });
        while governor.running() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let g = governor.clone();
        let queued = tokio::spawn(async move { g.submit(async { 0 }).await });
        while governor.queued() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        governor.close();
        assert!(matches!(queued.await.unwrap(), Err(EngineError::GovernorClosed)));
        assert!(matches!(
            governor.submit(async {}).await,
            Err(EngineError::GovernorClosed)
        ));

        gate.notify_one();
        running.await.unwrap().unwrap();
    }
}

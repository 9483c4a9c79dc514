//! Debounced work and recent-request bookkeeping

use smol::{LocalExecutor, Task, Timer};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

/// Single-slot debouncer. Scheduling again drops, and so cancels, the
/// pending task.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: RefCell<Option<Task<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: RefCell::new(None) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `work` once `delay` has passed without another schedule
    pub fn schedule(&self, executor: &LocalExecutor<'static>, work: impl Future<Output = ()> + 'static) {
        let delay = self.delay;
        let task = executor.spawn(async move {
            Timer::after(delay).await;
            work.await;
        });
        if self.pending.borrow_mut().replace(task).is_some() {
            tracing::trace!("debounced work superseded");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.borrow().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Take the pending task so it can be awaited
    pub fn take(&self) -> Option<Task<()>> {
        self.pending.borrow_mut().take()
    }

    pub fn cancel(&self) {
        self.pending.borrow_mut().take();
    }
}

/// The last few request ids this session issued
#[derive(Debug)]
pub struct RecentRequests {
    limit: usize,
    ids: VecDeque<String>,
}

impl RecentRequests {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1), ids: VecDeque::new() }
    }

    pub fn add(&mut self, id: &str) {
        if self.ids.len() == self.limit {
            self.ids.pop_front();
        }
        self.ids.push_back(id.to_string());
    }

    pub fn has(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

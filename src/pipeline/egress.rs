//! Bounded-concurrency egress queue
//!
//! At most `concurrency` tasks run at once; up to `max_queued` more may wait
//! for a slot. Submissions beyond that are rejected with
//! [`PipelineError::Capacity`] instead of growing the queue.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

use super::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Task queue executing at most N sends concurrently
#[derive(Debug)]
pub struct EgressQueue {
    slots: Arc<Semaphore>,
    concurrency: usize,
    max_queued: usize,
    counters: Arc<Counters>,
    progress: Arc<Notify>,
    closed: AtomicBool,
}

impl EgressQueue {
    pub fn new(concurrency: usize, max_queued: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            max_queued,
            counters: Arc::new(Counters::default()),
            progress: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a task; it starts as soon as a concurrency slot is free
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(PipelineError::Closed);
        }

        let max = self.max_queued;
        self.counters
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < max).then_some(queued + 1)
            })
            .map_err(|queued| PipelineError::Capacity { queued, max })?;

        let slots = self.slots.clone();
        let counters = self.counters.clone();
        let progress = self.progress.clone();

        tokio::spawn(async move {
            let permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // queue closed while waiting
                    counters.queued.fetch_sub(1, Ordering::AcqRel);
                    progress.notify_waiters();
                    return;
                }
            };

            // in_flight goes up before queued goes down so depth never dips
            let running = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
            counters.queued.fetch_sub(1, Ordering::AcqRel);
            counters.peak_in_flight.fetch_max(running, Ordering::AcqRel);

            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                tracing::error!("Egress task panicked");
            }

            counters.in_flight.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
            progress.notify_waiters();
        });

        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Tasks waiting for a slot
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::Acquire)
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of tasks ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::Acquire)
    }

    /// Queued plus running tasks
    pub fn depth(&self) -> usize {
        self.queued() + self.in_flight()
    }

    /// Signal fired whenever a task finishes
    pub(crate) fn progress(&self) -> &Arc<Notify> {
        &self.progress
    }

    /// Wait until `ready` holds, re-checking after every task completion
    pub async fn wait_until(&self, ready: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.progress.notified();
            if ready(self) {
                return;
            }
            notified.await;
        }
    }

    /// Wait for every queued and running task to finish
    pub async fn wait_idle(&self) {
        self.wait_until(|queue| queue.depth() == 0).await;
    }

    /// Refuse new tasks and drop those still waiting; running tasks finish
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_when_queue_full() {
        let queue = EgressQueue::new(1, 2);
        let gate = Arc::new(Notify::new());

        for _ in 0..3 {
            let gate = gate.clone();
            queue
                .submit(async move { gate.notified().await })
                .unwrap();
        }

        // first task takes the slot, two wait
        while queue.in_flight() < 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(queue.queued(), 2);

        let err = queue.submit(async {}).unwrap_err();
        assert_eq!(err, PipelineError::Capacity { queued: 2, max: 2 });

        queue.close();
        gate.notify_waiters();
        queue.wait_idle().await;
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let queue = EgressQueue::new(3, 100);
        for _ in 0..20 {
            queue
                .submit(async { tokio::time::sleep(Duration::from_millis(5)).await })
                .unwrap();
        }
        queue.wait_idle().await;
        assert_eq!(queue.peak_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_slot() {
        let queue = EgressQueue::new(1, 10);
        queue.submit(async { panic!("transport bug") }).unwrap();
        queue.submit(async {}).unwrap();
        queue.wait_idle().await;
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let queue = EgressQueue::new(1, 10);
        queue.close();
        assert_eq!(queue.submit(async {}).unwrap_err(), PipelineError::Closed);
    }
}

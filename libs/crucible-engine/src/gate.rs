/// Concurrency Gate - Bounded Admission for In-Flight Jobs
///
/// **Admission Rules:**
/// - At most `capacity` jobs hold a slot at once
/// - A slot is held from Preparing through workspace release; dropping the
///   `Slot` frees it, making the next queued admission eligible
/// - Excess load either waits (bounded queue, per-waiter deadline) or is
///   turned away immediately when queueing is disabled
/// - The queue itself is bounded, so a flood of requests cannot grow
///   memory without limit
///
/// This is the only shared mutable coordination point between jobs.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission was refused: capacity is exhausted and the queue is full,
/// disabled, or the wait deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

#[derive(Debug)]
pub struct ConcurrencyGate {
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_queue: usize,
    queue_wait: Duration,
}

/// An occupied slot. Freed on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// A held queue position, released on drop.
struct QueueReservation<'a> {
    waiting: &'a AtomicUsize,
}

impl Drop for QueueReservation<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyGate {
    pub fn new(capacity: usize, max_queue: usize, queue_wait: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity.max(1))),
            waiting: AtomicUsize::new(0),
            max_queue,
            queue_wait,
        }
    }

    /// First-come-first-served admission.
    pub async fn admit(&self) -> Result<Slot, Busy> {
        if let Ok(permit) = self.slots.clone().try_acquire_owned() {
            return Ok(Slot { _permit: permit });
        }

        if self.max_queue == 0 || self.queue_wait.is_zero() {
            debug!("Gate at capacity, queueing disabled");
            return Err(Busy);
        }

        // Reserve a queue position. The guard gives it back on every exit
        // path: success, deadline expiry, and a waiter whose future is
        // dropped mid-wait (client disconnect).
        let position = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _reservation = QueueReservation {
            waiting: &self.waiting,
        };
        if position >= self.max_queue {
            debug!("Gate queue full");
            return Err(Busy);
        }

        let waited = tokio::time::timeout(self.queue_wait, self.slots.clone().acquire_owned()).await;

        match waited {
            Ok(Ok(permit)) => Ok(Slot { _permit: permit }),
            // Semaphore closed (shutdown) or wait deadline expired.
            Ok(Err(_)) | Err(_) => Err(Busy),
        }
    }

    /// Slots currently free; observational only.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_capacity() {
        let gate = ConcurrencyGate::new(2, 0, Duration::ZERO);
        let a = gate.admit().await.unwrap();
        let _b = gate.admit().await.unwrap();
        assert_eq!(gate.available(), 0);

        // The N+1th is refused, not silently dropped.
        assert_eq!(gate.admit().await.unwrap_err(), Busy);

        drop(a);
        assert!(gate.admit().await.is_ok());
    }

    #[tokio::test]
    async fn queued_admission_proceeds_when_slot_frees() {
        let gate = Arc::new(ConcurrencyGate::new(1, 4, Duration::from_secs(5)));
        let held = gate.admit().await.unwrap();

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move { gate2.admit().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let admitted = waiter.await.unwrap();
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn queue_length_is_bounded() {
        let gate = Arc::new(ConcurrencyGate::new(1, 1, Duration::from_secs(5)));
        let _held = gate.admit().await.unwrap();

        let gate2 = gate.clone();
        let queued = tokio::spawn(async move { gate2.admit().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One waiter is allowed; the second overflows the bounded queue.
        assert_eq!(gate.admit().await.unwrap_err(), Busy);

        queued.abort();
        let _ = queued.await;
    }

    #[tokio::test]
    async fn cancelled_waiter_frees_its_queue_position() {
        let gate = Arc::new(ConcurrencyGate::new(1, 1, Duration::from_secs(5)));
        let held = gate.admit().await.unwrap();

        // A waiter takes the only queue position, then disconnects.
        let gate2 = gate.clone();
        let doomed = tokio::spawn(async move { gate2.admit().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        doomed.abort();
        let _ = doomed.await;

        // Its position must be free again: a fresh waiter queues and is
        // admitted once the slot frees.
        let gate3 = gate.clone();
        let waiter = tokio::spawn(async move { gate3.admit().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn wait_deadline_expires_to_busy() {
        let gate = ConcurrencyGate::new(1, 4, Duration::from_millis(50));
        let _held = gate.admit().await.unwrap();

        let started = std::time::Instant::now();
        assert_eq!(gate.admit().await.unwrap_err(), Busy);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

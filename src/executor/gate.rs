//! Bounded worker gate
//!
//! Admits at most N concurrent units of work. Slots are handed out as
//! guards so a unit releases its slot when it finishes, panics included.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gate errors
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Gate closed")]
    Closed,
}

/// Fixed-capacity admission gate
#[derive(Clone, Debug)]
pub struct Gate {
    permits: Arc<Semaphore>,
    capacity: u32,
}

impl Gate {
    /// Create a gate admitting `capacity` units (minimum 1)
    pub fn new(capacity: usize) -> Self {
        // acquire_many takes a u32 count
        let capacity = u32::try_from(capacity.max(1)).unwrap_or(u32::MAX);
        Self {
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<GateSlot, GateError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        Ok(GateSlot { _permit: permit })
    }

    /// Wait until every slot has been returned.
    ///
    /// The slots are handed back immediately, so a later `acquire` is not
    /// blocked by the drain itself.
    pub async fn drain(&self) -> Result<(), GateError> {
        let all = self
            .permits
            .acquire_many(self.capacity)
            .await
            .map_err(|_| GateError::Closed)?;
        drop(all);
        Ok(())
    }
}

/// An admitted slot; released on drop
#[derive(Debug)]
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_clamped() {
        let gate = Gate::new(0);
        assert_eq!(gate.capacity(), 1);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let gate = Gate::new(2);
        let a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(a);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        for capacity in [1usize, 2, 3, 8] {
            let gate = Gate::new(capacity);
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            for _ in 0..25 {
                let slot = gate.acquire().await.unwrap();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
            gate.drain().await.unwrap();

            assert_eq!(active.load(Ordering::SeqCst), 0);
            assert!(peak.load(Ordering::SeqCst) <= capacity);
        }
    }

    #[tokio::test]
    async fn test_drain_waits_for_outstanding_units() {
        let gate = Gate::new(3);
        let finished = Arc::new(AtomicUsize::new(0));

        for delay in [5u64, 15, 30] {
            let slot = gate.acquire().await.unwrap();
            let finished = finished.clone();
            tokio::spawn(async move {
                let _slot = slot;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        gate.drain().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 3);

        // drained slots are returned
        assert_eq!(gate.available(), 3);
        let slot = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(slot.is_ok());
    }

    #[tokio::test]
    async fn test_drain_with_no_work() {
        let gate = Gate::new(4);
        tokio_test::assert_ok!(gate.drain().await);
        assert_eq!(gate.available(), 4);
    }

    #[tokio::test]
    async fn test_panicking_unit_returns_slot() {
        let gate = Gate::new(1);
        let slot = gate.acquire().await.unwrap();
        let handle = tokio::spawn(async move {
            let _slot = slot;
            panic!("check blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());

        let drained = tokio::time::timeout(Duration::from_millis(100), gate.drain()).await;
        assert!(drained.is_ok());
    }
}

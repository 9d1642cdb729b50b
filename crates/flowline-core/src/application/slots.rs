//! Per-workflow execution slots.
//!
//! Each workflow owns one semaphore for its whole lifetime. Changing
//! `max_concurrent_executions` resizes it in place: growing adds permits,
//! shrinking forgets idle permits and records the rest as debt that is paid
//! off as running executions release their slots.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Largest limit a workflow's slot pool can hold
pub(crate) const MAX_SLOTS: usize = Semaphore::MAX_PERMITS;

#[derive(Debug)]
struct Capacity {
    limit: usize,
    // permits still held by runs that must be forgotten on release
    debt: usize,
}

/// Slot pool of one workflow
#[derive(Debug)]
pub(crate) struct WorkflowSlots {
    semaphore: Arc<Semaphore>,
    capacity: Mutex<Capacity>,
}

impl WorkflowSlots {
    pub(crate) fn new(limit: usize) -> Arc<Self> {
        let limit = limit.min(MAX_SLOTS);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            capacity: Mutex::new(Capacity { limit, debt: 0 }),
        })
    }

    fn capacity(&self) -> MutexGuard<'_, Capacity> {
        self.capacity.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current limit
    pub(crate) fn limit(&self) -> usize {
        self.capacity().limit
    }

    /// Slots held by running executions
    pub(crate) fn in_use(&self) -> usize {
        let capacity = self.capacity();
        (capacity.limit + capacity.debt).saturating_sub(self.semaphore.available_permits())
    }

    /// Change the limit without disturbing executions that hold a slot
    pub(crate) fn resize(&self, limit: usize) {
        let limit = limit.min(MAX_SLOTS);
        let mut capacity = self.capacity();
        if limit > capacity.limit {
            let grow = limit - capacity.limit;
            let repaid = grow.min(capacity.debt);
            capacity.debt -= repaid;
            self.semaphore.add_permits(grow - repaid);
        } else if limit < capacity.limit {
            let mut shrink = capacity.limit - limit;
            while shrink > 0 {
                match self.semaphore.try_acquire() {
                    Ok(idle) => {
                        idle.forget();
                        shrink -= 1;
                    }
                    Err(_) => break,
                }
            }
            capacity.debt += shrink;
        }
        capacity.limit = limit;
    }

    /// Take a slot if one is free
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Result<SlotPermit, TryAcquireError> {
        let permit = self.semaphore.clone().try_acquire_owned()?;
        Ok(self.wrap(permit))
    }

    /// Wait for a free slot
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<SlotPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(self.wrap(permit))
    }

    fn wrap(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> SlotPermit {
        SlotPermit {
            permit: Some(permit),
            slots: self.clone(),
        }
    }
}

/// A held slot. Dropping it frees the slot, or retires it while the pool
/// is paying off a shrink.
#[derive(Debug)]
pub(crate) struct SlotPermit {
    permit: Option<OwnedSemaphorePermit>,
    slots: Arc<WorkflowSlots>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let mut capacity = self.slots.capacity();
        if capacity.debt > 0 {
            capacity.debt -= 1;
            permit.forget();
        } else {
            // released under the lock so a concurrent shrink sees it as idle
            drop(permit);
        }
    }
}

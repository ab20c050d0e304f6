//! # Counting Semaphore
//!
//! A fixed-ceiling counting semaphore. Created with an initial permit
//! count that is also the ceiling; `acquire` takes a permit or parks the
//! caller on the semaphore's identity, `release` returns a permit and
//! wakes the highest-priority waiter.
//!
//! A woken waiter re-checks availability in a loop: with several
//! contenders the permit may be gone again by the time the waiter runs,
//! and the only guarantee is that one release wakes one waiter.

use core::cell::UnsafeCell;

use crate::error::{KernelError, Result};
use crate::task::WaitToken;
use crate::{heap, kernel, sync};

struct Permits {
    count: u32,
    max_count: u32,
}

/// Counting semaphore with a stable `'static` identity.
pub struct Semaphore {
    permits: UnsafeCell<Permits>,
}

// Safety: the permit state is only touched inside the kernel critical
// section, which serializes task and interrupt context on this core.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Create a semaphore with `initial` permits; `initial` is also the
    /// ceiling that `release` enforces.
    pub fn new(initial: u32) -> Result<&'static Semaphore> {
        let sem = heap::leak(Semaphore {
            permits: UnsafeCell::new(Permits {
                count: initial,
                max_count: initial,
            }),
        })?;
        log::trace!("semaphore created, permits {}", initial);
        Ok(sem)
    }

    fn token(&'static self) -> WaitToken {
        WaitToken::of(self)
    }

    /// Take a permit, blocking until one is available. Task context only.
    pub fn acquire(&'static self) {
        sync::enter();
        loop {
            let permits = unsafe { &mut *self.permits.get() };
            if permits.count > 0 {
                permits.count -= 1;
                sync::exit();
                return;
            }
            kernel::block_current(self.token());
            sync::exit();
            kernel::request_reschedule();
            sync::enter();
        }
    }

    /// Take a permit without blocking. Returns `WouldBlock` when none is
    /// available. Safe from interrupt context.
    pub fn try_acquire(&'static self) -> Result<()> {
        sync::enter();
        let permits = unsafe { &mut *self.permits.get() };
        let taken = if permits.count > 0 {
            permits.count -= 1;
            Ok(())
        } else {
            Err(KernelError::WouldBlock)
        };
        sync::exit();
        taken
    }

    /// Return a permit and wake one waiter. Fails with `InvalidState` at
    /// the ceiling, leaving the count unchanged.
    pub fn release(&'static self) -> Result<()> {
        sync::enter();
        let permits = unsafe { &mut *self.permits.get() };
        if permits.count == permits.max_count {
            sync::exit();
            return Err(KernelError::InvalidState);
        }
        permits.count += 1;
        let preempt = kernel::unblock_one(self.token());
        sync::exit();
        if preempt {
            kernel::request_reschedule();
        }
        Ok(())
    }

    /// Current permit count.
    pub fn count(&'static self) -> u32 {
        sync::critical_section(|| unsafe { (*self.permits.get()).count })
    }
}

//! # Kernel Heap
//!
//! Dynamic storage for task stacks, semaphore and queue headers, and queue
//! buffers. On target the crate installs a `linked_list_allocator` heap
//! over a fixed region past `.bss`; on the host the platform allocator is
//! used so the kernel logic tests run unchanged.
//!
//! All kernel allocations go through fallible paths (`try_reserve`), so
//! out-of-memory surfaces as a creation error instead of an abort inside
//! the allocator.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[global_allocator]
static ALLOCATOR: linked_list_allocator::LockedHeap = linked_list_allocator::LockedHeap::empty();

/// Hand the heap region to the allocator. Called once from `kernel::init`
/// before the first allocation.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn init() {
    use crate::config::HEAP_SIZE;
    unsafe {
        ALLOCATOR
            .lock()
            .init(cortex_m_rt::heap_start() as *mut u8, HEAP_SIZE);
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub(crate) fn init() {}

/// Move `value` to the heap and leak it, yielding the stable `'static`
/// address that serves as the primitive's wait token. Primitives are never
/// destroyed, so the leak is the lifecycle.
pub(crate) fn leak<T>(value: T) -> Result<&'static T> {
    let mut v = Vec::new();
    v.try_reserve_exact(1).map_err(|_| KernelError::OutOfMemory)?;
    v.push(value);
    let slot: &'static mut [T] = Box::leak(v.into_boxed_slice());
    Ok(&slot[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_yields_stable_distinct_addresses() {
        let a = leak(1u32).unwrap();
        let b = leak(2u32).unwrap();
        assert_eq!(*a, 1);
        assert_eq!(*b, 2);
        assert_ne!(a as *const u32, b as *const u32);
    }
}

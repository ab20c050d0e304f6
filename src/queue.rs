//! # Bounded Message Queue
//!
//! Fixed-capacity FIFO of fixed-size items, stored in one flat byte
//! buffer allocated at creation. `put` copies an item in at `tail`, `get`
//! copies one out at `head`; both wrap modulo the capacity and both wake
//! one waiter on success, since filling a slot unblocks a consumer and
//! freeing one unblocks a producer.
//!
//! Producers and consumers park on the same queue identity, so a wake may
//! go to the "wrong side" and be spurious; the blocking loops re-check
//! occupancy after every resume. Non-blocking calls never touch the
//! scheduler and are the only variants allowed in interrupt context.

use core::cell::UnsafeCell;

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::task::WaitToken;
use crate::{heap, kernel, sync};

/// Whether a full `put` / empty `get` parks the caller or returns
/// [`KernelError::WouldBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Blocking,
    NonBlocking,
}

#[derive(Debug)]
struct Ring {
    buf: Box<[u8]>,
    /// Next slot to dequeue.
    head: usize,
    /// Next slot to enqueue.
    tail: usize,
    /// Occupied slots. When `count == capacity`, `head == tail`.
    count: usize,
}

/// Bounded FIFO queue with a stable `'static` identity.
#[derive(Debug)]
pub struct Queue {
    capacity: usize,
    item_size: usize,
    ring: UnsafeCell<Ring>,
}

// Safety: the ring is only touched inside the kernel critical section,
// which serializes task and interrupt context on this core.
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    /// Allocate a queue of `capacity` slots of `item_size` bytes each.
    /// Both the header and the buffer come from the kernel heap.
    pub fn create(capacity: usize, item_size: usize) -> Result<&'static Queue> {
        if capacity == 0 || item_size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let bytes = capacity
            .checked_mul(item_size)
            .ok_or(KernelError::InvalidArgument)?;

        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|_| KernelError::OutOfMemory)?;
        buf.resize(bytes, 0);

        let queue = heap::leak(Queue {
            capacity,
            item_size,
            ring: UnsafeCell::new(Ring {
                buf: buf.into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
            }),
        })?;
        log::trace!("queue created, {} x {} bytes", capacity, item_size);
        Ok(queue)
    }

    fn token(&'static self) -> WaitToken {
        WaitToken::of(self)
    }

    /// Enqueue one item. `item.len()` must equal the queue's item size.
    ///
    /// Blocking mode parks the caller while the queue is full and is for
    /// task context only; non-blocking mode returns `WouldBlock` instead
    /// and is safe from interrupt context.
    pub fn put(&'static self, item: &[u8], mode: Mode) -> Result<()> {
        if item.len() != self.item_size {
            return Err(KernelError::InvalidArgument);
        }

        sync::enter();
        loop {
            let ring = unsafe { &mut *self.ring.get() };
            if ring.count < self.capacity {
                let at = ring.tail * self.item_size;
                ring.buf[at..at + self.item_size].copy_from_slice(item);
                ring.tail = (ring.tail + 1) % self.capacity;
                ring.count += 1;
                let preempt = kernel::unblock_one(self.token());
                sync::exit();
                if preempt {
                    kernel::request_reschedule();
                }
                return Ok(());
            }
            if mode == Mode::NonBlocking {
                sync::exit();
                return Err(KernelError::WouldBlock);
            }
            kernel::block_current(self.token());
            sync::exit();
            kernel::request_reschedule();
            sync::enter();
        }
    }

    /// Dequeue one item into `out`. `out.len()` must equal the queue's
    /// item size. Modes as for [`Queue::put`].
    pub fn get(&'static self, out: &mut [u8], mode: Mode) -> Result<()> {
        if out.len() != self.item_size {
            return Err(KernelError::InvalidArgument);
        }

        sync::enter();
        loop {
            let ring = unsafe { &mut *self.ring.get() };
            if ring.count > 0 {
                let at = ring.head * self.item_size;
                out.copy_from_slice(&ring.buf[at..at + self.item_size]);
                ring.head = (ring.head + 1) % self.capacity;
                ring.count -= 1;
                let preempt = kernel::unblock_one(self.token());
                sync::exit();
                if preempt {
                    kernel::request_reschedule();
                }
                return Ok(());
            }
            if mode == Mode::NonBlocking {
                sync::exit();
                return Err(KernelError::WouldBlock);
            }
            kernel::block_current(self.token());
            sync::exit();
            kernel::request_reschedule();
            sync::enter();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Occupied slots.
    pub fn len(&'static self) -> usize {
        sync::critical_section(|| unsafe { (*self.ring.get()).count })
    }

    pub fn is_empty(&'static self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(q: &'static Queue) -> (usize, usize, usize) {
        let ring = unsafe { &*q.ring.get() };
        (ring.head, ring.tail, ring.count)
    }

    fn assert_ring_invariant(q: &'static Queue) {
        let (head, tail, count) = indices(q);
        assert!(count <= q.capacity());
        assert_eq!(
            (tail + q.capacity() - head) % q.capacity(),
            count % q.capacity()
        );
        if count == q.capacity() {
            assert_eq!(head, tail);
        }
    }

    #[test]
    fn test_fifo_order_and_round_trip() {
        let q = Queue::create(2, 4).unwrap();
        let values: [u32; 3] = [0x1122_3344, 0x5566_7788, 0x99AA_BBCC];

        q.put(&values[0].to_le_bytes(), Mode::NonBlocking).unwrap();
        q.put(&values[1].to_le_bytes(), Mode::NonBlocking).unwrap();
        assert_ring_invariant(q);

        let mut out = [0u8; 4];
        q.get(&mut out, Mode::NonBlocking).unwrap();
        assert_eq!(u32::from_le_bytes(out), values[0]);

        q.put(&values[2].to_le_bytes(), Mode::NonBlocking).unwrap();
        assert_ring_invariant(q);

        q.get(&mut out, Mode::NonBlocking).unwrap();
        assert_eq!(u32::from_le_bytes(out), values[1]);
        q.get(&mut out, Mode::NonBlocking).unwrap();
        assert_eq!(u32::from_le_bytes(out), values[2]);

        let (head, tail, count) = indices(q);
        assert_eq!(count, 0);
        assert_eq!(head, tail);
    }

    #[test]
    fn test_nonblocking_full_and_empty() {
        let q = Queue::create(1, 2).unwrap();
        let mut out = [0u8; 2];

        crate::arch::host::reset_switch_requests();
        assert_eq!(q.get(&mut out, Mode::NonBlocking), Err(KernelError::WouldBlock));

        q.put(&[1, 2], Mode::NonBlocking).unwrap();
        let before = indices(q);
        assert_eq!(q.put(&[3, 4], Mode::NonBlocking), Err(KernelError::WouldBlock));
        // Failed put leaves the ring untouched and pends no switch — this
        // is the path an ISR producer takes against a full queue.
        assert_eq!(indices(q), before);
        assert_eq!(crate::arch::host::switch_requests(), 0);

        q.get(&mut out, Mode::NonBlocking).unwrap();
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn test_item_length_is_checked() {
        let q = Queue::create(4, 4).unwrap();
        assert_eq!(q.put(&[0u8; 3], Mode::NonBlocking), Err(KernelError::InvalidArgument));
        let mut short = [0u8; 5];
        assert_eq!(q.get(&mut short, Mode::NonBlocking), Err(KernelError::InvalidArgument));
        assert!(q.is_empty());
    }

    #[test]
    fn test_create_rejects_degenerate_shapes() {
        assert_eq!(Queue::create(0, 4).unwrap_err(), KernelError::InvalidArgument);
        assert_eq!(Queue::create(4, 0).unwrap_err(), KernelError::InvalidArgument);
        assert_eq!(
            Queue::create(usize::MAX, 2).unwrap_err(),
            KernelError::InvalidArgument
        );
    }

    #[test]
    fn test_invariant_holds_through_wraparound() {
        let q = Queue::create(3, 1).unwrap();
        let mut out = [0u8; 1];
        for round in 0..10u8 {
            q.put(&[round], Mode::NonBlocking).unwrap();
            assert_ring_invariant(q);
            if round % 2 == 1 {
                q.put(&[round], Mode::NonBlocking).unwrap();
                assert_ring_invariant(q);
                q.get(&mut out, Mode::NonBlocking).unwrap();
            }
            q.get(&mut out, Mode::NonBlocking).unwrap();
            assert_ring_invariant(q);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_has_head_equal_tail() {
        let q = Queue::create(2, 1).unwrap();
        q.put(&[1], Mode::NonBlocking).unwrap();
        q.put(&[2], Mode::NonBlocking).unwrap();
        let (head, tail, count) = indices(q);
        assert_eq!(count, 2);
        assert_eq!(head, tail);
        assert_ring_invariant(q);
    }
}

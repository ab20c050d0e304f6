//! # RondOS — a minimal preemptive RTOS kernel
//!
//! A priority-based round-robin kernel for single-core ARM Cortex-M4F
//! (ARMv7E-M) microcontrollers. The CPU is multiplexed across a fixed set
//! of tasks by saving and restoring register state on tick or on explicit
//! yield; counting semaphores and bounded message queues coordinate them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Application Tasks                     │
//! ├──────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                   │
//! │   init() · thread_new() · delay() · pause() · start()    │
//! ├───────────────┬──────────────────────┬───────────────────┤
//! │   Scheduler   │   Primitives         │   Critical sect.  │
//! │  scheduler.rs │  semaphore.rs        │   sync.rs         │
//! │  ─ schedule() │  queue.rs            │   ─ enter/exit    │
//! │  ─ tick()     │  ─ block/unblock     │     (reentrant)   │
//! ├───────────────┴──────────────────────┴───────────────────┤
//! │        Task model (task.rs) · Frames (stack.rs)          │
//! │     TCB · Priority · BlockState · WaitToken · frames     │
//! ├──────────────────────────────────────────────────────────┤
//! │     Heap (heap.rs)          Port (arch/cortex_m4.rs)     │
//! │  linked_list_allocator    PendSV · SVCall · SysTick      │
//! ├──────────────────────────────────────────────────────────┤
//! │              ARM Cortex-M4F hardware (Thumb-2)           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling model
//!
//! - Single core, preemptive. Tasks live in a circular ring; a single
//!   O(N) pass picks the highest-priority runnable task and rotates among
//!   equals, with the built-in idle task as fallback.
//! - The SysTick interrupt drives delays and preemption at a configurable
//!   quantum; PendSV, at the lowest exception priority, performs the
//!   actual register save/restore on the process stack.
//! - Tasks park on the identity of the primitive they wait for; a release
//!   or a queue operation wakes the single highest-priority waiter, and
//!   woken waiters re-check availability in a loop.
//!
//! ## Memory model
//!
//! - TCBs live in a fixed arena inside the scheduler.
//! - Task stacks, semaphore and queue headers, and queue buffers come
//!   from a `linked_list_allocator` heap; creation is fallible, nothing
//!   is ever destroyed.
//! - All shared state is mutated inside the reentrant interrupt-masking
//!   critical section of `sync`.
//!
//! On non-embedded targets the hardware port is replaced by a
//! deterministic fake (`arch::host`), which is what the unit tests drive.

#![no_std]

extern crate alloc;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
pub mod heap;
pub mod kernel;
pub mod queue;
pub mod scheduler;
pub mod semaphore;
pub mod stack;
pub mod sync;
pub mod task;

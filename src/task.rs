//! # Task Control Block
//!
//! Defines the task model for RondOS. A task is a slot in the scheduler's
//! fixed arena, linked into a circular ring by index. The ring always
//! contains the built-in idle task, which never blocks and never pauses.
//!
//! ## Scheduling state
//!
//! ```text
//!              delay(ms)            ┌──────────────┐
//!        ┌──────────────────────────►  BlockedTimed │
//!        │                          └──────┬───────┘
//!   ┌────┴─────┐   timeout hits 0          │
//!   │ Runnable ◄────────────────────────────┘
//!   └────┬─────┘
//!        │  primitive unavailable   ┌──────────────┐
//!        └──────────────────────────► Waiting(token)│
//!                 unblock(token)    └──────────────┘
//! ```
//!
//! `paused` composes orthogonally with all three states: a paused task is
//! never selected, and a paused timed task keeps its remaining timeout.

use alloc::boxed::Box;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Task priority. `Idle` is reserved for the built-in idle task; user tasks
/// use `Low`, `Medium`, or `High`. The derived ordering is the scheduling
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Reserved for the idle task; runs only when nothing else can.
    /// Task creation rejects this level once the idle task exists.
    Idle = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

// ---------------------------------------------------------------------------
// Wait tokens and block state
// ---------------------------------------------------------------------------

/// Opaque identity of a blockable primitive.
///
/// The token is the primitive's stable address, so one unblock routine
/// serves semaphores and queues alike, and two distinct primitives
/// partition their waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken(usize);

impl WaitToken {
    /// Token for a primitive with a stable (`'static`) address.
    pub(crate) fn of<T>(target: &'static T) -> Self {
        WaitToken(target as *const T as usize)
    }
}

/// What, if anything, a task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Runnable.
    None,
    /// Blocked on a delay; `timeout_ticks` holds the remaining ticks.
    Timed,
    /// Parked on the primitive identified by the token.
    Waiting(WaitToken),
}

// ---------------------------------------------------------------------------
// Stack ownership
// ---------------------------------------------------------------------------

/// Backing memory of a task stack. Stacks are never freed; task destruction
/// does not exist.
pub(crate) enum StackStorage {
    /// Free arena slot; no stack yet.
    Unallocated,
    /// Allocated by the kernel at creation.
    Owned(Box<[u32]>),
    /// Provided by the caller.
    Static(&'static mut [u32]),
}

impl StackStorage {
    pub(crate) fn words_mut(&mut self) -> &mut [u32] {
        match self {
            StackStorage::Unallocated => &mut [],
            StackStorage::Owned(b) => b,
            StackStorage::Static(s) => s,
        }
    }
}

// ---------------------------------------------------------------------------
// Task handle and TCB
// ---------------------------------------------------------------------------

/// Stable opaque task identity returned by task creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) usize);

/// Task Control Block — one arena slot.
///
/// `saved_sp` points at the top of the saved register frame on the task's
/// own stack whenever the task is not running; the layout is the
/// architectural contract in [`crate::stack`].
pub struct Tcb {
    /// Saved process stack pointer. Updated on every context switch.
    pub(crate) saved_sp: *mut u32,
    /// Index of the next TCB in the circular ring.
    pub(crate) next: usize,
    pub(crate) priority: Priority,
    pub(crate) block: BlockState,
    /// Remaining ticks; meaningful only while `block == Timed`.
    pub(crate) timeout_ticks: u32,
    pub(crate) paused: bool,
    pub(crate) stack: StackStorage,
    /// Slot allocated flag.
    pub(crate) active: bool,
}

impl Tcb {
    /// A free arena slot.
    pub(crate) const EMPTY: Self = Self {
        saved_sp: core::ptr::null_mut(),
        next: 0,
        priority: Priority::Idle,
        block: BlockState::None,
        timeout_ticks: 0,
        paused: false,
        stack: StackStorage::Unallocated,
        active: false,
    };

    /// Whether the scheduler may select this task.
    #[inline]
    pub(crate) fn is_runnable(&self) -> bool {
        self.active && self.block == BlockState::None && !self.paused
    }
}

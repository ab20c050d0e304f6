//! # Kernel
//!
//! Top-level kernel initialization and public API for RondOS.
//!
//! The kernel owns the global scheduler instance, provides the task
//! lifecycle API, and coordinates startup. All public functions take the
//! kernel critical section around shared state.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()         ← heap, scheduler, idle task
//!         ├─► kernel::thread_new()   ← register tasks (×N)
//!         └─► kernel::start(cp, 1)   ← launch scheduler (no return)
//!               ├─► Configure SysTick at the tick period
//!               ├─► PendSV lowest priority, SysTick one above
//!               ├─► Enable the FPU for FP tasks
//!               └─► First dispatch via SVCall
//! ```

use crate::config::IDLE_STACK_WORDS;
use crate::error::{KernelError, Result};
use crate::scheduler::Scheduler;
use crate::task::{Priority, TaskId, WaitToken};
use crate::{arch, heap, sync};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod global {
    use super::Scheduler;

    /// The one scheduler. Accessed through `SCHEDULER_PTR` once installed.
    static mut SCHEDULER: Scheduler = Scheduler::new();

    /// Raw pointer to the scheduler, set during `init()`. The exception
    /// handlers reach the scheduler through this.
    static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

    pub(super) fn install() {
        unsafe {
            SCHEDULER = Scheduler::new();
            SCHEDULER_PTR = core::ptr::addr_of_mut!(SCHEDULER);
        }
    }

    /// Run `f` on the installed scheduler. `None` before `install()`.
    ///
    /// Callers hold the kernel critical section (or run in an exception
    /// handler with interrupts masked), which serializes every access on
    /// this single core.
    pub(crate) fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Option<R> {
        unsafe {
            if SCHEDULER_PTR.is_null() {
                None
            } else {
                Some(f(&mut *SCHEDULER_PTR))
            }
        }
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod global {
    //! Host rendering: one scheduler per test thread, so parallel tests
    //! cannot interfere.

    use super::Scheduler;
    use std::cell::RefCell;

    std::thread_local! {
        static SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
    }

    pub(super) fn install() {
        SCHEDULER.with(|s| *s.borrow_mut() = Some(Scheduler::new()));
    }

    pub(crate) fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Option<R> {
        SCHEDULER.with(|s| s.borrow_mut().as_mut().map(f))
    }
}

/// Run `f` on the installed scheduler; `None` before [`init`].
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Option<R> {
    global::with(f)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel: install the scheduler, hand the heap region to
/// the allocator, and create the idle task.
///
/// Must be called exactly once, before any other kernel function.
pub fn init() -> Result<()> {
    global::install();
    heap::init();

    sync::critical_section(|| {
        with_scheduler(|s| {
            s.create_task(idle_entry, Priority::Idle, None, IDLE_STACK_WORDS, false)
        })
        .unwrap_or(Err(KernelError::InvalidState))
    })?;

    log::debug!("kernel initialized");
    Ok(())
}

/// Create a task and append it to the ring.
///
/// `stack` may carry caller-provided memory of at least `stack_words`
/// words; pass `None` to have the kernel allocate `stack_words` words
/// ([`crate::config::DEFAULT_STACK_WORDS`] is a reasonable choice).
/// `use_fp` selects the extended saved frame for tasks that touch the FP
/// coprocessor. [`Priority::Idle`] is rejected: that level belongs to the
/// built-in idle task.
///
/// Callable before [`start`] or from a running task.
pub fn thread_new(
    entry: extern "C" fn() -> !,
    priority: Priority,
    stack: Option<&'static mut [u32]>,
    stack_words: usize,
    use_fp: bool,
) -> Result<TaskId> {
    let id = sync::critical_section(|| {
        with_scheduler(|s| s.create_task(entry, priority, stack, stack_words, use_fp))
            .unwrap_or(Err(KernelError::InvalidState))
    })?;
    log::trace!("task {:?} created at {:?}", id, priority);
    Ok(id)
}

/// Put the calling task to sleep for `ms` milliseconds of kernel time
/// (ticks, at the default 1 ms tick period). Zero sleeps one tick.
/// Task context only.
pub fn delay(ms: u32) {
    sync::enter();
    let _ = with_scheduler(|s| s.delay_current(ms));
    sync::exit();
    request_reschedule();
}

/// Pause a task. A paused task keeps its blocking state but is never
/// selected; a paused delay stops counting down. Pausing the calling task
/// takes effect immediately.
pub fn pause(task: TaskId) -> Result<()> {
    let paused_current = sync::critical_section(|| {
        with_scheduler(|s| s.pause(task)).unwrap_or(Err(KernelError::InvalidState))
    })?;
    log::trace!("task {:?} paused", task);
    if paused_current {
        request_reschedule();
    }
    Ok(())
}

/// Resume a paused task. Does not preempt by itself: a resumed
/// higher-priority task takes over at the next tick or wake.
pub fn resume(task: TaskId) -> Result<()> {
    sync::critical_section(|| {
        with_scheduler(|s| s.resume(task)).unwrap_or(Err(KernelError::InvalidState))
    })?;
    log::trace!("task {:?} resumed", task);
    Ok(())
}

/// Voluntarily hand the CPU to the scheduler.
pub fn yield_task() {
    request_reschedule();
}

/// Monotonic tick count since [`start`].
pub fn uptime_ticks() -> u64 {
    sync::critical_section(|| with_scheduler(|s| s.tick_count())).unwrap_or(0)
}

/// Start the scheduler with the given tick period. **Does not return.**
///
/// # Safety contract
/// [`init`] must have been called; interrupts are enabled here.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals, tick_period_ms: u32) -> ! {
    use crate::arch::cortex_m4 as port;

    port::configure_systick(&mut core_peripherals.SYST, tick_period_ms);
    port::set_exception_priorities();
    port::enable_fpu();

    sync::critical_section(|| {
        let _ = with_scheduler(|s| {
            s.mark_started();
            s.schedule();
        });
    });

    unsafe { port::start_first_task() }
}

// ---------------------------------------------------------------------------
// Block/unblock entry points for the primitives
// ---------------------------------------------------------------------------

/// Park the calling task on `token`. Critical section held by the caller.
pub(crate) fn block_current(token: WaitToken) {
    let _ = with_scheduler(|s| s.block_current(token));
}

/// Wake the best waiter on `token`; `true` when the caller should request
/// a context switch after leaving its critical section. Critical section
/// held by the caller.
pub(crate) fn unblock_one(token: WaitToken) -> bool {
    with_scheduler(|s| s.unblock_one(token)).unwrap_or(false)
}

/// Pend a context switch, but only once the scheduler is live. Before the
/// first dispatch a pended switch would fire into a kernel that has no
/// running task to save.
pub(crate) fn request_reschedule() {
    let started = with_scheduler(|s| s.started()).unwrap_or(false);
    if started {
        arch::request_context_switch();
    }
}

// ---------------------------------------------------------------------------
// Tick entry point (from the tick interrupt)
// ---------------------------------------------------------------------------

/// Advance kernel time by one tick and pend a context switch when the
/// quantum expires. The platform's periodic tick interrupt (SysTick on
/// Cortex-M) must invoke this once per period.
pub fn handle_tick() {
    sync::enter();
    let reschedule = with_scheduler(|s| {
        s.tick();
        s.take_reschedule()
    })
    .unwrap_or(false);
    sync::exit();

    if reschedule {
        arch::request_context_switch();
    }
}

// ---------------------------------------------------------------------------
// Idle task
// ---------------------------------------------------------------------------

/// Built-in lowest-priority task: runs when nothing else is runnable,
/// never blocks, never pauses.
extern "C" fn idle_entry() -> ! {
    loop {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

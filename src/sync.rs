//! # Critical Sections
//!
//! Interrupt-safe critical sections for the Cortex-M4. All shared kernel
//! state — the task arena, the ring, semaphore counts, queue indices — is
//! mutated only between [`enter`] and [`exit`].
//!
//! The pair is reentrant: a depth counter tracks nesting, and only the
//! outermost `exit` restores the interrupt mask captured by the outermost
//! `enter`. Kernel entry points rely on this when they drop the critical
//! section to request a context switch and re-enter on resume.
//!
//! Keep critical sections as short as possible; interrupt latency is
//! bounded by the longest one.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod imp {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    static DEPTH: AtomicU32 = AtomicU32::new(0);
    static OUTER_WAS_UNMASKED: AtomicBool = AtomicBool::new(false);

    pub fn enter() {
        let was_unmasked = cortex_m::register::primask::read().is_inactive();
        cortex_m::interrupt::disable();
        // DEPTH is only touched with interrupts masked on this single core,
        // so relaxed ordering is sufficient.
        if DEPTH.load(Ordering::Relaxed) == 0 {
            OUTER_WAS_UNMASKED.store(was_unmasked, Ordering::Relaxed);
        }
        DEPTH.store(DEPTH.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
    }

    pub fn exit() {
        let depth = DEPTH.load(Ordering::Relaxed);
        if depth == 0 {
            return;
        }
        DEPTH.store(depth - 1, Ordering::Relaxed);
        if depth == 1 && OUTER_WAS_UNMASKED.load(Ordering::Relaxed) {
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod imp {
    //! Host stand-in: the "interrupt mask" is a thread-local flag so tests
    //! can run in parallel and observe mask balance.

    use std::cell::Cell;

    std::thread_local! {
        static DEPTH: Cell<u32> = const { Cell::new(0) };
        static MASKED: Cell<bool> = const { Cell::new(false) };
        static OUTER_WAS_UNMASKED: Cell<bool> = const { Cell::new(false) };
    }

    pub fn enter() {
        let was_unmasked = !MASKED.with(|m| m.replace(true));
        DEPTH.with(|d| {
            if d.get() == 0 {
                OUTER_WAS_UNMASKED.with(|o| o.set(was_unmasked));
            }
            d.set(d.get() + 1);
        });
    }

    pub fn exit() {
        DEPTH.with(|d| {
            let depth = d.get();
            if depth == 0 {
                return;
            }
            d.set(depth - 1);
            if depth == 1 && OUTER_WAS_UNMASKED.with(|o| o.get()) {
                MASKED.with(|m| m.set(false));
            }
        });
    }

    /// Whether the simulated interrupt mask is currently set.
    pub fn interrupts_masked() -> bool {
        MASKED.with(|m| m.get())
    }
}

/// Mask kernel preemption. Reentrant.
#[inline]
pub fn enter() {
    imp::enter();
}

/// Undo one [`enter`]. The interrupt mask is restored when the last
/// nested level unwinds.
#[inline]
pub fn exit() {
    imp::exit();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use imp::interrupts_masked;

/// Execute a closure within a critical section.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    enter();
    let r = f();
    exit();
    r
}

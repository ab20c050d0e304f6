//! # Cortex-M4F Port
//!
//! Hardware-specific code for the ARM Cortex-M4F (Thumb-2, single core,
//! hardware FPU). Implements the context switch via PendSV, the first
//! dispatch via SVCall, and the SysTick tick source.
//!
//! ## Exception priorities
//!
//! PendSV runs at the lowest priority so a pended switch fires only once
//! every other handler has drained; SysTick sits one level above it. Any
//! application interrupt preempts both.
//!
//! ## Stacks
//!
//! Tasks run in Thread mode on the process stack pointer (PSP); every
//! exception handler runs on the main stack pointer (MSP). The saved-frame
//! layout moved by the trampolines below is the contract in
//! [`crate::stack`]: the EXC_RETURN marker sits at `saved_sp`, callee-saved
//! registers above it, and the hardware-stacked words on top. The marker
//! is tested on both sides of the switch to decide whether S16–S31 travel
//! with the frame.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::SYSTEM_CLOCK_HZ;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire every `period_ms` milliseconds from the core
/// clock. Each expiry runs the kernel tick handler.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST, period_ms: u32) {
    let reload = SYSTEM_CLOCK_HZ / 1000 * period_ms.max(1) - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Exception priorities
// ---------------------------------------------------------------------------

/// Set PendSV to the lowest exception priority and SysTick one level
/// above it (upper nibble significant on a 4-bit-priority part).
pub fn set_exception_priorities() {
    // System Handler Priority Register 3: bits [23:16] PendSV,
    // bits [31:24] SysTick.
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        let val = (val & 0x0000_FFFF) | (0xFF << 16) | (0xEF << 24);
        core::ptr::write_volatile(SHPR3, val);
    }
}

/// Grant full access to the FP coprocessor (CP10/CP11) so tasks created
/// with the FP flag can touch it from Thread mode.
pub fn enable_fpu() {
    const CPACR: *mut u32 = 0xE000_ED88 as *mut u32;
    unsafe {
        let val = core::ptr::read_volatile(CPACR);
        core::ptr::write_volatile(CPACR, val | (0b1111 << 20));
        asm!("dsb", "isb");
    }
}

// ---------------------------------------------------------------------------
// Context switch request
// ---------------------------------------------------------------------------

/// Pend the context-switch exception. The switch fires once no other
/// handler is active; safe from task and interrupt context alike.
#[inline]
pub fn request_context_switch() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// First dispatch
// ---------------------------------------------------------------------------

/// Launch the first task. Raises SVC so the restore runs in Handler mode
/// and the exception return machinery switches Thread mode onto the PSP,
/// FP or non-FP as the task's frame marker says. Never returns.
///
/// # Safety
/// The scheduler must be installed and `schedule()` must have published a
/// first task.
pub unsafe fn start_first_task() -> ! {
    asm!("cpsie i", "svc 0", "2:", "b 2b", options(noreturn));
}

/// SVCall handler: restore the current task's saved frame and return
/// into it. Only used for the first dispatch.
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "bl {first}",              // r0 = saved_sp of the first task
        "ldmia r0!, {{lr}}",       // EXC_RETURN marker
        "ldmia r0!, {{r4-r11}}",   // callee-saved registers
        "tst lr, #0x10",           // FP frame?
        "it eq",
        "vldmiaeq r0!, {{s16-s31}}",
        "msr psp, r0",
        // The frame stacked by this SVC is abandoned; wind MSP back to
        // the top so the handler stack starts clean.
        "ldr r0, =_stack_start",
        "msr msp, r0",
        "isb",
        "bx lr",                   // hardware pops the rest from PSP
        first = sym first_task_context,
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV handler: save the running task's context, pick the next task,
/// restore its context.
///
/// Hardware has already stacked the caller-saved registers (and S0–S15 if
/// the task had FP context) onto the PSP. This handler stacks R4–R11,
/// S16–S31 when applicable, and the EXC_RETURN marker last, so the TCB's
/// `saved_sp` addresses the marker.
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        // --- Save current context ---
        "mrs r0, psp",
        "isb",
        "tst lr, #0x10",           // FP context active?
        "it eq",
        "vstmdbeq r0!, {{s16-s31}}",
        "stmdb r0!, {{r4-r11}}",
        "stmdb r0!, {{lr}}",       // marker goes on last
        "bl {store}",              // store_current_sp(r0)
        // --- Select next ---
        "bl {pick}",               // r0 = next task's saved_sp
        // --- Restore next context ---
        "ldmia r0!, {{lr}}",
        "ldmia r0!, {{r4-r11}}",
        "tst lr, #0x10",
        "it eq",
        "vldmiaeq r0!, {{s16-s31}}",
        "msr psp, r0",
        "isb",
        "cpsie i",
        "bx lr",
        store = sym store_task_context,
        pick = sym pick_next_context,
    );
}

// ---------------------------------------------------------------------------
// Trampoline helpers (called from the handlers above)
// ---------------------------------------------------------------------------

/// Write the preempted task's frame pointer back into its TCB.
///
/// # Safety
/// Called from PendSV with interrupts masked.
unsafe extern "C" fn store_task_context(psp: *mut u32) {
    let _ = crate::kernel::with_scheduler(|s| s.store_current_sp(psp));
}

/// Run the scheduler and hand back the new running task's frame pointer.
///
/// # Safety
/// Called from PendSV with interrupts masked.
unsafe extern "C" fn pick_next_context() -> *mut u32 {
    crate::kernel::with_scheduler(|s| {
        s.schedule();
        s.current_saved_sp()
    })
    .unwrap_or(core::ptr::null_mut())
}

/// Frame pointer of the task published for the first dispatch.
///
/// # Safety
/// Called from SVCall before any task has run.
unsafe extern "C" fn first_task_context() -> *mut u32 {
    crate::kernel::with_scheduler(|s| s.current_saved_sp()).unwrap_or(core::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick handler: advance kernel time and pend a switch when the tick
/// asks for one.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::handle_tick();
}

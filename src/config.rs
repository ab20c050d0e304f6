//! # RondOS Configuration
//!
//! Compile-time constants governing the kernel. Arena capacities are fixed
//! at compile time; stacks and queue buffers come from the kernel heap.

/// Maximum number of tasks the arena can hold, including the idle task.
/// This bounds the TCB array inside the scheduler; stacks are allocated
/// separately, so an unused slot costs only one TCB.
pub const MAX_TASKS: usize = 16;

/// System core clock frequency in Hz (STM32F4 at 16 MHz HSI by default).
/// Used to derive the SysTick reload value from the tick period.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Number of tick periods between forced reschedules. With the default of 1
/// every tick is a preemption point, giving round-robin at tick granularity.
pub const QUANTUM_TICKS: u32 = 1;

/// Smallest accepted stack size, in 32-bit words. Must cover the extended
/// saved frame (51 words) plus headroom for the entry function's prologue.
pub const MIN_STACK_WORDS: usize = 64;

/// Stack size used when the caller lets the kernel allocate, in words.
pub const DEFAULT_STACK_WORDS: usize = 256;

/// Stack size of the built-in idle task, in words. The idle task only
/// spins on `wfi`, so the minimum is plenty.
pub const IDLE_STACK_WORDS: usize = MIN_STACK_WORDS;

/// Size of the kernel heap in bytes. Serves TCB stacks, semaphore and
/// queue headers, and queue buffers.
pub const HEAP_SIZE: usize = 16 * 1024;

/// Fill pattern written into kernel-allocated stacks. Makes high-water
/// marks visible in a debugger.
pub const STACK_FILL: u32 = 0xA5A5_A5A5;

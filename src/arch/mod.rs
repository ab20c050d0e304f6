//! # Platform Boundary
//!
//! The kernel's only coupling to hardware: the tick interrupt, the
//! pendable context-switch exception, the interrupt mask, and the first
//! dispatch. The Cortex-M4F port provides the real trampolines; any other
//! build target gets a deterministic fake that records switch requests so
//! the kernel logic is testable on the host.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod host;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::cortex_m4::request_context_switch;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use self::host::request_context_switch;

//! # Host Fake of the Switch Trampoline
//!
//! On the host there is no PendSV; a context-switch request is recorded
//! in a thread-local counter instead, and tests may install a hook that
//! runs in its place. The hook stands in for "the other tasks run now",
//! which is what makes the blocking protocol of the primitives testable
//! without real preemption.
//!
//! State is thread-local so parallel tests do not observe each other.

use std::cell::Cell;

std::thread_local! {
    static SWITCH_REQUESTS: Cell<u32> = const { Cell::new(0) };
    static SWITCH_HOOK: Cell<Option<fn()>> = const { Cell::new(None) };
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Record a context-switch request and run the installed hook, if any.
/// Requests made from inside the hook are counted but do not re-enter it.
pub fn request_context_switch() {
    SWITCH_REQUESTS.with(|c| c.set(c.get() + 1));
    if IN_HOOK.with(|g| g.get()) {
        return;
    }
    if let Some(hook) = SWITCH_HOOK.with(|h| h.get()) {
        IN_HOOK.with(|g| g.set(true));
        hook();
        IN_HOOK.with(|g| g.set(false));
    }
}

/// Number of switch requests recorded on this thread.
pub fn switch_requests() -> u32 {
    SWITCH_REQUESTS.with(|c| c.get())
}

/// Reset the request counter.
pub fn reset_switch_requests() {
    SWITCH_REQUESTS.with(|c| c.set(0));
}

/// Install (or clear) the stand-in for the context switch.
pub fn set_switch_hook(hook: Option<fn()>) {
    SWITCH_HOOK.with(|h| h.set(hook));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_recorded() {
        reset_switch_requests();
        assert_eq!(switch_requests(), 0);
        request_context_switch();
        request_context_switch();
        assert_eq!(switch_requests(), 2);
    }

    #[test]
    fn test_hook_runs_once_per_request() {
        std::thread_local! {
            static RAN: Cell<u32> = const { Cell::new(0) };
        }
        fn hook() {
            RAN.with(|r| r.set(r.get() + 1));
            // A request from inside the hook must not recurse.
            request_context_switch();
        }

        reset_switch_requests();
        set_switch_hook(Some(hook));
        request_context_switch();
        set_switch_hook(None);

        assert_eq!(RAN.with(|r| r.get()), 1);
        assert_eq!(switch_requests(), 2);
    }
}

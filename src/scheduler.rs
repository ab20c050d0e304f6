//! # Scheduler
//!
//! Core scheduling logic for RondOS: the task arena and ring, the
//! priority-based round-robin selection, the tick machinery driving delays
//! and preemption, and the block/unblock protocol used by the
//! synchronization primitives.
//!
//! ## Selection rule
//!
//! `schedule()` makes a single pass over the ring:
//! 1. Start from the running task if it is runnable, else from idle.
//! 2. Walk the ring from `start.next` back around to `start`, keeping the
//!    best candidate under `runnable && priority >= best.priority`.
//! 3. Publish the winner as the running task.
//!
//! The `>=` comparison makes ties rotate: among equal-priority runnable
//! tasks the walk order hands the CPU around, which is the round-robin
//! time-slicing. Idle wins only when nothing else is runnable. The pass is
//! O(N) with no allocation.
//!
//! ## Tick
//!
//! `tick()` runs from the tick interrupt under the critical section. Every
//! `QUANTUM_TICKS` invocations it charges one tick to every delayed,
//! unpaused task and wakes those whose timeout expires; the caller then
//! requests a context switch if scheduling has started. The timeout charge
//! is never skipped, even while scheduling is disabled — only the switch
//! request is gated.

use alloc::vec::Vec;

use crate::config::{MAX_TASKS, MIN_STACK_WORDS, QUANTUM_TICKS, STACK_FILL};
use crate::error::{KernelError, Result};
use crate::stack;
use crate::task::{BlockState, Priority, StackStorage, TaskId, Tcb, WaitToken};

// ---------------------------------------------------------------------------
// Scheduler state
// ---------------------------------------------------------------------------

/// The central scheduler state: the TCB arena, the ring, and the tick
/// counters. Lives as a single global owned by `kernel`; every method is
/// called with the kernel critical section held.
pub struct Scheduler {
    /// Fixed arena of TCB slots. Slot 0 is the idle task once the kernel
    /// is initialized; slots are handed out in creation order and the ring
    /// links follow that order.
    tasks: [Tcb; MAX_TASKS],

    /// Number of allocated slots, idle task included.
    task_count: usize,

    /// Index of the currently running task.
    current: usize,

    /// Index of the idle task.
    idle: usize,

    /// Monotonic tick counter, advanced once per tick interrupt.
    tick_count: u64,

    /// Ticks elapsed since the last quantum boundary.
    quantum_elapsed: u32,

    /// Whether `start()` has launched the first task. Gates preemption
    /// requests, not timeout accounting.
    started: bool,

    /// Set when the tick decides a reschedule is due; consumed by the tick
    /// interrupt handler.
    needs_reschedule: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [Tcb::EMPTY; MAX_TASKS],
            task_count: 0,
            current: 0,
            idle: 0,
            tick_count: 0,
            quantum_elapsed: 0,
            started: false,
            needs_reschedule: false,
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Allocate a TCB, prepare its stack frame, and append it to the ring.
    ///
    /// `stack_mem` may carry caller-provided memory; otherwise a stack of
    /// `stack_words` words is allocated from the kernel heap. Creation
    /// failures leave the arena and the ring untouched.
    pub fn create_task(
        &mut self,
        entry: extern "C" fn() -> !,
        priority: Priority,
        stack_mem: Option<&'static mut [u32]>,
        stack_words: usize,
        use_fp: bool,
    ) -> Result<TaskId> {
        if stack_words < MIN_STACK_WORDS {
            return Err(KernelError::InvalidArgument);
        }
        // The idle level belongs to the built-in idle task, which is the
        // first task created; a second task at that level would dodge the
        // pause/block guards that keep the ring's fallback alive.
        if priority == Priority::Idle && self.tasks[self.idle].active {
            return Err(KernelError::InvalidArgument);
        }
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::OutOfMemory);
        }

        let mut storage = match stack_mem {
            Some(words) => {
                if words.len() < stack_words {
                    return Err(KernelError::InvalidArgument);
                }
                StackStorage::Static(words)
            }
            None => {
                let mut v: Vec<u32> = Vec::new();
                v.try_reserve_exact(stack_words)
                    .map_err(|_| KernelError::OutOfMemory)?;
                v.resize(stack_words, STACK_FILL);
                StackStorage::Owned(v.into_boxed_slice())
            }
        };

        let saved_sp = stack::init_frame(storage.words_mut(), entry, use_fp);

        let id = self.task_count;
        let tcb = &mut self.tasks[id];
        tcb.saved_sp = saved_sp;
        tcb.priority = priority;
        tcb.block = BlockState::None;
        tcb.timeout_ticks = 0;
        tcb.paused = false;
        tcb.stack = storage;
        tcb.active = true;

        // Append after the current tail: the new node inherits the tail's
        // wrap-around link, and the tail points at the new node. Creation
        // order is ring order.
        if id == 0 {
            self.tasks[0].next = 0;
        } else {
            let wrap = self.tasks[id - 1].next;
            self.tasks[id].next = wrap;
            self.tasks[id - 1].next = id;
        }

        self.task_count += 1;
        Ok(TaskId(id))
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Select and publish the next running task. Called with interrupts
    /// masked, from the context-switch glue.
    pub fn schedule(&mut self) -> usize {
        let start = if self.tasks[self.current].is_runnable() {
            self.current
        } else {
            self.idle
        };

        let mut best = start;
        let mut t = self.tasks[start].next;
        while t != start {
            if self.tasks[t].is_runnable()
                && self.tasks[t].priority >= self.tasks[best].priority
            {
                best = t;
            }
            t = self.tasks[t].next;
        }

        self.current = best;
        self.needs_reschedule = false;
        best
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance time by one tick interrupt.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        self.quantum_elapsed += 1;

        if self.quantum_elapsed >= QUANTUM_TICKS {
            self.quantum_elapsed = 0;

            // Charge one tick to every delayed task that is not paused.
            // Paused tasks keep their remaining timeout.
            for i in 0..self.task_count {
                let tcb = &mut self.tasks[i];
                if tcb.block == BlockState::Timed && !tcb.paused {
                    tcb.timeout_ticks = tcb.timeout_ticks.saturating_sub(1);
                    if tcb.timeout_ticks == 0 {
                        tcb.block = BlockState::None;
                    }
                }
            }

            if self.started {
                self.needs_reschedule = true;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// Put the running task to sleep for `ticks` ticks. Zero is treated as
    /// one tick. The caller requests the context switch after releasing
    /// the critical section.
    pub fn delay_current(&mut self, ticks: u32) {
        if self.current == self.idle {
            // The idle task never blocks.
            return;
        }
        let tcb = &mut self.tasks[self.current];
        tcb.timeout_ticks = ticks.max(1);
        tcb.block = BlockState::Timed;
    }

    /// Mark a task paused. Returns whether the target is the running task,
    /// in which case the caller requests a context switch.
    pub fn pause(&mut self, id: TaskId) -> Result<bool> {
        let i = self.slot(id)?;
        if i == self.idle {
            // The idle task never pauses.
            return Err(KernelError::InvalidArgument);
        }
        if self.tasks[i].paused {
            return Err(KernelError::InvalidState);
        }
        self.tasks[i].paused = true;
        Ok(i == self.current)
    }

    /// Clear a task's paused flag. Never preempts by itself; a resumed
    /// higher-priority task takes over at the next tick or wake.
    pub fn resume(&mut self, id: TaskId) -> Result<()> {
        let i = self.slot(id)?;
        if !self.tasks[i].paused {
            return Err(KernelError::InvalidState);
        }
        self.tasks[i].paused = false;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Block / unblock
    // -----------------------------------------------------------------------

    /// Park the running task on `token`. The idle task never blocks.
    pub fn block_current(&mut self, token: WaitToken) {
        if self.current == self.idle {
            return;
        }
        self.tasks[self.current].block = BlockState::Waiting(token);
    }

    /// Wake the single highest-priority waiter parked on `token`, walking
    /// the full ring once from `current.next`; the first of equal-priority
    /// waiters encountered wins. The running slot is examined last: it can
    /// hold a waiter too, when a task parked itself and an interrupt runs
    /// before the pended switch fires. Returns `true` when the woken task
    /// should preempt the running one (strictly higher priority and not
    /// paused).
    pub fn unblock_one(&mut self, token: WaitToken) -> bool {
        if self.task_count == 0 {
            return false;
        }

        let mut best: Option<usize> = None;
        let mut t = self.tasks[self.current].next;
        loop {
            if self.tasks[t].block == BlockState::Waiting(token) {
                let better = match best {
                    None => true,
                    Some(b) => self.tasks[t].priority > self.tasks[b].priority,
                };
                if better {
                    best = Some(t);
                }
            }
            if t == self.current {
                break;
            }
            t = self.tasks[t].next;
        }

        match best {
            Some(b) => {
                self.tasks[b].block = BlockState::None;
                !self.tasks[b].paused
                    && self.tasks[b].priority > self.tasks[self.current].priority
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors for the kernel and the switch glue
    // -----------------------------------------------------------------------

    fn slot(&self, id: TaskId) -> Result<usize> {
        if id.0 < self.task_count && self.tasks[id.0].active {
            Ok(id.0)
        } else {
            Err(KernelError::InvalidArgument)
        }
    }

    pub fn current_id(&self) -> TaskId {
        TaskId(self.current)
    }

    pub fn current_saved_sp(&self) -> *mut u32 {
        self.tasks[self.current].saved_sp
    }

    pub fn store_current_sp(&mut self, sp: *mut u32) {
        self.tasks[self.current].saved_sp = sp;
    }

    pub fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn take_reschedule(&mut self) -> bool {
        let due = self.needs_reschedule;
        self.needs_reschedule = false;
        due
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STACK_WORDS;

    extern "C" fn entry() -> ! {
        loop {}
    }

    fn sched_with(priorities: &[Priority]) -> Scheduler {
        let mut s = Scheduler::new();
        // Slot 0 plays the idle task, as the kernel sets it up.
        s.create_task(entry, Priority::Idle, None, MIN_STACK_WORDS, false)
            .unwrap();
        for &p in priorities {
            s.create_task(entry, p, None, DEFAULT_STACK_WORDS, false)
                .unwrap();
        }
        s
    }

    fn tid(i: usize) -> TaskId {
        TaskId(i)
    }

    /// Drive one simulated tick interrupt: advance time, then reschedule
    /// if the tick requested it. Returns the running slot afterwards.
    fn run_tick(s: &mut Scheduler) -> usize {
        s.tick();
        if s.take_reschedule() {
            s.schedule();
        }
        s.current
    }

    #[test]
    fn test_creation_builds_ring_in_order() {
        let s = sched_with(&[Priority::Low, Priority::Medium, Priority::High]);
        assert_eq!(s.task_count(), 4);
        assert_eq!(s.tasks[0].next, 1);
        assert_eq!(s.tasks[1].next, 2);
        assert_eq!(s.tasks[2].next, 3);
        assert_eq!(s.tasks[3].next, 0);
    }

    #[test]
    fn test_creation_rejects_second_idle_priority_task() {
        let mut s = sched_with(&[Priority::Low]);
        let err = s
            .create_task(entry, Priority::Idle, None, MIN_STACK_WORDS, false)
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidArgument);
        assert_eq!(s.task_count(), 2);
    }

    #[test]
    fn test_creation_rejects_small_stack() {
        let mut s = Scheduler::new();
        let err = s
            .create_task(entry, Priority::Low, None, MIN_STACK_WORDS - 1, false)
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidArgument);
        assert_eq!(s.task_count(), 0);
    }

    #[test]
    fn test_creation_rejects_full_arena() {
        let mut s = Scheduler::new();
        for _ in 0..MAX_TASKS {
            s.create_task(entry, Priority::Low, None, MIN_STACK_WORDS, false)
                .unwrap();
        }
        let err = s
            .create_task(entry, Priority::Low, None, MIN_STACK_WORDS, false)
            .unwrap_err();
        assert_eq!(err, KernelError::OutOfMemory);
    }

    #[test]
    fn test_creation_rejects_undersized_static_stack() {
        static mut STACK: [u32; MIN_STACK_WORDS] = [0; MIN_STACK_WORDS];
        let mut s = Scheduler::new();
        let mem = unsafe { &mut *core::ptr::addr_of_mut!(STACK) };
        let err = s
            .create_task(entry, Priority::Low, Some(mem), MIN_STACK_WORDS * 2, false)
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidArgument);
    }

    #[test]
    fn test_priority_monotonicity() {
        // The high-priority task wins from any starting point.
        let mut s = sched_with(&[Priority::Low, Priority::High, Priority::Medium]);
        for start in 0..4 {
            s.current = start;
            assert_eq!(s.schedule(), 2);
        }
    }

    #[test]
    fn test_schedule_is_idempotent_with_distinct_priorities() {
        let mut s = sched_with(&[Priority::Low, Priority::High]);
        let first = s.schedule();
        assert_eq!(first, 2);
        assert_eq!(s.schedule(), first);
        assert_eq!(s.schedule(), first);
    }

    #[test]
    fn test_equal_priority_rotates() {
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.current = 1;
        assert_eq!(s.schedule(), 2);
        assert_eq!(s.schedule(), 1);
        assert_eq!(s.schedule(), 2);
    }

    #[test]
    fn test_idle_is_fallback() {
        let mut s = sched_with(&[Priority::Medium]);
        s.current = 1;
        s.tasks[1].block = BlockState::Timed;
        s.tasks[1].timeout_ticks = 5;
        assert_eq!(s.schedule(), 0);
    }

    #[test]
    fn test_blocked_and_paused_are_never_selected() {
        let mut s = sched_with(&[Priority::High, Priority::Low]);
        s.tasks[1].paused = true;
        static TARGET: u8 = 0;
        s.tasks[2].block = BlockState::Waiting(WaitToken::of(&TARGET));
        assert_eq!(s.schedule(), 0);
    }

    #[test]
    fn test_scheduler_reaches_ring_tail_when_current_blocks() {
        // current = 1 blocks; the walk restarts from idle and must still
        // find the runnable task sitting after it in the ring.
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.current = 1;
        s.tasks[1].block = BlockState::Timed;
        s.tasks[1].timeout_ticks = 1;
        assert_eq!(s.schedule(), 2);
    }

    #[test]
    fn test_delay_wakes_after_exact_tick_count() {
        let mut s = sched_with(&[Priority::Medium]);
        s.mark_started();
        s.current = 1;
        s.delay_current(500);
        s.schedule();
        assert_eq!(s.current, 0);

        for t in 1..=499 {
            run_tick(&mut s);
            assert_eq!(s.tasks[1].block, BlockState::Timed, "still asleep at tick {t}");
        }
        run_tick(&mut s);
        assert_eq!(s.tasks[1].block, BlockState::None);
        assert_eq!(s.current, 1);
    }

    #[test]
    fn test_delay_zero_means_one_tick() {
        let mut s = sched_with(&[Priority::Medium]);
        s.current = 1;
        s.delay_current(0);
        assert_eq!(s.tasks[1].timeout_ticks, 1);
        s.tick();
        assert_eq!(s.tasks[1].block, BlockState::None);
    }

    #[test]
    fn test_paused_timed_task_keeps_timeout() {
        // delay(1000), paused at +100, resumed much later: the remaining
        // 900 ticks elapse only after the resume.
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.mark_started();
        s.current = 1;
        s.delay_current(1000);
        s.schedule();

        for _ in 0..100 {
            run_tick(&mut s);
        }
        assert_eq!(s.tasks[1].timeout_ticks, 900);
        s.pause(tid(1)).unwrap();

        for _ in 0..1900 {
            run_tick(&mut s);
        }
        assert_eq!(s.tasks[1].timeout_ticks, 900);
        assert_eq!(s.tasks[1].block, BlockState::Timed);

        s.resume(tid(1)).unwrap();
        for _ in 0..899 {
            run_tick(&mut s);
        }
        assert_eq!(s.tasks[1].block, BlockState::Timed);
        run_tick(&mut s);
        assert_eq!(s.tasks[1].block, BlockState::None);
    }

    #[test]
    fn test_timeouts_charge_even_before_start() {
        // Scheduling is gated until start, timeout accounting is not.
        let mut s = sched_with(&[Priority::Medium]);
        s.current = 1;
        s.delay_current(3);
        for _ in 0..3 {
            s.tick();
            assert!(!s.take_reschedule());
        }
        assert_eq!(s.tasks[1].block, BlockState::None);
    }

    #[test]
    fn test_round_robin_fairness_over_1000_ticks() {
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.mark_started();
        s.schedule();

        let mut held = [0u32; 2];
        for _ in 0..1000 {
            let running = run_tick(&mut s);
            held[running - 1] += 1;
        }
        let diff = held[0].abs_diff(held[1]);
        assert!(diff <= 2, "unfair split: {held:?}");
    }

    #[test]
    fn test_pause_resume_state_errors() {
        let mut s = sched_with(&[Priority::Medium]);
        assert_eq!(s.resume(tid(1)), Err(KernelError::InvalidState));
        assert_eq!(s.pause(tid(1)), Ok(false));
        assert_eq!(s.pause(tid(1)), Err(KernelError::InvalidState));
        assert_eq!(s.resume(tid(1)), Ok(()));
        assert_eq!(s.pause(tid(9)), Err(KernelError::InvalidArgument));
        assert_eq!(s.pause(tid(0)), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn test_pause_of_running_task_reports_it() {
        let mut s = sched_with(&[Priority::Medium]);
        s.current = 1;
        assert_eq!(s.pause(tid(1)), Ok(true));
    }

    #[test]
    fn test_unblock_picks_highest_priority_waiter() {
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);
        let mut s = sched_with(&[Priority::Low, Priority::High, Priority::Medium]);
        for i in 1..=3 {
            s.tasks[i].block = BlockState::Waiting(token);
        }

        assert!(s.unblock_one(token));
        assert_eq!(s.tasks[2].block, BlockState::None);
        // Only one waiter released per call.
        assert_eq!(s.tasks[1].block, BlockState::Waiting(token));
        assert_eq!(s.tasks[3].block, BlockState::Waiting(token));
    }

    #[test]
    fn test_unblock_tie_goes_to_first_in_ring_order() {
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.tasks[1].block = BlockState::Waiting(token);
        s.tasks[2].block = BlockState::Waiting(token);

        // Ring order from current (idle, 0): 1 then 2.
        s.unblock_one(token);
        assert_eq!(s.tasks[1].block, BlockState::None);
        assert_eq!(s.tasks[2].block, BlockState::Waiting(token));
    }

    #[test]
    fn test_unblock_ignores_other_tokens() {
        static A: u8 = 0;
        static B: u8 = 0;
        let mut s = sched_with(&[Priority::Medium]);
        s.tasks[1].block = BlockState::Waiting(WaitToken::of(&A));
        assert!(!s.unblock_one(WaitToken::of(&B)));
        assert_eq!(s.tasks[1].block, BlockState::Waiting(WaitToken::of(&A)));
    }

    #[test]
    fn test_unblock_reports_preemption_only_for_higher_priority() {
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);

        // Woken priority above the running task's: preempt.
        let mut s = sched_with(&[Priority::Low, Priority::High]);
        s.current = 1;
        s.tasks[2].block = BlockState::Waiting(token);
        assert!(s.unblock_one(token));

        // Equal priority: no preemption.
        let mut s = sched_with(&[Priority::Medium, Priority::Medium]);
        s.current = 1;
        s.tasks[2].block = BlockState::Waiting(token);
        assert!(!s.unblock_one(token));

        // Higher priority but paused: woken, not preempting.
        let mut s = sched_with(&[Priority::Low, Priority::High]);
        s.current = 1;
        s.tasks[2].block = BlockState::Waiting(token);
        s.tasks[2].paused = true;
        assert!(!s.unblock_one(token));
        assert_eq!(s.tasks[2].block, BlockState::None);
    }

    #[test]
    fn test_unblock_reaches_the_running_slot() {
        // A task parks itself and an interrupt-side wake arrives before
        // the pended switch fires: the walk must still find it.
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);
        let mut s = sched_with(&[Priority::Medium]);
        s.current = 1;
        s.tasks[1].block = BlockState::Waiting(token);

        assert!(!s.unblock_one(token), "no preemption of itself");
        assert_eq!(s.tasks[1].block, BlockState::None);
    }

    #[test]
    fn test_wakes_match_releases_with_many_waiters() {
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);
        let mut s = sched_with(&[Priority::Medium, Priority::Medium, Priority::Medium]);
        for i in 1..=3 {
            s.tasks[i].block = BlockState::Waiting(token);
        }

        for expected_awake in 1..=3 {
            s.unblock_one(token);
            let awake = (1..=3)
                .filter(|&i| s.tasks[i].block == BlockState::None)
                .count();
            assert_eq!(awake, expected_awake);
        }
        // Nothing left to wake.
        assert!(!s.unblock_one(token));
    }

    #[test]
    fn test_preemption_on_wake_scenario() {
        // Scenario: H (high) waits on a token, L (low) is running and
        // wakes it. H must be the next task selected.
        static TARGET: u8 = 0;
        let token = WaitToken::of(&TARGET);
        let mut s = sched_with(&[Priority::High, Priority::Low]);
        s.mark_started();
        s.current = 2; // L runs
        s.tasks[1].block = BlockState::Waiting(token);

        assert!(s.unblock_one(token), "wake of H must ask for preemption");
        assert_eq!(s.schedule(), 1);
    }
}

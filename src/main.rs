//! # RondOS Example Firmware
//!
//! Demonstrates the kernel with four tasks coordinating over a sample
//! queue and a pulse semaphore:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `sensor_task` | Medium | Samples every 10 ms, queues readings, pulses the controller every 100th |
//! | `logger_task` | Low | Drains the queue, keeps a running checksum |
//! | `control_task` | High | Sleeps on the pulse semaphore, reacts immediately |
//! | `filter_task` | Medium (FP) | Smooths readings with a floating-point EMA |
//!
//! The controller outranks everything, so a pulse from the sensor preempts
//! it onto the CPU at the release point. Sensor and filter share the
//! medium level and round-robin; the logger mops up in the gaps.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use rondos::config::DEFAULT_STACK_WORDS;
    use rondos::kernel;
    use rondos::queue::{Mode, Queue};
    use rondos::semaphore::Semaphore;
    use rondos::task::Priority;

    // -----------------------------------------------------------------------
    // Shared handles, installed in main() before the scheduler starts
    // -----------------------------------------------------------------------

    static mut SAMPLES: Option<&'static Queue> = None;
    static mut PULSE: Option<&'static Semaphore> = None;

    fn samples() -> &'static Queue {
        unsafe { (*core::ptr::addr_of!(SAMPLES)).unwrap() }
    }

    fn pulse() -> &'static Semaphore {
        unsafe { (*core::ptr::addr_of!(PULSE)).unwrap() }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Periodic producer. Fakes a sensor reading every 10 ms and queues
    /// it; every 100th reading it pulses the controller. A pulse finding
    /// the controller still busy is dropped.
    extern "C" fn sensor_task() -> ! {
        let mut reading: u32 = 0;
        loop {
            kernel::delay(10);
            reading = reading.wrapping_mul(1103515245).wrapping_add(12345);
            samples()
                .put(&reading.to_le_bytes(), Mode::Blocking)
                .ok();
            if reading % 100 == 0 {
                let _ = pulse().release();
            }
        }
    }

    /// Background consumer. Blocks on the queue and folds every reading
    /// into a checksum a debugger can watch.
    extern "C" fn logger_task() -> ! {
        static mut CHECKSUM: u32 = 0;
        let mut buf = [0u8; 4];
        loop {
            if samples().get(&mut buf, Mode::Blocking).is_ok() {
                let value = u32::from_le_bytes(buf);
                unsafe {
                    let sum = core::ptr::addr_of_mut!(CHECKSUM);
                    *sum = (*sum).rotate_left(1) ^ value;
                }
            }
        }
    }

    /// Event handler. Parked on the pulse semaphore almost all the time;
    /// outranks everything else, so a release puts it on the CPU at once.
    extern "C" fn control_task() -> ! {
        loop {
            pulse().acquire();
            // React to the pulse, then briefly back off so a burst of
            // pulses cannot starve the medium tasks.
            kernel::delay(1);
        }
    }

    /// Floating-point consumer: exponential moving average over a synthetic
    /// signal. Created with the FP flag so S16–S31 travel with its frame.
    extern "C" fn filter_task() -> ! {
        let mut ema: f32 = 0.0;
        let mut x: f32 = 0.0;
        loop {
            x += 0.125;
            if x > 1000.0 {
                x = 0.0;
            }
            ema = ema * 0.9 + x * 0.1;
            kernel::delay(20);
        }
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        kernel::init().expect("kernel init failed");

        unsafe {
            SAMPLES = Some(Queue::create(8, 4).expect("queue allocation failed"));
            PULSE = Some(Semaphore::new(1).expect("semaphore allocation failed"));
        }
        // Start the controller parked: take the one permit so the first
        // acquire blocks until the sensor pulses.
        pulse().try_acquire().ok();

        kernel::thread_new(sensor_task, Priority::Medium, None, DEFAULT_STACK_WORDS, false)
            .expect("failed to create sensor_task");
        kernel::thread_new(logger_task, Priority::Low, None, DEFAULT_STACK_WORDS, false)
            .expect("failed to create logger_task");
        kernel::thread_new(control_task, Priority::High, None, DEFAULT_STACK_WORDS, false)
            .expect("failed to create control_task");
        kernel::thread_new(filter_task, Priority::Medium, None, DEFAULT_STACK_WORDS, true)
            .expect("failed to create filter_task");

        // 1 ms tick; does not return.
        kernel::start(cp, 1)
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}

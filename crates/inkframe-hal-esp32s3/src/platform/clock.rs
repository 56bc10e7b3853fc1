use esp_hal::time::Instant;
use inkframe_core::pipeline::Clock;

/// Microseconds since boot from the esp-hal system timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        Instant::now().duration_since_epoch().as_micros()
    }
}

use std::time::Instant;

/// Milliseconds on the control loop's monotonic clock.
pub type Millis = u64;

/// Source of the monotonic timestamp sampled once at each tick boundary.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall-clock backed clock counting milliseconds since it was created.
#[derive(Debug, Clone)]
pub struct TickClock {
    origin: Instant,
}

impl TickClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for TickClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Clock that only moves when told to. Drives simulations and replays.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    pub time_ms: Millis,
}

impl ManualClock {
    pub fn new(time_ms: Millis) -> Self {
        Self { time_ms }
    }

    pub fn reset(&mut self) {
        self.time_ms = 0;
    }

    pub fn advance(&mut self, delta_ms: Millis) {
        self.time_ms = self.time_ms.saturating_add(delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_resets() {
        let mut clock = ManualClock::new(5);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 15);
        clock.reset();
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn tick_clock_is_monotonic() {
        let clock = TickClock::start();
        let first = clock.now_ms();
        assert!(clock.now_ms() >= first);
    }
}

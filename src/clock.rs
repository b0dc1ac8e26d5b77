use std::time::{Duration, Instant};

/// Fixed-timestep pacing for the frame production loops.
///
/// Each tick is nominally `1 / fps` seconds long. [`TickPacer::pace`] sleeps
/// only the remainder of the current tick, so a slow tick is never "paid
/// back" by sleeping longer afterwards. The per-tick sleep is the only
/// designed suspension point of a run and is not a cancellation point.
#[derive(Debug)]
pub struct TickPacer {
    period: Duration,
    tick_start: Instant,
}

impl TickPacer {
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            tick_start: Instant::now(),
        }
    }

    /// Duration of one tick.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep out the remainder of the current tick and begin the next one.
    ///
    /// A tick that already overran its period starts the next one
    /// immediately.
    pub fn pace(&mut self) {
        if let Some(rest) = self.period.checked_sub(self.tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
        self.tick_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_follows_fps() {
        assert_eq!(TickPacer::new(10).period(), Duration::from_millis(100));
        assert_eq!(TickPacer::new(30).period(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn zero_fps_is_clamped() {
        assert_eq!(TickPacer::new(0).period(), Duration::from_secs(1));
    }

    #[test]
    fn pace_completes() {
        let mut pacer = TickPacer::new(1_000);
        pacer.pace();
        pacer.pace();
    }
}

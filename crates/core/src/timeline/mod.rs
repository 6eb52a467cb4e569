use std::time::{Duration, Instant};

/// Time since the current cue started, in seconds.
///
/// `Wall` follows the system clock. `Manual` only moves when advanced and
/// backs offline rendering and tests.
#[derive(Debug, Clone)]
pub enum CueClock {
    Wall { started: Instant },
    Manual { elapsed: f64 },
}

impl Default for CueClock {
    fn default() -> Self {
        Self::wall()
    }
}

impl CueClock {
    pub fn wall() -> Self {
        Self::Wall {
            started: Instant::now(),
        }
    }

    pub fn manual() -> Self {
        Self::Manual { elapsed: 0.0 }
    }

    pub fn elapsed(&self) -> f64 {
        match self {
            Self::Wall { started } => started.elapsed().as_secs_f64(),
            Self::Manual { elapsed } => *elapsed,
        }
    }

    pub fn restart(&mut self) {
        match self {
            Self::Wall { started } => *started = Instant::now(),
            Self::Manual { elapsed } => *elapsed = 0.0,
        }
    }

    /// Moves a manual clock forward; wall clocks ignore this.
    pub fn advance(&mut self, delta: f64) {
        if let Self::Manual { elapsed } = self {
            *elapsed = (*elapsed + delta).max(0.0);
        }
    }
}

/// Fixed-rate tick budget for the render loop.
#[derive(Debug, Clone)]
pub struct TickPacer {
    period: Duration,
    tick_started: Instant,
}

impl TickPacer {
    /// Non-positive or non-finite rates fall back to 20 Hz.
    pub fn new(rate_hz: f64) -> Self {
        let rate_hz = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            20.0
        };
        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz),
            tick_started: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn start_tick(&mut self) {
        self.tick_started = Instant::now();
    }

    /// Time left in the current tick, `None` when the tick overran.
    pub fn remaining(&self) -> Option<Duration> {
        self.period
            .checked_sub(self.tick_started.elapsed())
            .filter(|left| !left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_restarts() {
        let mut clock = CueClock::manual();
        clock.advance(1.5);
        clock.advance(-4.0);
        assert_eq!(clock.elapsed(), 0.0);
        clock.advance(2.25);
        assert_eq!(clock.elapsed(), 2.25);
        clock.restart();
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn wall_clock_ignores_advance() {
        let mut clock = CueClock::wall();
        clock.advance(100.0);
        assert!(clock.elapsed() < 100.0);
    }

    #[test]
    fn pacer_reports_budget_and_overrun() {
        let mut pacer = TickPacer::new(20.0);
        assert_eq!(pacer.period(), Duration::from_millis(50));
        pacer.start_tick();
        assert!(pacer.remaining().is_some());

        let mut fast = TickPacer::new(1_000_000.0);
        fast.start_tick();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(fast.remaining(), None);

        assert_eq!(TickPacer::new(0.0).period(), Duration::from_millis(50));
    }
}

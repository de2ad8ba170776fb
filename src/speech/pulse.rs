/// Default seconds between boundary pulses.
pub const DEFAULT_BOUNDARY_INTERVAL: f32 = 0.1;

/// Fixed-rate pulse generator for audio drivers without word boundary events.
///
/// Emits at most one pulse per [BoundaryPulse::advance] call, so a long frame
/// never produces a burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPulse {
    interval: f32,
    accumulator: f32,
}

impl Default for BoundaryPulse {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY_INTERVAL)
    }
}

impl BoundaryPulse {
    /// Non-positive intervals fall back to the default.
    pub fn new(interval: f32) -> Self {
        let interval = if interval > 0.0 && interval.is_finite() {
            interval
        } else {
            DEFAULT_BOUNDARY_INTERVAL
        };

        Self {
            interval,
            accumulator: 0.0,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Returns true when a pulse is due.
    pub fn advance(&mut self, dt: f32, playing: bool) -> bool {
        if !playing {
            self.reset();
            return false;
        }

        self.accumulator += dt.max(0.0);
        if self.accumulator < self.interval {
            return false;
        }

        self.accumulator = (self.accumulator - self.interval).min(self.interval);
        true
    }
}

//! Wheel speed from pulse edge timing
//!
//! The wheel carries a magnet that closes a reed switch once per rotation.
//! Speed is derived from the interval between consecutive rising edges
//! rather than by counting pulses in a window: that gives low-latency
//! readings at walking pace and needs no zero-speed disambiguation. The
//! first edge only seeds the timestamp; no speed is reported until a
//! full rotation has been timed.

use crate::config::WheelConfig;

const NS_PER_HOUR: f32 = 3_600.0 * 1_000_000_000.0;

/// Which edge the meter is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgePhase {
    /// Sensor inactive, waiting for the magnet to arrive
    WaitingForRise,
    /// Sensor active, waiting for the magnet to pass
    WaitingForFall,
}

/// Edge-timing state machine converting the pulse train into mph
pub struct WheelSpeedMeter {
    circumference_miles: f32,
    phase: EdgePhase,
    last_rise_ns: Option<u64>,
}

impl WheelSpeedMeter {
    pub fn new(wheel: &WheelConfig) -> Self {
        Self {
            circumference_miles: wheel.circumference_miles(),
            phase: EdgePhase::WaitingForRise,
            last_rise_ns: None,
        }
    }

    /// Current phase, so the poll loop can tighten its interval while the
    /// magnet is over the sensor
    pub fn phase(&self) -> EdgePhase {
        self.phase
    }

    /// Feed one sensor sample.
    ///
    /// Returns `Some(mph)` on the rising edge that completes a rotation.
    /// While the bike is stationary no edges arrive and the previous
    /// speed value simply goes stale; there is no timeout here.
    pub fn sample(&mut self, active: bool, now_ns: u64) -> Option<u16> {
        match self.phase {
            EdgePhase::WaitingForRise => {
                if !active {
                    return None;
                }
                self.phase = EdgePhase::WaitingForFall;

                let previous = self.last_rise_ns.replace(now_ns);
                let rotation_ns = now_ns.saturating_sub(previous?);
                if rotation_ns == 0 {
                    return None;
                }

                let rotation_hours = rotation_ns as f32 / NS_PER_HOUR;
                let speed_mph = self.circumference_miles / rotation_hours;
                Some(speed_mph as u16)
            }
            EdgePhase::WaitingForFall => {
                if !active {
                    self.phase = EdgePhase::WaitingForRise;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn meter() -> WheelSpeedMeter {
        WheelSpeedMeter::new(&WheelConfig { diameter_m: 0.74 })
    }

    #[test]
    fn first_pulse_only_seeds() {
        let mut meter = meter();
        assert_eq!(meter.sample(true, 1000 * MS), None);
        assert_eq!(meter.phase(), EdgePhase::WaitingForFall);
    }

    #[test]
    fn two_pulses_half_second_apart() {
        let mut meter = meter();
        meter.sample(true, 0);
        meter.sample(false, 100 * MS);
        // 0.74m wheel: 2.3248m per rotation, 0.5s per rotation = 4.65 m/s
        // = 10.4 mph, truncated
        assert_eq!(meter.sample(true, 500 * MS), Some(10));
    }

    #[test]
    fn no_reading_until_sensor_clears() {
        let mut meter = meter();
        meter.sample(true, 0);
        // Magnet still over the sensor: stays in WaitingForFall, no edge
        assert_eq!(meter.sample(true, 500 * MS), None);
        assert_eq!(meter.sample(true, 1000 * MS), None);
        meter.sample(false, 1100 * MS);
        // Rotation timed from the original rise
        assert_eq!(meter.sample(true, 2000 * MS), Some(2));
    }

    #[test]
    fn long_pause_just_reads_slow() {
        let mut meter = meter();
        meter.sample(true, 0);
        meter.sample(false, 100 * MS);
        // A 30s rotation truncates to 0 mph rather than erroring
        assert_eq!(meter.sample(true, 30_000 * MS), Some(0));
    }

    #[test]
    fn coincident_edges_are_ignored() {
        let mut meter = meter();
        meter.sample(true, 5 * MS);
        meter.sample(false, 5 * MS);
        assert_eq!(meter.sample(true, 5 * MS), None);
    }
}

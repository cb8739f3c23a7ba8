//! Human pedal power averaging
//!
//! The torque sensor reports pedal weight and cadence ~50x a second; the
//! display only wants a steady watts figure. This accumulates samples
//! into a one-second window and publishes the window average:
//!
//! `power = weight_kg * 9.81 * crank_m * cadence_rpm * 2*pi/60`

use core::f32::consts::PI;

use crate::config::CrankConfig;

const GRAVITY: f32 = 9.81;
const WINDOW_NS: u64 = 1_000_000_000;

/// Rolling one-second pedal power average
pub struct PedalPowerMeter {
    crank_length_m: f32,
    sum_weight_x10: u32,
    sum_cadence: u32,
    sample_count: u32,
    window_start_ns: u64,
    latest_w: u16,
}

impl PedalPowerMeter {
    pub fn new(crank: &CrankConfig, now_ns: u64) -> Self {
        Self {
            crank_length_m: crank.length_mm as f32 / 1000.0,
            sum_weight_x10: 0,
            sum_cadence: 0,
            sample_count: 0,
            window_start_ns: now_ns,
            latest_w: 0,
        }
    }

    /// Drop any partial window and the published value
    pub fn reset(&mut self, now_ns: u64) {
        self.sum_weight_x10 = 0;
        self.sum_cadence = 0;
        self.sample_count = 0;
        self.window_start_ns = now_ns;
        self.latest_w = 0;
    }

    /// Add one torque sensor sample to the current window
    pub fn accumulate(&mut self, weight_x10: u16, cadence: u8) {
        self.sum_weight_x10 += weight_x10 as u32;
        self.sum_cadence += cadence as u32;
        self.sample_count += 1;
    }

    /// Close the window if a second has passed and return the latest
    /// published power in whole watts.
    pub fn finalize(&mut self, now_ns: u64) -> u16 {
        if now_ns.saturating_sub(self.window_start_ns) >= WINDOW_NS {
            if self.sample_count > 0 {
                let avg_weight_kg =
                    self.sum_weight_x10 as f32 / self.sample_count as f32 / 10.0;
                let avg_cadence_rpm = self.sum_cadence as f32 / self.sample_count as f32;

                let torque_nm = avg_weight_kg * GRAVITY * self.crank_length_m;
                let power_w = torque_nm * avg_cadence_rpm * (2.0 * PI / 60.0);
                self.latest_w = power_w as u16;
            } else {
                self.latest_w = 0;
            }
            self.sum_weight_x10 = 0;
            self.sum_cadence = 0;
            self.sample_count = 0;
            self.window_start_ns = now_ns;
        }
        self.latest_w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S_1: u64 = 1_000_000_000;

    fn meter() -> PedalPowerMeter {
        PedalPowerMeter::new(&CrankConfig { length_mm: 170 }, 0)
    }

    #[test]
    fn no_samples_publishes_zero() {
        let mut meter = meter();
        assert_eq!(meter.finalize(2 * S_1), 0);
    }

    #[test]
    fn steady_pedaling_average() {
        let mut meter = meter();
        for _ in 0..50 {
            meter.accumulate(200, 60); // 20kg at 60rpm
        }
        // 20kg * 9.81 * 0.17m = 33.35Nm; * 60rpm * 0.10472 = 209.5W
        assert_eq!(meter.finalize(S_1), 209);
    }

    #[test]
    fn window_holds_value_between_closings() {
        let mut meter = meter();
        for _ in 0..10 {
            meter.accumulate(200, 60);
        }
        assert_eq!(meter.finalize(S_1), 209);
        // Mid-window calls keep reporting the published value
        meter.accumulate(0, 0);
        assert_eq!(meter.finalize(S_1 + S_1 / 2), 209);
    }

    #[test]
    fn mixed_samples_are_averaged_not_summed() {
        let mut meter = meter();
        meter.accumulate(100, 30);
        meter.accumulate(300, 90);
        let with_two = meter.finalize(S_1);

        let mut single = PedalPowerMeter::new(&CrankConfig { length_mm: 170 }, 0);
        single.accumulate(200, 60);
        assert_eq!(with_two, single.finalize(S_1));
    }

    #[test]
    fn reset_clears_published_value() {
        let mut meter = meter();
        meter.accumulate(200, 60);
        assert!(meter.finalize(S_1) > 0);
        meter.reset(S_1);
        assert_eq!(meter.finalize(S_1 + S_1 / 2), 0);
    }
}

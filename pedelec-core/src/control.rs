//! Motor current fusion
//!
//! Turns the per-tick sensor snapshot into a single motor current command:
//! pedal torque and throttle are mapped to current independently, fused
//! with `max`, scaled by the assist level, ramp-limited and clamped. The
//! result is only committed to the VESC when it actually changes.

use crate::config::{ControlConfig, ASSIST_LEVEL_FACTORS};
use crate::traits::TorqueReading;

/// Linearly map `value` from `[in_min, in_max]` to `[out_min, out_max]`,
/// clamping to the output range. Inputs below `in_min` therefore map to
/// `out_min` - this is what keeps the motor off below the torque start
/// threshold.
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    if in_max <= in_min {
        return out_min;
    }
    let t = ((value - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
    out_min + t * (out_max - out_min)
}

/// Move `current` towards `target` by at most `step`, never overshooting
pub fn step_towards(current: f32, target: f32, step: f32) -> f32 {
    if current < target {
        (current + step).min(target)
    } else if current > target {
        (current - step).max(target)
    } else {
        current
    }
}

/// Sensor snapshot consumed by one control tick
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlInputs {
    /// Torque sensor sample, `None` when the sensor has gone quiet
    pub torque: Option<TorqueReading>,
    /// Raw throttle ADC reading, for the wiring fault check
    pub throttle_adc: u16,
    /// Calibrated throttle position 0..=1000
    pub throttle: u16,
    /// Rider-selected assist level 0..=5
    pub assist_level: u8,
    /// Brake lever engaged
    pub brakes_active: bool,
}

/// Fusion, ramp and clamp state for the motor current command
///
/// The controller owns the ramp timestamp and the change-detection shadow
/// so it is the single writer for both (the shared record only mirrors
/// the last delivered target for the display).
pub struct MotorCurrentController {
    config: ControlConfig,
    /// The ramped, clamped target currently being applied
    target_a: f32,
    /// Last value actually delivered to the VESC. `None` when the previous
    /// command was reported lost, which forces the next update to re-issue
    /// it even if the target has not moved since.
    delivered_a: Option<f32>,
    /// Monotonic instant of the last ramp evaluation (ns)
    ramp_last_ns: u64,
}

impl MotorCurrentController {
    pub fn new(config: ControlConfig, now_ns: u64) -> Self {
        Self {
            config,
            target_a: 0.0,
            delivered_a: Some(0.0),
            ramp_last_ns: now_ns,
        }
    }

    /// The current ramped target in amps
    pub fn target(&self) -> f32 {
        self.target_a
    }

    /// Tell the controller the last command never reached the VESC.
    ///
    /// The next [`update`](Self::update) re-issues the command even when
    /// the target is otherwise unchanged.
    pub fn delivery_failed(&mut self) {
        self.delivered_a = None;
    }

    /// Run one control tick.
    ///
    /// Returns `Some(amps)` when the target changed (or the previous
    /// command was not delivered) and a `set_current` command must be
    /// issued, `None` otherwise. At most one command per invocation.
    pub fn update(&mut self, inputs: &ControlInputs, now_ns: u64) -> Option<f32> {
        let motor = &self.config.motor;

        // Torque path: weight below the start threshold maps to zero
        let mut torque_current = 0.0f32;
        if let Some(torque) = inputs.torque {
            torque_current = map_range(
                torque.weight_x10 as f32,
                self.config.torque.weight_min_to_start_x10 as f32,
                self.config.torque.weight_max_x10 as f32,
                0.0,
                motor.max_current_limit_a,
            );
            let level = (inputs.assist_level as usize).min(ASSIST_LEVEL_FACTORS.len() - 1);
            torque_current *= ASSIST_LEVEL_FACTORS[level];
        }

        // Throttle path: an ADC reading above the fail-safe ceiling means
        // a broken wire or shorted sensor, so the throttle contributes zero
        let mut throttle_current = 0.0f32;
        if self.config.throttle.enabled
            && inputs.throttle_adc < self.config.throttle.over_max_error_adc
        {
            throttle_current = map_range(
                inputs.throttle as f32,
                0.0,
                1000.0,
                0.0,
                motor.max_current_limit_a,
            );
        }

        // Either source alone can drive the motor
        let mut raw_target = torque_current.max(throttle_current);

        // Currents below the start threshold only make the motor vibrate
        if raw_target < motor.min_current_start_a {
            raw_target = 0.0;
        }

        // Assist level 0 is the kill switch
        if inputs.assist_level == 0 {
            raw_target = 0.0;
        }

        // Ramp limit: down-ramps are faster than up-ramps
        let ramp_time_s = if raw_target > self.target_a {
            motor.ramp_up_time_s
        } else {
            motor.ramp_down_time_s
        };
        let elapsed_s = now_ns.saturating_sub(self.ramp_last_ns) as f32 / 1_000_000_000.0;
        self.ramp_last_ns = now_ns;
        // A non-positive ramp time means an instant step
        let step_a = if ramp_time_s > 0.0 {
            elapsed_s / ramp_time_s
        } else {
            f32::INFINITY
        };
        self.target_a = step_towards(self.target_a, raw_target, step_a);

        self.target_a = self.target_a.clamp(0.0, motor.max_current_limit_a);

        // Brake override comes after ramping on purpose: releasing torque
        // ramps, pulling the brake cuts
        if inputs.brakes_active {
            self.target_a = 0.0;
        }

        if Some(self.target_a) != self.delivered_a {
            self.delivered_a = Some(self.target_a);
            Some(self.target_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControlConfig, MotorConfig};
    use proptest::prelude::*;

    const MS_20: u64 = 20_000_000;
    const S_1: u64 = 1_000_000_000;

    fn controller() -> MotorCurrentController {
        MotorCurrentController::new(ControlConfig::default(), 0)
    }

    fn torque_inputs(weight_x10: u16, assist_level: u8) -> ControlInputs {
        ControlInputs {
            torque: Some(TorqueReading {
                weight_x10,
                cadence: 60,
            }),
            assist_level,
            ..Default::default()
        }
    }

    #[test]
    fn map_range_clamps_both_ends() {
        assert_eq!(map_range(-5.0, 0.0, 10.0, 0.0, 30.0), 0.0);
        assert_eq!(map_range(5.0, 0.0, 10.0, 0.0, 30.0), 15.0);
        assert_eq!(map_range(50.0, 0.0, 10.0, 0.0, 30.0), 30.0);
    }

    #[test]
    fn step_towards_never_overshoots() {
        assert_eq!(step_towards(0.0, 10.0, 3.0), 3.0);
        assert_eq!(step_towards(9.0, 10.0, 3.0), 10.0);
        assert_eq!(step_towards(10.0, 0.0, 4.0), 6.0);
        assert_eq!(step_towards(1.0, 0.0, 4.0), 0.0);
        assert_eq!(step_towards(5.0, 5.0, 4.0), 5.0);
    }

    #[test]
    fn torque_below_start_threshold_gives_no_assist() {
        let mut ctrl = controller();
        // Weight 3.9kg is below the 4.0kg start threshold
        let cmd = ctrl.update(&torque_inputs(39, 3), S_1);
        assert_eq!(ctrl.target(), 0.0);
        assert!(cmd.is_none());
    }

    #[test]
    fn assist_level_zero_overrides_all_power_sources() {
        let mut ctrl = controller();
        // Ramp well up first
        ctrl.update(&torque_inputs(400, 3), 10 * S_1);
        assert_eq!(ctrl.target(), 30.0);

        // Level 0 with full pedal weight and full throttle zeroes the raw
        // target, but the cut still rides the down ramp: a 20ms tick of
        // the 0.04s/A ramp moves 0.5A
        let mut inputs = torque_inputs(400, 0);
        inputs.throttle = 1000;
        inputs.throttle_adc = 30000;
        ctrl.update(&inputs, 10 * S_1 + MS_20);
        assert!((ctrl.target() - 29.5).abs() < 1e-3);

        // 30A * 0.04s/A = 1.2s to reach zero
        ctrl.update(&inputs, 12 * S_1);
        assert_eq!(ctrl.target(), 0.0);
    }

    #[test]
    fn brakes_force_zero_in_one_tick() {
        let mut ctrl = controller();
        ctrl.update(&torque_inputs(400, 3), 10 * S_1);
        assert!(ctrl.target() > 0.0);

        let mut inputs = torque_inputs(400, 3);
        inputs.brakes_active = true;
        // Brake override beats ramping even over a tiny elapsed time
        let cmd = ctrl.update(&inputs, 10 * S_1 + MS_20);
        assert_eq!(ctrl.target(), 0.0);
        assert_eq!(cmd, Some(0.0));
    }

    #[test]
    fn minimum_current_guard_zeroes_small_targets() {
        let mut ctrl = controller();
        // Weight 4.6kg, assist 1: maps to 0.5A * 0.5 well below the 2A floor
        ctrl.update(&torque_inputs(46, 1), 10 * S_1);
        assert_eq!(ctrl.target(), 0.0);
    }

    #[test]
    fn torque_sensor_absent_leaves_throttle_in_charge() {
        let mut ctrl = controller();
        let inputs = ControlInputs {
            torque: None,
            throttle_adc: 30000,
            throttle: 500,
            assist_level: 3,
            brakes_active: false,
        };
        ctrl.update(&inputs, 10 * S_1);
        // Throttle 50% maps to 15A, reachable within 10s of up-ramp
        assert!((ctrl.target() - 15.0).abs() < 1e-3);
    }

    #[test]
    fn throttle_adc_over_ceiling_contributes_nothing() {
        let mut ctrl = controller();
        let inputs = ControlInputs {
            torque: None,
            throttle_adc: 60000,
            throttle: 1000,
            assist_level: 3,
            brakes_active: false,
        };
        ctrl.update(&inputs, 10 * S_1);
        assert_eq!(ctrl.target(), 0.0);
    }

    #[test]
    fn full_torque_assist_three_ramps_to_limit() {
        let mut ctrl = controller();
        // 40kg at assist 3: 30A * 2.0 = 60A raw, clamped at the 30A limit.
        // One 20ms tick of the 0.05s/A up-ramp moves 0.4A.
        let cmd = ctrl.update(&torque_inputs(400, 3), MS_20);
        assert!((ctrl.target() - 0.4).abs() < 1e-4);
        assert_eq!(cmd, Some(ctrl.target()));

        // 30A * 0.05s/A = 1.5s to reach the limit
        ctrl.update(&torque_inputs(400, 3), MS_20 + 2 * S_1);
        assert_eq!(ctrl.target(), 30.0);
    }

    #[test]
    fn ramp_down_is_faster_than_ramp_up() {
        let mut up = controller();
        let up_cmd = up.update(&torque_inputs(400, 3), MS_20).unwrap();

        let mut down = controller();
        down.update(&torque_inputs(400, 3), 10 * S_1); // reach 30A
        let before = down.target();
        down.update(&torque_inputs(0, 3), 10 * S_1 + MS_20);
        let down_step = before - down.target();

        // Same 20ms elapsed: 0.4A up vs 0.5A down
        assert!(down_step > up_cmd);
    }

    #[test]
    fn unchanged_target_issues_no_second_command() {
        let mut ctrl = controller();
        let first = ctrl.update(&torque_inputs(400, 3), MS_20);
        assert!(first.is_some());

        // Same inputs, zero elapsed time: no movement, no command
        let second = ctrl.update(&torque_inputs(400, 3), MS_20);
        assert_eq!(ctrl.target(), first.unwrap());
        assert!(second.is_none());
    }

    #[test]
    fn failed_delivery_is_reissued_next_tick() {
        let mut ctrl = controller();
        let first = ctrl.update(&torque_inputs(400, 3), MS_20).unwrap();

        // Unchanged target and zero elapsed time would normally stay
        // silent, but a lost command must go out again
        ctrl.delivery_failed();
        assert_eq!(ctrl.update(&torque_inputs(400, 3), MS_20), Some(first));

        // Once delivered, silence resumes
        assert!(ctrl.update(&torque_inputs(400, 3), MS_20).is_none());
    }

    #[test]
    fn lost_brake_cut_is_reissued_while_lever_held() {
        let mut ctrl = controller();
        ctrl.update(&torque_inputs(400, 3), 10 * S_1);
        assert_eq!(ctrl.target(), 30.0);

        let mut inputs = torque_inputs(400, 3);
        inputs.brakes_active = true;
        assert_eq!(ctrl.update(&inputs, 10 * S_1 + MS_20), Some(0.0));

        // The zero never made it out; holding the brake must not leave
        // the last ramp current standing
        ctrl.delivery_failed();
        assert_eq!(ctrl.update(&inputs, 10 * S_1 + 2 * MS_20), Some(0.0));
    }

    #[test]
    fn ramp_timestamp_updates_even_when_idle() {
        let mut ctrl = controller();
        // Two seconds of no pedal input must not bank ramp credit
        ctrl.update(&ControlInputs::default(), 2 * S_1);
        // The next 20ms tick may only move one tick's worth
        ctrl.update(&torque_inputs(400, 3), 2 * S_1 + MS_20);
        assert!(ctrl.target() <= 0.4 + 1e-4);
    }

    proptest! {
        #[test]
        fn target_always_within_limits(
            ticks in proptest::collection::vec(
                (0u16..1200, any::<u16>(), 0u16..=1000, 0u8..=5, any::<bool>(), 0u64..S_1),
                1..50,
            )
        ) {
            let config = ControlConfig::default();
            let limit = config.motor.max_current_limit_a;
            let down_time = config.motor.ramp_down_time_s;
            let mut ctrl = MotorCurrentController::new(config, 0);
            let mut now_ns = 0u64;

            for (weight, adc, throttle, assist, brakes, elapsed) in ticks {
                now_ns += elapsed;
                let inputs = ControlInputs {
                    torque: Some(TorqueReading { weight_x10: weight, cadence: 60 }),
                    throttle_adc: adc,
                    throttle,
                    assist_level: assist,
                    brakes_active: brakes,
                };
                let before = ctrl.target();
                ctrl.update(&inputs, now_ns);
                let after = ctrl.target();

                prop_assert!((0.0..=limit).contains(&after));
                if !brakes {
                    // Per-tick movement is bounded by the faster (down) ramp
                    let max_step = elapsed as f32 / 1e9 / down_time + 1e-3;
                    prop_assert!((after - before).abs() <= max_step);
                }
            }
        }
    }
}

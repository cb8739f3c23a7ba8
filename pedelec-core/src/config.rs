//! Static configuration types
//!
//! All tuning constants live here. The firmware builds a [`ControlConfig`]
//! once at startup and hands it to the control loop; nothing is persisted.

use core::f32::consts::PI;

/// Rider-selectable assist levels 0..=5
pub const MAX_ASSIST_LEVEL: u8 = 5;

/// Motor current multiplier per assist level. Level 0 disables the motor.
pub const ASSIST_LEVEL_FACTORS: [f32; 6] = [0.0, 0.5, 1.0, 2.0, 3.0, 5.0];

/// Torque sensor input range
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TorqueConfig {
    /// Minimum pedal weight (kg x10) before any assist starts.
    /// Guards against false startups from resting a foot on a pedal.
    pub weight_min_to_start_x10: u16,
    /// Pedal weight (kg x10) that maps to the full current limit
    pub weight_max_x10: u16,
}

impl Default for TorqueConfig {
    fn default() -> Self {
        Self {
            weight_min_to_start_x10: 40,
            weight_max_x10: 400,
        }
    }
}

/// Throttle input configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThrottleConfig {
    /// Whether the throttle contributes to the current target at all
    pub enabled: bool,
    /// Raw ADC readings at or above this value indicate a wiring fault;
    /// the throttle contribution is forced to zero.
    pub over_max_error_adc: u16,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            over_max_error_adc: 58000,
        }
    }
}

/// Motor current limits and ramp times
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    /// Targets below this are forced to zero; very small currents make
    /// the motor vibrate without producing useful torque.
    pub min_current_start_a: f32,
    /// Absolute current ceiling (amps)
    pub max_current_limit_a: f32,
    /// Seconds to raise the target by one ampere
    pub ramp_up_time_s: f32,
    /// Seconds to lower the target by one ampere. Kept shorter than the
    /// up ramp so assist dies quickly when the rider backs off.
    pub ramp_down_time_s: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            min_current_start_a: 2.0,
            max_current_limit_a: 30.0,
            ramp_up_time_s: 0.05,
            ramp_down_time_s: 0.04,
        }
    }
}

/// Wheel geometry for speed calculation
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelConfig {
    /// Outer wheel diameter in meters
    pub diameter_m: f32,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self { diameter_m: 0.74 }
    }
}

const METERS_PER_MILE: f32 = 1609.344;

impl WheelConfig {
    /// Distance travelled per wheel rotation, in miles
    pub fn circumference_miles(&self) -> f32 {
        self.diameter_m * PI / METERS_PER_MILE
    }
}

/// Crank arm geometry for human power calculation
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrankConfig {
    /// Crank arm length in millimeters
    pub length_mm: u16,
}

impl Default for CrankConfig {
    fn default() -> Self {
        Self { length_mm: 170 }
    }
}

/// Everything the motor control loop needs
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlConfig {
    pub torque: TorqueConfig,
    pub throttle: ThrottleConfig,
    pub motor: MotorConfig,
}

//! Shared bike telemetry record
//!
//! One [`BikeState`] instance lives for the whole power-on cycle and is
//! shared between the control, VESC, display and wheel speed tasks. Each
//! field has a single writing task; see the field docs.

/// VESC fault codes as reported in `COMM_GET_VALUES`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VescFault {
    #[default]
    None,
    OverVoltage,
    UnderVoltage,
    DrvFault,
    AbsOverCurrent,
    OverTempFet,
    OverTempMotor,
    /// Fault code this firmware does not know by name
    Other(u8),
}

impl VescFault {
    /// Decode the wire representation
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::OverVoltage,
            2 => Self::UnderVoltage,
            3 => Self::DrvFault,
            4 => Self::AbsOverCurrent,
            5 => Self::OverTempFet,
            6 => Self::OverTempMotor,
            other => Self::Other(other),
        }
    }

    /// Wire representation, for the display link
    pub fn code(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::OverVoltage => 1,
            Self::UnderVoltage => 2,
            Self::DrvFault => 3,
            Self::AbsOverCurrent => 4,
            Self::OverTempFet => 5,
            Self::OverTempMotor => 6,
            Self::Other(code) => *code,
        }
    }
}

/// Live bike telemetry and control targets
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BikeState {
    /// Rider-selected assist level 0..=5. Written by the display link task.
    pub assist_level: u8,
    /// Ramped, clamped current command currently applied. Written by the
    /// motor control task.
    pub motor_current_target: f32,
    /// Shadow copy of the last target actually sent to the VESC, so the
    /// serial command is only issued on change.
    pub previous_motor_current_target: f32,
    /// Last sampled pedal weight (kg x10). Written by the motor control task.
    pub torque_weight_x10: u16,
    /// Last sampled pedal cadence (rpm). Written by the motor control task.
    pub cadence: u8,
    /// True while the brake sensor reports engaged
    pub brakes_are_active: bool,
    /// Battery voltage from the VESC (volts). Written by the VESC task.
    pub battery_voltage: f32,
    /// Battery current from the VESC (amps). Written by the VESC task.
    pub battery_current: f32,
    /// Motor phase current from the VESC (amps). Written by the VESC task.
    pub motor_current: f32,
    /// Derived `battery_voltage * battery_current` (watts), refreshed by
    /// the VESC task right after each telemetry poll.
    pub motor_power: f32,
    /// Motor temperature sensor reading (deg C x10)
    pub motor_temperature_x10: i16,
    /// Wheel speed (mph, truncated). Written by the wheel speed task.
    pub speed_mph: u16,
    /// Rider pedal power (watts), averaged over one second
    pub human_power_w: u16,
    /// Last fault code reported by the VESC
    pub vesc_fault: VescFault,
}

impl BikeState {
    /// All-neutral startup state
    pub const fn new() -> Self {
        Self {
            assist_level: 0,
            motor_current_target: 0.0,
            previous_motor_current_target: 0.0,
            torque_weight_x10: 0,
            cadence: 0,
            brakes_are_active: false,
            battery_voltage: 0.0,
            battery_current: 0.0,
            motor_current: 0.0,
            motor_power: 0.0,
            motor_temperature_x10: 0,
            speed_mph: 0,
            human_power_w: 0,
            vesc_fault: VescFault::None,
        }
    }
}

impl Default for BikeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_code_roundtrip() {
        for code in 0..=10u8 {
            assert_eq!(VescFault::from_code(code).code(), code);
        }
    }

    #[test]
    fn startup_state_is_neutral() {
        let state = BikeState::new();
        assert_eq!(state.assist_level, 0);
        assert_eq!(state.motor_current_target, 0.0);
        assert_eq!(state.vesc_fault, VescFault::None);
    }
}

//! Sensor and collaborator traits
//!
//! The control loop consumes already-scaled sensor values through these
//! traits; ADC handling, CAN framing and pin configuration belong to the
//! firmware crate's adapters.

/// One torque sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TorqueReading {
    /// Pedal weight in kg x10
    pub weight_x10: u16,
    /// Pedal cadence in rpm
    pub cadence: u8,
}

/// Pedal torque sensor (CAN-attached on the Bafang M500)
pub trait TorqueSensor {
    /// Latest reading, or `None` when the sensor has not reported recently
    fn value(&mut self) -> Option<TorqueReading>;
}

/// Hand throttle (hall sensor on an ADC pin)
pub trait Throttle {
    /// Raw ADC reading, used for the wiring fault check
    fn adc_value(&mut self) -> u16;
    /// Calibrated throttle position, 0..=1000
    fn value(&mut self) -> u16;
}

/// Brake lever sensor
pub trait BrakeSensor {
    fn is_active(&mut self) -> bool;
}

/// Motor temperature sensor
pub trait MotorTemperatureSensor {
    /// Temperature in deg C x10
    fn value_x10(&mut self) -> i16;
}

/// Wheel speed sensor: a digital line toggled once per rotation
pub trait WheelSpeedSensor {
    fn is_active(&mut self) -> bool;
}

//! Board sensor adapters
//!
//! Thin wrappers turning pins and peripherals into the sensor traits the
//! control loop consumes. Scaling and fault thresholds live here; the
//! control logic only ever sees calibrated values.

use embassy_stm32::adc::{Adc, AnyAdcChannel};
use embassy_stm32::gpio::Input;
use embassy_stm32::peripherals::ADC1;

use pedelec_core::traits::{
    BrakeSensor, MotorTemperatureSensor, Throttle, TorqueReading, WheelSpeedSensor,
};

/// CAN id the Bafang M500 torque sensor broadcasts on
pub const TORQUE_CAN_ID: u16 = 0x1f1;

/// Decode a torque sensor CAN frame: weight (kg x10) little-endian u16,
/// cadence (rpm) u8
pub fn parse_torque_frame(data: &[u8]) -> Option<TorqueReading> {
    if data.len() < 3 {
        return None;
    }
    Some(TorqueReading {
        weight_x10: u16::from_le_bytes([data[0], data[1]]),
        cadence: data[2],
    })
}

/// Throttle hall sensor and motor NTC, both on ADC1
pub struct AnalogInputs {
    adc: Adc<'static, ADC1>,
    throttle_pin: AnyAdcChannel<ADC1>,
    ntc_pin: AnyAdcChannel<ADC1>,
    /// Throttle calibration, in the 16-bit domain the thresholds were
    /// measured in (idle reading plus margin)
    throttle_min: u16,
    /// Full throttle reading minus margin
    throttle_max: u16,
    last_temp_x10: i16,
}

impl AnalogInputs {
    pub fn new(
        adc: Adc<'static, ADC1>,
        throttle_pin: AnyAdcChannel<ADC1>,
        ntc_pin: AnyAdcChannel<ADC1>,
    ) -> Self {
        Self {
            adc,
            throttle_pin,
            ntc_pin,
            throttle_min: 17500,
            throttle_max: 50500,
            last_temp_x10: 0,
        }
    }
}

impl Throttle for AnalogInputs {
    fn adc_value(&mut self) -> u16 {
        // The 12-bit sample is widened to the 16-bit range the calibration
        // and the wiring-fault ceiling are expressed in
        self.adc.blocking_read(&mut self.throttle_pin) << 4
    }

    fn value(&mut self) -> u16 {
        let raw = self.adc_value();
        let clamped = raw.clamp(self.throttle_min, self.throttle_max);
        let span = (self.throttle_max - self.throttle_min) as u32;
        ((clamped - self.throttle_min) as u32 * 1000 / span) as u16
    }
}

/// 10K NTC (B=3950) with 10K pullup: (resistance_ohms, temperature_c * 10)
const NTC_TABLE: &[(u32, i16)] = &[
    (55_300, -100), // -10C
    (32_700, 0),    // 0C
    (19_900, 100),  // 10C
    (12_500, 200),  // 20C
    (10_000, 250),  // 25C (R0)
    (8_000, 300),   // 30C
    (5_300, 400),   // 40C
    (3_600, 500),   // 50C
    (2_500, 600),   // 60C
    (1_750, 700),   // 70C
    (1_260, 800),   // 80C
    (920, 900),     // 90C
    (680, 1000),    // 100C
    (510, 1100),    // 110C
    (390, 1200),    // 120C
];

const NTC_PULLUP_OHMS: u32 = 10_000;
const ADC_MAX: u16 = 4096;

/// Convert an ADC reading to NTC resistance; `None` on open/short circuit
fn adc_to_resistance(adc_value: u16) -> Option<u32> {
    if adc_value >= ADC_MAX - 10 || adc_value < 10 {
        return None;
    }
    let numerator = NTC_PULLUP_OHMS as u64 * adc_value as u64;
    let denominator = (ADC_MAX - adc_value) as u64;
    Some((numerator / denominator) as u32)
}

/// Interpolate the NTC table; `None` when outside the table range
fn resistance_to_temp_x10(resistance: u32) -> Option<i16> {
    if resistance > NTC_TABLE[0].0 || resistance < NTC_TABLE[NTC_TABLE.len() - 1].0 {
        return None;
    }

    for window in NTC_TABLE.windows(2) {
        let (r_high, t_low) = window[0];
        let (r_low, t_high) = window[1];

        if resistance <= r_high && resistance >= r_low {
            let r_range = r_high - r_low;
            let t_range = t_high - t_low;
            let r_offset = r_high - resistance;
            return Some(t_low + (t_range as i32 * r_offset as i32 / r_range as i32) as i16);
        }
    }

    None
}

impl MotorTemperatureSensor for AnalogInputs {
    fn value_x10(&mut self) -> i16 {
        let raw = self.adc.blocking_read(&mut self.ntc_pin);
        if let Some(temp_x10) = adc_to_resistance(raw).and_then(resistance_to_temp_x10) {
            self.last_temp_x10 = temp_x10;
        }
        // A faulted sensor keeps reporting the last plausible reading
        self.last_temp_x10
    }
}

/// Brake lever switch, closed to ground when pulled
pub struct BrakeLever {
    pin: Input<'static>,
}

impl BrakeLever {
    pub fn new(pin: Input<'static>) -> Self {
        Self { pin }
    }
}

impl BrakeSensor for BrakeLever {
    fn is_active(&mut self) -> bool {
        self.pin.is_low()
    }
}

/// Wheel reed switch, closed to ground once per rotation
pub struct WheelSensor {
    pin: Input<'static>,
}

impl WheelSensor {
    pub fn new(pin: Input<'static>) -> Self {
        Self { pin }
    }
}

impl WheelSpeedSensor for WheelSensor {
    fn is_active(&mut self) -> bool {
        self.pin.is_low()
    }
}

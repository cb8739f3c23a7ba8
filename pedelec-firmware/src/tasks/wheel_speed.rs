//! Wheel speed polling task
//!
//! Polls the reed switch and feeds edge timestamps to the speed meter.
//! The poll tightens to 1ms while the magnet is over the sensor so the
//! release edge is not missed at speed.

use defmt::*;
use embassy_time::Timer;

use pedelec_core::config::WheelConfig;
use pedelec_core::speed::{EdgePhase, WheelSpeedMeter};
use pedelec_core::traits::WheelSpeedSensor;

use crate::channels::with_state;
use crate::sensors::WheelSensor;
use crate::tasks::now_ns;

/// Wheel speed task - reed switch edge timing
#[embassy_executor::task]
pub async fn wheel_speed_task(mut sensor: WheelSensor) {
    info!("Wheel speed task started");

    let mut meter = WheelSpeedMeter::new(&WheelConfig::default());

    loop {
        let active = sensor.is_active();
        if let Some(mph) = meter.sample(active, now_ns()) {
            trace!("Wheel speed {} mph", mph);
            with_state(|s| s.speed_mph = mph);
        }

        match meter.phase() {
            EdgePhase::WaitingForRise => Timer::after_millis(10).await,
            EdgePhase::WaitingForFall => Timer::after_millis(1).await,
        }
    }
}

//! Motor control tick
//!
//! Samples every rider input each 20ms, runs the current fusion
//! controller and hands any changed target to the VESC task over the
//! command channel.

use defmt::*;
use embassy_time::{Duration, Ticker};

use pedelec_core::config::{ControlConfig, CrankConfig};
use pedelec_core::control::{ControlInputs, MotorCurrentController};
use pedelec_core::power::PedalPowerMeter;
use pedelec_core::traits::{BrakeSensor, MotorTemperatureSensor, Throttle};

use crate::channels::{recent_torque, with_state, VescCommand, VESC_CMD};
use crate::sensors::{AnalogInputs, BrakeLever};
use crate::tasks::now_ns;

/// Control loop period
const CONTROL_PERIOD: Duration = Duration::from_millis(20);

/// Torque samples older than this are treated as sensor-absent
const TORQUE_STALE: Duration = Duration::from_millis(100);

/// Motor control task - the 20ms rider-input to current-target loop
#[embassy_executor::task]
pub async fn motor_control_task(mut analog: AnalogInputs, mut brake: BrakeLever) {
    info!("Motor control task started");

    let now = now_ns();
    let config = ControlConfig::default();
    let mut controller = MotorCurrentController::new(config, now);
    let mut power_meter = PedalPowerMeter::new(&CrankConfig::default(), now);
    let mut brake_was_active = false;
    let mut brake_pending = false;

    let mut ticker = Ticker::every(CONTROL_PERIOD);

    loop {
        ticker.next().await;

        let torque = recent_torque(TORQUE_STALE);
        let throttle_adc = analog.adc_value();
        let throttle = analog.value();
        let motor_temp_x10 = analog.value_x10();
        let brakes_active = brake.is_active();

        // The VESC gets told to coast the moment the lever is pulled.
        // A full queue keeps the command pending so it goes out on a
        // later tick; the controller's own brake override keeps the
        // target pinned to zero for as long as the lever is held.
        if brakes_active && !brake_was_active {
            brake_pending = true;
        }
        brake_was_active = brakes_active;
        if brake_pending {
            brake_pending = VESC_CMD.try_send(VescCommand::Brake).is_err();
            if brake_pending {
                warn!("VESC command queue full, brake command still pending");
            }
        }

        let assist_level = with_state(|s| s.assist_level);
        let inputs = ControlInputs {
            torque,
            throttle_adc,
            throttle,
            assist_level,
            brakes_active,
        };

        let now = now_ns();
        let command = controller.update(&inputs, now);

        if let Some(reading) = torque {
            power_meter.accumulate(reading.weight_x10, reading.cadence);
        }
        let human_power_w = power_meter.finalize(now);

        let mut delivered = None;
        if let Some(amps) = command {
            trace!("Motor current target {} A", amps);
            if VESC_CMD.try_send(VescCommand::SetCurrent(amps)).is_ok() {
                delivered = Some(amps);
            } else {
                // The controller re-issues the command next tick
                warn!("VESC command queue full, current target deferred");
                controller.delivery_failed();
            }
        }

        with_state(|s| {
            match torque {
                Some(reading) => {
                    s.torque_weight_x10 = reading.weight_x10;
                    s.cadence = reading.cadence;
                }
                None => {
                    s.torque_weight_x10 = 0;
                    s.cadence = 0;
                }
            }
            s.brakes_are_active = brakes_active;
            s.motor_temperature_x10 = motor_temp_x10;
            s.human_power_w = human_power_w;
            s.motor_current_target = controller.target();
            if let Some(amps) = delivered {
                s.previous_motor_current_target = amps;
            }
        });
    }
}

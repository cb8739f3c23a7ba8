//! Torque sensor CAN receive task
//!
//! The bottom bracket torque sensor broadcasts weight and cadence on the
//! CAN bus roughly every 20ms. Each frame is timestamped on arrival so
//! the control loop can reject stale samples if the sensor drops off the
//! bus.

use defmt::*;
use embassy_stm32::can::Can;
use embedded_can::Id;

use crate::channels::publish_torque;
use crate::sensors::{parse_torque_frame, TORQUE_CAN_ID};

/// Torque RX task - drains the CAN receive FIFO
#[embassy_executor::task]
pub async fn torque_rx_task(mut can: Can<'static>) {
    info!("Torque sensor task started");

    loop {
        match can.read().await {
            Ok(envelope) => {
                let frame = envelope.frame;
                let id = match frame.header().id() {
                    Id::Standard(id) => id.as_raw(),
                    Id::Extended(_) => continue,
                };
                if id != TORQUE_CAN_ID {
                    continue;
                }
                match parse_torque_frame(frame.data()) {
                    Some(reading) => publish_torque(reading),
                    None => warn!("Short torque frame dropped"),
                }
            }
            Err(_) => warn!("CAN bus error"),
        }
    }
}

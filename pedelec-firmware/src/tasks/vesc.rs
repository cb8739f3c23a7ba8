//! VESC link task
//!
//! Owns the motor controller UART. Sends the keep-alive and telemetry
//! poll on a fixed 500ms cadence and forwards current commands from the
//! control loop as they arrive. The heartbeat never waits on anything
//! else: the VESC cuts power one second after the last alive packet.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_stm32::usart::BufferedUart;
use embassy_time::{with_timeout, Duration, Ticker};
use embedded_io_async::{Read, Write};

use pedelec_core::state::VescFault;
use pedelec_protocol::vesc::{
    encode_alive, encode_get_values, encode_set_current, encode_set_current_brake, Telemetry,
    VescFrameParser,
};

use crate::channels::{with_state, VescCommand, VESC_CMD};

/// Keep-alive and telemetry poll period
const HEARTBEAT_PERIOD: Duration = Duration::from_millis(500);

/// How long to wait for a telemetry reply before giving up on this cycle
const REPLY_TIMEOUT: Duration = Duration::from_millis(100);

/// VESC task - heartbeat, telemetry polling and current commands
#[embassy_executor::task]
pub async fn vesc_task(mut uart: BufferedUart<'static>) {
    info!("VESC task started");

    let mut ticker = Ticker::every(HEARTBEAT_PERIOD);
    let mut parser = VescFrameParser::new();

    loop {
        match select(ticker.next(), VESC_CMD.receive()).await {
            Either::First(()) => {
                if uart.write_all(&encode_alive()).await.is_err() {
                    warn!("VESC alive write failed");
                    continue;
                }
                if uart.write_all(&encode_get_values()).await.is_err() {
                    warn!("VESC values request write failed");
                    continue;
                }
                match with_timeout(REPLY_TIMEOUT, read_telemetry(&mut uart, &mut parser)).await {
                    Ok(Some(telemetry)) => apply_telemetry(&telemetry),
                    Ok(None) => warn!("VESC UART read failed"),
                    Err(_) => trace!("VESC telemetry reply timed out"),
                }
            }
            Either::Second(command) => {
                let packet = match command {
                    VescCommand::SetCurrent(amps) => encode_set_current(amps),
                    // Zero brake current releases the motor to coast
                    VescCommand::Brake => encode_set_current_brake(0.0),
                };
                if uart.write_all(&packet).await.is_err() {
                    warn!("VESC command write failed");
                }
            }
        }
    }
}

/// Read bytes until a complete values frame decodes
async fn read_telemetry(
    uart: &mut BufferedUart<'static>,
    parser: &mut VescFrameParser,
) -> Option<Telemetry> {
    let mut chunk = [0u8; 32];
    loop {
        let n = uart.read(&mut chunk).await.ok()?;
        for &byte in &chunk[..n] {
            match parser.feed(byte) {
                Ok(Some(payload)) => match Telemetry::parse(&payload) {
                    Ok(telemetry) => return Some(telemetry),
                    // Some other frame type; keep reading
                    Err(_) => {}
                },
                Ok(None) => {}
                // The parser resynchronises on the next start byte
                Err(_) => {}
            }
        }
    }
}

fn apply_telemetry(telemetry: &Telemetry) {
    with_state(|s| {
        s.battery_voltage = telemetry.input_voltage_v;
        s.battery_current = telemetry.input_current_a;
        s.motor_current = telemetry.motor_current_a;
        s.motor_power = telemetry.input_voltage_v * telemetry.input_current_a;
        s.vesc_fault = VescFault::from_code(telemetry.fault_code);
    });
    if telemetry.fault_code != 0 {
        warn!("VESC fault code {}", telemetry.fault_code);
    }
}

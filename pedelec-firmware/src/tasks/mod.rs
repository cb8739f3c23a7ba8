//! Embassy tasks
//!
//! Each periodic activity from the original cooperative loop is its own
//! task with its own `Ticker`, so a slow peer can never starve the VESC
//! heartbeat.

mod display_link;
mod motor_control;
mod torque_rx;
mod vesc;
mod wheel_speed;

#[cfg(feature = "debug-csv-log")]
mod csv_log;

pub use display_link::{display_rx_task, display_tx_task};
pub use motor_control::motor_control_task;
pub use torque_rx::torque_rx_task;
pub use vesc::vesc_task;
pub use wheel_speed::wheel_speed_task;

#[cfg(feature = "debug-csv-log")]
pub use csv_log::csv_log_task;

use embassy_time::Instant;

/// Monotonic timestamp in nanoseconds for the core's timing APIs
pub fn now_ns() -> u64 {
    Instant::now().as_micros() * 1_000
}

//! Tuning log task
//!
//! Streams a CSV line over RTT every 25ms for offline analysis of the
//! assist response. Only compiled in with the `debug-csv-log` feature.

use embassy_time::{Duration, Instant, Ticker};

use crate::channels::with_state;

/// CSV log task - torque, cadence, brake and current trace
#[embassy_executor::task]
pub async fn csv_log_task() {
    defmt::println!("ms,weight_x10,cadence,brake,target_a,battery_a,motor_a");

    let start = Instant::now();
    let mut ticker = Ticker::every(Duration::from_millis(25));

    loop {
        ticker.next().await;

        let (weight_x10, cadence, brake, target_a, battery_a, motor_a) = with_state(|s| {
            (
                s.torque_weight_x10,
                s.cadence,
                s.brakes_are_active as u8,
                s.motor_current_target,
                s.battery_current,
                s.motor_current,
            )
        });

        defmt::println!(
            "{},{},{},{},{},{},{}",
            start.elapsed().as_millis(),
            weight_x10,
            cadence,
            brake,
            target_a,
            battery_a,
            motor_a,
        );
    }
}

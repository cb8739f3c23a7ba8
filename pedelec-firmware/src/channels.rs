//! Inter-task communication
//!
//! The shared [`BikeState`] record sits behind a blocking mutex; every
//! access is a short closure with no await point inside, which keeps the
//! original firmware's cooperative-yield guarantees on a preemptible
//! executor. Commands for the VESC go through a channel so the motor
//! control tick never touches the UART itself.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;

use pedelec_core::state::BikeState;
use pedelec_core::traits::TorqueReading;

/// Live bike telemetry, shared by all tasks
pub static BIKE_STATE: Mutex<CriticalSectionRawMutex, RefCell<BikeState>> =
    Mutex::new(RefCell::new(BikeState::new()));

/// Run a short, non-suspending closure against the shared state
pub fn with_state<R>(f: impl FnOnce(&mut BikeState) -> R) -> R {
    BIKE_STATE.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Commands queued for the VESC task, which owns the UART
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VescCommand {
    /// Apply a new motor current target (amps)
    SetCurrent(f32),
    /// Release the motor and let it coast (brake pulled)
    Brake,
}

/// Motor control tick -> VESC task command queue
pub static VESC_CMD: Channel<CriticalSectionRawMutex, VescCommand, 4> = Channel::new();

/// Latest torque sensor sample with its arrival instant
#[derive(Debug, Clone, Copy)]
pub struct TorqueSample {
    pub reading: TorqueReading,
    pub at: Instant,
}

/// Written by the CAN task, read (with a staleness check) by the motor
/// control tick
pub static LAST_TORQUE: Mutex<CriticalSectionRawMutex, Cell<Option<TorqueSample>>> =
    Mutex::new(Cell::new(None));

/// Publish a fresh torque sample
pub fn publish_torque(reading: TorqueReading) {
    LAST_TORQUE.lock(|cell| {
        cell.set(Some(TorqueSample {
            reading,
            at: Instant::now(),
        }))
    });
}

/// Latest torque sample no older than `max_age`, if any
pub fn recent_torque(max_age: embassy_time::Duration) -> Option<TorqueReading> {
    LAST_TORQUE.lock(|cell| {
        cell.get().and_then(|sample| {
            if sample.at.elapsed() <= max_age {
                Some(sample.reading)
            } else {
                None
            }
        })
    })
}

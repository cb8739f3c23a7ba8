//! Board-agnostic control logic for the e-bike main board firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Sensor and collaborator traits (torque, throttle, brake, wheel speed)
//! - Motor current fusion: torque + throttle -> ramped, clamped current target
//! - Wheel speed measurement from pulse edge timing
//! - Human pedal power averaging
//! - Static configuration types

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod power;
pub mod speed;
pub mod state;
pub mod traits;

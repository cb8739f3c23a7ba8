//! Wire protocols spoken by the Pedelec main board
//!
//! - [`vesc`]: the VESC motor controller's UART packet format and the
//!   small command subset this firmware uses (alive, get values,
//!   set current, brake)
//! - [`display`]: the framed status/input link to the handlebar display

#![no_std]
#![deny(unsafe_code)]

pub mod display;
pub mod vesc;

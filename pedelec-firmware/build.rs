//! Build script for pedelec-firmware
//!
//! Passes the linker scripts for the embedded target. memory.x is
//! provided by embassy-stm32's `memory-x` feature.

fn main() {
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    println!("cargo:rerun-if-changed=build.rs");
}

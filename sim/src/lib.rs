// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Host simulator for the bearer wallet key custody engine
//!
//! This provides file-backed flash, a simulated secure element and tamper
//! loop, and the device control loop, so the engine can be exercised
//! from the command line or from tests.
//!
//! Simulator state (flash image and hardware state) lives in a state
//! directory and persists across invocations, each invocation is a
//! power cycle of the device.

mod device;
pub use device::*;

pub mod flash;
pub use flash::FileFlash;

pub mod hardware;
pub use hardware::{HardwareState, SimClock, SimPlatform, SimSecureElement};

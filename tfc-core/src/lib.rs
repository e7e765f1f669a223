#![no_std]

// Shared logic for the conditioning rig.
//
// Everything here is portable across the STM32 firmware and the host emulator:
// no standard library, no allocation after construction, and no blocking calls.
// Channels expose `tick(now)` style functions that the trial scheduler calls on
// every pass of the outer loop.

pub mod channels;
pub mod config;
pub mod scheduler;
pub mod telemetry;
pub mod time;
pub mod trial;

//! Single-axis solar tracker control core.
//!
//! Hardware-independent: the firmware binary provides the [`hal`] implementations
//! and spawns the task loops exported here.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod clock;
pub mod config;
pub mod console;
pub mod ephemeris;
pub mod error;
pub mod estimator;
pub mod gps;
pub mod hal;
pub mod motor;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod watchdog;

pub use error::{Error, Result};
pub use supervisor::Tracker;

//! Board-agnostic core logic for the Telltale sensor monitor
//!
//! This crate contains all channel logic that does not depend on a specific
//! board:
//!
//! - Reference registries (applications, sensors, units) with name hashing
//! - Calibration model and the pure conversion math behind it
//! - Sensor port trait and the read/init behaviors bound to sensors
//! - Channel resolution engine (bind, override, per-field setters)
//! - Persistence of the channel table to non-volatile storage
//! - Per-channel alarm state machine
//! - Bulk snapshot import/export and the `Monitor` context object

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod alarm;
pub mod behaviors;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod hash;
pub mod monitor;
pub mod persist;
pub mod registry;
pub mod snapshot;
pub mod traits;

pub use channel::{ChannelId, ChannelManager, ConfigError};
pub use monitor::Monitor;
pub use persist::{ChannelStore, PersistError};
pub use registry::Registries;

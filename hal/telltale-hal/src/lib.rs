//! Telltale Hardware Abstraction Layer
//!
//! This crate defines the small set of platform services the board-agnostic
//! core consumes. Chip-specific crates implement them for their flash/EEPROM
//! and timer peripherals; the host build uses [`storage::RamStorage`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  telltale-core (channels, alarms, NVS)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  telltale-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  board EEPROM │       │  RamStorage   │
//! │  + timer      │       │  (host/tests) │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`clock::Clock`] - Monotonic millisecond time source
//! - [`storage::NvStorage`] - Byte-addressable non-volatile storage

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod storage;

// Re-export key traits at crate root for convenience
pub use clock::Clock;
pub use storage::{NvStorage, RamStorage, StorageError};

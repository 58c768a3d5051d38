//! Alarm evaluation
//!
//! One state machine per channel, evaluated once per tick from the
//! channel's latest value and configuration.

pub mod machine;

pub use machine::{AlarmContext, AlarmSeverity, AlarmState};

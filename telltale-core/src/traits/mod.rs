//! Hardware abstraction traits
//!
//! The sensor port is the only way channel logic reaches sensor hardware.
//! Board crates implement it over their ADC, SPI, I2C, timer capture and
//! bus controllers.

pub mod port;

pub use port::{AnalogReading, BusFrame, EnvQuantity, PortMode, PulseTiming, SensorError, SensorPort};

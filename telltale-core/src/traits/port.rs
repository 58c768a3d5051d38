//! Sensor port trait
//!
//! Raw acquisition for a channel id. Every method has a default that
//! reports `Unsupported`, so a board only implements the interfaces it has.

use crate::channel::ChannelId;

/// Errors that can occur while acquiring a sensor value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Sensor disconnected (open circuit)
    OpenCircuit,
    /// Sensor shorted to ground
    ShortCircuit,
    /// Reading out of expected range
    OutOfRange,
    /// Conversion produced no usable value
    ConversionError,
    /// No device answered, or the cached data is stale
    NotConnected,
    /// The port has no such interface
    Unsupported,
}

/// One ADC sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogReading {
    /// Raw conversion result
    pub counts: u16,
    /// Highest code the converter produces (1023 for 10 bits)
    pub full_scale: u16,
    /// Converter reference voltage
    pub reference_mv: u16,
}

impl AnalogReading {
    /// Voltage at the pin
    pub fn volts(&self) -> f32 {
        if self.full_scale == 0 {
            return f32::NAN;
        }
        self.counts as f32 * (self.reference_mv as f32 / 1000.0) / self.full_scale as f32
    }
}

/// Pulse timing captured by a frequency input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseTiming {
    /// Interval between the two most recent edges; 0 before the second edge
    pub interval_us: u32,
    /// Time since the most recent edge
    pub since_last_ms: u32,
}

/// Quantities an environmental sensor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnvQuantity {
    /// °C
    Temperature,
    /// Pa
    Pressure,
    /// % relative humidity
    Humidity,
}

/// Cached frame received on the vehicle bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusFrame {
    pub data: [u8; 8],
    pub len: u8,
}

/// How an init behavior wants a channel's interface configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortMode {
    /// ADC input
    Analog,
    /// SPI chip select, idle high
    ChipSelect,
    /// Digital input with pull-up
    InputPullUp,
    /// Edge capture on rising edges
    PulseCapture,
    /// I2C environmental sensor
    Environmental,
}

/// Raw sensor acquisition
///
/// Object safe: read behaviors take `&mut dyn SensorPort`.
pub trait SensorPort {
    /// Sample the ADC input behind `id`
    fn read_analog(&mut self, id: ChannelId) -> Result<AnalogReading, SensorError> {
        let _ = id;
        Err(SensorError::Unsupported)
    }

    /// Clock out the raw thermocouple converter frame (16 or 32 bits, MSB first)
    fn read_thermocouple(&mut self, id: ChannelId) -> Result<u32, SensorError> {
        let _ = id;
        Err(SensorError::Unsupported)
    }

    /// Latest pulse timing on the frequency input behind `id`
    fn read_frequency(&mut self, id: ChannelId) -> Result<PulseTiming, SensorError> {
        let _ = id;
        Err(SensorError::Unsupported)
    }

    /// Logic level of the digital input behind `id`
    fn read_digital(&mut self, id: ChannelId) -> Result<bool, SensorError> {
        let _ = id;
        Err(SensorError::Unsupported)
    }

    /// One quantity from the environmental sensor
    fn read_environment(&mut self, id: ChannelId, quantity: EnvQuantity) -> Result<f32, SensorError> {
        let _ = (id, quantity);
        Err(SensorError::Unsupported)
    }

    /// Most recent fresh frame for `(source_id, pid)`
    fn read_bus_frame(&mut self, source_id: u32, pid: u8) -> Result<BusFrame, SensorError> {
        let _ = (source_id, pid);
        Err(SensorError::Unsupported)
    }

    /// Configure the interface behind `id`
    fn configure(&mut self, id: ChannelId, mode: PortMode) -> Result<(), SensorError> {
        let _ = (id, mode);
        Err(SensorError::Unsupported)
    }
}

impl<P: SensorPort + ?Sized> SensorPort for &mut P {
    fn read_analog(&mut self, id: ChannelId) -> Result<AnalogReading, SensorError> {
        P::read_analog(self, id)
    }

    fn read_thermocouple(&mut self, id: ChannelId) -> Result<u32, SensorError> {
        P::read_thermocouple(self, id)
    }

    fn read_frequency(&mut self, id: ChannelId) -> Result<PulseTiming, SensorError> {
        P::read_frequency(self, id)
    }

    fn read_digital(&mut self, id: ChannelId) -> Result<bool, SensorError> {
        P::read_digital(self, id)
    }

    fn read_environment(&mut self, id: ChannelId, quantity: EnvQuantity) -> Result<f32, SensorError> {
        P::read_environment(self, id, quantity)
    }

    fn read_bus_frame(&mut self, source_id: u32, pid: u8) -> Result<BusFrame, SensorError> {
        P::read_bus_frame(self, source_id, pid)
    }

    fn configure(&mut self, id: ChannelId, mode: PortMode) -> Result<(), SensorError> {
        P::configure(self, id, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl SensorPort for Bare {}

    #[test]
    fn test_defaults_unsupported() {
        let mut port = Bare;
        let id = ChannelId::new(1).unwrap();
        assert_eq!(port.read_analog(id), Err(SensorError::Unsupported));
        assert_eq!(port.read_digital(id), Err(SensorError::Unsupported));
        assert_eq!(port.configure(id, PortMode::Analog), Err(SensorError::Unsupported));
    }

    #[test]
    fn test_volts() {
        let r = AnalogReading {
            counts: 512,
            full_scale: 1024,
            reference_mv: 5000,
        };
        assert!((r.volts() - 2.5).abs() < 1e-4);
    }
}

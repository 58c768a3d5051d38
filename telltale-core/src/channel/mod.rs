//! Channels and the resolution engine
//!
//! A channel binds an identifier to an application, a sensor and a
//! calibration. Registry positions held here are only valid for the current
//! boot; the persistence layer swaps them for name hashes.

pub mod manager;

pub use manager::ChannelManager;

use core::fmt;

use heapless::String;

use crate::alarm::{AlarmContext, AlarmSeverity};
use crate::behaviors::ReadFn;
use crate::calibration::{Calibration, CalibrationKind};
use crate::config::{LONG_NAME_LEN, SHORT_NAME_LEN};
use crate::registry::{Application, MeasurementKind, Sensor, Units};

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No free channel slot
    Capacity,
    /// Unbound channel id or unknown registry reference
    NotFound,
    /// Another enabled channel owns the id
    Conflict,
    /// Alarm minimum not below maximum
    InvalidRange,
    /// Reserved registry slot
    Unimplemented,
    /// Override variant does not match the bound sensor's calibration kind
    CalibrationMismatch,
    /// Output routing bits outside the known sinks
    InvalidOutput,
    /// Sensor or units measure a different quantity than the channel
    MeasurementMismatch,
}

/// Address range a channel id falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    /// Board pin, `0x00..=0xBF`
    Physical,
    /// Virtual channel fed from the vehicle bus, `0xC0..=0xDF`
    BusImported,
    /// Virtual channel for an addressed bus device, `0xF0..=0xFE`
    BusAddressed,
}

/// Channel identifier
///
/// `0xE0..=0xEF` and `0xFF` are not valid ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u8);

impl ChannelId {
    pub const fn new(raw: u8) -> Option<Self> {
        match raw {
            0x00..=0xDF | 0xF0..=0xFE => Some(Self(raw)),
            _ => None,
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn kind(self) -> ChannelKind {
        match self.0 {
            0x00..=0xBF => ChannelKind::Physical,
            0xC0..=0xDF => ChannelKind::BusImported,
            _ => ChannelKind::BusAddressed,
        }
    }
}

/// Output sinks a channel value can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputSink {
    Bus = 0,
    Dashboard = 1,
    Serial = 2,
    Log = 3,
}

impl OutputSink {
    pub const ALL: [OutputSink; 4] = [Self::Bus, Self::Dashboard, Self::Serial, Self::Log];

    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of output sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputMask(u8);

impl Default for OutputMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl OutputMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0x0F);

    /// Rejects bits outside the known sinks
    pub const fn from_bits(bits: u8) -> Result<Self, ConfigError> {
        if bits & !Self::ALL.0 != 0 {
            return Err(ConfigError::InvalidOutput);
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, sink: OutputSink) -> bool {
        self.0 & sink.bit() != 0
    }

    #[must_use]
    pub const fn with(self, sink: OutputSink, on: bool) -> Self {
        if on {
            Self(self.0 | sink.bit())
        } else {
            Self(self.0 & !sink.bit())
        }
    }
}

/// Outcome of checking alarm bounds against the sensor's physical range
///
/// Exceeding the sensor is allowed; a wider-range sensor may be fitted later.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeCheck {
    WithinSensor,
    ExceedsSensor { sensor_min: f32, sensor_max: f32 },
    /// The bound sensor publishes no physical limits
    SensorUnknown,
}

/// Copy `s` into a bounded string, truncating at a character boundary
pub(crate) fn bounded<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// One configured measurement point
#[derive(Clone)]
pub struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) short_name: String<SHORT_NAME_LEN>,
    pub(crate) long_name: String<LONG_NAME_LEN>,
    pub(crate) application: u8,
    pub(crate) sensor: u8,
    pub(crate) units: u8,
    /// Canonical units
    pub(crate) alarm_min: f32,
    /// Canonical units
    pub(crate) alarm_max: f32,
    pub(crate) export_id: u8,
    pub(crate) export_len: u8,
    pub(crate) enabled: bool,
    pub(crate) alarm_enabled: bool,
    pub(crate) display_enabled: bool,
    pub(crate) outputs: OutputMask,
    /// Last reading in canonical units, NaN when none or failed
    pub(crate) value: f32,
    pub(crate) measurement: MeasurementKind,
    pub(crate) calibration_kind: CalibrationKind,
    /// `Some` selects the override over the sensor default
    pub(crate) custom_calibration: Option<Calibration>,
    pub(crate) read: Option<ReadFn>,
    pub(crate) last_read_ms: Option<u32>,
    pub(crate) alarm: AlarmContext,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("short_name", &self.short_name)
            .field("application", &self.application)
            .field("sensor", &self.sensor)
            .field("units", &self.units)
            .field("enabled", &self.enabled)
            .field("value", &self.value)
            .field("custom_calibration", &self.custom_calibration)
            .field("alarm", &self.alarm)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Unbound channel: NONE application and sensor, default units
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            short_name: String::new(),
            long_name: String::new(),
            application: 0,
            sensor: 0,
            units: 0,
            alarm_min: 0.0,
            alarm_max: 0.0,
            export_id: 0,
            export_len: 0,
            enabled: false,
            alarm_enabled: false,
            display_enabled: false,
            outputs: OutputMask::ALL,
            value: f32::NAN,
            measurement: MeasurementKind::Temperature,
            calibration_kind: CalibrationKind::None,
            custom_calibration: None,
            read: None,
            last_read_ms: None,
            alarm: AlarmContext::disabled(),
        }
    }

    /// Copy an application's defaults and re-arm the alarm
    ///
    /// The sensor binding is left to [`Channel::apply_sensor`].
    pub(crate) fn apply_application(&mut self, index: u8, app: &Application, units: u8, now_ms: u32) {
        self.application = index;
        self.short_name = bounded(app.abbreviation);
        self.long_name = bounded(app.label.unwrap_or(app.name));
        self.units = units;
        self.alarm_min = app.alarm_min;
        self.alarm_max = app.alarm_max;
        self.export_id = app.export_id;
        self.export_len = app.export_len;
        self.enabled = true;
        self.alarm_enabled = app.alarm_enabled;
        self.display_enabled = app.display_enabled;
        self.outputs = OutputMask::ALL;
        self.custom_calibration = None;
        self.value = f32::NAN;
        self.last_read_ms = None;
        self.alarm = AlarmContext::new(
            app.warmup_ms as u32,
            app.persist_ms as u32,
            app.alarm_enabled,
            now_ms,
        );
    }

    /// Bind the sensor's behavior and calibration kind, dropping any override
    ///
    /// Returns whether the sensor changed.
    pub(crate) fn apply_sensor(&mut self, index: u8, sensor: &Sensor) -> bool {
        let changed = self.sensor != index;
        self.sensor = index;
        self.read = sensor.read;
        self.measurement = sensor.measurement;
        self.calibration_kind = sensor.calibration_kind();
        self.custom_calibration = None;
        changed
    }

    /// Re-arm the alarm with the current timing and flags
    pub(crate) fn rearm(&mut self, now_ms: u32) {
        self.alarm = AlarmContext::new(
            self.alarm.warmup_ms(),
            self.alarm.persist_ms(),
            self.enabled && self.alarm_enabled,
            now_ms,
        );
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// Application position in the current registry
    pub fn application(&self) -> u8 {
        self.application
    }

    /// Sensor position in the current registry
    pub fn sensor(&self) -> u8 {
        self.sensor
    }

    /// Units position in the current registry
    pub fn units(&self) -> u8 {
        self.units
    }

    pub fn alarm_min(&self) -> f32 {
        self.alarm_min
    }

    pub fn alarm_max(&self) -> f32 {
        self.alarm_max
    }

    pub fn export_id(&self) -> u8 {
        self.export_id
    }

    pub fn export_len(&self) -> u8 {
        self.export_len
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn alarm_enabled(&self) -> bool {
        self.alarm_enabled
    }

    pub fn display_enabled(&self) -> bool {
        self.display_enabled
    }

    pub fn outputs(&self) -> OutputMask {
        self.outputs
    }

    /// Latest value in canonical units; NaN if the last read failed
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Latest value converted to `units`
    pub fn display_value(&self, units: &Units) -> f32 {
        units.to_display(self.value)
    }

    pub fn measurement(&self) -> MeasurementKind {
        self.measurement
    }

    pub fn calibration_kind(&self) -> CalibrationKind {
        self.calibration_kind
    }

    pub fn custom_calibration(&self) -> Option<&Calibration> {
        self.custom_calibration.as_ref()
    }

    pub fn has_custom_calibration(&self) -> bool {
        self.custom_calibration.is_some()
    }

    /// Override if present, else the sensor's shared default
    pub fn effective_calibration<'a>(&'a self, sensor: &'a Sensor) -> &'a Calibration {
        self.custom_calibration.as_ref().unwrap_or(&sensor.calibration)
    }

    pub fn alarm(&self) -> &AlarmContext {
        &self.alarm
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm.is_active()
    }

    pub fn severity(&self) -> AlarmSeverity {
        self.alarm.severity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_ranges() {
        assert_eq!(ChannelId::new(0x06).map(ChannelId::kind), Some(ChannelKind::Physical));
        assert_eq!(ChannelId::new(0xC0).map(ChannelId::kind), Some(ChannelKind::BusImported));
        assert_eq!(ChannelId::new(0xDF).map(ChannelId::kind), Some(ChannelKind::BusImported));
        assert_eq!(ChannelId::new(0xF0).map(ChannelId::kind), Some(ChannelKind::BusAddressed));
        assert!(ChannelId::new(0xE0).is_none());
        assert!(ChannelId::new(0xEF).is_none());
        assert!(ChannelId::new(0xFF).is_none());
    }

    #[test]
    fn test_output_mask() {
        let mask = OutputMask::ALL.with(OutputSink::Serial, false);
        assert!(!mask.contains(OutputSink::Serial));
        assert!(mask.contains(OutputSink::Bus));
        assert_eq!(mask.bits(), 0x0B);
        assert_eq!(OutputMask::from_bits(0x10), Err(ConfigError::InvalidOutput));
        assert_eq!(OutputMask::from_bits(0x05).map(OutputMask::bits), Ok(0x05));
    }

    #[test]
    fn test_bounded_truncates() {
        let s: String<7> = bounded("OIL_PRESSURE");
        assert_eq!(s.as_str(), "OIL_PRE");
        // Multi-byte character that would straddle the limit is dropped
        let s: String<3> = bounded("ab°");
        assert_eq!(s.as_str(), "ab");
    }
}

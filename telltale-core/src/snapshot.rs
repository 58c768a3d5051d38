//! Bulk channel import/export
//!
//! A snapshot describes one channel by registry *names*, so it can move
//! between devices running different firmware builds. Applying one goes
//! through the same resolution path as interactive configuration.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::channel::{bounded, ChannelId, ChannelManager, ConfigError, OutputMask};
use crate::config::{LONG_NAME_LEN, SHORT_NAME_LEN};
use crate::traits::SensorPort;

/// Longest registry name a snapshot can carry
pub const REGISTRY_NAME_LEN: usize = 24;

/// Portable description of one channel
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelSnapshot {
    pub id: u8,
    pub application: String<REGISTRY_NAME_LEN>,
    pub sensor: String<REGISTRY_NAME_LEN>,
    pub units: String<REGISTRY_NAME_LEN>,
    pub short_name: String<SHORT_NAME_LEN>,
    pub long_name: String<LONG_NAME_LEN>,
    /// Canonical units
    pub alarm_min: f32,
    /// Canonical units
    pub alarm_max: f32,
    pub export_id: u8,
    pub export_len: u8,
    pub enabled: bool,
    pub alarm_enabled: bool,
    pub display_enabled: bool,
    /// Output sink bits
    pub outputs: u8,
    pub warmup_ms: u32,
    pub persist_ms: u32,
    /// Channel override; `None` uses the sensor default
    pub calibration: Option<Calibration>,
}

#[cfg(feature = "serde")]
impl ChannelSnapshot {
    /// Encode with postcard into `buf`, returning the used prefix
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl<'r, const N: usize> ChannelManager<'r, N> {
    /// Describe a bound channel by name
    pub fn snapshot(&self, id: ChannelId) -> Option<ChannelSnapshot> {
        let channel = self.get(id)?;
        let registries = self.registries();
        let application = registries.applications.lookup_by_index(channel.application())?;
        let sensor = registries.sensors.lookup_by_index(channel.sensor())?;
        let units = registries.units.lookup_by_index(channel.units())?;

        Some(ChannelSnapshot {
            id: id.raw(),
            application: bounded(application.name),
            sensor: bounded(sensor.name),
            units: bounded(units.name),
            short_name: bounded(channel.short_name()),
            long_name: bounded(channel.long_name()),
            alarm_min: channel.alarm_min(),
            alarm_max: channel.alarm_max(),
            export_id: channel.export_id(),
            export_len: channel.export_len(),
            enabled: channel.is_enabled(),
            alarm_enabled: channel.alarm_enabled(),
            display_enabled: channel.display_enabled(),
            outputs: channel.outputs().bits(),
            warmup_ms: channel.alarm().warmup_ms(),
            persist_ms: channel.alarm().persist_ms(),
            calibration: channel.custom_calibration().copied(),
        })
    }

    /// Create or reconfigure a channel from a snapshot
    ///
    /// Names, id and outputs are resolved before anything is touched, so a
    /// snapshot that does not resolve leaves the table unchanged.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ChannelSnapshot,
        now_ms: u32,
        port: &mut dyn SensorPort,
    ) -> Result<(), ConfigError> {
        let registries = self.registries();
        let id = ChannelId::new(snapshot.id).ok_or(ConfigError::NotFound)?;
        let application = registries
            .applications
            .index_by_name(&snapshot.application)
            .ok_or(ConfigError::NotFound)?;
        let sensor = registries
            .sensors
            .index_by_name(&snapshot.sensor)
            .ok_or(ConfigError::NotFound)?;
        let units = registries
            .units
            .index_by_name(&snapshot.units)
            .ok_or(ConfigError::NotFound)?;
        let outputs = OutputMask::from_bits(snapshot.outputs)?;
        if !(snapshot.alarm_min < snapshot.alarm_max) && snapshot.alarm_enabled {
            return Err(ConfigError::InvalidRange);
        }
        let app_entry = registries.applications.implemented(application)?;
        let sensor_entry = registries.sensors.implemented(sensor)?;
        let units_entry = &registries.units.entries()[units as usize];
        if app_entry.measurement != sensor_entry.measurement
            || !sensor_entry.measurement.displays_in(units_entry.measurement)
        {
            return Err(ConfigError::MeasurementMismatch);
        }
        if let Some(calibration) = &snapshot.calibration {
            if calibration.kind() != sensor_entry.calibration_kind() {
                return Err(ConfigError::CalibrationMismatch);
            }
        }

        self.bind_application(id, application, now_ms, port)?;
        self.bind_sensor(id, sensor, port)?;
        self.set_units(id, units)?;
        self.set_short_name(id, &snapshot.short_name)?;
        self.set_long_name(id, &snapshot.long_name)?;
        if snapshot.alarm_min < snapshot.alarm_max {
            self.set_alarm_bounds(id, snapshot.alarm_min, snapshot.alarm_max)?;
        } else {
            // Unordered bounds were rejected above unless alarms are off
            self.set_alarm_enabled(id, false, now_ms)?;
            self.store_alarm_bounds(id, snapshot.alarm_min, snapshot.alarm_max)?;
        }
        self.set_export(id, snapshot.export_id, snapshot.export_len)?;
        self.set_outputs(id, outputs)?;
        self.set_display_enabled(id, snapshot.display_enabled)?;
        self.set_alarm_timing(id, snapshot.warmup_ms, snapshot.persist_ms)?;
        if let Some(calibration) = snapshot.calibration {
            self.set_custom_calibration(id, calibration)?;
        }
        self.set_alarm_enabled(id, snapshot.alarm_enabled, now_ms)?;
        self.set_enabled(id, snapshot.enabled, now_ms)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmState;
    use crate::channel::OutputSink;
    use crate::registry::BUILTIN;

    struct NullPort;
    impl SensorPort for NullPort {}

    fn id(raw: u8) -> ChannelId {
        ChannelId::new(raw).unwrap()
    }

    fn source() -> ChannelManager<'static, 4> {
        let mut mgr = ChannelManager::new(&BUILTIN);
        let oil = BUILTIN.applications.index_by_name("OIL_PRESSURE").unwrap();
        mgr.bind_application(id(3), oil, 0, &mut NullPort).unwrap();
        mgr.bind_sensor(id(3), BUILTIN.sensors.index_by_name("VDO_2BAR_CURVE").unwrap(), &mut NullPort)
            .unwrap();
        mgr.set_units(id(3), BUILTIN.units.index_by_name("PSI").unwrap()).unwrap();
        mgr.set_alarm_bounds(id(3), 0.5, 1.8).unwrap();
        mgr.set_alarm_timing(id(3), 4000, 1500).unwrap();
        mgr.set_output_route(id(3), OutputSink::Log, false).unwrap();
        mgr.set_custom_calibration(
            id(3),
            Calibration::Polynomial {
                bias: 220.0,
                a: -1.0,
                b: 50.0,
                c: 10.0,
            },
        )
        .unwrap();
        mgr
    }

    #[test]
    fn test_snapshot_by_name() {
        let snap = source().snapshot(id(3)).unwrap();
        assert_eq!(snap.application.as_str(), "OIL_PRESSURE");
        assert_eq!(snap.sensor.as_str(), "VDO_2BAR_CURVE");
        assert_eq!(snap.units.as_str(), "PSI");
        assert_eq!(snap.outputs, 0x07);
        assert_eq!((snap.warmup_ms, snap.persist_ms), (4000, 1500));
        assert!(snap.calibration.is_some());
        assert!(source().snapshot(id(4)).is_none());
    }

    #[test]
    fn test_apply_reproduces_channel() {
        let snap = source().snapshot(id(3)).unwrap();
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);
        target.apply_snapshot(&snap, 100, &mut NullPort).unwrap();

        assert_eq!(target.snapshot(id(3)), Some(snap));
        let alarm = target.get(id(3)).unwrap().alarm();
        assert_eq!(alarm.state(), AlarmState::Init);
        assert_eq!(alarm.entered_ms(), 100);
    }

    #[test]
    fn test_apply_rejects_unknown_names() {
        let mut snap = source().snapshot(id(3)).unwrap();
        snap.sensor = bounded("NO_SUCH_SENDER");
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::NotFound)
        );
        assert!(target.is_empty());
    }

    #[test]
    fn test_apply_rejects_bad_outputs_and_ids() {
        let mut snap = source().snapshot(id(3)).unwrap();
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);

        snap.outputs = 0x30;
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::InvalidOutput)
        );
        snap.outputs = 0x0F;
        snap.id = 0xE5;
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::NotFound)
        );
        assert!(target.is_empty());
    }

    #[test]
    fn test_apply_rejects_mismatched_calibration() {
        let mut snap = source().snapshot(id(3)).unwrap();
        snap.calibration = Some(Calibration::Lookup { bias: 1000.0 });
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::CalibrationMismatch)
        );
        assert!(target.is_empty());
    }

    #[test]
    fn test_apply_rejects_mismatched_measurement() {
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);

        let mut snap = source().snapshot(id(3)).unwrap();
        snap.sensor = bounded("MAX6675");
        snap.calibration = None;
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::MeasurementMismatch)
        );

        let mut snap = source().snapshot(id(3)).unwrap();
        snap.units = bounded("FAHRENHEIT");
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::MeasurementMismatch)
        );
        assert!(target.is_empty());
    }

    #[test]
    fn test_apply_keeps_bounds_with_alarms_off() {
        let mut snap = source().snapshot(id(3)).unwrap();
        snap.alarm_enabled = false;
        snap.alarm_min = 2.0;
        snap.alarm_max = 2.0;

        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);
        target.apply_snapshot(&snap, 0, &mut NullPort).unwrap();
        assert_eq!(target.snapshot(id(3)), Some(snap.clone()));
        assert_eq!(target.get(id(3)).unwrap().alarm().state(), AlarmState::Disabled);

        snap.alarm_enabled = true;
        let mut target: ChannelManager<'_, 4> = ChannelManager::new(&BUILTIN);
        assert_eq!(
            target.apply_snapshot(&snap, 0, &mut NullPort),
            Err(ConfigError::InvalidRange)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_postcard_round_trip() {
        let snap = source().snapshot(id(3)).unwrap();
        let mut buf = [0u8; 160];
        let used = snap.encode(&mut buf).unwrap().len();
        assert_eq!(ChannelSnapshot::decode(&buf[..used]).unwrap(), snap);
    }
}

//! Channel table and resolution engine
//!
//! Owns a fixed-capacity table of channels and the registries they resolve
//! against. Every mutation is validated on a candidate copy first, so a
//! rejected operation leaves the table untouched.

use crate::alarm::AlarmSeverity;
use crate::behaviors::ReadContext;
use crate::calibration::Calibration;
use crate::config::MAX_CHANNELS;
use crate::registry::{RegistryEntry, Registries, Sensor};
use crate::traits::SensorPort;

use super::{bounded, Channel, ChannelId, ConfigError, OutputMask, OutputSink, RangeCheck};

/// Fixed-capacity channel table
pub struct ChannelManager<'r, const N: usize = MAX_CHANNELS> {
    registries: &'r Registries,
    slots: [Option<Channel>; N],
}

impl<'r, const N: usize> ChannelManager<'r, N> {
    /// Empty table resolving against `registries`
    pub fn new(registries: &'r Registries) -> Self {
        Self {
            registries,
            slots: core::array::from_fn(|_| None),
        }
    }

    pub fn registries(&self) -> &'r Registries {
        self.registries
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_slots(&self) -> usize {
        N - self.len()
    }

    fn position(&self, id: ChannelId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|c| c.id == id))
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.slots.iter().flatten().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ChannelId) -> Result<&mut Channel, ConfigError> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|c| c.id == id)
            .ok_or(ConfigError::NotFound)
    }

    /// Channels in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().flatten()
    }

    /// Whether a slot other than `except` holds an enabled channel for `id`
    fn enabled_elsewhere(&self, id: ChannelId, except: Option<usize>) -> bool {
        self.slots.iter().enumerate().any(|(i, s)| {
            Some(i) != except && s.as_ref().is_some_and(|c| c.enabled && c.id == id)
        })
    }

    /// The sensor a channel is bound to, or the sentinel
    pub fn sensor_of(&self, channel: &Channel) -> &'r Sensor {
        let sensors = self.registries.sensors;
        sensors
            .lookup_by_index(channel.sensor)
            .unwrap_or(&sensors.entries()[0])
    }

    /// Bind `id` to an application, creating the channel if needed
    ///
    /// Copies the application's defaults, re-arms the alarm, then binds the
    /// default sensor (running its init behavior if the sensor changed).
    pub fn bind_application(
        &mut self,
        id: ChannelId,
        application: u8,
        now_ms: u32,
        port: &mut dyn SensorPort,
    ) -> Result<(), ConfigError> {
        let registries = self.registries;
        let app = registries.applications.implemented(application)?;
        let sensor_index = registries
            .sensors
            .index_by_hash(app.default_sensor)
            .ok_or(ConfigError::NotFound)?;
        let sensor = registries.sensors.implemented(sensor_index)?;
        let units = registries.units.index_by_hash(app.default_units).unwrap_or(0);

        let existing = self.position(id);
        let slot = match existing {
            Some(slot) => slot,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(ConfigError::Capacity)?,
        };

        let mut candidate = match &self.slots[slot] {
            Some(channel) => channel.clone(),
            None => Channel::new(id),
        };
        candidate.apply_application(application, app, units, now_ms);

        if self.enabled_elsewhere(id, Some(slot)) {
            warn!("channel {}: id already in use", id.raw());
            return Err(ConfigError::Conflict);
        }
        if candidate.alarm_enabled && !(candidate.alarm_min < candidate.alarm_max) {
            return Err(ConfigError::InvalidRange);
        }

        let changed = candidate.apply_sensor(sensor_index, sensor);
        self.slots[slot] = Some(candidate);
        info!("channel {}: bound to {}", id.raw(), app.name);

        if changed {
            if let Some(init) = sensor.init {
                debug!("channel {}: init {}", id.raw(), sensor.name);
                init(port, id);
            }
        }
        Ok(())
    }

    /// Bind a bound channel to a different sensor
    ///
    /// The sensor must measure what the channel's application expects.
    /// Always resets the calibration to the sensor default. The init
    /// behavior only runs when the sensor actually changes.
    pub fn bind_sensor(
        &mut self,
        id: ChannelId,
        sensor: u8,
        port: &mut dyn SensorPort,
    ) -> Result<(), ConfigError> {
        let registries = self.registries;
        let entry = registries.sensors.implemented(sensor)?;
        let channel = self.get_mut(id)?;
        // A channel degraded to the sentinel application accepts any sensor
        if let Ok(app) = registries.applications.implemented(channel.application) {
            if app.measurement != entry.measurement {
                warn!("channel {}: {} does not measure {}", id.raw(), entry.name, app.name);
                return Err(ConfigError::MeasurementMismatch);
            }
        }
        if channel.apply_sensor(sensor, entry) {
            if let Some(init) = entry.init {
                debug!("channel {}: init {}", id.raw(), entry.name);
                init(port, id);
            }
        }
        Ok(())
    }

    /// Replace the sensor default with a channel-owned calibration
    ///
    /// The variant must match the calibration kind of the bound sensor.
    pub fn set_custom_calibration(
        &mut self,
        id: ChannelId,
        calibration: Calibration,
    ) -> Result<(), ConfigError> {
        let channel = self.get_mut(id)?;
        if calibration.kind() != channel.calibration_kind {
            return Err(ConfigError::CalibrationMismatch);
        }
        channel.custom_calibration = Some(calibration);
        Ok(())
    }

    /// Go back to the sensor's default calibration
    pub fn clear_custom_calibration(&mut self, id: ChannelId) -> Result<(), ConfigError> {
        self.get_mut(id)?.custom_calibration = None;
        Ok(())
    }

    /// Calibration a read of `id` would use
    pub fn effective_calibration(&self, id: ChannelId) -> Option<&Calibration> {
        let channel = self.get(id)?;
        Some(channel.effective_calibration(self.sensor_of(channel)))
    }

    pub fn set_short_name(&mut self, id: ChannelId, name: &str) -> Result<(), ConfigError> {
        self.get_mut(id)?.short_name = bounded(name);
        Ok(())
    }

    pub fn set_long_name(&mut self, id: ChannelId, name: &str) -> Result<(), ConfigError> {
        self.get_mut(id)?.long_name = bounded(name);
        Ok(())
    }

    /// Change display units; they must express the channel's measurement
    pub fn set_units(&mut self, id: ChannelId, units: u8) -> Result<(), ConfigError> {
        let entry = self
            .registries
            .units
            .lookup_by_index(units)
            .ok_or(ConfigError::NotFound)?;
        let channel = self.get_mut(id)?;
        if !channel.measurement.displays_in(entry.measurement) {
            return Err(ConfigError::MeasurementMismatch);
        }
        channel.units = units;
        Ok(())
    }

    /// Set alarm bounds in canonical units
    ///
    /// Bounds wider than the sensor's physical range are accepted; the
    /// returned [`RangeCheck`] reports it.
    pub fn set_alarm_bounds(
        &mut self,
        id: ChannelId,
        min: f32,
        max: f32,
    ) -> Result<RangeCheck, ConfigError> {
        if !(min < max) {
            return Err(ConfigError::InvalidRange);
        }
        let registries = self.registries;
        let channel = self.get_mut(id)?;
        let sensor = registries.sensors.lookup_by_index(channel.sensor);
        channel.alarm_min = min;
        channel.alarm_max = max;

        let check = match sensor.and_then(|s| s.limits) {
            Some(limits) if min < limits.min || max > limits.max => {
                warn!(
                    "channel {}: alarm range {}..{} exceeds sensor {}..{}",
                    id.raw(),
                    min,
                    max,
                    limits.min,
                    limits.max
                );
                RangeCheck::ExceedsSensor {
                    sensor_min: limits.min,
                    sensor_max: limits.max,
                }
            }
            Some(_) => RangeCheck::WithinSensor,
            None => RangeCheck::SensorUnknown,
        };
        Ok(check)
    }

    /// Write bounds without validation, for channels with alarms off
    pub(crate) fn store_alarm_bounds(&mut self, id: ChannelId, min: f32, max: f32) -> Result<(), ConfigError> {
        let channel = self.get_mut(id)?;
        if channel.alarm_enabled && !(min < max) {
            return Err(ConfigError::InvalidRange);
        }
        channel.alarm_min = min;
        channel.alarm_max = max;
        Ok(())
    }

    pub fn set_export(&mut self, id: ChannelId, export_id: u8, export_len: u8) -> Result<(), ConfigError> {
        let channel = self.get_mut(id)?;
        channel.export_id = export_id;
        channel.export_len = export_len;
        Ok(())
    }

    /// Change warmup and persistence without re-arming
    pub fn set_alarm_timing(&mut self, id: ChannelId, warmup_ms: u32, persist_ms: u32) -> Result<(), ConfigError> {
        self.get_mut(id)?.alarm.set_timing(warmup_ms, persist_ms);
        Ok(())
    }

    /// Enable or disable a channel, re-arming its alarm
    pub fn set_enabled(&mut self, id: ChannelId, enabled: bool, now_ms: u32) -> Result<(), ConfigError> {
        let slot = self.position(id).ok_or(ConfigError::NotFound)?;
        if enabled && self.enabled_elsewhere(id, Some(slot)) {
            return Err(ConfigError::Conflict);
        }
        let channel = self.get_mut(id)?;
        if channel.enabled != enabled {
            channel.enabled = enabled;
            channel.rearm(now_ms);
        }
        Ok(())
    }

    /// Enable or disable alarms, re-arming the alarm context
    pub fn set_alarm_enabled(&mut self, id: ChannelId, enabled: bool, now_ms: u32) -> Result<(), ConfigError> {
        let channel = self.get_mut(id)?;
        if enabled && !(channel.alarm_min < channel.alarm_max) {
            return Err(ConfigError::InvalidRange);
        }
        if channel.alarm_enabled != enabled {
            channel.alarm_enabled = enabled;
            channel.rearm(now_ms);
        }
        Ok(())
    }

    pub fn set_display_enabled(&mut self, id: ChannelId, enabled: bool) -> Result<(), ConfigError> {
        self.get_mut(id)?.display_enabled = enabled;
        Ok(())
    }

    pub fn set_output_route(&mut self, id: ChannelId, sink: OutputSink, on: bool) -> Result<(), ConfigError> {
        let channel = self.get_mut(id)?;
        channel.outputs = channel.outputs.with(sink, on);
        Ok(())
    }

    pub fn set_outputs(&mut self, id: ChannelId, outputs: OutputMask) -> Result<(), ConfigError> {
        self.get_mut(id)?.outputs = outputs;
        Ok(())
    }

    /// Return the channel's slot to the free pool
    pub fn clear_channel(&mut self, id: ChannelId) -> Result<(), ConfigError> {
        let slot = self.position(id).ok_or(ConfigError::NotFound)?;
        self.slots[slot] = None;
        info!("channel {}: cleared", id.raw());
        Ok(())
    }

    pub fn clear_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Put a fully built channel into the first free slot
    ///
    /// Used by the loader; skips validation and init behaviors.
    pub(crate) fn restore(&mut self, channel: Channel) -> Result<(), ConfigError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(ConfigError::Capacity)?;
        *slot = Some(channel);
        Ok(())
    }

    /// Read every enabled, bound channel whose read interval has elapsed
    ///
    /// A failed read stores NaN. Returns the number of reads performed.
    pub fn read_all_channels(&mut self, port: &mut dyn SensorPort, now_ms: u32) -> usize {
        let registries = self.registries;
        let mut reads = 0;
        for channel in self.slots.iter_mut().flatten() {
            if !channel.enabled {
                continue;
            }
            let Some(read) = channel.read else {
                continue;
            };
            let Some(sensor) = registries.sensors.lookup_by_index(channel.sensor) else {
                continue;
            };
            if let Some(last) = channel.last_read_ms {
                if now_ms.wrapping_sub(last) < sensor.min_read_interval_ms as u32 {
                    continue;
                }
            }

            let result = {
                let ctx = ReadContext {
                    id: channel.id,
                    calibration: channel.effective_calibration(sensor),
                    lookup: sensor.lookup,
                    previous: channel.value,
                };
                read(port, &ctx)
            };
            channel.value = match result {
                Ok(value) => value,
                Err(_e) => {
                    debug!("channel {}: read failed: {}", channel.id.raw(), _e);
                    f32::NAN
                }
            };
            channel.last_read_ms = Some(now_ms);
            reads += 1;
        }
        reads
    }

    /// Run one alarm evaluation for every channel
    pub fn evaluate_alarms(&mut self, now_ms: u32) {
        for channel in self.slots.iter_mut().flatten() {
            let enabled = channel.enabled && channel.alarm_enabled;
            channel
                .alarm
                .evaluate(channel.value, channel.alarm_min, channel.alarm_max, enabled, now_ms);
        }
    }

    /// Alarm flag for output sinks; false for unbound ids
    pub fn alarm_active(&self, id: ChannelId) -> bool {
        self.get(id).is_some_and(Channel::alarm_active)
    }

    pub fn severity(&self, id: ChannelId) -> Option<AlarmSeverity> {
        self.get(id).map(Channel::severity)
    }

    /// Latest value in the channel's display units
    pub fn display_value(&self, id: ChannelId) -> Option<f32> {
        let channel = self.get(id)?;
        let units = self.registries.units.lookup_by_index(channel.units)?;
        Some(channel.display_value(units))
    }

    /// Whether the channel's application is the unconfigured sentinel
    pub fn is_unconfigured(&self, id: ChannelId) -> bool {
        self.get(id).map_or(true, |c| {
            self.registries
                .applications
                .lookup_by_index(c.application)
                .map_or(true, |a| !a.is_implemented())
        })
    }
}

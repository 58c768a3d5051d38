//! Read-only reference registries
//!
//! Three immutable tables (applications, sensors, units) addressable by
//! position and by 16-bit name hash. Positions are only meaningful for the
//! current firmware build; hashes are what gets persisted.
//!
//! Index 0 of the application and sensor tables is the `NONE` sentinel.
//! Index 0 of the units table is `CELSIUS`, which doubles as the fallback
//! for unknown units.

pub mod application;
pub mod sensor;
pub mod units;

pub use application::{Application, APPLICATIONS};
pub use sensor::{PhysicalLimits, Sensor, SENSORS};
pub use units::{Units, UNITS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::ConfigError;
use crate::hash::djb2;

/// Rows a table may hold; positions are carried as `u8`
pub const MAX_ENTRIES: usize = 256;

/// Physical quantity a sensor measures or a unit expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MeasurementKind {
    /// Canonical unit: degrees Celsius
    Temperature,
    /// Canonical unit: bar
    Pressure,
    /// Canonical unit: volts
    Voltage,
    /// Canonical unit: revolutions per minute
    Rpm,
    /// Canonical unit: percent relative humidity
    Humidity,
    /// Canonical unit: meters
    Elevation,
    /// 0.0 or 1.0
    Digital,
    /// Canonical unit: km/h
    Speed,
}

impl MeasurementKind {
    /// Whether a value of this kind can be shown in `units`
    ///
    /// Digital readings have no unit of their own and display as percent.
    pub const fn displays_in(self, units: MeasurementKind) -> bool {
        matches!(
            (self, units),
            (MeasurementKind::Digital, MeasurementKind::Humidity)
        ) || self as u8 == units as u8
    }
}

/// Common shape of a registry row
pub trait RegistryEntry: 'static {
    /// Primary key
    fn name(&self) -> &'static str;

    /// Precomputed `djb2(name)`
    fn name_hash(&self) -> u16;

    /// Precomputed hash of an alternate name, if the entry has one
    fn alias_hash(&self) -> Option<u16> {
        None
    }

    /// Human readable label; `None` marks a sentinel or reserved slot
    fn label(&self) -> Option<&'static str>;

    /// Whether this slot may be bound to a channel
    fn is_implemented(&self) -> bool {
        self.label().is_some()
    }

    /// Check a hash against the name and alias hashes
    fn matches(&self, hash: u16) -> bool {
        self.name_hash() == hash || self.alias_hash() == Some(hash)
    }
}

/// Index-and-hash view over one immutable table
///
/// Both lookup styles share the same backing slice: `lookup_by_index` is
/// O(1), `lookup_by_hash` is a linear scan returning the first match.
pub struct Registry<T: 'static> {
    entries: &'static [T],
}

// Manual impls: a derive would require `T: Clone`, but only the reference is copied.
impl<T: 'static> Clone for Registry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for Registry<T> {}

impl<T: RegistryEntry> Registry<T> {
    /// Wrap a table
    ///
    /// # Panics
    /// If `entries` is empty (slot 0 serves as the fallback) or holds more
    /// than [`MAX_ENTRIES`] rows.
    pub const fn new(entries: &'static [T]) -> Self {
        assert!(!entries.is_empty(), "registry needs a slot 0 fallback");
        assert!(entries.len() <= MAX_ENTRIES, "registry positions must fit in a u8");
        Self { entries }
    }

    /// Number of slots, placeholders included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: slot 0 is mandatory
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The backing table
    pub fn entries(&self) -> &'static [T] {
        self.entries
    }

    /// Direct access by position
    pub fn lookup_by_index(&self, index: u8) -> Option<&'static T> {
        self.entries.get(index as usize)
    }

    /// Position of the first entry whose name or alias hash equals `hash`
    pub fn index_by_hash(&self, hash: u16) -> Option<u8> {
        self.entries
            .iter()
            .position(|e| e.matches(hash))
            .map(|i| i as u8)
    }

    /// First entry matching `hash`, or the slot 0 sentinel
    pub fn lookup_by_hash(&self, hash: u16) -> &'static T {
        let index = self.index_by_hash(hash).unwrap_or(0);
        &self.entries[index as usize]
    }

    /// Case-insensitive name lookup
    pub fn index_by_name(&self, name: &str) -> Option<u8> {
        self.index_by_hash(djb2(name))
    }

    /// Case-insensitive name lookup, falling back to the slot 0 sentinel
    pub fn lookup_by_name(&self, name: &str) -> &'static T {
        self.lookup_by_hash(djb2(name))
    }

    /// Resolve a position that is about to be bound to a channel
    ///
    /// Returns `NotFound` past the end of the table and `Unimplemented` for
    /// sentinel or reserved slots.
    pub fn implemented(&self, index: u8) -> Result<&'static T, ConfigError> {
        let entry = self.lookup_by_index(index).ok_or(ConfigError::NotFound)?;
        if entry.is_implemented() {
            Ok(entry)
        } else {
            Err(ConfigError::Unimplemented)
        }
    }

    /// Name hash of the entry at `index`, or of slot 0 when out of range
    pub fn hash_of(&self, index: u8) -> u16 {
        self.lookup_by_index(index)
            .unwrap_or(&self.entries[0])
            .name_hash()
    }

    /// Iterate `(index, entry)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u8, &'static T)> {
        self.entries.iter().enumerate().map(|(i, e)| (i as u8, e))
    }
}

/// The three tables a channel manager resolves against
#[derive(Clone, Copy)]
pub struct Registries {
    pub applications: Registry<Application>,
    pub sensors: Registry<Sensor>,
    pub units: Registry<Units>,
}

impl Registries {
    /// Combine arbitrary tables (tests use this to simulate a reordered build)
    pub const fn new(
        applications: &'static [Application],
        sensors: &'static [Sensor],
        units: &'static [Units],
    ) -> Self {
        Self {
            applications: Registry::new(applications),
            sensors: Registry::new(sensors),
            units: Registry::new(units),
        }
    }

    /// The tables compiled into this firmware
    pub const fn builtin() -> Self {
        Self::new(APPLICATIONS, SENSORS, UNITS)
    }
}

/// Registries compiled into this firmware
pub static BUILTIN: Registries = Registries::builtin();

/// Check that every application default refers to an existing sensor and unit
pub const fn defaults_resolve(
    applications: &[Application],
    sensors: &[Sensor],
    units: &[Units],
) -> bool {
    let mut i = 0;
    while i < applications.len() {
        let app = &applications[i];
        if !sensor::contains_hash(sensors, app.default_sensor)
            || !units::contains_hash(units, app.default_units)
        {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    defaults_resolve(APPLICATIONS, SENSORS, UNITS),
    "application default refers to a missing sensor or unit"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_index() {
        let reg = Registries::builtin();
        assert_eq!(reg.applications.lookup_by_index(0).map(|a| a.name), Some("NONE"));
        assert!(reg.applications.lookup_by_index(200).is_none());
    }

    #[test]
    #[should_panic(expected = "fit in a u8")]
    fn test_oversized_table_rejected() {
        let rows: &'static [Units] = Box::leak(vec![UNITS[0]; MAX_ENTRIES + 1].into_boxed_slice());
        assert!(!units::validate(rows));
        let _ = Registry::new(rows);
    }

    #[test]
    fn test_application_defaults_measure_alike() {
        let reg = Registries::builtin();
        for (_, app) in reg.applications.iter().filter(|(_, a)| a.is_implemented()) {
            let sensor = reg.sensors.lookup_by_hash(app.default_sensor);
            let units = reg.units.lookup_by_hash(app.default_units);
            assert_eq!(sensor.measurement, app.measurement, "{}", app.name);
            assert!(sensor.measurement.displays_in(units.measurement), "{}", app.name);
        }
    }

    #[test]
    fn test_displays_in() {
        assert!(MeasurementKind::Pressure.displays_in(MeasurementKind::Pressure));
        assert!(!MeasurementKind::Temperature.displays_in(MeasurementKind::Pressure));
        assert!(MeasurementKind::Digital.displays_in(MeasurementKind::Humidity));
        assert!(!MeasurementKind::Humidity.displays_in(MeasurementKind::Digital));
    }

    #[test]
    fn test_lookup_by_hash_falls_back_to_sentinel() {
        let reg = Registries::builtin();
        assert_eq!(reg.applications.lookup_by_hash(0x1234).name, "NONE");
        assert_eq!(reg.sensors.lookup_by_hash(0x1234).name, "NONE");
        assert_eq!(reg.units.lookup_by_hash(0x1234).name, "CELSIUS");
        assert_eq!(reg.units.index_by_hash(0x1234), None);
    }

    #[test]
    fn test_lookup_by_name_is_case_insensitive() {
        let reg = Registries::builtin();
        assert_eq!(reg.applications.lookup_by_name("cht").name, "CHT");
        assert_eq!(reg.applications.lookup_by_name("Oil_Temp").name, "OIL_TEMP");
        assert_eq!(reg.units.lookup_by_name("psi").name, "PSI");
    }

    #[test]
    fn test_alias_lookup() {
        let reg = Registries::builtin();
        assert_eq!(reg.units.lookup_by_name("F").name, "FAHRENHEIT");
        assert_eq!(reg.units.lookup_by_name("ft").name, "FEET");
        assert_eq!(reg.units.lookup_by_name("%").name, "PERCENT");
    }

    #[test]
    fn test_every_entry_hash_round_trips() {
        let reg = Registries::builtin();
        for (i, app) in reg.applications.iter() {
            assert_eq!(app.name_hash, djb2(app.name));
            assert_eq!(reg.applications.index_by_hash(djb2(app.name)), Some(i));
            assert_eq!(
                reg.applications.index_by_name(&app.name.to_ascii_lowercase()),
                Some(i)
            );
        }
        for (i, sensor) in reg.sensors.iter() {
            assert_eq!(sensor.name_hash, djb2(sensor.name));
            assert_eq!(reg.sensors.index_by_hash(djb2(sensor.name)), Some(i));
        }
        for (i, unit) in reg.units.iter() {
            assert_eq!(unit.name_hash, djb2(unit.name));
            assert_eq!(reg.units.index_by_hash(djb2(unit.name)), Some(i));
            if let Some(alias) = unit.alias {
                assert_eq!(reg.units.index_by_name(alias), Some(i));
            }
        }
    }

    #[test]
    fn test_implemented() {
        let reg = Registries::builtin();
        assert_eq!(
            reg.applications.implemented(0).err(),
            Some(ConfigError::Unimplemented)
        );
        let fuel = reg.applications.index_by_name("FUEL_PRESSURE").unwrap();
        assert_eq!(
            reg.applications.implemented(fuel).err(),
            Some(ConfigError::Unimplemented)
        );
        let cht = reg.applications.index_by_name("CHT").unwrap();
        assert!(reg.applications.implemented(cht).is_ok());
        assert_eq!(
            reg.applications.implemented(250).err(),
            Some(ConfigError::NotFound)
        );
        let reserved = reg.sensors.index_by_name("RESERVED").unwrap();
        assert_eq!(
            reg.sensors.implemented(reserved).err(),
            Some(ConfigError::Unimplemented)
        );
    }

    #[test]
    fn test_hash_of_out_of_range_is_sentinel() {
        let reg = Registries::builtin();
        assert_eq!(reg.applications.hash_of(250), djb2("NONE"));
        assert_eq!(reg.units.hash_of(250), djb2("CELSIUS"));
    }
}

//! Display units
//!
//! Every stored value and threshold is in the canonical unit of its
//! measurement kind. A unit entry is a linear map from canonical to display:
//! `display = canonical * factor + offset`.

use super::{MeasurementKind, RegistryEntry};
use crate::hash::djb2;

/// One display unit
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Units {
    /// Primary key: "CELSIUS", "PSI"
    pub name: &'static str,
    pub name_hash: u16,
    /// Short alternate name accepted on input: "C", "FT"
    pub alias: Option<&'static str>,
    pub alias_hash: Option<u16>,
    /// Display symbol
    pub symbol: &'static str,
    pub measurement: MeasurementKind,
    pub factor: f32,
    pub offset: f32,
}

impl Units {
    /// Convert a canonical value for display
    pub fn to_display(&self, canonical: f32) -> f32 {
        canonical * self.factor + self.offset
    }

    /// Convert a display value back to canonical units
    pub fn from_display(&self, display: f32) -> f32 {
        (display - self.offset) / self.factor
    }
}

impl RegistryEntry for Units {
    fn name(&self) -> &'static str {
        self.name
    }

    fn name_hash(&self) -> u16 {
        self.name_hash
    }

    fn alias_hash(&self) -> Option<u16> {
        self.alias_hash
    }

    fn label(&self) -> Option<&'static str> {
        Some(self.symbol)
    }
}

const fn unit(
    name: &'static str,
    alias: Option<&'static str>,
    symbol: &'static str,
    measurement: MeasurementKind,
    factor: f32,
    offset: f32,
) -> Units {
    Units {
        name,
        name_hash: djb2(name),
        alias,
        alias_hash: match alias {
            Some(a) => Some(djb2(a)),
            None => None,
        },
        symbol,
        measurement,
        factor,
        offset,
    }
}

/// Built-in units table; index 0 is the fallback for unknown hashes
pub const UNITS: &[Units] = &[
    unit("CELSIUS", Some("C"), "C", MeasurementKind::Temperature, 1.0, 0.0),
    unit("FAHRENHEIT", Some("F"), "F", MeasurementKind::Temperature, 1.8, 32.0),
    unit("BAR", None, "bar", MeasurementKind::Pressure, 1.0, 0.0),
    unit("PSI", None, "psi", MeasurementKind::Pressure, 14.5038, 0.0),
    unit("KPA", None, "kPa", MeasurementKind::Pressure, 100.0, 0.0),
    unit("INHG", None, "inHg", MeasurementKind::Pressure, 29.53, 0.0),
    unit("VOLTS", Some("V"), "V", MeasurementKind::Voltage, 1.0, 0.0),
    unit("RPM", None, "rpm", MeasurementKind::Rpm, 1.0, 0.0),
    unit("PERCENT", Some("%"), "%", MeasurementKind::Humidity, 1.0, 0.0),
    unit("METERS", Some("M"), "m", MeasurementKind::Elevation, 1.0, 0.0),
    unit("FEET", Some("FT"), "ft", MeasurementKind::Elevation, 3.28084, 0.0),
    unit("KPH", Some("KMH"), "km/h", MeasurementKind::Speed, 1.0, 0.0),
    unit("MPH", None, "mph", MeasurementKind::Speed, 0.621371, 0.0),
];

pub(crate) const fn contains_hash(table: &[Units], hash: u16) -> bool {
    let mut i = 0;
    while i < table.len() {
        if table[i].name_hash == hash {
            return true;
        }
        i += 1;
    }
    false
}

const fn alias_matches(alias_hash: Option<u16>, hash: u16) -> bool {
    match alias_hash {
        Some(a) => a == hash,
        None => false,
    }
}

/// Build-time check: stored hashes match, no name or alias is shared
pub const fn validate(table: &[Units]) -> bool {
    if table.len() > super::MAX_ENTRIES {
        return false;
    }
    let mut i = 0;
    while i < table.len() {
        let u = &table[i];
        if u.name_hash != djb2(u.name) {
            return false;
        }
        if let Some(alias) = u.alias {
            if !alias_matches(u.alias_hash, djb2(alias)) {
                return false;
            }
        } else if u.alias_hash.is_some() {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            let v = &table[j];
            if u.name_hash == v.name_hash
                || alias_matches(v.alias_hash, u.name_hash)
                || alias_matches(u.alias_hash, v.name_hash)
            {
                return false;
            }
            if let Some(a) = u.alias_hash {
                if alias_matches(v.alias_hash, a) {
                    return false;
                }
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(validate(UNITS), "units table hash mismatch or collision");

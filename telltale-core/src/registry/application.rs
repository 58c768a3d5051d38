//! Application presets
//!
//! An application is a measurement intent ("cylinder head temperature")
//! carrying the defaults a channel starts from: which sensor, which display
//! units, alarm bounds in canonical units and alarm timing.

use super::{MeasurementKind, RegistryEntry};
use crate::hash::djb2;

/// One application preset
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Application {
    /// Primary key: "CHT", "OIL_TEMP"
    pub name: &'static str,
    /// `djb2(name)`
    pub name_hash: u16,
    /// Dashboard abbreviation, at most 7 bytes
    pub abbreviation: &'static str,
    /// Display label; `None` for the sentinel and reserved slots
    pub label: Option<&'static str>,
    /// Name hash of the default sensor
    pub default_sensor: u16,
    /// Name hash of the default display units
    pub default_units: u16,
    /// Alarm minimum (canonical units)
    pub alarm_min: f32,
    /// Alarm maximum (canonical units)
    pub alarm_max: f32,
    /// Bus export id (OBD-II style PID)
    pub export_id: u8,
    /// Bus export payload length in bytes
    pub export_len: u8,
    pub alarm_enabled: bool,
    pub display_enabled: bool,
    /// Expected physical quantity
    pub measurement: MeasurementKind,
    /// Alarm warmup after stabilization
    pub warmup_ms: u16,
    /// How long a violation must persist before alarming
    pub persist_ms: u16,
}

impl RegistryEntry for Application {
    fn name(&self) -> &'static str {
        self.name
    }

    fn name_hash(&self) -> u16 {
        self.name_hash
    }

    fn label(&self) -> Option<&'static str> {
        self.label
    }
}

const NONE: Application = Application {
    name: "NONE",
    name_hash: djb2("NONE"),
    abbreviation: "",
    label: None,
    default_sensor: djb2("NONE"),
    default_units: djb2("CELSIUS"),
    alarm_min: 0.0,
    alarm_max: 0.0,
    export_id: 0,
    export_len: 0,
    alarm_enabled: false,
    display_enabled: false,
    measurement: MeasurementKind::Temperature,
    warmup_ms: 0,
    persist_ms: 0,
};

/// Built-in application table
///
/// Order is free to change between builds: persisted channels refer to
/// entries by `name_hash`.
pub const APPLICATIONS: &[Application] = &[
    NONE,
    // Temperature
    Application {
        name: "CHT",
        name_hash: djb2("CHT"),
        abbreviation: "CHT",
        label: Some("Cylinder Head Temperature"),
        default_sensor: djb2("MAX31855"),
        default_units: djb2("CELSIUS"),
        alarm_min: -1.0,
        alarm_max: 260.0,
        export_id: 0xC8,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 30000,
        persist_ms: 2000,
    },
    Application {
        name: "EGT",
        name_hash: djb2("EGT"),
        abbreviation: "EGT",
        label: Some("Exhaust Gas Temperature"),
        default_sensor: djb2("MAX31855"),
        default_units: djb2("CELSIUS"),
        alarm_min: -1.0,
        alarm_max: 600.0,
        export_id: 0x78,
        export_len: 2,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 20000,
        persist_ms: 2000,
    },
    Application {
        name: "COOLANT_TEMP",
        name_hash: djb2("COOLANT_TEMP"),
        abbreviation: "WTR",
        label: Some("Coolant Temperature"),
        default_sensor: djb2("VDO_120C_STEINHART"),
        default_units: djb2("CELSIUS"),
        alarm_min: -1.0,
        alarm_max: 100.0,
        export_id: 0x05,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 60000,
        persist_ms: 5000,
    },
    Application {
        name: "OIL_TEMP",
        name_hash: djb2("OIL_TEMP"),
        abbreviation: "OIL",
        label: Some("Oil Temperature"),
        default_sensor: djb2("VDO_150C_STEINHART"),
        default_units: djb2("CELSIUS"),
        alarm_min: -1.0,
        alarm_max: 150.0,
        export_id: 0x5C,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 60000,
        persist_ms: 5000,
    },
    Application {
        name: "TCASE_TEMP",
        name_hash: djb2("TCASE_TEMP"),
        abbreviation: " TC",
        label: Some("Transfer Case Temperature"),
        default_sensor: djb2("VDO_120C_STEINHART"),
        default_units: djb2("CELSIUS"),
        alarm_min: -1.0,
        alarm_max: 100.0,
        export_id: 0xC9,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 60000,
        persist_ms: 5000,
    },
    Application {
        name: "AMBIENT_TEMP",
        name_hash: djb2("AMBIENT_TEMP"),
        abbreviation: "AMB",
        label: Some("Ambient Air Temperature"),
        default_sensor: djb2("BME280_TEMP"),
        default_units: djb2("CELSIUS"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0x46,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Temperature,
        warmup_ms: 0,
        persist_ms: 5000,
    },
    // Pressure
    Application {
        name: "OIL_PRESSURE",
        name_hash: djb2("OIL_PRESSURE"),
        abbreviation: " OP",
        label: Some("Oil Pressure"),
        default_sensor: djb2("VDO_5BAR_CURVE"),
        default_units: djb2("BAR"),
        alarm_min: 1.0,
        alarm_max: 5.0,
        export_id: 0xCA,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Pressure,
        warmup_ms: 5000,
        persist_ms: 1000,
    },
    Application {
        name: "BOOST_PRESSURE",
        name_hash: djb2("BOOST_PRESSURE"),
        abbreviation: "BST",
        label: Some("Turbo Boost Pressure"),
        default_sensor: djb2("VDO_2BAR_CURVE"),
        default_units: djb2("BAR"),
        alarm_min: -1.0,
        alarm_max: 2.0,
        export_id: 0x6F,
        export_len: 2,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Pressure,
        warmup_ms: 1000,
        persist_ms: 500,
    },
    // Reserved until a fuel pressure sender is qualified
    Application {
        name: "FUEL_PRESSURE",
        name_hash: djb2("FUEL_PRESSURE"),
        abbreviation: " FP",
        label: None,
        default_sensor: djb2("NONE"),
        default_units: djb2("BAR"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0x0A,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: false,
        measurement: MeasurementKind::Pressure,
        warmup_ms: 2000,
        persist_ms: 1000,
    },
    Application {
        name: "BAROMETRIC_PRESSURE",
        name_hash: djb2("BAROMETRIC_PRESSURE"),
        abbreviation: "ABP",
        label: Some("Barometric Pressure"),
        default_sensor: djb2("BME280_PRESSURE"),
        default_units: djb2("BAR"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0x33,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Pressure,
        warmup_ms: 0,
        persist_ms: 5000,
    },
    // Voltage
    Application {
        name: "PRIMARY_BATTERY",
        name_hash: djb2("PRIMARY_BATTERY"),
        abbreviation: "BAT",
        label: Some("Primary Battery"),
        default_sensor: djb2("VOLTAGE_DIVIDER"),
        default_units: djb2("VOLTS"),
        alarm_min: 10.0,
        alarm_max: 15.0,
        export_id: 0xCB,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Voltage,
        warmup_ms: 0,
        persist_ms: 1000,
    },
    Application {
        name: "AUXILIARY_BATTERY",
        name_hash: djb2("AUXILIARY_BATTERY"),
        abbreviation: "AUX",
        label: Some("Auxiliary Battery"),
        default_sensor: djb2("VOLTAGE_DIVIDER"),
        default_units: djb2("VOLTS"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0xCC,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Voltage,
        warmup_ms: 0,
        persist_ms: 1000,
    },
    // Digital: 1.0 = float up (level ok), 0.0 = float down
    Application {
        name: "COOLANT_LEVEL",
        name_hash: djb2("COOLANT_LEVEL"),
        abbreviation: "LVL",
        label: Some("Coolant Level"),
        default_sensor: djb2("FLOAT_SWITCH"),
        default_units: djb2("PERCENT"),
        alarm_min: 0.0,
        alarm_max: 1.5,
        export_id: 0xA2,
        export_len: 1,
        alarm_enabled: true,
        display_enabled: true,
        measurement: MeasurementKind::Digital,
        warmup_ms: 5000,
        persist_ms: 2000,
    },
    // Environmental
    Application {
        name: "HUMIDITY",
        name_hash: djb2("HUMIDITY"),
        abbreviation: " RH",
        label: Some("Relative Humidity"),
        default_sensor: djb2("BME280_HUMIDITY"),
        default_units: djb2("PERCENT"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0,
        export_len: 0,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Humidity,
        warmup_ms: 0,
        persist_ms: 5000,
    },
    Application {
        name: "ELEVATION",
        name_hash: djb2("ELEVATION"),
        abbreviation: "ELEV",
        label: Some("Elevation"),
        default_sensor: djb2("BME280_ELEVATION"),
        default_units: djb2("METERS"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0xA1,
        export_len: 2,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Elevation,
        warmup_ms: 0,
        persist_ms: 5000,
    },
    // Rotational / speed
    Application {
        name: "ENGINE_RPM",
        name_hash: djb2("ENGINE_RPM"),
        abbreviation: "RPM",
        label: Some("Engine RPM"),
        default_sensor: djb2("W_PHASE_RPM"),
        default_units: djb2("RPM"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0x0C,
        export_len: 2,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Rpm,
        warmup_ms: 2000,
        persist_ms: 0,
    },
    Application {
        name: "VEHICLE_SPEED",
        name_hash: djb2("VEHICLE_SPEED"),
        abbreviation: "SPD",
        label: Some("Vehicle Speed"),
        default_sensor: djb2("HALL_SPEED"),
        default_units: djb2("KPH"),
        alarm_min: 0.0,
        alarm_max: 0.0,
        export_id: 0x0D,
        export_len: 1,
        alarm_enabled: false,
        display_enabled: true,
        measurement: MeasurementKind::Speed,
        warmup_ms: 0,
        persist_ms: 0,
    },
];

/// Build-time check: stored hashes match names and no two entries collide
pub const fn validate(table: &[Application]) -> bool {
    if table.len() > super::MAX_ENTRIES {
        return false;
    }
    let mut i = 0;
    while i < table.len() {
        if table[i].name_hash != djb2(table[i].name) {
            return false;
        }
        if table[i].abbreviation.len() > crate::config::SHORT_NAME_LEN {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            if table[i].name_hash == table[j].name_hash {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(validate(APPLICATIONS), "application table hash mismatch or collision");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_first() {
        assert_eq!(APPLICATIONS[0].name, "NONE");
        assert!(!APPLICATIONS[0].is_implemented());
    }

    #[test]
    fn test_cht_defaults() {
        let cht = APPLICATIONS.iter().find(|a| a.name == "CHT").unwrap();
        assert_eq!(cht.default_sensor, djb2("MAX31855"));
        assert_eq!(cht.alarm_min, -1.0);
        assert_eq!(cht.alarm_max, 260.0);
        assert!(cht.alarm_enabled);
        assert_eq!(cht.warmup_ms, 30000);
        assert_eq!(cht.persist_ms, 2000);
    }

    #[test]
    fn test_enabled_alarms_have_ordered_bounds() {
        for app in APPLICATIONS.iter().filter(|a| a.alarm_enabled) {
            assert!(app.alarm_min < app.alarm_max, "{}", app.name);
        }
    }

    #[test]
    fn test_validate_rejects_bad_hash() {
        let mut bad = APPLICATIONS[1];
        bad.name_hash ^= 1;
        assert!(!validate(&[bad]));
    }

    #[test]
    fn test_validate_rejects_duplicate() {
        assert!(!validate(&[APPLICATIONS[1], APPLICATIONS[1]]));
    }
}

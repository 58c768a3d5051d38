//! Hardware sensor library
//!
//! A sensor binds a read behavior, an optional init behavior and a default
//! calibration. The calibration kind of a sensor is the kind of its default
//! payload, so a channel override can be checked against it.

use core::fmt;

use super::{MeasurementKind, RegistryEntry};
use crate::behaviors::{self, InitFn, ReadFn};
use crate::calibration::{Calibration, CalibrationKind, LookupTable, DEFAULT_BIAS_OHMS};
use crate::hash::djb2;

/// Range the hardware can physically report (canonical units)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysicalLimits {
    pub min: f32,
    pub max: f32,
}

/// One sensor library entry
#[derive(Clone, Copy)]
pub struct Sensor {
    /// Primary key: "MAX31855", "VDO_5BAR_CURVE"
    pub name: &'static str,
    pub name_hash: u16,
    /// Display label; `None` for the sentinel and reserved slots
    pub label: Option<&'static str>,
    pub read: Option<ReadFn>,
    pub init: Option<InitFn>,
    pub measurement: MeasurementKind,
    /// Shared default calibration
    pub calibration: Calibration,
    /// Interpolation table for `Lookup` calibrations
    pub lookup: Option<&'static LookupTable>,
    /// Minimum spacing between reads
    pub min_read_interval_ms: u16,
    pub limits: Option<PhysicalLimits>,
}

impl Sensor {
    pub fn calibration_kind(&self) -> CalibrationKind {
        self.calibration.kind()
    }
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("measurement", &self.measurement)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

impl RegistryEntry for Sensor {
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

// ----------------------------------------------------------------------------
// Calibration data
// ----------------------------------------------------------------------------

/// VDO 120 °C sender, ohms (descending)
const VDO120_OHMS: [f32; 31] = [
    1743.15, 1364.07, 1075.63, 850.09, 676.95, 543.54, 439.29, 356.64, 291.46, 239.56, 197.29,
    161.46, 134.03, 113.96, 97.05, 82.36, 70.12, 59.73, 51.21, 44.32, 38.47, 33.4, 29.12, 25.53,
    22.44, 19.75, 17.44, 15.46, 13.75, 12.26, 10.96,
];

const VDO120_CELSIUS: [f32; 31] = [
    0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 75.0,
    80.0, 85.0, 90.0, 95.0, 100.0, 105.0, 110.0, 115.0, 120.0, 125.0, 130.0, 135.0, 140.0, 145.0,
    150.0,
];

/// VDO 150 °C sender, ohms (descending)
const VDO150_OHMS: [f32; 37] = [
    3240.18, 2473.60, 1905.87, 1486.65, 1168.64, 926.71, 739.98, 594.90, 481.53, 392.57, 322.17,
    266.19, 221.17, 184.72, 155.29, 131.38, 112.08, 96.40, 82.96, 71.44, 61.92, 54.01, 47.24,
    41.42, 36.51, 32.38, 28.81, 25.70, 23.0, 20.66, 18.59, 16.74, 15.11, 13.66, 12.38, 11.25,
    10.24,
];

const VDO150_CELSIUS: [f32; 37] = [
    0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 75.0,
    80.0, 85.0, 90.0, 95.0, 100.0, 105.0, 110.0, 115.0, 120.0, 125.0, 130.0, 135.0, 140.0, 145.0,
    150.0, 155.0, 160.0, 165.0, 170.0, 175.0, 180.0,
];

const VDO120_TABLE: LookupTable = LookupTable {
    resistance: &VDO120_OHMS,
    temperature: &VDO120_CELSIUS,
};

const VDO150_TABLE: LookupTable = LookupTable {
    resistance: &VDO150_OHMS,
    temperature: &VDO150_CELSIUS,
};

/// Curve-fitted from the VDO 120 °C table, ±1 °C over 20-120 °C
const VDO120_STEINHART: Calibration = Calibration::Steinhart {
    bias: DEFAULT_BIAS_OHMS,
    a: 1.764445997570e-03,
    b: 2.499534389889e-04,
    c: 6.773335597401e-08,
};

/// Curve-fitted from the VDO 150 °C table, ±1 °C over 20-150 °C
const VDO150_STEINHART: Calibration = Calibration::Steinhart {
    bias: DEFAULT_BIAS_OHMS,
    a: 1.591623373219e-03,
    b: 2.659356969556e-04,
    c: -1.610552525653e-07,
};

const NTC_10K_BETA: Calibration = Calibration::Beta {
    bias: 10000.0,
    beta: 3950.0,
    r0: 10000.0,
    t0: 25.0,
};

/// VDO 5 bar: `R = -0.3682 P^2 + 36.465 P + 10.648`
const VDO5BAR_POLYNOMIAL: Calibration = Calibration::Polynomial {
    bias: DEFAULT_BIAS_OHMS,
    a: -0.3682,
    b: 36.465,
    c: 10.648,
};

/// VDO 2 bar: `R = -3.1515 P^2 + 93.686 P + 9.6307`
const VDO2BAR_POLYNOMIAL: Calibration = Calibration::Polynomial {
    bias: DEFAULT_BIAS_OHMS,
    a: -3.1515,
    b: 93.686,
    c: 9.6307,
};

/// Generic 3-wire 0.5-4.5 V sender, 0-5 bar
const GENERIC_BOOST_LINEAR: Calibration = Calibration::Linear {
    v_min: 0.5,
    v_max: 4.5,
    out_min: 0.0,
    out_max: 5.0,
};

/// MPX4250AP: 0.2 V at 20 kPa, 4.7 V at 250 kPa
const MPX4250AP_LINEAR: Calibration = Calibration::Linear {
    v_min: 0.2,
    v_max: 4.7,
    out_min: 0.2,
    out_max: 2.5,
};

/// Generic 0.5-4.5 V temperature sender, -40 to 150 °C
const GENERIC_TEMP_LINEAR: Calibration = Calibration::Linear {
    v_min: 0.5,
    v_max: 4.5,
    out_min: -40.0,
    out_max: 150.0,
};

/// Battery divider: 3:1 ratio
const BATTERY_DIVIDER: Calibration = Calibration::VoltageDivider {
    r1: 20000.0,
    r2: 10000.0,
    correction: 1.0,
    offset: 0.0,
};

/// 12-pole alternator on a 3:1 pulley
const DEFAULT_RPM: Calibration = Calibration::Rpm {
    poles: 12,
    pulley_ratio: 3.0,
    multiplier: 1.0,
    timeout_ms: 2000,
    min_rpm: 100,
    max_rpm: 10000,
};

const DEFAULT_SPEED: Calibration = Calibration::Speed {
    pulses_per_rev: 4,
    tire_circumference_mm: 2000,
    final_drive_ratio: 3.73,
    multiplier: 1.0,
    timeout_ms: 2000,
    max_kph: 250,
};

/// OBD-II ECU response, single byte, PID to be configured
const DEFAULT_BUS_IMPORT: Calibration = Calibration::BusImport {
    source_id: 0x7E8,
    pid: 0x00,
    data_offset: 0,
    data_length: 1,
    big_endian: true,
    scale: 1.0,
    offset: 0.0,
};

// ----------------------------------------------------------------------------
// Table
// ----------------------------------------------------------------------------

const fn limits(min: f32, max: f32) -> Option<PhysicalLimits> {
    Some(PhysicalLimits { min, max })
}

const NONE: Sensor = Sensor {
    name: "NONE",
    name_hash: djb2("NONE"),
    label: None,
    read: None,
    init: None,
    measurement: MeasurementKind::Temperature,
    calibration: Calibration::None,
    lookup: None,
    min_read_interval_ms: 0,
    limits: None,
};

/// Built-in sensor library
pub const SENSORS: &[Sensor] = &[
    NONE,
    // Thermocouples
    Sensor {
        name: "MAX6675",
        name_hash: djb2("MAX6675"),
        label: Some("K-Type Thermocouple (MAX6675)"),
        read: Some(behaviors::read_max6675),
        init: Some(behaviors::init_chip_select),
        measurement: MeasurementKind::Temperature,
        calibration: Calibration::None,
        lookup: None,
        // Conversion time is 220 ms
        min_read_interval_ms: 250,
        limits: limits(0.0, 1024.0),
    },
    Sensor {
        name: "MAX31855",
        name_hash: djb2("MAX31855"),
        label: Some("K-Type Thermocouple (MAX31855)"),
        read: Some(behaviors::read_max31855),
        init: Some(behaviors::init_chip_select),
        measurement: MeasurementKind::Temperature,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 100,
        limits: limits(-200.0, 1350.0),
    },
    // Thermistors
    Sensor {
        name: "VDO_120C_LOOKUP",
        name_hash: djb2("VDO_120C_LOOKUP"),
        label: Some("VDO 120C Sender (Table)"),
        read: Some(behaviors::read_thermistor_lookup),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: Calibration::Lookup {
            bias: DEFAULT_BIAS_OHMS,
        },
        lookup: Some(&VDO120_TABLE),
        min_read_interval_ms: 0,
        limits: limits(0.0, 150.0),
    },
    Sensor {
        name: "VDO_150C_LOOKUP",
        name_hash: djb2("VDO_150C_LOOKUP"),
        label: Some("VDO 150C Sender (Table)"),
        read: Some(behaviors::read_thermistor_lookup),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: Calibration::Lookup {
            bias: DEFAULT_BIAS_OHMS,
        },
        lookup: Some(&VDO150_TABLE),
        min_read_interval_ms: 0,
        limits: limits(0.0, 180.0),
    },
    Sensor {
        name: "VDO_120C_STEINHART",
        name_hash: djb2("VDO_120C_STEINHART"),
        label: Some("VDO 120C Sender (Steinhart-Hart)"),
        read: Some(behaviors::read_thermistor_steinhart),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: VDO120_STEINHART,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 150.0),
    },
    Sensor {
        name: "VDO_150C_STEINHART",
        name_hash: djb2("VDO_150C_STEINHART"),
        label: Some("VDO 150C Sender (Steinhart-Hart)"),
        read: Some(behaviors::read_thermistor_steinhart),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: VDO150_STEINHART,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 180.0),
    },
    Sensor {
        name: "NTC_10K_BETA",
        name_hash: djb2("NTC_10K_BETA"),
        label: Some("Generic 10k NTC (Beta 3950)"),
        read: Some(behaviors::read_thermistor_beta),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: NTC_10K_BETA,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(-40.0, 125.0),
    },
    Sensor {
        name: "GENERIC_TEMP_LINEAR",
        name_hash: djb2("GENERIC_TEMP_LINEAR"),
        label: Some("Linear Temperature Sender (0.5-4.5V)"),
        read: Some(behaviors::read_linear),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: GENERIC_TEMP_LINEAR,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(-40.0, 150.0),
    },
    // Pressure
    Sensor {
        name: "VDO_5BAR_CURVE",
        name_hash: djb2("VDO_5BAR_CURVE"),
        label: Some("VDO 5 Bar Sender"),
        read: Some(behaviors::read_pressure_polynomial),
        init: None,
        measurement: MeasurementKind::Pressure,
        calibration: VDO5BAR_POLYNOMIAL,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 5.0),
    },
    Sensor {
        name: "VDO_2BAR_CURVE",
        name_hash: djb2("VDO_2BAR_CURVE"),
        label: Some("VDO 2 Bar Sender"),
        read: Some(behaviors::read_pressure_polynomial),
        init: None,
        measurement: MeasurementKind::Pressure,
        calibration: VDO2BAR_POLYNOMIAL,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 2.0),
    },
    Sensor {
        name: "GENERIC_BOOST",
        name_hash: djb2("GENERIC_BOOST"),
        label: Some("Linear Pressure Sender (0.5-4.5V, 5 bar)"),
        read: Some(behaviors::read_linear),
        init: None,
        measurement: MeasurementKind::Pressure,
        calibration: GENERIC_BOOST_LINEAR,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 5.0),
    },
    Sensor {
        name: "MPX4250AP",
        name_hash: djb2("MPX4250AP"),
        label: Some("Freescale MPX4250AP MAP"),
        read: Some(behaviors::read_linear),
        init: None,
        measurement: MeasurementKind::Pressure,
        calibration: MPX4250AP_LINEAR,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.2, 2.5),
    },
    // Voltage
    Sensor {
        name: "VOLTAGE_DIVIDER",
        name_hash: djb2("VOLTAGE_DIVIDER"),
        label: Some("Voltage Divider"),
        read: Some(behaviors::read_voltage_divider),
        init: None,
        measurement: MeasurementKind::Voltage,
        calibration: BATTERY_DIVIDER,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 30.0),
    },
    Sensor {
        name: "VOLTAGE_DIRECT",
        name_hash: djb2("VOLTAGE_DIRECT"),
        label: Some("Direct Voltage"),
        read: Some(behaviors::read_voltage_direct),
        init: None,
        measurement: MeasurementKind::Voltage,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 5.0),
    },
    // Frequency
    Sensor {
        name: "W_PHASE_RPM",
        name_hash: djb2("W_PHASE_RPM"),
        label: Some("Alternator W-Phase RPM"),
        read: Some(behaviors::read_w_phase_rpm),
        init: Some(behaviors::init_pulse_capture),
        measurement: MeasurementKind::Rpm,
        calibration: DEFAULT_RPM,
        lookup: None,
        min_read_interval_ms: 100,
        limits: limits(0.0, 10000.0),
    },
    Sensor {
        name: "HALL_SPEED",
        name_hash: djb2("HALL_SPEED"),
        label: Some("Hall Effect Speed Pickup"),
        read: Some(behaviors::read_hall_speed),
        init: Some(behaviors::init_pulse_capture),
        measurement: MeasurementKind::Speed,
        calibration: DEFAULT_SPEED,
        lookup: None,
        min_read_interval_ms: 100,
        limits: limits(0.0, 250.0),
    },
    // Environmental
    Sensor {
        name: "BME280_TEMP",
        name_hash: djb2("BME280_TEMP"),
        label: Some("BME280 Temperature"),
        read: Some(behaviors::read_bme280_temperature),
        init: Some(behaviors::init_environmental),
        measurement: MeasurementKind::Temperature,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 1000,
        limits: limits(-40.0, 85.0),
    },
    Sensor {
        name: "BME280_PRESSURE",
        name_hash: djb2("BME280_PRESSURE"),
        label: Some("BME280 Pressure"),
        read: Some(behaviors::read_bme280_pressure),
        init: Some(behaviors::init_environmental),
        measurement: MeasurementKind::Pressure,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 1000,
        limits: limits(0.3, 1.1),
    },
    Sensor {
        name: "BME280_HUMIDITY",
        name_hash: djb2("BME280_HUMIDITY"),
        label: Some("BME280 Humidity"),
        read: Some(behaviors::read_bme280_humidity),
        init: Some(behaviors::init_environmental),
        measurement: MeasurementKind::Humidity,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 1000,
        limits: limits(0.0, 100.0),
    },
    Sensor {
        name: "BME280_ELEVATION",
        name_hash: djb2("BME280_ELEVATION"),
        label: Some("BME280 Elevation"),
        read: Some(behaviors::read_bme280_elevation),
        init: Some(behaviors::init_environmental),
        measurement: MeasurementKind::Elevation,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 1000,
        limits: limits(-500.0, 9000.0),
    },
    // Digital
    Sensor {
        name: "FLOAT_SWITCH",
        name_hash: djb2("FLOAT_SWITCH"),
        label: Some("Float Switch (NC)"),
        read: Some(behaviors::read_float_switch),
        init: Some(behaviors::init_input_pull_up),
        measurement: MeasurementKind::Digital,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 0,
        limits: limits(0.0, 1.0),
    },
    // Bus import; bound to virtual ids 0xC0-0xDF
    Sensor {
        name: "CAN_IMPORT",
        name_hash: djb2("CAN_IMPORT"),
        label: Some("CAN Bus Import (OBD-II/J1939)"),
        read: Some(behaviors::read_bus_import),
        init: None,
        measurement: MeasurementKind::Temperature,
        calibration: DEFAULT_BUS_IMPORT,
        lookup: None,
        min_read_interval_ms: 100,
        limits: limits(-273.0, 1000.0),
    },
    // Reserved slot
    Sensor {
        name: "RESERVED",
        name_hash: djb2("RESERVED"),
        label: None,
        read: None,
        init: None,
        measurement: MeasurementKind::Pressure,
        calibration: Calibration::None,
        lookup: None,
        min_read_interval_ms: 0,
        limits: None,
    },
];

pub(crate) const fn contains_hash(table: &[Sensor], hash: u16) -> bool {
    let mut i = 0;
    while i < table.len() {
        if table[i].name_hash == hash {
            return true;
        }
        i += 1;
    }
    false
}

/// Build-time check: stored hashes match names and no two entries collide
pub const fn validate(table: &[Sensor]) -> bool {
    if table.len() > super::MAX_ENTRIES {
        return false;
    }
    let mut i = 0;
    while i < table.len() {
        if table[i].name_hash != djb2(table[i].name) {
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

const _: () = assert!(validate(SENSORS), "sensor table hash mismatch or collision");

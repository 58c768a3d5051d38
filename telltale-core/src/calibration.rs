//! Calibration model
//!
//! A sensor carries a default calibration; a channel may replace it with an
//! override of the same kind. Each variant encodes to a fixed 16-byte
//! payload (little-endian, zero padded) for persistence. The kind itself is
//! never stored alongside the payload: it is re-derived from the bound
//! sensor on load.
//!
//! The conversion math lives here as pure functions so it can be tested
//! without a sensor port.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Encoded payload size
pub const PAYLOAD_LEN: usize = 16;

/// Bias (pull-up) resistor fitted on the reference board, ohms
pub const DEFAULT_BIAS_OHMS: f32 = 1000.0;

/// 0 °C in kelvin
pub const KELVIN_OFFSET: f32 = 273.15;

/// Calibration discriminant, also the persisted `cal kind` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CalibrationKind {
    None = 0,
    Steinhart = 1,
    Lookup = 2,
    Beta = 3,
    Polynomial = 4,
    Linear = 5,
    VoltageDivider = 6,
    Rpm = 7,
    Speed = 8,
    BusImport = 9,
}

impl CalibrationKind {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Steinhart,
            2 => Self::Lookup,
            3 => Self::Beta,
            4 => Self::Polynomial,
            5 => Self::Linear,
            6 => Self::VoltageDivider,
            7 => Self::Rpm,
            8 => Self::Speed,
            9 => Self::BusImport,
            _ => return None,
        })
    }
}

/// Calibration parameters, one shape per kind
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Calibration {
    None,
    /// Thermistor, `1/T = a + b ln R + c (ln R)^3`
    Steinhart { bias: f32, a: f32, b: f32, c: f32 },
    /// Thermistor interpolated from the sensor's table
    Lookup { bias: f32 },
    /// Thermistor, `1/T = 1/T0 + ln(R/R0)/beta` (t0 in °C)
    Beta { bias: f32, beta: f32, r0: f32, t0: f32 },
    /// Resistive sender, `R = a P^2 + b P + c`
    Polynomial { bias: f32, a: f32, b: f32, c: f32 },
    /// Ratiometric sender mapping `[v_min, v_max]` onto `[out_min, out_max]`
    Linear {
        v_min: f32,
        v_max: f32,
        out_min: f32,
        out_max: f32,
    },
    /// Resistor divider in front of the ADC
    VoltageDivider {
        r1: f32,
        r2: f32,
        correction: f32,
        offset: f32,
    },
    /// Alternator W-phase tachometer
    Rpm {
        poles: u8,
        pulley_ratio: f32,
        multiplier: f32,
        timeout_ms: u16,
        min_rpm: u16,
        max_rpm: u16,
    },
    /// Hall-effect road speed pickup
    Speed {
        pulses_per_rev: u8,
        tire_circumference_mm: u16,
        final_drive_ratio: f32,
        multiplier: f32,
        timeout_ms: u16,
        max_kph: u16,
    },
    /// Value extracted from a cached bus frame
    BusImport {
        source_id: u32,
        pid: u8,
        data_offset: u8,
        data_length: u8,
        big_endian: bool,
        scale: f32,
        offset: f32,
    },
}

impl Calibration {
    pub fn kind(&self) -> CalibrationKind {
        match self {
            Self::None => CalibrationKind::None,
            Self::Steinhart { .. } => CalibrationKind::Steinhart,
            Self::Lookup { .. } => CalibrationKind::Lookup,
            Self::Beta { .. } => CalibrationKind::Beta,
            Self::Polynomial { .. } => CalibrationKind::Polynomial,
            Self::Linear { .. } => CalibrationKind::Linear,
            Self::VoltageDivider { .. } => CalibrationKind::VoltageDivider,
            Self::Rpm { .. } => CalibrationKind::Rpm,
            Self::Speed { .. } => CalibrationKind::Speed,
            Self::BusImport { .. } => CalibrationKind::BusImport,
        }
    }

    /// Encode into the fixed persisted payload
    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        let mut w = Writer { buf: &mut out, pos: 0 };
        match *self {
            Self::None => {}
            Self::Steinhart { bias, a, b, c } | Self::Polynomial { bias, a, b, c } => {
                w.f32(bias);
                w.f32(a);
                w.f32(b);
                w.f32(c);
            }
            Self::Lookup { bias } => w.f32(bias),
            Self::Beta { bias, beta, r0, t0 } => {
                w.f32(bias);
                w.f32(beta);
                w.f32(r0);
                w.f32(t0);
            }
            Self::Linear {
                v_min,
                v_max,
                out_min,
                out_max,
            } => {
                w.f32(v_min);
                w.f32(v_max);
                w.f32(out_min);
                w.f32(out_max);
            }
            Self::VoltageDivider {
                r1,
                r2,
                correction,
                offset,
            } => {
                w.f32(r1);
                w.f32(r2);
                w.f32(correction);
                w.f32(offset);
            }
            Self::Rpm {
                poles,
                pulley_ratio,
                multiplier,
                timeout_ms,
                min_rpm,
                max_rpm,
            } => {
                w.u8(poles);
                w.f32(pulley_ratio);
                w.f32(multiplier);
                w.u16(timeout_ms);
                w.u16(min_rpm);
                w.u16(max_rpm);
            }
            Self::Speed {
                pulses_per_rev,
                tire_circumference_mm,
                final_drive_ratio,
                multiplier,
                timeout_ms,
                max_kph,
            } => {
                w.u8(pulses_per_rev);
                w.u16(tire_circumference_mm);
                w.f32(final_drive_ratio);
                w.f32(multiplier);
                w.u16(timeout_ms);
                w.u16(max_kph);
            }
            Self::BusImport {
                source_id,
                pid,
                data_offset,
                data_length,
                big_endian,
                scale,
                offset,
            } => {
                w.u32(source_id);
                w.u8(pid);
                w.u8(data_offset);
                w.u8(data_length);
                w.u8(big_endian as u8);
                w.f32(scale);
                w.f32(offset);
            }
        }
        out
    }

    /// Decode a payload whose meaning is given by `kind`
    pub fn from_bytes(kind: CalibrationKind, bytes: &[u8; PAYLOAD_LEN]) -> Self {
        let mut r = Reader { buf: bytes, pos: 0 };
        match kind {
            CalibrationKind::None => Self::None,
            CalibrationKind::Steinhart => Self::Steinhart {
                bias: r.f32(),
                a: r.f32(),
                b: r.f32(),
                c: r.f32(),
            },
            CalibrationKind::Lookup => Self::Lookup { bias: r.f32() },
            CalibrationKind::Beta => Self::Beta {
                bias: r.f32(),
                beta: r.f32(),
                r0: r.f32(),
                t0: r.f32(),
            },
            CalibrationKind::Polynomial => Self::Polynomial {
                bias: r.f32(),
                a: r.f32(),
                b: r.f32(),
                c: r.f32(),
            },
            CalibrationKind::Linear => Self::Linear {
                v_min: r.f32(),
                v_max: r.f32(),
                out_min: r.f32(),
                out_max: r.f32(),
            },
            CalibrationKind::VoltageDivider => Self::VoltageDivider {
                r1: r.f32(),
                r2: r.f32(),
                correction: r.f32(),
                offset: r.f32(),
            },
            CalibrationKind::Rpm => Self::Rpm {
                poles: r.u8(),
                pulley_ratio: r.f32(),
                multiplier: r.f32(),
                timeout_ms: r.u16(),
                min_rpm: r.u16(),
                max_rpm: r.u16(),
            },
            CalibrationKind::Speed => Self::Speed {
                pulses_per_rev: r.u8(),
                tire_circumference_mm: r.u16(),
                final_drive_ratio: r.f32(),
                multiplier: r.f32(),
                timeout_ms: r.u16(),
                max_kph: r.u16(),
            },
            CalibrationKind::BusImport => Self::BusImport {
                source_id: r.u32(),
                pid: r.u8(),
                data_offset: r.u8(),
                data_length: r.u8(),
                big_endian: r.u8() != 0,
                scale: r.f32(),
                offset: r.f32(),
            },
        }
    }
}

struct Writer<'a> {
    buf: &'a mut [u8; PAYLOAD_LEN],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8; PAYLOAD_LEN],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

/// Resistance-vs-temperature table for a thermistor
///
/// `resistance` is strictly descending; `temperature` is the matching
/// ascending °C column.
#[derive(Debug, PartialEq)]
pub struct LookupTable {
    pub resistance: &'static [f32],
    pub temperature: &'static [f32],
}

impl LookupTable {
    /// Piecewise-linear interpolation, clamped to the table ends
    pub fn interpolate(&self, ohms: f32) -> f32 {
        let (xs, ys) = (self.resistance, self.temperature);
        let n = xs.len().min(ys.len());
        if n == 0 || ohms.is_nan() {
            return f32::NAN;
        }
        if ohms >= xs[0] {
            return ys[0];
        }
        if ohms <= xs[n - 1] {
            return ys[n - 1];
        }
        for i in 0..n - 1 {
            let (x0, x1) = (xs[i], xs[i + 1]);
            if ohms <= x0 && ohms >= x1 {
                return ys[i] + (ohms - x0) / (x1 - x0) * (ys[i + 1] - ys[i]);
            }
        }
        f32::NAN
    }
}

/// Resistance of a sensor to ground under a pull-up bias resistor
///
/// `R = counts * bias / (full_scale - counts)`; `None` when the reading is
/// at or beyond full scale.
pub fn divider_resistance(counts: u16, full_scale: u16, bias_ohms: f32) -> Option<f32> {
    if counts >= full_scale {
        return None;
    }
    let r = counts as f32 * bias_ohms / (full_scale - counts) as f32;
    (r > 0.0).then_some(r)
}

/// Steinhart-Hart thermistor equation, °C
pub fn steinhart_celsius(ohms: f32, a: f32, b: f32, c: f32) -> f32 {
    let ln_r = libm::logf(ohms);
    let inv_t = a + b * ln_r + c * ln_r * ln_r * ln_r;
    1.0 / inv_t - KELVIN_OFFSET
}

/// Beta-model thermistor equation, °C
pub fn beta_celsius(ohms: f32, beta: f32, r0: f32, t0_celsius: f32) -> f32 {
    let t0 = t0_celsius + KELVIN_OFFSET;
    let inv_t = 1.0 / t0 + libm::logf(ohms / r0) / beta;
    1.0 / inv_t - KELVIN_OFFSET
}

/// Linear sender: clamp the voltage into range, then map
pub fn linear_output(volts: f32, v_min: f32, v_max: f32, out_min: f32, out_max: f32) -> f32 {
    let v = volts.clamp(v_min, v_max);
    (v - v_min) / (v_max - v_min) * (out_max - out_min) + out_min
}

/// Invert `R = a P^2 + b P + c` for `P`
///
/// Takes the root on the rising branch of the curve; `None` when no real
/// root exists.
pub fn polynomial_root(ohms: f32, a: f32, b: f32, c: f32) -> Option<f32> {
    let c = c - ohms;
    if a == 0.0 {
        return (b != 0.0).then(|| -c / b);
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    Some((-b + libm::sqrtf(disc)) / (2.0 * a))
}

/// Source voltage in front of a resistor divider
pub fn divider_voltage(pin_volts: f32, r1: f32, r2: f32, correction: f32, offset: f32) -> f32 {
    pin_volts * ((r1 + r2) / r2) * correction + offset
}

/// Engine RPM from the alternator W-phase pulse interval
///
/// An alternator with `poles` poles emits `poles / 2` pulses per alternator
/// revolution; `pulley_ratio` alternator revolutions per engine revolution.
pub fn rpm_from_interval(interval_us: u32, poles: u8, pulley_ratio: f32, multiplier: f32) -> Option<f32> {
    let pulses_per_engine_rev = poles as f32 / 2.0 * pulley_ratio;
    if interval_us == 0 || pulses_per_engine_rev <= 0.0 {
        return None;
    }
    Some(60_000_000.0 / (interval_us as f32 * pulses_per_engine_rev) * multiplier)
}

/// Road speed (km/h) from the hall pickup pulse interval
///
/// The pickup sits on the driveshaft: `final_drive_ratio` shaft revolutions
/// per wheel revolution.
pub fn kph_from_interval(
    interval_us: u32,
    pulses_per_rev: u8,
    tire_circumference_mm: u16,
    final_drive_ratio: f32,
    multiplier: f32,
) -> Option<f32> {
    if interval_us == 0 || pulses_per_rev == 0 || final_drive_ratio <= 0.0 {
        return None;
    }
    let shaft_rev_per_s = 1_000_000.0 / (interval_us as f32 * pulses_per_rev as f32);
    let wheel_rev_per_s = shaft_rev_per_s / final_drive_ratio;
    let metres_per_s = wheel_rev_per_s * tire_circumference_mm as f32 / 1000.0;
    Some(metres_per_s * 3.6 * multiplier)
}

/// Pressure altitude (m) from station pressure
pub fn altitude_m(pressure_pa: f32, sea_level_hpa: f32) -> f32 {
    let ratio = (pressure_pa / 100.0) / sea_level_hpa;
    44330.0 * (1.0 - libm::powf(ratio, 0.1903))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[Calibration] = &[
        Calibration::None,
        Calibration::Steinhart {
            bias: 1000.0,
            a: 1.764e-3,
            b: 2.4995e-4,
            c: 6.7733e-8,
        },
        Calibration::Lookup { bias: 2200.0 },
        Calibration::Beta {
            bias: 10000.0,
            beta: 3950.0,
            r0: 10000.0,
            t0: 25.0,
        },
        Calibration::Polynomial {
            bias: 1000.0,
            a: -0.3682,
            b: 36.465,
            c: 10.648,
        },
        Calibration::Linear {
            v_min: 0.5,
            v_max: 4.5,
            out_min: 0.0,
            out_max: 5.0,
        },
        Calibration::VoltageDivider {
            r1: 22000.0,
            r2: 6800.0,
            correction: 1.01,
            offset: -0.05,
        },
        Calibration::Rpm {
            poles: 12,
            pulley_ratio: 3.0,
            multiplier: 1.0,
            timeout_ms: 2000,
            min_rpm: 100,
            max_rpm: 10000,
        },
        Calibration::Speed {
            pulses_per_rev: 4,
            tire_circumference_mm: 2100,
            final_drive_ratio: 3.73,
            multiplier: 1.0,
            timeout_ms: 1000,
            max_kph: 250,
        },
        Calibration::BusImport {
            source_id: 0x18FE_EE00,
            pid: 0x05,
            data_offset: 3,
            data_length: 2,
            big_endian: false,
            scale: 0.25,
            offset: -40.0,
        },
    ];

    #[test]
    fn test_kind_byte_round_trip() {
        for cal in SAMPLES {
            let kind = cal.kind();
            assert_eq!(CalibrationKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(CalibrationKind::from_u8(200), None);
    }

    #[test]
    fn test_payload_round_trip() {
        for cal in SAMPLES {
            let bytes = cal.to_bytes();
            assert_eq!(Calibration::from_bytes(cal.kind(), &bytes), *cal);
        }
    }

    #[test]
    fn test_payload_layout() {
        let bytes = Calibration::Lookup { bias: 1000.0 }.to_bytes();
        assert_eq!(&bytes[..4], &1000.0f32.to_le_bytes());
        assert!(bytes[4..].iter().all(|&b| b == 0));

        let bytes = Calibration::BusImport {
            source_id: 0x7E8,
            pid: 0x0C,
            data_offset: 0,
            data_length: 2,
            big_endian: true,
            scale: 0.25,
            offset: 0.0,
        }
        .to_bytes();
        assert_eq!(&bytes[..4], &[0xE8, 0x07, 0, 0]);
        assert_eq!(bytes[4], 0x0C);
        assert_eq!(bytes[7], 1);
    }

    #[test]
    fn test_interpolate() {
        static TABLE: LookupTable = LookupTable {
            resistance: &[300.0, 200.0, 100.0],
            temperature: &[0.0, 10.0, 20.0],
        };
        assert_eq!(TABLE.interpolate(400.0), 0.0);
        assert_eq!(TABLE.interpolate(50.0), 20.0);
        assert!((TABLE.interpolate(250.0) - 5.0).abs() < 1e-4);
        assert!((TABLE.interpolate(150.0) - 15.0).abs() < 1e-4);
        assert_eq!(TABLE.interpolate(200.0), 10.0);
        assert!(TABLE.interpolate(f32::NAN).is_nan());
    }

    #[test]
    fn test_divider_resistance() {
        // Mid-scale: sensor equals bias
        let r = divider_resistance(512, 1024, 1000.0).unwrap();
        assert!((r - 1000.0).abs() < 1e-3);
        assert_eq!(divider_resistance(1024, 1024, 1000.0), None);
        assert_eq!(divider_resistance(0, 1024, 1000.0), None);
    }

    #[test]
    fn test_beta_at_reference_point() {
        let t = beta_celsius(10000.0, 3950.0, 10000.0, 25.0);
        assert!((t - 25.0).abs() < 0.01);
        // Lower resistance is hotter on an NTC
        assert!(beta_celsius(5000.0, 3950.0, 10000.0, 25.0) > 25.0);
    }

    #[test]
    fn test_steinhart_matches_beta_style_ntc() {
        // Classic 10k NTC coefficients: 25 °C at 10 kΩ
        let t = steinhart_celsius(10000.0, 1.129241e-3, 2.341077e-4, 8.775468e-8);
        assert!((t - 25.0).abs() < 0.1);
    }

    #[test]
    fn test_linear_clamps() {
        assert_eq!(linear_output(2.5, 0.5, 4.5, 0.0, 5.0), 2.5);
        assert_eq!(linear_output(0.1, 0.5, 4.5, 0.0, 5.0), 0.0);
        assert_eq!(linear_output(4.9, 0.5, 4.5, 0.0, 5.0), 5.0);
    }

    #[test]
    fn test_polynomial_root_inverts_curve() {
        let (a, b, c) = (-0.3682, 36.465, 10.648);
        for p in [0.5f32, 1.0, 2.5, 4.0] {
            let ohms = a * p * p + b * p + c;
            let back = polynomial_root(ohms, a, b, c).unwrap();
            assert!((back - p).abs() < 1e-3, "{p} -> {back}");
        }
        // Far beyond the curve's maximum
        assert_eq!(polynomial_root(10000.0, a, b, c), None);
    }

    #[test]
    fn test_divider_voltage() {
        let v = divider_voltage(3.0, 30000.0, 10000.0, 1.0, 0.0);
        assert!((v - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_rpm_from_interval() {
        // 12 poles, 3:1 pulley = 18 pulses per engine revolution.
        // 1000 RPM = 300 pulses/s, interval 3333 us.
        let rpm = rpm_from_interval(3333, 12, 3.0, 1.0).unwrap();
        assert!((rpm - 1000.0).abs() < 1.0);
        assert_eq!(rpm_from_interval(0, 12, 3.0, 1.0), None);
    }

    #[test]
    fn test_kph_from_interval() {
        // 1 pulse/rev, direct drive, 1000 mm tyre, 10 rev/s = 36 km/h
        let kph = kph_from_interval(100_000, 1, 1000, 1.0, 1.0).unwrap();
        assert!((kph - 36.0).abs() < 1e-3);
    }

    #[test]
    fn test_altitude() {
        assert!(altitude_m(101_325.0, 1013.25).abs() < 0.5);
        let h = altitude_m(89_875.0, 1013.25);
        assert!((h - 1000.0).abs() < 10.0);
    }
}

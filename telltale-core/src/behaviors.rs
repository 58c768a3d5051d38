//! Sensor read and init behaviors
//!
//! Sensors refer to these by function pointer. A read behavior pulls raw data
//! through the [`SensorPort`] and converts it with the channel's effective
//! calibration into canonical units. An init behavior configures the port
//! once when a channel is bound to a new sensor.

use crate::calibration::{self, Calibration, LookupTable};
use crate::channel::ChannelId;
use crate::traits::{BusFrame, EnvQuantity, PortMode, SensorError, SensorPort};

/// Readings within this many counts of either rail are treated as faults
pub const ADC_RAIL_MARGIN: u16 = 3;

/// Below this, an unbiased voltage input is considered unconnected
pub const VOLTAGE_FLOOR_COUNTS: u16 = 10;

/// Standard sea-level pressure used for pressure altitude
pub const SEA_LEVEL_HPA: f32 = 1013.25;

/// Weight of the previous value in the pulse-input smoothing filter
const SMOOTHING: f32 = 0.8;

/// Everything a read behavior needs besides the port
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub id: ChannelId,
    /// Override if the channel has one, else the sensor default
    pub calibration: &'a Calibration,
    /// Table for lookup-calibrated sensors
    pub lookup: Option<&'static LookupTable>,
    /// Last stored value (NaN when none)
    pub previous: f32,
}

/// Read behavior: raw acquisition plus conversion to canonical units
pub type ReadFn = fn(&mut dyn SensorPort, &ReadContext<'_>) -> Result<f32, SensorError>;

/// Init behavior: one-off port configuration
pub type InitFn = fn(&mut dyn SensorPort, ChannelId);

// ----------------------------------------------------------------------------
// Thermocouple converters
// ----------------------------------------------------------------------------

/// Decode a MAX6675 frame (°C)
pub fn decode_max6675(frame: u16) -> Result<f32, SensorError> {
    if frame & 0x4 != 0 {
        return Err(SensorError::OpenCircuit);
    }
    Ok((frame >> 3) as f32 * 0.25)
}

/// Decode a MAX31855 frame (°C)
pub fn decode_max31855(frame: u32) -> Result<f32, SensorError> {
    match frame & 0x7 {
        0 => {}
        0x1 => return Err(SensorError::OpenCircuit),
        _ => return Err(SensorError::ShortCircuit),
    }
    // Top 14 bits, two's complement
    let raw = (frame as i32) >> 18;
    Ok(raw as f32 * 0.25)
}

pub fn read_max6675(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let frame = port.read_thermocouple(ctx.id)?;
    decode_max6675(frame as u16)
}

pub fn read_max31855(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let frame = port.read_thermocouple(ctx.id)?;
    decode_max31855(frame)
}

// ----------------------------------------------------------------------------
// Resistive senders
// ----------------------------------------------------------------------------

/// Sample a biased resistive sender and return its resistance
fn sender_ohms(port: &mut dyn SensorPort, id: ChannelId, bias: f32) -> Result<f32, SensorError> {
    let reading = port.read_analog(id)?;
    if reading.counts <= ADC_RAIL_MARGIN {
        return Err(SensorError::ShortCircuit);
    }
    if reading.counts >= reading.full_scale.saturating_sub(ADC_RAIL_MARGIN) {
        return Err(SensorError::OpenCircuit);
    }
    calibration::divider_resistance(reading.counts, reading.full_scale, bias)
        .ok_or(SensorError::ConversionError)
}

fn finite(value: f32) -> Result<f32, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::ConversionError)
    }
}

pub fn read_thermistor_steinhart(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let Calibration::Steinhart { bias, a, b, c } = *ctx.calibration else {
        return Err(SensorError::ConversionError);
    };
    let ohms = sender_ohms(port, ctx.id, bias)?;
    finite(calibration::steinhart_celsius(ohms, a, b, c))
}

pub fn read_thermistor_beta(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let Calibration::Beta { bias, beta, r0, t0 } = *ctx.calibration else {
        return Err(SensorError::ConversionError);
    };
    let ohms = sender_ohms(port, ctx.id, bias)?;
    finite(calibration::beta_celsius(ohms, beta, r0, t0))
}

pub fn read_thermistor_lookup(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let (Calibration::Lookup { bias }, Some(table)) = (*ctx.calibration, ctx.lookup) else {
        return Err(SensorError::ConversionError);
    };
    let ohms = sender_ohms(port, ctx.id, bias)?;
    finite(table.interpolate(ohms))
}

pub fn read_pressure_polynomial(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let Calibration::Polynomial { bias, a, b, c } = *ctx.calibration else {
        return Err(SensorError::ConversionError);
    };
    let ohms = sender_ohms(port, ctx.id, bias)?;
    calibration::polynomial_root(ohms, a, b, c).ok_or(SensorError::OutOfRange)
}

// ----------------------------------------------------------------------------
// Voltage inputs
// ----------------------------------------------------------------------------

pub fn read_linear(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let Calibration::Linear {
        v_min,
        v_max,
        out_min,
        out_max,
    } = *ctx.calibration
    else {
        return Err(SensorError::ConversionError);
    };
    let reading = port.read_analog(ctx.id)?;
    if reading.counts <= ADC_RAIL_MARGIN {
        return Err(SensorError::ShortCircuit);
    }
    if reading.counts >= reading.full_scale.saturating_sub(ADC_RAIL_MARGIN) {
        return Err(SensorError::OpenCircuit);
    }
    finite(calibration::linear_output(
        reading.volts(),
        v_min,
        v_max,
        out_min,
        out_max,
    ))
}

pub fn read_voltage_divider(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let Calibration::VoltageDivider {
        r1,
        r2,
        correction,
        offset,
    } = *ctx.calibration
    else {
        return Err(SensorError::ConversionError);
    };
    let reading = port.read_analog(ctx.id)?;
    if reading.counts < VOLTAGE_FLOOR_COUNTS {
        return Err(SensorError::NotConnected);
    }
    finite(calibration::divider_voltage(
        reading.volts(),
        r1,
        r2,
        correction,
        offset,
    ))
}

pub fn read_voltage_direct(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let reading = port.read_analog(ctx.id)?;
    if reading.counts < VOLTAGE_FLOOR_COUNTS {
        return Err(SensorError::NotConnected);
    }
    finite(reading.volts())
}

// ----------------------------------------------------------------------------
// Pulse inputs
// ----------------------------------------------------------------------------

fn smooth(previous: f32, current: f32) -> f32 {
    if previous.is_finite() && previous > 0.0 {
        previous * SMOOTHING + current * (1.0 - SMOOTHING)
    } else {
        current
    }
}

pub fn read_w_phase_rpm(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let Calibration::Rpm {
        poles,
        pulley_ratio,
        multiplier,
        timeout_ms,
        min_rpm,
        max_rpm,
    } = *ctx.calibration
    else {
        return Err(SensorError::ConversionError);
    };
    let timing = port.read_frequency(ctx.id)?;
    if timing.since_last_ms > timeout_ms as u32 {
        // Engine stopped
        return Ok(0.0);
    }
    let Some(rpm) = calibration::rpm_from_interval(timing.interval_us, poles, pulley_ratio, multiplier)
    else {
        return Ok(0.0);
    };
    if rpm < min_rpm as f32 || rpm > max_rpm as f32 {
        return Err(SensorError::OutOfRange);
    }
    Ok(smooth(ctx.previous, rpm))
}

pub fn read_hall_speed(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let Calibration::Speed {
        pulses_per_rev,
        tire_circumference_mm,
        final_drive_ratio,
        multiplier,
        timeout_ms,
        max_kph,
    } = *ctx.calibration
    else {
        return Err(SensorError::ConversionError);
    };
    let timing = port.read_frequency(ctx.id)?;
    if timing.since_last_ms > timeout_ms as u32 {
        // Vehicle stopped
        return Ok(0.0);
    }
    let Some(kph) = calibration::kph_from_interval(
        timing.interval_us,
        pulses_per_rev,
        tire_circumference_mm,
        final_drive_ratio,
        multiplier,
    ) else {
        return Ok(0.0);
    };
    if kph > max_kph as f32 {
        return Err(SensorError::OutOfRange);
    }
    Ok(smooth(ctx.previous, kph))
}

// ----------------------------------------------------------------------------
// Environmental (BME280)
// ----------------------------------------------------------------------------

pub fn read_bme280_temperature(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    port.read_environment(ctx.id, EnvQuantity::Temperature)
}

/// Station pressure in bar
pub fn read_bme280_pressure(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let pa = port.read_environment(ctx.id, EnvQuantity::Pressure)?;
    Ok(pa / 100_000.0)
}

pub fn read_bme280_humidity(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    port.read_environment(ctx.id, EnvQuantity::Humidity)
}

/// Pressure altitude in meters
pub fn read_bme280_elevation(
    port: &mut dyn SensorPort,
    ctx: &ReadContext<'_>,
) -> Result<f32, SensorError> {
    let pa = port.read_environment(ctx.id, EnvQuantity::Pressure)?;
    finite(calibration::altitude_m(pa, SEA_LEVEL_HPA))
}

// ----------------------------------------------------------------------------
// Digital
// ----------------------------------------------------------------------------

/// Normally-closed float switch: high = level ok = 1.0
pub fn read_float_switch(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let high = port.read_digital(ctx.id)?;
    Ok(if high { 1.0 } else { 0.0 })
}

// ----------------------------------------------------------------------------
// Bus import
// ----------------------------------------------------------------------------

/// Extract an unsigned integer of 1 to 4 bytes from a frame
pub fn extract_bus_value(frame: &BusFrame, offset: u8, length: u8, big_endian: bool) -> Option<u32> {
    let (offset, length) = (offset as usize, length as usize);
    if length == 0 || length > 4 || offset + length > (frame.len as usize).min(frame.data.len()) {
        return None;
    }
    let bytes = &frame.data[offset..offset + length];
    let value = if big_endian {
        bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
    } else {
        bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32)
    };
    Some(value)
}

pub fn read_bus_import(port: &mut dyn SensorPort, ctx: &ReadContext<'_>) -> Result<f32, SensorError> {
    let Calibration::BusImport {
        source_id,
        pid,
        data_offset,
        data_length,
        big_endian,
        scale,
        offset,
    } = *ctx.calibration
    else {
        return Err(SensorError::ConversionError);
    };
    let frame = port.read_bus_frame(source_id, pid)?;
    let raw = extract_bus_value(&frame, data_offset, data_length, big_endian)
        .ok_or(SensorError::ConversionError)?;
    Ok(raw as f32 * scale + offset)
}

// ----------------------------------------------------------------------------
// Init behaviors
// ----------------------------------------------------------------------------

fn configure(port: &mut dyn SensorPort, id: ChannelId, mode: PortMode) {
    match port.configure(id, mode) {
        Ok(()) => debug!("channel {} configured as {}", id, mode),
        Err(e) => warn!("channel {} configure {} failed: {}", id, mode, e),
    }
}

pub fn init_chip_select(port: &mut dyn SensorPort, id: ChannelId) {
    configure(port, id, PortMode::ChipSelect);
}

pub fn init_pulse_capture(port: &mut dyn SensorPort, id: ChannelId) {
    configure(port, id, PortMode::PulseCapture);
}

pub fn init_input_pull_up(port: &mut dyn SensorPort, id: ChannelId) {
    configure(port, id, PortMode::InputPullUp);
}

pub fn init_environmental(port: &mut dyn SensorPort, id: ChannelId) {
    configure(port, id, PortMode::Environmental);
}

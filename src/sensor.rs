//! Battery and climate sampling
//!
//! Each field of a [`SensorReading`] is read independently. A failed read
//! leaves that field as `None` and is logged; it never fails the cycle.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::sensor::{NoSensor, SensorSampler};
//! # struct MockDelay;
//! # impl embedded_hal::delay::DelayNs for MockDelay { fn delay_ns(&mut self, _ns: u32) {} }
//! # let mut delay = MockDelay;
//!
//! let mut sampler = SensorSampler::new(NoSensor, NoSensor);
//! let reading = sampler.sample(&mut delay);
//! assert_eq!(reading.battery_mv, None);
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::SensorError;

/// Battery voltage treated as empty
pub const BATTERY_MIN_MV: u16 = 3000;

/// Battery voltage treated as full
pub const BATTERY_MAX_MV: u16 = 4200;

/// Default bound on a single sensor read
pub const SENSOR_TIMEOUT_MS: u32 = 20;

/// One sample of every sensor
///
/// `None` marks a field that could not be read this cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensorReading {
    /// Battery voltage in millivolts
    pub battery_mv: Option<u16>,
    /// Temperature in tenths of a degree Celsius
    pub temperature_dc: Option<i16>,
    /// Relative humidity in tenths of a percent
    pub humidity_dpct: Option<u16>,
}

impl SensorReading {
    /// Battery charge estimate, if the voltage is known
    pub fn battery_percentage(&self) -> Option<u8> {
        self.battery_mv.map(battery_percentage)
    }
}

/// Linear LiPo charge estimate between 3.0 V and 4.2 V
///
/// ```
/// use reterminal_e100x::sensor::battery_percentage;
///
/// assert_eq!(battery_percentage(4200), 100);
/// assert_eq!(battery_percentage(3600), 50);
/// assert_eq!(battery_percentage(3000), 0);
/// ```
pub fn battery_percentage(voltage_mv: u16) -> u8 {
    if voltage_mv <= BATTERY_MIN_MV {
        0
    } else if voltage_mv >= BATTERY_MAX_MV {
        100
    } else {
        (u32::from(voltage_mv - BATTERY_MIN_MV) * 100 / u32::from(BATTERY_MAX_MV - BATTERY_MIN_MV))
            as u8
    }
}

/// Temperature and humidity pair from one measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Climate {
    /// Tenths of a degree Celsius
    pub temperature_dc: i16,
    /// Tenths of a percent relative humidity
    pub humidity_dpct: u16,
}

/// Source of the battery voltage (usually an ADC behind a divider or a
/// fuel gauge)
pub trait BatteryGauge {
    /// Read the battery voltage in millivolts
    ///
    /// Must give up after waiting `timeout_ms` on `delay`.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError`] if the conversion fails or times out.
    fn read_millivolts<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<u16, SensorError>;
}

/// Temperature and humidity sensor
pub trait ClimateSensor {
    /// Run one measurement
    ///
    /// Must give up after waiting `timeout_ms` on `delay`.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError`] if the measurement fails or times out.
    fn measure<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<Climate, SensorError>;
}

/// Placeholder for hardware that is not fitted
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSensor;

impl BatteryGauge for NoSensor {
    fn read_millivolts<D: DelayNs>(
        &mut self,
        _delay: &mut D,
        _timeout_ms: u32,
    ) -> Result<u16, SensorError> {
        Err(SensorError::Unavailable)
    }
}

impl ClimateSensor for NoSensor {
    fn measure<D: DelayNs>(
        &mut self,
        _delay: &mut D,
        _timeout_ms: u32,
    ) -> Result<Climate, SensorError> {
        Err(SensorError::Unavailable)
    }
}

/// Samples every sensor once per wake cycle
///
/// Every read is bounded by the same timeout, so a stuck sensor costs at most
/// `timeout_ms` per field.
pub struct SensorSampler<B, C> {
    battery: B,
    climate: C,
    timeout_ms: u32,
}

impl<B, C> SensorSampler<B, C>
where
    B: BatteryGauge,
    C: ClimateSensor,
{
    /// Create a sampler with the default read timeout
    pub fn new(battery: B, climate: C) -> Self {
        Self {
            battery,
            climate,
            timeout_ms: SENSOR_TIMEOUT_MS,
        }
    }

    /// Use another per-read timeout
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Per-read timeout
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Read every sensor, replacing failures with `None`
    pub fn sample<D: DelayNs>(&mut self, delay: &mut D) -> SensorReading {
        let mut reading = SensorReading::default();

        match self.battery.read_millivolts(delay, self.timeout_ms) {
            Ok(mv) => reading.battery_mv = Some(mv),
            Err(err) => log_failure("battery", err),
        }

        match self.climate.measure(delay, self.timeout_ms) {
            Ok(climate) => {
                reading.temperature_dc = Some(climate.temperature_dc);
                reading.humidity_dpct = Some(climate.humidity_dpct);
            }
            Err(err) => log_failure("climate", err),
        }

        log::debug!("sensors: {:?}", reading);
        reading
    }

    /// Release the sensors
    pub fn release(self) -> (B, C) {
        (self.battery, self.climate)
    }
}

fn log_failure(sensor: &str, err: SensorError) {
    if err == SensorError::Unavailable {
        log::debug!("sensors: {} not fitted", sensor);
    } else {
        log::warn!("sensors: {} read failed: {}", sensor, err);
    }
}

/// Default I2C address of the SHT40
pub const SHT4X_ADDRESS: u8 = 0x44;

/// High-precision measurement command
const SHT4X_MEASURE_HIGH: u8 = 0xFD;

/// SHT4x temperature and humidity sensor
pub struct Sht4x<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Sht4x<I2C> {
    /// Sensor at the default address
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: SHT4X_ADDRESS,
        }
    }

    /// Use another I2C address
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> ClimateSensor for Sht4x<I2C> {
    fn measure<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<Climate, SensorError> {
        self.i2c
            .write(self.address, &[SHT4X_MEASURE_HIGH])
            .map_err(|_| SensorError::Bus)?;

        // The sensor NACKs reads until the conversion is done
        let mut raw = [0u8; 6];
        let mut waited = 0u32;
        loop {
            delay.delay_ms(1);
            waited += 1;
            if self.i2c.read(self.address, &mut raw).is_ok() {
                break;
            }
            if waited >= timeout_ms {
                return Err(SensorError::Timeout);
            }
        }

        if crc8(&raw[0..2]) != raw[2] || crc8(&raw[3..5]) != raw[5] {
            return Err(SensorError::Crc);
        }
        let t_raw = i32::from(u16::from_be_bytes([raw[0], raw[1]]));
        let rh_raw = i32::from(u16::from_be_bytes([raw[3], raw[4]]));

        let temperature_dc = -450 + 1750 * t_raw / 65535;
        let humidity_dpct = (-60 + 1250 * rh_raw / 65535).clamp(0, 1000);
        Ok(Climate {
            temperature_dc: temperature_dc as i16,
            humidity_dpct: humidity_dpct as u16,
        })
    }
}

/// Sensirion CRC-8 (polynomial 0x31, init 0xFF)
fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0xFFu8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

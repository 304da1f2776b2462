#![no_std]
#![deny(missing_docs)]

/*! # DS18B20
 *
 * Temperature read protocol for DS18B20-style 1-Wire sensors, generic over any bus master
 * implementing [`OneWire`] and a [`DelayNs`] timer.
 *
 * A read starts a conversion, waits the conversion time, fetches the 9-byte scratchpad and
 * accepts it only if its CRC-8 validates. Failed attempts are repeated from the bus reset, up
 * to a fixed number of attempts (2 by default). Parasite powered sensors get the strong
 * pull-up of the master during the conversion.
 *
 * The caller must hold exclusive access to the bus for the duration of a read.
 */

use embedded_hal::delay::DelayNs;
use embedded_onewire::{DeviceRom, OneWire, OneWireCrc, OneWireError};
use fixed::types::I28F4;
use log::{debug, error, warn};

mod error;

pub use error::{ReadError, ReadFailure};

/// Temperature in degrees Celsius, 1/16 °C resolution.
///
/// Wide enough to hold every decoded scratchpad word, including malformed ones.
pub type Temperature = I28F4;

const DS18B20_START_CONV: u8 = 0x44;
const DS18B20_READ_SCRATCH: u8 = 0xbe;
const DS18B20_WRITE_SCRATCH: u8 = 0x4e;
const DS18B20_READ_POWERMODE: u8 = 0xb4;

/// Decode the two temperature bytes of the scratchpad.
///
/// The word is sign extended from bit 12, the lowest bit of the sign field.
pub fn decode_raw(lo: u8, hi: u8) -> Temperature {
    let mut raw = (lo as i32) | ((hi as i32) << 8);
    if raw & 0x1000 != 0 {
        raw |= 0xffff_0000_u32 as i32;
    }
    Temperature::from_bits(raw)
}

/// Encode a temperature into the two scratchpad bytes, saturating at the 16-bit range.
pub fn encode_raw(temp: Temperature) -> [u8; 2] {
    let raw = temp.to_bits().clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    raw.to_le_bytes()
}

/// Readout resolution, the configuration register value of the sensor.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// 9 bits, 0.5 °C.
    Bits9 = 0x1f,
    /// 10 bits, 0.25 °C.
    Bits10 = 0x3f,
    /// 11 bits, 0.125 °C.
    Bits11 = 0x5f,
    /// 12 bits, 0.0625 °C.
    #[default]
    Bits12 = 0x7f,
}

impl Resolution {
    /// Maximum conversion time in milliseconds.
    pub fn conversion_time_ms(&self) -> u32 {
        use Resolution::*;
        match self {
            Bits9 => 94,
            Bits10 => 188,
            Bits11 => 375,
            Bits12 => 750,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Resolution::*;
        match value {
            0x1f => Ok(Bits9),
            0x3f => Ok(Bits10),
            0x5f => Ok(Bits11),
            0x7f => Ok(Bits12),
            other => Err(other),
        }
    }
}

/// How the sensor is powered.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PowerMode {
    /// Dedicated supply pin; the normal pull-up suffices during conversion.
    #[default]
    External,
    /// Powered from the data line; needs the strong pull-up during conversion.
    Parasite,
}

/// CRC-validated scratchpad of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; 9]);

impl Scratchpad {
    /// Size of the scratchpad including the CRC byte.
    pub const BYTES: usize = 9;

    /// Validate `raw`: the CRC-8 over all 9 bytes has to be zero.
    pub fn from_bytes(raw: [u8; Self::BYTES]) -> Option<Self> {
        OneWireCrc::validate(&raw).then_some(Self(raw))
    }

    /// Decoded temperature.
    pub fn temperature(&self) -> Temperature {
        decode_raw(self.0[0], self.0[1])
    }

    /// High alarm threshold (TH), whole degrees.
    pub fn alarm_high(&self) -> i8 {
        self.0[2] as i8
    }

    /// Low alarm threshold (TL), whole degrees.
    pub fn alarm_low(&self) -> i8 {
        self.0[3] as i8
    }

    /// Configuration register; [`None`] if it does not encode a resolution.
    pub fn resolution(&self) -> Option<Resolution> {
        Resolution::try_from(self.0[4]).ok()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }
}

/// Outcome of [`Ds18b20::read_temperature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureSample {
    temperature: Option<Temperature>,
    attempts: u8,
    failure: Option<ReadFailure>,
}

impl TemperatureSample {
    /// A scratchpad validated and was decoded.
    pub fn success(&self) -> bool {
        self.temperature.is_some()
    }

    /// The decoded temperature, if any.
    pub fn temperature(&self) -> Option<Temperature> {
        self.temperature
    }

    /// Temperature in °C, `0.0` when the read failed.
    pub fn celsius(&self) -> f32 {
        self.temperature.map(|t| t.to_num()).unwrap_or(0.0)
    }

    /// `(success, celsius)`.
    pub fn as_pair(&self) -> (bool, f32) {
        (self.success(), self.celsius())
    }

    /// Number of attempts made, including the successful one.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Failure of the most recent failed attempt. Set after a successful retry as well.
    pub fn failure(&self) -> Option<ReadFailure> {
        self.failure
    }
}

/// Temperature reader for one sensor, or for the only sensor on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18b20 {
    rom: Option<DeviceRom>,
    power: PowerMode,
    attempts: u8,
    conversion_delay_ms: u32,
}

impl Ds18b20 {
    /// Family code of the sensor.
    #[inline]
    pub const fn family() -> u8 {
        0x28
    }

    /// Reader for the sensor with ROM code `rom` (Match ROM).
    pub fn new(rom: DeviceRom) -> Self {
        Self::with_rom(Some(rom))
    }

    /// Reader for the only sensor on the bus (Skip ROM).
    pub fn single() -> Self {
        Self::with_rom(None)
    }

    fn with_rom(rom: Option<DeviceRom>) -> Self {
        Self {
            rom,
            power: PowerMode::External,
            attempts: 2,
            conversion_delay_ms: 1000,
        }
    }

    /// Sets how the sensor is powered.
    pub fn with_power_mode(mut self, power: PowerMode) -> Self {
        self.power = power;
        self
    }

    /// Sets the number of attempts of [`Ds18b20::read_temperature`], at least 1.
    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sets the time waited for a conversion, in milliseconds.
    pub fn with_conversion_delay_ms(mut self, ms: u32) -> Self {
        self.conversion_delay_ms = ms;
        self
    }

    /// ROM code of the sensor, [`None`] for Skip ROM.
    pub fn rom(&self) -> Option<&DeviceRom> {
        self.rom.as_ref()
    }

    /// Power mode of the sensor.
    pub fn power_mode(&self) -> PowerMode {
        self.power
    }

    /// Read the temperature, retrying failed attempts from the bus reset.
    ///
    /// Never fails: the outcome, the number of attempts and the last failure are reported in
    /// the returned sample. A scratchpad that does not validate is never decoded. An empty bus
    /// is a result, not a fault: the read stops at the first reset nobody answers.
    pub fn read_temperature<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> TemperatureSample {
        self.read_with(bus, |_, ms| delay.delay_ms(ms))
    }

    /// Like [`Ds18b20::read_temperature`], timing the conversion with the delay of the bus
    /// master itself, e.g. the delay cycles of a controller.
    pub fn read_temperature_timed<O: OneWire + DelayNs>(&self, bus: &mut O) -> TemperatureSample {
        self.read_with(bus, |bus, ms| bus.delay_ms(ms))
    }

    fn read_with<O: OneWire>(
        &self,
        bus: &mut O,
        mut wait: impl FnMut(&mut O, u32),
    ) -> TemperatureSample {
        let mut failure = None;
        for attempt in 1..=self.attempts {
            match self.attempt(bus, &mut wait) {
                Ok(temp) => {
                    debug!("ds18b20: {temp} °C after {attempt} attempt(s)");
                    return TemperatureSample {
                        temperature: Some(temp),
                        attempts: attempt,
                        failure,
                    };
                }
                Err(e) if e.kind() == ReadFailure::DeviceNotPresent => {
                    debug!("ds18b20: no device present on attempt {attempt}");
                    return TemperatureSample {
                        temperature: None,
                        attempts: attempt,
                        failure: Some(ReadFailure::DeviceNotPresent),
                    };
                }
                Err(e) => {
                    let kind = e.kind();
                    warn!("ds18b20: attempt {attempt}/{} failed: {kind}", self.attempts);
                    failure = Some(kind);
                }
            }
        }
        error!("ds18b20: no valid reading after {} attempts", self.attempts);
        TemperatureSample {
            temperature: None,
            attempts: self.attempts,
            failure,
        }
    }

    /// One attempt: convert, wait, read and validate the scratchpad.
    pub fn try_read<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> Result<Temperature, ReadError<O::BusError>> {
        let mut wait = |_: &mut O, ms: u32| delay.delay_ms(ms);
        self.attempt(bus, &mut wait)
    }

    fn attempt<O: OneWire>(
        &self,
        bus: &mut O,
        wait: &mut impl FnMut(&mut O, u32),
    ) -> Result<Temperature, ReadError<O::BusError>> {
        self.start_conversion(bus)?;
        if self.power == PowerMode::Parasite {
            if let Err(e) = bus.set_strong_pullup(true) {
                let _ = bus.set_strong_pullup(false);
                return Err(ReadError::PullupError(e));
            }
        }
        wait(bus, self.conversion_delay_ms);
        match bus.set_strong_pullup(false) {
            Ok(()) => {}
            Err(OneWireError::Unimplemented) if self.power == PowerMode::External => {}
            Err(e) => return Err(ReadError::PullupError(e)),
        }
        Ok(self.read_scratchpad(bus)?.temperature())
    }

    /// Address the sensor and start a temperature conversion.
    pub fn start_conversion<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> Result<(), ReadError<O::BusError>> {
        bus.address(self.rom.as_ref())?;
        bus.write_byte(DS18B20_START_CONV)?;
        debug!("ds18b20: conversion started");
        Ok(())
    }

    /// Address the sensor and read its scratchpad.
    ///
    /// # Errors
    /// [`ReadError::CrcMismatch`] if the 9 bytes do not validate.
    pub fn read_scratchpad<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> Result<Scratchpad, ReadError<O::BusError>> {
        bus.address(self.rom.as_ref())?;
        bus.write_byte(DS18B20_READ_SCRATCH)?;
        let mut buf = [0; Scratchpad::BYTES];
        bus.read_bytes(&mut buf)?;
        Scratchpad::from_bytes(buf).ok_or(ReadError::CrcMismatch)
    }

    /// Ask the sensor how it is powered; parasite powered sensors pull the read slot low.
    pub fn read_power_supply<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> Result<PowerMode, ReadError<O::BusError>> {
        bus.address(self.rom.as_ref())?;
        bus.write_byte(DS18B20_READ_POWERMODE)?;
        Ok(if bus.read_bit()? {
            PowerMode::External
        } else {
            PowerMode::Parasite
        })
    }

    /// Write the alarm thresholds and the readout resolution.
    pub fn configure<O: OneWire>(
        &self,
        bus: &mut O,
        high: i8,
        low: i8,
        resolution: Resolution,
    ) -> Result<(), ReadError<O::BusError>> {
        bus.address(self.rom.as_ref())?;
        bus.write_byte(DS18B20_WRITE_SCRATCH)?;
        bus.write_bytes(&[high as u8, low as u8, resolution as u8])?;
        Ok(())
    }
}

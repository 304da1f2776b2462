use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::OneWireCrc;

/// 64-bit 1-Wire device identifier.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6  | Serial number, least significant byte first |
/// | 7    | CRC-8 of bytes 0-6 |
///
/// The bytes are kept in transmission order; [`DeviceRom::as_bytes`] is exactly what goes on
/// the wire after a Match ROM command. A `DeviceRom` can only be built from a code whose CRC
/// byte validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DeviceRom([u8; 8]);

impl DeviceRom {
    /// Length of a ROM code in bytes.
    pub const BYTES: usize = 8;

    /// Build a ROM code from its family code and serial number, computing the CRC byte.
    pub fn new(family: u8, serial: [u8; 6]) -> Self {
        let mut raw = [family, 0, 0, 0, 0, 0, 0, 0];
        raw[1..7].copy_from_slice(&serial);
        raw[7] = OneWireCrc::compute(&raw[..7]);
        Self(raw)
    }

    /// Validate the CRC byte of a raw ROM code.
    ///
    /// Returns [`None`] if the CRC-8 of the first seven bytes does not equal the last byte.
    pub fn from_bytes(raw: [u8; 8]) -> Option<Self> {
        if OneWireCrc::compute(&raw[..7]) == raw[7] {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Family code of the device.
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// 48-bit serial number, least significant byte first.
    pub fn serial(&self) -> [u8; 6] {
        let mut serial = [0; 6];
        serial.copy_from_slice(&self.0[1..7]);
        serial
    }

    /// Stored CRC byte.
    pub fn crc(&self) -> u8 {
        self.0[7]
    }

    /// ROM bytes in transmission order.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<DeviceRom> for u64 {
    fn from(rom: DeviceRom) -> Self {
        u64::from_le_bytes(rom.0)
    }
}

impl TryFrom<u64> for DeviceRom {
    type Error = RomParseError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_bytes(value.to_le_bytes()).ok_or(RomParseError::InvalidCrc)
    }
}

impl TryFrom<[u8; 8]> for DeviceRom {
    type Error = RomParseError;

    fn try_from(value: [u8; 8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value).ok_or(RomParseError::InvalidCrc)
    }
}

/// Error parsing a textual or raw ROM code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomParseError {
    /// Fewer than 16 hex digits.
    NotEnough,
    /// A character that is not a hex digit, or trailing digits.
    Invalid,
    /// The CRC byte does not match the first seven bytes.
    InvalidCrc,
}

impl Display for RomParseError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            RomParseError::NotEnough => write!(f, "ROM code needs 16 hex digits"),
            RomParseError::Invalid => write!(f, "ROM code contains invalid characters"),
            RomParseError::InvalidCrc => write!(f, "ROM code CRC does not match"),
        }
    }
}

impl core::error::Error for RomParseError {}

/// Parses the transmission-order byte sequence, e.g. `28 01 02 03 04 05 06 9e`.
/// Whitespace, `:` and `-` separators are ignored.
impl FromStr for DeviceRom {
    type Err = RomParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; 8];
        let mut digits = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
            .map(|c| c.to_digit(16));
        for byte in raw.iter_mut() {
            match (digits.next(), digits.next()) {
                (Some(Some(h)), Some(Some(l))) => *byte = ((h << 4) | l) as u8,
                (Some(None), _) | (_, Some(None)) => return Err(RomParseError::Invalid),
                _ => return Err(RomParseError::NotEnough),
            }
        }
        if digits.next().is_some() {
            return Err(RomParseError::Invalid);
        }
        Self::try_from(raw)
    }
}

/// Prints the code most significant byte first (CRC, serial, family), the way it is
/// printed on device labels.
impl Display for DeviceRom {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for b in self.0.iter().rev() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc_is_validated() {
        let rom = DeviceRom::from_bytes([0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x9e]);
        assert!(rom.is_some());
        assert!(DeviceRom::from_bytes([0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xc9]).is_none());
    }

    #[test]
    fn fields() {
        let rom = DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6]);
        assert_eq!(rom.family(), 0x28);
        assert_eq!(rom.serial(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(rom.crc(), 0x9e);
        assert_eq!(u64::from(rom), 0x9e06_0504_0302_0128);
        assert_eq!(DeviceRom::try_from(0x9e06_0504_0302_0128u64), Ok(rom));
    }

    #[test]
    fn parse() {
        let rom: DeviceRom = "28 01 02 03 04 05 06 9e".parse().unwrap();
        assert_eq!(rom, DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6]));
        assert_eq!("28:01:02:03:04:05:06:9E".parse::<DeviceRom>(), Ok(rom));
        assert_eq!(
            "28010203040506".parse::<DeviceRom>(),
            Err(RomParseError::NotEnough)
        );
        assert_eq!(
            "28010203040506zz".parse::<DeviceRom>(),
            Err(RomParseError::Invalid)
        );
        assert_eq!(
            "28010203040506c9".parse::<DeviceRom>(),
            Err(RomParseError::InvalidCrc)
        );
    }

    #[test]
    fn random_codes() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..256 {
            let family: u8 = rng.random();
            let serial: [u8; 6] = rng.random();
            let rom = DeviceRom::new(family, serial);
            assert_eq!(OneWireCrc::compute(&rom.as_bytes()[..7]), rom.crc());
            assert!(OneWireCrc::validate(rom.as_bytes()));
            assert_eq!(DeviceRom::from_bytes(*rom.as_bytes()), Some(rom));
        }
    }

    #[test]
    fn display() {
        extern crate std;
        use std::string::ToString;
        let rom = DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6]);
        assert_eq!(rom.to_string(), "9E06050403020128");
    }
}

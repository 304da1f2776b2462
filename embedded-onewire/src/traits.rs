use crate::{
    DeviceRom, OneWireError, OneWireResult,
    consts::{
        ONEWIRE_MATCH_ROM_CMD, ONEWIRE_MATCH_ROM_CMD_OD, ONEWIRE_READ_ROM_CMD,
        ONEWIRE_SKIP_ROM_CMD, ONEWIRE_SKIP_ROM_CMD_OD,
    },
};

/// Trait for 1-Wire communication.
///
/// A bus master provides the three time-slot primitives ([`reset`](OneWire::reset),
/// [`write_bit`](OneWire::write_bit), [`read_bit`](OneWire::read_bit)); byte transfers and
/// device addressing are built on top of them. Masters that move whole bytes in hardware
/// may override the byte methods.
///
/// Every method issues its time slots immediately and in program order. Callers composing a
/// transaction out of several calls (reset, address, command, data) must hold exclusive
/// access to the bus for the whole sequence.
pub trait OneWire {
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and samples the presence pulse.
    ///
    /// # Returns
    /// `true` if at least one device answered with a presence pulse. An empty bus is not an
    /// error.
    ///
    /// # Errors
    /// This method returns an error if the reset time slot fails.
    fn reset(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write time slot fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read time slot fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if any of the write time slots fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        for idx in 0..8 {
            self.write_bit((byte >> idx) & 0x1 == 0x1)?;
        }
        Ok(())
    }

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if any of the read time slots fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let mut byte = 0;
        for idx in 0..8 {
            if self.read_bit()? {
                byte |= 1 << idx;
            }
        }
        Ok(byte)
    }

    /// Writes a sequence of bytes in order.
    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in bytes.iter() {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Fills `buf` with bytes read from the bus.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Check if the 1-Wire bus is in overdrive mode.
    fn get_overdrive_mode(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Set the 1-Wire bus to overdrive mode.
    /// # Arguments
    /// * `enable` - A boolean indicating whether to enable or disable overdrive mode.
    fn set_overdrive_mode(&mut self, _enable: bool) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Drive the line high through the strong pull-up (parasite power delivery).
    ///
    /// Strong pull-up has to be released with `set_strong_pullup(false)` before any further
    /// time slot is issued; while it is on, the line cannot be pulled low by a device.
    fn set_strong_pullup(&mut self, _enable: bool) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Addresses devices on the 1-Wire bus.
    ///
    /// Resets the bus, then sends Match ROM followed by the 8 ROM bytes, or Skip ROM when
    /// `rom` is [`None`]. The overdrive variants of both commands are used when the bus is in
    /// overdrive mode. Afterwards exactly the addressed device (or every device) listens for
    /// the next function command.
    ///
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if
    /// this method is called without specifying a ROM address on a bus with multiple devices.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if nothing answers the reset pulse.
    fn address(&mut self, rom: Option<&DeviceRom>) -> OneWireResult<(), Self::BusError> {
        let od = self.get_overdrive_mode()?;
        let cmd = match (rom.is_some(), od) {
            (true, false) => ONEWIRE_MATCH_ROM_CMD,
            (true, true) => ONEWIRE_MATCH_ROM_CMD_OD,
            (false, false) => ONEWIRE_SKIP_ROM_CMD,
            (false, true) => ONEWIRE_SKIP_ROM_CMD_OD,
        };
        if !self.reset()? {
            return Err(OneWireError::NoDevicePresent);
        }
        self.write_byte(cmd)?;
        if let Some(rom) = rom {
            self.write_bytes(rom.as_bytes())?;
        }
        Ok(())
    }

    /// Select the device with the given ROM code (reset + Match ROM).
    fn select_device(&mut self, rom: &DeviceRom) -> OneWireResult<(), Self::BusError> {
        self.address(Some(rom))
    }

    /// Select every device on the bus (reset + Skip ROM).
    /// Only meaningful when a single device is attached, or for broadcast commands.
    fn select_all(&mut self) -> OneWireResult<(), Self::BusError> {
        self.address(None)
    }

    /// Read the ROM code of the only device on the bus.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] on an empty bus, [`OneWireError::InvalidCrc`] if the
    /// code does not validate (typically because more than one device answered).
    fn read_rom(&mut self) -> OneWireResult<DeviceRom, Self::BusError> {
        if !self.reset()? {
            return Err(OneWireError::NoDevicePresent);
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD)?;
        let mut raw = [0; DeviceRom::BYTES];
        self.read_bytes(&mut raw)?;
        DeviceRom::from_bytes(raw).ok_or(OneWireError::InvalidCrc)
    }
}

#[cfg(test)]
mod test {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    /// Records written bits and plays back a queue of read bits.
    #[derive(Default)]
    struct Recorder {
        presence: bool,
        overdrive: bool,
        resets: usize,
        written: Vec<bool>,
        to_read: Vec<bool>,
    }

    impl OneWire for Recorder {
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<bool, ()> {
            self.resets += 1;
            Ok(self.presence)
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
            self.written.push(bit);
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            Ok(self.to_read.remove(0))
        }

        fn get_overdrive_mode(&mut self) -> OneWireResult<bool, ()> {
            Ok(self.overdrive)
        }
    }

    fn bytes_of(bits: &[bool]) -> Vec<u8> {
        bits.chunks(8)
            .map(|c| c.iter().rev().fold(0u8, |acc, &b| (acc << 1) | b as u8))
            .collect()
    }

    fn bits_of(bytes: &[u8]) -> Vec<bool> {
        bytes
            .iter()
            .flat_map(|b| (0..8).map(move |i| (b >> i) & 1 == 1))
            .collect()
    }

    #[test]
    fn byte_is_sent_lsb_first() {
        let mut bus = Recorder::default();
        bus.write_byte(0x44).unwrap();
        assert_eq!(
            bus.written,
            [false, false, true, false, false, false, true, false]
        );
    }

    #[test]
    fn byte_is_assembled_lsb_first() {
        let mut bus = Recorder {
            to_read: bits_of(&[0xc8]),
            ..Default::default()
        };
        assert_eq!(bus.read_byte(), Ok(0xc8));
    }

    #[test]
    fn match_rom_sequence() {
        let rom = DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6]);
        let mut bus = Recorder {
            presence: true,
            ..Default::default()
        };
        bus.select_device(&rom).unwrap();
        assert_eq!(bus.resets, 1);
        assert_eq!(
            bytes_of(&bus.written),
            [0x55, 0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x9e]
        );
    }

    #[test]
    fn skip_rom_sequence() {
        let mut bus = Recorder {
            presence: true,
            ..Default::default()
        };
        bus.select_all().unwrap();
        assert_eq!(bytes_of(&bus.written), [0xcc]);
    }

    #[test]
    fn overdrive_match_rom_sequence() {
        let rom = DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6]);
        let mut bus = Recorder {
            presence: true,
            overdrive: true,
            ..Default::default()
        };
        bus.select_device(&rom).unwrap();
        assert_eq!(
            bytes_of(&bus.written),
            [0x69, 0x28, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x9e]
        );
    }

    #[test]
    fn overdrive_skip_rom_sequence() {
        let mut bus = Recorder {
            presence: true,
            overdrive: true,
            ..Default::default()
        };
        bus.select_all().unwrap();
        assert_eq!(bus.resets, 1);
        assert_eq!(bytes_of(&bus.written), [0x3c]);
    }

    #[test]
    fn empty_bus_is_not_addressed() {
        let mut bus = Recorder::default();
        assert_eq!(bus.select_all(), Err(OneWireError::NoDevicePresent));
        assert!(bus.written.is_empty());
    }

    #[test]
    fn read_rom_validates_crc() {
        let mut bus = Recorder {
            presence: true,
            to_read: bits_of(&[0x28, 1, 2, 3, 4, 5, 6, 0x9e]),
            ..Default::default()
        };
        assert_eq!(bus.read_rom(), Ok(DeviceRom::new(0x28, [1, 2, 3, 4, 5, 6])));
        assert_eq!(bytes_of(&bus.written), [0x33]);

        let mut bus = Recorder {
            presence: true,
            to_read: bits_of(&[0x28, 1, 2, 3, 4, 5, 6, 0xc9]),
            ..Default::default()
        };
        assert_eq!(bus.read_rom(), Err(OneWireError::InvalidCrc));
    }
}

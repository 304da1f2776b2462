/// Reflected form of the Dallas/Maxim polynomial `X^8 + X^5 + X^4 + 1`.
const POLYNOMIAL: u8 = 0x8c;

#[cfg(feature = "crc-table")]
static CRC_TABLE: [u8; 256] = crc_table();

#[cfg(feature = "crc-table")]
const fn crc_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut idx = 0;
    while idx < 256 {
        table[idx] = shift_byte(idx as u8);
        idx += 1;
    }
    table
}

/// Clock eight bits through the LFSR, LSB first.
const fn shift_byte(mut crc: u8) -> u8 {
    let mut bit = 0;
    while bit < 8 {
        if crc & 0x1 == 0x1 {
            crc = (crc >> 1) ^ POLYNOMIAL;
        } else {
            crc >>= 1;
        }
        bit += 1;
    }
    crc
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// The accumulator starts at zero and is fed one byte at a time, in the order the bytes
/// travel on the wire. A block that carries its own CRC as the last byte always collapses
/// the accumulator back to zero.
pub struct OneWireCrc(u8);

impl OneWireCrc {
    /// Create an accumulator seeded with zero.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Reseed the accumulator with zero.
    pub fn reset(&mut self) {
        self.0 = 0;
    }

    /// Update the CRC with the incoming byte and return the running value.
    pub fn update(&mut self, byte: u8) -> u8 {
        #[cfg(feature = "crc-table")]
        {
            self.0 = CRC_TABLE[(self.0 ^ byte) as usize];
        }
        #[cfg(not(feature = "crc-table"))]
        {
            self.0 = shift_byte(self.0 ^ byte);
        }
        self.0
    }

    /// Compute the CRC of a sequence of bytes.
    pub fn compute(sequence: &[u8]) -> u8 {
        let mut crc = OneWireCrc::new();
        for &byte in sequence.iter() {
            crc.update(byte);
        }
        crc.value()
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        Self::compute(sequence) == 0x0 // If the last byte is the CRC, the result should be 0
    }
}

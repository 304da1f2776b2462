//! ROM command constants for 1-Wire communication.

/// Command to match a specific ROM address in 1-Wire communication (non-overdrive mode)
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM address in 1-Wire communication (non-overdrive mode)
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to read the ROM of the only device on a single-drop bus.
///
/// If more than one device is present, every device answers at the same time
/// and the wired-AND of their codes fails the CRC check.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// The Overdrive-Match ROM command followed by a 64-bit
/// ROM sequence transmitted at overdrive speed allows the
/// bus master to address a specific device on a multidrop
/// bus and to simultaneously set it in overdrive mode.
/// All overdrive-capable devices return to standard speed
/// at the next reset pulse of minimum 480μs duration.
pub const ONEWIRE_MATCH_ROM_CMD_OD: u8 = 0x69;

/// On a single-drop bus this command can save time by
/// allowing the bus master to access the control functions
/// without providing the 64-bit ROM code. Unlike the normal
/// Skip ROM command, the Overdrive-Skip ROM sets the
/// device in overdrive mode. All communication following
/// this command has to occur at overdrive speed until a
/// reset pulse of minimum 480μs duration.
pub const ONEWIRE_SKIP_ROM_CMD_OD: u8 = 0x3c;

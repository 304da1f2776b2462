use core::ptr::{self, NonNull};

use bitfield_struct::bitfield;

/// Access to the single 32-bit control/status register of the controller.
///
/// Writing a value with [`ControlRegister::cyc`] set starts a bus cycle; reading returns the
/// live status and clears a pending interrupt. There are no error conditions at this level.
pub trait Register {
    /// Read the current register value.
    fn read(&self) -> u32;
    /// Write a new register value.
    fn write(&self, value: u32);
}

impl<T: Register + ?Sized> Register for &T {
    fn read(&self) -> u32 {
        (**self).read()
    }

    fn write(&self, value: u32) {
        (**self).write(value)
    }
}

/// Control/status register of the SoCkit 1-Wire master.
///
/// Writing the register with `CYC` set generates one cycle on the selected port: a reset
/// pulse with presence detect when `RST` is set, otherwise a single bit time slot carrying
/// `DAT`. `CYC` reads back as 1 until the cycle has ended; `DAT` then holds the sampled line
/// state (the inverted presence bit after a reset). Writing `RST` and `DAT` together with
/// `CYC` produces an idle delay cycle without any line activity.
///
/// This is the multi-port layout of the controller: strong pull-up is controlled per port
/// through the `POWER` field, `PWR` is only used by single-line builds.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ControlRegister {
    /// DAT: bit to transmit, or sampled bit after the cycle.
    pub dat: bool,
    /// RST: generate a reset pulse and sample presence.
    pub rst: bool,
    /// OVD: use overdrive timing for this cycle.
    pub ovd: bool,
    /// CYC: cycle request on write, busy flag on read.
    pub cyc: bool,
    /// PWR: strong pull-up on a single-line controller.
    pub pwr: bool,
    #[bits(1)]
    __: u8,
    /// IRQ: a cycle ended while IEN was set. Cleared by reading the register.
    pub irq: bool,
    /// IEN: raise the interrupt line at the end of each cycle.
    pub ien: bool,
    /// SEL: port the cycle is generated on.
    #[bits(4)]
    pub sel: u8,
    #[bits(4)]
    __: u8,
    /// POWER: strong pull-up enable, one bit per port.
    pub power: u16,
}

impl ControlRegister {
    /// `RST | DAT`, the delay cycle pattern.
    pub const DLY: u32 = 0x0000_0003;
    /// `OVD | RST | DAT`, the idle pattern left in the register between cycles.
    pub const IDL: u32 = 0x0000_0007;

    /// Presence as sampled by a finished reset cycle.
    pub fn presence(&self) -> bool {
        !self.dat()
    }

    /// Strong pull-up state of `port` in the `POWER` field.
    pub fn port_power(&self, port: u8) -> bool {
        (self.power() >> port) & 0x1 == 0x1
    }
}

/// Memory-mapped register of a controller instance.
#[derive(Debug)]
pub struct MmioRegister {
    base: NonNull<u32>,
}

// SAFETY: the register is a single aligned 32-bit word accessed only with volatile loads and
// stores; the driver serialises bus cycles itself.
unsafe impl Send for MmioRegister {}
// SAFETY: see above.
unsafe impl Sync for MmioRegister {}

impl MmioRegister {
    /// Wrap the register at `base`.
    ///
    /// # Safety
    /// `base` must be the aligned address of the controller register, mapped for the
    /// lifetime of the returned value, and no other code may drive the same controller.
    pub unsafe fn new(base: NonNull<u32>) -> Self {
        Self { base }
    }
}

impl Register for MmioRegister {
    fn read(&self) -> u32 {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { ptr::read_volatile(self.base.as_ptr()) }
    }

    fn write(&self, value: u32) {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { ptr::write_volatile(self.base.as_ptr(), value) }
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireResult};
use log::{debug, trace, warn};

use crate::{ControlRegister, IrqFlag, OwmConfig, OwmError, Register};

/// Results of bus cycles on a SoCkit 1-Wire master.
pub type OwmResult<T> = Result<T, OwmError>;

/// A SoCkit 1-Wire master controller.
///
/// Owns the memory-mapped register and the live bus state of one controller. Bus cycles are
/// only reachable through the [`OwmGuard`] returned by [`Owm::acquire`], which holds the bus
/// lock until it is dropped. Share the controller between threads by reference (or in an
/// [`Arc`](std::sync::Arc)); acquirers block first-come first-served.
///
/// Create instances with [`OwmBuilder`](crate::OwmBuilder).
pub struct Owm<R, D> {
    pub(crate) reg: R,
    pub(crate) config: OwmConfig,
    pub(crate) irq: Option<(u32, IrqFlag)>,
    pub(crate) state: Mutex<OwmState<D>>,
}

/// Live state, only touched with the bus lock held.
pub(crate) struct OwmState<D> {
    pub(crate) delay: D,
    /// Overdrive status, one bit per port.
    pub(crate) ovd: u16,
    /// Strong pull-up status, one bit per port.
    pub(crate) pwr: u16,
    pub(crate) ien: bool,
}

impl<R: Register, D: DelayNs> Owm<R, D> {
    /// Acquire the bus lock and select `port` for the following cycles.
    ///
    /// Blocks until the lock is free. The lock is released when the guard is dropped, on every
    /// exit path of the caller.
    pub fn acquire(&self, port: u8) -> OwmResult<OwmGuard<'_, R, D>> {
        self.check_port(port)?;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("sockit-owm: bus lock acquired for port {port}");
        Ok(OwmGuard {
            owm: self,
            state,
            port,
        })
    }

    /// Interrupt service entry: reads the register, which clears `IRQ`, and posts the cycle
    /// completion flag. Never takes the bus lock.
    pub fn on_interrupt(&self) {
        let status = ControlRegister::from_bits(self.reg.read());
        if let Some((_, flag)) = &self.irq {
            flag.post();
        }
        trace!("sockit-owm: interrupt, status {:#010x}", status.into_bits());
    }
}

impl<R, D> Owm<R, D> {
    /// Synthesis parameters of the controller.
    pub fn config(&self) -> &OwmConfig {
        &self.config
    }

    /// Interrupt line the driver was initialized with, [`None`] for the polling driver.
    pub fn irq_line(&self) -> Option<u32> {
        self.irq.as_ref().map(|(line, _)| *line)
    }

    /// The cycle completion flag, for platform interrupt glue that posts it directly.
    pub fn irq_flag(&self) -> Option<IrqFlag> {
        self.irq.as_ref().map(|(_, flag)| flag.clone())
    }

    fn check_port(&self, port: u8) -> OwmResult<()> {
        if port >= self.config.ports {
            Err(OwmError::InvalidPort {
                port,
                ports: self.config.ports,
            })
        } else {
            Ok(())
        }
    }
}

/// Exclusive access to the bus of an [`Owm`], bound to one port.
///
/// Implements [`OneWire`], so the addressing and device protocols run on top of it. Every
/// cycle is issued in program order and completes (or times out) before the next one starts.
pub struct OwmGuard<'a, R, D> {
    owm: &'a Owm<R, D>,
    state: MutexGuard<'a, OwmState<D>>,
    port: u8,
}

impl<R: Register, D: DelayNs> OwmGuard<'_, R, D> {
    /// Port the cycles are generated on.
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Switch to another port without releasing the lock.
    pub fn select_port(&mut self, port: u8) -> OwmResult<()> {
        self.owm.check_port(port)?;
        self.port = port;
        Ok(())
    }

    /// Overdrive status of the selected port.
    pub fn overdrive(&self) -> bool {
        (self.state.ovd >> self.port) & 0x1 == 0x1
    }

    /// Strong pull-up status of the selected port.
    pub fn strong_pullup(&self) -> bool {
        (self.state.pwr >> self.port) & 0x1 == 0x1
    }

    /// Command word carrying the port, power, interrupt and overdrive state.
    fn command(&self) -> ControlRegister {
        ControlRegister::new()
            .with_ovd(self.overdrive())
            .with_ien(self.state.ien)
            .with_sel(self.port)
            .with_power(self.state.pwr)
    }

    /// Idle pattern with the current port and power state; starts no cycle.
    fn idle(&self) -> ControlRegister {
        ControlRegister::from_bits(ControlRegister::IDL)
            .with_ien(self.state.ien)
            .with_sel(self.port)
            .with_power(self.state.pwr)
    }

    /// Delay pattern with the current port and power state; never carries `OVD`, which would
    /// turn it into the idle pattern.
    fn delay(&self) -> ControlRegister {
        ControlRegister::from_bits(ControlRegister::DLY)
            .with_ien(self.state.ien)
            .with_sel(self.port)
            .with_power(self.state.pwr)
    }

    /// Run one bus cycle and return the status it ended with.
    fn cycle(&mut self, cmd: ControlRegister) -> OwmResult<ControlRegister> {
        let owm = self.owm;
        let cmd = cmd.with_cyc(true);
        if let Some((_, flag)) = &owm.irq {
            flag.clear();
        }
        owm.reg.write(cmd.into_bits());
        let status = match &owm.irq {
            Some((_, flag)) => {
                if flag.wait_timeout(owm.config.cycle_timeout) {
                    self.wait_idle()
                } else {
                    let status = ControlRegister::from_bits(owm.reg.read());
                    if status.cyc() {
                        Err(OwmError::BusTimeout(owm.config.cycle_timeout))
                    } else {
                        warn!("sockit-owm: cycle ended without interrupt");
                        Ok(status)
                    }
                }
            }
            None => self.wait_idle(),
        };
        match status {
            Ok(status) => {
                trace!(
                    "sockit-owm: cycle {:#010x} -> {:#010x}",
                    cmd.into_bits(),
                    status.into_bits()
                );
                Ok(status)
            }
            Err(e) => {
                warn!("sockit-owm: cycle {:#010x}: {e}", cmd.into_bits());
                Err(e)
            }
        }
    }

    /// Poll `CYC` with back-off until the cycle has ended.
    fn wait_idle(&mut self) -> OwmResult<ControlRegister> {
        let retries = self.owm.config.poll_retries();
        let mut tries = 0;
        loop {
            let status = ControlRegister::from_bits(self.owm.reg.read());
            if !status.cyc() {
                return Ok(status);
            }
            if tries >= retries {
                break;
            }
            tries += 1;
            self.state.delay.delay_us(self.owm.config.poll_interval_us);
        }
        Err(OwmError::BusTimeout(self.owm.config.cycle_timeout))
    }

    /// Generate a reset pulse and sample the presence pulse.
    ///
    /// Returns `true` if at least one device answered. The register is left in the idle
    /// pattern afterwards.
    pub fn touch_reset(&mut self) -> OwmResult<bool> {
        let status = self.cycle(self.command().with_rst(true))?;
        self.owm.reg.write(self.idle().into_bits());
        let presence = status.presence();
        trace!("sockit-owm: reset on port {}, presence {presence}", self.port);
        Ok(presence)
    }

    /// Generate one time slot transmitting `bit` and return the sampled line.
    ///
    /// A read slot is a write-1 slot whose sample is the bit driven by the device.
    pub fn touch_bit(&mut self, bit: bool) -> OwmResult<bool> {
        let status = self.cycle(self.command().with_dat(bit))?;
        Ok(status.dat())
    }

    /// Switch the selected port between normal and overdrive timing.
    pub fn set_overdrive(&mut self, enable: bool) -> OwmResult<()> {
        if enable && !self.owm.config.overdrive_enable {
            return Err(OwmError::OverdriveUnsupported);
        }
        let mask = 1 << self.port;
        if enable {
            self.state.ovd |= mask;
        } else {
            self.state.ovd &= !mask;
        }
        debug!("sockit-owm: port {} overdrive {enable}", self.port);
        Ok(())
    }

    /// Switch the strong pull-up of the selected port.
    ///
    /// The change takes effect without a bus cycle and is verified by reading the `POWER`
    /// field back. While the pull-up is on, devices cannot pull the line low; release it
    /// before the next time slot.
    pub fn set_strong_pullup(&mut self, enable: bool) -> OwmResult<()> {
        let mask = 1 << self.port;
        if enable {
            self.state.pwr |= mask;
        } else {
            self.state.pwr &= !mask;
        }
        self.owm.reg.write(self.idle().into_bits());
        let status = ControlRegister::from_bits(self.owm.reg.read());
        let enabled = status.port_power(self.port);
        if enabled != enable {
            warn!(
                "sockit-owm: strong pull-up on port {} stuck at {enabled}",
                self.port
            );
            return Err(OwmError::PullupRejected {
                port: self.port,
                enabled,
            });
        }
        debug!("sockit-owm: port {} strong pull-up {enable}", self.port);
        Ok(())
    }

    /// Wait `ms` milliseconds using delay cycles of the controller.
    ///
    /// Issues `ms * f_dly` delay cycles without line activity; the strong pull-up state is
    /// kept, so this can time a parasite-powered conversion. The overdrive state of the port
    /// does not change the length of a delay cycle.
    pub fn delay_ms(&mut self, ms: u32) -> OwmResult<()> {
        let cmd = self.delay();
        let cycles = self.owm.config.delay_cycles(ms);
        trace!("sockit-owm: delay {ms} ms, {cycles} cycles");
        for _ in 0..cycles {
            self.cycle(cmd)?;
        }
        Ok(())
    }
}

/// Hardware-timed delays, rounded up to whole milliseconds.
///
/// Falls back to the software delay of the controller if a delay cycle fails, so the wait is
/// never shorter than requested.
impl<R: Register, D: DelayNs> DelayNs for OwmGuard<'_, R, D> {
    fn delay_ns(&mut self, ns: u32) {
        DelayNs::delay_ms(self, ns.div_ceil(1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        if let Err(e) = OwmGuard::delay_ms(self, ms) {
            warn!("sockit-owm: delay cycles failed ({e}), waiting {ms} ms in software");
            self.state.delay.delay_ms(ms);
        }
    }
}

impl<R, D> Drop for OwmGuard<'_, R, D> {
    fn drop(&mut self) {
        if self.state.pwr & (1 << self.port) != 0 {
            warn!(
                "sockit-owm: bus lock released with strong pull-up on port {}",
                self.port
            );
        }
        trace!("sockit-owm: bus lock released");
    }
}

impl<R: Register, D: DelayNs> OneWire for OwmGuard<'_, R, D> {
    type BusError = OwmError;

    fn reset(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.touch_reset().map_err(OwmError::into_onewire)
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.touch_bit(bit)
            .map(|_| ())
            .map_err(OwmError::into_onewire)
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.touch_bit(true).map_err(OwmError::into_onewire)
    }

    fn get_overdrive_mode(&mut self) -> OneWireResult<bool, Self::BusError> {
        Ok(self.overdrive())
    }

    fn set_overdrive_mode(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        self.set_overdrive(enable).map_err(OwmError::into_onewire)
    }

    fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        OwmGuard::set_strong_pullup(self, enable).map_err(OwmError::into_onewire)
    }
}

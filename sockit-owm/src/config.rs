use std::{sync::Mutex, time::Duration};

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::{
    InitError, IrqFlag, Owm, Register,
    owm::OwmState,
};

/// Synthesis-time parameters of a controller instance.
///
/// These are fixed when the controller is generated and have to match the hardware; the
/// driver does not detect them.
///
/// The bus timing of a cycle is generated by the controller from its base time periods and
/// clock divider, so `btp_*`, `cdr_enable` and `cdr_*` are informational: the register has
/// nothing to program them into, and they are only logged when the driver is built.
/// `ports`, `overdrive_enable` and `f_dly` change what the driver does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwmConfig {
    /// Number of 1-Wire ports (`own`), 1 to 16.
    pub ports: u8,
    /// Overdrive timing is implemented (`ovd_e`).
    pub overdrive_enable: bool,
    /// Clock divider ratio register is implemented (`cdr_e`).
    pub cdr_enable: bool,
    /// Base time period of normal mode in microseconds (`btp_n`).
    pub btp_normal: f32,
    /// Base time period of overdrive mode in microseconds (`btp_o`).
    pub btp_overdrive: f32,
    /// Clock divider ratio for normal mode (`cdr_n`).
    pub cdr_normal: u32,
    /// Clock divider ratio for overdrive mode (`cdr_o`).
    pub cdr_overdrive: u32,
    /// Delay cycles per millisecond as u16.16 fixed point (`f_dly`).
    pub f_dly: u32,
    /// Upper bound on the duration of a single bus cycle.
    pub cycle_timeout: Duration,
    /// Back-off between two status polls, in microseconds.
    pub poll_interval_us: u32,
}

impl Default for OwmConfig {
    fn default() -> Self {
        Self {
            ports: 1,
            overdrive_enable: true,
            cdr_enable: false,
            btp_normal: 5.0,
            btp_overdrive: 1.0,
            cdr_normal: 0,
            cdr_overdrive: 0,
            f_dly: 1 << 16,
            cycle_timeout: Duration::from_millis(10),
            poll_interval_us: 10,
        }
    }
}

impl OwmConfig {
    /// Whole delay cycles needed for `ms` milliseconds.
    pub fn delay_cycles(&self, ms: u32) -> u64 {
        (ms as u64 * self.f_dly as u64) >> 16
    }

    /// Number of status polls after which a cycle is declared timed out.
    pub(crate) fn poll_retries(&self) -> u32 {
        let interval = self.poll_interval_us.max(1) as u128;
        (self.cycle_timeout.as_micros() / interval).clamp(1, u32::MAX as u128) as u32
    }

    fn validate(&self) -> Result<(), InitError> {
        if self.ports == 0 || self.ports > 16 {
            return Err(InitError::InvalidPortCount(self.ports));
        }
        if self.cycle_timeout.is_zero() {
            return Err(InitError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Builder for creating an [`Owm`] instance with custom configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwmBuilder {
    config: OwmConfig,
}

impl From<OwmConfig> for OwmBuilder {
    fn from(config: OwmConfig) -> Self {
        Self { config }
    }
}

impl OwmBuilder {
    /// Sets the number of ports implemented by the controller.
    pub fn with_ports(mut self, ports: u8) -> Self {
        self.config.ports = ports;
        self
    }

    /// Declares whether the controller implements overdrive timing.
    pub fn with_overdrive(mut self, enable: bool) -> Self {
        self.config.overdrive_enable = enable;
        self
    }

    /// Enables the clock divider with the given ratios for normal and overdrive mode.
    pub fn with_clock_divider(mut self, normal: u32, overdrive: u32) -> Self {
        self.config.cdr_enable = true;
        self.config.cdr_normal = normal;
        self.config.cdr_overdrive = overdrive;
        self
    }

    /// Sets the base time periods of normal and overdrive mode, in microseconds.
    pub fn with_base_time_periods(mut self, normal: f32, overdrive: f32) -> Self {
        self.config.btp_normal = normal;
        self.config.btp_overdrive = overdrive;
        self
    }

    /// Sets the delay factor, delay cycles per millisecond in u16.16 fixed point.
    pub fn with_delay_factor(mut self, f_dly: u32) -> Self {
        self.config.f_dly = f_dly;
        self
    }

    /// Sets the upper bound on the duration of a single bus cycle.
    ///
    /// A cycle that has not ended after this time fails with
    /// [`OwmError::BusTimeout`](crate::OwmError::BusTimeout).
    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.config.cycle_timeout = timeout;
        self
    }

    /// Sets the back-off between two status polls, in microseconds.
    pub fn with_poll_interval(mut self, us: u32) -> Self {
        self.config.poll_interval_us = us;
        self
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &OwmConfig {
        &self.config
    }

    /// Builds a controller that detects the end of a cycle by polling `CYC`.
    pub fn build_polling<R: Register, D: DelayNs>(
        self,
        reg: R,
        delay: D,
    ) -> Result<Owm<R, D>, InitError> {
        self.config.validate()?;
        debug!("sockit-owm: polling driver, {:?}", self.config);
        Ok(self.assemble(reg, delay, None))
    }

    /// Builds an interrupt-driven controller on interrupt line `irq` and arms `IEN`.
    ///
    /// `None` stands for an interrupt that is not connected, which is an error for this
    /// driver variant; use [`OwmBuilder::build_polling`] instead. The platform must route the
    /// interrupt to [`Owm::on_interrupt`].
    pub fn initialize<R: Register, D: DelayNs>(
        self,
        reg: R,
        delay: D,
        irq: Option<u32>,
    ) -> Result<Owm<R, D>, InitError> {
        let line = irq.ok_or(InitError::IrqNotConnected)?;
        self.config.validate()?;
        debug!("sockit-owm: interrupt driver on line {line}, {:?}", self.config);
        Ok(self.assemble(reg, delay, Some((line, IrqFlag::new()))))
    }

    fn assemble<R, D>(self, reg: R, delay: D, irq: Option<(u32, IrqFlag)>) -> Owm<R, D> {
        let state = OwmState {
            delay,
            ovd: 0,
            pwr: 0,
            ien: irq.is_some(),
        };
        Owm {
            reg,
            config: self.config,
            irq,
            state: Mutex::new(state),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimBus;
    use embedded_hal_mock::eh1::delay::NoopDelay;

    #[test]
    fn interrupt_must_be_connected() {
        let res = OwmBuilder::default().initialize(SimBus::new(), NoopDelay::new(), None);
        assert!(matches!(res, Err(InitError::IrqNotConnected)));
    }

    #[test]
    fn port_count_is_checked() {
        let res = OwmBuilder::default()
            .with_ports(0)
            .build_polling(SimBus::new(), NoopDelay::new());
        assert!(matches!(res, Err(InitError::InvalidPortCount(0))));
        let res = OwmBuilder::default()
            .with_ports(17)
            .build_polling(SimBus::new(), NoopDelay::new());
        assert!(matches!(res, Err(InitError::InvalidPortCount(17))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let res = OwmBuilder::default()
            .with_cycle_timeout(Duration::ZERO)
            .build_polling(SimBus::new(), NoopDelay::new());
        assert!(matches!(res, Err(InitError::InvalidTimeout)));
    }

    #[test]
    fn delay_factor() {
        let cfg = OwmBuilder::default().with_delay_factor(0x0001_8000).config;
        assert_eq!(cfg.delay_cycles(10), 15);
        assert_eq!(OwmConfig::default().delay_cycles(1000), 1000);
    }

    #[test]
    fn timing_parameters_are_informational() {
        let sim = SimBus::new();
        let owm = OwmBuilder::default()
            .with_base_time_periods(7.5, 1.0)
            .with_clock_divider(4, 1)
            .build_polling(&sim, NoopDelay::new())
            .unwrap();
        let cfg = owm.config();
        assert_eq!((cfg.btp_normal, cfg.btp_overdrive), (7.5, 1.0));
        assert!(cfg.cdr_enable);
        assert_eq!((cfg.cdr_normal, cfg.cdr_overdrive), (4, 1));
        assert_eq!(cfg.cycle_timeout, OwmConfig::default().cycle_timeout);
        let mut bus = owm.acquire(0).unwrap();
        bus.touch_bit(true).unwrap();
        drop(bus);
        assert_eq!(sim.writes(), [0x0000_0009]);
    }

    #[test]
    fn poll_retries_follow_timeout() {
        let cfg = OwmBuilder::default()
            .with_cycle_timeout(Duration::from_millis(1))
            .with_poll_interval(100)
            .config;
        assert_eq!(cfg.poll_retries(), 10);
        let cfg = OwmBuilder::default()
            .with_cycle_timeout(Duration::from_micros(1))
            .with_poll_interval(100)
            .config;
        assert_eq!(cfg.poll_retries(), 1);
    }
}

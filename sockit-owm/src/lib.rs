#![deny(missing_docs)]

/*! # SoCkit 1-Wire master
 *
 * Driver for the SoCkit memory-mapped 1-Wire master (OWM). The controller exposes a single
 * 32-bit control/status register; every write with `CYC` set generates one reset or time slot
 * on the selected port.
 *
 * An [`Owm`] owns the register and the live bus state. [`Owm::acquire`] hands out an
 * [`OwmGuard`], the only way to issue bus cycles; it implements
 * [`OneWire`](embedded_onewire::OneWire), so the device protocols of `embedded-onewire`
 * and device crates run on top of it.
 *
 * Cycle completion is signalled either by the controller interrupt ([`OwmBuilder::initialize`],
 * the platform routes the interrupt to [`Owm::on_interrupt`]) or by polling `CYC`
 * ([`OwmBuilder::build_polling`]). Both bound the wait by the configured cycle timeout.
 *
 * With the `sim` feature, [`sim::SimBus`] simulates the controller with attached temperature
 * sensors.
 */

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
mod config;
mod error;
mod irq;
mod owm;
mod registers;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{OwmBuilder, OwmConfig};
pub use error::{InitError, OwmError};
pub use irq::IrqFlag;
pub use owm::{Owm, OwmGuard, OwmResult};
pub use registers::{ControlRegister, MmioRegister, Register};

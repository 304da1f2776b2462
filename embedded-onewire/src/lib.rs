#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire protocol layer.
//!
//! This crate provides a trait-based interface for 1-Wire communication, allowing bus masters
//! on various platforms to share the device-level protocol code.
//! [OneWire] defines the time-slot primitives every master has to provide (reset with presence
//! detect, bit read and write) and builds byte transfers and device addressing on top of them.
//!
//! [DeviceRom] is the 64-bit device identifier, and [OneWireCrc] the Dallas/Maxim CRC-8 used to
//! validate both ROM codes and device memory blocks.

pub mod consts;
mod error;
mod rom;
mod traits;
mod utils;

pub use consts::*;
pub use error::OneWireError;
pub use rom::{DeviceRom, RomParseError};
pub use traits::OneWire;
pub use utils::OneWireCrc;

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;

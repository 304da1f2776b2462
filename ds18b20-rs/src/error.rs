use core::fmt;

use embedded_onewire::OneWireError;

/// Why a temperature read attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    /// A bus cycle did not complete in time.
    BusTimeout,
    /// Nothing answered the reset pulse.
    DeviceNotPresent,
    /// The scratchpad did not validate.
    CrcMismatch,
    /// The strong pull-up could not be switched around the conversion.
    PullupError,
    /// Any other error of the bus master.
    Bus,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ReadFailure::BusTimeout => "bus timeout",
            ReadFailure::DeviceNotPresent => "device not present",
            ReadFailure::CrcMismatch => "CRC mismatch",
            ReadFailure::PullupError => "strong pull-up error",
            ReadFailure::Bus => "bus error",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, PartialEq)]
/// Errors of a single protocol exchange with a sensor.
pub enum ReadError<E> {
    /// Error of the underlying bus.
    Bus(OneWireError<E>),
    /// The scratchpad did not validate; its content is discarded.
    CrcMismatch,
    /// Switching the strong pull-up failed.
    PullupError(OneWireError<E>),
}

impl<E> ReadError<E> {
    /// Failure kind, as recorded in a
    /// [`TemperatureSample`](crate::TemperatureSample).
    pub fn kind(&self) -> ReadFailure {
        match self {
            ReadError::Bus(OneWireError::Timeout) => ReadFailure::BusTimeout,
            ReadError::Bus(OneWireError::NoDevicePresent) => ReadFailure::DeviceNotPresent,
            ReadError::Bus(OneWireError::InvalidCrc) | ReadError::CrcMismatch => {
                ReadFailure::CrcMismatch
            }
            ReadError::Bus(_) => ReadFailure::Bus,
            ReadError::PullupError(_) => ReadFailure::PullupError,
        }
    }
}

impl<E> From<OneWireError<E>> for ReadError<E> {
    fn from(value: OneWireError<E>) -> Self {
        Self::Bus(value)
    }
}

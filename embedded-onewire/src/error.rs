/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device answered the reset pulse with a presence pulse.
    NoDevicePresent,
    /// The bus master did not finish a time slot within its time budget.
    Timeout,
    /// Indicates that the operation is not implemented by this bus master,
    /// such as strong pull-up control on a master without a power switch.
    Unimplemented,
    /// Computed CRC of a ROM code or memory block is invalid.
    InvalidCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

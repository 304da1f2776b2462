use std::time::Duration;

use embedded_onewire::OneWireError;
use thiserror::Error;

/// Errors raised by bus cycles of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OwmError {
    /// The controller did not signal the end of a cycle in time.
    #[error("bus cycle did not complete within {0:?}")]
    BusTimeout(Duration),
    /// The port number is not implemented by this controller.
    #[error("port {port} out of range, controller has {ports} ports")]
    InvalidPort {
        /// Requested port.
        port: u8,
        /// Number of ports of the controller.
        ports: u8,
    },
    /// The controller was built without overdrive timing.
    #[error("overdrive mode is not implemented by this controller")]
    OverdriveUnsupported,
    /// The `POWER` bit of the port did not follow a strong pull-up change.
    #[error("strong pull-up on port {port} did not switch, reads back enabled={enabled}")]
    PullupRejected {
        /// Port whose pull-up was switched.
        port: u8,
        /// State read back from the register.
        enabled: bool,
    },
}

impl OwmError {
    /// Map onto the bus-independent error type, keeping timeouts recognisable.
    pub(crate) fn into_onewire(self) -> OneWireError<Self> {
        match self {
            OwmError::BusTimeout(_) => OneWireError::Timeout,
            other => OneWireError::Other(other),
        }
    }
}

/// Errors raised while initializing a controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// Interrupt-driven completion was requested but no interrupt line is connected.
    #[error("interrupt not connected; use polling completion instead")]
    IrqNotConnected,
    /// The controller must implement between 1 and 16 ports.
    #[error("invalid number of ports: {0}")]
    InvalidPortCount(u8),
    /// A zero cycle timeout would fail every cycle.
    #[error("cycle timeout must be non-zero")]
    InvalidTimeout,
}

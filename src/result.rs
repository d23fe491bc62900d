use core::fmt::Debug;

/// Error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Sized + Debug> {
    /// Wire never returned high after reset (shorted line or missing pull-up)
    WireFault,
    /// No presence on wire
    NoPresence,
    /// Read-back after a write differs: (written, read)
    VerifyMismatch(u8, u8),
    /// Requested conversion resolution outside 9..=12 bits
    InvalidResolution(u8),
    /// (expected, actual)
    FamilyCodeMismatch(u8, u8),
    /// Memory request without any bytes to transfer
    ZeroLength,
    /// (computed, read)
    CrcMismatch(u8, u8),
    /// Device still busy when the wait timeout elapsed
    Timeout,
    /// Wait aborted by the caller's cancellation check
    Cancelled,
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}

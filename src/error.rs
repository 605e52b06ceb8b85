//! Driver and transfer errors

use core::fmt;

/// An opaque failure reported by a [`HardwareOps`](crate::HardwareOps) primitive
///
/// The payload is the vendor status code, kept only so that it can be
/// logged or inspected. The driver never interprets it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HwError(pub u32);

/// Errors reported by the driver, either as the result of a call, or on
/// a transfer buffer handed back through [`Upstream`](crate::Upstream)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A hardware primitive failed, or a transfer completed with an error
    Io,
    /// The hardware refused to start the transfer
    Refused,
    /// The transfer was aborted before it completed
    Cancelled,
    /// No memory for a control-stage buffer
    NoMemory,
    /// The address doesn't name an endpoint the caller may use, or the
    /// descriptor exceeds the endpoint's capabilities
    InvalidEndpoint,
    /// The endpoint isn't enabled
    Disabled,
}

impl From<HwError> for Error {
    fn from(_: HwError) -> Self {
        Error::Io
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Io => "I/O error",
            Error::Refused => "transfer refused by controller",
            Error::Cancelled => "transfer cancelled",
            Error::NoMemory => "out of buffer memory",
            Error::InvalidEndpoint => "invalid endpoint",
            Error::Disabled => "endpoint disabled",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hardware status {:#x}", self.0)
    }
}

/// Convenience alias for driver results
pub type Result<T> = core::result::Result<T, Error>;

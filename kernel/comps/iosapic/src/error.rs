// SPDX-License-Identifier: MPL-2.0

use core::fmt;

/// The error type which is returned from the APIs of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// Invalid arguments provided.
    InvalidArgs,
    /// Insufficient memory available.
    NoMemory,
    /// The processor side has no interrupt left for this line.
    NotEnoughResources,
    /// The register window could not be mapped or accessed.
    IoError,
    /// The device's interrupt pin is not wired to any redirection line.
    NoRoute,
    /// The controller was never registered.
    NotRegistered,
    /// Firmware broke its own contract (e.g., the size query succeeded but the fill failed).
    FirmwareContract,
    /// The requested operation is not supported on this platform.
    NotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidArgs => "invalid arguments",
            Error::NoMemory => "out of memory",
            Error::NotEnoughResources => "no processor interrupt available",
            Error::IoError => "register window is not accessible",
            Error::NoRoute => "interrupt pin is not connected",
            Error::NotRegistered => "I/O SAPIC is not registered",
            Error::FirmwareContract => "firmware returned an inconsistent routing table",
            Error::NotSupported => "operation not supported",
        };
        f.write_str(msg)
    }
}

/// A specialized [`Result`] type for this crate.
///
/// [`Result`]: core::result::Result
pub type Result<T> = core::result::Result<T, Error>;

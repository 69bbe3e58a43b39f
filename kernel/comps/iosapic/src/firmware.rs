// SPDX-License-Identifier: MPL-2.0

//! Firmware calls that hand out the interrupt routing table (IRT).
//!
//! PA-RISC platforms ship one of two firmware flavors. PAT firmware returns
//! a table per cell and only initializes the console and boot devices, so the
//! OS must program every other PCI interrupt from the table. Legacy PDC
//! returns at most one table for the whole platform and programs the
//! `INTERRUPT_LINE` register itself; on platforms without an I/O SAPIC the
//! call is simply unsupported.

use core::fmt;

/// The firmware protocol that supplied the routing table.
///
/// The protocol also decides how the destination processor is encoded in
/// the high word of a redirection entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingProtocol {
    /// PAT PDC.
    Pat,
    /// Legacy PDC.
    Legacy,
}

/// A failed PDC call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PdcError {
    /// `PDC_BAD_PROC`: the procedure does not exist.
    BadProc,
    /// `PDC_BAD_OPTION`: the procedure exists but not the option.
    BadOption,
    /// `PDC_ERROR`: the call failed.
    Error,
    /// Any other negative status.
    Other(i64),
}

impl PdcError {
    /// Returns whether the status means "this firmware does not implement the call".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PdcError::BadProc | PdcError::BadOption)
    }
}

impl fmt::Display for PdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdcError::BadProc => f.write_str("PDC_BAD_PROC"),
            PdcError::BadOption => f.write_str("PDC_BAD_OPTION"),
            PdcError::Error => f.write_str("PDC_ERROR"),
            PdcError::Other(status) => write!(f, "PDC status {}", status),
        }
    }
}

/// The result of a PDC call.
pub type PdcResult<T> = core::result::Result<T, PdcError>;

/// The firmware routines used to fetch the interrupt routing table.
pub trait IrtFirmware: Sync {
    /// Returns which firmware protocol this is.
    fn protocol(&self) -> RoutingProtocol;

    /// Returns the cell number of the CPU we are running on.
    ///
    /// Only PAT firmware knows about cells.
    fn cell_number(&self) -> PdcResult<u64> {
        Err(PdcError::BadOption)
    }

    /// Returns the number of entries in the routing table of `cell`.
    ///
    /// Legacy firmware ignores `cell`.
    fn irt_size(&self, cell: u64) -> PdcResult<usize>;

    /// Copies the routing table of `cell` into `buf`.
    ///
    /// `buf` is 8-byte aligned and exactly as long as the number of entries
    /// reported by [`Self::irt_size`] times the size of an entry.
    fn read_irt(&self, cell: u64, buf: &mut [u8]) -> PdcResult<()>;
}

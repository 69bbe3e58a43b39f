// SPDX-License-Identifier: MPL-2.0

//! I/O SAPIC driver.
//!
//! An I/O SAPIC turns the line interrupts of the PCI devices below a bus
//! adapter into transaction based interrupts: a write of `txn_data` to
//! `txn_addr`, which the target CPU latches into its external interrupt
//! request register.
//!
//! The wiring from PCI slots to I/O SAPIC lines is not discoverable. It is
//! described by the interrupt routing table the firmware hands out, see
//! [`RoutingTable`].
//!
//! Use case:
//!
//! ```rust ignore
//! let iosapic = Iosapic::init(
//!     &firmware,
//!     mapper,
//!     allocator,
//!     dispatcher,
//!     IosapicConfig::from_cmdline(cmdline),
//! )?;
//!
//! // Called by the bus adapter driver once per I/O SAPIC it owns.
//! let id = iosapic.register(hpa);
//!
//! // Called for every PCI function below that bus adapter.
//! if let Some(irq) = iosapic.fixup_irq(id, &dev) {
//!     dev.set_irq(irq);
//! }
//! ```
#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod access;
mod chip;
mod config;
mod error;
mod firmware;
mod fixup;
mod iosapic;
pub mod irt;
mod pci;
mod txn;
mod vector;
mod xlate;

#[cfg(test)]
mod test_util;

pub use self::{
    access::{IoMemMapper, IoMemory, VolatileIoMem, IOSAPIC_MMIO_SIZE},
    config::{AddrPolicy, AddrWidth, IosapicConfig, DEFAULT_ADDR_FILL, DEFAULT_TXN_IRQ_BITS},
    error::{Error, Result},
    firmware::{IrtFirmware, PdcError, PdcResult, RoutingProtocol},
    iosapic::{ControllerId, Iosapic, IosapicInfo, VectorHandle, MAX_IOSAPICS},
    irt::{IrtEntry, RoutingTable},
    pci::{PciDeviceLocation, PciFunction, PCI_INTERRUPT_PIN},
    txn::{CpuId, IrqChip, IrqDispatcher, TxnAllocator, TxnIrq},
    vector::{unpack_legacy_txn_addr, Binding, VectorInfo},
    xlate::{swizzle_pin, xlate_pin},
};

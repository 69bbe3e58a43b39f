// SPDX-License-Identifier: MPL-2.0

//! Redirection lines and the encoding of their redirection entries.
//!
//! A line starts unbound. The first device whose interrupt resolves to the
//! line binds it to a processor interrupt; every later device sharing the
//! line reuses that interrupt. Once bound, the line is masked and unmasked
//! by the generic IRQ layer and an EOI is written to the I/O SAPIC at the
//! end of every interrupt.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;
use log::trace;
use spin::Once;

use crate::{
    access::{IosapicAccess, RegisterGuard},
    error::Result,
    firmware::RoutingProtocol,
    iosapic::{ControllerId, VectorHandle},
    irt::IrtEntry,
    txn::TxnIrq,
};

bitflags! {
    /// Bits in the low word of a redirection entry.
    pub struct IrdtFlags: u32 {
        /// Set to mask the line.
        const ENABLE = 0x10000;
        const LEVEL_TRIG = 0x08000;
        const PO_LOW = 0x02000;
    }
}

/// Computes the low word of a redirection entry.
///
/// PA does not support the EXTINT or lowest-priority delivery modes, so only
/// polarity and trigger mode are added to the transaction data.
pub fn irdt_low(irte: &IrtEntry, txn_data: u32) -> u32 {
    let mut mode = IrdtFlags::empty();
    if irte.is_active_low() {
        mode |= IrdtFlags::PO_LOW;
    }
    if irte.is_level_triggered() {
        mode |= IrdtFlags::LEVEL_TRIG;
    }
    mode.bits() | txn_data
}

/// Computes the high word of a redirection entry, which selects the processor.
pub fn irdt_high(protocol: RoutingProtocol, txn_addr: u64) -> u32 {
    match protocol {
        // PAT firmware hands out the address already in the right layout.
        RoutingProtocol::Pat => txn_addr as u32,
        RoutingProtocol::Legacy => pack_legacy_txn_addr(txn_addr as u32),
    }
}

/// Moves the EID and ID of a legacy transaction address into the positions
/// the redirection entry expects.
///
/// For example `0xfffa0000` becomes `0xa0ff0000`:
///
/// ```text
/// eid 0x0ff00000 -> 0x00ff0000
/// id  0x000ff000 -> 0xff000000
/// ```
pub fn pack_legacy_txn_addr(txn_addr: u32) -> u32 {
    ((txn_addr & 0x0ff0_0000) >> 4) | ((txn_addr & 0x000f_f000) << 12)
}

/// The inverse of [`pack_legacy_txn_addr`] for the ID and EID bits.
pub fn unpack_legacy_txn_addr(high: u32) -> u32 {
    ((high & 0x00ff_0000) << 4) | ((high & 0xff00_0000) >> 12)
}

/// What a line is bound to. Set once, by the first device using the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub irte: IrtEntry,
    pub txn_irq: TxnIrq,
    pub txn_data: u32,
}

/// The state of one redirection line.
#[derive(Debug)]
pub struct VectorInfo {
    line: u8,
    controller: ControllerId,
    binding: Once<Binding>,
    txn_addr: AtomicU64,
    eoi_data: AtomicU32,
}

impl VectorInfo {
    pub(crate) fn new(controller: ControllerId, line: u8) -> Self {
        Self {
            line,
            controller,
            binding: Once::new(),
            txn_addr: AtomicU64::new(0),
            eoi_data: AtomicU32::new(0),
        }
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    pub fn handle(&self) -> VectorHandle {
        VectorHandle {
            controller: self.controller,
            line: self.line,
        }
    }

    /// Returns the binding, or `None` if no device has used the line yet.
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.get()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_completed()
    }

    /// Returns the transaction address the line currently targets.
    pub fn txn_addr(&self) -> u64 {
        self.txn_addr.load(Ordering::Acquire)
    }

    /// Binds the line with what `bind` returns, unless it is already bound.
    ///
    /// `bind` returns the binding and the initial transaction address. It is
    /// run at most once successfully; if it fails, the line stays unbound.
    pub(crate) fn bind_with<F>(&self, bind: F) -> Result<&Binding>
    where
        F: FnOnce() -> Result<(Binding, u64)>,
    {
        self.binding.try_call_once(|| {
            let (binding, txn_addr) = bind()?;
            self.txn_addr.store(txn_addr, Ordering::Release);
            self.eoi_data
                .store(binding.txn_data.to_le(), Ordering::Release);
            Ok(binding)
        })
    }

    /// Sets the mask bit, keeping everything else.
    pub(crate) fn mask(&self, access: &IosapicAccess, guard: &RegisterGuard<'_>) {
        let (low, high) = access.read_irdt(guard, self.line);
        access.write_irdt(guard, self.line, low | IrdtFlags::ENABLE.bits(), high);
    }

    /// Reprograms the whole entry from the binding, which leaves it unmasked.
    ///
    /// Returns `false` without touching the hardware if the line is unbound.
    pub(crate) fn program(
        &self,
        access: &IosapicAccess,
        guard: &RegisterGuard<'_>,
        protocol: RoutingProtocol,
    ) -> bool {
        let Some(binding) = self.binding() else {
            return false;
        };
        let low = irdt_low(&binding.irte, binding.txn_data);
        let high = irdt_high(protocol, self.txn_addr());
        trace!(
            "[IOSAPIC]: Programming line {} irq {}: {:#x} {:#x}",
            self.line, binding.txn_irq, low, high
        );
        access.write_irdt(guard, self.line, low, high);
        true
    }

    /// Points the line at `txn_addr`, keeping the low word as it is.
    pub(crate) fn retarget(
        &self,
        access: &IosapicAccess,
        guard: &RegisterGuard<'_>,
        protocol: RoutingProtocol,
        txn_addr: u64,
    ) {
        self.txn_addr.store(txn_addr, Ordering::Release);
        let (low, _) = access.read_irdt(guard, self.line);
        access.write_irdt(guard, self.line, low, irdt_high(protocol, txn_addr));
    }

    /// Writes the EOI for this line.
    ///
    /// Issuing an EOI raises the interrupt again if the line is still asserted.
    pub(crate) fn eoi(&self, access: &IosapicAccess) {
        access.eoi(self.eoi_data.load(Ordering::Relaxed));
    }
}

// SPDX-License-Identifier: MPL-2.0

//! The processor side of transaction based interrupts.
//!
//! PA-RISC processors only take interrupts as write transactions: a device
//! (or the I/O SAPIC on behalf of a line) writes a data word to a target
//! address that selects the processor. This module defines what the I/O
//! SAPIC driver expects from the code that owns processor interrupts.

use alloc::sync::Arc;

use crate::{
    error::{Error, Result},
    iosapic::VectorHandle,
};

/// A processor interrupt number.
pub type TxnIrq = u32;

/// A logical CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(pub u32);

/// Allocates processor interrupts and computes their transaction address and data.
pub trait TxnAllocator: Send + Sync {
    /// Allocates a processor interrupt out of a block of `bits` interrupts.
    ///
    /// Returns `None` if all processor interrupts are in use.
    fn alloc_irq(&self, bits: u8) -> Option<TxnIrq>;

    /// Returns the address that targets the processor currently handling `irq`.
    fn alloc_addr(&self, irq: TxnIrq) -> u64;

    /// Returns the data word that raises `irq` on its processor.
    fn alloc_data(&self, irq: TxnIrq) -> u32;

    /// Returns the address that targets `cpu` for `irq`.
    fn affinity_addr(&self, irq: TxnIrq, cpu: CpuId) -> u64;
}

/// The callbacks an interrupt controller hands to the generic IRQ layer.
///
/// Every callback receives the processor interrupt and the redirection line
/// that was passed to [`IrqDispatcher::claim_irq`].
pub trait IrqChip: Send + Sync {
    fn name(&self) -> &'static str;

    fn unmask(&self, irq: TxnIrq, vector: VectorHandle);

    fn mask(&self, irq: TxnIrq, vector: VectorHandle);

    fn ack(&self, irq: TxnIrq, vector: VectorHandle);

    fn eoi(&self, irq: TxnIrq, vector: VectorHandle);

    /// Retargets the interrupt to one of the CPUs in `dest`.
    fn set_affinity(&self, irq: TxnIrq, vector: VectorHandle, dest: &[CpuId]) -> Result<()> {
        let _ = (irq, vector, dest);
        Err(Error::NotSupported)
    }
}

/// The generic IRQ layer.
pub trait IrqDispatcher: Send + Sync {
    /// Hands `irq` over to `chip`, with `vector` as the per-line context.
    fn claim_irq(&self, irq: TxnIrq, chip: Arc<dyn IrqChip>, vector: VectorHandle);

    /// Acknowledges `irq` on the processor.
    fn ack_irq(&self, irq: TxnIrq);

    /// Ends `irq` on the processor.
    fn eoi_irq(&self, irq: TxnIrq);

    /// Picks the CPU out of `dest` that `irq` should be moved to.
    ///
    /// Returns `None` if none of them can take it.
    fn check_affinity(&self, irq: TxnIrq, dest: &[CpuId]) -> Option<CpuId>;
}

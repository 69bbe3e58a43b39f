// SPDX-License-Identifier: MPL-2.0

//! The callbacks the generic IRQ layer invokes on a bound redirection line.

use log::{trace, warn};

use crate::{
    iosapic::{Iosapic, VectorHandle},
    txn::{IrqChip, TxnIrq},
};
#[cfg(feature = "smp")]
use crate::{
    error::{Error, Result},
    txn::CpuId,
};

impl IrqChip for Iosapic {
    fn name(&self) -> &'static str {
        "IO-SAPIC-level"
    }

    fn unmask(&self, irq: TxnIrq, vector: VectorHandle) {
        let Some((controller, vector)) = self.vector(vector) else {
            warn!("[IOSAPIC]: Unmasking unknown line {:?}", vector);
            return;
        };

        let programmed = {
            let guard = self.lock.lock();
            vector.program(controller.access(), &guard, self.irt.protocol())
        };
        if !programmed {
            warn!(
                "[IOSAPIC]: Unmasking irq {} on line {} that was never bound",
                irq,
                vector.line()
            );
            return;
        }

        // An EOI raises the interrupt again if the line is already asserted.
        // The line should not be asserted when a driver enables its IRQ, but
        // an edge may have been latched while the line was masked.
        trace!("[IOSAPIC]: Unmasked irq {}, issuing EOI", irq);
        vector.eoi(controller.access());
    }

    fn mask(&self, _irq: TxnIrq, vector: VectorHandle) {
        let Some((controller, vector)) = self.vector(vector) else {
            warn!("[IOSAPIC]: Masking unknown line {:?}", vector);
            return;
        };
        let guard = self.lock.lock();
        vector.mask(controller.access(), &guard);
    }

    fn ack(&self, irq: TxnIrq, _vector: VectorHandle) {
        self.dispatcher.ack_irq(irq);
    }

    fn eoi(&self, irq: TxnIrq, vector: VectorHandle) {
        // Only claimed lines reach here, so the lookup always resolves. It is
        // two loads and no lock; the EOI itself is a single raw write.
        if let Some((controller, vector)) = self.vector(vector) {
            vector.eoi(controller.access());
        }
        self.dispatcher.eoi_irq(irq);
    }

    #[cfg(feature = "smp")]
    fn set_affinity(&self, irq: TxnIrq, vector: VectorHandle, dest: &[CpuId]) -> Result<()> {
        let (controller, vector) = self.vector(vector).ok_or(Error::InvalidArgs)?;
        let cpu = self
            .dispatcher
            .check_affinity(irq, dest)
            .ok_or(Error::InvalidArgs)?;
        let txn_addr = self.allocator.affinity_addr(irq, cpu);

        // Only the high word holds the destination CPU.
        let guard = self.lock.lock();
        vector.retarget(controller.access(), &guard, self.irt.protocol(), txn_addr);
        trace!("[IOSAPIC]: irq {} moved to {:?}", irq, cpu);
        Ok(())
    }
}

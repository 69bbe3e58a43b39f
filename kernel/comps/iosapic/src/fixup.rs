// SPDX-License-Identifier: MPL-2.0

//! Binding PCI devices to processor interrupts.
//!
//! The I/O SAPIC can tell the CPU which line was asserted, so every line
//! gets its own processor interrupt and the device driver's handler is
//! called directly. Processor interrupts are allocated when a device is
//! fixed up, whether or not a driver ever claims the device.

use alloc::sync::Arc;

use log::{debug, warn};

use crate::{
    error::{Error, Result},
    iosapic::{ControllerId, Iosapic},
    pci::PciFunction,
    txn::{IrqChip, TxnIrq},
    vector::Binding,
    xlate::xlate_pin,
};

impl Iosapic {
    /// Binds the interrupt of `dev` to a processor interrupt and returns it.
    ///
    /// Devices that share a redirection line share the processor interrupt;
    /// only the first one allocates it and hands the line to the generic IRQ
    /// layer.
    ///
    /// # Errors
    ///
    /// - [`Error::NotRegistered`] if `id` is unknown;
    /// - [`Error::NoRoute`] if the device does not use line interrupts or
    ///   its pin is not wired to the I/O SAPIC;
    /// - [`Error::InvalidArgs`] if the routing table names a line the I/O
    ///   SAPIC does not have;
    /// - [`Error::NotEnoughResources`] if no processor interrupt is left.
    pub fn bind(self: &Arc<Self>, id: ControllerId, dev: &dyn PciFunction) -> Result<TxnIrq> {
        let controller = self.controller(id).ok_or(Error::NotRegistered)?;

        let Some(irte) = xlate_pin(&self.irt, controller.hpa(), dev) else {
            warn!(
                "[IOSAPIC]: No IRTE for {} (IRQ not connected?)",
                dev.location()
            );
            return Err(Error::NoRoute);
        };
        let line = irte.dest_line();
        let Some(vector) = controller.vector(line) else {
            warn!(
                "[IOSAPIC]: {:#x} has no line {} for {}",
                controller.hpa(),
                line,
                dev.location()
            );
            return Err(Error::InvalidArgs);
        };

        let mut newly_bound = false;
        let binding = vector.bind_with(|| {
            let txn_irq = self
                .allocator
                .alloc_irq(self.config.txn_irq_bits)
                .ok_or(Error::NotEnoughResources)?;
            let txn_addr = self.allocator.alloc_addr(txn_irq);
            let txn_data = self.allocator.alloc_data(txn_irq);
            newly_bound = true;
            Ok((
                Binding {
                    irte: *irte,
                    txn_irq,
                    txn_data,
                },
                txn_addr,
            ))
        })?;

        if newly_bound {
            let chip: Arc<dyn IrqChip> = self.clone();
            self.dispatcher
                .claim_irq(binding.txn_irq, chip, vector.handle());
        }

        debug!(
            "[IOSAPIC]: {} uses line {} of {:#x}, irq {}",
            dev.location(),
            line,
            controller.hpa(),
            binding.txn_irq
        );
        Ok(binding.txn_irq)
    }

    /// Fixes up the IRQ of `dev`, which sits below the I/O SAPIC `id`.
    ///
    /// Returns the processor interrupt the device must use from now on, or
    /// `None` if the device cannot use line interrupts.
    ///
    /// # Panics
    ///
    /// Panics if no processor interrupt is left. A device that has been told
    /// it has an interrupt cannot continue without one.
    pub fn fixup_irq(
        self: &Arc<Self>,
        id: Option<ControllerId>,
        dev: &dyn PciFunction,
    ) -> Option<TxnIrq> {
        let Some(id) = id else {
            warn!("[IOSAPIC]: HPA not registered for {}", dev.location());
            return None;
        };

        match self.bind(id, dev) {
            Ok(irq) => Some(irq),
            Err(Error::NotEnoughResources) => panic!("I/O SAPIC: couldn't get TXN IRQ"),
            Err(_) => None,
        }
    }
}

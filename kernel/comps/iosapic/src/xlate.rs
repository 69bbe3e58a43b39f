// SPDX-License-Identifier: MPL-2.0

//! Translation of a device's interrupt pin into a routing-table lookup.
//!
//! Legacy PDC already performs this translation and stores the result in
//! `INTERRUPT_LINE`. With PAT PDC the OS does what legacy PDC does:
//!
//! 1. read the interrupt pin;
//! 2. skew the pin if the device sits behind a PCI-PCI bridge (e.g., a
//!    4-port network card or a SCSI/LAN combo card);
//! 3. look up the slot/pin pair in the routing table.
//!
//! HP platforms only skew once, however many PCI-PCI bridges there are
//! between the I/O SAPIC and the device. Expansion chassis follow the same
//! rule, so the slot looked up is always the one of the bridge sitting on
//! the root bus.

use log::trace;

use crate::{
    irt::{IrtEntry, RoutingTable},
    pci::PciFunction,
};

/// Returns the 0-based index of the pin that `pin` (1-based) of a device in
/// slot `device` shows up as on the upstream side of a PCI-PCI bridge.
pub fn swizzle_pin_index(pin: u8, device: u8) -> u8 {
    pin.wrapping_add(device).wrapping_sub(1) % 4
}

/// Returns the 1-based pin that `pin` of a device in slot `device` shows up
/// as on the upstream side of a PCI-PCI bridge.
pub fn swizzle_pin(pin: u8, device: u8) -> u8 {
    swizzle_pin_index(pin, device) + 1
}

/// Resolves the routing entry that serves `dev` on the I/O SAPIC at `hpa`.
///
/// Returns `None` if the device does not use line interrupts or if its
/// interrupt is not wired to the I/O SAPIC.
pub fn xlate_pin<'a>(
    table: &'a RoutingTable,
    hpa: u64,
    dev: &dyn PciFunction,
) -> Option<&'a IrtEntry> {
    let location = dev.location();
    let intr_pin = dev.interrupt_pin();
    trace!(
        "[IOSAPIC]: Translating {} slot {} pin {}",
        location, location.device, intr_pin
    );

    if intr_pin == 0 {
        // The device does not use line interrupts.
        return None;
    }

    let (intr_slot, intr_pin) = match dev.parent_bridge() {
        Some(mut bridge) => {
            let intr_pin = swizzle_pin(intr_pin, location.device);
            while let Some(upper) = bridge.parent_bridge() {
                bridge = upper;
            }
            (bridge.location().device, intr_pin)
        }
        None => (location.device, intr_pin),
    };
    trace!(
        "[IOSAPIC]: {} resolves to bus {} slot {} pin {}",
        location, location.bus, intr_slot, intr_pin
    );

    table.find(hpa, intr_slot, intr_pin)
}

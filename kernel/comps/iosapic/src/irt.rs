// SPDX-License-Identifier: MPL-2.0

//! The interrupt routing table (IRT).
//!
//! The IRT maps each PCI slot's INTA-D output pin to an input line of an
//! I/O SAPIC. All platforms to date use a single table for the whole
//! platform, which is loaded once at boot and never changes afterwards.
//!
//! The table does not describe devices behind PCI-PCI bridges. Those are
//! handled by skewing the pin, see [`crate::xlate`].

use alloc::vec::Vec;

use log::{info, trace, warn};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{
    config::AddrPolicy,
    error::{Error, Result},
    firmware::{IrtFirmware, RoutingProtocol},
    pci::PciDeviceLocation,
};

/// The entry type of an I/O SAPIC routing entry.
pub const IRT_IOSAPIC_TYPE: u8 = 139;
/// The length of an I/O SAPIC routing entry.
pub const IRT_IOSAPIC_LENGTH: u8 = 16;
/// Vectored interrupt. Nothing else is expected from PCI devices.
pub const IRT_VECTORED_INTR: u8 = 0;

pub const IRT_PO_MASK: u8 = 0x3;
pub const IRT_ACTIVE_HI: u8 = 1;
pub const IRT_ACTIVE_LO: u8 = 3;

pub const IRT_EL_MASK: u8 = 0x3;
pub const IRT_EL_SHIFT: u8 = 2;
pub const IRT_EDGE_TRIG: u8 = 1;
pub const IRT_LEVEL_TRIG: u8 = 3;

pub const IRT_IRQ_MASK: u8 = 0x3;
pub const IRT_DEV_MASK: u8 = 0x1f;
pub const IRT_DEV_SHIFT: u8 = 2;
/// The bits of `src_bus_irq_devno` that encode the slot and the pin.
pub const IRT_IRQ_DEVNO_MASK: u8 = (IRT_DEV_MASK << IRT_DEV_SHIFT) | IRT_IRQ_MASK;

/// One entry of the interrupt routing table, as laid out by the firmware.
///
/// The format is derived from the IA64 SAL Specification 2.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IrtEntry {
    pub entry_type: u8,
    pub entry_length: u8,
    pub interrupt_type: u8,
    pub polarity_trigger: u8,
    pub src_bus_irq_devno: u8,
    pub src_bus_id: u8,
    pub src_seg_id: u8,
    pub dest_iosapic_intin: u8,
    pub dest_iosapic_addr: u64,
}

impl IrtEntry {
    /// Returns whether the type, length and interrupt type are the ones of a
    /// vectored I/O SAPIC entry.
    pub fn is_iosapic_vectored(&self) -> bool {
        self.entry_type == IRT_IOSAPIC_TYPE
            && self.entry_length == IRT_IOSAPIC_LENGTH
            && self.interrupt_type == IRT_VECTORED_INTR
    }

    pub fn is_active_low(&self) -> bool {
        self.polarity_trigger & IRT_PO_MASK == IRT_ACTIVE_LO
    }

    pub fn is_level_triggered(&self) -> bool {
        (self.polarity_trigger >> IRT_EL_SHIFT) & IRT_EL_MASK == IRT_LEVEL_TRIG
    }

    /// Returns the I/O SAPIC input line this entry is wired to.
    pub fn dest_line(&self) -> u8 {
        self.dest_iosapic_intin
    }
}

/// Encodes a PCI slot and a 1-based interrupt pin the way `src_bus_irq_devno` does.
///
/// Returns `None` if the slot is not a valid PCI device number or the pin is
/// not one of INTA to INTD.
pub fn irq_devno(slot: u8, pin: u8) -> Option<u8> {
    if slot > PciDeviceLocation::MAX_DEVICE || !(1..=4).contains(&pin) {
        return None;
    }
    Some((slot << IRT_DEV_SHIFT) | (pin - 1))
}

/// The interrupt routing table of the platform.
#[derive(Debug)]
pub struct RoutingTable {
    entries: Vec<IrtEntry>,
    protocol: RoutingProtocol,
    addr_policy: AddrPolicy,
}

impl RoutingTable {
    /// Creates a table without entries.
    ///
    /// An empty table means old firmware that has already programmed the
    /// interrupt lines itself.
    pub fn empty(protocol: RoutingProtocol, addr_policy: AddrPolicy) -> Self {
        Self {
            entries: Vec::new(),
            protocol,
            addr_policy,
        }
    }

    /// Creates a table from entries that were fetched elsewhere.
    pub fn from_entries(
        entries: Vec<IrtEntry>,
        protocol: RoutingProtocol,
        addr_policy: AddrPolicy,
    ) -> Self {
        Self {
            entries,
            protocol,
            addr_policy,
        }
    }

    /// Fetches the routing table of `cell` from the firmware.
    ///
    /// Firmware that does not implement the call, or that reports no
    /// entries, yields an empty table. This is the normal case on platforms
    /// without an I/O SAPIC.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FirmwareContract`] if the firmware reports a size but
    /// then fails to fill the table, or if PAT firmware fails the size query
    /// for any reason other than not supporting it.
    pub fn load(
        firmware: &dyn IrtFirmware,
        cell: u64,
        addr_policy: AddrPolicy,
    ) -> Result<Self> {
        let protocol = firmware.protocol();

        let num_entries = match firmware.irt_size(cell) {
            Ok(num_entries) => num_entries,
            Err(err) if protocol == RoutingProtocol::Legacy || err.is_unsupported() => {
                info!("[IOSAPIC]: No interrupt routing table ({})", err);
                return Ok(Self::empty(protocol, addr_policy));
            }
            Err(err) => {
                warn!(
                    "[IOSAPIC]: Querying the routing table size of cell {} failed: {}",
                    cell, err
                );
                return Err(Error::FirmwareContract);
            }
        };
        if num_entries == 0 {
            info!("[IOSAPIC]: The interrupt routing table is empty");
            return Ok(Self::empty(protocol, addr_policy));
        }

        // `IrtEntry` is 8-byte aligned, which is what the firmware requires
        // of the buffer.
        let mut entries = Vec::new();
        if entries.try_reserve_exact(num_entries).is_err() {
            warn!(
                "[IOSAPIC]: Can not allocate memory for {} routing entries",
                num_entries
            );
            return Ok(Self::empty(protocol, addr_policy));
        }
        entries.resize(num_entries, IrtEntry::new_zeroed());

        if let Err(err) = firmware.read_irt(cell, entries.as_mut_slice().as_mut_bytes()) {
            warn!(
                "[IOSAPIC]: Firmware reported {} routing entries but failed to return them: {}",
                num_entries, err
            );
            return Err(Error::FirmwareContract);
        }

        info!(
            "[IOSAPIC]: Interrupt routing table of cell {} has {} entries ({:?} firmware)",
            cell, num_entries, protocol
        );
        for (idx, entry) in entries.iter().enumerate() {
            trace!(
                "[IOSAPIC]: IRT[{}] {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:016x}",
                idx,
                entry.entry_type,
                entry.entry_length,
                entry.interrupt_type,
                entry.polarity_trigger,
                entry.src_bus_irq_devno,
                entry.src_bus_id,
                entry.src_seg_id,
                entry.dest_iosapic_intin,
                entry.dest_iosapic_addr,
            );
        }

        Ok(Self {
            entries,
            protocol,
            addr_policy,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IrtEntry] {
        &self.entries
    }

    pub fn protocol(&self) -> RoutingProtocol {
        self.protocol
    }

    pub fn addr_policy(&self) -> AddrPolicy {
        self.addr_policy
    }

    /// Returns whether any entry routes to the I/O SAPIC at `hpa`.
    ///
    /// Legacy PDC omits bus adapters without PCI devices from the table, so
    /// an I/O SAPIC that does not appear here has nothing to route.
    pub fn routes_to(&self, hpa: u64) -> bool {
        self.entries.iter().any(|entry| {
            if entry.entry_type != IRT_IOSAPIC_TYPE {
                warn!(
                    "[IOSAPIC]: Unexpected routing entry type {}",
                    entry.entry_type
                );
            }
            self.addr_policy.matches(entry.dest_iosapic_addr, hpa)
        })
    }

    /// Looks up the entry routing `slot`/`pin` to the I/O SAPIC at `hpa`.
    ///
    /// `pin` is 1-based (INTA is 1). Entries that are not vectored I/O SAPIC
    /// entries are skipped. The first match wins.
    pub fn find(&self, hpa: u64, slot: u8, pin: u8) -> Option<&IrtEntry> {
        let devno = irq_devno(slot, pin)?;
        trace!("[IOSAPIC]: Looking up slot {} pin {}", slot, pin);

        let found = self.entries.iter().enumerate().find(|(idx, entry)| {
            // Tag mismatches are not expected on current platforms. Skip them
            // and keep scanning.
            if !entry.is_iosapic_vectored() {
                trace!(
                    "[IOSAPIC]: Skipping entry {}: type {} length {} interrupt type {}",
                    idx, entry.entry_type, entry.entry_length, entry.interrupt_type
                );
                return false;
            }
            // `src_bus_id` and `src_seg_id` correlate with the HPA on HP
            // platforms, so they are not compared.
            self.addr_policy.matches(entry.dest_iosapic_addr, hpa)
                && entry.src_bus_irq_devno & IRT_IRQ_DEVNO_MASK == devno
        });

        match found {
            Some((_, entry)) => Some(entry),
            None => {
                warn!(
                    "[IOSAPIC]: {:#x}: no IRT entry for slot {}, pin {}",
                    hpa, slot, pin
                );
                None
            }
        }
    }
}

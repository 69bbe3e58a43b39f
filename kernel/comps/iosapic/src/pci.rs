// SPDX-License-Identifier: MPL-2.0

//! The view of PCI devices this driver needs from the bus layer.

use core::fmt;

/// The location of a PCI function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PciDeviceLocation {
    /// Bus number
    pub bus: u8,
    /// Device number with max 31
    pub device: u8,
    /// Function number with max 7
    pub function: u8,
}

impl PciDeviceLocation {
    pub const MAX_DEVICE: u8 = 31;
    pub const MAX_FUNCTION: u8 = 7;

    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for PciDeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// The offset of the interrupt pin register in the configuration header.
pub const PCI_INTERRUPT_PIN: u16 = 0x3D;

/// A PCI function as seen by the I/O SAPIC driver.
pub trait PciFunction {
    /// Returns where the function sits on its bus.
    fn location(&self) -> PciDeviceLocation;

    /// Reads a byte from the configuration space.
    fn read8(&self, offset: u16) -> u8;

    /// Returns the PCI-PCI bridge whose secondary bus this function sits on,
    /// or `None` if the function is on a root bus.
    fn parent_bridge(&self) -> Option<&dyn PciFunction>;

    /// Returns the 1-based interrupt pin the function uses, or zero if it
    /// does not use line interrupts.
    fn interrupt_pin(&self) -> u8 {
        self.read8(PCI_INTERRUPT_PIN)
    }
}

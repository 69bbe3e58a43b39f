// SPDX-License-Identifier: MPL-2.0

//! Register access.
//!
//! The redirection table is not memory mapped directly. Software writes the
//! index of a register to the select register and then accesses it through
//! the window register. Since the pair is shared, every select-then-access
//! sequence must be done under the register lock, see [`RegisterGuard`].
//! The EOI register is separate and is written without the lock.

use alloc::sync::Arc;
use core::ptr::NonNull;

use bit_field::BitField;
use volatile::VolatilePtr;

use crate::error::Result;

/// The size of the register window of an I/O SAPIC.
pub const IOSAPIC_MMIO_SIZE: usize = 4096;

/// Memory-mapped I/O.
///
/// Registers are little-endian. [`Self::read32`] and [`Self::write32`]
/// convert to and from the CPU byte order, [`Self::raw_write32`] does not.
pub trait IoMemory: Send + Sync {
    fn read32(&self, offset: usize) -> u32;

    fn write32(&self, offset: usize, value: u32);

    fn raw_write32(&self, offset: usize, value: u32);
}

/// Maps the register windows of I/O SAPICs.
pub trait IoMemMapper: Send + Sync {
    /// Maps `size` bytes of uncached I/O memory at the physical address `hpa`.
    fn map(&self, hpa: u64, size: usize) -> Result<Arc<dyn IoMemory>>;
}

/// I/O memory that has been mapped at a fixed virtual address.
#[derive(Debug)]
pub struct VolatileIoMem {
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: The pointer is only used for volatile accesses, which are fine to
// issue from any CPU.
unsafe impl Send for VolatileIoMem {}
// SAFETY: See above.
unsafe impl Sync for VolatileIoMem {}

impl VolatileIoMem {
    /// # Safety
    ///
    /// The caller must ensure that `base..base + size` is mapped, stays
    /// mapped for the lifetime of the returned object, and is only accessed
    /// through it.
    pub unsafe fn new(base: NonNull<u8>, size: usize) -> Self {
        Self { base, size }
    }

    fn reg(&self, offset: usize) -> VolatilePtr<'_, u32> {
        assert!(offset % 4 == 0 && offset + 4 <= self.size);
        // SAFETY:
        // - The offset is aligned and in bounds, as we've checked above.
        // - The caller of `new` guarantees that the range is mapped and exclusively ours.
        unsafe { VolatilePtr::new(self.base.byte_add(offset).cast::<u32>()) }
    }
}

impl IoMemory for VolatileIoMem {
    fn read32(&self, offset: usize) -> u32 {
        u32::from_le(self.reg(offset).read())
    }

    fn write32(&self, offset: usize, value: u32) {
        self.reg(offset).write(value.to_le());
    }

    fn raw_write32(&self, offset: usize, value: u32) {
        self.reg(offset).write(value);
    }
}

/// Proof that the register lock is held.
pub(crate) type RegisterGuard<'a> = spin::MutexGuard<'a, ()>;

pub(crate) struct IosapicAccess {
    io_mem: Arc<dyn IoMemory>,
}

impl IosapicAccess {
    const REG_SELECT: usize = 0x00;
    const REG_WINDOW: usize = 0x10;
    const REG_EOI: usize = 0x40;

    const REG_VERSION: u32 = 0x1;

    pub(crate) fn new(io_mem: Arc<dyn IoMemory>) -> Self {
        Self { io_mem }
    }

    const fn irdt_entry(line: u8) -> u32 {
        0x10 + (line as u32) * 2
    }

    const fn irdt_entry_hi(line: u8) -> u32 {
        0x11 + (line as u32) * 2
    }

    fn read(&self, _guard: &RegisterGuard<'_>, register: u32) -> u32 {
        self.io_mem.write32(Self::REG_SELECT, register);
        self.io_mem.read32(Self::REG_WINDOW)
    }

    fn write(&self, _guard: &RegisterGuard<'_>, register: u32, value: u32) {
        self.io_mem.write32(Self::REG_SELECT, register);
        self.io_mem.write32(Self::REG_WINDOW, value);
        // Read the window back so that the write reaches the hardware before
        // the next one is issued.
        let _ = self.io_mem.read32(Self::REG_WINDOW);
    }

    pub(crate) fn version(&self, guard: &RegisterGuard<'_>) -> u32 {
        self.read(guard, Self::REG_VERSION)
    }

    /// Reads the low and high words of the redirection entry of `line`.
    pub(crate) fn read_irdt(&self, guard: &RegisterGuard<'_>, line: u8) -> (u32, u32) {
        (
            self.read(guard, Self::irdt_entry(line)),
            self.read(guard, Self::irdt_entry_hi(line)),
        )
    }

    /// Writes the low and then the high word of the redirection entry of `line`.
    pub(crate) fn write_irdt(&self, guard: &RegisterGuard<'_>, line: u8, low: u32, high: u32) {
        self.write(guard, Self::irdt_entry(line), low);
        self.write(guard, Self::irdt_entry_hi(line), high);
    }

    /// Issues an end of interrupt.
    ///
    /// `eoi_data` is already in the register byte order.
    pub(crate) fn eoi(&self, eoi_data: u32) {
        self.io_mem.raw_write32(Self::REG_EOI, eoi_data);
    }
}

/// Returns the version of an I/O SAPIC from its version register.
pub fn version_of(version_reg: u32) -> u8 {
    version_reg.get_bits(0..8) as u8
}

/// Returns the number of redirection entries from the version register.
pub fn num_vectors_of(version_reg: u32) -> usize {
    version_reg.get_bits(16..24) as usize + 1
}

// SPDX-License-Identifier: MPL-2.0

//! In-memory stand-ins for the firmware, the hardware and the processor side.

use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::{
    mem,
    sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
};

use spin::Mutex;
use zerocopy::IntoBytes;

use crate::{
    access::{IoMemMapper, IoMemory, IOSAPIC_MMIO_SIZE},
    config::{AddrPolicy, IosapicConfig},
    error::{Error, Result},
    firmware::{IrtFirmware, PdcError, PdcResult, RoutingProtocol},
    iosapic::{Iosapic, VectorHandle},
    irt::{
        irq_devno, IrtEntry, RoutingTable, IRT_ACTIVE_LO, IRT_EL_SHIFT, IRT_IOSAPIC_LENGTH,
        IRT_IOSAPIC_TYPE, IRT_LEVEL_TRIG, IRT_VECTORED_INTR,
    },
    pci::{PciDeviceLocation, PciFunction, PCI_INTERRUPT_PIN},
    txn::{CpuId, IrqChip, IrqDispatcher, TxnAllocator, TxnIrq},
};

/// A level-triggered, active-low entry routing `slot`/`pin` to `line` of the I/O SAPIC at `hpa`.
pub(crate) fn irte(hpa: u64, slot: u8, pin: u8, line: u8) -> IrtEntry {
    IrtEntry {
        entry_type: IRT_IOSAPIC_TYPE,
        entry_length: IRT_IOSAPIC_LENGTH,
        interrupt_type: IRT_VECTORED_INTR,
        polarity_trigger: IRT_ACTIVE_LO | (IRT_LEVEL_TRIG << IRT_EL_SHIFT),
        src_bus_irq_devno: irq_devno(slot, pin).expect("slot or pin out of range"),
        src_bus_id: 0,
        src_seg_id: 0,
        dest_iosapic_intin: line,
        dest_iosapic_addr: hpa,
    }
}

pub(crate) struct FakeFirmware {
    protocol: RoutingProtocol,
    entries: Vec<IrtEntry>,
    pub(crate) cell: PdcResult<u64>,
    pub(crate) size: PdcResult<usize>,
    pub(crate) fill: PdcResult<()>,
    last_cell: Mutex<Option<u64>>,
}

impl FakeFirmware {
    pub(crate) fn pat(entries: Vec<IrtEntry>) -> Self {
        Self::new(RoutingProtocol::Pat, entries)
    }

    pub(crate) fn legacy(entries: Vec<IrtEntry>) -> Self {
        Self::new(RoutingProtocol::Legacy, entries)
    }

    fn new(protocol: RoutingProtocol, entries: Vec<IrtEntry>) -> Self {
        Self {
            protocol,
            cell: Err(PdcError::BadProc),
            size: Ok(entries.len()),
            fill: Ok(()),
            entries,
            last_cell: Mutex::new(None),
        }
    }

    pub(crate) fn last_cell(&self) -> Option<u64> {
        *self.last_cell.lock()
    }
}

impl IrtFirmware for FakeFirmware {
    fn protocol(&self) -> RoutingProtocol {
        self.protocol
    }

    fn cell_number(&self) -> PdcResult<u64> {
        self.cell
    }

    fn irt_size(&self, cell: u64) -> PdcResult<usize> {
        *self.last_cell.lock() = Some(cell);
        self.size
    }

    fn read_irt(&self, cell: u64, buf: &mut [u8]) -> PdcResult<()> {
        assert_eq!(buf.as_ptr() as usize % 8, 0, "IRT buffer must be 8-byte aligned");
        assert_eq!(buf.len(), self.entries.len() * mem::size_of::<IrtEntry>());
        *self.last_cell.lock() = Some(cell);
        self.fill?;
        buf.copy_from_slice(self.entries.as_bytes());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Read(usize),
    Write(usize, u32),
    RawWrite(usize, u32),
}

/// Detects select-then-access sequences that overlap, on any I/O SAPIC of a platform.
#[derive(Default)]
pub(crate) struct SimBus {
    selecting: AtomicBool,
    torn: AtomicUsize,
}

impl SimBus {
    pub(crate) fn torn_accesses(&self) -> usize {
        self.torn.load(Ordering::Relaxed)
    }
}

struct SimState {
    select: u32,
    regs: BTreeMap<u32, u32>,
    log: Vec<Access>,
    eois: Vec<u32>,
}

/// The registers of an I/O SAPIC.
pub(crate) struct SimIosapic {
    state: Mutex<SimState>,
    bus: Arc<SimBus>,
}

impl SimIosapic {
    const REG_VERSION: u32 = 0x1;

    pub(crate) fn new(_hpa: u64, version: u32) -> Self {
        Self::on_bus(version, Arc::new(SimBus::default()))
    }

    pub(crate) fn on_bus(version: u32, bus: Arc<SimBus>) -> Self {
        let mut regs = BTreeMap::new();
        regs.insert(Self::REG_VERSION, version);
        Self {
            state: Mutex::new(SimState {
                select: 0,
                regs,
                log: Vec::new(),
                eois: Vec::new(),
            }),
            bus,
        }
    }

    /// Returns the low and high words of redirection entry `line`.
    pub(crate) fn irdt(&self, line: u8) -> (u32, u32) {
        let state = self.state.lock();
        let reg = 0x10 + 2 * line as u32;
        (
            state.regs.get(&reg).copied().unwrap_or(0),
            state.regs.get(&(reg + 1)).copied().unwrap_or(0),
        )
    }

    pub(crate) fn take_log(&self) -> Vec<Access> {
        mem::take(&mut self.state.lock().log)
    }

    /// Returns the data of every EOI written so far, in CPU byte order.
    pub(crate) fn eois(&self) -> Vec<u32> {
        self.state.lock().eois.clone()
    }
}

impl IoMemory for SimIosapic {
    fn read32(&self, offset: usize) -> u32 {
        assert_eq!(offset, 0x10, "only the window register is readable");
        self.bus.selecting.store(false, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.log.push(Access::Read(offset));
        state.regs.get(&state.select).copied().unwrap_or(0)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock();
        state.log.push(Access::Write(offset, value));
        match offset {
            0x00 => {
                if self.bus.selecting.swap(true, Ordering::SeqCst) {
                    self.bus.torn.fetch_add(1, Ordering::Relaxed);
                }
                state.select = value;
            }
            0x10 => {
                self.bus.selecting.store(false, Ordering::SeqCst);
                let select = state.select;
                if select != Self::REG_VERSION {
                    state.regs.insert(select, value);
                }
            }
            _ => panic!("write to unexpected register {:#x}", offset),
        }
    }

    fn raw_write32(&self, offset: usize, value: u32) {
        assert_eq!(offset, 0x40, "only the EOI register is written raw");
        let mut state = self.state.lock();
        state.log.push(Access::RawWrite(offset, value));
        state.eois.push(u32::from_le(value));
    }
}

#[derive(Default)]
pub(crate) struct FakeMapper {
    iosapics: Mutex<BTreeMap<u64, Arc<SimIosapic>>>,
    mapped: Mutex<Vec<u64>>,
}

impl FakeMapper {
    pub(crate) fn mapped(&self) -> Vec<u64> {
        self.mapped.lock().clone()
    }
}

impl IoMemMapper for FakeMapper {
    fn map(&self, hpa: u64, size: usize) -> Result<Arc<dyn IoMemory>> {
        assert_eq!(size, IOSAPIC_MMIO_SIZE);
        let iosapic = self
            .iosapics
            .lock()
            .get(&hpa)
            .cloned()
            .ok_or(Error::IoError)?;
        self.mapped.lock().push(hpa);
        Ok(iosapic)
    }
}

/// The transaction address of CPU 0, in the legacy layout.
pub(crate) const CPU0_TXN_ADDR: u64 = 0xfffa_0000;

pub(crate) struct FakeAllocator {
    next: AtomicU32,
    limit: u32,
    bits: Mutex<Vec<u8>>,
}

impl FakeAllocator {
    pub(crate) const FIRST_IRQ: TxnIrq = 64;

    pub(crate) fn new(count: u32) -> Self {
        Self {
            next: AtomicU32::new(Self::FIRST_IRQ),
            limit: Self::FIRST_IRQ + count,
            bits: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed) - Self::FIRST_IRQ
    }

    pub(crate) fn requested_bits(&self) -> Vec<u8> {
        self.bits.lock().clone()
    }
}

impl TxnAllocator for FakeAllocator {
    fn alloc_irq(&self, bits: u8) -> Option<TxnIrq> {
        self.bits.lock().push(bits);
        let irq = self.next.load(Ordering::Relaxed);
        if irq >= self.limit {
            return None;
        }
        self.next.store(irq + 1, Ordering::Relaxed);
        Some(irq)
    }

    fn alloc_addr(&self, _irq: TxnIrq) -> u64 {
        CPU0_TXN_ADDR
    }

    fn alloc_data(&self, irq: TxnIrq) -> u32 {
        irq
    }

    fn affinity_addr(&self, _irq: TxnIrq, cpu: CpuId) -> u64 {
        0xfff0_0000 | ((cpu.0 as u64) << 12)
    }
}

type Claim = (Arc<dyn IrqChip>, VectorHandle);

/// The generic IRQ layer, driving the callbacks of claimed interrupts.
pub(crate) struct FakeDispatcher {
    num_cpus: u32,
    claims: Mutex<BTreeMap<TxnIrq, Claim>>,
    acks: Mutex<Vec<TxnIrq>>,
    eois: Mutex<Vec<TxnIrq>>,
}

impl FakeDispatcher {
    pub(crate) fn new(num_cpus: u32) -> Self {
        Self {
            num_cpus,
            claims: Mutex::new(BTreeMap::new()),
            acks: Mutex::new(Vec::new()),
            eois: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn claimed(&self) -> Vec<(TxnIrq, VectorHandle)> {
        self.claims
            .lock()
            .iter()
            .map(|(irq, (_, vector))| (*irq, *vector))
            .collect()
    }

    pub(crate) fn acks(&self) -> Vec<TxnIrq> {
        self.acks.lock().clone()
    }

    pub(crate) fn eois(&self) -> Vec<TxnIrq> {
        self.eois.lock().clone()
    }

    fn claim(&self, irq: TxnIrq) -> Claim {
        let claims = self.claims.lock();
        let (chip, vector) = claims.get(&irq).expect("irq not claimed");
        (chip.clone(), *vector)
    }

    pub(crate) fn unmask(&self, irq: TxnIrq) {
        let (chip, vector) = self.claim(irq);
        chip.unmask(irq, vector);
    }

    pub(crate) fn mask(&self, irq: TxnIrq) {
        let (chip, vector) = self.claim(irq);
        chip.mask(irq, vector);
    }

    pub(crate) fn handle(&self, irq: TxnIrq) {
        let (chip, vector) = self.claim(irq);
        chip.ack(irq, vector);
        chip.eoi(irq, vector);
    }

    pub(crate) fn set_affinity(&self, irq: TxnIrq, dest: &[CpuId]) -> Result<()> {
        let (chip, vector) = self.claim(irq);
        chip.set_affinity(irq, vector, dest)
    }

    pub(crate) fn chip_name(&self, irq: TxnIrq) -> &'static str {
        self.claim(irq).0.name()
    }
}

impl IrqDispatcher for FakeDispatcher {
    fn claim_irq(&self, irq: TxnIrq, chip: Arc<dyn IrqChip>, vector: VectorHandle) {
        let previous = self.claims.lock().insert(irq, (chip, vector));
        assert!(previous.is_none(), "irq {} claimed twice", irq);
    }

    fn ack_irq(&self, irq: TxnIrq) {
        self.acks.lock().push(irq);
    }

    fn eoi_irq(&self, irq: TxnIrq) {
        self.eois.lock().push(irq);
    }

    fn check_affinity(&self, _irq: TxnIrq, dest: &[CpuId]) -> Option<CpuId> {
        dest.iter().find(|cpu| cpu.0 < self.num_cpus).copied()
    }
}

/// A platform with a routing table, I/O SAPICs and a processor side.
pub(crate) struct Platform {
    irt: Arc<RoutingTable>,
    pub(crate) bus: Arc<SimBus>,
    pub(crate) mapper: Arc<FakeMapper>,
    pub(crate) allocator: Arc<FakeAllocator>,
    pub(crate) dispatcher: Arc<FakeDispatcher>,
}

impl Platform {
    pub(crate) fn new(entries: Vec<IrtEntry>) -> Self {
        Self::with_protocol(entries, RoutingProtocol::Pat)
    }

    pub(crate) fn legacy(entries: Vec<IrtEntry>) -> Self {
        Self::with_protocol(entries, RoutingProtocol::Legacy)
    }

    fn with_protocol(entries: Vec<IrtEntry>, protocol: RoutingProtocol) -> Self {
        Self {
            irt: Arc::new(RoutingTable::from_entries(
                entries,
                protocol,
                AddrPolicy::Exact,
            )),
            bus: Arc::new(SimBus::default()),
            mapper: Arc::new(FakeMapper::default()),
            allocator: Arc::new(FakeAllocator::new(32)),
            dispatcher: Arc::new(FakeDispatcher::new(4)),
        }
    }

    pub(crate) fn with_allocator(mut self, allocator: FakeAllocator) -> Self {
        self.allocator = Arc::new(allocator);
        self
    }

    pub(crate) fn add_iosapic(&self, hpa: u64, version: u32) -> Arc<SimIosapic> {
        let iosapic = Arc::new(SimIosapic::on_bus(version, self.bus.clone()));
        self.mapper.iosapics.lock().insert(hpa, iosapic.clone());
        iosapic
    }

    pub(crate) fn iosapic(&self) -> Arc<Iosapic> {
        Arc::new(Iosapic::new(
            self.irt.clone(),
            self.mapper.clone(),
            self.allocator.clone(),
            self.dispatcher.clone(),
            IosapicConfig::default(),
        ))
    }
}

/// A PCI function with a fixed interrupt pin.
pub(crate) struct FakePciFunction<'a> {
    location: PciDeviceLocation,
    pin: u8,
    parent: Option<&'a dyn PciFunction>,
}

impl FakePciFunction<'static> {
    pub(crate) fn new(location: PciDeviceLocation, pin: u8) -> Self {
        Self {
            location,
            pin,
            parent: None,
        }
    }
}

impl<'a> FakePciFunction<'a> {
    /// Puts the function on the secondary bus of `bridge`.
    pub(crate) fn behind<'b>(self, bridge: &'b dyn PciFunction) -> FakePciFunction<'b> {
        FakePciFunction {
            location: self.location,
            pin: self.pin,
            parent: Some(bridge),
        }
    }
}

impl PciFunction for FakePciFunction<'_> {
    fn location(&self) -> PciDeviceLocation {
        self.location
    }

    fn read8(&self, offset: u16) -> u8 {
        if offset == PCI_INTERRUPT_PIN {
            self.pin
        } else {
            0xff
        }
    }

    fn parent_bridge(&self) -> Option<&dyn PciFunction> {
        self.parent
    }
}

// SPDX-License-Identifier: MPL-2.0

//! The registry of I/O SAPICs.
//!
//! An I/O SAPIC is integrated into a PCI bus adapter, so no bus walk will
//! find it. The bus adapter driver calls [`Iosapic::register`] with the hard
//! physical address (HPA) of its I/O SAPIC and gets back a [`ControllerId`]
//! to pass along when fixing up the IRQs of its devices.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use spin::{Mutex, Once};

use crate::{
    access::{num_vectors_of, version_of, IoMemMapper, IosapicAccess, IOSAPIC_MMIO_SIZE},
    config::IosapicConfig,
    error::Result,
    firmware::{IrtFirmware, RoutingProtocol},
    irt::RoutingTable,
    txn::{IrqDispatcher, TxnAllocator},
    vector::VectorInfo,
};

/// The maximum number of I/O SAPICs on a platform.
pub const MAX_IOSAPICS: usize = 64;

/// Identifies a registered I/O SAPIC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub(crate) usize);

impl ControllerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identifies a redirection line. This is the context handed to the generic
/// IRQ layer along with the I/O SAPIC callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VectorHandle {
    pub controller: ControllerId,
    pub line: u8,
}

/// A registered I/O SAPIC.
pub struct IosapicInfo {
    id: ControllerId,
    hpa: u64,
    access: IosapicAccess,
    version: u32,
    vectors: Vec<VectorInfo>,
}

impl IosapicInfo {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn hpa(&self) -> u64 {
        self.hpa
    }

    /// Returns the raw version register.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn num_vectors(&self) -> usize {
        self.vectors.len()
    }

    /// Returns the state of redirection line `line`.
    pub fn vector(&self, line: u8) -> Option<&VectorInfo> {
        self.vectors.get(line as usize)
    }

    pub fn vectors(&self) -> &[VectorInfo] {
        &self.vectors
    }

    pub(crate) fn access(&self) -> &IosapicAccess {
        &self.access
    }
}

/// The I/O SAPIC driver.
///
/// It owns the routing table and every registered I/O SAPIC. All accesses to
/// redirection entries, on any I/O SAPIC, are serialized by one lock.
pub struct Iosapic {
    pub(crate) irt: Arc<RoutingTable>,
    pub(crate) config: IosapicConfig,
    mapper: Arc<dyn IoMemMapper>,
    pub(crate) allocator: Arc<dyn TxnAllocator>,
    pub(crate) dispatcher: Arc<dyn IrqDispatcher>,
    controllers: [Once<IosapicInfo>; MAX_IOSAPICS],
    num_controllers: AtomicUsize,
    pub(crate) lock: Mutex<()>,
}

impl Iosapic {
    /// Loads the routing table of the cell we are running on and creates the driver.
    ///
    /// # Errors
    ///
    /// Fails if the firmware hands out an inconsistent routing table. The
    /// platform cannot route PCI interrupts in this case.
    pub fn init(
        firmware: &dyn IrtFirmware,
        mapper: Arc<dyn IoMemMapper>,
        allocator: Arc<dyn TxnAllocator>,
        dispatcher: Arc<dyn IrqDispatcher>,
        config: IosapicConfig,
    ) -> Result<Arc<Self>> {
        let cell = match firmware.protocol() {
            RoutingProtocol::Pat => firmware.cell_number().unwrap_or_else(|err| {
                debug!("[IOSAPIC]: Unable to get the cell number ({}), using 0", err);
                0
            }),
            RoutingProtocol::Legacy => 0,
        };

        let irt = RoutingTable::load(firmware, cell, config.addr_policy())?;
        if irt.is_empty() {
            info!("[IOSAPIC]: No routing table, relying on firmware-programmed interrupt lines");
        }

        Ok(Arc::new(Self::new(
            Arc::new(irt),
            mapper,
            allocator,
            dispatcher,
            config,
        )))
    }

    /// Creates the driver around an already loaded routing table.
    pub fn new(
        irt: Arc<RoutingTable>,
        mapper: Arc<dyn IoMemMapper>,
        allocator: Arc<dyn TxnAllocator>,
        dispatcher: Arc<dyn IrqDispatcher>,
        config: IosapicConfig,
    ) -> Self {
        Self {
            irt,
            config,
            mapper,
            allocator,
            dispatcher,
            controllers: [const { Once::new() }; MAX_IOSAPICS],
            num_controllers: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.irt
    }

    pub fn config(&self) -> &IosapicConfig {
        &self.config
    }

    /// Registers the I/O SAPIC at `hpa`.
    ///
    /// Returns `None` if the routing table has entries but none of them
    /// targets this I/O SAPIC, since it then has nothing to route. Without a
    /// routing table every I/O SAPIC is accepted. `None` is also returned if
    /// the registers cannot be mapped or memory runs out.
    pub fn register(&self, hpa: u64) -> Option<ControllerId> {
        if !self.irt.is_empty() && !self.irt.routes_to(hpa) {
            warn!("[IOSAPIC]: Ignoring {:#x} (NOT FOUND in the routing table)", hpa);
            return None;
        }

        let io_mem = match self.mapper.map(hpa, IOSAPIC_MMIO_SIZE) {
            Ok(io_mem) => io_mem,
            Err(err) => {
                warn!("[IOSAPIC]: Unable to map registers at {:#x}: {}", hpa, err);
                return None;
            }
        };
        let access = IosapicAccess::new(io_mem);
        let version = access.version(&self.lock.lock());
        let num_vectors = num_vectors_of(version);

        let mut vectors = Vec::new();
        if vectors.try_reserve_exact(num_vectors).is_err() {
            warn!(
                "[IOSAPIC]: Can not allocate {} vectors for {:#x}",
                num_vectors, hpa
            );
            return None;
        }

        let index = self.num_controllers.fetch_add(1, Ordering::AcqRel);
        if index >= MAX_IOSAPICS {
            self.num_controllers.fetch_sub(1, Ordering::AcqRel);
            warn!("[IOSAPIC]: Too many I/O SAPICs, ignoring {:#x}", hpa);
            return None;
        }
        let id = ControllerId(index);
        vectors.extend((0..num_vectors).map(|line| VectorInfo::new(id, line as u8)));

        info!(
            "[IOSAPIC]: Found at {:#x}, version {:#x}, {} redirection entries",
            hpa,
            version_of(version),
            num_vectors
        );

        self.controllers[index].call_once(|| IosapicInfo {
            id,
            hpa,
            access,
            version,
            vectors,
        });
        Some(id)
    }

    /// Returns the registered I/O SAPIC `id`.
    pub fn controller(&self, id: ControllerId) -> Option<&IosapicInfo> {
        self.controllers.get(id.0)?.get()
    }

    /// Returns the registered I/O SAPICs in registration order.
    pub fn controllers(&self) -> impl Iterator<Item = &IosapicInfo> {
        self.controllers.iter().filter_map(|controller| controller.get())
    }

    /// Returns the redirection line `vector` designates.
    pub fn vector(&self, vector: VectorHandle) -> Option<(&IosapicInfo, &VectorInfo)> {
        let controller = self.controller(vector.controller)?;
        Some((controller, controller.vector(vector.line)?))
    }
}

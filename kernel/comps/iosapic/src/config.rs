// SPDX-License-Identifier: MPL-2.0

//! Driver configuration.
//!
//! The defaults are chosen per platform at build time. They can be overridden
//! from the kernel command line with `iosapic.<option>=<value>` module
//! arguments, for example:
//!
//! ```text
//! iosapic.addr_width=32 iosapic.addr_fill=0xffffffff00000000 iosapic.txn_irq_bits=8
//! ```

use cfg_if::cfg_if;
use log::warn;

const MODULE_NAME: &str = "iosapic";

/// The high-order bits firmware reports for a 32-bit hard physical address (HPA).
pub const DEFAULT_ADDR_FILL: u64 = 0xffff_ffff_0000_0000;

/// The number of processor interrupt bits requested for every redirection line.
pub const DEFAULT_TXN_IRQ_BITS: u8 = 8;

/// The width of the HPAs handed to [`Iosapic::register`].
///
/// [`Iosapic::register`]: crate::Iosapic::register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrWidth {
    Bits32,
    Bits64,
}

impl Default for AddrWidth {
    fn default() -> Self {
        cfg_if! {
            if #[cfg(target_pointer_width = "64")] {
                AddrWidth::Bits64
            } else {
                AddrWidth::Bits32
            }
        }
    }
}

/// How a routing-table destination address is compared with a controller HPA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrPolicy {
    /// The two addresses must be equal.
    Exact,
    /// The HPA is OR'ed with `fill` before the comparison.
    Filled { fill: u64 },
}

impl AddrPolicy {
    /// Returns whether a routing-table destination address designates `hpa`.
    pub fn matches(&self, irt_addr: u64, hpa: u64) -> bool {
        match *self {
            AddrPolicy::Exact => irt_addr == hpa,
            AddrPolicy::Filled { fill } => irt_addr == (hpa | fill),
        }
    }
}

/// The configuration of the I/O SAPIC driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IosapicConfig {
    pub addr_width: AddrWidth,
    pub addr_fill: u64,
    pub txn_irq_bits: u8,
}

impl Default for IosapicConfig {
    fn default() -> Self {
        Self {
            addr_width: AddrWidth::default(),
            addr_fill: DEFAULT_ADDR_FILL,
            txn_irq_bits: DEFAULT_TXN_IRQ_BITS,
        }
    }
}

impl IosapicConfig {
    /// Builds the configuration from the `iosapic.*` arguments of a kernel command line.
    ///
    /// Arguments of other modules are skipped. Unknown options and malformed
    /// values are reported and leave the default in place.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();

        for arg in cmdline.split_whitespace() {
            let Some((module, option)) = arg.split_once('.') else {
                continue;
            };
            if module != MODULE_NAME {
                continue;
            }
            let Some((key, value)) = option.split_once('=') else {
                warn!("[IOSAPIC]: Option {} has no value, skip for now", arg);
                continue;
            };
            if !config.apply(key, value) {
                warn!("[IOSAPIC]: Unable to parse option {}, skip for now", arg);
            }
        }

        config
    }

    /// Returns the address comparison policy.
    pub fn addr_policy(&self) -> AddrPolicy {
        match self.addr_width {
            AddrWidth::Bits64 => AddrPolicy::Exact,
            AddrWidth::Bits32 => AddrPolicy::Filled {
                fill: self.addr_fill,
            },
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> bool {
        match key {
            "addr_width" => match value {
                "32" => self.addr_width = AddrWidth::Bits32,
                "64" => self.addr_width = AddrWidth::Bits64,
                _ => return false,
            },
            "addr_fill" => {
                let digits = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value);
                let Ok(fill) = u64::from_str_radix(digits, 16) else {
                    return false;
                };
                self.addr_fill = fill;
            }
            "txn_irq_bits" => match value.parse::<u8>() {
                Ok(bits) if bits > 0 => self.txn_irq_bits = bits,
                _ => return false,
            },
            _ => return false,
        }
        true
    }
}

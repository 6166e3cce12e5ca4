// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Management library for Microchip Switchtec PCIe switches.
//!
//! A [`Switchtec`] handle wraps an MRPC transport to one switch. Feature
//! operations (performance monitors, port status, binding, link error
//! injection, events) are methods on the handle; raw register access goes
//! through the [`gas`] module.

pub mod bind;
pub mod device;
pub mod error;
pub mod events;
pub mod gas;
pub mod inject;
pub mod mrpc;
pub mod pmon;
pub mod status;
pub mod wire;

#[cfg(target_os = "linux")]
mod linux;

pub use device::{DeviceInfo, DeviceSpec, Generation, Switchtec};
pub use error::{Error, Result, ReturnCode};
pub use events::{EventId, EventIndex, EventSummary, EventTransport};
pub use gas::GasAccess;
pub use mrpc::{MrpcTransport, MRPC_MAX_DATA_LEN};

pub const MAX_PORTS: usize = 48;
pub const MAX_PARTS: usize = 48;
pub const MAX_STACKS: usize = 8;
pub const MAX_EVENT_COUNTERS: usize = 64;
pub const MAX_PHY_PORTS: usize = 48;
pub const UNBOUND_PORT: u8 = 255;
/// Ingress selector that measures latency from every port.
pub const LAT_ALL_INGRESS: u8 = 63;

impl Switchtec {
    /// Open a switch by path, index, `switchtecN` name or PCI address.
    pub fn open(device: &str) -> Result<Switchtec> {
        plat::open(device)
    }

    /// Map the GAS for direct register access.
    pub fn gas_map(&self, writable: bool) -> Result<Box<dyn GasAccess>> {
        plat::gas_map(self, writable)
    }
}

/// Every switch the kernel driver knows about.
pub fn list() -> Result<Vec<DeviceInfo>> {
    plat::list()
}

#[cfg(target_os = "linux")]
use linux as plat;

#[cfg(not(target_os = "linux"))]
mod plat {
    use crate::{DeviceInfo, Error, GasAccess, Result, Switchtec};

    pub fn open(_device: &str) -> Result<Switchtec> {
        Err(Error::Unsupported("the switchtec kernel interface"))
    }

    pub fn list() -> Result<Vec<DeviceInfo>> {
        Err(Error::Unsupported("the switchtec kernel interface"))
    }

    pub fn gas_map(_dev: &Switchtec, _writable: bool) -> Result<Box<dyn GasAccess>> {
        Err(Error::Unsupported("the switchtec kernel interface"))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::{Error, Result};
use crate::events::EventTransport;
use crate::mrpc::{dietemp_sub, MrpcCmd, MrpcTransport, MRPC_MAX_DATA_LEN};
use serde::{Deserialize, Serialize};
use slog::{debug, o, Discard, Logger};
use std::path::{Path, PathBuf};

/// Silicon generation of the switch. Some command layouts differ between
/// generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generation {
    Gen3,
    Gen4,
    Gen5,
    Unknown,
}

impl Generation {
    /// Classify a PCI device id. Switchtec parts encode the generation in
    /// the top nibble (0x85xx, 0x4xxx, 0x5xxx).
    pub fn from_device_id(id: u16) -> Self {
        match id >> 12 {
            0x8 => Generation::Gen3,
            0x4 => Generation::Gen4,
            0x5 => Generation::Gen5,
            _ => Generation::Unknown,
        }
    }
}

/// The ways a device may be named when opening it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// `/dev/switchtec0`, or anything else containing a slash.
    Path(PathBuf),
    /// `0` or `switchtec0`.
    Index(u32),
    /// `03:00.1` or `0000:03:00.1`.
    PciAddr {
        domain: u32,
        bus: u32,
        dev: u32,
        func: u32,
    },
}

fn parse_hex(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

fn parse_pci_addr(s: &str) -> Option<DeviceSpec> {
    let (head, func) = s.rsplit_once('.')?;
    let parts: Vec<&str> = head.split(':').collect();
    let (domain, bus, dev) = match parts.as_slice() {
        [bus, dev] => (0, parse_hex(bus)?, parse_hex(dev)?),
        [domain, bus, dev] => (parse_hex(domain)?, parse_hex(bus)?, parse_hex(dev)?),
        _ => return None,
    };
    Some(DeviceSpec::PciAddr {
        domain,
        bus,
        dev,
        func: parse_hex(func)?,
    })
}

fn parse_index(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

impl std::str::FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains('/') {
            return Ok(DeviceSpec::Path(PathBuf::from(s)));
        }
        if let Some(pci) = parse_pci_addr(s) {
            return Ok(pci);
        }
        if let Some(idx) = parse_index(s) {
            return Ok(DeviceSpec::Index(idx));
        }
        if let Some(idx) = s.strip_prefix("switchtec").and_then(|n| n.parse().ok()) {
            return Ok(DeviceSpec::Index(idx));
        }
        Err(Error::DeviceNotFound(s.to_string()))
    }
}

/// A switch found by [`crate::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub path: PathBuf,
    pub pci_dev: String,
    pub product_id: String,
    pub product_rev: String,
    pub fw_version: String,
}

/// Format a packed firmware version word as `major.minor Bbuild`.
pub fn version_to_string(version: u32) -> String {
    let major = version >> 24;
    let minor = (version >> 16) & 0xFF;
    let build = version & 0xFFFF;
    format!("{:x}.{:02x} B{:03X}", major, minor, build)
}

/// An open switch management endpoint.
///
/// All feature operations are methods on this handle and issue their MRPC
/// commands through [`Switchtec::cmd`]. The handle is the only state kept
/// between calls.
pub struct Switchtec {
    name: String,
    partition: u8,
    gen: Generation,
    sysfs: Option<PathBuf>,
    transport: Box<dyn MrpcTransport>,
    events: Option<Box<dyn EventTransport>>,
    log: Logger,
}

impl Switchtec {
    pub fn with_transport(
        name: impl Into<String>,
        partition: u8,
        gen: Generation,
        transport: Box<dyn MrpcTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            partition,
            gen,
            sysfs: None,
            transport,
            events: None,
            log: Logger::root(Discard, o!()),
        }
    }

    /// Attach the channel that reports switch events. Without one the
    /// event operations return [`Error::Unsupported`].
    pub fn with_events(mut self, events: Box<dyn EventTransport>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn events_mut(&mut self) -> Result<&mut dyn EventTransport> {
        match self.events.as_mut() {
            Some(e) => Ok(e.as_mut()),
            None => Err(Error::Unsupported("switch events")),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log.new(o!("device" => self.name.clone()));
        self
    }

    pub(crate) fn with_sysfs(mut self, dir: PathBuf) -> Self {
        self.sysfs = Some(dir);
        self
    }

    /// The string the device was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partition the management endpoint belongs to.
    pub fn partition(&self) -> u8 {
        self.partition
    }

    pub fn generation(&self) -> Generation {
        self.gen
    }

    /// sysfs directory of the character device, when opened through the
    /// kernel driver.
    pub fn sysfs_dir(&self) -> Option<&Path> {
        self.sysfs.as_deref()
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }

    /// Issue one MRPC command. The reply buffer length is the exact number
    /// of bytes expected back.
    pub fn cmd(
        &mut self,
        cmd: MrpcCmd,
        payload: &[u8],
        resp: &mut [u8],
    ) -> Result<()> {
        if payload.len() > MRPC_MAX_DATA_LEN {
            return Err(Error::RequestTooLarge(payload.len()));
        }
        if resp.len() > MRPC_MAX_DATA_LEN {
            return Err(Error::ResponseTooLarge(resp.len()));
        }

        debug!(self.log, "mrpc";
            "cmd" => cmd.description(),
            "id" => cmd.id(),
            "payload" => payload.len(),
            "resp" => resp.len(),
        );

        let result = self.transport.cmd(cmd.id(), payload, resp);
        if let Err(e) = &result {
            debug!(self.log, "mrpc failed"; "cmd" => cmd.description(), "error" => %e);
        }
        result
    }

    /// Round-trip a word through the firmware. A healthy switch answers
    /// with the bitwise complement of `input`.
    pub fn echo(&mut self, input: u32) -> Result<u32> {
        let mut out = [0u8; 4];
        self.cmd(MrpcCmd::Echo, &input.to_le_bytes(), &mut out)?;
        Ok(u32::from_le_bytes(out))
    }

    /// Hard reset the whole switch. Every host attached to it loses its
    /// PCIe link.
    pub fn hard_reset(&mut self) -> Result<()> {
        self.cmd(MrpcCmd::Reset, &0u32.to_le_bytes(), &mut [])
    }

    /// Die temperature in degrees Celsius.
    pub fn die_temp(&mut self) -> Result<f32> {
        self.cmd(
            MrpcCmd::DieTemp,
            &dietemp_sub::SET_MEAS.to_le_bytes(),
            &mut [],
        )?;

        let mut out = [0u8; 4];
        self.cmd(MrpcCmd::DieTemp, &dietemp_sub::GET.to_le_bytes(), &mut out)?;
        Ok(u32::from_le_bytes(out) as f32 / 100.0)
    }
}

impl std::fmt::Debug for Switchtec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchtec")
            .field("name", &self.name)
            .field("partition", &self.partition)
            .field("gen", &self.gen)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn mock_device(gen: Generation) -> (Switchtec, crate::mrpc::mock::MockTransport) {
    let mock = crate::mrpc::mock::MockTransport::new();
    let dev = Switchtec::with_transport("mock", 0, gen, Box::new(mock.clone()));
    (dev, mock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReturnCode;

    #[test]
    fn echo_sends_input_and_returns_reply() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        mock.reply((!0x1234_5678u32).to_le_bytes().to_vec());

        let out = dev.echo(0x1234_5678).unwrap();
        assert_eq!(out, !0x1234_5678);

        let reqs = mock.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].cmd, 65);
        assert_eq!(reqs[0].payload, 0x1234_5678u32.to_le_bytes());
        assert_eq!(reqs[0].resp_len, 4);
    }

    #[test]
    fn die_temp_measures_then_reads() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        mock.reply(vec![]).reply(4250u32.to_le_bytes().to_vec());

        let t = dev.die_temp().unwrap();
        assert!((t - 42.5).abs() < f32::EPSILON);

        let reqs = mock.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].payload, 1u32.to_le_bytes());
        assert_eq!(reqs[0].resp_len, 0);
        assert_eq!(reqs[1].payload, 2u32.to_le_bytes());
    }

    #[test]
    fn firmware_errors_pass_through() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        mock.fail(ReturnCode::ACCESS_REFUSED);

        let err = dev.hard_reset().unwrap_err();
        assert_eq!(err.return_code(), Some(0xFFFF0001));
    }

    #[test]
    fn oversized_requests_never_reach_the_transport() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        let big = vec![0u8; MRPC_MAX_DATA_LEN + 1];
        assert!(matches!(
            dev.cmd(MrpcCmd::Echo, &big, &mut []),
            Err(Error::RequestTooLarge(_))
        ));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn device_strings() {
        assert_eq!(
            "/dev/switchtec1".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Path("/dev/switchtec1".into())
        );
        assert_eq!("2".parse::<DeviceSpec>().unwrap(), DeviceSpec::Index(2));
        assert_eq!(
            "switchtec3".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Index(3)
        );
        assert_eq!(
            "3:00.1".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::PciAddr {
                domain: 0,
                bus: 3,
                dev: 0,
                func: 1
            }
        );
        assert_eq!(
            "0001:0a:00.0".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::PciAddr {
                domain: 1,
                bus: 0xa,
                dev: 0,
                func: 0
            }
        );
        assert!("nvme0".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn firmware_version_format() {
        assert_eq!(version_to_string(0x0107_0042), "1.07 B042");
        assert_eq!(version_to_string(0x020A_1234), "2.0a B1234");
    }

    #[test]
    fn generation_from_device_id() {
        assert_eq!(Generation::from_device_id(0x8536), Generation::Gen3);
        assert_eq!(Generation::from_device_id(0x4000), Generation::Gen4);
        assert_eq!(Generation::from_device_id(0x5084), Generation::Gen5);
        assert_eq!(Generation::from_device_id(0x1234), Generation::Unknown);
    }
}

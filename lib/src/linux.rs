// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Linux switchtec kernel driver: MRPC over `/dev/switchtecN` and
//! device metadata from sysfs.

use crate::device::{
    version_to_string, DeviceInfo, DeviceSpec, Generation, Switchtec,
};
use crate::error::{Error, Result, ReturnCode};
use crate::events::{EventId, EventIndex, EventSummary, EventTransport, MAX_PFF};
use crate::gas::{GasAccess, Width};
use crate::mrpc::MrpcTransport;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYS_CLASS: &str = "/sys/class/switchtec";

/// MRPC through the driver's character device. A command is one `write` of
/// the command id followed by the payload; the reply is one `read` of the
/// status word followed by the output data.
pub struct CharDev {
    file: File,
}

impl MrpcTransport for CharDev {
    fn cmd(&mut self, cmd: u32, payload: &[u8], resp: &mut [u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&cmd.to_le_bytes());
        buf.extend_from_slice(payload);

        let n = self.file.write(&buf)?;
        if n != buf.len() {
            return Err(Error::ShortTransfer {
                done: n,
                expected: buf.len(),
            });
        }

        let mut reply = vec![0u8; 4 + resp.len()];
        let n = self.file.read(&mut reply)?;
        if n != reply.len() {
            return Err(Error::ShortTransfer {
                done: n,
                expected: reply.len(),
            });
        }

        let rc = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        if rc != 0 {
            return Err(Error::Mrpc(ReturnCode(rc)));
        }
        resp.copy_from_slice(&reply[4..]);
        Ok(())
    }
}

// Driver ioctl ABI for events and PFF lookups.
mod ioctl {
    use crate::events::MAX_PFF;
    use crate::MAX_PARTS;

    const MAGIC: u8 = b'W';
    pub const LEGACY_PFF: usize = 48;

    #[repr(C)]
    pub struct EventSummary {
        pub global: u64,
        pub part_bitmap: u64,
        pub local_part: u32,
        pub padding: u32,
        pub part: [u32; MAX_PARTS],
        pub pff: [u32; MAX_PFF],
    }

    /// Layout used by drivers that predate the larger PFF array.
    #[repr(C)]
    pub struct EventSummaryLegacy {
        pub global: u64,
        pub part_bitmap: u64,
        pub local_part: u32,
        pub padding: u32,
        pub part: [u32; MAX_PARTS],
        pub pff: [u32; LEGACY_PFF],
    }

    #[repr(C)]
    #[derive(Default)]
    pub struct EventCtl {
        pub event_id: u32,
        pub index: i32,
        pub flags: u32,
        pub occurred: u32,
        pub count: u32,
        pub data: [u32; 5],
    }

    #[repr(C)]
    #[derive(Default)]
    pub struct PffPort {
        pub pff: u32,
        pub partition: u32,
        pub port: u32,
    }

    nix::ioctl_read!(event_summary, MAGIC, 0x42, EventSummary);
    nix::ioctl_read!(event_summary_legacy, MAGIC, 0x42, EventSummaryLegacy);
    nix::ioctl_readwrite!(event_ctl, MAGIC, 0x43, EventCtl);
    nix::ioctl_readwrite!(pff_to_port, MAGIC, 0x44, PffPort);
    nix::ioctl_readwrite!(port_to_pff, MAGIC, 0x45, PffPort);
}

/// Event reporting through ioctls and `poll` on the character device.
pub struct CharDevEvents {
    file: File,
}

impl CharDevEvents {
    fn summary_full(&self) -> nix::Result<EventSummary> {
        // SAFETY: the struct is plain integers, for which all zeroes is valid.
        let mut raw: ioctl::EventSummary = unsafe { std::mem::zeroed() };
        // SAFETY: `raw` is a live struct of the size the ioctl number encodes.
        unsafe { ioctl::event_summary(self.file.as_raw_fd(), &mut raw) }?;
        Ok(EventSummary {
            global: raw.global,
            part_bitmap: raw.part_bitmap,
            local_part: raw.local_part,
            part: raw.part.to_vec(),
            pff: raw.pff.to_vec(),
        })
    }

    fn summary_legacy(&self) -> nix::Result<EventSummary> {
        // SAFETY: as above.
        let mut raw: ioctl::EventSummaryLegacy = unsafe { std::mem::zeroed() };
        // SAFETY: `raw` is a live struct of the size the ioctl number encodes.
        unsafe { ioctl::event_summary_legacy(self.file.as_raw_fd(), &mut raw) }?;

        let mut pff = raw.pff.to_vec();
        pff.resize(MAX_PFF, 0);
        Ok(EventSummary {
            global: raw.global,
            part_bitmap: raw.part_bitmap,
            local_part: raw.local_part,
            part: raw.part.to_vec(),
            pff,
        })
    }
}

impl EventTransport for CharDevEvents {
    fn summary(&mut self) -> Result<EventSummary> {
        self.summary_full()
            .or_else(|_| self.summary_legacy())
            .map_err(|e| Error::Io(e.into()))
    }

    fn ctl(&mut self, event: EventId, index: EventIndex, flags: u32) -> Result<u32> {
        let mut ctl = ioctl::EventCtl {
            event_id: event as u32,
            index: index.raw(),
            flags,
            ..Default::default()
        };
        // SAFETY: `ctl` is a live struct of the size the ioctl number encodes.
        unsafe { ioctl::event_ctl(self.file.as_raw_fd(), &mut ctl) }
            .map_err(|e| Error::Io(e.into()))?;
        Ok(ctl.count)
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLPRI,
            revents: 0,
        };
        let ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);

        // SAFETY: one valid pollfd that outlives the call.
        let n = unsafe { libc::poll(&mut fds, 1, ms) };
        if n < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if n == 0 {
            return Ok(false);
        }
        if fds.revents & libc::POLLERR != 0 {
            return Err(io::Error::from_raw_os_error(libc::ENODEV).into());
        }
        Ok(fds.revents & libc::POLLPRI != 0)
    }

    fn pff_to_port(&mut self, pff: usize) -> Result<(u32, u32)> {
        let mut p = ioctl::PffPort {
            pff: pff as u32,
            ..Default::default()
        };
        // SAFETY: `p` is a live struct of the size the ioctl number encodes.
        unsafe { ioctl::pff_to_port(self.file.as_raw_fd(), &mut p) }
            .map_err(|e| Error::Io(e.into()))?;
        Ok((p.partition, p.port))
    }

    fn port_to_pff(&mut self, partition: u32, port: u32) -> Result<usize> {
        let mut p = ioctl::PffPort {
            partition,
            port,
            ..Default::default()
        };
        // SAFETY: `p` is a live struct of the size the ioctl number encodes.
        unsafe { ioctl::port_to_pff(self.file.as_raw_fd(), &mut p) }
            .map_err(|e| Error::Io(e.into()))?;
        Ok(p.pff as usize)
    }
}

fn sysfs_read_str(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

fn sysfs_read_int(path: &Path, radix: u32) -> io::Result<u32> {
    let s = sysfs_read_str(path)?;
    let s = if radix == 16 {
        s.trim_start_matches("0x")
    } else {
        s.as_str()
    };
    u32::from_str_radix(s, radix)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn open_by_path(path: &Path, name: &str) -> Result<Switchtec> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::DeviceNotFound(name.to_string()),
            _ => Error::Io(e),
        })?;

    let rdev = file.metadata()?.rdev();
    let (major, minor) = (libc::major(rdev), libc::minor(rdev));
    let sysfs = PathBuf::from(format!("/sys/dev/char/{}:{}", major, minor));

    if !sysfs.join("device/switchtec").exists() {
        return Err(Error::NotSwitchtec(name.to_string()));
    }

    let partition = sysfs_read_int(&sysfs.join("partition"), 10)?;
    let gen = sysfs_read_int(&sysfs.join("device/device"), 16)
        .map(|id| Generation::from_device_id(id as u16))
        .unwrap_or(Generation::Unknown);

    let events = CharDevEvents {
        file: file.try_clone()?,
    };
    let dev = Switchtec::with_transport(
        name,
        partition as u8,
        gen,
        Box::new(CharDev { file }),
    );
    Ok(dev.with_sysfs(sysfs).with_events(Box::new(events)))
}

fn open_by_pci_addr(
    name: &str,
    domain: u32,
    bus: u32,
    dev: u32,
    func: u32,
) -> Result<Switchtec> {
    let dir = format!(
        "/sys/bus/pci/devices/{:04x}:{:02x}:{:02x}.{:x}/switchtec",
        domain, bus, dev, func
    );
    let not_found = || Error::DeviceNotFound(name.to_string());

    let entries: Vec<String> = fs::read_dir(&dir)
        .map_err(|_| not_found())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();

    // a function carries exactly one switchtec management endpoint
    match entries.as_slice() {
        [one] => open_by_path(&Path::new("/dev").join(one), name),
        _ => Err(not_found()),
    }
}

pub fn open(device: &str) -> Result<Switchtec> {
    match device.parse::<DeviceSpec>()? {
        DeviceSpec::Path(p) => open_by_path(&p, device),
        DeviceSpec::Index(i) => {
            open_by_path(&PathBuf::from(format!("/dev/switchtec{}", i)), device)
        }
        DeviceSpec::PciAddr {
            domain,
            bus,
            dev,
            func,
        } => open_by_pci_addr(device, domain, bus, dev, func),
    }
}

pub fn list() -> Result<Vec<DeviceInfo>> {
    let mut names: Vec<String> = match fs::read_dir(SYS_CLASS) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    names.sort();

    let unknown = |r: io::Result<String>| r.unwrap_or_else(|_| "unknown".into());

    Ok(names
        .into_iter()
        .map(|name| {
            let dir = Path::new(SYS_CLASS).join(&name);
            let pci_dev = fs::read_link(dir.join("device"))
                .ok()
                .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "unknown pci device".into());
            let fw_version = sysfs_read_int(&dir.join("fw_version"), 16)
                .map(version_to_string);

            DeviceInfo {
                path: Path::new("/dev").join(&name),
                pci_dev,
                product_id: unknown(sysfs_read_str(&dir.join("product_id"))),
                product_rev: unknown(sysfs_read_str(&dir.join("product_revision"))),
                fw_version: unknown(fw_version),
                name,
            }
        })
        .collect())
}

/// A memory mapping of the switch's BAR 0, unmapped on drop.
pub struct MmapGas {
    base: *mut u8,
    len: usize,
    writable: bool,
}

impl MmapGas {
    fn map(sysfs: &Path, writable: bool) -> Result<Self> {
        let path = sysfs.join("device/resource0_wc");
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(Error::Map)?;
        let len = file.metadata().map_err(Error::Map)?.len() as usize;

        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };

        // SAFETY: mapping a sysfs PCI resource we just opened; the length
        // comes from the file itself.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Map(io::Error::last_os_error()));
        }

        Ok(Self {
            base: base as *mut u8,
            len,
            writable,
        })
    }
}

impl MmapGas {
    /// Pointer to `len` bytes at `off`, which must lie inside the mapping
    /// and be aligned to `align`.
    fn ptr(&self, off: usize, len: usize, align: usize) -> Result<*mut u8> {
        match off.checked_add(len) {
            Some(end) if end <= self.len => {}
            _ => return Err(Error::GasOutOfRange { addr: off, len }),
        }
        if off % align != 0 {
            return Err(Error::Misaligned { addr: off, align });
        }
        // SAFETY: `off + len` was checked against the mapping length above.
        Ok(unsafe { self.base.add(off) })
    }
}

impl Drop for MmapGas {
    fn drop(&mut self) {
        // SAFETY: `base` and `len` are exactly what mmap returned and the
        // mapping is not used after this.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
    }
}

impl GasAccess for MmapGas {
    fn size(&self) -> usize {
        self.len
    }

    fn read(&mut self, off: usize, width: Width) -> Result<u64> {
        let p = self.ptr(off, width.bytes(), width.bytes())?;
        // SAFETY: `p` is inside the live mapping and aligned to the width.
        unsafe {
            Ok(match width {
                Width::W8 => std::ptr::read_volatile(p) as u64,
                Width::W16 => std::ptr::read_volatile(p as *const u16) as u64,
                Width::W32 => std::ptr::read_volatile(p as *const u32) as u64,
                Width::W64 => std::ptr::read_volatile(p as *const u64),
            })
        }
    }

    fn write(&mut self, off: usize, width: Width, value: u64) -> Result<()> {
        if !self.writable {
            return Err(Error::Unsupported("write through a read-only mapping"));
        }
        let p = self.ptr(off, width.bytes(), width.bytes())?;
        // SAFETY: `p` is inside the live, writable mapping and aligned to
        // the width.
        unsafe {
            match width {
                Width::W8 => std::ptr::write_volatile(p, value as u8),
                Width::W16 => std::ptr::write_volatile(p as *mut u16, value as u16),
                Width::W32 => std::ptr::write_volatile(p as *mut u32, value as u32),
                Width::W64 => std::ptr::write_volatile(p as *mut u64, value),
            }
        }
        Ok(())
    }

    fn read_bytes(&mut self, off: usize, buf: &mut [u8]) -> Result<()> {
        let p = self.ptr(off, buf.len(), 1)?;
        for (i, b) in buf.iter_mut().enumerate() {
            // SAFETY: `i < buf.len()`, and the whole span was range-checked.
            *b = unsafe { std::ptr::read_volatile(p.add(i)) };
        }
        Ok(())
    }
}

pub fn gas_map(dev: &Switchtec, writable: bool) -> Result<Box<dyn GasAccess>> {
    let sysfs = dev
        .sysfs_dir()
        .ok_or(Error::Unsupported("mapping the GAS of this device"))?;
    Ok(Box::new(MmapGas::map(sysfs, writable)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anonymous(len: usize) -> MmapGas {
        // SAFETY: a fresh private anonymous mapping owned by the result.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(base, libc::MAP_FAILED);
        MmapGas {
            base: base as *mut u8,
            len,
            writable: true,
        }
    }

    #[test]
    fn mapping_accesses_stay_inside_the_window() {
        let mut gas = anonymous(4096);
        gas.write(0xFF8, Width::W64, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(gas.read(0xFFC, Width::W32).unwrap(), 0x1122_3344);
        let mut buf = [0u8; 2];
        gas.read_bytes(0xFFE, &mut buf).unwrap();
        assert_eq!(buf, [0x22, 0x11]);

        assert!(matches!(
            gas.read(usize::MAX / 2, Width::W64),
            Err(Error::GasOutOfRange { .. })
        ));
        assert!(gas.read(0x1000, Width::W8).is_err());
        assert!(gas.write(0xFFC, Width::W64, 0).is_err());
        assert!(gas.read_bytes(0xFFF, &mut buf).is_err());
        assert!(matches!(
            gas.read(0x2, Width::W32),
            Err(Error::Misaligned { addr: 2, align: 4 })
        ));
    }

    #[test]
    fn ioctl_structs_match_the_driver_abi() {
        use std::mem::size_of;
        assert_eq!(size_of::<ioctl::EventSummary>(), 1240);
        assert_eq!(size_of::<ioctl::EventSummaryLegacy>(), 408);
        assert_eq!(size_of::<ioctl::EventCtl>(), 40);
        assert_eq!(size_of::<ioctl::PffPort>(), 12);
    }

    #[test]
    fn read_only_mapping_refuses_writes() {
        let mut gas = anonymous(4096);
        gas.writable = false;
        assert!(gas.write(0, Width::W32, 1).is_err());
        assert_eq!(gas.read(0, Width::W32).unwrap(), 0);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw access to the switch's Global Address Space (GAS), the register
//! window exposed through BAR 0.
//!
//! Two back ends exist: a memory mapping of the PCI resource (see
//! `Switchtec::gas_map` on Linux) and [`MrpcGas`], which tunnels every
//! access through the `GAS_READ` / `GAS_WRITE` MRPC commands.
//!
//! Addresses handed to [`gas_read`] and [`gas_write`] are rounded down to the
//! access width and bounds-checked against the window before any access.

use crate::device::Switchtec;
use crate::error::{Error, Result};
use crate::mrpc::{MrpcCmd, MRPC_MAX_DATA_LEN};
use crate::wire::Encoder;

/// Size of the GAS window when it is reached through MRPC instead of a
/// mapping.
pub const GAS_SIZE: usize = 4 << 20;

const GAS_WRITE_MAX: usize = MRPC_MAX_DATA_LEN - 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8 = 1,
    W16 = 2,
    W32 = 4,
    W64 = 8,
}

impl Width {
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Round `addr` down to this width.
    pub fn align(self, addr: usize) -> usize {
        addr & !(self.bytes() - 1)
    }

    /// Largest value that fits in this width.
    pub fn max_value(self) -> u64 {
        match self {
            Width::W64 => u64::MAX,
            w => (1u64 << (w.bytes() * 8)) - 1,
        }
    }
}

impl TryFrom<usize> for Width {
    type Error = Error;

    fn try_from(bytes: usize) -> Result<Self> {
        match bytes {
            1 => Ok(Width::W8),
            2 => Ok(Width::W16),
            4 => Ok(Width::W32),
            8 => Ok(Width::W64),
            n => Err(Error::InvalidWidth(n)),
        }
    }
}

/// A GAS back end. [`gas_read`] and friends align and range-check before
/// calling in; implementations still reject offsets outside the window.
pub trait GasAccess {
    /// Size of the window in bytes.
    fn size(&self) -> usize;
    fn read(&mut self, off: usize, width: Width) -> Result<u64>;
    fn write(&mut self, off: usize, width: Width, value: u64) -> Result<()>;
    fn read_bytes(&mut self, off: usize, buf: &mut [u8]) -> Result<()>;
}

fn check_range<G: GasAccess + ?Sized>(gas: &G, addr: usize, len: usize) -> Result<()> {
    match addr.checked_add(len) {
        Some(end) if end <= gas.size() => Ok(()),
        _ => Err(Error::GasOutOfRange { addr, len }),
    }
}

/// Read one register. Returns the aligned address actually read together
/// with the value.
pub fn gas_read<G: GasAccess + ?Sized>(
    gas: &mut G,
    addr: usize,
    bytes: usize,
) -> Result<(usize, u64)> {
    let width = Width::try_from(bytes)?;
    let addr = width.align(addr);
    check_range(gas, addr, bytes)?;
    Ok((addr, gas.read(addr, width)?))
}

/// Check a register write without performing it. Returns the access width
/// and the aligned address that [`gas_write`] would use.
pub fn validate_write<G: GasAccess + ?Sized>(
    gas: &G,
    addr: usize,
    bytes: usize,
    value: u64,
) -> Result<(Width, usize)> {
    let width = Width::try_from(bytes)?;
    let addr = width.align(addr);
    check_range(gas, addr, bytes)?;
    if value > width.max_value() {
        return Err(Error::ValueOutOfRange {
            what: "register value",
            value,
            max: width.max_value(),
        });
    }
    Ok((width, addr))
}

/// Write one register. Returns the aligned address written.
pub fn gas_write<G: GasAccess + ?Sized>(
    gas: &mut G,
    addr: usize,
    bytes: usize,
    value: u64,
) -> Result<usize> {
    let (width, addr) = validate_write(gas, addr, bytes, value)?;
    gas.write(addr, width, value)?;
    Ok(addr)
}

/// Copy a span of the GAS into `buf`.
pub fn gas_read_bytes<G: GasAccess + ?Sized>(
    gas: &mut G,
    addr: usize,
    buf: &mut [u8],
) -> Result<()> {
    check_range(gas, addr, buf.len())?;
    gas.read_bytes(addr, buf)
}

/// GAS access tunnelled through MRPC commands.
pub struct MrpcGas<'a> {
    dev: &'a mut Switchtec,
    size: usize,
}

impl<'a> MrpcGas<'a> {
    pub fn new(dev: &'a mut Switchtec) -> Self {
        Self {
            dev,
            size: GAS_SIZE,
        }
    }

    fn write_bytes(&mut self, off: usize, data: &[u8]) -> Result<()> {
        let mut off = off;
        for chunk in data.chunks(GAS_WRITE_MAX) {
            let cmd = Encoder::with_capacity(8 + chunk.len())
                .u32(off as u32)
                .u32(chunk.len() as u32)
                .bytes(chunk)
                .finish();
            self.dev.cmd(MrpcCmd::GasWrite, &cmd, &mut [])?;
            off += chunk.len();
        }
        Ok(())
    }
}

impl GasAccess for MrpcGas<'_> {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&mut self, off: usize, width: Width) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(off, &mut buf[..width.bytes()])?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write(&mut self, off: usize, width: Width, value: u64) -> Result<()> {
        self.write_bytes(off, &value.to_le_bytes()[..width.bytes()])
    }

    fn read_bytes(&mut self, off: usize, buf: &mut [u8]) -> Result<()> {
        let mut off = off;
        for chunk in buf.chunks_mut(MRPC_MAX_DATA_LEN) {
            let cmd = Encoder::new()
                .u32(off as u32)
                .u32(chunk.len() as u32)
                .finish();
            self.dev.cmd(MrpcCmd::GasRead, &cmd, chunk)?;
            off += chunk.len();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{mock_device, Generation};

    /// In-memory window that counts accesses.
    struct VecGas {
        mem: Vec<u8>,
        accesses: usize,
    }

    impl GasAccess for VecGas {
        fn size(&self) -> usize {
            self.mem.len()
        }

        fn read(&mut self, off: usize, width: Width) -> Result<u64> {
            self.accesses += 1;
            let mut buf = [0u8; 8];
            buf[..width.bytes()]
                .copy_from_slice(&self.mem[off..off + width.bytes()]);
            Ok(u64::from_le_bytes(buf))
        }

        fn write(&mut self, off: usize, width: Width, value: u64) -> Result<()> {
            self.accesses += 1;
            self.mem[off..off + width.bytes()]
                .copy_from_slice(&value.to_le_bytes()[..width.bytes()]);
            Ok(())
        }

        fn read_bytes(&mut self, off: usize, buf: &mut [u8]) -> Result<()> {
            self.accesses += 1;
            buf.copy_from_slice(&self.mem[off..off + buf.len()]);
            Ok(())
        }
    }

    fn window() -> VecGas {
        VecGas {
            mem: (0..64u8).collect(),
            accesses: 0,
        }
    }

    #[test]
    fn invalid_widths_touch_nothing() {
        let mut gas = window();
        for w in [0, 3, 5, 16] {
            assert!(matches!(
                gas_read(&mut gas, 0, w),
                Err(Error::InvalidWidth(_))
            ));
            assert!(gas_write(&mut gas, 0, w, 0).is_err());
        }
        assert_eq!(gas.accesses, 0);
    }

    #[test]
    fn addresses_are_aligned_down() {
        let mut gas = window();
        assert_eq!(gas_read(&mut gas, 0x0B, 4).unwrap(), (0x08, 0x0B0A_0908));
        assert_eq!(gas_read(&mut gas, 0x0B, 1).unwrap(), (0x0B, 0x0B));
        assert_eq!(gas_write(&mut gas, 0x13, 2, 0xBEEF).unwrap(), 0x12);
        assert_eq!(&gas.mem[0x12..0x14], &[0xEF, 0xBE]);
    }

    #[test]
    fn out_of_window_is_rejected() {
        let mut gas = window();
        assert!(matches!(
            gas_read(&mut gas, 64, 1),
            Err(Error::GasOutOfRange { .. })
        ));
        assert!(gas_read(&mut gas, 64, 8).is_err());
        assert!(gas_read(&mut gas, usize::MAX, 1).is_err());
        let mut buf = [0u8; 8];
        assert!(gas_read_bytes(&mut gas, 60, &mut buf).is_err());
        assert!(gas_write(&mut gas, 0, 1, 0x100).is_err());
        assert_eq!(gas.accesses, 0);

        assert_eq!(gas_read(&mut gas, 60, 8).unwrap().0, 56);
        assert_eq!(gas.accesses, 1);
    }

    #[test]
    fn write_validation_happens_without_access() {
        let gas = window();
        assert!(matches!(
            validate_write(&gas, 0, 3, 0),
            Err(Error::InvalidWidth(3))
        ));
        assert!(validate_write(&gas, 0, 2, 0x1_0000).is_err());
        assert!(validate_write(&gas, 64, 4, 0).is_err());
        assert_eq!(validate_write(&gas, 0x13, 2, 0xFFFF).unwrap(), (Width::W16, 0x12));
        assert_eq!(gas.accesses, 0);
    }

    #[test]
    fn mrpc_reads_are_chunked_and_advance() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        let mut gas = MrpcGas::new(&mut dev);
        let mut buf = vec![0u8; 2500];
        gas_read_bytes(&mut gas, 0x1000, &mut buf).unwrap();

        let reqs = mock.requests();
        assert_eq!(reqs.len(), 3);
        let offs: Vec<(u32, u32)> = reqs
            .iter()
            .map(|r| {
                assert_eq!(r.cmd, MrpcCmd::GasRead.id());
                let p = &r.payload;
                (
                    u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                    u32::from_le_bytes([p[4], p[5], p[6], p[7]]),
                )
            })
            .collect();
        assert_eq!(offs, vec![(0x1000, 1024), (0x1400, 1024), (0x1800, 452)]);
    }

    #[test]
    fn mrpc_writes_are_chunked_and_advance() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        let mut gas = MrpcGas::new(&mut dev);
        let data: Vec<u8> = (0..2100).map(|i| i as u8).collect();
        gas.write_bytes(0x100, &data).unwrap();

        let reqs = mock.requests();
        assert_eq!(reqs.len(), 3);
        let mut sent = Vec::new();
        let mut expect_off = 0x100u32;
        for r in &reqs {
            assert_eq!(r.cmd, MrpcCmd::GasWrite.id());
            let p = &r.payload;
            assert!(p.len() <= MRPC_MAX_DATA_LEN);
            let off = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
            let len = u32::from_le_bytes([p[4], p[5], p[6], p[7]]);
            assert_eq!(off, expect_off);
            assert_eq!(len as usize, p.len() - 8);
            sent.extend_from_slice(&p[8..]);
            expect_off += len;
        }
        assert_eq!(reqs[0].payload.len() - 8, 1016);
        assert_eq!(reqs[2].payload.len() - 8, 2100 - 2 * 1016);
        assert_eq!(sent, data);
    }

    #[test]
    fn mrpc_register_write_layout() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        let mut gas = MrpcGas::new(&mut dev);
        gas_write(&mut gas, 0x2002, 4, 0x1122_3344).unwrap();

        let reqs = mock.requests();
        assert_eq!(reqs[0].cmd, MrpcCmd::GasWrite.id());
        assert_eq!(
            reqs[0].payload,
            [0x00, 0x20, 0, 0, 4, 0, 0, 0, 0x44, 0x33, 0x22, 0x11]
        );
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Link error injection. Each injection is one `ERR_INJ` MRPC command that
//! returns a status word.

use crate::device::{Generation, Switchtec};
use crate::error::{Error, Result};
use crate::mrpc::{inject_sub, MrpcCmd};
use crate::wire::Encoder;
use crate::MAX_PHY_PORTS;

pub const DLLP_CRC_RATE_MAX: u16 = 4096;
pub const TLP_LCRC_RATE_MAX: u8 = 7;
pub const ACK_NACK_SEQ_MAX: u16 = 4095;

fn check_range(what: &'static str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(Error::ValueOutOfRange { what, value, max });
    }
    Ok(())
}

impl Switchtec {
    fn inject(&mut self, port: u8, cmd: Encoder) -> Result<u32> {
        if port as usize >= MAX_PHY_PORTS {
            return Err(Error::PortOutOfRange(port as usize));
        }
        let mut out = [0u8; 4];
        self.cmd(MrpcCmd::ErrInj, &cmd.finish(), &mut out)?;
        Ok(u32::from_le_bytes(out))
    }

    /// Inject a raw DLLP carrying `data`.
    pub fn inject_err_dllp(&mut self, port: u8, data: u32) -> Result<u32> {
        let cmd = Encoder::new()
            .u8(inject_sub::DLLP)
            .u8(port)
            .zeros(2)
            .u32(data);
        self.inject(port, cmd)
    }

    /// Corrupt DLLP CRCs at intervals of `rate` x 256 clocks.
    pub fn inject_err_dllp_crc(
        &mut self,
        port: u8,
        enable: bool,
        rate: u16,
    ) -> Result<u32> {
        check_range("DLLP CRC rate", rate as u64, DLLP_CRC_RATE_MAX as u64)?;
        let cmd = Encoder::new()
            .u8(inject_sub::DLLP_CRC)
            .u8(port)
            .u8(enable as u8)
            .zeros(1)
            .u16(rate)
            .zeros(2);
        self.inject(port, cmd)
    }

    /// Corrupt TLP LCRCs. A rate of 1 hits every other TLP.
    pub fn inject_err_tlp_lcrc(
        &mut self,
        port: u8,
        enable: bool,
        rate: u8,
    ) -> Result<u32> {
        check_range("TLP LCRC rate", rate as u64, TLP_LCRC_RATE_MAX as u64)?;
        let cmd = Encoder::new()
            .u8(inject_sub::TLP_LCRC)
            .u8(port)
            .u8(enable as u8);
        let cmd = match self.generation() {
            Generation::Gen5 => cmd.zeros(1).u8(rate).zeros(3),
            _ => cmd.u8(rate),
        };
        self.inject(port, cmd)
    }

    pub fn inject_err_tlp_seq_num(&mut self, port: u8) -> Result<u32> {
        let cmd = Encoder::new()
            .u8(inject_sub::TLP_SEQ_NUM)
            .u8(port)
            .zeros(2);
        self.inject(port, cmd)
    }

    /// Replace the ACK for `seq_num` with a NACK, `count` times.
    pub fn inject_err_ack_nack(
        &mut self,
        port: u8,
        seq_num: u16,
        count: u8,
    ) -> Result<u32> {
        check_range("sequence number", seq_num as u64, ACK_NACK_SEQ_MAX as u64)?;
        let cmd = Encoder::new()
            .u8(inject_sub::ACK_NACK)
            .u8(port)
            .zeros(2)
            .u16(seq_num)
            .u8(count)
            .zeros(1);
        self.inject(port, cmd)
    }

    /// Inject a credit timeout. Gen5 switches only.
    pub fn inject_err_cto(&mut self, port: u8) -> Result<u32> {
        if self.generation() != Generation::Gen5 {
            return Err(Error::Unsupported("credit timeout injection"));
        }
        let cmd = Encoder::new().u8(inject_sub::CTO).u8(port).zeros(2);
        self.inject(port, cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device;

    #[test]
    fn dllp_layout() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        dev.inject_err_dllp(3, 0xDEAD_BEEF).unwrap();
        let reqs = mock.requests();
        assert_eq!(reqs[0].cmd, MrpcCmd::ErrInj.id());
        assert_eq!(
            reqs[0].payload,
            [inject_sub::DLLP, 3, 0, 0, 0xEF, 0xBE, 0xAD, 0xDE]
        );
        assert_eq!(reqs[0].resp_len, 4);
    }

    #[test]
    fn tlp_lcrc_layout_follows_generation() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        dev.inject_err_tlp_lcrc(1, true, 5).unwrap();
        assert_eq!(mock.requests()[0].payload, [inject_sub::TLP_LCRC, 1, 1, 5]);

        let (mut dev, mock) = mock_device(Generation::Gen5);
        dev.inject_err_tlp_lcrc(1, true, 5).unwrap();
        assert_eq!(
            mock.requests()[0].payload,
            [inject_sub::TLP_LCRC, 1, 1, 0, 5, 0, 0, 0]
        );
    }

    #[test]
    fn ack_nack_layout() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        dev.inject_err_ack_nack(2, 0x123, 9).unwrap();
        assert_eq!(
            mock.requests()[0].payload,
            [inject_sub::ACK_NACK, 2, 0, 0, 0x23, 0x01, 9, 0]
        );
    }

    #[test]
    fn limits_are_checked_before_io() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        assert!(dev.inject_err_dllp_crc(0, true, 4097).is_err());
        assert!(dev.inject_err_tlp_lcrc(0, true, 8).is_err());
        assert!(dev.inject_err_ack_nack(0, 4096, 1).is_err());
        assert!(dev.inject_err_tlp_seq_num(48).is_err());
        assert!(matches!(
            dev.inject_err_cto(0),
            Err(Error::Unsupported(_))
        ));
        assert!(mock.requests().is_empty());

        dev.inject_err_dllp_crc(0, true, 4096).unwrap();
        assert_eq!(mock.requests().len(), 1);
    }
}

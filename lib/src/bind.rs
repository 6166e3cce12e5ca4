// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::device::Switchtec;
use crate::error::{Error, Result};
use crate::mrpc::{bind_sub, MrpcCmd};
use crate::wire::Decoder;
use crate::{MAX_PARTS, MAX_PHY_PORTS};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindState {
    Success,
    Fail,
    InProgress,
    Unknown(u8),
}

impl From<u8> for BindState {
    fn from(v: u8) -> Self {
        match v {
            0 => BindState::Success,
            1 => BindState::Fail,
            2 => BindState::InProgress,
            x => BindState::Unknown(x),
        }
    }
}

impl fmt::Display for BindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindState::Success => write!(f, "bound"),
            BindState::Fail => write!(f, "failed"),
            BindState::InProgress => write!(f, "in progress"),
            BindState::Unknown(x) => write!(f, "unknown ({})", x),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BindInfo {
    pub phys_port_id: u8,
    pub par_id: u8,
    pub log_port_id: u8,
    pub state: BindState,
}

const BIND_INFO_REPLY_SIZE: usize = 4 + MAX_PHY_PORTS * 4;

fn check_phys_port(port: u8) -> Result<()> {
    if port as usize >= MAX_PHY_PORTS {
        return Err(Error::PortOutOfRange(port as usize));
    }
    Ok(())
}

fn check_partition(par: u8) -> Result<()> {
    if par as usize >= MAX_PARTS {
        return Err(Error::PartitionOutOfRange(par as usize));
    }
    Ok(())
}

impl Switchtec {
    /// Binding information reported for a physical port.
    pub fn bind_info(&mut self, phys_port: u8) -> Result<Vec<BindInfo>> {
        check_phys_port(phys_port)?;

        let cmd = [bind_sub::PORT_INFO, phys_port, 0, 0];
        let mut resp = [0u8; BIND_INFO_REPLY_SIZE];
        self.cmd(MrpcCmd::PortPartP2p, &cmd, &mut resp)?;

        let mut d = Decoder::new(&resp);
        let count = (d.u8() as usize).min(MAX_PHY_PORTS);
        d.skip(3);
        Ok((0..count)
            .map(|_| BindInfo {
                phys_port_id: d.u8(),
                par_id: d.u8(),
                log_port_id: d.u8(),
                state: d.u8().into(),
            })
            .collect())
    }

    /// Bind a partition's logical port to a physical port.
    pub fn bind(&mut self, partition: u8, log_port: u8, phys_port: u8) -> Result<()> {
        check_partition(partition)?;
        check_phys_port(phys_port)?;

        let cmd = [bind_sub::PORT_BIND, partition, log_port, phys_port];
        let mut out = [0u8; 4];
        self.cmd(MrpcCmd::PortPartP2p, &cmd, &mut out)
    }

    pub fn unbind(&mut self, partition: u8, log_port: u8) -> Result<()> {
        check_partition(partition)?;

        let cmd = [bind_sub::PORT_UNBIND, partition, log_port, 2];
        let mut out = [0u8; 4];
        self.cmd(MrpcCmd::PortPartP2p, &cmd, &mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{mock_device, Generation};

    #[test]
    fn bind_info_decodes_entries() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        mock.reply(vec![2, 0, 0, 0, 5, 1, 3, 0, 6, 1, 4, 2]);

        let info = dev.bind_info(5).unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].log_port_id, 3);
        assert_eq!(info[0].state, BindState::Success);
        assert_eq!(info[1].state, BindState::InProgress);

        let reqs = mock.requests();
        assert_eq!(reqs[0].payload, [bind_sub::PORT_INFO, 5, 0, 0]);
        assert_eq!(reqs[0].resp_len, 196);
    }

    #[test]
    fn bind_and_unbind_layouts() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        dev.bind(1, 2, 3).unwrap();
        dev.unbind(1, 2).unwrap();

        let reqs = mock.requests();
        assert_eq!(reqs[0].payload, [bind_sub::PORT_BIND, 1, 2, 3]);
        assert_eq!(reqs[1].payload, [bind_sub::PORT_UNBIND, 1, 2, 2]);
    }

    #[test]
    fn out_of_range_ports_are_rejected() {
        let (mut dev, mock) = mock_device(Generation::Gen4);
        assert!(matches!(
            dev.bind(0, 0, 48),
            Err(Error::PortOutOfRange(48))
        ));
        assert!(matches!(
            dev.unbind(48, 0),
            Err(Error::PartitionOutOfRange(48))
        ));
        assert!(dev.bind_info(200).is_err());
        assert!(mock.requests().is_empty());
    }
}

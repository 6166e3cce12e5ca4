// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::device::Switchtec;
use crate::error::Result;
use crate::mrpc::MrpcCmd;
use crate::wire::Decoder;
use crate::{MAX_PORTS, MAX_STACKS};
use serde::Serialize;

/// PCIe transfer rate in GT/s, indexed by link rate.
pub const GEN_TRANSFERS: [f32; 5] = [0.0, 2.5, 5.0, 8.0, 16.0];
/// Usable data rate in MB/s per lane, indexed by link rate.
pub const GEN_DATARATE: [f32; 5] = [0.0, 250.0, 500.0, 985.0, 1969.0];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PortId {
    pub partition: u8,
    pub stack: u8,
    pub upstream: bool,
    pub stk_id: u8,
    pub phys_id: u8,
    pub log_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub port: PortId,
    pub cfg_lnk_width: u8,
    pub neg_lnk_width: u8,
    pub link_up: bool,
    pub link_rate: u8,
    pub ltssm: u16,
    pub ltssm_str: &'static str,
}

impl PortStatus {
    pub fn transfer_rate(&self) -> Option<f32> {
        GEN_TRANSFERS.get(self.link_rate as usize).copied()
    }

    /// Aggregate link bandwidth in MB/s at the negotiated width.
    pub fn data_rate(&self) -> Option<f32> {
        GEN_DATARATE
            .get(self.link_rate as usize)
            .map(|r| r * self.neg_lnk_width as f32)
    }
}

const LNKSTAT_ENTRY_SIZE: usize = 12;

/// Name an LTSSM state. The low byte is the major state and the high byte
/// the minor one; without `show_minor` only the major state is named.
pub fn ltssm_str(ltssm: u16, show_minor: bool) -> &'static str {
    let ltssm = if show_minor { ltssm } else { ltssm | 0xFF00 };

    match ltssm {
        0x0000 => "Detect (INACTIVE)",
        0x0100 => "Detect (QUIET)",
        0x0200 => "Detect (SPD_CHD0)",
        0x0300 => "Detect (SPD_CHD1)",
        0x0400 => "Detect (ACTIVE0)",
        0x0500 => "Detect (ACTIVE1)",
        0x0600 => "Detect (P1_TO_P0)",
        0x0700 => "Detect (P0_TO_P1_0)",
        0x0800 => "Detect (P0_TO_P1_1)",
        0x0900 => "Detect (P0_TO_P1_2)",
        0xFF00 => "Detect",
        0x0001 => "Polling (INACTIVE)",
        0x0101 => "Polling (ACTIVE_ENTRY)",
        0x0201 => "Polling (ACTIVE)",
        0x0301 => "Polling (CFG)",
        0x0401 => "Polling (COMP)",
        0x0501 => "Polling (COMP_ENTRY)",
        0x0601 => "Polling (COMP_EIOS)",
        0x0701 => "Polling (COMP_EIOS_ACK)",
        0x0801 => "Polling (COMP_IDLE)",
        0xFF01 => "Polling",
        0x0002 => "Config (INACTIVE)",
        0x0102 => "Config (US_LW_START)",
        0x0202 => "Config (US_LW_ACCEPT)",
        0x0302 => "Config (US_LN_WAIT)",
        0x0402 => "Config (US_LN_ACCEPT)",
        0x0502 => "Config (DS_LW_START)",
        0x0602 => "Config (DS_LW_ACCEPT)",
        0x0702 => "Config (DS_LN_WAIT)",
        0x0802 => "Config (DS_LN_ACCEPT)",
        0x0902 => "Config (COMPLETE)",
        0x0A02 => "Config (IDLE)",
        0xFF02 => "Config",
        0x0003 => "L0 (INACTIVE)",
        0x0103 => "L0 (L0)",
        0x0203 => "L0 (TX_EL_IDLE)",
        0x0303 => "L0 (TX_IDLE_MIN)",
        0xFF03 => "L0",
        0x0004 => "Recovery (INACTIVE)",
        0x0104 => "Recovery (RCVR_LOCK)",
        0x0204 => "Recovery (RCVR_CFG)",
        0x0304 => "Recovery (IDLE)",
        0x0404 => "Recovery (SPEED0)",
        0x0504 => "Recovery (SPEED1)",
        0x0604 => "Recovery (SPEED2)",
        0x0704 => "Recovery (SPEED3)",
        0x0804 => "Recovery (EQ_PH0)",
        0x0904 => "Recovery (EQ_PH1)",
        0x0A04 => "Recovery (EQ_PH2)",
        0x0B04 => "Recovery (EQ_PH3)",
        0xFF04 => "Recovery",
        0x0005 => "Disable (INACTIVE)",
        0x0105 => "Disable (DISABLE0)",
        0x0205 => "Disable (DISABLE1)",
        0x0305 => "Disable (DISABLE2)",
        0x0405 => "Disable (DISABLE3)",
        0xFF05 => "Disable",
        0x0006 => "Loop Back (INACTIVE)",
        0x0106 => "Loop Back (ENTRY)",
        0x0206 => "Loop Back (ENTRY_EXIT)",
        0x0306 => "Loop Back (EIOS)",
        0x0406 => "Loop Back (EIOS_ACK)",
        0x0506 => "Loop Back (IDLE)",
        0x0606 => "Loop Back (ACTIVE)",
        0x0706 => "Loop Back (EXIT0)",
        0x0806 => "Loop Back (EXIT1)",
        0xFF06 => "Loop Back",
        0x0007 => "Hot Reset (INACTIVE)",
        0x0107 => "Hot Reset (HOT_RESET)",
        0x0207 => "Hot Reset (MASTER_UP)",
        0x0307 => "Hot Reset (MASTER_DOWN)",
        0xFF07 => "Hot Reset",
        0x0008 => "TxL0s (INACTIVE)",
        0x0108 => "TxL0s (IDLE)",
        0x0208 => "TxL0s (T0_L0)",
        0x0308 => "TxL0s (FTS0)",
        0x0408 => "TxL0s (FTS1)",
        0xFF08 => "TxL0s",
        0x0009 => "L1 (INACTIVE)",
        0x0109 => "L1 (IDLE)",
        0x0209 => "L1 (SUBSTATE)",
        0x0309 => "L1 (SPD_CHG1)",
        0x0409 => "L1 (T0_L0)",
        0xFF09 => "L1",
        0x000A => "L2 (INACTIVE)",
        0x010A => "L2 (IDLE)",
        0x020A => "L2 (TX_WAKE0)",
        0x030A => "L2 (TX_WAKE1)",
        0x040A => "L2 (EXIT)",
        0x050A => "L2 (SPEED)",
        0xFF0A => "L2",
        _ => "UNKNOWN",
    }
}

fn decode_lnkstat(resp: &[u8]) -> Vec<PortStatus> {
    let mut d = Decoder::new(resp);
    let mut ports = Vec::new();

    for _ in 0..MAX_PORTS {
        let phys_id = d.u8();
        let partition = d.u8();
        let log_id = d.u8();
        let stk_id = d.u8();
        let cfg_lnk_width = d.u8();
        let neg_lnk_width = d.u8();
        let usp_flag = d.u8();
        let linkup_linkrate = d.u8();
        let ltssm = d.u16();
        d.skip(2);

        // unused entries carry a stack id of 0xFF
        if (stk_id >> 4) as usize > MAX_STACKS {
            continue;
        }

        ports.push(PortStatus {
            port: PortId {
                partition,
                stack: stk_id >> 4,
                upstream: usp_flag != 0,
                stk_id: stk_id & 0xF,
                phys_id,
                log_id,
            },
            cfg_lnk_width,
            neg_lnk_width,
            link_up: linkup_linkrate >> 7 != 0,
            link_rate: linkup_linkrate & 0x7F,
            ltssm,
            ltssm_str: ltssm_str(ltssm, false),
        });
    }

    ports.sort_by(|a, b| {
        a.port
            .partition
            .cmp(&b.port.partition)
            .then(b.port.upstream.cmp(&a.port.upstream))
            .then(a.port.log_id.cmp(&b.port.log_id))
    });
    ports
}

impl Switchtec {
    /// Link status of every port, ordered by partition with the upstream
    /// port first and then by logical port.
    pub fn status(&mut self) -> Result<Vec<PortStatus>> {
        let mut resp = vec![0u8; MAX_PORTS * LNKSTAT_ENTRY_SIZE];
        self.cmd(MrpcCmd::LnkStat, &0u64.to_le_bytes(), &mut resp)?;
        Ok(decode_lnkstat(&resp))
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Performance monitors: event counters, per-port bandwidth counters and
//! latency counters. All of them ride on the `PMON` MRPC command and are
//! selected by the leading sub-command byte.

use crate::device::Switchtec;
use crate::error::{Error, Result};
use crate::events::{EventId, EventIndex};
use crate::mrpc::{pmon_sub, MrpcCmd, MRPC_MAX_DATA_LEN};
use crate::status::PortId;
use crate::wire::{Decoder, Encoder};
use crate::{LAT_ALL_INGRESS, MAX_EVENT_COUNTERS, MAX_PORTS, MAX_STACKS};
use serde::Serialize;
use std::time::Duration;

pub mod evtype {
    pub const UNSUP_REQ_ERR: u32 = 1 << 0;
    pub const ECRC_ERR: u32 = 1 << 1;
    pub const MALFORM_TLP_ERR: u32 = 1 << 2;
    pub const RCVR_OFLOW_ERR: u32 = 1 << 3;
    pub const CMPLTR_ABORT_ERR: u32 = 1 << 4;
    pub const POISONED_TLP_ERR: u32 = 1 << 5;
    pub const SURPRISE_DOWN_ERR: u32 = 1 << 6;
    pub const DATA_LINK_PROTO_ERR: u32 = 1 << 7;
    pub const HDR_LOG_OFLOW_ERR: u32 = 1 << 8;
    pub const UNCOR_INT_ERR: u32 = 1 << 9;
    pub const REPLAY_TMR_TIMEOUT: u32 = 1 << 10;
    pub const REPLAY_NUM_ROLLOVER: u32 = 1 << 11;
    pub const BAD_DLLP: u32 = 1 << 12;
    pub const BAD_TLP: u32 = 1 << 13;
    pub const RCVR_ERR: u32 = 1 << 14;
    pub const RCV_FATAL_MSG: u32 = 1 << 15;
    pub const RCV_NON_FATAL_MSG: u32 = 1 << 16;
    pub const RCV_CORR_MSG: u32 = 1 << 17;
    pub const NAK_RCVD: u32 = 1 << 18;
    pub const RULE_TABLE_HIT: u32 = 1 << 19;
    pub const POSTED_TLP: u32 = 1 << 20;
    pub const COMP_TLP: u32 = 1 << 21;
    pub const NON_POSTED_TLP: u32 = 1 << 22;

    pub const ALL: u32 = (1 << 23) - 1;
    pub const ALL_TLPS: u32 = POSTED_TLP | COMP_TLP | NON_POSTED_TLP;
    pub const ALL_ERRORS: u32 = UNSUP_REQ_ERR
        | ECRC_ERR
        | MALFORM_TLP_ERR
        | RCVR_OFLOW_ERR
        | CMPLTR_ABORT_ERR
        | POISONED_TLP_ERR
        | SURPRISE_DOWN_ERR
        | DATA_LINK_PROTO_ERR
        | HDR_LOG_OFLOW_ERR
        | UNCOR_INT_ERR
        | REPLAY_TMR_TIMEOUT
        | REPLAY_NUM_ROLLOVER
        | BAD_DLLP
        | BAD_TLP
        | RCVR_ERR
        | RCV_FATAL_MSG
        | RCV_NON_FATAL_MSG
        | RCV_CORR_MSG
        | NAK_RCVD;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvcntrType {
    pub mask: u32,
    pub name: &'static str,
    pub help: &'static str,
}

macro_rules! entry {
    ($m:ident, $h:expr) => {
        EvcntrType {
            mask: evtype::$m,
            name: stringify!($m),
            help: $h,
        }
    };
}

/// Event types a counter can be set up to count. The aggregate entries
/// come first so that decoding a mask prefers them.
pub const EVCNTR_TYPES: &[EvcntrType] = &[
    entry!(ALL, "All Events"),
    entry!(ALL_TLPS, "All TLPs"),
    entry!(ALL_ERRORS, "All errors"),
    entry!(UNSUP_REQ_ERR, "Unsupported Request error"),
    entry!(ECRC_ERR, "ECRC error"),
    entry!(MALFORM_TLP_ERR, "Malformed TLP error"),
    entry!(RCVR_OFLOW_ERR, "Receiver overflow error"),
    entry!(CMPLTR_ABORT_ERR, "Completer Abort error"),
    entry!(POISONED_TLP_ERR, "Poisoned TLP error"),
    entry!(SURPRISE_DOWN_ERR, "Surprise down error"),
    entry!(DATA_LINK_PROTO_ERR, "Data Link protocol error"),
    entry!(HDR_LOG_OFLOW_ERR, "Header Log Overflow error"),
    entry!(UNCOR_INT_ERR, "Uncorrectable Internal error"),
    entry!(REPLAY_TMR_TIMEOUT, "Replay timer timeout"),
    entry!(REPLAY_NUM_ROLLOVER, "Replay number rollover"),
    entry!(BAD_DLLP, "Bad DLLP"),
    entry!(BAD_TLP, "Bad TLP"),
    entry!(RCVR_ERR, "Receiver error"),
    entry!(RCV_FATAL_MSG, "Receive FATAL error message"),
    entry!(RCV_NON_FATAL_MSG, "Receive Non-FATAL error message"),
    entry!(RCV_CORR_MSG, "Receive Correctable error message"),
    entry!(NAK_RCVD, "NAK received"),
    entry!(RULE_TABLE_HIT, "Rule Search Table Rule Hit"),
    entry!(POSTED_TLP, "Posted TLP"),
    entry!(COMP_TLP, "Completion TLP"),
    entry!(NON_POSTED_TLP, "Non-Posted TLP"),
];

impl EvcntrType {
    pub fn by_name(name: &str) -> Option<&'static EvcntrType> {
        EVCNTR_TYPES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Name the first table entry wholly contained in `mask` and clear its bits.
/// Calling this until it returns `None` lists a mask as names.
pub fn evcntr_type_str(mask: &mut u32) -> Option<&'static str> {
    let t = EVCNTR_TYPES.iter().find(|t| *mask & t.mask == t.mask)?;
    *mask &= !t.mask;
    Some(t.name)
}

pub fn evcntr_type_names(mut mask: u32) -> Vec<&'static str> {
    std::iter::from_fn(|| evcntr_type_str(&mut mask)).collect()
}

/// Configuration of one event counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvcntrSetup {
    /// One bit per port in the stack.
    pub port_mask: u8,
    /// Bits from [`evtype`]; only the low 24 bits fit on the wire.
    pub type_mask: u32,
    /// Count egress TLPs rather than ingress ones.
    pub egress: bool,
    /// Count at which the counter raises its threshold event.
    pub threshold: u32,
}

impl EvcntrSetup {
    pub const WIRE_SIZE: usize = 9;

    fn encode(&self, e: Encoder) -> Encoder {
        e.u32(((self.type_mask & 0xFF_FFFF) << 8) | self.port_mask as u32)
            .u8(self.egress as u8)
            .u32(self.threshold)
    }

    fn decode(d: &mut Decoder<'_>) -> Self {
        let w = d.u32();
        Self {
            port_mask: (w & 0xFF) as u8,
            type_mask: w >> 8,
            egress: d.u8() != 0,
            threshold: d.u32(),
        }
    }
}

// The setup command always carries the full counter array; only the first
// slot is used.
const EVCNTR_SETUP_SLOTS: usize = 63;
const EVCNTR_RESULT_SIZE: usize = 8;

fn check_counters(stack: u8, counter: usize, n: usize) -> Result<()> {
    check_stack(stack)?;
    let end = counter.saturating_add(n);
    if counter >= MAX_EVENT_COUNTERS || end > MAX_EVENT_COUNTERS {
        return Err(Error::CounterOutOfRange {
            counter,
            end,
            max: MAX_EVENT_COUNTERS,
        });
    }
    Ok(())
}

fn check_stack(stack: u8) -> Result<()> {
    if stack as usize >= MAX_STACKS {
        return Err(Error::StackOutOfRange(stack as usize));
    }
    Ok(())
}

fn check_port(id: u8) -> Result<()> {
    if id as usize >= MAX_PORTS {
        return Err(Error::PortOutOfRange(id as usize));
    }
    Ok(())
}

fn check_ports(ids: &[u8]) -> Result<()> {
    ids.iter().try_for_each(|id| check_port(*id))
}

/// Bandwidth counters for one direction of a port, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BwcntrDir {
    pub posted: u64,
    pub comp: u64,
    pub nonposted: u64,
}

impl BwcntrDir {
    pub fn total(&self) -> u64 {
        self.posted
            .wrapping_add(self.nonposted)
            .wrapping_add(self.comp)
    }

    fn sub(&mut self, old: &Self) {
        self.posted = self.posted.wrapping_sub(old.posted);
        self.comp = self.comp.wrapping_sub(old.comp);
        self.nonposted = self.nonposted.wrapping_sub(old.nonposted);
    }

    fn decode(d: &mut Decoder<'_>) -> Self {
        Self {
            posted: d.u64(),
            comp: d.u64(),
            nonposted: d.u64(),
        }
    }
}

/// One port's bandwidth counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BwcntrRes {
    pub time_us: u64,
    pub egress: BwcntrDir,
    pub ingress: BwcntrDir,
}

impl BwcntrRes {
    pub const WIRE_SIZE: usize = 56;

    /// Subtract an earlier snapshot from this one, field by field.
    pub fn sub(&mut self, old: &Self) {
        self.time_us = self.time_us.wrapping_sub(old.time_us);
        self.egress.sub(&old.egress);
        self.ingress.sub(&old.ingress);
    }

    fn decode(d: &mut Decoder<'_>) -> Self {
        Self {
            time_us: d.u64(),
            egress: BwcntrDir::decode(d),
            ingress: BwcntrDir::decode(d),
        }
    }
}

// Size of the bandwidth get command with its full port array.
const BW_GET_CMD_SIZE: usize = 2 + MAX_PORTS * 2;

/// How many ports one bandwidth query can cover so the reply fits in a
/// single MRPC transfer.
pub const BW_PORTS_PER_CMD: usize =
    (MRPC_MAX_DATA_LEN - BW_GET_CMD_SIZE) / BwcntrRes::WIRE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum BwType {
    Raw = 0,
    Payload = 1,
}

/// Current and maximum latency through the switch for one egress port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatData {
    pub cur_ns: u16,
    pub max_ns: u16,
}

impl Switchtec {
    /// Configure event counter `counter` in `stack`.
    pub fn evcntr_setup(
        &mut self,
        stack: u8,
        counter: usize,
        setup: &EvcntrSetup,
    ) -> Result<()> {
        check_counters(stack, counter, 0)?;

        let cmd = setup
            .encode(
                Encoder::with_capacity(571)
                    .u8(pmon_sub::SETUP_EV_COUNTER)
                    .u8(stack)
                    .u8(counter as u8)
                    .u8(1),
            )
            .zeros((EVCNTR_SETUP_SLOTS - 1) * EvcntrSetup::WIRE_SIZE)
            .finish();

        self.cmd(MrpcCmd::Pmon, &cmd, &mut [])
    }

    fn evcntr_get_raw(
        &mut self,
        sub: u8,
        stack: u8,
        counter: usize,
        n: usize,
        clear: bool,
        item_size: usize,
    ) -> Result<Vec<u8>> {
        check_counters(stack, counter, n)?;
        let res_size = n * item_size;
        if res_size > MRPC_MAX_DATA_LEN {
            return Err(Error::ResponseTooLarge(res_size));
        }

        let cmd = Encoder::new()
            .u8(sub)
            .u8(stack)
            .u8(counter as u8)
            .u8(n as u8)
            .u8(clear as u8)
            .finish();

        let mut resp = vec![0u8; res_size];
        self.cmd(MrpcCmd::Pmon, &cmd, &mut resp)?;
        Ok(resp)
    }

    /// Read back how `n` counters starting at `counter` are configured.
    pub fn evcntr_get_setup(
        &mut self,
        stack: u8,
        counter: usize,
        n: usize,
    ) -> Result<Vec<EvcntrSetup>> {
        let resp = self.evcntr_get_raw(
            pmon_sub::GET_EV_COUNTER_SETUP,
            stack,
            counter,
            n,
            false,
            EvcntrSetup::WIRE_SIZE,
        )?;
        let mut d = Decoder::new(&resp);
        Ok((0..n).map(|_| EvcntrSetup::decode(&mut d)).collect())
    }

    /// Read the counts of `n` counters starting at `counter`, optionally
    /// zeroing them.
    pub fn evcntr_get(
        &mut self,
        stack: u8,
        counter: usize,
        n: usize,
        clear: bool,
    ) -> Result<Vec<u32>> {
        let resp = self.evcntr_get_raw(
            pmon_sub::GET_EV_COUNTER,
            stack,
            counter,
            n,
            clear,
            EVCNTR_RESULT_SIZE,
        )?;
        let mut d = Decoder::new(&resp);
        Ok((0..n)
            .map(|_| {
                let value = d.u32();
                d.skip(4);
                value
            })
            .collect())
    }

    /// Setups and counts together, setups first.
    pub fn evcntr_get_both(
        &mut self,
        stack: u8,
        counter: usize,
        n: usize,
        clear: bool,
    ) -> Result<Vec<(EvcntrSetup, u32)>> {
        let setups = self.evcntr_get_setup(stack, counter, n)?;
        let counts = self.evcntr_get(stack, counter, n, clear)?;
        Ok(setups.into_iter().zip(counts).collect())
    }

    /// Deconfigure a counter by writing an empty setup.
    pub fn evcntr_del(&mut self, stack: u8, counter: usize) -> Result<()> {
        self.evcntr_setup(stack, counter, &EvcntrSetup::default())
    }

    /// Block until any event counter on any port reaches its threshold.
    /// Returns `false` on timeout.
    pub fn evcntr_wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        Ok(self
            .event_wait_for(EventId::Thresh, EventIndex::All, timeout)?
            .is_some())
    }

    /// Bandwidth counters for the given physical ports, in input order.
    ///
    /// Large lists are split across several MRPC calls. Any failing call
    /// fails the whole retrieval.
    pub fn bwcntr_many(
        &mut self,
        phys_ids: &[u8],
        clear: bool,
    ) -> Result<Vec<BwcntrRes>> {
        check_ports(phys_ids)?;
        let mut res = Vec::with_capacity(phys_ids.len());

        for chunk in phys_ids.chunks(BW_PORTS_PER_CMD) {
            let mut cmd = Encoder::new()
                .u8(pmon_sub::GET_BW_COUNTER)
                .u8(chunk.len() as u8);
            for id in chunk {
                cmd = cmd.u8(*id).u8(clear as u8);
            }

            let mut resp = vec![0u8; chunk.len() * BwcntrRes::WIRE_SIZE];
            self.cmd(MrpcCmd::Pmon, &cmd.finish(), &mut resp)?;

            let mut d = Decoder::new(&resp);
            res.extend((0..chunk.len()).map(|_| BwcntrRes::decode(&mut d)));
        }

        Ok(res)
    }

    /// Bandwidth counters for every port the switch reports.
    pub fn bwcntr_all(
        &mut self,
        clear: bool,
    ) -> Result<Vec<(PortId, BwcntrRes)>> {
        let ports: Vec<PortId> =
            self.status()?.into_iter().map(|s| s.port).collect();
        let ids: Vec<u8> = ports.iter().map(|p| p.phys_id).collect();
        let res = self.bwcntr_many(&ids, clear)?;
        Ok(ports.into_iter().zip(res).collect())
    }

    /// Select what the bandwidth counters of the given ports measure.
    pub fn bwcntr_set_many(
        &mut self,
        phys_ids: &[u8],
        bw_type: BwType,
    ) -> Result<()> {
        check_ports(phys_ids)?;
        for chunk in phys_ids.chunks(MAX_PORTS) {
            let mut cmd = Encoder::new()
                .u8(pmon_sub::SET_BW_COUNTER)
                .u8(chunk.len() as u8);
            for id in chunk {
                cmd = cmd.u8(*id).u8(bw_type as u8);
            }
            self.cmd(MrpcCmd::Pmon, &cmd.finish(), &mut [])?;
        }
        Ok(())
    }

    pub fn bwcntr_set_all(&mut self, bw_type: BwType) -> Result<()> {
        let ids: Vec<u8> =
            self.status()?.iter().map(|s| s.port.phys_id).collect();
        self.bwcntr_set_many(&ids, bw_type)
    }

    /// Attach latency counters to `(egress, ingress)` port pairs. Use
    /// [`crate::LAT_ALL_INGRESS`] as ingress to measure from any port.
    pub fn lat_setup_many(&mut self, ports: &[(u8, u8)]) -> Result<()> {
        for (egress, ingress) in ports {
            check_port(*egress)?;
            if *ingress != LAT_ALL_INGRESS {
                check_port(*ingress)?;
            }
        }

        for chunk in ports.chunks(MAX_PORTS) {
            let mut cmd = Encoder::new()
                .u8(pmon_sub::SETUP_LAT_COUNTER)
                .u8(chunk.len() as u8);
            for (egress, ingress) in chunk {
                cmd = cmd.u8(*egress).u8(*ingress);
            }
            self.cmd(MrpcCmd::Pmon, &cmd.finish(), &mut [])?;
        }
        Ok(())
    }

    /// Set up one latency counter; with `clear`, read it once afterwards so
    /// it starts from zero.
    pub fn lat_setup(&mut self, egress: u8, ingress: u8, clear: bool) -> Result<()> {
        self.lat_setup_many(&[(egress, ingress)])?;
        if clear {
            self.lat_get(true, egress)?;
        }
        Ok(())
    }

    /// Latency results for the given egress ports, in input order.
    pub fn lat_get_many(
        &mut self,
        egress_ids: &[u8],
        clear: bool,
    ) -> Result<Vec<LatData>> {
        check_ports(egress_ids)?;
        let mut res = Vec::with_capacity(egress_ids.len());

        for chunk in egress_ids.chunks(MAX_PORTS) {
            let cmd = Encoder::new()
                .u8(pmon_sub::GET_LAT_COUNTER)
                .u8(chunk.len() as u8)
                .u8(clear as u8)
                .bytes(chunk)
                .finish();

            let mut resp = vec![0u8; chunk.len() * 4];
            self.cmd(MrpcCmd::Pmon, &cmd, &mut resp)?;

            let mut d = Decoder::new(&resp);
            res.extend((0..chunk.len()).map(|_| LatData {
                cur_ns: d.u16(),
                max_ns: d.u16(),
            }));
        }

        Ok(res)
    }

    pub fn lat_get(&mut self, clear: bool, egress: u8) -> Result<LatData> {
        let mut v = self.lat_get_many(&[egress], clear)?;
        Ok(v.pop().unwrap_or_default())
    }
}

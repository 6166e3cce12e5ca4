// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Result;

/// Largest command payload or reply the firmware accepts in one MRPC call.
pub const MRPC_MAX_DATA_LEN: usize = 1024;

/// MRPC command identifiers. Values follow the firmware's command table,
/// including the reserved slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MrpcCmd {
    Twi = 1,
    Vgpio = 2,
    Pwm = 3,
    DieTemp = 4,
    FwDnld = 5,
    FwLogRd = 6,
    Pmon = 7,
    PortLn = 8,
    PortArb = 9,
    McOvrly = 10,
    StackBif = 11,
    PortPartP2p = 12,
    DiagTlpInject = 13,
    DiagPortEye = 15,
    DiagPotVhist = 16,
    DiagPortLtssmLog = 17,
    DiagPortTlpAnl = 18,
    DiagPortLnAdpt = 19,
    SrdsPciePeak = 20,
    SrdsEqCtrl = 21,
    SrdsLnTuningMode = 22,
    NtMcgCapableConfig = 23,
    Tch = 24,
    Arb = 25,
    Smbus = 26,
    Reset = 27,
    LnkStat = 28,
    MultiCfg = 29,
    RdFlash = 30,
    SpiEcc = 31,
    PatGen = 32,
    IntLoopback = 33,
    RouteToSelf = 35,
    RefclkS = 36,
    SynthEp = 37,
    EventsQuery = 38,
    GasRead = 39,
    AerGen = 40,
    PartInfo = 41,
    PcieGen12Dump = 42,
    PcieGen12Tune = 43,
    EyeObserve = 44,
    RcvrObjDump = 45,
    PortEqStatus = 47,
    PortEqCtrl = 48,
    GasWrite = 49,
    ErrInj = 50,
    Echo = 65,
}

impl MrpcCmd {
    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn description(self) -> &'static str {
        use MrpcCmd::*;
        match self {
            Twi => "TWI Access",
            Vgpio => "GPIO",
            Pwm => "Pulse Width Modulator",
            DieTemp => "Die Temperature",
            FwDnld => "Firmware Download",
            FwLogRd => "Firmware Log Retrieval",
            Pmon => "Performance Monitor",
            PortLn => "Port Link",
            PortArb => "Port Arbitration Set",
            McOvrly => "MC Overlay Setting",
            StackBif => "Dynamic Port Bifurcation",
            PortPartP2p => "Port Partition P2P Binding",
            DiagTlpInject => "TLP Injection",
            DiagPortEye => "2D Eye Capture",
            DiagPotVhist => "Real Time Eye Capture",
            DiagPortLtssmLog => "LTSSM Monitor",
            DiagPortTlpAnl => "PCIe Analyzer",
            DiagPortLnAdpt => "Port Adaptation Objects",
            SrdsPciePeak => "Receiver Peaking Control",
            SrdsEqCtrl => "Port Equalization Control",
            SrdsLnTuningMode => "Port Tuning Mode",
            NtMcgCapableConfig => "NT MCG Capable Configuration",
            Tch => "Tachometer",
            Arb => "Port Arbitration",
            Smbus => "SMBus",
            Reset => "Reset",
            LnkStat => "Link Status Retrieve",
            MultiCfg => "Multi-Configuration",
            RdFlash => "Read Flash",
            SpiEcc => "SPI Single Bit ECC",
            PatGen => "Pattern Generator and Monitor",
            IntLoopback => "Internal Loopback",
            RouteToSelf => "Route-To-Self",
            RefclkS => "REFCLK_S Control",
            SynthEp => "Synthetic EP",
            EventsQuery => "Events Query",
            GasRead => "GAS Read",
            AerGen => "AER Events Generator",
            PartInfo => "Get Partition Info",
            PcieGen12Dump => "PCIe Gen1/2 Port Tuning Dump",
            PcieGen12Tune => "PCIe Gen1/2 Port Tuning",
            EyeObserve => "Eye Observation Monitor",
            RcvrObjDump => "Receiver Object Dump",
            PortEqStatus => "Port Equalization Status",
            PortEqCtrl => "Port Equalization Control",
            GasWrite => "GAS Write",
            ErrInj => "MRPC Link Error Injection",
            Echo => "Echo",
        }
    }
}

/// Performance monitor sub-commands.
pub mod pmon_sub {
    pub const GET_EV_COUNTER: u8 = 1;
    pub const SETUP_EV_COUNTER: u8 = 2;
    pub const GET_EV_COUNTER_SETUP: u8 = 3;
    pub const GET_BW_COUNTER: u8 = 4;
    pub const SET_BW_COUNTER: u8 = 5;
    pub const GET_LAT_COUNTER: u8 = 6;
    pub const SETUP_LAT_COUNTER: u8 = 7;
}

/// Port partition P2P binding sub-commands.
pub mod bind_sub {
    pub const PORT_INFO: u8 = 0;
    pub const PORT_BIND: u8 = 1;
    pub const PORT_UNBIND: u8 = 2;
}

pub mod dietemp_sub {
    pub const SET_MEAS: u32 = 1;
    pub const GET: u32 = 2;
}

/// Link error injection sub-commands.
pub mod inject_sub {
    pub const DLLP: u8 = 0;
    pub const DLLP_CRC: u8 = 1;
    pub const TLP_LCRC: u8 = 2;
    pub const TLP_SEQ_NUM: u8 = 3;
    pub const ACK_NACK: u8 = 4;
    pub const CTO: u8 = 5;
}

/// A synchronous request/response channel to the switch's MRPC engine.
///
/// `payload` holds the command struct and `resp` is sized to exactly the
/// reply the caller expects. An implementation fills `resp` completely or
/// fails; firmware status words other than zero come back as
/// [`crate::Error::Mrpc`] with the value untouched.
pub trait MrpcTransport: Send {
    fn cmd(&mut self, cmd: u32, payload: &[u8], resp: &mut [u8]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::MrpcTransport;
    use crate::error::{Error, Result, ReturnCode};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Request {
        pub cmd: u32,
        pub payload: Vec<u8>,
        pub resp_len: usize,
    }

    pub enum Reply {
        Data(Vec<u8>),
        Fail(u32),
    }

    #[derive(Default)]
    struct State {
        requests: Vec<Request>,
        replies: VecDeque<Reply>,
    }

    /// Records every request and answers from a script. With the script
    /// exhausted it answers with zeros.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<State>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(&self, data: Vec<u8>) -> &Self {
            self.state
                .lock()
                .unwrap()
                .replies
                .push_back(Reply::Data(data));
            self
        }

        pub fn fail(&self, code: u32) -> &Self {
            self.state
                .lock()
                .unwrap()
                .replies
                .push_back(Reply::Fail(code));
            self
        }

        pub fn requests(&self) -> Vec<Request> {
            self.state.lock().unwrap().requests.clone()
        }
    }

    impl MrpcTransport for MockTransport {
        fn cmd(
            &mut self,
            cmd: u32,
            payload: &[u8],
            resp: &mut [u8],
        ) -> Result<()> {
            let mut st = self.state.lock().unwrap();
            st.requests.push(Request {
                cmd,
                payload: payload.to_vec(),
                resp_len: resp.len(),
            });
            match st.replies.pop_front() {
                Some(Reply::Data(d)) => {
                    let n = d.len().min(resp.len());
                    resp[..n].copy_from_slice(&d[..n]);
                    resp[n..].fill(0);
                    Ok(())
                }
                Some(Reply::Fail(code)) => Err(Error::Mrpc(ReturnCode(code))),
                None => {
                    resp.fill(0);
                    Ok(())
                }
            }
        }
    }
}

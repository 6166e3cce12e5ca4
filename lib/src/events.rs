// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch events: what the firmware has flagged since it was last cleared,
//! and blocking until a particular event fires.
//!
//! Events do not travel over MRPC. The kernel driver reports them on the
//! same character device, so they sit behind their own [`EventTransport`]
//! seam.

use crate::device::Switchtec;
use crate::error::{Error, Result};
use crate::MAX_PARTS;
use serde::Serialize;
use slog::debug;
use std::time::{Duration, Instant};

/// Number of PFF summary words the driver reports, one per port function.
pub const MAX_PFF: usize = 255;

/// Port number reported for a PFF that belongs to a virtual endpoint.
pub const PFF_PORT_VEP: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Global,
    Partition,
    Pff,
}

/// Every event the switch can raise. The driver numbers them in the same
/// order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub enum EventId {
    StackError,
    PpuError,
    IspError,
    SysReset,
    FwExc,
    FwNmi,
    FwNonFatal,
    FwFatal,
    TwiMrpcComp,
    TwiMrpcCompAsync,
    CliMrpcComp,
    CliMrpcCompAsync,
    GpioInt,
    PartReset,
    MrpcComp,
    MrpcCompAsync,
    DynPartBindComp,
    AerInP2p,
    AerInVep,
    Dpc,
    Cts,
    Hotplug,
    Ier,
    Thresh,
    PowerMgmt,
    TlpThrottling,
    ForceSpeed,
    CreditTimeout,
    LinkState,
}

#[derive(Debug)]
pub struct EventInfo {
    pub id: EventId,
    pub kind: EventType,
    /// Bit in the summary word for this event's type.
    pub bit: u32,
    pub name: &'static str,
    pub desc: &'static str,
}

macro_rules! ev {
    ($id:ident, $kind:ident, $bit:expr, $name:literal, $desc:literal) => {
        EventInfo {
            id: EventId::$id,
            kind: EventType::$kind,
            bit: $bit,
            name: $name,
            desc: $desc,
        }
    };
}

/// Indexed by `EventId as usize`.
pub const EVENTS: &[EventInfo] = &[
    ev!(StackError, Global, 0, "STACK_ERROR", "Stack Error"),
    ev!(PpuError, Global, 1, "PPU_ERROR", "PPU Error"),
    ev!(IspError, Global, 2, "ISP_ERROR", "ISP Error"),
    ev!(SysReset, Global, 3, "SYS_RESET", "System Reset"),
    ev!(FwExc, Global, 4, "FW_EXC", "Firmware Exception"),
    ev!(FwNmi, Global, 5, "FW_NMI", "Firmware Non-Maskable Interrupt"),
    ev!(FwNonFatal, Global, 6, "FW_NON_FATAL", "Firmware Non-Fatal Error"),
    ev!(FwFatal, Global, 7, "FW_FATAL", "Firmware Fatal Error"),
    ev!(TwiMrpcComp, Global, 8, "TWI_MRPC_COMP", "TWI MRPC Completion"),
    ev!(
        TwiMrpcCompAsync,
        Global,
        9,
        "TWI_MRPC_COMP_ASYNC",
        "TWI MRPC Async Completion"
    ),
    ev!(CliMrpcComp, Global, 10, "CLI_MRPC_COMP", "CLI MRPC Completion"),
    ev!(
        CliMrpcCompAsync,
        Global,
        11,
        "CLI_MRPC_COMP_ASYNC",
        "CLI MRPC Async Completion"
    ),
    ev!(GpioInt, Global, 12, "GPIO_INT", "GPIO Interrupt"),
    ev!(PartReset, Partition, 0, "PART_RESET", "Partition Reset"),
    ev!(MrpcComp, Partition, 1, "MRPC_COMP", "MRPC Completion"),
    ev!(
        MrpcCompAsync,
        Partition,
        2,
        "MRPC_COMP_ASYNC",
        "MRPC Async Completion"
    ),
    ev!(
        DynPartBindComp,
        Partition,
        3,
        "DYN_PART_BIND_COMP",
        "Dynamic Partition Binding Completion"
    ),
    ev!(
        AerInP2p,
        Pff,
        0,
        "AER_IN_P2P",
        "Advanced Error Reporting in P2P Port"
    ),
    ev!(AerInVep, Pff, 1, "AER_IN_VEP", "Advanced Error Reporting in vEP"),
    ev!(Dpc, Pff, 2, "DPC", "Downstream Port Containment Event"),
    ev!(Cts, Pff, 3, "CTS", "Completion Timeout Synthesis Event"),
    ev!(Hotplug, Pff, 5, "HOTPLUG", "Hotplug Event"),
    ev!(Ier, Pff, 6, "IER", "Internal Error Reporting Event"),
    ev!(Thresh, Pff, 7, "THRESH", "Event Counter Threshold Reached"),
    ev!(PowerMgmt, Pff, 8, "POWER_MGMT", "Power Management Event"),
    ev!(TlpThrottling, Pff, 9, "TLP_THROTTLING", "TLP Throttling Event"),
    ev!(ForceSpeed, Pff, 10, "FORCE_SPEED", "Force Speed Error"),
    ev!(CreditTimeout, Pff, 11, "CREDIT_TIMEOUT", "Credit Timeout"),
    ev!(LinkState, Pff, 12, "LINK_STATE", "Link State Change Event"),
];

impl EventId {
    pub fn info(self) -> &'static EventInfo {
        &EVENTS[self as usize]
    }

    pub fn by_name(name: &str) -> Option<EventId> {
        EVENTS
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.id)
    }

    fn from_bit(kind: EventType, bit: u32) -> Option<EventId> {
        EVENTS
            .iter()
            .find(|e| e.kind == kind && e.bit == bit)
            .map(|e| e.id)
    }

    /// One bit per event, for selecting several events in a `u32`.
    pub fn mask(self) -> u32 {
        1 << self as u32
    }
}

/// Which partition or PFF an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventIndex {
    /// The partition the management endpoint is in.
    Local,
    /// Every partition or PFF.
    All,
    Index(usize),
}

impl EventIndex {
    /// The driver's encoding.
    pub fn raw(self) -> i32 {
        match self {
            EventIndex::Local => -1,
            EventIndex::All => -2,
            EventIndex::Index(i) => i as i32,
        }
    }
}

/// Flags for [`Switchtec::event_ctl`].
pub mod event_flags {
    pub const CLEAR: u32 = 1 << 0;
    pub const EN_POLL: u32 = 1 << 1;
    pub const EN_LOG: u32 = 1 << 2;
    pub const EN_CLI: u32 = 1 << 3;
    pub const EN_FATAL: u32 = 1 << 4;
    pub const DIS_POLL: u32 = 1 << 5;
    pub const DIS_LOG: u32 = 1 << 6;
    pub const DIS_CLI: u32 = 1 << 7;
    pub const DIS_FATAL: u32 = 1 << 8;
}

fn check_index(event: EventId, index: EventIndex) -> Result<()> {
    let info = event.info();
    match (info.kind, index) {
        (EventType::Global, _) => Ok(()),
        (_, EventIndex::All) => Ok(()),
        (EventType::Partition, EventIndex::Local) => Ok(()),
        (EventType::Partition, EventIndex::Index(i)) if i < MAX_PARTS => Ok(()),
        (EventType::Partition, EventIndex::Index(i)) => {
            Err(Error::PartitionOutOfRange(i))
        }
        (EventType::Pff, EventIndex::Index(i)) if i < MAX_PFF => Ok(()),
        (EventType::Pff, EventIndex::Index(i)) => Err(Error::PortOutOfRange(i)),
        (EventType::Pff, EventIndex::Local) => Err(Error::InvalidEventIndex {
            event: info.name,
            index: index.raw(),
        }),
    }
}

/// Which events are pending, one bit per event in the word for its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub global: u64,
    pub part_bitmap: u64,
    pub local_part: u32,
    pub part: Vec<u32>,
    pub pff: Vec<u32>,
}

impl Default for EventSummary {
    fn default() -> Self {
        Self {
            global: 0,
            part_bitmap: 0,
            local_part: 0,
            part: vec![0; MAX_PARTS],
            pff: vec![0; MAX_PFF],
        }
    }
}

fn push_bits(
    out: &mut Vec<(EventId, usize)>,
    kind: EventType,
    index: usize,
    mut word: u64,
) {
    while word != 0 {
        let bit = word.trailing_zeros();
        word &= word - 1;
        if let Some(e) = EventId::from_bit(kind, bit) {
            out.push((e, index));
        }
    }
}

impl EventSummary {
    /// Mark `event` at `index`.
    pub fn set(&mut self, event: EventId, index: EventIndex) -> Result<()> {
        check_index(event, index)?;
        let info = event.info();
        let bit = 1u32 << info.bit;

        match (info.kind, index) {
            (EventType::Global, _) => self.global |= bit as u64,
            (EventType::Partition, EventIndex::Local) => self.local_part |= bit,
            (EventType::Partition, EventIndex::All) => {
                self.part.iter_mut().for_each(|w| *w |= bit)
            }
            (EventType::Partition, EventIndex::Index(i)) => {
                if let Some(w) = self.part.get_mut(i) {
                    *w |= bit;
                }
            }
            (EventType::Pff, EventIndex::All) => {
                self.pff.iter_mut().for_each(|w| *w |= bit)
            }
            (EventType::Pff, EventIndex::Index(i)) => {
                if let Some(w) = self.pff.get_mut(i) {
                    *w |= bit;
                }
            }
            (EventType::Pff, EventIndex::Local) => {}
        }
        Ok(())
    }

    pub fn test(&self, event: EventId, index: usize) -> bool {
        let info = event.info();
        let bit = 1u32 << info.bit;
        match info.kind {
            EventType::Global => self.global & bit as u64 != 0,
            EventType::Partition => {
                self.part.get(index).is_some_and(|w| w & bit != 0)
            }
            EventType::Pff => self.pff.get(index).is_some_and(|w| w & bit != 0),
        }
    }

    /// Whether any event marked here is also marked in `other`.
    pub fn intersects(&self, other: &EventSummary) -> bool {
        let any = |a: &[u32], b: &[u32]| a.iter().zip(b).any(|(a, b)| a & b != 0);

        self.global & other.global != 0
            || self.part_bitmap & other.part_bitmap != 0
            || self.local_part & other.local_part != 0
            || any(&self.part, &other.part)
            || any(&self.pff, &other.pff)
    }

    /// Every marked event with its partition or PFF index: global events
    /// first, then partitions, then PFFs. Bits that name no known event
    /// are skipped.
    pub fn occurred(&self) -> Vec<(EventId, usize)> {
        let mut out = Vec::new();
        push_bits(&mut out, EventType::Global, 0, self.global);
        for (i, w) in self.part.iter().enumerate() {
            push_bits(&mut out, EventType::Partition, i, *w as u64);
        }
        for (i, w) in self.pff.iter().enumerate() {
            push_bits(&mut out, EventType::Pff, i, *w as u64);
        }
        out
    }
}

/// The driver side of event reporting.
pub trait EventTransport: Send {
    fn summary(&mut self) -> Result<EventSummary>;

    /// Apply `flags` to an event and return how many times it has fired.
    fn ctl(&mut self, event: EventId, index: EventIndex, flags: u32) -> Result<u32>;

    /// Block until an event with polling enabled fires. `None` waits
    /// forever. Returns `false` on timeout.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<bool>;

    /// Partition and port number of a PFF.
    fn pff_to_port(&mut self, pff: usize) -> Result<(u32, u32)>;

    fn port_to_pff(&mut self, partition: u32, port: u32) -> Result<usize>;
}

/// One pending event, as listed by [`Switchtec::events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EventRecord {
    /// `None` for global events.
    pub partition: Option<u32>,
    /// Set for PFF events; [`PFF_PORT_VEP`] for a virtual endpoint.
    pub port: Option<u32>,
    pub event: EventId,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventQuery {
    /// Include events outside the local partition, global ones among them.
    pub all_partitions: bool,
    /// Clear every event listed.
    pub clear_all: bool,
    /// Clear the listed events whose [`EventId::mask`] bit is set here.
    pub clear: u32,
    /// Only list events at this partition or PFF index.
    pub index: Option<usize>,
}

impl Switchtec {
    pub fn event_summary(&mut self) -> Result<EventSummary> {
        self.events_mut()?.summary()
    }

    /// Apply [`event_flags`] to one event. Returns its occurrence count.
    pub fn event_ctl(
        &mut self,
        event: EventId,
        index: EventIndex,
        flags: u32,
    ) -> Result<u32> {
        check_index(event, index)?;
        self.events_mut()?.ctl(event, index, flags)
    }

    pub fn event_wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.events_mut()?.wait(timeout)
    }

    /// Fetch the current summary and report whether any event marked in
    /// `chk` is pending in it.
    pub fn event_check(
        &mut self,
        chk: &EventSummary,
    ) -> Result<(bool, EventSummary)> {
        let res = self.event_summary()?;
        Ok((chk.intersects(&res), res))
    }

    /// Clear `event`, enable polling on it and block until it fires.
    ///
    /// Returns the summary read when it fired, or `None` once `timeout`
    /// has passed. Other events waking the wait are ignored.
    pub fn event_wait_for(
        &mut self,
        event: EventId,
        index: EventIndex,
        timeout: Option<Duration>,
    ) -> Result<Option<EventSummary>> {
        let mut wait_for = EventSummary::default();
        wait_for.set(event, index)?;

        self.event_ctl(event, index, event_flags::CLEAR | event_flags::EN_POLL)?;
        debug!(self.logger(), "waiting for event";
            "event" => event.info().name,
            "index" => index.raw(),
        );

        let start = Instant::now();
        loop {
            let remaining = timeout.map(|t| t.saturating_sub(start.elapsed()));
            if self.event_wait(remaining)? {
                let (hit, res) = self.event_check(&wait_for)?;
                if hit {
                    return Ok(Some(res));
                }
            }
            if timeout.is_some_and(|t| start.elapsed() >= t) {
                return Ok(None);
            }
        }
    }

    pub fn pff_to_port(&mut self, pff: usize) -> Result<(u32, u32)> {
        self.events_mut()?.pff_to_port(pff)
    }

    pub fn port_to_pff(&mut self, partition: u32, port: u32) -> Result<usize> {
        self.events_mut()?.port_to_pff(partition, port)
    }

    /// Read the count of every event pending in `sum` that `query`
    /// selects, clearing the ones it asks to. Ordered by partition, port
    /// and then event.
    pub fn events(
        &mut self,
        sum: &EventSummary,
        query: &EventQuery,
    ) -> Result<Vec<EventRecord>> {
        let local = self.partition() as u32;
        let mut out = Vec::new();

        for (event, idx) in sum.occurred() {
            if query.index.is_some_and(|i| i != idx) {
                continue;
            }

            let (partition, port) = match event.info().kind {
                EventType::Global => (None, None),
                EventType::Partition => (Some(idx as u32), None),
                EventType::Pff => {
                    let (part, port) = self.pff_to_port(idx)?;
                    (Some(part), Some(port))
                }
            };
            if !query.all_partitions && partition != Some(local) {
                continue;
            }

            let flags = if query.clear_all || query.clear & event.mask() != 0 {
                event_flags::CLEAR
            } else {
                0
            };
            let count = self.event_ctl(event, EventIndex::Index(idx), flags)?;

            out.push(EventRecord {
                partition,
                port,
                event,
                count,
            });
        }

        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::device::{mock_device, Generation};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct State {
        pub summaries: VecDeque<EventSummary>,
        pub waits: VecDeque<bool>,
        pub counts: VecDeque<u32>,
        pub pff_ports: HashMap<usize, (u32, u32)>,
        pub ctl_calls: Vec<(EventId, EventIndex, u32)>,
        pub wait_calls: Vec<Option<Duration>>,
    }

    /// Scripted events. Exhausted scripts answer with an empty summary,
    /// a timed-out wait and a zero count.
    #[derive(Clone, Default)]
    pub struct MockEvents {
        pub state: Arc<Mutex<State>>,
    }

    impl MockEvents {
        pub fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
            f(&mut self.state.lock().unwrap())
        }
    }

    impl EventTransport for MockEvents {
        fn summary(&mut self) -> Result<EventSummary> {
            Ok(self.with(|s| s.summaries.pop_front().unwrap_or_default()))
        }

        fn ctl(&mut self, event: EventId, index: EventIndex, flags: u32) -> Result<u32> {
            self.with(|s| {
                s.ctl_calls.push((event, index, flags));
                Ok(s.counts.pop_front().unwrap_or(0))
            })
        }

        fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
            self.with(|s| {
                s.wait_calls.push(timeout);
                Ok(s.waits.pop_front().unwrap_or(false))
            })
        }

        fn pff_to_port(&mut self, pff: usize) -> Result<(u32, u32)> {
            self.with(|s| s.pff_ports.get(&pff).copied())
                .ok_or(Error::PortOutOfRange(pff))
        }

        fn port_to_pff(&mut self, partition: u32, port: u32) -> Result<usize> {
            self.with(|s| {
                s.pff_ports
                    .iter()
                    .find(|(_, v)| **v == (partition, port))
                    .map(|(k, _)| *k)
            })
            .ok_or(Error::PortOutOfRange(port as usize))
        }
    }

    pub fn mock_event_device() -> (Switchtec, MockEvents) {
        let (dev, _) = mock_device(Generation::Gen4);
        let events = MockEvents::default();
        (dev.with_events(Box::new(events.clone())), events)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::mock_event_device;
    use super::*;
    use crate::device::{mock_device, Generation};

    #[test]
    fn table_is_indexed_by_id() {
        assert_eq!(EVENTS.len(), EventId::LinkState as usize + 1);
        for (i, e) in EVENTS.iter().enumerate() {
            assert_eq!(e.id as usize, i, "{}", e.name);
        }
        assert_eq!(EventId::by_name("thresh"), Some(EventId::Thresh));
        assert_eq!(EventId::by_name("LINK_STATE"), Some(EventId::LinkState));
        assert_eq!(EventId::by_name("nope"), None);
    }

    #[test]
    fn summary_set_and_list() {
        let mut sum = EventSummary::default();
        sum.set(EventId::Thresh, EventIndex::All).unwrap();
        sum.set(EventId::PartReset, EventIndex::Index(3)).unwrap();
        sum.set(EventId::SysReset, EventIndex::Index(99)).unwrap();

        assert!(sum.pff.iter().all(|w| *w == 1 << 7));
        assert!(sum.test(EventId::PartReset, 3));
        assert!(!sum.test(EventId::PartReset, 2));
        assert!(sum.test(EventId::SysReset, 0));

        let listed = sum.occurred();
        assert_eq!(listed.len(), 2 + MAX_PFF);
        assert_eq!(listed[0], (EventId::SysReset, 0));
        assert_eq!(listed[1], (EventId::PartReset, 3));
        assert_eq!(listed[2], (EventId::Thresh, 0));
        assert_eq!(listed[2 + MAX_PFF - 1], (EventId::Thresh, MAX_PFF - 1));
    }

    #[test]
    fn bad_indices_are_rejected() {
        let mut sum = EventSummary::default();
        assert!(matches!(
            sum.set(EventId::Thresh, EventIndex::Local),
            Err(Error::InvalidEventIndex { .. })
        ));
        assert!(sum.set(EventId::Thresh, EventIndex::Index(MAX_PFF)).is_err());
        assert!(sum
            .set(EventId::MrpcComp, EventIndex::Index(MAX_PARTS))
            .is_err());
        assert_eq!(sum, EventSummary::default());

        let (mut dev, events) = mock_event_device();
        assert!(dev
            .event_ctl(EventId::Hotplug, EventIndex::Index(300), 0)
            .is_err());
        assert!(events.with(|s| s.ctl_calls.is_empty()));
    }

    #[test]
    fn unknown_bits_are_skipped() {
        let mut sum = EventSummary::default();
        sum.pff[0] = 1 << 4;
        sum.global = 1 << 40;
        assert!(sum.occurred().is_empty());
    }

    #[test]
    fn wait_for_ignores_unrelated_wakeups() {
        let (mut dev, events) = mock_event_device();
        let mut unrelated = EventSummary::default();
        unrelated.pff[5] = 1 << EventId::Hotplug.info().bit;
        let mut hit = EventSummary::default();
        hit.pff[5] = 1 << EventId::Thresh.info().bit;

        events.with(|s| {
            s.waits.extend([false, true, true]);
            s.summaries.extend([unrelated, hit.clone()]);
        });

        let res = dev
            .event_wait_for(EventId::Thresh, EventIndex::All, None)
            .unwrap();
        assert_eq!(res, Some(hit));

        events.with(|s| {
            assert_eq!(
                s.ctl_calls,
                vec![(
                    EventId::Thresh,
                    EventIndex::All,
                    event_flags::CLEAR | event_flags::EN_POLL
                )]
            );
            assert_eq!(s.wait_calls, vec![None, None, None]);
        });
    }

    #[test]
    fn wait_for_times_out() {
        let (mut dev, events) = mock_event_device();
        let res = dev
            .event_wait_for(EventId::LinkState, EventIndex::Index(2), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(res, None);
        events.with(|s| {
            assert_eq!(s.wait_calls, vec![Some(Duration::ZERO)]);
            assert_eq!(s.ctl_calls.len(), 1);
        });
    }

    #[test]
    fn events_are_filtered_cleared_and_sorted() {
        let (mut dev, events) = mock_event_device();
        let mut sum = EventSummary::default();
        sum.set(EventId::SysReset, EventIndex::All).unwrap();
        sum.set(EventId::MrpcComp, EventIndex::Index(0)).unwrap();
        sum.set(EventId::PartReset, EventIndex::Index(2)).unwrap();
        sum.set(EventId::LinkState, EventIndex::Index(4)).unwrap();
        sum.set(EventId::Hotplug, EventIndex::Index(4)).unwrap();

        events.with(|s| {
            s.pff_ports.insert(4, (0, 3));
            s.counts.extend([7, 2, 9]);
        });

        let query = EventQuery {
            clear: EventId::Hotplug.mask(),
            ..Default::default()
        };
        let res = dev.events(&sum, &query).unwrap();
        assert_eq!(
            res,
            vec![
                EventRecord {
                    partition: Some(0),
                    port: None,
                    event: EventId::MrpcComp,
                    count: 7,
                },
                EventRecord {
                    partition: Some(0),
                    port: Some(3),
                    event: EventId::Hotplug,
                    count: 2,
                },
                EventRecord {
                    partition: Some(0),
                    port: Some(3),
                    event: EventId::LinkState,
                    count: 9,
                },
            ]
        );

        events.with(|s| {
            let flags: Vec<(EventId, u32)> =
                s.ctl_calls.iter().map(|(e, _, f)| (*e, *f)).collect();
            assert_eq!(
                flags,
                vec![
                    (EventId::MrpcComp, 0),
                    (EventId::Hotplug, event_flags::CLEAR),
                    (EventId::LinkState, 0),
                ]
            );
        });

        let all = dev
            .events(
                &sum,
                &EventQuery {
                    all_partitions: true,
                    clear_all: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].event, EventId::SysReset);
        assert_eq!(all[0].partition, None);
        assert_eq!(all[4].partition, Some(2));
        assert!(events.with(|s| s.ctl_calls[3..]
            .iter()
            .all(|(_, _, f)| *f == event_flags::CLEAR)));
    }

    #[test]
    fn without_an_event_channel_it_is_unsupported() {
        let (mut dev, _) = mock_device(Generation::Gen4);
        assert!(matches!(
            dev.event_summary(),
            Err(Error::Unsupported(_))
        ));
        assert!(dev.evcntr_wait(None).is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text rendering for command output.

use std::fmt::Write;
use switchtec::events::{EventRecord, PFF_PORT_VEP};
use switchtec::pmon::{evcntr_type_names, evtype, EvcntrSetup};
use switchtec::status::PortId;
use switchtec::UNBOUND_PORT;

const SI_SUFFIXES: [&str; 5] = ["", "k", "M", "G", "T"];

/// Scale `value` by powers of 1000 and return the matching SI prefix.
pub fn suffix_si(value: f64) -> (f64, &'static str) {
    let mut v = value;
    let mut i = 0;
    while v.abs() >= 1000.0 && i < SI_SUFFIXES.len() - 1 {
        v /= 1000.0;
        i += 1;
    }
    (v, SI_SUFFIXES[i])
}

/// Three significant digits with trailing zeros dropped.
pub fn sig3(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return "0".to_string();
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (2 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, v);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Byte count with an SI prefix, e.g. `1.23 MB`.
pub fn bytes_si(bytes: u64) -> String {
    let (v, suffix) = suffix_si(bytes as f64);
    format!("{} {}B", sig3(v), suffix)
}

/// Rate over an interval, e.g. `512 kB/s`.
pub fn rate_si(bytes: u64, time_us: u64) -> String {
    let rate = if time_us == 0 {
        0.0
    } else {
        bytes as f64 / (time_us as f64 * 1e-6)
    };
    let (v, suffix) = suffix_si(rate);
    format!("{} {}B/s", sig3(v), suffix)
}

/// Render a port mask as `ALL` or a list with ranges collapsed (`0,2-4`).
pub fn port_mask_to_string(mask: u8) -> String {
    if mask == 0xFF {
        return "ALL".to_string();
    }

    let mut parts = Vec::new();
    let mut bit = 0;
    while bit < 8 {
        if mask & (1 << bit) == 0 {
            bit += 1;
            continue;
        }
        let start = bit;
        while bit < 8 && mask & (1 << bit) != 0 {
            bit += 1;
        }
        match bit - 1 - start {
            0 => parts.push(format!("{}", start)),
            _ => parts.push(format!("{}-{}", start, bit - 1)),
        }
    }
    parts.join(",")
}

pub fn type_mask_to_string(mask: u32) -> String {
    evcntr_type_names(mask).join(",")
}

/// Prints the partition / port heading before each port's details, emitting
/// the partition line only when it changes.
pub struct PortTitles {
    local_partition: u8,
    last_partition: Option<u8>,
}

impl PortTitles {
    pub fn new(local_partition: u8) -> Self {
        Self {
            local_partition,
            last_partition: None,
        }
    }

    pub fn title(&mut self, p: &PortId) -> String {
        let mut out = String::new();

        if self.last_partition != Some(p.partition) {
            if p.partition == UNBOUND_PORT {
                out.push_str("Unbound Ports:\n");
            } else {
                let local = if p.partition == self.local_partition {
                    "    (LOCAL)"
                } else {
                    ""
                };
                let _ = writeln!(out, "Partition {}:{}", p.partition, local);
            }
        }
        self.last_partition = Some(p.partition);

        if p.partition == UNBOUND_PORT {
            let _ = write!(
                out,
                "    Phys Port ID {}  (Stack {}, Port {})",
                p.phys_id, p.stack, p.stk_id
            );
        } else {
            let _ = write!(
                out,
                "    Logical Port ID {} ({}):",
                p.log_id,
                if p.upstream { "USP" } else { "DSP" }
            );
        }
        out
    }
}

/// One row of the event counter table.
pub fn evcntr_row(index: usize, setup: &EvcntrSetup, count: u32) -> String {
    let mut types = type_mask_to_string(setup.type_mask);
    if types.len() > 39 {
        types = "MANY".to_string();
    }
    format!(
        "   {:2} - {:<11}{:<40}   {:10}",
        index,
        port_mask_to_string(setup.port_mask),
        types,
        count
    )
}

pub fn evcntr_details(stack: u8, counter: usize, setup: &EvcntrSetup) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Stack:     {}", stack);
    let _ = writeln!(out, "Counter:   {}", counter);

    if setup.port_mask == 0 || setup.type_mask == 0 {
        out.push_str("Not Configured.\n");
        return out;
    }

    if setup.threshold != 0 {
        let _ = writeln!(out, "Threshold: {}", setup.threshold);
    }
    let _ = writeln!(out, "Ports:     {}", port_mask_to_string(setup.port_mask));
    let _ = writeln!(out, "Events:    {}", type_mask_to_string(setup.type_mask));
    if setup.type_mask & evtype::ALL_TLPS != 0 {
        let dir = if setup.egress { "EGRESS" } else { "INGRESS" };
        let _ = writeln!(out, "Direction: {}", dir);
    }
    out
}

/// Pending events grouped under partition and port headings. Expects the
/// records in the order [`switchtec::Switchtec::events`] returns them.
pub fn event_list(records: &[EventRecord]) -> String {
    let mut out = String::new();
    let mut last: Option<(Option<u32>, Option<u32>)> = None;

    for r in records {
        let prev = last.replace((r.partition, r.port));
        let new_partition = prev.map(|p| p.0) != Some(r.partition);
        if new_partition {
            match r.partition {
                None => out.push_str("Global Events:\n"),
                Some(p) => {
                    let _ = writeln!(out, "Partition {} Events:", p);
                }
            }
        }
        if new_partition || prev.map(|p| p.1) != Some(r.port) {
            match r.port {
                Some(PFF_PORT_VEP) => out.push_str("    Port VEP:\n"),
                Some(p) => {
                    let _ = writeln!(out, "    Port {}:", p);
                }
                None => {}
            }
        }

        let info = r.event.info();
        let _ = writeln!(out, "\t{:<22}\t{:<4}\t{}", info.name, r.count, info.desc);
    }
    out
}

/// Whether the locale can show a degree sign.
pub fn utf8_locale() -> bool {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|v| std::env::var(v).ok())
        .find(|v| !v.is_empty())
        .map(|v| {
            let v = v.to_ascii_lowercase();
            v.contains("utf-8") || v.contains("utf8")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_masks_collapse_ranges() {
        assert_eq!(port_mask_to_string(0xFF), "ALL");
        assert_eq!(port_mask_to_string(0b0001_1101), "0,2-4");
        assert_eq!(port_mask_to_string(0b1000_0000), "7");
        assert_eq!(port_mask_to_string(0b1100_0011), "0-1,6-7");
        assert_eq!(port_mask_to_string(0), "");
    }

    #[test]
    fn type_masks_use_group_names() {
        assert_eq!(type_mask_to_string(evtype::ALL), "ALL");
        assert_eq!(
            type_mask_to_string(evtype::ALL_TLPS | evtype::BAD_DLLP),
            "ALL_TLPS,BAD_DLLP"
        );
    }

    #[test]
    fn long_type_lists_are_abbreviated() {
        let setup = EvcntrSetup {
            port_mask: 0x01,
            type_mask: evtype::UNSUP_REQ_ERR
                | evtype::ECRC_ERR
                | evtype::MALFORM_TLP_ERR
                | evtype::RCVR_OFLOW_ERR,
            egress: false,
            threshold: 0,
        };
        let row = evcntr_row(3, &setup, 17);
        assert!(row.starts_with("    3 - 0          MANY"));
        assert!(row.ends_with("        17"));
    }

    #[test]
    fn si_formatting() {
        assert_eq!(bytes_si(0), "0 B");
        assert_eq!(bytes_si(999), "999 B");
        assert_eq!(bytes_si(1500), "1.5 kB");
        assert_eq!(bytes_si(12_345_678), "12.3 MB");
        assert_eq!(rate_si(2_000_000, 1_000_000), "2 MB/s");
        assert_eq!(rate_si(5, 0), "0 B/s");
    }

    #[test]
    fn partition_heading_printed_once() {
        let mut t = PortTitles::new(0);
        let usp = PortId {
            partition: 0,
            upstream: true,
            ..Default::default()
        };
        let dsp = PortId {
            partition: 0,
            log_id: 1,
            ..Default::default()
        };
        let unbound = PortId {
            partition: UNBOUND_PORT,
            stack: 1,
            stk_id: 2,
            phys_id: 10,
            ..Default::default()
        };
        assert_eq!(
            t.title(&usp),
            "Partition 0:    (LOCAL)\n    Logical Port ID 0 (USP):"
        );
        assert_eq!(t.title(&dsp), "    Logical Port ID 1 (DSP):");
        assert_eq!(
            t.title(&unbound),
            "Unbound Ports:\n    Phys Port ID 10  (Stack 1, Port 2)"
        );
    }

    #[test]
    fn event_list_headings() {
        use switchtec::EventId;

        let rec = |partition, port, event, count| EventRecord {
            partition,
            port,
            event,
            count,
        };
        let out = event_list(&[
            rec(None, None, EventId::SysReset, 1),
            rec(Some(0), None, EventId::MrpcComp, 12),
            rec(Some(0), Some(3), EventId::LinkState, 2),
            rec(Some(0), Some(3), EventId::Hotplug, 1),
            rec(Some(1), Some(PFF_PORT_VEP), EventId::AerInVep, 4),
        ]);
        assert_eq!(
            out,
            "Global Events:\n\
             \tSYS_RESET             \t1   \tSystem Reset\n\
             Partition 0 Events:\n\
             \tMRPC_COMP             \t12  \tMRPC Completion\n\
             \x20   Port 3:\n\
             \tLINK_STATE            \t2   \tLink State Change Event\n\
             \tHOTPLUG               \t1   \tHotplug Event\n\
             Partition 1 Events:\n\
             \x20   Port VEP:\n\
             \tAER_IN_VEP            \t4   \tAdvanced Error Reporting in vEP\n"
        );
    }

    #[test]
    fn unconfigured_counter_details() {
        let s = evcntr_details(2, 5, &EvcntrSetup::default());
        assert_eq!(s, "Stack:     2\nCounter:   5\nNot Configured.\n");

        let s = evcntr_details(
            0,
            1,
            &EvcntrSetup {
                port_mask: 0xFF,
                type_mask: evtype::POSTED_TLP,
                egress: true,
                threshold: 10,
            },
        );
        assert!(s.contains("Threshold: 10\n"));
        assert!(s.contains("Ports:     ALL\n"));
        assert!(s.contains("Events:    POSTED_TLP\n"));
        assert!(s.ends_with("Direction: EGRESS\n"));
    }
}

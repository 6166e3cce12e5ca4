// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Argument parsing helpers shared by the `switchtec` binary.

use anyhow::{bail, Result};
use slog::Level;
use std::io::{self, BufRead, Write};
use switchtec::pmon::EvcntrType;
use switchtec::EventId;

pub fn get_styles() -> clap::builder::Styles {
    use anstyle::{AnsiColor, Color, Style};

    let bold = |c: AnsiColor| Style::new().bold().fg_color(Some(Color::Ansi(c)));

    clap::builder::Styles::styled()
        .header(bold(AnsiColor::Yellow).underline())
        .usage(bold(AnsiColor::Yellow).underline())
        .literal(bold(AnsiColor::Green))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
        .error(bold(AnsiColor::Red))
        .valid(bold(AnsiColor::Green))
        .invalid(bold(AnsiColor::Red))
}

pub fn level_from_str(s: &str) -> Result<Level> {
    if let Ok(level) = s.parse() {
        Ok(level)
    } else {
        bail!(format!("Invalid log level: {}", s))
    }
}

/// Parse a number in decimal or `0x` hex, optionally followed by a binary
/// size suffix (`k`, `M`, `G`).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 10),
        Some((i, 'm' | 'M')) => (&s[..i], 20),
        Some((i, 'g' | 'G')) => (&s[..i], 30),
        _ => (s, 0),
    };

    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse(),
    };

    match value.ok().and_then(|v| v.checked_mul(1 << shift)) {
        Some(v) => Ok(v),
        None => bail!("invalid number: {}", s),
    }
}

/// A single dword given in hex with a `0x` prefix.
pub fn parse_dword(s: &str) -> Result<u32> {
    let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        bail!("expected a hex dword prefixed with 0x, found {}", s);
    };
    Ok(u32::from_str_radix(hex, 16)?)
}

/// Parse a port mask written as `0xXX` or as a list like `0,2,4-6`.
pub fn parse_port_mask(s: &str) -> Result<u8> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return Ok(u8::from_str_radix(hex, 16)?);
    }

    let mut mask = 0u8;
    for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        let (lo, hi) = match item.split_once('-') {
            Some((lo, hi)) => (lo.trim().parse::<u32>()?, hi.trim().parse::<u32>()?),
            None => {
                let p = item.parse::<u32>()?;
                (p, p)
            }
        };
        if lo > hi || hi > 7 {
            bail!("invalid port range {}; ports are 0-7", item);
        }
        for p in lo..=hi {
            mask |= 1 << p;
        }
    }
    Ok(mask)
}

pub fn parse_event_type(s: &str) -> Result<u32> {
    match EvcntrType::by_name(s) {
        Some(t) => Ok(t.mask),
        None => bail!("unknown event type {}", s),
    }
}

/// Switch event by its driver name, e.g. `LINK_STATE`.
pub fn parse_event_id(s: &str) -> Result<EventId> {
    match EventId::by_name(s) {
        Some(e) => Ok(e),
        None => bail!("unknown event {}", s),
    }
}

/// Prompt on stderr and read a yes/no answer. Anything but `y` declines.
pub fn ask_if_sure(always_yes: bool) -> io::Result<bool> {
    if always_yes {
        return Ok(true);
    }

    eprint!("Do you want to continue? [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim_end_matches('\n'), "y" | "Y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchtec::pmon::evtype;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("2M").unwrap(), 2 << 20);
        assert_eq!(parse_size("0x10k").unwrap(), 16 << 10);
        assert!(parse_size("").is_err());
        assert!(parse_size("12q").is_err());
    }

    #[test]
    fn port_masks() {
        assert_eq!(parse_port_mask("0xff").unwrap(), 0xFF);
        assert_eq!(parse_port_mask("0x05").unwrap(), 0x05);
        assert_eq!(parse_port_mask("0,2").unwrap(), 0b101);
        assert_eq!(parse_port_mask("1-3,7").unwrap(), 0b1000_1110);
        assert!(parse_port_mask("8").is_err());
        assert!(parse_port_mask("3-1").is_err());
        assert!(parse_port_mask("0x100").is_err());
    }

    #[test]
    fn dwords_need_a_prefix() {
        assert_eq!(parse_dword("0xdeadbeef").unwrap(), 0xDEAD_BEEF);
        assert!(parse_dword("deadbeef").is_err());
        assert!(parse_dword("0x1_0000_0000").is_err());
    }

    #[test]
    fn event_names() {
        assert_eq!(parse_event_type("bad_tlp").unwrap(), evtype::BAD_TLP);
        assert_eq!(parse_event_type("ALL_TLPS").unwrap(), evtype::ALL_TLPS);
        assert!(parse_event_type("NOPE").is_err());

        assert_eq!(parse_event_id("link_state").unwrap(), EventId::LinkState);
        assert_eq!(parse_event_id("THRESH").unwrap(), EventId::Thresh);
        assert!(parse_event_id("BAD_TLP").is_err());
    }

    #[test]
    fn log_levels() {
        assert_eq!(level_from_str("debug").unwrap(), Level::Debug);
        assert!(level_from_str("loud").is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonical hex+ASCII dump in the style of `hd`, fed in blocks so a large
//! register space can be streamed.

use std::io::{self, Write};

const LINE: usize = 16;

pub struct HexDump {
    addr: u64,
    last: Option<[u8; LINE]>,
    squeezed: bool,
}

impl HexDump {
    pub fn new(start: u64) -> Self {
        Self {
            addr: start,
            last: None,
            squeezed: false,
        }
    }

    /// Dump `data`. Every block except the final one should be a multiple
    /// of 16 bytes long so lines stay aligned.
    pub fn feed<W: Write>(&mut self, out: &mut W, data: &[u8]) -> io::Result<()> {
        for line in data.chunks(LINE) {
            let full: Option<[u8; LINE]> = line.try_into().ok();

            match full {
                Some(l) if self.last == Some(l) => {
                    if !self.squeezed {
                        writeln!(out, "*")?;
                        self.squeezed = true;
                    }
                }
                _ => {
                    print_line(out, self.addr, line)?;
                    self.squeezed = false;
                }
            }

            self.last = full;
            self.addr += line.len() as u64;
        }
        Ok(())
    }

    /// Print the trailing end address.
    pub fn finish<W: Write>(self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{:08x}", self.addr)
    }
}

fn print_line<W: Write>(out: &mut W, addr: u64, bytes: &[u8]) -> io::Result<()> {
    write!(out, "{:08x} ", addr)?;
    for (i, b) in bytes.iter().enumerate() {
        if i == 8 {
            write!(out, " ")?;
        }
        write!(out, " {:02x}", b)?;
    }
    for _ in bytes.len()..LINE {
        write!(out, "   ")?;
    }

    write!(out, "  |")?;
    for b in bytes {
        let c = if b.is_ascii_graphic() || *b == b' ' {
            *b as char
        } else {
            '.'
        };
        write!(out, "{}", c)?;
    }
    writeln!(out, "|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(blocks: &[&[u8]]) -> String {
        let mut out = Vec::new();
        let mut hd = HexDump::new(0);
        for b in blocks {
            hd.feed(&mut out, b).unwrap();
        }
        hd.finish(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn single_line() {
        let data: Vec<u8> = (0x41..0x51).collect();
        assert_eq!(
            dump(&[&data]),
            "00000000  41 42 43 44 45 46 47 48  49 4a 4b 4c 4d 4e 4f 50  \
             |ABCDEFGHIJKLMNOP|\n00000010\n"
        );
    }

    #[test]
    fn repeated_lines_are_squeezed() {
        let zeros = [0u8; 64];
        let out = dump(&[&zeros[..32], &zeros[32..], &[1, 2]]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("00000000  00 00"));
        assert_eq!(lines[1], "*");
        assert!(lines[2].starts_with("00000040  01 02 "));
        assert!(lines[2].ends_with("|..|"));
        assert_eq!(lines[3], "00000042");
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Little-endian builders and readers for the byte-packed MRPC command and
//! reply structures. Field order and widths are the only layout; there is
//! never any padding.

#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn zeros(mut self, n: usize) -> Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields off the front of a reply buffer. Reads past the end yield
/// zeros; callers size their reply buffers from the struct layout so that
/// never happens for well-formed replies.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let end = (self.pos + N).min(self.buf.len());
        if self.pos < end {
            out[..end - self.pos].copy_from_slice(&self.buf[self.pos..end]);
        }
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    pub fn skip(&mut self, n: usize) -> &mut Self {
        self.pos += n;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_packed_little_endian() {
        let buf = Encoder::new()
            .u8(0xAA)
            .u16(0x0102)
            .u32(0x0304_0506)
            .zeros(1)
            .finish();
        assert_eq!(buf, [0xAA, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0x00]);
    }

    #[test]
    fn decoder_reads_in_order_and_pads_short_input() {
        let mut d = Decoder::new(&[0x34, 0x12, 0x78, 0x56, 0x01]);
        assert_eq!(d.u16(), 0x1234);
        assert_eq!(d.u16(), 0x5678);
        assert_eq!(d.u32(), 0x01);
        assert_eq!(d.position(), 8);
    }
}

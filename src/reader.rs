use crate::source::ReadAt;
use crate::Error;
use crate::Result;


/// The byte order used for multi-byte reads.
///
/// The order is established once, while the file header is parsed, and
/// never changes afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ByteOrder {
    Little,
    Big,
}

/// Typed reads at absolute offsets on top of a [`ReadAt`] source.
///
/// All reads use per-call stack scratch buffers, so a shared `Reader`
/// can serve concurrent callers as long as the source can.
#[derive(Debug)]
pub(crate) struct Reader<S> {
    source: S,
    order: ByteOrder,
}

impl<S> Reader<S>
where
    S: ReadAt,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            order: ByteOrder::Little,
        }
    }

    #[cfg(test)]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Flip the current byte order. Only meaningful while the header is
    /// being parsed; the order is immutable afterwards.
    pub fn flip_order(&mut self) {
        self.order = match self.order {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
    }

    /// Fill `buf` from the source, failing with `ShortRead` if the data
    /// ends early.
    fn read_exact(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut pos = 0;
        while pos < buf.len() {
            let cnt = self.source.read_at(&mut buf[pos..], offset + pos as u64)?;
            if cnt == 0 {
                return Err(Error::ShortRead {
                    offset: offset + pos as u64,
                })
            }
            pos += cnt;
        }
        Ok(())
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        let mut buf = [0u8; 1];
        let () = self.read_exact(&mut buf, offset)?;
        Ok(buf[0])
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        let mut buf = [0u8; 2];
        let () = self.read_exact(&mut buf, offset)?;
        let value = match self.order {
            ByteOrder::Little => u16::from_le_bytes(buf),
            ByteOrder::Big => u16::from_be_bytes(buf),
        };
        Ok(value)
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        let () = self.read_exact(&mut buf, offset)?;
        let value = match self.order {
            ByteOrder::Little => u32::from_le_bytes(buf),
            ByteOrder::Big => u32::from_be_bytes(buf),
        };
        Ok(value)
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        let () = self.read_exact(&mut buf, offset)?;
        let value = match self.order {
            ByteOrder::Little => u64::from_le_bytes(buf),
            ByteOrder::Big => u64::from_be_bytes(buf),
        };
        Ok(value)
    }

    /// Read `buf.len()` raw bytes at `offset`.
    pub fn read_bytes(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.read_exact(buf, offset)
    }

    /// Read a NUL terminated UTF-8 string at `offset`.
    ///
    /// The scan is bounded by the end of the source; running into it
    /// before a NUL fails with `ShortRead`.
    pub fn read_cstring(&self, offset: u64) -> Result<String> {
        let mut data = Vec::new();
        let mut buf = [0u8; 32];
        let mut off = offset;

        loop {
            let cnt = self.source.read_at(&mut buf, off)?;
            if cnt == 0 {
                return Err(Error::ShortRead { offset: off })
            }
            if let Some(idx) = buf[..cnt].iter().position(|byte| *byte == 0) {
                let () = data.extend_from_slice(&buf[..idx]);
                break
            }
            let () = data.extend_from_slice(&buf[..cnt]);
            off += cnt as u64;
        }

        String::from_utf8(data).map_err(|err| Error::BadString(err.utf8_error()))
    }

    /// Read a DWARF style unsigned LEB128 value at `offset`, returning
    /// the value and the number of bytes consumed.
    //
    // Slightly adjusted copy of `rustc` implementation:
    // https://github.com/rust-lang/rust/blob/7ebd2bdbf6d798e6e711a0100981b0ff029abf5f/compiler/rustc_serialize/src/leb128.rs#L54
    pub fn read_uleb128(&self, offset: u64) -> Result<(u64, u64)> {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut cnt = 0u64;

        loop {
            let byte = self.read_u8(offset + cnt)?;
            cnt += 1;
            let bits = u64::from(byte & 0x7f);
            if shift >= u64::BITS || (shift == 63 && bits > 1) {
                return Err(Error::LebOverflow { offset })
            }
            result |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok((result, cnt))
            }
            shift += 7;
        }
    }

    /// Read a DWARF style signed LEB128 value at `offset`, returning
    /// the value and the number of bytes consumed.
    pub fn read_sleb128(&self, offset: u64) -> Result<(i64, u64)> {
        let mut result = 0i64;
        let mut shift = 0u32;
        let mut cnt = 0u64;
        let mut byte;

        loop {
            byte = self.read_u8(offset + cnt)?;
            cnt += 1;
            if shift >= i64::BITS {
                return Err(Error::LebOverflow { offset })
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;

            if byte & 0x80 == 0 {
                break
            }
        }

        if shift < i64::BITS && byte & 0x40 != 0 {
            // sign extend
            result |= !0 << shift;
        }

        Ok((result, cnt))
    }
}

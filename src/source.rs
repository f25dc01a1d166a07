use std::fs::File;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// A source of bytes addressable by absolute offset.
///
/// This is the only capability the decoder requires of its input:
/// positional reads that do not mutate any shared cursor. An in-memory
/// slice, an open file, and a memory mapping all qualify, and all of
/// them can serve concurrent readers.
pub trait ReadAt {
    /// Read bytes at `offset` into `buf`, returning the number of bytes
    /// read.
    ///
    /// A return value of zero indicates end-of-data. Reads past the end
    /// are not an error; they simply return fewer bytes (or zero).
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0)
        };
        if offset >= self.len() {
            return Ok(0)
        }

        let data = &self[offset..];
        let cnt = data.len().min(buf.len());
        let () = buf[..cnt].copy_from_slice(&data[..cnt]);
        Ok(cnt)
    }
}

impl ReadAt for &[u8] {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl ReadAt for Vec<u8> {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::os::unix::io::AsRawFd as _;
use std::path::Path;
use std::ptr::null_mut;
use std::slice;

use crate::source::ReadAt;
use crate::Error;
use crate::Result;


/// A read-only memory mapping of an entire file.
#[derive(Debug)]
pub struct Mmap {
    ptr: *mut libc::c_void,
    len: usize,
}

impl Mmap {
    /// Memory map the file at the provided `path`.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Self::map(&file)
    }

    /// Map the provided file into memory, in its entirety.
    pub fn map(file: &File) -> Result<Self> {
        let len = libc::size_t::try_from(file.metadata()?.len())
            .map_err(|_err| Error::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;

        // The kernel does not allow mmap'ing a region of size 0. We
        // want to enable this case transparently, though.
        if len == 0 {
            return Ok(Self {
                ptr: null_mut(),
                len: 0,
            })
        }

        let offset = 0;
        // SAFETY: `mmap` with the provided arguments is always safe to call.
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                offset,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::from(io::Error::last_os_error()))
        }

        Ok(Self { ptr, len })
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        if self.ptr.is_null() {
            &[]
        } else {
            // SAFETY: We know that the pointer is valid and represents a region of
            //         `len` bytes.
            unsafe { slice::from_raw_parts(self.ptr.cast(), self.len) }
        }
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: The `ptr` is valid.
            let rc = unsafe { libc::munmap(self.ptr, self.len) };
            #[rustfmt::skip]
            assert!(rc == 0, "unable to unmap mmap: {}", io::Error::last_os_error());
        }
    }
}

// SAFETY: The mapping is read-only for its entire lifetime.
unsafe impl Send for Mmap {}
// SAFETY: All accesses to the mapped region are immutable.
unsafe impl Sync for Mmap {}

impl ReadAt for Mmap {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.deref().read_at(buf, offset)
    }
}

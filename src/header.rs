use std::fmt::Write as _;

use crate::reader::Reader;
use crate::source::ReadAt;
use crate::Error;
use crate::Result;

pub(crate) const GSYM_MAGIC: u32 = 0x4753594d;
pub(crate) const GSYM_CIGAM: u32 = 0x4d595347;
pub(crate) const GSYM_VERSION: u16 = 1;
pub(crate) const GSYM_MAX_UUID_SIZE: u8 = 20;

/// The size of the header in bytes, independent of `uuid_size`.
pub(crate) const HEADER_SIZE: u64 = 48;


/// The GSYM file header.
#[derive(Clone, Debug)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub addr_off_size: u8,
    pub uuid_size: u8,
    pub base_address: u64,
    pub num_addrs: u32,
    pub strtab_offset: u32,
    pub strtab_size: u32,
    pub uuid: [u8; 20],
}

impl Header {
    /// Parse the 48 byte header at the start of the source.
    ///
    /// The magic determines the file's byte order; when the byte-swapped
    /// tag is seen the reader's order is flipped before any other field
    /// is read and stays that way for the life of the file.
    pub(crate) fn parse<S>(reader: &mut Reader<S>) -> Result<Self>
    where
        S: ReadAt,
    {
        let mut magic = reader.read_u32(0)?;
        if magic == GSYM_CIGAM {
            let () = reader.flip_order();
            magic = reader.read_u32(0)?;
        }
        if magic != GSYM_MAGIC {
            return Err(Error::BadMagic(magic))
        }

        let version = reader.read_u16(4)?;
        if version != GSYM_VERSION {
            return Err(Error::UnsupportedVersion(version))
        }

        let addr_off_size = reader.read_u8(6)?;
        if !matches!(addr_off_size, 1 | 2 | 4 | 8) {
            return Err(Error::BadAddrSize(addr_off_size))
        }

        let uuid_size = reader.read_u8(7)?;
        if uuid_size > GSYM_MAX_UUID_SIZE {
            return Err(Error::UuidOutOfRange(uuid_size))
        }

        let base_address = reader.read_u64(8)?;
        let num_addrs = reader.read_u32(16)?;
        let strtab_offset = reader.read_u32(20)?;
        let strtab_size = reader.read_u32(24)?;

        let mut uuid = [0u8; 20];
        let () = reader.read_bytes(&mut uuid, 28)?;

        let slf = Self {
            magic,
            version,
            addr_off_size,
            uuid_size,
            base_address,
            num_addrs,
            strtab_offset,
            strtab_size,
            uuid,
        };
        Ok(slf)
    }

    /// The meaningful prefix of the UUID field.
    #[inline]
    pub fn uuid_bytes(&self) -> &[u8] {
        &self.uuid[..usize::from(self.uuid_size)]
    }

    /// The UUID as a lowercase hex string, two characters per byte.
    pub fn uuid_hex(&self) -> String {
        self.uuid_bytes().iter().fold(
            String::with_capacity(2 * usize::from(self.uuid_size)),
            |mut hex, byte| {
                // Writing to a `String` cannot fail.
                let _result = write!(hex, "{byte:02x}");
                hex
            },
        )
    }
}

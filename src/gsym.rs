//! The GSYM lookup facade.
//!
//! A standalone GSYM file contains the following sections, in order:
//!
//! * Header
//! * Address Table
//! * Address Info Offset Table
//! * File Table
//! * String Table
//! * Address Info
//!
//! The address table holds relative addresses of functions in ascending
//! order; the parallel offset table points at the per-function info
//! block holding the function's size, name, and typed info entries
//! (line table, inline tree). A lookup binary-searches the address
//! table, parses the containing function's info block, and assembles
//! the list of source locations at the query address, innermost
//! inlined frame first.

use std::path::Path;

use tracing::warn;

use crate::header::Header;
use crate::header::HEADER_SIZE;
use crate::inline::InlineInfo;
use crate::linetab::query_line_table;
use crate::mmap::Mmap;
use crate::reader::Reader;
use crate::source::ReadAt;
use crate::Addr;
use crate::Error;
use crate::Result;

const INFO_TYPE_END_OF_LIST: u32 = 0;
const INFO_TYPE_LINE_TABLE: u32 = 1;
const INFO_TYPE_INLINE_INFO: u32 = 2;


/// One logical stack frame at a looked up address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation {
    /// The name of the function the frame executes in.
    pub name: String,
    /// The source file path, or `""` if unknown.
    pub file: String,
    /// The source line, or 0 if unknown.
    pub line: u32,
    /// The frame's offset from the start of its (inlined) function.
    pub offset: u32,
}

/// The result of a successful address lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LookupResult {
    /// The absolute address that was looked up.
    pub addr: Addr,
    /// The absolute start address of the containing function.
    pub start_addr: Addr,
    /// The function's size in bytes; 0 means unsized.
    pub size: u64,
    /// The function's (mangled) name.
    pub name: String,
    /// The frames at the address, innermost inlined callee first, the
    /// containing function last.
    pub locations: Vec<SourceLocation>,
}


/// A decoder for a GSYM file backed by a [`ReadAt`] byte source.
///
/// A `Gsym` is read-only after construction; lookups never mutate it,
/// so a shared instance can serve concurrent callers as long as the
/// byte source supports concurrent positional reads.
#[derive(Debug)]
pub struct Gsym<S> {
    reader: Reader<S>,
    header: Header,
}

impl Gsym<Mmap> {
    /// Memory map the GSYM file at `path` and parse its header.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::new(Mmap::open(path)?)
    }
}

impl<S> Gsym<S>
where
    S: ReadAt,
{
    /// Create a `Gsym` from the provided byte source, parsing and
    /// validating the header.
    pub fn new(source: S) -> Result<Self> {
        let mut reader = Reader::new(source);
        let header = Header::parse(&mut reader)?;
        Ok(Self { reader, header })
    }

    /// The parsed file header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The number of entries in the address table.
    #[inline]
    pub fn address_count(&self) -> u32 {
        self.header.num_addrs
    }

    /// The meaningful prefix of the header's UUID field.
    #[inline]
    pub fn uuid_bytes(&self) -> &[u8] {
        self.header.uuid_bytes()
    }

    /// The UUID as a lowercase hex string.
    #[inline]
    pub fn uuid_hex(&self) -> String {
        self.header.uuid_hex()
    }

    /// Read the relative address of address table entry `idx`,
    /// zero-extending from the table's entry width.
    pub fn addr_entry(&self, idx: usize) -> Result<Addr> {
        let width = u64::from(self.header.addr_off_size);
        let offset = HEADER_SIZE + idx as u64 * width;
        match self.header.addr_off_size {
            1 => self.reader.read_u8(offset).map(Addr::from),
            2 => self.reader.read_u16(offset).map(Addr::from),
            4 => self.reader.read_u32(offset).map(Addr::from),
            8 => self.reader.read_u64(offset),
            size => Err(Error::BadAddrSize(size)),
        }
    }

    /// Find the index of the rightmost address table entry less than or
    /// equal to `rel_addr`.
    ///
    /// Fails with `AddressNotFound` if the address precedes the first
    /// entry (or the table is empty). The returned entry is a
    /// candidate only; whether the function at that index actually
    /// covers the address is decided by its info block's size.
    pub fn find_addr_index(&self, rel_addr: Addr) -> Result<usize> {
        let count = self.header.num_addrs as usize;
        if count == 0 || rel_addr < self.addr_entry(0)? {
            return Err(Error::AddressNotFound(rel_addr))
        }

        // Lower bound search for the first entry greater than
        // `rel_addr`; the answer is the entry before it. `low` starts
        // out at 1 thanks to the check above, so the subtraction cannot
        // wrap, and no read ever touches index `count`.
        let mut low = 1;
        let mut high = count;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.addr_entry(mid)? <= rel_addr {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low - 1)
    }

    fn addr_info_offset(&self, idx: usize) -> Result<u64> {
        let num = u64::from(self.header.num_addrs);
        let width = u64::from(self.header.addr_off_size);
        let offset = HEADER_SIZE + num * width + idx as u64 * 4;
        self.reader.read_u32(offset).map(u64::from)
    }

    fn file_table_offset(&self) -> u64 {
        let num = u64::from(self.header.num_addrs);
        let width = u64::from(self.header.addr_off_size);
        HEADER_SIZE + num * (width + 4)
    }

    /// Read the NUL terminated string at `offset` into the string
    /// table.
    pub fn get_string(&self, offset: u64) -> Result<String> {
        self.reader
            .read_cstring(u64::from(self.header.strtab_offset) + offset)
    }

    /// Resolve a file table index to a path.
    ///
    /// Index 0 means "no file" and resolves to `""` without consulting
    /// the table. Entry 0 of the table itself is a sentinel zero pair,
    /// so the public index doubles as the table index.
    pub fn get_file(&self, index: u32) -> Result<String> {
        if index == 0 {
            return Ok(String::new())
        }

        let entry = self.file_table_offset() + 4 + u64::from(index) * 8;
        let dir_off = self.reader.read_u32(entry)?;
        let base_off = self.reader.read_u32(entry + 4)?;
        let dir = self.get_string(u64::from(dir_off))?;
        let base = self.get_string(u64::from(base_off))?;

        let path = match (dir.is_empty(), base.is_empty()) {
            (false, false) => format!("{dir}/{base}"),
            (true, false) => base,
            (false, true) => dir,
            (true, true) => String::new(),
        };
        Ok(path)
    }

    /// Look up an address relative to the file's base address.
    pub fn lookup_relative(&self, rel_addr: Addr) -> Result<LookupResult> {
        let idx = self.find_addr_index(rel_addr)?;
        let func_addr = self.addr_entry(idx)?;
        let info_off = self.addr_info_offset(idx)?;

        let size = self.reader.read_u32(info_off)?;
        if size > 0 && (rel_addr < func_addr || rel_addr - func_addr > u64::from(size)) {
            return Err(Error::AddressNotFound(rel_addr))
        }

        let name_off = self.reader.read_u32(info_off + 4)?;
        let name = self.get_string(u64::from(name_off))?;

        let mut line_row = None;
        let mut inline_root = None;
        let mut off = info_off + 8;
        loop {
            let typ = self.reader.read_u32(off)?;
            if typ == INFO_TYPE_END_OF_LIST {
                break
            }
            let length = self.reader.read_u32(off + 4)?;
            let payload = off + 8;

            match typ {
                INFO_TYPE_LINE_TABLE => {
                    if line_row.is_none() {
                        line_row =
                            Some(query_line_table(&self.reader, payload, func_addr, rel_addr)?);
                    }
                }
                INFO_TYPE_INLINE_INFO => {
                    if inline_root.is_none() {
                        let mut pos = payload;
                        inline_root = InlineInfo::parse(&self.reader, &mut pos, func_addr)?;
                    }
                }
                typ => warn!("skipping unrecognized info type {typ}"),
            }
            off = payload + u64::from(length);
        }

        let (file_idx, line) = line_row
            .as_ref()
            .map(|row| (row.file_idx, row.line))
            .unwrap_or((0, 0));

        let chain = inline_root
            .as_ref()
            .map(|root| root.inline_stack(rel_addr))
            .unwrap_or_default();

        let mut locations = Vec::new();
        if chain.is_empty() {
            let () = locations.push(SourceLocation {
                name: name.clone(),
                file: self.get_file(file_idx).unwrap_or_default(),
                line,
                offset: (rel_addr - func_addr) as u32,
            });
        } else {
            // The chain is ordered parent to child while the reported
            // frames are innermost first. An inline node names the
            // callee but carries the file and line of the call site in
            // the caller, so each frame borrows them from its next
            // inner neighbor; the innermost frame executes the
            // statement the line table describes.
            let cnt = chain.len();
            for (pos, node) in chain.iter().rev().enumerate() {
                let (frame_file, frame_line) = if pos == 0 {
                    (file_idx, line)
                } else {
                    let inner = chain[cnt - pos];
                    (inner.call_file, inner.call_line)
                };
                let () = locations.push(SourceLocation {
                    name: self.get_string(u64::from(node.name))?,
                    file: self.get_file(frame_file).unwrap_or_default(),
                    line: frame_line,
                    offset: (rel_addr - node.range_start()) as u32,
                });
            }
        }

        let base = self.header.base_address;
        let slf = LookupResult {
            addr: base.wrapping_add(rel_addr),
            start_addr: base.wrapping_add(func_addr),
            size: u64::from(size),
            name,
            locations,
        };
        Ok(slf)
    }

    /// Look up an absolute address.
    pub fn lookup_absolute(&self, addr: Addr) -> Result<LookupResult> {
        let base = self.header.base_address;
        if addr < base {
            return Err(Error::AddressOutOfRange(addr))
        }
        self.lookup_relative(addr - base)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use test_log::test;

    use crate::test_helper::sleb;
    use crate::test_helper::uleb;
    use crate::test_helper::GsymBuilder;

    const BASE: u64 = 0x100000000;


    fn line_table_payload(min_delta: i64, max_delta: i64, first_line: u64, ops: &[u8]) -> Vec<u8> {
        let mut payload = sleb(min_delta);
        let () = payload.extend(sleb(max_delta));
        let () = payload.extend(uleb(first_line));
        let () = payload.extend_from_slice(ops);
        payload
    }

    /// An inline tree mirroring a `main` function at [0x200, 0x240]
    /// that inlined `inline_a` at [0x220, 0x230], which in turn inlined
    /// `inline_b` at [0x224, 0x22c].
    fn inline_payload(builder: &GsymBuilder, main: u32, a: u32, b: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        // root: the function itself
        let () = payload.extend(uleb(1));
        let () = payload.extend(uleb(0x00));
        let () = payload.extend(uleb(0x40));
        let () = payload.push(1);
        let () = payload.extend_from_slice(&builder.u32_bytes(main));
        let () = payload.extend(uleb(0));
        let () = payload.extend(uleb(0));
        // inline_a, called from main.c:105
        let () = payload.extend(uleb(1));
        let () = payload.extend(uleb(0x20));
        let () = payload.extend(uleb(0x10));
        let () = payload.push(1);
        let () = payload.extend_from_slice(&builder.u32_bytes(a));
        let () = payload.extend(uleb(2));
        let () = payload.extend(uleb(105));
        // inline_b, called from fact.c:12
        let () = payload.extend(uleb(1));
        let () = payload.extend(uleb(0x04));
        let () = payload.extend(uleb(0x08));
        let () = payload.push(0);
        let () = payload.extend_from_slice(&builder.u32_bytes(b));
        let () = payload.extend(uleb(1));
        let () = payload.extend(uleb(12));
        // terminators for inline_a's and main's children
        let () = payload.extend(uleb(0));
        let () = payload.extend(uleb(0));
        payload
    }

    /// Build an image with three functions:
    ///
    /// * `factorial` at [0x100, 0x130] with a line table and an
    ///   unrecognized info entry,
    /// * `main` at [0x200, 0x240] with a line table and the inline tree
    ///   above,
    /// * `no_size` at 0x300 with size 0 and no info entries.
    fn test_gsym(big_endian: bool) -> Gsym<Vec<u8>> {
        let mut builder = GsymBuilder::new(big_endian);
        // File table indices 1 and 2.
        let _fact_c = builder.add_file("/tmp/src", "fact.c");
        let _main_c = builder.add_file("/tmp/src", "main.c");

        #[rustfmt::skip]
        let fact_table = line_table_payload(-1, 1, 10, &[
            0x02, 0x08, // AdvancePC +8
            0x03, 0x05, // AdvanceLine +5
            0x02, 0x08, // AdvancePC +8
            0x00,       // EndSequence
        ]);
        let () = builder.add_func(
            0x100,
            0x30,
            "factorial",
            &[
                (0x1234, [0xde, 0xad, 0xbe, 0xef].as_slice()),
                (INFO_TYPE_LINE_TABLE, fact_table.as_slice()),
            ],
        );

        #[rustfmt::skip]
        let main_table = line_table_payload(-1, 1, 100, &[
            0x01, 0x02, // SetFile 2
            0x02, 0x20, // AdvancePC +0x20
            0x03, 0x0a, // AdvanceLine +10
            0x02, 0x10, // AdvancePC +0x10
            0x00,       // EndSequence
        ]);
        let main = builder.intern("main");
        let inline_a = builder.intern("inline_a");
        let inline_b = builder.intern("inline_b");
        let main_inline = inline_payload(&builder, main, inline_a, inline_b);
        let () = builder.add_func(
            0x200,
            0x40,
            "main",
            &[
                (INFO_TYPE_LINE_TABLE, main_table.as_slice()),
                (INFO_TYPE_INLINE_INFO, main_inline.as_slice()),
            ],
        );

        let () = builder.add_func(0x300, 0, "no_size", &[]);

        Gsym::new(builder.build()).unwrap()
    }


    /// Check all header fields of the synthetic image.
    #[test]
    fn header_fields() {
        let gsym = test_gsym(false);
        let header = gsym.header();

        assert_eq!(header.magic, 0x4753594d);
        assert_eq!(header.version, 1);
        assert_eq!(header.addr_off_size, 2);
        assert_eq!(header.uuid_size, 16);
        assert_eq!(header.base_address, BASE);
        assert_eq!(header.num_addrs, 3);
        assert_eq!(gsym.address_count(), 3);
        assert_eq!(gsym.uuid_hex(), "000102030405060708090a0b0c0d0e0f");
        assert_eq!(gsym.uuid_bytes().len(), 16);
    }

    /// Address table entries are non-decreasing and the info offset
    /// table points right behind the string table.
    #[test]
    fn table_layout() {
        let gsym = test_gsym(false);

        let mut previous = 0;
        for idx in 0..gsym.address_count() as usize {
            let entry = gsym.addr_entry(idx).unwrap();
            assert!(entry >= previous);
            previous = entry;
        }

        let header = gsym.header();
        let first_block = u64::from(header.strtab_offset) + u64::from(header.strtab_size);
        assert_eq!(gsym.addr_info_offset(0).unwrap(), first_block);
    }

    /// Check the binary search contract at entry boundaries.
    #[test]
    fn address_search_boundaries() {
        let gsym = test_gsym(false);

        assert!(matches!(
            gsym.find_addr_index(0xff),
            Err(Error::AddressNotFound(0xff))
        ));
        assert_eq!(gsym.find_addr_index(0x100).unwrap(), 0);
        assert_eq!(gsym.find_addr_index(0x101).unwrap(), 0);
        assert_eq!(gsym.find_addr_index(0x1ff).unwrap(), 0);
        assert_eq!(gsym.find_addr_index(0x200).unwrap(), 1);
        assert_eq!(gsym.find_addr_index(0x2ff).unwrap(), 1);
        assert_eq!(gsym.find_addr_index(0x300).unwrap(), 2);
        // Anything at or past the last entry maps to the last index.
        assert_eq!(gsym.find_addr_index(0x5000).unwrap(), 2);

        // The search invariant: the entry at the reported index covers
        // the address from below, the next one (if any) from above.
        for rel in [0x100u64, 0x153, 0x1ff, 0x200, 0x23f, 0x300, 0x427] {
            let idx = gsym.find_addr_index(rel).unwrap();
            assert!(gsym.addr_entry(idx).unwrap() <= rel);
            if idx + 1 < gsym.address_count() as usize {
                assert!(gsym.addr_entry(idx + 1).unwrap() > rel);
            }
        }
    }

    /// Look up a plain function: one location fed by the line table,
    /// with the unrecognized info entry skipped.
    #[test]
    fn lookup_simple_function() {
        let gsym = test_gsym(false);

        let result = gsym.lookup_relative(0x105).unwrap();
        assert_eq!(result.addr, BASE + 0x105);
        assert_eq!(result.start_addr, BASE + 0x100);
        assert_eq!(result.size, 0x30);
        assert_eq!(result.name, "factorial");
        assert_eq!(
            result.locations,
            vec![SourceLocation {
                name: "factorial".to_string(),
                file: "/tmp/src/fact.c".to_string(),
                line: 10,
                offset: 5,
            }]
        );

        // The second line table row starts at 0x108.
        let result = gsym.lookup_relative(0x108).unwrap();
        assert_eq!(result.locations[0].line, 15);
        assert_eq!(result.locations[0].offset, 8);
    }

    /// The function's end is inclusive; one byte past it is not found.
    #[test]
    fn lookup_function_bounds() {
        let gsym = test_gsym(false);

        let result = gsym.lookup_relative(0x130).unwrap();
        assert_eq!(result.name, "factorial");
        assert_eq!(result.locations[0].line, 15);
        assert_eq!(result.locations[0].offset, 0x30);

        assert!(matches!(
            gsym.lookup_relative(0x131),
            Err(Error::AddressNotFound(0x131))
        ));
    }

    /// Look up an address inside the deepest inlined callee: three
    /// frames, innermost first, with the call site file/line shift.
    #[test]
    fn lookup_inlined_frames() {
        let gsym = test_gsym(false);

        let result = gsym.lookup_relative(0x226).unwrap();
        assert_eq!(result.start_addr, BASE + 0x200);
        assert_eq!(result.size, 0x40);
        assert_eq!(result.name, "main");
        assert_eq!(
            result.locations,
            vec![
                // The executing statement, described by the line table.
                SourceLocation {
                    name: "inline_b".to_string(),
                    file: "/tmp/src/main.c".to_string(),
                    line: 110,
                    offset: 2,
                },
                // inline_b's call site lies in inline_a.
                SourceLocation {
                    name: "inline_a".to_string(),
                    file: "/tmp/src/fact.c".to_string(),
                    line: 12,
                    offset: 6,
                },
                // inline_a's call site lies in main.
                SourceLocation {
                    name: "main".to_string(),
                    file: "/tmp/src/main.c".to_string(),
                    line: 105,
                    offset: 0x26,
                },
            ]
        );
    }

    /// An address inside the function but outside any inlined range
    /// produces a single frame.
    #[test]
    fn lookup_between_inlined_ranges() {
        let gsym = test_gsym(false);

        let result = gsym.lookup_relative(0x210).unwrap();
        assert_eq!(
            result.locations,
            vec![SourceLocation {
                name: "main".to_string(),
                file: "/tmp/src/main.c".to_string(),
                line: 100,
                offset: 0x10,
            }]
        );

        // Inside inline_a but before inline_b: two frames.
        let result = gsym.lookup_relative(0x221).unwrap();
        assert_eq!(result.locations.len(), 2);
        assert_eq!(result.locations[0].name, "inline_a");
        assert_eq!(result.locations[0].line, 110);
        assert_eq!(result.locations[0].offset, 1);
        assert_eq!(result.locations[1].name, "main");
        assert_eq!(result.locations[1].line, 105);
        assert_eq!(result.locations[1].offset, 0x21);
    }

    /// A zero sized function disables the bounds check and reports
    /// empty line information.
    #[test]
    fn lookup_unsized_function() {
        let gsym = test_gsym(false);

        let result = gsym.lookup_relative(0x302).unwrap();
        assert_eq!(result.size, 0);
        assert_eq!(result.name, "no_size");
        assert_eq!(
            result.locations,
            vec![SourceLocation {
                name: "no_size".to_string(),
                file: String::new(),
                line: 0,
                offset: 2,
            }]
        );

        // Open ended: even a far away address resolves.
        let result = gsym.lookup_relative(0x4000).unwrap();
        assert_eq!(result.name, "no_size");
    }

    /// Looking up a function's start address round-trips: the reported
    /// start matches and the outermost frame's offset is 0.
    #[test]
    fn lookup_round_trip() {
        let gsym = test_gsym(false);

        for idx in 0..gsym.address_count() as usize {
            let rel = gsym.addr_entry(idx).unwrap();
            let result = gsym.lookup_relative(rel).unwrap();
            assert_eq!(result.start_addr, BASE + rel);
            assert_eq!(result.addr, BASE + rel);
            assert_eq!(result.locations.last().unwrap().offset, 0);
        }
    }

    /// Absolute lookups translate into relative ones and reject
    /// addresses below the base address.
    #[test]
    fn lookup_absolute_addresses() {
        let gsym = test_gsym(false);

        let absolute = gsym.lookup_absolute(BASE + 0x105).unwrap();
        let relative = gsym.lookup_relative(0x105).unwrap();
        assert_eq!(absolute, relative);

        assert!(matches!(
            gsym.lookup_absolute(BASE - 1),
            Err(Error::AddressOutOfRange(..))
        ));
    }

    /// A byte-swapped image decodes identically.
    #[test]
    fn lookup_big_endian() {
        let gsym = test_gsym(true);

        assert_eq!(gsym.header().base_address, BASE);
        assert_eq!(gsym.uuid_hex(), "000102030405060708090a0b0c0d0e0f");

        let result = gsym.lookup_relative(0x226).unwrap();
        assert_eq!(result.name, "main");
        assert_eq!(result.locations.len(), 3);
        assert_eq!(result.locations[0].name, "inline_b");
        assert_eq!(result.locations[2].line, 105);
    }

    /// An image without any functions reports `AddressNotFound` for
    /// every lookup.
    #[test]
    fn lookup_empty_table() {
        let builder = GsymBuilder::new(false);
        let gsym = Gsym::new(builder.build()).unwrap();

        assert_eq!(gsym.address_count(), 0);
        assert!(matches!(
            gsym.lookup_relative(0),
            Err(Error::AddressNotFound(0))
        ));
    }

    /// Check `Gsym::open` on a real, memory mapped file.
    #[test]
    fn open_mapped_file() {
        let mut builder = GsymBuilder::new(false);
        let _file = builder.add_file("", "lib.c");
        let table = line_table_payload(0, 1, 3, &[0x02, 0x10, 0x00]);
        let () = builder.add_func(0x40, 0x20, "f", &[(INFO_TYPE_LINE_TABLE, table.as_slice())]);
        let data = builder.build();

        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(&data).unwrap();
        let () = file.flush().unwrap();

        let gsym = Gsym::open(file.path()).unwrap();
        let result = gsym.lookup_relative(0x44).unwrap();
        assert_eq!(result.name, "f");
        assert_eq!(
            result.locations,
            vec![SourceLocation {
                name: "f".to_string(),
                file: "lib.c".to_string(),
                line: 3,
                offset: 4,
            }]
        );
    }
}

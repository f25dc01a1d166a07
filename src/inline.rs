//! Decoder and walker for the recursive GSYM inline information tree.

use crate::reader::Reader;
use crate::source::ReadAt;
use crate::Addr;
use crate::Result;


/// An address range covered by an inline node, in relative address
/// space. Containment is inclusive at both ends.
#[derive(Clone, Copy, Debug)]
struct InlineRange {
    start: Addr,
    size: u64,
}

impl InlineRange {
    #[inline]
    fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr - self.start <= self.size
    }
}


/// A node of the inline information tree.
///
/// The root describes the function itself; each child describes a
/// function inlined into its parent. A node records the *callee's* name
/// together with the file and line of the *call site in the caller*.
#[derive(Clone, Debug)]
pub(crate) struct InlineInfo {
    /// String table offset of the callee's name.
    pub name: u32,
    /// File table index of the call site.
    pub call_file: u32,
    /// Source line of the call site.
    pub call_line: u32,
    /// Invariant: non-empty; an empty range vector marks the sibling
    /// terminator and never materializes as a node.
    ranges: Vec<InlineRange>,
    children: Vec<InlineInfo>,
}

impl InlineInfo {
    /// Parse the node at `*offset`, advancing `*offset` past it.
    ///
    /// Range starts are encoded relative to `base_addr`: the parent's
    /// first range start, or the function start at the root. A node
    /// with zero ranges is the end-of-siblings terminator and decodes
    /// as `None`; it is consumed but must not be appended.
    pub fn parse<S>(reader: &Reader<S>, offset: &mut u64, base_addr: Addr) -> Result<Option<Self>>
    where
        S: ReadAt,
    {
        let (range_cnt, cnt) = reader.read_uleb128(*offset)?;
        *offset += cnt;
        if range_cnt == 0 {
            return Ok(None)
        }

        let mut ranges = Vec::new();
        for _ in 0..range_cnt {
            let (start_off, cnt) = reader.read_uleb128(*offset)?;
            *offset += cnt;
            let (size, cnt) = reader.read_uleb128(*offset)?;
            *offset += cnt;

            let () = ranges.push(InlineRange {
                start: base_addr.wrapping_add(start_off),
                size,
            });
        }

        let has_children = reader.read_u8(*offset)?;
        *offset += 1;
        let name = reader.read_u32(*offset)?;
        *offset += 4;
        let (call_file, cnt) = reader.read_uleb128(*offset)?;
        *offset += cnt;
        let (call_line, cnt) = reader.read_uleb128(*offset)?;
        *offset += cnt;

        let mut children = Vec::new();
        if has_children != 0 {
            let child_base = ranges[0].start;
            while let Some(child) = Self::parse(reader, offset, child_base)? {
                let () = children.push(child);
            }
        }

        let slf = Self {
            name,
            call_file: call_file as u32,
            call_line: call_line as u32,
            ranges,
            children,
        };
        Ok(Some(slf))
    }

    /// Whether any of the node's ranges covers `addr`.
    pub fn contains(&self, addr: Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
    }

    /// The start of the node's first range, which child ranges and
    /// frame offsets are computed against.
    #[inline]
    pub fn range_start(&self) -> Addr {
        self.ranges[0].start
    }

    fn inline_stack_impl<'slf>(&'slf self, addr: Addr, chain: &mut Vec<&'slf Self>) {
        let () = chain.push(self);
        for child in &self.children {
            if child.contains(addr) {
                let () = child.inline_stack_impl(addr, chain);
                break
            }
        }
    }

    /// The chain of nodes containing `addr`, ordered parent to child.
    /// Empty if the root itself does not contain `addr`.
    pub fn inline_stack(&self, addr: Addr) -> Vec<&Self> {
        let mut chain = Vec::new();
        if self.contains(addr) {
            let () = self.inline_stack_impl(addr, &mut chain);
        }
        chain
    }
}

//! Evaluator for the opcode driven GSYM line table.

use crate::reader::Reader;
use crate::source::ReadAt;
use crate::Addr;
use crate::Result;

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_SET_FILE: u8 = 0x01;
const DBG_ADVANCE_PC: u8 = 0x02;
const DBG_ADVANCE_LINE: u8 = 0x03;
const DBG_FIRST_SPECIAL: u8 = 0x04;


/// One row of the virtual line table: the state of the program at a
/// given point of execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LineRow {
    /// The relative address the row describes.
    pub address: Addr,
    /// The file table index of the source file.
    pub file_idx: u32,
    /// The source line number.
    pub line: u32,
}

/// Run the line table program at `offset` and report the last row whose
/// address is less than or equal to `addr`.
///
/// `func_addr` is the relative start address of the function the table
/// belongs to; `addr` is the relative query address. The program keeps
/// a committed row and a running row: each opcode mutates the running
/// row, and the running row is committed only if it has not advanced
/// past the query. `EndSequence` reports the running row as is, pending
/// `SetFile`/`AdvanceLine` effects included.
pub(crate) fn query_line_table<S>(
    reader: &Reader<S>,
    offset: u64,
    func_addr: Addr,
    addr: Addr,
) -> Result<LineRow>
where
    S: ReadAt,
{
    let mut off = offset;

    let (min_delta, cnt) = reader.read_sleb128(off)?;
    off += cnt;
    let (max_delta, cnt) = reader.read_sleb128(off)?;
    off += cnt;
    let (first_line, cnt) = reader.read_uleb128(off)?;
    off += cnt;

    // The range of line number deltas covered by special opcodes, from
    // min_delta to max_delta inclusive.
    let line_range = max_delta
        .checked_sub(min_delta)
        .and_then(|range| range.checked_add(1));

    let mut row = LineRow {
        address: func_addr,
        file_idx: 1,
        line: first_line as u32,
    };
    let mut next = row;

    loop {
        let op = reader.read_u8(off)?;
        off += 1;

        match op {
            DBG_END_SEQUENCE => return Ok(next),
            DBG_SET_FILE => {
                let (idx, cnt) = reader.read_uleb128(off)?;
                off += cnt;
                next.file_idx = idx as u32;
            }
            DBG_ADVANCE_PC => {
                let (delta, cnt) = reader.read_uleb128(off)?;
                off += cnt;
                next.address = next.address.wrapping_add(delta);
            }
            DBG_ADVANCE_LINE => {
                let (delta, cnt) = reader.read_uleb128(off)?;
                off += cnt;
                next.line = next.line.wrapping_add(delta as u32);
            }
            // Special opcodes advance both the address and the line and
            // need no operands.
            _ => {
                let Some(range) = line_range.filter(|range| *range >= 1) else {
                    return Ok(row)
                };
                let adjusted = i64::from(op - DBG_FIRST_SPECIAL);
                let line_delta = min_delta.wrapping_add(adjusted % range);
                let addr_delta = adjusted / range;

                next.line = next.line.wrapping_add(line_delta as u32);
                next.address = next.address.wrapping_add(addr_delta as u64);
            }
        }

        if next.address > addr {
            return Ok(row)
        }
        row = next;
    }
}

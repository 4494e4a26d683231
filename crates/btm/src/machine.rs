//! The machine proper: transition table, two-way tape, head and state

use crate::error::{Error, Result};
use crate::instruction::Instr;

const INIT_TABLE_ROWS: usize = 8;
const INIT_TAPE_LEN: usize = 65;

/// A binary Turing machine over a two-way infinite tape of '0'/'1' cells.
///
/// The table has one row per state with an entry per read symbol and grows
/// on demand; the machine size is the number of rows in use. The state
/// register is negative once a FIN has been executed. Cell 0 is the tape
/// origin; cells that were never written read as '0'.
#[derive(Debug, Clone)]
pub struct Machine {
    /// Rows are FIN-initialized when first allocated; `size` counts the
    /// rows in use.
    table: Vec<[Instr; 2]>,
    size: usize,
    /// Backing buffer; 0 means never written, otherwise b'0' / b'1'.
    /// Logical cell `i` lives at `base + i`.
    tape: Vec<u8>,
    base: i64,
    head: i64,
    /// Written-range watermarks, logical and half-open.
    start: i64,
    end: i64,
    state: i32,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            table: vec![[Instr::FIN; 2]; INIT_TABLE_ROWS],
            size: 0,
            tape: vec![0; INIT_TAPE_LEN],
            base: (INIT_TAPE_LEN as i64 + 1) / 2,
            head: 0,
            start: 0,
            end: 0,
            state: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn head(&self) -> i64 {
        self.head
    }

    /// Current state; negative once the machine has finished.
    pub fn state(&self) -> i32 {
        self.state
    }

    /// Negative states mean "already finished" and are always accepted.
    pub fn set_state(&mut self, q: i32) -> Result<()> {
        if q >= self.size as i32 {
            return Err(Error::Invalid(format!("state {q} out of range")));
        }
        self.state = q;
        Ok(())
    }

    /// Move the head to cell `h`, zero-filling any cells this exposes
    /// between the written range and the new position.
    pub fn set_head(&mut self, h: i64) {
        let (start, end) = (self.start, self.end);
        if h < start {
            self.reserve(h, end);
            let lo = (self.base + h + 1) as usize;
            let hi = (self.base + start) as usize;
            self.tape[lo..hi].fill(b'0');
            if h + 1 < start {
                self.extend_written(h + 1, start);
            }
        } else if h >= end {
            self.reserve(start, h + 1);
            let lo = (self.base + end) as usize;
            let hi = (self.base + h) as usize;
            self.tape[lo..hi].fill(b'0');
            if h > end {
                self.extend_written(end, h);
            }
        }
        self.head = h;
    }

    /// Install the instruction for state `q` reading `symbol`. The table
    /// grows when `q` or the target exceeds the current size; it shrinks
    /// when the highest state loses its last targeting reference.
    pub fn set_instr(&mut self, q: i64, symbol: u8, instr: Instr) -> Result<()> {
        if q < 0 || symbol > 1 || (!instr.is_fin() && instr.target() < 0) {
            return Err(Error::Invalid(format!(
                "bad instruction assignment at ({q}, {symbol})"
            )));
        }
        let q = q as usize;
        let top = (instr.target() as i64).max(q as i64) as usize;
        if self.size <= top {
            self.reserve_rows(top + 1);
            self.size = top + 1;
        }
        let old = self.table[q][symbol as usize].target();
        self.table[q][symbol as usize] = instr;
        if old as i64 == self.size as i64 - 1 && instr.target() < old {
            // the previous top state may have lost its last reference
            let mut max = -1i64;
            for row in &self.table[..self.size] {
                for entry in row {
                    max = max.max(entry.target() as i64);
                }
            }
            self.size = (max + 1) as usize;
        }
        Ok(())
    }

    /// The instruction invoked upon reading `symbol` in state `q`.
    pub fn instr(&self, q: i64, symbol: u8) -> Result<Instr> {
        if q < 0 || q >= self.size as i64 || symbol > 1 {
            return Err(Error::Invalid(format!("no instruction at ({q}, {symbol})")));
        }
        Ok(self.table[q as usize][symbol as usize])
    }

    /// Copy `cells` ('0'/'1') onto the tape starting at cell `start`.
    pub fn set_tape(&mut self, start: i64, cells: &str) -> Result<()> {
        if !cells.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(Error::Invalid(format!("bad tape contents `{cells}`")));
        }
        if cells.is_empty() {
            return Ok(());
        }
        let end = start + cells.len() as i64;
        self.reserve(start, end);
        let lo = (self.base + start) as usize;
        self.tape[lo..lo + cells.len()].copy_from_slice(cells.as_bytes());
        self.extend_written(start, end);
        Ok(())
    }

    /// The symbol in cell `i`; '0' anywhere outside the written range.
    #[inline(always)]
    pub fn cell(&self, i: i64) -> char {
        let index = self.base + i;
        if index < 0 || index >= self.tape.len() as i64 {
            return '0';
        }
        match self.tape[index as usize] {
            0 => '0',
            b => b as char,
        }
    }

    /// The piece of tape from `start` (inclusive) to `end` (exclusive) as a
    /// fresh string, zero-filled beyond the written range.
    pub fn tape(&self, start: i64, end: i64) -> Result<String> {
        if start > end {
            return Err(Error::Invalid(format!("bad tape range [{start}, {end})")));
        }
        Ok((start..end).map(|i| self.cell(i)).collect())
    }

    /// The smallest interval outside of which every cell is known zero.
    pub fn range(&self) -> (i64, i64) {
        (self.start, self.end)
    }

    /// Clear the tape, rewind the head and the state. The table stays.
    pub fn reset(&mut self) {
        let lo = (self.base + self.start) as usize;
        let hi = (self.base + self.end) as usize;
        self.tape[lo..hi].fill(0);
        self.head = 0;
        self.start = 0;
        self.end = 0;
        self.state = 0;
    }

    /// Execute up to `nstep` transitions and return the number executed,
    /// zero when the machine has already finished. An executed FIN counts
    /// as a step, is appended to `trace` like any other instruction, and
    /// ends the run.
    ///
    /// The tape is grown eagerly: each inner burst is sized so the head
    /// cannot leave the buffer, and the buffer is regrown (re-biasing the
    /// origin) whenever the head starts too close to an edge.
    pub fn run(&mut self, nstep: i64, mut trace: Option<&mut Vec<Instr>>) -> Result<i64> {
        if nstep < 0 {
            return Err(Error::Invalid(format!("negative step count {nstep}")));
        }
        if self.state < 0 || nstep == 0 {
            return Ok(0);
        }
        let mut n: i64 = 0;
        while n < nstep {
            let mut burst = self.tape.len() as i64 >> 1;
            let h = self.head;
            let margin = (self.base + h).min(self.tape.len() as i64 - self.base - h - 1);
            if burst >> 1 <= margin {
                burst = margin.min(nstep - n);
            } else {
                crate::cold();
                if burst > (nstep - n) >> 1 {
                    burst = nstep - n;
                }
                self.reserve(h - burst, h + burst + 1);
            }
            let mut lo = i64::MAX;
            let mut hi = i64::MIN;
            for _ in 0..burst {
                let index = (self.base + self.head) as usize;
                let symbol = (self.tape[index] == b'1') as usize;
                let instr = self.table[self.state as usize][symbol];
                self.state = instr.target();
                if let Some(trace) = trace.as_deref_mut() {
                    trace.push(instr);
                }
                n += 1;
                if instr.is_fin() {
                    crate::cold();
                    if lo <= hi {
                        self.extend_written(lo, hi + 1);
                    }
                    return Ok(n);
                }
                self.tape[index] = b'0' + instr.symbol();
                lo = lo.min(self.head);
                hi = hi.max(self.head);
                self.head += instr.direction().offset();
            }
            if lo <= hi {
                self.extend_written(lo, hi + 1);
            }
        }
        Ok(n)
    }

    #[inline(always)]
    pub(crate) fn instr_at(&self, position: usize) -> Instr {
        self.table[position >> 1][position & 1]
    }

    #[inline(always)]
    pub(crate) fn set_instr_at(&mut self, position: usize, instr: Instr) {
        self.table[position >> 1][position & 1] = instr;
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.reserve_rows(size);
        self.size = size;
    }

    pub(crate) fn install_table(&mut self, rows: &[[Instr; 2]]) {
        self.reserve_rows(rows.len());
        self.table[..rows.len()].copy_from_slice(rows);
        self.size = rows.len();
    }

    fn reserve_rows(&mut self, rows: usize) {
        if self.table.len() >= rows {
            return;
        }
        let new_len = rows.max(self.table.len() * 3 / 2);
        self.table.resize(new_len, [Instr::FIN; 2]);
    }

    /// Make the logical range [`lstart`, `lend`) addressable, keeping the
    /// written region in place relative to the origin.
    fn reserve(&mut self, lstart: i64, lend: i64) {
        let len = self.tape.len() as i64;
        if lstart >= -self.base && lend <= len - self.base {
            return;
        }
        crate::cold();
        let new_start = lstart.min(-self.base);
        let new_end = lend.max(len - self.base);
        let new_base = -new_start;
        self.tape.resize((new_end - new_start) as usize, 0);
        if new_base > self.base {
            let delta = (new_base - self.base) as usize;
            let lo = (self.base + self.start) as usize;
            let hi = (self.base + self.end) as usize;
            self.tape.copy_within(lo..hi, lo + delta);
            self.tape[lo..lo + delta].fill(0);
        }
        self.base = new_base;
    }

    fn extend_written(&mut self, lo: i64, hi: i64) {
        if self.start == self.end {
            self.start = lo;
            self.end = hi;
        } else {
            self.start = self.start.min(lo);
            self.end = self.end.max(hi);
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{read_table, write_table};

    #[test]
    fn unwritten_cells_read_zero() {
        let machine = Machine::new();
        for i in [-1000, -1, 0, 1, 1000] {
            assert_eq!(machine.cell(i), '0');
        }
    }

    #[test]
    fn set_tape_and_defaults() {
        let mut machine = Machine::new();
        machine.set_tape(2, "101").unwrap();
        assert_eq!(machine.cell(1), '0');
        assert_eq!(machine.cell(2), '1');
        assert_eq!(machine.cell(3), '0');
        assert_eq!(machine.cell(4), '1');
        assert_eq!(machine.cell(5), '0');
        assert_eq!(machine.tape(0, 6).unwrap(), "001010");
        assert!(machine.set_tape(0, "012").is_err());
    }

    #[test]
    fn range_is_tight() {
        let mut machine = Machine::new();
        machine.set_tape(-2, "11").unwrap();
        let (start, end) = machine.range();
        assert_eq!((start, end), (-2, 0));
        assert_eq!(machine.cell(start - 1), '0');
        assert_eq!(machine.cell(end), '0');
    }

    #[test]
    fn set_head_fills_the_gap() {
        let mut machine = Machine::new();
        machine.set_head(3);
        assert_eq!(machine.head(), 3);
        assert_eq!(machine.range(), (0, 3));
        machine.set_head(-2);
        assert_eq!(machine.head(), -2);
        assert_eq!(machine.range(), (-1, 3));
    }

    #[test]
    fn reset_preserves_table() {
        let mut machine = Machine::new();
        read_table(&mut machine, "O I o f").unwrap();
        let before = write_table(&machine);
        machine.run(10, None).unwrap();
        machine.reset();
        assert_eq!(write_table(&machine), before);
        assert_eq!(machine.head(), 0);
        assert_eq!(machine.state(), 0);
        assert_eq!(machine.range(), (0, 0));
        for i in -5..5 {
            assert_eq!(machine.cell(i), '0');
        }
    }

    #[test]
    fn table_grows_and_shrinks() {
        let mut machine = Machine::new();
        machine
            .set_instr(0, 0, Instr::new(3, 1, crate::instruction::Direction::Right).unwrap())
            .unwrap();
        assert_eq!(machine.size(), 4);
        // dropping the only reference to state 3 shrinks the table
        machine.set_instr(0, 0, Instr::FIN).unwrap();
        assert_eq!(machine.size(), 0);
    }

    #[test]
    fn runner_walks_left_forever() {
        let mut machine = Machine::new();
        read_table(&mut machine, "o0 i0").unwrap();
        let steps = machine.run(1000, None).unwrap();
        assert_eq!(steps, 1000);
        assert_eq!(machine.head(), -1000);
        assert_eq!(machine.range(), (-999, 1));
        assert_eq!(machine.state(), 0);
    }

    #[test]
    fn halt_is_absorbing() {
        let mut machine = Machine::new();
        read_table(&mut machine, "O f f O").unwrap();
        let mut trace = Vec::new();
        let steps = machine.run(50, Some(&mut trace)).unwrap();
        assert_eq!(steps, 2);
        assert!(machine.state() < 0);
        assert_eq!(trace.len(), 2);
        assert!(trace[1].is_fin());
        let (head, range) = (machine.head(), machine.range());
        assert_eq!(machine.run(50, None).unwrap(), 0);
        assert_eq!((machine.head(), machine.range()), (head, range));
    }

    #[test]
    fn runs_are_deterministic() {
        let mut a = Machine::new();
        read_table(&mut a, "I O1 i0 I0 o f").unwrap();
        let mut b = a.clone();
        let mut trace_a = Vec::new();
        let mut trace_b = Vec::new();
        let na = a.run(500, Some(&mut trace_a)).unwrap();
        let nb = b.run(500, Some(&mut trace_b)).unwrap();
        assert_eq!(na, nb);
        assert_eq!(trace_a, trace_b);
        assert_eq!(a.head(), b.head());
        assert_eq!(a.state(), b.state());
        assert_eq!(a.range(), b.range());
        let (start, end) = a.range();
        assert_eq!(a.tape(start, end).unwrap(), b.tape(start, end).unwrap());
    }

    #[test]
    fn negative_step_count_is_invalid() {
        let mut machine = Machine::new();
        assert!(machine.run(-1, None).is_err());
    }

    #[test]
    fn state_must_exist() {
        let mut machine = Machine::new();
        read_table(&mut machine, "O f").unwrap();
        assert!(machine.set_state(0).is_ok());
        assert!(machine.set_state(1).is_err());
        assert!(machine.set_state(-1).is_ok());
        assert_eq!(machine.run(10, None).unwrap(), 0);
    }
}

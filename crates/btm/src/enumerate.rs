//! Canonical-order enumeration of machines of a given size

// The enumeration walks transition tables in a fixed total order: the
// skeleton of targets and FINs moves slowest, the symbol/move bits of every
// position fastest. Targets obey the first-visit numbering scheme: a state
// above the ones already seen may only appear by being "introduced", i.e.
// the first instruction that can reach state k carries the explicit target
// k. That pins one representative per renaming class.
//
// `top[q]` records the smallest state index not yet introduced when row q
// begins. Whenever row q is the last one that could still introduce state
// q + 1, its second entry is forced to do so; otherwise the rows past q
// could never be reached and the table would just be a smaller machine
// padded with dead rows.

use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};

use crate::error::{Error, Result};
use crate::format::{Scanner, Token};
use crate::instruction::{self, Instr};
use crate::machine::Machine;

/// Restrictions on the generated table space.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Sample tables uniformly instead of walking the canonical order.
    pub random: bool,
    /// Every non-FIN entry of row q targets (q+1) mod N.
    pub cyclic: bool,
    /// Entries that read 1 must write 1.
    pub nonerasing: bool,
    /// Only tables containing at least one FIN.
    pub excl_no_fin: bool,
    /// Only tables containing at most one FIN.
    pub excl_multi_fin: bool,
}

/// Iterator over all size-N tables (or table prefixes) in canonical order.
///
/// The enumerator owns a single machine and rewrites its table in place;
/// borrow the current candidate, finish with it, then `advance`.
pub struct Enumerator {
    machine: Option<Machine>,
    /// `top[q]` is the smallest state index not yet introduced when row q
    /// begins.
    top: Vec<i32>,
    flags: Flags,
    len: usize,
    prefix_len: usize,
    rng: Option<SmallRng>,
}

impl Enumerator {
    /// Build an enumerator for tables of `size` states. A non-empty
    /// `prefix` pins the leading instructions and must itself satisfy the
    /// canonical form and the flags. When `len` is shorter than a full
    /// table, prefixes of `len` instructions are enumerated instead of
    /// whole tables.
    pub fn new(size: usize, flags: Flags, prefix: Option<&str>, len: Option<usize>) -> Result<Self> {
        let rng = if flags.random {
            let mut seed = [0u8; 4];
            OsRng.try_fill_bytes(&mut seed)?;
            Some(SmallRng::seed_from_u64(u32::from_le_bytes(seed) as u64))
        } else {
            None
        };
        let mut enumerator = Self {
            machine: None,
            top: vec![0; size],
            flags,
            len: 0,
            prefix_len: 0,
            rng,
        };
        if size == 0 {
            return Ok(enumerator);
        }
        let mut machine = Machine::new();
        machine.set_size(size);
        enumerator.machine = Some(machine);
        if let Some(prefix) = prefix {
            enumerator.load_prefix(prefix, size)?;
        }
        enumerator.len = match len {
            Some(len) if len >= enumerator.prefix_len => len.min(2 * size),
            _ => 2 * size,
        };
        enumerator.fill(0);
        Ok(enumerator)
    }

    /// The current candidate, or None once the space is exhausted. The
    /// machine's tape and registers are the borrower's to use; only the
    /// table belongs to the enumeration.
    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine> {
        self.machine.as_mut()
    }

    /// Step to the next candidate; false once the space is exhausted.
    /// Random mode never exhausts, it redraws instead.
    pub fn advance(&mut self) -> bool {
        if self.machine.is_none() {
            return false;
        }
        if self.flags.random {
            self.fill(0);
            return true;
        }
        if self.twiddle() {
            return true;
        }
        match self.promote() {
            Some(position) => {
                self.fill(position + 1);
                true
            }
            None => {
                self.machine = None;
                false
            }
        }
    }

    fn load_prefix(&mut self, prefix: &str, size: usize) -> Result<()> {
        let machine = self.machine.as_mut().unwrap();
        let mut scanner = Scanner::new(prefix);
        let mut count = 0;
        while let Some(token) = scanner.next_token()? {
            if count == 2 * size {
                return Err(Error::Invalid(format!(
                    "prefix `{prefix}` longer than the table"
                )));
            }
            let instr = match token {
                Token::Fin => Instr::FIN,
                Token::Explicit {
                    symbol,
                    direction,
                    target,
                } => Instr::new(target, symbol, direction).unwrap(),
                Token::Successor { symbol, direction } => {
                    Instr::new(((count / 2 + 1) % size) as i32, symbol, direction).unwrap()
                }
            };
            machine.set_instr_at(count, instr);
            count += 1;
        }
        self.prefix_len = count;
        if !self.prefix_ok() {
            return Err(Error::Invalid(format!(
                "prefix `{prefix}` violates the canonical form"
            )));
        }
        let machine = self.machine.as_ref().unwrap();
        let mut n = 1;
        for i in 0..self.prefix_len {
            if i % 2 == 0 {
                self.top[i / 2] = n;
            }
            if machine.instr_at(i).target() == n {
                n += 1;
            }
        }
        Ok(())
    }

    fn prefix_ok(&self) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        let machine = self.machine.as_ref().unwrap();
        let size = machine.size() as i32;
        let target = |i: usize| machine.instr_at(i).target();
        let mut n = 1;
        for i in 0..self.prefix_len {
            if (i / 2) as i32 >= n || target(i) > n.min(size - 1) {
                return false;
            }
            if target(i) == n {
                n += 1;
            }
        }
        // a prefix ending right where state n had to be introduced, without
        // introducing it, only describes machines with unreachable rows
        let last = self.prefix_len - 1;
        if last % 2 == 1
            && n == (last / 2 + 1) as i32
            && n < size
            && target(last - 1) < n
            && target(last) < n
        {
            return false;
        }
        let mut fins = 0;
        for i in 0..self.prefix_len {
            let instr = machine.instr_at(i);
            if instr.is_fin() {
                if self.flags.excl_multi_fin && fins > 0 {
                    return false;
                }
                fins += 1;
                continue;
            }
            if self.flags.nonerasing && i % 2 == 1 && instr.symbol() == 0 {
                return false;
            }
            if self.flags.cyclic && instr.target() != ((i / 2 + 1) % machine.size()) as i32 {
                return false;
            }
        }
        !(self.flags.excl_no_fin && self.prefix_len == 2 * machine.size() && fins == 0)
    }

    /// Fastest change: bump the symbol/move bits of the rightmost position
    /// with headroom, resetting the exhausted ones on the way and carrying
    /// left. FIN entries carry no bits and are skipped.
    fn twiddle(&mut self) -> bool {
        let machine = self.machine.as_mut().unwrap();
        let nonerasing = self.flags.nonerasing;
        for i in (self.prefix_len..self.len).rev() {
            let raw = machine.instr_at(i).raw();
            if raw == Instr::FIN.raw() {
                continue;
            }
            if raw & 0b11 == 0b11 {
                let reset = if i % 2 == 1 && nonerasing {
                    raw & !instruction::MOVE_MASK
                } else {
                    raw & !0b11
                };
                machine.set_instr_at(i, Instr::from_raw(reset));
                continue;
            }
            let bumped = if i % 2 == 1 && nonerasing {
                raw | instruction::MOVE_MASK
            } else {
                raw + 1
            };
            machine.set_instr_at(i, Instr::from_raw(bumped));
            return true;
        }
        false
    }

    /// Slowest change: advance the target/FIN skeleton at the rightmost
    /// position that admits it. Returns the position, or None when the
    /// enumeration is exhausted.
    fn promote(&mut self) -> Option<usize> {
        let len = self.len;
        let prefix_len = self.prefix_len;
        let flags = self.flags;
        let machine = self.machine.as_mut().unwrap();
        let size = machine.size();
        let size_i = size as i32;
        let mut i = len;
        if len == 2 * size && i > prefix_len {
            // the last position of a full table: no state can be introduced
            // here any more, so its target runs all the way up to N-1, and
            // its FIN may only go if another FIN stays
            i -= 1;
            let instr = machine.instr_at(i);
            if !instr.is_fin() {
                if !flags.cyclic && instr.target() < size_i - 1 {
                    machine.set_instr_at(i, Instr::from_raw(instr.raw() + 4));
                    return Some(i);
                }
            } else if !flags.excl_no_fin || (0..i).any(|k| machine.instr_at(k).is_fin()) {
                let raw = if flags.nonerasing {
                    instruction::SYMBOL_MASK
                } else {
                    0
                };
                machine.set_instr_at(i, Instr::from_raw(raw));
                return Some(i);
            }
        }
        let mut advanced = None;
        while i > prefix_len {
            i -= 1;
            let q = i / 2;
            let mut n = self.top[q];
            if i % 2 == 1 && machine.instr_at(i - 1).target() == n {
                n += 1;
            }
            let instr = machine.instr_at(i);
            if flags.cyclic || (i % 2 == 1 && n == q as i32 + 1 && n < size_i) {
                // the target is pinned here; only FIN -> target can advance
                if instr.is_fin() {
                    machine.set_instr_at(i, Instr::from_raw((((q + 1) % size) as i32) << 2));
                    advanced = Some(i);
                    break;
                }
            } else if instr.target() < n.min(size_i - 1) {
                machine.set_instr_at(i, Instr::from_raw(instr.raw() + 4));
                advanced = Some(i);
                break;
            }
        }
        let position = advanced?;
        if position % 2 == 1 && flags.nonerasing {
            let raw = machine.instr_at(position).raw() | instruction::SYMBOL_MASK;
            machine.set_instr_at(position, Instr::from_raw(raw));
        }
        Some(position)
    }

    /// Fill positions `at..len` (never below the pinned prefix) with the
    /// smallest admissible continuation, or with a fresh sample in random
    /// mode, keeping `top` in step.
    fn fill(&mut self, at: usize) {
        if at >= self.len {
            return;
        }
        let at = at.max(self.prefix_len);
        let len = self.len;
        let Self {
            machine,
            top,
            flags,
            rng,
            ..
        } = self;
        let machine = machine.as_mut().unwrap();
        let size = machine.size();
        let size_i = size as i32;
        let mut had_fin = (0..at).any(|i| machine.instr_at(i).is_fin());
        let q0 = at / 2;
        let mut n = if at % 2 == 1 {
            let mut n = top[q0];
            n += (machine.instr_at(at - 1).target() == n) as i32;
            n
        } else if q0 > 0 {
            let mut n = top[q0 - 1];
            n += (machine.instr_at(at - 2).target() == n) as i32;
            n += (machine.instr_at(at - 1).target() == n) as i32;
            n
        } else {
            1
        };
        for i in at..len {
            let q = i / 2;
            if i % 2 == 0 {
                top[q] = n;
            }
            if i % 2 == 1 && n == q as i32 + 1 && n < size_i {
                // forced introduction of state n
                let mut raw = n << 2;
                if let Some(rng) = rng.as_mut() {
                    raw |= rng.gen_range(0..4);
                }
                if flags.nonerasing {
                    raw |= instruction::SYMBOL_MASK;
                }
                machine.set_instr_at(i, Instr::from_raw(raw));
                n += 1;
                continue;
            }
            let fin_allowed = !flags.excl_multi_fin || !had_fin;
            let pick_fin = fin_allowed
                && match rng.as_mut() {
                    None => true,
                    Some(rng) => {
                        let choices = if flags.excl_no_fin && !had_fin {
                            (2 * size - i) as i32
                        } else {
                            2 * size as i32
                        };
                        rng.gen_range(0..choices) == 0
                    }
                };
            if pick_fin {
                machine.set_instr_at(i, Instr::FIN);
                had_fin = true;
                continue;
            }
            let mut raw = 0;
            if let Some(rng) = rng.as_mut() {
                raw = rng.gen_range(0..4);
            }
            if flags.cyclic {
                raw |= (((q + 1) % size) as i32) << 2;
            } else if let Some(rng) = rng.as_mut() {
                raw |= rng.gen_range(0..(n + 1).min(size_i)) << 2;
            }
            if raw >> 2 == n {
                n += 1;
            }
            if i % 2 == 1 && flags.nonerasing {
                raw |= instruction::SYMBOL_MASK;
            }
            machine.set_instr_at(i, Instr::from_raw(raw));
        }
    }
}

//! Per-candidate filters for the enumeration driver

use crate::instruction::Instr;
use crate::machine::Machine;

/// Outcome of running one candidate through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The machine passed every enabled filter; the payload is the number
    /// of steps it ran while being examined.
    Accept(i64),
    Reject,
}

/// Filter pipeline knobs plus reusable scratch space.
#[derive(Default)]
pub struct Filters {
    pub separability: bool,
    /// Mirrors the exclude-no-FIN enumeration flag: it switches the
    /// separability seed.
    pub seed_start: bool,
    pub min_run: i64,
    /// 0 disables the upper bound.
    pub max_run: i64,
    /// Repetition detection is active when this is greater than 1.
    pub min_rep: i64,
    pub rep_index: i64,
    pub dup_len: i64,
    trace: Vec<Instr>,
}

impl Filters {
    /// Run one candidate through separability, repetition detection and the
    /// runtime bounds. The machine is reset before it is run; its table is
    /// left untouched.
    pub fn decide(&mut self, machine: &mut Machine) -> Decision {
        if self.separability && separable(machine, self.seed_start) {
            return Decision::Reject;
        }
        machine.reset();
        let mut steps: i64 = 0;
        if self.min_rep > 1 {
            let mut index: i64 = 1;
            while index < self.rep_index && 1i64 << index < self.min_rep {
                index += 1;
            }
            let mut window = 1i64 << (index - 1);
            self.trace.clear();
            steps += run(machine, window * 3, Some(&mut self.trace));
            loop {
                if machine.state() < 0 {
                    break;
                }
                let w = window as usize;
                if repeating(&self.trace[w..w * 3], self.min_rep) {
                    return Decision::Reject;
                }
                if index == self.rep_index
                    || (self.max_run > 0 && steps + window * 3 > self.max_run)
                {
                    break;
                }
                steps += run(machine, window * 3, Some(&mut self.trace));
                window = 1 << index;
                index += 1;
            }
            if index == self.rep_index && self.dup_len > 0 {
                let mut len = (window * 3) as usize;
                steps += run(machine, self.dup_len, Some(&mut self.trace));
                if machine.state() >= 0 {
                    dedup(&mut self.trace, &mut len, self.dup_len as usize);
                    if repeating(&self.trace[len / 3..len], self.min_rep) {
                        return Decision::Reject;
                    }
                }
            }
        }
        if self.min_run > 0 && steps < self.min_run {
            steps += run(machine, self.min_run - steps, None);
            if steps < self.min_run {
                return Decision::Reject;
            }
        }
        if self.max_run > 0 {
            if steps > self.max_run {
                return Decision::Reject;
            }
            steps += run(machine, self.max_run - steps, None);
            if steps == self.max_run && machine.state() >= 0 {
                return Decision::Reject;
            }
        }
        Decision::Accept(steps)
    }
}

fn run(machine: &mut Machine, nstep: i64, trace: Option<&mut Vec<Instr>>) -> i64 {
    machine.run(nstep, trace).expect("step budget is non-negative")
}

/// A machine is separable when its state graph keeps some state away from
/// every FIN, or when a row's two transitions both point back at it.
/// `seed_start` marks state 0 alive a priori; it mirrors the exclude-no-FIN
/// enumeration regime and without it the all-alive exit is unreachable.
pub fn separable(machine: &Machine, seed_start: bool) -> bool {
    let n = machine.size();
    if n == 0 {
        return false;
    }
    let mut mark = vec![false; n];
    let mut marked = 0usize;
    if seed_start {
        mark[0] = true;
        marked += 1;
    }
    for q in (1..n).rev() {
        let t0 = machine.instr_at(2 * q).target();
        let t1 = machine.instr_at(2 * q + 1).target();
        if t0 < 0 || mark[t0 as usize] || t1 < 0 || mark[t1 as usize] {
            mark[q] = true;
            marked += 1;
        } else if t0 == q as i32 && t1 == q as i32 {
            return true;
        }
    }
    loop {
        let mut changed = 0usize;
        for q in (1..n).rev() {
            if mark[q] {
                continue;
            }
            // both targets are non-FIN here, or q would already be marked
            let t0 = machine.instr_at(2 * q).target() as usize;
            let t1 = machine.instr_at(2 * q + 1).target() as usize;
            if mark[t0] || mark[t1] {
                mark[q] = true;
                changed += 1;
            }
        }
        if changed == 0 {
            break;
        }
        marked += changed;
        if marked >= n {
            break;
        }
    }
    marked < n
}

/// Does `window` repeat some period at least `min_rep` times end to end,
/// allowing a partial final copy? The stride-`p` column of position 0 is
/// compared first; full block comparison only runs when it matches.
pub fn repeating(window: &[Instr], min_rep: i64) -> bool {
    let n = window.len();
    if min_rep <= 0 || n == 0 {
        return false;
    }
    let longest = n / min_rep as usize;
    'period: for p in 1..=longest {
        for i in (p..n).step_by(p) {
            if window[i] != window[0] {
                continue 'period;
            }
        }
        for i in (p..n).step_by(p) {
            let m = p.min(n - i);
            for j in 1..m {
                if window[j] != window[i + j] {
                    continue 'period;
                }
            }
        }
        return true;
    }
    false
}

/// Strike out repeated copies of segments up to `dup_len` long, compact the
/// trace and shrink `len` accordingly. The trace must extend `dup_len`
/// entries past `len`: the scan reads (and may clobber) that lookahead.
/// FIN is used as the strike-out sentinel, which is safe because a trace
/// with a real FIN belongs to a finished machine and is never deduplicated.
pub fn dedup(trace: &mut [Instr], len: &mut usize, dup_len: usize) {
    if *len == 0 {
        return;
    }
    let mut i = 0;
    while i + 1 < *len {
        let longest = dup_len.min(*len - i);
        let Some(p) = (1..=longest).find(|&p| (0..p).all(|k| trace[i + k] == trace[i + p + k]))
        else {
            i += 1;
            continue;
        };
        let mut j = i + 2 * p;
        for slot in j - p..j {
            trace[slot] = Instr::FIN;
        }
        while j < *len {
            if (0..p).any(|k| trace[i + k] != trace[j + k]) {
                break;
            }
            for _ in 0..p {
                trace[j] = Instr::FIN;
                j += 1;
            }
        }
        i = j;
    }
    let mut keep = 1;
    let mut scan = 1;
    loop {
        while scan < *len && trace[scan] == Instr::FIN {
            scan += 1;
        }
        if scan >= *len {
            break;
        }
        trace[keep] = trace[scan];
        keep += 1;
        scan += 1;
    }
    *len = keep;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_table;
    use crate::instruction::Direction;

    fn machine(table: &str) -> Machine {
        let mut machine = Machine::new();
        read_table(&mut machine, table).unwrap();
        machine
    }

    fn instr(target: i32, symbol: u8) -> Instr {
        Instr::new(target, symbol, Direction::Right).unwrap()
    }

    #[test]
    fn constant_window_repeats() {
        let window = vec![instr(0, 0); 6];
        assert!(repeating(&window, 3));
        assert!(repeating(&window, 6));
        assert!(!repeating(&window, 7));
    }

    #[test]
    fn period_two_with_partial_tail() {
        let a = instr(0, 0);
        let b = instr(1, 1);
        let window = [a, b, a, b, a];
        assert!(repeating(&window, 2));
        // two full copies are not three
        assert!(!repeating(&[a, b, a, b], 3));
        assert!(!repeating(&[a, b, b, a], 2));
    }

    #[test]
    fn dedup_collapses_short_cycles() {
        let a = instr(0, 0);
        let b = instr(1, 1);
        let c = instr(2, 0);
        // logical trace plus one entry of lookahead
        let mut trace = vec![a, b, b, b, c, b, c];
        let mut len = trace.len() - 1;
        dedup(&mut trace, &mut len, 1);
        assert_eq!(&trace[..len], &[a, b, c, b]);
    }

    #[test]
    fn dedup_keeps_aperiodic_traces() {
        let a = instr(0, 0);
        let b = instr(1, 1);
        let c = instr(2, 0);
        let mut trace = vec![a, b, c, a, b, c];
        let mut len = trace.len() - 2;
        dedup(&mut trace, &mut len, 2);
        assert_eq!(&trace[..len], &[a, b, c, a]);
    }

    #[test]
    fn separability_depends_on_the_seed() {
        // trivially halting machine: every row is FIN
        let all_fin = machine("f f f f");
        assert!(separable(&all_fin, false));
        assert!(!separable(&all_fin, true));
    }

    #[test]
    fn self_loop_rows_are_separable() {
        let looped = machine("O f o1 i1");
        assert!(separable(&looped, false));
        assert!(separable(&looped, true));
    }

    #[test]
    fn unreachable_fin_is_separable() {
        // states 1 and 2 only feed each other; FIN stays out of reach
        let split = machine("O f o2 i2 o1 i1");
        assert!(separable(&split, true));
        // giving state 2 a way back to 0 reconnects everything
        let joined = machine("O f o2 i2 o0 i1");
        assert!(!separable(&joined, true));
    }

    #[test]
    fn runtime_bounds_pin_the_boundary() {
        // this machine halts after exactly 2 steps
        let mut filters = Filters::default();
        filters.max_run = 2;
        assert_eq!(filters.decide(&mut machine("O f f O")), Decision::Accept(2));
        filters.max_run = 1;
        assert_eq!(filters.decide(&mut machine("O f f O")), Decision::Reject);
        filters.max_run = 0;
        filters.min_run = 2;
        assert_eq!(filters.decide(&mut machine("O f f O")), Decision::Accept(2));
        filters.min_run = 3;
        assert_eq!(filters.decide(&mut machine("O f f O")), Decision::Reject);
    }

    #[test]
    fn still_running_at_max_run_rejects() {
        // never halts
        let mut filters = Filters::default();
        filters.max_run = 100;
        assert_eq!(filters.decide(&mut machine("o0 i0")), Decision::Reject);
    }

    #[test]
    fn repetition_filter_rejects_tight_loops() {
        let mut filters = Filters::default();
        filters.min_rep = 2;
        filters.rep_index = 4;
        // one instruction repeated forever
        assert_eq!(filters.decide(&mut machine("o0 i0")), Decision::Reject);
        // halts before any window fills
        assert_eq!(filters.decide(&mut machine("O f f O")), Decision::Accept(2));
    }

    #[test]
    fn decide_resets_between_candidates() {
        let mut filters = Filters::default();
        filters.min_run = 1;
        let mut m = machine("O f f O");
        assert_eq!(filters.decide(&mut m), Decision::Accept(2));
        assert_eq!(filters.decide(&mut m), Decision::Accept(2));
    }
}

//! Text formats for instruction tables and machine configurations

use crate::error::{Error, Result};
use crate::instruction::{Direction, Instr};
use crate::machine::Machine;

/// One parsed instruction token; the target may be left implicit.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Token {
    Fin,
    Explicit {
        symbol: u8,
        direction: Direction,
        target: i32,
    },
    /// No state number given: the target is the successor of whatever row
    /// the token lands in.
    Successor { symbol: u8, direction: Direction },
}

/// Splits table text into instruction tokens. Blanks (spaces and tabs) are
/// allowed between tokens and between a letter and its state number.
pub(crate) struct Scanner<'a> {
    rest: &'a [u8],
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            rest: text.as_bytes(),
        }
    }

    fn skip_blank(&mut self) {
        while let [b' ' | b'\t', rest @ ..] = self.rest {
            self.rest = rest;
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_blank();
        let Some((&letter, rest)) = self.rest.split_first() else {
            return Ok(None);
        };
        self.rest = rest;
        let (symbol, direction) = match letter {
            b'o' => (0, Direction::Left),
            b'O' => (0, Direction::Right),
            b'i' => (1, Direction::Left),
            b'I' => (1, Direction::Right),
            b'f' => return Ok(Some(Token::Fin)),
            _ => {
                return Err(Error::Invalid(format!(
                    "bad instruction letter `{}`",
                    letter as char
                )))
            }
        };
        self.skip_blank();
        match self.rest.first() {
            None | Some(b'o' | b'O' | b'i' | b'I' | b'f') => {
                Ok(Some(Token::Successor { symbol, direction }))
            }
            _ => Ok(Some(Token::Explicit {
                symbol,
                direction,
                target: self.number()?,
            })),
        }
    }

    fn number(&mut self) -> Result<i32> {
        let digits = self
            .rest
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 {
            return Err(Error::Invalid(format!(
                "bad state number at `{}`",
                String::from_utf8_lossy(&self.rest[..self.rest.len().min(8)])
            )));
        }
        let (number, rest) = self.rest.split_at(digits);
        self.rest = rest;
        std::str::from_utf8(number)
            .unwrap()
            .parse::<i32>()
            .ok()
            .filter(|&n| n <= Instr::MAX_TARGET)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "state number `{}` out of range",
                    String::from_utf8_lossy(number)
                ))
            })
    }
}

/// Parse a whole-table specification into `machine`, replacing its table.
/// The machine size is inferred from the token count; an omitted target is
/// the row's successor, wrapping to 0 on the last row.
pub fn read_table(machine: &mut Machine, text: &str) -> Result<()> {
    let mut scanner = Scanner::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(Error::Invalid(format!(
            "{} instructions in table `{text}`",
            tokens.len()
        )));
    }
    let size = tokens.len() / 2;
    let mut rows = vec![[Instr::FIN; 2]; size];
    for (i, token) in tokens.into_iter().enumerate() {
        let instr = match token {
            Token::Fin => Instr::FIN,
            Token::Explicit {
                symbol,
                direction,
                target,
            } => {
                if target as usize >= size {
                    return Err(Error::Invalid(format!(
                        "state {target} out of range in table `{text}`"
                    )));
                }
                Instr::new(target, symbol, direction).unwrap()
            }
            Token::Successor { symbol, direction } => {
                Instr::new(((i / 2 + 1) % size) as i32, symbol, direction).unwrap()
            }
        };
        rows[i / 2][i % 2] = instr;
    }
    machine.install_table(&rows);
    Ok(())
}

/// Dump the first `len` instructions of the table. Tokens are concatenated
/// without separators; the target number is omitted exactly when it is the
/// row's cyclic successor.
pub fn write_table_prefix(machine: &Machine, len: usize) -> String {
    let size = machine.size();
    let mut out = String::new();
    for i in 0..len.min(2 * size) {
        let instr = machine.instr_at(i);
        if instr.is_fin() {
            out.push('f');
            continue;
        }
        out.push(match (instr.symbol(), instr.direction()) {
            (0, Direction::Left) => 'o',
            (0, Direction::Right) => 'O',
            (_, Direction::Left) => 'i',
            (_, Direction::Right) => 'I',
        });
        if instr.target() as usize != (i / 2 + 1) % size {
            out.push_str(&instr.target().to_string());
        }
    }
    out
}

pub fn write_table(machine: &Machine) -> String {
    write_table_prefix(machine, 2 * machine.size())
}

/// Apply a `<left-bits> (<state>) <right-bits>` configuration. The left run
/// ends at cell 0, which is where the head starts; the right run begins at
/// cell 1.
pub fn read_configuration(machine: &mut Machine, text: &str) -> Result<()> {
    fn blank(bytes: &[u8], mut pos: usize) -> usize {
        while let Some(b' ' | b'\t') = bytes.get(pos) {
            pos += 1;
        }
        pos
    }
    fn bits(bytes: &[u8], mut pos: usize) -> usize {
        while let Some(b'0' | b'1') = bytes.get(pos) {
            pos += 1;
        }
        pos
    }

    let bytes = text.as_bytes();
    let mut pos = blank(bytes, 0);
    let left_end = bits(bytes, pos);
    let left = &text[pos..left_end];
    machine.set_tape(1 - left.len() as i64, left)?;
    pos = blank(bytes, left_end);
    if bytes.get(pos) != Some(&b'(') {
        return Err(Error::Invalid(format!("bad configuration `{text}`")));
    }
    let close = text[pos..]
        .find(')')
        .map(|offset| pos + offset)
        .ok_or_else(|| Error::Invalid(format!("bad configuration `{text}`")))?;
    let state = text[pos + 1..close]
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::Invalid(format!("bad state in configuration `{text}`")))?;
    machine.set_state(state)?;
    pos = blank(bytes, close + 1);
    let right_end = bits(bytes, pos);
    if right_end > pos {
        machine.set_tape(1, &text[pos..right_end])?;
        pos = blank(bytes, right_end);
    }
    if pos < bytes.len() {
        return Err(Error::Invalid(format!(
            "trailing characters `{}` in configuration",
            &text[pos..]
        )));
    }
    Ok(())
}

/// Render the written tape (widened to include the head cell) with the
/// parenthesized state following the head cell.
pub fn write_configuration(machine: &Machine) -> String {
    let (mut start, mut end) = machine.range();
    let head = machine.head();
    if head < start {
        start = head;
    } else if head >= end {
        end = head + 1;
    }
    let mut out = String::new();
    for i in start..end {
        out.push(machine.cell(i));
        if i == head {
            out.push('(');
            out.push_str(&machine.state().to_string());
            out.push(')');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> Machine {
        let mut machine = Machine::new();
        read_table(&mut machine, text).unwrap();
        machine
    }

    #[test]
    fn table_round_trip() {
        let machine = parsed("O f f O");
        assert_eq!(write_table(&machine), "OffO");
        assert_eq!(write_table(&parsed("OffO")), "OffO");
    }

    #[test]
    fn successor_targets_are_omitted() {
        // explicit targets survive only where they differ from the
        // successor of their row
        assert_eq!(write_table(&parsed("O1 o0 i0 f")), "Oo0if");
        assert_eq!(write_table(&parsed("o0 i")), "oi");
    }

    #[test]
    fn last_row_successor_wraps_to_zero() {
        let machine = parsed("f f f O");
        assert_eq!(machine.instr(1, 1).unwrap().target(), 0);
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let mut machine = Machine::new();
        for text in ["", "x", "O f f", "f 3 f f", "o-1 f", "O2 f", "o99999999999 f"] {
            assert!(read_table(&mut machine, text).is_err(), "accepted `{text}`");
        }
    }

    #[test]
    fn blanks_between_tokens_are_ignored() {
        assert_eq!(write_table(&parsed("\tO  1 \t o0  i0 f")), "Oo0if");
    }

    #[test]
    fn configuration_round_trip() {
        let mut machine = parsed("O o");
        machine.reset();
        read_configuration(&mut machine, "11(0)11").unwrap();
        assert_eq!(machine.head(), 0);
        assert_eq!(machine.state(), 0);
        assert_eq!(machine.range(), (-1, 3));
        assert_eq!(write_configuration(&machine), "11(0)11");
    }

    #[test]
    fn configuration_pieces_are_optional() {
        let mut machine = parsed("O f f O");
        machine.reset();
        read_configuration(&mut machine, " (1) ").unwrap();
        assert_eq!(machine.state(), 1);
        assert_eq!(write_configuration(&machine), "0(1)");
        read_configuration(&mut machine, "(-1)").unwrap();
        assert!(machine.state() < 0);
    }

    #[test]
    fn bad_configurations_are_rejected() {
        let mut machine = parsed("O o");
        for text in ["11", "1(x)1", "(2)", "(0)1x", "(0"] {
            machine.reset();
            assert!(
                read_configuration(&mut machine, text).is_err(),
                "accepted `{text}`"
            );
        }
    }

    #[test]
    fn fresh_machine_renders_origin() {
        let machine = parsed("O o");
        assert_eq!(write_configuration(&machine), "0(0)");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn entry(size: usize) -> impl Strategy<Value = String> {
        prop_oneof![
            Just("f".to_string()),
            (0..size, 0u8..2, any::<bool>()).prop_map(|(target, symbol, right)| {
                let letter = match (symbol, right) {
                    (0, false) => 'o',
                    (0, true) => 'O',
                    (1, false) => 'i',
                    _ => 'I',
                };
                format!("{letter}{target}")
            }),
        ]
    }

    fn table_spec() -> impl Strategy<Value = String> {
        (1usize..=4)
            .prop_flat_map(|size| proptest::collection::vec(entry(size), 2 * size))
            .prop_map(|entries| entries.join(" "))
    }

    proptest! {
        #[test]
        fn dumps_reparse_to_themselves(spec in table_spec()) {
            let mut machine = Machine::new();
            read_table(&mut machine, &spec).unwrap();
            let dump = write_table(&machine);
            let mut reparsed = Machine::new();
            read_table(&mut reparsed, &dump).unwrap();
            prop_assert_eq!(write_table(&reparsed), dump);
        }
    }
}

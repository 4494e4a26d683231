use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use btm::enumerate::{Enumerator, Flags};
use btm::filter::{Decision, Filters};
use btm::format;
use btm::instruction::Direction;
use clap::Parser;

static DONE: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(
    name = "enumerator",
    about = "Enumerate binary Turing machines of a given size",
    allow_negative_numbers = true
)]
struct Cli {
    /// Generate only cyclic machines.
    #[arg(short = 'c')]
    cyclic: bool,

    /// Generate only non-erasing machines.
    #[arg(short = 'e')]
    nonerasing: bool,

    /// Generate only machines with at least one FIN.
    #[arg(short = 'f')]
    with_fin: bool,

    /// Avoid machines with more than one FIN.
    #[arg(short = 'u')]
    single_fin: bool,

    /// Collapse each machine with its mirror image on the first move.
    #[arg(short = 'm')]
    mirror: bool,

    /// With a maximum run, append to each machine a tab and the number of
    /// steps it ran.
    #[arg(short = 'a')]
    append_steps: bool,

    /// Exclude separable machines.
    #[arg(short = 's')]
    separable: bool,

    /// Generate table prefixes of this many instructions instead of whole
    /// tables; run-based filters are switched off.
    #[arg(short = 'l', value_name = "LENGTH")]
    length: Option<i64>,

    /// Stop after this many results; negative means no limit.
    #[arg(short = 'n', value_name = "MAXOUT", default_value_t = -1)]
    maxout: i64,

    /// Generate only machines with this table prefix.
    #[arg(short = 'p', value_name = "PREFIX")]
    prefix: Option<String>,

    /// Generate machines at random, trying MAXTRY of them; negative means
    /// indefinitely.
    #[arg(short = 'r', value_name = "MAXTRY")]
    random: Option<i64>,

    /// Keep only machines that run at least MINRUN steps and, with MAXRUN
    /// given, halt within MAXRUN steps.
    #[arg(short = 't', value_name = "MINRUN[,MAXRUN]", value_parser = parse_runs)]
    runs: Option<(i64, i64)>,

    /// Exclude machines whose executed instructions repeat MINREP times in
    /// the 2W steps after the first W, for W doubling up to INDEX times.
    #[arg(short = 'z', value_name = "MINREP,INDEX", value_parser = parse_reps)]
    reps: Option<(i64, i64)>,

    /// Deduplicate recorded trace segments up to this length and redo
    /// repetition detection on the last two thirds.
    #[arg(short = 'd', value_name = "DUPLEN", default_value_t = 0)]
    duplen: i64,

    /// Number of states; may be omitted with -l.
    size: Option<i64>,
}

fn parse_runs(text: &str) -> std::result::Result<(i64, i64), String> {
    let (min, max) = match text.split_once(',') {
        Some((min, max)) => (min, max),
        None => (text, ""),
    };
    let min: i64 = min.trim().parse().map_err(|e| format!("bad MINRUN: {e}"))?;
    let min = min.max(0);
    let mut max: i64 = if max.trim().is_empty() {
        0
    } else {
        max.trim().parse().map_err(|e| format!("bad MAXRUN: {e}"))?
    };
    if max < min {
        max = 0;
    }
    Ok((min, max))
}

fn parse_reps(text: &str) -> std::result::Result<(i64, i64), String> {
    let (rep, index) = match text.split_once(',') {
        Some((rep, index)) => (rep, Some(index)),
        None => (text, None),
    };
    let rep: i64 = rep.trim().parse().map_err(|e| format!("bad MINREP: {e}"))?;
    if rep <= 0 {
        return Ok((0, 0));
    }
    let Some(index) = index else {
        return Err("MINREP,INDEX takes two values".into());
    };
    let index: i64 = index.trim().parse().map_err(|e| format!("bad INDEX: {e}"))?;
    Ok((rep, index))
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("enumerator: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let flags = Flags {
        random: cli.random.is_some(),
        cyclic: cli.cyclic,
        nonerasing: cli.nonerasing,
        excl_no_fin: cli.with_fin,
        excl_multi_fin: cli.single_fin,
    };
    let (mut min_run, mut max_run) = cli.runs.unwrap_or((0, 0));
    let (mut min_rep, mut rep_index) = cli.reps.unwrap_or((0, 0));
    let mut dup_len = cli.duplen;
    let mut separable = cli.separable;
    let mut append_steps = cli.append_steps;
    let mut maxtry = cli.random.unwrap_or(-1);

    // prefix generation bypasses everything run-based
    let length = cli.length.filter(|&l| l >= 0);
    if length.is_some() {
        append_steps = false;
        separable = false;
        min_run = 0;
        max_run = 0;
        min_rep = 0;
        rep_index = 0;
        dup_len = 0;
        maxtry = 0;
    }
    let size = match (cli.size, length) {
        (Some(size), _) => size,
        (None, Some(length)) => length + 1,
        (None, None) => bail!("missing size argument"),
    };
    let size = usize::try_from(size).ok().context("bad size")?;
    let length = length.map(|l| (l as usize).min(2 * size));
    if max_run == 0 {
        append_steps = false;
    }
    if flags.cyclic {
        separable = false;
    }

    ctrlc::set_handler(|| DONE.store(true, Ordering::Relaxed))
        .context("install signal handler")?;

    let mut filters = Filters::default();
    filters.separability = separable;
    filters.seed_start = flags.excl_no_fin;
    filters.min_run = min_run;
    filters.max_run = max_run;
    filters.min_rep = min_rep;
    filters.rep_index = rep_index;
    filters.dup_len = dup_len;

    let mut driver = Driver {
        size,
        flags,
        length,
        maxout: cli.maxout,
        maxtry,
        mirror: cli.mirror,
        append_steps,
        filters,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.prefix.as_deref() {
        Some(prefix) if !prefix.trim_matches(|c| c == ' ' || c == '\t').is_empty() => {
            driver.enumerate(Some(prefix), &mut out)?;
        }
        _ if driver.flags.random => driver.enumerate(None, &mut out)?,
        _ => {
            // Split the space by the first instruction: the immediately
            // halting class, the self-targeting classes (skipped whenever a
            // run-based filter would reject every never-halting machine),
            // then the state-introducing ones. Dropping the left-moving
            // variants collapses mirror images.
            if min_run <= 1 {
                driver.enumerate(Some("f"), &mut out)?;
            }
            if size > 1 && max_run == 0 && min_rep < 1 && !driver.flags.cyclic {
                if !driver.mirror {
                    driver.enumerate(Some("o0"), &mut out)?;
                    driver.enumerate(Some("i0"), &mut out)?;
                }
                driver.enumerate(Some("O0"), &mut out)?;
                driver.enumerate(Some("I0"), &mut out)?;
            }
            if !driver.mirror {
                driver.enumerate(Some("o"), &mut out)?;
                driver.enumerate(Some("i"), &mut out)?;
            }
            driver.enumerate(Some("O"), &mut out)?;
            driver.enumerate(Some("I"), &mut out)?;
        }
    }
    Ok(())
}

struct Driver {
    size: usize,
    flags: Flags,
    length: Option<usize>,
    maxout: i64,
    maxtry: i64,
    mirror: bool,
    append_steps: bool,
    filters: Filters,
}

impl Driver {
    /// Enumerate one prefix class, printing matching tables until the
    /// output budget or the space runs out or termination is requested.
    fn enumerate(&mut self, prefix: Option<&str>, out: &mut impl Write) -> Result<()> {
        let mut enumerator = Enumerator::new(self.size, self.flags, prefix, self.length)
            .with_context(|| match prefix {
                Some(prefix) => format!("prefix `{prefix}`"),
                None => "enumerator".into(),
            })?;
        while !DONE.load(Ordering::Relaxed) && self.maxout != 0 {
            let Some(machine) = enumerator.machine_mut() else {
                break;
            };
            if self.flags.random {
                if self.maxtry == 0 {
                    break;
                }
                self.maxtry -= 1;
            }
            if prefix.is_none() && self.mirror {
                let first = machine.instr(0, 0)?;
                if !first.is_fin() && first.direction() == Direction::Left {
                    machine.set_instr(0, 0, first.with_direction(Direction::Right))?;
                }
            }
            if let Decision::Accept(steps) = self.filters.decide(machine) {
                let dump = match self.length {
                    Some(length) => format::write_table_prefix(machine, length),
                    None => format::write_table(machine),
                };
                if self.append_steps {
                    writeln!(out, "{dump}\t{steps}")?;
                } else {
                    writeln!(out, "{dump}")?;
                }
                out.flush()?;
                self.maxout -= 1;
            }
            enumerator.advance();
        }
        Ok(())
    }
}

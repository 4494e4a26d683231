use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use btm::format;
use btm::machine::Machine;
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "simulator",
    about = "Run binary Turing machines from table specifications",
    allow_negative_numbers = true
)]
struct Cli {
    /// Only summarize each run.
    #[arg(short = 's')]
    summary: bool,

    /// For machines that did not finish, append the configuration after the
    /// last step to the summary.
    #[arg(short = 'c')]
    configuration: bool,

    /// Maximum number of steps; zero or negative means no limit.
    #[arg(short = 'n', value_name = "NSTEP", default_value_t = 50)]
    nstep: i64,

    /// Number of steps the machines count as having already run; it only
    /// offsets the printed step indices.
    #[arg(short = 'b', value_name = "START", default_value_t = 0)]
    start: i64,

    /// Table specifications, each optionally followed by a comma and an
    /// initial configuration. Read from stdin when none are given or the
    /// first one is `-`.
    specs: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("simulator: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let nstep = if cli.nstep <= 0 { i64::MAX } else { cli.nstep };
    let mut machine = Machine::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut clean = true;
    let mut emitted = 0usize;
    if cli.specs.is_empty() || cli.specs[0] == "-" {
        for line in std::io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            if line.trim_matches(|c| c == ' ' || c == '\t').is_empty() {
                continue;
            }
            if !cli.summary && emitted > 0 {
                writeln!(out)?;
            }
            emitted += 1;
            clean &= handle(&mut machine, &mut out, cli, nstep, &line)?;
        }
    } else {
        for (i, spec) in cli.specs.iter().enumerate() {
            if !cli.summary && i > 0 {
                writeln!(out)?;
            }
            clean &= handle(&mut machine, &mut out, cli, nstep, spec)?;
        }
    }
    Ok(clean)
}

/// Load one spec, apply its configuration and run it. Returns false when the
/// table failed to parse; the caller moves on to the next spec.
fn handle(
    machine: &mut Machine,
    out: &mut impl Write,
    cli: &Cli,
    nstep: i64,
    line: &str,
) -> Result<bool> {
    let (spec, configuration) = match line.split_once(',') {
        Some((spec, configuration)) => (spec, Some(configuration)),
        None => (line, None),
    };
    if let Err(err) = format::read_table(machine, spec) {
        eprintln!("simulator: load {spec}: {err}");
        return Ok(false);
    }
    machine.reset();
    if let Some(configuration) = configuration {
        format::read_configuration(machine, configuration)
            .with_context(|| format!("configuration `{configuration}`"))?;
    }
    let mut n: i64 = 0;
    if cli.summary {
        n = machine.run(nstep, None).context("run")?;
    } else {
        writeln!(out, "{spec}:")?;
        while n < nstep && machine.state() >= 0 {
            writeln!(
                out,
                "{}: {}",
                cli.start + n,
                format::write_configuration(machine)
            )?;
            machine.run(1, None).context("run")?;
            n += 1;
        }
    }
    if machine.state() < 0 {
        writeln!(out, "{spec} finished in {} steps", cli.start + n)?;
    } else if cli.configuration {
        writeln!(
            out,
            "{spec} continues after {} steps: {spec},{}",
            cli.start + n,
            format::write_configuration(machine)
        )?;
    } else {
        writeln!(out, "{spec} continues after {} steps", cli.start + n)?;
    }
    out.flush()?;
    Ok(true)
}

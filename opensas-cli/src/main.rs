//! `OpenSAS` CLI: run programs and print the listing and log.

use std::fs;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use opensas_core::{Interpreter, RunReport, Severity};

#[derive(Parser)]
#[command(version, about = "OpenSAS, a SAS-flavored scripting language interpreter")]
struct Cli {
    /// Program file to run
    file: Option<String>,

    /// Run a program given on the command line instead of reading a file
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Suppress NOTE lines in the log
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => {
            if report.has_errors() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<RunReport> {
    let source = read_source(cli)?;
    let mut interp = Interpreter::new();
    let report = interp.run(&source);

    // Listing first, then the log. Notes go to stdout, warnings and
    // errors to stderr.
    for line in &report.listing {
        println!("{line}");
    }
    for diag in &report.diagnostics {
        match diag.severity {
            Severity::Note => {
                if !cli.quiet {
                    println!("{diag}");
                }
            }
            Severity::Warning | Severity::Error => eprintln!("{diag}"),
        }
    }
    Ok(report)
}

fn read_source(cli: &Cli) -> Result<String> {
    if let Some(program) = &cli.eval {
        return Ok(program.clone());
    }
    if let Some(file) = &cli.file {
        return fs::read_to_string(file).with_context(|| format!("cannot read {file}"));
    }
    anyhow::bail!("no input file or program specified");
}

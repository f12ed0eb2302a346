use std::{
    io::{stdin, stdout, BufRead, Write},
    path::PathBuf,
};

use annexia::{Forth, ForthParams};
use clap::Parser;
use miette::{Context, IntoDiagnostic};
use owo_colors::{OwoColorize, Stream};
use tracing::level_filters::LevelFilter;

/// The standard library loaded unless `--bootstrap` or `--no-bootstrap` is
/// given.
const BOOTSTRAP: &str = include_str!("bootstrap.fs");

/// An interactive REPL for the annexia forth VM.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Load this forth file instead of the built-in standard library.
    #[arg(long, env = "ANNEXIA_BOOTSTRAP", conflicts_with = "no_bootstrap")]
    bootstrap: Option<PathBuf>,

    /// Start with only the native words.
    #[arg(long)]
    no_bootstrap: bool,

    /// Don't print the VM state before every prompt.
    #[arg(short, long)]
    quiet: bool,

    /// Run these lines, in order, and exit instead of starting the REPL.
    #[arg(short, long = "eval", value_name = "LINE")]
    eval: Vec<String>,

    /// Data stack capacity, in cells.
    #[arg(long, default_value_t = 1024)]
    data_stack: usize,

    /// Return stack capacity, in frames.
    #[arg(long, default_value_t = 1024)]
    return_stack: usize,

    /// a comma-separated list of `tracing` targets and levels to enable.
    ///
    /// for example, `info,annexia::vm=trace` will enable the `INFO` level
    /// globally, and every dispatched word in the VM.
    ///
    /// see <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html#filtering-with-targets>
    /// for more details on this syntax.
    #[arg(
        long = "trace",
        env = "ANNEXIA_TRACE",
        default_value_t = tracing_subscriber::filter::Targets::new().with_default(LevelFilter::WARN),
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

fn main() -> miette::Result<()> {
    use tracing_subscriber::prelude::*;

    let Args {
        bootstrap,
        no_bootstrap,
        quiet,
        eval,
        data_stack,
        return_stack,
        trace_filter,
    } = Args::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(trace_filter)
        .init();

    let params = ForthParams {
        data_stack_elems: data_stack,
        return_stack_elems: return_stack,
        ..ForthParams::default()
    };
    let mut forth = Forth::new(params, ())
        .into_diagnostic()
        .context("failed to create the VM")?;

    if !no_bootstrap {
        let source = match bootstrap {
            Some(path) => std::fs::read_to_string(&path)
                .into_diagnostic()
                .with_context(|| format!("failed to read {}", path.display()))?,
            None => BOOTSTRAP.to_string(),
        };
        load(&mut forth, &source)?;
    }

    if !eval.is_empty() {
        for line in &eval {
            let res = forth.process(line);
            print!("{}", forth.output.as_str());
            forth.output.clear();
            res.into_diagnostic()
                .with_context(|| format!("failed to run `{line}`"))?;
            if forth.is_halted() {
                break;
            }
        }
        println!();
        return Ok(());
    }

    repl(&mut forth, quiet)
}

/// Runs a forth source file, line by line.
fn load(forth: &mut Forth<()>, source: &str) -> miette::Result<()> {
    for (n, line) in source.lines().enumerate() {
        forth
            .process(line)
            .into_diagnostic()
            .with_context(|| format!("bootstrap line {}: `{line}`", n + 1))?;
    }
    let out = forth.output.as_str();
    if !out.is_empty() {
        tracing::info!(output = out, "bootstrap");
    }
    forth.output.clear();
    tracing::debug!(words = forth.word_names().len(), "bootstrap loaded");
    Ok(())
}

fn repl(forth: &mut Forth<()>, quiet: bool) -> miette::Result<()> {
    let mut lines = stdin().lock().lines();
    while !forth.is_halted() {
        if !quiet {
            print_state(forth);
        }
        print!("{} ", "»".if_supports_color(Stream::Stdout, |text| text.red()));
        stdout().flush().into_diagnostic()?;

        let Some(line) = lines.next() else {
            println!("bye");
            break;
        };
        let line = line.into_diagnostic().context("failed to read stdin")?;

        let res = forth.process(&line);
        print!("{}", forth.output.as_str());
        forth.output.clear();
        if let Err(report) = res.into_diagnostic().context("input failed") {
            println!();
            eprintln!("{report:?}");
            let rest = forth.input.remaining().trim();
            if !rest.is_empty() {
                eprintln!(
                    "unprocessed: {}",
                    rest.if_supports_color(Stream::Stderr, |text| text.dimmed())
                );
            }
        }
        println!("ok");
    }
    Ok(())
}

fn print_state(forth: &Forth<()>) {
    let stack = forth
        .stack()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let vars = forth.variable_names().collect::<Vec<_>>().join(" ");
    let bar = "|".if_supports_color(Stream::Stdout, |text| text.dimmed());
    println!("{bar}  STATE: {}", forth.state());
    println!("{bar}  STACK: [{stack}]");
    println!("{bar}  DICT: [{}]", forth.word_names().join(" "));
    println!("{bar}  VARS: [{vars}]");
    println!("----");
    println!();
}

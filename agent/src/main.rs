// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Agent binary entry point.
//!
//! Ordinarily launched by the library-side spawner with four positional
//! arguments; the remaining options exist for debugging the agent itself.

use clap::error::ErrorKind;
use clap::Parser;
use winpty_agent::debug_env::{init_tracing, DebugFlags};
use winpty_agent::input::show_input::debug_show_input;

#[derive(Debug, Parser)]
#[command(name = "winpty-agent")]
#[command(version)]
#[command(about = "Console-scraping agent bridging a Windows console child \
                   to a VT100 terminal over named pipes.")]
#[command(after_help = "Ordinarily, this program is launched by the winpty \
                        library and is not directly useful on its own.")]
struct Cli {
    /// Control pipe name (e.g. \\.\pipe\winpty-...-control)
    control_pipe: Option<String>,

    /// Data pipe name
    data_pipe: Option<String>,

    /// Initial columns
    cols: Option<i16>,

    /// Initial rows
    rows: Option<i16>,

    /// Dump INPUT_RECORDs from the console input buffer (debugging)
    #[arg(long)]
    show_input: bool,

    /// Include MOUSE_EVENT records in the --show-input dump
    #[arg(long, requires = "show_input")]
    with_mouse: bool,
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            // Help and --version print to stdout and exit 0.
            err.exit()
        }
        Err(err) => {
            // Anything else is a startup error: usage to stderr, exit 1.
            eprintln!("{err}");
            std::process::exit(1)
        }
    }
}

fn main() -> miette::Result<()> {
    let cli = parse_cli();

    if cli.show_input {
        debug_show_input(cli.with_mouse);
        return Ok(());
    }

    let (Some(control_pipe), Some(data_pipe), Some(cols), Some(rows)) = (
        cli.control_pipe.clone(),
        cli.data_pipe.clone(),
        cli.cols,
        cli.rows,
    ) else {
        eprintln!(
            "Usage: winpty-agent controlPipeName dataPipeName cols rows\n\
             Try 'winpty-agent --help' for more information."
        );
        std::process::exit(1)
    };

    run_agent(&control_pipe, &data_pipe, cols, rows)
}

#[cfg(windows)]
fn run_agent(
    control_pipe: &str,
    data_pipe: &str,
    cols: i16,
    rows: i16,
) -> miette::Result<()> {
    use miette::IntoDiagnostic;

    let flags = DebugFlags::from_env();
    let _tracing_guard = init_tracing(&flags);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async {
        let mut agent = match winpty_agent::agent::Agent::new(
            control_pipe,
            data_pipe,
            cols,
            rows,
            &flags,
        ) {
            Ok(agent) => agent,
            Err(err) => {
                // Startup failure: usage-style message on stderr, exit 1.
                eprintln!("winpty-agent: {err}");
                std::process::exit(1)
            }
        };
        agent.run().await
    })
}

#[cfg(not(windows))]
fn run_agent(
    _control_pipe: &str,
    _data_pipe: &str,
    _cols: i16,
    _rows: i16,
) -> miette::Result<()> {
    // Keep the env-var plumbing linked on every platform.
    let _flags = DebugFlags::from_env();
    let _tracing_guard = init_tracing(&_flags);
    eprintln!("winpty-agent: the agent only runs on a Windows console host");
    std::process::exit(1)
}

use std::io;

use anyhow::anyhow;
use clap::Parser;
use log::LevelFilter;

mod app;
mod ax25;
mod cli;

use cli::{Args, CliError};

fn main() {
    match m17dec() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn m17dec() -> Result<(), CliError> {
    let args = Args::try_parse()?;
    log_setup(&args);

    if is_terminal(&io::stdin()) {
        return Err(anyhow!(
            "cowardly refusing to read baseband samples from a terminal.

Pipe raw 48 kHz signed 16-bit samples from rtl_fm, sox, or similar
into this program."
        )
        .into());
    }

    let stdin = io::stdin();
    let input = io::BufReader::new(stdin.lock());
    app::run(&args, input).map_err(CliError::from)
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging at all
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        let log_filter = if args.debug {
            LevelFilter::Debug
        } else if args.verbose || args.lsf {
            // -l output is rendered at info level
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        };

        pretty_env_logger::formatted_builder()
            .filter_module("m17rx", log_filter)
            .filter_module("m17dec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

#[cfg(not(target_os = "windows"))]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::fd::AsRawFd,
{
    terminal_size::terminal_size_using_fd(stream.as_raw_fd()).is_some()
}

#[cfg(target_os = "windows")]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::windows::io::AsRawHandle,
{
    terminal_size::terminal_size_using_handle(stream.as_raw_handle()).is_some()
}

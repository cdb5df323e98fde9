use std::fmt::Display;

use clap::{error::ErrorKind, ArgGroup, CommandFactory, Parser};

const USAGE_LONG: &str = r#"
This program reads M17 baseband from standard input as raw signed 16-bit little-endian PCM samples at 48000 Hz and writes decoded output to standard output.

For a voice stream, the output is 8 kHz signed 16-bit PCM audio, two 160-sample blocks per frame. Play it with sox:

    rtl_fm -f 433.475M -s 48k | m17-demod -l | play -q -b 16 -r 8000 -c1 -t s16 -

For full packet mode, the concatenated packet payload is written instead. AX.25 basic packets are formatted on the diagnostic channel.

Decoded link setup frames, BERT statistics, and modem telemetry go to standard error.
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(name = "m17-demod")]
#[command(version)]
#[command(about = "Decode M17 baseband from standard input and write audio to standard output")]
#[command(after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
#[command(group = ArgGroup::new("output_level").args(["verbose", "debug", "quiet"]))]
pub struct Args {
    /// Invert the received baseband
    #[arg(short, long)]
    pub invert: bool,

    /// Noise blanker: silence likely corrupt audio
    #[arg(short = 'b', long)]
    pub noise_blanker: bool,

    /// Display each decoded link setup frame
    #[arg(short = 'l', long)]
    pub lsf: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug-level output with live modem telemetry
    #[arg(short, long)]
    pub debug: bool,

    /// Silence all diagnostic output, including BERT statistics
    #[arg(short, long)]
    pub quiet: bool,
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other errors go
    /// through clap's formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

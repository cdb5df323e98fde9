//! Pipeline wiring
//!
//! Reads raw i16 little-endian samples from standard input, drives
//! the demodulator session, and routes its outputs: decoded audio
//! and full-packet payloads to standard output, AX.25 text and
//! telemetry to standard error.
//!
//! A closed standard output (the player went away) ends the run
//! without an error; that is the normal way to stop a pipeline.

use std::io::{self, BufRead, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use codec2::{Codec2, Codec2Mode};
use log::warn;

use m17rx::{DemodConfig, Diagnostics, FrameSink, SpeechDecoder};

use crate::ax25::Ax25Frame;
use crate::cli::Args;

/// Run the decoder against an input stream
pub fn run<R>(args: &Args, mut input: R) -> anyhow::Result<()>
where
    R: BufRead,
{
    let config = *DemodConfig::default()
        .with_invert_input(args.invert)
        .with_noise_blanker(args.noise_blanker)
        .with_display_lsf(args.lsf);

    let stdout = io::stdout();
    let sink = StdSink {
        out: io::BufWriter::new(stdout.lock()),
        debug: args.debug,
        quiet: args.quiet,
    };

    let mut session = config.build(Codec2Speech::new(), sink);

    loop {
        match input.read_i16::<LittleEndian>() {
            Ok(sample) => {
                if let Err(e) = session.process(sample) {
                    return end_of_pipe(e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = session.flush() {
        return end_of_pipe(e);
    }

    if !args.quiet {
        eprintln!();
    }
    Ok(())
}

// a broken pipe is a normal end of stream, anything else is real
fn end_of_pipe(e: io::Error) -> anyhow::Result<()> {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e.into())
    }
}

/// Codec2 3200 bit/s speech decoding
pub struct Codec2Speech {
    codec: Codec2,
}

impl Codec2Speech {
    pub fn new() -> Self {
        Self {
            codec: Codec2::new(Codec2Mode::MODE_3200),
        }
    }
}

impl Default for Codec2Speech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechDecoder for Codec2Speech {
    fn decode(&mut self, frame: &[u8]) -> [i16; 160] {
        let mut out = [0i16; 160];
        self.codec.decode(&mut out, frame);
        out
    }
}

/// Routes session output to the standard streams
struct StdSink<W>
where
    W: Write,
{
    out: W,
    debug: bool,
    quiet: bool,
}

impl<W> FrameSink for StdSink<W>
where
    W: Write,
{
    fn audio(&mut self, pcm: &[i16; 160]) -> io::Result<()> {
        for &sample in pcm {
            self.out.write_i16::<LittleEndian>(sample)?;
        }
        self.out.flush()
    }

    fn packet(&mut self, payload: &[u8]) -> io::Result<()> {
        self.out.write_all(payload)?;
        self.out.flush()
    }

    fn basic_packet(&mut self, payload: &[u8]) {
        // the last two bytes are the packet checksum
        let body = &payload[..payload.len().saturating_sub(2)];
        match Ax25Frame::parse(body) {
            Some(frame) => eprintln!("\n{}", frame),
            None => warn!("basic packet is not a parseable AX.25 frame ({} bytes)", payload.len()),
        }
    }

    fn diagnostics(&mut self, diag: &Diagnostics) {
        if self.quiet {
            return;
        }

        if self.debug {
            eprint!(
                "\rdcd: {}, evm: {:7.3}%, deviation: {:7.4}, freq offset: {:7.4}, locked: {:5}, clock: {:7.5}, sample: {}, {}, {}, cost: {}",
                diag.dcd as u8,
                diag.evm * 100.0,
                diag.deviation,
                diag.freq_offset,
                diag.locked,
                diag.clock,
                diag.sample_index,
                diag.sync_index,
                diag.clock_index,
                diag.viterbi_cost,
            );
        }

        if let Some(ber) = &diag.ber {
            if self.debug {
                eprint!(", {}", ber);
            } else {
                eprint!("\r{}", ber);
            }
        }
    }
}

//! # m17rx: M17 baseband demodulation
//!
//! This crate demodulates and decodes [M17](https://m17project.org/)
//! digital voice and data transmissions from raw 48 kHz baseband, as
//! produced by a discriminator-tapped FM receiver or an SDR FM
//! demodulator. It recovers the 4800 baud 4FSK symbol stream, locks
//! onto frame sync words, undoes the whitening, interleaving and
//! punctured convolutional coding, and hands back typed frames:
//! link setup, voice stream, packet data and bit error rate test.
//!
//! ## Example
//!
//! The demodulator is driven one `i16` sample at a time through a
//! [`DemodSession`]. The caller supplies the two capabilities the
//! session cannot provide itself: a Codec2 implementation behind the
//! [`SpeechDecoder`] trait and a [`FrameSink`] for decoded output.
//!
//! ```
//! use m17rx::{DemodConfig, Diagnostics, FrameSink, SpeechDecoder};
//!
//! struct Mute;
//!
//! impl SpeechDecoder for Mute {
//!     fn decode(&mut self, _frame: &[u8]) -> [i16; 160] {
//!         [0; 160]
//!     }
//! }
//!
//! struct Discard;
//!
//! impl FrameSink for Discard {
//!     fn audio(&mut self, _pcm: &[i16; 160]) -> std::io::Result<()> {
//!         Ok(())
//!     }
//!     fn packet(&mut self, _payload: &[u8]) -> std::io::Result<()> {
//!         Ok(())
//!     }
//!     fn basic_packet(&mut self, _payload: &[u8]) {}
//!     fn diagnostics(&mut self, _diag: &Diagnostics) {}
//! }
//!
//! let mut session = DemodConfig::default().build(Mute, Discard);
//!
//! // feed little-endian i16 samples at 48 kHz
//! for sample in [0i16; 480] {
//!     session.process(sample)?;
//! }
//! session.flush()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! The lower layers are public for callers that want the pieces
//! without the session: [`M17Receiver`] turns samples into
//! [`ReceiverEvent`]s, and [`FrameDecoder`] turns 368 soft bits into
//! [`OutputFrame`]s.
//!
//! ## Signal path
//!
//! Input samples are divided by 44000 to land near ±1.0, negated if
//! the baseband is inverted, matched-filtered with a root-raised-
//! cosine FIR, and watched by a power-ratio carrier detector. A
//! correlator searches for the four 8-symbol sync words at every
//! sub-symbol phase; detections seed the symbol clock, select the
//! frame type and calibrate the 4-level slicer. The framer gathers
//! 368 soft bits per frame for the FEC stack: derandomize,
//! deinterleave, depuncture and a 16-state soft Viterbi decode.
//!
//! The pipeline is single threaded and allocation free on the
//! per-sample path. Everything recoverable is absorbed internally:
//! low signal, sync misses and FEC failures cost output, never
//! errors.

#![allow(dead_code)]

mod builder;
mod decoder;
mod lsf;
mod prbs;
mod receiver;
mod session;

pub use builder::DemodConfig;
pub use decoder::{
    Crc16, DecodedFrames, FrameDecoder, OutputFrame, LSF_CRC, PACKET_CRC, PACKET_CRC_RESIDUE,
};
pub use lsf::{
    encode_callsign, Callsign, LinkSetupFrame, LsfDecodeErr, Mode, PacketType, StreamType,
};
pub use prbs::{Prbs9, PrbsValidator};
pub use receiver::{
    BerReport, Diagnostics, FrameBits, FrameKind, M17Receiver, ReceiverEvent, FRAME_BITS,
    FRAME_SAMPLES, SAMPLES_PER_SYMBOL, SAMPLE_RATE, SAMPLE_SCALE, SYMBOL_RATE,
};
pub use session::{DemodSession, FrameSink, SpeechDecoder};

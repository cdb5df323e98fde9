//! M17 waveform constants and symbol mapping
//!
//! M17 transmits 4-level FSK at 4800 baud. Each symbol carries one
//! dibit; the first (earliest) bit of the dibit selects the sign and
//! the second selects the inner/outer level:
//!
//! ```txt
//! bits  symbol
//!  01     +3
//!  00     +1
//!  10     -1
//!  11     -3
//! ```
//!
//! Frames are 192 symbols long: an 8-symbol sync word followed by 184
//! data symbols (368 bits). At the nominal 48 kHz input rate this is
//! one frame every 40 ms.
//!
//! This module also contains the root-raised-cosine pulse shape and a
//! small set of modulation helpers. The helpers generate baseband for
//! the unit tests; the transmit path is not a product surface.

use lazy_static::lazy_static;

/// Nominal input sampling rate, in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// M17 symbol rate, in baud
pub const SYMBOL_RATE: u32 = 4_800;

/// Input samples per symbol
pub const SAMPLES_PER_SYMBOL: usize = (SAMPLE_RATE / SYMBOL_RATE) as usize;

/// Divisor which maps i16 input samples to approximately ±1.0
pub const SAMPLE_SCALE: f32 = 44_000.0;

/// Symbols in a sync word
pub const SYNC_SYMBOLS: usize = 8;

/// Data symbols per frame, after the sync word
pub const FRAME_DATA_SYMBOLS: usize = 184;

/// Data bits per frame
pub const FRAME_BITS: usize = 2 * FRAME_DATA_SYMBOLS;

/// Total samples per frame, sync word included
pub const FRAME_SAMPLES: usize = (SYNC_SYMBOLS + FRAME_DATA_SYMBOLS) * SAMPLES_PER_SYMBOL;

/// RRC roll-off factor
pub const RRC_BETA: f32 = 0.5;

/// One-sided RRC span, in symbols
pub const RRC_SPAN_SYMBOLS: usize = 4;

/// Matched filter length, in taps
pub const RRC_TAPS_LEN: usize = 2 * RRC_SPAN_SYMBOLS * SAMPLES_PER_SYMBOL + 1;

lazy_static! {
    /// Root-raised-cosine matched filter taps, unit DC gain
    pub static ref RRC_TAPS: [f32; RRC_TAPS_LEN] = rrc_taps();
}

/// Frame types, as selected by the opening sync word
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Link setup frame
    Lsf,
    /// Voice stream frame
    Stream,
    /// Packet data frame
    Packet,
    /// Bit error rate test frame
    Bert,
}

impl FrameKind {
    /// All frame kinds, in sync word search order
    pub const ALL: [FrameKind; 4] = [
        FrameKind::Lsf,
        FrameKind::Stream,
        FrameKind::Packet,
        FrameKind::Bert,
    ];

    /// The 16-bit sync word which opens this frame kind
    ///
    /// Sync words are expressed earliest bit first in the most
    /// significant position. All four map to outer (±3) symbols
    /// only, which gives the correlator a clean amplitude
    /// reference at every detection.
    pub fn sync_word(&self) -> u16 {
        match self {
            FrameKind::Lsf => 0x55F7,
            FrameKind::Stream => 0xFF5D,
            FrameKind::Packet => 0x75FF,
            FrameKind::Bert => 0xDF55,
        }
    }

    /// Ideal symbol sequence of this kind's sync word
    pub fn sync_symbols(&self) -> [f32; SYNC_SYMBOLS] {
        let word = self.sync_word();
        let mut out = [0.0f32; SYNC_SYMBOLS];
        for (i, sym) in out.iter_mut().enumerate() {
            let dibit = ((word >> (14 - 2 * i)) & 0x3) as u8;
            *sym = dibit_to_symbol(dibit);
        }
        out
    }
}

impl AsRef<str> for FrameKind {
    fn as_ref(&self) -> &str {
        match self {
            FrameKind::Lsf => "LSF",
            FrameKind::Stream => "STREAM",
            FrameKind::Packet => "PACKET",
            FrameKind::Bert => "BERT",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Map a dibit onto its ideal symbol level
///
/// The earliest bit of the dibit is the most significant.
#[inline]
pub fn dibit_to_symbol(dibit: u8) -> f32 {
    match dibit & 0x3 {
        0b01 => 3.0,
        0b00 => 1.0,
        0b10 => -1.0,
        _ => -3.0,
    }
}

/// Soft bit estimates for a symbol
///
/// Accepts a symbol `value` normalized so that the ideal levels are
/// ±1 and ±3. Returns `(sign, magnitude)` soft bits in `[0.0, 1.0]`,
/// where `0.0` is a confident zero, `1.0` is a confident one and
/// `0.5` is unknown. The sign bit is the earlier bit of the dibit.
#[inline]
pub fn symbol_to_soft_bits(value: f32) -> (f32, f32) {
    let sign = f32::clamp(0.5 - value * 0.5, 0.0, 1.0);
    let magnitude = f32::clamp((value.abs() - 1.0) * 0.5, 0.0, 1.0);
    (sign, magnitude)
}

/// Nearest ideal symbol level
#[inline]
pub fn nearest_symbol(value: f32) -> f32 {
    let sign = if value < 0.0 { -1.0 } else { 1.0 };
    if value.abs() >= 2.0 {
        3.0 * sign
    } else {
        1.0 * sign
    }
}

// Root-raised-cosine impulse response
//
// beta = 0.5 places tap instants exactly on the 1/(4*beta)
// singularity, which needs its closed form.
fn rrc_taps() -> [f32; RRC_TAPS_LEN] {
    use std::f32::consts::{FRAC_PI_4, PI};

    let mut taps = [0.0f32; RRC_TAPS_LEN];
    let center = (RRC_TAPS_LEN / 2) as i32;
    let beta = RRC_BETA;

    for (i, tap) in taps.iter_mut().enumerate() {
        let t = (i as i32 - center) as f32 / SAMPLES_PER_SYMBOL as f32;
        *tap = if t == 0.0 {
            1.0 + beta * (4.0 / PI - 1.0)
        } else if (4.0 * beta * t).abs() == 1.0 {
            let a = (1.0 + 2.0 / PI) * f32::sin(FRAC_PI_4 / beta);
            let b = (1.0 - 2.0 / PI) * f32::cos(FRAC_PI_4 / beta);
            beta / f32::sqrt(2.0) * (a + b)
        } else {
            let num = f32::sin(PI * t * (1.0 - beta)) + 4.0 * beta * t * f32::cos(PI * t * (1.0 + beta));
            let den = PI * t * (1.0 - (4.0 * beta * t) * (4.0 * beta * t));
            num / den
        };
    }

    let sum: f32 = taps.iter().sum();
    for tap in taps.iter_mut() {
        *tap /= sum;
    }
    taps
}

/// Expand packed frame bits into symbols
///
/// `bits` holds 368 unpacked bits (one per element, values 0/1),
/// earliest first. Returns the 184 ideal data symbols.
pub fn bits_to_symbols(bits: &[u8]) -> Vec<f32> {
    bits.chunks(2)
        .map(|pair| dibit_to_symbol((pair[0] << 1) | pair[1]))
        .collect()
}

/// Modulate symbols onto RRC-shaped baseband
///
/// Upsamples the `symbols` by [`SAMPLES_PER_SYMBOL`] as an impulse
/// train and shapes it with the RRC pulse. The output amplitude is
/// scaled so an outer (±3) symbol peaks near ±`amplitude`. A filter
/// span of zero symbols is appended so the final pulse tails drain.
///
/// This is the test-signal source; a real transmitter would also
/// need a frequency modulator behind it.
pub fn modulate(symbols: &[f32], amplitude: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity((symbols.len() + RRC_SPAN_SYMBOLS) * SAMPLES_PER_SYMBOL);
    let taps = &*RRC_TAPS;

    // peak gain of one impulse through the sum-normalized pulse
    let peak = taps[RRC_TAPS_LEN / 2];
    let gain = amplitude / (3.0 * peak);

    let total = (symbols.len() + 2 * RRC_SPAN_SYMBOLS) * SAMPLES_PER_SYMBOL;
    let mut history = std::collections::VecDeque::from(vec![0.0f32; RRC_TAPS_LEN]);
    for n in 0..total {
        let impulse = if n % SAMPLES_PER_SYMBOL == 0 {
            symbols.get(n / SAMPLES_PER_SYMBOL).copied().unwrap_or(0.0) * gain
        } else {
            0.0
        };
        history.pop_front();
        history.push_back(impulse);
        let mut acc = 0.0f32;
        for (h, c) in history.iter().rev().zip(taps.iter()) {
            acc += h * c;
        }
        out.push(acc);
    }
    out
}

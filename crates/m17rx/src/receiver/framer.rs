//! Frame assembly
//!
//! Collects recovered symbols into 368-bit frames. The framer is a
//! two-state machine: it idles until a sync word detection starts a
//! frame, then slices each symbol into two soft bits until the frame
//! is full. A full frame is handed to the FEC decoder and the framer
//! returns to idle; the clock recovery loop stays locked, since the
//! next sync word follows immediately in a continuous transmission.
//!
//! Partial frames are never emitted. Loss of carrier for longer
//! than the unlock timeout discards any frame in progress.

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use super::waveform::{symbol_to_soft_bits, FrameKind, FRAME_BITS};

/// Soft bits of one assembled frame
pub type FrameBits = [f32; FRAME_BITS];

/// Frame assembler
#[derive(Clone, Debug)]
pub struct Framer {
    state: State,
}

#[derive(Clone, Debug)]
enum State {
    /// Waiting for a sync word
    Unlocked,

    /// Collecting symbols for a frame of the given kind
    Synced {
        kind: FrameKind,
        bits: ArrayVec<f32, FRAME_BITS>,
    },
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: State::Unlocked,
        }
    }

    /// Begin a frame
    ///
    /// Called on a sync word detection. Any frame in progress is
    /// discarded; the accumulator restarts empty.
    pub fn start(&mut self, kind: FrameKind) {
        if let State::Synced { kind: old, bits } = &self.state {
            debug!("framer: resync to {} discards {} bits of {}", kind, bits.len(), old);
        }
        self.state = State::Synced {
            kind,
            bits: ArrayVec::new(),
        };
    }

    /// Accept one recovered symbol
    ///
    /// The symbol must be normalized so the ideal levels are ±1 and
    /// ±3. Returns the completed frame once 368 bits have been
    /// gathered.
    pub fn input(&mut self, symbol: f32) -> Option<(FrameKind, FrameBits)> {
        let State::Synced { kind, bits } = &mut self.state else {
            return None;
        };

        let (sign, magnitude) = symbol_to_soft_bits(symbol);
        bits.push(sign);
        bits.push(magnitude);

        if bits.is_full() {
            let kind = *kind;
            let bits = std::mem::take(bits)
                .into_inner()
                .expect("full frame accumulator");
            self.state = State::Unlocked;
            Some((kind, bits))
        } else {
            None
        }
    }

    /// True while a frame is being collected
    pub fn is_locked(&self) -> bool {
        matches!(self.state, State::Synced { .. })
    }

    /// Discard any frame in progress
    pub fn reset(&mut self) {
        self.state = State::Unlocked;
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::receiver::waveform::FRAME_DATA_SYMBOLS;

    #[test]
    fn test_idle_eats_symbols() {
        let mut framer = Framer::new();
        assert!(!framer.is_locked());
        for _i in 0..1000 {
            assert_eq!(None, framer.input(3.0));
        }
    }

    #[test]
    fn test_collects_full_frame() {
        let mut framer = Framer::new();
        framer.start(FrameKind::Bert);
        assert!(framer.is_locked());

        let mut out = None;
        for i in 0..FRAME_DATA_SYMBOLS {
            let sym = if i % 2 == 0 { 3.0 } else { -1.0 };
            let res = framer.input(sym);
            if i + 1 < FRAME_DATA_SYMBOLS {
                assert!(res.is_none());
            } else {
                out = res;
            }
        }

        let (kind, bits) = out.expect("frame");
        assert_eq!(kind, FrameKind::Bert);
        assert!(!framer.is_locked());

        // +3 slices to dibit 01, -1 to dibit 10
        assert_eq!(&bits[0..4], &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_resync_discards_partial() {
        let mut framer = Framer::new();
        framer.start(FrameKind::Stream);
        for _i in 0..10 {
            framer.input(1.0);
        }

        framer.start(FrameKind::Packet);
        let mut got = None;
        for _i in 0..FRAME_DATA_SYMBOLS {
            got = framer.input(-3.0);
        }
        let (kind, bits) = got.expect("frame");
        assert_eq!(kind, FrameKind::Packet);
        assert!(bits.iter().all(|&b| b == 1.0));
    }

    #[test]
    fn test_reset_discards() {
        let mut framer = Framer::new();
        framer.start(FrameKind::Lsf);
        framer.input(3.0);
        framer.reset();
        assert!(!framer.is_locked());
        for _i in 0..FRAME_DATA_SYMBOLS {
            assert_eq!(None, framer.input(3.0));
        }
    }
}

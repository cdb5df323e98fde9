//! Sync word correlation
//!
//! Searches the filtered sample stream for the four M17 sync words.
//! The detector holds the last eight symbols worth of samples in a
//! circular window. On every input sample it correlates the window,
//! downsampled at the newest alignment, against each sync word's
//! ideal ±3 symbol sequence.
//!
//! Scores are normalized by the RMS of the sampled window taps, so a
//! perfectly aligned clean sync word scores 1.0 regardless of signal
//! level. A candidate above threshold is max-held for half a symbol
//! so the detector fires on the correlation peak rather than its
//! leading edge; after firing, re-detection is suppressed for a full
//! symbol.
//!
//! Because every M17 sync word uses outer symbols only, the mean
//! magnitude of the window taps at the moment of detection is a
//! direct estimate of the ±3 amplitude. That estimate seeds the
//! symbol slicer downstream.

use arraydeque::ArrayDeque;

use super::waveform::{FrameKind, SAMPLES_PER_SYMBOL, SYNC_SYMBOLS};

// window length in samples
const WINDOW_LEN: usize = SYNC_SYMBOLS * SAMPLES_PER_SYMBOL;

// samples to hold a candidate before declaring its peak
const PEAK_HOLD: u64 = (SAMPLES_PER_SYMBOL / 2) as u64;

/// A detected sync word
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncDetect {
    /// Frame kind opened by this sync word
    pub kind: FrameKind,

    /// Sub-symbol phase of the detection, `0..SAMPLES_PER_SYMBOL`
    pub phase: u32,

    /// Normalized correlation score, 1.0 for a perfect match
    pub score: f32,

    /// Estimated amplitude of an outer (±3) symbol
    pub amplitude: f32,
}

// candidate detection, held until its peak passes
#[derive(Clone, Copy, Debug)]
struct Candidate {
    detect: SyncDetect,
    at: u64,
}

/// Sync word detector over all four M17 patterns
#[derive(Clone, Debug)]
pub struct SyncDetector {
    window: ArrayDeque<f32, WINDOW_LEN, arraydeque::Wrapping>,
    references: [[f32; SYNC_SYMBOLS]; 4],
    threshold: f32,
    candidate: Option<Candidate>,
    holdoff_until: u64,
}

impl SyncDetector {
    /// Create detector with the given score threshold
    ///
    /// `threshold` is a normalized correlation score in `(0, 1)`.
    /// Values near 0.8 reject data that merely resembles a sync
    /// word while still detecting sync under realistic noise.
    pub fn new(threshold: f32) -> Self {
        let mut references = [[0.0f32; SYNC_SYMBOLS]; 4];
        for (r, kind) in references.iter_mut().zip(FrameKind::ALL) {
            *r = kind.sync_symbols();
        }

        let mut out = Self {
            window: ArrayDeque::new(),
            references,
            threshold,
            candidate: None,
            holdoff_until: 0,
        };
        out.reset();
        out
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.window.clear();
        for _i in 0..WINDOW_LEN {
            let _ = self.window.push_back(0.0);
        }
        self.candidate = None;
        self.holdoff_until = 0;
    }

    /// Push one filtered sample and search for sync
    ///
    /// `sample_counter` is the lifetime input sample count.
    /// `armed` gates the search: the window always advances, but
    /// candidates are only considered while `armed` is true, which
    /// the receiver uses to require carrier and to disarm the
    /// search mid-frame. Returns a detection when a correlation
    /// peak has been confirmed. The peak confirmation delays the
    /// report by half a symbol: when this method returns `Some`,
    /// the final sync symbol's sampling instant was
    /// [`SAMPLES_PER_SYMBOL`]`/2` samples ago.
    pub fn input(&mut self, sample: f32, sample_counter: u64, armed: bool) -> Option<SyncDetect> {
        self.window.push_back(sample);

        if !armed {
            self.candidate = None;
            return None;
        }
        if sample_counter < self.holdoff_until {
            return None;
        }

        // symbol-rate taps at the newest alignment
        let mut taps = [0.0f32; SYNC_SYMBOLS];
        for (k, tap) in taps.iter_mut().enumerate() {
            *tap = self.window[k * SAMPLES_PER_SYMBOL + SAMPLES_PER_SYMBOL - 1];
        }

        let energy: f32 = taps.iter().map(|t| t * t).sum();
        let rms = (energy / SYNC_SYMBOLS as f32).sqrt();

        // sync words are outer symbols only, so every tap should
        // carry a similar magnitude. Frame data whose signs mimic a
        // sync word still mixes in ±1 symbols, and this test
        // rejects it.
        let amplitude = taps.iter().map(|t| t.abs()).sum::<f32>() / SYNC_SYMBOLS as f32;
        let min_abs = taps.iter().map(|t| t.abs()).fold(f32::INFINITY, f32::min);
        let level_consistent = min_abs >= 0.5 * amplitude;

        if rms > 1.0e-5 && level_consistent {
            let norm = rms * 3.0 * SYNC_SYMBOLS as f32;
            for (reference, kind) in self.references.iter().zip(FrameKind::ALL) {
                let corr: f32 = taps.iter().zip(reference.iter()).map(|(t, r)| t * r).sum();
                let score = corr / norm;
                if score > self.threshold
                    && self.candidate.map_or(true, |c| score > c.detect.score)
                {
                    self.candidate = Some(Candidate {
                        detect: SyncDetect {
                            kind,
                            phase: (sample_counter % SAMPLES_PER_SYMBOL as u64) as u32,
                            score,
                            amplitude,
                        },
                        at: sample_counter,
                    });
                }
            }
        }

        // fire once the peak is half a symbol old
        match self.candidate {
            Some(c) if sample_counter >= c.at + PEAK_HOLD => {
                self.candidate = None;
                self.holdoff_until = sample_counter + SAMPLES_PER_SYMBOL as u64;
                Some(c.detect)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::receiver::waveform;

    // build a sample stream holding the given symbols at
    // SAMPLES_PER_SYMBOL, flat within each symbol period
    fn hold_symbols(symbols: &[f32], amplitude: f32) -> Vec<f32> {
        let mut out = Vec::new();
        for &s in symbols {
            for _i in 0..SAMPLES_PER_SYMBOL {
                out.push(s / 3.0 * amplitude);
            }
        }
        out
    }

    #[test]
    fn test_detects_each_sync_kind() {
        for kind in FrameKind::ALL {
            let mut det = SyncDetector::new(0.8);

            let mut symbols = vec![1.0f32, -1.0, 1.0, -1.0];
            symbols.extend(kind.sync_symbols());
            symbols.extend([0.0f32; 2]);
            let samples = hold_symbols(&symbols, 0.5);

            let mut found = None;
            for (n, &s) in samples.iter().enumerate() {
                if let Some(d) = det.input(s, n as u64, true) {
                    found = Some((n, d));
                    break;
                }
            }

            let (n, detect) = found.unwrap_or_else(|| panic!("no {} sync", kind));
            assert_eq!(detect.kind, kind);
            assert!(detect.score > 0.95, "score {}", detect.score);
            assert!((detect.amplitude - 0.5).abs() < 0.05);

            // with flat held symbols the first perfect alignment is
            // the first sample of the final sync symbol's period, and
            // the detector fires PEAK_HOLD samples after it
            let first_align = (4 + SYNC_SYMBOLS - 1) * SAMPLES_PER_SYMBOL;
            assert_eq!(n, first_align + PEAK_HOLD as usize);
        }
    }

    #[test]
    fn test_dcd_gates_detection() {
        let kind = FrameKind::Lsf;
        let samples = hold_symbols(&kind.sync_symbols(), 0.5);

        let mut det = SyncDetector::new(0.8);
        for (n, &s) in samples.iter().enumerate() {
            assert_eq!(None, det.input(s, n as u64, false));
        }
    }

    #[test]
    fn test_data_does_not_trigger() {
        // alternating inner/outer data with no sync structure
        let symbols: Vec<f32> = (0..64)
            .map(|i| waveform::dibit_to_symbol((i % 3) as u8))
            .collect();
        let samples = hold_symbols(&symbols, 0.5);

        let mut det = SyncDetector::new(0.8);
        for (n, &s) in samples.iter().enumerate() {
            assert_eq!(None, det.input(s, n as u64, true));
        }
    }
}

//! Soft-decision Viterbi decoder
//!
//! Decodes the 16-state M17 convolutional code. Soft bits are
//! expressed in `[0.0, 1.0]` with 0.5 meaning "no information"; the
//! branch metric is the sum of absolute differences between the
//! branch's expected bits and the received soft bits, so a clean
//! frame accumulates a metric of exactly zero.
//!
//! Punctured positions carry the neutral value 0.5 and add a
//! constant half-point to every branch at that step. The caller
//! reports the neutral count and [`Viterbi::decode`] subtracts that
//! constant, keeping the cost comparable across frame types.
//!
//! All M17 blocks are zero-terminated, so the traceback always
//! starts from state zero. Decision storage is a fixed array sized
//! for the longest block (the 244-step link setup frame); nothing
//! allocates per frame.

use super::convolution::{branch_bits, NUM_STATES};

// trellis steps in the longest coded block (LSF)
const MAX_STEPS: usize = 244;

// effectively infinite path metric
const UNREACHABLE: f32 = 1.0e9;

/// Fixed-trellis Viterbi decoder
#[derive(Clone, Debug)]
pub struct Viterbi {
    // expected (c1, c2) for each (state << 1 | bit) branch
    outputs: [(f32, f32); 2 * NUM_STATES],

    // survivor decisions, one bit per state per step
    decisions: [u16; MAX_STEPS],

    metrics: [f32; NUM_STATES],
    next_metrics: [f32; NUM_STATES],
}

impl Viterbi {
    pub fn new() -> Self {
        let mut outputs = [(0.0f32, 0.0f32); 2 * NUM_STATES];
        for (mem, out) in outputs.iter_mut().enumerate() {
            let (c1, c2) = branch_bits(mem as u8);
            *out = (c1 as f32, c2 as f32);
        }

        Self {
            outputs,
            decisions: [0u16; MAX_STEPS],
            metrics: [0.0f32; NUM_STATES],
            next_metrics: [0.0f32; NUM_STATES],
        }
    }

    /// Decode one terminated block
    ///
    /// `soft` holds two coded soft bits per trellis step and must be
    /// an even length of at most `2 * 244`. Decoded bits, flush bits
    /// included, are written to `out`, which must hold
    /// `soft.len() / 2` elements. `neutral` is the number of
    /// punctured positions in `soft`.
    ///
    /// Returns the survivor cost: zero for a clean block.
    pub fn decode(&mut self, soft: &[f32], out: &mut [u8], neutral: usize) -> f32 {
        let steps = soft.len() / 2;
        assert!(steps <= MAX_STEPS);
        assert_eq!(out.len(), steps);

        self.metrics = [UNREACHABLE; NUM_STATES];
        self.metrics[0] = 0.0;

        for (k, pair) in soft.chunks_exact(2).enumerate() {
            let (s1, s2) = (pair[0], pair[1]);
            let mut decisions = 0u16;

            for next in 0..NUM_STATES {
                let bit = next & 1;
                let p0 = next >> 1;
                let p1 = (next >> 1) | (NUM_STATES >> 1);

                let m0 = self.metrics[p0] + self.branch_metric((p0 << 1) | bit, s1, s2);
                let m1 = self.metrics[p1] + self.branch_metric((p1 << 1) | bit, s1, s2);

                if m1 < m0 {
                    decisions |= 1 << next;
                    self.next_metrics[next] = m1;
                } else {
                    self.next_metrics[next] = m0;
                }
            }

            self.decisions[k] = decisions;
            self.metrics = self.next_metrics;
        }

        // terminated block: survivor ends in state zero
        let cost = self.metrics[0];
        let mut state = 0usize;
        for k in (0..steps).rev() {
            out[k] = (state & 1) as u8;
            let high = (self.decisions[k] >> state) & 1;
            state = (state >> 1) | ((high as usize) << (NUM_STATES.trailing_zeros() as usize - 1));
        }

        (cost - 0.5 * neutral as f32).max(0.0)
    }

    // branch metric for the five-bit encoder window `mem`
    #[inline]
    fn branch_metric(&self, mem: usize, s1: f32, s2: f32) -> f32 {
        let (c1, c2) = self.outputs[mem];
        (c1 - s1).abs() + (c2 - s2).abs()
    }
}

impl Default for Viterbi {
    fn default() -> Self {
        Self::new()
    }
}

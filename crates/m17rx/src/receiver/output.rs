//! Receiver events and telemetry

use crate::decoder::OutputFrame;

/// An event emitted by the receiver chain
#[derive(Clone, Debug, PartialEq)]
pub enum ReceiverEvent {
    /// A frame passed FEC decoding
    ///
    /// `cost` is the Viterbi path metric of the survivor: zero for
    /// a clean frame, rising with channel errors.
    Frame { frame: OutputFrame, cost: u32 },

    /// Data carrier detect changed state
    Carrier(bool),

    /// Periodic modem telemetry
    Diagnostics(Diagnostics),
}

/// Modem telemetry snapshot
///
/// Emitted once per decoded frame and on carrier transitions. All
/// fields reflect receiver state; `ber` is attached later by the
/// session when the PRBS validator is synchronized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    /// Carrier decision
    pub dcd: bool,

    /// RMS error vector magnitude of recent symbols, as a fraction
    /// of the outer symbol level
    pub evm: f32,

    /// Smoothed symbol timing error magnitude
    pub deviation: f32,

    /// Normalized DC offset of the filtered baseband, which for
    /// 4FSK is a frequency offset estimate
    pub freq_offset: f32,

    /// True while the framer is collecting a frame
    pub locked: bool,

    /// Recovered clock period relative to nominal
    pub clock: f32,

    /// Sub-symbol phase of the current sampling instant
    pub sample_index: u32,

    /// Sub-symbol phase of the last sync word detection
    pub sync_index: u32,

    /// Timing detector phase counter
    pub clock_index: u32,

    /// Cost of the most recent Viterbi decode
    pub viterbi_cost: u32,

    /// Bit error rate statistics, once the PRBS-9 validator has
    /// synchronized during a BERT run
    pub ber: Option<BerReport>,
}

/// Cumulative PRBS-9 bit error statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BerReport {
    /// Bit errors observed since synchronization
    pub errors: u64,

    /// Bits compared since synchronization
    pub bits: u64,
}

impl BerReport {
    /// Error ratio, zero when no bits have been counted
    pub fn ratio(&self) -> f64 {
        if self.bits == 0 {
            0.0
        } else {
            self.errors as f64 / self.bits as f64
        }
    }
}

impl std::fmt::Display for BerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BER: {:.6} ({} bits)", self.ratio(), self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ber_ratio() {
        let ber = BerReport { errors: 0, bits: 0 };
        assert_eq!(ber.ratio(), 0.0);

        let ber = BerReport {
            errors: 5,
            bits: 1000,
        };
        assert_eq!(ber.ratio(), 0.005);
        assert_eq!(format!("{}", ber), "BER: 0.005000 (1000 bits)");
    }
}

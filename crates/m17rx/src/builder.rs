//! Demodulator configuration
//!
//! Every empirical threshold in the receiver is collected here so
//! it can be calibrated against recorded baseband without touching
//! the DSP code. The defaults are tuned for clean 48 kHz baseband
//! from a discriminator-tapped receiver.

use crate::session::{DemodSession, FrameSink, SpeechDecoder};

/// Receiver and dispatcher tuning
///
/// Build one with [`DemodConfig::default`], adjust it with the
/// `with_*` methods, and hand it to [`DemodConfig::build`]. The
/// `with_*` API is stable; the default values are not and may be
/// recalibrated in any release.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemodConfig {
    invert_input: bool,
    display_lsf: bool,
    noise_blanker: bool,
    sync_threshold: f32,
    dcd_open: f32,
    dcd_close: f32,
    timing_bandwidth_unlocked: f32,
    timing_bandwidth_locked: f32,
    timing_max_deviation: f32,
    good_cost: u32,
    blank_cost: u32,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            invert_input: false,
            display_lsf: false,
            noise_blanker: false,
            sync_threshold: 0.80,
            dcd_open: 4.0,
            dcd_close: 2.0,
            timing_bandwidth_unlocked: 0.125,
            timing_bandwidth_locked: 0.05,
            timing_max_deviation: 0.01,
            good_cost: 70,
            blank_cost: 80,
        }
    }
}

impl DemodConfig {
    /// Build a session around the given speech decoder and sink
    pub fn build<C, S>(&self, speech: C, sink: S) -> DemodSession<C, S>
    where
        C: SpeechDecoder,
        S: FrameSink,
    {
        DemodSession::new(self, speech, sink)
    }

    /// Negate the baseband ahead of the matched filter
    ///
    /// Use when the receiver's discriminator slope is inverted
    /// relative to the transmitter.
    pub fn with_invert_input(&mut self, invert: bool) -> &mut Self {
        self.invert_input = invert;
        self
    }

    /// Log a summary of each decoded link setup frame
    pub fn with_display_lsf(&mut self, display: bool) -> &mut Self {
        self.display_lsf = display;
        self
    }

    /// Replace likely-corrupt stream audio with silence
    ///
    /// Frames whose Viterbi cost exceeds the blanking threshold
    /// are rendered as silence instead of garbled speech.
    pub fn with_noise_blanker(&mut self, blank: bool) -> &mut Self {
        self.noise_blanker = blank;
        self
    }

    /// Sync word correlation threshold (0.0 to 1.0)
    ///
    /// Normalized correlation score a window must reach to be
    /// considered a sync word. 1.0 is a perfect noiseless match.
    pub fn with_sync_threshold(&mut self, threshold: f32) -> &mut Self {
        self.sync_threshold = f32::clamp(threshold, 0.0, 1.0);
        self
    }

    /// Carrier detect hysteresis, as signal-to-floor power ratios
    ///
    /// The carrier is declared present when short-term power
    /// exceeds `open` times the noise floor and lost when it falls
    /// under `close` times the floor.
    pub fn with_dcd_ratios(&mut self, open: f32, close: f32) -> &mut Self {
        self.dcd_open = f32::max(open, 1.0);
        self.dcd_close = f32::clamp(close, 1.0, self.dcd_open);
        self
    }

    /// Timing loop bandwidths before and after frame lock
    ///
    /// Fractions of the timing detector rate. The second value is
    /// used while a frame is being collected and should be the
    /// smaller of the two.
    pub fn with_timing_bandwidth(&mut self, unlocked: f32, locked: f32) -> &mut Self {
        self.timing_bandwidth_unlocked = f32::clamp(unlocked, 0.0, 1.0);
        self.timing_bandwidth_locked = f32::clamp(locked, 0.0, self.timing_bandwidth_unlocked);
        self
    }

    /// Maximum symbol clock deviation, in symbol periods
    pub fn with_timing_max_deviation(&mut self, max_dev: f32) -> &mut Self {
        self.timing_max_deviation = f32::clamp(max_dev, 0.0, 0.5);
        self
    }

    /// Viterbi cost thresholds
    ///
    /// Costs below `good` mark a trustworthy frame; costs above
    /// `blank` trigger the noise blanker when it is enabled.
    pub fn with_cost_thresholds(&mut self, good: u32, blank: u32) -> &mut Self {
        self.good_cost = good;
        self.blank_cost = u32::max(blank, good);
        self
    }

    pub fn invert_input(&self) -> bool {
        self.invert_input
    }

    pub fn display_lsf(&self) -> bool {
        self.display_lsf
    }

    pub fn noise_blanker(&self) -> bool {
        self.noise_blanker
    }

    pub fn sync_threshold(&self) -> f32 {
        self.sync_threshold
    }

    pub fn dcd_ratios(&self) -> (f32, f32) {
        (self.dcd_open, self.dcd_close)
    }

    pub fn timing_bandwidth(&self) -> (f32, f32) {
        (
            self.timing_bandwidth_unlocked,
            self.timing_bandwidth_locked,
        )
    }

    pub fn timing_max_deviation(&self) -> f32 {
        self.timing_max_deviation
    }

    pub fn good_cost(&self) -> u32 {
        self.good_cost
    }

    pub fn blank_cost(&self) -> u32 {
        self.blank_cost
    }
}

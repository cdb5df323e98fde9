//! Full receive chain
//!
//! [`M17Receiver`] drives one normalized baseband sample through
//! the whole demodulator:
//!
//! 1. Optional inversion, then root-raised-cosine matched filtering
//! 2. Data carrier detection on the filtered signal
//! 3. Sync word correlation against all four patterns
//! 4. Symbol clock recovery, seeded by sync detections and refined
//!    by a zero-crossing timing detector
//! 5. Symbol slicing and frame assembly, 368 soft bits per frame
//! 6. FEC decoding and frame typing
//!
//! Decoded frames, carrier transitions and telemetry come out as
//! [`ReceiverEvent`]s. Every stage's buffer is fixed-size; a sample
//! either updates internal state or finishes a frame, and in either
//! case the chain is quiescent again before the next sample is
//! accepted.

mod correlator;
mod dcd;
mod filter;
mod framer;
mod output;
mod symsync;
pub(crate) mod waveform;

use std::collections::VecDeque;

pub use framer::FrameBits;
pub use output::{BerReport, Diagnostics, ReceiverEvent};
pub use waveform::{
    FrameKind, FRAME_BITS, FRAME_SAMPLES, SAMPLES_PER_SYMBOL, SAMPLE_RATE, SAMPLE_SCALE,
    SYMBOL_RATE,
};

use crate::builder::DemodConfig;
use crate::decoder::FrameDecoder;

use self::correlator::SyncDetector;
use self::dcd::DataCarrierDetect;
use self::filter::{FilterCoeff, Window};
use self::framer::Framer;
use self::symsync::{ClockRecovery, SymbolEstimate};
use self::waveform::{nearest_symbol, RRC_TAPS};

// carrier must stay lost this long before the receiver unlocks
const UNLOCK_SAMPLES: u64 = 2 * FRAME_SAMPLES as u64;

/// The M17 baseband receiver
#[derive(Clone, Debug)]
pub struct M17Receiver {
    invert: bool,

    rrc: FilterCoeff<f32>,
    window: Window<f32>,
    dcd: DataCarrierDetect,
    sync: SyncDetector,
    timing: ClockRecovery,
    framer: Framer,
    decoder: FrameDecoder,

    timing_bandwidth_unlocked: f32,
    timing_bandwidth_locked: f32,

    // symbol clock countdown, in input samples
    ted_sample_clock: u32,
    samples_until_next_ted: f32,

    sample_counter: u64,
    dcd_state: bool,
    dcd_lost_at: Option<u64>,

    // amplitude of an outer symbol, from the last sync detection
    amp_reference: f32,

    // diagnostics trackers
    evm: f32,
    dc_track: f32,
    last_sync_phase: u32,
    last_cost: u32,

    events: VecDeque<ReceiverEvent>,
}

impl M17Receiver {
    /// Create a receiver from its configuration
    pub fn new(config: &DemodConfig) -> Self {
        let (bw_unlocked, bw_locked) = config.timing_bandwidth();
        let (dcd_open, dcd_close) = config.dcd_ratios();

        let timing = ClockRecovery::new(bw_unlocked, config.timing_max_deviation());
        let samples_until_next_ted = timing.samples_per_ted();

        Self {
            invert: config.invert_input(),
            rrc: FilterCoeff::from_slice(&RRC_TAPS[..]),
            window: Window::new(RRC_TAPS.len()),
            dcd: DataCarrierDetect::new(dcd_open, dcd_close),
            sync: SyncDetector::new(config.sync_threshold()),
            timing,
            framer: Framer::new(),
            decoder: FrameDecoder::new(),
            timing_bandwidth_unlocked: bw_unlocked,
            timing_bandwidth_locked: bw_locked,
            ted_sample_clock: 0,
            samples_until_next_ted,
            sample_counter: 0,
            dcd_state: false,
            dcd_lost_at: None,
            amp_reference: 0.0,
            evm: 0.0,
            dc_track: 0.0,
            last_sync_phase: 0,
            last_cost: 0,
            events: VecDeque::with_capacity(4),
        }
    }

    /// Clear all DSP state back to initial conditions
    pub fn reset(&mut self) {
        self.window.reset();
        self.dcd.reset();
        self.sync.reset();
        self.timing.reset();
        self.framer.reset();
        self.decoder.reset();
        self.ted_sample_clock = 0;
        self.samples_until_next_ted = self.timing.samples_per_ted();
        self.sample_counter = 0;
        self.dcd_state = false;
        self.dcd_lost_at = None;
        self.amp_reference = 0.0;
        self.evm = 0.0;
        self.dc_track = 0.0;
        self.last_sync_phase = 0;
        self.last_cost = 0;
        self.events.clear();
    }

    /// Process one normalized baseband sample
    ///
    /// Completed events are queued; drain them with
    /// [`next_event()`](Self::next_event).
    pub fn process_sample(&mut self, sample: f32) {
        let sample = if self.invert { -sample } else { sample };
        self.window.push(sample);
        let filtered = self.rrc.filter(&self.window);
        self.sample_counter += 1;

        // slow DC tracker; 4FSK frequency offset shows up as bias
        self.dc_track += (filtered - self.dc_track) * 1.0e-4;

        let dcd = self.dcd.input(filtered);
        if dcd != self.dcd_state {
            self.dcd_state = dcd;
            self.dcd_lost_at = (!dcd).then_some(self.sample_counter);
            self.events.push_back(ReceiverEvent::Carrier(dcd));
            self.push_diagnostics();
        }

        if let Some(lost_at) = self.dcd_lost_at {
            if self.sample_counter.saturating_sub(lost_at) > UNLOCK_SAMPLES {
                self.dcd_lost_at = None;
                self.unlock();
            }
        }

        // sync search. The search is disarmed while a frame is
        // being collected: frame data is free to contain sync-like
        // symbol runs, and those must not retrigger the detector.
        let search = dcd && !self.framer.is_locked();
        if let Some(sync) = self.sync.input(filtered, self.sample_counter, search) {
            self.amp_reference = sync.amplitude;
            self.last_sync_phase = sync.phase;
            self.timing.seed();
            self.timing.set_loop_bandwidth(self.timing_bandwidth_locked);
            self.ted_sample_clock = 0;
            self.samples_until_next_ted = (SAMPLES_PER_SYMBOL / 2) as f32;
            self.framer.start(sync.kind);
        }

        // fractional countdown to the next timing detector sample
        self.ted_sample_clock += 1;
        let remaining = self.samples_until_next_ted - self.ted_sample_clock as f32;
        if remaining <= 0.0 || remaining.abs() < 0.5 {
            self.ted_sample_clock = 0;
            let (next, symbol) = self.timing.input(filtered, remaining);
            self.samples_until_next_ted = next;
            if let Some(est) = symbol {
                self.on_symbol(est);
            }
        }
    }

    /// Pop the next queued event
    pub fn next_event(&mut self) -> Option<ReceiverEvent> {
        self.events.pop_front()
    }

    /// Iterate events from a source of samples
    ///
    /// Consumes exactly as many samples as needed to produce each
    /// event, and ends when the input is exhausted.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter_events<'rx, I>(&'rx mut self, input: I) -> impl Iterator<Item = ReceiverEvent> + 'rx
    where
        I: Iterator<Item = f32> + 'rx,
    {
        let mut source = input;
        std::iter::from_fn(move || loop {
            if let Some(event) = self.next_event() {
                return Some(event);
            }
            self.process_sample(source.next()?);
        })
    }

    /// Lifetime count of processed samples
    pub fn input_sample_counter(&self) -> u64 {
        self.sample_counter
    }

    /// Current carrier decision
    pub fn dcd(&self) -> bool {
        self.dcd_state
    }

    /// True while a frame is being collected
    pub fn locked(&self) -> bool {
        self.framer.is_locked()
    }

    fn on_symbol(&mut self, est: SymbolEstimate) {
        let scale = if self.amp_reference > f32::EPSILON {
            3.0 / self.amp_reference
        } else {
            0.0
        };
        let value = est.symbol * scale;

        if self.framer.is_locked() {
            let err = (value - nearest_symbol(value)) / 3.0;
            self.evm += (err * err - self.evm) * 0.05;
        }

        if let Some((kind, bits)) = self.framer.input(value) {
            self.timing.set_loop_bandwidth(self.timing_bandwidth_unlocked);
            for (frame, cost) in self.decoder.decode(kind, &bits) {
                self.last_cost = cost;
                self.events.push_back(ReceiverEvent::Frame { frame, cost });
            }
            self.push_diagnostics();
        }
    }

    // loss of carrier outlasted the unlock timeout
    fn unlock(&mut self) {
        self.framer.reset();
        self.decoder.reset();
        self.timing.reset();
        self.timing.set_loop_bandwidth(self.timing_bandwidth_unlocked);
        self.amp_reference = 0.0;
        self.evm = 0.0;
    }

    fn push_diagnostics(&mut self) {
        let freq_offset = if self.amp_reference > f32::EPSILON {
            self.dc_track / self.amp_reference
        } else {
            0.0
        };
        self.events
            .push_back(ReceiverEvent::Diagnostics(Diagnostics {
                dcd: self.dcd_state,
                evm: self.evm.sqrt(),
                deviation: self.timing.deviation(),
                freq_offset,
                locked: self.framer.is_locked(),
                clock: self.timing.clock_ratio(),
                sample_index: (self.sample_counter % SAMPLES_PER_SYMBOL as u64) as u32,
                sync_index: self.last_sync_phase,
                clock_index: self.ted_sample_clock,
                viterbi_cost: self.last_cost,
                ber: None,
            }));
    }
}

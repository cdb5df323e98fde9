//! Symbol clock recovery
//!
//! A timing loop which selects two samples per symbol from the
//! matched filter output: a mid-symbol "zero" sample and the symbol
//! sampling instant itself. The timing error detector uses the
//! zero-crossing method: when consecutive symbols differ in sign,
//! the sample between them should fall on zero, and any residual is
//! a timing error. For 4FSK the hard sign decision still drives the
//! detector; inner and outer symbols of equal sign contribute no
//! error, which is harmless.
//!
//! The tracking loop is a proportional-integrate filter over the
//! average and instantaneous sample clock periods. It never goes
//! back in time: clock corrections always push the next sampling
//! instant forward or shrink the wait, folded into a fractional
//! countdown maintained by the caller.
//!
//! Sync word detections *seed* the loop: they set the sampling
//! phase exactly, so the loop only has to track oscillator drift
//! between sync words. A tighter loop bandwidth is selected once
//! the framer locks.

use arraydeque::ArrayDeque;

use super::waveform::SAMPLES_PER_SYMBOL;

/// One recovered symbol with its timing error
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolEstimate {
    /// Mid-symbol sample, ideally zero at a symbol transition
    pub zero: f32,

    /// Soft symbol sample, taken at the symbol instant
    pub symbol: f32,

    /// Timing error as a fraction of the symbol period
    ///
    /// `err < 0` is late, `err > 0` is early.
    pub err: f32,
}

/// Symbol clock tracking loop
#[derive(Clone, Debug)]
pub struct ClockRecovery {
    // nominal input samples per timing detector input
    samples_per_ted: f32,

    // clamp on the average period
    period_min: f32,
    period_max: f32,

    // proportional and integral loop gains
    loop_alpha: f32,
    loop_beta: f32,

    // average and instantaneous period estimates
    period_avg: f32,
    period_inst: f32,

    // smoothed absolute timing error, for diagnostics
    deviation: f32,

    ted: CrossingDetector,
}

impl ClockRecovery {
    /// Create the loop
    ///
    /// `loop_bandwidth` is a fraction of the timing detector input
    /// rate (twice the symbol rate); `max_deviation` bounds how far
    /// the average clock may wander from nominal, in symbol
    /// periods.
    pub fn new(loop_bandwidth: f32, max_deviation: f32) -> Self {
        let samples_per_ted = SAMPLES_PER_SYMBOL as f32 / CrossingDetector::SAMPLES_PER_SYMBOL as f32;
        let (loop_alpha, loop_beta) = loop_gains(loop_bandwidth);
        let period_deviation =
            SAMPLES_PER_SYMBOL as f32 * f32::clamp(max_deviation, 0.0, 0.5);

        Self {
            samples_per_ted,
            period_min: samples_per_ted - period_deviation,
            period_max: samples_per_ted + period_deviation,
            loop_alpha,
            loop_beta,
            period_avg: samples_per_ted,
            period_inst: samples_per_ted,
            deviation: 0.0,
            ted: CrossingDetector::default(),
        }
    }

    /// Reset to the nominal clock
    pub fn reset(&mut self) {
        self.ted.reset();
        self.period_avg = self.samples_per_ted;
        self.period_inst = self.samples_per_ted;
        self.deviation = 0.0;
    }

    /// Seed the sampling phase from a sync word detection
    ///
    /// Clears the detector history and phase counter so the next
    /// input sample is treated as a symbol instant. The period
    /// estimates survive: a seed corrects phase, not frequency.
    pub fn seed(&mut self) {
        self.ted.reset();
        self.period_inst = self.period_avg;
    }

    /// Change the loop bandwidth
    pub fn set_loop_bandwidth(&mut self, loop_bandwidth: f32) {
        let (loop_alpha, loop_beta) = loop_gains(loop_bandwidth);
        self.loop_alpha = loop_alpha;
        self.loop_beta = loop_beta;
    }

    /// Process one timing detector sample
    ///
    /// `offset` is the error between the commanded (fractional)
    /// sampling time and the integer sample actually provided:
    /// positive if this sample is early. Returns the number of
    /// input samples until the next detector sample and, on every
    /// second call, a recovered symbol.
    pub fn input(&mut self, sample: f32, offset: f32) -> (f32, Option<SymbolEstimate>) {
        let sym = self.ted.input(sample);
        if let Some(est) = &sym {
            self.deviation += (est.err.abs() - self.deviation) * 0.05;
        }
        (self.advance_loop(offset, &sym), sym)
    }

    /// Nominal samples between detector inputs
    pub fn samples_per_ted(&self) -> f32 {
        self.samples_per_ted
    }

    /// Recovered clock period relative to nominal
    ///
    /// 1.0 means the transmitter and receiver clocks agree.
    pub fn clock_ratio(&self) -> f32 {
        self.period_avg / self.samples_per_ted
    }

    /// Smoothed magnitude of the timing error
    pub fn deviation(&self) -> f32 {
        self.deviation
    }

    // PI update; returns samples until the next detector input
    fn advance_loop(&mut self, offset: f32, sym: &Option<SymbolEstimate>) -> f32 {
        let offset = offset.clamp(-0.5, 0.5);

        match sym {
            Some(sym) => {
                let err = f32::clamp(sym.err - offset / self.samples_per_ted, -1.0, 1.0);

                self.period_avg += self.loop_beta * err;
                self.period_avg = self.period_avg.clamp(self.period_min, self.period_max);

                // the proportional arm may not command a sample in
                // the past
                self.period_inst = self.period_avg + self.loop_alpha * err + offset;
                if self.period_inst < 0.0 {
                    self.period_inst = self.period_avg;
                }
            }
            None => {
                self.period_inst += offset;
            }
        }

        self.period_inst
    }
}

/// Zero-crossing timing error detector
#[derive(Clone, Debug)]
pub struct CrossingDetector {
    history: ArrayDeque<f32, 3, arraydeque::Wrapping>,
    sample_counter: u32,
}

impl CrossingDetector {
    /// Detector input samples per symbol
    pub const SAMPLES_PER_SYMBOL: u32 = 2;

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.history.clear();
        for _i in 0..self.history.capacity() {
            self.history.push_back(0.0);
        }
        self.sample_counter = 0;
    }

    /// Accept one sample at twice the symbol rate
    ///
    /// Produces a symbol estimate on every second input.
    pub fn input(&mut self, sample: f32) -> Option<SymbolEstimate> {
        self.history.push_back(sample);
        self.sample_counter = (self.sample_counter + 1) % Self::SAMPLES_PER_SYMBOL;
        if self.sample_counter == 1 {
            Some(SymbolEstimate {
                zero: self.history[1],
                symbol: self.history[2],
                err: crossing_metric(self.history[0], self.history[1], self.history[2]),
            })
        } else {
            None
        }
    }
}

impl Default for CrossingDetector {
    fn default() -> Self {
        let mut out = CrossingDetector {
            history: ArrayDeque::new(),
            sample_counter: 0,
        };
        out.reset();
        out
    }
}

// Zero-crossing timing metric over [previous symbol, zero, symbol]
//
// Hard sign decisions make the metric insensitive to the 4FSK
// level; only transitions between opposite signs contribute.
#[inline]
fn crossing_metric(prev: f32, zero: f32, cur: f32) -> f32 {
    zero * (prev.signum() - cur.signum())
}

// PI gains for a critically damped loop
fn loop_gains(loop_bandwidth: f32) -> (f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * loop_bandwidth;
    let k = f32::exp(-omega);
    let sinh = f32::sinh(omega);
    let alpha = 2.0 * k * sinh;
    let beta = 2.0 * (1.0 - k * (sinh + 1.0));
    (alpha, beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_crossing_metric() {
        // prompt transitions and steady levels give zero error
        assert_approx_eq!(crossing_metric(1.0, 0.0, -1.0), 0.0f32);
        assert_approx_eq!(crossing_metric(-0.3, 0.0, 1.0), 0.0f32);
        assert_approx_eq!(crossing_metric(1.0, 1.0, 1.0), 0.0f32);
        assert_approx_eq!(crossing_metric(-3.0, -3.0, -3.0), 0.0f32);

        // early and late sampling
        assert_approx_eq!(crossing_metric(0.8, 0.2, -0.8), 0.4f32);
        assert_approx_eq!(crossing_metric(0.8, -0.2, -0.8), -0.4f32);

        // a 3 to 1 transition of equal sign says nothing
        assert_approx_eq!(crossing_metric(3.0, 2.0, 1.0), 0.0f32);
    }

    #[test]
    fn test_loop_gains() {
        let (alpha, beta) = loop_gains(0.0);
        assert_approx_eq!(alpha, 0.0f32);
        assert_approx_eq!(beta, 0.0f32);

        let (alpha, beta) = loop_gains(0.5);
        assert_approx_eq!(alpha, 0.99813f32, 1.0e-4);
        assert_approx_eq!(beta, 0.91544f32, 1.0e-4);
    }

    #[test]
    fn test_detector_cadence() {
        let mut ted = CrossingDetector::default();

        assert!(ted.input(0.8).is_some());
        assert!(ted.input(0.2).is_none());
        match ted.input(-0.8) {
            Some(sym) => {
                assert_eq!(-0.8f32, sym.symbol);
                assert_approx_eq!(0.4f32, sym.err);
            }
            _ => unreachable!(),
        }
    }

    // drive the loop from a periodic waveform, starting at the
    // given sample offset, and return the last estimate
    fn run_loop(timing: &mut ClockRecovery, inp: &[f32], start: usize) -> SymbolEstimate {
        let mut offset = 0.0f32;
        let mut at = start;
        let mut last = SymbolEstimate::default();
        timing.reset();
        for _i in 0..128 {
            let (skip, sym) = timing.input(inp[at], offset);
            let whole = skip.round();
            offset = skip - whole;
            at = (at + whole as usize) % inp.len();
            if let Some(s) = sym {
                last = s;
            }
        }
        last
    }

    // one period of a sinusoid mimicking alternating ±symbols
    fn sinusoid() -> Vec<f32> {
        let period = 2 * SAMPLES_PER_SYMBOL;
        (0..period)
            .map(|n| f32::sin(2.0 * std::f32::consts::PI * n as f32 / period as f32))
            .collect()
    }

    #[test]
    fn test_loop_converges_from_prompt_start() {
        let inp = sinusoid();
        let mut timing = ClockRecovery::new(0.25, 0.125);

        // peak of the sinusoid is the ideal symbol instant
        let last = run_loop(&mut timing, &inp, SAMPLES_PER_SYMBOL / 2);
        assert!(last.symbol.abs() > 0.99);
        assert!(last.err.abs() < 1e-3);
    }

    #[test]
    fn test_loop_converges_from_worst_case() {
        let inp = sinusoid();
        let mut timing = ClockRecovery::new(0.25, 0.125);

        // half a symbol off: the worst possible starting phase
        let last = run_loop(&mut timing, &inp, 0);
        assert!(last.symbol.abs() > 0.99);
        assert!(last.err.abs() < 1e-3);
    }

    #[test]
    fn test_seed_preserves_period() {
        let mut timing = ClockRecovery::new(0.1, 0.05);
        timing.period_avg = timing.samples_per_ted() * 1.01;
        timing.seed();
        assert_approx_eq!(timing.period_inst, timing.period_avg);
        assert_approx_eq!(timing.clock_ratio(), 1.01f32, 1e-5);
    }
}

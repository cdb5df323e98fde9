//! Data carrier detect
//!
//! Decides whether a 4FSK carrier is present by comparing a fast
//! short-window power estimate against a slow noise-floor estimate.
//! Both are single-pole IIR trackers with asymmetric rise and fall
//! rates: the signal tracker attacks quickly and decays slowly so it
//! holds near the symbol peaks, while the noise floor rises very
//! slowly and collapses quickly when the input goes quiet.
//!
//! The output is hysteretic: the ratio of the two estimates must
//! exceed `open_ratio` to assert DCD and fall below `close_ratio`
//! to drop it. DCD gates sync word acceptance upstream.

/// Carrier presence detector
#[derive(Clone, Debug)]
pub struct DataCarrierDetect {
    // power ratio required to assert dcd
    open_ratio: f32,

    // power ratio below which dcd drops
    close_ratio: f32,

    // fast tracker rise and fall rates
    attack: f32,
    decay: f32,

    // noise floor rise and fall rates
    floor_rise: f32,
    floor_fall: f32,

    signal: f32,
    floor: f32,
    dcd: bool,
}

impl DataCarrierDetect {
    // fast tracker attack rate: about a 500 Hz loop at 48 kHz
    const ATTACK: f32 = 0.063;

    // the floor estimate never collapses below this power, which
    // keeps the ratio finite when the input is digital silence
    const FLOOR_MIN: f32 = 1.0e-6;

    /// Create detector with the given hysteresis ratios
    ///
    /// `open_ratio` is the signal-to-floor power ratio required to
    /// assert carrier presence; `close_ratio` is the ratio below
    /// which the carrier is considered lost. Use `open_ratio` ≥
    /// `close_ratio`.
    pub fn new(open_ratio: f32, close_ratio: f32) -> Self {
        Self {
            open_ratio,
            close_ratio: f32::min(close_ratio, open_ratio),
            attack: Self::ATTACK,
            decay: Self::ATTACK / 8.0,
            floor_rise: 1.0e-7,
            floor_fall: 1.0e-2,
            signal: 0.0,
            floor: 0.0,
            dcd: false,
        }
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.signal = 0.0;
        self.floor = 0.0;
        self.dcd = false;
    }

    /// Track one filtered sample, returning the carrier decision
    #[inline]
    pub fn input(&mut self, sample: f32) -> bool {
        let power = sample * sample;

        let rate = if power > self.signal {
            self.attack
        } else {
            self.decay
        };
        self.signal += (power - self.signal) * rate;

        let rate = if power > self.floor {
            self.floor_rise
        } else {
            self.floor_fall
        };
        self.floor += (power - self.floor) * rate;

        let ratio = self.signal / f32::max(self.floor, Self::FLOOR_MIN);
        self.dcd = if self.dcd {
            ratio > self.close_ratio
        } else {
            ratio > self.open_ratio
        };
        self.dcd
    }

    /// Current carrier decision
    pub fn dcd(&self) -> bool {
        self.dcd
    }

    /// Smoothed signal power estimate
    pub fn power(&self) -> f32 {
        self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_stays_closed() {
        let mut dcd = DataCarrierDetect::new(4.0, 2.0);
        for _i in 0..10_000 {
            assert!(!dcd.input(0.0));
        }
    }

    #[test]
    fn test_signal_opens() {
        let mut dcd = DataCarrierDetect::new(4.0, 2.0);
        for _i in 0..1000 {
            dcd.input(0.0);
        }

        let mut opened_after = None;
        for i in 0..500 {
            let s = if i % 2 == 0 { 0.3f32 } else { -0.3 };
            if dcd.input(s) {
                opened_after = Some(i);
                break;
            }
        }

        // opens within a symbol or two
        assert!(matches!(opened_after, Some(n) if n < 100), "{:?}", opened_after);
    }

    #[test]
    fn test_carrier_drop_closes() {
        let mut dcd = DataCarrierDetect::new(4.0, 2.0);
        for i in 0..5000 {
            let s = if i % 2 == 0 { 0.3f32 } else { -0.3 };
            dcd.input(s);
        }
        assert!(dcd.dcd());

        let mut closed_after = None;
        for i in 0..48_000 {
            if !dcd.input(0.0) {
                closed_after = Some(i);
                break;
            }
        }

        // closes well within one second of silence
        assert!(closed_after.is_some());
    }
}

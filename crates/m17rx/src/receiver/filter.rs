//! FIR filtering primitives
//!
//! [`FilterCoeff`] holds an impulse response and implements the
//! multiply-accumulate half of FIR filtering. [`Window`] is the
//! sliding sample history. Together they make a streaming filter:
//! push one sample onto the `Window`, then evaluate `FilterCoeff`
//! against it for one output sample.
//!
//! The matched filter runs on every input sample, so the
//! multiply-accumulate is the hottest loop in the receiver. The
//! window is sized exactly to the tap count and neither side
//! allocates after construction.

use std::collections::VecDeque;
use std::convert::AsRef;

use nalgebra::base::Scalar;
use nalgebra::DVector;
use num_traits::Zero;

/// FIR filter coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoeff<T>(DVector<T>)
where
    T: Copy + Scalar + Zero;

impl<T> FilterCoeff<T>
where
    T: Copy + Scalar + Zero + std::ops::Mul<T, Output = T> + std::ops::AddAssign,
{
    /// Create from an impulse response slice
    pub fn from_slice<S>(h: S) -> Self
    where
        S: AsRef<[T]>,
    {
        let inp = h.as_ref();
        FilterCoeff(DVector::from_iterator(inp.len(), inp.iter().copied()))
    }

    /// Number of filter coefficients
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Evaluate the filter against a sample history
    ///
    /// `history` must yield the oldest sample first and the newest
    /// sample last; the newest sample is feedforward lag zero. The
    /// history should contain at least `len()` samples. A deque is
    /// the natural history container, but any double-ended iterator
    /// works.
    pub fn filter<W>(&self, history: W) -> T
    where
        W: IntoIterator<Item = T>,
        W::IntoIter: DoubleEndedIterator,
    {
        let mut out = T::zero();
        for (sample, coeff) in history.into_iter().rev().zip(self.0.iter()) {
            out += sample * *coeff;
        }
        out
    }

    /// Coefficients as a slice
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.0.as_slice()
    }
}

impl<T> AsRef<[T]> for FilterCoeff<T>
where
    T: Copy + Scalar + Zero + std::ops::Mul<T, Output = T> + std::ops::AddAssign,
{
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

/// Fixed-length sliding sample history
#[derive(Clone, Debug)]
pub struct Window<T>(VecDeque<T>)
where
    T: Copy + Scalar + Zero;

impl<T> Window<T>
where
    T: Copy + Scalar + Zero,
{
    /// Create a zero-filled window of the given length
    pub fn new(len: usize) -> Self {
        let mut q = VecDeque::with_capacity(len);
        q.resize(len, T::zero());
        Self(q)
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        for s in &mut self.0 {
            *s = T::zero()
        }
    }

    /// Window length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Push one sample, aging off the oldest
    ///
    /// Returns the sample that aged off.
    #[inline]
    pub fn push(&mut self, input: T) -> T {
        let out = self.0.pop_front().unwrap_or_else(T::zero);
        self.0.push_back(input);
        out
    }

    /// Iterator over the window, oldest sample first
    pub fn iter(&self) -> <&Window<T> as IntoIterator>::IntoIter {
        self.into_iter()
    }

    /// Most recent sample
    #[inline]
    pub fn back(&self) -> T {
        *self.0.back().unwrap()
    }
}

impl<'a, T> IntoIterator for &'a Window<T>
where
    T: Copy + Scalar + Zero,
{
    type Item = T;

    type IntoIter = std::iter::Copied<std::collections::vec_deque::Iter<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_filter_identity() {
        let filter = FilterCoeff::from_slice([1.0f32, 0.0, 0.0]);
        assert_eq!(3, filter.len());
        assert_approx_eq!(4.0f32, filter.filter([2.0f32, 3.0, 4.0]));
    }

    #[test]
    fn test_filter_short_history() {
        // missing history samples act as zeros
        let filter = FilterCoeff::from_slice([1.0f32, -1.0]);
        assert_approx_eq!(5.0f32, filter.filter([5.0f32]));
        assert_approx_eq!(0.0f32, filter.filter([20.0f32, 20.0]));
    }

    #[test]
    fn test_filter_moving_average() {
        let filter = FilterCoeff::from_slice([0.25f32; 4]);
        let mut window: Window<f32> = Window::new(4);
        let mut out = 0.0f32;
        for sample in [4.0f32, 4.0, 4.0, 4.0, 4.0] {
            window.push(sample);
            out = filter.filter(&window);
        }
        assert_approx_eq!(out, 4.0f32);
    }

    #[test]
    fn test_window() {
        let mut wind: Window<f32> = Window::new(3);
        assert_eq!(3, wind.len());
        assert_eq!(0.0f32, wind.push(1.0f32));
        assert_eq!(0.0f32, wind.push(2.0f32));
        assert_eq!(0.0f32, wind.push(3.0f32));
        assert_eq!(1.0f32, wind.push(4.0f32));

        let v: Vec<f32> = wind.iter().collect();
        assert_eq!(v, vec![2.0f32, 3.0, 4.0]);
        assert_eq!(4.0f32, wind.back());

        wind.reset();
        assert_eq!(3, wind.len());
        assert_eq!(0.0f32, wind.back());
    }
}

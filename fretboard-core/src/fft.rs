//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the in-process pitch detector. A planned FFT is kept
//! per analyzer so sliding over a clip only plans once.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Symmetric Hann window of `len` taps.
///
/// # Arguments
/// * `len` - Number of taps, equal to the analysis frame size
///
/// # Returns
/// * `Vec<f32>` - Window coefficients, zero at both ends
fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let span = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / span).cos()))
        .collect()
}

/// Forward FFT of a fixed frame size.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(frame_size);
        Self { fft, window: hann_window(frame_size) }
    }

    /// Magnitudes up to Nyquist of a DC-corrected, Hann-windowed frame.
    ///
    /// Returns `None` when `frame` does not match the planned frame size.
    pub fn magnitudes(&self, frame: &[f32]) -> Option<Vec<f32>> {
        if frame.len() != self.window.len() || frame.is_empty() {
            return None;
        }

        let mean = frame.iter().sum::<f32>() / frame.len() as f32;
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new((sample - mean) * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        buffer.truncate(frame.len() / 2);
        Some(buffer.iter().map(|c| c.norm()).collect())
    }
}

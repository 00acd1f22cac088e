// FFT module - one-sided magnitude spectrum of a real-valued window
//
// No taper is applied: the feature vector is the plain |X[k]| of the window, so
// magnitudes stay comparable between live windows and batch recordings.

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::{Arc, Mutex};

/// FFT processor computing magnitude spectra for windows of any length
///
/// The planner caches plans per length, so repeated windows of the same size
/// reuse one plan.
#[derive(Clone)]
pub struct FftProcessor {
    fft_planner: Arc<Mutex<FftPlanner<f32>>>,
}

impl FftProcessor {
    pub fn new() -> Self {
        Self {
            fft_planner: Arc::new(Mutex::new(FftPlanner::new())),
        }
    }

    /// Magnitudes for bins `0..=N/2` of an N-sample window
    ///
    /// Returns an empty spectrum for an empty window.
    pub fn magnitude_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        let mut buffer: Vec<Complex<f32>> =
            samples.iter().map(|&s| Complex::new(s, 0.0)).collect();

        let fft = {
            let mut planner = match self.fft_planner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            planner.plan_fft_forward(n)
        };
        fft.process(&mut buffer);

        buffer[..n / 2 + 1].iter().map(|c| c.norm()).collect()
    }
}

impl Default for FftProcessor {
    fn default() -> Self {
        Self::new()
    }
}

// SyntheticSource - pseudo-random stand-in for a headset
//
// Samples are floor(N(0, 150)) restricted to the open interval (-150, 150), so
// they never trip the default artifact gate. Quality is uniform in [0, 100).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{Sample, SignalQuality};

/// Standard deviation of generated samples
pub const SYNTHETIC_STD_DEV: f64 = 150.0;

/// Generated samples stay strictly inside (-bound, bound)
pub const SYNTHETIC_BOUND: f64 = 150.0;

pub struct SyntheticSource {
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next accepted sample; out-of-range draws are redrawn
    pub fn next_sample(&mut self) -> Sample {
        loop {
            let z: f64 = self.rng.sample(StandardNormal);
            let value = (z * SYNTHETIC_STD_DEV).floor();
            if value > -SYNTHETIC_BOUND && value < SYNTHETIC_BOUND {
                return value as Sample;
            }
        }
    }

    pub fn next_quality(&mut self) -> SignalQuality {
        self.rng.gen_range(0..100)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_inside_bound() {
        let mut source = SyntheticSource::seeded(7);
        for _ in 0..10_000 {
            let sample = source.next_sample();
            assert!(sample > -150 && sample < 150, "sample {} out of range", sample);
        }
    }

    #[test]
    fn test_samples_are_spread_around_zero() {
        let mut source = SyntheticSource::seeded(11);
        let samples: Vec<Sample> = (0..5_000).map(|_| source.next_sample()).collect();

        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 10.0, "mean {} too far from zero", mean);
        assert!(samples.iter().any(|&s| s > 50));
        assert!(samples.iter().any(|&s| s < -50));

        // Truncated at one standard deviation the spread is about 0.54 sigma
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean).powi(2))
            .sum::<f64>()
            / samples.len() as f64;
        let spread = variance.sqrt();
        assert!((65.0..100.0).contains(&spread), "spread {} off", spread);
    }

    #[test]
    fn test_quality_range() {
        let mut source = SyntheticSource::seeded(3);
        for _ in 0..1_000 {
            assert!(source.next_quality() < 100);
        }
    }

    #[test]
    fn test_seeded_sources_repeat() {
        let mut a = SyntheticSource::seeded(42);
        let mut b = SyntheticSource::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.next_sample(), b.next_sample());
        }
    }
}

//! Sampling strategies over compressed spaces.
//!
//! The pipeline exposes a sampling space to drive candidate generation.
//! [`StandardSampling`] draws uniformly from that space. Range-compressing
//! steps can instead install [`MixedRangeSampling`], which splits draws
//! between the compressed ranges and the original ranges and adapts the
//! split from observed outcomes, so a badly narrowed range cannot starve
//! the search.

use crate::param::Point;
use crate::space::ParameterSpace;
use crate::types::Direction;

/// Which space a sample was drawn from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SampleOrigin {
    /// Drawn from the compressed sampling space.
    Compressed,
    /// Drawn from the original, uncompressed space.
    Original,
}

/// A candidate configuration tagged with its origin.
#[derive(Clone, Debug)]
pub struct Sample {
    /// The drawn configuration.
    pub point: Point,
    /// The space it came from.
    pub origin: SampleOrigin,
}

/// Draws candidate configurations and learns from their outcomes.
pub trait SamplingStrategy: Send {
    /// Draws `n` candidates.
    fn sample(&mut self, n: usize) -> Vec<Sample>;

    /// Feeds back evaluated outcomes so the strategy can adapt.
    fn observe(&mut self, _outcomes: &[(SampleOrigin, f64)]) {}

    /// The primary space and, where applicable, the fallback space.
    fn spaces(&self) -> (&ParameterSpace, Option<&ParameterSpace>);
}

/// Uniform sampling from a single space.
#[derive(Clone, Debug)]
pub struct StandardSampling {
    space: ParameterSpace,
}

impl StandardSampling {
    /// Samples uniformly from `space`.
    #[must_use]
    pub fn new(space: ParameterSpace) -> Self {
        Self { space }
    }
}

impl SamplingStrategy for StandardSampling {
    fn sample(&mut self, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|_| Sample {
                point: self.space.sample(),
                origin: SampleOrigin::Compressed,
            })
            .collect()
    }

    fn spaces(&self) -> (&ParameterSpace, Option<&ParameterSpace>) {
        (&self.space, None)
    }
}

/// Running means of outcomes per origin, plus the adaptive split.
#[derive(Clone, Copy, Debug)]
pub struct MixedRangeStatistics {
    /// Current probability of drawing from the compressed space.
    pub compressed_probability: f64,
    /// Draws taken from the compressed space.
    pub compressed_draws: usize,
    /// Draws taken from the original space.
    pub original_draws: usize,
}

/// Samples from the compressed space with a given probability, otherwise
/// from the original space, and adjusts that probability from outcomes.
#[derive(Clone, Debug)]
pub struct MixedRangeSampling {
    compressed: ParameterSpace,
    original: ParameterSpace,
    probability: f64,
    compressed_draws: usize,
    original_draws: usize,
    rng: fastrand::Rng,
}

impl MixedRangeSampling {
    /// Initial probability of drawing from the compressed space.
    pub const INITIAL_PROBABILITY: f64 = 0.9;
    /// Lower clamp for the compressed-space probability.
    pub const MIN_PROBABILITY: f64 = 0.5;
    /// Upper clamp for the compressed-space probability.
    pub const MAX_PROBABILITY: f64 = 0.95;

    /// Creates a mixed sampler over a compressed and an original space.
    #[must_use]
    pub fn new(compressed: ParameterSpace, original: ParameterSpace, seed: u64) -> Self {
        Self {
            compressed,
            original,
            probability: Self::INITIAL_PROBABILITY,
            compressed_draws: 0,
            original_draws: 0,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Current draw counts and probability.
    #[must_use]
    pub fn statistics(&self) -> MixedRangeStatistics {
        MixedRangeStatistics {
            compressed_probability: self.probability,
            compressed_draws: self.compressed_draws,
            original_draws: self.original_draws,
        }
    }
}

impl SamplingStrategy for MixedRangeSampling {
    fn sample(&mut self, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|_| {
                if self.rng.f64() < self.probability {
                    self.compressed_draws += 1;
                    Sample {
                        point: self.compressed.sample(),
                        origin: SampleOrigin::Compressed,
                    }
                } else {
                    self.original_draws += 1;
                    Sample {
                        point: self.original.sample(),
                        origin: SampleOrigin::Original,
                    }
                }
            })
            .collect()
    }

    fn observe(&mut self, outcomes: &[(SampleOrigin, f64)]) {
        let mut compressed: Vec<f64> = Vec::new();
        let mut original: Vec<f64> = Vec::new();
        for &(origin, value) in outcomes {
            if !value.is_finite() {
                continue;
            }
            match origin {
                SampleOrigin::Compressed => compressed.push(value),
                SampleOrigin::Original => original.push(value),
            }
        }
        if compressed.is_empty() || original.is_empty() {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        // Outcomes are normalized so lower is better regardless of the
        // study direction; see CompressionPipeline::observe_outcomes.
        let compressed_better = mean(&compressed) < mean(&original);
        let delta = if compressed_better { 0.05 } else { -0.1 };
        self.probability =
            (self.probability + delta).clamp(Self::MIN_PROBABILITY, Self::MAX_PROBABILITY);
        trace_debug!(
            probability = self.probability,
            compressed_better,
            "adjusted mixed-range sampling split"
        );
    }

    fn spaces(&self) -> (&ParameterSpace, Option<&ParameterSpace>) {
        (&self.compressed, Some(&self.original))
    }
}

/// Flips an objective value so lower is always better.
#[must_use]
pub(crate) fn canonical_objective(value: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Minimize => value,
        Direction::Maximize => -value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParamDef;

    fn space(low: f64, high: f64) -> ParameterSpace {
        let mut s =
            ParameterSpace::new(vec![ParamDef::float("x", low, high).unwrap()]).unwrap();
        s.set_seed(1);
        s
    }

    #[test]
    fn standard_sampling_stays_in_space() {
        let mut sampler = StandardSampling::new(space(2.0, 3.0));
        for sample in sampler.sample(50) {
            let v = sample.point.get("x").unwrap().as_f64();
            assert!((2.0..=3.0).contains(&v));
            assert_eq!(sample.origin, SampleOrigin::Compressed);
        }
    }

    #[test]
    fn mixed_sampling_uses_both_spaces() {
        let mut sampler = MixedRangeSampling::new(space(0.4, 0.6), space(0.0, 1.0), 5);
        let samples = sampler.sample(200);
        let stats = sampler.statistics();
        assert_eq!(stats.compressed_draws + stats.original_draws, 200);
        assert!(stats.original_draws > 0);
        assert!(stats.compressed_draws > stats.original_draws);
        for sample in samples {
            let v = sample.point.get("x").unwrap().as_f64();
            match sample.origin {
                SampleOrigin::Compressed => assert!((0.4..=0.6).contains(&v)),
                SampleOrigin::Original => assert!((0.0..=1.0).contains(&v)),
            }
        }
    }

    #[test]
    fn probability_rises_when_compressed_wins() {
        let mut sampler = MixedRangeSampling::new(space(0.4, 0.6), space(0.0, 1.0), 5);
        sampler.observe(&[
            (SampleOrigin::Compressed, 1.0),
            (SampleOrigin::Original, 2.0),
        ]);
        assert!(
            (sampler.statistics().compressed_probability - 0.95).abs() < 1e-12,
            "clamped at the upper bound"
        );
    }

    #[test]
    fn probability_drops_when_original_wins() {
        let mut sampler = MixedRangeSampling::new(space(0.4, 0.6), space(0.0, 1.0), 5);
        for _ in 0..10 {
            sampler.observe(&[
                (SampleOrigin::Compressed, 2.0),
                (SampleOrigin::Original, 1.0),
            ]);
        }
        assert!(
            (sampler.statistics().compressed_probability
                - MixedRangeSampling::MIN_PROBABILITY)
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn one_sided_outcomes_leave_probability_unchanged() {
        let mut sampler = MixedRangeSampling::new(space(0.4, 0.6), space(0.0, 1.0), 5);
        sampler.observe(&[(SampleOrigin::Compressed, 1.0)]);
        assert!(
            (sampler.statistics().compressed_probability
                - MixedRangeSampling::INITIAL_PROBABILITY)
                .abs()
                < 1e-12
        );
    }
}

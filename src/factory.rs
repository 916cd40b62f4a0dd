//! Name-based construction of steps, strategies and calculators.
//!
//! The factory maps short textual identifiers to default-configured
//! components, which keeps config files and experiment scripts free of
//! type names. Components needing caller data (expert steps, custom
//! windows) are built directly through their constructors.

use crate::error::{Error, Result};
use crate::forest::ForestConfig;
use crate::importance::{
    AttributionImportance, CorrelationImportance, CorrelationKind, ImportanceCalculator,
};
use crate::step::CompressionStep;
use crate::steps::NoopStep;
use crate::steps::dimension::{AdaptiveDimensionStep, DimensionSelectionStep};
use crate::steps::projection::{HesboStep, KpcaStep, QuantizationStep, RemboStep};
use crate::steps::range::{AttributionRangeStep, BoundaryRangeStep, KdeRangeStep};
use crate::update::{
    HybridUpdate, ImprovementUpdate, PeriodicUpdate, StagnationUpdate, UpdateStrategy,
};

const DEFAULT_TOP_K: usize = 10;
const DEFAULT_LOW_DIM: usize = 8;
const DEFAULT_MAX_VALUES: u32 = 10;

/// Builds a default-configured compression step from its identifier.
///
/// Recognized identifiers are `dimension`, `adaptive_dimension`,
/// `boundary_range`, `attribution_range`, `kde_range`, `rembo`,
/// `hesbo`, `kpca`, `quantization` and `none`. `seed` feeds the steps
/// that sample or draw random matrices.
///
/// # Errors
///
/// Returns [`Error::UnknownStep`] for an unrecognized identifier.
pub fn build_step(id: &str, seed: u64) -> Result<Box<dyn CompressionStep>> {
    Ok(match id {
        "dimension" => Box::new(DimensionSelectionStep::new(DEFAULT_TOP_K)?),
        "adaptive_dimension" => Box::new(
            AdaptiveDimensionStep::new(DEFAULT_TOP_K, 0.5, 2, 2 * DEFAULT_TOP_K)?
                .with_update_strategy(Box::new(HybridUpdate::default())),
        ),
        "boundary_range" => Box::new(BoundaryRangeStep::new(0.2, 2.0)?.with_seed(seed)),
        "attribution_range" => Box::new(AttributionRangeStep::new(0.5, 2.0)?.with_seed(seed)),
        "kde_range" => Box::new(KdeRangeStep::new(0.3, 0.1)?.with_seed(seed)),
        "rembo" => Box::new(RemboStep::new(DEFAULT_LOW_DIM, seed)?),
        "hesbo" => Box::new(HesboStep::new(DEFAULT_LOW_DIM, seed)?),
        "kpca" => Box::new(KpcaStep::new(DEFAULT_LOW_DIM, 0.3)?),
        "quantization" => Box::new(QuantizationStep::new(DEFAULT_MAX_VALUES)?),
        "none" => Box::new(NoopStep::new()),
        other => return Err(Error::UnknownStep(other.to_owned())),
    })
}

/// Builds an update strategy from its identifier.
///
/// Recognized identifiers are `periodic`, `stagnation`, `improvement`
/// and `hybrid`.
///
/// # Errors
///
/// Returns [`Error::UnknownStrategy`] for an unrecognized identifier.
pub fn build_update_strategy(id: &str) -> Result<Box<dyn UpdateStrategy>> {
    Ok(match id {
        "periodic" => Box::new(PeriodicUpdate::default()),
        "stagnation" => Box::new(StagnationUpdate::default()),
        "improvement" => Box::new(ImprovementUpdate::default()),
        "hybrid" => Box::new(HybridUpdate::default()),
        other => return Err(Error::UnknownStrategy(other.to_owned())),
    })
}

/// Builds an importance calculator from its identifier.
///
/// Recognized identifiers are `spearman`, `pearson` and `attribution`.
///
/// # Errors
///
/// Returns [`Error::UnknownStrategy`] for an unrecognized identifier.
pub fn build_importance(id: &str) -> Result<Box<dyn ImportanceCalculator>> {
    Ok(match id {
        "spearman" => Box::new(CorrelationImportance::new(CorrelationKind::Spearman)),
        "pearson" => Box::new(CorrelationImportance::new(CorrelationKind::Pearson)),
        "attribution" => Box::new(AttributionImportance::new(ForestConfig::default())),
        other => return Err(Error::UnknownStrategy(other.to_owned())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_known_step() {
        for id in [
            "dimension",
            "adaptive_dimension",
            "boundary_range",
            "attribution_range",
            "kde_range",
            "rembo",
            "hesbo",
            "kpca",
            "quantization",
            "none",
        ] {
            let step = build_step(id, 7).unwrap();
            assert_eq!(step.name(), match id {
                "dimension" => "dimension_selection",
                "none" => "none",
                other => other,
            });
        }
    }

    #[test]
    fn unknown_step_is_rejected() {
        assert!(matches!(
            build_step("autoencoder", 0),
            Err(Error::UnknownStep(_))
        ));
    }

    #[test]
    fn builds_every_known_strategy() {
        for id in ["periodic", "stagnation", "improvement", "hybrid"] {
            assert_eq!(build_update_strategy(id).unwrap().name(), id);
        }
        assert!(build_update_strategy("annealed").is_err());
    }

    #[test]
    fn builds_every_known_calculator() {
        for id in ["spearman", "pearson", "attribution"] {
            assert!(build_importance(id).is_ok());
        }
        assert!(build_importance("shap").is_err());
    }
}

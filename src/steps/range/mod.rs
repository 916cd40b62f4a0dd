//! Range compression: narrowing numeric bounds around good regions.
//!
//! All four steps here keep the parameter set intact and only shrink
//! numeric bounds. [`BoundaryRangeStep`] uses mean and spread of the
//! best observations; [`AttributionRangeStep`] weights observations by
//! forest attributions and keeps only beneficial ones;
//! [`KdeRangeStep`] keeps the high-density region of a weighted kernel
//! density estimate; [`ExpertRangeStep`] applies literal expert bounds.
//!
//! Narrowed spaces can starve the search if the good region was
//! misjudged, so range steps install
//! [`MixedRangeSampling`](crate::sampling::MixedRangeSampling) over the
//! narrowed and original spaces unless mixed sampling is turned off.

mod attribution;
mod boundary;
mod expert;
mod kde;

pub use attribution::AttributionRangeStep;
pub use boundary::BoundaryRangeStep;
pub use expert::ExpertRangeStep;
pub use kde::KdeRangeStep;

use std::collections::HashMap;

use crate::space::ParameterSpace;
use crate::step::{CompressedRange, RangeInfo};

/// Rebuilds `input` with the given per-parameter bounds applied.
///
/// Parameters without an entry keep their original bounds. Fixed
/// parameters in `skip` are kept uncompressed so the parameter set
/// and count survive the step.
pub(crate) fn space_with_ranges(
    input: &ParameterSpace,
    ranges: &HashMap<String, (f64, f64)>,
    skip: &[String],
) -> ParameterSpace {
    let params = input
        .params()
        .iter()
        .map(|def| {
            if skip.contains(&def.name().to_owned()) {
                return def.clone();
            }
            match ranges.get(def.name()) {
                Some(&(low, high)) => def.with_bounds(low, high),
                None => def.clone(),
            }
        })
        .collect();
    // Narrowed bounds stay inside the already-validated originals.
    let mut space = ParameterSpace::new(params).unwrap_or_else(|_| input.clone());
    space.set_seed(input.seed());
    space
}

/// Clips a candidate range into the original bounds, falling back to the
/// observed value range when the candidate collapses.
pub(crate) fn sanitize_range(
    candidate: (f64, f64),
    original: (f64, f64),
    observed: (f64, f64),
) -> (f64, f64) {
    let low = candidate.0.max(original.0);
    let high = candidate.1.min(original.1);
    if low < high {
        return (low, high);
    }
    let low = observed.0.max(original.0);
    let high = observed.1.min(original.1);
    if low < high { (low, high) } else { original }
}

/// Compares numeric bounds between an input and output space.
pub(crate) fn collect_range_info(input: &ParameterSpace, output: &ParameterSpace) -> RangeInfo {
    let mut compressed = Vec::new();
    let mut unchanged = Vec::new();
    for def in input.params() {
        let Some((orig_low, orig_high)) = def.bounds() else {
            continue;
        };
        let Some((new_low, new_high)) =
            output.get(def.name()).and_then(crate::space::ParamDef::bounds)
        else {
            continue;
        };
        let orig_width = orig_high - orig_low;
        let new_width = new_high - new_low;
        if orig_width > 0.0 && new_width < orig_width {
            compressed.push(CompressedRange {
                name: def.name().to_owned(),
                original: (orig_low, orig_high),
                compressed: (new_low, new_high),
                ratio: new_width / orig_width,
            });
        } else {
            unchanged.push(def.name().to_owned());
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let avg_ratio = if compressed.is_empty() {
        1.0
    } else {
        compressed.iter().map(|r| r.ratio).sum::<f64>() / compressed.len() as f64
    };
    RangeInfo {
        compressed,
        unchanged,
        avg_ratio,
    }
}

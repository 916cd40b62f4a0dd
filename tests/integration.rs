//! Integration tests for the compressor library.

use compressor::prelude::*;

// =============================================================================
// Helpers: a five-parameter space where x0..x2 dominate the objective
// =============================================================================

fn five_param_space() -> ParameterSpace {
    let params = (0..5)
        .map(|i| ParamDef::float(format!("x{i}"), 0.0, 10.0).unwrap())
        .collect();
    ParameterSpace::new(params).unwrap()
}

fn objective(point: &Point) -> f64 {
    let v = |name: &str| point.get(name).unwrap().as_f64();
    10.0 * v("x0") + 8.0 * v("x1") + 6.0 * v("x2") + 0.01 * v("x3") + 0.01 * v("x4")
}

fn dominated_history(n: usize, seed: u64) -> EvaluationHistory {
    let mut space = five_param_space();
    space.set_seed(seed);
    let mut history = EvaluationHistory::new();
    for _ in 0..n {
        let point = space.sample();
        let value = objective(&point);
        history.record(point, value);
    }
    history
}

// =============================================================================
// Test: selection + range chain shrinks five parameters to three
// =============================================================================

#[test]
fn test_selection_and_range_chain_compresses_to_three_params() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        Box::new(
            DimensionSelectionStep::with_calculator(3, Box::new(AttributionImportance::default()))
                .unwrap(),
        ),
        Box::new(BoundaryRangeStep::new(0.8, 2.0).unwrap()),
    ];
    let mut compressor =
        Compressor::new(five_param_space(), steps, Direction::Minimize).with_seed(42);

    let history = dominated_history(30, 7);
    let (surrogate, sample) = compressor.compress_space(&[history], None);

    assert_eq!(surrogate.len(), 3, "three parameters should survive");
    for name in ["x0", "x1", "x2"] {
        assert!(surrogate.contains(name), "{name} should be kept");
    }
    // The range step narrows within the selected parameters' bounds.
    for def in sample.params() {
        let (low, high) = def.bounds().unwrap();
        assert!(low >= 0.0 && high <= 10.0, "{}: [{low}, {high}]", def.name());
        assert!(low < high);
    }

    let summary = compressor.compression_summary();
    assert_eq!(summary.original_size, 5);
    assert_eq!(summary.surrogate_size, 3);
    assert!((summary.surrogate_ratio - 0.6).abs() < 1e-12);
    assert_eq!(summary.steps.len(), 2);
    assert_eq!(
        compressor.events().first().map(|e| e.kind),
        Some(EventKind::InitialCompression)
    );
}

// =============================================================================
// Test: maximization flips the objective but keeps the same dominant set
// =============================================================================

#[test]
fn test_maximize_direction_selects_the_same_parameters() {
    let steps: Vec<Box<dyn CompressionStep>> =
        vec![Box::new(DimensionSelectionStep::new(3).unwrap())];
    let mut compressor =
        Compressor::new(five_param_space(), steps, Direction::Maximize).with_seed(1);

    let mut space = five_param_space();
    space.set_seed(11);
    let mut history = EvaluationHistory::new();
    for _ in 0..40 {
        let point = space.sample();
        let value = -objective(&point);
        history.record(point, value);
    }
    let (surrogate, _) = compressor.compress_space(&[history], None);
    for name in ["x0", "x1", "x2"] {
        assert!(surrogate.contains(name), "{name} should be kept");
    }
}

// =============================================================================
// Test: without history every data-driven step passes through
// =============================================================================

#[test]
fn test_empty_history_degrades_to_pass_through() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        Box::new(DimensionSelectionStep::new(3).unwrap()),
        Box::new(BoundaryRangeStep::new(0.2, 2.0).unwrap()),
    ];
    let mut compressor = Compressor::new(five_param_space(), steps, Direction::Minimize);
    let (surrogate, sample) = compressor.compress_space(&[], None);

    assert_eq!(surrogate, &five_param_space());
    assert_eq!(sample, &five_param_space());

    let summary = compressor.compression_summary();
    assert!((summary.surrogate_ratio - 1.0).abs() < 1e-12);
    for step in &summary.steps {
        assert_eq!(step.degraded, Some(DegradedReason::NoHistory), "{}", step.name);
    }
}

// =============================================================================
// Test: sampling loop with outcome observation
// =============================================================================

#[test]
fn test_sampling_and_observation_loop() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        Box::new(DimensionSelectionStep::new(3).unwrap()),
        Box::new(BoundaryRangeStep::new(0.5, 2.0).unwrap().with_seed(5)),
    ];
    let mut compressor =
        Compressor::new(five_param_space(), steps, Direction::Minimize).with_seed(3);
    compressor.compress_space(&[dominated_history(40, 13)], None);

    let samples = compressor.sample(20);
    assert_eq!(samples.len(), 20);
    for sample in &samples {
        assert_eq!(sample.point.len(), 3, "points live in the selected sub-space");
    }

    let outcomes: Vec<(SampleOrigin, f64)> = samples
        .iter()
        .map(|s| {
            // Fill the dropped parameters with defaults for evaluation.
            let mut full = s.point.clone();
            for name in ["x3", "x4"] {
                full.insert(name.to_owned(), ParamValue::Float(5.0));
            }
            (s.origin, objective(&full))
        })
        .collect();
    compressor.observe_outcomes(&outcomes);
    assert_eq!(compressor.pipeline().progress().iteration(), 20);
}

// =============================================================================
// Test: chains assembled through the factory
// =============================================================================

#[test]
fn test_factory_built_chain() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        build_step("dimension", 42).unwrap(),
        build_step("boundary_range", 42).unwrap(),
    ];
    let params = (0..12)
        .map(|i| ParamDef::float(format!("x{i}"), 0.0, 1.0).unwrap())
        .collect();
    let space = ParameterSpace::new(params).unwrap();
    let mut seeded = space.clone();
    seeded.set_seed(6);
    let mut history = EvaluationHistory::new();
    for _ in 0..50 {
        let point = seeded.sample();
        let value = point.get("x0").unwrap().as_f64() * 100.0;
        history.record(point, value);
    }

    let mut compressor = Compressor::new(space, steps, Direction::Minimize).with_seed(42);
    let (surrogate, _) = compressor.compress_space(&[history], None);
    assert_eq!(surrogate.len(), 10, "the factory dimension step keeps ten");
    assert!(surrogate.contains("x0"));

    assert!(build_step("autoencoder", 0).is_err());
}

// =============================================================================
// Test: stagnation grows the adaptive target and restarts from the original
// =============================================================================

fn six_param_space() -> ParameterSpace {
    let params = (0..6)
        .map(|i| ParamDef::float(format!("x{i}"), 0.0, 10.0).unwrap())
        .collect();
    ParameterSpace::new(params).unwrap()
}

fn ordered_history(n: usize, seed: u64, best_first: bool) -> EvaluationHistory {
    let mut space = six_param_space();
    space.set_seed(seed);
    let mut rows: Vec<(Point, f64)> = (0..n)
        .map(|_| {
            let point = space.sample();
            let v = |name: &str| point.get(name).unwrap().as_f64();
            let value = 10.0 * v("x0") + 8.0 * v("x1") + 0.01 * v("x2");
            (point, value)
        })
        .collect();
    rows.sort_by(|a, b| a.1.total_cmp(&b.1));
    if !best_first {
        rows.reverse();
    }
    let mut history = EvaluationHistory::new();
    for (point, value) in rows {
        history.record(point, value);
    }
    history
}

#[test]
fn test_stagnation_grows_target_and_restarts_from_original() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(
        AdaptiveDimensionStep::new(2, 0.5, 1, 6)
            .unwrap()
            .with_update_strategy(Box::new(StagnationUpdate::new(3))),
    )];
    let mut compressor =
        Compressor::new(six_param_space(), steps, Direction::Minimize).with_seed(9);
    let (surrogate, _) = compressor.compress_space(&[ordered_history(40, 2, true)], None);
    assert_eq!(surrogate.len(), 2);

    // The incumbent never moves: the first call sets the baseline, the
    // next three accumulate stagnation until the window fills.
    let stagnant = ordered_history(40, 2, true);
    for _ in 0..3 {
        assert!(!compressor.update_compression(&[stagnant.clone()], None));
    }
    assert!(compressor.update_compression(&[stagnant], None));
    assert_eq!(compressor.surrogate_space().len(), 3, "target grew by one");
    assert_eq!(
        compressor.events().last().map(|e| e.kind),
        Some(EventKind::AdaptiveUpdate),
        "growing past the surrogate restarts from the original space"
    );
}

// =============================================================================
// Test: steady improvement shrinks the target progressively
// =============================================================================

fn history_prefix(full: &EvaluationHistory, len: usize) -> EvaluationHistory {
    let mut prefix = EvaluationHistory::new();
    for obs in full.observations().iter().take(len) {
        prefix.record(obs.point.clone(), obs.objective);
    }
    prefix
}

#[test]
fn test_improvement_shrinks_target_progressively() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(
        AdaptiveDimensionStep::new(4, 0.5, 1, 6)
            .unwrap()
            .with_update_strategy(Box::new(ImprovementUpdate::new(3))),
    )];
    let mut compressor =
        Compressor::new(six_param_space(), steps, Direction::Minimize).with_seed(9);
    // Worst value first, strictly improving afterwards, so each longer
    // prefix carries a strictly better incumbent.
    let improving = ordered_history(40, 4, false);
    let (surrogate, _) = compressor.compress_space(&[history_prefix(&improving, 36)], None);
    assert_eq!(surrogate.len(), 4);

    for len in [36, 37, 38] {
        assert!(!compressor.update_compression(&[history_prefix(&improving, len)], None));
    }
    assert!(compressor.update_compression(&[improving], None));
    assert_eq!(compressor.surrogate_space().len(), 2, "target halved");
    assert_eq!(
        compressor.events().last().map(|e| e.kind),
        Some(EventKind::ProgressiveCompression),
        "shrinking continues from the current surrogate"
    );
}

// =============================================================================
// Test: expert steps work without any history at all
// =============================================================================

#[test]
fn test_expert_chain_needs_no_history() {
    let keep = vec!["x1".to_owned(), "x4".to_owned()];
    let mut ranges = std::collections::HashMap::new();
    ranges.insert("x1".to_owned(), (2.0, 4.0));
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        Box::new(ExpertDimensionStep::new(keep).unwrap()),
        Box::new(ExpertRangeStep::new(ranges).unwrap()),
    ];
    let mut compressor = Compressor::new(five_param_space(), steps, Direction::Minimize);
    let (surrogate, _) = compressor.compress_space(&[], None);
    assert_eq!(surrogate.len(), 2);
    assert_eq!(
        surrogate.get("x1").unwrap().bounds(),
        Some((2.0, 4.0)),
        "expert range intersects the original bounds"
    );
    assert_eq!(surrogate.get("x4").unwrap().bounds(), Some((0.0, 10.0)));
}

// =============================================================================
// Test: points project forward into whatever the chain produced
// =============================================================================

#[test]
fn test_project_point_follows_the_chain() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![
        Box::new(DimensionSelectionStep::new(3).unwrap()),
        Box::new(BoundaryRangeStep::new(0.5, 2.0).unwrap()),
    ];
    let mut compressor =
        Compressor::new(five_param_space(), steps, Direction::Minimize).with_seed(21);
    compressor.compress_space(&[dominated_history(40, 17)], None);

    let mut original = compressor.original_space().clone();
    original.set_seed(33);
    let point = original.sample();
    let projected = compressor.project_point(&point);
    assert_eq!(projected.len(), compressor.surrogate_space().len());
    for (name, value) in &projected {
        let def = compressor.surrogate_space().get(name).unwrap();
        let (low, high) = def.bounds().unwrap();
        assert!((low..=high).contains(&value.as_f64()), "{name} clipped into range");
    }
    assert!(!compressor.needs_unproject());
}

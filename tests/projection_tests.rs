//! Pipeline-level tests for the projection steps.

use compressor::prelude::*;

fn float_space(n: usize, low: f64, high: f64) -> ParameterSpace {
    let params = (0..n)
        .map(|i| ParamDef::float(format!("p{i}"), low, high).unwrap())
        .collect();
    ParameterSpace::new(params).unwrap()
}

// =============================================================================
// Test: REMBO embedding samples unproject exactly into the original space
// =============================================================================

#[test]
fn test_rembo_samples_unproject_into_original_space() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(RemboStep::new(2, 17).unwrap())];
    let mut compressor =
        Compressor::new(float_space(6, -5.0, 5.0), steps, Direction::Minimize).with_seed(8);
    let (surrogate, sample) = compressor.compress_space(&[], None);

    assert_eq!(surrogate.len(), 2);
    assert_eq!(sample.len(), 2, "sampling happens in the embedding");
    assert!(compressor.needs_unproject());
    assert_eq!(compressor.unprojected_space().len(), 6);

    for s in compressor.sample(25) {
        let full = compressor.unproject_point(&s.point);
        assert_eq!(full.len(), 6);
        for i in 0..6 {
            let v = full.get(&format!("p{i}")).unwrap().as_f64();
            assert!((-5.0..=5.0).contains(&v), "p{i} = {v} out of bounds");
        }
        // The embedding memoizes unprojections; mapping back is exact.
        assert_eq!(compressor.project_point(&full), s.point);
    }
}

// =============================================================================
// Test: HesBO embedding keeps every coordinate in [-1, 1]
// =============================================================================

#[test]
fn test_hesbo_embedding_space_and_unprojection() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(HesboStep::new(3, 23).unwrap())];
    let mut compressor =
        Compressor::new(float_space(10, 0.0, 100.0), steps, Direction::Minimize).with_seed(4);
    let (surrogate, _) = compressor.compress_space(&[], None);

    assert_eq!(surrogate.len(), 3);
    for def in surrogate.params() {
        assert_eq!(def.bounds(), Some((-1.0, 1.0)));
    }

    for s in compressor.sample(25) {
        let full = compressor.unproject_point(&s.point);
        assert_eq!(full.len(), 10);
        for (_, value) in &full {
            let v = value.as_f64();
            assert!((0.0..=100.0).contains(&v));
        }
    }
}

// =============================================================================
// Test: quantization renames and rescales oversized integer parameters
// =============================================================================

#[test]
fn test_quantization_pipeline_round_trip() {
    let space = ParameterSpace::new(vec![
        ParamDef::int("units", 0, 10_000).unwrap(),
        ParamDef::float("lr", 0.0, 1.0).unwrap(),
    ])
    .unwrap();
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(QuantizationStep::new(10).unwrap())];
    let mut compressor = Compressor::new(space, steps, Direction::Minimize).with_seed(2);
    let (surrogate, _) = compressor.compress_space(&[], None);

    assert!(surrogate.contains("units|q"));
    assert!(!surrogate.contains("units"));
    assert!(surrogate.contains("lr"));

    for s in compressor.sample(30) {
        let level = s.point.get("units|q").unwrap().as_f64();
        assert!((1.0..=10.0).contains(&level));

        let full = compressor.unproject_point(&s.point);
        let raw = full.get("units").unwrap().as_f64();
        assert!((0.0..=10_000.0).contains(&raw));
        // Grid levels survive a full project/unproject cycle.
        assert_eq!(
            compressor.project_point(&full).get("units|q"),
            s.point.get("units|q")
        );
    }
}

// =============================================================================
// Test: kernel PCA is forward-only and leaves the sampling space alone
// =============================================================================

#[test]
fn test_kpca_projects_forward_only() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(KpcaStep::new(2, 0.5).unwrap())];
    let mut compressor =
        Compressor::new(float_space(5, 0.0, 1.0), steps, Direction::Minimize).with_seed(12);

    let mut seeded = float_space(5, 0.0, 1.0);
    seeded.set_seed(3);
    let mut history = EvaluationHistory::new();
    for _ in 0..30 {
        let point = seeded.sample();
        let value = point.get("p0").unwrap().as_f64();
        history.record(point, value);
    }
    let (surrogate, sample) = compressor.compress_space(&[history], None);

    assert_eq!(surrogate.len(), 2);
    assert!(surrogate.contains("kpca_0"));
    assert!(surrogate.contains("kpca_1"));
    // No inverse map exists, so candidates still come from the original.
    assert_eq!(sample.len(), 5);
    assert!(!compressor.needs_unproject());

    let point = seeded.sample();
    let projected = compressor.project_point(&point);
    assert_eq!(projected.len(), 2);
    for (_, value) in &projected {
        assert!(value.as_f64().is_finite());
    }
}

#[test]
fn test_kpca_without_history_degrades() {
    let steps: Vec<Box<dyn CompressionStep>> = vec![Box::new(KpcaStep::new(2, 0.5).unwrap())];
    let mut compressor = Compressor::new(float_space(5, 0.0, 1.0), steps, Direction::Minimize);
    let (surrogate, _) = compressor.compress_space(&[], None);
    assert_eq!(surrogate.len(), 5);
    let summary = compressor.compression_summary();
    assert_eq!(summary.steps[0].degraded, Some(DegradedReason::NoHistory));
}

// =============================================================================
// Test: adaptive quantization refines its grid when the search stalls
// =============================================================================

#[test]
fn test_adaptive_quantization_recompresses_on_stagnation() {
    let space = ParameterSpace::new(vec![ParamDef::int("units", 0, 10_000).unwrap()]).unwrap();
    let steps: Vec<Box<dyn CompressionStep>> =
        vec![Box::new(QuantizationStep::new(10).unwrap().adaptive())];
    let mut compressor = Compressor::new(space, steps, Direction::Minimize).with_seed(2);
    compressor.compress_space(&[], None);
    assert_eq!(
        compressor.surrogate_space().get("units|q").unwrap().bounds(),
        Some((1.0, 10.0))
    );

    // The incumbent never moves across update calls: a baseline call,
    // then five stagnant ones fill the stagnation window.
    let mut history = EvaluationHistory::new();
    for i in 0..10 {
        let mut point = Point::new();
        point.insert("units".to_owned(), ParamValue::Int(i * 100));
        history.record(point, 1.0 + f64::from(u32::try_from(i).unwrap()));
    }
    for _ in 0..5 {
        assert!(!compressor.update_compression(&[history.clone()], None));
    }
    assert!(compressor.update_compression(&[history], None));
    assert_eq!(
        compressor.surrogate_space().get("units|q").unwrap().bounds(),
        Some((1.0, 15.0)),
        "stagnation adds five grid levels"
    );
    assert_eq!(
        compressor.events().last().map(|e| e.kind),
        Some(EventKind::AdaptiveUpdate)
    );
}

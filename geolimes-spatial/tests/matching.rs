//! End-to-end matching behaviour over small synthetic datasets.

use geolimes_core::Record;
use geolimes_spatial::{
    MatchConfig, MatchErrorKind, MatchResult, MatchingEngine, PredicateSet, Relation,
};

fn engine(chunk_size: usize, workers: usize) -> MatchingEngine {
    MatchingEngine::new(
        MatchConfig::default()
            .with_chunk_size(chunk_size)
            .with_workers(workers),
    )
    .unwrap()
}

fn square(id: &str, x: f64, y: f64, size: f64, offset: u64) -> Record {
    Record::new(
        id,
        format!(
            "POLYGON(({x} {y}, {} {y}, {} {}, {x} {}, {x} {y}))",
            x + size,
            x + size,
            y + size,
            y + size
        ),
        offset,
    )
}

fn sorted(mut results: Vec<MatchResult>) -> Vec<MatchResult> {
    results.sort_by(|a, b| {
        (&a.source_id, a.relation, &a.target_id).cmp(&(&b.source_id, b.relation, &b.target_id))
    });
    results
}

/// 50 sources mixing points and squares, 50 targets on a 10x5 grid of
/// touching squares.
fn fixture() -> (Vec<Record>, Vec<Record>) {
    let targets: Vec<Record> = (0..50)
        .map(|i| {
            let x = (i % 10) as f64 * 10.0;
            let y = (i / 10) as f64 * 10.0;
            square(&format!("t{i}"), x, y, 10.0, i as u64)
        })
        .collect();

    let sources: Vec<Record> = (0..50)
        .map(|i| {
            let x = ((i * 37) % 100) as f64 + 0.5;
            let y = ((i * 13) % 50) as f64 + 0.5;
            if i % 3 == 0 {
                square(&format!("s{i}"), x, y, 4.0, i as u64)
            } else {
                Record::new(format!("s{i}"), format!("POINT({x} {y})"), i as u64)
            }
        })
        .collect();

    (sources, targets)
}

#[test]
fn results_independent_of_partitioning() {
    let (sources, targets) = fixture();
    let predicates = PredicateSet::new(
        [
            Relation::Intersects,
            Relation::Within,
            Relation::Overlaps,
            Relation::Touches,
        ],
        None,
    )
    .unwrap();

    let small = engine(10, 4);
    let snapshot = small.snapshot(targets.clone());
    let a = small.run(&sources, &snapshot, &predicates);
    assert_eq!(a.stats.chunks, 5);

    let large = engine(50, 2);
    let snapshot = large.snapshot(targets);
    let b = large.run(&sources, &snapshot, &predicates);
    assert_eq!(b.stats.chunks, 1);

    assert!(!a.results.is_empty());
    assert_eq!(sorted(a.results), sorted(b.results));
    assert!(a.errors.is_empty() && b.errors.is_empty());
}

#[test]
fn distance_results_independent_of_partitioning() {
    let (sources, targets) = fixture();
    let predicates = PredicateSet::new([Relation::Distance], Some(12.0)).unwrap();

    let one = engine(1, 3);
    let snapshot = one.snapshot(targets.clone());
    let a = one.run(&sources, &snapshot, &predicates);

    let all = engine(50, 2);
    let snapshot = all.snapshot(targets);
    let b = all.run(&sources, &snapshot, &predicates);

    assert_eq!(a.stats.exact_checks, 50 * 50);
    assert_eq!(sorted(a.results), sorted(b.results));
}

#[test]
fn one_malformed_target_among_twenty() {
    // Every target covers (5, 5); the 8th cannot be parsed.
    let targets: Vec<Record> = (0..20)
        .map(|i| {
            if i == 7 {
                Record::new("t7", "POLYGON((0 0, 10 0, 10", 7)
            } else {
                square(&format!("t{i}"), 0.0, 0.0, 10.0 + i as f64, i as u64)
            }
        })
        .collect();
    let engine = engine(10, 2);
    let snapshot = engine.snapshot(targets);
    let predicates = PredicateSet::new([Relation::Intersects], None).unwrap();

    let outcome = engine.run(&[Record::new("s", "POINT(5 5)", 0)], &snapshot, &predicates);

    assert_eq!(outcome.results.len(), 19);
    assert!(outcome.results.iter().all(|r| r.target_id != "t7"));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].subject_id, "t7");
    assert_eq!(outcome.errors[0].kind, MatchErrorKind::InvalidGeometry);
}

#[test]
fn one_invalid_target_among_twenty() {
    // The bowtie parses, so it is indexed and reported when reached.
    let targets: Vec<Record> = (0..20)
        .map(|i| {
            if i == 3 {
                Record::new("t3", "POLYGON((0 0, 10 10, 10 0, 0 10, 0 0))", 3)
            } else {
                square(&format!("t{i}"), 0.0, 0.0, 10.0 + i as f64, i as u64)
            }
        })
        .collect();
    let engine = engine(10, 2);
    let snapshot = engine.snapshot(targets);
    let predicates = PredicateSet::new([Relation::Intersects], None).unwrap();

    // Several sources reach the bowtie; its error is still reported once.
    let sources = vec![
        Record::new("s1", "POINT(5 5)", 0),
        Record::new("s2", "POINT(6 6)", 1),
    ];
    let outcome = engine.run(&sources, &snapshot, &predicates);

    assert_eq!(outcome.results.len(), 38);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].message().starts_with("Geometry not valid: t3"));
}

#[test]
fn distance_threshold_is_strict() {
    let engine = engine(10, 2);
    let snapshot = engine.snapshot(vec![
        Record::new("near", "POINT(9.9 0)", 0),
        Record::new("far", "POINT(10.1 0)", 1),
    ]);
    let predicates = PredicateSet::new([Relation::Distance], Some(10.0)).unwrap();

    let outcome = engine.run(&[Record::new("origin", "POINT(0 0)", 0)], &snapshot, &predicates);

    assert_eq!(outcome.results.len(), 1);
    let hit = &outcome.results[0];
    assert_eq!(hit.target_id, "near");
    assert_eq!(hit.relation, Relation::Distance);
    assert!((hit.distance.unwrap() - 9.9).abs() < 1e-9);
}

#[test]
fn empty_inputs_produce_empty_outcome() {
    let engine = engine(10, 2);
    let snapshot = engine.snapshot(Vec::new());
    let predicates = PredicateSet::new([Relation::Within], None).unwrap();

    let outcome = engine.run(&[Record::new("s", "POINT(0 0)", 0)], &snapshot, &predicates);
    assert!(outcome.results.is_empty());
    assert!(outcome.errors.is_empty());

    let outcome = engine.run(&[], &snapshot, &predicates);
    assert_eq!(outcome.stats.chunks, 0);
}

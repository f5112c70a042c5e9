//! End-to-end scenarios driven against the in-memory `SimOracle`.
//!
//! Each test wires a small hidden graph, runs the full exploration
//! loop against it, and checks that the submitted guess reconstructs
//! the hidden graph up to relabeling.

mod common;

use common::SimOracle;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use warren_engine::{EngineConfig, EngineError, ExplorationLoop};

fn dry_run_config() -> EngineConfig {
    EngineConfig {
        dry_run: true,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn two_rooms_single() {
    let rooms = vec![0u8, 1u8];
    let connections = [
        (0usize, 0u8, 1usize, 3u8),
        (0, 1, 0, 1),
        (0, 2, 0, 2),
        (0, 3, 0, 3),
        (0, 4, 0, 4),
        (0, 5, 0, 5),
        (1, 0, 1, 0),
        (1, 1, 1, 1),
        (1, 2, 1, 2),
        (1, 4, 1, 4),
        (1, 5, 1, 5),
    ];
    let oracle = SimOracle::new(rooms, &connections);
    let verifier = oracle.clone();
    let mut exploration = ExplorationLoop::new(oracle, dry_run_config(), 2);
    let map = exploration.run("two_rooms_single").await.unwrap();
    assert!(verifier.verify_guess(&map));
}

#[tokio::test]
async fn two_rooms_full() {
    let rooms = vec![0u8, 1u8];
    let connections: Vec<(usize, u8, usize, u8)> = (0u8..6).map(|d| (0usize, d, 1usize, d)).collect();
    let oracle = SimOracle::new(rooms, &connections);
    let verifier = oracle.clone();
    let mut exploration = ExplorationLoop::new(oracle, dry_run_config(), 2);
    let map = exploration.run("two_rooms_full").await.unwrap();
    assert!(verifier.verify_guess(&map));
}

#[tokio::test]
async fn three_rooms_five_loops() {
    let rooms = vec![0u8, 1u8, 2u8];
    let connections = [
        (0usize, 0u8, 0usize, 0u8),
        (0, 1, 0, 1),
        (0, 2, 0, 2),
        (0, 3, 0, 3),
        (0, 4, 1, 4),
        (0, 5, 2, 5),
        (1, 0, 1, 0),
        (1, 1, 1, 1),
        (1, 2, 1, 2),
        (1, 3, 1, 3),
        (1, 5, 1, 5),
        (2, 0, 2, 0),
        (2, 1, 2, 1),
        (2, 2, 2, 2),
        (2, 3, 2, 3),
        (2, 4, 2, 4),
    ];
    let oracle = SimOracle::new(rooms, &connections);
    let verifier = oracle.clone();
    let mut exploration = ExplorationLoop::new(oracle, dry_run_config(), 3);
    let map = exploration.run("three_rooms_five_loops").await.unwrap();
    assert!(verifier.verify_guess(&map));
}

#[tokio::test]
async fn six_rooms_circular() {
    let rooms = vec![0u8, 1u8, 2u8, 3u8, 0u8, 1u8];
    let mut connections: Vec<(usize, u8, usize, u8)> = Vec::new();
    for i in 0usize..6 {
        connections.push((i, 0, (i + 1) % 6, 3));
    }
    for i in 0usize..6 {
        for d in [1u8, 2, 4, 5] {
            connections.push((i, d, i, d));
        }
    }
    let oracle = SimOracle::new(rooms, &connections);
    let verifier = oracle.clone();
    let mut exploration = ExplorationLoop::new(oracle, dry_run_config(), 6);
    let map = exploration.run("six_rooms_circular").await.unwrap();
    assert!(verifier.verify_guess(&map));
}

#[tokio::test]
async fn stress_sixty_rooms_random() {
    let n = 60usize;
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let rooms: Vec<u8> = (0..n).map(|_| rng.gen_range(0..4)).collect();

    let mut half_edges: Vec<(usize, u8)> = Vec::with_capacity(n * 6);
    for room in 0..n {
        for door in 0u8..6 {
            half_edges.push((room, door));
        }
    }
    half_edges.shuffle(&mut rng);
    let connections: Vec<(usize, u8, usize, u8)> = half_edges
        .chunks(2)
        .map(|pair| (pair[0].0, pair[0].1, pair[1].0, pair[1].1))
        .collect();

    let oracle = SimOracle::new(rooms, &connections);
    let verifier = oracle.clone();
    let mut exploration = ExplorationLoop::new(oracle, dry_run_config(), n);
    match exploration.run("stress_sixty_rooms_random").await {
        Ok(map) => assert!(verifier.verify_guess(&map)),
        Err(EngineError::BudgetExhausted { .. }) => {}
        Err(other) => panic!("unexpected failure: {other}"),
    }
}

#[test]
fn invalid_charcoal_label_is_rejected_before_submission() {
    let err = warren_engine::token::decode("01[5]2").unwrap_err();
    assert_eq!(
        err,
        warren_engine::token::DecodeError::BadCharcoalLabel { pos: 3, ch: '5' }
    );
}

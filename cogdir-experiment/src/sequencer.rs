//! Direction sequences and attention-check schedules.

use std::collections::BTreeSet;

use cogdir_core::Direction;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::Paradigm;

/// Directions for every trial of a session, in presentation order.
pub fn generate_sequence<R: Rng + ?Sized>(paradigm: &Paradigm, rng: &mut R) -> Vec<Direction> {
    match paradigm {
        Paradigm::FourDirection { total_trials } => {
            random_sequence(*total_trials, &Direction::ALL, rng)
        }
        Paradigm::Balanced {
            up_trials,
            down_trials,
            randomize,
        } => balanced_sequence(*up_trials, *down_trials, *randomize, rng),
    }
}

/// Independent uniform draws; no balance guarantee.
pub fn random_sequence<R: Rng + ?Sized>(
    total_trials: u32,
    directions: &[Direction],
    rng: &mut R,
) -> Vec<Direction> {
    if directions.is_empty() {
        return Vec::new();
    }
    (0..total_trials)
        .map(|_| directions[rng.random_range(0..directions.len())])
        .collect()
}

/// Exactly `up_trials` ups and `down_trials` downs. Block order unless
/// `randomize`, in which case the block is Fisher–Yates shuffled.
pub fn balanced_sequence<R: Rng + ?Sized>(
    up_trials: u32,
    down_trials: u32,
    randomize: bool,
    rng: &mut R,
) -> Vec<Direction> {
    let mut trials: Vec<Direction> = std::iter::repeat_n(Direction::Up, up_trials as usize)
        .chain(std::iter::repeat_n(Direction::Down, down_trials as usize))
        .collect();
    if randomize {
        trials.shuffle(rng);
    }
    trials
}

/// Number of checks a session of `total_trials` gets at `probability`.
pub fn attention_check_count(total_trials: u32, probability: f64) -> usize {
    if probability.is_nan() || probability <= 0.0 {
        return 0;
    }
    let p = probability.min(1.0);
    ((total_trials as f64 * p).floor() as usize).min(total_trials as usize)
}

/// Distinct trial numbers in `1..=total_trials`, ascending.
pub fn generate_attention_checks<R: Rng + ?Sized>(
    total_trials: u32,
    probability: f64,
    rng: &mut R,
) -> Vec<u32> {
    let target = attention_check_count(total_trials, probability);
    let mut checks = BTreeSet::new();
    while checks.len() < target {
        checks.insert(rng.random_range(1..=total_trials));
    }
    checks.into_iter().collect()
}

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seed for task `index` of a build seeded with `base`.
///
/// A SplitMix64 finalizer over `base + (index + 1) * gamma`, so neighbouring
/// indices land far apart and a task's stream never depends on which thread or
/// resume point builds it.
#[must_use]
pub fn derive_task_seed(base: u64, index: u64) -> u64 {
    let mut z = base.wrapping_add(index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// `n` draws with replacement from `0..n`.
pub fn bootstrap_sample(n: usize, rng: &mut SmallRng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Membership flags for a sample over `n` instances.
#[must_use]
pub fn in_bag_mask(n: usize, sample: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; n];
    for index in sample {
        if let Some(slot) = mask.get_mut(*index) {
            *slot = true;
        }
    }
    mask
}

/// Instances absent from `sample`, ascending.
#[must_use]
pub fn out_of_bag(n: usize, sample: &[usize]) -> Vec<usize> {
    in_bag_mask(n, sample)
        .into_iter()
        .enumerate()
        .filter_map(|(index, in_bag)| (!in_bag).then_some(index))
        .collect()
}

/// One unit of work of a bagged build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    /// Position in the build sequence.
    pub task_index: usize,
    /// Seed of the task-local stream.
    pub seed: u64,
}

impl BuildTask {
    /// Task `task_index` of a build seeded with `base_seed`.
    #[must_use]
    pub fn new(base_seed: u64, task_index: usize) -> Self {
        Self {
            task_index,
            seed: derive_task_seed(base_seed, task_index as u64),
        }
    }

    /// Fresh stream owned by this task.
    #[must_use]
    pub fn rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed)
    }
}

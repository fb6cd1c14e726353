//! Replica selection.
//!
//! A [`ReplicaSet`](crate::ReplicaSet) owns one [`ReplicaPicker`] and asks it
//! for an index on every read. Two pickers ship here: [`ThreadRngPicker`],
//! the default, and [`SeededPicker`], which is reproducible.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chooses which replica serves a read.
///
/// Implementations must be safe to call from many tasks at once and should
/// draw uniformly: each call is independent of the previous ones.
pub trait ReplicaPicker: Send + Sync + fmt::Debug {
    /// Returns an index in `0..len`. Callers never pass `len == 0`.
    fn pick(&self, len: usize) -> usize;
}

/// Picks with the calling thread's generator. Holds no shared state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngPicker;

impl ReplicaPicker for ThreadRngPicker {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }
}

/// Picks from a seeded generator, so a given seed always produces the same
/// sequence of choices.
///
/// # Examples
///
/// ```
/// use isql_db::{ReplicaPicker, SeededPicker};
///
/// let a = SeededPicker::new(7);
/// let b = SeededPicker::new(7);
/// let first: Vec<usize> = (0..8).map(|_| a.pick(5)).collect();
/// let second: Vec<usize> = (0..8).map(|_| b.pick(5)).collect();
/// assert_eq!(first, second);
/// ```
pub struct SeededPicker {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl SeededPicker {
    /// Creates a picker seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The seed this picker started from.
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl fmt::Debug for SeededPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededPicker")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl ReplicaPicker for SeededPicker {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        // A panic elsewhere cannot leave an StdRng half-updated.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..len)
    }
}

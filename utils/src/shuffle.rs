//! Order randomization used by the dispatcher.

use rand::seq::SliceRandom;

/// Produces a permutation of `0..len`.
pub trait Shuffler: Send + Sync {
    fn permutation(&self, len: usize) -> Vec<usize>;
}

/// Uniform shuffling with the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngShuffler;

impl Shuffler for ThreadRngShuffler {
    fn permutation(&self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rand::thread_rng());
        order
    }
}

/// Reorder `items` by the permutation the shuffler returns.
///
/// Indices outside `0..len` or repeated indices are ignored, and any item the
/// permutation skips is appended in its original order, so no item is lost
/// or duplicated whatever the shuffler returns.
pub fn shuffle_with<T>(shuffler: &dyn Shuffler, items: Vec<T>) -> Vec<T> {
    let len = items.len();
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(len);
    for idx in shuffler.permutation(len) {
        if let Some(item) = slots.get_mut(idx).and_then(Option::take) {
            out.push(item);
        }
    }
    out.extend(slots.into_iter().flatten());
    out
}

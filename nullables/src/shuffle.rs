//! Nullable shuffler: keeps input order, or reverses it.

use xrelay_utils::Shuffler;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullShuffler {
    reverse: bool,
}

impl NullShuffler {
    /// Identity permutation.
    pub fn new() -> Self {
        Self { reverse: false }
    }

    pub fn reversing() -> Self {
        Self { reverse: true }
    }
}

impl Shuffler for NullShuffler {
    fn permutation(&self, len: usize) -> Vec<usize> {
        if self.reverse {
            (0..len).rev().collect()
        } else {
            (0..len).collect()
        }
    }
}

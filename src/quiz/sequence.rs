use std::collections::HashSet;
use std::hash::Hash;

use rand::Rng;

/// How many groups [`NonRepeating`] draws before it gives up and emits a group with duplicates.
pub const DEFAULT_MAX_TRIES: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("cannot draw from an empty pool")]
    ExhaustedPool,
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
}

/// A pull-based, never ending source of items.
pub trait Sequence {
    type Item;

    fn next_item(&mut self) -> Result<Self::Item, SequenceError>;
}

/// Durstenfeld variation of the Fisher-Yates in-place shuffle.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    let len = items.len();
    if len < 2 {
        return;
    }
    for i in 0..len - 1 {
        // [i, len), so an item may stay where it is
        let swap_with = rng.gen_range(i..len);
        items.swap(i, swap_with);
    }
}

/// Infinite sequence of the pool's items in random order.
///
/// Every full pass over the pool is a permutation of it, and the same item is never
/// emitted twice in a row, except for a pool of a single item (which repeats forever).
/// A pool of two items therefore strictly alternates.
pub struct RandomSequence<T, R> {
    items: Vec<T>,
    // Position of the last emitted item in `items`
    cursor: Option<usize>,
    rng: R,
}

impl<T, R> RandomSequence<T, R>
where
    T: Clone + PartialEq,
    R: Rng,
{
    pub fn new(mut items: Vec<T>, mut rng: R) -> Self {
        shuffle(&mut items, &mut rng);
        Self {
            items,
            cursor: None,
            rng,
        }
    }

    /// Replaces the pool and starts over, as if freshly created.
    pub fn reload(&mut self, items: Vec<T>) {
        self.items = items;
        shuffle(&mut self.items, &mut self.rng);
        self.cursor = None;
    }
}

impl<T, R> Sequence for RandomSequence<T, R>
where
    T: Clone + PartialEq,
    R: Rng,
{
    type Item = T;

    fn next_item(&mut self) -> Result<T, SequenceError> {
        let len = self.items.len();
        if len == 0 {
            return Err(SequenceError::ExhaustedPool);
        }

        let last = self.cursor.map(|idx| self.items[idx].clone());
        let mut current = self.cursor.map_or(0, |idx| idx + 1);
        if current >= len {
            shuffle(&mut self.items, &mut self.rng);
            current = 0;
        }
        // The new cycle may start with the item that closed the previous one,
        // in that case it's dropped from this cycle.
        if current + 1 < len && last.as_ref() == Some(&self.items[current]) {
            log::trace!("skipping repeated item at the start of a cycle");
            current += 1;
        }

        self.cursor = Some(current);
        Ok(self.items[current].clone())
    }
}

impl<T, R> Iterator for RandomSequence<T, R>
where
    T: Clone + PartialEq,
    R: Rng,
{
    type Item = T;

    /// Never returns `None` unless the pool is empty.
    fn next(&mut self) -> Option<T> {
        self.next_item().ok()
    }
}

/// Groups consecutive items of the inner sequence into chunks of a fixed size.
pub struct Chunked<S> {
    inner: S,
    size: usize,
}

impl<S: Sequence> Chunked<S> {
    pub fn new(inner: S, size: usize) -> Result<Self, SequenceError> {
        if size == 0 {
            return Err(SequenceError::ZeroChunkSize);
        }
        Ok(Self { inner, size })
    }
}

impl<S: Sequence> Sequence for Chunked<S> {
    type Item = Vec<S::Item>;

    fn next_item(&mut self) -> Result<Self::Item, SequenceError> {
        (0..self.size).map(|_| self.inner.next_item()).collect()
    }
}

/// Redraws groups until one has no duplicates inside it.
///
/// After `max_tries` draws the last group is emitted as is, so a pool that can't
/// satisfy the constraint still makes progress.
pub struct NonRepeating<S> {
    inner: S,
    max_tries: usize,
}

impl<S> NonRepeating<S> {
    pub fn new(inner: S) -> Self {
        Self::with_max_tries(inner, DEFAULT_MAX_TRIES)
    }

    pub fn with_max_tries(inner: S, max_tries: usize) -> Self {
        Self {
            inner,
            max_tries: max_tries.max(1),
        }
    }
}

impl<S, T> Sequence for NonRepeating<S>
where
    S: Sequence<Item = Vec<T>>,
    T: Eq + Hash,
{
    type Item = Vec<T>;

    fn next_item(&mut self) -> Result<Vec<T>, SequenceError> {
        let mut tries = 0;
        loop {
            let group = self.inner.next_item()?;
            tries += 1;
            if all_distinct(&group) {
                return Ok(group);
            }
            if tries >= self.max_tries {
                log::debug!("no distinct group after {} tries, emitting a repeating one", tries);
                return Ok(group);
            }
        }
    }
}

fn all_distinct<T: Eq + Hash>(group: &[T]) -> bool {
    group.iter().collect::<HashSet<_>>().len() == group.len()
}

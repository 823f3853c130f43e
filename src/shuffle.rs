use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{Catalog, CatalogItem};

/// In-place Fisher-Yates: walk from the last slot down to 1 and swap each with
/// a uniformly chosen slot in `[0, i]`.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Hands out catalog items in shuffled cycles without repeating inside a cycle.
///
/// The permutation holds indices into the shared catalog. Once the cursor
/// reaches the end the whole catalog is reshuffled, so every item becomes
/// eligible again on the next cycle.
#[derive(Debug)]
pub struct ShufflePool<R = StdRng> {
    catalog: Catalog,
    permutation: Vec<usize>,
    cursor: usize,
    cycles: u64,
    rng: R,
}

impl ShufflePool<StdRng> {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }
}

impl<R: Rng> ShufflePool<R> {
    /// Builds an exhausted pool; the first `next` computes the first cycle.
    pub fn with_rng(catalog: Catalog, rng: R) -> Self {
        Self {
            catalog,
            permutation: Vec::new(),
            cursor: 0,
            cycles: 0,
            rng,
        }
    }

    /// Points the pool at another catalog and starts a cycle without `exclude`.
    pub fn rebind(&mut self, catalog: Catalog, exclude: Option<&str>) {
        self.catalog = catalog;
        self.cycles = 0;
        self.reshuffle(exclude);
    }

    /// Replaces the current cycle with a fresh permutation of the catalog,
    /// leaving out the item whose id matches `exclude`.
    pub fn reshuffle(&mut self, exclude: Option<&str>) -> Vec<CatalogItem> {
        let items = self.catalog.items();
        let mut permutation: Vec<usize> = (0..items.len())
            .filter(|&idx| exclude.map_or(true, |id| items[idx].id != id))
            .collect();
        fisher_yates(&mut permutation, &mut self.rng);

        self.permutation = permutation;
        self.cursor = 0;
        self.cycles += 1;
        self.remaining()
    }

    /// Next item of the current cycle, reshuffling the full catalog first when
    /// the cycle is spent. `None` only for an empty catalog.
    pub fn next_item(&mut self) -> Option<CatalogItem> {
        if self.cursor >= self.permutation.len() {
            self.reshuffle(None);
        }
        let idx = *self.permutation.get(self.cursor)?;
        self.cursor += 1;
        self.catalog.items().get(idx).cloned()
    }

    /// Items still unread in the current cycle, in draw order.
    pub fn remaining(&self) -> Vec<CatalogItem> {
        let items = self.catalog.items();
        self.permutation[self.cursor..]
            .iter()
            .map(|&idx| items[idx].clone())
            .collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cycle_len(&self) -> usize {
        self.permutation.len()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl<R: Rng> Iterator for ShufflePool<R> {
    type Item = CatalogItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item()
    }
}

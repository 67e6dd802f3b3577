//! The draft-phase resource accumulator.
//!
//! Painting is two-pass: every painted value first declares what it will
//! need (`draft`), the subgroup's artist allocates GPU buffers sized
//! exactly to the totals (`setup`), and only then do values emit
//! vertices (`paint`). Nothing resizes mid-paint.

use std::any::TypeId;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct DraftCounts {
    blocks: usize,
    glyphs_per_page: HashMap<usize, usize>,
    custom: HashMap<TypeId, usize>,
}

impl DraftCounts {
    pub fn add_blocks(&mut self, n: usize) {
        self.blocks += n;
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Declare `n` glyphs drawn from the given atlas page.
    pub fn add_glyphs(&mut self, page: usize, n: usize) {
        *self.glyphs_per_page.entry(page).or_insert(0) += n;
    }

    pub fn glyphs(&self, page: usize) -> usize {
        self.glyphs_per_page.get(&page).copied().unwrap_or(0)
    }

    pub fn glyph_pages(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.glyphs_per_page.iter().map(|(k, v)| (*k, *v))
    }

    pub fn total_glyphs(&self) -> usize {
        self.glyphs_per_page.values().sum()
    }

    /// Extension slot for custom artists, keyed by a marker type.
    pub fn add_custom<T: 'static>(&mut self, n: usize) {
        *self.custom.entry(TypeId::of::<T>()).or_insert(0) += n;
    }

    pub fn custom<T: 'static>(&self) -> usize {
        self.custom.get(&TypeId::of::<T>()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MarkerA;
    struct MarkerB;

    #[test]
    fn test_counts_accumulate() {
        let mut c = DraftCounts::default();
        c.add_blocks(2);
        c.add_blocks(1);
        c.add_glyphs(0, 5);
        c.add_glyphs(0, 2);
        c.add_glyphs(3, 1);
        assert_eq!(c.blocks(), 3);
        assert_eq!(c.glyphs(0), 7);
        assert_eq!(c.glyphs(3), 1);
        assert_eq!(c.total_glyphs(), 8);
    }

    #[test]
    fn test_custom_slots_are_type_keyed() {
        let mut c = DraftCounts::default();
        c.add_custom::<MarkerA>(4);
        assert_eq!(c.custom::<MarkerA>(), 4);
        assert_eq!(c.custom::<MarkerB>(), 0);
    }
}

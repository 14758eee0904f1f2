//! Sets of pixels as lists of disjoint rectangles.

use crate::rect::Rect;

/// A set of pixels stored as pairwise-disjoint, non-empty rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(&rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding box of the whole region.
    pub fn extents(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, r| acc.union(r))
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Add `rect`; only its parts not already present are stored.
    pub fn union_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![*rect];
        for existing in &self.rects {
            pieces = pieces
                .iter()
                .flat_map(|p| p.subtract(existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
        self.coalesce();
    }

    /// Merge rectangles that share a full edge until none do.
    fn coalesce(&mut self) {
        let mut merged = true;
        while merged {
            merged = false;
            'scan: for i in 0..self.rects.len() {
                for j in i + 1..self.rects.len() {
                    if let Some(joined) = join(&self.rects[i], &self.rects[j]) {
                        self.rects[i] = joined;
                        self.rects.swap_remove(j);
                        merged = true;
                        break 'scan;
                    }
                }
            }
        }
    }

    pub fn union(&mut self, other: &Region) {
        for r in &other.rects {
            self.union_rect(r);
        }
    }

    /// Remove `rect` from the region.
    pub fn subtract_rect(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self.rects.iter().flat_map(|r| r.subtract(rect)).collect();
    }

    /// Keep only the part inside `rect`.
    pub fn intersect_rect(&mut self, rect: &Rect) {
        self.rects = self
            .rects
            .iter()
            .map(|r| r.intersect(rect))
            .filter(|r| !r.is_empty())
            .collect();
    }

    /// Whether every pixel of `rect` is in the region.
    pub fn contains(&self, rect: &Rect) -> bool {
        if rect.is_empty() {
            return true;
        }
        let mut missing = vec![*rect];
        for r in &self.rects {
            missing = missing.iter().flat_map(|m| m.subtract(r)).collect();
            if missing.is_empty() {
                return true;
            }
        }
        missing.is_empty()
    }

    /// Parts of `rect` not covered by the region.
    pub fn missing(&self, rect: &Rect) -> Region {
        let mut out = Region::from_rect(*rect);
        for r in &self.rects {
            out.subtract_rect(r);
        }
        out
    }
}

/// The union of `a` and `b` when it is itself a rectangle of their
/// combined area: equal spans side by side or stacked.
fn join(a: &Rect, b: &Rect) -> Option<Rect> {
    let side_by_side = a.y == b.y && a.height == b.height;
    let stacked = a.x == b.x && a.width == b.width;
    let touching = (side_by_side && (a.right() == i64::from(b.x) || b.right() == i64::from(a.x)))
        || (stacked && (a.bottom() == i64::from(b.y) || b.bottom() == i64::from(a.y)));
    touching.then(|| a.union(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_union_keeps_rects_disjoint() {
        let mut region = Region::new();
        region.union_rect(&Rect::new(0, 0, 10, 10));
        region.union_rect(&Rect::new(5, 5, 10, 10));
        assert_eq!(region.area(), 100 + 100 - 25);
        assert_eq!(region.extents(), Rect::new(0, 0, 15, 15));
    }

    #[test]
    fn test_region_subtract_then_contains() {
        let mut region = Region::from_rect(Rect::new(0, 0, 8, 8));
        region.subtract_rect(&Rect::new(2, 2, 2, 2));
        assert!(!region.contains(&Rect::new(0, 0, 8, 8)));
        assert!(region.contains(&Rect::new(0, 0, 8, 2)));
        assert!(!region.contains(&Rect::new(3, 3, 1, 1)));
        assert_eq!(region.area(), 60);
    }

    #[test]
    fn test_region_missing_parts() {
        let region = Region::from_rect(Rect::new(0, 0, 4, 4));
        let missing = region.missing(&Rect::new(2, 0, 4, 4));
        assert_eq!(missing.area(), 8);
        assert_eq!(missing.extents(), Rect::new(4, 0, 2, 4));
    }

    #[test]
    fn test_region_union_merges_adjacent_tiles() {
        let mut region = Region::new();
        for (x, y) in [(0, 0), (8, 0), (0, 8), (8, 8)] {
            region.union_rect(&Rect::new(x, y, 8, 8));
        }
        assert_eq!(region.rects(), &[Rect::new(0, 0, 16, 16)]);
    }

    #[test]
    fn test_region_stays_compact_under_repeated_strips() {
        let mut region = Region::new();
        for y in 0..64 {
            region.union_rect(&Rect::new(0, y, 32, 1));
        }
        assert_eq!(region.rects().len(), 1);
        assert_eq!(region.area(), 32 * 64);
    }

    #[test]
    fn test_region_keeps_unaligned_pieces_apart() {
        let mut region = Region::from_rect(Rect::new(0, 0, 4, 4));
        region.union_rect(&Rect::new(4, 0, 4, 2));
        assert_eq!(region.rects().len(), 2);
        assert_eq!(region.area(), 24);
    }

    #[test]
    fn test_region_intersect() {
        let mut region = Region::from_rect(Rect::new(0, 0, 4, 4));
        region.union_rect(&Rect::new(10, 10, 4, 4));
        region.intersect_rect(&Rect::new(2, 2, 10, 10));
        assert_eq!(region.area(), 4 + 4);
    }
}

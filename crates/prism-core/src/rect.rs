//! Integer rectangles in pixel coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle. Empty when `width <= 0` or `height <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

const INFINITE_ORIGIN: i32 = -(1 << 29);
const INFINITE_SIZE: i32 = 1 << 30;

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The unbounded plane used as the extent of infinite sources.
    pub const fn infinite() -> Self {
        Self::new(INFINITE_ORIGIN, INFINITE_ORIGIN, INFINITE_SIZE, INFINITE_SIZE)
    }

    pub fn is_infinite(&self) -> bool {
        self.width >= INFINITE_SIZE && self.height >= INFINITE_SIZE
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Pixel count; zero when empty.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        !self.is_empty()
            && x >= self.x
            && y >= self.y
            && i64::from(x) < self.right()
            && i64::from(y) < self.bottom()
    }

    /// Whether `other` lies entirely inside `self`. An empty `other` is always contained.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Overlap of two rectangles; `Rect::default()` when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::default();
        }
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if i64::from(x0) >= x1 || i64::from(y0) >= y1 {
            return Rect::default();
        }
        Rect::new(x0, y0, (x1 - i64::from(x0)) as i32, (y1 - i64::from(y0)) as i32)
    }

    /// Bounding box of both rectangles; empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(
            x0,
            y0,
            clamp_len(x1 - i64::from(x0)),
            clamp_len(y1 - i64::from(y0)),
        )
    }

    /// `self` minus `other`, as up to four disjoint rectangles.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        let overlap = self.intersect(other);
        if overlap.is_empty() {
            return if self.is_empty() { Vec::new() } else { vec![*self] };
        }

        let mut out = Vec::with_capacity(4);
        // top band
        if overlap.y > self.y {
            out.push(Rect::new(self.x, self.y, self.width, overlap.y - self.y));
        }
        // bottom band
        if overlap.bottom() < self.bottom() {
            let y = overlap.bottom() as i32;
            out.push(Rect::new(self.x, y, self.width, (self.bottom() - overlap.bottom()) as i32));
        }
        // left and right within the overlap rows
        if overlap.x > self.x {
            out.push(Rect::new(self.x, overlap.y, overlap.x - self.x, overlap.height));
        }
        if overlap.right() < self.right() {
            let x = overlap.right() as i32;
            out.push(Rect::new(x, overlap.y, (self.right() - overlap.right()) as i32, overlap.height));
        }
        out
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }

    /// Grow by `left`/`top`/`right`/`bottom` pixels on each side.
    pub fn grow(&self, left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        if self.is_infinite() {
            return *self;
        }
        Rect::new(
            self.x.saturating_sub(left),
            self.y.saturating_sub(top),
            self.width.saturating_add(left).saturating_add(right),
            self.height.saturating_add(top).saturating_add(bottom),
        )
    }

    /// Scale a rectangle from level-`0` coordinates down by `2^level`, covering partial pixels.
    pub fn to_level(&self, level: u32) -> Rect {
        if level == 0 || self.is_empty() {
            return *self;
        }
        let f = 1i64 << level;
        let x0 = i64::from(self.x).div_euclid(f);
        let y0 = i64::from(self.y).div_euclid(f);
        let x1 = (self.right() + f - 1).div_euclid(f);
        let y1 = (self.bottom() + f - 1).div_euclid(f);
        Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
    }
}

fn clamp_len(v: i64) -> i32 {
    v.min(i64::from(i32::MAX)) as i32
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

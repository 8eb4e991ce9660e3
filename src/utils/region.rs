//! Integer regions in logical coordinates.
//!
//! A [`Region`] is a set of pixels stored as a list of non-overlapping rectangles. The list is not
//! canonical: two regions covering the same pixels may store different rectangles, so equality is
//! defined on the covered area.

use std::fmt;

use smithay::utils::{Logical, Point, Rectangle, Size};

use super::{expand_rect, is_empty, rect, united};

#[derive(Clone, Default)]
pub struct Region {
    rects: Vec<Rectangle<i32, Logical>>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(r: Rectangle<i32, Logical>) -> Self {
        let mut rv = Self::new();
        rv.add_rect(r);
        rv
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rectangle<i32, Logical>>) -> Self {
        let mut rv = Self::new();
        for r in rects {
            rv.add_rect(r);
        }
        rv
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rectangle<i32, Logical>] {
        &self.rects
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Number of pixels covered.
    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|r| i64::from(r.size.w) * i64::from(r.size.h))
            .sum()
    }

    pub fn bounding_rect(&self) -> Rectangle<i32, Logical> {
        self.rects
            .iter()
            .fold(Rectangle::default(), |acc, r| united(acc, *r))
    }

    pub fn add_rect(&mut self, r: Rectangle<i32, Logical>) {
        if is_empty(r) {
            return;
        }

        let mut pieces = vec![r];
        for existing in &self.rects {
            if pieces.is_empty() {
                return;
            }
            pieces = pieces
                .into_iter()
                .flat_map(|p| subtract_rect(p, *existing))
                .collect();
        }
        self.rects.extend(pieces);
    }

    pub fn subtract_rect(&mut self, r: Rectangle<i32, Logical>) {
        if is_empty(r) {
            return;
        }

        self.rects = self
            .rects
            .iter()
            .flat_map(|existing| subtract_rect(*existing, r))
            .collect();
    }

    pub fn union(&mut self, other: &Region) {
        for r in &other.rects {
            self.add_rect(*r);
        }
    }

    pub fn subtract(&mut self, other: &Region) {
        for r in &other.rects {
            if self.is_empty() {
                return;
            }
            self.subtract_rect(*r);
        }
    }

    pub fn united(&self, other: &Region) -> Region {
        let mut rv = self.clone();
        rv.union(other);
        rv
    }

    pub fn subtracted(&self, other: &Region) -> Region {
        let mut rv = self.clone();
        rv.subtract(other);
        rv
    }

    pub fn intersected(&self, other: &Region) -> Region {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                if let Some(i) = intersect_rect(*a, *b) {
                    rects.push(i);
                }
            }
        }
        // Pieces of two non-overlapping sets never overlap each other.
        Region { rects }
    }

    pub fn intersected_rect(&self, r: Rectangle<i32, Logical>) -> Region {
        let rects = self
            .rects
            .iter()
            .filter_map(|a| intersect_rect(*a, r))
            .collect();
        Region { rects }
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.rects
            .iter()
            .any(|a| other.rects.iter().any(|b| intersect_rect(*a, *b).is_some()))
    }

    pub fn intersects_rect(&self, r: Rectangle<i32, Logical>) -> bool {
        self.rects.iter().any(|a| intersect_rect(*a, r).is_some())
    }

    pub fn contains_point(&self, point: Point<i32, Logical>) -> bool {
        self.rects.iter().any(|r| {
            r.loc.x <= point.x
                && point.x < r.loc.x + r.size.w
                && r.loc.y <= point.y
                && point.y < r.loc.y + r.size.h
        })
    }

    /// Whether every pixel of `other` is also in `self`.
    pub fn contains(&self, other: &Region) -> bool {
        other.subtracted(self).is_empty()
    }

    pub fn translate(&mut self, offset: Point<i32, Logical>) {
        for r in &mut self.rects {
            r.loc += offset;
        }
    }

    pub fn translated(&self, offset: Point<i32, Logical>) -> Region {
        let mut rv = self.clone();
        rv.translate(offset);
        rv
    }

    /// Grows every rectangle by `amount` on each side.
    pub fn expanded(&self, amount: i32) -> Region {
        Region::from_rects(self.rects.iter().map(|r| expand_rect(*r, amount)))
    }

    /// Shrinks every stored rectangle by `amount` on each side, dropping the ones that vanish.
    ///
    /// This works per rectangle, so edges shared between two stored rectangles also shrink.
    pub fn shrunk_rects(&self, amount: i32) -> Region {
        Region::from_rects(self.rects.iter().map(|r| expand_rect(*r, -amount)))
    }

    /// Scales the region around the origin, rounding outwards.
    pub fn scaled(&self, x_scale: f64, y_scale: f64) -> Region {
        Region::from_rects(self.rects.iter().map(|r| {
            let x1 = (f64::from(r.loc.x) * x_scale).floor() as i32;
            let y1 = (f64::from(r.loc.y) * y_scale).floor() as i32;
            let x2 = (f64::from(r.loc.x + r.size.w) * x_scale).ceil() as i32;
            let y2 = (f64::from(r.loc.y + r.size.h) * y_scale).ceil() as i32;
            rect(x1, y1, x2 - x1, y2 - y1)
        }))
    }
}

impl From<Rectangle<i32, Logical>> for Region {
    fn from(r: Rectangle<i32, Logical>) -> Self {
        Self::from_rect(r)
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area() && self.contains(other)
    }
}

impl Eq for Region {}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for r in &self.rects {
            list.entry(&format_args!(
                "{}×{} at ({}, {})",
                r.size.w, r.size.h, r.loc.x, r.loc.y
            ));
        }
        list.finish()
    }
}

pub fn intersect_rect(
    a: Rectangle<i32, Logical>,
    b: Rectangle<i32, Logical>,
) -> Option<Rectangle<i32, Logical>> {
    let x1 = a.loc.x.max(b.loc.x);
    let y1 = a.loc.y.max(b.loc.y);
    let x2 = (a.loc.x + a.size.w).min(b.loc.x + b.size.w);
    let y2 = (a.loc.y + a.size.h).min(b.loc.y + b.size.h);
    if x1 < x2 && y1 < y2 {
        Some(rect(x1, y1, x2 - x1, y2 - y1))
    } else {
        None
    }
}

/// Pieces of `a` not covered by `b`, at most four.
fn subtract_rect(
    a: Rectangle<i32, Logical>,
    b: Rectangle<i32, Logical>,
) -> impl Iterator<Item = Rectangle<i32, Logical>> {
    let mut out = arrayvec::ArrayVec::<_, 4>::new();

    let Some(i) = intersect_rect(a, b) else {
        out.push(a);
        return out.into_iter();
    };

    let (ax2, ay2) = (a.loc.x + a.size.w, a.loc.y + a.size.h);
    let (ix2, iy2) = (i.loc.x + i.size.w, i.loc.y + i.size.h);

    // Full-width bands above and below the intersection.
    if i.loc.y > a.loc.y {
        out.push(rect(a.loc.x, a.loc.y, a.size.w, i.loc.y - a.loc.y));
    }
    if iy2 < ay2 {
        out.push(rect(a.loc.x, iy2, a.size.w, ay2 - iy2));
    }

    // Left and right pieces within the intersection band.
    if i.loc.x > a.loc.x {
        out.push(rect(a.loc.x, i.loc.y, i.loc.x - a.loc.x, i.size.h));
    }
    if ix2 < ax2 {
        out.push(rect(ix2, i.loc.y, ax2 - ix2, i.size.h));
    }

    out.into_iter()
}

pub fn size_rect(size: Size<i32, Logical>) -> Rectangle<i32, Logical> {
    Rectangle::new(Point::from((0, 0)), size)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn subtract_punches_hole() {
        let mut r = Region::from_rect(rect(0, 0, 100, 100));
        r.subtract_rect(rect(25, 25, 50, 50));
        assert_eq!(r.area(), 100 * 100 - 50 * 50);
        assert!(!r.contains_point(Point::from((50, 50))));
        assert!(r.contains_point(Point::from((10, 50))));
        assert_eq!(r.bounding_rect(), rect(0, 0, 100, 100));
    }

    #[test]
    fn union_does_not_double_count() {
        let mut r = Region::from_rect(rect(0, 0, 10, 10));
        r.add_rect(rect(5, 5, 10, 10));
        assert_eq!(r.area(), 100 + 100 - 25);
        r.add_rect(rect(2, 2, 3, 3));
        assert_eq!(r.area(), 175);
    }

    #[test]
    fn empty_rects_are_ignored() {
        let mut r = Region::new();
        r.add_rect(rect(10, 10, 0, 5));
        r.add_rect(rect(10, 10, 5, -1));
        assert!(r.is_empty());
    }

    #[test]
    fn equality_is_by_area() {
        let a = Region::from_rects([rect(0, 0, 10, 5), rect(0, 5, 10, 5)]);
        let b = Region::from_rect(rect(0, 0, 10, 10));
        assert_eq!(a, b);
        assert_ne!(a, Region::from_rect(rect(0, 0, 10, 9)));
    }

    #[test]
    fn expand_and_shrink() {
        let r = Region::from_rect(rect(10, 10, 20, 20));
        assert_eq!(r.expanded(5).bounding_rect(), rect(5, 5, 30, 30));
        assert_eq!(r.shrunk_rects(5).bounding_rect(), rect(15, 15, 10, 10));
        assert!(r.shrunk_rects(10).is_empty());
    }

    #[test]
    fn scaled_rounds_outwards() {
        let r = Region::from_rect(rect(1, 1, 3, 3));
        assert_eq!(r.scaled(0.5, 0.5).bounding_rect(), rect(0, 0, 2, 2));
    }

    fn arbitrary_rect() -> impl Strategy<Value = Rectangle<i32, Logical>> {
        (-50..50, -50..50, 0..60, 0..60).prop_map(|(x, y, w, h)| rect(x, y, w, h))
    }

    fn arbitrary_region() -> impl Strategy<Value = Region> {
        prop::collection::vec(arbitrary_rect(), 0..6).prop_map(Region::from_rects)
    }

    fn pixels(r: &Region) -> std::collections::HashSet<(i32, i32)> {
        let mut rv = std::collections::HashSet::new();
        for r in r.rects() {
            for x in r.loc.x..r.loc.x + r.size.w {
                for y in r.loc.y..r.loc.y + r.size.h {
                    assert!(rv.insert((x, y)), "rectangles overlap at ({x}, {y})");
                }
            }
        }
        rv
    }

    proptest! {
        #[test]
        fn region_algebra_matches_pixel_sets(a in arbitrary_region(), b in arbitrary_region()) {
            let pa = pixels(&a);
            let pb = pixels(&b);

            let union = pixels(&a.united(&b));
            prop_assert_eq!(union, pa.union(&pb).copied().collect());

            let diff = pixels(&a.subtracted(&b));
            prop_assert_eq!(diff, pa.difference(&pb).copied().collect());

            let inter = pixels(&a.intersected(&b));
            prop_assert_eq!(&inter, &pa.intersection(&pb).copied().collect());

            prop_assert_eq!(a.intersects(&b), !inter.is_empty());
            prop_assert!(a.united(&b).contains(&a));
        }
    }
}

use std::time::Duration;

use smithay::reexports::rustix::time::{clock_gettime, ClockId};
use smithay::utils::{Logical, Point, Rectangle, Size};

pub mod debounce;
pub mod id;
pub mod region;
pub mod watchdog;
pub mod watcher;

pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

pub fn get_monotonic_time() -> Duration {
    let ts = clock_gettime(ClockId::Monotonic);
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

pub fn center(rect: Rectangle<i32, Logical>) -> Point<i32, Logical> {
    rect.loc + rect.size.downscale(2).to_point()
}

pub fn center_f64(rect: Rectangle<f64, Logical>) -> Point<f64, Logical> {
    rect.loc + rect.size.downscale(2.0).to_point()
}

/// Shorthand for an integer logical rectangle.
pub fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
    Rectangle::new(Point::from((x, y)), Size::from((w, h)))
}

/// Grows the rectangle by `amount` on every side.
pub fn expand_rect(r: Rectangle<i32, Logical>, amount: i32) -> Rectangle<i32, Logical> {
    Rectangle::new(
        r.loc - Point::from((amount, amount)),
        Size::from((r.size.w + amount * 2, r.size.h + amount * 2)),
    )
}

/// Rounds a logical rectangle outwards to integer coordinates.
pub fn round_out(r: Rectangle<f64, Logical>) -> Rectangle<i32, Logical> {
    let x1 = r.loc.x.floor() as i32;
    let y1 = r.loc.y.floor() as i32;
    let x2 = (r.loc.x + r.size.w).ceil() as i32;
    let y2 = (r.loc.y + r.size.h).ceil() as i32;
    rect(x1, y1, x2 - x1, y2 - y1)
}

pub fn to_f64(r: Rectangle<i32, Logical>) -> Rectangle<f64, Logical> {
    Rectangle::new(
        Point::from((f64::from(r.loc.x), f64::from(r.loc.y))),
        Size::from((f64::from(r.size.w), f64::from(r.size.h))),
    )
}

pub fn is_empty(r: Rectangle<i32, Logical>) -> bool {
    r.size.w <= 0 || r.size.h <= 0
}

/// Bounding rectangle of two rectangles, ignoring empty ones.
pub fn united(a: Rectangle<i32, Logical>, b: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
    if is_empty(a) {
        return b;
    }
    if is_empty(b) {
        return a;
    }

    let x1 = a.loc.x.min(b.loc.x);
    let y1 = a.loc.y.min(b.loc.y);
    let x2 = (a.loc.x + a.size.w).max(b.loc.x + b.size.w);
    let y2 = (a.loc.y + a.size.h).max(b.loc.y + b.size.h);
    rect(x1, y1, x2 - x1, y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_out_covers_fractional_rect() {
        let r = Rectangle::new(Point::from((0.5, -0.25)), Size::from((10.0, 3.5)));
        assert_eq!(round_out(r), rect(0, -1, 11, 5));
    }

    #[test]
    fn united_skips_empty() {
        let a = rect(0, 0, 10, 10);
        assert_eq!(united(a, rect(50, 50, 0, 0)), a);
        assert_eq!(united(a, rect(20, 5, 10, 10)), rect(0, 0, 30, 15));
    }
}

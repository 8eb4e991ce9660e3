//! Data passed through the effect chain while painting a frame.

use std::time::Duration;

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::output::OutputId;
use crate::utils::region::Region;

bitflags! {
    /// What kind of painting a window or the screen needs this frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PaintMask: u32 {
        /// Window is painted fully opaque, its opaque region may clip windows below.
        const WINDOW_OPAQUE = 1;
        /// Window has translucent parts, nothing below it may be clipped.
        const WINDOW_TRANSLUCENT = 1 << 1;
        /// Window is deformed, scaled, moved or rotated when painted.
        const WINDOW_TRANSFORMED = 1 << 2;
        /// Only the damaged region of the screen needs painting.
        const SCREEN_REGION = 1 << 3;
        /// The whole screen is transformed, e.g. zoomed.
        const SCREEN_TRANSFORMED = 1 << 4;
        /// Some windows are transformed, so the whole screen must be painted.
        const SCREEN_WITH_TRANSFORMED_WINDOWS = 1 << 5;
        /// Screen background is cleared before painting windows.
        const SCREEN_BACKGROUND_FIRST = 1 << 6;
    }
}

/// Timing of the frame being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTime {
    /// Target presentation time on the animation clock.
    pub present: Duration,
    /// Whole milliseconds since the previous frame on this output, zero for the first one.
    pub delta: Duration,
}

impl FrameTime {
    pub fn new(present: Duration, previous: Option<Duration>) -> Self {
        let delta = previous
            .map(|prev| Duration::from_millis(present.saturating_sub(prev).as_millis() as u64))
            .unwrap_or(Duration::ZERO);
        Self { present, delta }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenPrePaintData {
    pub mask: PaintMask,
    /// Region that will be painted, in global logical coordinates.
    pub paint: Region,
    pub output: OutputId,
    pub screen: Rectangle<i32, Logical>,
}

#[derive(Debug, Clone)]
pub struct WindowPrePaintData {
    pub mask: PaintMask,
    /// Region of this window that will be painted.
    pub paint: Region,
    /// Region of this window that hides everything below it.
    pub opaque: Region,
}

impl WindowPrePaintData {
    /// Marks the window translucent, which drops its opaque clip.
    pub fn set_translucent(&mut self) {
        self.mask.insert(PaintMask::WINDOW_TRANSLUCENT);
        self.mask.remove(PaintMask::WINDOW_OPAQUE);
        self.opaque.clear();
    }

    pub fn set_transformed(&mut self) {
        self.mask.insert(PaintMask::WINDOW_TRANSFORMED);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAxis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationData {
    pub axis: RotationAxis,
    /// Angle in degrees.
    pub angle: f64,
    /// Pivot relative to the window origin.
    pub origin: Point<f64, Logical>,
}

/// Transformations applied to a window while it is painted.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPaintData {
    pub x_scale: f64,
    pub y_scale: f64,
    pub x_translation: f64,
    pub y_translation: f64,
    pub opacity: f64,
    pub brightness: f64,
    pub saturation: f64,
    pub rotation: Option<RotationData>,
    /// Geometry to draw, relative to the window origin.
    pub quads: Vec<WindowQuad>,
}

impl WindowPaintData {
    pub fn new(opacity: f64, quads: Vec<WindowQuad>) -> Self {
        Self {
            x_scale: 1.,
            y_scale: 1.,
            x_translation: 0.,
            y_translation: 0.,
            opacity,
            brightness: 1.,
            saturation: 1.,
            rotation: None,
            quads,
        }
    }

    pub fn is_scaled(&self) -> bool {
        self.x_scale != 1. || self.y_scale != 1.
    }

    pub fn is_translated(&self) -> bool {
        self.x_translation != 0. || self.y_translation != 0.
    }

    pub fn multiply_opacity(&mut self, factor: f64) {
        self.opacity *= factor;
    }

    pub fn multiply_brightness(&mut self, factor: f64) {
        self.brightness *= factor;
    }

    pub fn multiply_saturation(&mut self, factor: f64) {
        self.saturation *= factor;
    }

    pub fn scale(&mut self, x: f64, y: f64) {
        self.x_scale *= x;
        self.y_scale *= y;
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        self.x_translation += x;
        self.y_translation += y;
    }

    /// Maps a point relative to the window origin to where it ends up on screen.
    pub fn map_point(
        &self,
        window_pos: Point<f64, Logical>,
        p: Point<f64, Logical>,
    ) -> Point<f64, Logical> {
        Point::from((
            window_pos.x + p.x * self.x_scale + self.x_translation,
            window_pos.y + p.y * self.y_scale + self.y_translation,
        ))
    }

    /// Bounding box of the quads after scale and translation, in global coordinates.
    pub fn bounding_box(&self, window_pos: Point<f64, Logical>) -> Rectangle<f64, Logical> {
        let Some(bounds) = quads_bounds(&self.quads) else {
            return Rectangle::new(window_pos, Size::from((0., 0.)));
        };
        let a = self.map_point(window_pos, bounds.loc);
        let b = self.map_point(
            window_pos,
            Point::from((bounds.loc.x + bounds.size.w, bounds.loc.y + bounds.size.h)),
        );
        let (x1, x2) = (a.x.min(b.x), a.x.max(b.x));
        let (y1, y2) = (a.y.min(b.y), a.y.max(b.y));
        Rectangle::new(Point::from((x1, y1)), Size::from((x2 - x1, y2 - y1)))
    }
}

/// One vertex of a window quad: position and texture coordinates, both in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowVertex {
    pub x: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
}

/// Quad of window geometry, vertices in the order top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowQuad {
    pub vertices: [WindowVertex; 4],
}

impl WindowVertex {
    pub fn new(x: f64, y: f64, u: f64, v: f64) -> Self {
        Self { x, y, u, v }
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

impl WindowQuad {
    /// Untransformed quad covering `rect` of the window.
    pub fn from_rect(rect: Rectangle<f64, Logical>) -> Self {
        let (x1, y1) = (rect.loc.x, rect.loc.y);
        let (x2, y2) = (x1 + rect.size.w, y1 + rect.size.h);
        Self {
            vertices: [
                WindowVertex::new(x1, y1, x1, y1),
                WindowVertex::new(x2, y1, x2, y1),
                WindowVertex::new(x2, y2, x2, y2),
                WindowVertex::new(x1, y2, x1, y2),
            ],
        }
    }

    pub fn left(&self) -> f64 {
        self.vertices.iter().map(|v| v.x).fold(f64::INFINITY, f64::min)
    }

    pub fn right(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.x)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn top(&self) -> f64 {
        self.vertices.iter().map(|v| v.y).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.y)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Sub-quad of an untransformed quad, texture coordinates interpolated linearly.
    pub fn sub_quad(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let [tl, _, br, _] = self.vertices;
        let w = br.x - tl.x;
        let h = br.y - tl.y;
        let u_at = |x: f64| {
            if w == 0. {
                tl.u
            } else {
                tl.u + (x - tl.x) / w * (br.u - tl.u)
            }
        };
        let v_at = |y: f64| {
            if h == 0. {
                tl.v
            } else {
                tl.v + (y - tl.y) / h * (br.v - tl.v)
            }
        };

        Self {
            vertices: [
                WindowVertex::new(x1, y1, u_at(x1), v_at(y1)),
                WindowVertex::new(x2, y1, u_at(x2), v_at(y1)),
                WindowVertex::new(x2, y2, u_at(x2), v_at(y2)),
                WindowVertex::new(x1, y2, u_at(x1), v_at(y2)),
            ],
        }
    }
}

/// Bounding box of quads in window-relative coordinates.
pub fn quads_bounds(quads: &[WindowQuad]) -> Option<Rectangle<f64, Logical>> {
    let first = quads.first()?;
    let mut left = first.left();
    let mut right = first.right();
    let mut top = first.top();
    let mut bottom = first.bottom();
    for q in &quads[1..] {
        left = left.min(q.left());
        right = right.max(q.right());
        top = top.min(q.top());
        bottom = bottom.max(q.bottom());
    }
    Some(Rectangle::new(
        Point::from((left, top)),
        Size::from((right - left, bottom - top)),
    ))
}

/// Splits the quads along a regular grid spanning their bounding box.
///
/// Quads smaller than a cell are split where grid lines cross them; degenerate quads are kept.
pub fn make_regular_grid(
    quads: &[WindowQuad],
    x_subdivisions: u32,
    y_subdivisions: u32,
) -> Vec<WindowQuad> {
    let Some(bounds) = quads_bounds(quads) else {
        return Vec::new();
    };

    let x_step = bounds.size.w / f64::from(x_subdivisions.max(1));
    let y_step = bounds.size.h / f64::from(y_subdivisions.max(1));
    if x_step <= 0. || y_step <= 0. {
        return quads.to_vec();
    }

    let mut rv = Vec::new();
    for quad in quads {
        let (ql, qr, qt, qb) = (quad.left(), quad.right(), quad.top(), quad.bottom());
        if ql == qr || qt == qb {
            rv.push(*quad);
            continue;
        }

        let x_begin = bounds.loc.x + ((ql - bounds.loc.x) / x_step).floor() * x_step;
        let y_begin = bounds.loc.y + ((qt - bounds.loc.y) / y_step).floor() * y_step;

        let mut y = y_begin;
        while y < qb {
            let y0 = y.max(qt);
            let y1 = (y + y_step).min(qb);
            let mut x = x_begin;
            while x < qr {
                let x0 = x.max(ql);
                let x1 = (x + x_step).min(qr);
                if x1 > x0 && y1 > y0 {
                    rv.push(quad.sub_quad(x0, y0, x1, y1));
                }
                x += x_step;
            }
            y += y_step;
        }
    }
    rv
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn rectf(x: f64, y: f64, w: f64, h: f64) -> Rectangle<f64, Logical> {
        Rectangle::new(Point::from((x, y)), Size::from((w, h)))
    }

    #[test]
    fn regular_grid_covers_window() {
        let quads = vec![WindowQuad::from_rect(rectf(0., 0., 400., 300.))];
        let grid = make_regular_grid(&quads, 20, 20);
        assert_eq!(grid.len(), 400);

        let area: f64 = grid
            .iter()
            .map(|q| (q.right() - q.left()) * (q.bottom() - q.top()))
            .sum();
        assert_abs_diff_eq!(area, 400. * 300., epsilon = 1e-6);

        let last = grid[grid.len() - 1];
        assert_abs_diff_eq!(last.right(), 400.);
        assert_abs_diff_eq!(last.vertices[2].u, 400.);
    }

    #[test]
    fn split_quads_follow_common_grid() {
        let quads = vec![
            WindowQuad::from_rect(rectf(0., 0., 100., 10.)),
            WindowQuad::from_rect(rectf(0., 10., 100., 90.)),
        ];
        let grid = make_regular_grid(&quads, 2, 2);
        // Title strip splits in two, the body splits into 2×2.
        assert_eq!(grid.len(), 6);
    }

    #[test]
    fn frame_time_delta_is_whole_ms() {
        let t = FrameTime::new(Duration::from_micros(33_700), Some(Duration::from_micros(16_900)));
        assert_eq!(t.delta, Duration::from_millis(16));
        assert_eq!(FrameTime::new(Duration::from_secs(1), None).delta, Duration::ZERO);
    }

    #[test]
    fn paint_data_bounding_box() {
        let mut data = WindowPaintData::new(1., vec![WindowQuad::from_rect(rectf(0., 0., 100., 50.))]);
        data.scale(0.5, 2.);
        data.translate(10., -5.);
        let bbox = data.bounding_box(Point::from((100., 100.)));
        assert_eq!(bbox, rectf(110., 95., 50., 100.));
    }
}

//! Windows that wobble like jelly while they are moved, resized or maximized, and optionally
//! when they open or close.
//!
//! Every wobbling window carries a 4×4 grid of control points connected by springs. The grid is
//! integrated in fixed steps towards the frame time, and the window quads are deformed through
//! the bicubic Bézier surface the grid spans.

use std::collections::HashMap;
use std::time::Duration;

use bitflags::bitflags;
use glam::DVec2;
use glaze_config::WobblySettings;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::effect::{Chain, Effect, EffectsHandler, MoveResize, PaintContext, ReconfigureFlags};
use crate::paint::{
    make_regular_grid, FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData,
    WindowPrePaintData,
};
use crate::utils::region::Region;
use crate::utils::{expand_rect, round_out, to_f64};
use crate::window::{EffectWindow, WindowId};

pub const NAME: &str = "wobbly";

const GRID: usize = 4;
const POINTS: usize = GRID * GRID;
const INTEGRATION_STEP: Duration = Duration::from_millis(10);

/// Throb strength after maximizing, outwards.
const MAXIMIZE_THROB: f64 = 10.;
/// Throb strength after restoring, inwards.
const RESTORE_THROB: f64 = -30.;

/// Stiffness, drag and move factor of the preset wobbliness levels.
const PRESETS: [[f64; 3]; 5] = [
    [0.15, 0.80, 0.10],
    [0.10, 0.85, 0.10],
    [0.06, 0.90, 0.10],
    [0.03, 0.92, 0.20],
    [0.01, 0.97, 0.25],
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WobblyParams {
    pub stiffness: f64,
    pub drag: f64,
    pub move_factor: f64,
    pub x_tesselation: u32,
    pub y_tesselation: u32,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub stop_velocity: f64,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
    pub stop_acceleration: f64,
    pub move_wobble: bool,
    pub resize_wobble: bool,
    pub open_wobble: bool,
    pub close_wobble: bool,
}

impl Default for WobblyParams {
    fn default() -> Self {
        Self::from_config(&glaze_config::Wobbly::default())
    }
}

impl WobblyParams {
    pub fn from_config(config: &glaze_config::Wobbly) -> Self {
        let custom = |auto: f64, value: f64| match config.settings {
            WobblySettings::Auto => auto,
            WobblySettings::Custom => value,
        };

        let mut level = usize::from(config.wobblyness_level);
        if level >= PRESETS.len() {
            debug!("wobbliness level {level} is out of range, using {}", PRESETS.len() - 1);
            level = PRESETS.len() - 1;
        }
        let [mut stiffness, mut drag, mut move_factor] = PRESETS[level];
        if config.settings == WobblySettings::Custom || config.advanced_mode {
            stiffness = config.stiffness / 100.;
            drag = config.drag / 100.;
            move_factor = config.move_factor / 100.;
        }

        Self {
            stiffness,
            drag,
            move_factor,
            x_tesselation: custom(20., f64::from(config.x_tesselation)).max(1.) as u32,
            y_tesselation: custom(20., f64::from(config.y_tesselation)).max(1.) as u32,
            min_velocity: custom(0., config.min_velocity),
            max_velocity: custom(1000., config.max_velocity),
            stop_velocity: custom(0.5, config.stop_velocity),
            min_acceleration: custom(0., config.min_acceleration),
            max_acceleration: custom(1000., config.max_acceleration),
            stop_acceleration: custom(0.5, config.stop_acceleration),
            move_wobble: config.move_wobble,
            resize_wobble: config.resize_wobble,
            open_wobble: config.open_wobble,
            close_wobble: config.close_wobble,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// The user is dragging the window around.
    Moving,
    /// Released, the grid settles on its own.
    Free,
    /// Unfolding from the middle of a freshly mapped window.
    Opening,
    /// Collapsing towards the middle of a closed window, which is kept alive meanwhile.
    Closing,
}

bitflags! {
    /// Window edges allowed to leave their place.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct WobbleEdges: u8 {
        const TOP = 1;
        const LEFT = 1 << 1;
        const RIGHT = 1 << 2;
        const BOTTOM = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct WobblyGrid {
    origin: [DVec2; POINTS],
    position: [DVec2; POINTS],
    velocity: [DVec2; POINTS],
    acceleration: [DVec2; POINTS],
    constraint: [bool; POINTS],
    status: Status,
    can_wobble: WobbleEdges,
    resize_original: Rectangle<f64, Logical>,
    /// Rectangle a closing grid collapses into.
    close_rect: Option<Rectangle<f64, Logical>>,
    /// Time the grid is integrated up to.
    clock: Duration,
    /// The last step stayed below the stop thresholds.
    settled: bool,
}

/// Grid points evenly spread over the rectangle, the last row and column exactly on its edges.
fn lattice(rect: Rectangle<f64, Logical>) -> [DVec2; POINTS] {
    let step = DVec2::new(rect.size.w, rect.size.h) / (GRID - 1) as f64;
    let mut points = [DVec2::ZERO; POINTS];
    for j in 0..GRID {
        for i in 0..GRID {
            let x = if i == GRID - 1 {
                rect.loc.x + rect.size.w
            } else {
                rect.loc.x + step.x * i as f64
            };
            let y = if j == GRID - 1 {
                rect.loc.y + rect.size.h
            } else {
                rect.loc.y + step.y * j as f64
            };
            points[j * GRID + i] = DVec2::new(x, y);
        }
    }
    points
}

fn neighbours(idx: usize) -> impl Iterator<Item = usize> {
    let (i, j) = ((idx % GRID) as isize, (idx / GRID) as isize);
    (-1..=1isize)
        .flat_map(move |dj| (-1..=1isize).map(move |di| (i + di, j + dj)))
        .filter(move |&(x, y)| (x, y) != (i, j))
        .filter(|&(x, y)| (0..GRID as isize).contains(&x) && (0..GRID as isize).contains(&y))
        .map(|(x, y)| y as usize * GRID + x as usize)
}

/// Smooths the field by mixing every point half and half with the mean of its ring.
fn ring_mean(data: &mut [DVec2; POINTS]) {
    let src = *data;
    for (idx, value) in data.iter_mut().enumerate() {
        let mut sum = DVec2::ZERO;
        let mut count = 0.;
        for n in neighbours(idx) {
            sum += src[n];
            count += 1.;
        }
        *value = (sum + src[idx] * count) / (2. * count);
    }
}

fn fix_bounds(v: DVec2, min: f64, max: f64) -> DVec2 {
    let fix = |c: f64| {
        if c.abs() < min {
            0.
        } else if c.abs() > max {
            max.copysign(c)
        } else {
            c
        }
    };
    DVec2::new(fix(v.x), fix(v.y))
}

fn bernstein(t: f64) -> [f64; 4] {
    let s = 1. - t;
    [s * s * s, 3. * s * s * t, 3. * s * t * t, t * t * t]
}

impl WobblyGrid {
    pub fn new(rect: Rectangle<f64, Logical>, now: Duration) -> Self {
        let origin = lattice(rect);
        Self {
            origin,
            position: origin,
            velocity: [DVec2::ZERO; POINTS],
            acceleration: [DVec2::ZERO; POINTS],
            constraint: [false; POINTS],
            status: Status::Moving,
            can_wobble: WobbleEdges::all(),
            resize_original: rect,
            close_rect: None,
            clock: now,
            settled: false,
        }
    }

    /// Pulls every point three quarters of the way to the middle, to unfold from there.
    fn open(&mut self) {
        let middle = (self.origin[0] + self.origin[POINTS - 1]) / 2.;
        for p in &mut self.position {
            *p = (*p + middle * 3.) / 4.;
        }
        self.constraint = [false; POINTS];
        self.status = Status::Opening;
        self.can_wobble = WobbleEdges::all();
        self.settled = false;
    }

    /// Lets the grid collapse into a quarter of the window around its center.
    fn close(&mut self, rect: Rectangle<f64, Logical>) {
        let center = DVec2::new(rect.loc.x + rect.size.w / 2., rect.loc.y + rect.size.h / 2.);
        let toward = |a: f64, c: f64| ((a + 3. * c) / 4.).trunc();
        let x1 = toward(rect.loc.x, center.x);
        let x2 = toward(rect.loc.x + rect.size.w, center.x);
        let y1 = toward(rect.loc.y, center.y);
        let y2 = toward(rect.loc.y + rect.size.h, center.y);
        self.close_rect = Some(Rectangle::new(
            Point::from((x1, y1)),
            Size::from((x2 - x1, y2 - y1)),
        ));
        self.constraint = [false; POINTS];
        self.status = Status::Closing;
        self.can_wobble = WobbleEdges::all();
        self.settled = false;
    }

    /// Rectangle the grid springs towards.
    fn rest_rect(&self, geometry: Rectangle<f64, Logical>) -> Rectangle<f64, Logical> {
        self.close_rect.unwrap_or(geometry)
    }

    /// The user grabbed the window, pinning the grid point closest to the cursor.
    fn start(&mut self, rect: Rectangle<f64, Logical>, cursor: Point<f64, Logical>, resize: bool) {
        self.status = Status::Moving;
        self.settled = false;

        let step = DVec2::new(rect.size.w, rect.size.h) / (GRID - 1) as f64;
        let pick = |c: f64, origin: f64, step: f64| {
            let idx = ((c - origin) / step + 0.5).floor();
            idx.clamp(0., (GRID - 1) as f64) as usize
        };
        let i = pick(cursor.x, rect.loc.x, step.x);
        let j = pick(cursor.y, rect.loc.y, step.y);
        self.constraint[j * GRID + i] = true;

        if resize {
            // Edges stay put until the resize actually moves them.
            self.can_wobble = WobbleEdges::empty();
            self.resize_original = rect;
        } else {
            self.can_wobble = WobbleEdges::all();
        }
    }

    /// Lets edges that moved away from where the resize started wobble.
    fn update_edges(&mut self, rect: Rectangle<f64, Logical>) {
        let orig = self.resize_original;
        if rect.loc.y != orig.loc.y {
            self.can_wobble |= WobbleEdges::TOP;
        }
        if rect.loc.x != orig.loc.x {
            self.can_wobble |= WobbleEdges::LEFT;
        }
        if rect.loc.x + rect.size.w != orig.loc.x + orig.size.w {
            self.can_wobble |= WobbleEdges::RIGHT;
        }
        if rect.loc.y + rect.size.h != orig.loc.y + orig.size.h {
            self.can_wobble |= WobbleEdges::BOTTOM;
        }
    }

    fn release(&mut self) {
        self.status = Status::Free;
        self.settled = false;
    }

    /// Kicks the grid outwards from its center, or inwards for a negative magnitude.
    fn throb(&mut self, magnitude: f64) {
        self.status = Status::Free;
        self.settled = false;
        for j in 0..GRID {
            for i in 0..GRID {
                let f = |k: usize| k as f64 / (GRID - 1) as f64 - 0.5;
                self.velocity[j * GRID + i] = DVec2::new(f(i), f(j)) * magnitude;
            }
        }
        // Pin the middle so an asymmetric kick does not drift the window off.
        for j in 1..GRID - 1 {
            for i in 1..GRID - 1 {
                self.constraint[j * GRID + i] = true;
            }
        }
    }

    fn spring_acceleration(&self, idx: usize, len: DVec2) -> DVec2 {
        let (i, j) = (idx % GRID, idx / GRID);
        let p = self.position[idx];
        let mut acc = DVec2::ZERO;
        let mut count = 0.;
        if i > 0 {
            acc += self.position[idx - 1] - p + DVec2::new(len.x, 0.);
            count += 1.;
        }
        if i < GRID - 1 {
            acc += self.position[idx + 1] - p - DVec2::new(len.x, 0.);
            count += 1.;
        }
        if j > 0 {
            acc += self.position[idx - GRID] - p + DVec2::new(0., len.y);
            count += 1.;
        }
        if j < GRID - 1 {
            acc += self.position[idx + GRID] - p - DVec2::new(0., len.y);
            count += 1.;
        }
        acc / count
    }

    /// Integrates one step of `t` milliseconds. Returns `false` once a released grid came to
    /// rest and can be dropped.
    fn step(&mut self, rect: Rectangle<f64, Logical>, params: &WobblyParams, t: f64) -> bool {
        let len = DVec2::new(rect.size.w, rect.size.h) / (GRID - 1) as f64;
        self.origin = lattice(rect);

        for idx in 0..POINTS {
            self.acceleration[idx] = if self.constraint[idx] {
                (self.origin[idx] - self.position[idx]) * params.stiffness
            } else {
                self.spring_acceleration(idx, len) * params.stiffness
            };
        }
        ring_mean(&mut self.acceleration);

        let mut acc_sum = 0.;
        for idx in 0..POINTS {
            let acc = fix_bounds(
                self.acceleration[idx],
                params.min_acceleration,
                params.max_acceleration,
            );
            self.velocity[idx] = acc * t + self.velocity[idx] * params.drag;
            acc_sum += acc.x.abs() + acc.y.abs();
        }
        ring_mean(&mut self.velocity);

        let mut vel_sum = 0.;
        for idx in 0..POINTS {
            let vel = fix_bounds(self.velocity[idx], params.min_velocity, params.max_velocity);
            self.velocity[idx] = vel;
            self.position[idx] += vel * t * params.move_factor;
            vel_sum += vel.x.abs() + vel.y.abs();
        }

        // A locked edge keeps its own line and the inner lines next to it in place.
        for j in 0..GRID {
            for i in 0..GRID {
                let idx = j * GRID + i;
                let origin = self.origin[idx];
                if (!self.can_wobble.contains(WobbleEdges::TOP) && j < GRID - 1)
                    || (!self.can_wobble.contains(WobbleEdges::BOTTOM) && j > 0)
                {
                    self.position[idx].y = origin.y;
                }
                if (!self.can_wobble.contains(WobbleEdges::LEFT) && i < GRID - 1)
                    || (!self.can_wobble.contains(WobbleEdges::RIGHT) && i > 0)
                {
                    self.position[idx].x = origin.x;
                }
            }
        }

        self.settled = acc_sum < params.stop_acceleration && vel_sum < params.stop_velocity;
        // A grid still held by the user is kept even when it came to rest.
        !(self.status != Status::Moving && self.settled)
    }

    /// Integrates up to `present` in steps of at most 10 ms.
    ///
    /// Returns `false` once the grid came to rest and can be dropped.
    pub fn advance(
        &mut self,
        rect: Rectangle<f64, Logical>,
        params: &WobblyParams,
        present: Duration,
    ) -> bool {
        let _span = tracy_client::span!("WobblyGrid::advance");

        if self.settled {
            // Nothing moved while idle, skip straight to the last step.
            self.clock = self.clock.max(present.saturating_sub(INTEGRATION_STEP));
        }

        while self.clock < present {
            let delta = (present - self.clock).min(INTEGRATION_STEP);
            self.clock += delta;
            if !self.step(rect, params, delta.as_secs_f64() * 1000.) {
                return false;
            }
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Point of the Bézier surface at `uv` in `[0, 1]²`.
    pub fn bezier_point(&self, uv: DVec2) -> DVec2 {
        let px = bernstein(uv.x);
        let py = bernstein(uv.y);
        let mut res = DVec2::ZERO;
        for j in 0..GRID {
            for i in 0..GRID {
                res += self.position[j * GRID + i] * (px[i] * py[j]);
            }
        }
        res
    }

    /// Bounds of the control points. The deformed window never leaves them.
    pub fn control_bounds(&self) -> Rectangle<f64, Logical> {
        let min = self.position.iter().fold(DVec2::INFINITY, |acc, p| acc.min(*p));
        let max = self
            .position
            .iter()
            .fold(DVec2::NEG_INFINITY, |acc, p| acc.max(*p));
        Rectangle::new(
            Point::from((min.x, min.y)),
            Size::from((max.x - min.x, max.y - min.y)),
        )
    }

    pub fn velocities(&self) -> &[DVec2; POINTS] {
        &self.velocity
    }

    pub fn accelerations(&self) -> &[DVec2; POINTS] {
        &self.acceleration
    }

    pub fn positions(&self) -> &[DVec2; POINTS] {
        &self.position
    }
}

/// Whether the rectangle spans the whole area along either axis.
fn is_maximized(rect: Rectangle<i32, Logical>, area: Rectangle<i32, Logical>) -> bool {
    let vertical = rect.loc.y == area.loc.y && rect.size.h == area.size.h;
    let horizontal = rect.loc.x == area.loc.x && rect.size.w == area.size.w;
    vertical || horizontal
}

pub struct WobblyEffect {
    params: WobblyParams,
    grids: HashMap<WindowId, WobblyGrid>,
    /// Area painted by deformed windows this frame, repainted on the next one.
    update_region: Region,
}

impl WobblyEffect {
    pub fn new() -> Self {
        Self {
            params: WobblyParams::default(),
            grids: HashMap::new(),
            update_region: Region::new(),
        }
    }

    pub fn grid(&self, window: WindowId) -> Option<&WobblyGrid> {
        self.grids.get(&window)
    }

    fn drop_grid(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        let Some(grid) = self.grids.remove(&window) else {
            return;
        };
        ctx.clear_expanded_geometry(window);
        // A collapsing grid holds the closed window alive.
        if grid.close_rect.is_some() {
            ctx.unref_window(window);
        }
        if self.grids.is_empty() {
            ctx.add_repaint_full();
        }
    }

    fn grid_for(&mut self, ctx: &EffectsHandler, window: &EffectWindow) -> &mut WobblyGrid {
        self.grids
            .entry(window.id)
            .or_insert_with(|| WobblyGrid::new(to_f64(window.geometry), ctx.now()))
    }
}

impl Default for WobblyEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for WobblyEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        70
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, _flags: ReconfigureFlags) {
        self.params = WobblyParams::from_config(&ctx.config.wobbly);
        trace!("wobbly parameters: {:?}", self.params);
    }

    fn is_active(&self, _ctx: &EffectsHandler) -> bool {
        !self.grids.is_empty()
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        if !self.grids.is_empty() {
            self.update_region.clear();
        }
        next.pre_paint_screen(ctx, data, time);
    }

    fn pre_paint_window(
        &mut self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        if let Some(grid) = self.grids.get_mut(&window.id) {
            data.set_transformed();
            // Windows below show through the deformed edges.
            data.opaque.clear();

            let rect = grid.rest_rect(to_f64(window.geometry));
            if grid.advance(rect, &self.params, time.present) {
                let bounds = expand_rect(round_out(grid.control_bounds()), 1);
                ctx.set_expanded_geometry(window.id, bounds);
                data.paint.add_rect(bounds);
            } else {
                trace!("{} stopped wobbling", window.id);
                self.drop_grid(ctx, window.id);
            }
        }

        next.pre_paint_window(ctx, window, data, time);
    }

    fn paint_window(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
        next: Chain,
    ) {
        let grid = self.grids.get(&window.id);
        if let (Some(grid), false) = (grid, mask.contains(PaintMask::SCREEN_TRANSFORMED)) {
            let _span = tracy_client::span!("WobblyEffect::paint_window");

            let geo = to_f64(window.geometry);
            let mut quads =
                make_regular_grid(&data.quads, self.params.x_tesselation, self.params.y_tesselation);

            let (mut left, mut top) = (0f64, 0f64);
            let (mut right, mut bottom) = (geo.size.w, geo.size.h);
            if geo.size.w > 0. && geo.size.h > 0. {
                for quad in &mut quads {
                    for v in &mut quad.vertices {
                        let uv = DVec2::new(v.x / geo.size.w, v.y / geo.size.h);
                        let p = grid.bezier_point(uv);
                        v.move_to(p.x - geo.loc.x, p.y - geo.loc.y);
                    }
                    left = left.min(quad.left());
                    top = top.min(quad.top());
                    right = right.max(quad.right());
                    bottom = bottom.max(quad.bottom());
                }
            }
            data.quads = quads;

            let dirty = Rectangle::<f64, Logical>::new(
                Point::from((
                    left * data.x_scale + geo.loc.x + data.x_translation,
                    top * data.y_scale + geo.loc.y + data.y_translation,
                )),
                Size::from((
                    (right - left + 1.) * data.x_scale,
                    (bottom - top + 1.) * data.y_scale,
                )),
            );
            // One more pixel around for rounding.
            self.update_region.add_rect(expand_rect(round_out(dirty), 1));
        }

        next.paint_window(ctx, paint, window, mask, region, data);
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        // Grids held still by the user don't need frames until the window moves again.
        if self.grids.values().any(|g| !g.is_settled()) {
            ctx.add_repaint(&self.update_region);
        }
        next.post_paint_screen(ctx);
    }

    fn window_move_resize(
        &mut self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        event: MoveResize,
    ) {
        let rect = to_f64(window.geometry);
        match event {
            MoveResize::Start { resize } => {
                if window.is_special() {
                    return;
                }
                let wanted = if resize {
                    self.params.resize_wobble
                } else {
                    self.params.move_wobble
                };
                if !wanted {
                    return;
                }

                let cursor = ctx.cursor_pos();
                self.grid_for(ctx, window).start(rect, cursor, resize);
                ctx.add_layer_repaint(window);
            }
            MoveResize::Step { .. } => {
                if let Some(grid) = self.grids.get_mut(&window.id) {
                    grid.update_edges(rect);
                    grid.settled = false;
                }
            }
            MoveResize::Finish => {
                if let Some(grid) = self.grids.get_mut(&window.id) {
                    grid.release();
                    grid.update_edges(rect);
                    ctx.add_layer_repaint(window);
                }
            }
            MoveResize::Jump { old } => {
                if window.is_special() {
                    return;
                }

                let center = crate::utils::center(window.geometry).to_f64();
                let area = ctx
                    .outputs
                    .output_at(center)
                    .and_then(|id| ctx.outputs.get(id))
                    .map(|o| o.geometry())
                    .unwrap_or_else(|| ctx.active_screen_geometry());
                let maximized = is_maximized(window.geometry, area);
                if !maximized && !is_maximized(old, area) {
                    return;
                }

                if self.params.move_wobble && self.params.resize_wobble {
                    let magnitude = if maximized {
                        MAXIMIZE_THROB
                    } else {
                        RESTORE_THROB
                    };
                    self.grid_for(ctx, window).throb(magnitude);
                }
                if let Some(grid) = self.grids.get_mut(&window.id) {
                    grid.update_edges(rect);
                    ctx.add_layer_repaint(window);
                }
            }
        }
    }

    fn window_added(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if !self.params.open_wobble || window.is_special() {
            return;
        }

        self.grid_for(ctx, window).open();
        ctx.add_layer_repaint(window);
    }

    fn window_closed(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if !self.params.close_wobble || window.is_special() || !window.is_visible() {
            self.drop_grid(ctx, window.id);
            return;
        }

        if self.grids.get(&window.id).is_some_and(|g| g.close_rect.is_some()) {
            return;
        }
        if !ctx.ref_window(window.id) {
            self.drop_grid(ctx, window.id);
            return;
        }

        let rect = to_f64(window.geometry);
        self.grid_for(ctx, window).close(rect);
        ctx.add_layer_repaint(window);
    }

    fn unloading(&mut self, ctx: &mut EffectsHandler) {
        let windows: Vec<_> = self.grids.keys().copied().collect();
        for window in windows {
            self.drop_grid(ctx, window);
        }
    }

    fn window_deleted(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        self.drop_grid(ctx, window);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glaze_config::Wobbly;

    use super::*;
    use crate::paint::WindowQuad;
    use crate::utils::rect;
    use crate::window::{CloseOutcome, StaticSurface};

    const MS: Duration = Duration::from_millis(1);

    fn rectf(x: f64, y: f64, w: f64, h: f64) -> Rectangle<f64, Logical> {
        Rectangle::new(Point::from((x, y)), Size::from((w, h)))
    }

    fn assert_at_rest(grid: &WobblyGrid, rect: Rectangle<f64, Logical>, epsilon: f64) {
        for (p, o) in grid.positions().iter().zip(lattice(rect)) {
            assert_abs_diff_eq!(p.x, o.x, epsilon = epsilon);
            assert_abs_diff_eq!(p.y, o.y, epsilon = epsilon);
        }
    }

    #[test]
    fn presets_and_overrides() {
        let params = WobblyParams::from_config(&Wobbly::default());
        assert_eq!((params.stiffness, params.drag, params.move_factor), (0.15, 0.80, 0.10));
        assert_eq!((params.x_tesselation, params.y_tesselation), (20, 20));

        let params = WobblyParams::from_config(&Wobbly {
            wobblyness_level: 7,
            ..Wobbly::default()
        });
        assert_eq!((params.stiffness, params.drag, params.move_factor), (0.01, 0.97, 0.25));

        let params = WobblyParams::from_config(&Wobbly {
            wobblyness_level: 3,
            advanced_mode: true,
            stiffness: 40.,
            x_tesselation: 5,
            ..Wobbly::default()
        });
        assert_abs_diff_eq!(params.stiffness, 0.4);
        assert_abs_diff_eq!(params.drag, 0.8);
        // Advanced mode only touches the grid knobs.
        assert_eq!(params.x_tesselation, 20);

        let params = WobblyParams::from_config(&Wobbly {
            settings: WobblySettings::Custom,
            x_tesselation: 5,
            stop_velocity: 2.,
            ..Wobbly::default()
        });
        assert_eq!(params.x_tesselation, 5);
        assert_eq!(params.stop_velocity, 2.);
        assert_abs_diff_eq!(params.stiffness, 0.15);
    }

    #[test]
    fn ring_mean_keeps_uniform_field() {
        let mut field = [DVec2::new(3., -1.); POINTS];
        ring_mean(&mut field);
        for v in field {
            assert_abs_diff_eq!(v.x, 3., epsilon = 1e-12);
            assert_abs_diff_eq!(v.y, -1., epsilon = 1e-12);
        }
    }

    #[test]
    fn grid_at_rest_is_identity() {
        let rect = rectf(100., 100., 400., 300.);
        let grid = WobblyGrid::new(rect, Duration::ZERO);
        let p = grid.bezier_point(DVec2::new(0.25, 0.5));
        assert_abs_diff_eq!(p.x, 200., epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 250., epsilon = 1e-9);
        assert_eq!(grid.control_bounds(), rect);
    }

    #[test]
    fn static_grid_stays_put() {
        let rect = rectf(100., 100., 400., 300.);
        let params = WobblyParams::default();
        let mut grid = WobblyGrid::new(rect, Duration::ZERO);

        // Held by the user, so it is never released.
        assert!(grid.advance(rect, &params, Duration::from_secs(10)));
        assert!(grid.is_settled());
        assert_at_rest(&grid, rect, 1e-6);
    }

    #[test]
    fn released_static_grid_is_dropped() {
        let rect = rectf(0., 0., 100., 100.);
        let params = WobblyParams::default();
        let mut grid = WobblyGrid::new(rect, Duration::ZERO);
        grid.release();
        assert!(!grid.advance(rect, &params, 16 * MS));
    }

    #[test]
    fn drag_and_release_settles() {
        let params = WobblyParams::default();
        let start = rectf(100., 100., 400., 300.);
        let mut grid = WobblyGrid::new(start, Duration::ZERO);
        grid.start(start, Point::from((300., 120.)), false);
        assert!(grid.constraint[2]);

        // Drag by 200 px to the right over 100 ms.
        let mut now = Duration::ZERO;
        let mut rect = start;
        for frame in 1..=10 {
            now += 10 * MS;
            rect.loc.x = 100. + 20. * f64::from(frame);
            assert!(grid.advance(rect, &params, now));
        }
        assert!(!grid.is_settled());
        grid.release();

        let mut dropped = None;
        while now < Duration::from_secs(2) {
            now += 16 * MS;
            if !grid.advance(rect, &params, now) {
                dropped = Some(now);
                break;
            }
            for a in grid.accelerations() {
                assert!(a.x.is_finite() && a.y.is_finite());
            }
        }
        assert!(dropped.is_some(), "grid still wobbling after 2 s");

        for v in grid.velocities() {
            assert!(v.x.abs() < 0.5 && v.y.abs() < 0.5);
        }
        for a in grid.accelerations() {
            assert!(a.x.abs() < 5. && a.y.abs() < 5.);
        }
        assert_at_rest(&grid, rect, 1.);

        // The grabbed point is back under the cursor.
        let p = grid.bezier_point(DVec2::new(200. / 400., 20. / 300.));
        assert_abs_diff_eq!(p.x, 500., epsilon = 1.);
        assert_abs_diff_eq!(p.y, 120., epsilon = 1.);
    }

    #[test]
    fn resize_keeps_unmoved_edges() {
        let params = WobblyParams::default();
        let start = rectf(0., 0., 300., 300.);
        let mut grid = WobblyGrid::new(start, Duration::ZERO);
        grid.start(start, Point::from((300., 300.)), true);

        // Dragging the bottom-right corner only frees the right and bottom edges.
        let rect = rectf(0., 0., 360., 330.);
        grid.update_edges(rect);
        assert_eq!(grid.can_wobble, WobbleEdges::RIGHT | WobbleEdges::BOTTOM);

        grid.advance(rect, &params, 50 * MS);
        let origin = lattice(rect);
        for (p, o) in grid.positions()[..GRID].iter().zip(&origin[..GRID]) {
            assert_eq!(p.y, o.y);
        }
        assert_eq!(grid.positions()[0].x, 0.);
    }

    #[test]
    fn maximize_throbs_outwards() {
        let rect = rectf(0., 0., 300., 300.);
        let mut grid = WobblyGrid::new(rect, Duration::ZERO);
        grid.throb(MAXIMIZE_THROB);
        assert_eq!(grid.velocities()[0], DVec2::new(-5., -5.));
        assert_eq!(grid.velocities()[POINTS - 1], DVec2::new(5., 5.));
        assert!(grid.constraint[5] && grid.constraint[10]);
        assert!(!grid.constraint[0]);

        let params = WobblyParams::default();
        grid.advance(rect, &params, 10 * MS);
        assert!(grid.control_bounds().size.w > 300.);
    }

    fn window(ctx: &mut EffectsHandler, r: Rectangle<i32, Logical>) -> EffectWindow {
        let id = ctx.windows.add(Box::new(StaticSurface::opaque(r)));
        ctx.windows.get(id).unwrap().clone()
    }

    #[test]
    fn effect_deforms_dragged_window() {
        let mut ctx = EffectsHandler::new_for_tests();
        let mut effect = WobblyEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);

        let w = window(&mut ctx, rect(100, 100, 400, 300));
        assert!(!effect.is_active(&ctx));
        effect.window_move_resize(&mut ctx, &w, MoveResize::Start { resize: false });
        assert!(effect.is_active(&ctx));

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::new(),
            opaque: w.global_opaque(),
        };
        let time = FrameTime::new(16 * MS, None);
        effect.pre_paint_window(&mut ctx, &w, &mut data, time, Chain::empty());
        assert!(data.mask.contains(PaintMask::WINDOW_TRANSFORMED));
        assert!(data.opaque.is_empty());
        assert!(data.paint.contains(&Region::from_rect(w.geometry)));

        let mut paint_data =
            WindowPaintData::new(1., vec![WindowQuad::from_rect(to_f64(w.rect()))]);
        let mut renderer = crate::render_helpers::recording::RecordingRenderer::new();
        let output = ctx.outputs.ids()[0];
        let mut paint = PaintContext {
            renderer: &mut renderer,
            target: crate::render_helpers::RenderTarget::for_output(
                ctx.outputs.get(output).unwrap(),
            ),
            output,
            screen: rect(0, 0, 1920, 1080),
        };
        effect.paint_window(
            &mut ctx,
            &mut paint,
            &w,
            PaintMask::WINDOW_TRANSFORMED,
            &Region::from_rect(rect(0, 0, 1920, 1080)),
            &mut paint_data,
            Chain::empty(),
        );
        assert_eq!(paint_data.quads.len(), 400);
        assert!(effect.update_region.contains(&Region::from_rect(w.geometry)));

        effect.window_closed(&mut ctx, &w);
        assert!(!effect.is_active(&ctx));
        assert_eq!(ctx.expanded_geometry_of(w.id), Some(w.geometry));
    }

    #[test]
    fn special_windows_do_not_wobble() {
        let mut ctx = EffectsHandler::new_for_tests();
        let mut effect = WobblyEffect::new();
        let id = ctx.windows.add(Box::new(
            StaticSurface::new(rect(0, 0, 100, 100))
                .with_flags(crate::window::WindowFlags::SPECIAL),
        ));
        let w = ctx.windows.get(id).unwrap().clone();
        effect.window_move_resize(&mut ctx, &w, MoveResize::Start { resize: false });
        assert!(effect.grid(id).is_none());
    }

    #[test]
    fn plain_geometry_jumps_do_not_throb() {
        let mut ctx = EffectsHandler::new_for_tests();
        let mut effect = WobblyEffect::new();
        let w = window(&mut ctx, rect(100, 100, 400, 300));
        let old = rect(50, 100, 400, 300);
        effect.window_move_resize(&mut ctx, &w, MoveResize::Jump { old });
        assert!(effect.grid(w.id).is_none());

        let mut maximized = w.clone();
        maximized.geometry = rect(0, 0, 1920, 1080);
        effect.window_move_resize(&mut ctx, &maximized, MoveResize::Jump { old: w.geometry });
        assert!(effect.grid(w.id).is_some());
    }

    /// Runs frames every 16 ms until the effect lets go of `window`, for at most 5 s.
    fn run_until_dropped(
        effect: &mut WobblyEffect,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
    ) -> Option<Duration> {
        let mut now = Duration::ZERO;
        while now < Duration::from_secs(5) {
            now += 16 * MS;
            let mut data = WindowPrePaintData {
                mask: PaintMask::WINDOW_OPAQUE,
                paint: Region::new(),
                opaque: window.global_opaque(),
            };
            let time = FrameTime::new(now, None);
            effect.pre_paint_window(ctx, window, &mut data, time, Chain::empty());
            if effect.grid(window.id).is_none() {
                return Some(now);
            }
        }
        None
    }

    #[test]
    fn mapped_window_unfolds_from_the_middle() {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.wobbly.open_wobble = true;
        let mut effect = WobblyEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);

        let w = window(&mut ctx, rect(100, 100, 400, 400));
        effect.window_added(&mut ctx, &w);
        let grid = effect.grid(w.id).unwrap();
        assert_eq!(grid.status, Status::Opening);
        assert_eq!(grid.control_bounds(), rectf(250., 250., 100., 100.));

        // The grid has to settle on the window before it goes away.
        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::new(),
            opaque: w.global_opaque(),
        };
        let time = FrameTime::new(16 * MS, None);
        effect.pre_paint_window(&mut ctx, &w, &mut data, time, Chain::empty());
        let grid = effect.grid(w.id).unwrap();
        assert!(grid.control_bounds().size.w > 100.);
        assert_abs_diff_eq!(grid.bezier_point(DVec2::splat(0.5)).x, 300., epsilon = 1e-6);

        assert!(run_until_dropped(&mut effect, &mut ctx, &w).is_some());
        assert!(!effect.is_active(&ctx));
        assert!(ctx.take_deleted().is_empty());
        assert!(ctx.windows.contains(w.id));
    }

    #[test]
    fn closed_window_collapses_then_goes_away() {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.wobbly.close_wobble = true;
        let mut effect = WobblyEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);

        let w = window(&mut ctx, rect(100, 100, 400, 400));
        effect.window_closed(&mut ctx, &w);
        let (outcome, snapshot) = ctx.windows.close(w.id).unwrap();
        assert_eq!(outcome, CloseOutcome::KeptAlive);
        let grid = effect.grid(w.id).unwrap();
        assert_eq!(grid.status, Status::Closing);
        assert_eq!(grid.close_rect, Some(rectf(250., 250., 100., 100.)));

        // Closing twice does not take a second reference.
        effect.window_closed(&mut ctx, &snapshot);
        assert_eq!(ctx.windows.entry(w.id).unwrap().refs(), 1);

        assert!(run_until_dropped(&mut effect, &mut ctx, &snapshot).is_some());
        assert!(!ctx.windows.contains(w.id));
        let deleted = ctx.take_deleted();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, w.id);
        assert!(!effect.is_active(&ctx));
    }

    #[test]
    fn unloading_releases_closing_windows() {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.wobbly.close_wobble = true;
        let mut effect = WobblyEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);

        let w = window(&mut ctx, rect(0, 0, 200, 200));
        effect.window_closed(&mut ctx, &w);
        ctx.windows.close(w.id);
        effect.unloading(&mut ctx);
        assert!(!effect.is_active(&ctx));
        assert!(!ctx.windows.contains(w.id));
        assert_eq!(ctx.take_deleted().len(), 1);
    }

    #[test]
    fn open_and_close_wobble_are_off_by_default() {
        let mut ctx = EffectsHandler::new_for_tests();
        let mut effect = WobblyEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);

        let w = window(&mut ctx, rect(0, 0, 200, 200));
        effect.window_added(&mut ctx, &w);
        assert!(!effect.is_active(&ctx));

        effect.window_closed(&mut ctx, &w);
        let (outcome, _) = ctx.windows.close(w.id).unwrap();
        assert_eq!(outcome, CloseOutcome::Deleted);
        assert!(!effect.is_active(&ctx));
    }
}

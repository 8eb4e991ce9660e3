//! Per-window attribute animations shared by effects.
//!
//! An effect owns an [`AnimationEngine`] and forwards its paint callbacks to it. The engine
//! advances every record on the animation clock, folds the interpolated values into
//! [`WindowPaintData`], keeps closed windows alive for records that ask for it, and schedules
//! repaints covering everywhere an animated window can end up.

use std::collections::BTreeMap;
use std::time::Duration;

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};

use super::EffectsHandler;
use crate::animation::{Curve, Timeline};
use crate::paint::{RotationAxis, RotationData, WindowPaintData, WindowPrePaintData};
use crate::utils::region::Region;
use crate::utils::united;
use crate::window::{EffectWindow, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Opacity,
    Brightness,
    Saturation,
    Scale,
    Rotation,
    Position,
    Size,
    Translation,
    Clip,
    /// Interpreted by the owning effect.
    Generic,
}

bitflags! {
    /// Point of a rectangle an animation is pinned to. Empty means the center.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Anchor: u8 {
        const LEFT = 1;
        const TOP = 1 << 1;
        const RIGHT = 1 << 2;
        const BOTTOM = 1 << 3;
        const HORIZONTAL = Self::LEFT.bits() | Self::RIGHT.bits();
        const VERTICAL = Self::TOP.bits() | Self::BOTTOM.bits();
    }
}

/// Two-component animation endpoint. An unset endpoint gets a per-attribute default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fpx2(Option<[f64; 2]>);

impl Fpx2 {
    pub const UNSET: Self = Self(None);

    pub fn new(x: f64, y: f64) -> Self {
        Self(Some([x, y]))
    }

    pub fn splat(v: f64) -> Self {
        Self::new(v, v)
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self, i: usize) -> f64 {
        self.0.map_or(0., |v| v[i])
    }

    fn set(&mut self, x: f64, y: f64) {
        self.0 = Some([x, y]);
    }
}

/// Modifiers of how an animation's endpoints are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Meta {
    pub source_anchor: Anchor,
    pub target_anchor: Anchor,
    /// Source endpoint is a fraction of the screen (of the window for translations).
    pub relative_source: [bool; 2],
    pub relative_target: [bool; 2],
    /// Rotation axis, Z when unset.
    pub axis: Option<RotationAxis>,
    /// Free value passed back for [`Attribute::Generic`] animations.
    pub generic: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Everything needed to start an animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationParams {
    pub attribute: Attribute,
    pub meta: Meta,
    pub duration: Duration,
    pub to: Fpx2,
    pub curve: Curve,
    pub delay: Duration,
    /// When set, the window is shown at this value during the delay.
    pub from: Fpx2,
    /// Keep the record at its target once done, until cancelled.
    pub keep_at_target: bool,
    /// Hold a closed window alive until the animation ends.
    pub keep_alive: bool,
    /// Holds the full-screen effect slot while running.
    pub fullscreen: bool,
}

impl AnimationParams {
    pub fn new(attribute: Attribute, duration: Duration, to: Fpx2) -> Self {
        Self {
            attribute,
            meta: Meta::default(),
            duration,
            to,
            curve: Curve::Linear,
            delay: Duration::ZERO,
            from: Fpx2::UNSET,
            keep_at_target: false,
            keep_alive: true,
            fullscreen: false,
        }
    }

    pub fn from(self, from: Fpx2) -> Self {
        Self { from, ..self }
    }

    pub fn curve(self, curve: Curve) -> Self {
        Self { curve, ..self }
    }

    pub fn delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    pub fn meta(self, meta: Meta) -> Self {
        Self { meta, ..self }
    }

    pub fn keep_at_target(self, keep_at_target: bool) -> Self {
        Self {
            keep_at_target,
            ..self
        }
    }

    pub fn keep_alive(self, keep_alive: bool) -> Self {
        Self { keep_alive, ..self }
    }

    pub fn fullscreen(self, fullscreen: bool) -> Self {
        Self { fullscreen, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u64);

/// A record that ran to its end and was removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndedAnimation {
    pub id: AnimationId,
    pub window: WindowId,
    pub attribute: Attribute,
    pub meta: Meta,
}

#[derive(Debug, Clone)]
struct Record {
    id: AnimationId,
    attribute: Attribute,
    meta: Meta,
    from: Fpx2,
    to: Fpx2,
    timeline: Timeline,
    start_time: Duration,
    /// Clock time the timeline was last advanced to.
    advanced_to: Option<Duration>,
    wait_at_source: bool,
    keep_alive: bool,
    terminate_at_source: bool,
    terminate_at_target: bool,
    frozen: bool,
    fullscreen: bool,
}

impl Record {
    fn has_started(&self, now: Duration) -> bool {
        self.start_time <= now
    }

    /// Whether the record takes part in painting.
    fn is_shown(&self, now: Duration) -> bool {
        self.has_started(now) || self.wait_at_source
    }

    fn is_running(&self) -> bool {
        if !self.timeline.is_done() {
            return true;
        }
        if self.timeline.is_reversed() {
            !self.terminate_at_source
        } else {
            !self.terminate_at_target
        }
    }

    fn progress(&self, now: Duration) -> f64 {
        if self.has_started(now) {
            self.timeline.value()
        } else {
            0.
        }
    }

    fn interpolated(&self, now: Duration, i: usize) -> f64 {
        let from = self.from.get(i);
        from + self.progress(now) * (self.to.get(i) - from)
    }

    fn is_one_dimensional(&self) -> bool {
        self.from.get(0) == self.from.get(1) && self.to.get(0) == self.to.get(1)
    }

    fn affects_x(&self) -> bool {
        self.from.get(0) >= 0. && self.to.get(0) >= 0.
    }

    fn affects_y(&self) -> bool {
        self.from.get(1) >= 0. && self.to.get(1) >= 0.
    }
}

#[derive(Debug, Default)]
struct WindowAnimations {
    records: Vec<Record>,
    /// Area to repaint while animating, `None` when it needs recomputing.
    layer_rect: Option<Rectangle<i32, Logical>>,
    /// Geometry the records were validated against.
    geometry: Rectangle<i32, Logical>,
    /// Keep-alive references held on the window.
    refs: u32,
}

/// Attribute animations of one effect.
#[derive(Debug)]
pub struct AnimationEngine {
    owner: &'static str,
    windows: BTreeMap<WindowId, WindowAnimations>,
    next_id: u64,
    /// Some record can change the stacking order, so everything is repainted.
    need_scene_repaint: bool,
    /// Windows whose keep-alive references were dropped and still need releasing.
    zombies: Vec<WindowId>,
}

fn x_coord(r: Rectangle<f64, Logical>, anchor: Anchor) -> f64 {
    if anchor.contains(Anchor::LEFT) {
        r.loc.x
    } else if anchor.contains(Anchor::RIGHT) {
        r.loc.x + r.size.w
    } else {
        r.loc.x + r.size.w / 2.
    }
}

fn y_coord(r: Rectangle<f64, Logical>, anchor: Anchor) -> f64 {
    if anchor.contains(Anchor::TOP) {
        r.loc.y
    } else if anchor.contains(Anchor::BOTTOM) {
        r.loc.y + r.size.h
    } else {
        r.loc.y + r.size.h / 2.
    }
}

/// Translation keeping the anchored side in place when scaled by `v`.
fn compensation(anchor: Anchor, v: f64) -> f64 {
    if anchor.intersects(Anchor::LEFT | Anchor::TOP) {
        0.
    } else if anchor.intersects(Anchor::RIGHT | Anchor::BOTTOM) {
        1. - v
    } else {
        0.5 * (1. - v)
    }
}

/// Widens a scale endpoint on the ends where the curve overshoots.
fn fix_overshoot(value: f64, curve: Curve, end: u8) -> f64 {
    if curve.overshoot_ends() & end != 0 {
        value * 1.1
    } else {
        value
    }
}

impl AnimationEngine {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            windows: BTreeMap::new(),
            next_id: 0,
            need_scene_repaint: false,
            zombies: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether the owning effect has to take part in painting.
    pub fn is_active(&self, ctx: &EffectsHandler) -> bool {
        !self.windows.is_empty() && !ctx.is_screen_locked()
    }

    pub fn is_animating(&self, window: WindowId) -> bool {
        self.windows.contains_key(&window)
    }

    pub fn animated_windows(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.keys().copied()
    }

    pub fn record_count(&self, window: WindowId) -> usize {
        self.windows.get(&window).map_or(0, |w| w.records.len())
    }

    /// Finds the running animation of an attribute.
    pub fn find(&self, window: WindowId, attribute: Attribute) -> Option<AnimationId> {
        self.windows
            .get(&window)?
            .records
            .iter()
            .find(|r| r.attribute == attribute)
            .map(|r| r.id)
    }

    /// Elapsed and total time of an animation.
    pub fn timing(&self, id: AnimationId) -> Option<(Duration, Duration)> {
        self.record(id)
            .map(|(_, r)| (r.timeline.elapsed(), r.timeline.duration()))
    }

    /// Current interpolated value of an animation.
    pub fn value(&self, ctx: &EffectsHandler, id: AnimationId) -> Option<[f64; 2]> {
        let now = ctx.now();
        self.record(id)
            .map(|(_, r)| [r.interpolated(now, 0), r.interpolated(now, 1)])
    }

    fn record(&self, id: AnimationId) -> Option<(WindowId, &Record)> {
        self.windows.iter().find_map(|(window, anims)| {
            anims
                .records
                .iter()
                .find(|r| r.id == id)
                .map(|r| (*window, r))
        })
    }

    fn record_mut(&mut self, id: AnimationId) -> Option<(WindowId, &mut Record)> {
        let (window, anims) = self
            .windows
            .iter_mut()
            .find(|(_, anims)| anims.records.iter().any(|r| r.id == id))?;
        anims.layer_rect = None;
        let record = anims.records.iter_mut().find(|r| r.id == id)?;
        Some((*window, record))
    }

    /// Fills in unset endpoints and resolves relative ones.
    fn validate(
        ctx: &EffectsHandler,
        attribute: Attribute,
        meta: &mut Meta,
        from: Option<&mut Fpx2>,
        to: Option<&mut Fpx2>,
        window: &EffectWindow,
    ) {
        let area = {
            let center = crate::utils::center(window.geometry).to_f64();
            ctx.outputs
                .output_at(center)
                .and_then(|id| ctx.outputs.get(id))
                .map(|o| o.geometry())
                .unwrap_or_else(|| ctx.virtual_screen_geometry())
                .to_f64()
        };
        let geo = window.geometry.to_f64();
        let (w, h) = (geo.size.w.max(1.), geo.size.h.max(1.));

        let resolve = |value: &mut Fpx2, relative: [bool; 2], f: &dyn Fn(usize, f64) -> f64| {
            if let Some([x, y]) = value.0 {
                value.set(
                    if relative[0] { f(0, x) } else { x },
                    if relative[1] { f(1, y) } else { y },
                );
            }
        };

        match attribute {
            Attribute::Opacity
            | Attribute::Brightness
            | Attribute::Saturation
            | Attribute::Scale
            | Attribute::Rotation
            | Attribute::Generic => {
                if attribute == Attribute::Scale {
                    let f = |i: usize, v: f64| {
                        if i == 0 {
                            v * area.size.w / w
                        } else {
                            v * area.size.h / h
                        }
                    };
                    if let Some(from) = from.as_deref_mut() {
                        resolve(from, meta.relative_source, &f);
                    }
                    if let Some(to) = to.as_deref_mut() {
                        resolve(to, meta.relative_target, &f);
                    }
                }

                let default = if attribute == Attribute::Rotation {
                    0.
                } else {
                    1.
                };
                if let Some(from) = from {
                    if !from.is_set() {
                        if attribute == Attribute::Rotation {
                            meta.source_anchor = meta.target_anchor;
                        }
                        from.set(default, default);
                    }
                }
                if let Some(to) = to {
                    if !to.is_set() {
                        if attribute == Attribute::Rotation {
                            meta.target_anchor = meta.source_anchor;
                        }
                        to.set(default, default);
                    }
                }
            }
            Attribute::Position => {
                let corner = (geo.loc.x + geo.size.w, geo.loc.y + geo.size.h);
                let f = |i: usize, v: f64| {
                    if i == 0 {
                        area.loc.x + v * area.size.w
                    } else {
                        area.loc.y + v * area.size.h
                    }
                };
                if let Some(from) = from {
                    if from.is_set() {
                        resolve(from, meta.relative_source, &f);
                    } else {
                        from.set(corner.0, corner.1);
                        meta.source_anchor = Anchor::BOTTOM | Anchor::RIGHT;
                    }
                }
                if let Some(to) = to {
                    if to.is_set() {
                        resolve(to, meta.relative_target, &f);
                    } else {
                        to.set(corner.0, corner.1);
                        meta.target_anchor = Anchor::BOTTOM | Anchor::RIGHT;
                    }
                }
            }
            Attribute::Size | Attribute::Translation => {
                let (rw, rh) = if attribute == Attribute::Size {
                    (area.size.w, area.size.h)
                } else {
                    (geo.size.w, geo.size.h)
                };
                let default = if attribute == Attribute::Size {
                    (geo.size.w, geo.size.h)
                } else {
                    (0., 0.)
                };
                let f = |i: usize, v: f64| if i == 0 { v * rw } else { v * rh };
                if let Some(from) = from {
                    if from.is_set() {
                        resolve(from, meta.relative_source, &f);
                    } else {
                        from.set(default.0, default.1);
                    }
                }
                if let Some(to) = to {
                    if to.is_set() {
                        resolve(to, meta.relative_target, &f);
                    } else {
                        to.set(default.0, default.1);
                    }
                }
            }
            Attribute::Clip => {
                if let Some(from) = from {
                    if !from.is_set() {
                        from.set(1., 1.);
                        meta.source_anchor = meta.target_anchor;
                    }
                }
                if let Some(to) = to {
                    if !to.is_set() {
                        to.set(1., 1.);
                        meta.target_anchor = meta.source_anchor;
                    }
                }
            }
        }
    }

    /// Starts animating an attribute of a window.
    ///
    /// A window has at most one animation per attribute, except for [`Attribute::Generic`]. A
    /// second request for the same attribute retargets the running animation from its current
    /// value instead.
    pub fn animate(
        &mut self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        params: AnimationParams,
    ) -> AnimationId {
        let now = ctx.now();
        let duration = if ctx.clock.should_complete_instantly() {
            Duration::ZERO
        } else {
            params.duration
        };

        if params.attribute != Attribute::Generic {
            if let Some(id) = self.find(window.id, params.attribute) {
                trace!(
                    "{}: retargeting {:?} of {}",
                    self.owner,
                    params.attribute,
                    window.id
                );
                self.retarget(ctx, window, id, params.to, duration);
                return id;
            }
        }

        let wait_at_source = params.from.is_set();
        let mut meta = params.meta;
        let mut from = params.from;
        let mut to = params.to;
        Self::validate(ctx, params.attribute, &mut meta, Some(&mut from), Some(&mut to), window);

        self.next_id += 1;
        let id = AnimationId(self.next_id);
        let record = Record {
            id,
            attribute: params.attribute,
            meta,
            from,
            to,
            timeline: Timeline::new(duration, params.curve),
            start_time: now + params.delay,
            advanced_to: None,
            wait_at_source,
            keep_alive: params.keep_alive,
            terminate_at_source: true,
            terminate_at_target: !params.keep_at_target,
            frozen: false,
            fullscreen: params.fullscreen,
        };

        if params.fullscreen && !ctx.set_fullscreen_effect(self.owner) {
            debug!(
                "{}: another full-screen effect is running, animating anyway",
                self.owner
            );
        }

        let anims = self.windows.entry(window.id).or_default();
        anims.records.push(record);
        anims.layer_rect = None;
        anims.geometry = window.geometry;

        if params.delay.is_zero() {
            self.trigger_repaint(ctx);
        } else {
            if wait_at_source {
                ctx.add_repaint_rect(ctx.virtual_screen_geometry());
            }
            ctx.request_repaint_after(params.delay);
        }

        id
    }

    /// Points a running animation at a new target, starting over from its current value.
    pub fn retarget(
        &mut self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        id: AnimationId,
        to: Fpx2,
        remaining: Duration,
    ) -> bool {
        let now = ctx.now();
        let Some((_, record)) = self.record_mut(id) else {
            return false;
        };

        let current = (record.interpolated(now, 0), record.interpolated(now, 1));
        record.from.set(current.0, current.1);
        let mut to = to;
        Self::validate(ctx, record.attribute, &mut record.meta, None, Some(&mut to), window);
        record.to = to;

        let curve = record.timeline.curve();
        record.timeline = Timeline::new(remaining, curve);
        record.start_time = record.start_time.min(now);
        record.advanced_to = Some(now);
        self.trigger_repaint(ctx);
        true
    }

    /// Runs an animation towards one of its ends.
    ///
    /// Records redirected backwards end at their source, never at the target.
    pub fn redirect(&mut self, id: AnimationId, direction: Direction, terminate_at_source: bool) -> bool {
        let Some((_, record)) = self.record_mut(id) else {
            return false;
        };

        let backward = direction == Direction::Backward;
        if record.timeline.is_reversed() != backward {
            record.timeline.reverse();
        }
        record.terminate_at_source = terminate_at_source;
        record.terminate_at_target = false;
        true
    }

    /// Jumps an animation to its end. It is removed after the next frame.
    pub fn complete(&mut self, id: AnimationId) -> bool {
        let Some((_, record)) = self.record_mut(id) else {
            return false;
        };
        let duration = record.timeline.duration();
        record.timeline.set_elapsed(duration);
        true
    }

    /// Stops time for an animation at `elapsed`, or resumes it with `None`.
    pub fn freeze_in_time(&mut self, id: AnimationId, elapsed: Option<Duration>) -> bool {
        let Some((_, record)) = self.record_mut(id) else {
            return false;
        };
        match elapsed {
            Some(elapsed) => {
                record.timeline.set_elapsed(elapsed);
                record.frozen = true;
            }
            None => record.frozen = false,
        }
        true
    }

    /// Removes an animation without reporting its end.
    pub fn cancel(&mut self, ctx: &mut EffectsHandler, id: AnimationId) -> bool {
        let Some((window, _)) = self.record(id) else {
            return false;
        };
        let Some(anims) = self.windows.get_mut(&window) else {
            return false;
        };

        anims.records.retain(|r| r.id != id);
        if let Some(rect) = anims.layer_rect.take() {
            ctx.add_repaint_rect(rect);
        }
        ctx.add_repaint_rect(anims.geometry);

        if anims.records.is_empty() {
            self.remove_window(ctx, window);
        }
        self.update_fullscreen(ctx);
        true
    }

    /// Advances every started record to the frame time.
    pub fn pre_paint_screen(&mut self, ctx: &mut EffectsHandler) {
        let _span = tracy_client::span!("AnimationEngine::pre_paint_screen");

        let now = ctx.now();
        for anims in self.windows.values_mut() {
            for record in &mut anims.records {
                if record.frozen {
                    record.advanced_to = Some(now);
                    continue;
                }
                if !record.has_started(now) {
                    continue;
                }
                let last = record
                    .advanced_to
                    .unwrap_or(record.start_time)
                    .max(record.start_time);
                if now > last {
                    record.timeline.advance(now - last);
                }
                record.advanced_to = Some(now.max(last));
            }
        }
    }

    pub fn pre_paint_window(
        &self,
        ctx: &EffectsHandler,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
    ) {
        let Some(anims) = self.windows.get(&window.id) else {
            return;
        };

        let now = ctx.now();
        for record in anims.records.iter().filter(|r| r.is_shown(now)) {
            match record.attribute {
                Attribute::Opacity => data.set_translucent(),
                Attribute::Brightness | Attribute::Saturation => (),
                _ => data.set_transformed(),
            }
        }

        if let Some(rect) = anims.layer_rect {
            data.paint.add_rect(rect);
        }
    }

    /// Applies the animations to the paint data.
    ///
    /// `generic` is called for [`Attribute::Generic`] records with their progress and meta value.
    pub fn paint_window(
        &self,
        ctx: &EffectsHandler,
        window: &EffectWindow,
        region: &mut Region,
        data: &mut WindowPaintData,
        mut generic: impl FnMut(&EffectWindow, &mut WindowPaintData, f64, u32),
    ) {
        let Some(anims) = self.windows.get(&window.id) else {
            return;
        };

        let now = ctx.now();
        let geo = window.geometry.to_f64();
        let (w, h) = (geo.size.w, geo.size.h);

        for record in anims.records.iter().filter(|r| r.is_shown(now)) {
            let progress = record.progress(now);
            match record.attribute {
                Attribute::Opacity => data.multiply_opacity(record.interpolated(now, 0)),
                Attribute::Brightness => data.multiply_brightness(record.interpolated(now, 0)),
                Attribute::Saturation => data.multiply_saturation(record.interpolated(now, 0)),
                Attribute::Scale => {
                    let mut f = 1.;
                    if record.affects_x() {
                        f = record.interpolated(now, 0);
                        let t = compensation(record.meta.target_anchor & Anchor::HORIZONTAL, f);
                        data.translate(t * w, 0.);
                        data.x_scale *= f;
                    }
                    if record.affects_y() {
                        if !record.is_one_dimensional() {
                            f = record.interpolated(now, 1);
                        }
                        let t = compensation(record.meta.target_anchor & Anchor::VERTICAL, f);
                        data.translate(0., t * h);
                        data.y_scale *= f;
                    }
                }
                Attribute::Clip => {
                    let clip = self.clip_rect(ctx, window, record, now);
                    *region = region.intersected_rect(clip);
                }
                Attribute::Translation => {
                    data.translate(record.interpolated(now, 0), record.interpolated(now, 1));
                }
                Attribute::Size => {
                    let dest = |i: usize| {
                        let from = record.from.get(i);
                        from + progress * (record.to.get(i) - from)
                    };
                    if record.affects_x() && w > 0. {
                        let f = dest(0) / w;
                        data.translate(
                            compensation(record.meta.target_anchor & Anchor::HORIZONTAL, f) * w,
                            0.,
                        );
                        data.x_scale *= f;
                    }
                    if record.affects_y() && h > 0. {
                        let f = dest(1) / h;
                        data.translate(
                            0.,
                            compensation(record.meta.target_anchor & Anchor::VERTICAL, f) * h,
                        );
                        data.y_scale *= f;
                    }
                }
                Attribute::Position => {
                    if record.affects_x() {
                        let dest = record.interpolated(now, 0);
                        let x0 = x_coord(geo, record.meta.source_anchor);
                        let x1 = x_coord(geo, record.meta.target_anchor);
                        data.translate(dest - (x0 + progress * (x1 - x0)), 0.);
                    }
                    if record.affects_y() {
                        let dest = record.interpolated(now, 1);
                        let y0 = y_coord(geo, record.meta.source_anchor);
                        let y1 = y_coord(geo, record.meta.target_anchor);
                        data.translate(0., dest - (y0 + progress * (y1 - y0)));
                    }
                }
                Attribute::Rotation => {
                    let local = Rectangle::new(Point::from((0., 0.)), geo.size);
                    let source = record.meta.source_anchor;
                    let target = record.meta.target_anchor;
                    let mut origin: Point<f64, Logical> =
                        Point::from((x_coord(local, source), y_coord(local, source)));
                    if source != target {
                        let other: Point<f64, Logical> =
                            Point::from((x_coord(local, target), y_coord(local, target)));
                        origin = origin + (other - origin).upscale(progress);
                    }

                    let from = record.from.get(0);
                    data.rotation = Some(RotationData {
                        axis: record.meta.axis.unwrap_or(RotationAxis::Z),
                        angle: from + progress * (record.to.get(0) - from),
                        origin,
                    });
                }
                Attribute::Generic => generic(window, data, progress, record.meta.generic),
            }
        }
    }

    fn clip_rect(
        &self,
        ctx: &EffectsHandler,
        window: &EffectWindow,
        record: &Record,
        now: Duration,
    ) -> Rectangle<i32, Logical> {
        let geo = ctx.expanded_geometry(window);
        let progress = record.progress(now);
        let ratio = |i: usize| {
            let from = record.from.get(i);
            from + progress * (record.to.get(i) - from)
        };

        let mut size = geo.size.to_f64();
        if record.from.get(0) < 1. || record.to.get(0) < 1. {
            size.w *= ratio(0);
        }
        if record.from.get(1) < 1. || record.to.get(1) < 1. {
            size.h *= ratio(1);
        }

        let g = geo.to_f64();
        let center = Rectangle::new(
            Point::from((g.loc.x + size.w / 2., g.loc.y + size.h / 2.)),
            Size::from(((g.size.w - size.w).max(0.), (g.size.h - size.h).max(0.))),
        );
        let x = [
            x_coord(center, record.meta.source_anchor),
            x_coord(center, record.meta.target_anchor),
        ];
        let y = [
            y_coord(center, record.meta.source_anchor),
            y_coord(center, record.meta.target_anchor),
        ];
        let cx = x[0] + ratio(0) * (x[1] - x[0]);
        let cy = y[0] + ratio(1) * (y[1] - y[0]);

        Rectangle::new(
            Point::from(((cx - size.w / 2.).round() as i32, (cy - size.h / 2.).round() as i32)),
            Size::from((size.w.round() as i32, size.h.round() as i32)),
        )
    }

    /// Removes finished records and schedules repaints for the running ones.
    ///
    /// Keep-alive references of the removed records are released by
    /// [`AnimationEngine::release_zombies`], so the ended windows can still be looked at first.
    pub fn post_paint_screen(&mut self, ctx: &mut EffectsHandler) -> Vec<EndedAnimation> {
        let _span = tracy_client::span!("AnimationEngine::post_paint_screen");

        let now = ctx.now();
        let mut ended = Vec::new();
        let mut emptied = Vec::new();

        for (window, anims) in &mut self.windows {
            let before = anims.records.len();
            anims.records.retain(|r| {
                if r.is_running() || !r.is_shown(now) || (!r.has_started(now) && r.wait_at_source)
                {
                    return true;
                }
                ended.push(EndedAnimation {
                    id: r.id,
                    window: *window,
                    attribute: r.attribute,
                    meta: r.meta,
                });
                false
            });

            if anims.records.len() != before {
                if let Some(rect) = anims.layer_rect.take() {
                    ctx.add_repaint_rect(rect);
                }
                ctx.add_repaint_rect(ctx.expanded_geometry_of(*window).unwrap_or(anims.geometry));
            }
            if anims.records.is_empty() {
                emptied.push(*window);
            }
        }

        for window in emptied {
            if let Some(anims) = self.windows.remove(&window) {
                for _ in 0..anims.refs {
                    self.zombies.push(window);
                }
            }
        }

        self.update_fullscreen(ctx);
        self.update_layer_repaints(ctx);

        if self.need_scene_repaint {
            ctx.add_repaint_full();
        } else {
            for anims in self.windows.values() {
                let running = anims
                    .records
                    .iter()
                    .any(|r| r.has_started(now) && !r.timeline.is_done());
                if running {
                    if let Some(rect) = anims.layer_rect {
                        ctx.add_repaint_rect(rect);
                    }
                }
            }
        }

        ended
    }

    /// Drops keep-alive references of windows that finished animating.
    pub fn release_zombies(&mut self, ctx: &mut EffectsHandler) {
        for window in self.zombies.drain(..) {
            ctx.unref_window(window);
        }
    }

    /// Takes keep-alive references for records that want them, cancels the rest.
    pub fn window_closed(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        let Some(anims) = self.windows.get_mut(&window.id) else {
            return;
        };

        anims.records.retain(|r| r.keep_alive);
        if anims.records.is_empty() {
            self.windows.remove(&window.id);
            ctx.add_layer_repaint(window);
            self.update_fullscreen(ctx);
            return;
        }

        if ctx.ref_window(window.id) {
            anims.refs += 1;
        }
    }

    pub fn window_deleted(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        if self.windows.remove(&window).is_some() {
            self.update_fullscreen(ctx);
        }
        self.zombies.retain(|w| *w != window);
    }

    /// The window moved or got resized, its repaint area is stale.
    pub fn window_geometry_changed(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if let Some(anims) = self.windows.get_mut(&window.id) {
            anims.geometry = window.geometry;
            anims.layer_rect = None;
            self.update_layer_repaints(ctx);
            if let Some(rect) = self.windows.get(&window.id).and_then(|a| a.layer_rect) {
                ctx.add_repaint_rect(rect);
            }
        }
    }

    fn remove_window(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        if let Some(anims) = self.windows.remove(&window) {
            for _ in 0..anims.refs {
                ctx.unref_window(window);
            }
        }
    }

    fn update_fullscreen(&self, ctx: &mut EffectsHandler) {
        let wants = self
            .windows
            .values()
            .any(|a| a.records.iter().any(|r| r.fullscreen));
        if !wants {
            ctx.unset_fullscreen_effect(self.owner);
        }
    }

    fn trigger_repaint(&mut self, ctx: &mut EffectsHandler) {
        for anims in self.windows.values_mut() {
            anims.layer_rect = None;
        }
        self.update_layer_repaints(ctx);
        if self.need_scene_repaint {
            ctx.add_repaint_full();
        } else {
            for anims in self.windows.values() {
                if let Some(rect) = anims.layer_rect {
                    ctx.add_repaint_rect(rect);
                }
            }
        }
    }

    /// Computes where each animated window can be painted during its animations.
    fn update_layer_repaints(&mut self, ctx: &EffectsHandler) {
        let now = ctx.now();
        let screen = ctx.virtual_screen_geometry();
        self.need_scene_repaint = false;

        for (window, anims) in &mut self.windows {
            if anims.layer_rect.is_some() {
                continue;
            }

            let frame = anims.geometry;
            let expanded = ctx.expanded_geometry_of(*window).unwrap_or(frame);
            let (fw, fh) = (f64::from(frame.size.w), f64::from(frame.size.h));

            let mut f = [1., 1.];
            let mut t = [0., 0.];
            let mut create = false;
            let mut rects: Vec<Rectangle<i32, Logical>> = Vec::new();

            for record in anims.records.iter().filter(|r| r.has_started(now)) {
                match record.attribute {
                    Attribute::Opacity
                    | Attribute::Brightness
                    | Attribute::Saturation
                    | Attribute::Clip => create = true,
                    Attribute::Rotation => {
                        create = false;
                        anims.layer_rect = Some(screen);
                        break;
                    }
                    Attribute::Generic => {
                        self.need_scene_repaint = true;
                        return;
                    }
                    Attribute::Translation | Attribute::Position => {
                        create = true;
                        let mut x = [0., 0.];
                        let mut y = [0., 0.];
                        if record.attribute == Attribute::Translation {
                            x = [record.from.get(0), record.to.get(0)];
                            y = [record.from.get(1), record.to.get(1)];
                        } else {
                            let r = frame.to_f64();
                            if record.affects_x() {
                                x = [
                                    record.from.get(0) - x_coord(r, record.meta.source_anchor),
                                    record.to.get(0) - x_coord(r, record.meta.target_anchor),
                                ];
                            }
                            if record.affects_y() {
                                y = [
                                    record.from.get(1) - y_coord(r, record.meta.source_anchor),
                                    record.to.get(1) - y_coord(r, record.meta.target_anchor),
                                ];
                            }
                        }
                        for i in 0..2 {
                            let mut r = expanded;
                            r.loc.x += x[i] as i32;
                            r.loc.y += y[i] as i32;
                            rects.push(r);
                        }
                    }
                    Attribute::Size | Attribute::Scale => {
                        create = true;
                        let curve = record.timeline.curve();
                        let mut fx = fix_overshoot(record.from.get(0), curve, 1)
                            .max(fix_overshoot(record.to.get(0), curve, 2));
                        if fx >= 0. {
                            if record.attribute == Attribute::Size && fw > 0. {
                                fx /= fw;
                            }
                            f[0] *= fx;
                            t[0] += compensation(record.meta.target_anchor & Anchor::HORIZONTAL, fx)
                                * fw;
                        }
                        let mut fy = fix_overshoot(record.from.get(1), curve, 1)
                            .max(fix_overshoot(record.to.get(1), curve, 2));
                        if fy >= 0. {
                            if record.attribute == Attribute::Size && fh > 0. {
                                fy /= fh;
                            }
                            let fy = if record.is_one_dimensional() { fx } else { fy };
                            f[1] *= fy;
                            t[1] += compensation(record.meta.target_anchor & Anchor::VERTICAL, fy)
                                * fh;
                        }
                    }
                }
            }

            if !create {
                continue;
            }

            if rects.is_empty() {
                rects.push(expanded);
            }
            for r in &mut rects {
                r.size.w = (f64::from(r.size.w) * f[0]).round() as i32;
                r.size.h = (f64::from(r.size.h) * f[1]).round() as i32;
                r.loc.x += t[0] as i32;
                r.loc.y += t[1] as i32;
            }

            let mut rect = rects[0];
            if rects.len() > 1 {
                for r in &rects[1..] {
                    rect = united(rect, *r);
                }
                // Room for curves overshooting their target.
                let dx = 110 * (rect.size.w - expanded.size.w) / 100 + 1 - rect.size.w
                    + expanded.size.w;
                let dy = 110 * (rect.size.h - expanded.size.h) / 100 + 1 - rect.size.h
                    + expanded.size.h;
                rect.loc.x -= dx;
                rect.loc.y -= dy;
                rect.size.w += 2 * dx;
                rect.size.h += 2 * dy;
            }
            anims.layer_rect = Some(rect);
        }
    }

    /// Repaint area of an animated window, if one is known.
    pub fn layer_rect(&self, window: WindowId) -> Option<Rectangle<i32, Logical>> {
        self.windows.get(&window).and_then(|a| a.layer_rect)
    }
}

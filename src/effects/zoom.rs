//! Full screen zoom.
//!
//! Every output is painted into its own offscreen texture, and all of them are drawn back scaled
//! by the current zoom level and panned so the interesting part stays in view.

use std::collections::HashMap;
use std::time::Duration;

use glaze_config::{Action, MousePointer, MouseTracking};
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::effect::{
    Chain, Effect, EffectsHandler, Feature, PaintContext, ReconfigureFlags, ScreenPaint,
};
use crate::input::shortcuts::AxisDirection;
use crate::output::{Edge, OutputId};
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData};
use crate::render_helpers::offscreen::OffscreenLayer;
use crate::render_helpers::{
    Blend, Filter, RenderError, ShaderKind, TextureDraw, TextureFormat, TextureId, TextureSpec,
    TransferFunction, Wrap,
};
use crate::utils::center;
use crate::utils::debounce::{DebouncedSave, StateFile};
use crate::utils::region::Region;
use crate::window::EffectWindow;

pub const NAME: &str = "zoom";

const MAX_ZOOM: f64 = 100.;
/// Distance from a screen edge at which the cursor starts pushing the view in push mode.
const PUSH_THRESHOLD: f64 = 4.;
const MOVE_DURATION: Duration = Duration::from_millis(350);
const MOVE_STEP: Duration = Duration::from_millis(40);
const SAVE_DELAY: Duration = Duration::from_secs(1);

/// Directional move started by one of the move actions.
#[derive(Debug, Clone, Copy)]
struct Pan {
    x: f64,
    y: f64,
    start: Duration,
    steps_done: u32,
}

pub struct ZoomEffect {
    zoom: f64,
    target_zoom: f64,
    source_zoom: f64,
    last_present: Option<Duration>,

    zoom_factor: f64,
    pixel_grid_zoom: f64,
    mouse_pointer: MousePointer,
    mouse_tracking: MouseTracking,
    focus_delay: Duration,
    move_factor: f64,
    focus_tracking: bool,

    cursor_point: Point<f64, Logical>,
    /// Point the view is anchored to, follows the cursor depending on the tracking mode.
    prev_point: Point<f64, Logical>,
    focus_point: Point<f64, Logical>,
    last_mouse_event: Option<Duration>,
    last_focus_event: Option<Duration>,
    pan: Option<Pan>,
    /// Clock time of the last view update, so several outputs in one frame pan once.
    last_view_update: Option<Duration>,
    translation: Point<f64, Logical>,

    offscreen: HashMap<OutputId, OffscreenLayer>,
    /// Uploaded cursor image and the serial it was uploaded from.
    cursor_texture: Option<(TextureId, u32)>,
    cursor_hidden: bool,

    save: DebouncedSave,
    state_file: Option<StateFile>,
}

impl ZoomEffect {
    pub fn new() -> Self {
        Self::with_state_file(StateFile::in_state_dir(NAME))
    }

    pub fn with_state_file(state_file: Option<StateFile>) -> Self {
        Self {
            zoom: 1.,
            target_zoom: 1.,
            source_zoom: 1.,
            last_present: None,
            zoom_factor: 1.2,
            pixel_grid_zoom: 15.,
            mouse_pointer: MousePointer::Scale,
            mouse_tracking: MouseTracking::Proportional,
            focus_delay: Duration::ZERO,
            move_factor: 20.,
            focus_tracking: false,
            cursor_point: Point::from((0., 0.)),
            prev_point: Point::from((0., 0.)),
            focus_point: Point::from((0., 0.)),
            last_mouse_event: None,
            last_focus_event: None,
            pan: None,
            last_view_update: None,
            translation: Point::from((0., 0.)),
            offscreen: HashMap::new(),
            cursor_texture: None,
            cursor_hidden: false,
            save: DebouncedSave::new(SAVE_DELAY, state_file.clone()),
            state_file,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    pub fn translation(&self) -> Point<f64, Logical> {
        self.translation
    }

    fn set_target_zoom(&mut self, ctx: &mut EffectsHandler, value: f64) {
        let value = value.min(MAX_ZOOM);
        if value == self.target_zoom {
            return;
        }

        debug!("zooming to {value}");
        self.target_zoom = value;
        let now = ctx.clock.now_unadjusted();
        self.save.schedule(now, value, ctx.event_loop());
    }

    /// Zooms to `to`, or one step in when `None`.
    pub fn zoom_to(&mut self, ctx: &mut EffectsHandler, to: Option<f64>) {
        self.source_zoom = self.zoom;
        let target = to.unwrap_or(self.target_zoom * self.zoom_factor);
        self.set_target_zoom(ctx, target);

        self.cursor_point = ctx.cursor_pos();
        if self.mouse_tracking == MouseTracking::Disabled {
            self.prev_point = self.cursor_point;
        }
        ctx.add_repaint_full();
    }

    pub fn zoom_in(&mut self, ctx: &mut EffectsHandler) {
        self.zoom_to(ctx, None);
    }

    pub fn zoom_out(&mut self, ctx: &mut EffectsHandler) {
        self.source_zoom = self.zoom;
        let mut target = self.target_zoom / self.zoom_factor;
        if (self.zoom_factor > 1. && target < 1.01) || (self.zoom_factor < 1. && target > 0.99) {
            target = 1.;
        }
        self.set_target_zoom(ctx, target);

        if self.mouse_tracking == MouseTracking::Disabled {
            self.prev_point = ctx.cursor_pos();
        }
        ctx.add_repaint_full();
    }

    pub fn actual_size(&mut self, ctx: &mut EffectsHandler) {
        self.source_zoom = self.zoom;
        self.set_target_zoom(ctx, 1.);
        ctx.add_repaint_full();
    }

    fn move_zoom(&mut self, ctx: &mut EffectsHandler, dx: i32, dy: i32) {
        let screen = ctx.virtual_screen_geometry().size;
        let step = |dir: i32, size: i32| {
            let amount = (f64::from(size) / self.zoom / self.move_factor).max(1.);
            f64::from(dir.signum()) * amount
        };

        self.pan = Some(Pan {
            x: step(dx, screen.w),
            y: step(dy, screen.h),
            start: ctx.now(),
            steps_done: 0,
        });
        ctx.add_repaint_full();
    }

    fn move_mouse_to_focus(&mut self, ctx: &mut EffectsHandler) {
        let Some(window) = ctx.active_window().and_then(|id| ctx.windows.get(id)) else {
            return;
        };
        let center = center(window.geometry).to_f64();
        ctx.warp_pointer(center);
    }

    fn move_mouse_to_center(&mut self, ctx: &mut EffectsHandler) {
        let center = center(ctx.active_screen_geometry()).to_f64();
        ctx.warp_pointer(center);
    }

    /// Advances a running directional move by the steps due at `now`.
    fn step_pan(&mut self, ctx: &mut EffectsHandler, now: Duration) {
        let Some(pan) = &mut self.pan else {
            return;
        };

        let elapsed = now.saturating_sub(pan.start).min(MOVE_DURATION);
        let due = (elapsed.as_millis() / MOVE_STEP.as_millis()) as u32;
        let screen = ctx.virtual_screen_geometry();
        while pan.steps_done < due {
            pan.steps_done += 1;
            self.prev_point.x = (self.prev_point.x + pan.x)
                .clamp(f64::from(screen.loc.x), f64::from(screen.loc.x + screen.size.w));
            self.prev_point.y = (self.prev_point.y + pan.y)
                .clamp(f64::from(screen.loc.y), f64::from(screen.loc.y + screen.size.h));
            self.cursor_point = self.prev_point;
        }

        if elapsed >= MOVE_DURATION {
            self.pan = None;
        }
        ctx.add_repaint_full();
    }

    /// Pans the view in push mode when the cursor presses against an edge with nothing beyond.
    fn push(&mut self, ctx: &EffectsHandler) {
        let z = self.zoom;
        let x = self.cursor_point.x * z - self.prev_point.x * (z - 1.);
        let y = self.cursor_point.y * z - self.prev_point.y * (z - 1.);

        let Some(output) = ctx
            .outputs
            .output_at(Point::from((x, y)))
            .or_else(|| ctx.outputs.output_at(self.cursor_point))
            .or_else(|| ctx.active_output())
        else {
            return;
        };
        let Some(geometry) = ctx.outputs.get(output).map(|o| o.geometry()) else {
            return;
        };

        let left = f64::from(geometry.loc.x);
        let top = f64::from(geometry.loc.y);
        let right = f64::from(geometry.loc.x + geometry.size.w - 1);
        let bottom = f64::from(geometry.loc.y + geometry.size.h - 1);
        let adjacent = |edge| ctx.outputs.neighbour(output, edge).is_some();

        let mut x_move = 0.;
        let mut y_move = 0.;
        if x < left + PUSH_THRESHOLD && !adjacent(Edge::Left) {
            x_move = (x - PUSH_THRESHOLD - left) / z;
        } else if x > right - PUSH_THRESHOLD && !adjacent(Edge::Right) {
            x_move = (x + PUSH_THRESHOLD - right) / z;
        }
        if y < top + PUSH_THRESHOLD && !adjacent(Edge::Top) {
            y_move = (y - PUSH_THRESHOLD - top) / z;
        } else if y > bottom - PUSH_THRESHOLD && !adjacent(Edge::Bottom) {
            y_move = (y + PUSH_THRESHOLD - bottom) / z;
        }

        if x_move != 0. {
            self.prev_point.x = (self.prev_point.x + x_move).clamp(left, right + 1.);
        }
        if y_move != 0. {
            self.prev_point.y = (self.prev_point.y + y_move).clamp(top, bottom + 1.);
        }
    }

    /// Recomputes where the zoomed scene is placed.
    fn update_view(&mut self, ctx: &mut EffectsHandler) {
        let now = ctx.now();
        if self.last_view_update == Some(now) {
            return;
        }
        self.last_view_update = Some(now);
        self.step_pan(ctx, now);

        let z = self.zoom;
        let screen = ctx.virtual_screen_geometry().size;
        let (w, h) = (f64::from(screen.w), f64::from(screen.h));

        let mut translation = match self.mouse_tracking {
            MouseTracking::Proportional => {
                self.prev_point = self.cursor_point;
                Point::from((
                    -(self.cursor_point.x * (z - 1.)).trunc(),
                    -(self.cursor_point.y * (z - 1.)).trunc(),
                ))
            }
            MouseTracking::Centered | MouseTracking::Disabled => {
                if self.mouse_tracking == MouseTracking::Centered {
                    self.prev_point = self.cursor_point;
                }
                Point::from((
                    (w / 2. - self.prev_point.x * z).max(w - w * z).min(0.).trunc(),
                    (h / 2. - self.prev_point.y * z).max(h - h * z).min(0.).trunc(),
                ))
            }
            MouseTracking::Push => {
                self.push(ctx);
                Point::from((
                    -(self.prev_point.x * (z - 1.)).trunc(),
                    -(self.prev_point.y * (z - 1.)).trunc(),
                ))
            }
        };

        if self.focus_tracking {
            let accept = match (self.mouse_tracking, self.last_mouse_event, self.last_focus_event) {
                (MouseTracking::Disabled, _, _) => true,
                _ if self.focus_delay.is_zero() => true,
                (_, Some(mouse), Some(focus)) => focus.saturating_sub(mouse) > self.focus_delay,
                (_, None, _) => true,
                (_, Some(_), None) => false,
            };
            if accept && self.last_focus_event.is_some() {
                translation = Point::from((
                    -(self.focus_point.x * (z - 1.)).trunc(),
                    -(self.focus_point.y * (z - 1.)).trunc(),
                ));
                self.prev_point = self.focus_point;
            }
        }

        self.translation = translation;
    }

    fn update_cursor_visibility(&mut self, ctx: &mut EffectsHandler) {
        let wants_hidden = self.zoom != 1.
            && !(self.mouse_tracking == MouseTracking::Proportional
                && self.mouse_pointer == MousePointer::Keep);
        // Only hide the real cursor when we can draw a replacement, or nothing is to be drawn.
        let can_replace =
            self.mouse_pointer == MousePointer::Hide || ctx.cursor_image().is_some();

        if wants_hidden && can_replace && !self.cursor_hidden {
            ctx.hide_cursor(NAME);
            self.cursor_hidden = true;
        } else if (!wants_hidden || !can_replace) && self.cursor_hidden {
            ctx.show_cursor(NAME);
            self.cursor_hidden = false;
            if let Some((texture, _)) = self.cursor_texture.take() {
                ctx.release_texture(texture);
            }
        }
    }

    /// Where an output's offscreen texture lands on the zoomed screen.
    fn zoomed_rect(&self, geometry: Rectangle<i32, Logical>) -> Rectangle<f64, Logical> {
        let z = self.zoom;
        Rectangle::new(
            Point::from((
                f64::from(geometry.loc.x) * z + self.translation.x,
                f64::from(geometry.loc.y) * z + self.translation.y,
            )),
            Size::from((f64::from(geometry.size.w) * z, f64::from(geometry.size.h) * z)),
        )
    }

    fn shader(&self) -> ShaderKind {
        if self.zoom < self.pixel_grid_zoom {
            ShaderKind::MapTexture
        } else {
            ShaderKind::PixelGrid
        }
    }

    fn draw_cursor(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
    ) -> Result<(), RenderError> {
        if self.mouse_pointer == MousePointer::Hide || !self.cursor_hidden {
            return Ok(());
        }
        let Some(image) = ctx.cursor_image() else {
            return Ok(());
        };

        let texture = match self.cursor_texture {
            Some((texture, serial))
                if serial == image.serial && paint.renderer.is_texture_valid(texture) =>
            {
                texture
            }
            stale => {
                if let Some((texture, _)) = stale {
                    paint.renderer.free_texture(texture);
                }
                self.cursor_texture = None;
                let spec = TextureSpec::new(image.size, TextureFormat::Rgba8)
                    .with_filter(Filter::Linear)
                    .with_wrap(Wrap::ClampToEdge);
                let texture = paint.renderer.upload_texture(spec, &image.pixels)?;
                self.cursor_texture = Some((texture, image.serial));
                texture
            }
        };

        let mut size = image.logical_size().to_f64();
        if self.mouse_pointer == MousePointer::Scale {
            size = size.upscale(self.zoom);
        }
        let pos = ctx.cursor_pos();
        let hotspot = image.hotspot.to_f64();
        let loc = Point::from((
            (pos.x - hotspot.x) * self.zoom + self.translation.x,
            (pos.y - hotspot.y) * self.zoom + self.translation.y,
        ));
        let draw = TextureDraw::new(texture, ShaderKind::MapTexture, Rectangle::new(loc, size))
            .with_blend(Blend::Premultiplied)
            .with_region(Region::from_rect(paint.target.geometry));
        paint.renderer.draw_texture(&paint.target, &draw)
    }

    fn register_shortcuts(&self, ctx: &mut EffectsHandler) {
        let _ = ctx.shortcuts.unregister_owner(NAME);
        for action in [
            Action::ZoomIn,
            Action::ZoomOut,
            Action::ZoomActualSize,
            Action::MoveZoomLeft,
            Action::MoveZoomRight,
            Action::MoveZoomUp,
            Action::MoveZoomDown,
            Action::MoveMouseToFocus,
            Action::MoveMouseToCenter,
        ] {
            ctx.shortcuts.register_action(NAME, action);
        }

        let modifiers = ctx.config.zoom.pointer_axis_gesture_modifiers;
        ctx.shortcuts
            .register_axis(NAME, modifiers, AxisDirection::Up);
        ctx.shortcuts
            .register_axis(NAME, modifiers, AxisDirection::Down);
    }
}

impl Default for ZoomEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for ZoomEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        10
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, flags: ReconfigureFlags) {
        let config = ctx.config.zoom;
        self.zoom_factor = config.zoom_factor();
        self.pixel_grid_zoom = config.pixel_grid_zoom;
        self.mouse_pointer = config.mouse_pointer;
        self.mouse_tracking = config.mouse_tracking;
        self.focus_delay = Duration::from_millis(u64::from(config.focus_delay));
        self.move_factor = config.move_factor();
        self.focus_tracking = config.enable_focus_tracking || config.enable_text_caret_tracking;
        self.register_shortcuts(ctx);

        if flags.contains(ReconfigureFlags::INITIAL) {
            let initial = self
                .state_file
                .as_ref()
                .and_then(|f| f.read_f64())
                .unwrap_or(config.initial_zoom);
            if initial > 1. {
                self.zoom_to(ctx, Some(initial));
            }
        }
    }

    fn unloading(&mut self, ctx: &mut EffectsHandler) {
        self.save.flush();
        for (_, mut layer) in self.offscreen.drain() {
            if let Some(texture) = layer.take() {
                ctx.release_texture(texture);
            }
        }
        if let Some((texture, _)) = self.cursor_texture.take() {
            ctx.release_texture(texture);
        }
        ctx.show_cursor(NAME);
    }

    fn is_active(&self, _ctx: &EffectsHandler) -> bool {
        self.zoom != 1. || self.zoom != self.target_zoom
    }

    fn provides(&self, feature: Feature) -> bool {
        feature == Feature::ScreenMagnification
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        data.mask |= PaintMask::SCREEN_TRANSFORMED;

        if self.zoom != self.target_zoom {
            let now = ctx.now();
            let delta = self.last_present.map_or(Duration::ZERO, |last| now.saturating_sub(last));
            self.last_present = Some(now);

            let distance = (self.target_zoom - self.source_zoom).abs();
            let duration = 0.15 * self.zoom_factor;
            let step = distance * delta.as_secs_f64() / duration;
            self.zoom = if self.target_zoom > self.zoom {
                (self.zoom + step).min(self.target_zoom)
            } else {
                (self.zoom - step).max(self.target_zoom)
            };
        }

        self.update_cursor_visibility(ctx);
        self.update_view(ctx);
        next.pre_paint_screen(ctx, data, time);
    }

    fn paint_screen(
        &mut self,
        _ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<ScreenPaint, RenderError> {
        let format = match paint.target.color.transfer {
            TransferFunction::Srgb => TextureFormat::Rgba8,
            _ => TextureFormat::Rgba16F,
        };
        let spec = TextureSpec::new(paint.target.size, format)
            .with_filter(Filter::Linear)
            .with_wrap(Wrap::ClampToEdge);

        let layer = self.offscreen.entry(paint.output).or_default();
        layer.ensure(paint.renderer, spec)?;
        let mut target = layer
            .target(paint.target.geometry)
            .ok_or(RenderError::InvalidTexture)?;
        target.color = paint.target.color;
        Ok(ScreenPaint::Redirect(target))
    }

    fn finish_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<(), RenderError> {
        let _span = tracy_client::span!("ZoomEffect::finish_paint_screen");

        let visible = Region::from_rect(paint.target.geometry);
        paint
            .renderer
            .clear(&paint.target, &visible, [0., 0., 0., 0.])?;

        let shader = self.shader();
        let mut layers: Vec<_> = self
            .offscreen
            .iter()
            .filter_map(|(id, layer)| Some((*id, layer.texture()?)))
            .collect();
        layers.sort_by_key(|(id, _)| *id);

        for (output, texture) in layers {
            let Some(geometry) = ctx.outputs.get(output).map(|o| o.geometry()) else {
                continue;
            };
            let draw = TextureDraw::new(texture, shader, self.zoomed_rect(geometry))
                .with_region(visible.clone());
            paint.renderer.draw_texture(&paint.target, &draw)?;
        }

        if let Err(err) = self.draw_cursor(ctx, paint) {
            warn!("error drawing the zoomed cursor: {err}");
        }
        Ok(())
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        if self.zoom == self.target_zoom {
            self.last_present = None;
        }
        if self.zoom == 1. || self.zoom != self.target_zoom || self.pan.is_some() {
            ctx.add_repaint_full();
        }
        next.post_paint_screen(ctx);
    }

    fn window_damaged(&mut self, ctx: &mut EffectsHandler, _window: &EffectWindow, _damage: &Region) {
        if self.zoom != 1. {
            ctx.add_repaint_full();
        }
    }

    fn screen_removed(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if let Some(mut layer) = self.offscreen.remove(&output) {
            if let Some(texture) = layer.take() {
                ctx.release_texture(texture);
            }
        }
    }

    fn handle_action(&mut self, ctx: &mut EffectsHandler, action: Action) -> bool {
        match action {
            Action::ZoomIn => self.zoom_in(ctx),
            Action::ZoomOut => self.zoom_out(ctx),
            Action::ZoomActualSize => self.actual_size(ctx),
            Action::MoveZoomLeft => self.move_zoom(ctx, -1, 0),
            Action::MoveZoomRight => self.move_zoom(ctx, 1, 0),
            Action::MoveZoomUp => self.move_zoom(ctx, 0, -1),
            Action::MoveZoomDown => self.move_zoom(ctx, 0, 1),
            Action::MoveMouseToFocus => self.move_mouse_to_focus(ctx),
            Action::MoveMouseToCenter => self.move_mouse_to_center(ctx),
            _ => return false,
        }
        true
    }

    fn axis(&mut self, ctx: &mut EffectsHandler, direction: AxisDirection) -> bool {
        match direction {
            AxisDirection::Up => self.zoom_in(ctx),
            AxisDirection::Down => self.zoom_out(ctx),
            _ => return false,
        }
        true
    }

    fn cursor_moved(
        &mut self,
        ctx: &mut EffectsHandler,
        pos: Point<f64, Logical>,
        old: Point<f64, Logical>,
    ) {
        if self.zoom == 1. {
            return;
        }
        self.cursor_point = pos;
        if pos != old {
            self.last_mouse_event = Some(ctx.now());
            ctx.add_repaint_full();
        }
    }

    fn focus_rect_changed(&mut self, ctx: &mut EffectsHandler, rect: Rectangle<i32, Logical>) {
        if self.zoom == 1. || !self.focus_tracking {
            return;
        }
        self.focus_point = center(rect).to_f64();
        self.last_focus_event = Some(ctx.now());
        ctx.add_repaint_full();
    }
}

//! Magnifying glass following the cursor.

use std::time::Duration;

use glaze_config::Action;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::effect::{
    Chain, Effect, EffectsHandler, Feature, PaintContext, ReconfigureFlags, ScreenPaint,
};
use crate::input::shortcuts::AxisDirection;
use crate::output::OutputId;
use crate::paint::{FrameTime, ScreenPrePaintData};
use crate::render_helpers::offscreen::OffscreenLayer;
use crate::render_helpers::{
    Filter, RenderError, ShaderKind, TextureDraw, TextureFormat, TextureSpec, Wrap,
};
use crate::utils::region::Region;
use crate::utils::{expand_rect, to_f64};

pub const NAME: &str = "magnifier";

/// Width of the black frame around the magnified area, in logical pixels.
const FRAME_WIDTH: i32 = 5;
const ANIMATION_TIME: Duration = Duration::from_millis(500);
const FRAME_COLOR: [f32; 4] = [0., 0., 0., 1.];

pub struct MagnifierEffect {
    zoom: f64,
    target_zoom: f64,
    last_present: Option<Duration>,
    zoom_factor: f64,
    size: Size<i32, Logical>,
    /// Magnified copy of the area around the cursor, sized like the magnifier.
    layer: OffscreenLayer,
}

impl MagnifierEffect {
    pub fn new() -> Self {
        Self {
            zoom: 1.,
            target_zoom: 1.,
            last_present: None,
            zoom_factor: 1.2,
            size: Size::from((200, 200)),
            layer: OffscreenLayer::new(),
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    /// Area the magnified picture covers, centered on `pos`.
    pub fn area_at(&self, pos: Point<f64, Logical>) -> Rectangle<i32, Logical> {
        let loc = Point::from((
            pos.x.round() as i32 - self.size.w / 2,
            pos.y.round() as i32 - self.size.h / 2,
        ));
        Rectangle::new(loc, self.size)
    }

    /// Part of the scene that gets magnified.
    fn source_at(&self, pos: Point<f64, Logical>) -> Rectangle<i32, Logical> {
        let w = (f64::from(self.size.w) / self.zoom).round() as i32;
        let h = (f64::from(self.size.h) / self.zoom).round() as i32;
        let loc = Point::from((pos.x.round() as i32 - w / 2, pos.y.round() as i32 - h / 2));
        Rectangle::new(loc, Size::from((w, h)))
    }

    fn framed_area_at(&self, pos: Point<f64, Logical>) -> Rectangle<i32, Logical> {
        expand_rect(self.area_at(pos), FRAME_WIDTH)
    }

    fn repaint_area(&self, ctx: &mut EffectsHandler) {
        let area = self.framed_area_at(ctx.cursor_pos());
        ctx.add_repaint_rect(area);
    }

    pub fn zoom_in(&mut self, ctx: &mut EffectsHandler) {
        self.target_zoom *= self.zoom_factor;
        self.repaint_area(ctx);
    }

    pub fn zoom_out(&mut self, ctx: &mut EffectsHandler) {
        self.target_zoom /= self.zoom_factor;
        if self.target_zoom < 1.01 {
            self.target_zoom = 1.;
        }
        self.repaint_area(ctx);
    }

    /// Turns the magnifier on at its last level, or off.
    pub fn toggle(&mut self, ctx: &mut EffectsHandler) {
        if self.target_zoom == 1. {
            self.target_zoom = ctx.config.magnifier.initial_zoom.max(self.zoom_factor);
        } else {
            self.target_zoom = 1.;
        }
        self.repaint_area(ctx);
    }

    fn release(&mut self, ctx: &mut EffectsHandler) {
        if let Some(texture) = self.layer.take() {
            ctx.release_texture(texture);
        }
    }

    fn frame_rects(area: Rectangle<i32, Logical>) -> [Rectangle<i32, Logical>; 4] {
        let (x, y, w, h) = (area.loc.x, area.loc.y, area.size.w, area.size.h);
        let f = FRAME_WIDTH;
        [
            Rectangle::new((x - f, y - f).into(), (w + 2 * f, f).into()),
            Rectangle::new((x - f, y + h).into(), (w + 2 * f, f).into()),
            Rectangle::new((x - f, y).into(), (f, h).into()),
            Rectangle::new((x + w, y).into(), (f, h).into()),
        ]
    }
}

impl Default for MagnifierEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for MagnifierEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        10
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, flags: ReconfigureFlags) {
        let config = ctx.config.magnifier;
        self.zoom_factor = config.zoom_factor.max(1.01);
        let width = i32::try_from(config.width).unwrap_or(i32::MAX).max(1);
        let height = i32::try_from(config.height).unwrap_or(i32::MAX).max(1);
        self.size = Size::from((width, height));

        let _ = ctx.shortcuts.unregister_owner(NAME);
        for action in [Action::ZoomIn, Action::ZoomOut, Action::ZoomActualSize] {
            ctx.shortcuts.register_action(NAME, action);
        }
        let modifiers = config.pointer_axis_gesture_modifiers;
        ctx.shortcuts
            .register_axis(NAME, modifiers, AxisDirection::Up);
        ctx.shortcuts
            .register_axis(NAME, modifiers, AxisDirection::Down);

        if flags.contains(ReconfigureFlags::INITIAL) && config.initial_zoom > 1. {
            self.target_zoom = config.initial_zoom;
        }
    }

    fn unloading(&mut self, ctx: &mut EffectsHandler) {
        self.release(ctx);
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
        let now = ctx.now();
        if self.zoom != self.target_zoom {
            let delta = self.last_present.map_or(Duration::ZERO, |last| now.saturating_sub(last));
            let diff = delta.as_secs_f64() / ANIMATION_TIME.as_secs_f64();
            if self.target_zoom > self.zoom {
                self.zoom = (self.zoom * (1. + diff).max(1.2)).min(self.target_zoom);
            } else {
                self.zoom = (self.zoom * (1. - diff).min(0.8)).max(self.target_zoom);
                if self.zoom == 1. {
                    trace!("magnifier closed, dropping its texture");
                    self.release(ctx);
                }
            }
        }
        self.last_present = (self.zoom != self.target_zoom).then_some(now);

        next.pre_paint_screen(ctx, data, time);

        if self.zoom != 1. {
            data.paint.add_rect(self.framed_area_at(ctx.cursor_pos()));
        }
    }

    fn paint_screen(
        &mut self,
        _ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<ScreenPaint, RenderError> {
        if self.zoom == 1. {
            return Ok(ScreenPaint::Passthrough);
        }
        // The scene goes to the screen as usual, the magnifier is drawn on top afterwards.
        Ok(ScreenPaint::Redirect(paint.target.clone()))
    }

    fn finish_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<(), RenderError> {
        let _span = tracy_client::span!("MagnifierEffect::finish_paint_screen");

        let pos = ctx.cursor_pos();
        let area = self.area_at(pos);
        let framed = expand_rect(area, FRAME_WIDTH);
        if !paint.screen.overlaps(framed) {
            return Ok(());
        }

        let scale = paint.target.scale();
        let size = Size::from((
            (f64::from(self.size.w) * scale).round() as i32,
            (f64::from(self.size.h) * scale).round() as i32,
        ));
        let spec = TextureSpec::new(size, TextureFormat::Rgba8)
            .with_filter(Filter::Linear)
            .with_wrap(Wrap::ClampToEdge);
        let texture = self.layer.ensure(paint.renderer, spec)?;

        paint
            .renderer
            .blit_to_texture(&paint.target, self.source_at(pos), texture)?;

        let draw = TextureDraw::new(texture, ShaderKind::Copy, to_f64(area))
            .with_region(Region::from_rect(area));
        paint.renderer.draw_texture(&paint.target, &draw)?;

        for rect in Self::frame_rects(area) {
            let draw = TextureDraw::solid(FRAME_COLOR, to_f64(rect)).with_region(Region::from_rect(rect));
            paint.renderer.draw_texture(&paint.target, &draw)?;
        }

        Ok(())
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        if self.zoom != self.target_zoom {
            self.repaint_area(ctx);
        }
        next.post_paint_screen(ctx);
    }

    fn screen_removed(&mut self, ctx: &mut EffectsHandler, _output: OutputId) {
        // Sized by the output scale, so the next frame reallocates on whatever screen it is.
        self.release(ctx);
    }

    fn handle_action(&mut self, ctx: &mut EffectsHandler, action: Action) -> bool {
        match action {
            Action::ZoomIn => self.zoom_in(ctx),
            Action::ZoomOut => self.zoom_out(ctx),
            Action::ZoomActualSize => self.toggle(ctx),
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
        if pos == old || self.zoom == 1. {
            return;
        }
        ctx.add_repaint_rect(self.framed_area_at(pos));
        ctx.add_repaint_rect(self.framed_area_at(old));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::paint::PaintMask;
    use crate::render_helpers::recording::{RecordingRenderer, RenderOp};
    use crate::render_helpers::RenderTarget;
    use crate::utils::rect;

    const MS: Duration = Duration::from_millis(1);

    fn setup() -> (EffectsHandler, MagnifierEffect) {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.magnifier.off = false;
        let mut effect = MagnifierEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);
        (ctx, effect)
    }

    fn frame(ctx: &mut EffectsHandler, effect: &mut MagnifierEffect, at: Duration) -> Region {
        ctx.clock.set_unadjusted(at);
        let mut data = ScreenPrePaintData {
            mask: PaintMask::empty(),
            paint: Region::new(),
            output: ctx.outputs.ids()[0],
            screen: rect(0, 0, 1920, 1080),
        };
        effect.pre_paint_screen(ctx, &mut data, FrameTime::new(at, None), Chain::empty());
        effect.post_paint_screen(ctx, Chain::empty());
        data.paint
    }

    #[test]
    fn zoom_steps_by_factor() {
        let (mut ctx, mut effect) = setup();
        assert!(!effect.is_active(&ctx));

        assert!(effect.handle_action(&mut ctx, Action::ZoomIn));
        assert!(effect.handle_action(&mut ctx, Action::ZoomIn));
        assert_relative_eq!(effect.target_zoom(), 1.44);
        assert!(effect.is_active(&ctx));

        assert!(effect.axis(&mut ctx, AxisDirection::Down));
        assert!(effect.axis(&mut ctx, AxisDirection::Down));
        assert!(effect.axis(&mut ctx, AxisDirection::Down));
        assert_eq!(effect.target_zoom(), 1.);
    }

    #[test]
    fn zoom_animates_and_paints_around_cursor() {
        let (mut ctx, mut effect) = setup();
        ctx.set_cursor_pos(Point::from((500., 400.)));
        effect.zoom_in(&mut ctx);
        effect.zoom_in(&mut ctx);

        // Every frame grows by at least the minimum step.
        let painted = frame(&mut ctx, &mut effect, Duration::ZERO);
        assert_relative_eq!(effect.zoom(), 1.2);
        assert_eq!(painted.bounding_rect(), rect(395, 295, 210, 210));

        frame(&mut ctx, &mut effect, 16 * MS);
        assert_relative_eq!(effect.zoom(), 1.44);
        assert!(effect.is_active(&ctx));

        // Shrinking back to 1 drops the texture.
        effect.layer = OffscreenLayer::new();
        effect.zoom_out(&mut ctx);
        effect.zoom_out(&mut ctx);
        frame(&mut ctx, &mut effect, 32 * MS);
        frame(&mut ctx, &mut effect, 48 * MS);
        assert_eq!(effect.zoom(), 1.);
        assert!(!effect.is_active(&ctx));
        assert!(frame(&mut ctx, &mut effect, 64 * MS).is_empty());
    }

    #[test]
    fn magnified_area_is_copied_then_framed() {
        let (mut ctx, mut effect) = setup();
        ctx.set_cursor_pos(Point::from((500., 400.)));
        effect.target_zoom = 2.;
        effect.zoom = 2.;

        let output = ctx.outputs.ids()[0];
        let mut renderer = RecordingRenderer::new();
        let target = RenderTarget::for_output(ctx.outputs.get(output).unwrap());
        let screen = target.geometry;
        let mut paint = PaintContext {
            renderer: &mut renderer,
            target: target.clone(),
            output,
            screen,
        };
        let data = ScreenPrePaintData {
            mask: PaintMask::empty(),
            paint: Region::from_rect(screen),
            output,
            screen,
        };

        let started = effect.paint_screen(&mut ctx, &mut paint, &data).unwrap();
        assert_eq!(started, ScreenPaint::Redirect(target));
        effect.finish_paint_screen(&mut ctx, &mut paint, &data).unwrap();

        let source = paint.target.kind;
        let texture = effect.layer.texture().unwrap();
        let ops = renderer.ops();
        assert!(ops.contains(&RenderOp::Blit {
            source,
            src: rect(450, 350, 100, 100),
            texture,
        }));

        let draws: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                RenderOp::DrawTexture { draw, .. } => Some(draw.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(draws.len(), 5);
        assert_eq!(draws[0].texture, Some(texture));
        assert_eq!(draws[0].dst, to_f64(rect(400, 300, 200, 200)));
        assert!(draws[1..].iter().all(|d| d.shader == ShaderKind::SolidColor(FRAME_COLOR)));
        assert_eq!(draws[1].dst, to_f64(rect(395, 295, 210, 5)));
        assert_eq!(draws[4].dst, to_f64(rect(600, 300, 5, 200)));
    }

    #[test]
    fn unmagnified_screen_passes_through() {
        let (mut ctx, mut effect) = setup();
        let output = ctx.outputs.ids()[0];
        let mut renderer = RecordingRenderer::new();
        let target = RenderTarget::for_output(ctx.outputs.get(output).unwrap());
        let screen = target.geometry;
        let mut paint = PaintContext {
            renderer: &mut renderer,
            target,
            output,
            screen,
        };
        let data = ScreenPrePaintData {
            mask: PaintMask::empty(),
            paint: Region::from_rect(screen),
            output,
            screen,
        };
        assert_eq!(
            effect.paint_screen(&mut ctx, &mut paint, &data).unwrap(),
            ScreenPaint::Passthrough
        );
    }

    #[test]
    fn cursor_motion_repaints_both_positions() {
        let (mut ctx, mut effect) = setup();
        effect.cursor_moved(&mut ctx, Point::from((10., 10.)), Point::from((0., 0.)));
        assert!(!ctx.has_pending_repaint());

        effect.zoom = 2.;
        effect.target_zoom = 2.;
        effect.cursor_moved(&mut ctx, Point::from((1000., 500.)), Point::from((200., 200.)));
        let repaint = ctx.take_repaints().unwrap();
        assert!(repaint.contains(&Region::from_rect(rect(895, 395, 210, 210))));
        assert!(repaint.contains(&Region::from_rect(rect(95, 95, 210, 210))));
    }
}

//! Fades windows in when they are mapped and out when they are closed.

use std::time::Duration;

use crate::animation::Curve;
use crate::effect::animation::{AnimationEngine, AnimationParams, Attribute, Fpx2};
use crate::effect::{Chain, Effect, EffectsHandler, MoveResize, PaintContext, ReconfigureFlags};
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowPrePaintData};
use crate::utils::region::Region;
use crate::window::{EffectWindow, WindowId};

pub const NAME: &str = "fade";

pub struct FadeEffect {
    engine: AnimationEngine,
    open: Duration,
    close: Duration,
}

impl FadeEffect {
    pub fn new() -> Self {
        Self {
            engine: AnimationEngine::new(NAME),
            open: Duration::ZERO,
            close: Duration::ZERO,
        }
    }

    fn wants_fade(window: &EffectWindow) -> bool {
        !window.is_desktop() && !window.is_special()
    }
}

impl Default for FadeEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for FadeEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        60
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, _flags: ReconfigureFlags) {
        let config = &ctx.config.animations;
        self.open = Duration::from_millis(u64::from(config.window_open_ms));
        self.close = Duration::from_millis(u64::from(config.window_close_ms));
    }

    fn is_active(&self, ctx: &EffectsHandler) -> bool {
        self.engine.is_active(ctx)
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        self.engine.pre_paint_screen(ctx);
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
        self.engine.pre_paint_window(ctx, window, data);
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
        let mut region = region.clone();
        self.engine
            .paint_window(ctx, window, &mut region, data, |_, _, _, _| ());
        next.paint_window(ctx, paint, window, mask, &region, data);
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        for ended in self.engine.post_paint_screen(ctx) {
            trace!("fade of {} ended", ended.window);
        }
        next.post_paint_screen(ctx);
        self.engine.release_zombies(ctx);
    }

    fn window_added(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if !Self::wants_fade(window) || self.open.is_zero() {
            return;
        }

        let params = AnimationParams::new(Attribute::Opacity, self.open, Fpx2::splat(1.))
            .from(Fpx2::splat(0.))
            .curve(Curve::OutCubic);
        self.engine.animate(ctx, window, params);
    }

    fn window_closed(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if Self::wants_fade(window) && !self.close.is_zero() && window.is_visible() {
            let params = AnimationParams::new(Attribute::Opacity, self.close, Fpx2::splat(0.))
                .curve(Curve::InCubic)
                .keep_alive(true);
            self.engine.animate(ctx, window, params);
        }
        self.engine.window_closed(ctx, window);
    }

    fn window_deleted(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        self.engine.window_deleted(ctx, window);
    }

    fn window_move_resize(
        &mut self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        _event: MoveResize,
    ) {
        self.engine.window_geometry_changed(ctx, window);
    }
}

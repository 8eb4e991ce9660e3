use std::mem;
use std::time::Duration;

use super::Glaze;
use crate::backend::{Backend, RenderResult};
use crate::effect::{PaintContext, WindowPaintJob};
use crate::output::{OutputId, RedrawState};
use crate::paint::{
    FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowPrePaintData, WindowQuad,
};
use crate::render_helpers::{RenderTarget, Renderer};
use crate::utils::{get_monotonic_time, is_empty, to_f64};
use crate::utils::region::Region;
use crate::window::EffectWindow;

/// Damage bookkeeping of one output.
#[derive(Debug, Default)]
pub struct FrameStats {
    damage: Region,
    full_damage: bool,
    /// Damage the last frame started from.
    pub last_damage: Region,
    /// Area the last frame repainted after effects extended it.
    pub last_paint: Region,
    pub frames: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            full_damage: true,
            ..Self::default()
        }
    }

    pub fn add_damage(&mut self, damage: &Region) {
        self.damage.union(damage);
    }

    pub fn damage_all(&mut self) {
        self.full_damage = true;
    }

    pub fn has_damage(&self) -> bool {
        self.full_damage || !self.damage.is_empty()
    }

    /// Pending damage, not counting a pending full repaint.
    pub fn pending(&self) -> Region {
        self.damage.clone()
    }

    fn take(&mut self) -> (Region, bool) {
        (
            mem::take(&mut self.damage),
            mem::take(&mut self.full_damage),
        )
    }
}

impl Glaze {
    pub fn queue_redraw(&mut self, output: OutputId) {
        let Some(state) = self.ctx.outputs.get_mut(output) else {
            return;
        };
        if state.is_placeholder() {
            return;
        }

        state.redraw_state = mem::take(&mut state.redraw_state).queue_redraw();
    }

    pub fn queue_redraw_all(&mut self) {
        for output in self.ctx.outputs.ids() {
            if let Some(frame) = self.frames.get_mut(&output) {
                frame.damage_all();
            }
            self.queue_redraw(output);
        }
    }

    pub fn redraw_queued_outputs(&mut self, backend: &mut Backend) {
        let _span = tracy_client::span!("Glaze::redraw_queued_outputs");

        while let Some(output) = self
            .ctx
            .outputs
            .iter()
            .find(|o| matches!(o.redraw_state, RedrawState::Queued))
            .map(|o| o.id())
        {
            trace!("redrawing output {output}");
            self.redraw(backend, output);
        }
    }

    fn redraw(&mut self, backend: &mut Backend, output: OutputId) {
        let _span = tracy_client::span!("Glaze::redraw");

        let now = self.ctx.clock.now_unadjusted();
        let monitors_active = self.monitors_active;
        let Some(state) = self.ctx.outputs.get_mut(output) else {
            return;
        };
        if !monitors_active {
            state.redraw_state = RedrawState::Idle;
            return;
        }

        let target_presentation_time = state.frame_clock.next_presentation_time(now);

        // Everything in this frame sees the time it will be shown at.
        self.ctx.clock.set_unadjusted(target_presentation_time);

        let res = backend.render(self, output, target_presentation_time);

        let Some(state) = self.ctx.outputs.get_mut(output) else {
            return;
        };
        match res {
            RenderResult::Submitted => (),
            RenderResult::NoDamage if state.unfinished_animations_remain => {
                state.redraw_state = RedrawState::Queued;
            }
            RenderResult::NoDamage | RenderResult::Skipped => {
                state.redraw_state = RedrawState::Idle;
            }
        }
    }

    /// Paints one frame of an output. Called by the backend.
    pub fn render(
        &mut self,
        renderer: &mut dyn Renderer,
        output: OutputId,
        target_presentation_time: Duration,
    ) -> RenderResult {
        let _span = tracy_client::span!("Glaze::render");

        let Some(state) = self.ctx.outputs.get(output) else {
            return RenderResult::Skipped;
        };
        let screen = state.geometry();
        let render_target = RenderTarget::for_output(state);
        let time = FrameTime::new(target_presentation_time, state.last_frame_time);

        if let Some(watchdog) = &self.watchdog {
            watchdog.frame_started(get_monotonic_time());
        }

        for texture in self.ctx.take_garbage() {
            renderer.free_texture(texture);
        }

        self.flush_repaints();
        let Some(frame) = self.frames.get_mut(&output) else {
            return RenderResult::Skipped;
        };
        let (pending, full) = frame.take();
        let full = full || self.ctx.config.debug.disable_damage_tracking;
        let damage = if full {
            Region::from_rect(screen)
        } else {
            pending.intersected_rect(screen)
        };

        self.effects.refresh_active(&self.ctx);

        let mut screen_data = ScreenPrePaintData {
            mask: if full {
                PaintMask::empty()
            } else {
                PaintMask::SCREEN_REGION
            },
            paint: damage.clone(),
            output,
            screen,
        };
        self.effects
            .chain()
            .pre_paint_screen(&mut self.ctx, &mut screen_data, time);

        if screen_data
            .mask
            .intersects(PaintMask::SCREEN_TRANSFORMED | PaintMask::SCREEN_WITH_TRANSFORMED_WINDOWS)
            || !screen_data.mask.contains(PaintMask::SCREEN_REGION)
        {
            screen_data.paint = Region::from_rect(screen);
        }

        // Pre-paint every window that takes part in this frame, bottom first. Whole-screen
        // effects get to see windows of all desktops, minimized ones included.
        let desktop = self.ctx.current_desktop();
        let everything = self.ctx.has_active_fullscreen_effect();
        let windows: Vec<EffectWindow> = self
            .ctx
            .windows
            .stacking_order()
            .filter(|w| {
                if everything {
                    !is_empty(w.geometry)
                } else {
                    w.is_visible() && w.is_on_desktop(desktop)
                }
            })
            .cloned()
            .collect();

        let mut phases = Vec::with_capacity(windows.len());
        for window in windows {
            let translucent = window.opacity < 1. || window.decoration_has_alpha;
            let mut data = WindowPrePaintData {
                mask: if translucent {
                    PaintMask::WINDOW_TRANSLUCENT
                } else {
                    PaintMask::WINDOW_OPAQUE
                },
                paint: Region::new(),
                opaque: if translucent {
                    Region::new()
                } else {
                    window.global_opaque()
                },
            };
            self.effects
                .chain()
                .pre_paint_window(&mut self.ctx, &window, &mut data, time);

            screen_data.paint.union(&data.paint.intersected_rect(screen));
            phases.push((window, data));
        }

        // Clip each window by the opaque windows above it, topmost first.
        let mut covered = Region::new();
        let mut jobs = Vec::with_capacity(phases.len());
        for (window, pre) in phases.into_iter().rev() {
            let transformed = pre.mask.contains(PaintMask::WINDOW_TRANSFORMED);
            let mut region = if transformed {
                screen_data.paint.clone()
            } else {
                screen_data
                    .paint
                    .intersected_rect(self.ctx.expanded_geometry(&window))
            };
            region.subtract(&covered);

            if !pre
                .mask
                .intersects(PaintMask::WINDOW_TRANSLUCENT | PaintMask::WINDOW_TRANSFORMED)
            {
                covered.union(&pre.opaque);
            }

            if region.is_empty() {
                continue;
            }

            let quads = vec![WindowQuad::from_rect(to_f64(window.rect()))];
            let data = WindowPaintData::new(window.opacity, quads);
            jobs.push(WindowPaintJob {
                window,
                mask: pre.mask | (screen_data.mask & PaintMask::SCREEN_TRANSFORMED),
                region,
                data,
            });
        }
        jobs.reverse();

        let res = if screen_data.paint.is_empty() {
            RenderResult::NoDamage
        } else {
            let background = screen_data.paint.subtracted(&covered);
            let mut paint = PaintContext {
                renderer,
                target: render_target,
                output,
                screen,
            };
            self.effects.paint_screen(
                &mut self.ctx,
                &mut paint,
                &screen_data,
                &background,
                &jobs,
            );
            RenderResult::Submitted
        };

        self.effects.chain().post_paint_screen(&mut self.ctx);
        self.handle_deleted_windows();

        for delay in self.ctx.take_repaint_requests() {
            self.schedule_repaint(delay);
        }

        if let Some(frame) = self.frames.get_mut(&output) {
            frame.last_damage = damage;
            frame.last_paint = screen_data.paint;
            frame.frames += 1;
        }

        self.flush_repaints();
        let unfinished = self.frames.get(&output).is_some_and(|f| f.has_damage());
        if let Some(state) = self.ctx.outputs.get_mut(output) {
            state.last_frame_time = Some(target_presentation_time);
            state.unfinished_animations_remain = unfinished;
        }

        res
    }

    /// The frame submitted for `output` was shown at `presentation_time`.
    pub fn on_vblank(&mut self, output: OutputId, presentation_time: Duration) {
        let _span = tracy_client::span!("Glaze::on_vblank");

        if let Some(watchdog) = &self.watchdog {
            watchdog.pet(get_monotonic_time());
        }

        let Some(state) = self.ctx.outputs.get_mut(output) else {
            return;
        };

        state.frame_clock.presented(presentation_time);

        let redraw_needed = match mem::take(&mut state.redraw_state) {
            RedrawState::WaitingForVBlank { redraw_needed } => redraw_needed,
            other => {
                error!("vblank on {output} in unexpected redraw state {other:?}");
                matches!(other, RedrawState::Queued)
            }
        };

        if redraw_needed || state.unfinished_animations_remain {
            state.redraw_state = RedrawState::Queued;
        }
    }
}

//! Effects and the ordered chain they are called through.
//!
//! Every frame runs three phases over the chain. Pre-paint and post-paint go in chain order with
//! each effect calling through to the [`Chain`] continuation. Painting a screen lets each effect
//! redirect the scene into an offscreen target before the windows are painted, then finishes the
//! redirections in reverse. Painting a window nests effects the same way as pre-paint, with the
//! base scene renderer at the end of the chain.

use bitflags::bitflags;
use glaze_config::{Action, ScreenEdge};
use smithay::utils::{Logical, Point, Rectangle};

use crate::input::shortcuts::{ActionEvent, AxisDirection};
use crate::input::togglable_state::ToggleAction;
use crate::input::{InputEvent, KeyboardEvent};
use crate::output::OutputId;
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowPrePaintData};
use crate::render_helpers::{RenderError, RenderTarget, Renderer};
use crate::utils::region::Region;
use crate::window::{EffectWindow, WindowId};

pub mod animation;
pub mod handler;
pub use handler::{CursorImage, CursorShape, EffectsHandler};

bitflags! {
    /// What changed when effects are asked to reconfigure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReconfigureFlags: u32 {
        /// The effect was just loaded.
        const INITIAL = 1;
        /// The configuration file changed.
        const CONFIG = 1 << 1;
        const OUTPUTS = 1 << 2;
        const ALL = Self::INITIAL.bits() | Self::CONFIG.bits() | Self::OUTPUTS.bits();
    }
}

/// Capabilities other parts of the compositor may ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Blur,
    ScreenMagnification,
}

/// How an effect takes part in painting a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenPaint {
    Passthrough,
    /// Paint the rest of the scene into this target. The effect composites it in
    /// [`Effect::finish_paint_screen`].
    Redirect(RenderTarget),
    /// The effect paints the screen by itself, windows are skipped.
    Replace,
}

/// Interactive move or resize of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveResize {
    Start { resize: bool },
    /// Geometry changed during the operation.
    Step { old: Rectangle<i32, Logical> },
    Finish,
    /// Geometry jumped outside of an interactive operation, e.g. on maximize.
    Jump { old: Rectangle<i32, Logical> },
}

/// Rendering state of the screen currently being painted.
pub struct PaintContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    /// Where the scene currently goes. Redirecting effects swap it.
    pub target: RenderTarget,
    pub output: OutputId,
    /// Logical geometry of the output.
    pub screen: Rectangle<i32, Logical>,
}

impl PaintContext<'_> {
    /// Clears the part of the screen no opaque window covers.
    pub fn clear(&mut self, region: &Region) {
        if region.is_empty() {
            return;
        }

        if let Err(err) = self.renderer.clear(&self.target, region, [0., 0., 0., 1.]) {
            warn!("error clearing the background: {err}");
        }
    }

    /// Draws a window with the base renderer, the end of every paint chain.
    pub fn draw_window(&mut self, window: &EffectWindow, data: &WindowPaintData, region: &Region) {
        if region.is_empty() {
            return;
        }

        if let Err(err) = self.renderer.draw_window(&self.target, window, data, region) {
            warn!("error drawing {}: {err}", window.id);
        }
    }
}

/// A pluggable participant in painting and input handling.
///
/// Every callback has a default that does nothing or passes straight through, so effects only
/// implement what they need.
pub trait Effect {
    /// Unique name, used for logging and for routing shortcuts back to the effect.
    fn name(&self) -> &'static str;

    /// Chain position. Lower runs earlier and paints further outside.
    fn requested_position(&self) -> i32;

    /// Whether the effect can work with this renderer and these outputs.
    fn supported(&self, _ctx: &EffectsHandler, _renderer: &dyn Renderer) -> bool {
        true
    }

    fn reconfigure(&mut self, _ctx: &mut EffectsHandler, _flags: ReconfigureFlags) {}

    /// Called right before the effect is dropped. Textures go back through
    /// [`EffectsHandler::release_texture`].
    fn unloading(&mut self, _ctx: &mut EffectsHandler) {}

    /// Whether the effect takes part in the current frame.
    fn is_active(&self, _ctx: &EffectsHandler) -> bool {
        true
    }

    fn provides(&self, _feature: Feature) -> bool {
        false
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
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
        next.pre_paint_window(ctx, window, data, time);
    }

    fn paint_screen(
        &mut self,
        _ctx: &mut EffectsHandler,
        _paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<ScreenPaint, RenderError> {
        Ok(ScreenPaint::Passthrough)
    }

    /// Composites what was redirected in [`Effect::paint_screen`] into `paint.target`.
    fn finish_paint_screen(
        &mut self,
        _ctx: &mut EffectsHandler,
        _paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
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
        next.paint_window(ctx, paint, window, mask, region, data);
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        next.post_paint_screen(ctx);
    }

    fn window_added(&mut self, _ctx: &mut EffectsHandler, _window: &EffectWindow) {}

    /// The client closed the window. Take a keep-alive reference to keep painting it.
    fn window_closed(&mut self, _ctx: &mut EffectsHandler, _window: &EffectWindow) {}

    fn window_damaged(&mut self, _ctx: &mut EffectsHandler, _window: &EffectWindow, _damage: &Region) {}

    /// The window is gone for good, drop everything kept about it.
    fn window_deleted(&mut self, _ctx: &mut EffectsHandler, _window: WindowId) {}

    fn window_move_resize(
        &mut self,
        _ctx: &mut EffectsHandler,
        _window: &EffectWindow,
        _event: MoveResize,
    ) {
    }

    fn screen_added(&mut self, _ctx: &mut EffectsHandler, _output: OutputId) {}

    fn screen_removed(&mut self, _ctx: &mut EffectsHandler, _output: OutputId) {}

    /// A global shortcut registered by this effect fired. Returns whether it was handled.
    fn handle_action(&mut self, _ctx: &mut EffectsHandler, _action: Action) -> bool {
        false
    }

    /// A gesture or touch border registered by this effect made progress or ended.
    fn gesture(&mut self, _ctx: &mut EffectsHandler, _action: ToggleAction, _event: ActionEvent) {}

    /// The pointer hit a screen edge reserved by this effect.
    fn border_activated(&mut self, _ctx: &mut EffectsHandler, _edge: ScreenEdge) -> bool {
        false
    }

    fn axis(&mut self, _ctx: &mut EffectsHandler, _direction: AxisDirection) -> bool {
        false
    }

    /// Key event while this effect holds the keyboard grab.
    fn grabbed_keyboard_event(&mut self, _ctx: &mut EffectsHandler, _event: &KeyboardEvent) {}

    /// Pointer event while this effect intercepts the mouse.
    fn intercepted_pointer_event(&mut self, _ctx: &mut EffectsHandler, _event: &InputEvent) {}

    fn touch_down(
        &mut self,
        _ctx: &mut EffectsHandler,
        _id: i32,
        _pos: Point<f64, Logical>,
        _time: u32,
    ) -> bool {
        false
    }

    fn touch_motion(
        &mut self,
        _ctx: &mut EffectsHandler,
        _id: i32,
        _pos: Point<f64, Logical>,
        _time: u32,
    ) -> bool {
        false
    }

    fn touch_up(&mut self, _ctx: &mut EffectsHandler, _id: i32, _time: u32) -> bool {
        false
    }

    fn touch_cancel(&mut self, _ctx: &mut EffectsHandler) {}

    /// The pointer moved, whoever consumed the motion.
    fn cursor_moved(
        &mut self,
        _ctx: &mut EffectsHandler,
        _pos: Point<f64, Logical>,
        _old: Point<f64, Logical>,
    ) {
    }

    /// Keyboard focus or the text caret moved to this rectangle.
    fn focus_rect_changed(&mut self, _ctx: &mut EffectsHandler, _rect: Rectangle<i32, Logical>) {}
}

pub struct Slot {
    effect: Box<dyn Effect>,
    position: i32,
    active: bool,
}

/// The effects after the current one, ending in the base scene.
pub struct Chain<'a> {
    slots: &'a mut [Slot],
}

impl<'a> Chain<'a> {
    fn new(slots: &'a mut [Slot]) -> Self {
        Self { slots }
    }

    /// Chain without effects, for painting straight through the base scene.
    pub fn empty() -> Chain<'static> {
        Chain { slots: &mut [] }
    }

    fn split(self) -> Option<(&'a mut (dyn Effect + 'static), Chain<'a>)> {
        let mut slots = self.slots;
        loop {
            let (first, rest) = std::mem::take(&mut slots).split_first_mut()?;
            if first.active {
                return Some((first.effect.as_mut(), Chain::new(rest)));
            }
            slots = rest;
        }
    }

    pub fn pre_paint_screen(
        self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
    ) {
        if let Some((effect, next)) = self.split() {
            effect.pre_paint_screen(ctx, data, time, next);
        }
    }

    pub fn pre_paint_window(
        self,
        ctx: &mut EffectsHandler,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        time: FrameTime,
    ) {
        if let Some((effect, next)) = self.split() {
            effect.pre_paint_window(ctx, window, data, time, next);
        }
    }

    pub fn paint_window(
        self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        match self.split() {
            Some((effect, next)) => {
                effect.paint_window(ctx, paint, window, mask, region, data, next)
            }
            None => paint.draw_window(window, data, region),
        }
    }

    pub fn post_paint_screen(self, ctx: &mut EffectsHandler) {
        if let Some((effect, next)) = self.split() {
            effect.post_paint_screen(ctx, next);
        }
    }
}

/// A window ready to be painted, after pre-paint and clipping.
#[derive(Debug, Clone)]
pub struct WindowPaintJob {
    pub window: EffectWindow,
    pub mask: PaintMask,
    pub region: Region,
    pub data: WindowPaintData,
}

/// Installed effects in chain order.
#[derive(Default)]
pub struct EffectChain {
    slots: Vec<Slot>,
    unsupported: Vec<&'static str>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an effect by its position, after effects with an equal one.
    ///
    /// Unsupported effects are never inserted and never receive any callback.
    pub fn load(
        &mut self,
        ctx: &mut EffectsHandler,
        renderer: &dyn Renderer,
        mut effect: Box<dyn Effect>,
    ) -> bool {
        let name = effect.name();
        if self.is_loaded(name) {
            debug!("effect {name} is already loaded");
            return false;
        }

        if !effect.supported(ctx, renderer) {
            if !self.unsupported.contains(&name) {
                warn!("effect {name} is not supported, not loading it");
                self.unsupported.push(name);
            }
            return false;
        }

        effect.reconfigure(ctx, ReconfigureFlags::ALL);

        let position = effect.requested_position();
        let idx = self.slots.partition_point(|s| s.position <= position);
        debug!("loaded effect {name} at position {position}");
        self.slots.insert(
            idx,
            Slot {
                effect,
                position,
                active: false,
            },
        );
        self.unsupported.retain(|n| *n != name);
        true
    }

    pub fn unload(&mut self, ctx: &mut EffectsHandler, name: &str) -> bool {
        let Some(idx) = self.slots.iter().position(|s| s.effect.name() == name) else {
            return false;
        };

        let mut slot = self.slots.remove(idx);
        slot.effect.unloading(ctx);
        let name = slot.effect.name();
        ctx.effect_unloaded(name);
        debug!("unloaded effect {name}");
        true
    }

    /// Unloads effects that stopped being supported, e.g. after outputs grew too large.
    pub fn recheck_support(&mut self, ctx: &mut EffectsHandler, renderer: &dyn Renderer) {
        let unsupported: Vec<_> = self
            .slots
            .iter()
            .filter(|s| !s.effect.supported(ctx, renderer))
            .map(|s| s.effect.name())
            .collect();

        for name in unsupported {
            warn!("effect {name} is no longer supported, unloading it");
            self.unload(ctx, name);
            self.unsupported.push(name);
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.effect.name() == name)
    }

    pub fn was_unsupported(&self, name: &str) -> bool {
        self.unsupported.iter().any(|n| *n == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.effect.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Effect + 'static)> {
        self.slots
            .iter_mut()
            .find(|s| s.effect.name() == name)
            .map(|s| s.effect.as_mut())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Effect + 'static)> + '_ {
        self.slots.iter_mut().map(|s| s.effect.as_mut())
    }

    pub fn provides(&self, feature: Feature) -> bool {
        self.slots.iter().any(|s| s.effect.provides(feature))
    }

    /// Latches which effects take part in the coming frame.
    pub fn refresh_active(&mut self, ctx: &EffectsHandler) {
        for slot in &mut self.slots {
            slot.active = slot.effect.is_active(ctx);
        }
    }

    pub fn has_active_effects(&self) -> bool {
        self.slots.iter().any(|s| s.active)
    }

    pub fn active_names(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.effect.name())
            .collect()
    }

    pub fn chain(&mut self) -> Chain {
        Chain::new(&mut self.slots)
    }

    pub fn reconfigure(&mut self, ctx: &mut EffectsHandler, flags: ReconfigureFlags) {
        let _span = tracy_client::span!("EffectChain::reconfigure");
        for slot in &mut self.slots {
            slot.effect.reconfigure(ctx, flags);
        }
    }

    /// Paints one screen: screen-level redirections, the windows, then the redirections unwound.
    ///
    /// `background` is cleared in the innermost target before the windows are painted.
    pub fn paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        data: &ScreenPrePaintData,
        background: &Region,
        jobs: &[WindowPaintJob],
    ) {
        let _span = tracy_client::span!("EffectChain::paint_screen");

        // Effects that redirected, with the target they have to composite into.
        let mut redirected: Vec<(usize, RenderTarget)> = Vec::new();
        let mut replaced = false;

        for idx in 0..self.slots.len() {
            if !self.slots[idx].active {
                continue;
            }

            let outer = paint.target.clone();
            match self.slots[idx].effect.paint_screen(ctx, paint, data) {
                Ok(ScreenPaint::Passthrough) => (),
                Ok(ScreenPaint::Redirect(target)) => {
                    redirected.push((idx, outer));
                    paint.target = target;
                }
                Ok(ScreenPaint::Replace) => {
                    redirected.push((idx, outer));
                    replaced = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        "{} could not start painting the screen, painting without it: {err}",
                        self.slots[idx].effect.name()
                    );
                    paint.target = outer;
                }
            }
        }

        if !replaced {
            paint.clear(background);
            self.paint_windows(0, ctx, paint, jobs);
        }

        while let Some((idx, outer)) = redirected.pop() {
            paint.target = outer;
            let slot = &mut self.slots[idx];
            if let Err(err) = slot.effect.finish_paint_screen(ctx, paint, data) {
                warn!(
                    "{} failed to finish painting, redrawing directly: {err}",
                    slot.effect.name()
                );
                paint.clear(background);
                self.paint_windows(idx + 1, ctx, paint, jobs);
            }
        }
    }

    fn paint_windows(
        &mut self,
        from: usize,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        jobs: &[WindowPaintJob],
    ) {
        for job in jobs {
            let mut data = job.data.clone();
            Chain::new(&mut self.slots[from..]).paint_window(
                ctx,
                paint,
                &job.window,
                job.mask,
                &job.region,
                &mut data,
            );
        }
    }
}

//! Overview of all windows on the current desktop, spread out so none overlap.

use std::collections::HashMap;

use glaze_config::{Action, OverviewLayout, ScreenEdge};
use smithay::backend::input::{ButtonState, KeyState};
use smithay::input::keyboard::Keysym;
use smithay::utils::{Logical, Point, Rectangle, Size};

use super::expo_layout::{self, ExpoCell};
use super::scene_view::SceneState;
use crate::effect::{Chain, Effect, EffectsHandler, PaintContext, ReconfigureFlags, ScreenPaint};
use crate::input::gestures::{PinchDirection, SwipeDirection};
use crate::input::shortcuts::ActionEvent;
use crate::input::togglable_state::{StateChange, ToggleAction};
use crate::input::{InputEvent, KeyboardEvent, BTN_LEFT};
use crate::output::{Edge, OutputId};
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowQuad};
use crate::render_helpers::{RenderError, TextureDraw};
use crate::utils::region::Region;
use crate::utils::{center, expand_rect, round_out, to_f64};
use crate::window::{EffectWindow, WindowId};

pub const NAME: &str = "overview";

/// Space kept free around the thumbnails of each screen.
const MARGIN: i32 = 40;
const DIM: f32 = 0.5;
const HIGHLIGHT_WIDTH: i32 = 6;
const HIGHLIGHT_COLOR: [f32; 4] = [0.3, 0.3, 0.3, 0.3];

type Slots = Vec<(WindowId, Rectangle<i32, Logical>)>;

pub struct OverviewEffect {
    scene: SceneState,
    layout_mode: OverviewLayout,
    ignore_minimized: bool,
    border_activate: Vec<ScreenEdge>,
    slots: HashMap<OutputId, Slots>,
    selected: Option<WindowId>,
    /// Thumbnail under the left button press, `Some(None)` for empty space.
    pressed: Option<Option<WindowId>>,
    /// Thumbnail each touch point went down on.
    touches: HashMap<i32, Option<WindowId>>,
}

impl OverviewEffect {
    pub fn new() -> Self {
        Self {
            scene: SceneState::new(NAME),
            layout_mode: OverviewLayout::Natural,
            ignore_minimized: false,
            border_activate: Vec::new(),
            slots: HashMap::new(),
            selected: None,
            pressed: None,
            touches: HashMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.scene.views.is_running()
    }

    pub fn progress(&self) -> f64 {
        self.scene.progress()
    }

    pub fn selected(&self) -> Option<WindowId> {
        self.selected
    }

    pub fn slot(&self, window: WindowId) -> Option<Rectangle<i32, Logical>> {
        self.slots
            .values()
            .flatten()
            .find(|(id, _)| *id == window)
            .map(|(_, r)| *r)
    }

    pub fn toggle(&mut self, ctx: &mut EffectsHandler) {
        let change = self.scene.state.toggle();
        self.state_changed(ctx, change);
    }

    pub fn close(&mut self, ctx: &mut EffectsHandler) {
        let change = self.scene.state.deactivate();
        self.state_changed(ctx, change);
    }

    fn apply_gesture(
        &mut self,
        ctx: &mut EffectsHandler,
        action: ToggleAction,
        event: ActionEvent,
    ) -> Option<StateChange> {
        let change = self.scene.state.handle_gesture(action, event);
        self.state_changed(ctx, change);
        change
    }

    fn state_changed(&mut self, ctx: &mut EffectsHandler, change: Option<StateChange>) {
        if self.scene.sync(ctx) {
            self.relayout(ctx);
        }

        match change {
            // Starting the views failed and the state was reverted.
            Some(StateChange::Activated) if !self.scene.state.is_visible() => (),
            Some(StateChange::Activated) => {
                debug!("overview activated");
                if self.selected.is_none() {
                    self.selected = ctx.active_window().filter(|id| self.slot(*id).is_some());
                }
            }
            Some(StateChange::Deactivated) => {
                debug!("overview deactivated");
                self.pressed = None;
                self.touches.clear();
            }
            None => (),
        }
    }

    fn is_shown(&self, window: &EffectWindow, desktop: u32) -> bool {
        !window.deleted
            && !window.is_dock()
            && !window.is_desktop()
            && !window.is_special()
            && window.is_on_desktop(desktop)
            && !(self.ignore_minimized && window.is_minimized())
            && window.geometry.size.w > 0
            && window.geometry.size.h > 0
    }

    fn relayout(&mut self, ctx: &mut EffectsHandler) {
        let _span = tracy_client::span!("OverviewEffect::relayout");

        let desktop = ctx.current_desktop();
        let views: Vec<_> = self
            .scene
            .views
            .views()
            .map(|v| (v.output(), v.geometry()))
            .collect();

        self.slots.clear();
        for (output, geometry) in views {
            let cells: Vec<_> = ctx
                .windows
                .stacking_order()
                .filter(|w| self.is_shown(w, desktop))
                .filter(|w| ctx.outputs.output_at(center(w.geometry).to_f64()) == Some(output))
                .map(|w| ExpoCell {
                    window: w.id,
                    natural: w.geometry,
                })
                .collect();
            let area = expand_rect(geometry, -MARGIN);
            self.slots
                .insert(output, expo_layout::layout(self.layout_mode, area, &cells));
        }

        if let Some(selected) = self.selected {
            if self.slot(selected).is_none() {
                self.selected = None;
            }
        }
        self.scene.views.schedule_repaint_all(ctx);
    }

    fn thumbnail_at(&self, output: OutputId, pos: Point<f64, Logical>) -> Option<WindowId> {
        self.slots
            .get(&output)?
            .iter()
            .rev()
            .find(|(_, r)| to_f64(*r).contains(pos))
            .map(|(id, _)| *id)
    }

    fn activate(&mut self, ctx: &mut EffectsHandler, window: WindowId) {
        debug!("overview activating {window}");
        ctx.activate_window(window);
        self.close(ctx);
    }

    fn select(&mut self, ctx: &mut EffectsHandler, window: Option<WindowId>) {
        if window.is_some() && window != self.selected {
            self.selected = window;
            self.scene.views.schedule_repaint_all(ctx);
        }
    }

    /// Moves the selection to the nearest thumbnail in a direction, crossing to the next screen
    /// when there is none on this one.
    fn select_towards(&mut self, ctx: &mut EffectsHandler, edge: Edge) {
        let Some(output) = self.scene.views.active_view() else {
            return;
        };
        let slots = self.slots.get(&output).map(Vec::as_slice).unwrap_or_default();

        let current = self
            .selected
            .and_then(|id| slots.iter().find(|(w, _)| *w == id))
            .map(|(_, r)| center(*r));
        let Some(from) = current else {
            let first = slots.first().map(|(id, _)| *id);
            self.select(ctx, first);
            return;
        };

        if let Some(next) = nearest(slots, from, Some(edge)) {
            self.select(ctx, Some(next));
            return;
        }

        if let Some(next_output) = self.scene.views.view_towards(edge) {
            self.scene.views.activate_view(next_output);
            let slots = self.slots.get(&next_output).map(Vec::as_slice).unwrap_or_default();
            let next = nearest(slots, from, None);
            self.select(ctx, next);
        }
    }
}

impl Default for OverviewEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// Thumbnail whose center is closest to `from`, only looking past `edge` if given.
fn nearest(
    slots: &[(WindowId, Rectangle<i32, Logical>)],
    from: Point<i32, Logical>,
    edge: Option<Edge>,
) -> Option<WindowId> {
    slots
        .iter()
        .map(|(id, r)| (*id, center(*r)))
        .filter(|(_, c)| match edge {
            Some(Edge::Left) => c.x < from.x,
            Some(Edge::Right) => c.x > from.x,
            Some(Edge::Top) => c.y < from.y,
            Some(Edge::Bottom) => c.y > from.y,
            None => true,
        })
        .min_by_key(|(_, c)| {
            let dx = i64::from(c.x - from.x);
            let dy = i64::from(c.y - from.y);
            dx * dx + dy * dy
        })
        .map(|(id, _)| id)
}

fn lerp_rect(
    a: Rectangle<i32, Logical>,
    b: Rectangle<i32, Logical>,
    t: f64,
) -> Rectangle<f64, Logical> {
    let a = to_f64(a);
    let b = to_f64(b);
    let lerp = |x: f64, y: f64| x + (y - x) * t;
    Rectangle::new(
        Point::from((lerp(a.loc.x, b.loc.x), lerp(a.loc.y, b.loc.y))),
        Size::from((lerp(a.size.w, b.size.w), lerp(a.size.h, b.size.h))),
    )
}

/// Paint data drawing the whole window into `dst`.
fn thumbnail_data(window: &EffectWindow, dst: Rectangle<f64, Logical>) -> WindowPaintData {
    let rect = to_f64(window.rect());
    let mut data = WindowPaintData::new(window.opacity, vec![WindowQuad::from_rect(rect)]);
    data.scale(dst.size.w / rect.size.w, dst.size.h / rect.size.h);
    let pos = to_f64(window.geometry).loc;
    data.translate(dst.loc.x - pos.x, dst.loc.y - pos.y);
    data
}

fn draw_scene(
    ctx: &EffectsHandler,
    paint: &mut PaintContext,
    geometry: Rectangle<i32, Logical>,
    slots: &[(WindowId, Rectangle<i32, Logical>)],
    selected: Option<WindowId>,
    progress: f64,
) -> Result<(), RenderError> {
    let _span = tracy_client::span!("OverviewEffect::draw_scene");

    let clip = Region::from_rect(geometry);
    let quads = |w: &EffectWindow| vec![WindowQuad::from_rect(to_f64(w.rect()))];

    for window in ctx.windows.stacking_order().filter(|w| w.is_desktop()) {
        let data = WindowPaintData::new(window.opacity, quads(window));
        paint.draw_window(window, &data, &clip);
    }

    let dim = DIM * progress as f32;
    if dim > 0. {
        let draw = TextureDraw::solid([0., 0., 0., dim], to_f64(geometry)).with_region(clip.clone());
        paint.renderer.draw_texture(&paint.target, &draw)?;
    }

    if progress < 1. {
        for window in ctx.windows.stacking_order().filter(|w| w.is_dock()) {
            let mut data = WindowPaintData::new(window.opacity, quads(window));
            data.multiply_opacity(1. - progress);
            paint.draw_window(window, &data, &clip);
        }
    }

    for window in ctx.windows.stacking_order() {
        let Some((_, slot)) = slots.iter().find(|(id, _)| *id == window.id) else {
            continue;
        };
        let dst = lerp_rect(window.geometry, *slot, progress);

        if selected == Some(window.id) && progress > 0. {
            let frame = expand_rect(round_out(dst), HIGHLIGHT_WIDTH);
            let color = HIGHLIGHT_COLOR.map(|c| c * progress as f32);
            let draw = TextureDraw::solid(color, to_f64(frame)).with_region(clip.clone());
            paint.renderer.draw_texture(&paint.target, &draw)?;
        }

        let data = thumbnail_data(window, dst);
        let region = clip.intersected_rect(round_out(dst));
        paint.draw_window(window, &data, &region);
    }

    Ok(())
}

impl Effect for OverviewEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        70
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, _flags: ReconfigureFlags) {
        let config = ctx.config.overview.clone();
        self.layout_mode = config.layout_mode;
        self.ignore_minimized = config.ignore_minimized;
        self.scene.set_duration(config.animation_duration_ms);

        let events = ctx.shortcuts.unregister_owner(NAME);
        ctx.push_gesture_events(events);
        ctx.edges.unreserve_all(NAME);

        ctx.shortcuts.register_action(NAME, Action::ToggleOverview);
        ctx.shortcuts
            .register_touchpad_pinch(NAME, PinchDirection::Contracting, 4, ToggleAction::Toggle);
        ctx.shortcuts
            .register_touchscreen_swipe(NAME, SwipeDirection::Up, 3, ToggleAction::Toggle);

        for edge in &config.border_activate {
            ctx.edges.reserve(NAME, *edge);
        }
        for edge in &config.touch_border_activate {
            ctx.edges.reserve_touch(NAME, *edge);
        }
        ctx.reserve_edges_done();
        self.border_activate = config.border_activate;

        if self.is_running() {
            self.relayout(ctx);
        }
    }

    fn unloading(&mut self, ctx: &mut EffectsHandler) {
        self.scene.views.stop(ctx);
    }

    fn is_active(&self, ctx: &EffectsHandler) -> bool {
        self.is_running() && !ctx.is_screen_locked()
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        data.mask |= PaintMask::SCREEN_TRANSFORMED;
        if self
            .scene
            .views
            .view(data.output)
            .is_some_and(|v| v.is_dirty())
        {
            data.paint.add_rect(data.screen);
        }
        next.pre_paint_screen(ctx, data, time);
    }

    fn paint_screen(
        &mut self,
        _ctx: &mut EffectsHandler,
        _paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<ScreenPaint, RenderError> {
        Ok(ScreenPaint::Replace)
    }

    fn finish_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        _data: &ScreenPrePaintData,
    ) -> Result<(), RenderError> {
        let progress = self.scene.progress();
        let selected = self.selected;
        let slots = self
            .slots
            .get(&paint.output)
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.scene.views.paint(ctx, paint, |ctx, paint, geometry| {
            draw_scene(ctx, paint, geometry, slots, selected, progress)
        })
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        self.scene.frame_done(ctx);
        next.post_paint_screen(ctx);
    }

    fn window_added(&mut self, ctx: &mut EffectsHandler, _window: &EffectWindow) {
        if self.is_running() {
            self.relayout(ctx);
        }
    }

    fn window_closed(&mut self, ctx: &mut EffectsHandler, window: &EffectWindow) {
        if self.selected == Some(window.id) {
            self.selected = None;
        }
        if self.is_running() {
            self.relayout(ctx);
        }
    }

    fn window_deleted(&mut self, _ctx: &mut EffectsHandler, window: WindowId) {
        for slots in self.slots.values_mut() {
            slots.retain(|(id, _)| *id != window);
        }
        if self.selected == Some(window) {
            self.selected = None;
        }
    }

    fn screen_added(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if self.is_running() {
            self.scene.views.add_screen(ctx, output);
            self.relayout(ctx);
        }
    }

    fn screen_removed(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        self.scene.views.remove_screen(ctx, output);
        self.slots.remove(&output);
    }

    fn handle_action(&mut self, ctx: &mut EffectsHandler, action: Action) -> bool {
        if action != Action::ToggleOverview || ctx.is_screen_locked() {
            return false;
        }
        self.toggle(ctx);
        true
    }

    fn gesture(&mut self, ctx: &mut EffectsHandler, action: ToggleAction, event: ActionEvent) {
        if ctx.is_screen_locked() {
            return;
        }
        self.apply_gesture(ctx, action, event);
    }

    fn border_activated(&mut self, ctx: &mut EffectsHandler, edge: ScreenEdge) -> bool {
        if !self.border_activate.contains(&edge) || ctx.is_screen_locked() {
            return false;
        }
        self.toggle(ctx);
        true
    }

    fn grabbed_keyboard_event(&mut self, ctx: &mut EffectsHandler, event: &KeyboardEvent) {
        if event.state != KeyState::Pressed || self.scene.views.route_key().is_none() {
            return;
        }

        match event.keysym {
            Keysym::Escape => self.close(ctx),
            Keysym::Return | Keysym::KP_Enter | Keysym::space => match self.selected {
                Some(window) => self.activate(ctx, window),
                None => self.close(ctx),
            },
            Keysym::Left => self.select_towards(ctx, Edge::Left),
            Keysym::Right => self.select_towards(ctx, Edge::Right),
            Keysym::Up => self.select_towards(ctx, Edge::Top),
            Keysym::Down => self.select_towards(ctx, Edge::Bottom),
            _ => (),
        }
    }

    fn intercepted_pointer_event(&mut self, ctx: &mut EffectsHandler, event: &InputEvent) {
        let Some(output) = self.scene.views.route_pointer(ctx, event) else {
            return;
        };
        let pos = ctx.cursor_pos();
        let under = self.thumbnail_at(output, pos);

        match event {
            InputEvent::PointerMotion { .. } => self.select(ctx, under),
            InputEvent::PointerButton {
                button: BTN_LEFT,
                state: ButtonState::Pressed,
                ..
            } => self.pressed = Some(under),
            InputEvent::PointerButton {
                button: BTN_LEFT,
                state: ButtonState::Released,
                ..
            } => match self.pressed.take() {
                Some(Some(window)) if under == Some(window) => self.activate(ctx, window),
                Some(None) if under.is_none() => self.close(ctx),
                _ => (),
            },
            _ => (),
        }
    }

    fn touch_down(
        &mut self,
        ctx: &mut EffectsHandler,
        id: i32,
        pos: Point<f64, Logical>,
        _time: u32,
    ) -> bool {
        if !self.is_active(ctx) {
            return false;
        }
        if let Some(output) = self.scene.views.touch_down(id, pos) {
            let under = self.thumbnail_at(output, pos);
            self.touches.insert(id, under);
            self.select(ctx, under);
        }
        true
    }

    fn touch_motion(
        &mut self,
        ctx: &mut EffectsHandler,
        id: i32,
        pos: Point<f64, Logical>,
        _time: u32,
    ) -> bool {
        if !self.is_active(ctx) {
            return false;
        }
        if let Some(output) = self.scene.views.touch_motion(id) {
            // Leaving the thumbnail turns the tap into nothing.
            if self.touches.get(&id) != Some(&self.thumbnail_at(output, pos)) {
                self.touches.remove(&id);
            }
        }
        true
    }

    fn touch_up(&mut self, ctx: &mut EffectsHandler, id: i32, _time: u32) -> bool {
        if !self.is_active(ctx) {
            return false;
        }
        self.scene.views.touch_up(id);
        match self.touches.remove(&id) {
            Some(Some(window)) => self.activate(ctx, window),
            Some(None) => self.close(ctx),
            None => (),
        }
        true
    }

    fn touch_cancel(&mut self, _ctx: &mut EffectsHandler) {
        self.scene.views.touch_cancel();
        self.touches.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_abs_diff_eq;
    use smithay::utils::Transform;

    use super::*;
    use crate::input::togglable_state::Status;
    use crate::output::OutputInfo;
    use crate::render_helpers::recording::{RecordingRenderer, RenderOp};
    use crate::render_helpers::{RenderTarget, RenderTargetKind};
    use crate::utils::rect;
    use crate::window::{StaticSurface, WindowFlags};

    fn setup() -> (EffectsHandler, OverviewEffect, OutputId) {
        let mut ctx = EffectsHandler::new_for_tests();
        let (output, _) = ctx.outputs.add(OutputInfo {
            name: "main".to_owned(),
            geometry: rect(0, 0, 1920, 1080),
            scale: 1.,
            transform: Transform::Normal,
            refresh_mhz: 60_000,
        });
        let mut effect = OverviewEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);
        (ctx, effect, output)
    }

    fn add_window(ctx: &mut EffectsHandler, geometry: Rectangle<i32, Logical>) -> WindowId {
        ctx.windows.add(Box::new(StaticSurface::new(geometry)))
    }

    fn frame(ctx: &mut EffectsHandler, effect: &mut OverviewEffect, ms: u64) {
        ctx.clock.set_unadjusted(Duration::from_millis(ms));
        effect.post_paint_screen(ctx, Chain::empty());
    }

    fn key(keysym: Keysym) -> KeyboardEvent {
        KeyboardEvent {
            keycode: 0,
            keysym,
            state: KeyState::Pressed,
            time: 0,
        }
    }

    #[test]
    fn pinch_commits_past_half() {
        let (mut ctx, mut effect, _) = setup();
        add_window(&mut ctx, rect(100, 100, 800, 600));

        let mut changes = Vec::new();
        changes.extend(effect.apply_gesture(
            &mut ctx,
            ToggleAction::Toggle,
            ActionEvent::Progress(0.6),
        ));
        assert_eq!(effect.scene.state.status(), Status::Activating);
        assert_eq!(effect.scene.state.partial_activation_factor(), 0.6);
        assert_eq!(effect.progress(), 0.6);
        assert!(effect.is_running());
        assert_eq!(ctx.fullscreen_effect(), Some(NAME));

        changes.extend(effect.apply_gesture(&mut ctx, ToggleAction::Toggle, ActionEvent::Triggered));
        assert_eq!(effect.scene.state.status(), Status::Active);
        assert_eq!(changes, vec![StateChange::Activated]);

        // Animates on from where the gesture left off.
        assert_eq!(effect.progress(), 0.6);
        frame(&mut ctx, &mut effect, 1000);
        assert_eq!(effect.progress(), 1.);
        assert!(effect.is_running());
    }

    #[test]
    fn short_pinch_falls_back() {
        let (mut ctx, mut effect, _) = setup();
        effect.apply_gesture(&mut ctx, ToggleAction::Toggle, ActionEvent::Progress(0.3));
        let change = effect.apply_gesture(&mut ctx, ToggleAction::Toggle, ActionEvent::Cancelled);
        assert_eq!(change, None);
        assert_eq!(effect.scene.state.status(), Status::Inactive);

        frame(&mut ctx, &mut effect, 1000);
        assert!(!effect.is_running());
        assert_eq!(ctx.keyboard_grab(), None);
    }

    #[test]
    fn cannot_start_over_another_fullscreen_effect() {
        let (mut ctx, mut effect, _) = setup();
        assert!(ctx.set_fullscreen_effect("desktop-grid"));
        effect.toggle(&mut ctx);
        assert_eq!(effect.scene.state.status(), Status::Inactive);
        assert!(!effect.is_running());
        assert_eq!(ctx.keyboard_grab(), None);
    }

    #[test]
    fn windows_are_laid_out_per_screen() {
        let (mut ctx, mut effect, _) = setup();
        ctx.config.overview.ignore_minimized = true;
        effect.reconfigure(&mut ctx, ReconfigureFlags::CONFIG);

        let a = add_window(&mut ctx, rect(100, 100, 800, 600));
        let b = add_window(&mut ctx, rect(150, 150, 800, 600));
        let dock = ctx.windows.add(Box::new(
            StaticSurface::new(rect(0, 1040, 1920, 40)).with_flags(WindowFlags::DOCK),
        ));
        let minimized = ctx.windows.add(Box::new(
            StaticSurface::new(rect(300, 300, 400, 300)).with_flags(WindowFlags::MINIMIZED),
        ));

        effect.toggle(&mut ctx);
        let (sa, sb) = (effect.slot(a).unwrap(), effect.slot(b).unwrap());
        assert!(!sa.overlaps(sb));
        assert!(rect(0, 0, 1920, 1080).contains_rect(sa));
        assert!(effect.slot(dock).is_none());
        assert!(effect.slot(minimized).is_none());
    }

    #[test]
    fn keyboard_selects_and_activates() {
        let (mut ctx, mut effect, _) = setup();
        let a = add_window(&mut ctx, rect(100, 100, 400, 300));
        let b = add_window(&mut ctx, rect(1200, 100, 400, 300));
        effect.toggle(&mut ctx);
        frame(&mut ctx, &mut effect, 1000);

        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Right));
        assert_eq!(effect.selected(), Some(a));
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Right));
        assert_eq!(effect.selected(), Some(b));
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Left));
        assert_eq!(effect.selected(), Some(a));

        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Return));
        assert_eq!(ctx.take_activation_request(), Some(a));
        assert_eq!(effect.scene.state.status(), Status::Inactive);

        frame(&mut ctx, &mut effect, 2000);
        assert!(!effect.is_running());
    }

    #[test]
    fn click_on_thumbnail_activates_it() {
        let (mut ctx, mut effect, _) = setup();
        let a = add_window(&mut ctx, rect(100, 100, 400, 300));
        effect.toggle(&mut ctx);
        frame(&mut ctx, &mut effect, 1000);

        let slot = effect.slot(a).unwrap();
        let pos = center(slot).to_f64();
        ctx.set_cursor_pos(pos);
        let press = |state| InputEvent::PointerButton {
            button: BTN_LEFT,
            state,
            time: 0,
        };
        effect.intercepted_pointer_event(&mut ctx, &press(ButtonState::Pressed));
        effect.intercepted_pointer_event(&mut ctx, &press(ButtonState::Released));
        assert_eq!(ctx.take_activation_request(), Some(a));
        assert_eq!(effect.scene.state.status(), Status::Inactive);
    }

    #[test]
    fn tap_on_empty_space_closes() {
        let (mut ctx, mut effect, _) = setup();
        add_window(&mut ctx, rect(100, 100, 400, 300));
        effect.toggle(&mut ctx);

        assert!(effect.touch_down(&mut ctx, 0, Point::from((1900., 1070.)), 0));
        assert!(effect.touch_up(&mut ctx, 0, 0));
        assert_eq!(ctx.take_activation_request(), None);
        assert_eq!(effect.scene.state.status(), Status::Inactive);
    }

    #[test]
    fn scene_replaces_the_screen() {
        let (mut ctx, mut effect, output) = setup();
        let a = add_window(&mut ctx, rect(100, 100, 400, 300));
        effect.toggle(&mut ctx);
        frame(&mut ctx, &mut effect, 1000);

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
            paint: Region::new(),
            output,
            screen,
        };
        assert_eq!(
            effect.paint_screen(&mut ctx, &mut paint, &data).unwrap(),
            ScreenPaint::Replace
        );
        effect.finish_paint_screen(&mut ctx, &mut paint, &data).unwrap();

        let slot = effect.slot(a).unwrap();
        let drawn = renderer.ops().iter().find_map(|op| match op {
            RenderOp::DrawWindow {
                target: RenderTargetKind::Texture(_),
                window,
                data,
                ..
            } if *window == a => Some(data.clone()),
            _ => None,
        });
        let bounds = drawn.unwrap().bounding_box(Point::from((100., 100.)));
        let slot = to_f64(slot);
        assert_abs_diff_eq!(bounds.loc.x, slot.loc.x, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.loc.y, slot.loc.y, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.size.w, slot.size.w, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.size.h, slot.size.h, epsilon = 1e-6);

        let last = renderer.ops().last().unwrap();
        assert!(matches!(
            last,
            RenderOp::DrawTexture {
                target: RenderTargetKind::Output(o),
                ..
            } if *o == output
        ));
    }
}

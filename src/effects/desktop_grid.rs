//! All virtual desktops side by side, zooming out from the current one.

use std::collections::HashMap;

use glaze_config::{Action, GridLayout, NameAlignment, ScreenEdge};
use smithay::backend::input::{ButtonState, KeyState};
use smithay::input::keyboard::Keysym;
use smithay::utils::{Logical, Point, Rectangle, Size};

use super::scene_view::SceneState;
use crate::effect::{Chain, Effect, EffectsHandler, PaintContext, ReconfigureFlags, ScreenPaint};
use crate::input::gestures::SwipeDirection;
use crate::input::shortcuts::ActionEvent;
use crate::input::togglable_state::{StateChange, ToggleAction};
use crate::input::{InputEvent, KeyboardEvent, BTN_LEFT};
use crate::output::OutputId;
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowQuad};
use crate::render_helpers::{RenderError, TextureDraw};
use crate::utils::region::Region;
use crate::utils::{expand_rect, rect, round_out, to_f64};
use crate::window::EffectWindow;

pub const NAME: &str = "desktop-grid";

const MARGIN: i32 = 40;
const SPACING: i32 = 10;
/// Width of the column holding the add and remove buttons.
const BUTTON_STRIP: i32 = 64;
const BUTTON_SIZE: i32 = 48;
const NAME_BAR_HEIGHT: i32 = 24;
const FRAME_WIDTH: i32 = 3;

const CURRENT_COLOR: [f32; 4] = [0.24, 0.48, 0.72, 1.];
const HOVER_COLOR: [f32; 4] = [0.4, 0.4, 0.4, 0.4];
const BUTTON_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 0.8];
const NAME_BAR_COLOR: [f32; 4] = [0., 0., 0., 0.5];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Desktop(u32),
    AddDesktop,
    RemoveDesktop,
}

/// Where everything of one view goes when the grid is fully shown.
#[derive(Debug, Clone, Default, PartialEq)]
struct ViewLayout {
    /// Thumbnail of every desktop, first desktop first.
    desktops: Vec<Rectangle<i32, Logical>>,
    add: Option<Rectangle<i32, Logical>>,
    remove: Option<Rectangle<i32, Logical>>,
}

impl ViewLayout {
    fn target_at(&self, pos: Point<f64, Logical>) -> Option<Target> {
        let hit = |r: &Rectangle<i32, Logical>| to_f64(*r).contains(pos);
        if self.add.as_ref().is_some_and(hit) {
            return Some(Target::AddDesktop);
        }
        if self.remove.as_ref().is_some_and(hit) {
            return Some(Target::RemoveDesktop);
        }
        self.desktops
            .iter()
            .position(hit)
            .map(|idx| Target::Desktop(idx as u32 + 1))
    }
}

/// Rows and columns of the grid for `count` desktops.
pub fn grid_size(count: u32, mode: GridLayout, custom_rows: u32) -> (u32, u32) {
    let count = count.max(1);
    let rows = match mode {
        GridLayout::Custom => custom_rows.clamp(1, count),
        GridLayout::Automatic => {
            let columns = (f64::from(count).sqrt().ceil() as u32).max(1);
            count.div_ceil(columns)
        }
    };
    (rows, count.div_ceil(rows))
}

/// Largest rectangle with the aspect ratio of `aspect` centered in `cell`.
fn fit(cell: Rectangle<i32, Logical>, aspect: Size<i32, Logical>) -> Rectangle<i32, Logical> {
    if aspect.w <= 0 || aspect.h <= 0 {
        return cell;
    }
    let scale = f64::min(
        f64::from(cell.size.w) / f64::from(aspect.w),
        f64::from(cell.size.h) / f64::from(aspect.h),
    );
    let w = (f64::from(aspect.w) * scale) as i32;
    let h = (f64::from(aspect.h) * scale) as i32;
    rect(
        cell.loc.x + (cell.size.w - w) / 2,
        cell.loc.y + (cell.size.h - h) / 2,
        w,
        h,
    )
}

pub struct DesktopGridEffect {
    scene: SceneState,
    layout_mode: GridLayout,
    custom_rows: u32,
    show_add_remove: bool,
    name_alignment: NameAlignment,
    border_activate: Vec<ScreenEdge>,
    layouts: HashMap<OutputId, ViewLayout>,
    hovered: Option<Target>,
    /// Desktop picked with the keyboard.
    selected: Option<u32>,
    pressed: Option<Option<Target>>,
    touches: HashMap<i32, Option<Target>>,
}

impl DesktopGridEffect {
    pub fn new() -> Self {
        Self {
            scene: SceneState::new(NAME),
            layout_mode: GridLayout::Automatic,
            custom_rows: 2,
            show_add_remove: true,
            name_alignment: NameAlignment::Disabled,
            border_activate: Vec::new(),
            layouts: HashMap::new(),
            hovered: None,
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

    pub fn selected(&self) -> Option<u32> {
        self.selected
    }

    /// Thumbnail of a desktop on an output when fully shown.
    pub fn desktop_rect(&self, output: OutputId, desktop: u32) -> Option<Rectangle<i32, Logical>> {
        let idx = desktop.checked_sub(1)? as usize;
        self.layouts.get(&output)?.desktops.get(idx).copied()
    }

    pub fn target_at(&self, output: OutputId, pos: Point<f64, Logical>) -> Option<Target> {
        self.layouts.get(&output)?.target_at(pos)
    }

    pub fn toggle(&mut self, ctx: &mut EffectsHandler) {
        let change = self.scene.state.toggle();
        self.state_changed(ctx, change);
    }

    pub fn close(&mut self, ctx: &mut EffectsHandler) {
        let change = self.scene.state.deactivate();
        self.state_changed(ctx, change);
    }

    fn state_changed(&mut self, ctx: &mut EffectsHandler, change: Option<StateChange>) {
        if self.scene.sync(ctx) {
            self.relayout(ctx);
        }

        match change {
            Some(StateChange::Activated) if !self.scene.state.is_visible() => (),
            Some(StateChange::Activated) => {
                debug!("desktop grid activated");
                self.selected = Some(ctx.current_desktop());
            }
            Some(StateChange::Deactivated) => {
                debug!("desktop grid deactivated");
                self.hovered = None;
                self.pressed = None;
                self.touches.clear();
            }
            None => (),
        }
    }

    fn relayout(&mut self, ctx: &mut EffectsHandler) {
        let count = ctx.desktop_count();
        let (rows, columns) = grid_size(count, self.layout_mode, self.custom_rows);

        let views: Vec<_> = self
            .scene
            .views
            .views()
            .map(|v| (v.output(), v.geometry()))
            .collect();

        self.layouts.clear();
        for (output, geometry) in views {
            let mut area = expand_rect(geometry, -MARGIN);
            let mut layout = ViewLayout::default();

            if self.show_add_remove {
                area.size.w -= BUTTON_STRIP;
                let x = area.loc.x + area.size.w + (BUTTON_STRIP - BUTTON_SIZE) / 2;
                let y = area.loc.y + area.size.h / 2;
                layout.add = Some(rect(x, y - BUTTON_SIZE - SPACING / 2, BUTTON_SIZE, BUTTON_SIZE));
                if count > 1 {
                    layout.remove = Some(rect(x, y + SPACING / 2, BUTTON_SIZE, BUTTON_SIZE));
                }
            }

            let cell_w = area.size.w / columns as i32;
            let cell_h = area.size.h / rows as i32;
            for idx in 0..count {
                let (row, column) = ((idx / columns) as i32, (idx % columns) as i32);
                let cell = rect(
                    area.loc.x + column * cell_w,
                    area.loc.y + row * cell_h,
                    cell_w,
                    cell_h,
                );
                layout
                    .desktops
                    .push(fit(expand_rect(cell, -SPACING), geometry.size));
            }

            self.layouts.insert(output, layout);
        }

        self.scene.views.schedule_repaint_all(ctx);
    }

    fn switch_to(&mut self, ctx: &mut EffectsHandler, desktop: u32) {
        if desktop == 0 || desktop > ctx.desktop_count() {
            return;
        }
        ctx.set_current_desktop(desktop);
        self.close(ctx);
    }

    fn add_desktop(&mut self, ctx: &mut EffectsHandler) {
        ctx.set_desktop_count(ctx.desktop_count() + 1);
        debug!("added desktop {}", ctx.desktop_count());
        self.relayout(ctx);
    }

    fn remove_desktop(&mut self, ctx: &mut EffectsHandler) {
        let count = ctx.desktop_count();
        if count <= 1 {
            return;
        }
        ctx.set_desktop_count(count - 1);
        debug!("removed desktop {count}");
        if self.selected.is_some_and(|d| d >= count) {
            self.selected = Some(count - 1);
        }
        self.relayout(ctx);
    }

    fn trigger(&mut self, ctx: &mut EffectsHandler, target: Target) {
        match target {
            Target::Desktop(desktop) => self.switch_to(ctx, desktop),
            Target::AddDesktop => self.add_desktop(ctx),
            Target::RemoveDesktop => self.remove_desktop(ctx),
        }
    }

    fn hover(&mut self, ctx: &mut EffectsHandler, target: Option<Target>) {
        if self.hovered != target {
            self.hovered = target;
            self.scene.views.schedule_repaint_all(ctx);
        }
    }

    fn move_selection(&mut self, ctx: &mut EffectsHandler, dx: i32, dy: i32) {
        let count = ctx.desktop_count();
        let (_, columns) = grid_size(count, self.layout_mode, self.custom_rows);
        let current = self.selected.unwrap_or_else(|| ctx.current_desktop()).max(1) - 1;

        let column = (current % columns) as i32 + dx;
        let row = (current / columns) as i32 + dy;
        if column < 0 || column >= columns as i32 || row < 0 {
            return;
        }
        let next = row as u32 * columns + column as u32;
        if next < count {
            self.selected = Some(next + 1);
            self.scene.views.schedule_repaint_all(ctx);
        }
    }
}

impl Default for DesktopGridEffect {
    fn default() -> Self {
        Self::new()
    }
}

struct SceneParams<'a> {
    layout: &'a ViewLayout,
    current: u32,
    hovered: Option<Target>,
    selected: Option<u32>,
    name_alignment: NameAlignment,
    progress: f64,
}

fn lerp_rect(
    a: Rectangle<f64, Logical>,
    b: Rectangle<f64, Logical>,
    t: f64,
) -> Rectangle<f64, Logical> {
    let lerp = |x: f64, y: f64| x + (y - x) * t;
    Rectangle::new(
        Point::from((lerp(a.loc.x, b.loc.x), lerp(a.loc.y, b.loc.y))),
        Size::from((lerp(a.size.w, b.size.w), lerp(a.size.h, b.size.h))),
    )
}

fn solid(
    paint: &mut PaintContext,
    color: [f32; 4],
    dst: Rectangle<f64, Logical>,
    clip: &Region,
) -> Result<(), RenderError> {
    let draw = TextureDraw::solid(color, dst).with_region(clip.intersected_rect(round_out(dst)));
    paint.renderer.draw_texture(&paint.target, &draw)
}

fn frame_rects(r: Rectangle<f64, Logical>, width: f64) -> [Rectangle<f64, Logical>; 4] {
    let (x, y, w, h) = (r.loc.x, r.loc.y, r.size.w, r.size.h);
    let r = |x, y, w, h| Rectangle::new(Point::from((x, y)), Size::from((w, h)));
    [
        r(x - width, y - width, w + width * 2., width),
        r(x - width, y + h, w + width * 2., width),
        r(x - width, y, width, h),
        r(x + w, y, width, h),
    ]
}

fn name_bar(thumb: Rectangle<f64, Logical>, alignment: NameAlignment) -> Option<Rectangle<f64, Logical>> {
    let h = f64::from(NAME_BAR_HEIGHT).min(thumb.size.h);
    let y = match alignment {
        NameAlignment::Disabled => return None,
        NameAlignment::Top => thumb.loc.y,
        NameAlignment::Center => thumb.loc.y + (thumb.size.h - h) / 2.,
        NameAlignment::Bottom => thumb.loc.y + thumb.size.h - h,
    };
    Some(Rectangle::new(
        Point::from((thumb.loc.x, y)),
        Size::from((thumb.size.w, h)),
    ))
}

fn draw_scene(
    ctx: &EffectsHandler,
    paint: &mut PaintContext,
    geometry: Rectangle<i32, Logical>,
    params: &SceneParams,
) -> Result<(), RenderError> {
    let _span = tracy_client::span!("DesktopGridEffect::draw_scene");

    let clip = Region::from_rect(geometry);
    let screen = to_f64(geometry);
    let idx = params.current.saturating_sub(1) as usize;
    let Some(current) = params.layout.desktops.get(idx).map(|r| to_f64(*r)) else {
        return Ok(());
    };

    // Zoomed in, the current desktop covers the screen and the others sit around it.
    let zoom = screen.size.w / current.size.w;
    let zoomed = |r: Rectangle<f64, Logical>| {
        Rectangle::new(
            Point::from((
                screen.loc.x + (r.loc.x - current.loc.x) * zoom,
                screen.loc.y + (r.loc.y - current.loc.y) * zoom,
            )),
            Size::from((r.size.w * zoom, r.size.h * zoom)),
        )
    };

    for (idx, thumb) in params.layout.desktops.iter().enumerate() {
        let desktop = idx as u32 + 1;
        let grid = to_f64(*thumb);
        let dst = lerp_rect(zoomed(grid), grid, params.progress);
        if !dst.overlaps(screen) {
            continue;
        }

        let highlight = if desktop == params.current {
            Some(CURRENT_COLOR)
        } else if params.hovered == Some(Target::Desktop(desktop))
            || params.selected == Some(desktop)
        {
            Some(HOVER_COLOR)
        } else {
            None
        };
        if let Some(color) = highlight {
            let color = color.map(|c| c * params.progress as f32);
            for r in frame_rects(dst, f64::from(FRAME_WIDTH)) {
                solid(paint, color, r, &clip)?;
            }
        }

        let scale = dst.size.w / screen.size.w;
        let thumb_clip = clip.intersected_rect(round_out(dst));
        for window in ctx.windows.stacking_order() {
            let shown = window.is_desktop()
                || (!window.deleted
                    && !window.is_dock()
                    && !window.is_special()
                    && window.is_visible()
                    && window.is_on_desktop(desktop));
            if !shown || !window.geometry.overlaps(geometry) {
                continue;
            }
            let data = desktop_window_data(window, screen, dst, scale);
            paint.draw_window(window, &data, &thumb_clip);
        }

        if let Some(bar) = name_bar(dst, params.name_alignment) {
            solid(paint, NAME_BAR_COLOR, bar, &thumb_clip)?;
        }
    }

    if params.progress > 0. {
        let buttons = [
            (params.layout.add, Target::AddDesktop),
            (params.layout.remove, Target::RemoveDesktop),
        ];
        for (button, target) in buttons {
            let Some(button) = button else {
                continue;
            };
            let mut color = BUTTON_COLOR;
            if params.hovered == Some(target) {
                color = HOVER_COLOR;
            }
            let color = color.map(|c| c * params.progress as f32);
            solid(paint, color, to_f64(button), &clip)?;
        }
    }

    Ok(())
}

/// Paint data placing a window into a desktop thumbnail.
fn desktop_window_data(
    window: &EffectWindow,
    screen: Rectangle<f64, Logical>,
    thumb: Rectangle<f64, Logical>,
    scale: f64,
) -> WindowPaintData {
    let mut data = WindowPaintData::new(
        window.opacity,
        vec![WindowQuad::from_rect(to_f64(window.rect()))],
    );
    data.scale(scale, scale);
    let pos = to_f64(window.geometry).loc;
    let x = thumb.loc.x + (pos.x - screen.loc.x) * scale;
    let y = thumb.loc.y + (pos.y - screen.loc.y) * scale;
    data.translate(x - pos.x, y - pos.y);
    data
}

impl Effect for DesktopGridEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        70
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, _flags: ReconfigureFlags) {
        let config = ctx.config.desktop_grid.clone();
        self.layout_mode = config.layout_mode;
        self.custom_rows = config.custom_layout_rows;
        self.show_add_remove = config.show_add_remove;
        self.name_alignment = config.desktop_name_alignment;
        self.scene.set_duration(config.animation_duration_ms);

        let events = ctx.shortcuts.unregister_owner(NAME);
        ctx.push_gesture_events(events);
        ctx.edges.unreserve_all(NAME);

        ctx.shortcuts.register_action(NAME, Action::ToggleDesktopGrid);
        ctx.shortcuts
            .register_touchpad_swipe(NAME, SwipeDirection::Up, 4, ToggleAction::Toggle);
        ctx.shortcuts
            .register_touchscreen_swipe(NAME, SwipeDirection::Down, 3, ToggleAction::Toggle);

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
        let Some(layout) = self.layouts.get(&paint.output) else {
            return Ok(());
        };
        let params = SceneParams {
            layout,
            current: ctx.current_desktop(),
            hovered: self.hovered,
            selected: self.selected,
            name_alignment: self.name_alignment,
            progress: self.scene.progress(),
        };
        self.scene
            .views
            .paint(ctx, paint, |ctx, paint, geometry| {
                draw_scene(ctx, paint, geometry, &params)
            })
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectsHandler, next: Chain) {
        self.scene.frame_done(ctx);
        next.post_paint_screen(ctx);
    }

    fn window_added(&mut self, ctx: &mut EffectsHandler, _window: &EffectWindow) {
        self.scene.views.schedule_repaint_all(ctx);
    }

    fn window_closed(&mut self, ctx: &mut EffectsHandler, _window: &EffectWindow) {
        self.scene.views.schedule_repaint_all(ctx);
    }

    fn window_damaged(&mut self, ctx: &mut EffectsHandler, _window: &EffectWindow, _damage: &Region) {
        self.scene.views.schedule_repaint_all(ctx);
    }

    fn screen_added(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if self.is_running() {
            self.scene.views.add_screen(ctx, output);
            self.relayout(ctx);
        }
    }

    fn screen_removed(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        self.scene.views.remove_screen(ctx, output);
        self.layouts.remove(&output);
    }

    fn handle_action(&mut self, ctx: &mut EffectsHandler, action: Action) -> bool {
        if action != Action::ToggleDesktopGrid || ctx.is_screen_locked() {
            return false;
        }
        self.toggle(ctx);
        true
    }

    fn gesture(&mut self, ctx: &mut EffectsHandler, action: ToggleAction, event: ActionEvent) {
        if ctx.is_screen_locked() {
            return;
        }
        let change = self.scene.state.handle_gesture(action, event);
        self.state_changed(ctx, change);
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

        let digit = event.keysym.raw().wrapping_sub(Keysym::_1.raw());
        if digit < 9 {
            self.switch_to(ctx, digit + 1);
            return;
        }

        match event.keysym {
            Keysym::Escape => self.close(ctx),
            Keysym::Return | Keysym::KP_Enter | Keysym::space => {
                let desktop = self.selected.unwrap_or_else(|| ctx.current_desktop());
                self.switch_to(ctx, desktop);
            }
            Keysym::Left => self.move_selection(ctx, -1, 0),
            Keysym::Right => self.move_selection(ctx, 1, 0),
            Keysym::Up => self.move_selection(ctx, 0, -1),
            Keysym::Down => self.move_selection(ctx, 0, 1),
            _ => (),
        }
    }

    fn intercepted_pointer_event(&mut self, ctx: &mut EffectsHandler, event: &InputEvent) {
        let Some(output) = self.scene.views.route_pointer(ctx, event) else {
            return;
        };
        let under = self.target_at(output, ctx.cursor_pos());

        match event {
            InputEvent::PointerMotion { .. } => self.hover(ctx, under),
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
                Some(Some(target)) if under == Some(target) => self.trigger(ctx, target),
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
            let under = self.target_at(output, pos);
            self.touches.insert(id, under);
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
            if self.touches.get(&id) != Some(&self.target_at(output, pos)) {
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
            Some(Some(target)) => self.trigger(ctx, target),
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
    use crate::window::StaticSurface;

    fn setup() -> (EffectsHandler, DesktopGridEffect, OutputId) {
        let mut ctx = EffectsHandler::new_for_tests();
        let (output, _) = ctx.outputs.add(OutputInfo {
            name: "main".to_owned(),
            geometry: rect(0, 0, 1920, 1080),
            scale: 1.,
            transform: Transform::Normal,
            refresh_mhz: 60_000,
        });
        ctx.set_desktop_count(4);
        let mut effect = DesktopGridEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);
        (ctx, effect, output)
    }

    fn frame(ctx: &mut EffectsHandler, effect: &mut DesktopGridEffect, ms: u64) {
        ctx.clock.set_unadjusted(Duration::from_millis(ms));
        effect.post_paint_screen(ctx, Chain::empty());
    }

    fn click(ctx: &mut EffectsHandler, effect: &mut DesktopGridEffect, pos: Point<f64, Logical>) {
        ctx.set_cursor_pos(pos);
        for state in [ButtonState::Pressed, ButtonState::Released] {
            let event = InputEvent::PointerButton {
                button: BTN_LEFT,
                state,
                time: 0,
            };
            effect.intercepted_pointer_event(ctx, &event);
        }
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
    fn grid_sizes() {
        assert_eq!(grid_size(1, GridLayout::Automatic, 2), (1, 1));
        assert_eq!(grid_size(4, GridLayout::Automatic, 2), (2, 2));
        assert_eq!(grid_size(5, GridLayout::Automatic, 2), (2, 3));
        assert_eq!(grid_size(9, GridLayout::Automatic, 2), (3, 3));
        assert_eq!(grid_size(6, GridLayout::Custom, 3), (3, 2));
        assert_eq!(grid_size(2, GridLayout::Custom, 5), (2, 1));
        assert_eq!(grid_size(3, GridLayout::Custom, 0), (1, 3));
    }

    #[test]
    fn desktops_are_laid_out_in_a_grid() {
        let (mut ctx, mut effect, output) = setup();
        effect.toggle(&mut ctx);

        let rects: Vec<_> = (1..=4)
            .map(|d| effect.desktop_rect(output, d).unwrap())
            .collect();
        assert!(rects[0].loc.x < rects[1].loc.x);
        assert_eq!(rects[0].loc.y, rects[1].loc.y);
        assert!(rects[0].loc.y < rects[2].loc.y);
        assert_eq!(rects[0].loc.x, rects[2].loc.x);
        for r in &rects {
            // Thumbnails keep the screen's aspect ratio.
            let aspect = f64::from(r.size.w) / f64::from(r.size.h);
            assert!((aspect - 16. / 9.).abs() < 0.01, "{r:?}");
        }
        assert_eq!(effect.desktop_rect(output, 5), None);
        assert_eq!(effect.desktop_rect(output, 0), None);
    }

    #[test]
    fn clicking_a_desktop_switches_to_it() {
        let (mut ctx, mut effect, output) = setup();
        effect.toggle(&mut ctx);
        frame(&mut ctx, &mut effect, 1000);

        let target = effect.desktop_rect(output, 3).unwrap();
        click(&mut ctx, &mut effect, crate::utils::center(target).to_f64());
        assert_eq!(ctx.current_desktop(), 3);
        assert_eq!(effect.scene.state.status(), Status::Inactive);

        frame(&mut ctx, &mut effect, 2000);
        assert!(!effect.is_running());
    }

    #[test]
    fn add_and_remove_buttons() {
        let (mut ctx, mut effect, output) = setup();
        effect.toggle(&mut ctx);
        let layout = effect.layouts[&output].clone();

        click(&mut ctx, &mut effect, crate::utils::center(layout.add.unwrap()).to_f64());
        assert_eq!(ctx.desktop_count(), 5);
        assert_eq!(effect.layouts[&output].desktops.len(), 5);
        assert!(effect.is_running());

        let remove = effect.layouts[&output].remove.unwrap();
        click(&mut ctx, &mut effect, crate::utils::center(remove).to_f64());
        click(&mut ctx, &mut effect, crate::utils::center(remove).to_f64());
        assert_eq!(ctx.desktop_count(), 3);
    }

    #[test]
    fn buttons_hidden_when_disabled() {
        let (mut ctx, mut effect, output) = setup();
        ctx.config.desktop_grid.show_add_remove = false;
        effect.reconfigure(&mut ctx, ReconfigureFlags::CONFIG);
        effect.toggle(&mut ctx);
        assert_eq!(effect.layouts[&output].add, None);
        assert_eq!(effect.layouts[&output].remove, None);
    }

    #[test]
    fn keyboard_navigation() {
        let (mut ctx, mut effect, _) = setup();
        effect.toggle(&mut ctx);
        assert_eq!(effect.selected(), Some(1));

        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Left));
        assert_eq!(effect.selected(), Some(1));
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Right));
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Down));
        assert_eq!(effect.selected(), Some(4));
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Down));
        assert_eq!(effect.selected(), Some(4));

        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::Return));
        assert_eq!(ctx.current_desktop(), 4);
        assert_eq!(effect.scene.state.status(), Status::Inactive);
    }

    #[test]
    fn digits_pick_desktops() {
        let (mut ctx, mut effect, _) = setup();
        effect.toggle(&mut ctx);
        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::_9));
        assert_eq!(ctx.current_desktop(), 1);
        assert!(effect.scene.state.is_active());

        effect.grabbed_keyboard_event(&mut ctx, &key(Keysym::_2));
        assert_eq!(ctx.current_desktop(), 2);
        assert!(!effect.scene.state.is_active());
    }

    #[test]
    fn windows_are_drawn_into_their_desktop() {
        let (mut ctx, mut effect, output) = setup();
        let window = ctx.windows.add(Box::new(
            StaticSurface::new(rect(0, 0, 960, 540)).with_desktop(Some(2)),
        ));
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
        effect.finish_paint_screen(&mut ctx, &mut paint, &data).unwrap();

        let thumb = effect.desktop_rect(output, 2).unwrap();
        let drawn: Vec<_> = renderer
            .ops()
            .iter()
            .filter_map(|op| match op {
                RenderOp::DrawWindow {
                    target: RenderTargetKind::Texture(_),
                    window: id,
                    data,
                    ..
                } if *id == window => Some(data.bounding_box(Point::from((0., 0.)))),
                _ => None,
            })
            .collect();
        assert_eq!(drawn.len(), 1);
        // Half the screen, so half the thumbnail.
        assert_abs_diff_eq!(drawn[0].loc.x, f64::from(thumb.loc.x), epsilon = 1e-6);
        assert_abs_diff_eq!(drawn[0].size.w, f64::from(thumb.size.w) / 2., epsilon = 1e-6);
    }
}

use std::time::Duration;

use glaze_config::Config;
use smithay::input::keyboard::Keysym;
use smithay::utils::{Logical, Point, Rectangle};

use super::fixture::Fixture;
use crate::input::InputEvent;
use crate::render_helpers::recording::{RecordingRenderer, RenderOp};
use crate::render_helpers::RenderTargetKind;
use crate::utils::rect;
use crate::utils::region::Region;
use crate::window::{StaticSurface, WindowId};

const FRAME: Duration = Duration::from_millis(17);

/// Render ops other than clears, with ids replaced by stable indices.
fn describe(ops: &[RenderOp], windows: &[WindowId]) -> Vec<String> {
    ops.iter()
        .filter_map(|op| match op {
            RenderOp::Clear { .. } => None,
            RenderOp::DrawWindow {
                window,
                data,
                region,
                ..
            } => {
                let idx = windows.iter().position(|w| w == window);
                Some(format!("draw {idx:?} {data:?} {region:?}"))
            }
            other => Some(format!("{other:?}")),
        })
        .collect()
}

fn cleared(ops: &[RenderOp]) -> Region {
    let mut region = Region::new();
    for op in ops {
        if let RenderOp::Clear { region: r, .. } = op {
            region.union(r);
        }
    }
    region
}

fn opaque_rect() -> Rectangle<i32, Logical> {
    rect(100, 100, 800, 600)
}

fn first_frame(config: Config) -> (Vec<String>, Region) {
    let mut f = Fixture::with_config(config);
    f.add_output(1);
    let (a, _) = f.add_normal(opaque_rect());
    let (b, _) = f.add_window(StaticSurface::new(rect(500, 300, 800, 600)));
    f.renderer().clear_ops();
    f.advance(FRAME);
    let ops = f.renderer().ops();
    (describe(ops, &[a, b]), cleared(ops))
}

#[test]
fn idle_effects_leave_frames_untouched() {
    let mut with_effects = Config::default();
    with_effects.animations.window_open_ms = 0;

    let mut without = Config::default();
    without.blur.off = true;
    without.wobbly.off = true;
    without.zoom.off = true;
    without.magnifier.off = true;
    without.overview.off = true;
    without.desktop_grid.off = true;
    without.animations.off = true;

    let (draws, clears) = first_frame(with_effects);
    assert!(draws.iter().any(|op| op.starts_with("draw Some(1)")));
    let (plain_draws, plain_clears) = first_frame(without);
    assert_eq!(draws, plain_draws);

    // Blur shrinks opaque clips, so the background is also cleared along the inner edge of the
    // opaque window. The window is drawn over it right after.
    assert!(clears.contains(&plain_clears));
    let opaque = Region::from_rect(opaque_rect());
    assert_eq!(clears.subtracted(&opaque), plain_clears.subtracted(&opaque));
}

#[test]
fn placeholder_swallows_input_until_an_output_appears() {
    let mut f = Fixture::new();
    let (_, surface) = f.add_normal(rect(0, 0, 400, 300));

    f.key(30, Keysym::a);
    assert!(surface.events().is_empty());

    f.key(115, Keysym::XF86_AudioRaiseVolume);
    assert_eq!(surface.events().len(), 2);

    f.add_output(1);
    f.key(30, Keysym::a);
    f.key(115, Keysym::XF86_AudioRaiseVolume);
    assert_eq!(surface.events().len(), 6);
}

#[test]
fn pinch_opens_overview_and_escape_closes_it() {
    let mut f = Fixture::new();
    let output = f.add_output(1);
    f.add_normal(rect(100, 100, 800, 600));
    f.settle(Duration::from_secs(1));

    f.input(InputEvent::PinchBegin {
        fingers: 4,
        time: 0,
    });
    f.input(InputEvent::PinchUpdate {
        scale: 0.88,
        angle_delta: 0.,
        time: 10,
    });
    assert_eq!(f.glaze().ctx.fullscreen_effect(), Some("overview"));
    f.input(InputEvent::PinchEnd {
        cancelled: false,
        time: 20,
    });
    assert_eq!(f.glaze().ctx.keyboard_grab(), Some("overview"));

    f.renderer().clear_ops();
    f.settle(Duration::from_secs(1));
    let composited = f.renderer().ops().iter().any(|op| {
        matches!(
            op,
            RenderOp::DrawTexture {
                target: RenderTargetKind::Output(o),
                ..
            } if *o == output
        )
    });
    assert!(composited);

    f.key(1, Keysym::Escape);
    f.settle(Duration::from_secs(1));
    assert_eq!(f.glaze().ctx.fullscreen_effect(), None);
    assert_eq!(f.glaze().ctx.keyboard_grab(), None);
    assert_eq!(f.glaze().ctx.mouse_interception(), None);
}

#[test]
fn closed_window_fades_out_while_kept_alive() {
    let mut config = Config::default();
    config.animations.window_open_ms = 0;
    config.animations.window_close_ms = 250;
    let mut f = Fixture::with_config(config);
    f.add_output(1);
    let (id, surface) = f.add_normal(rect(100, 100, 400, 300));
    f.advance(FRAME);

    f.glaze().close_window(id);
    assert!(surface.is_destroyed());
    assert!(f.glaze().ctx.windows.contains(id));

    f.renderer().clear_ops();
    f.advance(Duration::from_millis(100));
    let opacity = f.renderer().ops().iter().find_map(|op| match op {
        RenderOp::DrawWindow { window, data, .. } if *window == id => Some(data.opacity),
        _ => None,
    });
    let opacity = opacity.unwrap();
    assert!(0. < opacity && opacity < 1., "{opacity}");

    f.settle(Duration::from_secs(1));
    assert!(!f.glaze().ctx.windows.contains(id));

    // Nothing is left to draw where the window was.
    f.renderer().clear_ops();
    f.glaze().ctx.add_repaint_full();
    f.advance(FRAME);
    assert!(!f
        .renderer()
        .ops()
        .iter()
        .any(|op| matches!(op, RenderOp::DrawWindow { window, .. } if *window == id)));
}

#[test]
fn unsupported_blur_never_paints() {
    let renderer = RecordingRenderer::new().with_max_texture_size(1024);
    let mut f = Fixture::with_renderer(Config::default(), renderer);
    f.add_output(1);
    assert!(!f.glaze().effects.is_loaded("blur"));
    assert!(f.glaze().effects.was_unsupported("blur"));

    let mut surface = StaticSurface::new(rect(100, 100, 400, 300));
    surface.blur_region = Some(Region::new());
    f.add_window(surface);
    f.renderer().clear_ops();
    f.advance(FRAME);

    assert!(!f.renderer().ops().is_empty());
    assert!(f
        .renderer()
        .ops()
        .iter()
        .all(|op| !matches!(op, RenderOp::AllocTexture { .. } | RenderOp::Blit { .. })));
}

#[test]
fn cursor_position_follows_pointer() {
    let mut f = Fixture::new();
    f.add_output(1);
    f.add_output(2);

    let position = Point::from((2500., 300.));
    f.input(InputEvent::PointerMotion {
        position,
        delta: Point::from((0., 0.)),
        time: 0,
    });
    assert_eq!(f.glaze().ctx.cursor_pos(), position);
    assert_eq!(f.glaze().seat.cursor_pos(), position);
}

//! Blurs whatever is behind translucent windows that ask for it.
//!
//! The blur is a dual-kawase filter. The area behind a window is copied from the target into a
//! helper texture, downsampled through a chain of textures of halving size, upsampled back, and
//! the last upsample pass draws straight into the target under the window.

use std::collections::HashMap;

use smithay::utils::{Logical, Physical, Rectangle, Size};

use crate::effect::{Chain, Effect, EffectsHandler, Feature, PaintContext, ReconfigureFlags};
use crate::output::OutputId;
use crate::paint::{FrameTime, PaintMask, ScreenPrePaintData, WindowPaintData, WindowPrePaintData};
use crate::render_helpers::offscreen::OffscreenLayer;
use crate::render_helpers::{
    Blend, Filter, RenderError, RenderTarget, Renderer, ShaderKind, TextureDraw, TextureFormat,
    TextureId, TextureSpec, TransferFunction, Wrap,
};
use crate::utils::region::{intersect_rect, Region};
use crate::utils::{expand_rect, rect, to_f64};
use crate::window::EffectWindow;

pub const NAME: &str = "blur";

/// Property clients set to ask for blur behind them.
pub const BLUR_BEHIND_PROPERTY: &str = "_KDE_NET_WM_BLUR_BEHIND_REGION";

const STRENGTH_STEPS: usize = 15;
const NOISE_SIZE: i32 = 256;

/// Usable offsets of one downsample level and how far it samples outside the blurred area.
struct LevelOffsets {
    min: f32,
    max: f32,
    expand: i32,
}

const LEVELS: [LevelOffsets; 4] = [
    LevelOffsets {
        min: 1.,
        max: 2.,
        expand: 10,
    },
    LevelOffsets {
        min: 2.,
        max: 3.,
        expand: 20,
    },
    LevelOffsets {
        min: 2.,
        max: 5.,
        expand: 50,
    },
    LevelOffsets {
        min: 3.,
        max: 8.,
        expand: 150,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurStrength {
    /// Number of downsample passes.
    pub iterations: usize,
    pub offset: f32,
}

/// Spreads the strength steps over the levels, proportionally to their offset ranges.
pub fn strength_table() -> Vec<BlurStrength> {
    let sum: f32 = LEVELS.iter().map(|l| l.max - l.min).sum();
    let mut remaining = STRENGTH_STEPS as i32;
    let mut table = Vec::with_capacity(STRENGTH_STEPS);

    for (i, level) in LEVELS.iter().enumerate() {
        let range = level.max - level.min;
        let mut steps = (range / sum * STRENGTH_STEPS as f32).ceil() as i32;
        remaining -= steps;
        if remaining < 0 {
            steps += remaining;
        }

        for j in 1..=steps {
            table.push(BlurStrength {
                iterations: i + 1,
                offset: level.min + (range / steps as f32) * j as f32,
            });
        }
    }

    table
}

/// Textures of one output: the downsample chain and the helper the target is copied into.
#[derive(Debug, Default)]
struct ScreenTextures {
    levels: Vec<OffscreenLayer>,
    helper: OffscreenLayer,
}

impl ScreenTextures {
    fn ensure(
        &mut self,
        renderer: &mut dyn Renderer,
        size: Size<i32, Physical>,
        format: TextureFormat,
        iterations: usize,
    ) -> Result<(Vec<TextureId>, TextureId), RenderError> {
        while self.levels.len() > iterations + 1 {
            if let Some(mut level) = self.levels.pop() {
                level.release(renderer);
            }
        }
        self.levels.resize_with(iterations + 1, OffscreenLayer::new);

        let spec = |shift: usize| {
            TextureSpec::new(Size::from((size.w >> shift, size.h >> shift)), format)
                .with_filter(Filter::Linear)
                .with_wrap(Wrap::ClampToEdge)
        };

        let mut levels = Vec::with_capacity(self.levels.len());
        for (i, level) in self.levels.iter_mut().enumerate() {
            levels.push(level.ensure(renderer, spec(i))?);
        }
        let helper = self.helper.ensure(renderer, spec(0))?;
        Ok((levels, helper))
    }

    fn textures(&mut self) -> impl Iterator<Item = TextureId> + '_ {
        self.levels
            .iter_mut()
            .chain(std::iter::once(&mut self.helper))
            .filter_map(|layer| layer.take())
    }
}

pub struct BlurEffect {
    table: Vec<BlurStrength>,
    iterations: usize,
    offset: f32,
    expand_size: i32,
    noise_strength: u8,
    simple: bool,
    blur_docks: bool,

    screens: HashMap<OutputId, ScreenTextures>,
    noise: Option<TextureId>,

    /// Area painted so far this frame, bottom to top.
    painted_area: Region,
    /// Area blurred so far this frame.
    current_blur: Region,
}

impl BlurEffect {
    pub fn new() -> Self {
        let table = strength_table();
        Self {
            table,
            iterations: 1,
            offset: 1.,
            expand_size: LEVELS[0].expand,
            noise_strength: 0,
            simple: false,
            blur_docks: false,
            screens: HashMap::new(),
            noise: None,
            painted_area: Region::new(),
            current_blur: Region::new(),
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn expand_size(&self) -> i32 {
        self.expand_size
    }

    /// Part of the window blurred behind it, relative to the window origin.
    pub fn blur_region(window: &EffectWindow) -> Region {
        let decoration = || {
            if !window.decoration_has_alpha {
                return None;
            }
            let blur = window.decoration_blur.as_ref()?;
            let mut region = Region::from_rect(window.rect());
            region.subtract_rect(window.decoration_inner);
            Some(region.intersected(blur))
        };

        match &window.blur_region {
            // An empty client region asks for the whole window.
            Some(app) if app.is_empty() => Region::from_rect(window.rect()),
            Some(app) => {
                let mut region = decoration().unwrap_or_default();
                region.union(
                    &app.translated(window.contents.loc)
                        .intersected_rect(window.decoration_inner),
                );
                region
            }
            None => decoration().unwrap_or_default(),
        }
    }

    fn should_blur(
        &self,
        ctx: &EffectsHandler,
        window: &EffectWindow,
        mask: PaintMask,
        data: &WindowPaintData,
    ) -> bool {
        if ctx.has_active_fullscreen_effect() && !window.force_blur {
            return false;
        }
        if window.is_desktop() {
            return false;
        }

        let scaled = data.x_scale != 1. && data.y_scale != 1.;
        let transformed = scaled || data.is_translated() || mask.contains(PaintMask::WINDOW_TRANSFORMED);
        if transformed && !window.force_blur {
            return false;
        }

        // Nothing shows through a fully opaque window.
        let translucent_decoration = window.decoration_has_alpha && window.has_decoration();
        window.has_alpha() || window.opacity < 1. || data.opacity < 1. || translucent_decoration
    }

    fn expand_for(&self, window: &EffectWindow) -> i32 {
        if window.is_dock() && !self.blur_docks {
            0
        } else {
            self.expand_size
        }
    }

    fn drop_screen_textures(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if let Some(mut textures) = self.screens.remove(&output) {
            for texture in textures.textures() {
                ctx.release_texture(texture);
            }
        }
    }

    fn ensure_noise(&mut self, renderer: &mut dyn Renderer) -> Result<TextureId, RenderError> {
        if let Some(texture) = self.noise.filter(|t| renderer.is_texture_valid(*t)) {
            return Ok(texture);
        }
        if let Some(lost) = self.noise.take() {
            renderer.free_texture(lost);
        }

        let strength = self.noise_strength.max(1);
        let pixels: Vec<u8> = (0..NOISE_SIZE * NOISE_SIZE)
            .map(|_| fastrand::u8(..strength))
            .collect();
        let spec = TextureSpec::new(Size::from((NOISE_SIZE, NOISE_SIZE)), TextureFormat::R8)
            .with_filter(Filter::Nearest)
            .with_wrap(Wrap::Repeat);
        let texture = renderer.upload_texture(spec, &pixels)?;
        self.noise = Some(texture);
        Ok(texture)
    }

    fn do_blur(
        &mut self,
        paint: &mut PaintContext,
        shape: &Region,
        opacity: f64,
        window_rect: Rectangle<i32, Logical>,
        expand: i32,
    ) -> Result<(), RenderError> {
        let _span = tracy_client::span!("BlurEffect::do_blur");

        let screen = paint.target.geometry;
        let size = paint.target.size;
        let format = match paint.target.color.transfer {
            TransferFunction::Srgb => TextureFormat::Rgba8,
            _ => TextureFormat::Rgba16F,
        };
        let (levels, helper) = self.screens.entry(paint.output).or_default().ensure(
            paint.renderer,
            size,
            format,
            self.iterations,
        )?;

        let expanded = shape
            .expanded(expand)
            .intersected_rect(expand_rect(screen, expand));
        let Some(source) = intersect_rect(expanded.bounding_rect(), screen) else {
            return Ok(());
        };
        paint.renderer.blit_to_texture(&paint.target, source, helper)?;

        let dst = to_f64(screen);
        let level_target = |i: usize| {
            RenderTarget::for_texture(
                levels[i],
                screen,
                Size::from((size.w >> i, size.h >> i)),
            )
        };

        // Bow-shaped so that the blur fades slower than the window.
        let alpha = {
            let o = 1. - opacity as f32;
            1. - o * o
        };

        let offset = self.offset;
        let pass = |texture, shader| TextureDraw::new(texture, shader, dst).with_region(expanded.clone());

        paint
            .renderer
            .draw_texture(&level_target(0), &pass(helper, ShaderKind::Copy))?;
        for i in 1..=self.iterations {
            paint.renderer.draw_texture(
                &level_target(i),
                &pass(levels[i - 1], ShaderKind::Downsample { offset }),
            )?;
        }
        for i in (1..self.iterations).rev() {
            paint.renderer.draw_texture(
                &level_target(i),
                &pass(levels[i + 1], ShaderKind::Upsample { offset }),
            )?;
        }

        let blend = if opacity < 1. {
            Blend::ConstantAlpha(alpha)
        } else {
            Blend::None
        };
        let last = TextureDraw::new(levels[1], ShaderKind::Upsample { offset }, dst)
            .with_region(shape.clone())
            .with_blend(blend);
        paint.renderer.draw_texture(&paint.target, &last)?;

        if self.noise_strength > 0 && !self.simple {
            let noise = self.ensure_noise(paint.renderer)?;
            let blend = if opacity < 1. {
                Blend::ConstantAlphaAdditive(alpha)
            } else {
                Blend::Additive
            };
            let draw = TextureDraw::new(noise, ShaderKind::Noise, to_f64(window_rect))
                .with_region(shape.clone())
                .with_blend(blend);
            paint.renderer.draw_texture(&paint.target, &draw)?;
        }

        Ok(())
    }
}

impl Default for BlurEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves and scales the blur shape along with a transformed window.
fn transform_shape(shape: &Region, data: &WindowPaintData) -> Region {
    if data.is_scaled() {
        let origin = shape.bounding_rect().loc;
        Region::from_rects(shape.rects().iter().map(|r| {
            let x = f64::from(origin.x)
                + f64::from(r.loc.x - origin.x) * data.x_scale
                + data.x_translation;
            let y = f64::from(origin.y)
                + f64::from(r.loc.y - origin.y) * data.y_scale
                + data.y_translation;
            let x2 = (x + f64::from(r.size.w) * data.x_scale).floor() as i32;
            let y2 = (y + f64::from(r.size.h) * data.y_scale).floor() as i32;
            let (x, y) = (x.floor() as i32, y.floor() as i32);
            rect(x, y, x2 - x, y2 - y)
        }))
    } else if data.is_translated() {
        Region::from_rects(shape.rects().iter().map(|r| {
            let x = f64::from(r.loc.x) + data.x_translation;
            let y = f64::from(r.loc.y) + data.y_translation;
            let x1 = x.ceil() as i32;
            let y1 = y.ceil() as i32;
            let x2 = (x + f64::from(r.size.w)).floor() as i32;
            let y2 = (y + f64::from(r.size.h)).floor() as i32;
            rect(x1, y1, x2 - x1, y2 - y1)
        }))
    } else {
        shape.clone()
    }
}

impl Effect for BlurEffect {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requested_position(&self) -> i32 {
        75
    }

    fn supported(&self, ctx: &EffectsHandler, renderer: &dyn Renderer) -> bool {
        let size = ctx.virtual_screen_geometry().size;
        let max = renderer.max_texture_size();
        if size.w > max || size.h > max {
            debug!(
                "virtual screen {} × {} exceeds the maximum texture size {max}",
                size.w, size.h
            );
            return false;
        }
        true
    }

    fn reconfigure(&mut self, ctx: &mut EffectsHandler, flags: ReconfigureFlags) {
        let config = ctx.config.blur;
        let strength = usize::from(config.strength()).clamp(1, self.table.len());
        let step = self.table[strength - 1];
        self.simple = config.simple;
        if self.simple {
            // One pass down and up, at the mildest usable offset.
            self.iterations = 1;
            self.offset = step.offset.min(LEVELS[0].max);
            self.expand_size = LEVELS[0].expand;
        } else {
            self.iterations = step.iterations;
            self.offset = step.offset;
            self.expand_size = LEVELS[step.iterations - 1].expand;
        }
        self.blur_docks = config.blur_docks;

        let noise_strength = config.noise_strength();
        if noise_strength != self.noise_strength {
            if let Some(texture) = self.noise.take() {
                ctx.release_texture(texture);
            }
            self.noise_strength = noise_strength;
        }

        if flags.contains(ReconfigureFlags::INITIAL) {
            ctx.announce_support_property(BLUR_BEHIND_PROPERTY, NAME);
        }
        debug!(
            "blur strength {strength}: {} iterations, offset {}",
            self.iterations, self.offset
        );
        ctx.add_repaint_full();
    }

    fn is_active(&self, ctx: &EffectsHandler) -> bool {
        !ctx.is_screen_locked()
    }

    fn provides(&self, feature: Feature) -> bool {
        feature == Feature::Blur
    }

    fn pre_paint_screen(
        &mut self,
        ctx: &mut EffectsHandler,
        data: &mut ScreenPrePaintData,
        time: FrameTime,
        next: Chain,
    ) {
        self.painted_area.clear();
        self.current_blur.clear();
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
        // Relies on windows being pre-painted bottom to top.
        next.pre_paint_window(ctx, window, data, time);

        // Blurring partially below a window needs the samples around its edges.
        let old_opaque = std::mem::take(&mut data.opaque);
        data.opaque = old_opaque.shrunk_rects(self.expand_size);
        self.current_blur.subtract(&data.opaque);

        if data.paint.subtracted(&old_opaque).intersects(&self.current_blur) {
            data.paint.union(&self.current_blur);
        }

        let screen = ctx.virtual_screen_geometry();
        let blur_area = Self::blur_region(window)
            .translated(window.pos())
            .intersected_rect(screen);
        // Everything the kernel samples.
        let expanded = blur_area
            .expanded(self.expand_for(window))
            .intersected_rect(screen);

        if self.painted_area.intersects(&expanded) || data.paint.intersects(&blur_area) {
            data.paint.union(&expanded);
            if expanded.intersects(&self.current_blur) {
                data.paint.union(&self.current_blur);
            }
        }

        self.current_blur.union(&expanded);
        self.painted_area.subtract(&data.opaque);
        self.painted_area.union(&data.paint);
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
        if self.should_blur(ctx, window, mask, data) {
            let shape = Self::blur_region(window).translated(window.pos());
            let shape = transform_shape(&shape, data).intersected(region);
            if !shape.is_empty() {
                let expand = self.expand_for(window);
                if let Err(err) = self.do_blur(paint, &shape, data.opacity, window.geometry, expand) {
                    warn!("error blurring behind {}: {err}", window.id);
                }
            }
        }

        next.paint_window(ctx, paint, window, mask, region, data);
    }

    fn unloading(&mut self, ctx: &mut EffectsHandler) {
        let outputs: Vec<_> = self.screens.keys().copied().collect();
        for output in outputs {
            self.drop_screen_textures(ctx, output);
        }
        if let Some(texture) = self.noise.take() {
            ctx.release_texture(texture);
        }
        ctx.remove_support_property(BLUR_BEHIND_PROPERTY, NAME);
    }

    fn screen_removed(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        self.drop_screen_textures(ctx, output);
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use insta::assert_snapshot;

    use super::*;
    use crate::render_helpers::recording::{RecordingRenderer, RenderOp};
    use crate::render_helpers::RenderTargetKind;
    use crate::window::StaticSurface;

    fn setup(strength: u8, noise: u8) -> (EffectsHandler, BlurEffect) {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.blur.strength = strength;
        ctx.config.blur.noise_strength = noise;
        let mut effect = BlurEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);
        (ctx, effect)
    }

    fn add_window(ctx: &mut EffectsHandler, surface: StaticSurface) -> EffectWindow {
        let id = ctx.windows.add(Box::new(surface));
        ctx.windows.get(id).unwrap().clone()
    }

    fn blurred(geometry: Rectangle<i32, Logical>) -> StaticSurface {
        let mut surface = StaticSurface::new(geometry);
        surface.blur_region = Some(Region::new());
        surface
    }

    fn paint_one(
        ctx: &mut EffectsHandler,
        effect: &mut BlurEffect,
        renderer: &mut RecordingRenderer,
        window: &EffectWindow,
        mask: PaintMask,
        data: &mut WindowPaintData,
    ) {
        let output = ctx.outputs.ids()[0];
        let target = RenderTarget::for_output(ctx.outputs.get(output).unwrap());
        let screen = target.geometry;
        let mut paint = PaintContext {
            renderer,
            target,
            output,
            screen,
        };
        let region = Region::from_rect(screen);
        effect.paint_window(ctx, &mut paint, window, mask, &region, data, Chain::empty());
    }

    fn draws(renderer: &RecordingRenderer) -> Vec<(Option<TextureId>, RenderTargetKind, ShaderKind)> {
        renderer
            .ops()
            .iter()
            .filter_map(|op| match op {
                RenderOp::DrawTexture { target, draw } => Some((draw.texture, *target, draw.shader)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn strength_table_spreads_over_levels() {
        let mut out = String::new();
        for (i, step) in strength_table().iter().enumerate() {
            writeln!(out, "{}: {} × {:.2}", i + 1, step.iterations, step.offset).unwrap();
        }
        assert_snapshot!(out, @r"
        1: 1 × 1.50
        2: 1 × 2.00
        3: 2 × 2.50
        4: 2 × 3.00
        5: 3 × 2.60
        6: 3 × 3.20
        7: 3 × 3.80
        8: 3 × 4.40
        9: 3 × 5.00
        10: 4 × 3.83
        11: 4 × 4.67
        12: 4 × 5.50
        13: 4 × 6.33
        14: 4 × 7.17
        15: 4 × 8.00
        ");
    }

    #[test]
    fn three_iteration_chain() {
        let (mut ctx, mut effect) = setup(9, 0);
        assert_eq!(effect.iterations(), 3);
        assert_eq!(effect.offset(), 5.);
        assert_eq!(effect.expand_size(), 50);

        let window = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));
        let mut renderer = RecordingRenderer::new();
        let mut data = WindowPaintData::new(1., Vec::new());
        paint_one(
            &mut ctx,
            &mut effect,
            &mut renderer,
            &window,
            PaintMask::WINDOW_TRANSLUCENT,
            &mut data,
        );

        let textures = renderer.live_textures();
        let sizes: Vec<_> = textures.iter().map(|(_, s)| (s.size.w, s.size.h)).collect();
        assert_eq!(
            sizes,
            [(1920, 1080), (960, 540), (480, 270), (240, 135), (1920, 1080)]
        );
        let ids: Vec<_> = textures.iter().map(|(id, _)| *id).collect();
        let (tex, helper) = (&ids[..4], ids[4]);

        let output = RenderTargetKind::Output(ctx.outputs.ids()[0]);
        let offset = 5.;
        let texture = RenderTargetKind::Texture;
        assert_eq!(
            draws(&renderer),
            [
                (Some(helper), texture(tex[0]), ShaderKind::Copy),
                (Some(tex[0]), texture(tex[1]), ShaderKind::Downsample { offset }),
                (Some(tex[1]), texture(tex[2]), ShaderKind::Downsample { offset }),
                (Some(tex[2]), texture(tex[3]), ShaderKind::Downsample { offset }),
                (Some(tex[3]), texture(tex[2]), ShaderKind::Upsample { offset }),
                (Some(tex[2]), texture(tex[1]), ShaderKind::Upsample { offset }),
                (Some(tex[1]), output, ShaderKind::Upsample { offset }),
            ]
        );

        // The area behind the window plus what the passes sample around it.
        let blit = renderer.ops().iter().find_map(|op| match op {
            RenderOp::Blit { src, texture, .. } => Some((*src, *texture)),
            _ => None,
        });
        assert_eq!(blit, Some((rect(50, 50, 500, 400), helper)));
        let last = renderer.ops().iter().rev().find_map(|op| match op {
            RenderOp::DrawTexture { target, draw } if *target == output => Some(draw.region.clone()),
            _ => None,
        });
        assert_eq!(last, Some(Region::from_rect(rect(100, 100, 400, 300))));
    }

    #[test]
    fn windows_without_blur_region_cost_nothing() {
        let (mut ctx, mut effect) = setup(12, 5);
        let window = add_window(&mut ctx, StaticSurface::new(rect(100, 100, 400, 300)));
        let mut renderer = RecordingRenderer::new();
        let mut data = WindowPaintData::new(1., Vec::new());
        paint_one(
            &mut ctx,
            &mut effect,
            &mut renderer,
            &window,
            PaintMask::WINDOW_TRANSLUCENT,
            &mut data,
        );

        assert!(renderer.live_textures().is_empty());
        assert!(matches!(renderer.ops(), [RenderOp::DrawWindow { .. }]));
    }

    #[test]
    fn translucent_window_modulates_blur_and_noise() {
        let (mut ctx, mut effect) = setup(12, 5);
        let window = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));
        let mut renderer = RecordingRenderer::new();
        let mut data = WindowPaintData::new(0.5, Vec::new());
        paint_one(
            &mut ctx,
            &mut effect,
            &mut renderer,
            &window,
            PaintMask::WINDOW_TRANSLUCENT,
            &mut data,
        );

        let output = RenderTargetKind::Output(ctx.outputs.ids()[0]);
        let blends: Vec<_> = renderer
            .ops()
            .iter()
            .filter_map(|op| match op {
                RenderOp::DrawTexture { target, draw } if *target == output => {
                    Some((draw.shader, draw.blend))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            blends,
            [
                (ShaderKind::Upsample { offset: 5.5 }, Blend::ConstantAlpha(0.75)),
                (ShaderKind::Noise, Blend::ConstantAlphaAdditive(0.75)),
            ]
        );
        assert!(renderer
            .ops()
            .iter()
            .any(|op| matches!(op, RenderOp::UploadTexture { len, .. } if *len == 256 * 256)));
    }

    #[test]
    fn no_blur_behind_transformed_or_during_fullscreen_effects() {
        let (mut ctx, mut effect) = setup(12, 0);
        let window = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));
        let data = WindowPaintData::new(1., Vec::new());

        assert!(effect.should_blur(&ctx, &window, PaintMask::WINDOW_TRANSLUCENT, &data));
        assert!(!effect.should_blur(&ctx, &window, PaintMask::WINDOW_TRANSFORMED, &data));

        let mut moved = data.clone();
        moved.translate(10., 0.);
        assert!(!effect.should_blur(&ctx, &window, PaintMask::WINDOW_TRANSLUCENT, &moved));

        ctx.set_fullscreen_effect("overview");
        assert!(!effect.should_blur(&ctx, &window, PaintMask::WINDOW_TRANSLUCENT, &data));

        let mut forced = window.clone();
        forced.force_blur = true;
        assert!(effect.should_blur(&ctx, &forced, PaintMask::WINDOW_TRANSFORMED, &moved));
    }

    #[test]
    fn blur_region_sources() {
        let mut surface = StaticSurface::new(rect(0, 0, 200, 100));
        surface.decoration_inner = Some(rect(5, 30, 190, 65));
        surface.decoration_has_alpha = true;
        surface.decoration_blur = Some(Region::from_rect(rect(0, 0, 200, 30)));
        let mut ctx = EffectsHandler::new_for_tests();
        let window = add_window(&mut ctx, surface.clone());
        assert_eq!(
            BlurEffect::blur_region(&window),
            Region::from_rect(rect(0, 0, 200, 30))
        );

        surface.blur_region = Some(Region::from_rect(rect(0, 30, 1000, 10)));
        let window = add_window(&mut ctx, surface);
        let mut expected = Region::from_rect(rect(0, 0, 200, 30));
        expected.add_rect(rect(5, 30, 190, 10));
        assert_eq!(BlurEffect::blur_region(&window), expected);
    }

    #[test]
    fn repainting_below_blur_repaints_blurred_area() {
        let (mut ctx, mut effect) = setup(12, 0);
        let below = add_window(&mut ctx, StaticSurface::opaque(rect(0, 0, 800, 600)));
        let above = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));

        let mut screen = ScreenPrePaintData {
            mask: PaintMask::SCREEN_REGION,
            paint: Region::new(),
            output: ctx.outputs.ids()[0],
            screen: rect(0, 0, 1920, 1080),
        };
        let time = FrameTime::new(Default::default(), None);
        effect.pre_paint_screen(&mut ctx, &mut screen, time, Chain::empty());

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::from_rect(rect(110, 110, 10, 10)),
            opaque: below.global_opaque(),
        };
        effect.pre_paint_window(&mut ctx, &below, &mut data, time, Chain::empty());

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_TRANSLUCENT,
            paint: Region::new(),
            opaque: Region::new(),
        };
        effect.pre_paint_window(&mut ctx, &above, &mut data, time, Chain::empty());
        // Grown by what the four passes sample, and clipped to the screen.
        assert_eq!(effect.expand_size(), 150);
        assert_eq!(data.paint, Region::from_rect(rect(0, 0, 650, 550)));
    }

    #[test]
    fn repainting_next_to_blur_repaints_sampled_area() {
        let (mut ctx, mut effect) = setup(12, 0);
        let below = add_window(&mut ctx, StaticSurface::opaque(rect(0, 0, 800, 600)));
        let above = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));

        let mut screen = ScreenPrePaintData {
            mask: PaintMask::SCREEN_REGION,
            paint: Region::new(),
            output: ctx.outputs.ids()[0],
            screen: rect(0, 0, 1920, 1080),
        };
        let time = FrameTime::new(Default::default(), None);
        effect.pre_paint_screen(&mut ctx, &mut screen, time, Chain::empty());

        // Outside the blurred rect, but within reach of the kernel.
        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::from_rect(rect(95, 95, 4, 4)),
            opaque: below.global_opaque(),
        };
        effect.pre_paint_window(&mut ctx, &below, &mut data, time, Chain::empty());
        // Clips shrink even before anything above is blurred.
        assert_eq!(data.opaque, Region::from_rect(rect(150, 150, 500, 300)));

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_TRANSLUCENT,
            paint: Region::new(),
            opaque: Region::new(),
        };
        effect.pre_paint_window(&mut ctx, &above, &mut data, time, Chain::empty());
        assert!(data.paint.contains(&Region::from_rect(rect(95, 95, 4, 4))));
        assert_eq!(data.paint, Region::from_rect(rect(0, 0, 650, 550)));
    }

    #[test]
    fn repainting_far_from_blur_leaves_it_alone() {
        let (mut ctx, mut effect) = setup(1, 0);
        let below = add_window(&mut ctx, StaticSurface::opaque(rect(0, 0, 800, 600)));
        let above = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));

        let mut screen = ScreenPrePaintData {
            mask: PaintMask::SCREEN_REGION,
            paint: Region::new(),
            output: ctx.outputs.ids()[0],
            screen: rect(0, 0, 1920, 1080),
        };
        let time = FrameTime::new(Default::default(), None);
        effect.pre_paint_screen(&mut ctx, &mut screen, time, Chain::empty());

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::from_rect(rect(700, 500, 10, 10)),
            opaque: below.global_opaque(),
        };
        effect.pre_paint_window(&mut ctx, &below, &mut data, time, Chain::empty());

        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_TRANSLUCENT,
            paint: Region::new(),
            opaque: Region::new(),
        };
        effect.pre_paint_window(&mut ctx, &above, &mut data, time, Chain::empty());
        assert!(data.paint.is_empty());
    }

    #[test]
    fn simple_blur_is_one_pass_without_noise() {
        let mut ctx = EffectsHandler::new_for_tests();
        ctx.config.blur.strength = 12;
        ctx.config.blur.noise_strength = 5;
        ctx.config.blur.simple = true;
        let mut effect = BlurEffect::new();
        effect.reconfigure(&mut ctx, ReconfigureFlags::ALL);
        assert_eq!(effect.iterations(), 1);
        assert_eq!(effect.offset(), 2.);
        assert_eq!(effect.expand_size(), 10);

        let window = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));
        let mut renderer = RecordingRenderer::new();
        let mut data = WindowPaintData::new(1., Vec::new());
        paint_one(
            &mut ctx,
            &mut effect,
            &mut renderer,
            &window,
            PaintMask::WINDOW_TRANSLUCENT,
            &mut data,
        );

        let ids: Vec<_> = renderer.live_textures().iter().map(|(id, _)| *id).collect();
        let (tex, helper) = (&ids[..2], ids[2]);
        let output = RenderTargetKind::Output(ctx.outputs.ids()[0]);
        let texture = RenderTargetKind::Texture;
        let offset = 2.;
        assert_eq!(
            draws(&renderer),
            [
                (Some(helper), texture(tex[0]), ShaderKind::Copy),
                (Some(tex[0]), texture(tex[1]), ShaderKind::Downsample { offset }),
                (Some(tex[1]), output, ShaderKind::Upsample { offset }),
            ]
        );
    }

    #[test]
    fn opaque_windows_are_not_blurred_behind() {
        let (mut ctx, effect) = setup(12, 0);
        let data = WindowPaintData::new(1., Vec::new());

        let mut surface = StaticSurface::opaque(rect(100, 100, 400, 300));
        surface.blur_region = Some(Region::new());
        let window = add_window(&mut ctx, surface.clone());
        assert!(!window.has_alpha());
        assert!(!effect.should_blur(&ctx, &window, PaintMask::WINDOW_OPAQUE, &data));

        let faded = WindowPaintData::new(0.5, Vec::new());
        assert!(effect.should_blur(&ctx, &window, PaintMask::WINDOW_TRANSLUCENT, &faded));

        surface.decoration_inner = Some(rect(5, 30, 390, 265));
        surface.decoration_has_alpha = true;
        let window = add_window(&mut ctx, surface);
        assert!(window.has_decoration());
        assert!(effect.should_blur(&ctx, &window, PaintMask::WINDOW_OPAQUE, &data));
    }

    #[test]
    fn removed_screen_frees_textures() {
        let (mut ctx, mut effect) = setup(3, 0);
        let window = add_window(&mut ctx, blurred(rect(100, 100, 400, 300)));
        let mut renderer = RecordingRenderer::new();
        let mut data = WindowPaintData::new(1., Vec::new());
        paint_one(
            &mut ctx,
            &mut effect,
            &mut renderer,
            &window,
            PaintMask::WINDOW_TRANSLUCENT,
            &mut data,
        );
        assert_eq!(renderer.live_textures().len(), 4);

        effect.screen_removed(&mut ctx, ctx.outputs.ids()[0]);
        for texture in ctx.take_garbage() {
            renderer.free_texture(texture);
        }
        assert!(renderer.live_textures().is_empty());
    }

    #[test]
    fn too_large_screens_are_unsupported() {
        let ctx = EffectsHandler::new_for_tests();
        let effect = BlurEffect::new();
        assert!(effect.supported(&ctx, &RecordingRenderer::new()));
        assert!(!effect.supported(&ctx, &RecordingRenderer::new().with_max_texture_size(1024)));
    }

    #[test]
    fn shape_follows_translation() {
        let shape = Region::from_rect(rect(10, 10, 100, 50));
        let mut data = WindowPaintData::new(1., Vec::new());
        data.translate(5.5, 0.);
        assert_eq!(transform_shape(&shape, &data), Region::from_rect(rect(16, 10, 99, 50)));

        let mut data = WindowPaintData::new(1., Vec::new());
        data.scale(0.5, 0.5);
        assert_eq!(transform_shape(&shape, &data), Region::from_rect(rect(10, 10, 50, 25)));
    }
}

//! Renderer abstraction used by the pipeline and the effects.
//!
//! The pipeline never talks to a GPU API directly. It records drawing through the [`Renderer`]
//! trait into [`RenderTarget`]s, which are either an output framebuffer or an offscreen texture.

use std::fmt;

use glam::{Mat4, Vec3};
use smithay::utils::{Logical, Physical, Rectangle, Size, Transform};

use crate::output::{Output, OutputId};
use crate::paint::WindowPaintData;
use crate::utils::id::IdCounter;
use crate::utils::region::Region;
use crate::window::EffectWindow;

pub mod offscreen;
pub mod recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

static TEXTURE_ID_COUNTER: IdCounter = IdCounter::new();

impl TextureId {
    pub fn next() -> Self {
        Self(TEXTURE_ID_COUNTER.next())
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Single channel, sampled as gray.
    R8,
    Rgba8,
    Rgba16F,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgba16F => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSpec {
    pub size: Size<i32, Physical>,
    pub format: TextureFormat,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl TextureSpec {
    pub fn new(size: Size<i32, Physical>, format: TextureFormat) -> Self {
        Self {
            size,
            format,
            filter: Filter::Linear,
            wrap: Wrap::ClampToEdge,
        }
    }

    pub fn with_filter(self, filter: Filter) -> Self {
        Self { filter, ..self }
    }

    pub fn with_wrap(self, wrap: Wrap) -> Self {
        Self { wrap, ..self }
    }
}

/// Shader programs a texture can be drawn through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderKind {
    /// Plain textured copy.
    Copy,
    /// Dual-kawase downsample pass with the given sample offset.
    Downsample { offset: f32 },
    /// Dual-kawase upsample pass with the given sample offset.
    Upsample { offset: f32 },
    /// Tiles a noise texture over the destination.
    Noise,
    /// Samples the texture with the destination mapped through the transform.
    MapTexture,
    /// Nearest-neighbour sampling with visible pixel borders.
    PixelGrid,
    /// Fills the destination, the texture is ignored.
    SolidColor([f32; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Blend {
    /// Overwrite the destination.
    None,
    /// Premultiplied alpha over.
    Premultiplied,
    /// `CONSTANT_ALPHA, ONE_MINUS_CONSTANT_ALPHA` with the given alpha.
    ConstantAlpha(f32),
    /// `ONE, ONE`.
    Additive,
    /// `CONSTANT_ALPHA, ONE` with the given alpha.
    ConstantAlphaAdditive(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferFunction {
    #[default]
    Srgb,
    Linear,
    Pq,
}

/// Color encoding of a render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorDescription {
    pub transfer: TransferFunction,
    /// Luminance of SDR white in nits.
    pub sdr_white: f64,
}

impl Default for ColorDescription {
    fn default() -> Self {
        Self {
            transfer: TransferFunction::Srgb,
            sdr_white: 80.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    Output(OutputId),
    Texture(TextureId),
}

/// A drawable destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub kind: RenderTargetKind,
    /// Area of the global logical space this target shows.
    pub geometry: Rectangle<i32, Logical>,
    /// Size in device pixels.
    pub size: Size<i32, Physical>,
    pub color: ColorDescription,
    /// Transform from logical layout to the native layout of the buffer.
    pub transform: Transform,
}

impl RenderTarget {
    pub fn for_output(output: &Output) -> Self {
        Self {
            kind: RenderTargetKind::Output(output.id()),
            geometry: output.geometry(),
            size: output.physical_size(),
            color: ColorDescription::default(),
            transform: output.transform(),
        }
    }

    pub fn for_texture(
        texture: TextureId,
        geometry: Rectangle<i32, Logical>,
        size: Size<i32, Physical>,
    ) -> Self {
        Self {
            kind: RenderTargetKind::Texture(texture),
            geometry,
            size,
            color: ColorDescription::default(),
            transform: Transform::Normal,
        }
    }

    pub fn output(&self) -> Option<OutputId> {
        match self.kind {
            RenderTargetKind::Output(id) => Some(id),
            RenderTargetKind::Texture(_) => None,
        }
    }

    pub fn texture(&self) -> Option<TextureId> {
        match self.kind {
            RenderTargetKind::Output(_) => None,
            RenderTargetKind::Texture(id) => Some(id),
        }
    }

    /// Device pixels per logical pixel along x.
    pub fn scale(&self) -> f64 {
        let size = self.transform.invert().transform_size(self.size);
        if self.geometry.size.w <= 0 {
            return 1.;
        }
        f64::from(size.w) / f64::from(self.geometry.size.w)
    }

    /// Orthographic projection from global logical coordinates to clip space.
    ///
    /// Texture targets are stored bottom-up, so their projection is flipped along y.
    pub fn projection(&self) -> Mat4 {
        let g = self.geometry;
        let left = g.loc.x as f32;
        let right = (g.loc.x + g.size.w) as f32;
        let top = g.loc.y as f32;
        let bottom = (g.loc.y + g.size.h) as f32;

        let ortho = match self.kind {
            RenderTargetKind::Output(_) => Mat4::orthographic_rh_gl(left, right, bottom, top, 0., 65535.),
            RenderTargetKind::Texture(_) => Mat4::orthographic_rh_gl(left, right, top, bottom, 0., 65535.),
        };
        transform_matrix(self.transform) * ortho
    }
}

/// Rotation and flip part of an output transform in clip space.
pub fn transform_matrix(transform: Transform) -> Mat4 {
    let (angle, flipped) = match transform {
        Transform::Normal => (0., false),
        Transform::_90 => (90., false),
        Transform::_180 => (180., false),
        Transform::_270 => (270., false),
        Transform::Flipped => (0., true),
        Transform::Flipped90 => (90., true),
        Transform::Flipped180 => (180., true),
        Transform::Flipped270 => (270., true),
    };

    let rotation = Mat4::from_rotation_z(f32::to_radians(angle));
    if flipped {
        Mat4::from_scale(Vec3::new(-1., 1., 1.)) * rotation
    } else {
        rotation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDraw {
    /// Source texture, `None` for [`ShaderKind::SolidColor`].
    pub texture: Option<TextureId>,
    pub shader: ShaderKind,
    pub blend: Blend,
    /// Destination rectangle in global logical coordinates.
    pub dst: Rectangle<f64, Logical>,
    /// Extra transform applied on top of the target projection.
    pub transform: Mat4,
    /// Part of the destination to touch.
    pub region: Region,
}

impl TextureDraw {
    pub fn new(texture: TextureId, shader: ShaderKind, dst: Rectangle<f64, Logical>) -> Self {
        Self {
            texture: Some(texture),
            shader,
            blend: Blend::None,
            dst,
            transform: Mat4::IDENTITY,
            region: Region::new(),
        }
    }

    pub fn solid(color: [f32; 4], dst: Rectangle<f64, Logical>) -> Self {
        Self {
            texture: None,
            shader: ShaderKind::SolidColor(color),
            blend: Blend::Premultiplied,
            dst,
            transform: Mat4::IDENTITY,
            region: Region::new(),
        }
    }

    pub fn with_blend(self, blend: Blend) -> Self {
        Self { blend, ..self }
    }

    pub fn with_region(self, region: Region) -> Self {
        Self { region, ..self }
    }

    pub fn with_transform(self, transform: Mat4) -> Self {
        Self { transform, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// The backend refused to allocate a texture.
    AllocationFailed,
    /// Requested texture exceeds the maximum texture size.
    TextureTooLarge,
    /// A texture was used after it was freed or lost.
    InvalidTexture,
    /// The rendering context went away.
    ContextLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RenderError::AllocationFailed => "texture allocation failed",
            RenderError::TextureTooLarge => "texture exceeds the maximum texture size",
            RenderError::InvalidTexture => "texture is no longer valid",
            RenderError::ContextLost => "rendering context lost",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for RenderError {}

/// Operations the pipeline needs from a rendering backend.
pub trait Renderer {
    fn max_texture_size(&self) -> i32;

    fn alloc_texture(&mut self, spec: TextureSpec) -> Result<TextureId, RenderError>;

    fn free_texture(&mut self, texture: TextureId);

    /// Allocates a texture filled with tightly packed pixels in the format of `spec`.
    fn upload_texture(&mut self, spec: TextureSpec, pixels: &[u8]) -> Result<TextureId, RenderError>;

    fn texture_spec(&self, texture: TextureId) -> Option<TextureSpec>;

    /// Whether the texture can still be rendered into and sampled from.
    fn is_texture_valid(&self, texture: TextureId) -> bool {
        self.texture_spec(texture).is_some()
    }

    fn clear(
        &mut self,
        target: &RenderTarget,
        region: &Region,
        color: [f32; 4],
    ) -> Result<(), RenderError>;

    /// Draws the contents of a window with the given transformations, clipped to `region`.
    fn draw_window(
        &mut self,
        target: &RenderTarget,
        window: &EffectWindow,
        data: &WindowPaintData,
        region: &Region,
    ) -> Result<(), RenderError>;

    /// Copies `src`, in global logical coordinates, of `source` into the texture.
    fn blit_to_texture(
        &mut self,
        source: &RenderTarget,
        src: Rectangle<i32, Logical>,
        texture: TextureId,
    ) -> Result<(), RenderError>;

    fn draw_texture(&mut self, target: &RenderTarget, draw: &TextureDraw)
        -> Result<(), RenderError>;
}

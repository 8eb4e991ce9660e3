//! Renderer that records operations instead of drawing.
//!
//! Used by the headless backend and in tests, where comparing op lists stands in for comparing
//! pixels.

use std::collections::{HashMap, HashSet};

use smithay::utils::{Logical, Rectangle};

use super::{
    RenderError, RenderTarget, RenderTargetKind, Renderer, TextureDraw, TextureId, TextureSpec,
};
use crate::paint::WindowPaintData;
use crate::utils::region::Region;
use crate::window::{EffectWindow, WindowId};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    AllocTexture {
        texture: TextureId,
        spec: TextureSpec,
    },
    FreeTexture(TextureId),
    UploadTexture {
        texture: TextureId,
        spec: TextureSpec,
        len: usize,
    },
    Clear {
        target: RenderTargetKind,
        region: Region,
        color: [f32; 4],
    },
    DrawWindow {
        target: RenderTargetKind,
        window: WindowId,
        data: WindowPaintData,
        region: Region,
    },
    Blit {
        source: RenderTargetKind,
        src: Rectangle<i32, Logical>,
        texture: TextureId,
    },
    DrawTexture {
        target: RenderTargetKind,
        draw: TextureDraw,
    },
}

impl RenderOp {
    pub fn target(&self) -> Option<RenderTargetKind> {
        match self {
            RenderOp::Clear { target, .. }
            | RenderOp::DrawWindow { target, .. }
            | RenderOp::DrawTexture { target, .. } => Some(*target),
            RenderOp::Blit { texture, .. } => Some(RenderTargetKind::Texture(*texture)),
            RenderOp::AllocTexture { .. }
            | RenderOp::FreeTexture(_)
            | RenderOp::UploadTexture { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct RecordingRenderer {
    ops: Vec<RenderOp>,
    textures: HashMap<TextureId, TextureSpec>,
    lost: HashSet<TextureId>,
    max_texture_size: i32,
    fail_allocations: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            textures: HashMap::new(),
            lost: HashSet::new(),
            max_texture_size: 16384,
            fail_allocations: false,
        }
    }

    pub fn with_max_texture_size(mut self, size: i32) -> Self {
        self.max_texture_size = size;
        self
    }

    /// Makes every following allocation fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Simulates losing a texture, e.g. after a GPU reset.
    pub fn invalidate(&mut self, texture: TextureId) {
        if self.textures.contains_key(&texture) {
            self.lost.insert(texture);
        }
    }

    pub fn ops(&self) -> &[RenderOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<RenderOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Live textures sorted by id.
    pub fn live_textures(&self) -> Vec<(TextureId, TextureSpec)> {
        let mut textures: Vec<_> = self.textures.iter().map(|(id, spec)| (*id, *spec)).collect();
        textures.sort_by_key(|(id, _)| *id);
        textures
    }

    /// Union of the regions drawn into the target by the recorded ops.
    pub fn painted_region(&self, target: RenderTargetKind) -> Region {
        let mut painted = Region::new();
        for op in &self.ops {
            match op {
                RenderOp::Clear { target: t, region, .. }
                | RenderOp::DrawWindow { target: t, region, .. }
                    if *t == target =>
                {
                    painted.union(region);
                }
                RenderOp::DrawTexture { target: t, draw } if *t == target => {
                    painted.union(&draw.region);
                }
                _ => (),
            }
        }
        painted
    }

    fn check_target(&self, target: &RenderTarget) -> Result<(), RenderError> {
        match target.kind {
            RenderTargetKind::Output(_) => Ok(()),
            RenderTargetKind::Texture(id) => self.check_texture(id),
        }
    }

    fn check_texture(&self, texture: TextureId) -> Result<(), RenderError> {
        if self.is_texture_valid(texture) {
            Ok(())
        } else {
            Err(RenderError::InvalidTexture)
        }
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for RecordingRenderer {
    fn max_texture_size(&self) -> i32 {
        self.max_texture_size
    }

    fn alloc_texture(&mut self, spec: TextureSpec) -> Result<TextureId, RenderError> {
        if spec.size.w > self.max_texture_size || spec.size.h > self.max_texture_size {
            return Err(RenderError::TextureTooLarge);
        }
        if self.fail_allocations || spec.size.w <= 0 || spec.size.h <= 0 {
            return Err(RenderError::AllocationFailed);
        }

        let texture = TextureId::next();
        self.textures.insert(texture, spec);
        self.ops.push(RenderOp::AllocTexture { texture, spec });
        Ok(texture)
    }

    fn free_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.lost.remove(&texture);
            self.ops.push(RenderOp::FreeTexture(texture));
        }
    }

    fn upload_texture(&mut self, spec: TextureSpec, pixels: &[u8]) -> Result<TextureId, RenderError> {
        let expected =
            (spec.size.w.max(0) * spec.size.h.max(0)) as usize * spec.format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(RenderError::AllocationFailed);
        }

        let texture = self.alloc_texture(spec)?;
        self.ops.push(RenderOp::UploadTexture {
            texture,
            spec,
            len: pixels.len(),
        });
        Ok(texture)
    }

    fn texture_spec(&self, texture: TextureId) -> Option<TextureSpec> {
        self.textures.get(&texture).copied()
    }

    fn is_texture_valid(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture) && !self.lost.contains(&texture)
    }

    fn clear(
        &mut self,
        target: &RenderTarget,
        region: &Region,
        color: [f32; 4],
    ) -> Result<(), RenderError> {
        self.check_target(target)?;
        self.ops.push(RenderOp::Clear {
            target: target.kind,
            region: region.clone(),
            color,
        });
        Ok(())
    }

    fn draw_window(
        &mut self,
        target: &RenderTarget,
        window: &EffectWindow,
        data: &WindowPaintData,
        region: &Region,
    ) -> Result<(), RenderError> {
        self.check_target(target)?;
        self.ops.push(RenderOp::DrawWindow {
            target: target.kind,
            window: window.id,
            data: data.clone(),
            region: region.clone(),
        });
        Ok(())
    }

    fn blit_to_texture(
        &mut self,
        source: &RenderTarget,
        src: Rectangle<i32, Logical>,
        texture: TextureId,
    ) -> Result<(), RenderError> {
        self.check_target(source)?;
        self.check_texture(texture)?;
        self.ops.push(RenderOp::Blit {
            source: source.kind,
            src,
            texture,
        });
        Ok(())
    }

    fn draw_texture(
        &mut self,
        target: &RenderTarget,
        draw: &TextureDraw,
    ) -> Result<(), RenderError> {
        self.check_target(target)?;
        if let Some(texture) = draw.texture {
            self.check_texture(texture)?;
        }
        self.ops.push(RenderOp::DrawTexture {
            target: target.kind,
            draw: draw.clone(),
        });
        Ok(())
    }
}

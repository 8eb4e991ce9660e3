use smithay::utils::{Logical, Rectangle};

use super::{RenderError, RenderTarget, Renderer, TextureId, TextureSpec};

/// Texture for offscreen rendering owned by one effect.
///
/// Lazily created by [`OffscreenLayer::ensure`]. Recreated when the requested size or format
/// changes, or when the backend lost the texture.
#[derive(Debug, Default)]
pub struct OffscreenLayer {
    texture: Option<(TextureId, TextureSpec)>,
}

impl OffscreenLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(
        &mut self,
        renderer: &mut dyn Renderer,
        spec: TextureSpec,
    ) -> Result<TextureId, RenderError> {
        let mut reason = String::new();
        if let Some((texture, old)) = self.texture {
            if !renderer.is_texture_valid(texture) {
                reason.push_str("texture was lost");
            } else if old.size != spec.size {
                reason = format!(
                    "size changed from {} × {} to {} × {}",
                    old.size.w, old.size.h, spec.size.w, spec.size.h
                );
            } else if old.format != spec.format {
                reason = format!("format changed from {:?} to {:?}", old.format, spec.format);
            } else if old != spec {
                reason.push_str("sampling changed");
            } else {
                return Ok(texture);
            }

            renderer.free_texture(texture);
            self.texture = None;
        } else {
            reason.push_str("first use");
        }

        trace!("creating offscreen texture: {reason}");
        let span = tracy_client::span!("creating offscreen texture");
        span.emit_text(&reason);

        let texture = renderer.alloc_texture(spec)?;
        self.texture = Some((texture, spec));
        Ok(texture)
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture.map(|(texture, _)| texture)
    }

    pub fn spec(&self) -> Option<TextureSpec> {
        self.texture.map(|(_, spec)| spec)
    }

    /// Render target drawing into the texture, showing `geometry` of the global space.
    pub fn target(&self, geometry: Rectangle<i32, Logical>) -> Option<RenderTarget> {
        self.texture
            .map(|(texture, spec)| RenderTarget::for_texture(texture, geometry, spec.size))
    }

    /// Gives up the texture without freeing it, for callers that free it later.
    pub fn take(&mut self) -> Option<TextureId> {
        self.texture.take().map(|(texture, _)| texture)
    }

    pub fn release(&mut self, renderer: &mut dyn Renderer) {
        if let Some((texture, _)) = self.texture.take() {
            renderer.free_texture(texture);
        }
    }
}

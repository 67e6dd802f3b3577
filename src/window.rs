//! Per-window GPU capability surface.
//!
//! Every GPU resource in the pipeline is keyed by the window it belongs
//! to: GL-style contexts are not shared across windows, so atlases,
//! buffers, and freezer slots are all created per [`WindowContext`].
//!
//! Context loss is modeled explicitly: a window whose `gpu` handle is
//! absent behaves as a lost context, and every GPU-touching operation
//! no-ops against it. Restoring a context bumps the window generation so
//! components can detect stale resources and rebuild lazily.

use std::cell::RefCell;
use std::sync::Arc;

use wgpu::{Device, Queue, TextureFormat};

pub type WindowId = u32;

/// Device access for one window's GPU context.
#[derive(Clone)]
pub struct GpuHandle {
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub format: TextureFormat,
}

pub struct WindowContext {
    id: WindowId,
    gpu: Option<GpuHandle>,
    texture_size: u32,
    generation: u32,
    shaders: RefCell<ShaderCache>,
}

impl WindowContext {
    pub fn new(id: WindowId, gpu: GpuHandle) -> Self {
        let texture_size = gpu.device.limits().max_texture_dimension_2d;
        Self {
            id,
            gpu: Some(gpu),
            texture_size,
            generation: 0,
            shaders: RefCell::new(ShaderCache::default()),
        }
    }

    /// A window with no GPU context. Behaves exactly like a window whose
    /// context is lost: all GPU work is skipped, all bookkeeping runs.
    pub fn headless(id: WindowId, texture_size: u32) -> Self {
        Self {
            id,
            gpu: None,
            texture_size,
            generation: 0,
            shaders: RefCell::new(ShaderCache::default()),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Largest texture dimension this window supports; bounds glyph-atlas
    /// tiling and freezer slot sizing.
    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    /// Incremented each time the context is restored. Resources tagged
    /// with an older generation are stale and must be rebuilt.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn gpu(&self) -> Option<&GpuHandle> {
        self.gpu.as_ref()
    }

    pub fn is_context_lost(&self) -> bool {
        self.gpu.is_none()
    }

    /// Report a context change. `None` marks the context lost; `Some`
    /// installs the restored context and invalidates every cached GPU
    /// object created under the previous one.
    pub fn context_changed(&mut self, gpu: Option<GpuHandle>) {
        let restored = gpu.is_some();
        self.gpu = gpu;
        if restored {
            self.generation = self.generation.wrapping_add(1);
            self.texture_size = self
                .gpu
                .as_ref()
                .map(|g| g.device.limits().max_texture_dimension_2d)
                .unwrap_or(self.texture_size);
            *self.shaders.borrow_mut() = ShaderCache::default();
            log::info!("window {} context restored (gen {})", self.id, self.generation);
        } else {
            *self.shaders.borrow_mut() = ShaderCache::default();
            log::warn!("window {} context lost", self.id);
        }
    }

    pub(crate) fn shaders(&self) -> std::cell::RefMut<'_, ShaderCache> {
        self.shaders.borrow_mut()
    }
}

/// Lazily-built render pipelines shared by all components of one window.
///
/// The pipeline accessors live next to the shaders they compile:
/// `glyph_pipeline` in `paint::glyph_painter`, `block_pipeline` in
/// `artists::block`, `textured_pipeline` in `freezer`.
#[derive(Default)]
pub struct ShaderCache {
    pub(crate) block: Option<wgpu::RenderPipeline>,
    pub(crate) glyph: Option<(wgpu::RenderPipeline, wgpu::BindGroupLayout)>,
    pub(crate) textured: Option<(wgpu::RenderPipeline, wgpu::BindGroupLayout)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_window_reports_context_lost() {
        let w = WindowContext::headless(1, 2048);
        assert!(w.is_context_lost());
        assert_eq!(w.texture_size(), 2048);
        assert_eq!(w.generation(), 0);
    }

    #[test]
    fn test_context_loss_does_not_bump_generation() {
        let mut w = WindowContext::headless(1, 2048);
        w.context_changed(None);
        assert_eq!(w.generation(), 0);
        assert!(w.is_context_lost());
    }
}

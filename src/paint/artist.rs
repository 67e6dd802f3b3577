//! The pluggable rendering-strategy seam.
//!
//! Every painted value names an [`Artist`] — the strategy that allocates
//! GPU buffers for a whole subgroup at once and later issues its draw
//! calls. All members of one subgroup share one artist instance
//! (`Rc::ptr_eq` identity), which is what makes the single-pass
//! partitioning in [`crate::paint::PaintSubgroup`] correct.

use crate::camera::Camera;
use crate::matrix::Matrix3;
use crate::paint::counts::DraftCounts;
use crate::paint::context::PaintContext;
use crate::window::WindowContext;

/// A render pass that may be absent.
///
/// GPU draw calls need a live `wgpu::RenderPass`; a window whose context
/// is lost has none. Artists receive a `DrawPass` and skip draw issuance
/// when it is empty — the same no-op discipline every GPU-touching
/// operation follows under context loss.
pub struct DrawPass<'p, 'e> {
    inner: Option<&'p mut wgpu::RenderPass<'e>>,
}

impl DrawPass<'static, 'static> {
    pub fn none() -> Self {
        Self { inner: None }
    }
}

impl<'p, 'e> DrawPass<'p, 'e> {
    pub fn new(pass: &'p mut wgpu::RenderPass<'e>) -> Self {
        Self { inner: Some(pass) }
    }

    pub fn raw(&mut self) -> Option<&mut wgpu::RenderPass<'e>> {
        self.inner.as_deref_mut()
    }
}

/// Everything an artist needs to issue one subgroup's draw calls.
pub struct RenderArgs<'a> {
    /// Composed group-local-to-NDC matrix (camera projection with the
    /// group root's scale-then-translate applied first).
    pub world: Matrix3,
    /// Effective on-screen scale of the group (`absolute_scale` times
    /// camera scale); drives level-of-detail decisions.
    pub scale: f32,
    /// Skip fine detail (labels, borders): the group is far too small
    /// for it to be visible.
    pub force_simple: bool,
    pub camera: &'a Camera,
    pub window: &'a WindowContext,
}

pub trait Artist {
    /// Allocate this subgroup's GPU resources into `ctx`, sized by the
    /// aggregate counts of every member. Called exactly once per
    /// subgroup rebuild, before any member paints.
    fn setup(&self, window: &WindowContext, ctx: &mut PaintContext, counts: &DraftCounts);

    /// Issue the subgroup's draw calls.
    fn render(&self, args: &RenderArgs<'_>, ctx: &mut PaintContext, pass: &mut DrawPass<'_, '_>);
}

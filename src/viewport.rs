//! Minimal orchestration of one tree onto one camera.
//!
//! A `Viewport` ties the pieces together the way a host render loop
//! consumes them: `paint` within the frame's time budget, `render` into
//! the frame's pass, repeat while either asks for more time.

use std::time::Duration;

use crate::camera::Camera;
use crate::freezer::Freezer;
use crate::node::NodeRef;
use crate::paint::artist::DrawPass;
use crate::paint::GraphPainter;
use crate::stats::RenderStats;
use crate::window::WindowContext;

pub struct Viewport {
    root: NodeRef,
    camera: Camera,
    painter: GraphPainter,
    freezer: Freezer,
}

impl Viewport {
    pub fn new(root: NodeRef) -> Self {
        Self {
            root,
            camera: Camera::new(),
            painter: GraphPainter::new(),
            freezer: Freezer::new(),
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn freezer(&self) -> &Freezer {
        &self.freezer
    }

    pub fn painter(&self) -> &GraphPainter {
        &self.painter
    }

    /// Commit layout and paint dirty groups within the budget. Returns
    /// true while more time is needed — call again next frame.
    pub fn paint(&mut self, window: &WindowContext, budget: Option<Duration>) -> bool {
        self.painter.paint(window, &self.root, budget)
    }

    /// Render all painted groups. Returns the number of groups still
    /// wanting another paint pass.
    pub fn render(
        &mut self,
        window: &WindowContext,
        stats: &mut RenderStats,
        pass: &mut DrawPass<'_, '_>,
    ) -> usize {
        self.painter
            .render(window, &self.camera, Some(&self.freezer), stats, pass)
    }

    /// The tree was mutated; drop any in-progress paint cursor so no
    /// stale partial state survives.
    pub fn mark_dirty(&mut self) {
        self.painter.mark_dirty();
    }

    /// Paint-group roots that have rendered live unchanged at least
    /// `min_consecutive` frames — the freeze-policy hook. Whether and
    /// when to freeze them is the integrator's call.
    pub fn freeze_candidates(
        &self,
        window: &WindowContext,
        min_consecutive: u32,
    ) -> Vec<NodeRef> {
        self.painter
            .slice(window.id())
            .map(|slice| {
                slice
                    .groups()
                    .iter()
                    .filter(|g| g.consecutive_renders() >= min_consecutive)
                    .map(|g| g.root().clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

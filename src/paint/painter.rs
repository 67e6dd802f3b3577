//! Time-boxed, resumable painting across the paint-group ring.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::camera::Camera;
use crate::freezer::Freezer;
use crate::node::NodeRef;
use crate::paint::artist::DrawPass;
use crate::paint::group::PaintGroup;
use crate::stats::RenderStats;
use crate::window::{WindowContext, WindowId};

/// Per-(tree × window) paint state: the painted groups, and the
/// explicit resumption cursor for an in-progress time-boxed pass.
pub struct GraphPainterSlice {
    /// Painted groups from the last completed walk, in ring order.
    groups: Vec<PaintGroup>,
    /// Groups painted so far by an interrupted walk.
    pending: Vec<PaintGroup>,
    /// Next paint group to process when the walk resumes. None when no
    /// walk is in progress.
    cursor: Option<NodeRef>,
}

impl GraphPainterSlice {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            pending: Vec::new(),
            cursor: None,
        }
    }

    pub fn groups(&self) -> &[PaintGroup] {
        &self.groups
    }

    pub fn in_progress(&self) -> bool {
        self.cursor.is_some()
    }

    /// Forget the saved cursor and partial progress. Called when the
    /// tree is mutated mid-pass; the next paint re-walks the full ring.
    pub fn invalidate(&mut self) {
        self.cursor = None;
        self.pending.clear();
    }

    /// Walk the paint-group ring from the saved cursor, painting dirty
    /// groups, within an optional time budget.
    ///
    /// Layout is committed first; if it cannot finish within the budget
    /// this returns true without painting anything. Otherwise groups are
    /// painted until the ring completes (returns false) or the budget
    /// runs out (cursor saved, returns true — call again next frame).
    pub fn paint(
        &mut self,
        root: &NodeRef,
        window: &WindowContext,
        budget: Option<Duration>,
    ) -> bool {
        let start = Instant::now();
        let expired = |start: &Instant| match budget {
            Some(b) => start.elapsed() >= b,
            None => false,
        };

        if root.needs_commit() && root.commit_layout(budget) {
            // Layout needs more time; nothing is painted this pass.
            return true;
        }

        let mut current = match self.cursor.take() {
            Some(node) => node,
            None => {
                self.pending.clear();
                root.clone()
            }
        };

        loop {
            if expired(&start) {
                log::trace!(
                    "paint budget exhausted after {} group(s); cursor saved",
                    self.pending.len()
                );
                self.cursor = Some(current);
                return true;
            }

            // Reuse the previous walk's group for this root so clean
            // groups keep their GPU buffers.
            let mut group = match self
                .groups
                .iter()
                .position(|g| Rc::ptr_eq(g.root(), &current))
            {
                Some(i) => self.groups.swap_remove(i),
                None => PaintGroup::new(current.clone()),
            };
            group.paint(window);
            self.pending.push(group);

            current = current.next_paint_group();
            if Rc::ptr_eq(&current, root) {
                break;
            }
        }

        self.groups = std::mem::take(&mut self.pending);
        self.cursor = None;
        false
    }

    /// Render every painted group. Returns the number of groups that
    /// are still dirty and want another paint pass.
    pub fn render(
        &mut self,
        window: &WindowContext,
        camera: &Camera,
        freezer: Option<&Freezer>,
        stats: &mut RenderStats,
        pass: &mut DrawPass<'_, '_>,
    ) -> usize {
        let mut still_dirty = 0;
        for group in &mut self.groups {
            group.render(window, camera, freezer, stats, pass);
            if group.is_dirty() {
                still_dirty += 1;
            }
        }
        still_dirty
    }
}

/// Top-level paint/render orchestration, one slice per window.
#[derive(Default)]
pub struct GraphPainter {
    slices: HashMap<WindowId, GraphPainterSlice>,
}

impl GraphPainter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice(&self, window_id: WindowId) -> Option<&GraphPainterSlice> {
        self.slices.get(&window_id)
    }

    /// Paint the tree for one window within an optional budget. Returns
    /// true while more time is needed.
    pub fn paint(
        &mut self,
        window: &WindowContext,
        root: &NodeRef,
        budget: Option<Duration>,
    ) -> bool {
        self.slices
            .entry(window.id())
            .or_insert_with(GraphPainterSlice::new)
            .paint(root, window, budget)
    }

    /// Render one window's painted groups.
    pub fn render(
        &mut self,
        window: &WindowContext,
        camera: &Camera,
        freezer: Option<&Freezer>,
        stats: &mut RenderStats,
        pass: &mut DrawPass<'_, '_>,
    ) -> usize {
        match self.slices.get_mut(&window.id()) {
            Some(slice) => slice.render(window, camera, freezer, stats, pass),
            None => 0,
        }
    }

    /// The tree changed under an in-progress pass: drop every slice's
    /// saved cursor so no stale partial paint survives.
    pub fn mark_dirty(&mut self) {
        for slice in self.slices.values_mut() {
            slice.invalidate();
        }
    }

    /// Drop all painted state for a window (e.g. on window close or
    /// context loss).
    pub fn dispose(&mut self, window_id: WindowId) {
        self.slices.remove(&window_id);
    }
}

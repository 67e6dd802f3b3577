//! Paint groups: the unit of incremental paint and render scheduling.

use crate::camera::Camera;
use crate::freezer::Freezer;
use crate::matrix::Matrix3;
use crate::node::NodeRef;
use crate::paint::artist::{DrawPass, RenderArgs};
use crate::paint::subgroup::PaintSubgroup;
use crate::rect::Rect;
use crate::stats::RenderStats;
use crate::window::WindowContext;

/// Below this on-screen scale a frozen group renders from its texture
/// cache; at or above it the group always renders live, so freezing
/// never degrades near-camera fidelity.
pub const CACHE_ACTIVATION_SCALE: f32 = 0.01;

/// Below this on-screen scale artists skip fine detail entirely.
pub(crate) const SIMPLE_RENDER_SCALE: f32 = 0.1;

/// Which path a render call took for one group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPath {
    /// Fully offscreen or empty; no GPU work issued.
    Culled,
    /// Drawn from freezer fragments.
    Cached,
    /// Drawn live from its subgroup buffers.
    Live,
}

/// One `local_paint_group`-rooted subtree, its subgroups, and its
/// accumulated bounds.
pub struct PaintGroup {
    root: NodeRef,
    subgroups: Vec<PaintSubgroup>,
    bounds: Rect,
    consecutive_renders: u32,
}

impl PaintGroup {
    pub fn new(root: NodeRef) -> Self {
        assert!(
            root.local_paint_group(),
            "paint group rooted at a node that does not start a paint group"
        );
        Self {
            root,
            subgroups: Vec::new(),
            bounds: Rect::ZERO,
            consecutive_renders: 0,
        }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn subgroups(&self) -> &[PaintSubgroup] {
        &self.subgroups
    }

    /// Accumulated content bounds in group-local coordinates.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn is_dirty(&self) -> bool {
        self.root.is_dirty()
    }

    /// Frames this group has been rendered live without a repaint.
    /// Heavy, repeatedly rendered groups are freeze candidates; pulling
    /// that trigger is the integrator's policy.
    pub fn consecutive_renders(&self) -> u32 {
        self.consecutive_renders
    }

    /// Repaint this group if dirty: rebuild subgroups from scratch,
    /// re-draft and re-fill every buffer, and accumulate bounds.
    ///
    /// Returns true when some member has progressive work left, in
    /// which case the dirty flag stays set and a later pass repaints.
    ///
    /// Panics if the layout engine still reports pending commits —
    /// paint never starts before layout settles.
    pub fn paint(&mut self, window: &WindowContext) -> bool {
        assert!(
            !self.root.needs_commit(),
            "paint group painted before its layout committed"
        );
        if !self.root.is_dirty() {
            return false;
        }

        self.subgroups = PaintSubgroup::partition(&self.root.group_nodes());
        self.bounds = Rect::ZERO;
        self.consecutive_renders = 0;

        let mut needs_repaint = false;
        for subgroup in &mut self.subgroups {
            needs_repaint |= subgroup.paint(self.root.as_ref(), window);
            self.bounds.include(&subgroup.context().bounds());
        }

        if !needs_repaint {
            self.root.clear_dirty();
        }
        needs_repaint
    }

    /// Render this group: cull against the camera, then draw either the
    /// freezer cache (when frozen and far enough zoomed out) or the live
    /// subgroup buffers.
    pub fn render(
        &mut self,
        window: &WindowContext,
        camera: &Camera,
        freezer: Option<&Freezer>,
        stats: &mut RenderStats,
        pass: &mut DrawPass<'_, '_>,
    ) -> RenderPath {
        let rx = self.root.absolute_x();
        let ry = self.root.absolute_y();
        let rs = self.root.absolute_scale();

        let world_rect = self.bounds.scaled(rs).translated(rx, ry);
        if world_rect.is_empty() || !camera.contains_any(&world_rect) {
            stats.culled_groups += 1;
            return RenderPath::Culled;
        }

        let render_scale = rs * camera.scale();
        let world = camera
            .project()
            .then(&Matrix3::translation(rx, ry))
            .then(&Matrix3::scaling(rs));

        if render_scale < CACHE_ACTIVATION_SCALE {
            if let Some(freezer) = freezer {
                let value = self.root.value();
                let frozen = value
                    .as_ref()
                    .and_then(|v| v.as_freezable())
                    .filter(|f| f.cache().is_frozen());
                if let Some(freezable) = frozen {
                    let cache = freezable.cache();
                    cache.paint_if_needed(self, window, freezer);
                    cache.render(window, freezer, &world, pass);
                    stats.cached_renders += 1;
                    return RenderPath::Cached;
                }
            }
        }

        let args = RenderArgs {
            world,
            scale: render_scale,
            force_simple: render_scale < SIMPLE_RENDER_SCALE,
            camera,
            window,
        };
        for subgroup in &mut self.subgroups {
            subgroup.render(&args, pass);
        }
        self.consecutive_renders += 1;
        stats.immediate_renders += 1;
        RenderPath::Live
    }

    /// Issue this group's live draw calls with a caller-supplied world
    /// transform. Used by the freezer to render fragments through a
    /// throwaway camera.
    pub(crate) fn render_direct(&mut self, args: &RenderArgs<'_>, pass: &mut DrawPass<'_, '_>) {
        for subgroup in &mut self.subgroups {
            subgroup.render(args, pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::artists::{Block, BlockStyle};
    use crate::freezer::Freezer;
    use crate::node::testing::{CountingArtist, MockNode, MockValue};
    use crate::node::{GraphNode, Painted};
    use crate::stats::RenderStats;

    fn camera_800x600() -> Camera {
        let mut c = Camera::new();
        c.set_size(800.0, 600.0);
        c
    }

    fn mock_group(artist: &Rc<CountingArtist>) -> (Rc<MockNode>, Rc<MockValue>) {
        let value = MockValue::new(artist.clone(), Rect::new(-10.0, -10.0, 20.0, 20.0));
        let root = MockNode::group_root(0.0, 0.0, 1.0, Some(value.clone() as Rc<dyn Painted>));
        (root, value)
    }

    #[test]
    fn test_paint_clears_dirty_and_accumulates_bounds() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, value) = mock_group(&artist);
        let member = MockNode::member(
            30.0,
            0.0,
            1.0,
            Some(MockValue::new(artist.clone(), Rect::new(-10.0, -10.0, 20.0, 20.0))
                as Rc<dyn Painted>),
        );
        root.add_member(member);

        let mut group = PaintGroup::new(root.clone());
        let needs_more = group.paint(&window);
        assert!(!needs_more);
        assert!(!group.is_dirty());
        assert_eq!(value.paints.get(), 1);
        assert_eq!(group.bounds(), Rect::new(-10.0, -10.0, 50.0, 20.0));
        assert_eq!(artist.setups.get(), 1);
    }

    #[test]
    fn test_paint_skips_clean_groups() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, value) = mock_group(&artist);
        let mut group = PaintGroup::new(root.clone());
        group.paint(&window);
        group.paint(&window);
        assert_eq!(value.paints.get(), 1);
    }

    #[test]
    fn test_progressive_paint_keeps_dirty_flag() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, value) = mock_group(&artist);
        value.progressive.set(1);

        let mut group = PaintGroup::new(root.clone());
        assert!(group.paint(&window));
        assert!(group.is_dirty());
        assert!(!group.paint(&window));
        assert!(!group.is_dirty());
        assert_eq!(value.paints.get(), 2);
    }

    #[test]
    #[should_panic(expected = "before its layout committed")]
    fn test_paint_before_commit_panics() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, _) = mock_group(&artist);
        root.set_needs_commit(true);
        PaintGroup::new(root).paint(&window);
    }

    #[test]
    #[should_panic(expected = "does not start a paint group")]
    fn test_group_requires_paint_group_root() {
        let member = MockNode::member(0.0, 0.0, 1.0, None);
        PaintGroup::new(member);
    }

    #[test]
    fn test_render_culls_offscreen_groups() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, _) = mock_group(&artist);
        root.set_position(1_000_000.0, 0.0);

        let mut group = PaintGroup::new(root);
        group.paint(&window);
        let camera = camera_800x600();
        let mut stats = RenderStats::new();
        let path = group.render(&window, &camera, None, &mut stats, &mut DrawPass::none());
        assert_eq!(path, RenderPath::Culled);
        assert_eq!(stats.culled_groups, 1);
        assert_eq!(artist.renders.get(), 0);
    }

    #[test]
    fn test_live_render_counts_consecutive_frames() {
        let window = WindowContext::headless(1, 4096);
        let artist = Rc::new(CountingArtist::default());
        let (root, _) = mock_group(&artist);

        let mut group = PaintGroup::new(root.clone());
        group.paint(&window);
        let camera = camera_800x600();
        let mut stats = RenderStats::new();
        for _ in 0..3 {
            let path = group.render(&window, &camera, None, &mut stats, &mut DrawPass::none());
            assert_eq!(path, RenderPath::Live);
        }
        assert_eq!(group.consecutive_renders(), 3);
        assert_eq!(stats.immediate_renders, 3);

        // A repaint resets the streak.
        root.set_dirty(true);
        group.paint(&window);
        assert_eq!(group.consecutive_renders(), 0);
    }

    fn frozen_block_group() -> (Rc<MockNode>, PaintGroup, WindowContext, Freezer) {
        let window = WindowContext::headless(1, 4096);
        let block = Rc::new(Block::new(100.0, 40.0, BlockStyle::default()));
        let root = MockNode::group_root(0.0, 0.0, 1.0, Some(block as Rc<dyn Painted>));
        let mut group = PaintGroup::new(root.clone() as crate::node::NodeRef);
        group.paint(&window);
        (root, group, window, Freezer::new())
    }

    #[test]
    fn test_cache_activation_is_scale_deterministic() {
        let (root, mut group, window, freezer) = frozen_block_group();
        freezer.freeze(root.as_ref());

        let mut camera = camera_800x600();
        let mut stats = RenderStats::new();

        // Just below the threshold: cached.
        camera.set_scale(0.005);
        let path = group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());
        assert_eq!(path, RenderPath::Cached);

        // At the threshold: live, regardless of freeze state.
        camera.set_scale(CACHE_ACTIVATION_SCALE);
        let path = group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());
        assert_eq!(path, RenderPath::Live);

        assert_eq!(stats.cached_renders, 1);
        assert_eq!(stats.immediate_renders, 1);
    }

    #[test]
    fn test_thaw_falls_back_to_live_render() {
        let (root, mut group, window, freezer) = frozen_block_group();
        freezer.freeze(root.as_ref());

        let mut camera = camera_800x600();
        camera.set_scale(0.005);
        let mut stats = RenderStats::new();
        let path = group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());
        assert_eq!(path, RenderPath::Cached);

        freezer.thaw(root.as_ref());
        let path = group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());
        assert_eq!(path, RenderPath::Live);
    }

    #[test]
    #[should_panic(expected = "not a paint-group root")]
    fn test_freezing_non_group_root_panics() {
        let freezer = Freezer::new();
        let block = Rc::new(Block::new(10.0, 10.0, BlockStyle::default()));
        let member = MockNode::member(0.0, 0.0, 1.0, Some(block as Rc<dyn Painted>));
        freezer.freeze(member.as_ref());
    }

    #[test]
    fn test_frozen_group_tiles_fragments() {
        let (root, mut group, window, freezer) = frozen_block_group();
        freezer.freeze(root.as_ref());

        let mut camera = camera_800x600();
        camera.set_scale(0.005);
        let mut stats = RenderStats::new();
        group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());

        let value = root.value().unwrap();
        let cache = value.as_freezable().unwrap().cache();
        let fragment_count = cache.with_frozen(|f| f.fragments().len()).unwrap();
        assert_eq!(fragment_count, 1);
    }

    #[test]
    fn test_invalidate_retiles_cached_content() {
        let (root, mut group, window, freezer) = frozen_block_group();
        freezer.freeze(root.as_ref());

        let mut camera = camera_800x600();
        camera.set_scale(0.005);
        let mut stats = RenderStats::new();
        group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());

        let value = root.value().unwrap();
        let cache = value.as_freezable().unwrap().cache();
        cache.invalidate();
        assert_eq!(cache.with_frozen(|f| f.fragments().len()).unwrap(), 0);

        // The next cached render repaints the fragments.
        group.render(&window, &camera, Some(&freezer), &mut stats, &mut DrawPass::none());
        assert_eq!(cache.with_frozen(|f| f.fragments().len()).unwrap(), 1);
    }
}

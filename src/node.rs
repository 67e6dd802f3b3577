//! The consumed node surface.
//!
//! The directional tree and its layout live outside this crate; what the
//! paint pipeline sees is [`GraphNode`] — absolute placement, dirty
//! state, resumable layout commit, and paint-group ring traversal — plus
//! the capability traits carried by a node's value: [`Painted`] always,
//! [`crate::freezer::Freezable`] and [`Interactive`] optionally.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::label::{Key, Modifiers};
use crate::paint::counts::DraftCounts;
use crate::paint::context::PaintContext;
use crate::paint::Artist;
use crate::window::WindowContext;

pub type NodeRef = Rc<dyn GraphNode>;

pub trait GraphNode {
    fn absolute_x(&self) -> f32;

    fn absolute_y(&self) -> f32;

    fn absolute_scale(&self) -> f32;

    /// Layout has pending work for this node's tree; painting before it
    /// settles is a programmer error.
    fn needs_commit(&self) -> bool;

    /// Drive the external layout engine within an optional time budget.
    /// Returns true when more time is needed.
    fn commit_layout(&self, budget: Option<Duration>) -> bool;

    /// Content under this node changed since its last paint.
    fn is_dirty(&self) -> bool;

    fn clear_dirty(&self);

    /// This node roots a paint group (its own coordinate space).
    fn local_paint_group(&self) -> bool;

    /// Next paint group root in the ring established by the layout
    /// engine. The ring returns to the tree root, and its order is
    /// stable across frames while the tree structure is unchanged.
    fn next_paint_group(&self) -> NodeRef;

    /// All nodes of this paint group in paint order, the root first.
    fn group_nodes(&self) -> Vec<NodeRef>;

    /// The paintable value attached to this node, if any.
    fn value(&self) -> Option<Rc<dyn Painted>>;
}

/// A node's placement inside its paint group: position and scale
/// relative to the group root.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodePlacement {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

impl NodePlacement {
    /// Placement of `node` in the coordinate space of `root`.
    pub fn within(root: &dyn GraphNode, node: &dyn GraphNode) -> Self {
        let rs = root.absolute_scale();
        Self {
            x: (node.absolute_x() - root.absolute_x()) / rs,
            y: (node.absolute_y() - root.absolute_y()) / rs,
            scale: node.absolute_scale() / rs,
        }
    }
}

/// Anything paintable.
pub trait Painted {
    /// Declare resource needs before any buffer exists.
    fn draft(&self, counts: &mut DraftCounts);

    /// Emit vertices into the subgroup's context. Returns true when this
    /// value has progressive work left (e.g. a texture still streaming)
    /// and wants another paint pass.
    fn paint(
        &self,
        ctx: &mut PaintContext,
        placement: &NodePlacement,
        window: &WindowContext,
    ) -> bool;

    /// The rendering strategy for this value. Every member of a
    /// subgroup returns the same instance.
    fn artist(&self) -> Rc<dyn Artist>;

    fn as_freezable(&self) -> Option<&dyn crate::freezer::Freezable> {
        None
    }

    fn as_interactive(&self) -> Option<&dyn Interactive> {
        None
    }
}

/// Input capability of a node value.
pub trait Interactive {
    fn interact(&self) -> &Interaction;
}

type ClickListener = Box<dyn Fn(f32, f32) -> bool>;
type KeyListener = Box<dyn Fn(Key, Modifiers) -> bool>;
type FocusListener = Box<dyn Fn(bool)>;

/// Listener slots for click, key, and focus events.
#[derive(Default)]
pub struct Interaction {
    click: RefCell<Option<ClickListener>>,
    key: RefCell<Option<KeyListener>>,
    focus: RefCell<Option<FocusListener>>,
    focused: Cell<bool>,
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_click_listener(&self, listener: Option<ClickListener>) {
        *self.click.borrow_mut() = listener;
    }

    pub fn set_key_listener(&self, listener: Option<KeyListener>) {
        *self.key.borrow_mut() = listener;
    }

    pub fn set_focus_listener(&self, listener: Option<FocusListener>) {
        *self.focus.borrow_mut() = listener;
    }

    /// Dispatch a click in node-local coordinates. Returns true when a
    /// listener consumed it.
    pub fn click(&self, x: f32, y: f32) -> bool {
        match &*self.click.borrow() {
            Some(listener) => listener(x, y),
            None => false,
        }
    }

    pub fn key(&self, key: Key, mods: Modifiers) -> bool {
        match &*self.key.borrow() {
            Some(listener) => listener(key, mods),
            None => false,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused.get()
    }

    pub fn set_focused(&self, focused: bool) {
        if self.focused.replace(focused) != focused {
            if let Some(listener) = &*self.focus.borrow() {
                listener(focused);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock nodes, values, and artists for pipeline tests.

    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};
    use std::time::Duration;

    use super::{GraphNode, NodePlacement, NodeRef, Painted};
    use crate::paint::artist::{Artist, DrawPass, RenderArgs};
    use crate::paint::counts::DraftCounts;
    use crate::paint::context::PaintContext;
    use crate::rect::Rect;
    use crate::window::WindowContext;

    pub struct MockNode {
        x: Cell<f32>,
        y: Cell<f32>,
        scale: Cell<f32>,
        dirty: Cell<bool>,
        needs_commit: Cell<bool>,
        local_group: bool,
        next: RefCell<Option<NodeRef>>,
        members: RefCell<Vec<NodeRef>>,
        value: RefCell<Option<Rc<dyn Painted>>>,
        weak_self: RefCell<Weak<MockNode>>,
    }

    impl MockNode {
        fn build(
            x: f32,
            y: f32,
            scale: f32,
            local_group: bool,
            value: Option<Rc<dyn Painted>>,
        ) -> Rc<MockNode> {
            let node = Rc::new(MockNode {
                x: Cell::new(x),
                y: Cell::new(y),
                scale: Cell::new(scale),
                dirty: Cell::new(true),
                needs_commit: Cell::new(false),
                local_group,
                next: RefCell::new(None),
                members: RefCell::new(Vec::new()),
                value: RefCell::new(value),
                weak_self: RefCell::new(Weak::new()),
            });
            *node.weak_self.borrow_mut() = Rc::downgrade(&node);
            node
        }

        /// A paint-group root whose ring points back at itself.
        pub fn group_root(
            x: f32,
            y: f32,
            scale: f32,
            value: Option<Rc<dyn Painted>>,
        ) -> Rc<MockNode> {
            let node = Self::build(x, y, scale, true, value);
            *node.next.borrow_mut() = Some(node.clone() as NodeRef);
            node
        }

        /// A non-root member of some group.
        pub fn member(x: f32, y: f32, scale: f32, value: Option<Rc<dyn Painted>>) -> Rc<MockNode> {
            Self::build(x, y, scale, false, value)
        }

        pub fn add_member(&self, member: Rc<MockNode>) {
            self.members.borrow_mut().push(member);
        }

        /// Wire a set of group roots into a paint-group ring in order.
        pub fn link_ring(groups: &[Rc<MockNode>]) {
            for (i, g) in groups.iter().enumerate() {
                let next = groups[(i + 1) % groups.len()].clone();
                *g.next.borrow_mut() = Some(next as NodeRef);
            }
        }

        pub fn set_dirty(&self, dirty: bool) {
            self.dirty.set(dirty);
        }

        pub fn set_needs_commit(&self, needs: bool) {
            self.needs_commit.set(needs);
        }

        pub fn set_position(&self, x: f32, y: f32) {
            self.x.set(x);
            self.y.set(y);
        }
    }

    impl GraphNode for MockNode {
        fn absolute_x(&self) -> f32 {
            self.x.get()
        }

        fn absolute_y(&self) -> f32 {
            self.y.get()
        }

        fn absolute_scale(&self) -> f32 {
            self.scale.get()
        }

        fn needs_commit(&self) -> bool {
            self.needs_commit.get()
        }

        fn commit_layout(&self, budget: Option<Duration>) -> bool {
            if !self.needs_commit.get() {
                return false;
            }
            if budget.is_some_and(|b| b.is_zero()) {
                return true;
            }
            self.needs_commit.set(false);
            false
        }

        fn is_dirty(&self) -> bool {
            self.dirty.get()
        }

        fn clear_dirty(&self) {
            self.dirty.set(false);
        }

        fn local_paint_group(&self) -> bool {
            self.local_group
        }

        fn next_paint_group(&self) -> NodeRef {
            self.next.borrow().clone().expect("mock ring not linked")
        }

        fn group_nodes(&self) -> Vec<NodeRef> {
            let mut nodes: Vec<NodeRef> = vec![self
                .weak_self
                .borrow()
                .upgrade()
                .expect("mock node self reference dropped")];
            nodes.extend(self.members.borrow().iter().cloned());
            nodes
        }

        fn value(&self) -> Option<Rc<dyn Painted>> {
            self.value.borrow().clone()
        }
    }

    /// Resources a [`CountingArtist`] sets up: the declared capacity and
    /// the number of paint calls that hit it.
    pub struct MockResources {
        pub declared: usize,
        pub painted: usize,
    }

    #[derive(Default)]
    pub struct CountingArtist {
        pub setups: Cell<usize>,
        pub renders: Cell<usize>,
    }

    impl Artist for CountingArtist {
        fn setup(&self, _window: &WindowContext, ctx: &mut PaintContext, counts: &DraftCounts) {
            self.setups.set(self.setups.get() + 1);
            ctx.set(MockResources {
                declared: counts.custom::<MockValue>(),
                painted: 0,
            });
        }

        fn render(
            &self,
            _args: &RenderArgs<'_>,
            _ctx: &mut PaintContext,
            _pass: &mut DrawPass<'_, '_>,
        ) {
            self.renders.set(self.renders.get() + 1);
        }
    }

    pub struct MockValue {
        artist: Rc<CountingArtist>,
        rect: Rect,
        pub paints: Cell<usize>,
        /// Number of paints that report progressive work left.
        pub progressive: Cell<u32>,
    }

    impl MockValue {
        pub fn new(artist: Rc<CountingArtist>, rect: Rect) -> Rc<Self> {
            Rc::new(Self {
                artist,
                rect,
                paints: Cell::new(0),
                progressive: Cell::new(0),
            })
        }
    }

    impl Painted for MockValue {
        fn draft(&self, counts: &mut DraftCounts) {
            counts.add_custom::<MockValue>(1);
        }

        fn paint(
            &self,
            ctx: &mut PaintContext,
            placement: &NodePlacement,
            _window: &WindowContext,
        ) -> bool {
            let resources = ctx
                .get_mut::<MockResources>()
                .expect("mock painted without setup");
            resources.painted += 1;
            assert!(
                resources.painted <= resources.declared,
                "paint calls exceeded drafted count"
            );
            ctx.include_bounds(
                &self
                    .rect
                    .scaled(placement.scale)
                    .translated(placement.x, placement.y),
            );
            self.paints.set(self.paints.get() + 1);
            if self.progressive.get() > 0 {
                self.progressive.set(self.progressive.get() - 1);
                true
            } else {
                false
            }
        }

        fn artist(&self) -> Rc<dyn Artist> {
            self.artist.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_interaction_dispatch() {
        let hits = Rc::new(Cell::new(0u32));
        let interaction = Interaction::new();
        assert!(!interaction.click(0.0, 0.0));

        let h = hits.clone();
        interaction.set_click_listener(Some(Box::new(move |_, _| {
            h.set(h.get() + 1);
            true
        })));
        assert!(interaction.click(1.0, 2.0));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_focus_listener_fires_on_change_only() {
        let calls = Rc::new(Cell::new(0u32));
        let interaction = Interaction::new();
        let c = calls.clone();
        interaction.set_focus_listener(Some(Box::new(move |_| c.set(c.get() + 1))));
        interaction.set_focused(true);
        interaction.set_focused(true);
        interaction.set_focused(false);
        assert_eq!(calls.get(), 2);
    }
}

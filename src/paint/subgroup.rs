//! Subgroup partitioning: contiguous same-artist runs.

use std::rc::Rc;

use crate::node::{GraphNode, NodePlacement, NodeRef};
use crate::paint::artist::{Artist, DrawPass, RenderArgs};
use crate::paint::counts::DraftCounts;
use crate::paint::context::PaintContext;
use crate::window::WindowContext;

/// A contiguous run of nodes (in paint order) sharing one artist, the
/// unit of GPU buffer allocation.
pub struct PaintSubgroup {
    artist: Rc<dyn Artist>,
    nodes: Vec<NodeRef>,
    context: PaintContext,
    needs_repaint: bool,
}

impl PaintSubgroup {
    fn new(artist: Rc<dyn Artist>) -> Self {
        Self {
            artist,
            nodes: Vec::new(),
            context: PaintContext::new(),
            needs_repaint: false,
        }
    }

    /// Partition a paint group's node list into subgroups.
    ///
    /// One linear pass: a new subgroup starts whenever the running
    /// artist identity changes. Nodes without a painted value carry no
    /// artist and are skipped. The concatenated runs preserve paint
    /// order exactly.
    pub fn partition(nodes: &[NodeRef]) -> Vec<PaintSubgroup> {
        let mut subgroups: Vec<PaintSubgroup> = Vec::new();
        for node in nodes {
            let Some(value) = node.value() else {
                continue;
            };
            let artist = value.artist();
            let start_new = match subgroups.last() {
                Some(last) => !Rc::ptr_eq(&last.artist, &artist),
                None => true,
            };
            if start_new {
                subgroups.push(PaintSubgroup::new(artist));
            }
            subgroups.last_mut().unwrap().nodes.push(node.clone());
        }
        subgroups
    }

    pub fn artist(&self) -> &Rc<dyn Artist> {
        &self.artist
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn context(&self) -> &PaintContext {
        &self.context
    }

    /// True when the last paint left progressive work behind.
    pub fn needs_repaint(&self) -> bool {
        self.needs_repaint
    }

    /// Draft, set up, and paint every member. Returns true when any
    /// member reports progressive work left.
    pub(crate) fn paint(&mut self, root: &dyn GraphNode, window: &WindowContext) -> bool {
        let mut counts = DraftCounts::default();
        for node in &self.nodes {
            if let Some(value) = node.value() {
                value.draft(&mut counts);
            }
        }

        self.context = PaintContext::new();
        self.artist.setup(window, &mut self.context, &counts);

        let mut needs_repaint = false;
        for node in &self.nodes {
            if let Some(value) = node.value() {
                let placement = NodePlacement::within(root, node.as_ref());
                needs_repaint |= value.paint(&mut self.context, &placement, window);
            }
        }
        self.needs_repaint = needs_repaint;
        needs_repaint
    }

    pub(crate) fn render(&mut self, args: &RenderArgs<'_>, pass: &mut DrawPass<'_, '_>) {
        self.artist.render(args, &mut self.context, pass);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::node::testing::{CountingArtist, MockNode, MockValue};
    use crate::node::Painted;
    use crate::rect::Rect;

    fn value(artist: &Rc<CountingArtist>) -> Rc<dyn Painted> {
        MockValue::new(artist.clone(), Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_partition_splits_on_artist_change() {
        let a = Rc::new(CountingArtist::default());
        let b = Rc::new(CountingArtist::default());
        let nodes: Vec<NodeRef> = vec![
            MockNode::member(0.0, 0.0, 1.0, Some(value(&a))) as NodeRef,
            MockNode::member(1.0, 0.0, 1.0, Some(value(&a))),
            MockNode::member(2.0, 0.0, 1.0, Some(value(&b))),
            MockNode::member(3.0, 0.0, 1.0, Some(value(&a))),
        ];
        let subgroups = PaintSubgroup::partition(&nodes);
        assert_eq!(subgroups.len(), 3);
        assert_eq!(subgroups[0].len(), 2);
        assert_eq!(subgroups[1].len(), 1);
        assert_eq!(subgroups[2].len(), 1);
    }

    #[test]
    fn test_partition_covers_all_nodes_in_order() {
        let a = Rc::new(CountingArtist::default());
        let b = Rc::new(CountingArtist::default());
        let artists = [&a, &a, &b, &b, &a, &b];
        let nodes: Vec<NodeRef> = artists
            .iter()
            .enumerate()
            .map(|(i, artist)| {
                MockNode::member(i as f32, 0.0, 1.0, Some(value(artist))) as NodeRef
            })
            .collect();

        let subgroups = PaintSubgroup::partition(&nodes);
        // Concatenated runs equal the original list: no gaps, no
        // overlaps, order preserved.
        let flattened: Vec<NodeRef> = subgroups
            .iter()
            .flat_map(|sg| sg.nodes().iter().cloned())
            .collect();
        assert_eq!(flattened.len(), nodes.len());
        for (original, run) in nodes.iter().zip(flattened.iter()) {
            assert!(Rc::ptr_eq(original, run));
        }
        let total: usize = subgroups.iter().map(|sg| sg.len()).sum();
        assert_eq!(total, nodes.len());
    }

    #[test]
    fn test_partition_skips_valueless_nodes() {
        let a = Rc::new(CountingArtist::default());
        let nodes: Vec<NodeRef> = vec![
            MockNode::member(0.0, 0.0, 1.0, Some(value(&a))) as NodeRef,
            MockNode::member(1.0, 0.0, 1.0, None),
            MockNode::member(2.0, 0.0, 1.0, Some(value(&a))),
        ];
        let subgroups = PaintSubgroup::partition(&nodes);
        // The valueless node neither splits the run nor appears in it.
        assert_eq!(subgroups.len(), 1);
        assert_eq!(subgroups[0].len(), 2);
    }
}

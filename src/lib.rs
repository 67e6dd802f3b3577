//! grove — a paint-group renderer for infinite pannable node-tree
//! canvases.
//!
//! The directional tree and its layout live outside this crate (see
//! [`node::GraphNode`]); grove takes that surface and turns it into
//! batched GPU draw calls: trees partition into paint groups, paint
//! groups into same-artist subgroups with exactly-sized vertex buffers,
//! and painting is time-boxed and resumable so a render loop never
//! blocks on a large tree. Far-zoomed-out groups can be frozen into a
//! texture cache that replaces their whole draw-call stream with a few
//! textured quads.

pub mod artists;
pub mod camera;
pub mod color;
pub mod font;
pub mod freezer;
pub mod gpu;
pub mod label;
pub mod matrix;
pub mod node;
pub mod paint;
pub mod rect;
pub mod stats;
pub mod viewport;
pub mod window;

pub mod prelude {
    pub use crate::artists::{Block, BlockArtist, BlockStyle};
    pub use crate::camera::{Camera, CameraFilter};
    pub use crate::color::Color;
    pub use crate::font::{Font, FontFace, GlyphData, GlyphSource};
    pub use crate::freezer::{Freezable, Freezer, FreezerCache};
    pub use crate::gpu::GpuContext;
    pub use crate::label::{Key, Label, Modifiers};
    pub use crate::node::{GraphNode, Interaction, Interactive, NodePlacement, NodeRef, Painted};
    pub use crate::paint::{
        Artist, DraftCounts, DrawPass, GlyphPainter, GraphPainter, PaintContext, PaintGroup,
        RenderArgs, RenderPath, CACHE_ACTIVATION_SCALE,
    };
    pub use crate::rect::Rect;
    pub use crate::stats::RenderStats;
    pub use crate::viewport::Viewport;
    pub use crate::window::{GpuHandle, WindowContext, WindowId};
}

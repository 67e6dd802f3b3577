pub mod artist;
pub mod counts;
pub mod context;
pub mod glyph_painter;
pub mod group;
pub mod painter;
pub mod subgroup;

pub use artist::{Artist, DrawPass, RenderArgs};
pub use counts::DraftCounts;
pub use context::PaintContext;
pub use glyph_painter::GlyphPainter;
pub use group::{PaintGroup, RenderPath, CACHE_ACTIVATION_SCALE};
pub use painter::{GraphPainter, GraphPainterSlice};
pub use subgroup::PaintSubgroup;

//! The glyph atlas.
//!
//! Shaped clusters are measured once, packed into fixed-size square
//! pages, and uploaded per window into a tiled GPU texture. Glyph
//! identity is stable: the same composed string always returns the same
//! `Rc<GlyphData>` for the lifetime of the [`Font`], so pointer equality
//! is usable as a cache key everywhere above this layer.

pub mod face;
pub mod shaping;

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::window::{WindowContext, WindowId};

pub use face::{FontFace, GlyphMetrics, GlyphSource};
pub use shaping::{char_direction, is_combining_mark, ClusterIterator, TextDirection};

/// Square texel size of one atlas page.
pub const GLYPH_PAGE_SIZE: u32 = 512;

/// Transparent border around each packed glyph, so linear sampling never
/// bleeds a neighbor in.
const GLYPH_PADDING: u32 = 2;

/// Page tiles per atlas texture row for a window. Fixed by the window's
/// max texture size, so texel coordinates computed at paint time stay
/// valid when the texture later grows another row of pages.
pub(crate) fn atlas_cols(window: &WindowContext) -> u32 {
    (window.texture_size() / GLYPH_PAGE_SIZE).max(1)
}

/// One packed glyph. Immutable once created.
#[derive(Debug)]
pub struct GlyphData {
    /// The composed cluster string this glyph renders.
    pub letter: String,
    /// Index of the owning page.
    pub page: usize,
    /// Offset of the padded cell within the page.
    pub x: u32,
    pub y: u32,
    /// Padded cell size.
    pub width: u32,
    pub height: u32,
    pub ascent: f32,
    pub descent: f32,
    /// Horizontal cursor step, unpadded.
    pub advance: f32,
}

/// A fixed-size texture bucket holding packed glyph bitmaps.
pub struct GlyphPage {
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
    glyphs: Vec<Rc<GlyphData>>,
    /// CPU-side coverage bitmap, `GLYPH_PAGE_SIZE` squared.
    bitmap: Vec<u8>,
}

impl GlyphPage {
    fn new() -> Self {
        Self {
            cursor_x: 0,
            cursor_y: 0,
            row_height: 0,
            glyphs: Vec::new(),
            bitmap: vec![0u8; (GLYPH_PAGE_SIZE * GLYPH_PAGE_SIZE) as usize],
        }
    }

    /// Reserve a padded cell, advancing the shelf cursor. Returns None
    /// when the page is full.
    fn reserve(&mut self, w: u32, h: u32) -> Option<(u32, u32)> {
        if self.cursor_x + w > GLYPH_PAGE_SIZE {
            self.cursor_x = 0;
            self.cursor_y += self.row_height;
            self.row_height = 0;
        }
        if self.cursor_y + h > GLYPH_PAGE_SIZE {
            return None;
        }
        let slot = (self.cursor_x, self.cursor_y);
        self.cursor_x += w;
        self.row_height = self.row_height.max(h);
        Some(slot)
    }

    fn blit(&mut self, x: u32, y: u32, w: u32, h: u32, coverage: &[u8]) {
        for row in 0..h {
            let src = (row * w) as usize;
            let dst = ((y + row) * GLYPH_PAGE_SIZE + x) as usize;
            self.bitmap[dst..dst + w as usize].copy_from_slice(&coverage[src..src + w as usize]);
        }
    }
}

/// Per-window GPU texture tiling this font's pages into a grid.
struct FontTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    generation: u32,
    cols: u32,
    rows: u32,
    /// Per-page count of glyphs already uploaded; a page whose glyph
    /// count moved past its watermark is dirty.
    uploaded: Vec<usize>,
}

pub struct Font {
    source: Box<dyn GlyphSource>,
    glyphs: RefCell<HashMap<String, Rc<GlyphData>>>,
    pages: RefCell<Vec<GlyphPage>>,
    textures: RefCell<HashMap<WindowId, FontTexture>>,
}

impl Font {
    pub fn new(source: Box<dyn GlyphSource>) -> Self {
        Self {
            source,
            glyphs: RefCell::new(HashMap::new()),
            pages: RefCell::new(vec![GlyphPage::new()]),
            textures: RefCell::new(HashMap::new()),
        }
    }

    pub fn font_size(&self) -> f32 {
        self.source.font_size()
    }

    pub fn line_height(&self) -> f32 {
        self.source.line_height()
    }

    /// Baseline offset from the top of a line.
    pub fn ascent(&self) -> f32 {
        self.source.ascent()
    }

    pub fn page_count(&self) -> usize {
        self.pages.borrow().len()
    }

    /// Look up or pack the glyph for one composed cluster string.
    ///
    /// Repeated calls with the same string return the same allocation.
    pub fn glyph(&self, text: &str) -> Rc<GlyphData> {
        if let Some(g) = self.glyphs.borrow().get(text) {
            return g.clone();
        }

        let metrics = self.source.measure(text);
        let inner_w = (metrics.width.ceil() as u32).max(1);
        let inner_h = (metrics.height.ceil() as u32).max(1);
        let padded_w = inner_w + 2 * GLYPH_PADDING;
        let padded_h = inner_h + 2 * GLYPH_PADDING;
        assert!(
            padded_w <= GLYPH_PAGE_SIZE && padded_h <= GLYPH_PAGE_SIZE,
            "glyph {:?} ({}x{}) cannot fit a {} texel page",
            text,
            padded_w,
            padded_h,
            GLYPH_PAGE_SIZE
        );

        let mut pages = self.pages.borrow_mut();
        let (page_index, x, y) = {
            let last = pages.len() - 1;
            match pages[last].reserve(padded_w, padded_h) {
                Some((x, y)) => (last, x, y),
                None => {
                    // Current page is full; start a new one.
                    let mut page = GlyphPage::new();
                    let (x, y) = page
                        .reserve(padded_w, padded_h)
                        .expect("fresh glyph page rejected a page-sized glyph");
                    pages.push(page);
                    (last + 1, x, y)
                }
            }
        };

        let coverage = self.source.rasterize(text, inner_w, inner_h);
        pages[page_index].blit(x + GLYPH_PADDING, y + GLYPH_PADDING, inner_w, inner_h, &coverage);

        let glyph = Rc::new(GlyphData {
            letter: text.to_string(),
            page: page_index,
            x,
            y,
            width: padded_w,
            height: padded_h,
            ascent: metrics.ascent,
            descent: metrics.descent,
            advance: metrics.advance,
        });
        pages[page_index].glyphs.push(glyph.clone());
        self.glyphs.borrow_mut().insert(text.to_string(), glyph.clone());
        glyph
    }

    /// Iterate shaped glyphs for a string.
    pub fn shape<'f>(&'f self, text: &str) -> GlyphIterator<'f> {
        GlyphIterator {
            font: self,
            clusters: ClusterIterator::new(text),
        }
    }

    /// Upload pages whose glyph count changed since the last upload into
    /// this window's atlas texture. No-op when up to date or when the
    /// window's context is lost.
    pub fn update(&self, window: &WindowContext) {
        let Some(gpu) = window.gpu() else {
            return;
        };
        let pages = self.pages.borrow();
        let needed = pages.len() as u32;
        let cols = atlas_cols(window);

        let mut textures = self.textures.borrow_mut();
        let entry = textures.get(&window.id());
        let stale = match entry {
            None => true,
            Some(t) => t.generation != window.generation() || t.cols * t.rows < needed,
        };
        if stale {
            let rows = needed.div_ceil(cols);
            assert!(
                rows * GLYPH_PAGE_SIZE <= window.texture_size(),
                "glyph pages ({}) exceed window {} atlas texture capacity",
                needed,
                window.id()
            );
            let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Glyph Atlas Texture"),
                size: wgpu::Extent3d {
                    width: cols * GLYPH_PAGE_SIZE,
                    height: rows * GLYPH_PAGE_SIZE,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            textures.insert(
                window.id(),
                FontTexture {
                    texture,
                    view,
                    generation: window.generation(),
                    cols,
                    rows,
                    uploaded: vec![0; pages.len()],
                },
            );
        }

        let tex = textures.get_mut(&window.id()).unwrap();
        tex.uploaded.resize(pages.len(), 0);
        for (i, page) in pages.iter().enumerate() {
            if tex.uploaded[i] >= page.glyphs.len() {
                continue;
            }
            let tile_x = (i as u32 % tex.cols) * GLYPH_PAGE_SIZE;
            let tile_y = (i as u32 / tex.cols) * GLYPH_PAGE_SIZE;
            gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: tile_x,
                        y: tile_y,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &page.bitmap,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(GLYPH_PAGE_SIZE),
                    rows_per_image: Some(GLYPH_PAGE_SIZE),
                },
                wgpu::Extent3d {
                    width: GLYPH_PAGE_SIZE,
                    height: GLYPH_PAGE_SIZE,
                    depth_or_array_layers: 1,
                },
            );
            tex.uploaded[i] = page.glyphs.len();
        }
    }

    /// The atlas texture view for a window, if one has been uploaded.
    pub fn texture_view(&self, window_id: WindowId) -> Option<wgpu::TextureView> {
        self.textures.borrow().get(&window_id).map(|t| t.view.clone())
    }

    /// Drop this window's GPU texture. Called on context loss; the next
    /// `update` after restoration re-creates and re-uploads everything.
    pub fn context_changed(&self, window_id: WindowId, lost: bool) {
        if lost {
            self.textures.borrow_mut().remove(&window_id);
        }
    }

    pub(crate) fn pages(&self) -> Ref<'_, Vec<GlyphPage>> {
        self.pages.borrow()
    }
}

/// Shapes a string into atlas glyphs, one cluster at a time.
pub struct GlyphIterator<'f> {
    font: &'f Font,
    clusters: ClusterIterator,
}

impl GlyphIterator<'_> {
    pub fn next_glyph(&mut self) -> Option<Rc<GlyphData>> {
        self.clusters.next_cluster().map(|c| self.font.glyph(&c))
    }
}

impl Iterator for GlyphIterator<'_> {
    type Item = Rc<GlyphData>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_glyph()
    }
}


#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::testing::fixed_font;
    use super::*;

    #[test]
    fn test_glyph_identity_is_stable() {
        let font = fixed_font();
        let a1 = font.glyph("A");
        let a2 = font.glyph("A");
        assert!(Rc::ptr_eq(&a1, &a2));
    }

    #[test]
    fn test_distinct_glyphs_do_not_share_cells() {
        let font = fixed_font();
        let a = font.glyph("A");
        let b = font.glyph("B");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(a.page, b.page);
        let overlap = a.x < b.x + b.width
            && b.x < a.x + a.width
            && a.y < b.y + b.height
            && b.y < a.y + a.height;
        assert!(!overlap, "glyph cells overlap: {:?} vs {:?}", a, b);
    }

    #[test]
    fn test_packing_stays_inside_page() {
        let font = fixed_font();
        for i in 0..2000 {
            let g = font.glyph(&format!("g{}", i));
            assert!(g.x + g.width <= GLYPH_PAGE_SIZE);
            assert!(g.y + g.height <= GLYPH_PAGE_SIZE);
        }
    }

    #[test]
    fn test_overflow_creates_new_pages() {
        let font = fixed_font();
        // Cells are ~24-54 texels wide at 20 tall; a few hundred fit a
        // 512 texel page.
        for i in 0..1000 {
            font.glyph(&format!("x{}", i));
        }
        assert!(font.page_count() > 1);
        // Every page respects the packing bound.
        for page in font.pages().iter() {
            for g in &page.glyphs {
                assert!(g.x + g.width <= GLYPH_PAGE_SIZE);
                assert!(g.y + g.height <= GLYPH_PAGE_SIZE);
            }
        }
    }

    #[test]
    fn test_shape_reuses_atlas_glyphs() {
        let font = fixed_font();
        let shaped: Vec<_> = font.shape("ab").collect();
        assert_eq!(shaped.len(), 2);
        assert!(Rc::ptr_eq(&shaped[0], &font.glyph("a")));
    }

    #[test]
    fn test_update_is_noop_when_context_lost() {
        let font = fixed_font();
        font.glyph("A");
        let window = crate::window::WindowContext::headless(7, 4096);
        font.update(&window);
        assert!(font.texture_view(7).is_none());
    }
}

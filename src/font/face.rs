//! Glyph measurement and rasterization.
//!
//! The atlas does not touch font files directly; it talks to a
//! [`GlyphSource`]. The production source is [`FontFace`], backed by
//! `ab_glyph`. Tests substitute a fixed-metric source so the atlas and
//! everything above it run without font data.

use ab_glyph::{Font as AbFont, FontVec, PxScale, ScaleFont};

/// Metrics for one shaped cluster, in pixels at the source's size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphMetrics {
    /// Horizontal extent of the rendered cell.
    pub width: f32,
    /// Vertical extent of the rendered cell (full line height).
    pub height: f32,
    /// Baseline to cell top.
    pub ascent: f32,
    /// Baseline to cell bottom (positive).
    pub descent: f32,
    /// Horizontal cursor step.
    pub advance: f32,
}

pub trait GlyphSource {
    fn font_size(&self) -> f32;

    fn line_height(&self) -> f32;

    /// Baseline offset from the top of a line.
    fn ascent(&self) -> f32;

    fn measure(&self, text: &str) -> GlyphMetrics;

    /// Render coverage for `text` into a `width * height` byte buffer
    /// (row-major, one coverage byte per texel, baseline at `ascent`).
    fn rasterize(&self, text: &str, width: u32, height: u32) -> Vec<u8>;
}

/// `ab_glyph`-backed glyph source.
pub struct FontFace {
    font: FontVec,
    scale: PxScale,
    size_px: f32,
}

impl FontFace {
    /// Parse font bytes and fix the pixel size.
    ///
    /// ab_glyph's PxScale(n) makes ascent + |descent| equal n, while
    /// canvas-style font sizing maps the em square to n pixels. Scale the
    /// PxScale by height/upm so both agree on visual size.
    pub fn new(font_data: Vec<u8>, size_px: f32) -> Result<Self, ab_glyph::InvalidFont> {
        let font = FontVec::try_from_vec(font_data)?;
        let upm = font.units_per_em().unwrap_or(1000.0);
        let height_unscaled = font.ascent_unscaled() - font.descent_unscaled();
        let scale = PxScale::from(size_px * height_unscaled / upm);
        log::debug!(
            "font face: upm={} height_u={} -> PxScale({:.3}) for {}px",
            upm,
            height_unscaled,
            scale.x,
            size_px
        );
        Ok(Self {
            font,
            scale,
            size_px,
        })
    }

    fn scaled(&self) -> ab_glyph::PxScaleFont<&FontVec> {
        self.font.as_scaled(self.scale)
    }
}

impl GlyphSource for FontFace {
    fn font_size(&self) -> f32 {
        self.size_px
    }

    fn line_height(&self) -> f32 {
        let sf = self.scaled();
        sf.ascent() - sf.descent() + sf.line_gap()
    }

    fn ascent(&self) -> f32 {
        self.scaled().ascent()
    }

    fn measure(&self, text: &str) -> GlyphMetrics {
        let sf = self.scaled();
        let mut advance = 0.0f32;
        for ch in text.chars() {
            advance += sf.h_advance(sf.font.glyph_id(ch));
        }
        let ascent = sf.ascent();
        let descent = -sf.descent();
        GlyphMetrics {
            width: advance.max(1.0),
            height: ascent + descent,
            ascent,
            descent,
            advance,
        }
    }

    fn rasterize(&self, text: &str, width: u32, height: u32) -> Vec<u8> {
        let sf = self.scaled();
        let mut buf = vec![0u8; (width * height) as usize];
        let mut pen_x = 0.0f32;
        let baseline = sf.ascent();
        for ch in text.chars() {
            let id = sf.font.glyph_id(ch);
            let glyph = id.with_scale_and_position(self.scale, ab_glyph::point(pen_x, baseline));
            pen_x += sf.h_advance(id);
            let Some(outlined) = sf.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    return;
                }
                let idx = (py as u32 * width + px as u32) as usize;
                let v = (coverage * 255.0) as u8;
                // Combining marks overlap their base; keep the max.
                buf[idx] = buf[idx].max(v);
            });
        }
        buf
    }
}

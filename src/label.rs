//! Multi-line editable text built from shaped lines.
//!
//! A [`Label`] owns its caret and all text mutation; painting goes
//! through a [`crate::paint::GlyphPainter`] whose font must be the very
//! same [`Font`] the label was shaped with.

use std::rc::Rc;

use bitflags::bitflags;

use crate::color::Color;
use crate::font::{char_direction, Font, GlyphData, TextDirection};
use crate::paint::counts::DraftCounts;
use crate::paint::glyph_painter::GlyphPainter;
use crate::window::WindowContext;

bitflags! {
    /// Keyboard modifier state delivered with [`Key`] events.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
    }
}

/// Key events a label understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Delete,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
}

/// One visual line: an ordered run of shaped glyphs plus size aggregates.
pub struct Line {
    text: String,
    glyphs: Vec<Rc<GlyphData>>,
    width: f32,
    height: f32,
}

impl Line {
    fn from_glyphs(font: &Font, glyphs: Vec<Rc<GlyphData>>) -> Self {
        let text = glyphs.iter().map(|g| g.letter.as_str()).collect();
        let width = glyphs.iter().map(|g| g.advance).sum();
        Self {
            text,
            glyphs,
            width,
            height: font.line_height(),
        }
    }

    fn from_text(font: &Font, text: &str) -> Self {
        Self::from_glyphs(font, font.shape(text).collect())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn glyphs(&self) -> &[Rc<GlyphData>] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Byte offset into `text` of the glyph at `pos` (or the line end).
    fn byte_offset(&self, pos: usize) -> usize {
        self.glyphs[..pos.min(self.glyphs.len())]
            .iter()
            .map(|g| g.letter.len())
            .sum()
    }

    /// The direction a glyph contributes to run grouping.
    fn glyph_direction(g: &GlyphData, paragraph: TextDirection) -> TextDirection {
        let d = g
            .letter
            .chars()
            .next()
            .map(char_direction)
            .unwrap_or(TextDirection::Neutral);
        if d == TextDirection::Neutral {
            paragraph
        } else {
            d
        }
    }

    /// Paint this line's glyphs, grouping consecutive same-direction
    /// glyphs into runs. A run opposing the paragraph direction is drawn
    /// in reverse glyph order.
    #[allow(clippy::too_many_arguments)]
    pub fn paint(
        &self,
        painter: &mut GlyphPainter,
        window: &WindowContext,
        x: f32,
        y: f32,
        font_scale: f32,
        color: Color,
        background: Color,
        paragraph: TextDirection,
    ) {
        let mut cursor = x;
        let mut i = 0;
        while i < self.glyphs.len() {
            let dir = Self::glyph_direction(&self.glyphs[i], paragraph);
            let mut j = i + 1;
            while j < self.glyphs.len()
                && Self::glyph_direction(&self.glyphs[j], paragraph) == dir
            {
                j += 1;
            }
            let run = &self.glyphs[i..j];
            if dir == paragraph {
                for g in run {
                    painter.draw_glyph(window, g, cursor, y, font_scale, color, background);
                    cursor += g.advance * font_scale;
                }
            } else {
                for g in run.iter().rev() {
                    painter.draw_glyph(window, g, cursor, y, font_scale, color, background);
                    cursor += g.advance * font_scale;
                }
            }
            i = j;
        }
    }
}

pub struct Label {
    font: Rc<Font>,
    lines: Vec<Line>,
    caret_line: usize,
    caret_pos: usize,
    editable: bool,
    rtl: bool,
    wrap_width: Option<f32>,
    on_change: Option<Box<dyn Fn()>>,
}

impl Label {
    pub fn new(font: Rc<Font>) -> Self {
        let empty = Line::from_text(&font, "");
        Self {
            font,
            lines: vec![empty],
            caret_line: 0,
            caret_pos: 0,
            editable: false,
            rtl: false,
            wrap_width: None,
            on_change: None,
        }
    }

    pub fn font(&self) -> &Rc<Font> {
        &self.font
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_rtl(&mut self, rtl: bool) {
        self.rtl = rtl;
    }

    /// Wrap lines to this width (unscaled glyph units) on `set_text`.
    pub fn set_wrap_width(&mut self, width: Option<f32>) {
        self.wrap_width = width;
    }

    pub fn set_on_change(&mut self, cb: Option<Box<dyn Fn()>>) {
        self.on_change = cb;
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, i: usize) -> &Line {
        &self.lines[i]
    }

    pub fn caret_line(&self) -> usize {
        self.caret_line
    }

    pub fn caret_pos(&self) -> usize {
        self.caret_pos
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&line.text);
        }
        out
    }

    /// Max line width and summed line heights, unscaled.
    pub fn size(&self) -> (f32, f32) {
        let w = self.lines.iter().map(|l| l.width).fold(0.0, f32::max);
        let h = self.lines.iter().map(|l| l.height).sum();
        (w, h)
    }

    pub fn set_text(&mut self, text: &str) {
        self.lines.clear();
        for paragraph in text.split('\n') {
            self.push_paragraph(paragraph);
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from_text(&self.font, ""));
        }
        self.caret_line = self.caret_line.min(self.lines.len() - 1);
        self.caret_pos = self.caret_pos.min(self.lines[self.caret_line].len());
        self.notify();
    }

    fn push_paragraph(&mut self, paragraph: &str) {
        let glyphs: Vec<_> = self.font.shape(paragraph).collect();
        match self.wrap_width {
            None => self.lines.push(Line::from_glyphs(&self.font, glyphs)),
            Some(limit) => {
                let mut current: Vec<Rc<GlyphData>> = Vec::new();
                let mut width = 0.0f32;
                for g in glyphs {
                    if !current.is_empty() && width + g.advance > limit {
                        self.lines
                            .push(Line::from_glyphs(&self.font, std::mem::take(&mut current)));
                        width = 0.0;
                    }
                    width += g.advance;
                    current.push(g);
                }
                self.lines.push(Line::from_glyphs(&self.font, current));
            }
        }
    }

    fn notify(&self) {
        if let Some(cb) = &self.on_change {
            cb();
        }
    }

    fn rebuild_line(&mut self, index: usize, text: String) {
        self.lines[index] = Line::from_text(&self.font, &text);
    }

    /// Handle one key event. Returns true when the event was consumed.
    pub fn key(&mut self, key: Key, _mods: Modifiers) -> bool {
        match key {
            Key::ArrowLeft => {
                if self.caret_pos > 0 {
                    self.caret_pos -= 1;
                } else if self.caret_line > 0 {
                    self.caret_line -= 1;
                    self.caret_pos = self.lines[self.caret_line].len();
                }
                true
            }
            Key::ArrowRight => {
                if self.caret_pos < self.lines[self.caret_line].len() {
                    self.caret_pos += 1;
                } else if self.caret_line + 1 < self.lines.len() {
                    self.caret_line += 1;
                    self.caret_pos = 0;
                }
                true
            }
            Key::ArrowUp => {
                if self.caret_line > 0 {
                    self.caret_line -= 1;
                    self.caret_pos = self.caret_pos.min(self.lines[self.caret_line].len());
                }
                true
            }
            Key::ArrowDown => {
                if self.caret_line + 1 < self.lines.len() {
                    self.caret_line += 1;
                    self.caret_pos = self.caret_pos.min(self.lines[self.caret_line].len());
                }
                true
            }
            Key::Home => {
                self.caret_pos = 0;
                true
            }
            Key::End => {
                self.caret_pos = self.lines[self.caret_line].len();
                true
            }
            Key::Char(c) if self.editable => {
                let offset = self.lines[self.caret_line].byte_offset(self.caret_pos);
                let mut text = self.lines[self.caret_line].text.clone();
                text.insert(offset, c);
                self.rebuild_line(self.caret_line, text);
                // Clusters can merge on insert (combining marks, cursive
                // joins), so clamp rather than assume the line grew.
                self.caret_pos = (self.caret_pos + 1).min(self.lines[self.caret_line].len());
                self.notify();
                true
            }
            Key::Enter if self.editable => {
                let offset = self.lines[self.caret_line].byte_offset(self.caret_pos);
                let text = self.lines[self.caret_line].text.clone();
                let (head, tail) = text.split_at(offset);
                self.rebuild_line(self.caret_line, head.to_string());
                let tail_line = Line::from_text(&self.font, tail);
                self.lines.insert(self.caret_line + 1, tail_line);
                self.caret_line += 1;
                self.caret_pos = 0;
                self.notify();
                true
            }
            Key::Backspace if self.editable => {
                if self.caret_pos > 0 {
                    let start = self.lines[self.caret_line].byte_offset(self.caret_pos - 1);
                    let end = self.lines[self.caret_line].byte_offset(self.caret_pos);
                    let mut text = self.lines[self.caret_line].text.clone();
                    text.replace_range(start..end, "");
                    self.rebuild_line(self.caret_line, text);
                    self.caret_pos -= 1;
                    self.notify();
                } else if self.caret_line > 0 {
                    // Merge with the previous line.
                    let removed = self.lines.remove(self.caret_line);
                    self.caret_line -= 1;
                    let pos = self.lines[self.caret_line].len();
                    let merged = format!("{}{}", self.lines[self.caret_line].text, removed.text);
                    self.rebuild_line(self.caret_line, merged);
                    self.caret_pos = pos;
                    self.notify();
                }
                true
            }
            Key::Delete if self.editable => {
                if self.caret_pos < self.lines[self.caret_line].len() {
                    let start = self.lines[self.caret_line].byte_offset(self.caret_pos);
                    let end = self.lines[self.caret_line].byte_offset(self.caret_pos + 1);
                    let mut text = self.lines[self.caret_line].text.clone();
                    text.replace_range(start..end, "");
                    self.rebuild_line(self.caret_line, text);
                    self.notify();
                } else if self.caret_line + 1 < self.lines.len() {
                    let removed = self.lines.remove(self.caret_line + 1);
                    let merged = format!("{}{}", self.lines[self.caret_line].text, removed.text);
                    self.rebuild_line(self.caret_line, merged);
                    self.notify();
                }
                true
            }
            _ => false,
        }
    }

    /// Move the caret to the position nearest a label-local point.
    ///
    /// Points above or left of all content clamp to (0, 0); points below
    /// the last line clamp onto it. Within a line the caret lands on the
    /// side of the glyph the point is closest to.
    pub fn click(&mut self, x: f32, y: f32) {
        if y < 0.0 {
            self.caret_line = 0;
        } else {
            let mut top = 0.0f32;
            let mut found = self.lines.len() - 1;
            for (i, line) in self.lines.iter().enumerate() {
                if y < top + line.height {
                    found = i;
                    break;
                }
                top += line.height;
            }
            self.caret_line = found;
        }

        let line = &self.lines[self.caret_line];
        if x <= 0.0 {
            self.caret_pos = 0;
            return;
        }
        let mut cursor = 0.0f32;
        for (i, g) in line.glyphs.iter().enumerate() {
            if x <= cursor + g.advance / 2.0 {
                self.caret_pos = i;
                return;
            }
            cursor += g.advance;
        }
        self.caret_pos = line.len();
    }

    /// Declare glyph needs for buffer sizing, per atlas page.
    pub fn draft(&self, counts: &mut DraftCounts) {
        for line in &self.lines {
            for g in &line.glyphs {
                counts.add_glyphs(g.page, 1);
            }
        }
    }

    /// Paint all lines through the given painter.
    ///
    /// Panics if the painter's font is not this label's font; a label is
    /// rebuilt, never re-targeted, when fonts change.
    #[allow(clippy::too_many_arguments)]
    pub fn paint(
        &self,
        painter: &mut GlyphPainter,
        window: &WindowContext,
        x: f32,
        y: f32,
        font_scale: f32,
        color: Color,
        background: Color,
    ) {
        assert!(
            Rc::ptr_eq(&self.font, painter.font()),
            "label painted with a painter for a different font"
        );
        let paragraph = if self.rtl {
            TextDirection::Rtl
        } else {
            TextDirection::Ltr
        };
        let mut line_y = y;
        for line in &self.lines {
            line.paint(
                painter, window, x, line_y, font_scale, color, background, paragraph,
            );
            line_y += line.height * font_scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::font::testing::fixed_font;

    fn label_with(text: &str) -> Label {
        let font = Rc::new(fixed_font());
        let mut label = Label::new(font);
        label.set_editable(true);
        label.set_text(text);
        label
    }

    fn caret_ok(label: &Label) -> bool {
        label.caret_line() < label.line_count()
            && label.caret_pos() <= label.line(label.caret_line()).len()
    }

    #[test]
    fn test_set_text_splits_lines() {
        let label = label_with("No time\nLol");
        assert_eq!(label.line_count(), 2);
        assert_eq!(label.line(0).text(), "No time");
        assert_eq!(label.line(1).text(), "Lol");
        assert_eq!(label.text(), "No time\nLol");
    }

    #[test]
    fn test_click_lands_after_first_glyph() {
        // Fixed source: every glyph advance is 10.
        let mut label = label_with("No time");
        let n_width = label.font().glyph("N").width as f32;
        label.click(n_width + 1.0, 0.0);
        assert_eq!(label.caret_line(), 0);
        assert_eq!(label.caret_pos(), 1);
    }

    #[test]
    fn test_click_clamps_negative_to_origin() {
        let mut label = label_with("No time\nLol");
        label.click(-5.0, -5.0);
        assert_eq!(label.caret_line(), 0);
        assert_eq!(label.caret_pos(), 0);
    }

    #[test]
    fn test_click_below_content_clamps_to_last_line() {
        let mut label = label_with("No time\nLol");
        label.click(5.0, 10_000.0);
        assert_eq!(label.caret_line(), 1);
    }

    #[test]
    fn test_insert_advances_caret() {
        let mut label = label_with("ab");
        label.key(Key::End, Modifiers::empty());
        label.key(Key::Char('c'), Modifiers::empty());
        assert_eq!(label.line(0).text(), "abc");
        assert_eq!(label.caret_pos(), 3);
    }

    #[test]
    fn test_backspace_at_line_start_merges() {
        let mut label = label_with("ab\ncd");
        label.key(Key::ArrowDown, Modifiers::empty());
        label.key(Key::Home, Modifiers::empty());
        label.key(Key::Backspace, Modifiers::empty());
        assert_eq!(label.line_count(), 1);
        assert_eq!(label.line(0).text(), "abcd");
        assert_eq!(label.caret_pos(), 2);
    }

    #[test]
    fn test_delete_at_line_end_merges() {
        let mut label = label_with("ab\ncd");
        label.key(Key::End, Modifiers::empty());
        label.key(Key::Delete, Modifiers::empty());
        assert_eq!(label.line_count(), 1);
        assert_eq!(label.line(0).text(), "abcd");
    }

    #[test]
    fn test_enter_splits_line() {
        let mut label = label_with("abcd");
        label.key(Key::ArrowRight, Modifiers::empty());
        label.key(Key::ArrowRight, Modifiers::empty());
        label.key(Key::Enter, Modifiers::empty());
        assert_eq!(label.line_count(), 2);
        assert_eq!(label.line(0).text(), "ab");
        assert_eq!(label.line(1).text(), "cd");
        assert_eq!((label.caret_line(), label.caret_pos()), (1, 0));
    }

    #[test]
    fn test_caret_invariant_under_key_storm() {
        let mut label = label_with("one\ntwo three\nfour");
        let keys = [
            Key::ArrowUp,
            Key::ArrowDown,
            Key::ArrowLeft,
            Key::ArrowRight,
            Key::Home,
            Key::End,
            Key::Backspace,
            Key::Delete,
            Key::Char('z'),
            Key::Enter,
        ];
        for i in 0..200 {
            label.key(keys[i % keys.len()], Modifiers::empty());
            assert!(caret_ok(&label), "caret out of range after step {}", i);
        }
    }

    #[test]
    fn test_non_editable_ignores_edits() {
        let font = Rc::new(fixed_font());
        let mut label = Label::new(font);
        label.set_text("ro");
        assert!(!label.key(Key::Char('x'), Modifiers::empty()));
        assert_eq!(label.text(), "ro");
    }

    #[test]
    fn test_wrap_width_breaks_lines() {
        let font = Rc::new(fixed_font());
        let mut label = Label::new(font);
        // Advance is 10 per glyph; 25 fits two glyphs per line.
        label.set_wrap_width(Some(25.0));
        label.set_text("abcde");
        assert_eq!(label.line_count(), 3);
        assert_eq!(label.line(0).text(), "ab");
        assert_eq!(label.line(1).text(), "cd");
        assert_eq!(label.line(2).text(), "e");
    }

    #[test]
    fn test_change_callback_fires_on_edit() {
        let fired = Rc::new(Cell::new(0u32));
        let mut label = label_with("a");
        let f = fired.clone();
        label.set_on_change(Some(Box::new(move || f.set(f.get() + 1))));
        label.key(Key::Char('b'), Modifiers::empty());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    #[should_panic(expected = "different font")]
    fn test_paint_with_foreign_font_painter_panics() {
        use crate::paint::glyph_painter::GlyphPainter;
        let label = label_with("abc");
        let other_font = Rc::new(fixed_font());
        let mut painter = GlyphPainter::new(other_font);
        let window = crate::window::WindowContext::headless(1, 4096);
        label.paint(
            &mut painter,
            &window,
            0.0,
            0.0,
            1.0,
            crate::color::Color::BLACK,
            crate::color::Color::TRANSPARENT,
        );
    }

    #[test]
    fn test_draft_counts_label_glyphs() {
        let label = label_with("abc");
        let mut counts = crate::paint::counts::DraftCounts::default();
        label.draft(&mut counts);
        assert_eq!(counts.glyphs(0), 3);
    }
}

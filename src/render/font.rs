//! Bitmap fonts for label rendering.
//!
//! Uses the Spleen bitmap font family embedded in the binary, so glyph
//! shapes never depend on fonts installed on the host.

use std::collections::HashMap;

use spleen_font::{FONT_6X12, FONT_8X16, FONT_12X24, PSF2Font};

use super::RenderError;

/// Font sizes available to the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontSize {
    /// Spleen 6×12
    Small,
    /// Spleen 8×16
    Medium,
    /// Spleen 12×24
    Large,
}

/// Cell size of a font before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub char_width: usize,
    pub char_height: usize,
}

impl FontMetrics {
    pub const SMALL: FontMetrics = FontMetrics {
        char_width: 6,
        char_height: 12,
    };

    pub const MEDIUM: FontMetrics = FontMetrics {
        char_width: 8,
        char_height: 16,
    };

    pub const LARGE: FontMetrics = FontMetrics {
        char_width: 12,
        char_height: 24,
    };

    pub fn for_size(size: FontSize) -> FontMetrics {
        match size {
            FontSize::Small => Self::SMALL,
            FontSize::Medium => Self::MEDIUM,
            FontSize::Large => Self::LARGE,
        }
    }
}

/// A rendered glyph: `width * height` cells, 1 = ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<u8>,
}

impl Glyph {
    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x] != 0
    }
}

/// Glyph cache over the embedded Spleen fonts.
#[derive(Default)]
pub struct GlyphSet {
    cache: HashMap<(FontSize, char), Glyph>,
}

impl GlyphSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate (or fetch from cache) the glyph bitmap for a character.
    ///
    /// Characters missing from Spleen get a procedural fallback for common
    /// label punctuation, or a box outline.
    pub fn glyph(&mut self, size: FontSize, ch: char) -> Result<Glyph, RenderError> {
        if let Some(glyph) = self.cache.get(&(size, ch)) {
            return Ok(glyph.clone());
        }
        let glyph = generate_glyph(size, ch)?;
        self.cache.insert((size, ch), glyph.clone());
        Ok(glyph)
    }
}

fn generate_glyph(size: FontSize, ch: char) -> Result<Glyph, RenderError> {
    let metrics = FontMetrics::for_size(size);
    let (w, h) = (metrics.char_width, metrics.char_height);
    let mut cells = vec![0u8; w * h];

    let data = match size {
        FontSize::Small => FONT_6X12,
        FontSize::Medium => FONT_8X16,
        FontSize::Large => FONT_12X24,
    };
    let mut spleen = PSF2Font::new(data)
        .map_err(|_| RenderError::Font(format!("cannot parse Spleen {}x{}", w, h)))?;

    let utf8 = ch.to_string();
    if let Some(spleen_glyph) = spleen.glyph_for_utf8(utf8.as_bytes()) {
        for (row_y, row) in spleen_glyph.enumerate() {
            for (col_x, on) in row.enumerate() {
                if row_y < h && col_x < w && on {
                    cells[row_y * w + col_x] = 1;
                }
            }
        }
    } else if let Some(fb) = fallback_glyph(ch, w, h) {
        cells = fb;
    } else {
        draw_box(&mut cells, w, h);
    }

    Ok(Glyph {
        width: w,
        height: h,
        cells,
    })
}

/// Draw a box outline in the glyph buffer.
fn draw_box(glyph: &mut [u8], width: usize, height: usize) {
    for x in 0..width {
        glyph[x] = 1;
        glyph[(height - 1) * width + x] = 1;
    }
    for y in 0..height {
        glyph[y * width] = 1;
        glyph[y * width + width - 1] = 1;
    }
}

/// Fill a rectangular region in a glyph buffer. Coordinates are clamped to bounds.
fn fill_rect(g: &mut [u8], stride: usize, x1: usize, y1: usize, x2: usize, y2: usize) {
    let h = g.len() / stride;
    for y in y1..y2.min(h) {
        for x in x1..x2.min(stride) {
            g[y * stride + x] = 1;
        }
    }
}

/// Procedurally draw glyphs that kitchen labels use but Spleen may lack.
fn fallback_glyph(ch: char, w: usize, h: usize) -> Option<Vec<u8>> {
    let mut g = vec![0u8; w * h];
    let cx = w / 2;
    let cy = h / 2;

    match ch {
        // • bullet
        '\u{2022}' => {
            let r = (w / 4).max(1);
            fill_rect(&mut g, w, cx - r, cy - r, cx + r, cy + r);
        }
        // – — dashes
        '\u{2013}' | '\u{2014}' => {
            let inset = if ch == '\u{2013}' { w / 6 } else { 0 };
            fill_rect(&mut g, w, inset, cy.saturating_sub(1), w - inset, cy + 1);
        }
        // ■ filled square
        '\u{25A0}' => {
            let mx = w / 6;
            let my = h / 6;
            fill_rect(&mut g, w, mx, my, w - mx, h - my);
        }
        _ => return None,
    }

    Some(g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyph_dimensions_match_metrics() {
        let mut set = GlyphSet::new();
        for size in [FontSize::Small, FontSize::Medium, FontSize::Large] {
            let m = FontMetrics::for_size(size);
            let g = set.glyph(size, 'A').unwrap();
            assert_eq!(g.width, m.char_width);
            assert_eq!(g.height, m.char_height);
            assert_eq!(g.cells.len(), m.char_width * m.char_height);
        }
    }

    #[test]
    fn test_letters_have_ink_and_space_does_not() {
        let mut set = GlyphSet::new();
        let a = set.glyph(FontSize::Medium, 'A').unwrap();
        assert!(a.cells.iter().any(|&c| c == 1));
        let space = set.glyph(FontSize::Medium, ' ').unwrap();
        assert!(space.cells.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_glyphs_are_deterministic() {
        let mut cached = GlyphSet::new();
        for ch in "Allergens: Milk, Egg 0123456789/".chars() {
            let first = cached.glyph(FontSize::Large, ch).unwrap();
            let again = cached.glyph(FontSize::Large, ch).unwrap();
            assert_eq!(first, again);
            assert_eq!(first, generate_glyph(FontSize::Large, ch).unwrap());
        }
    }

    #[test]
    fn test_fallback_bullet() {
        let g = fallback_glyph('\u{2022}', 8, 16).unwrap();
        assert!(g.iter().any(|&c| c == 1));
        assert!(fallback_glyph('x', 8, 16).is_none());
    }
}

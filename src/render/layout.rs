//! # Label Layout
//!
//! Turns a [`LabelDescription`] into positioned lines of text, then draws
//! them onto a grayscale canvas.
//!
//! Layout is integer-only: font cells are fixed-size Spleen glyphs scaled by
//! whole numbers, words wrap on character counts, and nothing depends on
//! the host (fonts, locale, clock). The same description and dimensions
//! always produce the same pixels.
//!
//! ## Structure (top to bottom)
//!
//! ```text
//! ┌──────────────────────────────┐
//! │█████████ PREP ███████████████│  banner (inverted, variant only)
//! │ CHICKEN STOCK                │  title (largest font that fits 2 lines)
//! │ Printed: 18/10/2026          │
//! │ Use by: 21/10/2026           │
//! │ Allergens: Celery            │  or "No allergens"
//! │ Ingredients:                 │  extended only
//! │ Chicken, Onion, Celery, ...  │  allergen-bearing ingredients bold
//! │ Storage: Keep below 5°C      │  PPDS only
//! │        Corner Deli           │  PPDS only
//! └──────────────────────────────┘
//! ```
//!
//! Lines that do not fit above the bottom margin are dropped, and the last
//! line that fits ends with `...`.

use super::font::{FontMetrics, FontSize, GlyphSet};
use super::{PixelRaster, RenderError};
use crate::label::{LabelDescription, LabelHeight};
use crate::printer::PixelDimensions;

/// Background value of the canvas.
pub const PAPER: u8 = 255;

/// Ink value of the canvas.
pub const INK: u8 = 0;

/// Reference width the font sizes are tuned for (60 mm at 203 DPI).
const REFERENCE_WIDTH: u32 = 480;

const ELLIPSIS: &str = "...";

/// A span of text sharing one weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Left,
    Centered,
    /// White text on a full-width black bar.
    Banner,
}

/// One laid-out line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub font: FontSize,
    pub scale: usize,
    pub style: LineStyle,
    pub runs: Vec<Run>,
    /// Vertical space below the line, in pixels.
    pub gap_after: usize,
}

impl Line {
    pub fn char_count(&self) -> usize {
        self.runs.iter().map(|r| r.text.chars().count()).sum()
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    fn cell_width(&self) -> usize {
        FontMetrics::for_size(self.font).char_width * self.scale
    }

    fn text_height(&self) -> usize {
        FontMetrics::for_size(self.font).char_height * self.scale
    }

    fn banner_padding(&self) -> usize {
        match self.style {
            LineStyle::Banner => 2 * self.scale,
            _ => 0,
        }
    }

    pub fn width_px(&self) -> usize {
        self.char_count() * self.cell_width()
    }

    /// Height including banner padding, excluding `gap_after`.
    pub fn height_px(&self) -> usize {
        self.text_height() + 2 * self.banner_padding()
    }
}

/// A line with its vertical position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub line: Line,
    pub y: usize,
}

/// Result of laying out a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub dims: PixelDimensions,
    pub margin: usize,
    pub lines: Vec<PlacedLine>,
    /// Content was dropped because it did not fit.
    pub truncated: bool,
}

/// Lay out a label for the given pixel size.
pub fn plan(label: &LabelDescription, dims: PixelDimensions) -> Result<LayoutPlan, RenderError> {
    if dims.is_empty() {
        return Err(RenderError::Layout(format!("cannot lay out a {} label", dims)));
    }

    let width = dims.width as usize;
    let scale = (dims.width / REFERENCE_WIDTH).max(1) as usize;
    let margin = (4 * scale).min(width / 8);
    let content_width = width - 2 * margin;

    let mut lines = Vec::new();
    let body = |runs: Vec<Run>, gap: usize| -> Result<Vec<Line>, RenderError> {
        wrap_line(runs, FontSize::Medium, scale, LineStyle::Left, content_width, gap)
    };

    if let Some(banner) = label.label_variant.banner() {
        lines.push(Line {
            font: FontSize::Large,
            scale,
            style: LineStyle::Banner,
            runs: vec![Run::bold(banner)],
            gap_after: 4 * scale,
        });
    }

    lines.extend(title_lines(&label.name, scale, content_width)?);

    let printed = label.printed_on_display().map_err(RenderError::Layout)?;
    let expiry = label.expiry_display().map_err(RenderError::Layout)?;
    lines.extend(body(vec![Run::plain("Printed: "), Run::plain(printed)], scale)?);
    lines.extend(body(vec![Run::plain("Use by: "), Run::bold(expiry)], scale)?);
    if let Some(by) = label.prepared_by.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        lines.extend(body(vec![Run::plain("By: "), Run::plain(by)], scale)?);
    }

    let allergens = label.allergen_names();
    let allergen_runs = if allergens.is_empty() {
        vec![Run::plain("No allergens")]
    } else {
        let mut runs = vec![Run::plain("Allergens: ")];
        runs.extend(join_runs(allergens.into_iter().map(Run::bold)));
        runs
    };
    lines.extend(body(allergen_runs, 3 * scale)?);

    if label.effective_height() == LabelHeight::Extended {
        let ingredients = label.ingredient_lines();
        if !ingredients.is_empty() {
            lines.extend(body(vec![Run::bold("Ingredients:")], scale)?);
            let runs = join_runs(ingredients.into_iter().map(|i| Run {
                text: i.name,
                bold: i.contains_allergen,
            }));
            lines.extend(body(runs, 3 * scale)?);
        }

        if label.is_ppds() {
            if let Some(storage) = label.storage_info.as_deref() {
                lines.extend(body(
                    vec![Run::plain("Storage: "), Run::plain(storage.trim())],
                    3 * scale,
                )?);
            }
            if let Some(business) = label.business_name.as_deref() {
                lines.extend(wrap_line(
                    vec![Run::bold(business.trim())],
                    FontSize::Medium,
                    scale,
                    LineStyle::Centered,
                    content_width,
                    scale,
                )?);
            }
        }
    }

    place(lines, dims, margin)
}

/// Title in the largest font that keeps it within two lines.
fn title_lines(name: &str, scale: usize, content_width: usize) -> Result<Vec<Line>, RenderError> {
    let name = name.trim();
    for (font, s) in [
        (FontSize::Large, scale * 2),
        (FontSize::Large, scale),
        (FontSize::Medium, scale),
    ] {
        let wrapped = wrap_line(
            vec![Run::bold(name)],
            font,
            s,
            LineStyle::Left,
            content_width,
            2 * scale,
        );
        if let Ok(lines) = wrapped {
            if lines.len() <= 2 {
                return Ok(lines);
            }
        }
    }
    wrap_line(
        vec![Run::bold(name)],
        FontSize::Small,
        scale,
        LineStyle::Left,
        content_width,
        2 * scale,
    )
}

/// Join items with ", ", keeping each item's weight.
fn join_runs(items: impl Iterator<Item = Run>) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (i, mut run) in items.enumerate() {
        if i > 0 {
            if let Some(prev) = runs.last_mut() {
                prev.text.push(',');
            }
            run.text.insert(0, ' ');
        }
        runs.push(run);
    }
    runs
}

/// Greedy word wrap over styled runs.
///
/// Words never split across lines unless a single word is wider than the
/// line, in which case it is broken by character.
pub fn wrap_line(
    runs: Vec<Run>,
    font: FontSize,
    scale: usize,
    style: LineStyle,
    content_width: usize,
    gap_after: usize,
) -> Result<Vec<Line>, RenderError> {
    let cell = FontMetrics::for_size(font).char_width * scale;
    let max_chars = content_width / cell;
    if max_chars == 0 {
        return Err(RenderError::Layout(format!(
            "{} px is too narrow for one character",
            content_width
        )));
    }

    // Flatten into words, remembering whether whitespace preceded each one.
    let mut words: Vec<(String, bool, bool)> = Vec::new();
    let mut pending_space = false;
    for run in &runs {
        let mut current = String::new();
        for ch in run.text.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    words.push((std::mem::take(&mut current), run.bold, pending_space));
                }
                pending_space = true;
            } else {
                current.push(ch);
            }
        }
        if !current.is_empty() {
            words.push((current, run.bold, pending_space));
            pending_space = false;
        }
    }

    let mut lines: Vec<Vec<Run>> = Vec::new();
    let mut current: Vec<Run> = Vec::new();
    let mut used = 0usize;

    for (word, bold, spaced) in words {
        let mut chars: Vec<char> = word.chars().collect();
        let sep = usize::from(spaced && used > 0);

        if used > 0 && used + sep + chars.len() > max_chars {
            lines.push(std::mem::take(&mut current));
            used = 0;
        }
        let sep = usize::from(spaced && used > 0);
        if sep == 1 {
            push_text(&mut current, " ", bold);
            used += 1;
        }

        while used + chars.len() > max_chars {
            let take = max_chars - used;
            let head: String = chars.drain(..take).collect();
            push_text(&mut current, &head, bold);
            lines.push(std::mem::take(&mut current));
            used = 0;
        }
        if !chars.is_empty() {
            let rest: String = chars.into_iter().collect();
            used += rest.chars().count();
            push_text(&mut current, &rest, bold);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let count = lines.len();
    Ok(lines
        .into_iter()
        .enumerate()
        .map(|(i, runs)| Line {
            font,
            scale,
            style,
            runs,
            gap_after: if i + 1 == count { gap_after } else { scale },
        })
        .collect())
}

/// Append text to the last run if the weight matches, else start a new run.
fn push_text(runs: &mut Vec<Run>, text: &str, bold: bool) {
    match runs.last_mut() {
        Some(last) if last.bold == bold => last.text.push_str(text),
        _ => runs.push(Run {
            text: text.to_string(),
            bold,
        }),
    }
}

/// Assign vertical positions, dropping what does not fit.
fn place(lines: Vec<Line>, dims: PixelDimensions, margin: usize) -> Result<LayoutPlan, RenderError> {
    let bottom = (dims.height as usize).saturating_sub(margin);
    let content_width = dims.width as usize - 2 * margin;

    let mut placed: Vec<PlacedLine> = Vec::new();
    let mut y = margin;
    let mut truncated = false;

    for line in lines {
        // Banners sit flush with the top edge.
        let line_y = if line.style == LineStyle::Banner && placed.is_empty() {
            0
        } else {
            y
        };
        if line_y + line.height_px() > bottom {
            truncated = true;
            // The first line is always kept; the canvas clips it.
            if placed.is_empty() {
                placed.push(PlacedLine { line, y: line_y });
            }
            break;
        }
        y = line_y + line.height_px() + line.gap_after;
        placed.push(PlacedLine { line, y: line_y });
    }

    if placed.is_empty() {
        return Err(RenderError::Layout(format!("nothing to lay out on a {} label", dims)));
    }

    if truncated {
        if let Some(last) = placed.iter_mut().rev().find(|p| p.line.style != LineStyle::Banner) {
            add_ellipsis(&mut last.line, content_width);
        }
    }

    Ok(LayoutPlan {
        dims,
        margin,
        lines: placed,
        truncated,
    })
}

/// End a line with "..." while keeping it within the content width.
fn add_ellipsis(line: &mut Line, content_width: usize) {
    let max_chars = content_width / line.cell_width();
    let needed = ELLIPSIS.chars().count();

    while line.char_count() + needed > max_chars {
        let Some(last) = line.runs.last_mut() else {
            break;
        };
        if last.text.pop().is_none() {
            line.runs.pop();
        }
    }
    if line.char_count() + needed <= max_chars {
        push_text(&mut line.runs, ELLIPSIS, false);
    }
}

// ============================================================================
// DRAWING
// ============================================================================

/// Single-channel drawing surface. 255 = paper, 0 = ink.
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![PAPER; width * height],
        }
    }

    /// Fill a rectangle; coordinates are clamped to the canvas.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, value: u8) {
        for py in y..(y + h).min(self.height) {
            let row = py * self.width;
            for px in x..(x + w).min(self.width) {
                self.pixels[row + px] = value;
            }
        }
    }

    /// Draw text at (x, y). Bold is drawn twice with a one-dot offset.
    pub fn draw_text(
        &mut self,
        glyphs: &mut GlyphSet,
        text: &str,
        font: FontSize,
        scale: usize,
        bold: bool,
        x: usize,
        y: usize,
        value: u8,
    ) -> Result<usize, RenderError> {
        let cell = FontMetrics::for_size(font).char_width * scale;
        let mut cx = x;
        for ch in text.chars() {
            let glyph = glyphs.glyph(font, ch)?;
            for gy in 0..glyph.height {
                for gx in 0..glyph.width {
                    if !glyph.is_set(gx, gy) {
                        continue;
                    }
                    let px = cx + gx * scale;
                    let py = y + gy * scale;
                    self.fill_rect(px, py, scale, scale, value);
                    if bold {
                        self.fill_rect(px + 1, py, scale, scale, value);
                    }
                }
            }
            cx += cell;
        }
        Ok(cx)
    }

    pub fn into_raster(self) -> Result<PixelRaster, RenderError> {
        PixelRaster::from_raw(self.width as u32, self.height as u32, 1, self.pixels)
    }
}

/// Draw a layout plan to a grayscale raster.
pub fn draw(plan: &LayoutPlan, glyphs: &mut GlyphSet) -> Result<PixelRaster, RenderError> {
    let width = plan.dims.width as usize;
    let mut canvas = Canvas::new(width, plan.dims.height as usize);
    let content_width = width - 2 * plan.margin;

    for placed in &plan.lines {
        let line = &placed.line;
        let (x, value) = match line.style {
            LineStyle::Left => (plan.margin, INK),
            LineStyle::Centered => (
                plan.margin + content_width.saturating_sub(line.width_px()) / 2,
                INK,
            ),
            LineStyle::Banner => {
                canvas.fill_rect(0, placed.y, width, line.height_px(), INK);
                (
                    plan.margin + content_width.saturating_sub(line.width_px()) / 2,
                    PAPER,
                )
            }
        };

        let text_y = placed.y + line.banner_padding();
        let mut cx = x;
        for run in &line.runs {
            cx = canvas.draw_text(glyphs, &run.text, line.font, line.scale, run.bold, cx, text_y, value)?;
        }
    }

    canvas.into_raster()
}

//! Overlay text shaping (parley) and glyph drawing (vello_cpu).

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use vello_cpu::kurbo::Affine;
use vello_cpu::RenderContext;

use super::pixel::Rgba8;
use crate::error::{BdrowError, BdrowResult};

/// Font files probed when no font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

struct LoadedFont {
    family: String,
    data: vello_cpu::peniko::FontData,
}

/// Shapes and draws single-paragraph overlay text with one registered font.
pub struct TextRenderer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
    font: Option<LoadedFont>,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("family", &self.font.as_ref().map(|font| font.family.as_str()))
            .finish_non_exhaustive()
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::without_font()
    }
}

impl TextRenderer {
    /// A renderer that skips text. Overlay backgrounds are still drawn.
    pub fn without_font() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            font: None,
        }
    }

    /// Registers `bytes` (TTF/OTF) as the overlay font.
    pub fn from_font_bytes(bytes: Vec<u8>) -> BdrowResult<Self> {
        let mut renderer = Self::without_font();

        let families = renderer
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| BdrowError::font("no font families registered from font bytes"))?;
        let family = renderer
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| BdrowError::font("registered font family has no name"))?
            .to_string();

        let data = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
        renderer.font = Some(LoadedFont { family, data });
        Ok(renderer)
    }

    pub fn from_path(path: &Path) -> BdrowResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_font_bytes(bytes)
    }

    /// Loads `configured` if given, otherwise the first readable system candidate.
    ///
    /// Never fails: without a usable font, text is skipped with a warning.
    pub fn discover(configured: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match configured {
            Some(path) => vec![path.to_path_buf()],
            None => FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        };

        for path in candidates.iter().filter(|p| p.is_file()) {
            match Self::from_path(path) {
                Ok(renderer) => {
                    tracing::debug!(path = %path.display(), family = ?renderer.family(), "overlay font loaded");
                    return renderer;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "overlay font rejected");
                }
            }
        }

        tracing::warn!("no overlay font available; overlay text will not be drawn");
        Self::without_font()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn family(&self) -> Option<&str> {
        self.font.as_ref().map(|f| f.family.as_str())
    }

    /// Lays out `text` on a single unbounded line.
    pub fn layout(
        &mut self,
        text: &str,
        size_px: f32,
        color: Rgba8,
    ) -> BdrowResult<Option<parley::Layout<Rgba8>>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(BdrowError::invalid_argument(
                "text size must be finite and > 0",
            ));
        }
        let Some(font) = self.font.as_ref() else {
            return Ok(None);
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(font.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(color));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(Some(layout))
    }

    /// Draws `text` centered in the box at (`x`, `y`) of size `w` x `h`.
    ///
    /// Returns `false` when no font is loaded and nothing was drawn. Empty
    /// text and degenerate sizes (zero-height boxes) draw nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_centered(
        &mut self,
        ctx: &mut RenderContext,
        text: &str,
        size_px: f32,
        color: Rgba8,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> BdrowResult<bool> {
        if text.is_empty() || !size_px.is_finite() || size_px <= 0.0 {
            return Ok(self.has_font());
        }
        let Some(layout) = self.layout(text, size_px, color)? else {
            return Ok(false);
        };
        let Some(font) = self.font.as_ref() else {
            return Ok(false);
        };

        let left = x + (w - layout.width()) / 2.0;
        let top = y + (h - layout.height()) / 2.0;
        ctx.set_transform(Affine::translate((f64::from(left), f64::from(top))));

        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(brush.to_paint());

                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font.data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }

        ctx.set_transform(Affine::IDENTITY);
        Ok(true)
    }
}

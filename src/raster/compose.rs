//! Text overlays and flattening them onto an image.

use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vello_cpu::kurbo::{Affine, RoundedRect, Shape};
use vello_cpu::{Pixmap, RenderContext};

use super::pixel::{self, Rgba8};
use super::text::TextRenderer;
use super::transform::{Density, Point};
use crate::error::{BdrowError, BdrowResult};

/// Largest side vello_cpu can address.
pub const MAX_RASTER_SIDE: u32 = u16::MAX as u32;

/// Overlay box corner radius, in dp.
pub const OVERLAY_CORNER_RADIUS_DP: f32 = 8.0;

/// Box height, in dp, at which `font_size` is used unscaled.
const REFERENCE_BOX_HEIGHT_DP: f32 = 50.0;

/// A text label positioned in image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextOverlay {
    pub id: Uuid,
    pub text: String,
    /// Top-left corner, image pixels.
    pub position: Point,
    pub width: u32,
    pub height: u32,
    /// Nominal size in sp for a 50dp-high box.
    pub font_size: f32,
    pub color: Rgba8,
    pub background_color: Rgba8,
    /// Stored for round-tripping; not applied when rendering.
    pub rotation: f32,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            text: String::new(),
            position: Point::default(),
            width: 200,
            height: 50,
            font_size: 24.0,
            color: Rgba8::BLACK,
            background_color: Rgba8::WHITE.with_alpha(0.8),
            rotation: 0.0,
        }
    }
}

impl TextOverlay {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Point::new(x, y);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_color(mut self, color: Rgba8) -> Self {
        self.color = color;
        self
    }

    pub fn with_background(mut self, background_color: Rgba8) -> Self {
        self.background_color = background_color;
        self
    }

    /// Glyph size in pixels: the font size grows with the box height.
    pub fn text_px(&self, density: Density) -> f32 {
        let box_dp = density.px_to_dp(self.height as f32);
        density.sp_to_px(self.font_size * (box_dp / REFERENCE_BOX_HEIGHT_DP))
    }

    /// Parses a JSON array of overlays. Missing fields take their defaults.
    pub fn list_from_json(json: &str) -> BdrowResult<Vec<TextOverlay>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON overlay list from `path`.
    pub fn load_list(path: &Path) -> BdrowResult<Vec<TextOverlay>> {
        let json = std::fs::read_to_string(path)?;
        Self::list_from_json(&json)
    }
}

/// Checks `width` x `height` against the rasterizer limit.
pub fn raster_size(width: u32, height: u32) -> BdrowResult<(u16, u16)> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(BdrowError::image_too_large(width, height, MAX_RASTER_SIDE)),
    }
}

/// Renders `ctx` and composites the result onto `base`.
pub(crate) fn flatten_layer(
    base: &RgbaImage,
    ctx: &mut RenderContext,
    erase: bool,
) -> BdrowResult<RgbaImage> {
    let (w, h) = raster_size(base.width(), base.height())?;

    ctx.flush();
    let mut layer = Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut layer);

    let mut out = base.as_raw().clone();
    if erase {
        pixel::erase_with_layer(&mut out, layer.data_as_u8_slice())?;
    } else {
        pixel::paint_layer_onto(&mut out, layer.data_as_u8_slice())?;
    }

    RgbaImage::from_raw(base.width(), base.height(), out)
        .ok_or_else(|| BdrowError::invalid_argument("flattened buffer does not match image size"))
}

/// Draws each overlay (rounded background, then centered text) onto a copy of `base`.
///
/// Overlays are drawn in order, so later ones cover earlier ones.
pub fn merge(
    base: &RgbaImage,
    overlays: &[TextOverlay],
    density: Density,
    text: &mut TextRenderer,
) -> BdrowResult<RgbaImage> {
    if overlays.is_empty() {
        return Ok(base.clone());
    }

    let (w, h) = raster_size(base.width(), base.height())?;
    let mut ctx = RenderContext::new(w, h);
    let radius = f64::from(density.dp_to_px(OVERLAY_CORNER_RADIUS_DP));

    for overlay in overlays {
        let x0 = f64::from(overlay.position.x);
        let y0 = f64::from(overlay.position.y);
        let rect = RoundedRect::new(
            x0,
            y0,
            x0 + f64::from(overlay.width),
            y0 + f64::from(overlay.height),
            radius,
        );

        ctx.set_transform(Affine::IDENTITY);
        ctx.set_paint(overlay.background_color.to_paint());
        ctx.fill_path(&rect.to_path(0.1));

        let drawn = text.draw_centered(
            &mut ctx,
            &overlay.text,
            overlay.text_px(density),
            overlay.color,
            overlay.position.x,
            overlay.position.y,
            overlay.width as f32,
            overlay.height as f32,
        )?;
        if !drawn {
            tracing::warn!(overlay = %overlay.id, "overlay text skipped: no font loaded");
        }
    }

    flatten_layer(base, &mut ctx, false)
}

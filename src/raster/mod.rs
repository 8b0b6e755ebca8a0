//! Raster touch-up editing.
//!
//! Everything here works on straight-alpha [`image::RgbaImage`]s in image
//! pixel space. Drawing goes through vello_cpu into a transparent layer that
//! is then flattened onto a copy of the input, so inputs are never mutated.

mod brush;
mod compose;
mod pixel;
mod text;
mod transform;

pub use brush::{render_stroke, Brush, BrushMode, DrawingSession};
pub use compose::{merge, raster_size, TextOverlay, MAX_RASTER_SIDE, OVERLAY_CORNER_RADIUS_DP};
pub use pixel::{over, premultiply_rgba8_in_place, unpremultiply_rgba8_in_place, Rgba8};
pub use text::TextRenderer;
pub use transform::{Density, Point, Size, ViewTransform};

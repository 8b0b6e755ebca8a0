//! Coordinate spaces used by the editor.
//!
//! Three spaces are in play: display pixels (where pointer events land),
//! image pixels (where strokes and overlays are stored), and
//! density-independent units (dp, and sp for text). [`ViewTransform`] maps
//! between the first two for an image letterboxed into a view; [`Density`]
//! maps pixels to dp/sp.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Scale-and-center fit of an image inside a view (aspect ratio preserved).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    offset: Point,
    image: Size,
}

impl ViewTransform {
    /// Fits an `image_width` x `image_height` image into a `view` of display pixels.
    ///
    /// Degenerate inputs produce a transform whose `to_image` always misses.
    pub fn fit(view: Size, image_width: u32, image_height: u32) -> Self {
        let image = Size::new(image_width as f32, image_height as f32);
        if image.width <= 0.0 || image.height <= 0.0 || view.width <= 0.0 || view.height <= 0.0 {
            return Self {
                scale: 0.0,
                offset: Point::default(),
                image,
            };
        }

        let scale = (view.width / image.width).min(view.height / image.height);
        let offset = Point::new(
            (view.width - image.width * scale) / 2.0,
            (view.height - image.height * scale) / 2.0,
        );
        Self {
            scale,
            offset,
            image,
        }
    }

    /// Display pixels per image pixel.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Top-left corner of the drawn image in display space.
    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Size of the drawn image in display space.
    pub fn displayed_size(&self) -> Size {
        Size::new(self.image.width * self.scale, self.image.height * self.scale)
    }

    /// Maps a display point into image space, or `None` when it falls outside the image.
    pub fn to_image(&self, p: Point) -> Option<Point> {
        if self.scale <= 0.0 {
            return None;
        }
        let shown = self.displayed_size();
        let x = p.x - self.offset.x;
        let y = p.y - self.offset.y;
        if x < 0.0 || y < 0.0 || x > shown.width || y > shown.height {
            return None;
        }
        Some(Point::new(x / self.scale, y / self.scale))
    }

    /// Like [`to_image`](Self::to_image) but clamps to the image bounds.
    pub fn to_image_clamped(&self, p: Point) -> Point {
        if self.scale <= 0.0 {
            return Point::default();
        }
        Point::new(
            ((p.x - self.offset.x) / self.scale).clamp(0.0, self.image.width),
            ((p.y - self.offset.y) / self.scale).clamp(0.0, self.image.height),
        )
    }

    /// Maps an image point into display space.
    pub fn to_view(&self, p: Point) -> Point {
        Point::new(
            self.offset.x + p.x * self.scale,
            self.offset.y + p.y * self.scale,
        )
    }

    /// Converts a display-space movement into an image-space movement.
    pub fn delta_to_image(&self, d: Point) -> Point {
        if self.scale <= 0.0 {
            return Point::default();
        }
        Point::new(d.x / self.scale, d.y / self.scale)
    }

    pub fn size_to_view(&self, s: Size) -> Size {
        Size::new(s.width * self.scale, s.height * self.scale)
    }

    pub fn size_to_image(&self, s: Size) -> Size {
        if self.scale <= 0.0 {
            return Size::default();
        }
        Size::new(s.width / self.scale, s.height / self.scale)
    }

    /// Clamps an image-space point to the image bounds.
    pub fn clamp_to_image(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(0.0, self.image.width),
            p.y.clamp(0.0, self.image.height),
        )
    }
}

/// Pixel density and user font scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Density {
    /// Pixels per dp.
    pub density: f32,
    /// Extra multiplier applied to sp.
    pub font_scale: f32,
}

impl Default for Density {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl Density {
    /// Non-finite or non-positive factors fall back to 1.0.
    pub fn new(density: f32, font_scale: f32) -> Self {
        let sane = |v: f32| if v.is_finite() && v > 0.0 { v } else { 1.0 };
        Self {
            density: sane(density),
            font_scale: sane(font_scale),
        }
    }

    pub fn px_to_dp(&self, px: f32) -> f32 {
        px / self.density
    }

    pub fn dp_to_px(&self, dp: f32) -> f32 {
        dp * self.density
    }

    pub fn sp_to_px(&self, sp: f32) -> f32 {
        sp * self.density * self.font_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_fit_letterboxes_wide_view() {
        // 100x50 image in a 400x400 view: scale 4, vertical bars of 100.
        let t = ViewTransform::fit(Size::new(400.0, 400.0), 100, 50);
        assert!(approx(t.scale(), 4.0));
        assert_eq!(t.offset(), Point::new(0.0, 100.0));
        assert_eq!(t.displayed_size(), Size::new(400.0, 200.0));
    }

    #[test]
    fn test_to_image_and_back() {
        let t = ViewTransform::fit(Size::new(400.0, 400.0), 100, 50);
        let p = t.to_image(Point::new(200.0, 200.0)).unwrap();
        assert!(approx(p.x, 50.0) && approx(p.y, 25.0));

        let back = t.to_view(p);
        assert!(approx(back.x, 200.0) && approx(back.y, 200.0));
    }

    #[test]
    fn test_to_image_outside_letterbox_misses() {
        let t = ViewTransform::fit(Size::new(400.0, 400.0), 100, 50);
        assert_eq!(t.to_image(Point::new(200.0, 50.0)), None);
        assert_eq!(t.to_image(Point::new(200.0, 350.0)), None);

        let clamped = t.to_image_clamped(Point::new(200.0, 50.0));
        assert!(approx(clamped.x, 50.0) && approx(clamped.y, 0.0));
    }

    #[test]
    fn test_sizes_and_deltas() {
        let t = ViewTransform::fit(Size::new(200.0, 100.0), 400, 200);
        assert!(approx(t.scale(), 0.5));
        assert_eq!(t.size_to_view(Size::new(200.0, 50.0)), Size::new(100.0, 25.0));
        assert_eq!(t.size_to_image(Size::new(100.0, 25.0)), Size::new(200.0, 50.0));
        assert_eq!(t.delta_to_image(Point::new(3.0, -2.0)), Point::new(6.0, -4.0));
    }

    #[test]
    fn test_degenerate_fit() {
        let t = ViewTransform::fit(Size::new(0.0, 100.0), 10, 10);
        assert_eq!(t.to_image(Point::new(0.0, 0.0)), None);
        assert_eq!(t.delta_to_image(Point::new(5.0, 5.0)), Point::default());
    }

    #[test]
    fn test_density_conversions() {
        let d = Density::new(2.0, 1.5);
        assert_eq!(d.px_to_dp(100.0), 50.0);
        assert_eq!(d.dp_to_px(8.0), 16.0);
        assert_eq!(d.sp_to_px(10.0), 30.0);

        let fallback = Density::new(f32::NAN, 0.0);
        assert_eq!(fallback, Density::default());
    }
}

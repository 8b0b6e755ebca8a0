//! Freehand painting and erasing.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use vello_cpu::kurbo::{self, Affine, BezPath, Cap, Join, StrokeOpts};
use vello_cpu::RenderContext;

use super::compose::{flatten_layer, raster_size};
use super::pixel::Rgba8;
use super::transform::{Density, Point, Size, ViewTransform};
use crate::error::BdrowResult;

/// Tolerance for stroke expansion, in image pixels.
const STROKE_TOLERANCE: f64 = 0.1;

/// What a stroke does to the pixels it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushMode {
    Paint(Rgba8),
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    /// Stroke width in dp.
    pub size_dp: f32,
    pub mode: BrushMode,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            size_dp: 10.0,
            mode: BrushMode::Paint(Rgba8::BLACK),
        }
    }
}

impl Brush {
    pub fn paint(size_dp: f32, color: Rgba8) -> Self {
        Self {
            size_dp,
            mode: BrushMode::Paint(color),
        }
    }

    pub fn eraser(size_dp: f32) -> Self {
        Self {
            size_dp,
            mode: BrushMode::Erase,
        }
    }

    pub fn width_px(&self, density: Density) -> f32 {
        density.dp_to_px(self.size_dp)
    }
}

/// Renders a round-capped polyline through `points` (image pixels) onto a copy of `base`.
///
/// Fewer than two points draw nothing.
pub fn render_stroke(
    base: &RgbaImage,
    points: &[Point],
    width_px: f32,
    mode: BrushMode,
) -> BdrowResult<RgbaImage> {
    if points.len() < 2 || !(width_px.is_finite() && width_px > 0.0) {
        return Ok(base.clone());
    }

    let mut path = BezPath::new();
    path.move_to((f64::from(points[0].x), f64::from(points[0].y)));
    for p in &points[1..] {
        path.line_to((f64::from(p.x), f64::from(p.y)));
    }

    let style = kurbo::Stroke::new(f64::from(width_px))
        .with_caps(Cap::Round)
        .with_join(Join::Round);
    let outline = kurbo::stroke(
        path.elements().iter().copied(),
        &style,
        &StrokeOpts::default(),
        STROKE_TOLERANCE,
    );

    let (w, h) = raster_size(base.width(), base.height())?;
    let mut ctx = RenderContext::new(w, h);
    ctx.set_transform(Affine::IDENTITY);
    let (paint, erase) = match mode {
        BrushMode::Paint(color) => (color, false),
        BrushMode::Erase => (Rgba8::WHITE, true),
    };
    ctx.set_paint(paint.to_paint());
    ctx.fill_path(&outline);

    flatten_layer(base, &mut ctx, erase)
}

/// One editing session over an image shown in a view.
///
/// Pointer input arrives in display pixels and is mapped through the view
/// transform. While a stroke is in progress the whole path is re-rendered
/// over the pre-stroke image on every drag.
#[derive(Debug, Clone)]
pub struct DrawingSession {
    committed: RgbaImage,
    current: RgbaImage,
    view: ViewTransform,
    density: Density,
    brush: Brush,
    stroke: Option<Vec<Point>>,
}

impl DrawingSession {
    pub fn new(image: RgbaImage, view: Size, density: Density, brush: Brush) -> Self {
        let transform = ViewTransform::fit(view, image.width(), image.height());
        Self {
            current: image.clone(),
            committed: image,
            view: transform,
            density,
            brush,
            stroke: None,
        }
    }

    pub fn brush(&self) -> Brush {
        self.brush
    }

    /// Takes effect from the next stroke.
    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn set_view_size(&mut self, view: Size) {
        self.view = ViewTransform::fit(view, self.committed.width(), self.committed.height());
    }

    pub fn view_transform(&self) -> &ViewTransform {
        &self.view
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// Starts a stroke. Presses outside the drawn image are ignored.
    pub fn press(&mut self, view_point: Point) -> bool {
        match self.view.to_image(view_point) {
            Some(start) => {
                self.stroke = Some(vec![start]);
                true
            }
            None => false,
        }
    }

    /// Extends the stroke by a display-space movement.
    pub fn drag(&mut self, delta: Point) -> BdrowResult<()> {
        let Some(points) = self.stroke.as_mut() else {
            return Ok(());
        };
        let Some(last) = points.last().copied() else {
            return Ok(());
        };

        let step = self.view.delta_to_image(delta);
        let next = self
            .view
            .clamp_to_image(Point::new(last.x + step.x, last.y + step.y));
        points.push(next);

        self.current = render_stroke(
            &self.committed,
            points,
            self.brush.width_px(self.density),
            self.brush.mode,
        )?;
        Ok(())
    }

    /// Ends the stroke and makes it part of the image.
    pub fn release(&mut self) -> &RgbaImage {
        if self.stroke.take().is_some() {
            self.committed = self.current.clone();
        }
        &self.current
    }

    pub fn image(&self) -> &RgbaImage {
        &self.current
    }

    pub fn into_image(mut self) -> RgbaImage {
        self.release();
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn test_paint_stroke_changes_pixels_on_path() {
        let base = solid(32, 32, [255, 255, 255, 255]);
        let out = render_stroke(
            &base,
            &[Point::new(4.0, 16.0), Point::new(28.0, 16.0)],
            6.0,
            BrushMode::Paint(Rgba8::new(255, 0, 0, 255)),
        )
        .unwrap();

        assert_eq!(out.get_pixel(16, 16).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(16, 2).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_erase_stroke_clears_alpha() {
        let base = solid(32, 32, [10, 200, 30, 255]);
        let out = render_stroke(
            &base,
            &[Point::new(0.0, 16.0), Point::new(32.0, 16.0)],
            8.0,
            BrushMode::Erase,
        )
        .unwrap();

        assert_eq!(out.get_pixel(16, 16).0[3], 0);
        assert_eq!(out.get_pixel(16, 0).0, [10, 200, 30, 255]);
    }

    #[test]
    fn test_single_point_draws_nothing() {
        let base = solid(8, 8, [1, 2, 3, 4]);
        let out = render_stroke(&base, &[Point::new(4.0, 4.0)], 4.0, BrushMode::Erase).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn test_session_press_outside_image_is_ignored() {
        // 10x10 image in a 100x200 view: drawn at y 50..150.
        let mut session = DrawingSession::new(
            solid(10, 10, [255, 255, 255, 255]),
            Size::new(100.0, 200.0),
            Density::default(),
            Brush::default(),
        );
        assert!(!session.press(Point::new(50.0, 10.0)));
        assert!(!session.is_stroking());
        session.drag(Point::new(10.0, 0.0)).unwrap();
        assert_eq!(session.image().get_pixel(5, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_session_stroke_commits_on_release() {
        let mut session = DrawingSession::new(
            solid(20, 20, [255, 255, 255, 255]),
            Size::new(200.0, 200.0),
            Density::new(1.0, 1.0),
            Brush::paint(4.0, Rgba8::BLACK),
        );

        // Scale is 10: a 100px drag moves 10 image pixels.
        assert!(session.press(Point::new(20.0, 100.0)));
        session.drag(Point::new(100.0, 0.0)).unwrap();
        assert_eq!(session.image().get_pixel(7, 10).0, [0, 0, 0, 255]);

        session.release();
        assert!(!session.is_stroking());

        session.set_brush(Brush::eraser(4.0));
        assert!(session.press(Point::new(20.0, 100.0)));
        session.drag(Point::new(100.0, 0.0)).unwrap();
        let out = session.into_image();
        assert_eq!(out.get_pixel(7, 10).0[3], 0);
    }

    #[test]
    fn test_drag_clamps_to_image_bounds() {
        let mut session = DrawingSession::new(
            solid(10, 10, [255, 255, 255, 255]),
            Size::new(10.0, 10.0),
            Density::default(),
            Brush::paint(2.0, Rgba8::BLACK),
        );
        assert!(session.press(Point::new(5.0, 5.0)));
        session.drag(Point::new(1_000.0, 0.0)).unwrap();
        session.drag(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(session.image().get_pixel(9, 5).0, [0, 0, 0, 255]);
    }
}

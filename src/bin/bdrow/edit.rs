//! `bdrow edit`: brush strokes and text overlays applied to a local image.

use std::path::PathBuf;

use anyhow::Context;
use bdrow::raster::{self, Point, Size};
use bdrow::{Brush, BrushMode, Config, Density, DrawingSession, Rgba8, TextOverlay, TextRenderer};

#[derive(clap::Args)]
pub struct EditArgs {
    /// Image to edit
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Where to write the edited image
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Stroke through image-pixel points: "x,y;x,y;..." (repeatable)
    #[arg(long = "stroke", value_parser = parse_stroke)]
    strokes: Vec<Vec<Point>>,

    /// Brush size in dp
    #[arg(long, default_value_t = 10.0)]
    brush_size: f32,

    /// Brush color (#RRGGBB or #RRGGBBAA)
    #[arg(long, default_value = "#000000", value_parser = parse_color)]
    color: Rgba8,

    /// Erase instead of paint
    #[arg(long)]
    erase: bool,

    /// Text overlay: "TEXT@x,y" (repeatable)
    #[arg(long = "text", value_parser = parse_text)]
    texts: Vec<TextOverlay>,

    /// JSON file with a list of text overlays
    #[arg(long)]
    overlays: Option<PathBuf>,

    /// Font for overlay text (overrides config)
    #[arg(long)]
    font: Option<PathBuf>,
}

pub fn run(config: &Config, args: EditArgs) -> anyhow::Result<()> {
    let source = crate::load_image(&args.input)?;
    let density = Density::new(config.editor.density, config.editor.font_scale);

    let brush = if args.erase {
        Brush::eraser(args.brush_size)
    } else {
        Brush::paint(args.brush_size, args.color)
    };

    // A view the size of the image keeps strokes in image pixels.
    let view = Size::new(source.width() as f32, source.height() as f32);
    let mut session = DrawingSession::new((*source).clone(), view, density, brush);
    for stroke in &args.strokes {
        apply_stroke(&mut session, stroke)?;
    }
    let painted = session.into_image();

    let mut overlays = Vec::new();
    if let Some(path) = &args.overlays {
        let parsed = TextOverlay::load_list(path)
            .with_context(|| format!("loading overlays {}", path.display()))?;
        overlays.extend(parsed);
    }
    overlays.extend(args.texts);

    let merged = if overlays.is_empty() {
        painted
    } else {
        let font_path = args.font.as_deref().or(config.editor.font_path.as_deref());
        let mut text = TextRenderer::discover(font_path);
        raster::merge(&painted, &overlays, density, &mut text)?
    };

    merged
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "Wrote {}x{} image to {} ({} strokes, {} overlays, {})",
        merged.width(),
        merged.height(),
        args.output.display(),
        args.strokes.len(),
        overlays.len(),
        match brush.mode {
            BrushMode::Erase => "eraser",
            BrushMode::Paint(_) => "paint",
        }
    );
    Ok(())
}

/// Replays `points` as a press followed by drags.
fn apply_stroke(session: &mut DrawingSession, points: &[Point]) -> anyhow::Result<()> {
    let Some((first, rest)) = points.split_first() else {
        return Ok(());
    };
    let start = session.view_transform().to_view(*first);
    if !session.press(start) {
        eprintln!("Warning: stroke starting at {},{} is outside the image", first.x, first.y);
        return Ok(());
    }

    let scale = session.view_transform().scale();
    let mut last = *first;
    for p in rest {
        session.drag(Point::new((p.x - last.x) * scale, (p.y - last.y) * scale))?;
        last = *p;
    }
    session.release();
    Ok(())
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("'{}' is not x,y", s))?;
    let x: f32 = x.trim().parse().map_err(|_| format!("bad x in '{}'", s))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("bad y in '{}'", s))?;
    Ok(Point::new(x, y))
}

pub fn parse_stroke(s: &str) -> Result<Vec<Point>, String> {
    let points = s
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .map(parse_point)
        .collect::<Result<Vec<_>, _>>()?;
    if points.len() < 2 {
        return Err("a stroke needs at least two points".to_string());
    }
    Ok(points)
}

pub fn parse_color(s: &str) -> Result<Rgba8, String> {
    Rgba8::from_hex(s).map_err(|e| e.to_string())
}

pub fn parse_text(s: &str) -> Result<TextOverlay, String> {
    let (text, at) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("'{}' is not TEXT@x,y", s))?;
    let p = parse_point(at)?;
    Ok(TextOverlay::new(text).with_position(p.x, p.y))
}

pub fn parse_pin(s: &str) -> Result<(u32, PathBuf), String> {
    let (second, path) = s
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not SECOND=IMAGE", s))?;
    let second: u32 = second
        .trim()
        .parse()
        .map_err(|_| format!("bad second in '{}'", s))?;
    Ok((second, PathBuf::from(path.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_parse_stroke() {
        let points = parse_stroke("1,2; 3.5,4").unwrap();
        assert_eq!(points, vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]);
        assert!(parse_stroke("1,2").is_err());
        assert!(parse_stroke("1;2").is_err());
    }

    #[test]
    fn test_parse_text_uses_last_at() {
        let overlay = parse_text("mail@home@10,20").unwrap();
        assert_eq!(overlay.text, "mail@home");
        assert_eq!(overlay.position, Point::new(10.0, 20.0));
        assert!(parse_text("no position").is_err());
    }

    #[test]
    fn test_parse_pin() {
        assert_eq!(parse_pin("5=a.png").unwrap(), (5, PathBuf::from("a.png")));
        assert!(parse_pin("x=a.png").is_err());
        assert!(parse_pin("a.png").is_err());
    }

    #[test]
    fn test_apply_stroke_in_image_pixels() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let mut session = DrawingSession::new(
            image,
            Size::new(20.0, 20.0),
            Density::default(),
            Brush::paint(4.0, Rgba8::BLACK),
        );
        apply_stroke(&mut session, &[Point::new(2.0, 10.0), Point::new(18.0, 10.0)]).unwrap();
        assert_eq!(session.image().get_pixel(10, 10).0, [0, 0, 0, 255]);
        assert_eq!(session.image().get_pixel(10, 2).0, [255, 255, 255, 255]);
    }
}

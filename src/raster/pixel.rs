//! RGBA8 color and per-pixel blending.
//!
//! Images handed around the crate are straight-alpha `RgbaImage`s; vello_cpu
//! layers are premultiplied. Blending converts one pixel at a time and leaves
//! pixels the layer does not cover byte-identical.

use serde::{Deserialize, Serialize};

use crate::error::{BdrowError, BdrowResult};

/// Straight-alpha RGBA8 color. Also used as the parley text brush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with alpha replaced by `alpha` in `0.0..=1.0`.
    pub fn with_alpha(self, alpha: f32) -> Self {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { a, ..self }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> BdrowResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return Err(BdrowError::invalid_argument(format!(
                "color '{}' is not #RRGGBB or #RRGGBBAA",
                hex
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
                BdrowError::invalid_argument(format!("color '{}' has non-hex digits", hex))
            })
        };
        let a = if digits.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, a))
    }

    pub(crate) fn to_paint(self) -> vello_cpu::peniko::Color {
        vello_cpu::peniko::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in px.iter_mut().take(3) {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

/// Source-over of a premultiplied `src` onto a premultiplied `dst`.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Composites a premultiplied layer onto straight-alpha pixels.
pub fn paint_layer_onto(dst_straight: &mut [u8], layer_premul: &[u8]) -> BdrowResult<()> {
    check_lengths(dst_straight, layer_premul)?;
    for (d, s) in dst_straight
        .chunks_exact_mut(4)
        .zip(layer_premul.chunks_exact(4))
    {
        if s[3] == 0 {
            continue;
        }
        let mut px = [d[0], d[1], d[2], d[3]];
        premultiply_rgba8_in_place(&mut px);
        let mut out = over(px, [s[0], s[1], s[2], s[3]]);
        unpremultiply_rgba8_in_place(&mut out);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Clears straight-alpha pixels in proportion to the layer's coverage (alpha).
pub fn erase_with_layer(dst_straight: &mut [u8], layer_premul: &[u8]) -> BdrowResult<()> {
    check_lengths(dst_straight, layer_premul)?;
    for (d, s) in dst_straight
        .chunks_exact_mut(4)
        .zip(layer_premul.chunks_exact(4))
    {
        let coverage = u16::from(s[3]);
        if coverage == 0 {
            continue;
        }
        let a = mul_div255(u16::from(d[3]), 255 - coverage);
        if a == 0 {
            d.copy_from_slice(&[0, 0, 0, 0]);
        } else {
            d[3] = a;
        }
    }
    Ok(())
}

fn check_lengths(dst: &[u8], src: &[u8]) -> BdrowResult<()> {
    if dst.len() != src.len() || dst.len() % 4 != 0 {
        return Err(BdrowError::invalid_argument(
            "layer blending expects equal-length rgba8 buffers",
        ));
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(Rgba8::from_hex("#ff8000").unwrap(), Rgba8::new(255, 128, 0, 255));
        assert_eq!(Rgba8::from_hex("000000cc").unwrap(), Rgba8::new(0, 0, 0, 204));
        assert!(Rgba8::from_hex("#fff").is_err());
        assert!(Rgba8::from_hex("#gg0000").is_err());
    }

    #[test]
    fn test_with_alpha() {
        assert_eq!(Rgba8::WHITE.with_alpha(0.8), Rgba8::new(255, 255, 255, 204));
    }

    #[test]
    fn test_over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        assert_eq!(over(dst, [0, 0, 0, 0]), dst);
    }

    #[test]
    fn test_over_opaque_replaces_dst() {
        assert_eq!(over([0, 0, 0, 255], [255, 0, 0, 255]), [255, 0, 0, 255]);
    }

    #[test]
    fn test_paint_layer_skips_uncovered_pixels() {
        // A translucent pixel would not survive a premultiply round trip.
        let mut dst = vec![33, 77, 201, 3, 0, 0, 0, 255];
        let layer = vec![0, 0, 0, 0, 255, 255, 255, 255];
        paint_layer_onto(&mut dst, &layer).unwrap();
        assert_eq!(dst, vec![33, 77, 201, 3, 255, 255, 255, 255]);
    }

    #[test]
    fn test_erase_full_and_partial_coverage() {
        let mut dst = vec![200, 100, 50, 255, 200, 100, 50, 255];
        let layer = vec![255, 255, 255, 255, 128, 128, 128, 128];
        erase_with_layer(&mut dst, &layer).unwrap();
        assert_eq!(&dst[0..4], &[0, 0, 0, 0]);
        assert_eq!(&dst[4..7], &[200, 100, 50]);
        assert_eq!(dst[7], 127);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let mut dst = vec![0u8; 8];
        assert!(paint_layer_onto(&mut dst, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_unpremultiply_restores_opaque_and_half() {
        let mut px = vec![128, 64, 0, 128, 10, 20, 30, 255];
        unpremultiply_rgba8_in_place(&mut px);
        assert_eq!(px, vec![255, 128, 0, 128, 10, 20, 30, 255]);
    }
}

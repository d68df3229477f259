//! Procedural texture generators and image decoding for backdrop surfaces.

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::material::hex_to_rgb;

pub type TextureImage = RgbaImage;

/// Upper bound on either side of a decoded texture.
const MAX_TEXTURE_SIDE: u32 = 8192;

fn pixel(color: u32) -> Rgba<u8> {
    Rgba([
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
        255,
    ])
}

fn blend(a: Vec3, b: Vec3, t: f32) -> Rgba<u8> {
    let c = a.lerp(b, t.clamp(0.0, 1.0)) * 255.0;
    Rgba([c.x.round() as u8, c.y.round() as u8, c.z.round() as u8, 255])
}

/// Decodes PNG or JPEG bytes into an RGBA buffer.
pub fn decode_image(bytes: &[u8]) -> Result<TextureImage> {
    let image = image::load_from_memory(bytes)
        .context("unsupported or corrupt image data")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("image has zero size"));
    }
    if width > MAX_TEXTURE_SIDE || height > MAX_TEXTURE_SIDE {
        return Err(anyhow!("image is too large ({width}x{height})"));
    }
    Ok(image)
}

pub fn solid(color: u32) -> TextureImage {
    RgbaImage::from_pixel(1, 1, pixel(color))
}

/// Square checkerboard with `cells` squares per side and a one-pixel line
/// between cells.
pub fn checkerboard(size: u32, cells: u32, light: u32, dark: u32, line: u32) -> TextureImage {
    let size = size.max(2);
    let cell = (size / cells.max(1)).max(1);
    ImageBuffer::from_fn(size, size, |x, y| {
        if x % cell == 0 || y % cell == 0 {
            pixel(line)
        } else if ((x / cell) + (y / cell)) % 2 == 0 {
            pixel(light)
        } else {
            pixel(dark)
        }
    })
}

/// Vertical gradient from `top` (row 0) to `bottom`.
pub fn linear_gradient(size: u32, top: u32, bottom: u32) -> TextureImage {
    let size = size.max(2);
    let (top, bottom) = (hex_to_rgb(top), hex_to_rgb(bottom));
    let span = (size - 1) as f32;
    ImageBuffer::from_fn(1.max(size / 8), size, |_, y| blend(top, bottom, y as f32 / span))
}

/// Radial gradient from `inner` at the center to `outer` at the corners.
pub fn radial_gradient(size: u32, inner: u32, outer: u32) -> TextureImage {
    let size = size.max(2);
    let (inner, outer) = (hex_to_rgb(inner), hex_to_rgb(outer));
    let center = (size as f32 - 1.0) * 0.5;
    let radius = center * std::f32::consts::SQRT_2;
    ImageBuffer::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        blend(inner, outer, (dx * dx + dy * dy).sqrt() / radius)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    #[test]
    fn checkerboard_alternates_cells() {
        let board = checkerboard(64, 4, 0xFFFFFF, 0x000000, 0x808080);
        assert_eq!(board.dimensions(), (64, 64));
        assert_eq!(board.get_pixel(0, 5), &pixel(0x808080));
        assert_eq!(board.get_pixel(5, 5), &pixel(0xFFFFFF));
        assert_eq!(board.get_pixel(21, 5), &pixel(0x000000));
        assert_eq!(board.get_pixel(21, 21), &pixel(0xFFFFFF));
    }

    #[test]
    fn linear_gradient_runs_top_to_bottom() {
        let gradient = linear_gradient(32, 0xFF0000, 0x0000FF);
        assert_eq!(gradient.get_pixel(0, 0), &pixel(0xFF0000));
        assert_eq!(gradient.get_pixel(0, 31), &pixel(0x0000FF));
    }

    #[test]
    fn radial_gradient_is_inner_at_center() {
        let gradient = radial_gradient(33, 0xFFFFFF, 0x000000);
        assert_eq!(gradient.get_pixel(16, 16), &pixel(0xFFFFFF));
        assert_eq!(gradient.get_pixel(0, 0), &pixel(0x000000));
    }

    #[test]
    fn decodes_png_and_rejects_garbage() {
        let mut bytes = Vec::new();
        checkerboard(8, 2, 0xFFFFFF, 0, 0)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));

        assert!(decode_image(b"<html>not found</html>").is_err());
    }
}

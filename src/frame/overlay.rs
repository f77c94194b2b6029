//! On-frame text overlay
//!
//! Renders short status strings (the FPS indicator) with a built-in 5x7
//! bitmap font so no font files or rasterizer are needed on the device.

use image::{Rgb, RgbImage};

/// Glyph cell width in font pixels
const GLYPH_WIDTH: i32 = 5;
/// Glyph cell height in font pixels
const GLYPH_HEIGHT: i32 = 7;
/// Horizontal advance between glyphs in font pixels
const GLYPH_ADVANCE: i32 = 6;

/// Text placement and style
#[derive(Debug, Clone, Copy)]
pub struct TextStyle {
    /// Left edge in image pixels
    pub x: i32,
    /// Baseline (bottom of the glyph cell) in image pixels
    pub baseline: i32,
    /// Integer scale factor applied to each font pixel
    pub scale: i32,
    /// Text color
    pub color: Rgb<u8>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            x: 10,
            baseline: 30,
            scale: 2,
            color: Rgb([255, 255, 255]),
        }
    }
}

/// Draw `text` onto `image`, clipping anything outside the frame
///
/// Characters without a glyph advance the cursor and draw nothing.
pub fn draw_text(image: &mut RgbImage, text: &str, style: &TextStyle) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let scale = style.scale.max(1);
    let top = style.baseline - GLYPH_HEIGHT * scale;
    let mut cursor = style.x;

    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = cursor + col * scale + dx;
                            let py = top + row as i32 * scale + dy;
                            if px >= 0 && px < width && py >= 0 && py < height {
                                image.put_pixel(px as u32, py as u32, style.color);
                            }
                        }
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE * scale;
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

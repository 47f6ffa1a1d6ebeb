//! Timestamp burn-in for captured stills.
//!
//! Renders a UTC timestamp into the bottom-right corner using a built-in
//! 3×5 glyph font over a dark backing strip. Captures carry their own audit
//! mark even when stripped of metadata downstream.

use signet_core::Raster;

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
const GLYPH_SPACING: u32 = 1;
const SCALE: u32 = 2;
const MARGIN: u32 = 4;

/// Row bitmaps, 3 bits per row, top to bottom.
fn glyph(ch: char) -> [u8; 5] {
    match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        _ => [0b000; 5],
    }
}

/// Burn `text` into the bottom-right corner of `image`.
///
/// Skipped entirely (with a debug log) when the image is too small to hold
/// the strip; burn-in must never distort a tiny frame.
pub fn burn_timestamp(image: &mut Raster, text: &str) {
    let char_count = text.chars().count() as u32;
    if char_count == 0 {
        return;
    }

    let text_w = char_count * (GLYPH_WIDTH + GLYPH_SPACING) * SCALE;
    let text_h = GLYPH_HEIGHT * SCALE;
    let strip_w = text_w + 2 * MARGIN;
    let strip_h = text_h + 2 * MARGIN;

    if image.width() < strip_w || image.height() < strip_h {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "image too small for timestamp burn-in"
        );
        return;
    }

    let strip_x = image.width() - strip_w;
    let strip_y = image.height() - strip_h;

    for y in strip_y..image.height() {
        for x in strip_x..image.width() {
            image.put_pixel(x, y, [16, 16, 16]);
        }
    }

    let mut pen_x = strip_x + MARGIN;
    let pen_y = strip_y + MARGIN;
    for ch in text.chars() {
        let rows = glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits >> (GLYPH_WIDTH - 1 - col) & 1 == 1 {
                    for sy in 0..SCALE {
                        for sx in 0..SCALE {
                            image.put_pixel(
                                pen_x + col * SCALE + sx,
                                pen_y + row as u32 * SCALE + sy,
                                [255, 255, 255],
                            );
                        }
                    }
                }
            }
        }
        pen_x += (GLYPH_WIDTH + GLYPH_SPACING) * SCALE;
    }
}

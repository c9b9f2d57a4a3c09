//! Frame annotation
//!
//! Draws detection boxes, identity labels and the session watermark onto
//! frames, and renders the placeholder image the relay sends while a
//! session has nothing to show.

use image::{Rgb, RgbImage};

use super::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::recognition::{BoundingBox, Detection, Identity};

/// Box and label color for recognised faces
pub const KNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Box and label color for unrecognised faces
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
/// Watermark color
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Placeholder frame dimensions
pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;
const WATERMARK_SCALE: u32 = 2;
const WATERMARK_ORIGIN: (i64, i64) = (10, 10);
const WATERMARK_LINE_HEIGHT: i64 = 20;

/// First eight characters of a session id, as shown on frames
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u64) < image.width() as u64 && (y as u64) < image.height() as u64
    {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn fill(image: &mut RgbImage, x: i64, y: i64, width: u32, height: u32, color: Rgb<u8>) {
    for dy in 0..height as i64 {
        for dx in 0..width as i64 {
            put(image, x + dx, y + dy, color);
        }
    }
}

/// Draw a hollow rectangle, clipped to the image
pub fn draw_rect(image: &mut RgbImage, region: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if region.width == 0 || region.height == 0 {
        return;
    }
    let (x, y) = (region.x as i64, region.y as i64);
    let t = thickness.min(region.width).min(region.height);

    fill(image, x, y, region.width, t, color);
    fill(image, x, y + (region.height - t) as i64, region.width, t, color);
    fill(image, x, y, t, region.height, color);
    fill(image, x + (region.width - t) as i64, y, t, region.height, color);
}

/// Draw text with its top-left corner at (`x`, `y`)
pub fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1);
    let mut pen_x = x;
    for c in text.chars() {
        let glyph = font::glyph(c);
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if font::is_set(&glyph, col, row) {
                    fill(
                        image,
                        pen_x + (col * scale) as i64,
                        y + (row * scale) as i64,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        pen_x += (ADVANCE * scale) as i64;
    }
}

fn identity_color(identity: &Identity) -> Rgb<u8> {
    match identity {
        Identity::Known(_) => KNOWN_COLOR,
        Identity::Unknown => UNKNOWN_COLOR,
    }
}

/// Annotate a frame in place
///
/// Each detection gets a box and its label just above it (or just inside
/// the top edge when there is no room above). `watermark` lines are drawn
/// top-left.
pub fn annotate(image: &mut RgbImage, detections: &[Detection], watermark: &[String]) {
    for detection in detections {
        let color = identity_color(&detection.identity);
        draw_rect(image, &detection.region, color, BOX_THICKNESS);

        let label_height = (GLYPH_HEIGHT * LABEL_SCALE) as i64;
        let above = detection.region.y as i64 - label_height - 3;
        let label_y = if above >= 0 {
            above
        } else {
            detection.region.y as i64 + BOX_THICKNESS as i64 + 2
        };
        draw_text(
            image,
            detection.region.x as i64,
            label_y,
            detection.identity.label(),
            color,
            LABEL_SCALE,
        );
    }

    let (x, mut y) = WATERMARK_ORIGIN;
    for line in watermark {
        draw_text(image, x, y, line, TEXT_COLOR, WATERMARK_SCALE);
        y += WATERMARK_LINE_HEIGHT;
    }
}

/// Render the "waiting" frame shown when a session has no fresh output
pub fn placeholder(session_id: &str) -> RgbImage {
    let mut image = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, Rgb([16, 16, 16]));

    let headline = format!("WAITING FOR {}...", short_id(session_id));
    let subline = "NO FRAMES RECEIVED";

    let centered = |text: &str, scale: u32| {
        (PLACEHOLDER_WIDTH as i64 - font::text_width(text, scale) as i64).max(0) / 2
    };

    draw_text(&mut image, centered(&headline, 3), 200, &headline, TEXT_COLOR, 3);
    draw_text(&mut image, centered(subline, 2), 250, subline, Rgb([150, 150, 150]), 2);
    image
}

use crate::core::types::Rect;
use anyhow::{Context, Result};
use image::{ImageFormat, ImageResult, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use std::io::Cursor;
use std::sync::Arc;

pub const DEBUG_BALLOON_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const DEBUG_TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Copy the part of `image` under `rect`, clipped to its bounds.
///
/// Returns `None` when nothing of the rect lies inside the image.
pub fn crop_region(image: &RgbaImage, rect: Rect) -> Option<RgbaImage> {
    let r = rect.clipped(image.width(), image.height());
    if r.is_empty() {
        return None;
    }
    Some(
        image::imageops::crop_imm(
            image,
            r.left as u32,
            r.top as u32,
            r.width() as u32,
            r.height() as u32,
        )
        .to_image(),
    )
}

pub fn encode_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Asynchronously encode an image to PNG bytes using spawn_blocking.
///
/// PNG encoding is CPU-intensive and can block the async runtime if done synchronously.
pub async fn encode_png_async(image: Arc<RgbaImage>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        encode_png(&image).context("Failed to encode image as PNG")
    })
    .await
    .context("Failed to spawn blocking task for PNG encoding")?
}

/// Asynchronously decode an uploaded frame into RGBA using spawn_blocking.
pub async fn load_rgba_from_memory_async(bytes: Vec<u8>) -> Result<RgbaImage> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|img| img.to_rgba8())
            .context("Failed to load image from memory")
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Outline balloon rects in red and OCR boxes in blue
pub fn draw_debug_outlines(image: &mut RgbaImage, balloons: &[Rect], text_boxes: &[Rect]) {
    let (w, h) = image.dimensions();
    let targets = balloons
        .iter()
        .map(|r| (r, DEBUG_BALLOON_COLOR))
        .chain(text_boxes.iter().map(|r| (r, DEBUG_TEXT_COLOR)));

    for (rect, color) in targets {
        let r = rect.clipped(w, h);
        if r.is_empty() {
            continue;
        }
        // Two pixels wide so it survives downscaled previews
        for inset in 0..2 {
            let inner = r.inset(inset);
            if inner.is_empty() {
                break;
            }
            draw_hollow_rect_mut(
                image,
                imageproc::rect::Rect::at(inner.left, inner.top)
                    .of_size(inner.width() as u32, inner.height() as u32),
                color,
            );
        }
    }
}

// Glyph erasure
//
// Builds a padded, dilated mask over recognized text and inpaints it.

#[cfg(not(feature = "opencv"))]
mod inpaint;

#[cfg(not(feature = "opencv"))]
pub use inpaint::inpaint_telea;

use crate::core::config::ErasureConfig;
use crate::core::errors::{ErasureError, ErasureResult};
use crate::core::types::{BalloonRegion, Rect};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 7x7 elliptical dilation
const DILATE_RADIUS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxPlacement {
    InBalloon,
    FreeText,
}

impl BoxPlacement {
    /// Mask padding around a text box of the given width
    pub fn padding(&self, box_width: i32) -> i32 {
        let w = box_width as f32;
        match self {
            BoxPlacement::InBalloon => ((w * 0.05) as i32).max(10),
            BoxPlacement::FreeText => ((w * 0.04) as i32).max(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaskedBox {
    pub source: Rect,
    pub padded: Rect,
    pub placement: BoxPlacement,
}

/// Mask and the per-box decisions that produced it
#[derive(Debug, Clone)]
pub struct MaskPlan {
    pub boxes: Vec<MaskedBox>,
    pub mask: GrayImage,
}

pub struct TextEraser {
    config: ErasureConfig,
}

impl TextEraser {
    pub fn new(config: ErasureConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, text_box: &Rect, balloons: &[BalloonRegion]) -> BoxPlacement {
        let best = balloons
            .iter()
            .map(|b| text_box.coverage_by(&b.rect))
            .fold(0.0f32, f32::max);
        if best > self.config.coverage_threshold {
            BoxPlacement::InBalloon
        } else {
            BoxPlacement::FreeText
        }
    }

    /// Undilated boxes are painted first, then the whole mask is dilated
    pub fn plan(
        &self,
        width: u32,
        height: u32,
        balloons: &[BalloonRegion],
        text_boxes: &[Rect],
    ) -> MaskPlan {
        let mut mask = GrayImage::new(width, height);
        let mut boxes = Vec::with_capacity(text_boxes.len());

        for source in text_boxes {
            let placement = self.classify(source, balloons);
            let pad = placement.padding(source.width());
            let padded = Rect::new(
                source.left - pad,
                source.top - pad,
                source.right + pad,
                source.bottom + pad,
            )
            .clipped(width, height);

            for y in padded.top..padded.bottom {
                for x in padded.left..padded.right {
                    mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
            boxes.push(MaskedBox {
                source: *source,
                padded,
                placement,
            });
        }

        if !boxes.is_empty() {
            mask = dilate(&mask, Norm::L2, DILATE_RADIUS);
        }
        MaskPlan { boxes, mask }
    }

    /// Remove the glyphs under `text_boxes` from a copy of `image`
    #[instrument(skip_all, fields(boxes = text_boxes.len()))]
    pub fn erase(
        &self,
        image: &RgbaImage,
        balloons: &[BalloonRegion],
        text_boxes: &[Rect],
    ) -> ErasureResult<RgbaImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || text_boxes.is_empty() {
            return Ok(image.clone());
        }

        let plan = self.plan(width, height, balloons, text_boxes);
        let in_balloon = plan
            .boxes
            .iter()
            .filter(|b| b.placement == BoxPlacement::InBalloon)
            .count();
        debug!(
            "Erasing {} boxes ({} in balloons, {} free)",
            plan.boxes.len(),
            in_balloon,
            plan.boxes.len() - in_balloon
        );

        self.fill(image, &plan.mask)
    }

    #[cfg(not(feature = "opencv"))]
    fn fill(&self, image: &RgbaImage, mask: &GrayImage) -> ErasureResult<RgbaImage> {
        check_mask(image, mask)?;
        Ok(inpaint_telea(image, mask, self.config.inpaint_radius))
    }

    #[cfg(feature = "opencv")]
    fn fill(&self, image: &RgbaImage, mask: &GrayImage) -> ErasureResult<RgbaImage> {
        check_mask(image, mask)?;
        opencv_inpaint(image, mask, self.config.inpaint_radius)
    }

    /// Run `erase` on the blocking pool
    pub async fn erase_async(
        self: &Arc<Self>,
        image: Arc<RgbaImage>,
        balloons: Arc<Vec<BalloonRegion>>,
        text_boxes: Vec<Rect>,
    ) -> ErasureResult<RgbaImage> {
        let eraser = Arc::clone(self);
        tokio::task::spawn_blocking(move || eraser.erase(&image, &balloons, &text_boxes))
            .await
            .map_err(|e| ErasureError::TaskFailed(e.to_string()))?
    }
}

fn check_mask(image: &RgbaImage, mask: &GrayImage) -> ErasureResult<()> {
    let (width, height) = image.dimensions();
    let (mask_width, mask_height) = mask.dimensions();
    if (width, height) != (mask_width, mask_height) {
        return Err(ErasureError::MaskMismatch {
            width,
            height,
            mask_width,
            mask_height,
        });
    }
    Ok(())
}

/// Navier-Stokes inpainting through OpenCV
#[cfg(feature = "opencv")]
fn opencv_inpaint(image: &RgbaImage, mask: &GrayImage, radius: u32) -> ErasureResult<RgbaImage> {
    use opencv::core::{Mat, Scalar, Vec3b, CV_8UC1, CV_8UC3};
    use opencv::photo;
    use opencv::prelude::*;

    let (width, height) = image.dimensions();

    let mut src =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    let mut cv_mask =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;

    for (x, y, p) in image.enumerate_pixels() {
        *src.at_2d_mut::<Vec3b>(y as i32, x as i32)? = Vec3b::from([p[2], p[1], p[0]]);
        *cv_mask.at_2d_mut::<u8>(y as i32, x as i32)? = mask.get_pixel(x, y)[0];
    }

    let mut dst = Mat::default();
    photo::inpaint(&src, &cv_mask, &mut dst, radius as f64, photo::INPAINT_NS)?;

    let mut out = image.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        let bgr = *dst.at_2d::<Vec3b>(y as i32, x as i32)?;
        p[0] = bgr[2];
        p[1] = bgr[1];
        p[2] = bgr[0];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn eraser() -> TextEraser {
        TextEraser::new(ErasureConfig::default())
    }

    fn balloon(rect: Rect) -> BalloonRegion {
        BalloonRegion {
            rect,
            contour: Vec::new(),
            vertex_count: 8,
            aspect_ratio: rect.width() as f32 / rect.height() as f32,
        }
    }

    #[test]
    fn test_padding_floors_and_ratios() {
        assert_eq!(BoxPlacement::InBalloon.padding(100), 10);
        assert_eq!(BoxPlacement::InBalloon.padding(400), 20);
        assert_eq!(BoxPlacement::FreeText.padding(100), 8);
        assert_eq!(BoxPlacement::FreeText.padding(500), 20);
    }

    #[test]
    fn test_classification_uses_box_area() {
        let balloons = [balloon(Rect::new(0, 0, 100, 100))];
        // Half of the box lies in the balloon
        let half = Rect::new(50, 10, 150, 30);
        assert_eq!(eraser().classify(&half, &balloons), BoxPlacement::InBalloon);
        // A quarter does not pass 0.4
        let quarter = Rect::new(75, 10, 175, 30);
        assert_eq!(eraser().classify(&quarter, &balloons), BoxPlacement::FreeText);
        assert_eq!(eraser().classify(&half, &[]), BoxPlacement::FreeText);
    }

    #[test]
    fn test_plan_clamps_and_dilates() {
        let plan = eraser().plan(200, 100, &[], &[Rect::new(2, 2, 60, 20)]);
        let masked = &plan.boxes[0];
        assert_eq!(masked.padded, Rect::new(0, 0, 68, 28));
        assert_eq!(plan.mask.dimensions(), (200, 100));
        // Dilation reaches past the padded box
        assert_eq!(plan.mask.get_pixel(69, 10)[0], 255);
        assert_eq!(plan.mask.get_pixel(150, 80)[0], 0);
    }

    #[test]
    fn test_erase_restores_background() {
        let mut image = RgbaImage::from_pixel(240, 160, Rgba([230, 230, 230, 255]));
        for y in 70..86 {
            for x in 90..150 {
                image.put_pixel(x, y, Rgba([10, 10, 10, 255]));
            }
        }

        let out = eraser()
            .erase(&image, &[], &[Rect::new(90, 70, 150, 86)])
            .unwrap();
        for y in 70..86 {
            for x in 90..150 {
                assert!(out.get_pixel(x, y)[0] >= 225);
            }
        }
    }

    #[test]
    fn test_no_boxes_or_empty_image_unchanged() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([5, 6, 7, 255]));
        assert_eq!(eraser().erase(&image, &[], &[]).unwrap(), image);

        let empty = RgbaImage::new(0, 0);
        let out = eraser().erase(&empty, &[], &[Rect::new(0, 0, 5, 5)]).unwrap();
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_navier_stokes_fill_keeps_unmasked_pixels_and_alpha() {
        let mut image = RgbaImage::from_fn(120, 80, |x, y| {
            Rgba([(x * 2) as u8, (y * 3) as u8, 90, 200])
        });
        for y in 30..44 {
            for x in 40..80 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 200]));
            }
        }

        let out = eraser()
            .erase(&image, &[], &[Rect::new(40, 30, 80, 44)])
            .unwrap();
        assert_eq!(out.get_pixel(2, 2), image.get_pixel(2, 2));
        assert_eq!(out.get_pixel(118, 78), image.get_pixel(118, 78));
        // Hole is filled from the surrounding gradient, alpha untouched
        let filled = out.get_pixel(60, 37);
        assert!(filled[2] > 60);
        assert_eq!(filled[3], 200);
    }

    #[tokio::test]
    async fn test_erase_async() {
        let image = Arc::new(RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255])));
        let eraser = Arc::new(eraser());
        let out = eraser
            .erase_async(image, Arc::new(Vec::new()), vec![Rect::new(10, 10, 20, 20)])
            .await
            .unwrap();
        assert_eq!(out.dimensions(), (50, 50));
    }
}

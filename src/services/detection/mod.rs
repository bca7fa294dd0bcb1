// Speech balloon detection
//
// Classical contour pipeline on luminance: blur, inverted adaptive threshold,
// optional close, outermost contours, then geometric filters.

use crate::core::config::{DetectionConfig, DetectorProfile};
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{BalloonRegion, Rect};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::morphology::close;
use imageproc::point::Point;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Sigma of the 5x5 pre-blur
const PRE_BLUR_SIGMA: f32 = 1.1;

/// Polygon approximation tolerance as a fraction of the contour perimeter
const APPROX_EPSILON_RATIO: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    Mean,
    Gaussian,
}

/// Binarization and extra filtering for one detector profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileParams {
    pub method: ThresholdMethod,
    /// Odd neighbourhood size of the adaptive threshold
    pub block_size: u32,
    pub c: f32,
    /// Elliptical close radius (2 = 5x5)
    pub close_radius: Option<u8>,
    /// Accepted contour area as a fraction of the frame area
    pub area_fraction: Option<(f64, f64)>,
}

impl ProfileParams {
    pub fn for_profile(profile: DetectorProfile) -> Self {
        match profile {
            DetectorProfile::Outline => Self {
                method: ThresholdMethod::Mean,
                block_size: 15,
                c: 3.0,
                close_radius: None,
                area_fraction: None,
            },
            DetectorProfile::Area => Self {
                method: ThresholdMethod::Gaussian,
                block_size: 11,
                c: 8.0,
                close_radius: Some(2),
                area_fraction: Some((0.003, 0.10)),
            },
        }
    }
}

pub struct BubbleDetector {
    config: DetectionConfig,
    params: ProfileParams,
}

impl BubbleDetector {
    pub fn new(config: DetectionConfig) -> Self {
        let params = ProfileParams::for_profile(config.profile);
        Self { config, params }
    }

    /// Find balloon candidates, sorted by top edge
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &RgbaImage) -> Vec<BalloonRegion> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let binary = self.binarize(image);
        let contours = find_contours::<i32>(&binary);
        let frame_area = width as f64 * height as f64;

        let mut regions: Vec<BalloonRegion> = contours
            .iter()
            .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
            .filter_map(|c| self.evaluate(c, width, height, frame_area))
            .collect();

        regions.sort_by_key(|r| r.rect.top);
        debug!("Detected {} balloon candidates", regions.len());
        regions
    }

    /// Run `detect` on the blocking pool
    pub async fn detect_async(
        self: &Arc<Self>,
        image: Arc<RgbaImage>,
    ) -> DetectionResult<Vec<BalloonRegion>> {
        let detector = Arc::clone(self);
        tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| DetectionError::TaskFailed(e.to_string()))
    }

    /// Luminance, blur, inverted adaptive threshold, optional close
    fn binarize(&self, image: &RgbaImage) -> GrayImage {
        let gray = image::imageops::grayscale(image);
        let blurred = gaussian_blur_f32(&gray, PRE_BLUR_SIGMA);

        let local = match self.params.method {
            ThresholdMethod::Mean => {
                let radius = self.params.block_size / 2;
                box_filter(&blurred, radius, radius)
            }
            ThresholdMethod::Gaussian => {
                gaussian_blur_f32(&blurred, gaussian_sigma(self.params.block_size))
            }
        };

        let c = self.params.c;
        let mut binary = GrayImage::new(blurred.width(), blurred.height());
        for (x, y, px) in binary.enumerate_pixels_mut() {
            let value = blurred.get_pixel(x, y)[0] as f32;
            let threshold = local.get_pixel(x, y)[0] as f32 - c;
            // Inverted: dark strokes become foreground
            *px = if value > threshold { Luma([0]) } else { Luma([255]) };
        }

        match self.params.close_radius {
            Some(k) => close(&binary, Norm::L2, k),
            None => binary,
        }
    }

    fn evaluate(
        &self,
        contour: &Contour<i32>,
        width: u32,
        height: u32,
        frame_area: f64,
    ) -> Option<BalloonRegion> {
        let rect = bounding_rect(&contour.points)?.clipped(width, height);
        let min = self.config.min_size as i32;
        if rect.width() < min || rect.height() < min {
            return None;
        }

        if let Some((lo, hi)) = self.params.area_fraction {
            let fraction = contour_area(&contour.points) / frame_area;
            if fraction < lo || fraction > hi {
                trace!(%rect, fraction, "Rejected by area fraction");
                return None;
            }
        }

        let epsilon = APPROX_EPSILON_RATIO * arc_length(&contour.points, true);
        let approx = approximate_polygon_dp(&contour.points, epsilon, true);
        if approx.len() < self.config.min_vertices {
            trace!(%rect, vertices = approx.len(), "Rejected by vertex count");
            return None;
        }

        let aspect_ratio = rect.width() as f32 / rect.height() as f32;
        if aspect_ratio < self.config.aspect_min || aspect_ratio > self.config.aspect_max {
            trace!(%rect, aspect_ratio, "Rejected by aspect ratio");
            return None;
        }

        Some(BalloonRegion {
            rect,
            contour: approx.iter().map(|p| (p.x, p.y)).collect(),
            vertex_count: approx.len(),
            aspect_ratio,
        })
    }
}

/// Sigma used for a Gaussian kernel of the given size
fn gaussian_sigma(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::new(min_x, min_y, max_x + 1, max_y + 1))
}

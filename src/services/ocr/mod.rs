// Text recognition boundary
//
// Engines implement `TextRecognizer` on a cropped bitmap; `RecognitionAdapter`
// maps their region-local lines back into frame coordinates.

mod http;

pub use http::HttpTextRecognizer;

use crate::core::errors::RecognitionResult;
use crate::core::types::{normalize_text, OcrBox, Rect};
use crate::utils::image_ops::crop_region;
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A line as reported by an engine, relative to the image it was given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextLine {
    pub rect: Rect,
    pub text: String,
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &RgbaImage) -> RecognitionResult<Vec<RawTextLine>>;

    fn engine_name(&self) -> &str;
}

pub struct RecognitionAdapter {
    recognizer: Arc<dyn TextRecognizer>,
}

impl RecognitionAdapter {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn engine_name(&self) -> &str {
        self.recognizer.engine_name()
    }

    /// OCR the part of `frame` under `region`.
    ///
    /// Boxes come back in frame coordinates, clipped to the frame, with
    /// normalized non-empty text.
    #[instrument(skip(self, frame), fields(engine = self.recognizer.engine_name()))]
    pub async fn recognize_region(
        &self,
        frame: &RgbaImage,
        region: Rect,
    ) -> RecognitionResult<Vec<OcrBox>> {
        let Some(crop) = crop_region(frame, region) else {
            return Ok(Vec::new());
        };
        let origin = region.clipped(frame.width(), frame.height());
        let lines = self.recognizer.recognize(&crop).await?;
        let boxes = to_frame_boxes(lines, origin.left, origin.top, frame.width(), frame.height());
        debug!("Recognized {} lines in {}", boxes.len(), region);
        Ok(boxes)
    }

    /// OCR the whole frame in one call
    #[instrument(skip_all, fields(engine = self.recognizer.engine_name()))]
    pub async fn recognize_frame(&self, frame: &RgbaImage) -> RecognitionResult<Vec<OcrBox>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let lines = self.recognizer.recognize(frame).await?;
        Ok(to_frame_boxes(lines, 0, 0, frame.width(), frame.height()))
    }
}

fn to_frame_boxes(
    lines: Vec<RawTextLine>,
    dx: i32,
    dy: i32,
    width: u32,
    height: u32,
) -> Vec<OcrBox> {
    lines
        .into_iter()
        .filter_map(|line| {
            let text = normalize_text(&line.text);
            if text.is_empty() {
                return None;
            }
            let rect = line.rect.offset(dx, dy).clipped(width, height);
            Some(OcrBox { rect, text })
        })
        .collect()
}

/// Join a balloon's lines in reading order (top to bottom, then left to right)
pub fn join_lines(boxes: &[OcrBox]) -> String {
    let mut ordered: Vec<&OcrBox> = boxes.iter().collect();
    ordered.sort_by_key(|b| (b.rect.top, b.rect.left));
    let joined = ordered
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined)
}

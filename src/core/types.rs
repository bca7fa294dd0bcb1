// Shared data model for the per-frame pipeline

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Axis-aligned rectangle in frame pixels (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Overlapping area with another rect, 0 when disjoint
    pub fn intersection_area(&self, other: &Rect) -> i64 {
        let l = self.left.max(other.left);
        let r = self.right.min(other.right);
        let t = self.top.max(other.top);
        let b = self.bottom.min(other.bottom);
        if r > l && b > t {
            (r - l) as i64 * (b - t) as i64
        } else {
            0
        }
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Fraction of this rect's own area covered by `other`
    pub fn coverage_by(&self, other: &Rect) -> f32 {
        let area = self.area();
        if area == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f32 / area as f32
    }

    /// Clip to `[0, width) x [0, height)`
    pub fn clipped(&self, width: u32, height: u32) -> Rect {
        let w = width as i32;
        let h = height as i32;
        Rect {
            left: self.left.clamp(0, w),
            top: self.top.clamp(0, h),
            right: self.right.clamp(0, w),
            bottom: self.bottom.clamp(0, h),
        }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn inset(&self, amount: i32) -> Rect {
        Rect::new(
            self.left + amount,
            self.top + amount,
            self.right - amount,
            self.bottom - amount,
        )
    }

    /// Stable textual form, used as the position half of a fingerprint
    pub fn serialized(&self) -> String {
        format!("{} {} {} {}", self.left, self.top, self.right, self.bottom)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})-({}, {})", self.left, self.top, self.right, self.bottom)
    }
}

/// One captured screen bitmap
#[derive(Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub captured_at_ms: u64,
}

impl Frame {
    pub fn new(image: RgbaImage, captured_at_ms: u64) -> Self {
        Self { image, captured_at_ms }
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("captured_at_ms", &self.captured_at_ms)
            .finish()
    }
}

/// Closed shape believed to hold dialogue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalloonRegion {
    pub rect: Rect,
    pub contour: Vec<(i32, i32)>,
    pub vertex_count: usize,
    pub aspect_ratio: f32,
}

/// A single recognized line of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBox {
    pub rect: Rect,
    pub text: String,
}

/// Cache key combining normalized text and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedItem {
    pub original_text: String,
    pub translated_text: String,
    pub rect: Rect,
    pub fingerprint: Fingerprint,
}

/// Lifecycle of the single analysis slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Running = 1,
    Presenting = 2,
    Skipped = 3,
}

impl PipelineState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Running,
            2 => PipelineState::Presenting,
            3 => PipelineState::Skipped,
            _ => PipelineState::Idle,
        }
    }
}

/// Why a delivered frame never entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    OverlayActive,
    AnalysisInFlight,
    Throttled,
    DuplicateFrame,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::OverlayActive => "overlay_active",
            DropReason::AnalysisInFlight => "analysis_in_flight",
            DropReason::Throttled => "throttled",
            DropReason::DuplicateFrame => "duplicate_frame",
        }
    }
}

/// Why a run ended without presenting anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AnalysisInFlight,
    EmptyFrame,
    NoBalloons,
    NoText,
    NothingNew,
    StageFailed(String),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::AnalysisInFlight => "analysis_in_flight",
            SkipReason::EmptyFrame => "empty_frame",
            SkipReason::NoBalloons => "no_balloons",
            SkipReason::NoText => "no_text",
            SkipReason::NothingNew => "nothing_new",
            SkipReason::StageFailed(_) => "stage_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Presented,
    Skipped(SkipReason),
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub balloons: usize,
    /// Items translated in this run
    pub items: Vec<TranslatedItem>,
    /// Items whose fingerprint was still cached; carry the earlier translation
    pub reused: Vec<TranslatedItem>,
    pub translator_calls: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: RunOutcome::Skipped(reason),
            balloons: 0,
            items: Vec::new(),
            reused: Vec::new(),
            translator_calls: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_presented(&self) -> bool {
        self.outcome == RunOutcome::Presented
    }
}

/// Collapse newlines and whitespace runs, then trim
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_and_coverage() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 0, 150, 100);
        assert_eq!(a.intersection_area(&b), 5000);
        assert!((a.coverage_by(&b) - 0.5).abs() < f32::EPSILON);

        let far = Rect::new(200, 200, 300, 300);
        assert_eq!(a.intersection_area(&far), 0);
        assert_eq!(Rect::default().coverage_by(&a), 0.0);
    }

    #[test]
    fn test_clipped_stays_inside_bitmap() {
        let r = Rect::new(-10, -5, 500, 300).clipped(320, 240);
        assert_eq!(r, Rect::new(0, 0, 320, 240));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  HELLO\nTHERE \t you "), "HELLO THERE you");
        assert_eq!(normalize_text("\n \n"), "");
    }

    #[test]
    fn test_serialized_rect() {
        assert_eq!(Rect::new(40, 40, 240, 140).serialized(), "40 40 240 140");
    }
}

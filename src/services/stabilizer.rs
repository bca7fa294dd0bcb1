//! Frame admission gate.
//!
//! Throttles by capture timestamp and drops exact repeats of the last
//! accepted bitmap.

use crate::core::config::StabilizerConfig;
use crate::core::types::{DropReason, Frame};
use image::RgbaImage;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(DropReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

pub struct FrameStabilizer {
    min_interval_ms: u64,
    last_accepted_at: Option<u64>,
    last_bitmap: Option<RgbaImage>,
}

impl FrameStabilizer {
    pub fn new(config: &StabilizerConfig) -> Self {
        Self {
            min_interval_ms: config.min_interval_ms,
            last_accepted_at: None,
            last_bitmap: None,
        }
    }

    /// Decide whether `frame` may start a run; on acceptance it becomes the
    /// new reference frame.
    pub fn accept(&mut self, frame: &Frame) -> Admission {
        if let Some(last) = self.last_accepted_at {
            // Out-of-order timestamps count as zero elapsed
            let elapsed = frame.captured_at_ms.saturating_sub(last);
            if elapsed < self.min_interval_ms {
                debug!(elapsed, min = self.min_interval_ms, "Frame throttled");
                return Admission::Rejected(DropReason::Throttled);
            }
        }

        if let Some(previous) = &self.last_bitmap {
            if same_pixels(previous, &frame.image) {
                debug!("Frame identical to last accepted frame");
                return Admission::Rejected(DropReason::DuplicateFrame);
            }
        }

        self.last_accepted_at = Some(frame.captured_at_ms);
        self.last_bitmap = Some(frame.image.clone());
        Admission::Accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted_at = None;
        self.last_bitmap = None;
    }
}

fn same_pixels(a: &RgbaImage, b: &RgbaImage) -> bool {
    a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(color: u8, at: u64) -> Frame {
        Frame::new(RgbaImage::from_pixel(8, 8, Rgba([color, color, color, 255])), at)
    }

    fn stabilizer() -> FrameStabilizer {
        FrameStabilizer::new(&StabilizerConfig { min_interval_ms: 500 })
    }

    #[test]
    fn test_first_frame_always_accepted() {
        let mut s = stabilizer();
        assert!(s.accept(&frame(0, 0)).is_accepted());
    }

    #[test]
    fn test_throttle_window() {
        let mut s = stabilizer();
        assert!(s.accept(&frame(0, 1_000)).is_accepted());
        assert_eq!(
            s.accept(&frame(10, 1_300)),
            Admission::Rejected(DropReason::Throttled)
        );
        assert!(s.accept(&frame(10, 1_500)).is_accepted());
    }

    #[test]
    fn test_identical_frame_rejected_after_interval() {
        let mut s = stabilizer();
        assert!(s.accept(&frame(50, 0)).is_accepted());
        assert_eq!(
            s.accept(&frame(50, 2_000)),
            Admission::Rejected(DropReason::DuplicateFrame)
        );
    }

    #[test]
    fn test_one_pixel_difference_accepted() {
        let mut s = stabilizer();
        let first = frame(50, 0);
        assert!(s.accept(&first).is_accepted());

        let mut changed = first.clone();
        changed.captured_at_ms = 600;
        changed.image.put_pixel(3, 3, Rgba([51, 50, 50, 255]));
        assert!(s.accept(&changed).is_accepted());
    }

    #[test]
    fn test_rejected_frame_does_not_move_reference() {
        let mut s = stabilizer();
        assert!(s.accept(&frame(0, 0)).is_accepted());
        // Throttled frame must not restart the window
        assert!(!s.accept(&frame(1, 400)).is_accepted());
        assert!(s.accept(&frame(1, 500)).is_accepted());
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut s = stabilizer();
        assert!(s.accept(&frame(0, 1_000)).is_accepted());
        s.reset();
        assert!(s.accept(&frame(0, 1_001)).is_accepted());
    }
}

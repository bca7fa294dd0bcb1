pub mod clock;
pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use image_ops::{
    crop_region, draw_debug_outlines, encode_png, encode_png_async, load_rgba_from_memory_async,
};
pub use metrics::{Metrics, MetricsSnapshot, Stage};

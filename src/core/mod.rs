pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, DetectionError, ErasureError, PipelineError, RecognitionError, RenderingError,
    TranslationError,
};
pub use types::{
    BalloonRegion, DropReason, Fingerprint, Frame, OcrBox, PipelineState, Rect, RunOutcome,
    RunResult, SkipReason, TranslatedItem,
};

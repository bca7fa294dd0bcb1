// Library exports for the comic overlay translator
//
// Frame in, balloon text translated and drawn back in place, overlay out.

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        ConfigError, DetectionError, ErasureError, PipelineError, RecognitionError,
        RenderingError, TranslationError,
    },
    types::{
        BalloonRegion, DropReason, Fingerprint, Frame, OcrBox, PipelineState, Rect, RunOutcome,
        RunResult, SkipReason, TranslatedItem,
    },
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{Delivery, PipelineBoundaries, PipelineOrchestrator};

pub use services::{
    BubbleDetector, CosmicGlyphs, HttpTextRecognizer, LibreTranslateClient, OverlayPresenter,
    SharedOverlay, TextComposer, TextEraser,
};

pub use utils::{Clock, Metrics, MonotonicClock};

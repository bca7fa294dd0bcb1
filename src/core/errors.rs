// Error types for each pipeline stage
//
// thiserror enums per stage, chained into PipelineError at the run boundary.

use thiserror::Error;

/// Balloon detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detection task failed: {0}")]
    TaskFailed(String),
}

/// OCR boundary errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("OCR engine returned status {status}: {body}")]
    EngineStatus { status: u16, body: String },

    #[error("Failed to encode region for OCR: {0}")]
    EncodeFailed(#[from] image::ImageError),

    #[error("OCR engine failure: {0}")]
    Engine(String),
}

/// Translation boundary errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation request failed: {0}")]
    ApiRequestFailed(#[from] reqwest::Error),

    #[error("Translator returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Translation model unavailable for {source_lang} -> {target_lang}")]
    ModelUnavailable {
        source_lang: String,
        target_lang: String,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Translator failure: {0}")]
    Backend(String),
}

/// Glyph erasure errors
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("Mask size {mask_width}x{mask_height} does not match image {width}x{height}")]
    MaskMismatch {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Erasure task failed: {0}")]
    TaskFailed(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV inpainting failed: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Text composition errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Font loading failed: {0}")]
    FontLoadError(String),

    #[error("Compose task failed: {0}")]
    TaskFailed(String),
}

/// Run-level errors; absorbed into a Skipped outcome by the orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Detection failed: {0}")]
    DetectionFailed(#[from] DetectionError),

    #[error("Erasure failed: {0}")]
    ErasureFailed(#[from] ErasureError),

    #[error("Rendering failed: {0}")]
    RenderingFailed(#[from] RenderingError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Invalid erasure config: {0}")]
    InvalidErasureConfig(String),

    #[error("Invalid rendering config: {0}")]
    InvalidRenderingConfig(String),

    #[error("Unknown value '{value}' for {key}")]
    UnknownVariant { key: String, value: String },

    #[error("Cache capacity must be > 0, got {0}")]
    InvalidCacheCapacity(usize),
}

pub type DetectionResult<T> = Result<T, DetectionError>;
pub type RecognitionResult<T> = Result<T, RecognitionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type ErasureResult<T> = Result<T, ErasureError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

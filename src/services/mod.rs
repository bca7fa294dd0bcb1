pub mod detection;
pub mod erasure;
pub mod ocr;
pub mod presenter;
pub mod rendering;
pub mod stabilizer;
pub mod translation;

// Re-export commonly used services
pub use detection::BubbleDetector;
pub use erasure::TextEraser;
pub use ocr::{HttpTextRecognizer, RecognitionAdapter, TextRecognizer};
pub use presenter::{OverlayContent, OverlayPresenter, SharedOverlay};
pub use rendering::{CosmicGlyphs, GlyphBackend, TextComposer};
pub use stabilizer::FrameStabilizer;
pub use translation::{LibreTranslateClient, TranslationCache, TranslationService, Translator};

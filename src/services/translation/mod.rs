pub mod api_client;
pub mod cache;
pub mod dictionary;
pub mod memo;
pub mod service;

pub use api_client::LibreTranslateClient;
pub use cache::TranslationCache;
pub use dictionary::ComicDictionary;
pub use memo::TranslationMemo;
pub use service::{Translation, TranslationService, TranslationSource};

use crate::core::errors::TranslationResult;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Machine-translation backend
#[async_trait]
pub trait Translator: Send + Sync {
    /// Make the language model usable; must succeed before `translate`
    async fn ensure_model(&self) -> TranslationResult<()>;

    async fn translate(&self, request: &TranslationRequest) -> TranslationResult<String>;

    fn backend_name(&self) -> &str;
}

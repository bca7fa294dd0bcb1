use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{TranslationRequest, Translator};
use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};

/// Client for a LibreTranslate-compatible HTTP server
pub struct LibreTranslateClient {
    http_client: reqwest::Client,
    base_url: String,
    source_lang: String,
    target_lang: String,
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    code: String,
    #[serde(default)]
    targets: Vec<String>,
}

impl LibreTranslateClient {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        })
    }

    async fn read_error(response: reqwest::Response) -> TranslationError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        TranslationError::ApiStatus { status, body }
    }
}

/// Whether `languages` offers a `source -> target` pair
fn supports_pair(languages: &[LanguageEntry], source: &str, target: &str) -> bool {
    languages
        .iter()
        .any(|l| l.code == source && l.targets.iter().any(|t| t == target))
}

#[async_trait]
impl Translator for LibreTranslateClient {
    async fn ensure_model(&self) -> TranslationResult<()> {
        let url = format!("{}/languages", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let languages: Vec<LanguageEntry> = response.json().await?;
        if !supports_pair(&languages, &self.source_lang, &self.target_lang) {
            return Err(TranslationError::ModelUnavailable {
                source_lang: self.source_lang.clone(),
                target_lang: self.target_lang.clone(),
            });
        }

        info!(
            "✓ Translation model ready: {} -> {}",
            self.source_lang, self.target_lang
        );
        Ok(())
    }

    async fn translate(&self, request: &TranslationRequest) -> TranslationResult<String> {
        let url = format!("{}/translate", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&TranslateBody {
                q: &request.text,
                source: &request.source_lang,
                target: &request.target_lang,
                format: "text",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let parsed: TranslateResponse = response.json().await?;
        match (parsed.translated_text, parsed.error) {
            (Some(text), _) => {
                debug!("Translated {} chars", request.text.len());
                Ok(text)
            }
            (None, Some(err)) => Err(TranslationError::Backend(err)),
            (None, None) => Err(TranslationError::InvalidResponse(
                "missing translatedText".to_string(),
            )),
        }
    }

    fn backend_name(&self) -> &str {
        "libretranslate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_pair_lookup() {
        let json = r#"[
            {"code":"en","name":"English","targets":["id","ja"]},
            {"code":"id","name":"Indonesian","targets":["en"]}
        ]"#;
        let languages: Vec<LanguageEntry> = serde_json::from_str(json).unwrap();
        assert!(supports_pair(&languages, "en", "id"));
        assert!(!supports_pair(&languages, "id", "ja"));
        assert!(!supports_pair(&languages, "fr", "en"));
    }

    #[test]
    fn test_translate_response_shapes() {
        let ok: TranslateResponse = serde_json::from_str(r#"{"translatedText":"Halo"}"#).unwrap();
        assert_eq!(ok.translated_text.as_deref(), Some("Halo"));

        let err: TranslateResponse = serde_json::from_str(r#"{"error":"bad lang"}"#).unwrap();
        assert!(err.translated_text.is_none());
        assert_eq!(err.error.as_deref(), Some("bad lang"));
    }
}

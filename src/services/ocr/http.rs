use super::{RawTextLine, TextRecognizer};
use crate::core::config::RecognitionConfig;
use crate::core::errors::{RecognitionError, RecognitionResult};
use crate::core::types::Rect;
use crate::utils::image_ops::encode_png;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OCR sidecar speaking JSON over HTTP.
///
/// Request: `{"image": "<base64 png>"}`.
/// Response: `{"lines": [{"text": "...", "box": [left, top, right, bottom]}]}`.
pub struct HttpTextRecognizer {
    http_client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    lines: Vec<OcrLine>,
}

#[derive(Deserialize)]
struct OcrLine {
    text: String,
    #[serde(rename = "box")]
    bbox: [i32; 4],
}

impl HttpTextRecognizer {
    pub fn new(config: &RecognitionConfig) -> RecognitionResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(2)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl TextRecognizer for HttpTextRecognizer {
    async fn recognize(&self, image: &RgbaImage) -> RecognitionResult<Vec<RawTextLine>> {
        let png = encode_png(image)?;
        let payload = general_purpose::STANDARD.encode(&png);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&OcrRequest { image: &payload })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::EngineStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OcrResponse = response.json().await?;
        debug!("OCR engine returned {} lines", parsed.lines.len());

        Ok(parsed
            .lines
            .into_iter()
            .map(|line| RawTextLine {
                rect: Rect::new(line.bbox[0], line.bbox[1], line.bbox[2], line.bbox[3]),
                text: line.text,
            })
            .collect())
    }

    fn engine_name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{"lines":[{"text":"HELLO","box":[1,2,30,12]}]}"#;
        let parsed: OcrResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.lines[0].bbox, [1, 2, 30, 12]);

        let empty: OcrResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.lines.is_empty());
    }
}

// Translation front door
//
// Order of resolution: comic dictionary, memo, backend (behind the model
// precondition and the circuit breaker). Any backend failure degrades to the
// source text.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::{ComicDictionary, TranslationMemo, TranslationRequest, Translator};
use crate::core::config::TranslationConfig;
use crate::core::errors::ConfigError;
use crate::middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::utils::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationSource {
    Dictionary,
    Memo,
    Backend,
    /// Backend refused or failed; text is the source
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub source: TranslationSource,
    /// Whether the backend's `translate` was invoked
    pub called_backend: bool,
}

impl Translation {
    /// Fallbacks must not be remembered so the line is retried next time
    pub fn is_cacheable(&self) -> bool {
        self.source != TranslationSource::Fallback
    }
}

pub struct TranslationService {
    translator: Arc<dyn Translator>,
    dictionary: ComicDictionary,
    memo: TranslationMemo,
    breaker: CircuitBreaker,
    model_ready: OnceCell<()>,
    post_edit_rules: Vec<(String, String)>,
    source_lang: String,
    target_lang: String,
    metrics: Option<Metrics>,
}

impl TranslationService {
    pub fn new(
        translator: Arc<dyn Translator>,
        config: &TranslationConfig,
        metrics: Option<Metrics>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            translator,
            dictionary: ComicDictionary::new(),
            memo: TranslationMemo::new(config.memo_capacity)?,
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: config.breaker_failure_threshold.max(1),
                cool_down: std::time::Duration::from_secs(config.breaker_timeout_seconds),
            }),
            model_ready: OnceCell::new(),
            post_edit_rules: config.post_edit_rules.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            metrics,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn memo(&self) -> &TranslationMemo {
        &self.memo
    }

    /// Translate one normalized line; never fails
    #[instrument(skip(self), fields(backend = self.translator.backend_name()))]
    pub async fn translate(&self, text: &str) -> Translation {
        if let Some(kept) = self.dictionary.lookup(text) {
            debug!("Dictionary term, not translated");
            return Translation {
                text: kept,
                source: TranslationSource::Dictionary,
                called_backend: false,
            };
        }

        if let Some(remembered) = self.memo.get(text) {
            return Translation {
                text: remembered,
                source: TranslationSource::Memo,
                called_backend: false,
            };
        }

        if !self.breaker.allow_request() {
            debug!("Translator circuit open, keeping source text");
            return fallback(text, false);
        }

        if let Err(e) = self
            .model_ready
            .get_or_try_init(|| self.translator.ensure_model())
            .await
        {
            warn!("Translation model unavailable: {}", e);
            self.record_failure();
            return fallback(text, false);
        }

        let request = TranslationRequest {
            text: text.to_string(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        };

        let started = Instant::now();
        let result = self.translator.translate(&request).await;
        if let Some(ref m) = self.metrics {
            m.record_translator_call(result.is_ok(), started.elapsed());
        }

        match result {
            Ok(raw) => {
                self.breaker.record_success();
                let edited = self.post_edit(&raw);
                self.memo.put(text.to_string(), edited.clone());
                Translation {
                    text: edited,
                    source: TranslationSource::Backend,
                    called_backend: true,
                }
            }
            Err(e) => {
                warn!("Translation failed, keeping source text: {}", e);
                self.record_failure();
                fallback(text, true)
            }
        }
    }

    fn record_failure(&self) {
        let was_open = self.breaker.state() == CircuitState::Open;
        self.breaker.record_failure();
        if !was_open && self.breaker.state() == CircuitState::Open {
            warn!("Translator circuit opened");
            if let Some(ref m) = self.metrics {
                m.record_circuit_breaker_trip();
            }
        }
    }

    /// Apply configured replacements in order, then trim
    fn post_edit(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for (from, to) in &self.post_edit_rules {
            text = text.replace(from.as_str(), to);
        }
        text.trim().to_string()
    }
}

fn fallback(text: &str, called_backend: bool) -> Translation {
    Translation {
        text: text.to_string(),
        source: TranslationSource::Fallback,
        called_backend,
    }
}

impl std::fmt::Debug for TranslationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationService")
            .field("backend", &self.translator.backend_name())
            .field("source_lang", &self.source_lang)
            .field("target_lang", &self.target_lang)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::errors::{TranslationError, TranslationResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory backend with a phrasebook; unknown text fails
    pub(crate) struct MockTranslator {
        pub phrasebook: HashMap<String, String>,
        pub fail_all: AtomicBool,
        pub model_failures_left: AtomicUsize,
        pub model_checks: AtomicUsize,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockTranslator {
        pub(crate) fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                phrasebook: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fail_all: AtomicBool::new(false),
                model_failures_left: AtomicUsize::new(0),
                model_checks: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn translate_calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Translator for MockTranslator {
        async fn ensure_model(&self) -> TranslationResult<()> {
            self.model_checks.fetch_add(1, Ordering::SeqCst);
            let left = self.model_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.model_failures_left.store(left - 1, Ordering::SeqCst);
                return Err(TranslationError::ModelUnavailable {
                    source_lang: "en".into(),
                    target_lang: "id".into(),
                });
            }
            Ok(())
        }

        async fn translate(&self, request: &TranslationRequest) -> TranslationResult<String> {
            self.requests.lock().push(request.text.clone());
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(TranslationError::Backend("offline".into()));
            }
            self.phrasebook
                .get(&request.text)
                .cloned()
                .ok_or_else(|| TranslationError::Backend(format!("unknown: {}", request.text)))
        }

        fn backend_name(&self) -> &str {
            "mock"
        }
    }

    fn service(mock: Arc<MockTranslator>, config: TranslationConfig) -> TranslationService {
        TranslationService::new(mock, &config, None).unwrap()
    }

    #[tokio::test]
    async fn test_dictionary_term_skips_backend() {
        let mock = Arc::new(MockTranslator::new(&[]));
        let svc = service(mock.clone(), TranslationConfig::default());

        let t = svc.translate("ah").await;
        assert_eq!(t.text, "ah");
        assert_eq!(t.source, TranslationSource::Dictionary);
        assert_eq!(mock.translate_calls(), 0);
        assert_eq!(mock.model_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_then_memo() {
        let mock = Arc::new(MockTranslator::new(&[("HELLO THERE", "HALO DI SANA")]));
        let svc = service(mock.clone(), TranslationConfig::default());

        let first = svc.translate("HELLO THERE").await;
        assert_eq!(first.source, TranslationSource::Backend);
        assert!(first.called_backend);
        assert_eq!(first.text, "HALO DI SANA");

        let second = svc.translate("HELLO THERE").await;
        assert_eq!(second.source, TranslationSource::Memo);
        assert_eq!(mock.translate_calls(), 1);
        assert_eq!(mock.model_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_and_is_not_memoized() {
        let mock = Arc::new(MockTranslator::new(&[]));
        let svc = service(mock.clone(), TranslationConfig::default());

        let t = svc.translate("UNKNOWN LINE").await;
        assert_eq!(t.text, "UNKNOWN LINE");
        assert_eq!(t.source, TranslationSource::Fallback);
        assert!(!t.is_cacheable());
        assert!(svc.memo().is_empty());
    }

    #[tokio::test]
    async fn test_model_check_retried_after_failure() {
        let mock = Arc::new(MockTranslator::new(&[("HI", "HAI")]));
        mock.model_failures_left.store(1, Ordering::SeqCst);
        let svc = service(mock.clone(), TranslationConfig::default());

        let first = svc.translate("HI").await;
        assert_eq!(first.source, TranslationSource::Fallback);
        assert!(!first.called_backend);

        let second = svc.translate("HI").await;
        assert_eq!(second.text, "HAI");
        assert_eq!(mock.model_checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_post_edit_rules_applied_in_order() {
        let mock = Arc::new(MockTranslator::new(&[("I WANT", " saya ingin saya ingin ")]));
        let config = TranslationConfig {
            post_edit_rules: vec![
                ("saya ingin".into(), "aku mau".into()),
                ("aku mau aku mau".into(), "aku mau".into()),
            ],
            ..TranslationConfig::default()
        };
        let svc = service(mock, config);
        assert_eq!(svc.translate("I WANT").await.text, "aku mau");
    }

    #[tokio::test]
    async fn test_default_indonesian_rules_smooth_output() {
        let mock = Arc::new(MockTranslator::new(&[("I WANT TO GO", "saya ingin pergi")]));
        let svc = service(mock, TranslationConfig::default());
        assert_eq!(svc.translate("I WANT TO GO").await.text, "aku mau pergi");
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let mock = Arc::new(MockTranslator::new(&[]));
        mock.fail_all.store(true, Ordering::SeqCst);
        let config = TranslationConfig {
            breaker_failure_threshold: 2,
            ..TranslationConfig::default()
        };
        let metrics = Metrics::new();
        let svc = TranslationService::new(mock.clone(), &config, Some(metrics.clone())).unwrap();

        svc.translate("A LINE").await;
        svc.translate("B LINE").await;
        assert_eq!(svc.breaker().state(), CircuitState::Open);

        let t = svc.translate("C LINE").await;
        assert_eq!(t.source, TranslationSource::Fallback);
        assert!(!t.called_backend);
        assert_eq!(mock.translate_calls(), 2);
        assert_eq!(metrics.snapshot().circuit_breaker_trips, 1);
    }
}

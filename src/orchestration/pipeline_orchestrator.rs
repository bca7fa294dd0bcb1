// Pipeline Orchestrator: per-frame workflow coordinator
//
// One run at a time. Frames that arrive while a run is in flight, while an
// overlay is showing, or that the stabilizer rejects are dropped, never queued.

use image::RgbaImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::config::{Config, PresentationMode, RecognitionConfig, RecognitionScope};
use crate::core::errors::{ConfigError, PipelineError, PipelineResult};
use crate::core::types::{
    BalloonRegion, DropReason, Fingerprint, Frame, OcrBox, PipelineState, Rect, RunOutcome,
    RunResult, SkipReason, TranslatedItem,
};
use crate::middleware::CircuitBreakerStats;
use crate::services::detection::BubbleDetector;
use crate::services::erasure::TextEraser;
use crate::services::ocr::{join_lines, RecognitionAdapter, TextRecognizer};
use crate::services::presenter::OverlayPresenter;
use crate::services::rendering::{DebugOutlines, GlyphBackend, TextComposer};
use crate::services::stabilizer::{Admission, FrameStabilizer};
use crate::services::translation::{TranslationCache, TranslationService, Translator};
use crate::utils::{Clock, Metrics, Stage};

/// External collaborators the pipeline talks to
pub struct PipelineBoundaries {
    pub recognizer: Arc<dyn TextRecognizer>,
    pub translator: Arc<dyn Translator>,
    pub glyphs: Arc<dyn GlyphBackend>,
    pub presenter: Arc<dyn OverlayPresenter>,
    pub clock: Arc<dyn Clock>,
}

/// What `deliver` did with a frame
#[derive(Debug)]
pub enum Delivery {
    Started(JoinHandle<RunResult>),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub state: PipelineState,
    pub cache_entries: usize,
    pub memo_entries: usize,
    pub translator_breaker: CircuitBreakerStats,
    pub overlay_showing: bool,
}

/// Holds the single analysis slot; returns it to `Idle` when dropped
struct FlightGuard {
    state: Arc<AtomicU8>,
}

impl FlightGuard {
    fn try_acquire(state: &Arc<AtomicU8>) -> Option<Self> {
        state
            .compare_exchange(
                PipelineState::Idle as u8,
                PipelineState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self {
                state: Arc::clone(state),
            })
    }

    fn mark(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.store(PipelineState::Idle as u8, Ordering::Release);
    }
}

/// Text found in one place of the frame, before translation
#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    rect: Rect,
    boxes: Vec<Rect>,
}

pub struct PipelineOrchestrator {
    detector: Arc<BubbleDetector>,
    recognition: RecognitionAdapter,
    recognition_config: RecognitionConfig,
    translation: TranslationService,
    cache: TranslationCache,
    eraser: Arc<TextEraser>,
    composer: Arc<TextComposer>,
    stabilizer: Mutex<FrameStabilizer>,
    presenter: Arc<dyn OverlayPresenter>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    state: Arc<AtomicU8>,
    mode: PresentationMode,
    coverage_threshold: f32,
}

impl PipelineOrchestrator {
    #[instrument(skip_all)]
    pub fn new(
        config: &Config,
        boundaries: PipelineBoundaries,
        metrics: Metrics,
    ) -> Result<Self, ConfigError> {
        info!("Initializing pipeline...");

        let translation = TranslationService::new(
            boundaries.translator,
            &config.translation,
            Some(metrics.clone()),
        )?;
        let recognition = RecognitionAdapter::new(boundaries.recognizer);

        info!(
            "Ready (detector: {:?}, ocr: {} [{:?}], translator: {} -> {}, mode: {:?})",
            config.detection.profile,
            recognition.engine_name(),
            config.recognition.scope,
            config.translation.source_lang,
            config.translation.target_lang,
            config.presentation.mode
        );

        Ok(Self {
            detector: Arc::new(BubbleDetector::new(config.detection.clone())),
            recognition,
            recognition_config: config.recognition.clone(),
            translation,
            cache: TranslationCache::new(config.cache.ttl_ms, Some(metrics.clone())),
            eraser: Arc::new(TextEraser::new(config.erasure.clone())),
            composer: Arc::new(TextComposer::new(
                boundaries.glyphs,
                config.rendering.clone(),
            )),
            stabilizer: Mutex::new(FrameStabilizer::new(&config.stabilizer)),
            presenter: boundaries.presenter,
            clock: boundaries.clock,
            metrics,
            state: Arc::new(AtomicU8::new(PipelineState::Idle as u8)),
            mode: config.presentation.mode,
            coverage_threshold: config.erasure.coverage_threshold,
        })
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            state: self.state(),
            cache_entries: self.cache.len(),
            memo_entries: self.translation.memo().len(),
            translator_breaker: self.translation.breaker().stats(),
            overlay_showing: self.presenter.is_showing(),
        }
    }

    /// Offer a captured frame. Returns immediately: either the frame is
    /// dropped or a run is spawned and its handle returned.
    pub fn deliver(self: &Arc<Self>, image: RgbaImage, captured_at_ms: u64) -> Delivery {
        self.metrics.record_frame_received();

        match self.admit(Frame::new(image, captured_at_ms)) {
            Err(reason) => {
                debug!("Frame dropped: {}", reason.as_str());
                self.metrics.record_frame_dropped(reason.as_str());
                Delivery::Dropped(reason)
            }
            Ok((guard, frame)) => {
                let this = Arc::clone(self);
                Delivery::Started(tokio::spawn(async move { this.run_guarded(frame, guard).await }))
            }
        }
    }

    /// Gate order: single flight, overlay, stabilizer. Runs present while
    /// holding the slot, so the overlay check cannot race a finishing run.
    fn admit(&self, frame: Frame) -> Result<(FlightGuard, Frame), DropReason> {
        let guard = FlightGuard::try_acquire(&self.state).ok_or(DropReason::AnalysisInFlight)?;
        if self.presenter.is_showing() {
            return Err(DropReason::OverlayActive);
        }
        match self.stabilizer.lock().accept(&frame) {
            Admission::Accepted => Ok((guard, frame)),
            Admission::Rejected(reason) => Err(reason),
        }
    }

    /// Run one frame through every stage, bypassing the stabilizer
    pub async fn run_pipeline(&self, frame: Frame) -> RunResult {
        match FlightGuard::try_acquire(&self.state) {
            Some(guard) => self.run_guarded(frame, guard).await,
            None => RunResult::skipped(SkipReason::AnalysisInFlight),
        }
    }

    #[instrument(skip_all, fields(captured_at_ms = frame.captured_at_ms))]
    async fn run_guarded(&self, frame: Frame, guard: FlightGuard) -> RunResult {
        let start = Instant::now();
        let mut result = self.execute(frame, &guard).await;
        result.elapsed = start.elapsed();

        match &result.outcome {
            RunOutcome::Presented => {
                self.metrics.record_run_presented();
                info!(
                    "Presented {} new + {} reused item(s) from {} balloon(s) in {:.2}ms",
                    result.items.len(),
                    result.reused.len(),
                    result.balloons,
                    result.elapsed.as_secs_f64() * 1000.0
                );
            }
            RunOutcome::Skipped(reason) => {
                guard.mark(PipelineState::Skipped);
                self.metrics.record_run_skipped(reason.label());
                debug!("Run skipped: {:?}", reason);
            }
        }
        result
    }

    async fn execute(&self, frame: Frame, guard: &FlightGuard) -> RunResult {
        if frame.is_empty() {
            return RunResult::skipped(SkipReason::EmptyFrame);
        }
        let image = Arc::new(frame.image);

        // ===== DETECT =====
        let stage_start = Instant::now();
        let balloons = match self.detector.detect_async(Arc::clone(&image)).await {
            Ok(b) => b,
            Err(e) => {
                let e = PipelineError::from(e);
                warn!("{}", e);
                return RunResult::skipped(SkipReason::StageFailed(e.to_string()));
            }
        };
        self.metrics.record_stage_duration(Stage::Detect, stage_start.elapsed());
        if balloons.is_empty() {
            return RunResult::skipped(SkipReason::NoBalloons);
        }
        let balloon_count = balloons.len();
        let skipped = |reason: SkipReason| RunResult {
            balloons: balloon_count,
            ..RunResult::skipped(reason)
        };

        // ===== RECOGNIZE =====
        let stage_start = Instant::now();
        let candidates = match self.recognition_config.scope {
            RecognitionScope::Balloon => self.recognize_balloons(&image, &balloons).await,
            RecognitionScope::Frame => self.recognize_frame(&image, &balloons).await,
        };
        self.metrics.record_stage_duration(Stage::Recognize, stage_start.elapsed());
        if candidates.is_empty() {
            return skipped(SkipReason::NoText);
        }

        // ===== CACHE OR TRANSLATE =====
        let stage_start = Instant::now();
        let mut seen: HashSet<Fingerprint> = HashSet::new();
        let mut items = Vec::new();
        let mut reused = Vec::new();
        let mut erase_boxes = Vec::new();
        let mut translator_calls = 0;

        for candidate in candidates {
            let fingerprint = TranslationCache::fingerprint(&candidate.text, &candidate.rect);
            if !seen.insert(fingerprint) {
                continue;
            }
            erase_boxes.extend(candidate.boxes.iter().copied());

            if let Some(previous) = self.cache.lookup(fingerprint, self.clock.now_ms()) {
                debug!("Reusing translation for {}", fingerprint);
                reused.push(TranslatedItem {
                    original_text: candidate.text,
                    translated_text: previous,
                    rect: candidate.rect,
                    fingerprint,
                });
                continue;
            }

            let translation = self.translation.translate(&candidate.text).await;
            if translation.called_backend {
                translator_calls += 1;
            }
            if translation.is_cacheable() {
                self.cache
                    .insert(fingerprint, translation.text.clone(), self.clock.now_ms());
            }
            items.push(TranslatedItem {
                original_text: candidate.text,
                translated_text: translation.text,
                rect: candidate.rect,
                fingerprint,
            });
        }
        self.metrics.record_stage_duration(Stage::Translate, stage_start.elapsed());

        if items.is_empty() {
            return RunResult {
                reused,
                translator_calls,
                ..skipped(SkipReason::NothingNew)
            };
        }

        // ===== PRESENT =====
        let shown: Vec<TranslatedItem> = items.iter().chain(reused.iter()).cloned().collect();
        match self.mode {
            PresentationMode::Bitmap => {
                let baked = match self.bake(image, balloons, erase_boxes, shown).await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("Overlay bake failed: {}", e);
                        return RunResult {
                            items,
                            reused,
                            translator_calls,
                            ..skipped(SkipReason::StageFailed(e.to_string()))
                        };
                    }
                };
                guard.mark(PipelineState::Presenting);
                self.presenter.present_bitmap(Arc::new(baked)).await;
            }
            PresentationMode::Items => {
                guard.mark(PipelineState::Presenting);
                self.presenter.present_items(shown).await;
            }
        }

        RunResult {
            outcome: RunOutcome::Presented,
            balloons: balloon_count,
            items,
            reused,
            translator_calls,
            elapsed: Default::default(),
        }
    }

    /// One OCR call per balloon; a failed call yields no text for that balloon
    async fn recognize_balloons(
        &self,
        image: &RgbaImage,
        balloons: &[BalloonRegion],
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for balloon in balloons {
            let boxes = match self.recognition.recognize_region(image, balloon.rect).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("OCR failed for balloon {}: {}", balloon.rect, e);
                    continue;
                }
            };
            if boxes.is_empty() {
                continue;
            }
            let text = join_lines(&boxes);
            if text.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                text,
                rect: balloon.rect,
                boxes: boxes.iter().map(|b| b.rect).collect(),
            });
        }
        candidates
    }

    /// One OCR call on the whole frame; lines outside balloons only when
    /// free text is enabled
    async fn recognize_frame(
        &self,
        image: &RgbaImage,
        balloons: &[BalloonRegion],
    ) -> Vec<Candidate> {
        let boxes: Vec<OcrBox> = match self.recognition.recognize_frame(image).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Frame OCR failed: {}", e);
                return Vec::new();
            }
        };

        boxes
            .into_iter()
            .filter(|b| {
                let coverage = balloons
                    .iter()
                    .map(|balloon| b.rect.coverage_by(&balloon.rect))
                    .fold(0.0f32, f32::max);
                coverage > self.coverage_threshold || self.recognition_config.include_free_text
            })
            .map(|b| Candidate {
                boxes: vec![b.rect],
                rect: b.rect,
                text: b.text,
            })
            .collect()
    }

    /// Erase the recognized glyphs, then draw every translation in place
    async fn bake(
        &self,
        image: Arc<RgbaImage>,
        balloons: Vec<BalloonRegion>,
        erase_boxes: Vec<Rect>,
        shown: Vec<TranslatedItem>,
    ) -> PipelineResult<RgbaImage> {
        let outlines = DebugOutlines {
            balloons: balloons.iter().map(|b| b.rect).collect(),
            text_boxes: erase_boxes.clone(),
        };

        let stage_start = Instant::now();
        let erased = self
            .eraser
            .erase_async(image, Arc::new(balloons), erase_boxes)
            .await?;
        self.metrics.record_stage_duration(Stage::Erase, stage_start.elapsed());

        let stage_start = Instant::now();
        let composed = self
            .composer
            .compose_async(Arc::new(erased), shown, Some(outlines))
            .await?;
        self.metrics.record_stage_duration(Stage::Compose, stage_start.elapsed());
        Ok(composed)
    }

    /// Forget fingerprints, memoized translations and stabilizer history
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.translation.memo().clear();
        self.stabilizer.lock().reset();
        self.metrics.update_cache_size(0);
        info!("Translation cache and frame history cleared");
    }

    pub async fn dismiss_overlay(&self) {
        self.presenter.clear().await;
        debug!("Overlay dismissed");
    }
}

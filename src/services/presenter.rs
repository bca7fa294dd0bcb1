// Overlay presentation boundary
//
// The orchestrator only talks to `OverlayPresenter`. `SharedOverlay` keeps the
// latest overlay in memory for the HTTP surface to serve.

use crate::core::config::PresentationConfig;
use crate::core::types::TranslatedItem;
use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum OverlayContent {
    /// Frame with text erased and translations drawn in
    Bitmap(Arc<RgbaImage>),
    /// Translations with their target rects, for clients that draw themselves
    Items(Vec<TranslatedItem>),
}

#[async_trait]
pub trait OverlayPresenter: Send + Sync {
    fn is_showing(&self) -> bool;

    async fn present_bitmap(&self, bitmap: Arc<RgbaImage>);

    async fn present_items(&self, items: Vec<TranslatedItem>);

    async fn clear(&self);
}

struct OverlayInner {
    current: RwLock<Option<OverlayContent>>,
    generation: AtomicU64,
    persist: bool,
    ttl: Duration,
}

/// In-process overlay slot with persist or auto-clear policy
#[derive(Clone)]
pub struct SharedOverlay {
    inner: Arc<OverlayInner>,
}

impl SharedOverlay {
    pub fn new(config: &PresentationConfig) -> Self {
        Self {
            inner: Arc::new(OverlayInner {
                current: RwLock::new(None),
                generation: AtomicU64::new(0),
                persist: config.persist,
                ttl: Duration::from_millis(config.ttl_ms),
            }),
        }
    }

    pub fn current(&self) -> Option<OverlayContent> {
        self.inner.current.read().clone()
    }

    fn show(&self, content: OverlayContent) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.current.write() = Some(content);

        if self.inner.persist {
            return;
        }

        // A newer presentation bumps the generation, so this clear no-ops
        let weak: Weak<OverlayInner> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                if inner.generation.load(Ordering::SeqCst) == generation {
                    *inner.current.write() = None;
                    debug!("Overlay auto-cleared after {:?}", ttl);
                }
            }
        });
    }
}

#[async_trait]
impl OverlayPresenter for SharedOverlay {
    fn is_showing(&self) -> bool {
        self.inner.current.read().is_some()
    }

    async fn present_bitmap(&self, bitmap: Arc<RgbaImage>) {
        self.show(OverlayContent::Bitmap(bitmap));
    }

    async fn present_items(&self, items: Vec<TranslatedItem>) {
        self.show(OverlayContent::Items(items));
    }

    async fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.current.write() = None;
    }
}

impl std::fmt::Debug for SharedOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOverlay")
            .field("showing", &self.is_showing())
            .field("persist", &self.inner.persist)
            .finish()
    }
}

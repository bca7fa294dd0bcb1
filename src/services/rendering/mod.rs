// Translated text composition
//
// Layout is pure (see `layout`); rasterisation goes through `GlyphBackend`.

pub mod layout;

pub use layout::{LayoutPlan, PlacedLine, TextColors};

use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::{Rect, TranslatedItem};
use crate::utils::image_ops::draw_debug_outlines;
use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
    Wrap,
};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Single-line glyph measurement and drawing
pub trait GlyphBackend: Send + Sync {
    fn line_height(&self, size: f32) -> f32;

    fn measure(&self, text: &str, size: f32) -> f32;

    /// Draw `text` with its line box's top-left at `origin`, blending only
    /// pixels inside `clip`
    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        size: f32,
        origin: (i32, i32),
        color: Rgba<u8>,
        clip: &Rect,
    );
}

struct FontEngine {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

/// cosmic-text backend over fonts loaded from disk
pub struct CosmicGlyphs {
    engine: Mutex<FontEngine>,
    family: Option<String>,
    line_height_ratio: f32,
}

impl CosmicGlyphs {
    pub fn new(config: &RenderingConfig) -> RenderingResult<Self> {
        let mut db = fontdb::Database::new();

        for path in &config.font_paths {
            match std::fs::read(path) {
                Ok(data) => {
                    db.load_font_data(data);
                    debug!("Loaded font {}", path);
                }
                Err(e) => warn!("Font not found: {} ({})", path, e),
            }
        }
        if config.load_system_fonts {
            db.load_system_fonts();
        }
        if db.len() == 0 {
            return Err(RenderingError::FontLoadError(
                "no fonts loaded from FONT_PATHS or the system".to_string(),
            ));
        }

        let wanted = config.font_family.as_str();
        let family = db
            .faces()
            .any(|face| {
                face.families
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(wanted))
            })
            .then(|| wanted.to_string());

        match &family {
            Some(name) => info!("Rendering with font family '{}' ({} faces)", name, db.len()),
            None => warn!(
                "Font family '{}' not available, falling back to sans-serif",
                wanted
            ),
        }

        let line_height_ratio = line_height_ratio(family.as_deref());
        Ok(Self {
            engine: Mutex::new(FontEngine {
                font_system: FontSystem::new_with_locale_and_db("en-US".to_string(), db),
                swash_cache: SwashCache::new(),
            }),
            family,
            line_height_ratio,
        })
    }

    fn attrs(&self) -> Attrs<'_> {
        let family = match &self.family {
            Some(name) => Family::Name(name.as_str()),
            None => Family::SansSerif,
        };
        Attrs::new().family(family)
    }

    fn shape(&self, font_system: &mut FontSystem, text: &str, size: f32) -> Buffer {
        let metrics = Metrics::new(size, self.line_height(size));
        let mut buffer = Buffer::new(font_system, metrics);
        buffer.set_wrap(font_system, Wrap::None);
        buffer.set_text(font_system, text, &self.attrs(), Shaping::Advanced);
        buffer.shape_until_scroll(font_system, false);
        buffer
    }
}

/// fontdb does not expose ascender/descender, so the ratio is by family name
fn line_height_ratio(family: Option<&str>) -> f32 {
    let Some(name) = family else {
        return 1.35;
    };
    let name = name.to_lowercase();
    if name.contains("arial") || name.contains("helvetica") {
        1.35
    } else if name.contains("times") {
        1.45
    } else if name.contains("mono") || name.contains("courier") {
        1.50
    } else {
        1.40
    }
}

impl GlyphBackend for CosmicGlyphs {
    fn line_height(&self, size: f32) -> f32 {
        (size * self.line_height_ratio).max(size * 1.2)
    }

    fn measure(&self, text: &str, size: f32) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let mut engine = self.engine.lock();
        let buffer = self.shape(&mut engine.font_system, text, size);
        buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max)
    }

    fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        size: f32,
        origin: (i32, i32),
        color: Rgba<u8>,
        clip: &Rect,
    ) {
        let mut engine = self.engine.lock();
        let FontEngine {
            font_system,
            swash_cache,
        } = &mut *engine;

        let buffer = self.shape(font_system, text, size);
        let ink = CosmicColor::rgba(color[0], color[1], color[2], color[3]);

        buffer.draw(font_system, swash_cache, ink, |px, py, w, h, c| {
            let coverage = Rgba([c.r(), c.g(), c.b(), c.a()]);
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    blend_pixel(canvas, origin.0 + px + dx, origin.1 + py + dy, coverage, clip);
                }
            }
        });
    }
}

/// Source-over blend of `color` at (x, y) when inside both `clip` and canvas
pub fn blend_pixel(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, clip: &Rect) {
    let (w, h) = canvas.dimensions();
    let inside_clip = x >= clip.left && x < clip.right && y >= clip.top && y < clip.bottom;
    let inside_canvas = x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h;
    if !inside_clip || !inside_canvas {
        return;
    }

    let existing = canvas.get_pixel(x as u32, y as u32);
    let alpha = color[3] as f32 / 255.0;
    let inv = 1.0 - alpha;
    let blended = Rgba([
        (color[0] as f32 * alpha + existing[0] as f32 * inv) as u8,
        (color[1] as f32 * alpha + existing[1] as f32 * inv) as u8,
        (color[2] as f32 * alpha + existing[2] as f32 * inv) as u8,
        existing[3].max(color[3]),
    ]);
    canvas.put_pixel(x as u32, y as u32, blended);
}

/// Rects drawn over the composed frame in debug mode
#[derive(Debug, Clone, Default)]
pub struct DebugOutlines {
    pub balloons: Vec<Rect>,
    pub text_boxes: Vec<Rect>,
}

pub struct TextComposer {
    glyphs: Arc<dyn GlyphBackend>,
    config: RenderingConfig,
}

impl TextComposer {
    pub fn new(glyphs: Arc<dyn GlyphBackend>, config: RenderingConfig) -> Self {
        Self { glyphs, config }
    }

    /// Plan `text` inside `rect` against the colours currently in `canvas`
    pub fn layout(&self, canvas: &RgbaImage, rect: &Rect, text: &str) -> Option<LayoutPlan> {
        let (w, h) = canvas.dimensions();
        let target = rect.clipped(w, h);
        let background = layout::sample_background(canvas, &target);
        layout::plan_layout(&target, text, background, &self.config, self.glyphs.as_ref())
    }

    /// Draw every item into a copy of `base`, in order
    #[instrument(skip_all, fields(items = items.len()))]
    pub fn compose(
        &self,
        base: &RgbaImage,
        items: &[TranslatedItem],
        outlines: Option<&DebugOutlines>,
    ) -> RgbaImage {
        let mut canvas = base.clone();

        for item in items {
            match self.layout(&canvas, &item.rect, &item.translated_text) {
                Some(plan) => {
                    debug!(
                        "Placing {} line(s) at {:.1}px in {}",
                        plan.lines.len(),
                        plan.size,
                        item.rect
                    );
                    self.draw_plan(&mut canvas, &plan);
                }
                None => debug!("Skipping empty target {}", item.rect),
            }
        }

        if self.config.debug_outlines {
            if let Some(outlines) = outlines {
                draw_debug_outlines(&mut canvas, &outlines.balloons, &outlines.text_boxes);
            }
        }
        canvas
    }

    /// Stroke rings first, then the fill at the same origin
    fn draw_plan(&self, canvas: &mut RgbaImage, plan: &LayoutPlan) {
        let radius = ((plan.stroke_width + 1) / 2).max(1);
        let limit = (radius * radius) as f32 * 1.2;

        for line in &plan.lines {
            for oy in -radius..=radius {
                for ox in -radius..=radius {
                    if (ox == 0 && oy == 0) || ((ox * ox + oy * oy) as f32) > limit {
                        continue;
                    }
                    self.glyphs.draw_line(
                        canvas,
                        &line.text,
                        plan.size,
                        (line.x + ox, line.y + oy),
                        plan.colors.stroke,
                        &plan.clip,
                    );
                }
            }
            self.glyphs.draw_line(
                canvas,
                &line.text,
                plan.size,
                (line.x, line.y),
                plan.colors.fill,
                &plan.clip,
            );
        }
    }

    /// Run `compose` on the blocking pool
    pub async fn compose_async(
        self: &Arc<Self>,
        base: Arc<RgbaImage>,
        items: Vec<TranslatedItem>,
        outlines: Option<DebugOutlines>,
    ) -> RenderingResult<RgbaImage> {
        let composer = Arc::clone(self);
        tokio::task::spawn_blocking(move || composer.compose(&base, &items, outlines.as_ref()))
            .await
            .map_err(|e| RenderingError::TaskFailed(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::Fingerprint;

    /// Every glyph is a solid box 0.6em wide and 1em tall
    pub(crate) struct BlockGlyphs;

    impl GlyphBackend for BlockGlyphs {
        fn line_height(&self, size: f32) -> f32 {
            size * 1.2
        }

        fn measure(&self, text: &str, size: f32) -> f32 {
            text.chars().count() as f32 * size * 0.6
        }

        fn draw_line(
            &self,
            canvas: &mut RgbaImage,
            text: &str,
            size: f32,
            origin: (i32, i32),
            color: Rgba<u8>,
            clip: &Rect,
        ) {
            let width = self.measure(text, size).round() as i32;
            for y in origin.1..origin.1 + size.round() as i32 {
                for x in origin.0..origin.0 + width {
                    blend_pixel(canvas, x, y, color, clip);
                }
            }
        }
    }

    fn composer(config: RenderingConfig) -> TextComposer {
        TextComposer::new(Arc::new(BlockGlyphs), config)
    }

    fn item(rect: Rect, text: &str) -> TranslatedItem {
        TranslatedItem {
            original_text: String::new(),
            translated_text: text.to_string(),
            rect,
            fingerprint: Fingerprint(0),
        }
    }

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    #[test]
    fn test_blend_respects_clip_and_alpha() {
        let mut canvas = RgbaImage::from_pixel(4, 4, WHITE);
        let clip = Rect::new(1, 1, 3, 3);
        blend_pixel(&mut canvas, 0, 0, BLACK, &clip);
        blend_pixel(&mut canvas, 1, 1, BLACK, &clip);
        blend_pixel(&mut canvas, 2, 2, Rgba([0, 0, 0, 128]), &clip);
        blend_pixel(&mut canvas, 9, 9, BLACK, &Rect::new(0, 0, 20, 20));

        assert_eq!(*canvas.get_pixel(0, 0), WHITE);
        assert_eq!(*canvas.get_pixel(1, 1), BLACK);
        let half = canvas.get_pixel(2, 2)[0];
        assert!(half > 100 && half < 140);
    }

    #[test]
    fn test_compose_draws_inside_rect_only() {
        let base = RgbaImage::from_pixel(300, 200, WHITE);
        let rect = Rect::new(50, 50, 250, 150);
        let out = composer(RenderingConfig::default()).compose(&base, &[item(rect, "HALO")], None);

        let clip = rect.inset(2);
        let mut fill_pixels = 0;
        for (x, y, p) in out.enumerate_pixels() {
            let inside = (x as i32) >= clip.left
                && (x as i32) < clip.right
                && (y as i32) >= clip.top
                && (y as i32) < clip.bottom;
            if !inside {
                assert_eq!(*p, WHITE, "drawn outside clip at {},{}", x, y);
            } else if *p == BLACK {
                fill_pixels += 1;
            }
        }
        assert!(fill_pixels > 0);
    }

    #[test]
    fn test_dark_background_gets_light_fill() {
        let base = RgbaImage::from_pixel(300, 200, Rgba([10, 10, 10, 255]));
        let rect = Rect::new(0, 0, 300, 200);
        let c = composer(RenderingConfig::default());
        let plan = c.layout(&base, &rect, "HEY").unwrap();
        assert_eq!(plan.colors.fill, WHITE);

        let out = c.compose(&base, &[item(rect, "HEY")], None);
        let line = &plan.lines[0];
        let centre = out.get_pixel(
            (line.x + (line.width / 2.0) as i32) as u32,
            (line.y + (plan.size / 2.0) as i32) as u32,
        );
        assert_eq!(*centre, WHITE);
    }

    #[test]
    fn test_overlong_text_clamped_to_floor() {
        let base = RgbaImage::from_pixel(400, 300, WHITE);
        let rect = Rect::new(100, 100, 300, 200);
        let c = composer(RenderingConfig::default());
        let text = "PANJANG ".repeat(300);

        let plan = c.layout(&base, &rect, &text).unwrap();
        assert_eq!(plan.size, 10.0);

        let out = c.compose(&base, &[item(rect, &text)], None);
        assert_eq!(*out.get_pixel(50, 50), WHITE);
        assert_eq!(*out.get_pixel(150, 250), WHITE);
    }

    #[test]
    fn test_empty_rect_skipped() {
        let base = RgbaImage::from_pixel(50, 50, WHITE);
        let out = composer(RenderingConfig::default()).compose(
            &base,
            &[item(Rect::new(60, 60, 90, 90), "OUTSIDE")],
            None,
        );
        assert_eq!(out, base);
    }

    #[test]
    fn test_debug_outlines_only_when_enabled() {
        let base = RgbaImage::from_pixel(100, 100, WHITE);
        let outlines = DebugOutlines {
            balloons: vec![Rect::new(10, 10, 90, 90)],
            text_boxes: vec![],
        };

        let off = composer(RenderingConfig::default()).compose(&base, &[], Some(&outlines));
        assert_eq!(off, base);

        let on = composer(RenderingConfig {
            debug_outlines: true,
            ..RenderingConfig::default()
        })
        .compose(&base, &[], Some(&outlines));
        assert_ne!(*on.get_pixel(10, 50), WHITE);
    }

    #[test]
    fn test_line_height_ratio_by_family() {
        assert_eq!(line_height_ratio(Some("CC Wild Words")), 1.40);
        assert_eq!(line_height_ratio(Some("Arial Unicode")), 1.35);
        assert_eq!(line_height_ratio(None), 1.35);
    }

    #[tokio::test]
    async fn test_compose_async() {
        let c = Arc::new(composer(RenderingConfig::default()));
        let base = Arc::new(RgbaImage::from_pixel(200, 120, WHITE));
        let out = c
            .compose_async(base, vec![item(Rect::new(0, 0, 200, 120), "OK")], None)
            .await
            .unwrap();
        assert_eq!(out.dimensions(), (200, 120));
    }
}

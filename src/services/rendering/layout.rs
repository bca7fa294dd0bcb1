// Balloon text layout: colour choice, greedy wrap, font fitting, placement.

use super::GlyphBackend;
use crate::core::config::RenderingConfig;
use crate::core::types::Rect;
use image::{Rgba, RgbaImage};

const SAMPLE_INSET: i32 = 5;
const CLIP_INSET: i32 = 2;
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextColors {
    pub fill: Rgba<u8>,
    pub stroke: Rgba<u8>,
}

/// 0.0 for white, 1.0 for black
pub fn darkness(color: Rgba<u8>) -> f32 {
    let luma = 0.299 * color[0] as f32 + 0.587 * color[1] as f32 + 0.114 * color[2] as f32;
    1.0 - luma / 255.0
}

/// Light fill on dark backgrounds, dark fill on light ones; stroke opposite
pub fn colors_for_background(background: Rgba<u8>) -> TextColors {
    if darkness(background) >= 0.5 {
        TextColors { fill: WHITE, stroke: BLACK }
    } else {
        TextColors { fill: BLACK, stroke: WHITE }
    }
}

/// Most frequent colour among the four inset corners of `rect`; ties go to
/// the earliest sample.
pub fn sample_background(image: &RgbaImage, rect: &Rect) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return WHITE;
    }
    let cx = |x: i32| x.clamp(0, w as i32 - 1) as u32;
    let cy = |y: i32| y.clamp(0, h as i32 - 1) as u32;

    let left = rect.left + SAMPLE_INSET;
    let right = rect.right - SAMPLE_INSET;
    let top = rect.top + SAMPLE_INSET;
    let bottom = rect.bottom - SAMPLE_INSET;
    let samples = [
        *image.get_pixel(cx(left), cy(top)),
        *image.get_pixel(cx(right), cy(top)),
        *image.get_pixel(cx(left), cy(bottom)),
        *image.get_pixel(cx(right), cy(bottom)),
    ];

    let mut best = samples[0];
    let mut best_count = 0;
    for candidate in samples {
        let count = samples.iter().filter(|s| **s == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Greedy word wrap. A word wider than `max_width` sits alone on its line.
pub fn wrap_words(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub size: f32,
    pub lines: Vec<String>,
    pub line_height: f32,
}

impl FittedText {
    pub fn block_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }
}

/// Shrink from the maximum size until the wrapped block fits the height or
/// the floor is reached. Never goes below the floor.
pub fn fit_text(
    text: &str,
    max_width: f32,
    max_height: f32,
    config: &RenderingConfig,
    glyphs: &dyn GlyphBackend,
) -> FittedText {
    let floor = config.font_min_size;
    let mut size = config.font_max_size.max(floor);

    loop {
        let lines = wrap_words(text, max_width, |s| glyphs.measure(s, size));
        let line_height = glyphs.line_height(size);
        let fitted = FittedText {
            size,
            lines,
            line_height,
        };
        if fitted.block_height() <= max_height || size <= floor {
            return fitted;
        }
        size = (size * config.font_shrink_ratio).max(floor);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Top-left of the line box
    pub x: i32,
    pub y: i32,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub size: f32,
    pub line_height: f32,
    pub lines: Vec<PlacedLine>,
    pub stroke_width: i32,
    pub colors: TextColors,
    pub clip: Rect,
}

/// Lay `text` out inside `rect`. `None` when the rect or text is empty.
pub fn plan_layout(
    rect: &Rect,
    text: &str,
    background: Rgba<u8>,
    config: &RenderingConfig,
    glyphs: &dyn GlyphBackend,
) -> Option<LayoutPlan> {
    if rect.is_empty() || text.trim().is_empty() {
        return None;
    }

    let width = rect.width() as f32;
    let height = rect.height() as f32;
    let pad_x = width * config.padding_ratio;
    let pad_y = height * config.padding_ratio;
    let max_width = width - pad_x * 2.0;
    let max_height = height - pad_y * 2.0;

    let fitted = fit_text(text, max_width, max_height, config, glyphs);
    let block = fitted.block_height();

    let top = if block < max_height {
        rect.top as f32 + (height - block) / 2.0
    } else {
        rect.top as f32 + pad_y
    };

    let center_x = rect.left as f32 + width / 2.0;
    let lines = fitted
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line_width = glyphs.measure(line, fitted.size);
            PlacedLine {
                text: line.clone(),
                x: (center_x - line_width / 2.0).round() as i32,
                y: (top + i as f32 * fitted.line_height).round() as i32,
                width: line_width,
            }
        })
        .collect();

    Some(LayoutPlan {
        size: fitted.size,
        line_height: fitted.line_height,
        lines,
        stroke_width: stroke_width(rect, fitted.size, config),
        colors: colors_for_background(background),
        clip: rect.inset(CLIP_INSET),
    })
}

/// `max(4, 3% of rect width)` at the maximum font size, scaled with the font
pub fn stroke_width(rect: &Rect, size: f32, config: &RenderingConfig) -> i32 {
    let base = (rect.width() as f32 * 0.03).max(4.0);
    let scale = (size / config.font_max_size).min(1.0);
    (base * scale).round().max(1.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rendering::tests::BlockGlyphs;

    fn config() -> RenderingConfig {
        RenderingConfig::default()
    }

    #[test]
    fn test_darkness_and_colors() {
        assert!(darkness(BLACK) > 0.99);
        assert!(darkness(WHITE) < 0.01);

        let on_dark = colors_for_background(Rgba([20, 20, 40, 255]));
        assert_eq!(on_dark, TextColors { fill: WHITE, stroke: BLACK });
        let on_light = colors_for_background(Rgba([250, 250, 240, 255]));
        assert_eq!(on_light, TextColors { fill: BLACK, stroke: WHITE });
    }

    #[test]
    fn test_sample_majority_and_tie() {
        let mut image = RgbaImage::from_pixel(100, 100, WHITE);
        image.put_pixel(5, 5, BLACK);
        let rect = Rect::new(0, 0, 100, 100);
        assert_eq!(sample_background(&image, &rect), WHITE);

        // Two against two: first sampled (top-left) wins
        image.put_pixel(95, 5, BLACK);
        assert_eq!(sample_background(&image, &rect), BLACK);
    }

    #[test]
    fn test_sample_clamps_outside_rects() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 255]));
        let rect = Rect::new(-50, -50, 200, 200);
        assert_eq!(sample_background(&image, &rect), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_wrap_words_greedy() {
        // One unit per char
        let measure = |s: &str| s.chars().count() as f32;
        assert_eq!(
            wrap_words("HELLO THERE MY FRIEND", 11.0, measure),
            vec!["HELLO THERE", "MY FRIEND"]
        );
        assert_eq!(
            wrap_words("SUPERCALIFRAGILISTIC NO", 5.0, measure),
            vec!["SUPERCALIFRAGILISTIC", "NO"]
        );
        assert!(wrap_words("   ", 5.0, measure).is_empty());
    }

    #[test]
    fn test_fit_stops_at_floor_for_overlong_text() {
        let glyphs = BlockGlyphs;
        let text = "WORD ".repeat(400);
        let fitted = fit_text(&text, 196.0, 96.0, &config(), &glyphs);
        assert_eq!(fitted.size, 10.0);
        assert!(fitted.block_height() > 96.0);
    }

    #[test]
    fn test_fit_prefers_largest_size_that_fits() {
        let glyphs = BlockGlyphs;
        let fitted = fit_text("HI", 400.0, 400.0, &config(), &glyphs);
        assert_eq!(fitted.size, 70.0);
        assert_eq!(fitted.lines, vec!["HI"]);
    }

    #[test]
    fn test_fit_shrinks_geometrically() {
        let glyphs = BlockGlyphs;
        // 70px lines are 84px tall; 64.4px lines are 77.28px
        let fitted = fit_text("HI", 400.0, 80.0, &config(), &glyphs);
        assert!((fitted.size - 70.0 * 0.92).abs() < 1e-3);
    }

    #[test]
    fn test_plan_centres_fitting_block() {
        let glyphs = BlockGlyphs;
        let rect = Rect::new(40, 40, 240, 140);
        let plan = plan_layout(&rect, "HALO", WHITE, &config(), &glyphs).unwrap();

        let block = plan.lines.len() as f32 * plan.line_height;
        let expected_top = 40.0 + (100.0 - block) / 2.0;
        assert_eq!(plan.lines[0].y, expected_top.round() as i32);

        let line = &plan.lines[0];
        let centre = line.x as f32 + line.width / 2.0;
        assert!((centre - 140.0).abs() <= 1.0);
        assert_eq!(plan.clip, Rect::new(42, 42, 238, 138));
        assert_eq!(plan.colors.fill, BLACK);
    }

    #[test]
    fn test_plan_anchors_overflowing_block_at_top_padding() {
        let glyphs = BlockGlyphs;
        let rect = Rect::new(0, 0, 200, 100);
        let text = "WORD ".repeat(400);
        let plan = plan_layout(&rect, &text, WHITE, &config(), &glyphs).unwrap();
        assert_eq!(plan.size, 10.0);
        assert_eq!(plan.lines[0].y, 2);
    }

    #[test]
    fn test_plan_rejects_empty_input() {
        let glyphs = BlockGlyphs;
        assert!(plan_layout(&Rect::new(0, 0, 0, 10), "A", WHITE, &config(), &glyphs).is_none());
        assert!(plan_layout(&Rect::new(0, 0, 10, 10), " ", WHITE, &config(), &glyphs).is_none());
    }

    #[test]
    fn test_stroke_width_scaling() {
        let rect = Rect::new(0, 0, 200, 100);
        assert_eq!(stroke_width(&rect, 70.0, &config()), 6);
        assert_eq!(stroke_width(&rect, 35.0, &config()), 3);
        assert_eq!(stroke_width(&rect, 1.0, &config()), 1);
    }
}

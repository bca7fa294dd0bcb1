/// Balloon detection check with debug outline output
///
/// Usage: cargo run --release --bin test_detect -- input.png [--output dir] [--profile outline|area] [--erase]
///
/// With `--erase` the inner part of every detected balloon is run through the
/// eraser before outlines are drawn.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;

use comic_overlay::core::config::{DetectionConfig, DetectorProfile, ErasureConfig};
use comic_overlay::core::types::Rect;
use comic_overlay::services::{BubbleDetector, TextEraser};
use comic_overlay::utils::draw_debug_outlines;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("comic_overlay=debug")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <image.png> [--output dir] [--profile outline|area] [--erase]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = &args[1];
    let mut output_dir = ".".to_string();
    let mut profile = DetectorProfile::Outline;
    let mut erase = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" if i + 1 < args.len() => {
                output_dir = args[i + 1].clone();
                i += 2;
            }
            "--profile" | "-p" if i + 1 < args.len() => {
                profile = args[i + 1].parse()?;
                i += 2;
            }
            "--erase" => {
                erase = true;
                i += 1;
            }
            _ => i += 1,
        }
    }

    std::fs::create_dir_all(&output_dir)?;

    println!("Loading: {}", input_path);
    let mut rgba = image::open(input_path)
        .context("Failed to load image")?
        .to_rgba8();
    println!("Image size: {}x{}", rgba.width(), rgba.height());

    let detector = BubbleDetector::new(DetectionConfig::for_profile(profile));
    let start = Instant::now();
    let balloons = detector.detect(&rgba);
    println!(
        "Detected {} balloon(s) with profile {:?} in {:.1}ms",
        balloons.len(),
        profile,
        start.elapsed().as_secs_f64() * 1000.0
    );
    for (n, b) in balloons.iter().enumerate() {
        println!(
            "  {}. {} vertices={} aspect={:.2}",
            n + 1,
            b.rect,
            b.vertex_count,
            b.aspect_ratio
        );
    }

    // Stand-in text boxes: the middle of each balloon
    let text_boxes: Vec<Rect> = balloons
        .iter()
        .map(|b| b.rect.inset(b.rect.width().min(b.rect.height()) / 5))
        .filter(|r| !r.is_empty())
        .collect();

    if erase {
        let eraser = TextEraser::new(ErasureConfig::default());
        let start = Instant::now();
        rgba = eraser.erase(&rgba, &balloons, &text_boxes)?;
        println!(
            "Erased {} region(s) in {:.1}ms",
            text_boxes.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    let balloon_rects: Vec<Rect> = balloons.iter().map(|b| b.rect).collect();
    draw_debug_outlines(&mut rgba, &balloon_rects, &text_boxes);

    let input_stem = Path::new(input_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let out_path = format!("{}/{}_detect.png", output_dir, input_stem);
    DynamicImage::ImageRgba8(rgba).save(&out_path)?;
    println!("Saved: {}", out_path);

    Ok(())
}

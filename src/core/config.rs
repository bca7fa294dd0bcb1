use crate::core::errors::ConfigError;
use std::env;
use std::str::FromStr;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1420,
            host: "0.0.0.0".to_string(),
            log_level: Level::INFO,
        }
    }
}

/// Frame admission configuration
#[derive(Debug, Clone)]
pub struct StabilizerConfig {
    pub min_interval_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self { min_interval_ms: 500 }
    }
}

/// Balloon detector variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorProfile {
    /// Mean threshold on dark balloon outlines
    Outline,
    /// Gaussian threshold + close, filtered by area fraction
    Area,
}

impl FromStr for DetectorProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "outline" => Ok(Self::Outline),
            "area" => Ok(Self::Area),
            other => Err(ConfigError::UnknownVariant {
                key: "DETECTOR_PROFILE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub profile: DetectorProfile,
    pub min_size: u32,
    pub min_vertices: usize,
    pub aspect_min: f32,
    pub aspect_max: f32,
}

impl DetectionConfig {
    pub fn for_profile(profile: DetectorProfile) -> Self {
        let (aspect_min, aspect_max) = match profile {
            DetectorProfile::Outline => (0.4, 2.5),
            DetectorProfile::Area => (0.125, 8.0),
        };
        Self {
            profile,
            min_size: 60,
            min_vertices: 6,
            aspect_min,
            aspect_max,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::for_profile(DetectorProfile::Outline)
    }
}

/// What region the OCR engine sees and how lines become items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionScope {
    /// One OCR call per balloon crop, lines joined into one item
    Balloon,
    /// One OCR call on the whole frame, one item per line
    Frame,
}

impl FromStr for RecognitionScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balloon" => Ok(Self::Balloon),
            "frame" => Ok(Self::Frame),
            other => Err(ConfigError::UnknownVariant {
                key: "OCR_SCOPE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// OCR boundary configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub endpoint: String,
    pub scope: RecognitionScope,
    pub include_free_text: bool,
    pub timeout_seconds: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8866/ocr".to_string(),
            scope: RecognitionScope::Balloon,
            include_free_text: false,
            timeout_seconds: 15,
        }
    }
}

/// Translation boundary configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout_seconds: u64,
    /// Ordered literal replacements applied to backend output
    pub post_edit_rules: Vec<(String, String)>,
    pub memo_capacity: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_timeout_seconds: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000".to_string(),
            source_lang: "en".to_string(),
            target_lang: "id".to_string(),
            timeout_seconds: 15,
            post_edit_rules: default_post_edit_rules("id"),
            memo_capacity: 100,
            breaker_failure_threshold: 5,
            breaker_timeout_seconds: 30,
        }
    }
}

/// Fingerprint cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 800 }
    }
}

/// Glyph erasure configuration
#[derive(Debug, Clone)]
pub struct ErasureConfig {
    pub coverage_threshold: f32,
    pub inpaint_radius: u32,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.4,
            inpaint_radius: 5,
        }
    }
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub font_min_size: f32,
    pub font_max_size: f32,
    pub font_shrink_ratio: f32,
    pub padding_ratio: f32,
    pub font_paths: Vec<String>,
    pub font_family: String,
    pub load_system_fonts: bool,
    pub debug_outlines: bool,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            font_min_size: 10.0,
            font_max_size: 70.0,
            font_shrink_ratio: 0.92,
            padding_ratio: 0.02,
            font_paths: vec!["fonts/CCWildWords.ttf".to_string()],
            font_family: "CC Wild Words".to_string(),
            load_system_fonts: true,
            debug_outlines: false,
        }
    }
}

/// How results reach the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationMode {
    /// Erase + compose, then present the baked bitmap
    Bitmap,
    /// Present translated items only
    Items,
}

impl FromStr for PresentationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bitmap" => Ok(Self::Bitmap),
            "items" => Ok(Self::Items),
            other => Err(ConfigError::UnknownVariant {
                key: "PRESENTATION_MODE".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Presentation configuration
#[derive(Debug, Clone)]
pub struct PresentationConfig {
    pub mode: PresentationMode,
    /// Keep the overlay until explicitly dismissed
    pub persist: bool,
    pub ttl_ms: u64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            mode: PresentationMode::Bitmap,
            persist: true,
            ttl_ms: 1200,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub stabilizer: StabilizerConfig,
    pub detection: DetectionConfig,
    pub recognition: RecognitionConfig,
    pub translation: TranslationConfig,
    pub cache: CacheConfig,
    pub erasure: ErasureConfig,
    pub rendering: RenderingConfig,
    pub presentation: PresentationConfig,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Built-in replacements for targets that ship a list (only `id` so far)
pub fn default_post_edit_rules(target_lang: &str) -> Vec<(String, String)> {
    let rules: &[(&str, &str)] = match target_lang {
        "id" => &[
            ("aku aku", "aku"),
            ("saya aku", "aku"),
            ("saya saya", "saya"),
            (" kamu ", " kau "),
            ("saya ingin", "aku mau"),
            ("saya mau", "aku mau"),
        ],
        _ => &[],
    };
    rules
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Parse `from=>to;from=>to`, skipping malformed pairs
pub fn parse_post_edit_rules(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (from, to) = pair.split_once("=>")?;
            let from = from.trim();
            if from.is_empty() {
                return None;
            }
            Some((from.to_string(), to.trim().to_string()))
        })
        .collect()
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let profile = match env::var("DETECTOR_PROFILE") {
            Ok(s) => s.parse()?,
            Err(_) => DetectorProfile::Outline,
        };
        let detection_defaults = DetectionConfig::for_profile(profile);

        let scope = match env::var("OCR_SCOPE") {
            Ok(s) => s.parse()?,
            Err(_) => RecognitionScope::Balloon,
        };

        let mode = match env::var("PRESENTATION_MODE") {
            Ok(s) => s.parse()?,
            Err(_) => PresentationMode::Bitmap,
        };

        let translation_defaults = TranslationConfig::default();
        let rendering_defaults = RenderingConfig::default();

        let font_paths = env::var("FONT_PATHS")
            .ok()
            .map(|paths| {
                paths
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or(rendering_defaults.font_paths);

        let target_lang = env_string("TARGET_LANG", &translation_defaults.target_lang);

        Ok(Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT", 1420),
                host: env_string("SERVER_HOST", "0.0.0.0"),
                log_level,
            },
            stabilizer: StabilizerConfig {
                min_interval_ms: env_parse("MIN_FRAME_INTERVAL_MS", 500),
            },
            detection: DetectionConfig {
                profile,
                min_size: env_parse("BUBBLE_MIN_SIZE", detection_defaults.min_size),
                min_vertices: env_parse("BUBBLE_MIN_VERTICES", detection_defaults.min_vertices),
                aspect_min: env_parse("BUBBLE_ASPECT_MIN", detection_defaults.aspect_min),
                aspect_max: env_parse("BUBBLE_ASPECT_MAX", detection_defaults.aspect_max),
            },
            recognition: RecognitionConfig {
                endpoint: env_string("OCR_ENDPOINT", "http://127.0.0.1:8866/ocr"),
                scope,
                include_free_text: env_parse("INCLUDE_FREE_TEXT", false),
                timeout_seconds: env_parse("OCR_TIMEOUT_SECONDS", 15),
            },
            translation: TranslationConfig {
                endpoint: env_string("TRANSLATOR_ENDPOINT", &translation_defaults.endpoint),
                source_lang: env_string("SOURCE_LANG", &translation_defaults.source_lang),
                target_lang: target_lang.clone(),
                timeout_seconds: env_parse(
                    "TRANSLATOR_TIMEOUT_SECONDS",
                    translation_defaults.timeout_seconds,
                ),
                post_edit_rules: env::var("POST_EDIT_RULES")
                    .map(|raw| parse_post_edit_rules(&raw))
                    .unwrap_or_else(|_| default_post_edit_rules(&target_lang)),
                memo_capacity: env_parse("MEMO_CAPACITY", translation_defaults.memo_capacity),
                breaker_failure_threshold: env_parse(
                    "TRANSLATOR_BREAKER_THRESHOLD",
                    translation_defaults.breaker_failure_threshold,
                ),
                breaker_timeout_seconds: env_parse(
                    "TRANSLATOR_BREAKER_TIMEOUT_SECONDS",
                    translation_defaults.breaker_timeout_seconds,
                ),
            },
            cache: CacheConfig {
                ttl_ms: env_parse("CACHE_TTL_MS", 800),
            },
            erasure: ErasureConfig {
                coverage_threshold: env_parse("COVERAGE_THRESHOLD", 0.4),
                inpaint_radius: env_parse("INPAINT_RADIUS", 5),
            },
            rendering: RenderingConfig {
                font_min_size: env_parse("FONT_MIN_SIZE", rendering_defaults.font_min_size),
                font_max_size: env_parse("FONT_MAX_SIZE", rendering_defaults.font_max_size),
                font_shrink_ratio: env_parse(
                    "FONT_SHRINK_RATIO",
                    rendering_defaults.font_shrink_ratio,
                ),
                padding_ratio: env_parse("TEXT_PADDING_RATIO", rendering_defaults.padding_ratio),
                font_paths,
                font_family: env_string("FONT_FAMILY", &rendering_defaults.font_family),
                load_system_fonts: env_parse(
                    "LOAD_SYSTEM_FONTS",
                    rendering_defaults.load_system_fonts,
                ),
                debug_outlines: env_parse("DEBUG_OUTLINES", false),
            },
            presentation: PresentationConfig {
                mode,
                persist: env_parse("OVERLAY_PERSIST", true),
                ttl_ms: env_parse("OVERLAY_TTL_MS", 1200),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.min_size == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "min_size must be > 0".to_string(),
            ));
        }
        if d.min_vertices < 3 {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "min_vertices must be >= 3, got {}",
                d.min_vertices
            )));
        }
        if !(d.aspect_min > 0.0 && d.aspect_min <= d.aspect_max) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "aspect band must satisfy 0 < min <= max, got {}..{}",
                d.aspect_min, d.aspect_max
            )));
        }

        if self.translation.source_lang.is_empty() || self.translation.target_lang.is_empty() {
            return Err(ConfigError::InvalidTranslationConfig(
                "source and target languages are required".to_string(),
            ));
        }
        if self.translation.memo_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity(
                self.translation.memo_capacity,
            ));
        }

        if !(0.0..=1.0).contains(&self.erasure.coverage_threshold) {
            return Err(ConfigError::InvalidErasureConfig(format!(
                "coverage_threshold must be between 0.0 and 1.0, got {}",
                self.erasure.coverage_threshold
            )));
        }
        if self.erasure.inpaint_radius == 0 {
            return Err(ConfigError::InvalidErasureConfig(
                "inpaint_radius must be > 0".to_string(),
            ));
        }

        let r = &self.rendering;
        if !(r.font_min_size > 0.0 && r.font_min_size <= r.font_max_size) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font sizes must satisfy 0 < min <= max, got {}..{}",
                r.font_min_size, r.font_max_size
            )));
        }
        if !(r.font_shrink_ratio > 0.0 && r.font_shrink_ratio < 1.0) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font_shrink_ratio must be in (0, 1), got {}",
                r.font_shrink_ratio
            )));
        }
        if !(0.0..0.5).contains(&r.padding_ratio) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "padding_ratio must be in [0, 0.5), got {}",
                r.padding_ratio
            )));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stabilizer.min_interval_ms, 500);
        assert_eq!(config.cache.ttl_ms, 800);
        assert_eq!(config.detection.min_size, 60);
        assert_eq!(config.presentation.ttl_ms, 1200);
    }

    #[test]
    fn test_profile_aspect_bands() {
        let outline = DetectionConfig::for_profile(DetectorProfile::Outline);
        assert_eq!((outline.aspect_min, outline.aspect_max), (0.4, 2.5));

        let area = DetectionConfig::for_profile(DetectorProfile::Area);
        assert_eq!((area.aspect_min, area.aspect_max), (0.125, 8.0));
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!("AREA".parse::<DetectorProfile>().unwrap(), DetectorProfile::Area);
        assert_eq!(" frame ".parse::<RecognitionScope>().unwrap(), RecognitionScope::Frame);
        assert_eq!("items".parse::<PresentationMode>().unwrap(), PresentationMode::Items);
        assert!("blob".parse::<DetectorProfile>().is_err());
    }

    #[test]
    fn test_parse_post_edit_rules() {
        let rules = parse_post_edit_rules("saya ingin=>aku mau; anda => kamu;broken;=>x");
        assert_eq!(
            rules,
            vec![
                ("saya ingin".to_string(), "aku mau".to_string()),
                ("anda".to_string(), "kamu".to_string()),
            ]
        );
    }

    #[test]
    fn test_indonesian_target_ships_post_edits() {
        let rules = TranslationConfig::default().post_edit_rules;
        assert_eq!(rules.len(), 6);
        assert_eq!(rules[0], ("aku aku".to_string(), "aku".to_string()));
        assert!(rules.contains(&(" kamu ".to_string(), " kau ".to_string())));
        assert!(default_post_edit_rules("fr").is_empty());
    }

    #[test]
    fn test_invalid_coverage_rejected() {
        let mut config = Config::default();
        config.erasure.coverage_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidErasureConfig(_))
        ));
    }

    #[test]
    fn test_invalid_shrink_ratio_rejected() {
        let mut config = Config::default();
        config.rendering.font_shrink_ratio = 1.0;
        assert!(config.validate().is_err());
    }
}

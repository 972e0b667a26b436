use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Root matcher configuration, loaded from `~/.config/pdfmatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    pub extraction: ExtractionConfig,
    pub weights: SignalWeights,
    pub title_blend: TitleBlend,
    pub thresholds: Thresholds,
    pub adaptive: AdaptiveConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// How many leading pages are mined for title, authors and identifiers.
    pub pages_to_read: usize,
    pub title_min_chars: usize,
    pub title_max_chars: usize,
    /// All-uppercase embedded titles longer than this are treated as mastheads.
    pub uppercase_title_max_chars: usize,
    pub max_authors: usize,
    pub pdftotext_fallback: bool,
    pub pdftotext_timeout_secs: u64,
}

/// Weights of the fuzzy signals. Unavailable signals are dropped and the
/// remaining ones rescaled, so only the ratios matter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalWeights {
    pub title: f64,
    pub authors: f64,
    pub pages: f64,
    pub filename: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TitleBlend {
    pub cosine: f64,
    pub word_jaccard: f64,
    pub trigram_jaccard: f64,
    pub lcs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Floor below which a fuzzy pair is never a candidate.
    pub min_score: f64,
    pub medium: f64,
    pub high: f64,
    /// Minimum gap between an article's best and second-best candidate.
    pub margin: f64,
    pub doi_partial_score: f64,
    /// Unmatched PDF DOIs at least this long exclude the PDF from fuzzy matching.
    pub long_doi_min_len: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Never panics, unlike `f64::clamp`, even on bounds that failed validation.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Fewer best-per-article scores than this disables recalibration.
    pub min_samples: usize,
    pub high_bounds: Bounds,
    pub medium_bounds: Bounds,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Remove stale `file[@desc=PDF]` entries before matching.
    pub cleanup_existing: bool,
    /// Root for per-run extraction directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_root: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            weights: SignalWeights::default(),
            title_blend: TitleBlend::default(),
            thresholds: Thresholds::default(),
            adaptive: AdaptiveConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pages_to_read: 3,
            title_min_chars: 10,
            title_max_chars: 500,
            uppercase_title_max_chars: 30,
            max_authors: 10,
            pdftotext_fallback: true,
            pdftotext_timeout_secs: 8,
        }
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            title: 0.55,
            authors: 0.30,
            pages: 0.05,
            filename: 0.10,
        }
    }
}

impl Default for TitleBlend {
    fn default() -> Self {
        Self {
            cosine: 0.40,
            word_jaccard: 0.25,
            trigram_jaccard: 0.20,
            lcs: 0.15,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_score: 0.20,
            medium: 0.50,
            high: 0.75,
            margin: 0.15,
            doi_partial_score: 0.95,
            long_doi_min_len: 15,
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: 4,
            high_bounds: Bounds::new(0.60, 0.85),
            medium_bounds: Bounds::new(0.35, 0.60),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cleanup_existing: true,
            work_root: None,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl MatcherConfig {
    /// Standard config file path: `~/.config/pdfmatch/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PDFMATCH_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("pdfmatch")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Directory under which per-run extraction directories are created.
    pub fn work_root(&self) -> PathBuf {
        self.run
            .work_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("pdfmatch"))
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let weights = [w.title, w.authors, w.pages, w.filename];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MatchError::Config("signal weights must be non-negative".into()));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(MatchError::Config("signal weights must not all be zero".into()));
        }

        let b = &self.title_blend;
        let blend = [b.cosine, b.word_jaccard, b.trigram_jaccard, b.lcs];
        if blend.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MatchError::Config("title blend weights must be non-negative".into()));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("min_score", t.min_score),
            ("medium", t.medium),
            ("high", t.high),
            ("margin", t.margin),
            ("doi_partial_score", t.doi_partial_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::Config(format!(
                    "threshold {name} must be within [0, 1], got {value}"
                )));
            }
        }
        if t.min_score > t.medium || t.medium > t.high {
            return Err(MatchError::Config(
                "thresholds must satisfy min_score <= medium <= high".into(),
            ));
        }

        for (name, bounds) in [
            ("high_bounds", self.adaptive.high_bounds),
            ("medium_bounds", self.adaptive.medium_bounds),
        ] {
            let unit = 0.0..=1.0;
            if !unit.contains(&bounds.min) || !unit.contains(&bounds.max) || bounds.min > bounds.max
            {
                return Err(MatchError::Config(format!(
                    "adaptive {name} must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                    bounds.min, bounds.max
                )));
            }
        }
        // Calibrated medium is capped by high and must still land in its bounds.
        let (high, medium) = (self.adaptive.high_bounds, self.adaptive.medium_bounds);
        if medium.min > high.min {
            return Err(MatchError::Config(format!(
                "adaptive medium_bounds.min ({}) must not exceed high_bounds.min ({})",
                medium.min, high.min
            )));
        }

        if self.extraction.pages_to_read == 0 {
            return Err(MatchError::Config("pages_to_read must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let cfg = MatcherConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.extraction.pages_to_read, 3);
        assert!(cfg.thresholds.margin > 0.0);
    }

    #[test]
    fn config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = MatcherConfig::default();
        cfg.thresholds.margin = 0.2;
        cfg.run.work_root = Some("/tmp/pdfmatch-runs".to_string());
        cfg.save_to(&path).unwrap();

        let loaded = MatcherConfig::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[thresholds]\nmargin = 0.05\n").unwrap();

        let loaded = MatcherConfig::load_from(&path).unwrap();
        assert_eq!(loaded.thresholds.margin, 0.05);
        assert_eq!(loaded.thresholds.min_score, 0.20);
        assert_eq!(loaded.weights, SignalWeights::default());
    }

    #[test]
    fn load_nonexistent_returns_default() {
        let cfg =
            MatcherConfig::load_from(Path::new("/tmp/nonexistent_pdfmatch_config.toml")).unwrap();
        assert_eq!(cfg, MatcherConfig::default());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut cfg = MatcherConfig::default();
        cfg.thresholds.medium = 0.9;
        assert!(matches!(cfg.validate(), Err(MatchError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_weights() {
        let mut cfg = MatcherConfig::default();
        cfg.weights = SignalWeights {
            title: 0.0,
            authors: 0.0,
            pages: 0.0,
            filename: 0.0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_bounds() {
        let mut cfg = MatcherConfig::default();
        cfg.adaptive.high_bounds = Bounds::new(f64::NAN, 0.85);
        assert!(matches!(cfg.validate(), Err(MatchError::Config(_))));

        let mut cfg = MatcherConfig::default();
        cfg.adaptive.medium_bounds = Bounds::new(0.35, f64::NAN);
        assert!(matches!(cfg.validate(), Err(MatchError::Config(_))));

        let mut cfg = MatcherConfig::default();
        cfg.adaptive.high_bounds = Bounds::new(0.6, f64::INFINITY);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nan_bounds_from_toml_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[adaptive.high_bounds]\nmin = nan\nmax = 0.85\n").unwrap();
        assert!(matches!(
            MatcherConfig::load_from(&path),
            Err(MatchError::Config(_))
        ));
    }

    #[test]
    fn validate_rejects_medium_bounds_above_high_bounds() {
        let mut cfg = MatcherConfig::default();
        cfg.adaptive.high_bounds = Bounds::new(0.40, 0.50);
        cfg.adaptive.medium_bounds = Bounds::new(0.45, 0.70);
        assert!(matches!(cfg.validate(), Err(MatchError::Config(_))));

        cfg.adaptive.medium_bounds = Bounds::new(0.40, 0.70);
        cfg.validate().unwrap();
    }

    #[test]
    fn bounds_clamp_stays_inside() {
        let bounds = Bounds::new(0.6, 0.85);
        assert_eq!(bounds.clamp(0.1), 0.6);
        assert_eq!(bounds.clamp(0.99), 0.85);
        assert!(bounds.contains(0.7));
    }
}

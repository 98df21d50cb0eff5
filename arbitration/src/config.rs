//! Engine configuration
//!
//! Everything is defaulted so an empty TOML document is a valid config.
//! Load once at process start and pass the result by reference into the
//! engine; nothing here is cached globally.
//!
//! ```toml
//! conflict_mode = "primary_secondary"
//!
//! [semantic]
//! enabled = true
//! ngram_size = 3
//! threshold = 0.6
//!
//! [merger]
//! flag_penalty = 0.5
//!
//! [priority_facets.conflict]
//! granularity_overlap_candidate = "C"
//!
//! [adjudication]
//! max_attempts = 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::conflict::{ConflictType, SimilarityParams};
use crate::review::{Actor, ReasonCode};
use crate::vocabulary::ReferenceVocabulary;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid script pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Which conflict classes the polarity detectors emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Reference-keyed mismatches only
    Primary,
    /// Reference-keyed plus term-keyed mismatches for unreferenced tuples
    PrimarySecondary,
}

/// Semantic conflict candidate detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub enabled: bool,
    pub ngram_size: usize,
    pub threshold: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        let params = SimilarityParams::default();
        Self {
            enabled: false,
            ngram_size: params.ngram_size,
            threshold: params.threshold,
        }
    }
}

impl SemanticConfig {
    pub fn params(&self) -> SimilarityParams {
        SimilarityParams {
            ngram_size: self.ngram_size,
            threshold: self.threshold,
        }
    }
}

/// Candidate merger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Confidence multiplier applied once per raised validity flag
    pub flag_penalty: f64,
    /// Terms matching this pattern raise `invalid_language_flag`
    pub disallowed_script_pattern: String,
    /// Evaluative words that are never aspect targets
    pub opinion_lexicon: Vec<String>,
    /// Evaluative endings that mark a term as an opinion word
    pub opinion_suffixes: Vec<String>,
}

impl Default for MergerConfig {
    fn default() -> Self {
        let lexicon = [
            "좋다", "좋아요", "좋음", "좋은", "최고", "최악", "별로", "만족", "불만", "훌륭",
            "예쁘다", "예뻐요", "예쁨", "싫다", "싫어요", "나쁘다", "괜찮다", "괜찮아요", "추천",
            "비추", "대박", "good", "bad", "great", "nice", "excellent", "terrible", "awesome",
            "poor", "love", "hate",
        ];
        let suffixes = [
            "스럽다", "스러워요", "스러움", "스러운", "하다", "해요", "합니다", "좋아요",
            "좋다", "좋음", "좋은", "별로예요",
        ];
        Self {
            flag_penalty: 0.5,
            disallowed_script_pattern: r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Cyrillic}]"
                .to_string(),
            opinion_lexicon: lexicon.iter().map(|s| s.to_string()).collect(),
            opinion_suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Preferred reviewer per conflict type or reason code.
///
/// Keys are canonical names (`granularity_overlap_candidate`,
/// `NEGATION_SCOPE`); they are checked by [`EngineConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityFacets {
    pub conflict: BTreeMap<String, Actor>,
    pub reason: BTreeMap<String, Actor>,
}

impl Default for PriorityFacets {
    fn default() -> Self {
        Self {
            conflict: BTreeMap::from([(
                ConflictType::GranularityOverlapCandidate.as_str().to_string(),
                Actor::C,
            )]),
            reason: BTreeMap::new(),
        }
    }
}

impl PriorityFacets {
    pub fn for_conflict(&self, conflict_type: ConflictType) -> Option<Actor> {
        self.conflict.get(conflict_type.as_str()).copied()
    }

    pub fn for_reason(&self, reason: ReasonCode) -> Option<Actor> {
        self.reason.get(reason.as_str()).copied()
    }
}

/// Collaborator call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    /// Attempts per structured request before giving up
    pub max_attempts: u32,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub conflict_mode: ConflictMode,
    pub semantic: SemanticConfig,
    pub merger: MergerConfig,
    pub priority_facets: PriorityFacets,
    pub adjudication: AdjudicationConfig,
    pub vocabulary: ReferenceVocabulary,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_mode: ConflictMode::PrimarySecondary,
            semantic: SemanticConfig::default(),
            merger: MergerConfig::default(),
            priority_facets: PriorityFacets::default(),
            adjudication: AdjudicationConfig::default(),
            vocabulary: ReferenceVocabulary::default(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.semantic.threshold) {
            return Err(invalid("semantic.threshold", "must be within [0, 1]"));
        }
        if self.semantic.ngram_size == 0 {
            return Err(invalid("semantic.ngram_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.merger.flag_penalty) {
            return Err(invalid("merger.flag_penalty", "must be within [0, 1]"));
        }
        if self.adjudication.max_attempts == 0 {
            return Err(invalid("adjudication.max_attempts", "must be at least 1"));
        }
        regex::Regex::new(&self.merger.disallowed_script_pattern)?;

        for (name, actor) in &self.priority_facets.conflict {
            if ConflictType::from_name(name).is_none() {
                return Err(invalid(
                    "priority_facets.conflict",
                    format!("unknown conflict type '{}'", name),
                ));
            }
            if !actor.is_reviewer() {
                return Err(invalid("priority_facets.conflict", "facet must be A, B or C"));
            }
        }
        for (name, actor) in &self.priority_facets.reason {
            if ReasonCode::from_name(name).is_none() {
                return Err(invalid(
                    "priority_facets.reason",
                    format!("unknown reason code '{}'", name),
                ));
            }
            if !actor.is_reviewer() {
                return Err(invalid("priority_facets.reason", "facet must be A, B or C"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.conflict_mode, ConflictMode::PrimarySecondary);
        assert!(!config.semantic.enabled);
        assert_eq!(config.semantic.ngram_size, 3);
        assert_eq!(config.semantic.threshold, 0.6);
        assert_eq!(config.merger.flag_penalty, 0.5);
        assert_eq!(config.adjudication.max_attempts, 3);
        assert_eq!(
            config
                .priority_facets
                .for_conflict(ConflictType::GranularityOverlapCandidate),
            Some(Actor::C)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.conflict_mode, ConflictMode::PrimarySecondary);
        assert!(config.vocabulary.contains("본품#일반"));
    }

    #[test]
    fn test_parse_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
conflict_mode = "primary"

[semantic]
enabled = true
threshold = 0.75

[priority_facets.reason]
NEGATION_SCOPE = "A"
"#,
        )
        .unwrap();
        assert_eq!(config.conflict_mode, ConflictMode::Primary);
        assert!(config.semantic.enabled);
        assert_eq!(config.semantic.threshold, 0.75);
        assert_eq!(config.semantic.ngram_size, 3);
        assert_eq!(
            config.priority_facets.for_reason(ReasonCode::NegationScope),
            Some(Actor::A)
        );
        // Sections not mentioned keep their defaults.
        assert_eq!(
            config
                .priority_facets
                .for_conflict(ConflictType::GranularityOverlapCandidate),
            Some(Actor::C)
        );
    }

    #[test]
    fn test_rejects_unknown_facet_key() {
        let err = EngineConfig::from_toml_str(
            r#"
[priority_facets.conflict]
polarity_flip = "B"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_arbiter_facet() {
        let err = EngineConfig::from_toml_str(
            r#"
[priority_facets.reason]
WEAK_EVIDENCE = "ARB"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = EngineConfig::from_toml_str("[semantic]\nthreshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("semantic.threshold"));
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let err =
            EngineConfig::from_toml_str("[merger]\ndisallowed_script_pattern = \"[\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[adjudication]\nmax_attempts = 5").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.adjudication.max_attempts, 5);

        let missing = EngineConfig::from_file("/nonexistent/arbiter.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}

//! Candidate Merger: normalizes perspective-agent output into candidates
//!
//! Every raw triplet becomes exactly one candidate with a fresh tuple id.
//! Validity flags are diagnostic only: they discount confidence but never
//! drop a tuple. Malformed fields are defused to neutral defaults.

use std::collections::HashSet;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::{CandidateTuple, Polarity, Span, TupleId};
use crate::config::{ConfigError, MergerConfig};
use crate::vocabulary::ReferenceVocabulary;

/// Triplet exactly as an extraction agent produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawTriplet {
    #[serde(default)]
    pub aspect_term: Option<String>,
    #[serde(default)]
    pub aspect_ref: Option<String>,
    #[serde(default)]
    pub polarity: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    /// `{"start": .., "end": ..}` or `[start, end]`; anything else is ignored
    #[serde(default)]
    pub span: Option<serde_json::Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A raw triplet tagged with the perspective that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExtraction {
    pub origin: String,
    pub triplet: RawTriplet,
}

impl AgentExtraction {
    pub fn new(origin: impl Into<String>, triplet: RawTriplet) -> Self {
        Self {
            origin: origin.into(),
            triplet,
        }
    }
}

fn parse_span(value: &serde_json::Value) -> Option<(i64, i64)> {
    match value {
        serde_json::Value::Object(map) => {
            Some((map.get("start")?.as_i64()?, map.get("end")?.as_i64()?))
        }
        serde_json::Value::Array(items) if items.len() == 2 => {
            Some((items[0].as_i64()?, items[1].as_i64()?))
        }
        _ => None,
    }
}

/// Validate offsets against the source text, when one is known.
fn defuse_span(raw: Option<&serde_json::Value>, text_len: Option<usize>) -> Option<Span> {
    let (start, end) = parse_span(raw?)?;
    if start < 0 || end < start {
        return None;
    }
    let span = Span {
        start: start as usize,
        end: end as usize,
    };
    match text_len {
        Some(len) if span.end > len => None,
        _ => Some(span),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Merger bound to one vocabulary and lexicon set.
pub struct CandidateMerger<'a> {
    vocabulary: &'a ReferenceVocabulary,
    flag_penalty: f64,
    disallowed_script: Regex,
    opinion_lexicon: HashSet<String>,
    opinion_suffixes: Vec<String>,
}

impl<'a> CandidateMerger<'a> {
    pub fn new(
        config: &MergerConfig,
        vocabulary: &'a ReferenceVocabulary,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            vocabulary,
            flag_penalty: config.flag_penalty,
            disallowed_script: Regex::new(&config.disallowed_script_pattern)?,
            opinion_lexicon: config
                .opinion_lexicon
                .iter()
                .map(|w| w.trim().to_lowercase())
                .collect(),
            opinion_suffixes: config
                .opinion_suffixes
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Reference set but outside the closed vocabulary.
    pub fn is_invalid_ref(&self, reference: Option<&str>) -> bool {
        reference.is_some_and(|r| !self.vocabulary.contains(r))
    }

    /// Surface term contains a disallowed script.
    pub fn is_invalid_language(&self, term: &str) -> bool {
        !term.is_empty() && self.disallowed_script.is_match(term)
    }

    /// Surface term is an evaluative word rather than a target.
    pub fn is_invalid_target(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return false;
        }
        self.opinion_lexicon.contains(&term)
            || self.opinion_suffixes.iter().any(|s| term.ends_with(s.as_str()))
    }

    /// Convert raw extractions into candidates, in input order.
    pub fn merge(
        &self,
        extractions: &[AgentExtraction],
        source_text: Option<&str>,
    ) -> Vec<CandidateTuple> {
        let text_chars: Option<Vec<char>> = source_text.map(|t| t.chars().collect());
        let text_len = text_chars.as_ref().map(Vec::len);

        let candidates: Vec<CandidateTuple> = extractions
            .iter()
            .enumerate()
            .map(|(index, extraction)| {
                self.build_candidate(index, extraction, text_chars.as_deref(), text_len)
            })
            .collect();

        debug!(
            candidates = candidates.len(),
            flagged = candidates.iter().filter(|c| c.flag_count() > 0).count(),
            "Merged perspective outputs"
        );
        candidates
    }

    fn build_candidate(
        &self,
        index: usize,
        extraction: &AgentExtraction,
        text: Option<&[char]>,
        text_len: Option<usize>,
    ) -> CandidateTuple {
        let raw = &extraction.triplet;
        let tuple_id = TupleId::from_index(index);

        let aspect_term = raw
            .aspect_term
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let aspect_ref = non_empty(raw.aspect_ref.as_deref());

        let polarity = match raw.polarity.as_deref().map(str::parse::<Polarity>) {
            Some(Ok(polarity)) => polarity,
            Some(Err(e)) => {
                warn!(tuple_id = %tuple_id, error = %e, "Defusing polarity to neutral");
                Polarity::Neutral
            }
            None => Polarity::Neutral,
        };

        let span = defuse_span(raw.span.as_ref(), text_len);
        if raw.span.is_some() && span.is_none() {
            debug!(tuple_id = %tuple_id, "Discarding malformed span");
        }

        let evidence = non_empty(raw.evidence.as_deref()).or_else(|| {
            let (text, span) = (text?, span?);
            let sliced: String = text[span.start..span.end].iter().collect();
            non_empty(Some(sliced.as_str()))
        });

        let invalid_ref_flag = self.is_invalid_ref(aspect_ref.as_deref());
        let invalid_language_flag = self.is_invalid_language(&aspect_term);
        let invalid_target_flag = self.is_invalid_target(&aspect_term);

        let mut confidence = match raw.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => 1.0,
        };
        for flag in [invalid_ref_flag, invalid_language_flag, invalid_target_flag] {
            if flag {
                confidence *= self.flag_penalty;
            }
        }

        CandidateTuple {
            tuple_id,
            aspect_term,
            aspect_ref,
            polarity,
            evidence,
            span,
            origin_agent: extraction.origin.clone(),
            confidence,
            invalid_ref_flag,
            invalid_language_flag,
            invalid_target_flag,
        }
    }
}

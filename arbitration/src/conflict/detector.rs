//! Conflict Detector: scans merged candidates and emits typed records
//!
//! Each class is computed independently over the full candidate set. Grouping
//! uses ordered maps so record order (and thus conflict ids) is stable for a
//! given input, though nothing downstream depends on it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::candidate::{CandidateTuple, Polarity};
use crate::config::{ConflictMode, EngineConfig};
use crate::vocabulary::{split_reference, ReferenceVocabulary};

use super::similarity::{normalize_term, SimilarityParams};
use super::{ConflictId, ConflictRecord, ConflictType};

/// Stateless detector configured for one engine.
pub struct ConflictDetector<'a> {
    mode: ConflictMode,
    semantic: Option<SimilarityParams>,
    vocabulary: &'a ReferenceVocabulary,
}

/// Records under construction; ids are assigned on push.
#[derive(Default)]
struct RecordSink {
    records: Vec<ConflictRecord>,
}

impl RecordSink {
    fn push(
        &mut self,
        conflict_type: ConflictType,
        members: &[&CandidateTuple],
        aspect_ref: Option<String>,
        aspect_term: Option<String>,
    ) {
        let record = ConflictRecord {
            conflict_id: ConflictId::from_index(self.records.len()),
            conflict_type,
            tuple_ids: members.iter().map(|c| c.tuple_id.clone()).collect(),
            aspect_ref,
            aspect_term,
        };
        debug!(
            conflict_id = %record.conflict_id,
            conflict_type = %conflict_type,
            tuples = record.tuple_ids.len(),
            "Conflict detected"
        );
        self.records.push(record);
    }
}

fn distinct_polarities(members: &[&CandidateTuple]) -> usize {
    members
        .iter()
        .map(|c| c.polarity)
        .collect::<BTreeSet<_>>()
        .len()
}

impl<'a> ConflictDetector<'a> {
    pub fn new(config: &EngineConfig, vocabulary: &'a ReferenceVocabulary) -> Self {
        Self {
            mode: config.conflict_mode,
            semantic: config.semantic.enabled.then(|| config.semantic.params()),
            vocabulary,
        }
    }

    /// Run every enabled detector over the candidate set.
    pub fn detect(&self, candidates: &[CandidateTuple]) -> Vec<ConflictRecord> {
        let mut sink = RecordSink::default();

        let by_ref = self.group_by_reference(candidates);
        for (reference, members) in &by_ref {
            if distinct_polarities(members) < 2 {
                continue;
            }
            sink.push(
                ConflictType::RefPolarityMismatch,
                members,
                Some(reference.clone()),
                None,
            );
            if let Some(params) = &self.semantic {
                self.detect_semantic(params, reference, members, &mut sink);
            }
        }

        if self.mode == ConflictMode::PrimarySecondary {
            self.detect_term_mismatch(candidates, &mut sink);
        }

        self.detect_granularity(candidates, &mut sink);

        info!(
            candidates = candidates.len(),
            conflicts = sink.records.len(),
            "Conflict detection complete"
        );
        sink.records
    }

    fn group_by_reference<'c>(
        &self,
        candidates: &'c [CandidateTuple],
    ) -> BTreeMap<String, Vec<&'c CandidateTuple>> {
        let mut groups: BTreeMap<String, Vec<&CandidateTuple>> = BTreeMap::new();
        for candidate in candidates {
            if let Some(reference) = candidate.reference() {
                groups
                    .entry(reference.to_string())
                    .or_default()
                    .push(candidate);
            }
        }
        groups
    }

    /// First similar opposite-polarity pair per reference group.
    fn detect_semantic(
        &self,
        params: &SimilarityParams,
        reference: &str,
        members: &[&CandidateTuple],
        sink: &mut RecordSink,
    ) {
        for (i, left) in members.iter().enumerate() {
            for right in &members[i + 1..] {
                if !left.polarity.is_opposite(right.polarity) {
                    continue;
                }
                if params.distinct_but_similar(&left.aspect_term, &right.aspect_term) {
                    sink.push(
                        ConflictType::SemanticConflictCandidate,
                        &[*left, *right],
                        Some(reference.to_string()),
                        Some(format!("{} / {}", left.aspect_term, right.aspect_term)),
                    );
                    return;
                }
            }
        }
    }

    fn detect_term_mismatch(&self, candidates: &[CandidateTuple], sink: &mut RecordSink) {
        let mut groups: BTreeMap<String, Vec<&CandidateTuple>> = BTreeMap::new();
        for candidate in candidates.iter().filter(|c| c.reference().is_none()) {
            let key = normalize_term(&candidate.aspect_term);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(candidate);
        }

        for (term, members) in &groups {
            if distinct_polarities(members) >= 2 {
                sink.push(
                    ConflictType::TermPolarityMismatch,
                    members,
                    None,
                    Some(term.clone()),
                );
            }
        }
    }

    fn detect_granularity(&self, candidates: &[CandidateTuple], sink: &mut RecordSink) {
        let mut groups: BTreeMap<(String, Polarity), Vec<&CandidateTuple>> = BTreeMap::new();
        for candidate in candidates {
            let Some(parts) = candidate.reference().and_then(split_reference) else {
                continue;
            };
            groups
                .entry((parts.attribute.to_string(), candidate.polarity))
                .or_default()
                .push(candidate);
        }

        for ((attribute, _polarity), members) in &groups {
            let mut has_upper = false;
            let mut has_lower = false;
            for candidate in members {
                let Some(parts) = candidate.reference().and_then(split_reference) else {
                    continue;
                };
                if self.vocabulary.is_upper_entity(parts.entity) {
                    has_upper = true;
                } else {
                    has_lower = true;
                }
            }
            if has_upper && has_lower {
                sink.push(
                    ConflictType::GranularityOverlapCandidate,
                    members,
                    Some(attribute.clone()),
                    None,
                );
            }
        }
    }
}

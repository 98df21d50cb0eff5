//! Perspective Extractor: three biased extraction passes over raw text
//!
//! Used when a caller starts from review text instead of pre-extracted
//! triplets. Each perspective is one structured request; the answers are
//! labelled with the perspective name and handed to the merger unchanged.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::adjudicator::{
    request_structured, AdjudicationError, AdjudicationRequest, AdjudicationTask, Adjudicator,
};
use crate::merger::{AgentExtraction, RawTriplet};
use crate::prompts;
use crate::vocabulary::ReferenceVocabulary;

/// Linguistic phenomenon an extraction agent is biased toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Negation,
    Implicit,
    Literal,
}

impl Perspective {
    /// Request order.
    pub const ALL: [Perspective; 3] = [Self::Negation, Self::Implicit, Self::Literal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negation => "negation",
            Self::Implicit => "implicit",
            Self::Literal => "literal",
        }
    }

    pub fn focus(self) -> &'static str {
        match self {
            Self::Negation => {
                "Negation and contrast. Track the scope of negators (안, 못, 없다, 아니다) and \
                 contrastive connectives (-지만, -는데, 그런데) and assign polarity to the clause \
                 each opinion actually belongs to."
            }
            Self::Implicit => {
                "Implicit aspects. Find opinions whose target is never named (\"금방 닳아요\" \
                 → durability) and map them to the closest reference with an empty aspect_term."
            }
            Self::Literal => {
                "Literal evidence. Only extract targets that appear verbatim in the text and \
                 quote the exact evidence span. Prefer precision over recall."
            }
        }
    }
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expected extraction answer.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub triplets: Vec<RawTriplet>,
}

pub struct PerspectiveExtractor<'a> {
    adjudicator: &'a dyn Adjudicator,
    vocabulary: &'a ReferenceVocabulary,
    max_attempts: u32,
}

impl<'a> PerspectiveExtractor<'a> {
    pub fn new(
        adjudicator: &'a dyn Adjudicator,
        vocabulary: &'a ReferenceVocabulary,
        max_attempts: u32,
    ) -> Self {
        Self {
            adjudicator,
            vocabulary,
            max_attempts,
        }
    }

    pub fn build_request(&self, perspective: Perspective, text: &str) -> AdjudicationRequest {
        AdjudicationRequest::for_output::<ExtractionOutput>(
            AdjudicationTask::Extraction {
                perspective: perspective.as_str().to_string(),
            },
            prompts::extraction_instructions(perspective.focus()),
            json!({
                "text": text,
                "references": self.vocabulary.references,
            }),
        )
    }

    /// Run the three perspectives in order and label their triplets.
    pub async fn extract(&self, text: &str) -> Result<Vec<AgentExtraction>, AdjudicationError> {
        let mut extractions = Vec::new();
        for perspective in Perspective::ALL {
            let request = self.build_request(perspective, text);
            let output: ExtractionOutput =
                request_structured(self.adjudicator, &request, self.max_attempts).await?;
            info!(
                perspective = %perspective,
                triplets = output.triplets.len(),
                "Perspective extracted"
            );
            extractions.extend(
                output
                    .triplets
                    .into_iter()
                    .map(|triplet| AgentExtraction::new(perspective.as_str(), triplet)),
            );
        }
        Ok(extractions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudicator::ScriptedAdjudicator;

    #[tokio::test]
    async fn test_extracts_in_perspective_order() {
        let scripted = ScriptedAdjudicator::new()
            .respond(
                "extraction:negation",
                json!({"triplets": [{"aspect_term": "향", "aspect_ref": "본품#품질", "polarity": "negative"}]}),
            )
            .respond("extraction:implicit", json!({"triplets": []}))
            .respond(
                "extraction:literal",
                json!({"triplets": [{"aspect_term": "용기", "polarity": "positive"}]}),
            );
        let vocab = ReferenceVocabulary::default();
        let extractor = PerspectiveExtractor::new(&scripted, &vocab, 1);

        let extractions = extractor.extract("향은 별로인데 용기는 예뻐요").await.unwrap();

        let order: Vec<String> = scripted.calls().iter().map(|t| t.key()).collect();
        assert_eq!(
            order,
            vec!["extraction:negation", "extraction:implicit", "extraction:literal"]
        );
        assert_eq!(extractions.len(), 2);
        assert_eq!(extractions[0].origin, "negation");
        assert_eq!(extractions[1].origin, "literal");
        assert_eq!(extractions[1].triplet.aspect_term.as_deref(), Some("용기"));
    }

    #[test]
    fn test_request_lists_vocabulary() {
        let scripted = ScriptedAdjudicator::new();
        let vocab = ReferenceVocabulary::default();
        let extractor = PerspectiveExtractor::new(&scripted, &vocab, 1);
        let request = extractor.build_request(Perspective::Implicit, "금방 닳아요");
        assert_eq!(request.context["text"], "금방 닳아요");
        assert!(request.context["references"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "본품#품질"));
        assert!(request.instructions.contains("Implicit aspects"));
    }
}

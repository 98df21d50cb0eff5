//! Instruction text for each adjudication request.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever instruction content
//! changes. The version is recorded in every audit so a decision can be traced
//! back to the instructions that produced its votes.

use crate::review::Actor;

/// Prompt version. Bump on any instruction change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Shared vocabulary block appended to review and recheck instructions.
const ACTION_VOCABULARY: &str = "\
## Actions
- KEEP: the tuple is correct as extracted.
- DROP: the tuple should be removed (give WEAK_EVIDENCE or REDUNDANT_UPPER_REF when applicable).
- FLIP: the polarity is wrong. `new_value` MUST hold the corrected polarity \
(positive, negative, neutral, mixed).
- MERGE: the reference should be normalized. `new_value` MUST hold the normalized \
entity#attribute reference.
- FLAG: you cannot decide; leave a signal for human audit.

Every action MUST list the affected `target_tuple_ids` exactly as given. Never invent ids.

## Reason codes
NEGATION_SCOPE, CONTRAST_CLAUSE, STRUCTURAL_INCONSISTENT, WEAK_EVIDENCE, \
REDUNDANT_UPPER_REF, EVIDENCE_SUPPORTED, IMPLICIT_ASPECT, DUPLICATE_TUPLE, \
INVALID_TARGET, REF_NORMALIZATION, POLARITY_UNCERTAIN, OTHER";

/// Extraction instructions for one perspective.
pub fn extraction_instructions(perspective_focus: &str) -> String {
    format!(
        "\
You extract aspect-based sentiment triplets from a product review.

## Your perspective
{perspective_focus}

## Output
Return every (aspect_term, aspect_ref, polarity) triplet you find. `aspect_term` is \
the exact surface phrase naming the target (empty for implicit aspects). `aspect_ref` \
is an entity#attribute reference from the closed vocabulary in the context. `polarity` \
is one of positive, negative, neutral, mixed. Quote the supporting text in `evidence` \
and give character offsets in `span` when you can."
    )
}

/// Review instructions for one reviewer role.
pub fn review_instructions(reviewer: Actor) -> String {
    format!(
        "\
You are reviewer {reviewer} on an annotation review panel. Three reviewers judge the \
same candidate tuples independently; you will not see the other reviews.

## Your focus
{focus}

## Input
The context lists the candidate tuples, the conflicts detected between them, any \
structural-risk annotations, and an optional memory advisory from earlier samples. \
Treat the memory advisory as a hint, never as evidence.

Only return actions for tuples you want to change or flag. Tuples you do not \
mention are kept.

{ACTION_VOCABULARY}",
        focus = reviewer.focus(),
    )
}

/// Recheck instructions for one escalated conflict group.
pub fn recheck_instructions(trigger: &str) -> String {
    format!(
        "\
You are the final adjudicator for a conflict group the review panel could not settle \
({trigger}). The context holds the conflicting candidate tuples and each reviewer's \
prior vote per tuple (a missing review counts as KEEP).

Return exactly ONE action that applies to the whole group. MERGE is not accepted at \
this stage; choose KEEP if the references only need normalization.

{ACTION_VOCABULARY}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_instructions_name_reviewer_and_focus() {
        let text = review_instructions(Actor::C);
        assert!(text.contains("reviewer C"));
        assert!(text.contains("granularity"));
        assert!(text.contains("FLIP"));
    }

    #[test]
    fn test_recheck_instructions_forbid_merge() {
        let text = recheck_instructions("FORMAT_INCOMPLETE");
        assert!(text.contains("FORMAT_INCOMPLETE"));
        assert!(text.contains("exactly ONE action"));
        assert!(text.contains("MERGE is not accepted"));
    }
}

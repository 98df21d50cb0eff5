//! Closed-vocabulary aspect references
//!
//! References have the shape `entity#attribute`. Validity is checked against
//! an explicit reference list plus an entity → attribute allow-list; the
//! granularity detector additionally needs to know which entities are "upper"
//! (whole-product level).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Entity/attribute halves of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefParts<'a> {
    pub entity: &'a str,
    pub attribute: &'a str,
}

/// Split a reference into entity and attribute.
///
/// Splits on the last `#`; references without `#` fall back to the last `/`.
/// Entities such as `패키지/구성품` contain a slash themselves, so `#` wins.
pub fn split_reference(reference: &str) -> Option<RefParts<'_>> {
    let reference = reference.trim();
    let (entity, attribute) = reference
        .rsplit_once('#')
        .or_else(|| reference.rsplit_once('/'))?;
    let entity = entity.trim();
    let attribute = attribute.trim();
    if entity.is_empty() || attribute.is_empty() {
        return None;
    }
    Some(RefParts { entity, attribute })
}

/// The closed reference vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceVocabulary {
    /// Explicitly allowed `entity#attribute` strings
    pub references: BTreeSet<String>,
    /// Entity → allowed attributes
    pub attributes: BTreeMap<String, BTreeSet<String>>,
    /// Whole-product level entities used by the granularity detector
    pub upper_entities: BTreeSet<String>,
}

impl ReferenceVocabulary {
    /// Korean product-review vocabulary.
    pub fn korean_product_reviews() -> Self {
        let table: [(&str, &[&str]); 4] = [
            (
                "제품 전체",
                &["일반", "가격", "디자인", "품질", "편의성", "인지도"],
            ),
            (
                "본품",
                &["일반", "디자인", "품질", "편의성", "다양성", "가격", "인지도"],
            ),
            (
                "패키지/구성품",
                &["일반", "디자인", "품질", "편의성", "다양성", "가격"],
            ),
            ("브랜드", &["일반", "가격", "디자인", "품질", "인지도"]),
        ];

        let attributes: BTreeMap<String, BTreeSet<String>> = table
            .iter()
            .map(|(entity, attrs)| {
                (
                    entity.to_string(),
                    attrs.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();

        let references = attributes
            .iter()
            .flat_map(|(entity, attrs)| attrs.iter().map(move |a| format!("{}#{}", entity, a)))
            .collect();

        Self {
            references,
            attributes,
            upper_entities: BTreeSet::from(["제품 전체".to_string()]),
        }
    }

    /// Whether a non-empty reference belongs to the vocabulary.
    pub fn contains(&self, reference: &str) -> bool {
        let reference = reference.trim();
        if self.references.contains(reference) {
            return true;
        }
        match split_reference(reference) {
            Some(parts) => self
                .attributes
                .get(parts.entity)
                .is_some_and(|attrs| attrs.contains(parts.attribute)),
            None => false,
        }
    }

    pub fn is_upper_entity(&self, entity: &str) -> bool {
        self.upper_entities.contains(entity.trim())
    }
}

impl Default for ReferenceVocabulary {
    fn default() -> Self {
        Self::korean_product_reviews()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prefers_hash() {
        let parts = split_reference("패키지/구성품#디자인").unwrap();
        assert_eq!(parts.entity, "패키지/구성품");
        assert_eq!(parts.attribute, "디자인");
    }

    #[test]
    fn test_split_falls_back_to_slash() {
        let parts = split_reference("product/price").unwrap();
        assert_eq!(parts.entity, "product");
        assert_eq!(parts.attribute, "price");
        assert!(split_reference("nohalves").is_none());
        assert!(split_reference("#일반").is_none());
    }

    #[test]
    fn test_default_vocabulary_membership() {
        let vocab = ReferenceVocabulary::default();
        assert!(vocab.contains("제품 전체#일반"));
        assert!(vocab.contains(" 본품#품질 "));
        assert!(!vocab.contains("본품#맛"));
        assert!(!vocab.contains("A#x"));
        assert!(vocab.is_upper_entity("제품 전체"));
        assert!(!vocab.is_upper_entity("본품"));
    }

    #[test]
    fn test_allow_list_accepts_unlisted_reference() {
        let mut vocab = ReferenceVocabulary::default();
        vocab.references.clear();
        assert!(vocab.contains("브랜드#인지도"));
    }
}

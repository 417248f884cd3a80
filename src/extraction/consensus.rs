//! Field-by-field consensus across strategy outputs, plus application of the
//! optional self-critique pass.

use crate::backend::RawCritique;
use crate::document::DocumentType;
use crate::extraction::strategy::ExtractionStrategy;
use crate::extraction::types::{ExtractedField, ExtractionResult};
use crate::TARGET_EXTRACTION;
use std::collections::HashSet;
use tracing::{debug, info};

pub const CRITIQUE_SOURCE: &str = "critique";

/// What happened to each correction the critique pass proposed. Explicit
/// variants so every branch of the overwrite policy is testable.
#[derive(Debug, Clone, PartialEq)]
pub enum CritiqueOutcome {
    /// The correction was more confident than the existing field and
    /// overwrote it.
    Applied {
        field: String,
        previous_confidence: f32,
        confidence: f32,
    },
    /// The existing field was at least as confident; the correction was
    /// discarded. High-confidence data is never blindly overwritten.
    RejectedNotMoreConfident {
        field: String,
        existing: f32,
        proposed: f32,
    },
    /// The critique surfaced a field the extraction missed entirely.
    AddedMissingField { field: String, confidence: f32 },
}

/// Merge per-strategy results (≥1) into a single candidate result.
///
/// Per field the highest confidence wins; an exact tie goes to the strategy
/// earlier in the configured order, never to chance. Fields present in only
/// one output carry through unchanged. Family members are unioned by
/// identity; history records by content.
pub fn merge_strategies(
    results: Vec<(ExtractionStrategy, ExtractionResult)>,
    document_type: DocumentType,
) -> ExtractionResult {
    let mut merged = ExtractionResult::new(document_type);
    let mut seen_members = HashSet::new();
    let mut seen_history = HashSet::new();

    // Results arrive in configured strategy order, so a strictly-greater
    // comparison makes the earlier strategy win ties.
    for (_strategy, result) in results {
        for (name, field) in result.fields {
            match merged.fields.get(&name) {
                Some(existing) if existing.confidence >= field.confidence => {
                    debug!(
                        target: TARGET_EXTRACTION,
                        "Keeping {} from {} ({:.2} >= {:.2})",
                        name, existing.source_strategy, existing.confidence, field.confidence
                    );
                }
                _ => {
                    merged.fields.insert(name, field);
                }
            }
        }

        for member in result.family_members {
            if seen_members.insert(member.identity_key()) {
                merged.family_members.push(member);
            }
        }

        for (category, records) in result.history {
            for record in records {
                let mut field_pairs: Vec<(String, String)> = record
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                field_pairs.sort();
                let key = (
                    category,
                    record.from_date.clone(),
                    record.to_date.clone(),
                    field_pairs,
                );
                if seen_history.insert(key) {
                    merged.history.entry(category).or_default().push(record);
                }
            }
        }
    }

    merged.recompute_confidence();

    info!(
        target: TARGET_EXTRACTION,
        "Consensus: {} fields, {} family members (confidence {:.2})",
        merged.fields.len(),
        merged.family_members.len(),
        merged.confidence
    );

    merged
}

/// Apply a critique pass to the merged result. A correction overwrites a
/// field only when it is strictly more confident than what it replaces;
/// fields the extraction missed are added outright. Applied corrections set
/// `was_corrected` and re-tag provenance.
pub fn apply_critique(result: &mut ExtractionResult, critique: RawCritique) -> Vec<CritiqueOutcome> {
    let mut outcomes = Vec::with_capacity(critique.corrections.len());

    for correction in critique.corrections {
        let outcome = match result.fields.get(&correction.field) {
            Some(existing) if correction.confidence > existing.confidence => {
                let previous = existing.confidence;
                let mut field = ExtractedField::new(
                    &correction.field,
                    &correction.value,
                    correction.confidence,
                    CRITIQUE_SOURCE,
                );
                field.was_corrected = true;
                result.fields.insert(correction.field.clone(), field);
                CritiqueOutcome::Applied {
                    field: correction.field,
                    previous_confidence: previous,
                    confidence: correction.confidence,
                }
            }
            Some(existing) => CritiqueOutcome::RejectedNotMoreConfident {
                field: correction.field,
                existing: existing.confidence,
                proposed: correction.confidence,
            },
            None => {
                let mut field = ExtractedField::new(
                    &correction.field,
                    &correction.value,
                    correction.confidence,
                    CRITIQUE_SOURCE,
                );
                field.was_corrected = true;
                result.fields.insert(correction.field.clone(), field);
                CritiqueOutcome::AddedMissingField {
                    field: correction.field,
                    confidence: correction.confidence,
                }
            }
        };
        outcomes.push(outcome);
    }

    result.recompute_confidence();
    outcomes
}

/// Count of corrections that changed the result (applied or added).
pub fn corrections_applied(outcomes: &[CritiqueOutcome]) -> u32 {
    outcomes
        .iter()
        .filter(|o| !matches!(o, CritiqueOutcome::RejectedNotMoreConfident { .. }))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawCorrection;
    use crate::extraction::types::{FamilyMemberCandidate, Relationship};

    fn result_with(
        strategy: &str,
        fields: &[(&str, &str, f32)],
    ) -> ExtractionResult {
        let mut result = ExtractionResult::new(DocumentType::Questionnaire);
        for (name, value, confidence) in fields {
            result.fields.insert(
                name.to_string(),
                ExtractedField::new(name, value, *confidence, strategy),
            );
        }
        result.recompute_confidence();
        result
    }

    #[test]
    fn test_higher_confidence_wins() {
        let a = result_with("structured", &[("date_of_birth", "1990-01-15", 0.95)]);
        let b = result_with("narrative", &[("date_of_birth", "1990-01-16", 0.60)]);

        let merged = merge_strategies(
            vec![
                (ExtractionStrategy::Structured, a),
                (ExtractionStrategy::Narrative, b),
            ],
            DocumentType::Questionnaire,
        );

        let field = &merged.fields["date_of_birth"];
        assert_eq!(field.value, "1990-01-15");
        assert!((field.confidence - 0.95).abs() < 1e-6);
        assert_eq!(field.source_strategy, "structured");
    }

    #[test]
    fn test_exact_tie_prefers_earlier_strategy() {
        let a = result_with("structured", &[("city", "Astoria", 0.8)]);
        let b = result_with("narrative", &[("city", "Astor1a", 0.8)]);

        let merged = merge_strategies(
            vec![
                (ExtractionStrategy::Structured, a),
                (ExtractionStrategy::Narrative, b),
            ],
            DocumentType::Questionnaire,
        );

        assert_eq!(merged.fields["city"].value, "Astoria");
        assert_eq!(merged.fields["city"].source_strategy, "structured");
    }

    #[test]
    fn test_merge_never_regresses_confidence() {
        let a = result_with(
            "structured",
            &[("first_name", "Amina", 0.7), ("last_name", "Diallo", 0.4)],
        );
        let b = result_with(
            "narrative",
            &[("first_name", "Amena", 0.6), ("last_name", "Dialo", 0.9)],
        );

        let merged = merge_strategies(
            vec![
                (ExtractionStrategy::Structured, a),
                (ExtractionStrategy::Narrative, b),
            ],
            DocumentType::Questionnaire,
        );

        // Chosen confidence per field is >= every losing candidate's.
        assert!((merged.fields["first_name"].confidence - 0.7).abs() < 1e-6);
        assert!((merged.fields["last_name"].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_fields_unique_to_one_strategy_carry_through() {
        let a = result_with("structured", &[("first_name", "Amina", 0.9)]);
        let b = result_with("narrative", &[("occupation", "Nurse", 0.75)]);

        let merged = merge_strategies(
            vec![
                (ExtractionStrategy::Structured, a),
                (ExtractionStrategy::Narrative, b),
            ],
            DocumentType::Questionnaire,
        );

        assert_eq!(merged.fields.len(), 2);
        assert_eq!(merged.fields["occupation"].value, "Nurse");
    }

    #[test]
    fn test_family_members_deduplicated_across_strategies() {
        let mut a = result_with("structured", &[]);
        let mut spouse = FamilyMemberCandidate::new(Relationship::Spouse, 0.9);
        spouse.fields.insert(
            "first_name".to_string(),
            ExtractedField::new("first_name", "Kofi", 0.9, "structured"),
        );
        a.family_members.push(spouse.clone());

        let mut b = result_with("narrative", &[]);
        b.family_members.push(spouse);

        let merged = merge_strategies(
            vec![
                (ExtractionStrategy::Structured, a),
                (ExtractionStrategy::Narrative, b),
            ],
            DocumentType::Questionnaire,
        );

        assert_eq!(merged.family_members.len(), 1);
    }

    #[test]
    fn test_critique_overwrites_only_when_more_confident() {
        let mut result = result_with("structured", &[("a_number", "123456789", 0.6)]);

        let critique = RawCritique {
            corrections: vec![RawCorrection {
                field: "a_number".to_string(),
                value: "128456789".to_string(),
                confidence: 0.9,
                reason: Some("8 misread as 3".to_string()),
            }],
        };

        let outcomes = apply_critique(&mut result, critique);
        assert!(matches!(outcomes[0], CritiqueOutcome::Applied { .. }));
        let field = &result.fields["a_number"];
        assert_eq!(field.value, "128456789");
        assert!(field.was_corrected);
        assert_eq!(field.source_strategy, CRITIQUE_SOURCE);
        assert_eq!(corrections_applied(&outcomes), 1);
    }

    #[test]
    fn test_critique_never_overwrites_higher_confidence() {
        let mut result = result_with("structured", &[("a_number", "123456789", 0.95)]);

        // Equal confidence must also be rejected: overwrite requires
        // strictly greater.
        for proposed in [0.5, 0.95] {
            let critique = RawCritique {
                corrections: vec![RawCorrection {
                    field: "a_number".to_string(),
                    value: "999999999".to_string(),
                    confidence: proposed,
                    reason: None,
                }],
            };
            let outcomes = apply_critique(&mut result, critique);
            assert!(matches!(
                outcomes[0],
                CritiqueOutcome::RejectedNotMoreConfident { .. }
            ));
        }

        let field = &result.fields["a_number"];
        assert_eq!(field.value, "123456789");
        assert!(!field.was_corrected);
        assert!((field.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_critique_adds_missing_field() {
        let mut result = result_with("structured", &[]);

        let critique = RawCritique {
            corrections: vec![RawCorrection {
                field: "middle_name".to_string(),
                value: "Rose".to_string(),
                confidence: 0.8,
                reason: Some("visible in section 1 but not extracted".to_string()),
            }],
        };

        let outcomes = apply_critique(&mut result, critique);
        assert!(matches!(
            outcomes[0],
            CritiqueOutcome::AddedMissingField { .. }
        ));
        assert!(result.fields["middle_name"].was_corrected);
    }
}

//! Conversion from the backend's wire shapes into the working model. The
//! backend's JSON is treated as untrusted: unknown relationships and
//! categories are dropped with a log line instead of aborting the strategy.

use crate::backend::{RawExtraction, RawFamilyMember, RawHistoryRecord};
use crate::document::DocumentType;
use crate::extraction::types::{
    ExtractedField, ExtractionResult, FamilyMemberCandidate, HistoryCategory, HistoryRecord,
    Relationship,
};
use crate::TARGET_EXTRACTION;
use tracing::{debug, warn};

/// Build an [`ExtractionResult`] from one strategy's raw output.
pub fn from_raw(
    raw: RawExtraction,
    document_type: DocumentType,
    source_strategy: &str,
) -> ExtractionResult {
    let mut result = ExtractionResult::new(document_type);

    for field in raw.fields {
        if field.name.trim().is_empty() || field.value.trim().is_empty() {
            continue;
        }
        result.fields.insert(
            field.name.clone(),
            ExtractedField::new(&field.name, &field.value, field.confidence, source_strategy),
        );
    }

    for member in raw.family_members {
        match parse_family_member(&member, source_strategy) {
            Some(candidate) => result.family_members.push(candidate),
            None => {
                warn!(
                    target: TARGET_EXTRACTION,
                    "Dropping family member with unrecognized relationship '{}'",
                    member.relationship
                );
            }
        }
    }

    for record in raw.history {
        match parse_history_record(&record) {
            Some((category, parsed)) => {
                result.history.entry(category).or_default().push(parsed);
            }
            None => {
                warn!(
                    target: TARGET_EXTRACTION,
                    "Dropping history record with unrecognized category '{}'",
                    record.category
                );
            }
        }
    }

    result.recompute_confidence();

    debug!(
        target: TARGET_EXTRACTION,
        "Parsed {} fields, {} family members, {} history categories from {} strategy",
        result.fields.len(),
        result.family_members.len(),
        result.history.len(),
        source_strategy
    );

    result
}

fn parse_family_member(
    member: &RawFamilyMember,
    source_strategy: &str,
) -> Option<FamilyMemberCandidate> {
    let relationship = Relationship::parse(&member.relationship)?;
    let mut candidate = FamilyMemberCandidate::new(relationship, member.confidence);

    for field in &member.fields {
        if field.name.trim().is_empty() || field.value.trim().is_empty() {
            continue;
        }
        candidate.fields.insert(
            field.name.clone(),
            ExtractedField::new(&field.name, &field.value, field.confidence, source_strategy),
        );
    }

    Some(candidate)
}

fn parse_history_record(record: &RawHistoryRecord) -> Option<(HistoryCategory, HistoryRecord)> {
    let category = HistoryCategory::parse(&record.category)?;

    // "present" and empty both mean the record is current.
    let to_date = record.to_date.as_ref().and_then(|d| {
        let trimmed = d.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("present") {
            None
        } else {
            Some(trimmed.to_string())
        }
    });

    let parsed = HistoryRecord {
        category,
        fields: record
            .fields
            .iter()
            .filter(|f| !f.value.trim().is_empty())
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect(),
        from_date: record.from_date.clone().filter(|d| !d.trim().is_empty()),
        to_date,
    };

    Some((category, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawField;

    fn raw_field(name: &str, value: &str, confidence: f32) -> RawField {
        RawField {
            name: name.to_string(),
            value: value.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_from_raw_builds_fields_and_tags_strategy() {
        let raw = RawExtraction {
            confidence: 0.9,
            fields: vec![
                raw_field("first_name", "Amina", 0.95),
                raw_field("empty", "", 0.9),
            ],
            ..Default::default()
        };

        let result = from_raw(raw, DocumentType::Questionnaire, "structured");
        assert_eq!(result.fields.len(), 1);
        let field = &result.fields["first_name"];
        assert_eq!(field.source_strategy, "structured");
        assert!(!field.was_corrected);
    }

    #[test]
    fn test_unknown_relationship_is_dropped() {
        let raw = RawExtraction {
            family_members: vec![RawFamilyMember {
                relationship: "roommate".to_string(),
                fields: vec![raw_field("first_name", "Bob", 0.9)],
                confidence: 0.9,
                verified: None,
                reason: None,
            }],
            ..Default::default()
        };

        let result = from_raw(raw, DocumentType::Questionnaire, "structured");
        assert!(result.family_members.is_empty());
    }

    #[test]
    fn test_present_to_date_maps_to_none() {
        let raw = RawExtraction {
            history: vec![RawHistoryRecord {
                category: "address".to_string(),
                fields: vec![raw_field("city", "Queens", 0.9)],
                from_date: Some("2019-03-01".to_string()),
                to_date: Some("Present".to_string()),
            }],
            ..Default::default()
        };

        let result = from_raw(raw, DocumentType::Questionnaire, "structured");
        let records = &result.history[&HistoryCategory::Address];
        assert_eq!(records.len(), 1);
        assert!(records[0].is_current());
        assert_eq!(records[0].from_date.as_deref(), Some("2019-03-01"));
    }
}

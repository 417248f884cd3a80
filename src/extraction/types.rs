use crate::document::DocumentType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Relationship of a family member candidate to the primary subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    Spouse,
    Child,
    Father,
    Mother,
    Sibling,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relationship::Spouse => write!(f, "spouse"),
            Relationship::Child => write!(f, "child"),
            Relationship::Father => write!(f, "father"),
            Relationship::Mother => write!(f, "mother"),
            Relationship::Sibling => write!(f, "sibling"),
        }
    }
}

impl Relationship {
    /// Parse a relationship as the backend writes it. `parent` is mapped to
    /// `Father` only when the wire says so explicitly; unknown strings are
    /// rejected so hallucinated relationships don't slip in.
    pub fn parse(s: &str) -> Option<Relationship> {
        match s.to_lowercase().as_str() {
            "spouse" | "husband" | "wife" => Some(Relationship::Spouse),
            "child" | "son" | "daughter" => Some(Relationship::Child),
            "father" => Some(Relationship::Father),
            "mother" => Some(Relationship::Mother),
            "sibling" | "brother" | "sister" => Some(Relationship::Sibling),
            _ => None,
        }
    }
}

/// History record categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryCategory {
    Address,
    Employment,
    Education,
    Travel,
    Criminal,
}

impl fmt::Display for HistoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryCategory::Address => write!(f, "address"),
            HistoryCategory::Employment => write!(f, "employment"),
            HistoryCategory::Education => write!(f, "education"),
            HistoryCategory::Travel => write!(f, "travel"),
            HistoryCategory::Criminal => write!(f, "criminal"),
        }
    }
}

impl HistoryCategory {
    pub fn parse(s: &str) -> Option<HistoryCategory> {
        match s.to_lowercase().as_str() {
            "address" => Some(HistoryCategory::Address),
            "employment" => Some(HistoryCategory::Employment),
            "education" => Some(HistoryCategory::Education),
            "travel" => Some(HistoryCategory::Travel),
            "criminal" => Some(HistoryCategory::Criminal),
            _ => None,
        }
    }
}

/// One extracted value with its provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: f32,
    /// Which prompting strategy produced the surviving value.
    pub source_strategy: String,
    /// Set when the self-critique pass overwrote the value.
    pub was_corrected: bool,
}

impl ExtractedField {
    pub fn new(name: &str, value: &str, confidence: f32, source_strategy: &str) -> Self {
        ExtractedField {
            name: name.to_string(),
            value: value.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            source_strategy: source_strategy.to_string(),
            was_corrected: false,
        }
    }
}

/// A family member found on the form. `verified` is set by the second-pass
/// verifier; `match_result` and `action` only by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMemberCandidate {
    pub relationship: Relationship,
    pub fields: HashMap<String, ExtractedField>,
    pub confidence: f32,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_result: Option<crate::reconcile::matching::MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<crate::reconcile::matching::MemberAction>,
    /// Candidate records kept for manual resolution when matching was
    /// ambiguous (`action == Skip`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_matches: Vec<crate::reconcile::matching::MatchResult>,
}

impl FamilyMemberCandidate {
    pub fn new(relationship: Relationship, confidence: f32) -> Self {
        FamilyMemberCandidate {
            relationship,
            fields: HashMap::new(),
            confidence,
            verified: false,
            match_result: None,
            action: None,
            ambiguous_matches: Vec::new(),
        }
    }

    pub fn field_value(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|f| f.value.as_str())
    }

    pub fn display_name(&self) -> String {
        let first = self.field_value("first_name").unwrap_or("?");
        let last = self.field_value("last_name").unwrap_or("?");
        format!("{} {}", first, last)
    }

    /// Candidates from different strategies describe the same person when
    /// relationship and both names agree.
    pub fn identity_key(&self) -> (Relationship, String, String) {
        (
            self.relationship,
            self.field_value("first_name").unwrap_or("").to_lowercase(),
            self.field_value("last_name").unwrap_or("").to_lowercase(),
        )
    }
}

/// One dated history entry. Immutable once extracted; `to_date == None`
/// means the record is current ("present" on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub category: HistoryCategory,
    pub fields: HashMap<String, String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl HistoryRecord {
    pub fn is_current(&self) -> bool {
        self.to_date.is_none()
    }
}

/// Quality metrics accumulated across a refinement run; handed to the review
/// surface alongside the change-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    pub iterations: u32,
    pub total_backend_calls: u32,
    pub strategies_used: Vec<String>,
    pub critique_corrections: u32,
    pub validation_errors_initial: u32,
    pub validation_errors_final: u32,
    pub low_confidence_fields_initial: u32,
    pub low_confidence_fields_final: u32,
    pub family_members_verified: u32,
}

/// The working state of one document's extraction. Created once per document,
/// mutated in place across refinement iterations, finalized when the
/// orchestrator terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_type: DocumentType,
    pub fields: HashMap<String, ExtractedField>,
    pub family_members: Vec<FamilyMemberCandidate>,
    pub history: HashMap<HistoryCategory, Vec<HistoryRecord>>,
    pub confidence: f32,
}

impl ExtractionResult {
    pub fn new(document_type: DocumentType) -> Self {
        ExtractionResult {
            document_type,
            fields: HashMap::new(),
            family_members: Vec::new(),
            history: HashMap::new(),
            confidence: 0.0,
        }
    }

    pub fn field_value(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|f| f.value.as_str())
    }

    /// Insert or replace a field, keeping aggregate confidence current.
    pub fn set_field(&mut self, field: ExtractedField) {
        self.fields.insert(field.name.clone(), field);
        self.recompute_confidence();
    }

    /// Aggregate confidence is always derived from the current fields; it is
    /// recomputed after every mutation rather than cached.
    pub fn recompute_confidence(&mut self) {
        if self.fields.is_empty() {
            self.confidence = 0.0;
            return;
        }
        let total: f32 = self.fields.values().map(|f| f.confidence).sum();
        self.confidence = total / self.fields.len() as f32;
    }

    /// Field keys below the given confidence, lowest first. Ordering is
    /// stable by key for equal confidences so re-extraction is deterministic.
    pub fn low_confidence_fields(&self, threshold: f32) -> Vec<&ExtractedField> {
        let mut low: Vec<&ExtractedField> = self
            .fields
            .values()
            .filter(|f| f.confidence < threshold)
            .collect();
        low.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_parsing() {
        assert_eq!(Relationship::parse("Spouse"), Some(Relationship::Spouse));
        assert_eq!(Relationship::parse("wife"), Some(Relationship::Spouse));
        assert_eq!(Relationship::parse("daughter"), Some(Relationship::Child));
        assert_eq!(Relationship::parse("cousin"), None);
    }

    #[test]
    fn test_confidence_is_recomputed_from_fields() {
        let mut result = ExtractionResult::new(DocumentType::Questionnaire);
        result.set_field(ExtractedField::new("first_name", "Amina", 0.9, "structured"));
        result.set_field(ExtractedField::new("last_name", "Diallo", 0.7, "structured"));
        assert!((result.confidence - 0.8).abs() < 1e-6);

        // Mutating a single field must be reflected in the aggregate.
        result.set_field(ExtractedField::new("last_name", "Diallo", 0.3, "narrative"));
        assert!((result.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_low_confidence_ordering() {
        let mut result = ExtractionResult::new(DocumentType::Questionnaire);
        result.set_field(ExtractedField::new("a", "1", 0.5, "structured"));
        result.set_field(ExtractedField::new("b", "2", 0.2, "structured"));
        result.set_field(ExtractedField::new("c", "3", 0.9, "structured"));
        let low: Vec<&str> = result
            .low_confidence_fields(0.7)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(low, vec!["b", "a"]);
    }

    #[test]
    fn test_history_present_handling() {
        let record = HistoryRecord {
            category: HistoryCategory::Address,
            fields: HashMap::new(),
            from_date: Some("2020-01-01".to_string()),
            to_date: None,
        };
        assert!(record.is_current());
    }
}

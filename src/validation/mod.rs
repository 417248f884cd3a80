//! Logical consistency checks over a merged extraction. The validator is a
//! read-only consumer: it never mutates the result, and it produces a fresh
//! issue list on every pass. Errors drive the refinement loop; warnings are
//! surfaced to the reviewer and tolerated.

use crate::config::{DocumentTypeConfig, DATE_FIELD_KEYS};
use crate::dates::parse_date;
use crate::extraction::types::ExtractionResult;
use chrono::{Datelike, Local, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// The confidence floor below which a present field is flagged. Shared with
/// the refinement loop's re-extraction trigger.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^A?(\d{9})$").unwrap();
    static ref DIGIT_RE: Regex = Regex::new(r"\d").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One finding from a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field_name: Option<String>,
    pub code: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn error(field: &str, code: &'static str, message: String) -> Self {
        ValidationIssue {
            severity: Severity::Error,
            field_name: Some(field.to_string()),
            code,
            message,
        }
    }

    fn warning(field: &str, code: &'static str, message: String) -> Self {
        ValidationIssue {
            severity: Severity::Warning,
            field_name: Some(field.to_string()),
            code,
            message,
        }
    }
}

/// Count of error-severity issues in a list.
pub fn error_count(issues: &[ValidationIssue]) -> usize {
    issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count()
}

/// Fields implicated by error-severity issues, in issue order.
pub fn fields_with_errors(issues: &[ValidationIssue]) -> Vec<String> {
    let mut fields = Vec::new();
    for issue in issues {
        if issue.severity == Severity::Error {
            if let Some(name) = &issue.field_name {
                if !fields.contains(name) {
                    fields.push(name.clone());
                }
            }
        }
    }
    fields
}

pub struct Validator {
    today: NaiveDate,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            today: Local::now().date_naive(),
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin "today" for deterministic tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Run every rule family over the result. All families always run; there
    /// is no short-circuiting, so the issue list is complete every pass.
    pub fn validate(
        &self,
        result: &ExtractionResult,
        config: &DocumentTypeConfig,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        self.check_required_fields(result, config, &mut issues);
        self.check_identifier_format(result, &mut issues);
        self.check_date_formats(result, &mut issues);
        self.check_date_consistency(result, &mut issues);
        self.check_name_sanity(result, &mut issues);
        self.check_family_members(result, &mut issues);
        self.check_history_records(result, &mut issues);

        issues
    }

    fn check_required_fields(
        &self,
        result: &ExtractionResult,
        config: &DocumentTypeConfig,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for key in &config.required {
            match result.fields.get(*key) {
                None => {
                    issues.push(ValidationIssue::error(
                        key,
                        "required_field_missing",
                        format!("Required field '{}' was not extracted", key),
                    ));
                }
                Some(field) if field.value.trim().is_empty() => {
                    issues.push(ValidationIssue::error(
                        key,
                        "required_field_missing",
                        format!("Required field '{}' is empty", key),
                    ));
                }
                Some(field) if field.confidence < CONFIDENCE_THRESHOLD => {
                    issues.push(ValidationIssue::warning(
                        key,
                        "required_field_low_confidence",
                        format!(
                            "Required field '{}' extracted with low confidence ({:.0}%)",
                            key,
                            field.confidence * 100.0
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
    }

    fn check_identifier_format(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        let Some(field) = result.fields.get("a_number") else {
            return;
        };
        let compact: String = field
            .value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_uppercase();

        if !IDENTIFIER_RE.is_match(&compact) {
            issues.push(ValidationIssue::error(
                "a_number",
                "invalid_identifier",
                format!(
                    "Invalid A-number '{}': expected 9 digits, optionally prefixed with 'A'",
                    field.value
                ),
            ));
        }
    }

    fn check_date_formats(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        for key in DATE_FIELD_KEYS {
            let Some(field) = result.fields.get(*key) else {
                continue;
            };
            if parse_date(&field.value).is_none() {
                issues.push(ValidationIssue::warning(
                    key,
                    "invalid_date_format",
                    format!("Date field '{}' has unrecognized format: '{}'", key, field.value),
                ));
            }
        }
    }

    fn check_date_consistency(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        let birth = result.field_value("date_of_birth").and_then(parse_date);

        let Some(birth) = birth else {
            return;
        };

        if birth > self.today {
            issues.push(ValidationIssue::error(
                "date_of_birth",
                "future_birth_date",
                format!("Date of birth {} is in the future", birth),
            ));
        }

        if self.today.year() - birth.year() > 120 {
            issues.push(ValidationIssue::error(
                "date_of_birth",
                "unreasonable_birth_date",
                format!("Date of birth {} is more than 120 years ago", birth),
            ));
        }

        if let Some(entry) = result.field_value("date_of_entry").and_then(parse_date) {
            if entry < birth {
                issues.push(ValidationIssue::error(
                    "date_of_entry",
                    "entry_before_birth",
                    format!("Date of entry {} precedes date of birth {}", entry, birth),
                ));
            }
        }

        if let Some(marriage) = result.field_value("date_of_marriage").and_then(parse_date) {
            if marriage < birth {
                issues.push(ValidationIssue::error(
                    "date_of_marriage",
                    "marriage_before_birth",
                    format!(
                        "Date of marriage {} precedes date of birth {}",
                        marriage, birth
                    ),
                ));
            }
        }

        // History from-dates, categories in a fixed order for determinism.
        let mut categories: Vec<_> = result.history.keys().copied().collect();
        categories.sort_by_key(|c| c.to_string());
        for category in categories {
            for (index, record) in result.history[&category].iter().enumerate() {
                if let Some(from) = record.from_date.as_deref().and_then(parse_date) {
                    if from < birth {
                        issues.push(ValidationIssue::error(
                            "date_of_birth",
                            "history_before_birth",
                            format!(
                                "{} history record {} starts {} before date of birth {}",
                                category,
                                index + 1,
                                from,
                                birth
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_name_sanity(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        for key in ["first_name", "middle_name", "last_name"] {
            let Some(field) = result.fields.get(key) else {
                continue;
            };
            let value = field.value.trim();

            if DIGIT_RE.is_match(value) {
                issues.push(ValidationIssue::warning(
                    key,
                    "name_contains_digits",
                    format!("Name field '{}' contains digits: '{}'", key, value),
                ));
            }

            if value.len() > 2 && value.chars().all(|c| !c.is_lowercase()) {
                issues.push(ValidationIssue::warning(
                    key,
                    "name_all_caps",
                    format!("Name field '{}' is all uppercase: '{}'", key, value),
                ));
            }
        }

        // Swap heuristic: a very short surname next to a long given name is
        // a common sign the two were transposed on the form. Warning only.
        if let (Some(first), Some(last)) = (
            result.field_value("first_name"),
            result.field_value("last_name"),
        ) {
            if last.trim().len() < 3 && first.trim().len() > 5 {
                issues.push(ValidationIssue::warning(
                    "first_name",
                    "possible_name_swap",
                    format!("First and last names may be swapped: '{} {}'", first, last),
                ));
            }
        }
    }

    fn check_family_members(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        for (index, member) in result.family_members.iter().enumerate() {
            let has_name = member.field_value("first_name").is_some()
                || member.field_value("last_name").is_some();
            let field_ref = format!("family_members[{}]", index);

            if !has_name {
                issues.push(ValidationIssue::warning(
                    &field_ref,
                    "family_member_no_name",
                    format!("Family member {} ({}) has no name", index + 1, member.relationship),
                ));
            }

            if member.confidence < CONFIDENCE_THRESHOLD {
                issues.push(ValidationIssue::warning(
                    &field_ref,
                    "family_member_low_confidence",
                    format!(
                        "Low confidence ({:.0}%) on family member: {}",
                        member.confidence * 100.0,
                        member.relationship
                    ),
                ));
            }
        }
    }

    fn check_history_records(&self, result: &ExtractionResult, issues: &mut Vec<ValidationIssue>) {
        let mut categories: Vec<_> = result.history.keys().copied().collect();
        categories.sort_by_key(|c| c.to_string());

        for category in categories {
            for (index, record) in result.history[&category].iter().enumerate() {
                if record.fields.is_empty() {
                    issues.push(ValidationIssue::warning(
                        &format!("history.{}[{}]", category, index),
                        "empty_history_record",
                        format!("Empty {} history record at position {}", category, index + 1),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document_config;
    use crate::document::DocumentType;
    use crate::extraction::types::{ExtractedField, HistoryCategory, HistoryRecord};
    use std::collections::HashMap;

    fn validator() -> Validator {
        Validator::new().with_today(NaiveDate::from_ymd_opt(2026, 8, 6).unwrap())
    }

    fn base_result() -> ExtractionResult {
        let mut result = ExtractionResult::new(DocumentType::Questionnaire);
        for (name, value) in [
            ("first_name", "Amina"),
            ("last_name", "Diallo"),
            ("date_of_birth", "1990-01-15"),
            ("country_of_birth", "Guinea"),
        ] {
            result.set_field(ExtractedField::new(name, value, 0.9, "structured"));
        }
        result
    }

    #[test]
    fn test_clean_result_has_no_errors() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let issues = validator().validate(&base_result(), config);
        assert_eq!(error_count(&issues), 0, "unexpected issues: {:?}", issues);
    }

    #[test]
    fn test_missing_required_field_is_exactly_one_error() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.fields.remove("date_of_birth");

        let issues = validator().validate(&result, config);
        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "required_field_missing");
        assert_eq!(errors[0].field_name.as_deref(), Some("date_of_birth"));
    }

    #[test]
    fn test_low_confidence_required_field_is_warning_not_error() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.set_field(ExtractedField::new(
            "date_of_birth",
            "1990-01-15",
            0.5,
            "structured",
        ));

        let issues = validator().validate(&result, config);
        assert_eq!(error_count(&issues), 0);
        assert!(issues
            .iter()
            .any(|i| i.code == "required_field_low_confidence"));

        // At exactly the threshold the field passes without any issue.
        let mut at_threshold = base_result();
        at_threshold.set_field(ExtractedField::new(
            "date_of_birth",
            "1990-01-15",
            CONFIDENCE_THRESHOLD,
            "structured",
        ));
        let issues = validator().validate(&at_threshold, config);
        assert!(!issues
            .iter()
            .any(|i| i.code == "required_field_low_confidence"));
    }

    #[test]
    fn test_malformed_identifier_carries_value_in_message() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.set_field(ExtractedField::new("a_number", "A12B45", 0.9, "structured"));

        let issues = validator().validate(&result, config);
        let issue = issues
            .iter()
            .find(|i| i.code == "invalid_identifier")
            .expect("identifier error");
        assert_eq!(issue.severity, Severity::Error);
        assert!(issue.message.contains("A12B45"));
    }

    #[test]
    fn test_valid_identifier_shapes_pass() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        for value in ["A123456789", "123456789", "a123-456-789"] {
            let mut result = base_result();
            result.set_field(ExtractedField::new("a_number", value, 0.9, "structured"));
            let issues = validator().validate(&result, config);
            assert!(
                !issues.iter().any(|i| i.code == "invalid_identifier"),
                "'{}' should be accepted",
                value
            );
        }
    }

    #[test]
    fn test_entry_before_birth_is_error() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.set_field(ExtractedField::new(
            "date_of_entry",
            "1985-06-01",
            0.9,
            "structured",
        ));

        let issues = validator().validate(&result, config);
        assert!(issues
            .iter()
            .any(|i| i.code == "entry_before_birth" && i.severity == Severity::Error));
    }

    #[test]
    fn test_history_before_birth_is_error() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.history.insert(
            HistoryCategory::Employment,
            vec![HistoryRecord {
                category: HistoryCategory::Employment,
                fields: HashMap::from([("employer".to_string(), "Acme".to_string())]),
                from_date: Some("1980-01-01".to_string()),
                to_date: None,
            }],
        );

        let issues = validator().validate(&result, config);
        assert!(issues.iter().any(|i| i.code == "history_before_birth"));
    }

    #[test]
    fn test_all_caps_name_is_warning() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.set_field(ExtractedField::new("last_name", "DIALLO", 0.9, "structured"));

        let issues = validator().validate(&result, config);
        let issue = issues.iter().find(|i| i.code == "name_all_caps").unwrap();
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn test_validator_is_idempotent() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let mut result = base_result();
        result.fields.remove("country_of_birth");
        result.set_field(ExtractedField::new("a_number", "12345", 0.4, "structured"));
        result.set_field(ExtractedField::new(
            "date_of_entry",
            "1985-06-01",
            0.9,
            "structured",
        ));

        let validator = validator();
        let first = validator.validate(&result, config);
        let second = validator.validate(&result, config);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_validator_does_not_mutate_input() {
        let config = document_config(DocumentType::Questionnaire).unwrap();
        let result = base_result();
        let before = serde_json::to_string(&result).unwrap();
        let _ = validator().validate(&result, config);
        assert_eq!(serde_json::to_string(&result).unwrap(), before);
    }
}

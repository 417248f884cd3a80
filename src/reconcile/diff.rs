//! Field diffing and change-set assembly. The engine is strictly read-side:
//! it produces an immutable proposal that the external apply step consumes
//! after human approval, and it never touches the record store's write API.

use crate::config::{document_config, FieldDef};
use crate::error::PipelineError;
use crate::extraction::types::{
    ExtractionMetrics, ExtractionResult, FamilyMemberCandidate, HistoryRecord,
};
use crate::reconcile::matching::{MatchResult, Matcher, MemberMatch, PrimaryMatch};
use crate::reconcile::normalize::normalize_value;
use crate::store::{Record, RecordStore};
use crate::validation::ValidationIssue;
use crate::{RunParams, TARGET_RECONCILE};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Classification of one proposed field write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Modified,
    Unchanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::New => write!(f, "new"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Classify a proposed value against the current stored value. Pure: the
/// outcome depends only on the two values and the field's normalization.
pub fn classify(current: Option<&str>, proposed: &str, field: &FieldDef) -> ChangeKind {
    match current {
        None => ChangeKind::New,
        Some(current) if current.trim().is_empty() => ChangeKind::New,
        Some(current) => {
            if normalize_value(current, field.kind) == normalize_value(proposed, field.kind) {
                ChangeKind::Unchanged
            } else {
                ChangeKind::Modified
            }
        }
    }
}

/// One proposed change to the primary subject's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    pub label: String,
    /// Attribute name on the record store side.
    pub store_attribute: String,
    /// Whether the attribute belongs to the biographic record.
    pub biographic: bool,
    pub current_value: Option<String>,
    pub proposed_value: String,
    pub confidence: f32,
    pub classification: ChangeKind,
}

impl FieldChange {
    pub fn is_actual_change(&self) -> bool {
        self.classification != ChangeKind::Unchanged
    }
}

/// The full proposal for one document: primary-subject changes, family
/// member dispositions, history records, and the extraction's quality
/// metrics. Built once per reconciliation run and immutable afterwards.
#[derive(Debug, Serialize)]
pub struct ChangeSet {
    pub contact_id: Option<i64>,
    pub contact_name: String,
    pub document_type: String,
    pub source_name: String,
    pub extraction_confidence: f32,
    pub changes: Vec<FieldChange>,
    pub family_members: Vec<FamilyMemberCandidate>,
    pub history: Vec<HistoryRecord>,
    /// Candidate records for the primary subject when matching was
    /// ambiguous; the review surface disambiguates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_candidates: Vec<MatchResult>,
    pub metrics: ExtractionMetrics,
    pub validation_issues: Vec<ValidationIssue>,
}

impl ChangeSet {
    pub fn total_changes(&self) -> usize {
        self.changes.iter().filter(|c| c.is_actual_change()).count()
    }

    pub fn changes_of(&self, kind: ChangeKind) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(move |c| c.classification == kind)
    }
}

/// Matches the finalized extraction against the record store and produces
/// the change-set handed to the review surface.
pub struct ReconciliationEngine<'a> {
    store: &'a dyn RecordStore,
    params: &'a RunParams,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(store: &'a dyn RecordStore, params: &'a RunParams) -> Self {
        ReconciliationEngine { store, params }
    }

    pub async fn reconcile(
        &self,
        extraction: &ExtractionResult,
        source_name: &str,
        metrics: ExtractionMetrics,
        validation_issues: Vec<ValidationIssue>,
    ) -> Result<ChangeSet, PipelineError> {
        let config = document_config(extraction.document_type)?;
        let matcher = Matcher::new(self.store, self.params);

        let extracted_name = format!(
            "{}, {}",
            extraction.field_value("last_name").unwrap_or(""),
            extraction.field_value("first_name").unwrap_or("")
        );

        let (contact_id, contact_name, record, primary_candidates) =
            match matcher.match_primary(extraction).await {
                PrimaryMatch::Matched { result, record } => {
                    info!(
                        target: TARGET_RECONCILE,
                        "Primary subject matched record {} via {}",
                        result.candidate_record_id,
                        result.method
                    );
                    (
                        Some(record.id),
                        record.display_name.clone(),
                        Some(record),
                        Vec::new(),
                    )
                }
                PrimaryMatch::Ambiguous(candidates) => {
                    info!(
                        target: TARGET_RECONCILE,
                        "Primary subject ambiguous across {} records", candidates.len()
                    );
                    (None, extracted_name.clone(), None, candidates)
                }
                PrimaryMatch::None => {
                    info!(target: TARGET_RECONCILE, "Primary subject not in store; all changes new");
                    (None, extracted_name.clone(), None, Vec::new())
                }
            };

        // Diff in the document type's configured field order so the
        // proposal reads like the form does.
        let mut changes = Vec::new();
        for field_def in &config.fields {
            let Some(attribute) = field_def.store_attribute else {
                continue;
            };
            let Some(extracted) = extraction.fields.get(field_def.key) else {
                continue;
            };
            if extracted.value.trim().is_empty() {
                continue;
            }

            let current_value = record
                .as_ref()
                .and_then(|r| r.attribute(attribute))
                .map(|v| v.to_string());

            let classification = classify(current_value.as_deref(), &extracted.value, field_def);

            changes.push(FieldChange {
                field_name: field_def.key.to_string(),
                label: field_def.label.to_string(),
                store_attribute: attribute.to_string(),
                biographic: field_def.biographic,
                current_value,
                proposed_value: extracted.value.clone(),
                confidence: extracted.confidence,
                classification,
            });
        }

        // Family members: only verified candidates reach this point; match
        // each and record its disposition.
        let mut family_members = Vec::new();
        for member in &extraction.family_members {
            if !member.verified {
                continue;
            }
            let mut member = member.clone();
            let matched = matcher.match_member(&member).await;
            let action = matched.action();
            member.action = Some(action);
            match matched {
                MemberMatch::Linked(result) | MemberMatch::Update(result) => {
                    member.match_result = Some(result);
                }
                MemberMatch::Ambiguous(candidates) => {
                    member.match_result = None;
                    member.ambiguous_matches = candidates;
                }
                MemberMatch::None => {
                    member.match_result = None;
                }
            }
            info!(
                target: TARGET_RECONCILE,
                "Family member {} ({}): {}",
                member.display_name(),
                member.relationship,
                action
            );
            family_members.push(member);
        }

        // History is carried through whole, category-atomically; whether it
        // lands as structured records or notes is the apply step's call.
        let mut history: Vec<HistoryRecord> = Vec::new();
        let mut categories: Vec<_> = extraction.history.keys().copied().collect();
        categories.sort_by_key(|c| c.to_string());
        for category in categories {
            history.extend(extraction.history[&category].iter().cloned());
        }

        let change_set = ChangeSet {
            contact_id,
            contact_name,
            document_type: extraction.document_type.to_string(),
            source_name: source_name.to_string(),
            extraction_confidence: extraction.confidence,
            changes,
            family_members,
            history,
            primary_candidates,
            metrics,
            validation_issues,
        };

        info!(
            target: TARGET_RECONCILE,
            "Change-set ready: {} changes ({} total fields), {} family members",
            change_set.total_changes(),
            change_set.changes.len(),
            change_set.family_members.len()
        );

        Ok(change_set)
    }
}

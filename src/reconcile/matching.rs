//! Entity identity resolution against the record store: exact identifier
//! first, then name plus date of birth, then name alone. Each tier only runs
//! when the previous one found nothing, and ambiguity is an explicit
//! outcome handed to a human, never guessed away.

use crate::error::StoreError;
use crate::extraction::types::{ExtractionResult, FamilyMemberCandidate};
use crate::reconcile::normalize::{digits_only, normalize_text};
use crate::store::{Record, RecordStore};
use crate::{dates, RunParams, TARGET_RECONCILE};
use serde::{Deserialize, Serialize};
use std::fmt;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

/// Minimum per-name Jaro-Winkler similarity for two person names to count
/// as the same person.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.90;

/// Name-only searches returning more hits than this are treated as
/// ambiguous outright; common names must not link by volume.
const MAX_NAME_ONLY_CANDIDATES: usize = 5;

/// How a match was established, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    ExactIdentifier,
    NameAndDob,
    NameOnly,
}

impl MatchMethod {
    /// Higher is more specific; used as the tie-break between equal
    /// confidences.
    pub fn specificity(&self) -> u8 {
        match self {
            MatchMethod::ExactIdentifier => 3,
            MatchMethod::NameAndDob => 2,
            MatchMethod::NameOnly => 1,
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::ExactIdentifier => write!(f, "exact_identifier"),
            MatchMethod::NameAndDob => write!(f, "name_and_dob"),
            MatchMethod::NameOnly => write!(f, "name_only"),
        }
    }
}

/// One scored candidate record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_record_id: i64,
    pub confidence: f32,
    pub method: MatchMethod,
}

/// Outcome of primary-subject matching.
#[derive(Debug)]
pub enum PrimaryMatch {
    /// Exactly one acceptable record.
    Matched { result: MatchResult, record: Record },
    /// Multiple plausible records; all are returned for external
    /// disambiguation rather than picking one.
    Ambiguous(Vec<MatchResult>),
    /// Nothing in the store; every field change will be `New`.
    None,
}

/// What the apply step should do with a family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberAction {
    LinkExisting,
    CreateNew,
    UpdateExisting,
    Skip,
}

impl fmt::Display for MemberAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberAction::LinkExisting => write!(f, "link_existing"),
            MemberAction::CreateNew => write!(f, "create_new"),
            MemberAction::UpdateExisting => write!(f, "update_existing"),
            MemberAction::Skip => write!(f, "skip"),
        }
    }
}

/// Outcome of family-member matching, before action assignment.
#[derive(Debug)]
pub enum MemberMatch {
    /// Confident single match (identifier or name+DOB tier).
    Linked(MatchResult),
    /// Single name-only match; same person with less certainty.
    Update(MatchResult),
    /// Multiple name-only matches, kept for manual resolution.
    Ambiguous(Vec<MatchResult>),
    None,
}

impl MemberMatch {
    pub fn action(&self) -> MemberAction {
        match self {
            MemberMatch::Linked(_) => MemberAction::LinkExisting,
            MemberMatch::Update(_) => MemberAction::UpdateExisting,
            MemberMatch::Ambiguous(_) => MemberAction::Skip,
            MemberMatch::None => MemberAction::CreateNew,
        }
    }
}

/// Three-tier matcher over a shared record-store handle.
pub struct Matcher<'a> {
    store: &'a dyn RecordStore,
    params: &'a RunParams,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a dyn RecordStore, params: &'a RunParams) -> Self {
        Matcher { store, params }
    }

    /// Resolve the primary subject of an extraction.
    pub async fn match_primary(&self, extraction: &ExtractionResult) -> PrimaryMatch {
        let identifier = extraction.field_value("a_number").map(digits_only);
        let first = extraction.field_value("first_name");
        let last = extraction.field_value("last_name");
        let dob = extraction
            .field_value("date_of_birth")
            .and_then(dates::canonicalize);

        self.run_tiers(identifier.as_deref(), first, last, dob.as_deref(), usize::MAX)
            .await
    }

    /// Resolve one verified family member. Name-only searches are scoped:
    /// both names must be present and the candidate count is capped.
    pub async fn match_member(&self, member: &FamilyMemberCandidate) -> MemberMatch {
        let identifier = member.field_value("a_number").map(digits_only);
        let first = member.field_value("first_name");
        let last = member.field_value("last_name");
        let dob = member
            .field_value("date_of_birth")
            .and_then(dates::canonicalize);

        let primary = self
            .run_tiers(
                identifier.as_deref(),
                first,
                last,
                dob.as_deref(),
                MAX_NAME_ONLY_CANDIDATES,
            )
            .await;

        match primary {
            PrimaryMatch::Matched { result, .. } => match result.method {
                MatchMethod::NameOnly => MemberMatch::Update(result),
                _ => MemberMatch::Linked(result),
            },
            PrimaryMatch::Ambiguous(candidates) => MemberMatch::Ambiguous(candidates),
            PrimaryMatch::None => MemberMatch::None,
        }
    }

    async fn run_tiers(
        &self,
        identifier: Option<&str>,
        first: Option<&str>,
        last: Option<&str>,
        dob: Option<&str>,
        name_only_cap: usize,
    ) -> PrimaryMatch {
        // Tier 1: exact identifier.
        if let Some(id) = identifier.filter(|id| !id.is_empty()) {
            match self.timed(self.store.search_by_identifier(id)).await {
                Ok(mut records) if records.len() == 1 => {
                    let record = records.remove(0);
                    info!(
                        target: TARGET_RECONCILE,
                        "Matched by identifier: {} (record {})", record.display_name, record.id
                    );
                    return PrimaryMatch::Matched {
                        result: MatchResult {
                            candidate_record_id: record.id,
                            confidence: 1.0,
                            method: MatchMethod::ExactIdentifier,
                        },
                        record,
                    };
                }
                Ok(records) if records.len() > 1 => {
                    // An identifier shared by several records is a store
                    // integrity problem; surface all of them.
                    warn!(
                        target: TARGET_RECONCILE,
                        "Identifier search returned {} records; deferring to manual review",
                        records.len()
                    );
                    return PrimaryMatch::Ambiguous(
                        records
                            .iter()
                            .map(|r| MatchResult {
                                candidate_record_id: r.id,
                                confidence: 1.0,
                                method: MatchMethod::ExactIdentifier,
                            })
                            .collect(),
                    );
                }
                Ok(_) => {
                    debug!(target: TARGET_RECONCILE, "No identifier match, trying name+dob");
                }
                Err(e) => {
                    warn!(
                        target: TARGET_RECONCILE,
                        "Identifier search failed, degrading to next tier: {}", e
                    );
                }
            }
        }

        let (Some(first), Some(last)) = (first, last) else {
            return PrimaryMatch::None;
        };

        // Tier 2: name plus date of birth.
        if let Some(dob) = dob {
            match self.timed(self.store.search_by_name_dob(first, last, dob)).await {
                Ok(records) => {
                    let mut scored = score_records(records, first, last, MatchMethod::NameAndDob);
                    if let Some((best, record)) = take_best(&mut scored) {
                        info!(
                            target: TARGET_RECONCILE,
                            "Matched by name+dob: {} (record {}, confidence {:.2})",
                            record.display_name,
                            record.id,
                            best.confidence
                        );
                        return PrimaryMatch::Matched { result: best, record };
                    }
                }
                Err(e) => {
                    warn!(
                        target: TARGET_RECONCILE,
                        "Name+dob search failed, degrading to name-only: {}", e
                    );
                }
            }
        }

        // Tier 3: name only. May legitimately return several candidates.
        match self.timed(self.store.search_by_name(first, last)).await {
            Ok(records) => {
                let mut scored = score_records(records, first, last, MatchMethod::NameOnly);
                if scored.is_empty() {
                    PrimaryMatch::None
                } else if scored.len() == 1 {
                    let (best, record) = scored.remove(0);
                    PrimaryMatch::Matched { result: best, record }
                } else {
                    if scored.len() > name_only_cap {
                        warn!(
                            target: TARGET_RECONCILE,
                            "Name-only search returned {} candidates (cap {}), deferring",
                            scored.len(),
                            name_only_cap
                        );
                    } else {
                        info!(
                            target: TARGET_RECONCILE,
                            "{} name-only candidates, deferring to manual disambiguation",
                            scored.len()
                        );
                    }
                    PrimaryMatch::Ambiguous(scored.into_iter().map(|(result, _)| result).collect())
                }
            }
            Err(e) => {
                warn!(target: TARGET_RECONCILE, "Name-only search failed: {}", e);
                PrimaryMatch::None
            }
        }
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.params.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.params.store_timeout.as_secs())),
        }
    }
}

/// Re-score what the store returned: the store's own fuzzing is not
/// trusted, names must clear the similarity threshold here.
fn score_records(
    records: Vec<Record>,
    first: &str,
    last: &str,
    method: MatchMethod,
) -> Vec<(MatchResult, Record)> {
    let mut scored: Vec<(MatchResult, Record)> = records
        .into_iter()
        .filter_map(|record| {
            let similarity = name_similarity(
                first,
                last,
                record.attribute("FirstName").unwrap_or_default(),
                record.attribute("LastName").unwrap_or_default(),
            );
            if similarity >= NAME_SIMILARITY_THRESHOLD {
                let result = MatchResult {
                    candidate_record_id: record.id,
                    confidence: similarity as f32,
                    method,
                };
                Some((result, record))
            } else {
                debug!(
                    target: TARGET_RECONCILE,
                    "Rejecting record {} ({:.2} below name threshold)", record.id, similarity
                );
                None
            }
        })
        .collect();

    scored.sort_by(|(a, _), (b, _)| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.method.specificity().cmp(&a.method.specificity()))
            .then_with(|| a.candidate_record_id.cmp(&b.candidate_record_id))
    });
    scored
}

/// A clearly-best single candidate, or `None` when zero or tied-at-top.
fn take_best(scored: &mut Vec<(MatchResult, Record)>) -> Option<(MatchResult, Record)> {
    match scored.len() {
        0 => None,
        1 => Some(scored.remove(0)),
        _ => {
            // A decisive winner is accepted; a dead heat is not.
            if scored[0].0.confidence > scored[1].0.confidence {
                Some(scored.remove(0))
            } else {
                None
            }
        }
    }
}

/// Average Jaro-Winkler similarity over the normalized name parts.
pub fn name_similarity(first_a: &str, last_a: &str, first_b: &str, last_b: &str) -> f64 {
    let first_score = jaro_winkler(&normalize_text(first_a), &normalize_text(first_b));
    let last_score = jaro_winkler(&normalize_text(last_a), &normalize_text(last_b));
    (first_score + last_score) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn record(id: i64, first: &str, last: &str, dob: &str, a_number: &str) -> Record {
        let mut attributes = HashMap::new();
        attributes.insert("FirstName".to_string(), first.to_string());
        attributes.insert("LastName".to_string(), last.to_string());
        if !dob.is_empty() {
            attributes.insert("BirthDate".to_string(), dob.to_string());
        }
        if !a_number.is_empty() {
            attributes.insert("AlienNumber".to_string(), a_number.to_string());
        }
        Record {
            id,
            display_name: format!("{}, {}", last, first),
            attributes,
        }
    }

    /// In-memory record store fake.
    struct FakeStore {
        records: Vec<Record>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn search_by_identifier(&self, identifier: &str) -> Result<Vec<Record>, StoreError> {
            Ok(self
                .records
                .iter()
                .filter(|r| {
                    r.attribute("AlienNumber")
                        .map(digits_only)
                        .map(|d| d == identifier)
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn search_by_name_dob(
            &self,
            _first_name: &str,
            last_name: &str,
            date_of_birth: &str,
        ) -> Result<Vec<Record>, StoreError> {
            Ok(self
                .records
                .iter()
                .filter(|r| {
                    r.attribute("LastName")
                        .map(|l| normalize_text(l) == normalize_text(last_name))
                        .unwrap_or(false)
                        && r.attribute("BirthDate") == Some(date_of_birth)
                })
                .cloned()
                .collect())
        }

        async fn search_by_name(
            &self,
            _first_name: &str,
            last_name: &str,
        ) -> Result<Vec<Record>, StoreError> {
            Ok(self
                .records
                .iter()
                .filter(|r| {
                    r.attribute("LastName")
                        .map(|l| normalize_text(l) == normalize_text(last_name))
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn get_record(&self, id: i64) -> Result<Option<Record>, StoreError> {
            Ok(self.records.iter().find(|r| r.id == id).cloned())
        }
    }

    /// Store whose identifier tier always fails.
    struct FlakyStore {
        inner: FakeStore,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn search_by_identifier(&self, _identifier: &str) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::Transport("identifier index offline".to_string()))
        }

        async fn search_by_name_dob(
            &self,
            first_name: &str,
            last_name: &str,
            date_of_birth: &str,
        ) -> Result<Vec<Record>, StoreError> {
            self.inner
                .search_by_name_dob(first_name, last_name, date_of_birth)
                .await
        }

        async fn search_by_name(
            &self,
            first_name: &str,
            last_name: &str,
        ) -> Result<Vec<Record>, StoreError> {
            self.inner.search_by_name(first_name, last_name).await
        }

        async fn get_record(&self, id: i64) -> Result<Option<Record>, StoreError> {
            self.inner.get_record(id).await
        }
    }

    fn member_with(fields: &[(&str, &str)]) -> FamilyMemberCandidate {
        use crate::extraction::types::{ExtractedField, Relationship};
        let mut member = FamilyMemberCandidate::new(Relationship::Spouse, 0.9);
        for (name, value) in fields {
            member.fields.insert(
                name.to_string(),
                ExtractedField::new(name, value, 0.9, "structured"),
            );
        }
        member.verified = true;
        member
    }

    #[tokio::test]
    async fn test_identifier_tier_wins_outright() {
        let store = FakeStore {
            records: vec![
                record(7, "Amina", "Diallo", "1990-01-15", "A123456789"),
                record(8, "Amina", "Diallo", "1990-01-15", ""),
            ],
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[
            ("first_name", "Amina"),
            ("last_name", "Diallo"),
            ("a_number", "A123456789"),
        ]);
        let matched = matcher.match_member(&member).await;
        assert_eq!(matched.action(), MemberAction::LinkExisting);
        match matched {
            MemberMatch::Linked(result) => {
                assert_eq!(result.candidate_record_id, 7);
                assert_eq!(result.method, MatchMethod::ExactIdentifier);
            }
            other => panic!("expected Linked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_name_dob_tier_links_member() {
        let store = FakeStore {
            records: vec![record(12, "Kofi", "Mensah", "1992-04-02", "")],
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        // Identifier extracted but unknown to the store; name+dob still
        // resolves to a confident link.
        let member = member_with(&[
            ("first_name", "Kofi"),
            ("last_name", "Mensah"),
            ("date_of_birth", "1992-04-02"),
            ("a_number", "A987654321"),
        ]);

        match matcher.match_member(&member).await {
            MemberMatch::Linked(result) => {
                assert_eq!(result.candidate_record_id, 12);
                assert_eq!(result.method, MatchMethod::NameAndDob);
            }
            other => panic!("expected Linked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_name_only_matches_are_ambiguous() {
        let store = FakeStore {
            records: vec![
                record(1, "Maria", "Garcia", "", ""),
                record(2, "Maria", "Garcia", "", ""),
            ],
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[("first_name", "Maria"), ("last_name", "Garcia")]);
        match matcher.match_member(&member).await {
            MemberMatch::Ambiguous(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().all(|c| c.method == MatchMethod::NameOnly));
                assert_eq!(
                    MemberMatch::Ambiguous(candidates).action(),
                    MemberAction::Skip
                );
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_name_only_match_is_update() {
        let store = FakeStore {
            records: vec![record(3, "Ibrahim", "Sow", "", "")],
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[("first_name", "Ibrahim"), ("last_name", "Sow")]);
        match matcher.match_member(&member).await {
            MemberMatch::Update(result) => {
                assert_eq!(result.method, MatchMethod::NameOnly);
                assert_eq!(MemberMatch::Update(result).action(), MemberAction::UpdateExisting);
            }
            other => panic!("expected Update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_match_means_create_new() {
        let store = FakeStore { records: vec![] };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[("first_name", "Ana"), ("last_name", "Lima")]);
        let matched = matcher.match_member(&member).await;
        assert!(matches!(matched, MemberMatch::None));
        assert_eq!(matched.action(), MemberAction::CreateNew);
    }

    #[tokio::test]
    async fn test_dissimilar_store_results_are_rejected() {
        // The store fuzzes aggressively; re-scoring must reject the noise.
        let store = FakeStore {
            records: vec![record(9, "Mariana", "Garcias", "", "")],
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[("first_name", "Bob"), ("last_name", "Garcias")]);
        assert!(matches!(matcher.match_member(&member).await, MemberMatch::None));
    }

    #[tokio::test]
    async fn test_identifier_tier_failure_degrades_to_name_dob() {
        let store = FlakyStore {
            inner: FakeStore {
                records: vec![record(4, "Amina", "Diallo", "1990-01-15", "A123456789")],
            },
        };
        let params = RunParams::default();
        let matcher = Matcher::new(&store, &params);

        let member = member_with(&[
            ("first_name", "Amina"),
            ("last_name", "Diallo"),
            ("date_of_birth", "1990-01-15"),
            ("a_number", "A123456789"),
        ]);

        match matcher.match_member(&member).await {
            MemberMatch::Linked(result) => assert_eq!(result.method, MatchMethod::NameAndDob),
            other => panic!("expected Linked via name+dob, got {:?}", other),
        }
    }

    #[test]
    fn test_method_specificity_ordering() {
        assert!(MatchMethod::ExactIdentifier.specificity() > MatchMethod::NameAndDob.specificity());
        assert!(MatchMethod::NameAndDob.specificity() > MatchMethod::NameOnly.specificity());
    }

    #[test]
    fn test_name_similarity_tolerates_small_errors() {
        assert!(name_similarity("Amina", "Diallo", "Amina", "Dialo") >= 0.90);
        assert!(name_similarity("Amina", "Diallo", "Pedro", "Santos") < 0.90);
    }
}

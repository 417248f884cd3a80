//! End-to-end run for one document: classify, extract with refinement,
//! verify family members, reconcile against the record store. Backend and
//! store handles are injected so concurrent runs against different
//! documents share them safely; all working state is per-run.

use crate::backend::{with_timeout, ExtractionBackend};
use crate::config::document_config;
use crate::document::{DocumentPayload, DocumentType};
use crate::error::PipelineError;
use crate::extraction::refine::{RefinementOrchestrator, TerminalState};
use crate::extraction::verify::verify_family_members;
use crate::reconcile::diff::{ChangeSet, ReconciliationEngine};
use crate::store::RecordStore;
use crate::{RunParams, TARGET_EXTRACTION};
use tracing::{info, warn};

pub struct Pipeline<'a> {
    backend: &'a dyn ExtractionBackend,
    store: &'a dyn RecordStore,
    params: RunParams,
}

impl<'a> Pipeline<'a> {
    pub fn new(backend: &'a dyn ExtractionBackend, store: &'a dyn RecordStore) -> Self {
        Pipeline {
            backend,
            store,
            params: RunParams::default(),
        }
    }

    pub fn with_params(mut self, params: RunParams) -> Self {
        self.params = params;
        self
    }

    /// Process one document into a change-set proposal. Nothing is written
    /// anywhere; the caller hands the proposal to the review surface.
    pub async fn process(
        &self,
        document: &DocumentPayload,
        document_type_hint: Option<DocumentType>,
    ) -> Result<ChangeSet, PipelineError> {
        let document_type = match document_type_hint {
            Some(doc_type) => doc_type,
            None => self.detect_type(document).await,
        };

        // A type with no field table is a configuration gap: fatal, up
        // front, before any extraction spend.
        let config = document_config(document_type)?;

        info!(
            target: TARGET_EXTRACTION,
            "Processing {} as {}", document.source_name, document_type
        );

        let orchestrator = RefinementOrchestrator::new(self.backend, &self.params);
        let mut outcome = orchestrator.run(document, document_type, config).await?;

        if outcome.terminal == TerminalState::MaxIterationsReached {
            warn!(
                target: TARGET_EXTRACTION,
                "Refinement hit the iteration cap with {} errors outstanding",
                outcome.metrics.validation_errors_final
            );
        }

        let (verified, verify_calls) = verify_family_members(
            self.backend,
            &self.params,
            document,
            &mut outcome.result,
        )
        .await;
        outcome.metrics.family_members_verified = verified;
        outcome.metrics.total_backend_calls += verify_calls;

        let engine = ReconciliationEngine::new(self.store, &self.params);
        engine
            .reconcile(
                &outcome.result,
                &document.source_name,
                outcome.metrics,
                outcome.issues,
            )
            .await
    }

    async fn detect_type(&self, document: &DocumentPayload) -> DocumentType {
        match with_timeout(
            self.params.backend_timeout,
            self.backend.detect_document_type(document),
        )
        .await
        {
            Ok(key) => {
                let doc_type = DocumentType::from(key.as_str());
                info!(target: TARGET_EXTRACTION, "Detected document type: {}", doc_type);
                doc_type
            }
            Err(e) => {
                warn!(
                    target: TARGET_EXTRACTION,
                    "Document type detection failed ({}), treating as unknown", e
                );
                DocumentType::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        RawCritique, RawExtraction, RawField, RawFamilyMember, RawVerification,
    };
    use crate::error::{BackendError, StoreError};
    use crate::extraction::strategy::ExtractionStrategy;
    use crate::extraction::types::{ExtractionResult, FamilyMemberCandidate};
    use crate::reconcile::matching::MemberAction;
    use crate::store::Record;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// A full happy-path fake: questionnaire with one spouse who exists in
    /// the store under a known identifier.
    struct ScriptedBackend;

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        async fn extract(
            &self,
            _document: &DocumentPayload,
            _document_type: DocumentType,
            _strategy: ExtractionStrategy,
            _focus: Option<&[String]>,
        ) -> Result<RawExtraction, BackendError> {
            Ok(RawExtraction {
                confidence: 0.92,
                fields: vec![
                    RawField {
                        name: "first_name".to_string(),
                        value: "Amina".to_string(),
                        confidence: 0.95,
                    },
                    RawField {
                        name: "last_name".to_string(),
                        value: "Diallo".to_string(),
                        confidence: 0.95,
                    },
                    RawField {
                        name: "date_of_birth".to_string(),
                        value: "1990-01-15".to_string(),
                        confidence: 0.9,
                    },
                    RawField {
                        name: "country_of_birth".to_string(),
                        value: "Guinea".to_string(),
                        confidence: 0.9,
                    },
                ],
                family_members: vec![RawFamilyMember {
                    relationship: "spouse".to_string(),
                    fields: vec![
                        RawField {
                            name: "first_name".to_string(),
                            value: "Kofi".to_string(),
                            confidence: 0.9,
                        },
                        RawField {
                            name: "last_name".to_string(),
                            value: "Mensah".to_string(),
                            confidence: 0.9,
                        },
                        RawField {
                            name: "a_number".to_string(),
                            value: "A123456789".to_string(),
                            confidence: 0.9,
                        },
                    ],
                    confidence: 0.9,
                    verified: None,
                    reason: None,
                }],
                history: vec![],
                document_type: None,
            })
        }

        async fn critique(
            &self,
            _document: &DocumentPayload,
            _merged: &ExtractionResult,
        ) -> Result<RawCritique, BackendError> {
            Ok(RawCritique::default())
        }

        async fn verify_member(
            &self,
            _document: &DocumentPayload,
            _candidate: &FamilyMemberCandidate,
        ) -> Result<RawVerification, BackendError> {
            Ok(RawVerification {
                verified: true,
                reason: None,
                fields: Vec::new(),
            })
        }

        async fn detect_document_type(
            &self,
            _document: &DocumentPayload,
        ) -> Result<String, BackendError> {
            Ok("questionnaire".to_string())
        }
    }

    struct SpouseStore;

    #[async_trait]
    impl RecordStore for SpouseStore {
        async fn search_by_identifier(&self, identifier: &str) -> Result<Vec<Record>, StoreError> {
            if identifier == "123456789" {
                let mut attributes = HashMap::new();
                attributes.insert("FirstName".to_string(), "Kofi".to_string());
                attributes.insert("LastName".to_string(), "Mensah".to_string());
                attributes.insert("AlienNumber".to_string(), "A123456789".to_string());
                Ok(vec![Record {
                    id: 301,
                    display_name: "Mensah, Kofi".to_string(),
                    attributes,
                }])
            } else {
                Ok(vec![])
            }
        }

        async fn search_by_name_dob(
            &self,
            _first: &str,
            _last: &str,
            _dob: &str,
        ) -> Result<Vec<Record>, StoreError> {
            Ok(vec![])
        }

        async fn search_by_name(&self, _first: &str, _last: &str) -> Result<Vec<Record>, StoreError> {
            Ok(vec![])
        }

        async fn get_record(&self, _id: i64) -> Result<Option<Record>, StoreError> {
            Ok(None)
        }
    }

    fn test_document() -> DocumentPayload {
        DocumentPayload::from_page_images(vec![vec![0u8]], "image/png", "intake.pdf")
    }

    #[tokio::test]
    async fn test_end_to_end_links_spouse_and_proposes_new_subject() {
        let pipeline = Pipeline::new(&ScriptedBackend, &SpouseStore);
        let change_set = pipeline.process(&test_document(), None).await.unwrap();

        // Primary subject is not in the store: everything proposed as new.
        assert_eq!(change_set.contact_id, None);
        assert!(change_set.total_changes() > 0);

        // The spouse's identifier is known, so she links instead of being
        // created twice.
        assert_eq!(change_set.family_members.len(), 1);
        let spouse = &change_set.family_members[0];
        assert_eq!(spouse.action, Some(MemberAction::LinkExisting));
        assert_eq!(
            spouse.match_result.as_ref().unwrap().candidate_record_id,
            301
        );

        // Metrics carried through for the review surface.
        assert!(change_set.metrics.total_backend_calls >= 3);
        assert_eq!(change_set.metrics.family_members_verified, 1);
    }

    #[tokio::test]
    async fn test_unknown_document_type_is_configuration_error() {
        struct UnknownTypeBackend;

        #[async_trait]
        impl ExtractionBackend for UnknownTypeBackend {
            async fn extract(
                &self,
                _document: &DocumentPayload,
                _document_type: DocumentType,
                _strategy: ExtractionStrategy,
                _focus: Option<&[String]>,
            ) -> Result<RawExtraction, BackendError> {
                Ok(RawExtraction::default())
            }

            async fn critique(
                &self,
                _document: &DocumentPayload,
                _merged: &ExtractionResult,
            ) -> Result<RawCritique, BackendError> {
                Ok(RawCritique::default())
            }

            async fn verify_member(
                &self,
                _document: &DocumentPayload,
                _candidate: &FamilyMemberCandidate,
            ) -> Result<RawVerification, BackendError> {
                Ok(RawVerification {
                    verified: false,
                    reason: None,
                    fields: Vec::new(),
                })
            }

            async fn detect_document_type(
                &self,
                _document: &DocumentPayload,
            ) -> Result<String, BackendError> {
                Ok("napkin_sketch".to_string())
            }
        }

        let pipeline = Pipeline::new(&UnknownTypeBackend, &SpouseStore);
        let err = pipeline.process(&test_document(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}

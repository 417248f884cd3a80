//! Extraction backend seam. The vision model is a black box behind
//! [`ExtractionBackend`]; the pipeline only sees the wire shapes below.

pub mod http;

use crate::document::{DocumentPayload, DocumentType};
use crate::error::BackendError;
use crate::extraction::strategy::ExtractionStrategy;
use crate::extraction::types::ExtractionResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// One field as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    pub name: String,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// One family member as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFamilyMember {
    pub relationship: String,
    #[serde(default)]
    pub fields: Vec<RawField>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Populated by the verification call; absent on first-pass extraction.
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One history entry as the backend reports it. `to_date` may carry the
/// literal string "present".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistoryRecord {
    pub category: String,
    #[serde(default)]
    pub fields: Vec<RawField>,
    #[serde(default)]
    pub from_date: Option<String>,
    #[serde(default)]
    pub to_date: Option<String>,
}

/// The backend's answer to one extraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtraction {
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub fields: Vec<RawField>,
    #[serde(default)]
    pub family_members: Vec<RawFamilyMember>,
    #[serde(default)]
    pub history: Vec<RawHistoryRecord>,
    #[serde(default)]
    pub document_type: Option<String>,
}

impl Default for RawExtraction {
    fn default() -> Self {
        RawExtraction {
            confidence: default_confidence(),
            fields: Vec::new(),
            family_members: Vec::new(),
            history: Vec::new(),
            document_type: None,
        }
    }
}

/// One correction proposed by the self-critique pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCorrection {
    pub field: String,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The backend's answer to a self-critique request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCritique {
    #[serde(default)]
    pub corrections: Vec<RawCorrection>,
}

/// The backend's answer to a family-member verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVerification {
    pub verified: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub fields: Vec<RawField>,
}

/// The vision extraction backend. One shared handle is reused across every
/// call in a run; implementations must be safe to call concurrently.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extract structured data from the document with one prompting strategy.
    /// `focus` restricts the request to the named fields (targeted
    /// re-extraction); `None` asks for everything.
    async fn extract(
        &self,
        document: &DocumentPayload,
        document_type: DocumentType,
        strategy: ExtractionStrategy,
        focus: Option<&[String]>,
    ) -> Result<RawExtraction, BackendError>;

    /// Review a merged extraction against the document and propose
    /// corrections for likely errors.
    async fn critique(
        &self,
        document: &DocumentPayload,
        merged: &ExtractionResult,
    ) -> Result<RawCritique, BackendError>;

    /// Confirm a single family member exists in the document and return any
    /// fields the first pass missed.
    async fn verify_member(
        &self,
        document: &DocumentPayload,
        candidate: &crate::extraction::types::FamilyMemberCandidate,
    ) -> Result<RawVerification, BackendError>;

    /// Classify the document against the known type table.
    async fn detect_document_type(
        &self,
        document: &DocumentPayload,
    ) -> Result<String, BackendError>;
}

/// Wrap a backend future with the run's timeout. A timeout is that call's
/// failure, not a crash; callers degrade per their own isolation rule.
pub async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit.as_secs())),
    }
}

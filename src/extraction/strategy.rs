//! Fan-out over independent prompting strategies. Pure fan-out: no merging,
//! no retries. A failed strategy shrinks the result set by one; losing all
//! of them is the only fatal outcome. Retry policy belongs to the
//! refinement loop.

use crate::backend::{with_timeout, ExtractionBackend};
use crate::document::{DocumentPayload, DocumentType};
use crate::error::PipelineError;
use crate::extraction::parse;
use crate::extraction::types::ExtractionResult;
use crate::{RunParams, TARGET_EXTRACTION};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Extraction prompt strategies, cross-validated against each other. The
/// order strategies are configured in is also the merge tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionStrategy {
    /// Direct JSON schema approach.
    Structured,
    /// Describe the document first, then extract.
    Narrative,
    /// Section-by-section walk.
    FieldByField,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStrategy::Structured => write!(f, "structured"),
            ExtractionStrategy::Narrative => write!(f, "narrative"),
            ExtractionStrategy::FieldByField => write!(f, "field_by_field"),
        }
    }
}

impl ExtractionStrategy {
    /// The default cross-validation pair used for full passes.
    pub fn default_set() -> Vec<ExtractionStrategy> {
        vec![ExtractionStrategy::Structured, ExtractionStrategy::Narrative]
    }
}

/// Executes N independent extraction attempts against the same document.
pub struct StrategyRunner<'a> {
    backend: &'a dyn ExtractionBackend,
    params: &'a RunParams,
}

impl<'a> StrategyRunner<'a> {
    pub fn new(backend: &'a dyn ExtractionBackend, params: &'a RunParams) -> Self {
        StrategyRunner { backend, params }
    }

    /// Run every strategy concurrently and return one result per strategy
    /// that succeeded, in configured strategy order. `focus` restricts the
    /// request to the named fields for targeted re-extraction.
    ///
    /// Returns the number of backend calls attempted alongside the results
    /// so the orchestrator can account for failed calls in its metrics.
    pub async fn run(
        &self,
        document: &DocumentPayload,
        document_type: DocumentType,
        strategies: &[ExtractionStrategy],
        focus: Option<&[String]>,
    ) -> Result<(Vec<(ExtractionStrategy, ExtractionResult)>, u32), PipelineError> {
        let attempts = strategies.iter().map(|&strategy| async move {
            let outcome = with_timeout(
                self.params.backend_timeout,
                self.backend.extract(document, document_type, strategy, focus),
            )
            .await;
            (strategy, outcome)
        });

        let mut results = Vec::with_capacity(strategies.len());
        let mut last_error = String::new();
        let calls = strategies.len() as u32;

        for (strategy, outcome) in join_all(attempts).await {
            match outcome {
                Ok(raw) => {
                    let parsed = parse::from_raw(raw, document_type, &strategy.to_string());
                    info!(
                        target: TARGET_EXTRACTION,
                        "Strategy {} extracted {} fields (confidence {:.2})",
                        strategy,
                        parsed.fields.len(),
                        parsed.confidence
                    );
                    results.push((strategy, parsed));
                }
                Err(e) => {
                    // One strategy down degrades the consensus, nothing more.
                    warn!(
                        target: TARGET_EXTRACTION,
                        "Strategy {} failed, continuing without it: {}", strategy, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        if results.is_empty() {
            return Err(PipelineError::AllStrategiesFailed {
                attempted: strategies.len(),
                last_error,
            });
        }

        Ok((results, calls))
    }
}

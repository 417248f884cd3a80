//! The refinement loop. An explicit state machine rather than nested
//! conditionals so the termination and metrics contract stays auditable:
//!
//! `Init -> StrategyPass -> Merge -> Validate -> {Done | TargetedReextract}
//!  -> Merge -> Validate -> ... -> {Done | MaxIterationsReached}`
//!
//! Terminal states always carry the best-so-far result; a run that hits the
//! iteration cap still returns everything it learned.

use crate::backend::{with_timeout, ExtractionBackend};
use crate::config::DocumentTypeConfig;
use crate::document::{DocumentPayload, DocumentType};
use crate::error::PipelineError;
use crate::extraction::consensus::{self, CritiqueOutcome};
use crate::extraction::strategy::{ExtractionStrategy, StrategyRunner};
use crate::extraction::types::{ExtractionMetrics, ExtractionResult};
use crate::validation::{self, ValidationIssue, Validator, CONFIDENCE_THRESHOLD};
use crate::{RunParams, TARGET_EXTRACTION};
use tracing::{info, warn};

/// Hard cap on refinement iterations. The loop is bounded by this count
/// alone, never by wall-clock time.
pub const MAX_ITERATIONS: u32 = 3;

/// Aggregate confidence below which the loop keeps refining even with zero
/// validation errors.
pub const MIN_OVERALL_CONFIDENCE: f32 = 0.8;

/// At most this many fields are re-examined per iteration, lowest
/// confidence first.
pub const MAX_RETRY_FIELDS: usize = 5;

/// States of the refinement machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    Init,
    StrategyPass,
    Merge,
    Validate,
    TargetedReextract,
    Done,
    MaxIterationsReached,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    /// Zero errors and acceptable aggregate confidence.
    Done,
    /// Iteration cap reached with issues outstanding; the best-so-far
    /// result is returned, never discarded.
    MaxIterationsReached,
}

/// Final product of a refinement run.
#[derive(Debug)]
pub struct RefineOutcome {
    pub result: ExtractionResult,
    pub issues: Vec<ValidationIssue>,
    pub metrics: ExtractionMetrics,
    pub terminal: TerminalState,
}

pub struct RefinementOrchestrator<'a> {
    backend: &'a dyn ExtractionBackend,
    params: &'a RunParams,
    strategies: Vec<ExtractionStrategy>,
    use_critique: bool,
    validator: Validator,
}

impl<'a> RefinementOrchestrator<'a> {
    pub fn new(backend: &'a dyn ExtractionBackend, params: &'a RunParams) -> Self {
        RefinementOrchestrator {
            backend,
            params,
            strategies: ExtractionStrategy::default_set(),
            use_critique: true,
            validator: Validator::new(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<ExtractionStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_critique(mut self, enabled: bool) -> Self {
        self.use_critique = enabled;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Drive the state machine to a terminal state.
    pub async fn run(
        &self,
        document: &DocumentPayload,
        document_type: DocumentType,
        config: &DocumentTypeConfig,
    ) -> Result<RefineOutcome, PipelineError> {
        let runner = StrategyRunner::new(self.backend, self.params);
        let mut metrics = ExtractionMetrics::default();
        let mut state = RefineState::Init;

        let mut pending: Vec<(ExtractionStrategy, ExtractionResult)> = Vec::new();
        let mut result = ExtractionResult::new(document_type);
        let mut issues: Vec<ValidationIssue> = Vec::new();
        let mut focus: Vec<String> = Vec::new();
        let mut merged_once = false;

        loop {
            state = match state {
                RefineState::Init => {
                    metrics.strategies_used =
                        self.strategies.iter().map(|s| s.to_string()).collect();
                    RefineState::StrategyPass
                }

                RefineState::StrategyPass => {
                    let (results, calls) = runner
                        .run(document, document_type, &self.strategies, None)
                        .await?;
                    metrics.total_backend_calls += calls;
                    pending = results;
                    RefineState::Merge
                }

                RefineState::Merge => {
                    if !merged_once {
                        // First merge: build the consensus, then critique it.
                        merged_once = true;
                        result =
                            consensus::merge_strategies(std::mem::take(&mut pending), document_type);
                        if self.use_critique {
                            metrics.critique_corrections += self.run_critique(document, &mut result).await;
                            metrics.total_backend_calls += 1;
                        }
                    } else {
                        // Later merges fold re-extracted fields back in,
                        // replacing only on improved confidence.
                        let improved = merge_focused(&mut result, std::mem::take(&mut pending), &focus);
                        info!(
                            target: TARGET_EXTRACTION,
                            "Targeted re-extraction improved {}/{} fields",
                            improved,
                            focus.len()
                        );
                    }
                    RefineState::Validate
                }

                RefineState::Validate => {
                    issues = self.validator.validate(&result, config);
                    let errors = validation::error_count(&issues) as u32;
                    metrics.iterations += 1;

                    if metrics.iterations == 1 {
                        metrics.validation_errors_initial = errors;
                        metrics.low_confidence_fields_initial =
                            result.low_confidence_fields(CONFIDENCE_THRESHOLD).len() as u32;
                    }

                    info!(
                        target: TARGET_EXTRACTION,
                        "Iteration {}: {} errors, confidence {:.2}",
                        metrics.iterations,
                        errors,
                        result.confidence
                    );

                    let resolved = errors == 0 && result.confidence >= MIN_OVERALL_CONFIDENCE;
                    if resolved {
                        RefineState::Done
                    } else if metrics.iterations >= MAX_ITERATIONS {
                        RefineState::MaxIterationsReached
                    } else {
                        RefineState::TargetedReextract
                    }
                }

                RefineState::TargetedReextract => {
                    focus = self.focus_fields(&result, &issues);
                    if focus.is_empty() {
                        // Nothing concrete to re-examine (e.g. confidence low
                        // across the board with no specific offender): another
                        // pass cannot improve anything, stop here.
                        state = RefineState::MaxIterationsReached;
                        continue;
                    }

                    match runner
                        .run(
                            document,
                            document_type,
                            &self.strategies[..1],
                            Some(&focus),
                        )
                        .await
                    {
                        Ok((results, calls)) => {
                            metrics.total_backend_calls += calls;
                            pending = results;
                            RefineState::Merge
                        }
                        Err(e) => {
                            // A dead targeted pass must not lose the result
                            // already in hand.
                            warn!(
                                target: TARGET_EXTRACTION,
                                "Targeted re-extraction failed, keeping current result: {}", e
                            );
                            metrics.total_backend_calls += 1;
                            RefineState::MaxIterationsReached
                        }
                    }
                }

                RefineState::Done | RefineState::MaxIterationsReached => {
                    let terminal = if state == RefineState::Done {
                        TerminalState::Done
                    } else {
                        TerminalState::MaxIterationsReached
                    };
                    metrics.validation_errors_final = validation::error_count(&issues) as u32;
                    metrics.low_confidence_fields_final =
                        result.low_confidence_fields(CONFIDENCE_THRESHOLD).len() as u32;
                    return Ok(RefineOutcome {
                        result,
                        issues,
                        metrics,
                        terminal,
                    });
                }
            };
        }
    }

    async fn run_critique(
        &self,
        document: &DocumentPayload,
        result: &mut ExtractionResult,
    ) -> u32 {
        match with_timeout(
            self.params.backend_timeout,
            self.backend.critique(document, result),
        )
        .await
        {
            Ok(critique) => {
                let outcomes = consensus::apply_critique(result, critique);
                for outcome in &outcomes {
                    if let CritiqueOutcome::Applied { field, .. } = outcome {
                        info!(target: TARGET_EXTRACTION, "Critique corrected field '{}'", field);
                    }
                }
                consensus::corrections_applied(&outcomes)
            }
            Err(e) => {
                // The critique pass is advisory; losing it degrades nothing.
                warn!(target: TARGET_EXTRACTION, "Self-critique pass failed, skipping: {}", e);
                0
            }
        }
    }

    /// Union of error-implicated fields and low-confidence fields, capped at
    /// [`MAX_RETRY_FIELDS`]. Error fields first, then remaining fields by
    /// ascending confidence.
    fn focus_fields(&self, result: &ExtractionResult, issues: &[ValidationIssue]) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();

        for name in validation::fields_with_errors(issues) {
            // Skip synthetic references like family_members[0]; a missing
            // required field has no current value but is still worth a
            // targeted ask.
            if !name.contains('[') && !fields.contains(&name) {
                fields.push(name);
            }
        }
        for field in result.low_confidence_fields(CONFIDENCE_THRESHOLD) {
            if !fields.contains(&field.name) {
                fields.push(field.name.clone());
            }
        }

        fields.truncate(MAX_RETRY_FIELDS);
        fields
    }
}

/// Fold focused re-extraction output back into the working result. Only the
/// requested fields are considered, and a value is replaced only when the
/// new confidence strictly improves on the old one.
fn merge_focused(
    result: &mut ExtractionResult,
    passes: Vec<(ExtractionStrategy, ExtractionResult)>,
    focus: &[String],
) -> usize {
    let mut improved = 0;

    for (_strategy, pass) in passes {
        for (name, field) in pass.fields {
            if !focus.contains(&name) {
                continue;
            }
            match result.fields.get(&name) {
                Some(existing) if field.confidence <= existing.confidence => {}
                _ => {
                    result.fields.insert(name, field);
                    improved += 1;
                }
            }
        }
    }

    result.recompute_confidence();
    improved
}

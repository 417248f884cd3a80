//! Second-pass family member verification. Every candidate gets one backend
//! call asking whether the document actually supports the person's
//! existence; unconfirmed candidates are removed from the result outright,
//! and confirmed ones absorb any enrichment fields the first pass missed.

use crate::backend::{with_timeout, ExtractionBackend};
use crate::document::DocumentPayload;
use crate::extraction::types::{ExtractedField, ExtractionResult};
use crate::{RunParams, TARGET_EXTRACTION};
use tracing::{info, warn};

pub const VERIFY_SOURCE: &str = "verification";

/// Verify every candidate in place. Returns (verified, backend_calls).
///
/// Failure isolation: one candidate's failed verification call never blocks
/// the others. An infrastructure failure (timeout, transport) keeps the
/// candidate as extracted; only an explicit negative verdict from the
/// backend removes a person from a legal record proposal.
pub async fn verify_family_members(
    backend: &dyn ExtractionBackend,
    params: &RunParams,
    document: &DocumentPayload,
    result: &mut ExtractionResult,
) -> (u32, u32) {
    if result.family_members.is_empty() {
        return (0, 0);
    }

    let mut calls = 0u32;
    let mut kept = Vec::with_capacity(result.family_members.len());

    for mut candidate in result.family_members.drain(..) {
        calls += 1;
        match with_timeout(
            params.backend_timeout,
            backend.verify_member(document, &candidate),
        )
        .await
        {
            Ok(verification) if verification.verified => {
                // Enrichment never downgrades a field the first pass already
                // read with more confidence.
                for field in verification.fields {
                    if field.name.trim().is_empty() || field.value.trim().is_empty() {
                        continue;
                    }
                    match candidate.fields.get(&field.name) {
                        Some(existing) if existing.confidence >= field.confidence => {}
                        _ => {
                            candidate.fields.insert(
                                field.name.clone(),
                                ExtractedField::new(
                                    &field.name,
                                    &field.value,
                                    field.confidence,
                                    VERIFY_SOURCE,
                                ),
                            );
                        }
                    }
                }
                candidate.verified = true;
                kept.push(candidate);
            }
            Ok(verification) => {
                info!(
                    target: TARGET_EXTRACTION,
                    "Removed unverified {}: {} ({})",
                    candidate.relationship,
                    candidate.display_name(),
                    verification.reason.as_deref().unwrap_or("not found in document")
                );
            }
            Err(e) => {
                warn!(
                    target: TARGET_EXTRACTION,
                    "Verification call failed for {} {}, keeping candidate: {}",
                    candidate.relationship,
                    candidate.display_name(),
                    e
                );
                candidate.verified = true;
                kept.push(candidate);
            }
        }
    }

    let verified = kept.len() as u32;
    result.family_members = kept;
    (verified, calls)
}

use crate::extraction::types::FamilyMemberCandidate;

/// Generate the verification prompt for a single family member candidate:
/// confirm the person actually appears in the document and fill in fields
/// the first pass missed.
pub fn member_verification_prompt(candidate: &FamilyMemberCandidate) -> String {
    format!(
        r#"The first extraction pass found this family member in the document:

  {relationship}: {name}

VERIFY this person by re-reading the family member sections of the document.

1. Confirm the person actually appears in the document (not a misread or a
   repeated mention of the primary applicant)
2. If confirmed, extract any MISSING fields: date_of_birth, country_of_birth,
   a_number, citizenship
3. If the person does not actually appear, say so

RETURN FORMAT (JSON):
{{
  "verified": true|false,
  "reason": "only when verified is false",
  "fields": [
    {{"name": "date_of_birth", "value": "YYYY-MM-DD", "confidence": 0.0-1.0}},
    ...
  ]
}}
"#,
        relationship = candidate.relationship,
        name = candidate.display_name(),
    )
}

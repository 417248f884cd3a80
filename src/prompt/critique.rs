use crate::extraction::types::ExtractionResult;

/// Generate the self-critique prompt: show the model its own merged
/// extraction next to the document and ask it to flag likely errors.
pub fn critique_prompt(merged: &ExtractionResult) -> String {
    let fields_json = serde_json::to_string_pretty(&merged.fields).unwrap_or_default();
    let family_json = serde_json::to_string_pretty(&merged.family_members).unwrap_or_default();

    format!(
        r#"This data was extracted from the document. Review it for errors.

EXTRACTED FIELDS:
{fields}

EXTRACTED FAMILY MEMBERS:
{family}

CHECK FOR THESE COMMON ERRORS:
1. SWAPPED VALUES: first/last name swapped, dates in the wrong fields
2. FORMAT ERRORS: dates not in YYYY-MM-DD, A-numbers missing digits
3. OCR ERRORS: numbers misread (0 vs O, 1 vs I, 8 vs B)
4. MISSING DATA: fields visible in the document but not extracted
5. CONFIDENCE TOO HIGH: handwritten or unclear text marked as high confidence
6. LOGICAL ERRORS: date of birth after entry date, impossible dates

Look at the ORIGINAL DOCUMENT again and compare it with the extraction.

RETURN FORMAT (JSON) - list only the corrections, with your confidence in each:
{{
  "corrections": [
    {{"field": "field_key", "value": "corrected value", "confidence": 0.0-1.0, "reason": "why"}},
    ...
  ]
}}

If nothing needs correction, return an empty corrections array.
"#,
        fields = fields_json,
        family = family_json,
    )
}

use crate::config::DocumentTypeConfig;
use crate::extraction::strategy::ExtractionStrategy;

/// Generate the extraction prompt for one strategy over one document type.
/// With no field table configured the prompt falls back to a generic ask.
pub fn extraction_prompt(
    config: Option<&DocumentTypeConfig>,
    strategy: ExtractionStrategy,
) -> String {
    let instructions = match strategy {
        ExtractionStrategy::Structured => {
            "Extract ALL information into the exact JSON structure below.\n\
             Be precise - extract exactly what is written."
        }
        ExtractionStrategy::Narrative => {
            "First, describe what you see in this document in 2-3 sentences.\n\
             Then extract all fields into the JSON structure below.\n\
             Look carefully at each section before extracting."
        }
        ExtractionStrategy::FieldByField => {
            "Go through the document section by section:\n\
             1. First, find the personal information section\n\
             2. Then, find any family member information\n\
             3. Then, find any address/employment/education/travel/criminal history\n\
             4. Finally, note any other important information\n\
             Extract each section carefully before moving to the next."
        }
    };

    let display_name = config.map(|c| c.display_name).unwrap_or("document");
    let field_list = match config {
        Some(config) => config
            .fields
            .iter()
            .map(|f| format!("- {}: {}", f.key, f.label))
            .collect::<Vec<_>>()
            .join("\n"),
        None => "- Extract all visible personal information".to_string(),
    };

    format!(
        r#"Extract all information from this {display_name}.
{instructions}

PRIMARY FIELDS TO EXTRACT:
{fields}

IMPORTANT RULES:
- Extract exactly what is written, do not infer
- For handwritten or unclear text, lower the confidence value (0.0-1.0)
- Dates: use YYYY-MM-DD format
- A-Numbers: include all 9 digits
- If a field is empty or not visible, omit it entirely
- family member relationship must be one of: spouse, child, father, mother, sibling
- history category must be one of: address, employment, education, travel, criminal
- for an ongoing history record, set "to_date" to "present"

RETURN FORMAT (JSON):
{{
  "confidence": 0.0-1.0,
  "fields": [
    {{"name": "field_key", "value": "...", "confidence": 0.0-1.0}},
    ...
  ],
  "family_members": [
    {{
      "relationship": "spouse|child|father|mother|sibling",
      "fields": [{{"name": "first_name", "value": "...", "confidence": 0.9}}, ...],
      "confidence": 0.0-1.0
    }},
    ...
  ],
  "history": [
    {{
      "category": "address|employment|education|travel|criminal",
      "fields": [{{"name": "city", "value": "...", "confidence": 0.9}}, ...],
      "from_date": "YYYY-MM-DD",
      "to_date": "YYYY-MM-DD or present"
    }},
    ...
  ]
}}
"#,
        display_name = display_name,
        instructions = instructions,
        fields = field_list,
    )
}

/// Generate the focused prompt used by targeted re-extraction: name exactly
/// the fields that were unreadable or failed validation, with their current
/// values, and ask for a harder look at only those.
pub fn focused_reextraction_prompt(
    config: Option<&DocumentTypeConfig>,
    focus: &[(String, Option<String>, f32)],
) -> String {
    let field_lines: Vec<String> = focus
        .iter()
        .map(|(key, value, confidence)| {
            let label = config
                .and_then(|c| c.field(key))
                .map(|f| f.label)
                .unwrap_or(key.as_str());
            format!(
                "- {} ({}): currently \"{}\" (confidence {:.0}%)",
                key,
                label,
                value.as_deref().unwrap_or("not found"),
                confidence * 100.0
            )
        })
        .collect();

    format!(
        r#"Look MORE CAREFULLY at these specific fields in the document. They were
unclear or inconsistent on the first pass:

FIELDS TO RE-EXAMINE:
{fields}

Look at the document again. Try different interpretations. Consider:
- Could characters be misread? (0/O, 1/I, 8/B, 5/S)
- Is there faded or handwritten text?
- Could the value be in a different location on the form?

RETURN FORMAT (JSON) - return ONLY the re-examined fields:
{{
  "fields": [
    {{"name": "field_key", "value": "corrected value", "confidence": 0.0-1.0}},
    ...
  ]
}}
"#,
        fields = field_lines.join("\n"),
    )
}

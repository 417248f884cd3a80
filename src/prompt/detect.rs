use crate::config::document_config;
use crate::document::DocumentType;

/// Generate the cheap classification prompt run before extraction.
pub fn document_type_prompt() -> String {
    let type_list: Vec<String> = DocumentType::all_known()
        .iter()
        .map(|t| {
            let display = document_config(*t)
                .map(|c| c.display_name)
                .unwrap_or("Document");
            format!("- {}: {}", t.key(), display)
        })
        .collect();

    format!(
        r#"Analyze this document and identify its type.

KNOWN DOCUMENT TYPES:
{types}

RETURN FORMAT (JSON):
{{"document_type": "type_key"}}

Use "unknown" if the document matches none of the known types.
"#,
        types = type_list.join("\n"),
    )
}

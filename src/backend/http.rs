//! Thin HTTP client for a vision-model gateway. The gateway receives the
//! page images plus a prompt and replies with the model's text; everything
//! interesting happens in the prompts and in the defensive JSON parsing
//! here. Tests substitute the whole client through the trait.

use crate::config::document_config;
use crate::document::{DocumentPayload, DocumentType};
use crate::error::BackendError;
use crate::extraction::strategy::ExtractionStrategy;
use crate::extraction::types::{ExtractionResult, FamilyMemberCandidate};
use crate::prompt;
use crate::TARGET_BACKEND_REQUEST;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::{ExtractionBackend, RawCritique, RawExtraction, RawVerification};

#[derive(Debug, Deserialize)]
struct GatewayReply {
    text: String,
}

pub struct HttpVisionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpVisionBackend {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        HttpVisionBackend {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn complete(
        &self,
        document: &DocumentPayload,
        prompt: String,
    ) -> Result<String, BackendError> {
        let payload = json!({
            "model": self.model,
            "media_type": document.media_type,
            "pages": document.pages,
            "prompt": prompt,
        });

        debug!(
            target: TARGET_BACKEND_REQUEST,
            "Sending {}-page request to {}",
            document.page_count(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                target: TARGET_BACKEND_REQUEST,
                "Gateway returned {}: {}", status, body
            );
            return Err(BackendError::Transport(format!("status {}", status)));
        }

        let reply: GatewayReply = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Ok(reply.text)
    }
}

/// Pull the outermost JSON object out of a model reply. Vision models wrap
/// their JSON in prose more often than not; everything outside the first
/// `{` and the last `}` is discarded before parsing.
pub fn extract_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    let start = text.find('{');
    let end = text.rfind('}');

    let (Some(start), Some(end)) = (start, end) else {
        return Err(BackendError::MalformedResponse(format!(
            "no JSON object in reply: {}",
            &text[..text.len().min(200)]
        )));
    };
    if end < start {
        return Err(BackendError::MalformedResponse(
            "unbalanced JSON object in reply".to_string(),
        ));
    }

    serde_json::from_str(&text[start..=end]).map_err(|e| {
        error!(
            target: TARGET_BACKEND_REQUEST,
            "Failed to parse reply JSON: {}. Raw content: {}",
            e,
            &text[..text.len().min(500)]
        );
        BackendError::MalformedResponse(e.to_string())
    })
}

#[async_trait]
impl ExtractionBackend for HttpVisionBackend {
    async fn extract(
        &self,
        document: &DocumentPayload,
        document_type: DocumentType,
        strategy: ExtractionStrategy,
        focus: Option<&[String]>,
    ) -> Result<RawExtraction, BackendError> {
        let config = document_config(document_type).ok();

        let prompt = match focus {
            Some(fields) => {
                let focus_entries: Vec<(String, Option<String>, f32)> = fields
                    .iter()
                    .map(|name| (name.clone(), None, 0.0))
                    .collect();
                prompt::focused_reextraction_prompt(config, &focus_entries)
            }
            None => prompt::extraction_prompt(config, strategy),
        };

        let text = self.complete(document, prompt).await?;
        extract_json_object(&text)
    }

    async fn critique(
        &self,
        document: &DocumentPayload,
        merged: &ExtractionResult,
    ) -> Result<RawCritique, BackendError> {
        let text = self
            .complete(document, prompt::critique_prompt(merged))
            .await?;
        extract_json_object(&text)
    }

    async fn verify_member(
        &self,
        document: &DocumentPayload,
        candidate: &FamilyMemberCandidate,
    ) -> Result<RawVerification, BackendError> {
        let text = self
            .complete(document, prompt::member_verification_prompt(candidate))
            .await?;
        extract_json_object(&text)
    }

    async fn detect_document_type(
        &self,
        document: &DocumentPayload,
    ) -> Result<String, BackendError> {
        #[derive(Deserialize)]
        struct TypeReply {
            document_type: String,
        }

        let text = self
            .complete(document, prompt::document_type_prompt())
            .await?;
        let reply: TypeReply = extract_json_object(&text)?;
        Ok(reply.document_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_from_prose() {
        let text = r#"Here is the extraction you asked for:
{"confidence": 0.9, "fields": [{"name": "first_name", "value": "Amina", "confidence": 0.9}]}
Let me know if you need anything else."#;

        let raw: RawExtraction = extract_json_object(text).unwrap();
        assert_eq!(raw.fields.len(), 1);
        assert_eq!(raw.fields[0].value, "Amina");
    }

    #[test]
    fn test_extract_json_object_rejects_no_json() {
        let result: Result<RawExtraction, _> = extract_json_object("I could not read the document");
        assert!(matches!(result, Err(BackendError::MalformedResponse(_))));
    }

    #[test]
    fn test_extract_json_object_rejects_invalid_json() {
        let result: Result<RawExtraction, _> = extract_json_object("{not json}");
        assert!(matches!(result, Err(BackendError::MalformedResponse(_))));
    }
}

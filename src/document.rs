use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known intake document types. The extraction field tables in `config` are
/// keyed by these; `Unknown` still extracts but validates against nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Questionnaire,
    Passport,
    EadCard,
    GreenCard,
    BirthCertificate,
    IdCard,
    I94,
    Unknown,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl DocumentType {
    pub fn key(&self) -> &'static str {
        match self {
            DocumentType::Questionnaire => "questionnaire",
            DocumentType::Passport => "passport",
            DocumentType::EadCard => "ead_card",
            DocumentType::GreenCard => "green_card",
            DocumentType::BirthCertificate => "birth_certificate",
            DocumentType::IdCard => "id_card",
            DocumentType::I94 => "i94",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn all_known() -> &'static [DocumentType] {
        &[
            DocumentType::Questionnaire,
            DocumentType::Passport,
            DocumentType::EadCard,
            DocumentType::GreenCard,
            DocumentType::BirthCertificate,
            DocumentType::IdCard,
            DocumentType::I94,
        ]
    }
}

impl From<&str> for DocumentType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "questionnaire" => DocumentType::Questionnaire,
            "passport" => DocumentType::Passport,
            "ead_card" => DocumentType::EadCard,
            "green_card" => DocumentType::GreenCard,
            "birth_certificate" => DocumentType::BirthCertificate,
            "id_card" => DocumentType::IdCard,
            "i94" => DocumentType::I94,
            _ => DocumentType::Unknown,
        }
    }
}

/// A scanned document ready for the vision backend: one base64-encoded image
/// per page plus the shared media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub pages: Vec<String>,
    pub media_type: String,
    pub source_name: String,
}

impl DocumentPayload {
    /// Wrap already-rendered page images. Page order is document order.
    pub fn from_page_images(pages: Vec<Vec<u8>>, media_type: &str, source_name: &str) -> Self {
        DocumentPayload {
            pages: pages.iter().map(|p| BASE64.encode(p)).collect(),
            media_type: media_type.to_string(),
            source_name: source_name.to_string(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

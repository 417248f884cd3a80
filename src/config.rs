//! Document type tables: which fields each intake document carries, how each
//! field maps onto the record store, and which fields are required before a
//! proposal should be trusted.

use crate::document::DocumentType;
use crate::error::PipelineError;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// How a field's value is normalized for comparison against the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Phone,
    Identifier,
}

/// One extractable field of a document type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
    /// Record-store attribute this field maps to. `None` for document-only
    /// fields (passport numbers, card categories) that are never reconciled.
    pub store_attribute: Option<&'static str>,
    /// Whether the attribute lives on the biographic record rather than the
    /// contact record in the external store.
    pub biographic: bool,
    pub kind: FieldKind,
}

impl FieldDef {
    const fn contact(key: &'static str, label: &'static str, attr: &'static str) -> Self {
        FieldDef {
            key,
            label,
            store_attribute: Some(attr),
            biographic: false,
            kind: FieldKind::Text,
        }
    }

    const fn biographic(key: &'static str, label: &'static str, attr: &'static str) -> Self {
        FieldDef {
            key,
            label,
            store_attribute: Some(attr),
            biographic: true,
            kind: FieldKind::Text,
        }
    }

    const fn document_only(key: &'static str, label: &'static str) -> Self {
        FieldDef {
            key,
            label,
            store_attribute: None,
            biographic: false,
            kind: FieldKind::Text,
        }
    }

    const fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Field table plus required-field list for one document type.
#[derive(Debug, Clone)]
pub struct DocumentTypeConfig {
    pub display_name: &'static str,
    pub fields: Vec<FieldDef>,
    pub required: Vec<&'static str>,
}

impl DocumentTypeConfig {
    pub fn field(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }
}

lazy_static! {
    static ref DOCUMENT_TYPES: HashMap<DocumentType, DocumentTypeConfig> = {
        let mut map = HashMap::new();

        map.insert(
            DocumentType::Questionnaire,
            DocumentTypeConfig {
                display_name: "Client Questionnaire",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("middle_name", "Middle Name", "MiddleName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("place_of_birth", "Place of Birth", "BirthCity"),
                    FieldDef::biographic("country_of_birth", "Country of Birth", "BirthCountry"),
                    FieldDef::biographic("gender", "Gender", "Gender"),
                    FieldDef::biographic("marital_status", "Marital Status", "MaritalStatus"),
                    FieldDef::biographic("nationality", "Nationality", "Citizenship1Country"),
                    FieldDef::contact("cell_phone", "Cell Phone", "CellPhone")
                        .kind(FieldKind::Phone),
                    FieldDef::contact("home_phone", "Home Phone", "HomePhone")
                        .kind(FieldKind::Phone),
                    FieldDef::contact("email", "Email", "EmailPersonal"),
                    FieldDef::contact("address_line1", "Address Line 1", "AddressLine1"),
                    FieldDef::contact("address_line2", "Address Line 2", "AddressLine2"),
                    FieldDef::contact("city", "City", "City"),
                    FieldDef::contact("state", "State", "State"),
                    FieldDef::contact("zip_code", "ZIP Code", "PostalZipCode"),
                    FieldDef::biographic("a_number", "A-Number", "AlienNumber")
                        .kind(FieldKind::Identifier),
                    FieldDef::biographic("date_of_entry", "Date of Entry", "DateOfEntryToUsa")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("date_of_marriage", "Date of Marriage", "MarriageDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic(
                        "immigration_status",
                        "Immigration Status",
                        "CurrentImmigrationStatus",
                    ),
                    FieldDef::biographic("native_language", "Native Language", "NativeLanguage"),
                    FieldDef::contact("employer", "Employer", "Employer"),
                    FieldDef::contact("occupation", "Occupation", "Occupation"),
                ],
                required: vec!["first_name", "last_name", "date_of_birth", "country_of_birth"],
            },
        );

        map.insert(
            DocumentType::Passport,
            DocumentTypeConfig {
                display_name: "Passport",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("place_of_birth", "Place of Birth", "BirthCity"),
                    FieldDef::biographic("nationality", "Nationality", "Citizenship1Country"),
                    FieldDef::biographic("gender", "Gender", "Gender"),
                    FieldDef::document_only("passport_number", "Passport Number"),
                    FieldDef::document_only("issue_date", "Issue Date").kind(FieldKind::Date),
                    FieldDef::document_only("expiration_date", "Expiration Date")
                        .kind(FieldKind::Date),
                    FieldDef::document_only("issuing_country", "Issuing Country"),
                ],
                required: vec![
                    "first_name",
                    "last_name",
                    "date_of_birth",
                    "passport_number",
                    "issuing_country",
                ],
            },
        );

        map.insert(
            DocumentType::EadCard,
            DocumentTypeConfig {
                display_name: "Employment Authorization Document",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("country_of_birth", "Country of Birth", "BirthCountry"),
                    FieldDef::biographic("a_number", "A-Number", "AlienNumber")
                        .kind(FieldKind::Identifier),
                    FieldDef::document_only("uscis_number", "USCIS Number"),
                    FieldDef::document_only("category", "Category"),
                    FieldDef::document_only("card_expires", "Card Expires").kind(FieldKind::Date),
                ],
                required: vec!["first_name", "last_name", "a_number", "category"],
            },
        );

        map.insert(
            DocumentType::GreenCard,
            DocumentTypeConfig {
                display_name: "Permanent Resident Card",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("country_of_birth", "Country of Birth", "BirthCountry"),
                    FieldDef::biographic("a_number", "A-Number", "AlienNumber")
                        .kind(FieldKind::Identifier),
                    FieldDef::document_only("uscis_number", "USCIS Number"),
                    FieldDef::document_only("category", "Category"),
                    FieldDef::document_only("resident_since", "Resident Since")
                        .kind(FieldKind::Date),
                    FieldDef::document_only("card_expires", "Card Expires").kind(FieldKind::Date),
                ],
                required: vec!["first_name", "last_name", "a_number"],
            },
        );

        map.insert(
            DocumentType::BirthCertificate,
            DocumentTypeConfig {
                display_name: "Birth Certificate",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("middle_name", "Middle Name", "MiddleName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic("place_of_birth", "Place of Birth", "BirthCity"),
                    FieldDef::biographic("country_of_birth", "Country of Birth", "BirthCountry"),
                    FieldDef::document_only("father_name", "Father's Name"),
                    FieldDef::document_only("mother_name", "Mother's Name"),
                ],
                required: vec!["first_name", "last_name", "date_of_birth"],
            },
        );

        map.insert(
            DocumentType::IdCard,
            DocumentTypeConfig {
                display_name: "ID Card",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::contact("address_line1", "Address", "AddressLine1"),
                    FieldDef::contact("city", "City", "City"),
                    FieldDef::contact("state", "State", "State"),
                    FieldDef::contact("zip_code", "ZIP Code", "PostalZipCode"),
                    FieldDef::document_only("id_number", "ID Number"),
                    FieldDef::document_only("issue_date", "Issue Date").kind(FieldKind::Date),
                    FieldDef::document_only("expiration_date", "Expiration Date")
                        .kind(FieldKind::Date),
                ],
                required: vec!["first_name", "last_name", "date_of_birth"],
            },
        );

        map.insert(
            DocumentType::I94,
            DocumentTypeConfig {
                display_name: "I-94 Arrival/Departure Record",
                fields: vec![
                    FieldDef::contact("first_name", "First Name", "FirstName"),
                    FieldDef::contact("last_name", "Last Name", "LastName"),
                    FieldDef::biographic("date_of_birth", "Date of Birth", "BirthDate")
                        .kind(FieldKind::Date),
                    FieldDef::biographic(
                        "country_of_citizenship",
                        "Country of Citizenship",
                        "Citizenship1Country",
                    ),
                    FieldDef::document_only("passport_number", "Passport Number"),
                    FieldDef::biographic("date_of_entry", "Date of Entry", "DateOfEntryToUsa")
                        .kind(FieldKind::Date),
                    FieldDef::document_only("class_of_admission", "Class of Admission"),
                    FieldDef::document_only("admit_until", "Admit Until Date")
                        .kind(FieldKind::Date),
                    FieldDef::document_only("i94_number", "I-94 Number"),
                ],
                required: vec!["first_name", "last_name", "date_of_entry"],
            },
        );

        map
    };
}

/// Look up the field table for a document type. A missing table is a
/// configuration gap and fails the whole run.
pub fn document_config(doc_type: DocumentType) -> Result<&'static DocumentTypeConfig, PipelineError> {
    DOCUMENT_TYPES
        .get(&doc_type)
        .ok_or_else(|| PipelineError::Configuration(doc_type.key().to_string()))
}

/// Fields expected to hold dates regardless of document type; used by
/// validation for history records and format checks.
pub const DATE_FIELD_KEYS: &[&str] = &[
    "date_of_birth",
    "date_of_entry",
    "date_of_marriage",
    "issue_date",
    "expiration_date",
    "card_expires",
    "resident_since",
    "admit_until",
    "from_date",
    "to_date",
];

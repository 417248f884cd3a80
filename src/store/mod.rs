//! Record-store seam. Read side only: reconciliation searches and fetches,
//! it never writes. The apply step that consumes a change-set lives outside
//! this crate.

pub mod http;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One contact as the record store returns it. Attributes are the store's
/// own names (`FirstName`, `BirthDate`, ...); the field tables in `config`
/// map extraction keys onto them. Biographic attributes are flattened into
/// the same map by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Record {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }
}

/// Read-side search interface of the external record store. A single shared
/// handle is reused across calls and never mutated by this crate.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Exact lookup by national identifier (digits only, as normalized).
    async fn search_by_identifier(&self, identifier: &str) -> Result<Vec<Record>, StoreError>;

    /// Name plus date-of-birth lookup. The store may fuzz the name; the
    /// matching layer re-scores what comes back.
    async fn search_by_name_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: &str,
    ) -> Result<Vec<Record>, StoreError>;

    /// Name-only lookup; may return many candidates for common names.
    async fn search_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<Vec<Record>, StoreError>;

    /// Fetch one record by id.
    async fn get_record(&self, id: i64) -> Result<Option<Record>, StoreError>;
}

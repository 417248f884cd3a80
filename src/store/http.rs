//! Thin reqwest client for the record store's search API. Contact and
//! biographic attributes are flattened into one map per record so the
//! reconciliation layer sees a single attribute namespace.

use crate::error::StoreError;
use crate::store::{Record, RecordStore};
use crate::TARGET_RECONCILE;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    data: Vec<Value>,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        HttpRecordStore {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn search(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(target: TARGET_RECONCILE, "Record store search: {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Transport(format!(
                "status {}",
                response.status()
            )));
        }

        let reply: SearchReply = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

        Ok(reply
            .data
            .iter()
            .filter_map(|value| match parse_record(value) {
                Some(record) => Some(record),
                None => {
                    warn!(
                        target: TARGET_RECONCILE,
                        "Skipping record without usable id in search reply"
                    );
                    None
                }
            })
            .collect())
    }
}

/// Flatten one store record into id, display name, and string attributes.
/// Nested objects (the biographic sub-record) are merged into the same map.
fn parse_record(value: &Value) -> Option<Record> {
    let object = value.as_object()?;
    let id = object.get("Id")?.as_i64()?;
    let display_name = object
        .get("DisplayAs")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut attributes = HashMap::new();
    collect_attributes(object, &mut attributes);

    Some(Record {
        id,
        display_name,
        attributes,
    })
}

fn collect_attributes(
    object: &serde_json::Map<String, Value>,
    attributes: &mut HashMap<String, String>,
) {
    for (key, value) in object {
        match value {
            Value::String(s) if !s.is_empty() => {
                attributes.insert(key.clone(), s.clone());
            }
            Value::Number(n) => {
                attributes.insert(key.clone(), n.to_string());
            }
            Value::Object(nested) => collect_attributes(nested, attributes),
            _ => {}
        }
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn search_by_identifier(&self, identifier: &str) -> Result<Vec<Record>, StoreError> {
        self.search("contacts/search", &[("alien_number", identifier)])
            .await
    }

    async fn search_by_name_dob(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.search(
            "contacts/search",
            &[
                ("first_name", first_name),
                ("last_name", last_name),
                ("birth_date", date_of_birth),
            ],
        )
        .await
    }

    async fn search_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.search(
            "contacts/search",
            &[("first_name", first_name), ("last_name", last_name)],
        )
        .await
    }

    async fn get_record(&self, id: i64) -> Result<Option<Record>, StoreError> {
        let url = format!("{}/contacts/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Transport(format!(
                "status {}",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;

        Ok(parse_record(&value))
    }
}

//! Model types and materialized records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::snapshot::SnapshotId;

/// Kind of configuration record held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Catalog,
    Product,
    Api,
    Subscription,
}

impl ModelType {
    /// Every model type, in staging order.
    pub const ALL: [ModelType; 4] = [
        ModelType::Catalog,
        ModelType::Product,
        ModelType::Api,
        ModelType::Subscription,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelType::Catalog => "catalog",
            ModelType::Product => "product",
            ModelType::Api => "api",
            ModelType::Subscription => "subscription",
        }
    }

    /// File name prefix used by managed bundles.
    pub fn file_prefix(self) -> &'static str {
        match self {
            ModelType::Catalog => "catalogs-",
            ModelType::Product => "products-",
            ModelType::Api => "apis-",
            ModelType::Subscription => "subs-",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "catalog" | "catalogs" => Ok(ModelType::Catalog),
            "product" | "products" => Ok(ModelType::Product),
            "api" | "apis" => Ok(ModelType::Api),
            "subscription" | "subscriptions" | "subs" => Ok(ModelType::Subscription),
            other => Err(format!("unknown model type: {}", other)),
        }
    }
}

/// A fully materialized document waiting to be attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRecord {
    pub key: String,
    pub document: Value,
}

/// A record attached to a snapshot. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub model_type: ModelType,
    pub snapshot_id: SnapshotId,
    pub key: String,
    pub document: Value,
}

/// Derive a record key from a document.
///
/// Prefers an `id` field, then `info.x-ibm-name`/`info.name` with the
/// optional `info.version`. Returns `None` when the document carries neither.
pub fn document_key(document: &Value) -> Option<String> {
    match document.get("id") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Number(n)) => return Some(n.to_string()),
        _ => {}
    }

    let info = document.get("info")?;
    let name = info
        .get("x-ibm-name")
        .or_else(|| info.get("name"))
        .and_then(Value::as_str)?;
    match info.get("version") {
        Some(Value::String(v)) => Some(format!("{}:{}", name, v)),
        Some(Value::Number(v)) => Some(format!("{}:{}", name, v)),
        _ => Some(name.to_string()),
    }
}

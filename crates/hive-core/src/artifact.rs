use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured value published by one agent for consumption by others.
///
/// Keys are well-known strings (e.g. `database_schema`, `api_contract`).
/// Artifacts are append-only within a run: once stored under a key, the
/// payload never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Well-known artifact key.
    pub key: String,
    /// The agent that produced this artifact.
    pub producer: String,
    /// Schemaless structured payload.
    pub payload: serde_json::Value,
    /// Content type hint (e.g. `application/json`, `general`).
    pub content_type: String,
    /// UTC timestamp of when the artifact was first shared.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a new artifact stamped with the current time.
    pub fn new(
        key: impl Into<String>,
        producer: impl Into<String>,
        payload: serde_json::Value,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            producer: producer.into(),
            payload,
            content_type: content_type.into(),
            created_at: Utc::now(),
        }
    }
}

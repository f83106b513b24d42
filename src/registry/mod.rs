//! Dynamic room registry client.
//!
//! Rooms that are not covered by the static route rules are discovered
//! through a shared key/value store: a hash whose fields map room names to
//! JSON entries written by the booking system. The underlying client is
//! synchronous, so the fetch runs on the blocking pool once per tick. A
//! connectivity failure degrades to the empty set; it never raises into the
//! reconciliation loop.

use async_trait::async_trait;
use redis::Commands;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;

use crate::config::RegistryConfig;

#[async_trait]
pub trait RoomRegistry: Send + Sync {
    async fn fetch_registered_rooms(&self) -> HashSet<String>;
}

/// One field value of the registry hash, written by the booking system.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub room_name: String,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub prescription_id: Option<String>,
}

#[derive(Clone)]
pub struct RedisRegistry {
    client: redis::Client,
    hash_key: String,
    timeout: Duration,
    fixed_rooms: Vec<String>,
}

impl RedisRegistry {
    pub fn new(config: &RegistryConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid registry URL {}: {e}", config.url))?;

        Ok(Self {
            client,
            hash_key: config.hash_key.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            fixed_rooms: config.fixed_rooms.clone(),
        })
    }

    fn fetch_sync(&self) -> HashSet<String> {
        let mut rooms: HashSet<String> = self.fixed_rooms.iter().cloned().collect();

        let fields = match self.read_hash() {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Registry store unreachable ({}): {e}", self.hash_key);
                return rooms;
            }
        };

        for (field, value) in fields {
            match serde_json::from_str::<RegistryEntry>(&value) {
                Ok(entry) if !entry.room_name.is_empty() => {
                    let _ = rooms.insert(entry.room_name);
                }
                Ok(_) => warn!("Registry entry {field} has no room name, skipping"),
                Err(e) => warn!("Malformed registry entry {field}, skipping: {e}"),
            }
        }

        rooms
    }

    fn read_hash(&self) -> redis::RedisResult<HashMap<String, String>> {
        let mut conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.hgetall(&self.hash_key)
    }
}

#[async_trait]
impl RoomRegistry for RedisRegistry {
    async fn fetch_registered_rooms(&self) -> HashSet<String> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.fetch_sync()).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!("Registry fetch task failed: {e}");
                self.fixed_rooms.iter().cloned().collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_decodes_registry_json() {
        let entry: RegistryEntry = serde_json::from_str(
            r#"{"roomName":"consult-4711","topicId":"t-1","prescriptionId":"rx-9"}"#,
        )
        .unwrap();
        assert_eq!(entry.room_name, "consult-4711");
        assert_eq!(entry.topic_id.as_deref(), Some("t-1"));
        assert_eq!(entry.prescription_id.as_deref(), Some("rx-9"));
    }

    #[test]
    fn test_entry_tolerates_missing_optional_fields() {
        let entry: RegistryEntry =
            serde_json::from_str(r#"{"roomName":"consult-4711"}"#).unwrap();
        assert!(entry.topic_id.is_none());
        assert!(entry.prescription_id.is_none());
    }

    #[test]
    fn test_malformed_entry_is_an_error() {
        assert!(serde_json::from_str::<RegistryEntry>("{not json").is_err());
        assert!(serde_json::from_str::<RegistryEntry>(r#"{"other":1}"#).is_err());
    }
}

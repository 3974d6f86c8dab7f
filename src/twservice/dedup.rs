//! Published-record set store.
//!
//! Concentration crawls are expensive (five pages per security), so every
//! published security is recorded under its date key and skipped on the
//! next run. The store is a collaborator: multi-replica deployments back
//! this trait with a shared service, the in-memory implementation covers
//! single-replica runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::twcommon::error::Result;

#[async_trait]
pub trait SetStore: Send + Sync {
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn set_expire(&self, key: &str, deadline: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
struct SetEntry {
    members: HashSet<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process store with lazy expiry.
#[derive(Default)]
pub struct MemorySetStore {
    entries: Mutex<HashMap<String, SetEntry>>,
}

impl MemorySetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn evict_expired(entries: &mut HashMap<String, SetEntry>) {
        let now = Utc::now();
        entries.retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
    }
}

#[async_trait]
impl SetStore for MemorySetStore {
    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("set store poisoned");
        Self::evict_expired(&mut entries);

        entries
            .entry(key.to_string())
            .or_default()
            .members
            .insert(member.to_string());

        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().expect("set store poisoned");
        Self::evict_expired(&mut entries);

        Ok(entries
            .get(key)
            .map(|entry| entry.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_expire(&self, key: &str, deadline: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.lock().expect("set store poisoned");

        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_members_round_trip() {
        let store = MemorySetStore::new();
        store.sadd("20220525", "2330").await.unwrap();
        store.sadd("20220525", "3704").await.unwrap();
        store.sadd("20220525", "2330").await.unwrap();

        let mut members = store.smembers("20220525").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["2330", "3704"]);
        assert!(store.smembers("20220526").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_keys_vanish() {
        let store = MemorySetStore::new();
        store.sadd("20220525", "2330").await.unwrap();
        store
            .set_expire("20220525", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.smembers("20220525").await.unwrap().is_empty());
    }
}

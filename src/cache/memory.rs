//! In-process cache tier.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{CacheEntry, CacheKey, CacheTier, CacheTierBackend, TierResult};

/// Memory tier backed by a concurrent map of shared entries
///
/// Replacing the `Arc` is the atomic publish step: a reader holds either the
/// old entry or the new one, never a mix.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
}

impl MemoryTier {
    /// Create an empty tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tier is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheTierBackend for MemoryTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Memory
    }

    async fn get(&self, key: &CacheKey) -> TierResult<Option<Arc<CacheEntry>>> {
        Ok(self.entries.get(key).map(|e| Arc::clone(e.value())))
    }

    async fn put(&self, entry: Arc<CacheEntry>) -> TierResult<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> TierResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan(&self) -> TierResult<Vec<Arc<CacheEntry>>> {
        Ok(self.entries.iter().map(|e| Arc::clone(e.value())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryNode, NodeKind};
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_replaces_whole_entry() {
        let tier = MemoryTier::new();
        let key = CacheKey::datacenters("vc01");

        let first = Arc::new(CacheEntry::new(
            key.clone(),
            vec![InventoryNode::new(NodeKind::Datacenter, "dc-1", "A")],
            Duration::from_secs(60),
        ));
        let second = Arc::new(CacheEntry::new(
            key.clone(),
            vec![
                InventoryNode::new(NodeKind::Datacenter, "dc-2", "B"),
                InventoryNode::new(NodeKind::Datacenter, "dc-3", "C"),
            ],
            Duration::from_secs(60),
        ));

        tier.put(first.clone()).await.unwrap();
        let held = tier.get(&key).await.unwrap().unwrap();
        tier.put(second).await.unwrap();

        // A reader that fetched before the replace still sees the old entry
        assert_eq!(held.len(), 1);
        assert_eq!(tier.get(&key).await.unwrap().unwrap().len(), 2);
        assert_eq!(tier.len(), 1);

        tier.invalidate(&key).await.unwrap();
        assert!(tier.get(&key).await.unwrap().is_none());
        assert!(tier.is_empty());
    }
}

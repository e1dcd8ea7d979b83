//! Relay destination binding.
use crate::relay::error::RelayResult;
use crate::storage::StateStore;

/// Resolves the single relay destination: the runtime binding in the store,
/// else the configured fallback.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    fallback: Option<String>,
}

impl ChannelRegistry {
    pub fn new(fallback: Option<String>) -> Self {
        Self {
            fallback: fallback.filter(|f| !f.trim().is_empty()),
        }
    }

    /// Overwrite the binding and persist. Rebinding to the same or another
    /// destination is not guarded.
    pub async fn bind(&self, store: &mut StateStore, channel_id: &str) -> RelayResult<()> {
        store.set_channel_id(channel_id).await?;
        Ok(())
    }

    pub fn get(&self, store: &StateStore) -> Option<String> {
        store
            .channel_id()
            .map(str::to_string)
            .or_else(|| self.fallback.clone())
    }
}

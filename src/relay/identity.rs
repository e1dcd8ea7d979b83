//! Alias issuance.
//!
//! Aliases look like `IT-407`: the role name, a hyphen and a number in
//! [ALIAS_MIN]..=[ALIAS_MAX], so each role has 900 slots. Uniqueness is checked
//! exactly against every alias currently held in the store.
//!
//! Issuance first tries up to [RANDOM_DRAWS] uniform random draws. If all of
//! them collide it enumerates the free slots for the role and picks one of
//! those uniformly; when there are none it fails with
//! [RelayError::AliasSpaceExhausted]. The result is the same distribution as
//! unbounded re-drawing, without the livelock once a role fills up.
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::metrics;
use crate::relay::error::{RelayError, RelayResult};
use crate::relay::roles::Role;
use crate::storage::{StateStore, UserRecord};

pub const ALIAS_MIN: u16 = 100;
pub const ALIAS_MAX: u16 = 999;
const RANDOM_DRAWS: usize = 32;

pub fn format_alias(role: Role, n: u16) -> String {
    format!("{}-{:03}", role, n)
}

pub struct IdentityManager {
    rng: StdRng,
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityManager {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic alias sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Return the user's alias, creating and persisting one if needed.
    ///
    /// An existing alias/role pair is returned untouched and `role_hint` is
    /// ignored. Otherwise the role is `role_hint` (or [Role::DEFAULT]) and the
    /// new record is durable before this returns.
    pub async fn resolve_or_create(
        &mut self,
        store: &mut StateStore,
        user_id: &str,
        role_hint: Option<Role>,
    ) -> RelayResult<String> {
        let existing = store.get(user_id).cloned().unwrap_or_default();
        if let Some((alias, _)) = existing.identity() {
            return Ok(alias.to_string());
        }
        let role = role_hint.unwrap_or(Role::DEFAULT);
        let alias = self.next_alias(store, role)?;
        let mut record = UserRecord::new(alias.clone(), role);
        record.banned = existing.banned;
        store.upsert(user_id, record).await?;
        metrics::inc_aliases_issued();
        debug!("Issued alias {} to user {}", alias, user_id);
        Ok(alias)
    }

    fn next_alias(&mut self, store: &StateStore, role: Role) -> RelayResult<String> {
        let taken = store.assigned_aliases();
        for _ in 0..RANDOM_DRAWS {
            let candidate = format_alias(role, self.rng.gen_range(ALIAS_MIN..=ALIAS_MAX));
            if !taken.contains(candidate.as_str()) {
                return Ok(candidate);
            }
        }
        let free: Vec<String> = (ALIAS_MIN..=ALIAS_MAX)
            .map(|n| format_alias(role, n))
            .filter(|a| !taken.contains(a.as_str()))
            .collect();
        match free.choose(&mut self.rng) {
            Some(alias) => Ok(alias.clone()),
            None => {
                warn!("Alias space for role {} is exhausted", role);
                Err(RelayError::AliasSpaceExhausted { role })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_format_is_zero_padded() {
        assert_eq!(format_alias(Role::It, 407), "IT-407");
        assert_eq!(format_alias(Role::Cn, 100), "CN-100");
    }

    #[tokio::test]
    async fn role_is_sticky() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(&tmp.path().to_string_lossy(), "db.json")
            .await
            .unwrap();
        let mut ids = IdentityManager::with_seed(7);
        let first = ids
            .resolve_or_create(&mut store, "u1", Some(Role::Cn))
            .await
            .unwrap();
        assert!(first.starts_with("CN-"));
        let again = ids
            .resolve_or_create(&mut store, "u1", Some(Role::It))
            .await
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(store.get("u1").unwrap().role, Some(Role::Cn));
    }

    #[tokio::test]
    async fn missing_hint_defaults_to_it() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(&tmp.path().to_string_lossy(), "db.json")
            .await
            .unwrap();
        let mut ids = IdentityManager::with_seed(1);
        let alias = ids.resolve_or_create(&mut store, "u9", None).await.unwrap();
        assert!(alias.starts_with("IT-"));
    }
}

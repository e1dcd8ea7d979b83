//! Ban flag checks and mutation.
//!
//! Authorization happens in the admin command path before [ban] is called;
//! this module only reads and writes state.
use crate::relay::error::{RelayError, RelayResult};
use crate::storage::StateStore;

/// False for unknown users.
pub fn is_banned(store: &StateStore, user_id: &str) -> bool {
    store.get(user_id).is_some_and(|r| r.banned)
}

/// Set the ban flag on the record holding `alias` and persist it.
///
/// Returns the banned user's id. Banning an already banned alias succeeds
/// and rewrites the same state.
pub async fn ban(store: &mut StateStore, alias: &str) -> RelayResult<String> {
    let (user_id, mut record) = store
        .find_by_alias(alias)
        .map(|(id, r)| (id.to_string(), r.clone()))
        .ok_or_else(|| RelayError::AliasNotFound(alias.to_string()))?;
    record.banned = true;
    store.upsert(&user_id, record).await?;
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::roles::Role;
    use crate::storage::UserRecord;

    #[tokio::test]
    async fn ban_sets_flag_and_unknown_alias_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();
        let mut store = StateStore::load(&dir, "db.json").await.unwrap();
        store
            .upsert("5", UserRecord::new("CN-321".into(), Role::Cn))
            .await
            .unwrap();
        assert!(!is_banned(&store, "5"));
        assert!(!is_banned(&store, "nobody"));

        assert_eq!(ban(&mut store, "CN-321").await.unwrap(), "5");
        assert!(is_banned(&store, "5"));

        let err = ban(&mut store, "IT-999").await.unwrap_err();
        assert!(matches!(err, RelayError::AliasNotFound(a) if a == "IT-999"));

        let reloaded = StateStore::load(&dir, "db.json").await.unwrap();
        assert!(is_banned(&reloaded, "5"));
    }
}

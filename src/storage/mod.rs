//! # Storage Module - State Store
//!
//! This module owns every piece of durable relay state: one [UserRecord] per
//! participant and the [PersistedConfig] singleton holding the bound channel.
//! No other component keeps its own copy; reads go through [StateStore] and
//! every mutation is a read-modify-write followed by a flush of the whole
//! document.
//!
//! ## Layout
//!
//! ```text
//! data/
//! └── db.json   ← { "users": { "<id>": { alias, role, banned, joined_at } },
//!                   "config": { "channel_id": ... } }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anonrelay::storage::StateStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = StateStore::load("./data", "db.json").await?;
//!     println!("{} users", store.stats().total);
//!     Ok(())
//! }
//! ```
//!
//! ## Durability
//!
//! - **Atomic rewrite**: the full document is written to a temp file, fsynced
//!   and renamed over the destination under an exclusive `fs2` lock.
//! - **Flush before reply**: [StateStore::upsert] and
//!   [StateStore::set_channel_id] return only after the rename. On a failed
//!   write the in-memory change is rolled back so memory never runs ahead of
//!   disk.
//! - **Strict load**: a present but unreadable or unparsable document is an
//!   error, never a silent reset to empty.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::relay::roles::Role;

/// Storage failures. Any of these at startup means the relay must not serve.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state document {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-participant record, keyed by the transport's opaque user id.
///
/// `alias` and `role` are either both set or both unset; see
/// [UserRecord::identity].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(alias: String, role: Role) -> Self {
        Self {
            alias: Some(alias),
            role: Some(role),
            banned: false,
            joined_at: Some(Utc::now()),
        }
    }

    /// Alias and role, only when both are assigned.
    pub fn identity(&self) -> Option<(&str, Role)> {
        match (&self.alias, self.role) {
            (Some(alias), Some(role)) => Some((alias.as_str(), role)),
            _ => None,
        }
    }

    fn is_half_assigned(&self) -> bool {
        self.alias.is_some() != self.role.is_some()
    }
}

/// Singleton configuration persisted next to the user records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "channelId",
        deserialize_with = "opaque_id"
    )]
    pub channel_id: Option<String>,
}

/// Older documents stored numeric chat ids as JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum OpaqueId {
    Text(String),
    Number(i64),
}

fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let id: Option<OpaqueId> = Option::deserialize(deserializer)?;
    Ok(id.map(|id| match id {
        OpaqueId::Text(s) => s,
        OpaqueId::Number(n) => n.to_string(),
    }))
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub config: PersistedConfig,
}

/// Participant counts reported by the admin `stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total: usize,
    pub it: usize,
    pub cn: usize,
}

impl UserStats {
    pub fn for_role(&self, role: Role) -> usize {
        match role {
            Role::It => self.it,
            Role::Cn => self.cn,
        }
    }
}

/// Single in-process authority over relay state.
pub struct StateStore {
    path: PathBuf,
    state: StoreState,
}

impl StateStore {
    /// Load the state document from `<data_dir>/<db_file>`.
    ///
    /// Creates `data_dir` when missing. A missing or empty document yields an
    /// empty state; anything else that cannot be read or parsed fails with
    /// [StoreError].
    pub async fn load(data_dir: &str, db_file: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| StoreError::Read {
                path: data_dir.to_string(),
                source: e,
            })?;
        let path = Path::new(data_dir).join(db_file);
        let state = Self::read_document(&path).await?;
        debug!(
            "Loaded {} user record(s) from {}",
            state.users.len(),
            path.display()
        );
        Ok(StateStore { path, state })
    }

    async fn read_document(path: &Path) -> Result<StoreState, StoreError> {
        let display = path.display().to_string();
        let data = match fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreState::default()),
            Err(e) => {
                return Err(StoreError::Read {
                    path: display,
                    source: e,
                })
            }
        };
        // Only a zero-length or blank document counts as no prior state;
        // NUL padding from an interrupted write is corruption
        if data.trim().is_empty() {
            warn!("State document {} is empty; starting with no users", display);
            return Ok(StoreState::default());
        }
        if data.contains('\0') {
            return Err(StoreError::Corrupt {
                path: display,
                reason: "document contains NUL bytes".to_string(),
            });
        }
        let state: StoreState = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        if let Some((id, _)) = state.users.iter().find(|(_, r)| r.is_half_assigned()) {
            return Err(StoreError::Corrupt {
                path: display,
                reason: format!("user {id} has only one of alias/role set"),
            });
        }
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a record. No side effects.
    pub fn get(&self, user_id: &str) -> Option<&UserRecord> {
        self.state.users.get(user_id)
    }

    /// Replace the full record for `user_id` and flush.
    ///
    /// Returns only once the document containing the new record is durable.
    pub async fn upsert(&mut self, user_id: &str, record: UserRecord) -> Result<(), StoreError> {
        let previous = self.state.users.insert(user_id.to_string(), record);
        if let Err(e) = self.flush().await {
            match previous {
                Some(old) => self.state.users.insert(user_id.to_string(), old),
                None => self.state.users.remove(user_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Iterate all records in key order.
    pub fn users(&self) -> impl Iterator<Item = (&str, &UserRecord)> {
        self.state.users.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Find the unique record carrying `alias`.
    pub fn find_by_alias(&self, alias: &str) -> Option<(&str, &UserRecord)> {
        self.users().find(|(_, r)| r.alias.as_deref() == Some(alias))
    }

    /// Every alias currently assigned, across all roles.
    pub fn assigned_aliases(&self) -> HashSet<&str> {
        self.state
            .users
            .values()
            .filter_map(|r| r.alias.as_deref())
            .collect()
    }

    pub fn stats(&self) -> UserStats {
        let mut stats = UserStats {
            total: self.state.users.len(),
            ..UserStats::default()
        };
        for record in self.state.users.values() {
            match record.role {
                Some(Role::It) => stats.it += 1,
                Some(Role::Cn) => stats.cn += 1,
                None => {}
            }
        }
        stats
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.state.config.channel_id.as_deref()
    }

    /// Overwrite the persisted channel binding and flush.
    pub async fn set_channel_id(&mut self, channel_id: &str) -> Result<(), StoreError> {
        let previous = self.state.config.channel_id.replace(channel_id.to_string());
        if let Err(e) = self.flush().await {
            self.state.config.channel_id = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Rewrite the whole document. Idempotent.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.state)?;
        Self::write_file_locked(&self.path, &content)
            .await
            .map_err(|e| StoreError::Write {
                path: self.path.display().to_string(),
                source: e,
            })
    }

    /// Helper function to write content to a file with exclusive locking
    async fn write_file_locked(path: &Path, content: &str) -> std::io::Result<()> {
        use std::fs::{self, File, OpenOptions};
        use std::io::Write;

        // fs2 has no async API; the lock is held only for the rewrite below
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        lock_file.lock_exclusive()?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let base = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("db.json");
        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    let written = tmp
                        .write_all(content.as_bytes())
                        .and_then(|_| tmp.flush())
                        .and_then(|_| tmp.sync_all());
                    if let Err(e) = written {
                        drop(tmp);
                        let _ = fs::remove_file(&candidate);
                        return Err(e);
                    }
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Persist the rename (best-effort)
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }

        drop(lock_file);
        Ok(())
    }
}

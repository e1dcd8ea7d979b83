//! Test utilities & fixtures.
//! Every test gets its own temp data dir; keep the returned `TempDir` alive
//! for the duration of the test.
#![allow(dead_code)]

use anonrelay::config::{
    AccessConfig, Config, LoggingConfig, RelayConfig, StorageConfig, TelegramConfig,
    DEFAULT_MAX_MESSAGE_LEN,
};
use serde_json::Value;

pub const ADMIN: &str = "42";
pub const CODE_IT: &str = "itcode2024";
pub const CODE_CN: &str = "cn-code-2024";
pub const CHANNEL: &str = "-100123";

pub fn base_config() -> (Config, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = Config {
        relay: RelayConfig {
            admin_id: ADMIN.into(),
            default_channel_id: None,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        },
        access: AccessConfig {
            code_it: CODE_IT.into(),
            code_cn: CODE_CN.into(),
        },
        storage: StorageConfig {
            data_dir: tmp.path().join("data").to_str().unwrap().to_string(),
            db_file: "db.json".into(),
        },
        logging: LoggingConfig {
            level: "error".into(),
            file: None,
            security_file: None,
        },
        telegram: TelegramConfig::default(),
    };
    (cfg, tmp)
}

/// Write a raw state document where the store will look for it.
pub fn seed_state(cfg: &Config, doc: &Value) {
    let dir = std::path::Path::new(&cfg.storage.data_dir);
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(&cfg.storage.db_file),
        serde_json::to_vec_pretty(doc).unwrap(),
    )
    .unwrap();
}

/// Path of the state document for `cfg`.
pub fn state_path(cfg: &Config) -> std::path::PathBuf {
    std::path::Path::new(&cfg.storage.data_dir).join(&cfg.storage.db_file)
}

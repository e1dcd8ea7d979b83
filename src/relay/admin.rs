//! Admin commands: `bind`, `stats`, `ban <alias>`.
//!
//! Only the configured admin identity may run them. For anyone else they are
//! silent no-ops so their existence is not revealed. Handling lives in
//! [crate::relay::server]; this module covers parsing and reply texts.
use crate::relay::roles::Role;
use crate::relay::transport::CommandInvocation;
use crate::storage::UserStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Bind,
    Stats,
    /// Target alias; `None` when the argument is missing.
    Ban(Option<String>),
}

impl AdminCommand {
    /// Map a parsed slash command to an admin command. Names are matched
    /// case-sensitively, like the transport's own command routing.
    pub fn from_invocation(cmd: &CommandInvocation) -> Option<Self> {
        match cmd.name.as_str() {
            "bind" => Some(AdminCommand::Bind),
            "stats" => Some(AdminCommand::Stats),
            "ban" => Some(AdminCommand::Ban(cmd.args.first().cloned())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::Bind => "bind",
            AdminCommand::Stats => "stats",
            AdminCommand::Ban(_) => "ban",
        }
    }
}

/// What an admin command did, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// Sender is not the admin; nothing was read or sent.
    Unauthorized,
    Bound(String),
    /// `/bind` sent by the admin outside a channel.
    BindHint,
    Stats(UserStats),
    Banned { alias: String, user_id: String },
    AliasNotFound(String),
    BanUsage,
}

pub const BIND_OK: &str = "✅ Channel bound as the relay room.";
pub const BIND_HINT: &str = "Run /bind directly in the CHANNEL as admin.";
pub const BAN_USAGE: &str = "Usage: /ban <alias>";
pub const ALIAS_NOT_FOUND: &str = "Alias not found.";

pub fn stats_reply(stats: &UserStats) -> String {
    let per_role: Vec<String> = Role::ALL
        .iter()
        .map(|role| format!("{}: {}", role, stats.for_role(*role)))
        .collect();
    format!("👥 Users: {} ({})", stats.total, per_role.join(", "))
}

pub fn banned_reply(alias: &str) -> String {
    format!("🚫 Banned {}", alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_admin_commands() {
        let ban = CommandInvocation::parse("/ban IT-407").unwrap();
        assert_eq!(
            AdminCommand::from_invocation(&ban),
            Some(AdminCommand::Ban(Some("IT-407".into())))
        );
        let bare = CommandInvocation::parse("/ban").unwrap();
        assert_eq!(AdminCommand::from_invocation(&bare), Some(AdminCommand::Ban(None)));
        let start = CommandInvocation::parse("/start").unwrap();
        assert_eq!(AdminCommand::from_invocation(&start), None);
        let upper = CommandInvocation::parse("/STATS").unwrap();
        assert_eq!(AdminCommand::from_invocation(&upper), None);
    }

    #[test]
    fn stats_format() {
        let stats = UserStats { total: 5, it: 3, cn: 2 };
        assert_eq!(stats_reply(&stats), "👥 Users: 5 (IT: 3, CN: 2)");
    }
}

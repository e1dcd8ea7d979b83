//! Access gate: classify inbound private text as an access code or not.
//!
//! Classification is two-stage. Text that does not have the token shape
//! (see [looks_like_access_code]) is never compared against the codes; text
//! that does is compared by exact, case-sensitive string equality. Anything
//! that is not a match comes back as [Classification::NotACode] and the
//! caller hands it to the relay pipeline unchanged.
use log::info;

use crate::config::AccessConfig;
use crate::relay::error::RelayResult;
use crate::relay::identity::IdentityManager;
use crate::relay::roles::Role;
use crate::storage::StateStore;
use crate::validation::looks_like_access_code;

/// Result of classifying a piece of private text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    CodeMatch(Role),
    NotACode,
}

/// Role and alias returned after a successful code match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub role: Role,
    pub alias: String,
}

/// Outcome of [AccessGate::validate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Granted(AccessGrant),
    NotACode,
}

pub struct AccessGate {
    code_it: String,
    code_cn: String,
}

impl AccessGate {
    pub fn new(access: &AccessConfig) -> Self {
        Self {
            code_it: access.code_it.clone(),
            code_cn: access.code_cn.clone(),
        }
    }

    /// Classify `text` (already trimmed by the caller).
    pub fn classify(&self, text: &str) -> Classification {
        if !looks_like_access_code(text) {
            return Classification::NotACode;
        }
        if text == self.code_it {
            Classification::CodeMatch(Role::It)
        } else if text == self.code_cn {
            Classification::CodeMatch(Role::Cn)
        } else {
            Classification::NotACode
        }
    }

    /// Classify and, on a match, resolve or create the user's identity.
    ///
    /// A user who already has an alias keeps it and keeps their role, whatever
    /// code they submit.
    pub async fn validate(
        &self,
        store: &mut StateStore,
        identity: &mut IdentityManager,
        user_id: &str,
        text: &str,
    ) -> RelayResult<GateResult> {
        let hint = match self.classify(text) {
            Classification::CodeMatch(role) => role,
            Classification::NotACode => return Ok(GateResult::NotACode),
        };
        let alias = identity.resolve_or_create(store, user_id, Some(hint)).await?;
        let role = store
            .get(user_id)
            .and_then(|r| r.role)
            .unwrap_or(hint);
        info!("Access granted to user {} as {} ({})", user_id, alias, role);
        Ok(GateResult::Granted(AccessGrant { role, alias }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AccessGate {
        AccessGate::new(&AccessConfig {
            code_it: "pizza-2024".into(),
            code_cn: "DUMPLING_88".into(),
        })
    }

    #[test]
    fn exact_match_only() {
        let g = gate();
        assert_eq!(g.classify("pizza-2024"), Classification::CodeMatch(Role::It));
        assert_eq!(g.classify("DUMPLING_88"), Classification::CodeMatch(Role::Cn));
        assert_eq!(g.classify("PIZZA-2024"), Classification::NotACode);
        assert_eq!(g.classify("pizza-20245"), Classification::NotACode);
        assert_eq!(g.classify("pizza"), Classification::NotACode);
    }

    #[test]
    fn free_text_skips_matching() {
        let g = gate();
        assert_eq!(g.classify("pizza-2024 please"), Classification::NotACode);
        assert_eq!(g.classify("hi there"), Classification::NotACode);
    }
}

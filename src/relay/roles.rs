//! Participant roles.
//!
//! A role is derived from which access code a participant submitted and never
//! changes afterwards. It also forms the prefix of the participant's alias
//! (`IT-407`, `CN-118`). Use [Role::as_str] for display and alias building.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role assigned on first successful access-code validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "IT")]
    It,
    #[serde(rename = "CN")]
    Cn,
}

impl Role {
    /// All roles in display order (used by stats).
    pub const ALL: [Role; 2] = [Role::It, Role::Cn];

    /// Role used when no hint is given.
    pub const DEFAULT: Role = Role::It;

    pub fn as_str(self) -> &'static str {
        match self {
            Role::It => "IT",
            Role::Cn => "CN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    /// Exact, case-sensitive match on the canonical role name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IT" => Ok(Role::It),
            "CN" => Ok(Role::Cn),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_is_exact() {
        assert_eq!("CN".parse::<Role>(), Ok(Role::Cn));
        assert!("cn".parse::<Role>().is_err());
        assert!("XX".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_canonical_names() {
        assert_eq!(serde_json::to_string(&Role::Cn).unwrap(), "\"CN\"");
        let r: Role = serde_json::from_str("\"IT\"").unwrap();
        assert_eq!(r, Role::It);
    }
}

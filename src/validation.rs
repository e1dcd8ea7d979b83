//! Input validation for access codes, relay text and admin arguments.

/// Minimum length of text considered for access-code matching.
pub const MIN_CODE_LEN: usize = 4;

/// Configuration problems detected before the relay starts serving.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("admin id is empty (set [relay].admin_id or ADMIN_ID)")]
    MissingAdmin,

    #[error("access code for {role} is empty")]
    EmptyCode { role: &'static str },

    #[error("access code for {role} is not a token (min {min} chars of letters, digits, '-' or '_')")]
    MalformedCode { role: &'static str, min: usize },

    #[error("IT and CN access codes must differ")]
    DuplicateCodes,

    #[error("max_message_len must be greater than zero")]
    ZeroMessageLimit,
}

/// Whether `text` has the shape of an access code: at least [MIN_CODE_LEN]
/// ASCII letters, digits, hyphens or underscores and nothing else.
///
/// Free text (spaces, punctuation, non-ASCII) never qualifies.
pub fn looks_like_access_code(text: &str) -> bool {
    text.len() >= MIN_CODE_LEN
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Length in UTF-16 code units, the unit the message cap is expressed in.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Validate the two configured access codes.
pub fn validate_access_codes(code_it: &str, code_cn: &str) -> Result<(), ConfigError> {
    for (role, code) in [("IT", code_it), ("CN", code_cn)] {
        if code.is_empty() {
            return Err(ConfigError::EmptyCode { role });
        }
        if !looks_like_access_code(code) {
            return Err(ConfigError::MalformedCode {
                role,
                min: MIN_CODE_LEN,
            });
        }
    }
    if code_it == code_cn {
        return Err(ConfigError::DuplicateCodes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_shape() {
        assert!(looks_like_access_code("ABCD"));
        assert!(looks_like_access_code("it_2024-spring"));
        assert!(!looks_like_access_code("abc"));
        assert!(!looks_like_access_code("hi there"));
        assert!(!looks_like_access_code("ciao!"));
        assert!(!looks_like_access_code("códice"));
        assert!(!looks_like_access_code(""));
    }

    #[test]
    fn utf16_counts_surrogate_pairs() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("è"), 1);
        assert_eq!(utf16_len("😀"), 2);
    }

    #[test]
    fn access_code_rules() {
        assert_eq!(validate_access_codes("ITALIA1", "CHINA1"), Ok(()));
        assert_eq!(
            validate_access_codes("", "CHINA1"),
            Err(ConfigError::EmptyCode { role: "IT" })
        );
        assert_eq!(
            validate_access_codes("ITALIA1", "two words"),
            Err(ConfigError::MalformedCode { role: "CN", min: MIN_CODE_LEN })
        );
        assert_eq!(
            validate_access_codes("SAME1", "SAME1"),
            Err(ConfigError::DuplicateCodes)
        );
        // Case matters: these are distinct codes
        assert_eq!(validate_access_codes("code1", "CODE1"), Ok(()));
    }
}

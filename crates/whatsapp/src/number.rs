//! Phone number → recipient identifier formatting.

use std::fmt;

/// Domain marker appended to personal-chat recipient identifiers.
pub const RECIPIENT_SUFFIX: &str = "@c.us";

/// Characters users commonly type between digits.
const SEPARATORS: &[char] = &['+', ' ', '-', '.', '(', ')'];

/// The input could not be turned into a recipient identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phone number: {0:?}")]
pub struct InvalidNumber(pub String);

/// Canonical recipient address: country-code-prefixed digits followed by
/// [`RECIPIENT_SUFFIX`], or a chat id reported by the messaging client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipientId(String);

impl RecipientId {
    /// Wrap a chat id that came from the messaging client itself (e.g. the
    /// sender of an inbound message). No normalisation is applied.
    pub fn from_chat_id(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format a user-entered phone number.
///
/// Separators are stripped, a leading national `0` is replaced by
/// `country_code`, and the recipient suffix is appended. Input that already
/// carries the suffix is validated and passed through.
pub fn format_recipient(input: &str, country_code: &str) -> Result<RecipientId, InvalidNumber> {
    let invalid = || InvalidNumber(input.to_string());

    let trimmed = input.trim();
    let local = trimmed.strip_suffix(RECIPIENT_SUFFIX).unwrap_or(trimmed);

    let mut digits = String::with_capacity(local.len() + country_code.len());
    for c in local.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !SEPARATORS.contains(&c) {
            return Err(invalid());
        }
    }
    if digits.is_empty() {
        return Err(invalid());
    }

    if let Some(national) = digits.strip_prefix('0') {
        let prefix: String = country_code.chars().filter(char::is_ascii_digit).collect();
        digits = format!("{prefix}{national}");
    }

    Ok(RecipientId(format!("{digits}{RECIPIENT_SUFFIX}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(input: &str) -> Result<String, InvalidNumber> {
        format_recipient(input, "62").map(|r| r.to_string())
    }

    #[test]
    fn leading_zero_becomes_country_code() {
        assert_eq!(fmt("08123456789").unwrap(), "628123456789@c.us");
    }

    #[test]
    fn international_forms_are_normalised() {
        for input in [
            "+62 812-3456-789",
            "62 812 3456 789",
            "(62) 812.3456.789",
            "628123456789",
            " 628123456789 ",
        ] {
            assert_eq!(fmt(input).unwrap(), "628123456789@c.us", "input {input:?}");
        }
    }

    #[test]
    fn output_is_digits_then_suffix() {
        for input in ["0811", "+1 (555) 010-9999", "447700900123", "0-0-1"] {
            let out = fmt(input).unwrap();
            let local = out.strip_suffix(RECIPIENT_SUFFIX).unwrap();
            assert!(!local.is_empty());
            assert!(local.chars().all(|c| c.is_ascii_digit()), "{out}");
        }
    }

    #[test]
    fn existing_identifier_passes_through() {
        assert_eq!(fmt("628123456789@c.us").unwrap(), "628123456789@c.us");
    }

    #[test]
    fn country_code_may_carry_plus() {
        assert_eq!(
            format_recipient("07700900123", "+44").unwrap().as_str(),
            "447700900123@c.us"
        );
    }

    #[test]
    fn empty_and_malformed_input_is_rejected() {
        for input in ["", "   ", "+", "--", "call me", "0812abc", "@c.us", "62812@g.us"] {
            assert_eq!(fmt(input), Err(InvalidNumber(input.to_string())), "input {input:?}");
        }
    }
}

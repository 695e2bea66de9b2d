//! Identifier shape validation
//!
//! Identifiers are UPC/EAN style numeric strings. Anything that does not
//! have the expected shape is rejected before a session is touched.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::ItemError;

/// Shortest accepted identifier (UPC-E / EAN-8)
pub const MIN_IDENTIFIER_LEN: usize = 8;
/// Longest accepted identifier (GTIN-14)
pub const MAX_IDENTIFIER_LEN: usize = 14;

/// A validated, trimmed numeric identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validates the raw input shape: trimmed, ASCII digits only, 8..=14 long.
    pub fn parse(raw: &str) -> Result<Self, ItemError> {
        let trimmed = normalize_identifier(raw);
        let len = trimmed.len();
        let numeric = !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit());

        if numeric && (MIN_IDENTIFIER_LEN..=MAX_IDENTIFIER_LEN).contains(&len) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ItemError::InvalidFormat {
                identifier: trimmed.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalized form used for checkpoint and output keys.
pub fn normalize_identifier(raw: &str) -> &str {
    raw.trim()
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = ItemError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12345")]
    #[case("ABCDEFGH")]
    #[case("")]
    #[case("   ")]
    #[case("123456789012345")]
    #[case("0123-45678912")]
    #[case("１２３４５６７８")]
    fn rejects_malformed_shapes(#[case] raw: &str) {
        let err = Identifier::parse(raw).unwrap_err();
        assert!(matches!(err, ItemError::InvalidFormat { .. }), "{raw:?} -> {err:?}");
    }

    #[rstest]
    #[case("12345678")]
    #[case("012345678912")]
    #[case("12345678901234")]
    #[case("  0012345678905 ")]
    fn accepts_numeric_identifiers(#[case] raw: &str) {
        let id = Identifier::parse(raw).expect("valid identifier");
        assert_eq!(id.as_str(), raw.trim());
    }

    #[test]
    fn invalid_format_keeps_trimmed_input_for_the_record() {
        match Identifier::parse(" 12345 ") {
            Err(ItemError::InvalidFormat { identifier }) => assert_eq!(identifier, "12345"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

//! Key names that rules bind to and request presses for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key assigned to freshly created key-shaped rules.
pub const DEFAULT_KEY: &str = "D0";

/// Name of a key on the input device, stored upper-cased (`"Q"`, `"F1"`, `"D0"`).
///
/// The canonical form makes `PressKey("q")` and `PressKey("Q")` the same
/// request, which is what the press-key slot compares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

/// Errors raised when a key name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("key name is empty")]
    Empty,

    #[error("key name '{0}' contains whitespace")]
    Whitespace(String),
}

impl Key {
    /// Parse and normalise a key name.
    pub fn new(name: &str) -> Result<Self, KeyParseError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(KeyParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(KeyParseError::Whitespace(name.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// The binding new key-shaped rules start with.
    pub fn default_binding() -> Self {
        Self(DEFAULT_KEY.to_string())
    }

    /// Canonical key name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

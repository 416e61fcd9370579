//! Single-character `Y`/`N` flags as stored in the schema.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `Y`/`N` column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Flag {
    /// `Y`.
    #[serde(rename = "Y")]
    Yes,
    /// `N`.
    #[serde(rename = "N")]
    #[default]
    No,
}

impl Flag {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Y",
            Self::No => "N",
        }
    }

    /// Parse a stored column value. Anything other than `Y` (case-insensitive) is `N`.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("y") {
            Self::Yes
        } else {
            Self::No
        }
    }

    /// Whether the flag is set.
    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        assert_eq!(Flag::from_column("Y"), Flag::Yes);
        assert_eq!(Flag::from_column("y "), Flag::Yes);
        assert_eq!(Flag::from_column("N"), Flag::No);
        assert_eq!(Flag::from_column(""), Flag::No);
    }

    #[test]
    fn serializes_as_letter() {
        assert_eq!(serde_json::to_string(&Flag::Yes).unwrap(), "\"Y\"");
        assert_eq!(serde_json::to_string(&Flag::No).unwrap(), "\"N\"");
    }
}

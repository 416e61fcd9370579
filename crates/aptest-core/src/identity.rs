//! Session identity bundles and resolution-strategy selection.

use serde::{Deserialize, Serialize};

/// What the identity provider tells us about the caller.
///
/// Every field is optional; blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBundle {
    /// Provider user id, which is the account's login id.
    pub provider_user_id: Option<String>,
    /// Raw account UUID (`ac_gid`).
    pub raw_id: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
}

/// The lookup strategy chosen for a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey<'a> {
    /// Account by login id.
    ProviderUserId(&'a str),
    /// Account by global UUID.
    RawId(&'a str),
    /// Person by email, then account.
    Email(&'a str),
    /// Person by exact name, then account.
    DisplayName(&'a str),
}

impl IdentityKey<'_> {
    /// Short label for logs.
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::ProviderUserId(_) => "provider_user_id",
            Self::RawId(_) => "raw_id",
            Self::Email(_) => "email",
            Self::DisplayName(_) => "display_name",
        }
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl IdentityBundle {
    /// Pick the lookup key: the first present field in priority order.
    ///
    /// A miss on the chosen key does not fall through to later fields.
    #[must_use]
    pub fn key(&self) -> Option<IdentityKey<'_>> {
        if let Some(id) = present(self.provider_user_id.as_ref()) {
            Some(IdentityKey::ProviderUserId(id))
        } else if let Some(id) = present(self.raw_id.as_ref()) {
            Some(IdentityKey::RawId(id))
        } else if let Some(email) = present(self.email.as_ref()) {
            Some(IdentityKey::Email(email))
        } else {
            present(self.display_name.as_ref()).map(IdentityKey::DisplayName)
        }
    }
}

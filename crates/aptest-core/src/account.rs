//! Person, account and institute types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Reference from an account to the institute turn it belongs to.
///
/// Personal accounts carry `None` instead of a sentinel institute number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteRef {
    /// Institute sequence.
    pub ins_seq: i64,
    /// Turn (cohort) sequence within the institute.
    pub tur_seq: i64,
}

impl InstituteRef {
    /// Build a reference from the two nullable columns.
    ///
    /// Legacy rows used `-1` for "no institute"; both that and `NULL` map to `None`.
    #[must_use]
    pub fn from_columns(ins_seq: Option<i64>, tur_seq: Option<i64>) -> Option<Self> {
        match (ins_seq, tur_seq) {
            (Some(ins_seq), Some(tur_seq)) if ins_seq > 0 && tur_seq > 0 => {
                Some(Self { ins_seq, tur_seq })
            }
            _ => None,
        }
    }
}

/// A login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Global account id (`ac_gid`).
    pub id: AccountId,
    /// Credential id used to sign in; also the identity provider's user id.
    pub login_id: String,
    /// The person this account belongs to.
    pub person_seq: i64,
    /// Use flag. Inactive accounts never resolve.
    pub active: bool,
    /// When the account's test access expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Institute membership, if this is an organizational account.
    pub institute: Option<InstituteRef>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account's access has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Whether the account belongs to an institute.
    #[must_use]
    pub const fn is_organization(&self) -> bool {
        self.institute.is_some()
    }
}

/// Institute and turn details shown on the organization dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteInfo {
    /// Institute sequence.
    pub ins_seq: i64,
    /// Institute name.
    pub ins_name: String,
    /// Turn sequence.
    pub tur_seq: i64,
    /// Turn join code.
    pub tur_code: String,
    /// Whether the turn is usable.
    pub tur_use: bool,
    /// Number of member seats requested for the turn.
    pub tur_req_sum: i64,
    /// Number of seats already used.
    pub tur_use_sum: i64,
}

/// A member row of the organization roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Person sequence.
    pub pe_seq: i64,
    /// Member name.
    pub name: String,
    /// Member email.
    pub email: String,
    /// Member phone.
    pub phone: Option<String>,
    /// When the member joined the turn.
    pub join_date: DateTime<Utc>,
}

/// Result of looking up an institute turn by its join code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnLookup {
    /// Institute sequence.
    pub ins_seq: i64,
    /// Turn sequence.
    pub tur_seq: i64,
    /// Institute name.
    pub institute_name: String,
    /// Whether the turn is usable.
    pub usable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(expires_at: Option<DateTime<Utc>>) -> Account {
        Account {
            id: AccountId::generate(),
            login_id: "testuser".into(),
            person_seq: 1,
            active: true,
            expires_at,
            institute: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn legacy_sentinel_maps_to_none() {
        assert_eq!(InstituteRef::from_columns(Some(-1), Some(-1)), None);
        assert_eq!(InstituteRef::from_columns(None, None), None);
        assert_eq!(InstituteRef::from_columns(Some(3), None), None);
        assert_eq!(
            InstituteRef::from_columns(Some(3), Some(2)),
            Some(InstituteRef {
                ins_seq: 3,
                tur_seq: 2
            })
        );
    }

    #[test]
    fn expiration() {
        let now = Utc::now();
        assert!(!account(None).is_expired_at(now));
        assert!(!account(Some(now + Duration::days(1))).is_expired_at(now));
        assert!(account(Some(now - Duration::days(1))).is_expired_at(now));
    }
}

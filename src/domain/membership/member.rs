//! Member entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{MemberId, NewsletterId, Timestamp, ValidationError};

/// Externally visible membership status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// No entitlements and no active subscription.
    Free,
    /// Holds entitlements without a paying subscription behind them.
    Comped,
    /// Backed by an active, non-complimentary subscription.
    Paid,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Free => "free",
            MemberStatus::Comped => "comped",
            MemberStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(MemberStatus::Free),
            "comped" => Ok(MemberStatus::Comped),
            "paid" => Ok(MemberStatus::Paid),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown member status '{}'", other),
            )),
        }
    }
}

/// A member of the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,

    /// Normalised (trimmed, lowercase) and unique.
    pub email: String,

    pub name: Option<String>,

    pub status: MemberStatus,

    /// Newsletters the member is subscribed to.
    pub newsletters: BTreeSet<NewsletterId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Member {
    /// Creates a free member with no newsletters.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the email is empty or malformed.
    pub fn new(email: &str, name: Option<String>) -> Result<Self, ValidationError> {
        let email = normalize_email(email)?;
        let now = Timestamp::now();

        Ok(Self {
            id: MemberId::new(),
            email,
            name: name.filter(|n| !n.trim().is_empty()),
            status: MemberStatus::Free,
            newsletters: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Trims and lowercases an email address, rejecting obvious garbage.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err(ValidationError::empty_field("email"));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ValidationError::invalid_format("email", "must contain '@'")),
    }
}

//! Link between a member and a billing-provider customer.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{MemberId, Timestamp};

/// A billing-provider customer owned by a member.
///
/// Created on the first successful billing linkage. Only the email is ever
/// updated afterwards, when the member changes theirs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLink {
    /// Provider customer id (e.g. `cus_...`).
    pub customer_id: String,
    pub member_id: MemberId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: Timestamp,
}

impl CustomerLink {
    pub fn new(
        customer_id: impl Into<String>,
        member_id: MemberId,
        email: Option<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            member_id,
            email,
            name,
            created_at: Timestamp::now(),
        }
    }
}

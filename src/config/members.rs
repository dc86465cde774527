//! Member reconciliation settings

use serde::Deserialize;

use crate::domain::membership::EntitlementPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembersConfig {
    /// `replace` (default) or `union`
    #[serde(default)]
    pub entitlement_policy: EntitlementPolicy,
}

//! Caller category attached to every mutating operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Where a mutation originated.
///
/// Resolved once at the transport boundary and passed explicitly into every
/// mutating command; the core never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Bulk import of existing members.
    Import,
    /// Background work such as provider webhooks.
    System,
    /// Integration API call.
    Api,
    /// Staff user acting through the admin surface.
    Admin,
    /// The member acting on their own account.
    Member,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Import => "import",
            EventSource::System => "system",
            EventSource::Api => "api",
            EventSource::Admin => "admin",
            EventSource::Member => "member",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import" => Ok(EventSource::Import),
            "system" => Ok(EventSource::System),
            "api" => Ok(EventSource::Api),
            "admin" => Ok(EventSource::Admin),
            "member" => Ok(EventSource::Member),
            other => Err(ValidationError::invalid_format(
                "source",
                format!("unknown event source '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_variant_from_its_display() {
        for source in [
            EventSource::Import,
            EventSource::System,
            EventSource::Api,
            EventSource::Admin,
            EventSource::Member,
        ] {
            assert_eq!(source.to_string().parse::<EventSource>().unwrap(), source);
        }
    }

    #[test]
    fn rejects_unknown_source() {
        assert!("webhook".parse::<EventSource>().is_err());
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted CAF reference number.
pub const MAX_CAF_REF_NO_LEN: usize = 64;

/// Errors raised when parsing an externally supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} contains invalid character {found:?}")]
    InvalidCharacter { field: &'static str, found: char },
}

/// Internal surrogate key of a CAF record.
///
/// Wraps a UUID so it cannot be confused with outbox or audit identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CafId(Uuid);

impl CafId {
    /// Creates a new random CAF ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a CAF ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CafId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CafId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CafId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Externally supplied CAF reference number, the idempotency key for ingestion.
///
/// Restricted to ASCII alphanumerics plus `-`, `_` and `.` because it is
/// embedded in correlation ids and URL paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CafRefNo(String);

impl CafRefNo {
    /// Parses and validates a reference number. Surrounding whitespace is trimmed.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(IdentifierError::Empty("caf_ref_no"));
        }
        if value.len() > MAX_CAF_REF_NO_LEN {
            return Err(IdentifierError::TooLong {
                field: "caf_ref_no",
                max: MAX_CAF_REF_NO_LEN,
            });
        }
        if let Some(found) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(IdentifierError::InvalidCharacter {
                field: "caf_ref_no",
                found,
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CafRefNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CafRefNo {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CafRefNo> for String {
    fn from(value: CafRefNo) -> Self {
        value.0
    }
}

impl AsRef<str> for CafRefNo {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key linking a dispatched integration request to its acknowledgement.
///
/// Generated as `<TARGET>-<caf_ref_no>-<suffix>` where the suffix is a random
/// UUID in simple (hex) form, so repeated dispatches never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh correlation id for the given target prefix and CAF.
    pub fn generate(target: &str, caf_ref_no: &CafRefNo) -> Self {
        Self(format!(
            "{}-{}-{}",
            target,
            caf_ref_no,
            Uuid::new_v4().simple()
        ))
    }

    /// Wraps an already-issued correlation id, e.g. from a callback path.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Operational zone code. Normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoneCode(String);

impl ZoneCode {
    /// Zone used when an agent has no mapping.
    pub fn default_zone() -> Self {
        Self("NORTH".to_string())
    }

    pub fn parse(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(IdentifierError::Empty("zone_code"));
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ZoneCode {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ZoneCode> for String {
    fn from(value: ZoneCode) -> Self {
        value.0
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Longest accepted object name, in bytes
pub const MAX_NAME_LEN: usize = 100;

/// A validated object name
///
/// Names double as staging file names, so they must be a single path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName(String);

impl ObjectName {
    pub fn parse(name: impl Into<String>) -> BlobResult<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(BlobError::invalid_name(name, "name is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(BlobError::invalid_name(
                name,
                format!("name is longer than {} bytes", MAX_NAME_LEN),
            ));
        }
        if name == "." || name == ".." {
            return Err(BlobError::invalid_name(name, "name is a relative path"));
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(BlobError::invalid_name(
                name,
                "name contains a path separator or control character",
            ));
        }

        Ok(Self(name))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectName {
    type Error = BlobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.0
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized backend tag (trimmed, lower-case)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendTag(String);

impl BackendTag {
    pub fn new(tag: &str) -> Self {
        Self(tag.trim().to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fencing token identifying one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadToken(pub String);

impl UploadToken {
    /// Generate a new random token
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file_names_are_accepted() {
        for name in ["report.bin", "x", "photo 2024.JPG", ".hidden", "a..b"] {
            assert_eq!(ObjectName::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn path_like_names_are_rejected() {
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0byte", "tab\tname"] {
            let err = ObjectName::parse(name).unwrap_err();
            assert!(matches!(err, BlobError::InvalidName { .. }), "{:?}", name);
        }
    }

    #[test]
    fn overlong_names_are_rejected() {
        assert!(ObjectName::parse("a".repeat(MAX_NAME_LEN)).is_ok());
        assert!(ObjectName::parse("a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn names_deserialize_through_validation() {
        let ok: ObjectName = serde_json::from_str("\"report.bin\"").unwrap();
        assert_eq!(ok.as_str(), "report.bin");
        assert!(serde_json::from_str::<ObjectName>("\"../x\"").is_err());
    }

    #[test]
    fn backend_tags_are_normalized() {
        assert_eq!(BackendTag::new("  Azure ").as_str(), "azure");
        assert!(BackendTag::new("   ").is_empty());
    }
}

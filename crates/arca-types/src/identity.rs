use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Name of an entity type exposed by a model registry.
///
/// Model ids appear verbatim in archive entry paths
/// (`attachments/<model_id>/...`), so they may not contain `/` or
/// whitespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    /// Create a model id, validating its shape.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyModelId);
        }
        if id.contains('/') || id.chars().any(char::is_whitespace) || id == "." || id == ".." {
            return Err(TypeError::InvalidModelId(id));
        }
        Ok(Self(id))
    }

    /// The model id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

impl FromStr for ModelId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({})", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical record identifier.
///
/// Rendered on the wire as a lowercase hyphenated UUID. Freshly generated
/// keys are UUID v7 so that restored records keep creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(Uuid);

impl PrimaryKey {
    /// Generate a new time-ordered key (UUID v7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl From<Uuid> for PrimaryKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for PrimaryKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TypeError::InvalidPrimaryKey(s.to_string()))
    }
}

impl fmt::Debug for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimaryKey({})", self.short_id())
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A `(model, pk)` pair naming exactly one record.
///
/// Primary keys are only unique within a model, so every graph node,
/// mapping lookup and diagnostic uses the pair.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub model: ModelId,
    pub pk: PrimaryKey,
}

impl RecordKey {
    pub fn new(model: ModelId, pk: PrimaryKey) -> Self {
        Self { model, pk }
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({}:{})", self.model, self.pk.short_id())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.pk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_id_accepts_dotted_names() {
        let id = ModelId::new("core.framework").unwrap();
        assert_eq!(id.as_str(), "core.framework");
        assert_eq!(id.to_string(), "core.framework");
    }

    #[test]
    fn model_id_rejects_empty() {
        assert_eq!(ModelId::new(""), Err(TypeError::EmptyModelId));
    }

    #[test]
    fn model_id_rejects_path_separators() {
        assert!(matches!(
            ModelId::new("core/framework"),
            Err(TypeError::InvalidModelId(_))
        ));
        assert!(matches!(ModelId::new(".."), Err(TypeError::InvalidModelId(_))));
        assert!(matches!(
            ModelId::new("core framework"),
            Err(TypeError::InvalidModelId(_))
        ));
    }

    #[test]
    fn model_id_serde_rejects_invalid() {
        let err = serde_json::from_str::<ModelId>("\"\"");
        assert!(err.is_err());
        let ok: ModelId = serde_json::from_str("\"core.control\"").unwrap();
        assert_eq!(ok.as_str(), "core.control");
    }

    #[test]
    fn primary_key_display_is_canonical() {
        let pk: PrimaryKey = "6A1F3C9E-0B7D-4C11-9E2A-1234567890AB".parse().unwrap();
        assert_eq!(pk.to_string(), "6a1f3c9e-0b7d-4c11-9e2a-1234567890ab");
        assert_eq!(pk.short_id(), "6a1f3c9e");
    }

    #[test]
    fn primary_key_parse_rejects_garbage() {
        let err = "not-a-key".parse::<PrimaryKey>().unwrap_err();
        assert_eq!(err, TypeError::InvalidPrimaryKey("not-a-key".into()));
    }

    #[test]
    fn primary_key_serializes_as_string() {
        let pk = PrimaryKey::generate();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{pk}\""));
        let back: PrimaryKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = PrimaryKey::generate();
        let b = PrimaryKey::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn record_key_display() {
        let pk: PrimaryKey = "00000000-0000-0000-0000-000000000001".parse().unwrap();
        let key = RecordKey::new(ModelId::new("core.control").unwrap(), pk);
        assert_eq!(
            key.to_string(),
            "core.control:00000000-0000-0000-0000-000000000001"
        );
    }
}

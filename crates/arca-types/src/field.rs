use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::ModelId;

/// Declared shape of a scalar field value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum ValueKind {
    Identifier,
    /// Timezone-aware instant.
    Timestamp,
    Date,
    /// Fixed-point decimal, carried as text.
    Decimal,
    Boolean,
    Integer,
    Float,
    Text,
    Bytes,
    /// Homogeneous ordered list.
    List(Box<ValueKind>),
    /// String-keyed map with homogeneous values.
    Map(Box<ValueKind>),
    /// Untyped nested document (lists, maps and plain scalars).
    Json,
}

impl ValueKind {
    pub fn list_of(inner: ValueKind) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn map_of(inner: ValueKind) -> Self {
        Self::Map(Box::new(inner))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => f.write_str("identifier"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Date => f.write_str("date"),
            Self::Decimal => f.write_str("decimal"),
            Self::Boolean => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::Bytes => f.write_str("bytes"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map(inner) => write!(f, "map<{inner}>"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// What a field holds, as declared by the model registry.
///
/// The engine never guesses field shapes: scalar kinds drive the value codec,
/// relation kinds drive dependency ordering and identifier rewriting, and
/// attachment fields are the only source of attachment blobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar { value: ValueKind },
    Attachment,
    /// Foreign key to one record of `target`.
    SingleRef { target: ModelId },
    /// Inline list of foreign keys to `target`.
    ArrayRef { target: ModelId },
    ManyToMany { target: ModelId },
}

impl FieldKind {
    /// Target model of a relation field.
    pub fn relation_target(&self) -> Option<&ModelId> {
        match self {
            Self::SingleRef { target } | Self::ArrayRef { target } | Self::ManyToMany { target } => {
                Some(target)
            }
            Self::Scalar { .. } | Self::Attachment => None,
        }
    }

    /// Whether references through this field constrain creation order.
    ///
    /// Many-to-many links are wired after every record exists and never
    /// take part in ordering.
    pub fn orders_creation(&self) -> bool {
        matches!(self, Self::SingleRef { .. } | Self::ArrayRef { .. })
    }

    /// Whether values of this field live in an object record's `array_refs`.
    pub fn is_multi_ref(&self) -> bool {
        matches!(self, Self::ArrayRef { .. } | Self::ManyToMany { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Scalar { .. } => "scalar",
            Self::Attachment => "attachment",
            Self::SingleRef { .. } => "single_ref",
            Self::ArrayRef { .. } => "array_ref",
            Self::ManyToMany { .. } => "many_to_many",
        }
    }
}

/// One field of a model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, value: ValueKind) -> Self {
        Self::with_kind(name, FieldKind::Scalar { value })
    }

    pub fn attachment(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Attachment).nullable()
    }

    pub fn single_ref(name: impl Into<String>, target: ModelId) -> Self {
        Self::with_kind(name, FieldKind::SingleRef { target })
    }

    pub fn array_ref(name: impl Into<String>, target: ModelId) -> Self {
        Self::with_kind(name, FieldKind::ArrayRef { target })
    }

    pub fn many_to_many(name: impl Into<String>, target: ModelId) -> Self {
        Self::with_kind(name, FieldKind::ManyToMany { target })
    }

    /// Mark the field as accepting null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }
}

/// Field descriptors for a set of models.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    models: BTreeMap<ModelId, Vec<FieldDescriptor>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fields of a model.
    pub fn insert(&mut self, model: ModelId, fields: Vec<FieldDescriptor>) {
        self.models.insert(model, fields);
    }

    pub fn contains(&self, model: &ModelId) -> bool {
        self.models.contains_key(model)
    }

    pub fn fields(&self, model: &ModelId) -> Option<&[FieldDescriptor]> {
        self.models.get(model).map(Vec::as_slice)
    }

    pub fn field(&self, model: &ModelId, name: &str) -> Option<&FieldDescriptor> {
        self.fields(model)?.iter().find(|f| f.name == name)
    }

    /// Target model of `model.field`, if that field is a relation.
    pub fn relation_target(&self, model: &ModelId, field: &str) -> Option<&ModelId> {
        self.field(model, field)?.kind.relation_target()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.models.keys()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

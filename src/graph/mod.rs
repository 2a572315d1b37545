//! Family Graph
//!
//! People (nodes) and relationships (directed edges) for one family. The graph is a
//! plain in-memory structure; mutations live in [`store`], read-only traversals in
//! [`query`], and JSON-blob persistence in [`persistence`].

pub mod persistence;
pub mod query;
pub mod store;

use crate::error::GraphError;
use crate::types::{FamilyId, PersonId, RelationshipId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub use query::{find_ancestors, find_common_ancestors, find_descendants, TraversalOptions};
pub use store::PersonRemoval;

/// Attribute keys that name a typed [`PersonData`] field.
pub const RESERVED_ATTRIBUTES: [&str; 5] = ["full_name", "birth_date", "avatar_url", "details", "role"];

pub fn is_reserved_attribute(key: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&key)
}

/// Person attributes. `full_name` is required; anything the caller adds beyond the
/// known fields is kept in `extra` and round-trips unchanged.
///
/// `extra` never holds a reserved key once the graph has accepted the data: the
/// graph moves such entries into their typed field (see [`RESERVED_ATTRIBUTES`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Free-form tag such as "grandmother" or "me"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersonData {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            birth_date: None,
            avatar_url: None,
            details: None,
            role: None,
            extra: Map::new(),
        }
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Move `extra` entries that name a typed field into that field.
    ///
    /// Both would otherwise serialize under the same key. `null` clears an optional
    /// field; a `null` or non-string `full_name` is rejected.
    pub(crate) fn absorb_reserved_attributes(&mut self) -> Result<(), GraphError> {
        if let Some(value) = self.extra.remove("full_name") {
            self.full_name = reserved_string("full_name", value)?.ok_or(GraphError::MissingName)?;
        }
        if let Some(value) = self.extra.remove("birth_date") {
            self.birth_date = match reserved_string("birth_date", value)? {
                Some(raw) => Some(raw.parse().map_err(|e| GraphError::InvalidAttribute {
                    key: "birth_date".to_string(),
                    reason: format!("{}", e),
                })?),
                None => None,
            };
        }
        for (key, field) in [
            ("avatar_url", &mut self.avatar_url),
            ("details", &mut self.details),
            ("role", &mut self.role),
        ] {
            if let Some(value) = self.extra.remove(key) {
                *field = reserved_string(key, value)?;
            }
        }
        Ok(())
    }
}

fn reserved_string(key: &str, value: Value) -> Result<Option<String>, GraphError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(GraphError::InvalidAttribute {
            key: key.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
    }
}

/// Partial update for [`PersonData`].
///
/// Set fields overwrite. Entries in `extra` are merged key by key; a `null` value
/// removes the key. Reserved keys in `extra` are carried over as-is so the graph
/// can route them into their typed field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersonPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.birth_date.is_none()
            && self.avatar_url.is_none()
            && self.details.is_none()
            && self.role.is_none()
            && self.extra.is_empty()
    }

    pub(crate) fn apply(&self, data: &mut PersonData) {
        if let Some(name) = &self.full_name {
            data.full_name = name.clone();
        }
        if let Some(date) = self.birth_date {
            data.birth_date = Some(date);
        }
        if let Some(url) = &self.avatar_url {
            data.avatar_url = Some(url.clone());
        }
        if let Some(details) = &self.details {
            data.details = Some(details.clone());
        }
        if let Some(role) = &self.role {
            data.role = Some(role.clone());
        }
        for (key, value) in &self.extra {
            if value.is_null() && !is_reserved_attribute(key) {
                data.extra.remove(key);
            } else {
                data.extra.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Person node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub data: PersonData,
}

/// Relationship kinds. For `ParentChild` the edge source is the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    ParentChild,
    Spouse,
    Sibling,
    Partner,
    Guardian,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::ParentChild => "parent-child",
            RelationshipKind::Spouse => "spouse",
            RelationshipKind::Sibling => "sibling",
            RelationshipKind::Partner => "partner",
            RelationshipKind::Guardian => "guardian",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "parent-child" | "parent" => Ok(RelationshipKind::ParentChild),
            "spouse" => Ok(RelationshipKind::Spouse),
            "sibling" => Ok(RelationshipKind::Sibling),
            "partner" => Ok(RelationshipKind::Partner),
            "guardian" => Ok(RelationshipKind::Guardian),
            other => Err(format!(
                "unknown relationship kind '{}' (expected parent-child, spouse, sibling, partner or guardian)",
                other
            )),
        }
    }
}

/// Relationship edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source: PersonId,
    pub target: PersonId,
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Relationship {
    pub fn touches(&self, person_id: &str) -> bool {
        self.source == person_id || self.target == person_id
    }
}

/// One family's people and relationships.
///
/// Ids are unique within each collection. Collections keep insertion order, which
/// is what query tie-breaking relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyGraph {
    pub(crate) family_id: FamilyId,
    #[serde(default)]
    pub(crate) people: Vec<Person>,
    #[serde(default)]
    pub(crate) relationships: Vec<Relationship>,
}

impl FamilyGraph {
    pub fn new(family_id: impl Into<FamilyId>) -> Self {
        Self {
            family_id: family_id.into(),
            people: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.id == id)
    }

    pub fn contains_person(&self, id: &str) -> bool {
        self.person(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty() && self.relationships.is_empty()
    }
}

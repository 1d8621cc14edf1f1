//! Knowledge graph value types.
//!
//! Entities are things the user talks about (technologies, people, places).
//! Relations link entities that showed up in the same turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category of a knowledge entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Tech,
    Person,
    Place,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tech => "tech",
            EntityKind::Person => "person",
            EntityKind::Place => "place",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tech" => Ok(EntityKind::Tech),
            "person" => Ok(EntityKind::Person),
            "place" => Ok(EntityKind::Place),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// An entity produced by extraction, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub name: String,
}

impl ExtractedEntity {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// A persisted entity.
///
/// `name` is unique under case-insensitive comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntity {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    pub frequency: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A labelled link between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRelation {
    pub id: i64,
    pub entity_a: i64,
    pub entity_b: i64,
    pub label: String,
    pub frequency: i64,
}

/// A periodic digest of recent conversations, produced out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRecord {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_roundtrips_through_text() {
        for kind in [EntityKind::Tech, EntityKind::Person, EntityKind::Place] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!("PLACE".parse::<EntityKind>().unwrap(), EntityKind::Place);
        assert!("animal".parse::<EntityKind>().is_err());
    }
}

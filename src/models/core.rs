// src/models/core.rs
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A historical figure record as seen by the dedup engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Third-party catalog identifier (e.g. a Wikidata Q-id). Two entities with
    /// different non-null refs are never the same person.
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub properties: FigureProperties,
    #[serde(default)]
    pub deleted: bool,
}

impl Entity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
            external_ref: None,
            properties: FigureProperties::default(),
            deleted: false,
        }
    }

    /// Name used for matching; a missing name is treated as empty.
    pub fn name_for_matching(&self) -> &str {
        self.display_name.as_deref().unwrap_or("")
    }
}

/// The fixed set of scalar attributes a figure carries.
///
/// Merge reconciliation walks exactly these fields, so adding a field here
/// forces the reconciliation code to handle it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FigureProperties {
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub death_year: Option<i32>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub era: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A scalar property value as reported in a merge conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i32),
    Text(String),
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A typed edge between two entities. Edge-level properties are carried
/// through merges untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default = "empty_object")]
    pub properties: JsonValue,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        rel_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type: rel_type.into(),
            properties: empty_object(),
        }
    }

    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }

    /// The endpoint that is not `entity_id`. For a self-loop this is `entity_id`.
    pub fn other_endpoint(&self, entity_id: &str) -> &str {
        if self.source_id == entity_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_display_name_matches_as_empty() {
        let mut e = Entity::new("f1", "Galileo Galilei");
        assert_eq!(e.name_for_matching(), "Galileo Galilei");
        e.display_name = None;
        assert_eq!(e.name_for_matching(), "");
    }

    #[test]
    fn test_entity_fixture_defaults() {
        let e: Entity = serde_json::from_str(r#"{"id": "f9"}"#).unwrap();
        assert!(!e.deleted);
        assert_eq!(e.properties, FigureProperties::default());
        assert!(e.display_name.is_none());
    }

    #[test]
    fn test_other_endpoint() {
        let r = Relationship::new("r1", "media-1", "PORTRAYS", "fig-1");
        assert_eq!(r.other_endpoint("fig-1"), "media-1");
        assert_eq!(r.other_endpoint("media-1"), "fig-1");
        assert!(r.touches("fig-1"));
        assert!(!r.touches("fig-2"));
    }
}

//! Static entity catalog: the fixed set of things the camera is expected to see.
//!
//! The catalog is built once at startup from a JSON spec and is immutable for
//! the process lifetime. Entities carry matching keys — either a fiducial
//! marker ID or a (shape, color) class — and the catalog exposes both
//! partitions as read-only views grouped by key, in stable catalog order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of entity kinds; every consumption site matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Boundary,
    Player,
    Object,
    Region,
}

impl EntityType {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "boundary" => Some(Self::Boundary),
            "player" => Some(Self::Player),
            "object" => Some(Self::Object),
            "region" => Some(Self::Region),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    #[default]
    Static,
    Dynamic,
}

/// An expected physical entity.
///
/// Exactly one of `marker_id` or the (`shape`, `color`) pair is normally
/// populated; an entity with neither is never matched to a detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub entity_type: EntityType,
    pub mobility: Mobility,
    /// Free-form label used by consumers for semantic routing ("bot", "target", "goal").
    pub tag: Option<String>,
    pub color: Option<String>,
    pub shape: Option<String>,
    pub marker_id: Option<u32>,
}

impl Entity {
    pub fn is_fiducial(&self) -> bool {
        self.marker_id.is_some()
    }

    /// Shape/color class key, if this entity is vision-tracked.
    pub fn class_key(&self) -> Option<(&str, &str)> {
        match (&self.shape, &self.color) {
            (Some(s), Some(c)) => Some((s.as_str(), c.as_str())),
            _ => None,
        }
    }
}

/// One descriptor from the catalog spec; `count` expands it into that many
/// catalog slots with shared attributes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDescriptor {
    pub id: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub shape: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub marker_id: Option<u32>,
    #[serde(default)]
    pub mobility: Option<Mobility>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Catalog spec: entity-type key → descriptor list.
///
/// A `BTreeMap` keeps expansion order independent of JSON key order, so
/// catalog slot indices are stable across runs.
pub type CatalogSpec = std::collections::BTreeMap<String, Vec<EntityDescriptor>>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown entity type key `{0}`")]
    UnknownEntityType(String),
    #[error("descriptor in `{section}` is missing required field `{field}`")]
    MissingField { section: String, field: &'static str },
    #[error("failed to parse catalog spec")]
    Parse(#[from] serde_json::Error),
}

/// Flat, ordered registry of expected entities with grouped lookup views.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    entities: Vec<Entity>,
    /// Marker ID → indices of fiducial-tracked entities, in catalog order.
    fiducial_groups: Vec<(u32, Vec<usize>)>,
    /// (shape, color) → indices of vision-tracked entities, in catalog order.
    vision_groups: Vec<((String, String), Vec<usize>)>,
}

impl EntityCatalog {
    /// Build the catalog from a spec. Fails atomically: any malformed
    /// descriptor rejects the whole catalog.
    pub fn from_spec(spec: &CatalogSpec) -> Result<Self, CatalogError> {
        let mut entities = Vec::new();

        for (key, descriptors) in spec {
            let entity_type = EntityType::from_key(key)
                .ok_or_else(|| CatalogError::UnknownEntityType(key.clone()))?;

            for desc in descriptors {
                if desc.id.is_empty() {
                    return Err(CatalogError::MissingField {
                        section: key.clone(),
                        field: "id",
                    });
                }
                let count = desc.count.unwrap_or(1);
                for i in 0..count {
                    let id = if count > 1 {
                        format!("{}_{}", desc.id, i + 1)
                    } else {
                        desc.id.clone()
                    };
                    entities.push(Entity {
                        id,
                        entity_type,
                        mobility: desc.mobility.unwrap_or_default(),
                        tag: desc.tags.clone(),
                        color: desc.color.clone(),
                        shape: desc.shape.clone(),
                        marker_id: desc.marker_id,
                    });
                }
            }
        }

        Ok(Self::from_entities(entities))
    }

    /// Parse a JSON catalog spec and build the catalog.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let spec: CatalogSpec = serde_json::from_str(json)?;
        Self::from_spec(&spec)
    }

    fn from_entities(entities: Vec<Entity>) -> Self {
        // Group by key, preserving first-appearance order for determinism.
        let mut fiducial_groups: Vec<(u32, Vec<usize>)> = Vec::new();
        let mut fiducial_pos: HashMap<u32, usize> = HashMap::new();
        let mut vision_groups: Vec<((String, String), Vec<usize>)> = Vec::new();
        let mut vision_pos: HashMap<(String, String), usize> = HashMap::new();

        for (idx, entity) in entities.iter().enumerate() {
            if let Some(marker_id) = entity.marker_id {
                let slot = *fiducial_pos.entry(marker_id).or_insert_with(|| {
                    fiducial_groups.push((marker_id, Vec::new()));
                    fiducial_groups.len() - 1
                });
                fiducial_groups[slot].1.push(idx);
            } else if let (Some(shape), Some(color)) = (&entity.shape, &entity.color) {
                let key = (shape.clone(), color.clone());
                let slot = *vision_pos.entry(key.clone()).or_insert_with(|| {
                    vision_groups.push((key, Vec::new()));
                    vision_groups.len() - 1
                });
                vision_groups[slot].1.push(idx);
            }
            // Neither key populated: entity exists but never matches.
        }

        Self {
            entities,
            fiducial_groups,
            vision_groups,
        }
    }

    /// All entities, in catalog order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn fiducial_group_indices(&self) -> &[(u32, Vec<usize>)] {
        &self.fiducial_groups
    }

    pub(crate) fn vision_group_indices(&self) -> &[((String, String), Vec<usize>)] {
        &self.vision_groups
    }

    /// All fiducial-tracked entities, catalog order.
    pub fn fiducial_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_fiducial())
    }

    /// All vision-tracked (shape/color) entities, catalog order.
    pub fn vision_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| !e.is_fiducial() && e.class_key().is_some())
    }

    pub fn entity(&self, idx: usize) -> &Entity {
        &self.entities[idx]
    }
}

//! Read-only catalog of system layers, their concepts and the interfaces
//! between them.
//!
//! The catalog is assembled once on first access. Layers are ordered from
//! the highest level down and each layer carries the interfaces that touch
//! it, in declaration order.

mod data;

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::OnceLock;

use thiserror::Error;

use self::data::{CATALOG_DESCRIPTION, INTERFACES, LAYERS};

/// Direction of an inter-layer interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum InterfaceDirection {
    /// Lower layer serves the upper one.
    Upward,
    /// Upper layer drives the lower one.
    Downward,
    /// Both.
    Bidirectional,
}

/// One idea belonging to a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Concept {
    /// Unique id.
    pub id: &'static str,
    /// Chinese display name.
    pub name: &'static str,
    /// English display name.
    pub name_en: &'static str,
    /// Short explanation.
    pub description: &'static str,
    /// Concrete examples.
    pub examples: &'static [&'static str],
    /// Ids of related concepts.
    pub related_concepts: &'static [&'static str],
}

/// Edge between two layers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LayerInterface {
    /// Unique id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Short explanation.
    pub description: &'static str,
    /// Source layer id.
    pub from_layer: &'static str,
    /// Destination layer id.
    pub to_layer: &'static str,
    /// Edge direction.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub direction: InterfaceDirection,
    /// Protocols carried across the edge.
    pub protocols: &'static [&'static str],
}

impl LayerInterface {
    /// `true` when either endpoint is `layer_id`.
    #[must_use]
    pub fn touches(&self, layer_id: &str) -> bool {
        self.from_layer == layer_id || self.to_layer == layer_id
    }
}

/// One level of the abstraction hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SystemLayer {
    /// Unique id.
    pub id: &'static str,
    /// Chinese display name.
    pub name: &'static str,
    /// English display name.
    pub name_en: &'static str,
    /// Short explanation.
    pub description: &'static str,
    /// 0 is the physical layer.
    pub level: u8,
    /// Display color as `#RRGGBB`.
    pub color: &'static str,
    /// Icon name.
    pub icon: &'static str,
    /// Concepts of this layer.
    pub concepts: &'static [Concept],
    /// Interfaces touching this layer.
    pub interfaces: Vec<&'static LayerInterface>,
    /// Concrete examples.
    pub examples: &'static [&'static str],
}

/// The whole catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HierarchyData {
    /// Layers, highest level first.
    pub layers: Vec<SystemLayer>,
    /// Number of levels.
    pub total_levels: usize,
    /// Short explanation.
    pub description: &'static str,
}

/// Dangling or duplicate catalog references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// An interface endpoint names no layer.
    #[error("interface `{interface}` references unknown layer `{layer}`")]
    UnknownLayer {
        /// Offending interface.
        interface: &'static str,
        /// Missing layer id.
        layer: &'static str,
    },
    /// A related-concept entry names no concept.
    #[error("concept `{concept}` references unknown concept `{related}`")]
    UnknownConcept {
        /// Offending concept.
        concept: &'static str,
        /// Missing concept id.
        related: &'static str,
    },
    /// Two entries share an id.
    #[error("duplicate catalog id `{0}`")]
    DuplicateId(&'static str),
    /// A layer's derived interface list is out of sync with the global list.
    #[error("layer `{0}` has an inconsistent interface list")]
    InterfaceMismatch(&'static str),
}

impl HierarchyData {
    fn build() -> Self {
        let mut layers: Vec<SystemLayer> = LAYERS
            .iter()
            .map(|record| SystemLayer {
                id: record.id,
                name: record.name,
                name_en: record.name_en,
                description: record.description,
                level: record.level,
                color: record.color,
                icon: record.icon,
                concepts: record.concepts,
                interfaces: interfaces_for(record.id),
                examples: record.examples,
            })
            .collect();
        layers.sort_by_key(|layer| Reverse(layer.level));
        Self {
            total_levels: layers.len(),
            layers,
            description: CATALOG_DESCRIPTION,
        }
    }

    /// Layer with `id`.
    #[must_use]
    pub fn layer(&self, id: &str) -> Option<&SystemLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// Concept with `id`, searched across every layer.
    #[must_use]
    pub fn concept(&self, id: &str) -> Option<&'static Concept> {
        self.concepts().find(|concept| concept.id == id)
    }

    /// Every concept, highest layer first.
    pub fn concepts(&self) -> impl Iterator<Item = &'static Concept> + '_ {
        self.layers.iter().flat_map(|layer| layer.concepts.iter())
    }

    /// Checks that every reference resolves and every id is unique.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.id) {
                return Err(CatalogError::DuplicateId(layer.id));
            }
        }
        for concept in self.concepts() {
            if !seen.insert(concept.id) {
                return Err(CatalogError::DuplicateId(concept.id));
            }
        }
        for edge in INTERFACES {
            if !seen.insert(edge.id) {
                return Err(CatalogError::DuplicateId(edge.id));
            }
            for endpoint in [edge.from_layer, edge.to_layer] {
                if self.layer(endpoint).is_none() {
                    return Err(CatalogError::UnknownLayer {
                        interface: edge.id,
                        layer: endpoint,
                    });
                }
            }
        }
        for concept in self.concepts() {
            if let Some(related) = concept
                .related_concepts
                .iter()
                .copied()
                .find(|related| self.concept(related).is_none())
            {
                return Err(CatalogError::UnknownConcept {
                    concept: concept.id,
                    related,
                });
            }
        }
        for layer in &self.layers {
            if layer.interfaces != interfaces_for(layer.id) {
                return Err(CatalogError::InterfaceMismatch(layer.id));
            }
        }
        Ok(())
    }
}

/// The catalog, built on first access.
#[must_use]
pub fn hierarchy() -> &'static HierarchyData {
    static HIERARCHY: OnceLock<HierarchyData> = OnceLock::new();
    HIERARCHY.get_or_init(HierarchyData::build)
}

/// Layers, highest level first.
#[must_use]
pub fn layers() -> &'static [SystemLayer] {
    &hierarchy().layers
}

/// Every interface in declaration order.
#[must_use]
pub const fn interfaces() -> &'static [LayerInterface] {
    INTERFACES
}

/// Interfaces touching `layer_id`, in declaration order.
#[must_use]
pub fn interfaces_for(layer_id: &str) -> Vec<&'static LayerInterface> {
    INTERFACES
        .iter()
        .filter(|edge| edge.touches(layer_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{hierarchy, interfaces, interfaces_for, layers, InterfaceDirection};

    #[test]
    fn catalog_is_consistent() {
        assert_eq!(hierarchy().validate(), Ok(()));
        assert_eq!(hierarchy().total_levels, 8);
    }

    #[test]
    fn layers_are_sorted_from_application_down() {
        let levels: Vec<u8> = layers().iter().map(|layer| layer.level).collect();
        assert_eq!(levels, vec![7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(layers()[0].id, "application");
        assert_eq!(layers()[7].id, "physical");
    }

    #[rstest]
    #[case("application", &["app-to-highlevel"])]
    #[case("assembly", &["highlevel-to-assembly", "assembly-to-system"])]
    #[case("physical", &["logic-to-physical"])]
    #[case("nowhere", &[])]
    fn interfaces_touching_a_layer_keep_declaration_order(
        #[case] layer: &str,
        #[case] expected: &[&str],
    ) {
        let ids: Vec<&str> = interfaces_for(layer).iter().map(|edge| edge.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn every_layer_interface_is_in_the_global_list() {
        for layer in layers() {
            for edge in &layer.interfaces {
                assert!(edge.touches(layer.id));
                assert!(interfaces().iter().any(|global| global.id == edge.id));
            }
        }
    }

    #[test]
    fn lookups_resolve_previously_dangling_concepts() {
        let catalog = hierarchy();
        for id in ["system-calls", "interpreters", "registers", "chip-manufacturing"] {
            assert!(catalog.concept(id).is_some(), "{id}");
        }
        assert!(catalog.concept("quantum-tunnelling").is_none());
        assert_eq!(
            catalog.layer("isa").map(|layer| layer.name_en),
            Some("ISA Layer")
        );
    }

    #[test]
    fn only_the_system_call_edge_is_bidirectional() {
        let bidirectional: Vec<&str> = interfaces()
            .iter()
            .filter(|edge| edge.direction == InterfaceDirection::Bidirectional)
            .map(|edge| edge.id)
            .collect();
        assert_eq!(bidirectional, vec!["assembly-to-system"]);
    }
}

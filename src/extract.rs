use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::cache::EntityCache;
use crate::classify::{ENTITY_ID_KEY, MOLECULES_KEY, NAME_KEYS, as_integer};
use crate::error::HarvestError;
use crate::table::{Table, render_cell};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRow {
    pub entity_id: i64,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoleculeRow {
    pub pubchem_id: i64,
    pub common_name: String,
    pub smile: String,
    pub molecular_weight: String,
    pub functional_groups: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorDbTables {
    pub entities: Vec<EntityRow>,
    /// One row per `pubchem_id`, first occurrence wins.
    pub molecules: Vec<MoleculeRow>,
    /// One edge per occurrence; repeats are kept.
    pub entity_molecule_edges: Vec<(i64, i64)>,
    /// Deduplicated and sorted by `(pubchem_id, descriptor)`.
    pub molecule_descriptor_edges: Vec<(i64, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub entities: usize,
    pub molecules: usize,
    pub entity_molecule_edges: usize,
    pub molecule_descriptor_edges: usize,
}

impl FlavorDbTables {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            entities: self.entities.len(),
            molecules: self.molecules.len(),
            entity_molecule_edges: self.entity_molecule_edges.len(),
            molecule_descriptor_edges: self.molecule_descriptor_edges.len(),
        }
    }

    pub fn into_tables(self) -> Vec<Table> {
        vec![
            Table::new(
                "entities",
                "entities.csv",
                &["entity_id", "name", "category"],
                self.entities
                    .into_iter()
                    .map(|row| vec![row.entity_id.to_string(), row.name, row.category])
                    .collect(),
            ),
            Table::new(
                "molecules",
                "molecules.csv",
                &[
                    "pubchem_id",
                    "common_name",
                    "smile",
                    "molecular_weight",
                    "functional_groups",
                ],
                self.molecules
                    .into_iter()
                    .map(|row| {
                        vec![
                            row.pubchem_id.to_string(),
                            row.common_name,
                            row.smile,
                            row.molecular_weight,
                            row.functional_groups,
                        ]
                    })
                    .collect(),
            ),
            Table::new(
                "entity_molecule_edges",
                "edges_entity_molecule.csv",
                &["entity_id", "pubchem_id"],
                self.entity_molecule_edges
                    .into_iter()
                    .map(|(entity_id, pubchem_id)| {
                        vec![entity_id.to_string(), pubchem_id.to_string()]
                    })
                    .collect(),
            ),
            Table::new(
                "molecule_descriptor_edges",
                "edges_molecule_descriptor.csv",
                &["pubchem_id", "descriptor"],
                self.molecule_descriptor_edges
                    .into_iter()
                    .map(|(pubchem_id, descriptor)| vec![pubchem_id.to_string(), descriptor])
                    .collect(),
            ),
        ]
    }
}

pub fn extract_cache(cache: &EntityCache) -> Result<FlavorDbTables, HarvestError> {
    let ids = cache.list()?;
    extract(cache, &ids)
}

/// Folds the cached documents for `ids` into the four FlavorDB tables.
/// Documents are visited once each, in ascending id order.
pub fn extract(cache: &EntityCache, ids: &[u32]) -> Result<FlavorDbTables, HarvestError> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let mut tables = FlavorDbTables::default();
    let mut seen_molecules = HashSet::new();
    let mut descriptor_edges = BTreeSet::new();

    for id in ordered {
        let document = cache.load(id)?;
        let entity = entity_row(id, &document);
        let entity_id = entity.entity_id;
        tables.entities.push(entity);

        let molecules = document
            .get(MOLECULES_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for molecule in molecules {
            let Some(pubchem_id) = molecule.get("pubchem_id").and_then(as_integer) else {
                continue;
            };
            if seen_molecules.insert(pubchem_id) {
                tables.molecules.push(molecule_row(pubchem_id, molecule));
            }
            tables.entity_molecule_edges.push((entity_id, pubchem_id));
            if let Some(profile) = molecule.get("flavor_profile").and_then(Value::as_str) {
                for descriptor in descriptors(profile) {
                    descriptor_edges.insert((pubchem_id, descriptor));
                }
            }
        }
    }

    tables.molecule_descriptor_edges = descriptor_edges.into_iter().collect();
    Ok(tables)
}

/// Splits an `@`-delimited flavor profile into trimmed, lowercased tokens.
pub fn descriptors(profile: &str) -> Vec<String> {
    profile
        .split('@')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn entity_row(file_id: u32, document: &Value) -> EntityRow {
    let entity_id = document
        .get(ENTITY_ID_KEY)
        .and_then(as_integer)
        .unwrap_or(i64::from(file_id));
    let name = NAME_KEYS
        .iter()
        .find_map(|key| present(document, key))
        .map(|value| render_cell(Some(value)))
        .unwrap_or_else(|| format!("entity_{entity_id}"));
    let category = present(document, "category")
        .map(|value| render_cell(Some(value)))
        .unwrap_or_else(|| "unknown".to_string());
    EntityRow {
        entity_id,
        name,
        category,
    }
}

fn molecule_row(pubchem_id: i64, molecule: &Value) -> MoleculeRow {
    MoleculeRow {
        pubchem_id,
        common_name: render_cell(molecule.get("common_name")),
        smile: render_cell(molecule.get("smile")),
        molecular_weight: render_cell(molecule.get("molecular_weight")),
        functional_groups: render_cell(molecule.get("functional_groups")),
    }
}

fn present<'v>(document: &'v Value, key: &str) -> Option<&'v Value> {
    document.get(key).filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_tokens_are_normalized() {
        let tokens: BTreeSet<String> = descriptors("Sweet@ fruity @@green").into_iter().collect();
        let expected: BTreeSet<String> = ["sweet", "fruity", "green"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(tokens, expected);
        assert!(descriptors("@ @").is_empty());
    }

    #[test]
    fn entity_name_fallbacks() {
        let doc = serde_json::json!({"entity_id": 3, "entity_alias": "egg"});
        let row = entity_row(3, &doc);
        assert_eq!(row.name, "egg");
        assert_eq!(row.category, "unknown");

        let doc = serde_json::json!({"entity_id": 4, "entity_alias_readable": null});
        assert_eq!(entity_row(4, &doc).name, "entity_4");

        let doc = serde_json::json!({"molecules": []});
        let row = entity_row(9, &doc);
        assert_eq!(row.entity_id, 9);
        assert_eq!(row.name, "entity_9");
    }
}

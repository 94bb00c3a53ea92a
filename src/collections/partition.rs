// ============================================================================
// spark-bindings - Relation Change Partitioner
// Restores insert/update/delete semantics from added/removed row sets
// ============================================================================

use std::collections::HashSet;

use crate::core::error::ProjectionError;
use crate::store::value::{Row, Value};
use crate::store::Differential;

/// A differential classified by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationChangeParts {
    /// Rows whose id only appears in `added`.
    pub added_rows: Vec<Row>,
    /// Rows whose id appears on both sides; the `added` copy.
    pub updated_rows: Vec<Row>,
    /// Ids that only appear in `removed`.
    pub deleted_ids: Vec<Value>,
}

impl RelationChangeParts {
    pub fn is_empty(&self) -> bool {
        self.added_rows.is_empty() && self.updated_rows.is_empty() && self.deleted_ids.is_empty()
    }
}

/// Splits `differential` into added, updated and deleted parts.
///
/// Each part keeps the order rows had in the differential. A row without
/// `id_attr`, or an id repeated within `added` or within `removed`, is a
/// store contract violation.
pub fn partition(
    differential: &Differential,
    id_attr: &str,
) -> Result<RelationChangeParts, ProjectionError> {
    let added_ids = unique_ids(&differential.added, id_attr)?;
    let removed_ids = unique_ids(&differential.removed, id_attr)?;
    let removed_set: HashSet<&Value> = removed_ids.iter().collect();
    let added_set: HashSet<&Value> = added_ids.iter().collect();

    let mut parts = RelationChangeParts::default();
    for (row, id) in differential.added.iter().zip(&added_ids) {
        if removed_set.contains(id) {
            parts.updated_rows.push(row.clone());
        } else {
            parts.added_rows.push(row.clone());
        }
    }
    parts.deleted_ids = removed_ids
        .iter()
        .filter(|id| !added_set.contains(id))
        .cloned()
        .collect();
    Ok(parts)
}

fn unique_ids(rows: &[Row], id_attr: &str) -> Result<Vec<Value>, ProjectionError> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter()
        .map(|row| {
            let id = row
                .id(id_attr)
                .ok_or_else(|| ProjectionError::MissingAttribute(id_attr.to_owned()))?;
            if !seen.insert(id) {
                return Err(ProjectionError::DuplicateId(id.clone()));
            }
            Ok(id.clone())
        })
        .collect()
}

//! Cascade plan
//!
//! An ordered list of resources where each level is fed by the records of the
//! level before it.

use crate::domain::{HarvestError, ResourceSpec, Result};
use std::collections::HashSet;

/// Validated, ordered resource levels
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePlan {
    levels: Vec<ResourceSpec>,
}

impl CascadePlan {
    /// Build a plan from levels, root first
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there are no levels, the root is not an endpoint,
    /// or two levels share a name or table.
    pub fn new(levels: Vec<ResourceSpec>) -> Result<Self> {
        let Some(root) = levels.first() else {
            return Err(HarvestError::Validation(
                "A cascade needs at least one resource".to_string(),
            ));
        };

        if root.source.needs_parent() {
            return Err(HarvestError::Validation(format!(
                "Root resource '{}' cannot read from a parent record",
                root.name
            )));
        }

        let mut names = HashSet::new();
        let mut tables = HashSet::new();
        for level in &levels {
            if !names.insert(level.name.as_str()) {
                return Err(HarvestError::Validation(format!(
                    "Resource '{}' appears twice in the cascade",
                    level.name
                )));
            }
            if level.selected && !tables.insert(level.table_name.as_str()) {
                return Err(HarvestError::Validation(format!(
                    "Table '{}' is written by more than one resource",
                    level.table_name
                )));
            }
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[ResourceSpec] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Whether the level at `index` feeds another level
    pub fn has_descendants(&self, index: usize) -> bool {
        index + 1 < self.levels.len()
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.levels.iter().find(|level| level.name == name)
    }
}

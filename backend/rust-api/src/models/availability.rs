use serde::Serialize;
use std::collections::BTreeMap;

use super::blueprint::AvailabilityGrid;
use super::question::RbtLevel;

/// Pool counts for one module of a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleAvailability {
    pub by_marks: BTreeMap<u32, u32>,
    pub by_rbt: BTreeMap<RbtLevel, u32>,
    pub by_type: BTreeMap<String, u32>,
}

/// Aggregated view of a subject's pool, keyed by module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Availability {
    pub subject: String,
    pub modules: Vec<u32>,
    pub marks_values: Vec<u32>,
    pub rbt_levels: Vec<RbtLevel>,
    pub types: Vec<String>,
    pub per_module: BTreeMap<u32, ModuleAvailability>,
    /// Questions whose CO tag carries no module number.
    pub unbucketable: u32,
}

impl Availability {
    pub fn count(&self, module: u32, marks: u32) -> u32 {
        self.per_module
            .get(&module)
            .and_then(|m| m.by_marks.get(&marks))
            .copied()
            .unwrap_or(0)
    }

    /// Full module x marks grid, zero-filled for every observed coordinate.
    pub fn grid(&self) -> AvailabilityGrid {
        self.modules
            .iter()
            .map(|module| {
                let row = self
                    .marks_values
                    .iter()
                    .map(|marks| (*marks, self.count(*module, *marks)))
                    .collect();
                (*module, row)
            })
            .collect()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// module -> marks value -> required question count.
pub type Distribution = BTreeMap<u32, BTreeMap<u32, u32>>;

/// module -> marks value -> available question count.
pub type AvailabilityGrid = BTreeMap<u32, BTreeMap<u32, u32>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionTotals {
    pub total_marks: u32,
    pub total_questions: u32,
}

/// Upper bound on the questions one (module, marks) cell may request.
pub const MAX_QUESTIONS_PER_CELL: u32 = 1_000;

impl DistributionTotals {
    /// `None` when either total does not fit in `u32`.
    pub fn of(distribution: &Distribution) -> Option<Self> {
        let mut totals = DistributionTotals::default();
        for marks_map in distribution.values() {
            for (marks, count) in marks_map {
                totals.total_questions = totals.total_questions.checked_add(*count)?;
                totals.total_marks = totals.total_marks.checked_add(count.checked_mul(*marks)?)?;
            }
        }
        Some(totals)
    }
}

/// Pool snapshot cached on the blueprint for display only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMeta {
    pub modules: Vec<u32>,
    pub marks_values: Vec<u32>,
    pub availability: AvailabilityGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blueprint {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub total_marks: u32,
    pub total_questions: u32,
    pub number_of_papers: u32,
    pub distribution: Distribution,
    #[serde(default)]
    pub pool_meta: PoolMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Blueprint {
    /// Buckets in processing order: modules ascending, then marks ascending.
    /// Zero-count cells are skipped.
    pub fn buckets(&self) -> Vec<(u32, u32, u32)> {
        self.distribution
            .iter()
            .flat_map(|(module, marks_map)| {
                marks_map
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(move |(marks, count)| (*module, *marks, *count))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewBlueprint {
    pub title: String,
    pub subject: String,
    pub total_marks: u32,
    pub total_questions: u32,
    pub number_of_papers: u32,
    pub distribution: Distribution,
    pub pool_meta: PoolMeta,
}

#[derive(Debug, Clone, Default)]
pub struct BlueprintUpdate {
    pub title: Option<String>,
    pub number_of_papers: Option<u32>,
    pub distribution: Option<(Distribution, DistributionTotals)>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBlueprintRequest {
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,

    #[validate(length(min = 1, max = 200, message = "subject is required"))]
    pub subject: String,

    pub total_marks: u32,

    /// Optional cross-check against the distribution count.
    pub total_questions: Option<u32>,

    #[validate(range(min = 1, max = 3, message = "Number of papers must be 1, 2, or 3"))]
    pub number_of_papers: Option<u32>,

    pub distribution: Distribution,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBlueprintRequest {
    #[validate(length(min = 1, max = 200, message = "title must not be empty"))]
    pub title: Option<String>,

    #[validate(range(min = 1, max = 3, message = "Number of papers must be 1, 2, or 3"))]
    pub number_of_papers: Option<u32>,

    pub distribution: Option<Distribution>,
}

/// One (module, marks) cell whose requirement exceeds the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub module: u32,
    pub marks: u32,
    pub required: u32,
    pub available: u32,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Module {}, {} marks -> need {}, available {}",
            self.module, self.marks, self.required, self.available
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateBlueprintResponse {
    pub valid: bool,
    pub details: Vec<Shortfall>,
    pub totals: DistributionTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(cells: &[(u32, u32, u32)]) -> Distribution {
        let mut d = Distribution::new();
        for (module, marks, count) in cells {
            d.entry(*module).or_default().insert(*marks, *count);
        }
        d
    }

    #[test]
    fn totals_sum_count_times_marks() {
        let totals = DistributionTotals::of(&dist(&[(1, 2, 3), (1, 5, 1)])).unwrap();
        assert_eq!(totals.total_marks, 11);
        assert_eq!(totals.total_questions, 4);
    }

    #[test]
    fn totals_overflow_is_none() {
        assert_eq!(DistributionTotals::of(&dist(&[(1, 2, 3_000_000_000)])), None);
        assert_eq!(
            DistributionTotals::of(&dist(&[(1, 1, 3_000_000_000), (2, 1, 3_000_000_000)])),
            None
        );
    }

    #[test]
    fn distribution_parses_string_keys() {
        let parsed: Distribution =
            serde_json::from_str(r#"{"2": {"5": 1}, "1": {"10": 1, "2": 3}}"#).unwrap();
        assert_eq!(parsed, dist(&[(1, 2, 3), (1, 10, 1), (2, 5, 1)]));
    }

    #[test]
    fn buckets_are_ordered_and_skip_zero() {
        let now = Utc::now();
        let blueprint = Blueprint {
            id: "bp".into(),
            title: "T".into(),
            subject: "S".into(),
            total_marks: 0,
            total_questions: 0,
            number_of_papers: 1,
            distribution: dist(&[(2, 5, 1), (1, 10, 2), (1, 2, 0), (1, 5, 1)]),
            pool_meta: PoolMeta::default(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(blueprint.buckets(), vec![(1, 5, 1), (1, 10, 2), (2, 5, 1)]);
    }
}

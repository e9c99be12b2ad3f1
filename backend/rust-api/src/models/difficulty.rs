use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use super::question::RbtLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
}

/// Target share of each cognitive level for one tier, in percent.
#[derive(Debug, Clone, Copy)]
pub struct DifficultyProfile {
    pub tier: DifficultyTier,
    pub name: &'static str,
    pub percentages: [(RbtLevel, u32); 6],
}

const EASY: DifficultyProfile = DifficultyProfile {
    tier: DifficultyTier::Easy,
    name: "Easy",
    percentages: [
        (RbtLevel::Remember, 40),
        (RbtLevel::Understand, 35),
        (RbtLevel::Apply, 15),
        (RbtLevel::Analyze, 7),
        (RbtLevel::Evaluate, 2),
        (RbtLevel::Create, 1),
    ],
};

const MEDIUM: DifficultyProfile = DifficultyProfile {
    tier: DifficultyTier::Medium,
    name: "Medium",
    percentages: [
        (RbtLevel::Remember, 25),
        (RbtLevel::Understand, 25),
        (RbtLevel::Apply, 25),
        (RbtLevel::Analyze, 15),
        (RbtLevel::Evaluate, 7),
        (RbtLevel::Create, 3),
    ],
};

const HARD: DifficultyProfile = DifficultyProfile {
    tier: DifficultyTier::Hard,
    name: "Hard",
    percentages: [
        (RbtLevel::Remember, 15),
        (RbtLevel::Understand, 20),
        (RbtLevel::Apply, 20),
        (RbtLevel::Analyze, 20),
        (RbtLevel::Evaluate, 15),
        (RbtLevel::Create, 10),
    ],
};

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 3] = [
        DifficultyTier::Easy,
        DifficultyTier::Medium,
        DifficultyTier::Hard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyTier::Easy => "easy",
            DifficultyTier::Medium => "medium",
            DifficultyTier::Hard => "hard",
        }
    }

    pub fn profile(&self) -> &'static DifficultyProfile {
        match self {
            DifficultyTier::Easy => &EASY,
            DifficultyTier::Medium => &MEDIUM,
            DifficultyTier::Hard => &HARD,
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.profile().name
    }

    /// Tier order used for a batch: a single paper uses the requested tier,
    /// two papers are easy/hard and three cover every tier.
    pub fn for_paper_count(
        count: u32,
        requested: Option<DifficultyTier>,
    ) -> Result<Vec<DifficultyTier>, String> {
        match count {
            1 => requested
                .map(|tier| vec![tier])
                .ok_or_else(|| "Difficulty level required when generating single paper".to_string()),
            2 => Ok(vec![DifficultyTier::Easy, DifficultyTier::Hard]),
            3 => Ok(vec![
                DifficultyTier::Easy,
                DifficultyTier::Medium,
                DifficultyTier::Hard,
            ]),
            _ => Err("Number of papers must be 1, 2, or 3".to_string()),
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(DifficultyTier::Easy),
            "medium" => Ok(DifficultyTier::Medium),
            "hard" => Ok(DifficultyTier::Hard),
            _ => Err(format!("Invalid difficulty level: {}", value)),
        }
    }
}

impl DifficultyProfile {
    pub fn percentage_map(&self) -> BTreeMap<RbtLevel, u32> {
        self.percentages.iter().copied().collect()
    }

    /// Converts the percentage profile into per-level question counts that
    /// always sum to `total_questions`.
    pub fn requirements(&self, total_questions: u32) -> BTreeMap<RbtLevel, u32> {
        level_requirements(total_questions, &self.percentages)
    }
}

/// Rounds each share half-up, then folds the rounding drift into the level with
/// the largest share (first in canonical order on ties). A negative drift larger
/// than that level's count spills over to the next-largest shares.
pub fn level_requirements(
    total_questions: u32,
    percentages: &[(RbtLevel, u32)],
) -> BTreeMap<RbtLevel, u32> {
    let mut counts: BTreeMap<RbtLevel, i64> = percentages
        .iter()
        .map(|(level, pct)| {
            let rounded = (total_questions as i64 * *pct as i64 + 50) / 100;
            (*level, rounded)
        })
        .collect();

    let assigned: i64 = counts.values().sum();
    let mut drift = total_questions as i64 - assigned;

    let mut by_share: Vec<(RbtLevel, u32)> = percentages.to_vec();
    by_share.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    for (level, _) in &by_share {
        if drift == 0 {
            break;
        }
        let count = counts.entry(*level).or_insert(0);
        let adjusted = *count + drift;
        if adjusted >= 0 {
            *count = adjusted;
            drift = 0;
        } else {
            drift = adjusted;
            *count = 0;
        }
    }

    counts
        .into_iter()
        .map(|(level, count)| (level, count.max(0) as u32))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct DifficultyConfigView {
    pub name: &'static str,
    pub rbt_distribution: BTreeMap<RbtLevel, u32>,
}

#[derive(Debug, Serialize)]
pub struct DifficultyConfigsResponse {
    pub message: &'static str,
    pub configs: BTreeMap<DifficultyTier, DifficultyConfigView>,
}

impl DifficultyConfigsResponse {
    pub fn build() -> Self {
        let configs = DifficultyTier::ALL
            .iter()
            .map(|tier| {
                let profile = tier.profile();
                (
                    *tier,
                    DifficultyConfigView {
                        name: profile.name,
                        rbt_distribution: profile.percentage_map(),
                    },
                )
            })
            .collect();
        Self {
            message: "Difficulty configurations",
            configs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_sum_to_one_hundred() {
        for tier in DifficultyTier::ALL {
            let sum: u32 = tier.profile().percentages.iter().map(|(_, p)| p).sum();
            assert_eq!(sum, 100, "{} profile", tier);
        }
    }

    #[test]
    fn easy_seven_questions_sum_exactly() {
        let counts = DifficultyTier::Easy.profile().requirements(7);
        assert_eq!(counts.values().sum::<u32>(), 7);
        // Naive rounding gives R3 U2 AP1; the missing question lands on R.
        assert_eq!(counts[&RbtLevel::Remember], 4);
        assert_eq!(counts[&RbtLevel::Understand], 2);
        assert_eq!(counts[&RbtLevel::Apply], 1);
    }

    #[test]
    fn every_tier_and_total_sums_exactly() {
        for tier in DifficultyTier::ALL {
            for total in 0..=250u32 {
                let counts = tier.profile().requirements(total);
                assert_eq!(counts.len(), 6);
                assert_eq!(counts.values().sum::<u32>(), total, "{} total={}", tier, total);
            }
        }
    }

    #[test]
    fn edge_totals_zero_and_one() {
        let zero = DifficultyTier::Hard.profile().requirements(0);
        assert!(zero.values().all(|c| *c == 0));

        let one = DifficultyTier::Hard.profile().requirements(1);
        assert_eq!(one.values().sum::<u32>(), 1);
        // U, AP and AN tie at 20%; U comes first canonically.
        assert_eq!(one[&RbtLevel::Understand], 1);
    }

    #[test]
    fn medium_tie_goes_to_remember() {
        let counts = DifficultyTier::Medium.profile().requirements(1);
        assert_eq!(counts[&RbtLevel::Remember], 1);
    }

    #[test]
    fn negative_drift_spills_over() {
        // Four levels each rounding 0.5 up overshoot by two.
        let table = [
            (RbtLevel::Remember, 25),
            (RbtLevel::Understand, 25),
            (RbtLevel::Apply, 25),
            (RbtLevel::Analyze, 25),
            (RbtLevel::Evaluate, 0),
            (RbtLevel::Create, 0),
        ];
        let counts = level_requirements(2, &table);
        assert_eq!(counts.values().sum::<u32>(), 2);
    }

    #[test]
    fn tier_order_for_paper_counts() {
        assert_eq!(
            DifficultyTier::for_paper_count(1, Some(DifficultyTier::Medium)).unwrap(),
            vec![DifficultyTier::Medium]
        );
        assert!(DifficultyTier::for_paper_count(1, None).is_err());
        assert_eq!(
            DifficultyTier::for_paper_count(2, None).unwrap(),
            vec![DifficultyTier::Easy, DifficultyTier::Hard]
        );
        assert_eq!(DifficultyTier::for_paper_count(3, None).unwrap().len(), 3);
        assert!(DifficultyTier::for_paper_count(4, None).is_err());
        assert!(DifficultyTier::for_paper_count(0, None).is_err());
    }

    #[test]
    fn unknown_tier_is_rejected() {
        assert!("extreme".parse::<DifficultyTier>().is_err());
        assert_eq!("HARD".parse::<DifficultyTier>(), Ok(DifficultyTier::Hard));
    }
}

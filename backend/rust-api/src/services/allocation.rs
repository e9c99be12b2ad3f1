use rand::{seq::SliceRandom, Rng};
use std::collections::{BTreeMap, HashSet};

use crate::models::question::{Question, RbtLevel};

/// Result of one level-targeted allocation over a single bucket.
#[derive(Debug, Default)]
pub struct Allocation<'a> {
    pub selected: Vec<&'a Question>,
    pub warnings: Vec<String>,
    /// Levels whose own supply ran short, in processing order.
    pub short_levels: Vec<RbtLevel>,
}

/// Picks questions from `candidates` so that each cognitive level gets
/// `requirements[level]` questions, substituting along the level's fallback
/// order when its own supply runs out. Every chosen id is inserted into
/// `used`; ids already in `used` are never chosen.
///
/// Under-delivery is not an error: the selection is simply shorter and the
/// shortage is reported in `warnings`.
pub fn allocate<'a, R>(
    candidates: &'a [Question],
    requirements: &BTreeMap<RbtLevel, u32>,
    used: &mut HashSet<String>,
    rng: &mut R,
) -> Allocation<'a>
where
    R: Rng + ?Sized,
{
    let mut by_level: BTreeMap<RbtLevel, Vec<&'a Question>> = BTreeMap::new();
    for question in candidates {
        let Some(level) = question.rbt else { continue };
        if used.contains(&question.id) {
            continue;
        }
        by_level.entry(level).or_default().push(question);
    }
    for bucket in by_level.values_mut() {
        bucket.shuffle(rng);
    }

    let mut allocation = Allocation::default();

    for (level, required) in requirements {
        let required = *required as usize;
        if required == 0 {
            continue;
        }

        let taken = match by_level.get_mut(level) {
            Some(bucket) => take(bucket, required, used, &mut allocation.selected),
            None => 0,
        };
        if taken >= required {
            continue;
        }

        allocation.warnings.push(format!(
            "Not enough {} level questions. Required: {}, Available: {}",
            level, required, taken
        ));
        allocation.short_levels.push(*level);

        let mut missing = required - taken;
        for substitute in level.fallback_order() {
            if missing == 0 {
                break;
            }
            if let Some(bucket) = by_level.get_mut(substitute) {
                missing -= take(bucket, missing, used, &mut allocation.selected);
            }
        }
    }

    allocation
}

/// Moves up to `want` not-yet-used questions from the back of a shuffled
/// bucket into `out`.
fn take<'a>(
    bucket: &mut Vec<&'a Question>,
    want: usize,
    used: &mut HashSet<String>,
    out: &mut Vec<&'a Question>,
) -> usize {
    let mut taken = 0;
    while taken < want {
        let Some(question) = bucket.pop() else { break };
        if used.insert(question.id.clone()) {
            out.push(question);
            taken += 1;
        }
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::availability::tests::question;
    use rand::{rngs::StdRng, SeedableRng};

    fn pool(cells: &[(RbtLevel, usize)]) -> Vec<Question> {
        let mut out = Vec::new();
        for (level, count) in cells {
            for i in 0..*count {
                out.push(question(&format!("{}-{}", level, i), "CO1", 2, Some(*level)));
            }
        }
        out
    }

    fn reqs(cells: &[(RbtLevel, u32)]) -> BTreeMap<RbtLevel, u32> {
        cells.iter().copied().collect()
    }

    fn count_level(selected: &[&Question], level: RbtLevel) -> usize {
        selected.iter().filter(|q| q.rbt == Some(level)).count()
    }

    #[test]
    fn meets_exact_targets_when_supply_allows() {
        let candidates = pool(&[(RbtLevel::Remember, 5), (RbtLevel::Understand, 5)]);
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(7);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Remember, 2), (RbtLevel::Understand, 3)]),
            &mut used,
            &mut rng,
        );

        assert!(allocation.warnings.is_empty());
        assert_eq!(count_level(&allocation.selected, RbtLevel::Remember), 2);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Understand), 3);
        assert_eq!(used.len(), 5);
    }

    #[test]
    fn never_returns_already_used_ids() {
        let candidates = pool(&[(RbtLevel::Remember, 4)]);
        let mut used: HashSet<String> = ["R-0", "R-1"].iter().map(|s| s.to_string()).collect();
        let before = used.clone();
        let mut rng = StdRng::seed_from_u64(1);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Remember, 4)]),
            &mut used,
            &mut rng,
        );

        assert_eq!(allocation.selected.len(), 2);
        assert!(allocation.selected.iter().all(|q| !before.contains(&q.id)));
        assert_eq!(
            allocation.warnings,
            vec!["Not enough R level questions. Required: 4, Available: 2".to_string()]
        );
    }

    #[test]
    fn fallback_follows_ranked_substitutes() {
        // R falls back to U first, then AP.
        let candidates = pool(&[
            (RbtLevel::Remember, 1),
            (RbtLevel::Understand, 1),
            (RbtLevel::Apply, 5),
        ]);
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(3);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Remember, 3)]),
            &mut used,
            &mut rng,
        );

        assert_eq!(allocation.selected.len(), 3);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Remember), 1);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Understand), 1);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Apply), 1);
        assert_eq!(allocation.short_levels, vec![RbtLevel::Remember]);
    }

    #[test]
    fn highest_level_falls_back_downwards() {
        let candidates = pool(&[(RbtLevel::Evaluate, 2), (RbtLevel::Remember, 2)]);
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(11);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Create, 3)]),
            &mut used,
            &mut rng,
        );

        assert_eq!(allocation.selected.len(), 3);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Evaluate), 2);
        assert_eq!(count_level(&allocation.selected, RbtLevel::Remember), 1);
    }

    #[test]
    fn empty_pool_warns_for_every_requested_level() {
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(0);

        let allocation = allocate(
            &[],
            &reqs(&[
                (RbtLevel::Remember, 1),
                (RbtLevel::Understand, 2),
                (RbtLevel::Apply, 0),
            ]),
            &mut used,
            &mut rng,
        );

        assert!(allocation.selected.is_empty());
        assert_eq!(allocation.warnings.len(), 2);
        assert!(used.is_empty());
    }

    #[test]
    fn zero_requirement_is_skipped_silently() {
        let candidates = pool(&[(RbtLevel::Remember, 2)]);
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(5);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Create, 0), (RbtLevel::Remember, 1)]),
            &mut used,
            &mut rng,
        );

        assert!(allocation.warnings.is_empty());
        assert_eq!(allocation.selected.len(), 1);
    }

    #[test]
    fn untagged_questions_are_not_level_targeted() {
        let candidates = vec![question("x", "CO1", 2, None)];
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(5);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Remember, 1)]),
            &mut used,
            &mut rng,
        );

        assert!(allocation.selected.is_empty());
        assert_eq!(allocation.warnings.len(), 1);
    }

    #[test]
    fn duplicate_candidates_are_selected_once() {
        let candidates = vec![
            question("dup", "CO1", 2, Some(RbtLevel::Remember)),
            question("dup", "CO1", 2, Some(RbtLevel::Remember)),
        ];
        let mut used = HashSet::new();
        let mut rng = StdRng::seed_from_u64(9);

        let allocation = allocate(
            &candidates,
            &reqs(&[(RbtLevel::Remember, 2)]),
            &mut used,
            &mut rng,
        );

        assert_eq!(allocation.selected.len(), 1);
    }
}

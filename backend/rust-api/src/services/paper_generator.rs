use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::allocation::allocate;
use crate::error::AppError;
use crate::models::{
    blueprint::Blueprint,
    difficulty::DifficultyTier,
    paper::{rbt_match_percentage, ExamType, GenerationMetadata, NewPaper, PaperQuestion},
    question::{Question, RbtLevel},
};

/// Candidates fetched for one (module, marks) cell of the distribution.
#[derive(Debug, Clone)]
pub struct BucketCandidates {
    pub module: u32,
    pub marks: u32,
    pub need_per_paper: u32,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct GenerationPlan<'a> {
    pub blueprint: &'a Blueprint,
    pub tiers: Vec<DifficultyTier>,
    pub exam_type_override: Option<ExamType>,
    pub ese_marks: u32,
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub papers: Vec<NewPaper>,
    pub warnings: Vec<String>,
    pub short_levels: Vec<RbtLevel>,
}

struct PaperDraft {
    tier: DifficultyTier,
    questions: Vec<PaperQuestion>,
    ids: HashSet<String>,
    warnings: Vec<String>,
}

/// Builds every paper of one request from pre-fetched bucket candidates.
///
/// Buckets are consumed in the given order (modules then marks, ascending) and
/// within a bucket papers are filled in tier order, all drawing against one
/// used set seeded with `prior_used`. No question lands in two papers of the
/// same batch.
pub fn generate<R>(
    plan: &GenerationPlan<'_>,
    buckets: &[BucketCandidates],
    prior_used: &HashSet<String>,
    rng: &mut R,
) -> Result<GenerationOutcome, AppError>
where
    R: Rng + ?Sized,
{
    if let Some(empty) = buckets.iter().find(|b| b.questions.is_empty()) {
        return Err(AppError::EmptyBucket {
            module: empty.module,
            marks: empty.marks,
        });
    }

    let mut used: HashSet<String> = prior_used.clone();
    let mut batch_used: HashSet<String> = HashSet::new();
    let mut warnings = Vec::new();
    let mut short_levels = Vec::new();

    let mut drafts: Vec<PaperDraft> = plan
        .tiers
        .iter()
        .map(|tier| PaperDraft {
            tier: *tier,
            questions: Vec::new(),
            ids: HashSet::new(),
            warnings: Vec::new(),
        })
        .collect();

    for bucket in buckets {
        let need = bucket.need_per_paper as usize;

        for draft in drafts.iter_mut() {
            let requirements = draft.tier.profile().requirements(bucket.need_per_paper);
            let allocation = allocate(&bucket.questions, &requirements, &mut used, rng);

            if !allocation.warnings.is_empty() {
                tracing::warn!(
                    module = bucket.module,
                    marks = bucket.marks,
                    tier = %draft.tier,
                    shortfalls = ?allocation.short_levels,
                    "Cognitive-level supply short, using fallback levels"
                );
                let line = format!(
                    "Module {}, Marks {}: {} paper: {}",
                    bucket.module,
                    bucket.marks,
                    draft.tier.as_str().to_uppercase(),
                    allocation.warnings.join(", ")
                );
                draft.warnings.push(line.clone());
                warnings.push(line);
                short_levels.extend(allocation.short_levels.iter().copied());
            }

            let mut picked: Vec<&Question> = allocation.selected;
            if picked.len() < need {
                let extra = top_up(
                    &bucket.questions,
                    need - picked.len(),
                    &draft.ids,
                    &picked,
                    &batch_used,
                    prior_used,
                    rng,
                );
                picked.extend(extra);
            }

            for question in picked {
                used.insert(question.id.clone());
                batch_used.insert(question.id.clone());
                draft.ids.insert(question.id.clone());
                draft.questions.push(snapshot(question, bucket.module));
            }
        }
    }

    let generation_id = Uuid::new_v4().to_string();
    let papers = drafts
        .into_iter()
        .map(|draft| finish_paper(plan, draft, &generation_id))
        .collect();

    Ok(GenerationOutcome {
        papers,
        warnings,
        short_levels,
    })
}

/// Unconstrained random fill for a bucket the level-targeted pass could not
/// satisfy. Candidates already in this paper or in another paper of the batch
/// are excluded; never-issued candidates are drawn before ones only used by
/// historical papers. Stops quietly when supply runs out.
fn top_up<'a, R>(
    candidates: &'a [Question],
    missing: usize,
    in_paper: &HashSet<String>,
    picked: &[&'a Question],
    batch_used: &HashSet<String>,
    prior_used: &HashSet<String>,
    rng: &mut R,
) -> Vec<&'a Question>
where
    R: Rng + ?Sized,
{
    let mut seen: HashSet<&str> = picked.iter().map(|q| q.id.as_str()).collect();
    let mut fresh = Vec::new();
    let mut historical = Vec::new();

    for question in candidates {
        let id = question.id.as_str();
        if in_paper.contains(id) || batch_used.contains(id) || !seen.insert(id) {
            continue;
        }
        if prior_used.contains(id) {
            historical.push(question);
        } else {
            fresh.push(question);
        }
    }

    let mut extra = Vec::new();
    for pool in [&mut fresh, &mut historical] {
        while extra.len() < missing && !pool.is_empty() {
            let idx = rng.random_range(0..pool.len());
            extra.push(pool.swap_remove(idx));
        }
    }
    extra
}

fn snapshot(question: &Question, module: u32) -> PaperQuestion {
    PaperQuestion {
        question_id: question.id.clone(),
        question_text: question.question_text.clone(),
        marks: question.marks,
        module,
        co: question.co.clone(),
        rbt: question.rbt,
        pi: question.pi.clone(),
        unit: question.unit.clone(),
        question_type: question.question_type.clone(),
    }
}

fn finish_paper(plan: &GenerationPlan<'_>, draft: PaperDraft, generation_id: &str) -> NewPaper {
    let blueprint = plan.blueprint;
    let profile = draft.tier.profile();

    let total_marks = draft.questions.iter().map(|q| q.marks).sum();
    let total_questions = draft.questions.len() as u32;

    let mut rbt_distribution: BTreeMap<RbtLevel, u32> =
        RbtLevel::ALL.iter().map(|level| (*level, 0)).collect();
    for question in &draft.questions {
        if let Some(level) = question.rbt {
            *rbt_distribution.entry(level).or_insert(0) += 1;
        }
    }

    let target_rbt_distribution = profile.percentage_map();
    let exam_type = plan
        .exam_type_override
        .unwrap_or_else(|| ExamType::detect(&draft.questions, plan.ese_marks));
    let match_pct = rbt_match_percentage(
        &rbt_distribution,
        &target_rbt_distribution,
        total_questions,
    );

    NewPaper {
        blueprint_id: blueprint.id.clone(),
        generation_id: generation_id.to_string(),
        subject: blueprint.subject.clone(),
        title: format!("{} - {} Paper", blueprint.title, profile.name),
        difficulty: draft.tier,
        exam_type,
        questions: draft.questions,
        total_marks,
        total_questions,
        rbt_distribution,
        target_rbt_distribution,
        generation_metadata: GenerationMetadata {
            difficulty_level: profile.name.to_string(),
            rbt_match_percentage: match_pct,
            warnings: draft.warnings,
        },
    }
}

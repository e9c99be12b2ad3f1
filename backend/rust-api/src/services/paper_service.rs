use std::collections::HashSet;
use std::sync::Arc;

use super::{
    paper_generator::{generate, BucketCandidates, GenerationOutcome, GenerationPlan},
    repository::{BlueprintRepository, GenerationLock, PaperRepository, QuestionRepository},
};
use crate::config::GenerationSettings;
use crate::error::{AppError, AppResult};
use crate::metrics::{ALLOCATION_SHORTFALLS_TOTAL, GENERATION_REQUESTS_TOTAL, PAPERS_GENERATED_TOTAL};
use crate::models::{
    blueprint::Blueprint,
    difficulty::DifficultyTier,
    paper::{ExamType, GeneratePapersRequest, GeneratePapersResponse, Paper, PapersByDifficulty},
};

const MAX_PAGE: i64 = 100;

pub struct PaperService {
    blueprints: Arc<dyn BlueprintRepository>,
    questions: Arc<dyn QuestionRepository>,
    papers: Arc<dyn PaperRepository>,
    lock: Arc<dyn GenerationLock>,
    settings: GenerationSettings,
}

impl PaperService {
    pub fn new(
        blueprints: Arc<dyn BlueprintRepository>,
        questions: Arc<dyn QuestionRepository>,
        papers: Arc<dyn PaperRepository>,
        lock: Arc<dyn GenerationLock>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            blueprints,
            questions,
            papers,
            lock,
            settings,
        }
    }

    pub async fn generate(&self, req: GeneratePapersRequest) -> AppResult<GeneratePapersResponse> {
        let result = self.generate_batch(req).await;
        let status = match &result {
            Ok(_) => "success",
            Err(AppError::Conflict(_)) => "conflict",
            Err(AppError::Internal(_)) => "error",
            Err(_) => "rejected",
        };
        GENERATION_REQUESTS_TOTAL.with_label_values(&[status]).inc();
        result
    }

    async fn generate_batch(&self, req: GeneratePapersRequest) -> AppResult<GeneratePapersResponse> {
        let blueprint_id = req
            .blueprint_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("Blueprint ID is required".to_string()))?;

        let blueprint = self
            .blueprints
            .get(blueprint_id)
            .await?
            .ok_or(AppError::NotFound("Blueprint"))?;

        let requested = match req.difficulty.as_deref().map(str::trim) {
            Some(level) if !level.is_empty() => Some(
                level
                    .parse::<DifficultyTier>()
                    .map_err(|_| AppError::UnknownTier(level.to_string()))?,
            ),
            _ => None,
        };
        let count = req.number_of_papers.unwrap_or(blueprint.number_of_papers);
        let tiers = DifficultyTier::for_paper_count(count, requested).map_err(AppError::Validation)?;

        let exam_type_override = req
            .exam_type
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ExamType::from_override);

        let token = self.lock.try_acquire(&blueprint.id).await?.ok_or_else(|| {
            AppError::Conflict("Paper generation already in progress for this blueprint".to_string())
        })?;

        let result = self
            .generate_locked(&blueprint, tiers.clone(), exam_type_override)
            .await;

        if let Err(e) = self.lock.release(&token).await {
            tracing::error!(blueprint = %blueprint.id, error = %e, "Failed to release generation lock");
        }

        let (papers, warnings) = result?;
        Ok(GeneratePapersResponse {
            message: "Papers generated successfully",
            count: papers.len(),
            papers,
            difficulty_levels: tiers.iter().map(|t| t.as_str()).collect(),
            warnings,
        })
    }

    async fn generate_locked(
        &self,
        blueprint: &Blueprint,
        tiers: Vec<DifficultyTier>,
        exam_type_override: Option<ExamType>,
    ) -> AppResult<(Vec<Paper>, Vec<String>)> {
        tracing::info!(
            blueprint = %blueprint.id,
            papers = tiers.len(),
            "Starting paper generation"
        );

        let prior_used: HashSet<String> = self
            .papers
            .find_prior_used_question_ids(&blueprint.id)
            .await?;

        // All reads happen up front so allocation runs over resident data only.
        let mut buckets = Vec::new();
        for (module, marks, count) in blueprint.buckets() {
            let questions = self
                .questions
                .find_by_subject_module_marks(&blueprint.subject, module, marks)
                .await?;
            if questions.is_empty() {
                return Err(AppError::EmptyBucket { module, marks });
            }
            buckets.push(BucketCandidates {
                module,
                marks,
                need_per_paper: count,
                questions,
            });
        }

        let plan = GenerationPlan {
            blueprint,
            tiers,
            exam_type_override,
            ese_marks: self.settings.ese_marks,
        };
        let GenerationOutcome {
            papers,
            warnings,
            short_levels,
        } = {
            let mut rng = rand::rng();
            generate(&plan, &buckets, &prior_used, &mut rng)?
        };

        for level in &short_levels {
            ALLOCATION_SHORTFALLS_TOTAL
                .with_label_values(&[level.as_str()])
                .inc();
        }

        let created = self.papers.create_papers(papers).await?;

        for paper in &created {
            PAPERS_GENERATED_TOTAL
                .with_label_values(&[paper.difficulty.as_str()])
                .inc();
        }
        tracing::info!(
            blueprint = %blueprint.id,
            papers = created.len(),
            warnings = warnings.len(),
            "Paper generation finished"
        );

        Ok((created, warnings))
    }

    pub async fn get(&self, id: &str) -> AppResult<Paper> {
        self.papers
            .get(id)
            .await?
            .ok_or(AppError::NotFound("Paper"))
    }

    pub async fn recent(&self, limit: Option<i64>) -> AppResult<Vec<Paper>> {
        Ok(self.papers.recent(self.page_size(limit)).await?)
    }

    pub async fn by_difficulty(&self, level: &str, limit: Option<i64>) -> AppResult<Vec<Paper>> {
        let tier = level
            .parse::<DifficultyTier>()
            .map_err(|_| AppError::UnknownTier(level.to_string()))?;
        Ok(self.papers.by_difficulty(tier, self.page_size(limit)).await?)
    }

    pub async fn by_blueprint(&self, blueprint_id: &str) -> AppResult<PapersByDifficulty> {
        let papers = self.papers.by_blueprint(blueprint_id).await?;
        Ok(PapersByDifficulty::group(papers))
    }

    fn page_size(&self, limit: Option<i64>) -> i64 {
        limit
            .unwrap_or(self.settings.recent_limit)
            .clamp(1, MAX_PAGE)
    }
}

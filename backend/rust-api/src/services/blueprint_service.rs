use std::sync::Arc;

use super::{
    availability::compute_availability,
    feasibility::{check_distribution, find_shortfalls},
    repository::{BlueprintRepository, QuestionRepository},
};
use crate::error::{AppError, AppResult};
use crate::models::{
    availability::Availability,
    blueprint::{
        Blueprint, BlueprintUpdate, CreateBlueprintRequest, DistributionTotals, NewBlueprint,
        PoolMeta, UpdateBlueprintRequest, ValidateBlueprintResponse,
    },
};

pub struct BlueprintService {
    blueprints: Arc<dyn BlueprintRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl BlueprintService {
    pub fn new(
        blueprints: Arc<dyn BlueprintRepository>,
        questions: Arc<dyn QuestionRepository>,
    ) -> Self {
        Self {
            blueprints,
            questions,
        }
    }

    /// Always reads the live pool; cached snapshots are never used for decisions.
    pub async fn availability(&self, subject: &str) -> AppResult<Availability> {
        let questions = self.questions.find_by_subject(subject).await?;
        Ok(compute_availability(subject, &questions))
    }

    pub async fn create(&self, req: CreateBlueprintRequest) -> AppResult<Blueprint> {
        let title = req.title.trim().to_string();
        let subject = req.subject.trim().to_string();
        if title.is_empty() || subject.is_empty() {
            return Err(AppError::Validation(
                "title and subject are required".to_string(),
            ));
        }
        let number_of_papers = req.number_of_papers.unwrap_or(1);

        let totals = check_distribution(&req.distribution, req.total_marks, req.total_questions)?;

        let availability = self.availability(&subject).await?;
        let shortfalls = find_shortfalls(&req.distribution, &availability);
        if !shortfalls.is_empty() {
            tracing::info!(
                subject = %subject,
                cells = shortfalls.len(),
                "Blueprint rejected, pool cannot cover distribution"
            );
            return Err(AppError::Infeasible(shortfalls));
        }

        let pool_meta = PoolMeta {
            modules: availability.modules.clone(),
            marks_values: availability.marks_values.clone(),
            availability: availability.grid(),
        };

        let blueprint = self
            .blueprints
            .create(NewBlueprint {
                title,
                subject,
                total_marks: totals.total_marks,
                total_questions: totals.total_questions,
                number_of_papers,
                distribution: req.distribution,
                pool_meta,
            })
            .await?;

        tracing::info!(blueprint = %blueprint.id, subject = %blueprint.subject, "Blueprint created");
        Ok(blueprint)
    }

    pub async fn get(&self, id: &str) -> AppResult<Blueprint> {
        self.blueprints
            .get(id)
            .await?
            .ok_or(AppError::NotFound("Blueprint"))
    }

    pub async fn list(&self) -> AppResult<Vec<Blueprint>> {
        Ok(self.blueprints.list().await?)
    }

    /// Manual edit path. A new distribution must be internally consistent;
    /// feasibility is left to `validate`.
    pub async fn update(&self, id: &str, req: UpdateBlueprintRequest) -> AppResult<Blueprint> {
        let existing = self.get(id).await?;

        let distribution = match req.distribution {
            Some(distribution) => {
                let totals = DistributionTotals::of(&distribution).ok_or_else(|| {
                    AppError::Validation("distribution totals overflow".to_string())
                })?;
                check_distribution(&distribution, totals.total_marks, None)?;
                Some((distribution, totals))
            }
            None => None,
        };

        let update = BlueprintUpdate {
            title: req
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            number_of_papers: req.number_of_papers,
            distribution,
        };

        self.blueprints
            .update(&existing.id, update)
            .await?
            .ok_or(AppError::NotFound("Blueprint"))
    }

    pub async fn validate(&self, id: &str) -> AppResult<ValidateBlueprintResponse> {
        let blueprint = self.get(id).await?;
        let availability = self.availability(&blueprint.subject).await?;
        let details = find_shortfalls(&blueprint.distribution, &availability);

        Ok(ValidateBlueprintResponse {
            valid: details.is_empty(),
            details,
            totals: DistributionTotals::of(&blueprint.distribution).unwrap_or_default(),
        })
    }
}

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::{
    blueprint::{Blueprint, BlueprintUpdate, NewBlueprint},
    difficulty::DifficultyTier,
    paper::{NewPaper, Paper},
    question::{NewQuestion, Question},
};

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<Question>>;

    async fn find_by_subject_module_marks(
        &self,
        subject: &str,
        module: u32,
        marks: u32,
    ) -> Result<Vec<Question>>;

    /// Distinct subjects, sorted.
    async fn distinct_subjects(&self) -> Result<Vec<String>>;

    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<usize>;

    /// Newest first, optionally filtered by subject.
    async fn list(&self, subject: Option<&str>, limit: Option<i64>) -> Result<Vec<Question>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait BlueprintRepository: Send + Sync {
    async fn create(&self, blueprint: NewBlueprint) -> Result<Blueprint>;

    /// `None` for unknown or malformed ids.
    async fn get(&self, id: &str) -> Result<Option<Blueprint>>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<Blueprint>>;

    async fn update(&self, id: &str, update: BlueprintUpdate) -> Result<Option<Blueprint>>;
}

#[async_trait]
pub trait PaperRepository: Send + Sync {
    /// Every question id issued by any paper generated for the blueprint.
    async fn find_prior_used_question_ids(&self, blueprint_id: &str) -> Result<HashSet<String>>;

    /// Persists a whole batch. On failure nothing from the batch remains.
    async fn create_papers(&self, papers: Vec<NewPaper>) -> Result<Vec<Paper>>;

    async fn get(&self, id: &str) -> Result<Option<Paper>>;

    async fn recent(&self, limit: i64) -> Result<Vec<Paper>>;

    async fn by_difficulty(&self, tier: DifficultyTier, limit: i64) -> Result<Vec<Paper>>;

    async fn by_blueprint(&self, blueprint_id: &str) -> Result<Vec<Paper>>;
}

/// Held while a generation request runs for one blueprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub token: String,
}

#[async_trait]
pub trait GenerationLock: Send + Sync {
    /// `Ok(None)` when another holder owns the lock.
    async fn try_acquire(&self, blueprint_id: &str) -> Result<Option<LockToken>>;

    async fn release(&self, token: &LockToken) -> Result<()>;

    fn is_enabled(&self) -> bool;

    async fn ping(&self) -> Result<()>;
}

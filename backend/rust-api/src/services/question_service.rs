use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::repository::QuestionRepository;
use crate::error::AppResult;
use crate::models::question::{Breakdown, PoolMetadata, Question, QuestionStats, RbtLevel};

pub const LIST_LIMIT: i64 = 1000;
const DEFAULT_UNIT: &str = "Unit0";

/// Read-only views over the question pool.
pub struct QuestionService {
    questions: Arc<dyn QuestionRepository>,
}

impl QuestionService {
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    pub async fn subjects(&self) -> AppResult<Vec<String>> {
        Ok(self.questions.distinct_subjects().await?)
    }

    pub async fn pool_metadata(&self, subject: &str) -> AppResult<PoolMetadata> {
        let questions = self.questions.find_by_subject(subject).await?;
        Ok(pool_metadata(&questions))
    }

    pub async fn course_outcomes(&self, subject: &str) -> AppResult<Vec<String>> {
        let questions = self.questions.find_by_subject(subject).await?;
        let cos: BTreeSet<String> = questions
            .iter()
            .map(|q| q.co.trim())
            .filter(|co| !co.is_empty())
            .map(str::to_string)
            .collect();
        Ok(cos.into_iter().collect())
    }

    pub async fn rbt_levels(&self, subject: &str) -> AppResult<BTreeMap<RbtLevel, u32>> {
        let questions = self.questions.find_by_subject(subject).await?;
        let mut levels = BTreeMap::new();
        for level in questions.iter().filter_map(|q| q.rbt) {
            *levels.entry(level).or_insert(0) += 1;
        }
        Ok(levels)
    }

    pub async fn list(&self, subject: Option<&str>) -> AppResult<Vec<Question>> {
        Ok(self.questions.list(subject, Some(LIST_LIMIT)).await?)
    }

    pub async fn stats(&self, subject: Option<&str>) -> AppResult<QuestionStats> {
        let questions = self.questions.list(subject, None).await?;
        Ok(question_stats(&questions))
    }
}

fn tally(breakdown: &mut Breakdown, question: &Question) {
    breakdown.total += 1;
    *breakdown.by_marks.entry(question.marks).or_insert(0) += 1;
    let question_type = question.question_type.trim();
    if !question_type.is_empty() {
        *breakdown
            .by_type
            .entry(question_type.to_string())
            .or_insert(0) += 1;
    }
    if let Some(level) = question.rbt {
        *breakdown.by_rbt.entry(level).or_insert(0) += 1;
    }
}

/// Global and per-unit counts; questions without a unit fall under `Unit0`.
pub fn pool_metadata(questions: &[Question]) -> PoolMetadata {
    let mut meta = PoolMetadata::default();
    for question in questions {
        tally(&mut meta.overall, question);
        let unit = match question.unit.trim() {
            "" => DEFAULT_UNIT,
            unit => unit,
        };
        tally(meta.by_unit.entry(unit.to_string()).or_default(), question);
    }
    meta
}

pub fn question_stats(questions: &[Question]) -> QuestionStats {
    let mut stats = QuestionStats::default();
    for question in questions {
        stats.total_questions += 1;
        stats.total_marks += question.marks;
        *stats.by_co.entry(question.co.clone()).or_insert(0) += 1;
        let rbt = question.rbt.map(|l| l.as_str().to_string()).unwrap_or_default();
        *stats.by_rbt.entry(rbt).or_insert(0) += 1;
        *stats
            .by_type
            .entry(question.question_type.clone())
            .or_insert(0) += 1;
    }
    if stats.total_questions > 0 {
        let avg = stats.total_marks as f64 / stats.total_questions as f64;
        stats.avg_marks = (avg * 100.0).round() / 100.0;
    }
    stats
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{difficulty::DifficultyTier, question::RbtLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "ISE")]
    InSemester,
    #[serde(rename = "ESE")]
    EndSemester,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::InSemester => "ISE",
            ExamType::EndSemester => "ESE",
        }
    }

    /// Caller override: "ESE" (any case) selects end-semester, anything else in-semester.
    pub fn from_override(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("ESE") {
            ExamType::EndSemester
        } else {
            ExamType::InSemester
        }
    }

    pub fn detect(questions: &[PaperQuestion], ese_marks: u32) -> Self {
        if questions.iter().any(|q| q.marks == ese_marks) {
            ExamType::EndSemester
        } else {
            ExamType::InSemester
        }
    }
}

/// Denormalized copy of a selected question; survives edits to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperQuestion {
    pub question_id: String,
    pub question_text: String,
    pub marks: u32,
    pub module: u32,
    pub co: String,
    pub rbt: Option<RbtLevel>,
    pub pi: String,
    pub unit: String,
    #[serde(rename = "type")]
    pub question_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub difficulty_level: String,
    pub rbt_match_percentage: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub blueprint_id: String,
    pub generation_id: String,
    pub subject: String,
    pub title: String,
    pub difficulty: DifficultyTier,
    pub exam_type: ExamType,
    pub questions: Vec<PaperQuestion>,
    pub total_marks: u32,
    pub total_questions: u32,
    pub rbt_distribution: BTreeMap<RbtLevel, u32>,
    pub target_rbt_distribution: BTreeMap<RbtLevel, u32>,
    pub generation_metadata: GenerationMetadata,
    pub created_at: DateTime<Utc>,
}

/// A paper computed by the generator, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaper {
    pub blueprint_id: String,
    pub generation_id: String,
    pub subject: String,
    pub title: String,
    pub difficulty: DifficultyTier,
    pub exam_type: ExamType,
    pub questions: Vec<PaperQuestion>,
    pub total_marks: u32,
    pub total_questions: u32,
    pub rbt_distribution: BTreeMap<RbtLevel, u32>,
    pub target_rbt_distribution: BTreeMap<RbtLevel, u32>,
    pub generation_metadata: GenerationMetadata,
}

impl NewPaper {
    pub fn into_paper(self, id: String, created_at: DateTime<Utc>) -> Paper {
        Paper {
            id,
            blueprint_id: self.blueprint_id,
            generation_id: self.generation_id,
            subject: self.subject,
            title: self.title,
            difficulty: self.difficulty,
            exam_type: self.exam_type,
            questions: self.questions,
            total_marks: self.total_marks,
            total_questions: self.total_questions,
            rbt_distribution: self.rbt_distribution,
            target_rbt_distribution: self.target_rbt_distribution,
            generation_metadata: self.generation_metadata,
            created_at,
        }
    }
}

/// How closely the achieved level counts track the target percentages (0-100).
pub fn rbt_match_percentage(
    actual: &BTreeMap<RbtLevel, u32>,
    target: &BTreeMap<RbtLevel, u32>,
    total_questions: u32,
) -> f64 {
    if target.is_empty() {
        return 0.0;
    }
    let total = total_questions.max(1) as f64;
    let deviation: f64 = target
        .iter()
        .map(|(level, pct)| {
            let count = actual.get(level).copied().unwrap_or(0) as f64;
            (count / total * 100.0 - *pct as f64).abs()
        })
        .sum();
    (100.0 - deviation / target.len() as f64).max(0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperSection {
    pub label: String,
    pub marks: u32,
    pub questions: Vec<PaperQuestion>,
}

impl Paper {
    /// Groups questions by marks value (ascending) into lettered sections,
    /// each ordered by module.
    pub fn sections(&self) -> Vec<PaperSection> {
        let mut by_marks: BTreeMap<u32, Vec<PaperQuestion>> = BTreeMap::new();
        for question in &self.questions {
            by_marks
                .entry(question.marks)
                .or_default()
                .push(question.clone());
        }

        by_marks
            .into_iter()
            .enumerate()
            .map(|(idx, (marks, mut questions))| {
                questions.sort_by_key(|q| q.module);
                PaperSection {
                    label: format!("Section {}", section_letter(idx)),
                    marks,
                    questions,
                }
            })
            .collect()
    }
}

/// A, B, ..., Z, AA, AB, ...
fn section_letter(mut idx: usize) -> String {
    let mut label = Vec::new();
    loop {
        label.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    label.iter().rev().map(|b| *b as char).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePapersRequest {
    pub blueprint_id: Option<String>,
    pub number_of_papers: Option<u32>,
    pub difficulty: Option<String>,
    pub exam_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GeneratePapersResponse {
    pub message: &'static str,
    pub count: usize,
    pub papers: Vec<Paper>,
    pub difficulty_levels: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PapersByDifficulty {
    pub easy: Vec<Paper>,
    pub medium: Vec<Paper>,
    pub hard: Vec<Paper>,
    pub total: usize,
}

impl PapersByDifficulty {
    pub fn group(papers: Vec<Paper>) -> Self {
        let mut grouped = PapersByDifficulty {
            total: papers.len(),
            ..Default::default()
        };
        for paper in papers {
            match paper.difficulty {
                DifficultyTier::Easy => grouped.easy.push(paper),
                DifficultyTier::Medium => grouped.medium.push(paper),
                DifficultyTier::Hard => grouped.hard.push(paper),
            }
        }
        grouped
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

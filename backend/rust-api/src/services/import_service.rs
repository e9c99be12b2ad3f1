use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::repository::QuestionRepository;
use crate::error::{AppError, AppResult};
use crate::metrics::QUESTIONS_IMPORTED_TOTAL;
use crate::models::question::{NewQuestion, UploadQuestionsRequest, UploadQuestionsResponse};

lazy_static! {
    static ref UNIT_FROM_PI: Regex = Regex::new(r"^(\d+)\.").unwrap();
    static ref LEADING_INT: Regex = Regex::new(r"^\s*\+?(\d+)").unwrap();
}

// Header spellings seen in historical spreadsheets, in priority order.
const TEXT_HEADERS: &[&str] = &[
    "Questions",
    "Question",
    "question",
    "questions",
    "QUESTION",
    "question_text",
    "questionText",
];
const CO_HEADERS: &[&str] = &["CO", "Co", "co"];
const RBT_HEADERS: &[&str] = &["RBT", "Rbt", "rbt"];
const PI_HEADERS: &[&str] = &["Pi", "PI", "pi"];
const MARKS_HEADERS: &[&str] = &["Marks", "marks", "MARKS"];
const TYPE_HEADERS: &[&str] = &["Type", "TYPE", "type"];

/// One spreadsheet row with trimmed headers.
struct Row(Map<String, Value>);

impl Row {
    fn new(raw: &Map<String, Value>) -> Self {
        Row(raw
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.clone()))
            .collect())
    }

    /// First alias whose cell is non-empty, trimmed.
    fn field(&self, aliases: &[&str]) -> String {
        aliases
            .iter()
            .filter_map(|alias| self.0.get(*alias))
            .map(cell_to_string)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Leading non-negative integer of the cell; anything else is 0.
pub fn parse_marks(raw: &str) -> u32 {
    LEADING_INT
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0)
}

/// "3.1.2" -> "Unit3"; empty when the PI has no leading number.
pub fn unit_from_pi(pi: &str) -> String {
    UNIT_FROM_PI
        .captures(pi)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("Unit{}", m.as_str()))
        .unwrap_or_default()
}

/// Maps raw rows to questions, skipping rows without text. Returns the
/// questions and the number of skipped rows.
pub fn normalize_rows(
    subject: &str,
    rows: &[Map<String, Value>],
    upload_batch: &str,
) -> (Vec<NewQuestion>, usize) {
    let mut questions = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for raw in rows {
        let row = Row::new(raw);
        let question_text = row.field(TEXT_HEADERS);
        if question_text.is_empty() {
            skipped += 1;
            continue;
        }
        let pi = row.field(PI_HEADERS);
        questions.push(NewQuestion {
            subject: subject.to_string(),
            question_text,
            co: row.field(CO_HEADERS),
            rbt: row.field(RBT_HEADERS),
            unit: unit_from_pi(&pi),
            pi,
            marks: parse_marks(&row.field(MARKS_HEADERS)),
            question_type: row.field(TYPE_HEADERS),
            upload_batch: upload_batch.to_string(),
        });
    }

    (questions, skipped)
}

pub struct ImportService {
    questions: Arc<dyn QuestionRepository>,
    max_rows: usize,
}

impl ImportService {
    pub fn new(questions: Arc<dyn QuestionRepository>, max_rows: usize) -> Self {
        Self {
            questions,
            max_rows,
        }
    }

    pub async fn import(&self, req: UploadQuestionsRequest) -> AppResult<UploadQuestionsResponse> {
        let subject = req.subject.trim();
        if subject.is_empty() {
            return Err(AppError::Validation("Subject is required".to_string()));
        }
        if req.rows.is_empty() {
            return Err(AppError::Validation("Excel file is empty".to_string()));
        }
        if req.rows.len() > self.max_rows {
            return Err(AppError::Validation(format!(
                "Too many rows: {} (limit {})",
                req.rows.len(),
                self.max_rows
            )));
        }

        let upload_batch = Uuid::new_v4().to_string();
        let (questions, skipped) = normalize_rows(subject, &req.rows, &upload_batch);
        if questions.is_empty() {
            return Err(AppError::Validation(
                "No valid questions found in the Excel file".to_string(),
            ));
        }

        let count = self.questions.insert_many(questions).await?;

        QUESTIONS_IMPORTED_TOTAL
            .with_label_values(&["inserted"])
            .inc_by(count as u64);
        QUESTIONS_IMPORTED_TOTAL
            .with_label_values(&["skipped"])
            .inc_by(skipped as u64);
        tracing::info!(subject = %subject, count, skipped, batch = %upload_batch, "Questions imported");

        Ok(UploadQuestionsResponse {
            message: "Questions uploaded successfully".to_string(),
            count,
            upload_batch,
            skipped,
        })
    }
}

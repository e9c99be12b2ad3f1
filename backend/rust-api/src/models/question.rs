use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use validator::Validate;

lazy_static! {
    static ref MODULE_TAG_REGEX: Regex = Regex::new(r"(?i)^\s*CO\s*([0-9]+)\b").unwrap();
}

/// Revised Bloom's Taxonomy level, ordered from recall to creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RbtLevel {
    #[serde(rename = "R")]
    Remember,
    #[serde(rename = "U")]
    Understand,
    #[serde(rename = "AP")]
    Apply,
    #[serde(rename = "AN")]
    Analyze,
    #[serde(rename = "E")]
    Evaluate,
    #[serde(rename = "C")]
    Create,
}

impl RbtLevel {
    pub const ALL: [RbtLevel; 6] = [
        RbtLevel::Remember,
        RbtLevel::Understand,
        RbtLevel::Apply,
        RbtLevel::Analyze,
        RbtLevel::Evaluate,
        RbtLevel::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RbtLevel::Remember => "R",
            RbtLevel::Understand => "U",
            RbtLevel::Apply => "AP",
            RbtLevel::Analyze => "AN",
            RbtLevel::Evaluate => "E",
            RbtLevel::Create => "C",
        }
    }

    /// Substitute levels tried, in order, when this level runs short.
    pub fn fallback_order(&self) -> &'static [RbtLevel] {
        use RbtLevel as L;
        match self {
            L::Remember => &[L::Understand, L::Apply, L::Analyze, L::Evaluate, L::Create],
            L::Understand => &[L::Remember, L::Apply, L::Analyze, L::Evaluate, L::Create],
            L::Apply => &[L::Understand, L::Analyze, L::Remember, L::Evaluate, L::Create],
            L::Analyze => &[L::Apply, L::Understand, L::Evaluate, L::Remember, L::Create],
            L::Evaluate => &[L::Analyze, L::Apply, L::Create, L::Understand, L::Remember],
            L::Create => &[L::Evaluate, L::Analyze, L::Apply, L::Understand, L::Remember],
        }
    }

    /// Lenient parse for stored or imported tags; anything unknown is `None`.
    pub fn parse_tag(tag: &str) -> Option<RbtLevel> {
        RbtLevel::from_str(tag).ok()
    }
}

impl fmt::Display for RbtLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RbtLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "r" | "remember" => Ok(RbtLevel::Remember),
            "u" | "understand" => Ok(RbtLevel::Understand),
            "ap" | "apply" => Ok(RbtLevel::Apply),
            "an" | "analyze" | "analyse" => Ok(RbtLevel::Analyze),
            "e" | "evaluate" => Ok(RbtLevel::Evaluate),
            "c" | "create" => Ok(RbtLevel::Create),
            _ => Err(format!("Invalid RBT level: {}", value)),
        }
    }
}

/// Extracts the module number from a course-outcome tag ("CO3" -> 3).
pub fn parse_module_tag(co: &str) -> Option<u32> {
    MODULE_TAG_REGEX
        .captures(co)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// A pooled exam question. Immutable after import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub subject: String,
    pub question_text: String,
    /// Course-outcome tag that encodes the module, e.g. "CO2".
    pub co: String,
    pub rbt: Option<RbtLevel>,
    pub pi: String,
    pub unit: String,
    pub marks: u32,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub upload_batch: String,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn module(&self) -> Option<u32> {
        parse_module_tag(&self.co)
    }
}

/// A normalized question ready for bulk insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub subject: String,
    pub question_text: String,
    pub co: String,
    /// Raw tag as imported; stored verbatim.
    pub rbt: String,
    pub pi: String,
    pub unit: String,
    pub marks: u32,
    pub question_type: String,
    pub upload_batch: String,
}

/// Spreadsheet rows as read by the client: header -> cell value.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadQuestionsRequest {
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct UploadQuestionsResponse {
    pub message: String,
    pub count: usize,
    pub upload_batch: String,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub total: u32,
    pub by_marks: BTreeMap<u32, u32>,
    pub by_type: BTreeMap<String, u32>,
    pub by_rbt: BTreeMap<RbtLevel, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolMetadata {
    #[serde(flatten)]
    pub overall: Breakdown,
    pub by_unit: BTreeMap<String, Breakdown>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuestionStats {
    pub total_questions: u32,
    pub total_marks: u32,
    pub avg_marks: f64,
    pub by_co: BTreeMap<String, u32>,
    pub by_rbt: BTreeMap<String, u32>,
    pub by_type: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectQuery {
    pub subject: Option<String>,
}

impl SubjectQuery {
    pub fn trimmed(&self) -> Option<String> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

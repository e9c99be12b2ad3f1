use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document, Regex},
    options::FindOptions,
    Collection, Database,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::repository::{BlueprintRepository, PaperRepository, QuestionRepository};
use crate::metrics::track_db_operation;
use crate::models::{
    blueprint::{Blueprint, BlueprintUpdate, Distribution, NewBlueprint, PoolMeta},
    difficulty::DifficultyTier,
    paper::{ExamType, GenerationMetadata, NewPaper, Paper, PaperQuestion},
    question::{NewQuestion, Question, RbtLevel},
};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

const QUESTIONS: &str = "questions";
const BLUEPRINTS: &str = "blueprints";
const PAPERS: &str = "papers";

/// BSON documents only take string keys, so numeric and level maps are
/// stored with stringified keys.
type StoredGrid = BTreeMap<String, BTreeMap<String, u32>>;

fn grid_to_stored(grid: &Distribution) -> StoredGrid {
    grid.iter()
        .map(|(module, row)| {
            let row = row.iter().map(|(k, v)| (k.to_string(), *v)).collect();
            (module.to_string(), row)
        })
        .collect()
}

fn grid_from_stored(stored: StoredGrid) -> Distribution {
    stored
        .into_iter()
        .filter_map(|(module, row)| {
            let module = module.parse::<u32>().ok()?;
            let row = row
                .into_iter()
                .filter_map(|(k, v)| k.parse::<u32>().ok().map(|k| (k, v)))
                .collect();
            Some((module, row))
        })
        .collect()
}

fn levels_to_stored(levels: &BTreeMap<RbtLevel, u32>) -> BTreeMap<String, u32> {
    levels
        .iter()
        .map(|(level, count)| (level.as_str().to_string(), *count))
        .collect()
}

fn levels_from_stored(stored: BTreeMap<String, u32>) -> BTreeMap<RbtLevel, u32> {
    stored
        .into_iter()
        .filter_map(|(tag, count)| RbtLevel::parse_tag(&tag).map(|level| (level, count)))
        .collect()
}

fn newest_first(limit: Option<i64>) -> FindOptions {
    let mut options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    options.limit = limit;
    options
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct QuestionRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    subject: String,
    question_text: String,
    #[serde(default)]
    co: String,
    /// Raw level tag as imported.
    #[serde(default)]
    rbt: String,
    #[serde(default)]
    pi: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    marks: u32,
    #[serde(rename = "type", default)]
    question_type: String,
    #[serde(default)]
    upload_batch: String,
    created_at: BsonDateTime,
}

impl QuestionRecord {
    fn into_domain(self) -> Question {
        Question {
            id: self.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            subject: self.subject,
            question_text: self.question_text,
            co: self.co,
            rbt: RbtLevel::parse_tag(&self.rbt),
            pi: self.pi,
            unit: self.unit,
            marks: self.marks,
            question_type: self.question_type,
            upload_batch: self.upload_batch,
            created_at: bson_to_chrono(self.created_at),
        }
    }
}

pub struct MongoQuestionRepository {
    collection: Collection<QuestionRecord>,
    mongo: Database,
}

impl MongoQuestionRepository {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection(QUESTIONS),
            mongo,
        }
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Question>> {
        let records: Vec<QuestionRecord> = track_db_operation("find", QUESTIONS, async {
            let cursor = self
                .collection
                .find(filter)
                .with_options(options)
                .await
                .context("Failed to query questions")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read questions cursor")
        })
        .await?;
        Ok(records.into_iter().map(QuestionRecord::into_domain).collect())
    }
}

#[async_trait]
impl QuestionRepository for MongoQuestionRepository {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<Question>> {
        self.find(doc! { "subject": subject }, FindOptions::default())
            .await
    }

    async fn find_by_subject_module_marks(
        &self,
        subject: &str,
        module: u32,
        marks: u32,
    ) -> Result<Vec<Question>> {
        let co_pattern = Regex {
            pattern: format!(r"^\s*CO\s*{}\b", module),
            options: "i".to_string(),
        };
        self.find(
            doc! {
                "subject": subject,
                "co": co_pattern,
                "marks": marks as i64,
            },
            FindOptions::default(),
        )
        .await
    }

    async fn distinct_subjects(&self) -> Result<Vec<String>> {
        let values = track_db_operation("distinct", QUESTIONS, async {
            self.collection
                .distinct("subject", doc! {})
                .await
                .context("Failed to fetch distinct subjects")
        })
        .await?;

        let mut subjects: Vec<String> = values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::trim).map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect();
        subjects.sort();
        subjects.dedup();
        Ok(subjects)
    }

    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<usize> {
        if questions.is_empty() {
            return Ok(0);
        }
        let now = chrono_to_bson(Utc::now());
        let records: Vec<QuestionRecord> = questions
            .into_iter()
            .map(|q| QuestionRecord {
                id: None,
                subject: q.subject,
                question_text: q.question_text,
                co: q.co,
                rbt: q.rbt,
                pi: q.pi,
                unit: q.unit,
                marks: q.marks,
                question_type: q.question_type,
                upload_batch: q.upload_batch,
                created_at: now,
            })
            .collect();

        let result = track_db_operation("insert_many", QUESTIONS, async {
            self.collection
                .insert_many(&records)
                .await
                .context("Failed to insert questions")
        })
        .await?;
        Ok(result.inserted_ids.len())
    }

    async fn list(&self, subject: Option<&str>, limit: Option<i64>) -> Result<Vec<Question>> {
        let filter = match subject {
            Some(subject) => doc! { "subject": subject },
            None => doc! {},
        };
        self.find(filter, newest_first(limit)).await
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            self.mongo.run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| anyhow!("MongoDB timeout after 1s"))?
        .context("MongoDB error")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blueprints
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredPoolMeta {
    #[serde(default)]
    modules: Vec<u32>,
    #[serde(default)]
    marks_values: Vec<u32>,
    #[serde(default)]
    availability: StoredGrid,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlueprintRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    subject: String,
    total_marks: u32,
    total_questions: u32,
    number_of_papers: u32,
    distribution: StoredGrid,
    #[serde(default)]
    pool_meta: StoredPoolMeta,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl BlueprintRecord {
    fn into_domain(self) -> Blueprint {
        Blueprint {
            id: self.id.map(|oid| oid.to_hex()).unwrap_or_default(),
            title: self.title,
            subject: self.subject,
            total_marks: self.total_marks,
            total_questions: self.total_questions,
            number_of_papers: self.number_of_papers,
            distribution: grid_from_stored(self.distribution),
            pool_meta: PoolMeta {
                modules: self.pool_meta.modules,
                marks_values: self.pool_meta.marks_values,
                availability: grid_from_stored(self.pool_meta.availability),
            },
            created_at: bson_to_chrono(self.created_at),
            updated_at: bson_to_chrono(self.updated_at),
        }
    }
}

pub struct MongoBlueprintRepository {
    collection: Collection<BlueprintRecord>,
}

impl MongoBlueprintRepository {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection(BLUEPRINTS),
        }
    }
}

#[async_trait]
impl BlueprintRepository for MongoBlueprintRepository {
    async fn create(&self, blueprint: NewBlueprint) -> Result<Blueprint> {
        let now = chrono_to_bson(Utc::now());
        let record = BlueprintRecord {
            id: Some(ObjectId::new()),
            title: blueprint.title,
            subject: blueprint.subject,
            total_marks: blueprint.total_marks,
            total_questions: blueprint.total_questions,
            number_of_papers: blueprint.number_of_papers,
            distribution: grid_to_stored(&blueprint.distribution),
            pool_meta: StoredPoolMeta {
                modules: blueprint.pool_meta.modules,
                marks_values: blueprint.pool_meta.marks_values,
                availability: grid_to_stored(&blueprint.pool_meta.availability),
            },
            created_at: now,
            updated_at: now,
        };

        track_db_operation("insert_one", BLUEPRINTS, async {
            self.collection
                .insert_one(&record)
                .await
                .context("Failed to insert blueprint")
        })
        .await?;

        Ok(record.into_domain())
    }

    async fn get(&self, id: &str) -> Result<Option<Blueprint>> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let record = track_db_operation("find_one", BLUEPRINTS, async {
            self.collection
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to query blueprint")
        })
        .await?;
        Ok(record.map(BlueprintRecord::into_domain))
    }

    async fn list(&self) -> Result<Vec<Blueprint>> {
        let records: Vec<BlueprintRecord> = track_db_operation("find", BLUEPRINTS, async {
            let cursor = self
                .collection
                .find(doc! {})
                .sort(doc! { "created_at": -1 })
                .await
                .context("Failed to query blueprints")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read blueprints cursor")
        })
        .await?;
        Ok(records.into_iter().map(BlueprintRecord::into_domain).collect())
    }

    async fn update(&self, id: &str, update: BlueprintUpdate) -> Result<Option<Blueprint>> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        let mut set = doc! { "updated_at": chrono_to_bson(Utc::now()) };
        if let Some(title) = update.title {
            set.insert("title", title);
        }
        if let Some(count) = update.number_of_papers {
            set.insert("number_of_papers", count as i64);
        }
        if let Some((distribution, totals)) = update.distribution {
            let stored = mongodb::bson::to_bson(&grid_to_stored(&distribution))
                .context("Failed to encode distribution")?;
            set.insert("distribution", stored);
            set.insert("total_marks", totals.total_marks as i64);
            set.insert("total_questions", totals.total_questions as i64);
        }

        let result = track_db_operation("update_one", BLUEPRINTS, async {
            self.collection
                .update_one(doc! { "_id": object_id }, doc! { "$set": set })
                .await
                .context("Failed to update blueprint")
        })
        .await?;

        if result.matched_count == 0 {
            return Ok(None);
        }
        self.get(id).await
    }
}

// ---------------------------------------------------------------------------
// Papers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct PaperRecord {
    #[serde(rename = "_id")]
    id: ObjectId,
    blueprint_id: String,
    generation_id: String,
    subject: String,
    title: String,
    difficulty: DifficultyTier,
    exam_type: ExamType,
    questions: Vec<PaperQuestion>,
    total_marks: u32,
    total_questions: u32,
    rbt_distribution: BTreeMap<String, u32>,
    target_rbt_distribution: BTreeMap<String, u32>,
    generation_metadata: GenerationMetadata,
    created_at: BsonDateTime,
}

impl PaperRecord {
    fn from_new(paper: &NewPaper, created_at: BsonDateTime) -> Self {
        Self {
            id: ObjectId::new(),
            blueprint_id: paper.blueprint_id.clone(),
            generation_id: paper.generation_id.clone(),
            subject: paper.subject.clone(),
            title: paper.title.clone(),
            difficulty: paper.difficulty,
            exam_type: paper.exam_type,
            questions: paper.questions.clone(),
            total_marks: paper.total_marks,
            total_questions: paper.total_questions,
            rbt_distribution: levels_to_stored(&paper.rbt_distribution),
            target_rbt_distribution: levels_to_stored(&paper.target_rbt_distribution),
            generation_metadata: paper.generation_metadata.clone(),
            created_at,
        }
    }

    fn into_domain(self) -> Paper {
        Paper {
            id: self.id.to_hex(),
            blueprint_id: self.blueprint_id,
            generation_id: self.generation_id,
            subject: self.subject,
            title: self.title,
            difficulty: self.difficulty,
            exam_type: self.exam_type,
            questions: self.questions,
            total_marks: self.total_marks,
            total_questions: self.total_questions,
            rbt_distribution: levels_from_stored(self.rbt_distribution),
            target_rbt_distribution: levels_from_stored(self.target_rbt_distribution),
            generation_metadata: self.generation_metadata,
            created_at: bson_to_chrono(self.created_at),
        }
    }
}

pub struct MongoPaperRepository {
    collection: Collection<PaperRecord>,
}

impl MongoPaperRepository {
    pub fn new(mongo: Database) -> Self {
        Self {
            collection: mongo.collection(PAPERS),
        }
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Paper>> {
        let records: Vec<PaperRecord> = track_db_operation("find", PAPERS, async {
            let cursor = self
                .collection
                .find(filter)
                .with_options(options)
                .await
                .context("Failed to query papers")?;
            cursor
                .try_collect()
                .await
                .context("Failed to read papers cursor")
        })
        .await?;
        Ok(records.into_iter().map(PaperRecord::into_domain).collect())
    }
}

#[async_trait]
impl PaperRepository for MongoPaperRepository {
    async fn find_prior_used_question_ids(&self, blueprint_id: &str) -> Result<HashSet<String>> {
        let values = track_db_operation("distinct", PAPERS, async {
            self.collection
                .distinct("questions.question_id", doc! { "blueprint_id": blueprint_id })
                .await
                .context("Failed to fetch previously used questions")
        })
        .await?;

        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn create_papers(&self, papers: Vec<NewPaper>) -> Result<Vec<Paper>> {
        let Some(generation_id) = papers.first().map(|p| p.generation_id.clone()) else {
            return Ok(Vec::new());
        };
        let created_at = chrono_to_bson(Utc::now());
        let records: Vec<PaperRecord> = papers
            .iter()
            .map(|paper| PaperRecord::from_new(paper, created_at))
            .collect();

        let inserted = track_db_operation("insert_many", PAPERS, async {
            self.collection
                .insert_many(&records)
                .await
                .context("Failed to insert papers")
        })
        .await;

        if let Err(err) = inserted {
            tracing::error!(generation = %generation_id, error = %err, "Paper batch insert failed, rolling back");
            let cleanup = track_db_operation("delete_many", PAPERS, async {
                self.collection
                    .delete_many(doc! { "generation_id": &generation_id })
                    .await
                    .context("Failed to roll back paper batch")
            })
            .await;
            if let Err(cleanup_err) = cleanup {
                tracing::error!(generation = %generation_id, error = %cleanup_err, "Paper batch rollback failed");
            }
            return Err(err);
        }

        Ok(records.into_iter().map(PaperRecord::into_domain).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Paper>> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let record = track_db_operation("find_one", PAPERS, async {
            self.collection
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to query paper")
        })
        .await?;
        Ok(record.map(PaperRecord::into_domain))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Paper>> {
        self.find(doc! {}, newest_first(Some(limit))).await
    }

    async fn by_difficulty(&self, tier: DifficultyTier, limit: i64) -> Result<Vec<Paper>> {
        self.find(
            doc! { "difficulty": tier.as_str() },
            newest_first(Some(limit)),
        )
        .await
    }

    async fn by_blueprint(&self, blueprint_id: &str) -> Result<Vec<Paper>> {
        self.find(
            doc! { "blueprint_id": blueprint_id },
            newest_first(None),
        )
        .await
    }
}

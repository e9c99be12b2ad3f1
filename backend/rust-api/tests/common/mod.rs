#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use papergen_api::{
    config::Config,
    create_router,
    models::{
        blueprint::{Blueprint, BlueprintUpdate, NewBlueprint},
        difficulty::DifficultyTier,
        paper::{NewPaper, Paper},
        question::{NewQuestion, Question, RbtLevel},
    },
    services::{
        repository::{
            BlueprintRepository, GenerationLock, LockToken, PaperRepository, QuestionRepository,
        },
        AppState,
    },
};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryQuestions {
    pub rows: Mutex<Vec<Question>>,
}

#[async_trait]
impl QuestionRepository for MemoryQuestions {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<Question>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|q| q.subject == subject).cloned().collect())
    }

    async fn find_by_subject_module_marks(
        &self,
        subject: &str,
        module: u32,
        marks: u32,
    ) -> Result<Vec<Question>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|q| q.subject == subject && q.module() == Some(module) && q.marks == marks)
            .cloned()
            .collect())
    }

    async fn distinct_subjects(&self) -> Result<Vec<String>> {
        let rows = self.rows.lock().unwrap();
        let subjects: BTreeSet<String> = rows.iter().map(|q| q.subject.clone()).collect();
        Ok(subjects.into_iter().collect())
    }

    async fn insert_many(&self, questions: Vec<NewQuestion>) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let count = questions.len();
        for q in questions {
            rows.push(Question {
                id: Uuid::new_v4().to_string(),
                subject: q.subject,
                question_text: q.question_text,
                co: q.co,
                rbt: RbtLevel::parse_tag(&q.rbt),
                pi: q.pi,
                unit: q.unit,
                marks: q.marks,
                question_type: q.question_type,
                upload_batch: q.upload_batch,
                created_at: Utc::now(),
            });
        }
        Ok(count)
    }

    async fn list(&self, subject: Option<&str>, limit: Option<i64>) -> Result<Vec<Question>> {
        let rows = self.rows.lock().unwrap();
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows
            .iter()
            .rev()
            .filter(|q| subject.map_or(true, |s| q.subject == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlueprints {
    pub rows: Mutex<Vec<Blueprint>>,
}

#[async_trait]
impl BlueprintRepository for MemoryBlueprints {
    async fn create(&self, blueprint: NewBlueprint) -> Result<Blueprint> {
        let now = Utc::now();
        let stored = Blueprint {
            id: Uuid::new_v4().simple().to_string(),
            title: blueprint.title,
            subject: blueprint.subject,
            total_marks: blueprint.total_marks,
            total_questions: blueprint.total_questions,
            number_of_papers: blueprint.number_of_papers,
            distribution: blueprint.distribution,
            pool_meta: blueprint.pool_meta,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Blueprint>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|b| b.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Blueprint>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().cloned().collect())
    }

    async fn update(&self, id: &str, update: BlueprintUpdate) -> Result<Option<Blueprint>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(blueprint) = rows.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            blueprint.title = title;
        }
        if let Some(count) = update.number_of_papers {
            blueprint.number_of_papers = count;
        }
        if let Some((distribution, totals)) = update.distribution {
            blueprint.distribution = distribution;
            blueprint.total_marks = totals.total_marks;
            blueprint.total_questions = totals.total_questions;
        }
        blueprint.updated_at = Utc::now();
        Ok(Some(blueprint.clone()))
    }
}

#[derive(Default)]
pub struct MemoryPapers {
    pub rows: Mutex<Vec<Paper>>,
    pub fail_inserts: AtomicBool,
}

#[async_trait]
impl PaperRepository for MemoryPapers {
    async fn find_prior_used_question_ids(&self, blueprint_id: &str) -> Result<HashSet<String>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|p| p.blueprint_id == blueprint_id)
            .flat_map(|p| p.questions.iter().map(|q| q.question_id.clone()))
            .collect())
    }

    async fn create_papers(&self, papers: Vec<NewPaper>) -> Result<Vec<Paper>> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated insert failure"));
        }
        let created: Vec<Paper> = papers
            .into_iter()
            .map(|p| p.into_paper(Uuid::new_v4().simple().to_string(), Utc::now()))
            .collect();
        self.rows.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<Paper>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|p| p.id == id).cloned())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Paper>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn by_difficulty(&self, tier: DifficultyTier, limit: i64) -> Result<Vec<Paper>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|p| p.difficulty == tier)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn by_blueprint(&self, blueprint_id: &str) -> Result<Vec<Paper>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|p| p.blueprint_id == blueprint_id)
            .cloned()
            .collect())
    }
}

/// Lock held in process memory; behaves like the Redis lock for one instance.
#[derive(Default)]
pub struct MemoryLock {
    pub held: Mutex<HashSet<String>>,
}

#[async_trait]
impl GenerationLock for MemoryLock {
    async fn try_acquire(&self, blueprint_id: &str) -> Result<Option<LockToken>> {
        let key = format!("papergen:generation:{}", blueprint_id);
        let mut held = self.held.lock().unwrap();
        if !held.insert(key.clone()) {
            return Ok(None);
        }
        Ok(Some(LockToken {
            key,
            token: Uuid::new_v4().to_string(),
        }))
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        self.held.lock().unwrap().remove(&token.key);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub questions: Arc<MemoryQuestions>,
    pub blueprints: Arc<MemoryBlueprints>,
    pub papers: Arc<MemoryPapers>,
    pub lock: Arc<MemoryLock>,
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let questions = Arc::new(MemoryQuestions::default());
    let blueprints = Arc::new(MemoryBlueprints::default());
    let papers = Arc::new(MemoryPapers::default());
    let lock = Arc::new(MemoryLock::default());

    let state = AppState::with_stores(
        Config::default(),
        questions.clone(),
        blueprints.clone(),
        papers.clone(),
        lock.clone(),
    );

    TestApp {
        router: create_router(Arc::new(state)),
        questions,
        blueprints,
        papers,
        lock,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        (status, parse(&body))
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_json("POST", uri, body).await
    }

    /// Adds `count` questions for one (module, marks) cell, cycling through the given levels.
    pub fn seed(&self, subject: &str, module: u32, marks: u32, count: usize, levels: &[&str]) {
        let mut rows = self.questions.rows.lock().unwrap();
        for i in 0..count {
            let tag = levels.get(i % levels.len().max(1)).copied().unwrap_or("");
            rows.push(Question {
                id: Uuid::new_v4().to_string(),
                subject: subject.to_string(),
                question_text: format!("{subject} module {module} {marks}-mark question {i}"),
                co: format!("CO{module}"),
                rbt: RbtLevel::parse_tag(tag),
                pi: format!("{module}.1.{i}"),
                unit: format!("Unit{module}"),
                marks,
                question_type: "Theory".to_string(),
                upload_batch: "seed".to_string(),
                created_at: Utc::now(),
            });
        }
    }
}

fn parse(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

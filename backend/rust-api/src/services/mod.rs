use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use self::{
    blueprint_service::BlueprintService,
    generation_lock::{NoopGenerationLock, RedisGenerationLock},
    import_service::ImportService,
    mongo_store::{MongoBlueprintRepository, MongoPaperRepository, MongoQuestionRepository},
    paper_service::PaperService,
    question_service::QuestionService,
    repository::{BlueprintRepository, GenerationLock, PaperRepository, QuestionRepository},
};

pub struct AppState {
    pub config: Config,
    pub questions: Arc<dyn QuestionRepository>,
    pub blueprints: Arc<dyn BlueprintRepository>,
    pub papers: Arc<dyn PaperRepository>,
    pub lock: Arc<dyn GenerationLock>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: Option<redis::Client>,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        let lock: Arc<dyn GenerationLock> = match redis_client {
            Some(client) => {
                let redis = connect_redis(client).await?;
                Arc::new(RedisGenerationLock::new(
                    redis,
                    Duration::from_secs(config.generation.lock_ttl_secs),
                ))
            }
            None => {
                tracing::warn!("REDIS_URI not set, generation locking disabled");
                Arc::new(NoopGenerationLock)
            }
        };

        Ok(Self {
            questions: Arc::new(MongoQuestionRepository::new(mongo.clone())),
            blueprints: Arc::new(MongoBlueprintRepository::new(mongo.clone())),
            papers: Arc::new(MongoPaperRepository::new(mongo)),
            lock,
            config,
        })
    }

    /// State over arbitrary store implementations.
    pub fn with_stores(
        config: Config,
        questions: Arc<dyn QuestionRepository>,
        blueprints: Arc<dyn BlueprintRepository>,
        papers: Arc<dyn PaperRepository>,
        lock: Arc<dyn GenerationLock>,
    ) -> Self {
        Self {
            config,
            questions,
            blueprints,
            papers,
            lock,
        }
    }

    pub fn question_service(&self) -> QuestionService {
        QuestionService::new(self.questions.clone())
    }

    pub fn import_service(&self) -> ImportService {
        ImportService::new(self.questions.clone(), self.config.upload_max_rows)
    }

    pub fn blueprint_service(&self) -> BlueprintService {
        BlueprintService::new(self.blueprints.clone(), self.questions.clone())
    }

    pub fn paper_service(&self) -> PaperService {
        PaperService::new(
            self.blueprints.clone(),
            self.questions.clone(),
            self.papers.clone(),
            self.lock.clone(),
            self.config.generation.clone(),
        )
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}

pub mod allocation;
pub mod availability;
pub mod blueprint_service;
pub mod feasibility;
pub mod generation_lock;
pub mod import_service;
pub mod mongo_store;
pub mod paper_generator;
pub mod paper_service;
pub mod pdf_renderer;
pub mod question_service;
pub mod repository;
pub mod xlsx_export;

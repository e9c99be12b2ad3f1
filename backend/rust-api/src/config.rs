use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    /// How long a per-blueprint generation lock lives if never released.
    pub lock_ttl_secs: u64,
    /// A paper containing a question with this many marks is an end-semester paper.
    pub ese_marks: u32,
    pub recent_limit: i64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 120,
            ese_marks: 10,
            recent_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Generation locking is disabled when unset.
    pub redis_uri: Option<String>,
    pub bind_addr: String,
    pub generation: GenerationSettings,
    pub upload_max_rows: usize,
    /// Header line printed at the top of every rendered paper.
    pub institution_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "papergen".to_string(),
            redis_uri: None,
            bind_addr: "0.0.0.0:8081".to_string(),
            generation: GenerationSettings::default(),
            upload_max_rows: 5000,
            institution_name: "THAKUR COLLEGE OF ENGINEERING & TECHNOLOGY".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &config::Config) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let redis_uri = settings
            .get_string("redis.uri")
            .ok()
            .or_else(|| env::var("REDIS_URI").ok())
            .filter(|uri| !uri.trim().is_empty());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let generation = GenerationSettings {
            lock_ttl_secs: read_number(settings, "generation.lock_ttl_secs")?
                .unwrap_or(defaults.generation.lock_ttl_secs as i64)
                .max(1) as u64,
            ese_marks: read_number(settings, "generation.ese_marks")?
                .unwrap_or(defaults.generation.ese_marks as i64)
                .max(0) as u32,
            recent_limit: read_number(settings, "generation.recent_limit")?
                .unwrap_or(defaults.generation.recent_limit)
                .max(1),
        };

        let upload_max_rows = read_number(settings, "upload.max_rows")?
            .unwrap_or(defaults.upload_max_rows as i64)
            .max(1) as usize;

        let institution_name = settings
            .get_string("render.institution_name")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.institution_name);

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            bind_addr,
            generation,
            upload_max_rows,
            institution_name,
        })
    }
}

/// Missing keys are `None`; present but non-numeric values are an error.
fn read_number(settings: &config::Config, key: &str) -> Result<Option<i64>, config::ConfigError> {
    match settings.get_int(key) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn build(toml: &str) -> Config {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        Config::from_settings(&settings).unwrap()
    }

    #[test]
    #[serial]
    fn defaults_apply_when_nothing_is_set() {
        env::remove_var("MONGO_URI");
        env::remove_var("MONGO_DATABASE");
        env::remove_var("REDIS_URI");
        env::remove_var("BIND_ADDR");

        let config = build("");
        assert_eq!(config.mongo_uri, "mongodb://localhost:27017");
        assert_eq!(config.mongo_database, "papergen");
        assert!(config.redis_uri.is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.generation.ese_marks, 10);
        assert_eq!(config.generation.lock_ttl_secs, 120);
        assert_eq!(config.upload_max_rows, 5000);
    }

    #[test]
    #[serial]
    fn file_values_override_defaults() {
        env::remove_var("REDIS_URI");

        let config = build(
            r#"
            [database]
            mongo_database = "exams"

            [redis]
            uri = "redis://127.0.0.1:6379/0"

            [generation]
            ese_marks = 8
            recent_limit = 25

            [render]
            institution_name = "  Example Institute  "
            "#,
        );
        assert_eq!(config.mongo_database, "exams");
        assert_eq!(config.redis_uri.as_deref(), Some("redis://127.0.0.1:6379/0"));
        assert_eq!(config.generation.ese_marks, 8);
        assert_eq!(config.generation.recent_limit, 25);
        assert_eq!(config.institution_name, "Example Institute");
    }

    #[test]
    #[serial]
    fn non_numeric_limit_is_rejected() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[upload]\nmax_rows = \"lots\"",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        assert!(Config::from_settings(&settings).is_err());
    }
}

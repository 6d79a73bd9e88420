use crate::error::{PipelineError, Result};
use crate::retry::RetryConfig;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub rating: RatingConfig,
    pub mongo: MongoConfig,
    pub neo4j: Neo4jConfig,
    pub redis: RedisConfig,
    pub retry: RetryConfig,
    pub import: ImportConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `business.json`, `user.json` and `review.json`.
    pub input_dir: PathBuf,
    /// Directory receiving the bulk-import files.
    pub output_dir: PathBuf,
    /// Maximum number of lines read per raw file.
    pub limit: Option<usize>,
    pub synthetic: SyntheticConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/processed"),
            limit: None,
            synthetic: SyntheticConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SyntheticConfig {
    pub businesses: usize,
    pub users: usize,
    pub reviews: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            businesses: 100,
            users: 50,
            reviews: 200,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RatingPolicy {
    Clamp,
    Reject,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RatingConfig {
    pub min: f64,
    pub max: f64,
    pub policy: RatingPolicy,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 5.0,
            policy: RatingPolicy::Clamp,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub batch_size: usize,
    /// Row limit of the ranking aggregations.
    pub top_limit: usize,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "yelp_mongo".to_string(),
            batch_size: 1000,
            top_limit: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub batch_size: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "uem_password123".to_string(),
            database: "neo4j".to_string(),
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// Prepended to every key this run touches, so `ensure_schema` can clear them safely.
    pub key_prefix: String,
    pub cache_ttl_secs: u64,
    pub top_limit: usize,
    /// City used by the cached city ranking benchmark.
    pub sample_city: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "trident".to_string(),
            cache_ttl_secs: 300,
            top_limit: 10,
            sample_city: "City 1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportMethod {
    /// Vendor bulk loaders (`mongoimport`, `neo4j-admin database import`).
    Native,
    /// Batched inserts through the drivers.
    Driver,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ImportConfig {
    pub method: ImportMethod,
    pub mongoimport_bin: String,
    pub neo4j_admin_bin: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            method: ImportMethod::Driver,
            mongoimport_bin: "mongoimport".to_string(),
            neo4j_admin_bin: "neo4j-admin".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub author: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            author: env::var("AUTHOR").unwrap_or_else(|_| "trident".to_string()),
        }
    }
}

pub trait VariableResolver {
    fn is_resolvable(&self, key: &str) -> bool;
    fn resolve(&self, key: &str) -> Result<String>;
}

pub struct EnvVarResolver {}

impl VariableResolver for EnvVarResolver {
    fn is_resolvable(&self, key: &str) -> bool {
        key.starts_with("ENV_") || (key.starts_with("${") && key.ends_with('}'))
    }

    fn resolve(&self, key: &str) -> Result<String> {
        let env_key = if let Some(name) = key.strip_prefix("ENV_") {
            name
        } else if key.starts_with("${") && key.ends_with('}') {
            &key[2..key.len() - 1]
        } else {
            return Err(PipelineError::Config(format!(
                "Invalid environment variable format: {}",
                key
            )));
        };

        debug!("Looking up environment variable: {}", env_key);
        env::var(env_key).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to find environment variable '{}': {}",
                env_key, e
            ))
        })
    }
}

pub struct VariableResolverProcessor {
    resolvers: Vec<Arc<dyn VariableResolver>>,
}

impl Default for VariableResolverProcessor {
    fn default() -> Self {
        VariableResolverProcessor {
            resolvers: vec![Arc::new(EnvVarResolver {})],
        }
    }
}

impl VariableResolverProcessor {
    pub fn resolve(&self, value: &mut Value) -> Result<()> {
        match value {
            Value::String(s) => {
                for resolver in &self.resolvers {
                    if resolver.is_resolvable(s) {
                        *s = resolver.resolve(s)?;
                        return Ok(());
                    }
                }
                Ok(())
            }
            Value::Object(map) => {
                for (_, v) in map.iter_mut() {
                    self.resolve(v)?;
                }
                Ok(())
            }
            Value::Array(arr) => {
                for item in arr.iter_mut() {
                    self.resolve(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub fn parse_key_value_pair(pair: &str) -> Option<(String, String)> {
    let (key, value) = pair.split_once('=')?;
    Some((key.to_string(), value.to_string()))
}

/// Parses an override value the way a user would expect from the command line:
/// booleans and numbers become typed JSON, everything else stays a string.
fn parse_override_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(num) => Value::Number(num),
        None => Value::String(raw.to_string()),
    }
}

/// Applies `a.b.c=value` overrides onto the JSON form of the config.
pub fn apply_overrides(config: &mut Value, overrides: &[(String, String)]) -> Result<()> {
    for (key, raw) in overrides {
        let value = parse_override_value(raw);
        let mut keys = key.split('.').peekable();
        let mut current = config
            .as_object_mut()
            .ok_or_else(|| PipelineError::Config("configuration root is not a map".into()))?;
        while let Some(part) = keys.next() {
            if keys.peek().is_none() {
                current.insert(part.to_string(), value.clone());
            } else {
                current = current
                    .entry(part)
                    .or_insert_with(|| Value::Object(serde_json::Map::new()))
                    .as_object_mut()
                    .ok_or_else(|| {
                        PipelineError::Config(format!("override '{}' crosses a non-map value", key))
                    })?;
            }
        }
        debug!("Applied override {}", key);
    }
    Ok(())
}

/// Builds the effective config: the YAML file (or nothing), `ENV_` resolution, then
/// command-line overrides. Missing keys fall back to the serde defaults.
pub fn load_config(path: Option<&Path>, overrides: &[(String, String)]) -> Result<Config> {
    let mut value = Value::Object(serde_json::Map::new());

    if let Some(path) = path {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let file_value: Value = serde_yaml::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        if !file_value.is_null() {
            value = file_value;
        }
        debug!("Loaded config file {}", path.display());
    }

    VariableResolverProcessor::default().resolve(&mut value)?;
    apply_overrides(&mut value, overrides)?;

    let config: Config = serde_json::from_value(value)
        .map_err(|e| PipelineError::Config(format!("could not parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.rating.min < self.rating.max) {
            return Err(PipelineError::Config(format!(
                "rating.min ({}) must be below rating.max ({})",
                self.rating.min, self.rating.max
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.mongo.batch_size == 0 || self.neo4j.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be positive".into()));
        }
        if self.mongo.top_limit == 0 || self.redis.top_limit == 0 {
            return Err(PipelineError::Config("top_limit must be positive".into()));
        }
        // an empty prefix would make the key-value clear match every key
        if self.redis.key_prefix.trim().is_empty() {
            return Err(PipelineError::Config(
                "redis.key_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// crates/trident-storage/src/redis_cache.rs
use trident_core::config::{Config, RedisConfig};
use trident_core::error::{PipelineError, Result};
use trident_core::prepare::PreparedData;
use trident_core::report::{ImportSummary, QueryRecord};
use trident_core::retry::{retry_with_backoff, RetryConfig};
use trident_core::traits::{elapsed_ms, improvement_pct, StoreManager};
use trident_core::types::{BusinessRecord, StoreKind};

use async_trait::async_trait;
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

const SYSTEM: &str = "redis";
const IMPORT_BATCH: usize = 500;
const SCAN_COUNT: usize = 100;
const TRENDING_TTL_SECS: i64 = 3600;
const SAMPLE_REVIEW_STARS: f64 = 5.0;

pub const QUERIES: [&str; 5] = [
    "top_global",
    "top_by_city_cached",
    "popularity",
    "realtime_review_update",
    "trending",
];

/// Lowercased city name with spaces replaced, as used in ranking keys.
pub fn city_slug(city: &str) -> String {
    city.trim().to_lowercase().replace(' ', "_")
}

pub fn global_score(stars: f64) -> f64 {
    stars * 100.0
}

/// Running average after one more rating, rounded to two decimals.
pub fn incremental_average(current: f64, count: i64, new_stars: f64) -> f64 {
    let average = if count > 0 {
        (current * count as f64 + new_stars) / (count as f64 + 1.0)
    } else {
        new_stars
    };
    (average * 100.0).round() / 100.0
}

/// Key layout under one prefix.
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim().trim_end_matches(':').to_string(),
        }
    }

    /// False when there is no prefix, so the patterns cover the whole database.
    pub fn is_scoped(&self) -> bool {
        !self.prefix.is_empty()
    }

    fn key(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}:{}", self.prefix, suffix)
        }
    }

    pub fn global(&self) -> String {
        self.key("ranking:business:global")
    }

    pub fn popularity(&self) -> String {
        self.key("ranking:business:popularity")
    }

    pub fn city(&self, city: &str) -> String {
        self.key(&format!("ranking:business:city:{}", city_slug(city)))
    }

    pub fn business(&self, business_id: &str) -> String {
        self.key(&format!("business:{}", business_id))
    }

    pub fn trending(&self) -> String {
        self.key("trending:businesses")
    }

    pub fn cached_top(&self, city: &str, limit: usize) -> String {
        self.key(&format!("cache:top:{}:{}", city_slug(city), limit))
    }

    pub fn cache_pattern(&self) -> String {
        self.key("cache:top:*")
    }

    pub fn all_pattern(&self) -> String {
        self.key("*")
    }
}

fn business_fields(business: &BusinessRecord) -> Vec<(&'static str, String)> {
    vec![
        ("name", business.name.clone()),
        ("city", business.city.clone()),
        ("state", business.state.clone()),
        ("stars", business.stars.to_string()),
        ("review_count", business.review_count.to_string()),
        ("is_open", business.is_open.to_string()),
    ]
}

/// Dropped or refused connections end the run; anything else fails one query.
fn query_error(name: &str, e: redis::RedisError) -> PipelineError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        PipelineError::lost_connection(SYSTEM, e)
    } else {
        PipelineError::query(SYSTEM, name, e)
    }
}

pub struct RedisManager {
    config: RedisConfig,
    retry: RetryConfig,
    keys: Keys,
    conn: Option<ConnectionManager>,
}

impl RedisManager {
    pub fn new(config: &Config) -> Self {
        Self {
            keys: Keys::new(&config.redis.key_prefix),
            config: config.redis.clone(),
            retry: config.retry.clone(),
            conn: None,
        }
    }

    fn conn(&self) -> Result<ConnectionManager> {
        self.conn
            .clone()
            .ok_or_else(|| PipelineError::Internal("redis used before connect".into()))
    }

    async fn delete_matching(
        &self,
        conn: &mut ConnectionManager,
        pattern: &str,
    ) -> redis::RedisResult<usize> {
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await?;
            if !keys.is_empty() {
                deleted += keys.len();
                let _: () = redis::cmd("UNLINK").arg(&keys).query_async(&mut *conn).await?;
            }
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    /// Ranked businesses with their hash fields, highest score first.
    async fn ranked(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        limit: usize,
    ) -> redis::RedisResult<Vec<Value>> {
        let stop = limit.max(1) as isize - 1;
        let entries: Vec<(String, f64)> = conn.zrevrange_withscores(key, 0, stop).await?;
        let mut rows = Vec::with_capacity(entries.len());
        for (rank, (business_id, score)) in entries.into_iter().enumerate() {
            let fields: HashMap<String, String> = conn.hgetall(self.keys.business(&business_id)).await?;
            rows.push(json!({
                "rank": rank + 1,
                "business_id": business_id,
                "score": score,
                "name": fields.get("name"),
                "city": fields.get("city"),
                "stars": fields.get("stars").and_then(|s| s.parse::<f64>().ok()),
                "review_count": fields.get("review_count").and_then(|s| s.parse::<i64>().ok()),
            }));
        }
        Ok(rows)
    }

    async fn top_by_city_cached(&self, conn: &mut ConnectionManager) -> redis::RedisResult<Vec<Value>> {
        let city = &self.config.sample_city;
        let cache_key = self.keys.cached_top(city, self.config.top_limit);
        let _: () = conn.del(&cache_key).await?;

        let start = Instant::now();
        let cached: Option<String> = conn.get(&cache_key).await?;
        let results = match cached {
            Some(body) => serde_json::from_str(&body).unwrap_or_default(),
            None => {
                let rows = self.ranked(conn, &self.keys.city(city), self.config.top_limit).await?;
                let body = Value::Array(rows.clone()).to_string();
                let _: () = conn.set_ex(&cache_key, body, self.config.cache_ttl_secs).await?;
                rows
            }
        };
        let cold_ms = elapsed_ms(start);

        let start = Instant::now();
        let warm: Option<String> = conn.get(&cache_key).await?;
        let warm_rows: Vec<Value> = warm
            .and_then(|body| serde_json::from_str(&body).ok())
            .unwrap_or_default();
        let warm_ms = elapsed_ms(start);

        Ok(vec![json!({
            "city": city,
            "cache_key": cache_key,
            "results": results.len(),
            "cache_hit": warm_rows.len() == results.len(),
            "cold_ms": cold_ms,
            "warm_ms": warm_ms,
            "improvement_pct": improvement_pct(cold_ms, warm_ms),
        })])
    }

    /// Applies one new review to the top-ranked business and rescores it.
    async fn realtime_review_update(&self, conn: &mut ConnectionManager) -> redis::RedisResult<Vec<Value>> {
        let top: Vec<String> = conn.zrevrange(self.keys.global(), 0, 0).await?;
        let Some(business_id) = top.into_iter().next() else {
            return Ok(Vec::new());
        };

        let business_key = self.keys.business(&business_id);
        let fields: HashMap<String, String> = conn.hgetall(&business_key).await?;
        let current = fields.get("stars").and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
        let count = fields
            .get("review_count")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let city = fields.get("city").cloned().unwrap_or_default();

        let new_average = incremental_average(current, count, SAMPLE_REVIEW_STARS);
        let total_reviews = count + 1;
        let new_score = global_score(new_average);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(
                &business_key,
                &[
                    ("stars", new_average.to_string()),
                    ("review_count", total_reviews.to_string()),
                    ("last_review", chrono::Utc::now().to_rfc3339()),
                ],
            )
            .ignore()
            .zadd(self.keys.global(), &business_id, new_score)
            .ignore()
            .zadd(self.keys.popularity(), &business_id, total_reviews)
            .ignore();
        if !city.is_empty() {
            pipe.zadd(self.keys.city(&city), &business_id, new_score).ignore();
        }
        pipe.zincr(self.keys.trending(), &business_id, 1).ignore();
        let _: () = pipe.query_async(&mut *conn).await?;
        self.touch_trending(conn).await?;

        let invalidated = self.delete_matching(conn, &self.keys.cache_pattern()).await?;
        debug!("Invalidated {} cached rankings after update of {}", invalidated, business_id);

        Ok(vec![json!({
            "business_id": business_id,
            "previous_average": current,
            "new_average": new_average,
            "new_score": new_score,
            "total_reviews": total_reviews,
            "invalidated_keys": invalidated,
        })])
    }

    async fn touch_trending(&self, conn: &mut ConnectionManager) -> redis::RedisResult<()> {
        let ttl: i64 = conn.ttl(self.keys.trending()).await?;
        if ttl == -1 {
            let _: () = conn.expire(self.keys.trending(), TRENDING_TTL_SECS).await?;
        }
        Ok(())
    }

    /// Records a visit for the most popular businesses and lists the trending set.
    async fn trending(&self, conn: &mut ConnectionManager) -> redis::RedisResult<Vec<Value>> {
        let stop = self.config.top_limit.max(1) as isize - 1;
        let popular: Vec<String> = conn.zrevrange(self.keys.popularity(), 0, stop).await?;
        for business_id in &popular {
            let _: f64 = conn.zincr(self.keys.trending(), business_id, 1).await?;
        }
        self.touch_trending(conn).await?;

        let entries: Vec<(String, f64)> = conn
            .zrevrange_withscores(self.keys.trending(), 0, stop)
            .await?;
        let mut rows = Vec::with_capacity(entries.len());
        for (business_id, trend_score) in entries {
            let fields: HashMap<String, String> = conn.hgetall(self.keys.business(&business_id)).await?;
            rows.push(json!({
                "business_id": business_id,
                "trend_score": trend_score as i64,
                "name": fields.get("name"),
                "city": fields.get("city"),
            }));
        }
        Ok(rows)
    }
}

#[async_trait]
impl StoreManager for RedisManager {
    fn kind(&self) -> StoreKind {
        StoreKind::KeyValue
    }

    async fn connect(&mut self) -> Result<()> {
        let url = self.config.url.clone();
        let conn = retry_with_backoff(SYSTEM, &self.retry, || {
            let url = url.clone();
            async move {
                let client = redis::Client::open(url.as_str())?;
                let mut conn = client.get_connection_manager().await?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(conn)
            }
        })
        .await?;
        info!("Connected to Redis at {}", self.config.url);
        self.conn = Some(conn);
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<usize> {
        if !self.keys.is_scoped() {
            return Err(PipelineError::Config(
                "refusing to clear redis without a key prefix".into(),
            ));
        }
        let pattern = self.keys.all_pattern();
        let mut conn = self.conn()?;
        let cleared = self
            .delete_matching(&mut conn, &pattern)
            .await
            .map_err(|e| PipelineError::import(SYSTEM, e))?;
        info!("Cleared {} Redis keys matching {}", cleared, pattern);
        Ok(0)
    }

    async fn import(&mut self, data: &PreparedData) -> Result<ImportSummary> {
        let start = Instant::now();
        let mut conn = self.conn()?;
        let businesses = &data.dataset.businesses;
        let mut cities = BTreeSet::new();

        for chunk in businesses.chunks(IMPORT_BATCH) {
            let mut pipe = redis::pipe();
            for business in chunk {
                let id = business.business_id.as_str();
                let score = global_score(business.stars);
                pipe.zadd(self.keys.global(), id, score).ignore();
                pipe.zadd(self.keys.popularity(), id, business.review_count).ignore();
                if !business.city.trim().is_empty() {
                    cities.insert(city_slug(&business.city));
                    pipe.zadd(self.keys.city(&business.city), id, score).ignore();
                }
                pipe.hset_multiple(self.keys.business(id), &business_fields(business))
                    .ignore();
            }
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| PipelineError::import(SYSTEM, e))?;
        }

        let mut counts = BTreeMap::new();
        counts.insert("business".to_string(), businesses.len());
        // one sorted set per city plus the global and popularity sets
        counts.insert("rankings".to_string(), cities.len() + 2);
        let summary = ImportSummary {
            method: "driver".to_string(),
            counts,
            elapsed_ms: elapsed_ms(start),
        };
        info!(
            "Redis import finished: {} businesses across {} cities",
            businesses.len(),
            cities.len()
        );
        Ok(summary)
    }

    fn query_names(&self) -> Vec<&'static str> {
        QUERIES.to_vec()
    }

    async fn run_query(&mut self, name: &str) -> Result<QueryRecord> {
        let mut conn = self.conn()?;
        let start = Instant::now();
        let limit = self.config.top_limit;
        let rows = match name {
            "top_global" => self.ranked(&mut conn, &self.keys.global(), limit).await,
            "top_by_city_cached" => self.top_by_city_cached(&mut conn).await,
            "popularity" => self.ranked(&mut conn, &self.keys.popularity(), limit).await,
            "realtime_review_update" => self.realtime_review_update(&mut conn).await,
            "trending" => self.trending(&mut conn).await,
            _ => return Err(PipelineError::query(SYSTEM, name, "unknown query")),
        }
        .map_err(|e| query_error(name, e))?;
        let record = QueryRecord::new(SYSTEM, name, elapsed_ms(start), rows);
        debug!("{} returned {} rows in {:.3}ms", name, record.row_count, record.elapsed_ms);
        Ok(record)
    }

    async fn close(&mut self) -> Result<()> {
        self.conn = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_slug() {
        assert_eq!(city_slug("Las Vegas"), "las_vegas");
        assert_eq!(city_slug(" City 1 "), "city_1");
    }

    #[test]
    fn test_incremental_average() {
        assert_eq!(incremental_average(4.0, 3, 5.0), 4.25);
        assert_eq!(incremental_average(0.0, 0, 3.0), 3.0);
        assert_eq!(incremental_average(3.5, 2, 4.0), 3.67);
    }

    #[test]
    fn test_keys_share_prefix() {
        let keys = Keys::new("trident:");
        assert_eq!(keys.global(), "trident:ranking:business:global");
        assert_eq!(keys.city("New York"), "trident:ranking:business:city:new_york");
        assert_eq!(keys.cached_top("City 1", 10), "trident:cache:top:city_1:10");
        assert_eq!(keys.cache_pattern(), "trident:cache:top:*");
        assert_eq!(Keys::new("").business("b1"), "business:b1");
        assert!(!Keys::new(" : ").is_scoped());
        assert!(Keys::new("trident").is_scoped());
    }

    #[tokio::test]
    async fn test_unscoped_clear_refused() {
        let mut config = Config::default();
        config.redis.key_prefix = String::new();
        let mut manager = RedisManager::new(&config);
        let err = manager.ensure_schema().await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_transport_errors_end_the_run() {
        let dropped = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));
        let err = query_error("top_global", dropped);
        assert!(matches!(err, PipelineError::Connection { attempts: 1, .. }));
        assert!(err.is_fatal());

        let wrong_type = redis::RedisError::from((redis::ErrorKind::TypeError, "not a sorted set"));
        let err = query_error("top_global", wrong_type);
        assert!(matches!(err, PipelineError::Query { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_global_score() {
        assert_eq!(global_score(4.5), 450.0);
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail() {
        let mut manager = RedisManager::new(&Config::default());
        let err = manager.run_query("top_global").await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
        assert!(manager.import(&sample_data()).await.is_err());
        assert!(manager.ensure_schema().await.is_err());
    }

    fn sample_data() -> PreparedData {
        use trident_core::config::{RatingConfig, SyntheticConfig};
        use trident_core::prepare::{prepare, PrepareTargets, RecordSource};
        let dir = tempfile::tempdir().unwrap();
        let source = RecordSource::Synthetic(SyntheticConfig {
            businesses: 1,
            users: 1,
            reviews: 1,
        });
        prepare(&source, &RatingConfig::default(), dir.path(), PrepareTargets::all()).unwrap()
    }
}

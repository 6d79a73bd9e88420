// crates/trident-storage/src/mongo.rs
use crate::native::{mongoimport_commands, run_loader};

use trident_core::config::{Config, ImportConfig, ImportMethod, MongoConfig};
use trident_core::error::{PipelineError, Result};
use trident_core::prepare::PreparedData;
use trident_core::report::{ImportSummary, QueryRecord};
use trident_core::retry::{retry_with_backoff, RetryConfig};
use trident_core::traits::{elapsed_ms, improvement_pct, StoreManager};
use trident_core::types::StoreKind;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use log::{debug, info, warn};
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{Hint, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

const SYSTEM: &str = "mongodb";

pub const QUERIES: [&str; 6] = [
    "avg_stars_by_city",
    "top_businesses",
    "top_reviewers",
    "reviews_by_city",
    "category_analysis",
    "index_benchmark",
];

/// Index declared on one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub name: &'static str,
    pub keys: Document,
    pub unique: bool,
}

pub fn index_specs() -> Vec<IndexSpec> {
    let spec = |collection, name, keys, unique| IndexSpec {
        collection,
        name,
        keys,
        unique,
    };
    vec![
        spec("business", "idx_business_business_id", doc! {"business_id": 1}, true),
        spec("business", "idx_business_city", doc! {"city": 1}, false),
        spec("business", "idx_business_stars_desc", doc! {"stars": -1}, false),
        spec("business", "idx_business_review_count_desc", doc! {"review_count": -1}, false),
        spec("user", "idx_user_user_id", doc! {"user_id": 1}, true),
        spec("user", "idx_user_review_count_desc", doc! {"review_count": -1}, false),
        spec("review", "idx_review_review_id", doc! {"review_id": 1}, true),
        spec("review", "idx_review_business_id", doc! {"business_id": 1}, false),
        spec("review", "idx_review_user_id", doc! {"user_id": 1}, false),
        spec("review", "idx_review_stars_desc", doc! {"stars": -1}, false),
    ]
}

/// Collection and aggregation pipeline for a named query.
pub fn pipeline(name: &str, limit: i64) -> Option<(&'static str, Vec<Document>)> {
    let pipeline = match name {
        "avg_stars_by_city" => (
            "business",
            vec![
                doc! {"$group": {
                    "_id": "$city",
                    "avg_stars": {"$avg": "$stars"},
                    "business_count": {"$sum": 1},
                }},
                doc! {"$sort": {"avg_stars": -1, "_id": 1}},
                doc! {"$limit": limit},
            ],
        ),
        "top_businesses" => (
            "business",
            vec![
                doc! {"$match": {"stars": {"$gte": 4.0}}},
                doc! {"$sort": {"stars": -1, "review_count": -1}},
                doc! {"$limit": limit},
                doc! {"$project": {
                    "_id": 0, "business_id": 1, "name": 1, "city": 1, "stars": 1, "review_count": 1,
                }},
            ],
        ),
        "top_reviewers" => (
            "user",
            vec![
                doc! {"$sort": {"review_count": -1}},
                doc! {"$limit": limit},
                doc! {"$project": {
                    "_id": 0, "user_id": 1, "name": 1, "review_count": 1, "yelping_since": 1,
                }},
            ],
        ),
        "reviews_by_city" => (
            "review",
            vec![
                doc! {"$lookup": {
                    "from": "business",
                    "localField": "business_id",
                    "foreignField": "business_id",
                    "as": "business_info",
                }},
                doc! {"$unwind": "$business_info"},
                doc! {"$group": {
                    "_id": "$business_info.city",
                    "avg_review_stars": {"$avg": "$stars"},
                    "review_count": {"$sum": 1},
                }},
                doc! {"$sort": {"review_count": -1, "_id": 1}},
                doc! {"$limit": limit},
            ],
        ),
        "category_analysis" => (
            "business",
            vec![
                doc! {"$match": {"categories": {"$exists": true, "$ne": null}}},
                doc! {"$unwind": "$categories"},
                doc! {"$group": {
                    "_id": "$categories",
                    "count": {"$sum": 1},
                    "avg_stars": {"$avg": "$stars"},
                    "avg_reviews": {"$avg": "$review_count"},
                }},
                doc! {"$sort": {"count": -1, "_id": 1}},
                doc! {"$limit": limit * 2},
            ],
        ),
        _ => return None,
    };
    Some(pipeline)
}

fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Transport failures end the run; server-side errors only fail the query.
fn query_error(name: &str, e: mongodb::error::Error) -> PipelineError {
    let transport = matches!(
        e.kind.as_ref(),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. }
    );
    if transport {
        PipelineError::lost_connection(SYSTEM, e)
    } else {
        PipelineError::query(SYSTEM, name, e)
    }
}

/// Removes every document but keeps the collection and its indexes.
async fn clear_collection(db: &Database, name: &str) -> Result<()> {
    let deleted = db
        .collection::<Document>(name)
        .delete_many(doc! {})
        .await
        .map_err(|e| PipelineError::import(SYSTEM, e))?;
    debug!("Cleared {} documents from {}", deleted.deleted_count, name);
    Ok(())
}

pub struct MongoManager {
    config: MongoConfig,
    import: ImportConfig,
    retry: RetryConfig,
    top_limit: i64,
    client: Option<Client>,
}

impl MongoManager {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.mongo.clone(),
            import: config.import.clone(),
            retry: config.retry.clone(),
            top_limit: config.mongo.top_limit as i64,
            client: None,
        }
    }

    fn db(&self) -> Result<Database> {
        self.client
            .as_ref()
            .map(|client| client.database(&self.config.database))
            .ok_or_else(|| PipelineError::Internal("mongodb used before connect".into()))
    }

    async fn import_with_driver(&self, data: &PreparedData) -> Result<BTreeMap<String, usize>> {
        let documents = data
            .documents
            .as_ref()
            .ok_or_else(|| PipelineError::import(SYSTEM, "documents were not prepared"))?;
        let db = self.db()?;
        let mut counts = BTreeMap::new();

        for (name, rows) in [
            ("business", &documents.businesses),
            ("user", &documents.users),
            ("review", &documents.reviews),
        ] {
            let collection = db.collection::<Document>(name);
            clear_collection(&db, name).await?;

            let mut inserted = 0;
            for chunk in rows.chunks(self.config.batch_size) {
                let batch = chunk
                    .iter()
                    .map(bson::to_document)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| PipelineError::import(SYSTEM, e))?;
                let result = collection
                    .insert_many(batch)
                    .await
                    .map_err(|e| PipelineError::import(SYSTEM, e))?;
                inserted += result.inserted_ids.len();
            }
            debug!("Inserted {} documents into {}", inserted, name);
            counts.insert(name.to_string(), inserted);
        }
        Ok(counts)
    }

    async fn aggregate(&self, name: &str) -> Result<Vec<Value>> {
        let (collection, stages) = pipeline(name, self.top_limit)
            .ok_or_else(|| PipelineError::query(SYSTEM, name, "unknown query"))?;
        let cursor = self
            .db()?
            .collection::<Document>(collection)
            .aggregate(stages)
            .await
            .map_err(|e| query_error(name, e))?;
        let rows: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| query_error(name, e))?;
        Ok(rows.into_iter().map(to_json).collect())
    }

    /// Times the same id lookup as a forced collection scan and through the unique index.
    async fn index_benchmark(&self) -> Result<Vec<Value>> {
        let name = "index_benchmark";
        let business = self.db()?.collection::<Document>("business");
        let sample_id = business
            .find_one(doc! {})
            .await
            .map_err(|e| query_error(name, e))?
            .and_then(|d| d.get_str("business_id").ok().map(str::to_string))
            .ok_or_else(|| PipelineError::query(SYSTEM, name, "business collection is empty"))?;

        let start = Instant::now();
        business
            .find_one(doc! {"business_id": sample_id.as_str()})
            .hint(Hint::Keys(doc! {"$natural": 1}))
            .await
            .map_err(|e| query_error(name, e))?;
        let without_index_ms = elapsed_ms(start);

        let start = Instant::now();
        business
            .find_one(doc! {"business_id": sample_id.as_str()})
            .hint(Hint::Name("idx_business_business_id".to_string()))
            .await
            .map_err(|e| query_error(name, e))?;
        let with_index_ms = elapsed_ms(start);

        Ok(vec![json!({
            "lookup": "business_id",
            "business_id": sample_id,
            "without_index_ms": without_index_ms,
            "with_index_ms": with_index_ms,
            "improvement_pct": improvement_pct(without_index_ms, with_index_ms),
        })])
    }
}

#[async_trait]
impl StoreManager for MongoManager {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn connect(&mut self) -> Result<()> {
        let uri = self.config.uri.clone();
        let client = retry_with_backoff(SYSTEM, &self.retry, || {
            let uri = uri.clone();
            async move {
                let client = Client::with_uri_str(&uri).await?;
                client.database("admin").run_command(doc! {"ping": 1}).await?;
                Ok::<_, mongodb::error::Error>(client)
            }
        })
        .await?;
        info!("Connected to MongoDB at {}", self.config.uri);
        self.client = Some(client);
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<usize> {
        let db = self.db()?;
        let specs = index_specs();
        let mut created = 0;
        for spec in &specs {
            let model = IndexModel::builder()
                .keys(spec.keys.clone())
                .options(
                    IndexOptions::builder()
                        .name(spec.name.to_string())
                        .unique(spec.unique)
                        .build(),
                )
                .build();
            match db.collection::<Document>(spec.collection).create_index(model).await {
                Ok(_) => created += 1,
                Err(e) => warn!("Could not create index {}: {}", spec.name, e),
            }
        }
        info!("MongoDB indexes ensured: {}/{}", created, specs.len());
        Ok(created)
    }

    async fn import(&mut self, data: &PreparedData) -> Result<ImportSummary> {
        let start = Instant::now();
        let counts = match self.import.method {
            ImportMethod::Native => {
                let db = self.db()?;
                for file in data.files.for_target(SYSTEM) {
                    clear_collection(&db, &file.name).await?;
                }
                for command in mongoimport_commands(&self.import.mongoimport_bin, &self.config, &data.files) {
                    run_loader(SYSTEM, &command).await?;
                }
                data.files
                    .for_target(SYSTEM)
                    .map(|f| (f.name.clone(), f.rows))
                    .collect()
            }
            ImportMethod::Driver => self.import_with_driver(data).await?,
        };
        let summary = ImportSummary {
            method: format!("{:?}", self.import.method).to_lowercase(),
            counts,
            elapsed_ms: elapsed_ms(start),
        };
        info!("MongoDB import finished: {} documents", summary.total());
        Ok(summary)
    }

    fn query_names(&self) -> Vec<&'static str> {
        QUERIES.to_vec()
    }

    async fn run_query(&mut self, name: &str) -> Result<QueryRecord> {
        let start = Instant::now();
        let rows = match name {
            "index_benchmark" => self.index_benchmark().await?,
            _ => self.aggregate(name).await?,
        };
        let record = QueryRecord::new(SYSTEM, name, elapsed_ms(start), rows);
        debug!("{} returned {} rows in {:.3}ms", name, record.row_count, record.elapsed_ms);
        Ok(record)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        Ok(())
    }
}

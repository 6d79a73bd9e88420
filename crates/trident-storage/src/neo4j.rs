// crates/trident-storage/src/neo4j.rs
use crate::native::{neo4j_admin_command, run_loader};

use trident_core::config::{Config, ImportConfig, ImportMethod, Neo4jConfig};
use trident_core::error::{PipelineError, Result};
use trident_core::prepare::PreparedData;
use trident_core::report::{ImportSummary, QueryRecord};
use trident_core::retry::{retry_with_backoff, RetryConfig};
use trident_core::traits::{elapsed_ms, StoreManager};
use trident_core::transform::{
    BusinessNode, FriendRelationship, ReviewedRelationship, UserNode, ARRAY_DELIMITER,
};
use trident_core::types::StoreKind;

use async_trait::async_trait;
use log::{debug, info};
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Database, Graph, Row,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

const SYSTEM: &str = "neo4j";

pub const SCHEMA_STATEMENTS: [&str; 2] = [
    "CREATE CONSTRAINT business_id_unique IF NOT EXISTS FOR (b:Business) REQUIRE b.business_id IS UNIQUE",
    "CREATE CONSTRAINT user_id_unique IF NOT EXISTS FOR (u:User) REQUIRE u.user_id IS UNIQUE",
];

const CLEAR_GRAPH: &str = "MATCH (n) DETACH DELETE n";

const MERGE_BUSINESSES: &str = r#"
UNWIND $rows AS row
MERGE (b:Business {business_id: row.business_id})
SET b.name = row.name, b.city = row.city, b.state = row.state,
    b.stars = row.stars, b.review_count = row.review_count, b.categories = row.categories
"#;

const MERGE_USERS: &str = r#"
UNWIND $rows AS row
MERGE (u:User {user_id: row.user_id})
SET u.name = row.name, u.review_count = row.review_count, u.yelping_since = row.yelping_since
"#;

const CREATE_REVIEWED: &str = r#"
UNWIND $rows AS row
MATCH (u:User {user_id: row.user_id})
MATCH (b:Business {business_id: row.business_id})
CREATE (u)-[:REVIEWED {review_id: row.review_id, stars: row.stars, date: date(row.date)}]->(b)
"#;

const CREATE_FRIENDS: &str = r#"
UNWIND $rows AS row
MATCH (a:User {user_id: row.user_id})
MATCH (b:User {user_id: row.friend_id})
CREATE (a)-[:FRIENDS]->(b)
"#;

pub const QUERIES: [&str; 6] = [
    "users_with_common_businesses",
    "most_central_businesses",
    "top_rated_businesses",
    "user_communities_by_city",
    "graph_density",
    "rating_distribution",
];

pub fn cypher(name: &str) -> Option<&'static str> {
    let statement = match name {
        "users_with_common_businesses" => {
            r#"
            MATCH (u1:User)-[:REVIEWED]->(b:Business)<-[:REVIEWED]-(u2:User)
            WHERE u1.user_id < u2.user_id
            WITH u1, u2, COUNT(b) AS common_businesses
            WHERE common_businesses > 1
            RETURN u1.name AS user1, u2.name AS user2, common_businesses
            ORDER BY common_businesses DESC, user1, user2
            LIMIT 10
            "#
        }
        "most_central_businesses" => {
            r#"
            MATCH (b:Business)<-[r:REVIEWED]-()
            RETURN b.name AS business_name, b.city AS city,
                   COUNT(r) AS review_count, AVG(r.stars) AS avg_rating
            ORDER BY review_count DESC, business_name
            LIMIT 10
            "#
        }
        "top_rated_businesses" => {
            r#"
            MATCH (b:Business)
            WHERE b.stars >= 4.0
            OPTIONAL MATCH (b)<-[r:REVIEWED]-()
            WITH b, COUNT(r) AS review_count, AVG(r.stars) AS avg_user_rating
            RETURN b.name AS name, b.city AS city, b.stars AS business_rating,
                   avg_user_rating, review_count
            ORDER BY avg_user_rating DESC, name
            LIMIT 10
            "#
        }
        "user_communities_by_city" => {
            r#"
            MATCH (u:User)-[:REVIEWED]->(b:Business)
            WITH u, b.city AS city, COUNT(*) AS visits
            ORDER BY visits DESC
            WITH u, COLLECT(city)[0] AS favorite_city
            RETURN favorite_city, COUNT(u) AS users_count
            ORDER BY users_count DESC, favorite_city
            LIMIT 10
            "#
        }
        "graph_density" => {
            r#"
            OPTIONAL MATCH (u:User)
            WITH COUNT(u) AS user_count
            OPTIONAL MATCH (b:Business)
            WITH user_count, COUNT(b) AS business_count
            OPTIONAL MATCH ()-[r:REVIEWED]->()
            WITH user_count, business_count, COUNT(r) AS total_reviews
            RETURN user_count, business_count, total_reviews,
                   CASE WHEN user_count * business_count = 0 THEN 0.0
                        ELSE total_reviews * 1.0 / (user_count * business_count) END AS density
            "#
        }
        "rating_distribution" => {
            r#"
            MATCH ()-[r:REVIEWED]->()
            RETURN r.stars AS stars, COUNT(r) AS reviews
            ORDER BY stars
            "#
        }
        _ => return None,
    };
    Some(statement)
}

/// Converts a JSON value into the bolt type sent as a query parameter.
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

/// Node and relationship rows as plain property maps for `UNWIND $rows`.
pub fn business_params(node: &BusinessNode) -> Value {
    let categories: Vec<&str> = node
        .categories
        .split(ARRAY_DELIMITER)
        .filter(|c| !c.is_empty())
        .collect();
    json!({
        "business_id": node.business_id,
        "name": node.name,
        "city": node.city,
        "state": node.state,
        // floats stay floats in bolt even when integral
        "stars": node.stars,
        "review_count": node.review_count,
        "categories": categories,
    })
}

pub fn user_params(node: &UserNode) -> Value {
    json!({
        "user_id": node.user_id,
        "name": node.name,
        "review_count": node.review_count,
        "yelping_since": node.yelping_since,
    })
}

pub fn reviewed_params(rel: &ReviewedRelationship) -> Value {
    json!({
        "review_id": rel.review_id,
        "user_id": rel.user_id,
        "business_id": rel.business_id,
        "stars": rel.stars,
        "date": rel.date,
    })
}

pub fn friend_params(rel: &FriendRelationship) -> Value {
    json!({"user_id": rel.user_id, "friend_id": rel.friend_id})
}

/// Socket failures end the run; server-side errors only fail the query.
fn query_error(name: &str, e: neo4rs::Error) -> PipelineError {
    match e {
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            PipelineError::lost_connection(SYSTEM, e)
        }
        e => PipelineError::query(SYSTEM, name, e),
    }
}

fn row_to_json(row: &Row, name: &str) -> Result<Value> {
    row.to::<Value>()
        .map_err(|e| PipelineError::query(SYSTEM, name, format!("failed to convert row: {}", e)))
}

pub struct Neo4jManager {
    config: Neo4jConfig,
    import: ImportConfig,
    retry: RetryConfig,
    graph: Option<Graph>,
}

impl Neo4jManager {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.neo4j.clone(),
            import: config.import.clone(),
            retry: config.retry.clone(),
            graph: None,
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| PipelineError::Internal("neo4j used before connect".into()))
    }

    async fn send_batches(&self, label: &str, statement: &str, rows: Vec<Value>) -> Result<usize> {
        let graph = self.graph()?;
        for chunk in rows.chunks(self.config.batch_size) {
            let mut list = BoltList::new();
            for row in chunk {
                list.push(json_to_bolt(row));
            }
            graph
                .run(query(statement).param("rows", BoltType::List(list)))
                .await
                .map_err(|e| PipelineError::import(SYSTEM, format!("{}: {}", label, e)))?;
        }
        debug!("Sent {} {} rows", rows.len(), label);
        Ok(rows.len())
    }

    async fn import_with_driver(&self, data: &PreparedData) -> Result<BTreeMap<String, usize>> {
        let graph_rows = data
            .graph
            .as_ref()
            .ok_or_else(|| PipelineError::import(SYSTEM, "graph rows were not prepared"))?;

        self.graph()?
            .run(query(CLEAR_GRAPH))
            .await
            .map_err(|e| PipelineError::import(SYSTEM, e))?;

        let mut counts = BTreeMap::new();
        let businesses = graph_rows.businesses.iter().map(business_params).collect();
        counts.insert(
            "business".to_string(),
            self.send_batches("business", MERGE_BUSINESSES, businesses).await?,
        );
        let users = graph_rows.users.iter().map(user_params).collect();
        counts.insert("user".to_string(), self.send_batches("user", MERGE_USERS, users).await?);
        let reviewed = graph_rows.reviewed.iter().map(reviewed_params).collect();
        counts.insert(
            "reviewed".to_string(),
            self.send_batches("reviewed", CREATE_REVIEWED, reviewed).await?,
        );
        let friends = graph_rows.friends.iter().map(friend_params).collect();
        counts.insert(
            "friends".to_string(),
            self.send_batches("friends", CREATE_FRIENDS, friends).await?,
        );
        Ok(counts)
    }
}

#[async_trait]
impl StoreManager for Neo4jManager {
    fn kind(&self) -> StoreKind {
        StoreKind::Graph
    }

    async fn connect(&mut self) -> Result<()> {
        let config = self.config.clone();
        let graph = retry_with_backoff(SYSTEM, &self.retry, || {
            let config = config.clone();
            async move {
                let graph_config = ConfigBuilder::default()
                    .uri(&config.uri)
                    .user(&config.user)
                    .password(&config.password)
                    .db(Database::from(config.database.as_str()))
                    .build()?;
                let graph = Graph::connect(graph_config).await?;
                graph.run(query("RETURN 1")).await?;
                Ok::<_, neo4rs::Error>(graph)
            }
        })
        .await?;
        info!("Connected to Neo4j at {}", self.config.uri);
        self.graph = Some(graph);
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<usize> {
        let graph = self.graph()?;
        for statement in SCHEMA_STATEMENTS {
            debug!("Executing schema statement: {}", statement);
            graph
                .run(query(statement))
                .await
                .map_err(|e| PipelineError::import(SYSTEM, e))?;
        }
        info!("Neo4j constraints ensured: {}", SCHEMA_STATEMENTS.len());
        Ok(SCHEMA_STATEMENTS.len())
    }

    async fn import(&mut self, data: &PreparedData) -> Result<ImportSummary> {
        let start = Instant::now();
        let counts = match self.import.method {
            ImportMethod::Native => {
                // neo4j-admin writes the store files directly, so the driver lets go
                // and reconnects once the database is back online
                self.graph = None;
                let command = neo4j_admin_command(&self.import.neo4j_admin_bin, &self.config, &data.files);
                run_loader(SYSTEM, &command).await?;
                self.connect().await?;
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
        info!("Neo4j import finished: {} nodes and relationships", summary.total());
        Ok(summary)
    }

    fn import_replaces_store(&self) -> bool {
        self.import.method == ImportMethod::Native
    }

    fn query_names(&self) -> Vec<&'static str> {
        QUERIES.to_vec()
    }

    async fn run_query(&mut self, name: &str) -> Result<QueryRecord> {
        let statement =
            cypher(name).ok_or_else(|| PipelineError::query(SYSTEM, name, "unknown query"))?;
        let start = Instant::now();
        let mut result = self
            .graph()?
            .execute(query(statement))
            .await
            .map_err(|e| query_error(name, e))?;

        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| query_error(name, e))?
        {
            rows.push(row_to_json(&row, name)?);
        }
        let record = QueryRecord::new(SYSTEM, name, elapsed_ms(start), rows);
        debug!("{} returned {} rows in {:.3}ms", name, record.row_count, record.elapsed_ms);
        Ok(record)
    }

    async fn close(&mut self) -> Result<()> {
        self.graph = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_query_has_cypher() {
        for name in QUERIES {
            assert!(cypher(name).is_some(), "{}", name);
        }
        assert!(cypher("shortest_path").is_none());
    }

    #[test]
    fn test_density_guards_empty_graph() {
        let statement = cypher("graph_density").unwrap();
        // every MATCH must be optional or an empty label yields no row at all
        for line in statement.lines().map(str::trim) {
            if line.contains("MATCH") {
                assert!(line.starts_with("OPTIONAL MATCH"), "{}", line);
            }
        }
        assert!(statement.contains("AS density"));
    }

    #[test]
    fn test_only_bulk_loader_replaces_store() {
        let mut config = Config::default();
        assert!(!Neo4jManager::new(&config).import_replaces_store());
        config.import.method = ImportMethod::Native;
        assert!(Neo4jManager::new(&config).import_replaces_store());
    }

    #[test]
    fn test_transport_errors_end_the_run() {
        let reset = neo4rs::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        let err = query_error("rating_distribution", reset);
        assert!(matches!(err, PipelineError::Connection { attempts: 1, .. }));
        assert!(matches!(
            query_error("rating_distribution", neo4rs::Error::ConnectionError),
            PipelineError::Connection { .. }
        ));
        assert!(matches!(
            query_error("rating_distribution", neo4rs::Error::ConversionError),
            PipelineError::Query { .. }
        ));
    }

    #[test]
    fn test_business_params_split_categories() {
        let node = BusinessNode {
            business_id: "b1".into(),
            name: "Bar".into(),
            city: "Madrid".into(),
            state: "MD".into(),
            stars: 4.0,
            review_count: 3,
            categories: "Bars;Nightlife".into(),
            label: "Business".into(),
        };
        let params = business_params(&node);
        assert_eq!(params["categories"], json!(["Bars", "Nightlife"]));

        let empty = BusinessNode {
            categories: String::new(),
            ..node
        };
        assert_eq!(business_params(&empty)["categories"], json!([]));
    }

    #[test]
    fn test_json_to_bolt_types() {
        assert!(matches!(json_to_bolt(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(4.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!(null)), BoltType::Null(_)));
        match json_to_bolt(&json!({"ids": ["a", "b"]})) {
            BoltType::Map(map) => assert_eq!(map.value.len(), 1),
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_relationship_params() {
        let rel = ReviewedRelationship {
            review_id: "r1".into(),
            user_id: "u1".into(),
            business_id: "b1".into(),
            stars: 5.0,
            date: "2023-01-02".into(),
            rel_type: "REVIEWED".into(),
        };
        let params = reviewed_params(&rel);
        assert_eq!(params["date"], "2023-01-02");
        assert!(params.get("rel_type").is_none());
    }
}

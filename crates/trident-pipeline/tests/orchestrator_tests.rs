use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};
use trident_core::config::{Config, SyntheticConfig};
use trident_core::error::{PipelineError, Result};
use trident_core::prepare::{PreparedData, RecordSource};
use trident_core::report::{ImportSummary, QueryRecord, REPORT_FILE};
use trident_core::stage::Stage;
use trident_core::synthetic::SyntheticGenerator;
use trident_core::traits::StoreManager;
use trident_core::types::StoreKind;
use trident_core::writer::BulkFileWriter;
use trident_pipeline::Orchestrator;

type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy)]
enum Failure {
    None,
    Connect,
    Import,
    LostConnection,
}

struct MockStore {
    kind: StoreKind,
    failure: Failure,
    failing_query: Option<&'static str>,
    replaces_store: bool,
    calls: CallLog,
}

impl MockStore {
    fn boxed(kind: StoreKind, calls: &CallLog) -> Box<dyn StoreManager> {
        Box::new(Self {
            kind,
            failure: Failure::None,
            failing_query: None,
            replaces_store: false,
            calls: calls.clone(),
        })
    }

    fn log(&self, call: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.kind.system(), call));
    }
}

#[async_trait]
impl StoreManager for MockStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn connect(&mut self) -> Result<()> {
        self.log("connect");
        if let Failure::Connect = self.failure {
            return Err(PipelineError::Connection {
                system: self.system().to_string(),
                message: "connection refused".to_string(),
                attempts: 3,
            });
        }
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<usize> {
        self.log("schema");
        Ok(2)
    }

    async fn import(&mut self, data: &PreparedData) -> Result<ImportSummary> {
        self.log("import");
        if let Failure::Import = self.failure {
            return Err(PipelineError::import(self.system(), "loader rejected business_nodes.csv"));
        }
        let mut summary = ImportSummary {
            method: "driver".to_string(),
            ..ImportSummary::default()
        };
        summary
            .counts
            .insert("business".to_string(), data.dataset.businesses.len());
        Ok(summary)
    }

    fn import_replaces_store(&self) -> bool {
        self.replaces_store
    }

    fn query_names(&self) -> Vec<&'static str> {
        vec!["first", "second"]
    }

    async fn run_query(&mut self, name: &str) -> Result<QueryRecord> {
        self.log(name);
        if let (Failure::LostConnection, "second") = (self.failure, name) {
            return Err(PipelineError::Connection {
                system: self.system().to_string(),
                message: "broken pipe".to_string(),
                attempts: 1,
            });
        }
        if self.failing_query == Some(name) {
            return Err(PipelineError::query(self.system(), name, "syntax error"));
        }
        Ok(QueryRecord::new(self.system(), name, 1.5, vec![json!({"value": 1})]))
    }

    async fn close(&mut self) -> Result<()> {
        self.log("close");
        Ok(())
    }
}

fn setup() -> (TempDir, Config, RecordSource) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.data.output_dir = dir.path().join("processed");
    config.report.output_dir = dir.path().join("reports");
    let source = RecordSource::Synthetic(SyntheticConfig {
        businesses: 10,
        users: 5,
        reviews: 20,
    });
    (dir, config, source)
}

fn read_report(config: &Config) -> Value {
    let body = std::fs::read_to_string(config.report.output_dir.join(REPORT_FILE)).unwrap();
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn test_graph_import_failure_still_reports_document_results() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let graph = Box::new(MockStore {
        kind: StoreKind::Graph,
        failure: Failure::Import,
        failing_query: None,
        replaces_store: false,
        calls: calls.clone(),
    });
    let managers: Vec<Box<dyn StoreManager>> = vec![
        MockStore::boxed(StoreKind::Document, &calls),
        graph,
        MockStore::boxed(StoreKind::KeyValue, &calls),
    ];

    let outcome = Orchestrator::new(config.clone(), source, managers)
        .with_report(false)
        .run()
        .await;

    assert_eq!(outcome.final_stage, Stage::Failed);
    assert!(!outcome.succeeded());
    assert!(matches!(outcome.error, Some(PipelineError::Import { .. })));
    assert!(outcome.report_paths.is_some());

    let report = read_report(&config);
    assert_eq!(report["final_stage"], "FAILED");
    assert_eq!(report["systems"]["mongodb"]["queries"].as_array().unwrap().len(), 2);
    assert!(report["systems"]["neo4j"]["error"]
        .as_str()
        .unwrap()
        .contains("loader rejected"));
    assert!(report["systems"].get("redis").is_none());
    assert!(report["failure"].as_str().is_some());

    let history = report["stage_history"].as_array().unwrap();
    assert_eq!(history.last().unwrap()["from"], "IMPORT");
    assert_eq!(history.last().unwrap()["to"], "FAILED");

    let calls = calls.lock().unwrap();
    assert!(calls.contains(&"neo4j:close".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("redis:")));
}

#[tokio::test]
async fn test_successful_run_walks_every_stage() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let redis = Box::new(MockStore {
        kind: StoreKind::KeyValue,
        failure: Failure::None,
        failing_query: Some("second"),
        replaces_store: false,
        calls: calls.clone(),
    });
    let managers: Vec<Box<dyn StoreManager>> = vec![
        MockStore::boxed(StoreKind::Document, &calls),
        MockStore::boxed(StoreKind::Graph, &calls),
        redis,
    ];

    let outcome = Orchestrator::new(config.clone(), source, managers).run().await;

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    let stages: Vec<Stage> = outcome.report.stage_history.iter().map(|t| t.to).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Prepare,
            Stage::Import,
            Stage::Query,
            Stage::Import,
            Stage::Query,
            Stage::Import,
            Stage::Query,
            Stage::Report,
            Stage::Done,
        ]
    );

    let redis = &outcome.report.systems["redis"];
    assert_eq!(redis.queries.len(), 1);
    assert_eq!(redis.failed_queries.len(), 1);
    assert_eq!(redis.failed_queries[0].name, "second");
    assert_eq!(outcome.report.systems["mongodb"].indexes_created, 2);
    assert!(outcome.report.comparison.is_some());

    let report = read_report(&config);
    assert_eq!(report["final_stage"], "DONE");
    assert_eq!(report["preparation"]["businesses"], 10);
    assert!(config.report.output_dir.join("summary.txt").exists());
}

#[tokio::test]
async fn test_report_skipped_when_disabled() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let managers = vec![MockStore::boxed(StoreKind::KeyValue, &calls)];

    let outcome = Orchestrator::new(config.clone(), source, managers)
        .with_mode("redis")
        .with_report(false)
        .run()
        .await;

    assert!(outcome.succeeded());
    assert!(outcome.report_paths.is_none());
    assert!(!config.report.output_dir.join(REPORT_FILE).exists());
    assert_eq!(outcome.report.mode, "redis");
    // the key-value store needs no bulk files
    assert!(outcome.report.preparation.unwrap().files.is_empty());
}

#[tokio::test]
async fn test_connection_failure_fails_run() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let managers: Vec<Box<dyn StoreManager>> = vec![Box::new(MockStore {
        kind: StoreKind::Document,
        failure: Failure::Connect,
        failing_query: None,
        replaces_store: false,
        calls: calls.clone(),
    })];

    let outcome = Orchestrator::new(config, source, managers).run().await;

    assert_eq!(outcome.final_stage, Stage::Failed);
    assert!(matches!(
        outcome.error,
        Some(PipelineError::Connection { attempts: 3, .. })
    ));
    let mongo = &outcome.report.systems["mongodb"];
    assert!(!mongo.connected);
    assert!(mongo.import.is_none());
    assert!(outcome.report.comparison.is_none());
    assert!(outcome.report.preparation.is_some());
}

#[tokio::test]
async fn test_no_stores_is_internal_error() {
    let (_dir, config, source) = setup();
    let outcome = Orchestrator::new(config, source, Vec::new()).run().await;
    assert_eq!(outcome.final_stage, Stage::Failed);
    assert!(matches!(outcome.error, Some(PipelineError::Internal(_))));
    assert_eq!(outcome.report.stage_history.len(), 1);
}

#[tokio::test]
async fn test_lost_connection_during_queries_fails_run() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let managers: Vec<Box<dyn StoreManager>> = vec![
        Box::new(MockStore {
            kind: StoreKind::Document,
            failure: Failure::LostConnection,
            failing_query: None,
            replaces_store: false,
            calls: calls.clone(),
        }),
        MockStore::boxed(StoreKind::Graph, &calls),
    ];

    let outcome = Orchestrator::new(config, source, managers).run().await;

    assert_eq!(outcome.final_stage, Stage::Failed);
    let mongo = &outcome.report.systems["mongodb"];
    assert_eq!(mongo.queries.len(), 1);
    assert_eq!(mongo.failed_queries.len(), 1);
    assert!(mongo.error.is_some());
    let last = outcome.report.stage_history.last().unwrap();
    assert_eq!((last.from, last.to), (Stage::Query, Stage::Failed));
    assert!(calls.lock().unwrap().contains(&"mongodb:close".to_string()));
    assert!(!outcome.report.systems.contains_key("neo4j"));
}

#[tokio::test]
async fn test_schema_follows_import_when_store_is_replaced() {
    let (_dir, config, source) = setup();
    let calls = CallLog::default();
    let managers: Vec<Box<dyn StoreManager>> = vec![
        MockStore::boxed(StoreKind::Document, &calls),
        Box::new(MockStore {
            kind: StoreKind::Graph,
            failure: Failure::None,
            failing_query: None,
            replaces_store: true,
            calls: calls.clone(),
        }),
    ];

    let outcome = Orchestrator::new(config, source, managers)
        .with_report(false)
        .run()
        .await;

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    let calls = calls.lock().unwrap();
    let order = |system: &str| -> Vec<String> {
        calls
            .iter()
            .filter_map(|c| c.strip_prefix(&format!("{}:", system)))
            .take(3)
            .map(str::to_string)
            .collect()
    };
    assert_eq!(order("mongodb"), ["connect", "schema", "import"]);
    assert_eq!(order("neo4j"), ["connect", "import", "schema"]);
    assert_eq!(outcome.report.systems["neo4j"].indexes_created, 2);
}

struct CapturingLogger;

static CAPTURED: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());
static LOGGER: CapturingLogger = CapturingLogger;

impl log::Log for CapturingLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[tokio::test]
async fn test_dangling_friends_not_logged_as_warnings() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);

    let (dir, config, _) = setup();
    let mut dataset = SyntheticGenerator::new(SyntheticConfig {
        businesses: 4,
        users: 3,
        reviews: 6,
    })
    .generate();
    dataset.users[0].friends.push("ghost-user".to_string());
    let raw = dir.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    BulkFileWriter::write_raw(&raw, &dataset).unwrap();
    let source = RecordSource::Files { dir: raw, limit: None };

    let calls = CallLog::default();
    let managers = vec![MockStore::boxed(StoreKind::Graph, &calls)];
    let outcome = Orchestrator::new(config, source, managers)
        .with_report(false)
        .run()
        .await;

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert!(outcome.report.preparation.unwrap().issue_count >= 1);
    let captured = CAPTURED.lock().unwrap();
    let mentions: Vec<log::Level> = captured
        .iter()
        .filter(|(_, message)| message.contains("ghost-user"))
        .map(|(level, _)| *level)
        .collect();
    assert_eq!(mentions, vec![log::Level::Debug]);
}

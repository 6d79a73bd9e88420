//! Run report
//!
//! `report.json` carries everything the run produced: stage history,
//! preparation counts, per-system import and query results, and the
//! cross-system comparison. `summary.txt` is a short plain-text rendering of
//! the same data.

use crate::error::{PipelineError, Result};
use crate::stage::{Stage, StageTransition};
use crate::types::ValidationIssue;
use crate::writer::{write_atomic, BulkFiles};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "report.json";
pub const SUMMARY_FILE: &str = "summary.txt";

/// Issues kept verbatim in the report; the rest are only counted.
const ISSUE_SAMPLE: usize = 20;

/// Normalized result of one named analytical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub system: String,
    pub name: String,
    pub elapsed_ms: f64,
    pub row_count: usize,
    pub rows: Value,
}

impl QueryRecord {
    pub fn new(system: &str, name: &str, elapsed_ms: f64, rows: Vec<Value>) -> Self {
        Self {
            system: system.to_string(),
            name: name.to_string(),
            elapsed_ms,
            row_count: rows.len(),
            rows: Value::Array(rows),
        }
    }

    /// Field of the first row, for single-row benchmark results.
    pub fn first(&self, field: &str) -> Option<&Value> {
        self.rows.as_array()?.first()?.get(field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// `native` or `driver`.
    pub method: String,
    /// Imported count per collection, label or key family.
    pub counts: BTreeMap<String, usize>,
    pub elapsed_ms: f64,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemReport {
    pub system: String,
    pub connected: bool,
    pub indexes_created: usize,
    pub import: Option<ImportSummary>,
    pub queries: Vec<QueryRecord>,
    pub failed_queries: Vec<QueryFailure>,
    /// Fatal error that stopped this system, if any.
    pub error: Option<String>,
}

impl SystemReport {
    pub fn new(system: &str) -> Self {
        Self {
            system: system.to_string(),
            ..Self::default()
        }
    }

    pub fn query(&self, name: &str) -> Option<&QueryRecord> {
        self.queries.iter().find(|q| q.name == name)
    }

    pub fn total_query_ms(&self) -> f64 {
        self.queries.iter().map(|q| q.elapsed_ms).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparationSummary {
    /// `synthetic` or the input directory.
    pub source: String,
    pub businesses: usize,
    pub users: usize,
    pub reviews: usize,
    pub friendships: usize,
    pub issue_count: usize,
    pub dropped_records: usize,
    pub issues: Vec<ValidationIssue>,
    pub files: BulkFiles,
}

impl PreparationSummary {
    pub fn with_issues(mut self, issues: &[ValidationIssue]) -> Self {
        self.issue_count = issues.len();
        self.dropped_records = issues.iter().filter(|i| i.dropped()).count();
        self.issues = issues.iter().take(ISSUE_SAMPLE).cloned().collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTiming {
    pub system: String,
    pub queries: usize,
    pub total_ms: f64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCase {
    pub best_for: Vec<String>,
    pub strength: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub timings: Vec<SystemTiming>,
    /// System with the lowest average query time.
    pub fastest: Option<String>,
    pub use_cases: BTreeMap<String, UseCase>,
    pub conclusions: Vec<String>,
}

impl Comparison {
    pub fn from_systems(systems: &BTreeMap<String, SystemReport>) -> Self {
        let timings: Vec<SystemTiming> = systems
            .values()
            .filter(|s| !s.queries.is_empty())
            .map(|s| {
                let total_ms = s.total_query_ms();
                SystemTiming {
                    system: s.system.clone(),
                    queries: s.queries.len(),
                    total_ms,
                    avg_ms: total_ms / s.queries.len() as f64,
                }
            })
            .collect();

        let fastest = timings
            .iter()
            .min_by(|a, b| a.avg_ms.total_cmp(&b.avg_ms))
            .map(|t| t.system.clone());

        let use_cases = systems
            .keys()
            .filter_map(|system| use_case(system).map(|u| (system.clone(), u)))
            .collect();

        Self {
            timings,
            fastest,
            use_cases,
            conclusions: vec![
                "Each system is optimized for a different data access pattern".to_string(),
                "Simple lookups: redis, then mongodb, then neo4j".to_string(),
                "A hybrid deployment gives the best balance".to_string(),
            ],
        }
    }
}

fn use_case(system: &str) -> Option<UseCase> {
    let (best_for, strength): (&[&str], &str) = match system {
        "mongodb" => (
            &["semi-structured data", "complex aggregations", "rapid prototyping"],
            "high read/write throughput",
        ),
        "neo4j" => (
            &["complex relationships", "path finding", "recommendations"],
            "optimal for graph traversals",
        ),
        "redis" => (
            &["caching", "real-time updates", "dynamic rankings"],
            "sub-millisecond latency",
        ),
        _ => return None,
    };
    Some(UseCase {
        best_for: best_for.iter().map(|s| s.to_string()).collect(),
        strength: strength.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub author: String,
    pub mode: String,
    pub final_stage: Stage,
    pub stage_history: Vec<StageTransition>,
    pub preparation: Option<PreparationSummary>,
    pub systems: BTreeMap<String, SystemReport>,
    pub comparison: Option<Comparison>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub summary: PathBuf,
}

/// Writes `report.json` and `summary.txt` into `dir`.
pub fn write_report(report: &RunReport, dir: &Path) -> Result<ReportPaths> {
    let json_path = dir.join(REPORT_FILE);
    let body = serde_json::to_vec_pretty(report)
        .map_err(|e| PipelineError::Internal(format!("report encoding: {}", e)))?;
    write_atomic(&json_path, |out| out.write_all(&body))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let summary = render_summary(report)
        .map_err(|e| PipelineError::Internal(format!("summary rendering: {}", e)))?;
    write_atomic(&summary_path, |out| out.write_all(summary.as_bytes()))?;

    info!("Report written to {}", json_path.display());
    info!("Summary written to {}", summary_path.display());
    Ok(ReportPaths {
        json: json_path,
        summary: summary_path,
    })
}

fn improvement(record: Option<&QueryRecord>) -> Option<f64> {
    record?.first("improvement_pct")?.as_f64()
}

pub fn render_summary(report: &RunReport) -> std::result::Result<String, fmt::Error> {
    let rule = "=".repeat(60);
    let mut out = String::new();

    writeln!(out, "{}", rule)?;
    writeln!(out, "NOSQL PARADIGM COMPARISON")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Run: {}", report.run_id)?;
    writeln!(out, "Date: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Author: {}", report.author)?;
    writeln!(out, "Mode: {}", report.mode)?;
    writeln!(out, "Final stage: {}", report.final_stage)?;
    writeln!(out)?;

    if let Some(prep) = &report.preparation {
        writeln!(out, "PREPARATION:")?;
        writeln!(
            out,
            "- {} businesses, {} users, {} reviews, {} friendships",
            prep.businesses, prep.users, prep.reviews, prep.friendships
        )?;
        writeln!(
            out,
            "- Validation issues: {} ({} records dropped)",
            prep.issue_count, prep.dropped_records
        )?;
        writeln!(out)?;
    }

    if let Some(mongo) = report.systems.get("mongodb") {
        writeln!(out, "MONGODB:")?;
        writeln!(out, "- Indexes created: {}", mongo.indexes_created)?;
        writeln!(out, "- Queries executed: {}", mongo.queries.len())?;
        if let Some(pct) = improvement(mongo.query("index_benchmark")) {
            writeln!(out, "- Improvement with indexes: {:.1}%", pct)?;
        }
        write_system_tail(&mut out, mongo)?;
    }

    if let Some(neo4j) = report.systems.get("neo4j") {
        writeln!(out, "NEO4J:")?;
        writeln!(out, "- Cypher queries: {}", neo4j.queries.len())?;
        if let Some(density) = neo4j
            .query("graph_density")
            .and_then(|q| q.first("density"))
            .and_then(Value::as_f64)
        {
            writeln!(out, "- Graph density: {:.6}", density)?;
        }
        write_system_tail(&mut out, neo4j)?;
    }

    if let Some(redis) = report.systems.get("redis") {
        writeln!(out, "REDIS:")?;
        let rankings = redis
            .import
            .as_ref()
            .and_then(|i| i.counts.get("rankings"))
            .copied()
            .unwrap_or(0);
        writeln!(out, "- Rankings created: {}", rankings)?;
        if let Some(pct) = improvement(redis.query("top_by_city_cached")) {
            writeln!(out, "- Improvement with cache: {:.1}%", pct)?;
        }
        write_system_tail(&mut out, redis)?;
    }

    if let Some(comparison) = &report.comparison {
        writeln!(out, "COMPARISON:")?;
        for timing in &comparison.timings {
            writeln!(
                out,
                "- {}: {} queries, avg {:.3} ms",
                timing.system, timing.queries, timing.avg_ms
            )?;
        }
        if let Some(fastest) = &comparison.fastest {
            writeln!(out, "- Fastest on average: {}", fastest)?;
        }
        writeln!(out)?;
        writeln!(out, "CONCLUSIONS:")?;
        for conclusion in &comparison.conclusions {
            writeln!(out, "- {}", conclusion)?;
        }
        writeln!(out)?;
        writeln!(out, "RECOMMENDATION:")?;
        writeln!(out, "   redis for caching and real-time rankings")?;
        writeln!(out, "   mongodb for primary data and aggregations")?;
        writeln!(out, "   neo4j for relationship analysis and recommendations")?;
    }

    if let Some(failure) = &report.failure {
        writeln!(out)?;
        writeln!(out, "RUN FAILED: {}", failure)?;
    }
    writeln!(out, "{}", rule)?;
    Ok(out)
}

fn write_system_tail(out: &mut String, system: &SystemReport) -> fmt::Result {
    for failed in &system.failed_queries {
        writeln!(out, "- Query {} failed: {}", failed.name, failed.message)?;
    }
    if let Some(error) = &system.error {
        writeln!(out, "- Error: {}", error)?;
    }
    writeln!(out)
}

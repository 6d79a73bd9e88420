// crates/trident-pipeline/src/lib.rs
//! Staged run over the selected stores.
//!
//! A run walks `INIT -> PREPARE -> (IMPORT -> QUERY)+ -> REPORT -> DONE`,
//! one IMPORT/QUERY pair per store. A fatal error moves the run to `FAILED`;
//! the report is still written with whatever was collected up to that point.

use trident_core::config::Config;
use trident_core::error::{PipelineError, Result};
use trident_core::prepare::{prepare, PrepareTargets, PreparedData, RecordSource};
use trident_core::report::{
    write_report, Comparison, PreparationSummary, QueryFailure, ReportPaths, RunReport,
    SystemReport,
};
use trident_core::stage::{Stage, StageTransition};
use trident_core::traits::StoreManager;
use trident_core::types::StoreKind;

use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Result of one run. `error` is set exactly when `final_stage` is `FAILED`.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub final_stage: Stage,
    pub report: RunReport,
    pub report_paths: Option<ReportPaths>,
    pub error: Option<PipelineError>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_stage == Stage::Done
    }
}

pub struct Orchestrator {
    config: Config,
    source: RecordSource,
    managers: Vec<Box<dyn StoreManager>>,
    mode: String,
    report_enabled: bool,
    run_id: String,
    stage: Stage,
    history: Vec<StageTransition>,
    preparation: Option<PreparationSummary>,
    systems: BTreeMap<String, SystemReport>,
}

impl Orchestrator {
    pub fn new(config: Config, source: RecordSource, managers: Vec<Box<dyn StoreManager>>) -> Self {
        Self {
            config,
            source,
            managers,
            mode: "all".to_string(),
            report_enabled: true,
            run_id: Uuid::new_v4().to_string(),
            stage: Stage::Init,
            history: Vec::new(),
            preparation: None,
            systems: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// Whether a successful run writes the report. Failed runs always do.
    pub fn with_report(mut self, enabled: bool) -> Self {
        self.report_enabled = enabled;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn run(mut self) -> RunOutcome {
        info!("Starting run {} (mode {})", self.run_id, self.mode);
        match self.execute().await {
            Ok(report_paths) => {
                info!("Run {} finished", self.run_id);
                let report = self.build_report(None);
                RunOutcome {
                    run_id: self.run_id,
                    final_stage: self.stage,
                    report,
                    report_paths,
                    error: None,
                }
            }
            Err(e) => {
                error!("Run {} failed in {}: {}", self.run_id, self.stage, e);
                self.force_failed(&e);
                let report = self.build_report(Some(e.to_string()));
                let report_paths = match write_report(&report, &self.config.report.output_dir) {
                    Ok(paths) => Some(paths),
                    Err(write_err) => {
                        error!("Could not write report for failed run: {}", write_err);
                        None
                    }
                };
                RunOutcome {
                    run_id: self.run_id,
                    final_stage: self.stage,
                    report,
                    report_paths,
                    error: Some(e),
                }
            }
        }
    }

    async fn execute(&mut self) -> Result<Option<ReportPaths>> {
        if self.managers.is_empty() {
            return Err(PipelineError::Internal("no stores selected".into()));
        }

        let source = self.source.describe();
        self.advance(Stage::Prepare, Some(source))?;
        let data = self.prepare_stage()?;

        let mut managers = std::mem::take(&mut self.managers);
        for manager in managers.iter_mut() {
            self.advance(Stage::Import, Some(manager.system().to_string()))?;
            let imported = self.import_stage(manager.as_mut(), &data).await;
            if let Err(e) = imported {
                close(manager.as_mut()).await;
                return Err(e);
            }

            self.advance(Stage::Query, Some(manager.system().to_string()))?;
            let queried = self.query_stage(manager.as_mut()).await;
            close(manager.as_mut()).await;
            queried?;
        }

        self.advance(Stage::Report, None)?;
        let paths = if self.report_enabled {
            let report = self.build_report(None);
            Some(write_report(&report, &self.config.report.output_dir)?)
        } else {
            debug!("Report generation disabled for this run");
            None
        };
        self.advance(Stage::Done, None)?;
        Ok(paths)
    }

    fn prepare_stage(&mut self) -> Result<PreparedData> {
        let kinds: Vec<StoreKind> = self.managers.iter().map(|m| m.kind()).collect();
        let data = prepare(
            &self.source,
            &self.config.rating,
            &self.config.data.output_dir,
            PrepareTargets::for_kinds(&kinds),
        )?;
        let summary = data.summary();
        info!(
            "Prepared {} businesses, {} users, {} reviews ({} issues, {} records dropped)",
            summary.businesses,
            summary.users,
            summary.reviews,
            summary.issue_count,
            summary.dropped_records
        );
        self.preparation = Some(summary);
        Ok(data)
    }

    async fn import_stage(&mut self, manager: &mut dyn StoreManager, data: &PreparedData) -> Result<()> {
        let system = manager.system();
        let mut report = SystemReport::new(system);

        let result: Result<()> = async {
            manager.connect().await?;
            report.connected = true;
            if manager.import_replaces_store() {
                report.import = Some(manager.import(data).await?);
                report.indexes_created = manager.ensure_schema().await?;
            } else {
                report.indexes_created = manager.ensure_schema().await?;
                report.import = Some(manager.import(data).await?);
            }
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            report.error = Some(e.to_string());
        }
        self.systems.insert(system.to_string(), report);
        result
    }

    /// Runs every named query. Query errors are recorded and the stage moves
    /// on; a fatal error (a dropped connection) stops the stage and the run.
    async fn query_stage(&mut self, manager: &mut dyn StoreManager) -> Result<()> {
        let system = manager.system();
        let mut queries = Vec::new();
        let mut failures = Vec::new();
        let mut fatal = None;

        for name in manager.query_names() {
            match manager.run_query(name).await {
                Ok(record) => {
                    info!(
                        "{}/{}: {} rows in {:.2}ms",
                        system, name, record.row_count, record.elapsed_ms
                    );
                    queries.push(record);
                }
                Err(e) => {
                    warn!("{}/{} failed: {}", system, name, e);
                    failures.push(QueryFailure {
                        name: name.to_string(),
                        message: e.to_string(),
                    });
                    if e.is_fatal() {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

        let report = self
            .systems
            .entry(system.to_string())
            .or_insert_with(|| SystemReport::new(system));
        report.queries = queries;
        report.failed_queries = failures;
        match fatal {
            Some(e) => {
                report.error = Some(e.to_string());
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn advance(&mut self, next: Stage, note: Option<String>) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "illegal stage transition {} -> {}",
                self.stage, next
            )));
        }
        match &note {
            Some(note) => info!("Stage {} -> {} ({})", self.stage, next, note),
            None => info!("Stage {} -> {}", self.stage, next),
        }
        self.history.push(StageTransition {
            from: self.stage,
            to: next,
            at: Utc::now(),
            note,
        });
        self.stage = next;
        Ok(())
    }

    fn force_failed(&mut self, cause: &PipelineError) {
        if let Err(e) = self.advance(Stage::Failed, Some(cause.to_string())) {
            debug!("{}", e);
            self.stage = Stage::Failed;
        }
    }

    fn build_report(&self, failure: Option<String>) -> RunReport {
        let comparison = if self.systems.values().any(|s| !s.queries.is_empty()) {
            Some(Comparison::from_systems(&self.systems))
        } else {
            None
        };
        RunReport {
            run_id: self.run_id.clone(),
            generated_at: Utc::now(),
            author: self.config.report.author.clone(),
            mode: self.mode.clone(),
            final_stage: if failure.is_some() { Stage::Failed } else { Stage::Done },
            stage_history: self.history.clone(),
            preparation: self.preparation.clone(),
            systems: self.systems.clone(),
            comparison,
            failure,
        }
    }
}

async fn close(manager: &mut dyn StoreManager) {
    if let Err(e) = manager.close().await {
        warn!("Closing {} failed: {}", manager.system(), e);
    }
}

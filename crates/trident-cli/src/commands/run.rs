use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use trident_core::config::Config;
use trident_pipeline::Orchestrator;
use trident_storage::managers_for;

use super::{record_source, CommandHandler};
use crate::args::Mode;

/// Full run: prepare, then import and query each selected store, then report.
pub struct RunCommand {
    pub mode: Mode,
    pub report: bool,
    pub synthetic: bool,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl RunCommand {
    /// Mode `all` always reports; single-store runs only with `--report`.
    pub fn writes_report(&self) -> bool {
        self.report || self.mode == Mode::All
    }
}

impl CommandHandler for RunCommand {
    async fn execute(&self, config: &Config) -> Result<()> {
        let mut config = config.clone();
        if let Some(output) = &self.output {
            config.data.output_dir = output.clone();
        }
        let source = record_source(&config, self.synthetic, self.input.as_ref());
        let managers = managers_for(&self.mode.kinds(), &config);

        let outcome = Orchestrator::new(config, source, managers)
            .with_mode(self.mode.as_str())
            .with_report(self.writes_report())
            .run()
            .await;

        println!("Run {} finished in stage {}", outcome.run_id, outcome.final_stage);
        if let Some(paths) = &outcome.report_paths {
            println!("Report:  {}", paths.json.display());
            println!("Summary: {}", paths.summary.display());
        }

        match outcome.error {
            Some(err) => Err::<(), _>(err).with_context(|| format!("run {} failed", outcome.run_id)),
            None => {
                info!("Run {} completed", outcome.run_id);
                Ok(())
            }
        }
    }
}

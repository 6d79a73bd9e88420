use anyhow::{Context, Result};
use std::path::PathBuf;
use trident_core::config::Config;
use trident_core::prepare::prepare;

use super::{print_files, record_source, CommandHandler};
use crate::args::PrepareTarget;

/// ETL only: validate records and write bulk-import files.
pub struct PrepareCommand {
    pub target: PrepareTarget,
    pub synthetic: bool,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl CommandHandler for PrepareCommand {
    async fn execute(&self, config: &Config) -> Result<()> {
        let source = record_source(config, self.synthetic, self.input.as_ref());
        let output_dir = self.output.clone().unwrap_or_else(|| config.data.output_dir.clone());

        let prepared = prepare(&source, &config.rating, &output_dir, self.target.targets())
            .with_context(|| format!("preparing files in {}", output_dir.display()))?;

        let summary = prepared.summary();
        println!(
            "Prepared {} businesses, {} users, {} reviews, {} friendships from {}",
            summary.businesses, summary.users, summary.reviews, summary.friendships, summary.source
        );
        println!(
            "Validation issues: {} ({} records dropped)",
            summary.issue_count, summary.dropped_records
        );
        print_files(&prepared.files);
        Ok(())
    }
}

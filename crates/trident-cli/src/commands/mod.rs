pub mod generate;
pub mod prepare;
pub mod run;

use anyhow::Result;
use std::path::PathBuf;
use trident_core::config::Config;
use trident_core::prepare::RecordSource;
use trident_core::writer::BulkFiles;

/// Trait for CLI command handlers
#[allow(async_fn_in_trait)]
pub trait CommandHandler {
    async fn execute(&self, config: &Config) -> Result<()>;
}

/// Generated records, or the raw files under `input` (falling back to the
/// configured input directory).
pub fn record_source(config: &Config, synthetic: bool, input: Option<&PathBuf>) -> RecordSource {
    if synthetic {
        RecordSource::Synthetic(config.data.synthetic)
    } else {
        RecordSource::Files {
            dir: input.cloned().unwrap_or_else(|| config.data.input_dir.clone()),
            limit: config.data.limit,
        }
    }
}

pub fn print_files(files: &BulkFiles) {
    for file in &files.files {
        println!("  {:<8} {:<10} {:>8} rows  {}", file.target, file.name, file.rows, file.path.display());
    }
}

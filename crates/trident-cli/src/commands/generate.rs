use anyhow::{Context, Result};
use std::path::PathBuf;
use trident_core::config::{Config, SyntheticConfig};
use trident_core::synthetic::SyntheticGenerator;
use trident_core::writer::BulkFileWriter;

use super::{print_files, CommandHandler};

pub struct GenerateCommand {
    pub businesses: Option<usize>,
    pub users: Option<usize>,
    pub reviews: Option<usize>,
    pub output: Option<PathBuf>,
}

impl GenerateCommand {
    pub fn sizes(&self, defaults: SyntheticConfig) -> SyntheticConfig {
        SyntheticConfig {
            businesses: self.businesses.unwrap_or(defaults.businesses),
            users: self.users.unwrap_or(defaults.users),
            reviews: self.reviews.unwrap_or(defaults.reviews),
        }
    }
}

impl CommandHandler for GenerateCommand {
    async fn execute(&self, config: &Config) -> Result<()> {
        let sizes = self.sizes(config.data.synthetic);
        let dir = self.output.clone().unwrap_or_else(|| config.data.input_dir.clone());

        let dataset = SyntheticGenerator::new(sizes).generate();
        let files = BulkFileWriter::write_raw(&dir, &dataset)
            .with_context(|| format!("writing synthetic records to {}", dir.display()))?;

        println!(
            "Generated {} businesses, {} users, {} reviews",
            dataset.businesses.len(),
            dataset.users.len(),
            dataset.reviews.len()
        );
        print_files(&files);
        Ok(())
    }
}

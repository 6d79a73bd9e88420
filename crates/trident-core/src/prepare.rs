//! Preparation stage: read or synthesize records, validate them, and write
//! the bulk-import files each selected store needs.

use crate::config::{RatingConfig, SyntheticConfig};
use crate::error::Result;
use crate::reader::load_dataset;
use crate::report::PreparationSummary;
use crate::synthetic::SyntheticGenerator;
use crate::transform::{DocumentShape, GraphShape, Transformer, ValidatedDataset};
use crate::types::{Dataset, StoreKind, ValidationIssue};
use crate::writer::{BulkFileWriter, BulkFiles};

use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum RecordSource {
    Files { dir: PathBuf, limit: Option<usize> },
    Synthetic(SyntheticConfig),
}

impl RecordSource {
    pub fn load(&self) -> Result<(Dataset, Vec<ValidationIssue>)> {
        match self {
            RecordSource::Files { dir, limit } => load_dataset(dir, *limit),
            RecordSource::Synthetic(sizes) => Ok((SyntheticGenerator::new(*sizes).generate(), Vec::new())),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RecordSource::Files { dir, .. } => dir.display().to_string(),
            RecordSource::Synthetic(_) => "synthetic".to_string(),
        }
    }
}

/// Which bulk formats to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareTargets {
    pub documents: bool,
    pub graph: bool,
}

impl PrepareTargets {
    pub fn all() -> Self {
        Self {
            documents: true,
            graph: true,
        }
    }

    /// The key-value store works from validated records and needs no files.
    pub fn for_kinds(kinds: &[StoreKind]) -> Self {
        Self {
            documents: kinds.contains(&StoreKind::Document),
            graph: kinds.contains(&StoreKind::Graph),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedData {
    pub source: String,
    pub dataset: ValidatedDataset,
    pub documents: Option<DocumentShape>,
    pub graph: Option<GraphShape>,
    pub files: BulkFiles,
}

impl PreparedData {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.dataset.issues
    }

    pub fn summary(&self) -> PreparationSummary {
        PreparationSummary {
            source: self.source.clone(),
            businesses: self.dataset.businesses.len(),
            users: self.dataset.users.len(),
            reviews: self.dataset.reviews.len(),
            friendships: self.dataset.friendships.len(),
            files: self.files.clone(),
            ..PreparationSummary::default()
        }
        .with_issues(&self.dataset.issues)
    }
}

pub fn prepare(
    source: &RecordSource,
    rating: &RatingConfig,
    output_dir: &Path,
    targets: PrepareTargets,
) -> Result<PreparedData> {
    info!("Preparing records from {}", source.describe());
    let (raw, read_issues) = source.load()?;

    let mut dataset = Transformer::new(*rating).validate(raw);
    if !read_issues.is_empty() {
        let mut issues = read_issues;
        issues.append(&mut dataset.issues);
        dataset.issues = issues;
    }

    let writer = BulkFileWriter::new(output_dir);
    let mut files = BulkFiles::default();

    let documents = if targets.documents {
        let documents = dataset.to_documents()?;
        files.extend(writer.write_documents(&documents)?);
        Some(documents)
    } else {
        None
    };

    let graph = if targets.graph {
        let graph = dataset.to_graph();
        files.extend(writer.write_graph(&graph)?);
        Some(graph)
    } else {
        None
    };

    Ok(PreparedData {
        source: source.describe(),
        dataset,
        documents,
        graph,
        files,
    })
}

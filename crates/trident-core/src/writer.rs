//! Bulk file writer
//!
//! Every file is written to a temporary file in its destination directory
//! and renamed over the previous version, so an interrupted run never
//! leaves a half-written import file behind.

use crate::error::{PipelineError, Result};
use crate::reader::{self, write_json_lines};
use crate::transform::{DocumentShape, GraphShape};
use crate::types::Dataset;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DOCUMENT_DIR: &str = "mongo";
pub const GRAPH_DIR: &str = "neo4j";

pub const BUSINESS_DOCUMENTS: &str = "business.jsonl";
pub const USER_DOCUMENTS: &str = "user.jsonl";
pub const REVIEW_DOCUMENTS: &str = "review.jsonl";

pub const BUSINESS_NODES: &str = "business_nodes.csv";
pub const USER_NODES: &str = "user_nodes.csv";
pub const REVIEWED_RELATIONSHIPS: &str = "reviewed_relationships.csv";
pub const FRIEND_RELATIONSHIPS: &str = "friend_relationships.csv";

pub const BUSINESS_NODE_HEADER: [&str; 8] = [
    "business_id:ID(Business)",
    "name",
    "city",
    "state",
    "stars:float",
    "review_count:int",
    "categories:string[]",
    ":LABEL",
];
pub const USER_NODE_HEADER: [&str; 5] = [
    "user_id:ID(User)",
    "name",
    "review_count:int",
    "yelping_since",
    ":LABEL",
];
pub const REVIEWED_HEADER: [&str; 6] = [
    "review_id",
    ":START_ID(User)",
    ":END_ID(Business)",
    "stars:float",
    "date:date",
    ":TYPE",
];
pub const FRIENDS_HEADER: [&str; 3] = [":START_ID(User)", ":END_ID(User)", ":TYPE"];

/// One file produced for a target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFile {
    /// `mongodb`, `neo4j` or `raw`.
    pub target: String,
    /// Collection name or graph file kind (`business`, `reviewed`, ...).
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Manifest of every file written during preparation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkFiles {
    pub files: Vec<BulkFile>,
}

impl BulkFiles {
    pub fn get(&self, target: &str, name: &str) -> Option<&BulkFile> {
        self.files
            .iter()
            .find(|f| f.target == target && f.name == name)
    }

    pub fn for_target<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a BulkFile> + 'a {
        self.files.iter().filter(move |f| f.target == target)
    }

    pub fn extend(&mut self, other: BulkFiles) {
        self.files.extend(other.files);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Writes `path` through a temp file in the same directory, then renames it into place.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| PipelineError::io(format!("creating {}", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::io(format!("creating temp file in {}", dir.display()), e))?;
    {
        let mut buffered = BufWriter::new(tmp.as_file_mut());
        write(&mut buffered)
            .and_then(|_| buffered.flush())
            .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io(format!("syncing {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(format!("replacing {}", path.display()), e.error))?;

    debug!("Wrote {}", path.display());
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    write_atomic(path, |out| {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        csv_writer.write_record(header)?;
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()
    })
}

pub struct BulkFileWriter {
    output_dir: PathBuf,
}

impl BulkFileWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn document_dir(&self) -> PathBuf {
        self.output_dir.join(DOCUMENT_DIR)
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.output_dir.join(GRAPH_DIR)
    }

    /// One JSON-lines file per collection.
    pub fn write_documents(&self, documents: &DocumentShape) -> Result<BulkFiles> {
        let dir = self.document_dir();
        let mut files = Vec::new();
        for (name, file, rows) in [
            ("business", BUSINESS_DOCUMENTS, &documents.businesses),
            ("user", USER_DOCUMENTS, &documents.users),
            ("review", REVIEW_DOCUMENTS, &documents.reviews),
        ] {
            let path = dir.join(file);
            write_atomic(&path, |out| write_json_lines(out, rows))?;
            files.push(BulkFile {
                target: "mongodb".to_string(),
                name: name.to_string(),
                path,
                rows: rows.len(),
            });
        }
        info!("Wrote {} document files to {}", files.len(), dir.display());
        Ok(BulkFiles { files })
    }

    /// Node and relationship CSV files with `neo4j-admin import` headers.
    pub fn write_graph(&self, graph: &GraphShape) -> Result<BulkFiles> {
        let dir = self.graph_dir();
        let targets = [
            ("business", BUSINESS_NODES, graph.businesses.len()),
            ("user", USER_NODES, graph.users.len()),
            ("reviewed", REVIEWED_RELATIONSHIPS, graph.reviewed.len()),
            ("friends", FRIEND_RELATIONSHIPS, graph.friends.len()),
        ];

        write_csv(&dir.join(BUSINESS_NODES), &BUSINESS_NODE_HEADER, &graph.businesses)?;
        write_csv(&dir.join(USER_NODES), &USER_NODE_HEADER, &graph.users)?;
        write_csv(&dir.join(REVIEWED_RELATIONSHIPS), &REVIEWED_HEADER, &graph.reviewed)?;
        write_csv(&dir.join(FRIEND_RELATIONSHIPS), &FRIENDS_HEADER, &graph.friends)?;

        let files: Vec<BulkFile> = targets
            .into_iter()
            .map(|(name, file, rows)| BulkFile {
                target: "neo4j".to_string(),
                name: name.to_string(),
                path: dir.join(file),
                rows,
            })
            .collect();
        info!("Wrote {} graph files to {}", files.len(), dir.display());
        Ok(BulkFiles { files })
    }

    /// Raw JSON-lines files in the layout the reader expects.
    pub fn write_raw(dir: &Path, dataset: &Dataset) -> Result<BulkFiles> {
        let mut files = Vec::new();
        let mut push = |name: &str, path: PathBuf, rows: usize| {
            files.push(BulkFile {
                target: "raw".to_string(),
                name: name.to_string(),
                path,
                rows,
            })
        };

        let path = dir.join(reader::BUSINESS_FILE);
        write_atomic(&path, |out| write_json_lines(out, &dataset.businesses))?;
        push("business", path, dataset.businesses.len());

        let path = dir.join(reader::USER_FILE);
        write_atomic(&path, |out| write_json_lines(out, &dataset.users))?;
        push("user", path, dataset.users.len());

        let path = dir.join(reader::REVIEW_FILE);
        write_atomic(&path, |out| write_json_lines(out, &dataset.reviews))?;
        push("review", path, dataset.reviews.len());

        info!("Wrote raw dataset to {}", dir.display());
        Ok(BulkFiles { files })
    }
}

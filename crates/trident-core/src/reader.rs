//! Raw record reader
//!
//! Loads Yelp-shaped JSON-lines files (`business.json`, `user.json`,
//! `review.json`). A line that fails to parse is skipped and reported as a
//! [`ValidationIssue`] instead of aborting the read.

use crate::error::{PipelineError, Result};
use crate::types::{Dataset, EntityKind, IssueKind, ValidationIssue};

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub const BUSINESS_FILE: &str = "business.json";
pub const USER_FILE: &str = "user.json";
pub const REVIEW_FILE: &str = "review.json";

#[derive(Debug)]
pub struct ReadOutcome<T> {
    pub records: Vec<T>,
    pub issues: Vec<ValidationIssue>,
}

pub fn read_json_lines<T: DeserializeOwned>(
    path: &Path,
    entity: EntityKind,
    limit: Option<usize>,
) -> Result<ReadOutcome<T>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::io(format!("opening {}", path.display()), e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut issues = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        if limit.is_some_and(|limit| index >= limit) {
            break;
        }
        let line = line.map_err(|e| PipelineError::io(format!("reading {}", path.display()), e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                let issue = ValidationIssue::new(
                    entity,
                    "",
                    IssueKind::Malformed {
                        line: index + 1,
                        message: e.to_string(),
                    },
                );
                warn!("{}: {}", path.display(), issue);
                issues.push(issue);
            }
        }
    }

    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(ReadOutcome { records, issues })
}

/// Reads the three raw files from `dir`.
pub fn load_dataset(dir: &Path, limit: Option<usize>) -> Result<(Dataset, Vec<ValidationIssue>)> {
    let businesses = read_json_lines(&dir.join(BUSINESS_FILE), EntityKind::Business, limit)?;
    let users = read_json_lines(&dir.join(USER_FILE), EntityKind::User, limit)?;
    let reviews = read_json_lines(&dir.join(REVIEW_FILE), EntityKind::Review, limit)?;

    let mut issues = businesses.issues;
    issues.extend(users.issues);
    issues.extend(reviews.issues);

    Ok((
        Dataset {
            businesses: businesses.records,
            users: users.records,
            reviews: reviews.records,
        },
        issues,
    ))
}

pub fn write_json_lines<W, T>(writer: &mut W, records: &[T]) -> std::io::Result<()>
where
    W: Write + ?Sized,
    T: Serialize,
{
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

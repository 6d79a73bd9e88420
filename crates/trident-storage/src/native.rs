//! Vendor bulk loaders run as child processes.

use trident_core::config::{MongoConfig, Neo4jConfig};
use trident_core::error::{PipelineError, Result};
use trident_core::writer::BulkFiles;

use log::{debug, info, warn};
use std::path::PathBuf;
use tokio::process::Command;

/// Program plus arguments, kept separate from execution so the argument
/// layout can be checked without the tool installed.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub fn mongoimport_commands(bin: &str, mongo: &MongoConfig, files: &BulkFiles) -> Vec<LoaderCommand> {
    files
        .for_target("mongodb")
        .map(|file| LoaderCommand {
            program: bin.to_string(),
            args: vec![
                format!("--uri={}", mongo.uri),
                format!("--db={}", mongo.database),
                format!("--collection={}", file.name),
                format!("--file={}", file.path.display()),
                "--type=json".to_string(),
            ],
        })
        .collect()
}

pub fn neo4j_admin_command(bin: &str, neo4j: &Neo4jConfig, files: &BulkFiles) -> LoaderCommand {
    let mut args = vec![
        "database".to_string(),
        "import".to_string(),
        "full".to_string(),
        neo4j.database.clone(),
        "--overwrite-destination".to_string(),
        "--array-delimiter=;".to_string(),
    ];
    for file in files.for_target("neo4j") {
        let flag = match file.name.as_str() {
            "business" | "user" => "--nodes",
            _ => "--relationships",
        };
        args.push(format!("{}={}", flag, file.path.display()));
    }
    LoaderCommand {
        program: bin.to_string(),
        args,
    }
}

fn locate(program: &str, system: &str) -> Result<PathBuf> {
    which::which(program).map_err(|e| {
        PipelineError::import(system, format!("bulk loader '{}' not found: {}", program, e))
    })
}

/// Runs the loader; a missing binary or a non-zero exit is an import error.
pub async fn run_loader(system: &str, command: &LoaderCommand) -> Result<()> {
    let path = locate(&command.program, system)?;
    debug!("Running {} {}", path.display(), command.args.join(" "));

    let output = Command::new(&path)
        .args(&command.args)
        .output()
        .await
        .map_err(|e| PipelineError::import(system, format!("failed to start {}: {}", command.program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("{} exited with {}: {}", command.program, output.status, stderr.trim());
        return Err(PipelineError::import(
            system,
            format!("{} exited with {}: {}", command.program, output.status, stderr.trim()),
        ));
    }

    info!("{} finished: {}", command.program, String::from_utf8_lossy(&output.stdout).trim());
    Ok(())
}

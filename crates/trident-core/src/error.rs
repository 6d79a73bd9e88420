use std::io;

use thiserror::Error;

/// Error taxonomy for a pipeline run.
///
/// `Validation` and `Query` are recovered where they happen (the record or
/// query is skipped and logged). `Connection` and `Import` abort the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("connection error: {system} - {message} (after {attempts} attempts)")]
    Connection {
        system: String,
        message: String,
        attempts: u32,
    },

    #[error("import error: {system} - {message}")]
    Import { system: String, message: String },

    #[error("query error: {system}/{query} - {message}")]
    Query {
        system: String,
        query: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn import(system: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Import {
            system: system.into(),
            message: message.to_string(),
        }
    }

    pub fn query(system: impl Into<String>, query: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Query {
            system: system.into(),
            query: query.into(),
            message: message.to_string(),
        }
    }

    /// Transport failure on a connection that was already established.
    pub fn lost_connection(system: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Connection {
            system: system.into(),
            message: message.to_string(),
            attempts: 1,
        }
    }

    /// Whether the error must abort the remaining stages.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Validation(_) | PipelineError::Query { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

use thiserror::Error;
use trident_core::error::PipelineError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    ArgParse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("import error: {0}")]
    Import(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("{0}")]
    Unknown(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ArgParse(_) => 2,
            CliError::Config(_) => 10,
            CliError::Connection(_) => 20,
            CliError::Import(_) => 30,
            CliError::Io(_) => 40,
            CliError::Unknown(_) => 1,
        }
    }
}

impl From<&PipelineError> for CliError {
    fn from(err: &PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::Config(_) => CliError::Config(message),
            PipelineError::Connection { .. } => CliError::Connection(message),
            PipelineError::Import { .. } => CliError::Import(message),
            PipelineError::Io { .. } => CliError::Io(message),
            PipelineError::Validation(_) | PipelineError::Query { .. } | PipelineError::Internal(_) => {
                CliError::Unknown(message)
            }
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        CliError::from(&err)
    }
}

/// Exit code for an error chain: the first typed error found decides it.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return cli.exit_code();
        }
        if let Some(pipeline) = cause.downcast_ref::<PipelineError>() {
            return CliError::from(pipeline).exit_code();
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_pipeline_errors_map_to_codes() {
        let cases = [
            (PipelineError::Config("bad".into()), 10),
            (
                PipelineError::Connection {
                    system: "neo4j".into(),
                    message: "refused".into(),
                    attempts: 3,
                },
                20,
            ),
            (PipelineError::import("mongodb", "bad file"), 30),
            (
                PipelineError::io("writing", std::io::Error::other("disk full")),
                40,
            ),
            (PipelineError::Internal("oops".into()), 1),
        ];
        for (err, code) in cases {
            assert_eq!(CliError::from(err).exit_code(), code);
        }
    }

    #[test]
    fn test_exit_code_looks_through_context() {
        let err = Err::<(), _>(PipelineError::import("neo4j", "rejected"))
            .context("running pipeline")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 30);

        let err = anyhow::Error::new(CliError::ArgParse("bad".into()));
        assert_eq!(exit_code_for(&err), 2);
        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }
}

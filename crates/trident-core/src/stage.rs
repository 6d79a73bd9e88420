use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, in run order.
///
/// `Query -> Import` is the only backward edge: after a store has been
/// queried the run moves on to import the next one. `Failed` is reachable
/// from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Init,
    Prepare,
    Import,
    Query,
    Report,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Init, Prepare)
            | (Prepare, Import)
            | (Import, Query)
            | (Query, Import)
            | (Query, Report)
            | (Report, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "INIT",
            Stage::Prepare => "PREPARE",
            Stage::Import => "IMPORT",
            Stage::Query => "QUERY",
            Stage::Report => "REPORT",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
    /// Store being imported or queried, or the error that failed the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let path = [
            Stage::Init,
            Stage::Prepare,
            Stage::Import,
            Stage::Query,
            Stage::Import,
            Stage::Query,
            Stage::Report,
            Stage::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_or_leaving_terminals() {
        assert!(!Stage::Init.can_transition_to(Stage::Import));
        assert!(!Stage::Prepare.can_transition_to(Stage::Query));
        assert!(!Stage::Import.can_transition_to(Stage::Prepare));
        assert!(!Stage::Done.can_transition_to(Stage::Failed));
        assert!(!Stage::Failed.can_transition_to(Stage::Report));
    }

    #[test]
    fn test_failed_reachable_from_running_stages() {
        for stage in [Stage::Init, Stage::Prepare, Stage::Import, Stage::Query, Stage::Report] {
            assert!(stage.can_transition_to(Stage::Failed));
        }
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&Stage::Failed).unwrap(), "\"FAILED\"");
    }
}

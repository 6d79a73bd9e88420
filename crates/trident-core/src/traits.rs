use crate::error::Result;
use crate::prepare::PreparedData;
use crate::report::{ImportSummary, QueryRecord};
use crate::types::StoreKind;

use async_trait::async_trait;
use std::time::Instant;

/// One database backend driven by the orchestrator.
///
/// Calls arrive in a fixed order: `connect`, `ensure_schema`, `import`, then
/// `run_query` once per name from `query_names`, and finally `close`. When
/// `import_replaces_store` is true, `ensure_schema` runs after `import`
/// instead. The connection handle lives inside the manager between `connect`
/// and `close`.
#[async_trait]
pub trait StoreManager: Send + Sync {
    fn kind(&self) -> StoreKind;

    fn system(&self) -> &'static str {
        self.kind().system()
    }

    /// Opens the connection, retrying with backoff.
    async fn connect(&mut self) -> Result<()>;

    /// Creates indexes or constraints. Safe to run repeatedly; returns how many were requested.
    async fn ensure_schema(&mut self) -> Result<usize>;

    async fn import(&mut self, data: &PreparedData) -> Result<ImportSummary>;

    /// True when `import` rebuilds the store and loses any schema created before it.
    fn import_replaces_store(&self) -> bool {
        false
    }

    fn query_names(&self) -> Vec<&'static str>;

    async fn run_query(&mut self, name: &str) -> Result<QueryRecord>;

    async fn close(&mut self) -> Result<()>;
}

pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Percentage saved by the faster run; zero when the slow run took no time.
pub fn improvement_pct(slow_ms: f64, fast_ms: f64) -> f64 {
    if slow_ms <= 0.0 {
        0.0
    } else {
        (slow_ms - fast_ms) / slow_ms * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_pct() {
        assert_eq!(improvement_pct(4.0, 1.0), 75.0);
        assert_eq!(improvement_pct(0.0, 1.0), 0.0);
        assert!(improvement_pct(1.0, 2.0) < 0.0);
    }
}

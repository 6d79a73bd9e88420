// crates/trident-core/src/lib.rs
pub mod config;
pub mod error;
pub mod prepare;
pub mod reader;
pub mod report;
pub mod retry;
pub mod stage;
pub mod synthetic;
pub mod traits;
pub mod transform;
pub mod types;
pub mod writer;

pub use error::{PipelineError, Result};

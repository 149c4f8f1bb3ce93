//! Shared scoring contract for the sales-forecast batch and online paths:
//! the tabular record, feature preprocessing, the model interface and the
//! workspace/dataset plumbing both paths rely on.

pub mod datasets;
pub mod error;
pub mod events;
pub mod models;
pub mod preprocess;
pub mod table;
pub mod workspace;

pub use error::{ScoringError, ScoringResult};
pub use table::Table;

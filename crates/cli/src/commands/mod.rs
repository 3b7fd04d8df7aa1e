//! CLI commands for the weekly trade aggregation job.

pub mod run;
pub mod validate;

pub use run::{run_aggregate, RunArgs};
pub use validate::{run_validate, ValidateArgs};

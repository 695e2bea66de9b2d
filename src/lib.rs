//! UPC Cart Audit
//!
//! Drives a browser session through a storefront, looks up product
//! identifiers in batches and records whether each item can be added to the
//! cart. Runs are checkpointed so an interrupted audit resumes where it
//! stopped.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crawling::{Orchestrator, RunSummary};
pub use domain::{AuditError, ResultRecord};
pub use infrastructure::{AppConfig, ConfigManager};

//! Value objects: pipelines, workflows, variables and deployment metadata.

pub mod metadata;
pub mod types;
pub mod variable;

pub use metadata::*;
pub use types::*;
pub use variable::*;

use crate::error::{ResolveError, Result};

/// Deserialize a pipeline JSON document.
pub fn parse_pipeline(json: &str) -> Result<Pipeline> {
    serde_json::from_str::<Pipeline>(json)
        .map_err(|e| ResolveError::parse(format!("Failed to parse pipeline JSON: {}", e)))
}

/// Deserialize a workflow JSON document.
pub fn parse_workflow(json: &str) -> Result<Workflow> {
    serde_json::from_str::<Workflow>(json)
        .map_err(|e| ResolveError::parse(format!("Failed to parse workflow JSON: {}", e)))
}

//! Resolver configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

pub const HELM_CHART_AS_ARTIFACT: &str = "HELM_CHART_AS_ARTIFACT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Feature flag gating the manifest-variable merge in deployment metadata.
    pub manifest_feature_flag: String,
    /// When set, `set_pipeline_details` logs and skips a failing stage instead
    /// of aborting the whole pipeline.
    pub degrade_stage_errors: bool,
    /// Separator between a looped stage's name and the expansion ordinal.
    pub looped_stage_separator: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            manifest_feature_flag: HELM_CHART_AS_ARTIFACT.to_string(),
            degrade_stage_errors: true,
            looped_stage_separator: "_".to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ResolveError::parse(format!("Failed to parse resolver config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = ResolverConfig::from_json("{}").unwrap();
        assert_eq!(config, ResolverConfig::default());
        assert_eq!(config.manifest_feature_flag, "HELM_CHART_AS_ARTIFACT");
    }

    #[test]
    fn overrides_single_field() {
        let config = ResolverConfig::from_json(r#"{"degradeStageErrors": false}"#).unwrap();
        assert!(!config.degrade_stage_errors);
        assert_eq!(config.looped_stage_separator, "_");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = ResolverConfig::from_json("{").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Parse);
    }
}

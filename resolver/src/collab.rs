//! External collaborators the resolver calls synchronously.
//!
//! Storage, service catalogs and feature flags live outside this crate. Every
//! lookup returns `Result` so a backing store can surface its own failures;
//! `Ok(None)` means "does not exist".

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{DeploymentMetadata, Include, Pipeline, Service, Workflow};

/// Stage-level variable values: variable name -> literal or `${expr}`.
pub type Overrides = BTreeMap<String, String>;

pub trait PipelineRepository {
    fn read_pipeline(&self, app_id: &str, pipeline_id: &str) -> Result<Option<Pipeline>>;
}

pub trait WorkflowRepository {
    /// Full read, including the services the workflow deploys.
    fn read_workflow(&self, app_id: &str, workflow_id: &str) -> Result<Option<Workflow>>;

    fn read_workflow_without_services(
        &self,
        app_id: &str,
        workflow_id: &str,
    ) -> Result<Option<Workflow>>;

    /// Metadata one workflow contributes given a stage's variable values.
    fn fetch_deployment_metadata(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
        with_default_artifact: bool,
        include: &[Include],
    ) -> Result<Option<DeploymentMetadata>>;

    fn resolve_infra_mapping_ids(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<String>>;

    fn resolve_infra_definition_ids(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<String>>;
}

pub trait ServiceCatalog {
    fn resolve_services_for_workflow(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Vec<Service>>;
}

pub trait EnvironmentCatalog {
    /// The environment a workflow runs against. May be an unresolved
    /// `${expr}` when the environment is templatized and not overridden.
    fn resolve_environment_id(
        &self,
        workflow: &Workflow,
        overrides: &Overrides,
    ) -> Result<Option<String>>;
}

pub trait FeatureFlagOracle {
    fn is_enabled(&self, flag: &str, account_id: &str) -> bool;
}

/// The set of collaborators one resolver instance talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub pipelines: &'a dyn PipelineRepository,
    pub workflows: &'a dyn WorkflowRepository,
    pub services: &'a dyn ServiceCatalog,
    pub environments: &'a dyn EnvironmentCatalog,
    pub feature_flags: &'a dyn FeatureFlagOracle,
}

impl<'a> Collaborators<'a> {
    /// Use one backing store for every collaborator.
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: PipelineRepository
            + WorkflowRepository
            + ServiceCatalog
            + EnvironmentCatalog
            + FeatureFlagOracle,

    {
        Collaborators {
            pipelines: store,
            workflows: store,
            services: store,
            environments: store,
            feature_flags: store,
        }
    }
}

//! Variable resolution service: the public entry points of the crate.
//!
//! Every call builds its own workflow cache and accumulators and drops them
//! on return, so a `PipelineResolver` can be shared freely between calls.

pub mod looping;
pub mod overrides;
pub mod validate;
pub mod variables;

use std::collections::BTreeSet;

use crate::collab::{Collaborators, Overrides};
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::metadata::{self, MetadataRequest};
use crate::model::{DeploymentMetadata, Pipeline, RequiredEntity, Variable};
use crate::walk::{walk, ErrorPolicy, LoadMode, WalkOptions, WalkSummary, WorkflowCache};

use overrides::{validate_multiple_values_allowed, ResolveVisitor};
use variables::DetailsVisitor;

pub struct PipelineResolver<'a> {
    collab: Collaborators<'a>,
    config: ResolverConfig,
}

impl<'a> PipelineResolver<'a> {
    pub fn new(collab: Collaborators<'a>) -> Self {
        Self::with_config(collab, ResolverConfig::default())
    }

    pub fn with_config(collab: Collaborators<'a>, config: ResolverConfig) -> Self {
        PipelineResolver { collab, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn load_pipeline(&self, app_id: &str, pipeline_id: &str) -> Result<Pipeline> {
        self.collab
            .pipelines
            .read_pipeline(app_id, pipeline_id)?
            .ok_or_else(|| ResolveError::not_found("Pipeline does not exist"))
    }

    fn lenient_options(&self) -> WalkOptions {
        WalkOptions {
            include_disabled: false,
            error_policy: if self.config.degrade_stage_errors {
                ErrorPolicy::Degrade
            } else {
                ErrorPolicy::FailFast
            },
        }
    }

    // =========================================================================
    // EXPOSED VARIABLES
    // =========================================================================

    /// Populate variables, validity and summary flags of pipelines read for
    /// listing. Stage failures are logged and skipped unless the config says
    /// otherwise.
    pub fn set_pipeline_details(
        &self,
        pipelines: &mut [Pipeline],
        with_final_values_only: bool,
    ) -> Result<()> {
        for pipeline in pipelines.iter_mut() {
            let mut cache = WorkflowCache::new(
                self.collab.workflows,
                pipeline.app_id.clone(),
                LoadMode::WithoutServices,
            );
            let mut visitor = DetailsVisitor::new(with_final_values_only);
            let summary = walk(pipeline, &mut cache, self.lenient_options(), &mut visitor)?;
            visitor.apply(pipeline, &summary);
        }
        Ok(())
    }

    /// Populate the pipeline's exposed variables and summary flags, failing
    /// on the first stage error.
    pub fn compute_exposed_variables(
        &self,
        pipeline: &mut Pipeline,
        with_final_values_only: bool,
    ) -> Result<()> {
        let mut cache = WorkflowCache::new(
            self.collab.workflows,
            pipeline.app_id.clone(),
            LoadMode::WithoutServices,
        );
        let mut visitor = DetailsVisitor::new(with_final_values_only);
        let summary = walk(pipeline, &mut cache, WalkOptions::strict(), &mut visitor)?;
        visitor.apply(pipeline, &summary);
        Ok(())
    }

    /// The ordered variables a caller must supply to trigger the pipeline.
    pub fn pipeline_variables(&self, app_id: &str, pipeline_id: &str) -> Result<Vec<Variable>> {
        let mut pipeline = self.load_pipeline(app_id, pipeline_id)?;
        let mut cache =
            WorkflowCache::new(self.collab.workflows, app_id, LoadMode::WithoutServices);
        let mut visitor = DetailsVisitor::new(true);
        walk(&mut pipeline, &mut cache, WalkOptions::strict(), &mut visitor)?;
        Ok(visitor.into_variables())
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Read a pipeline with every stage's variables replaced by their final
    /// values and the concrete identifiers it will touch collected.
    ///
    /// With `pre_execution_checks` the pipeline is about to run: any stage
    /// failure or invalid stage is returned as an error instead of being
    /// folded into the validity flags.
    pub fn read_pipeline_with_resolved_variables(
        &self,
        app_id: &str,
        pipeline_id: &str,
        overrides: &Overrides,
        pre_execution_checks: bool,
    ) -> Result<Pipeline> {
        let mut pipeline = self.load_pipeline(app_id, pipeline_id)?;
        let mut cache = WorkflowCache::new(self.collab.workflows, app_id, LoadMode::WithServices);

        let details_options = if pre_execution_checks {
            WalkOptions::strict()
        } else {
            self.lenient_options()
        };
        let mut details = DetailsVisitor::new(false);
        let details_summary = walk(&mut pipeline, &mut cache, details_options, &mut details)?;
        details.apply(&mut pipeline, &details_summary);
        validate_multiple_values_allowed(&pipeline.pipeline_variables, overrides)?;

        let options = WalkOptions {
            include_disabled: true,
            error_policy: ErrorPolicy::FailFast,
        };
        let mut resolver = ResolveVisitor::new(self.collab, overrides, pre_execution_checks);
        let resolve_summary = walk(&mut pipeline, &mut cache, options, &mut resolver)?;

        let mut summary = WalkSummary::default();
        summary.invalid_stages.extend(details_summary.invalid_stages);
        summary.invalid_stages.extend(resolve_summary.invalid_stages);
        if let Some(message) = summary.validation_message() {
            if pre_execution_checks {
                return Err(ResolveError::invalid_request(message));
            }
            pipeline.valid = false;
            pipeline.validation_message = Some(message);
        }

        pipeline.services = resolver.services;
        pipeline.env_ids = resolver.env_ids;
        pipeline.infra_mapping_ids = resolver.infra_mapping_ids;
        pipeline.infra_definition_ids = resolver.infra_definition_ids;
        pipeline.workflow_ids = resolver.workflow_ids;
        pipeline.has_build_workflow = resolver.has_build_workflow;

        tracing::info!(
            "Resolved pipeline {} ({} variables, valid: {})",
            pipeline.id,
            pipeline.pipeline_variables.len(),
            pipeline.valid
        );
        Ok(pipeline)
    }

    /// Resolve the pipeline, then expand each looped stage into one parallel
    /// stage per infrastructure definition.
    pub fn read_pipeline_resolved_variables_looped_info(
        &self,
        app_id: &str,
        pipeline_id: &str,
        overrides: &Overrides,
    ) -> Result<Pipeline> {
        let mut pipeline =
            self.read_pipeline_with_resolved_variables(app_id, pipeline_id, overrides, false)?;
        looping::expand_looped_stages(&mut pipeline, &self.config.looped_stage_separator);
        Ok(pipeline)
    }

    // =========================================================================
    // SAVE-TIME
    // =========================================================================

    pub fn validate_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        validate::validate_pipeline(pipeline, self.collab)
    }

    pub fn user_groups(&self, pipeline: &Pipeline) -> Result<BTreeSet<String>> {
        validate::user_groups(pipeline, self.collab)
    }

    pub fn ensure_stage_ids_and_parallel_index(&self, pipeline: &mut Pipeline) {
        pipeline.ensure_stage_ids_and_parallel_index();
    }

    // =========================================================================
    // DEPLOYMENT METADATA
    // =========================================================================

    /// Metadata of a stored pipeline, read with the request's pipeline
    /// variables applied to its stages.
    pub fn fetch_deployment_metadata(
        &self,
        app_id: &str,
        pipeline_id: &str,
        request: &MetadataRequest,
    ) -> Result<DeploymentMetadata> {
        let pipeline = self.read_pipeline_with_resolved_variables(
            app_id,
            pipeline_id,
            &request.pipeline_variables,
            false,
        )?;
        self.fetch_deployment_metadata_for(&pipeline, request)
    }

    pub fn fetch_deployment_metadata_for(
        &self,
        pipeline: &Pipeline,
        request: &MetadataRequest,
    ) -> Result<DeploymentMetadata> {
        metadata::aggregate(pipeline, self.collab, &self.config, request)
    }

    pub fn required_entities(
        &self,
        app_id: &str,
        pipeline_id: &str,
    ) -> Result<Vec<RequiredEntity>> {

        let pipeline = self.load_pipeline(app_id, pipeline_id)?;
        metadata::required_entities(&pipeline, self.collab)
    }
}

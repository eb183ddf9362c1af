//! Call-scoped workflow lookup cache.

use std::collections::HashMap;
use std::rc::Rc;

use crate::collab::WorkflowRepository;
use crate::error::{ResolveError, Result};
use crate::model::Workflow;

/// Which repository read backs a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    WithServices,
    WithoutServices,
}

/// Memoizes workflow reads for the duration of one resolution call.
///
/// The first lookup of an id hits the repository; later lookups are served
/// from the map. Only workflows with an orchestration definition are cached.
pub struct WorkflowCache<'a> {
    repository: &'a dyn WorkflowRepository,
    app_id: String,
    mode: LoadMode,
    entries: HashMap<String, Rc<Workflow>>,
}

impl<'a> WorkflowCache<'a> {
    pub fn new(
        repository: &'a dyn WorkflowRepository,
        app_id: impl Into<String>,
        mode: LoadMode,
    ) -> Self {

        WorkflowCache {
            repository,
            app_id: app_id.into(),
            mode,
            entries: HashMap::new(),
        }
    }

    pub fn get_or_load(&mut self, workflow_id: &str) -> Result<Rc<Workflow>> {
        if let Some(workflow) = self.entries.get(workflow_id) {
            return Ok(Rc::clone(workflow));
        }

        tracing::debug!("Workflow cache miss: {}", workflow_id);
        let loaded = match self.mode {
            LoadMode::WithServices => self.repository.read_workflow(&self.app_id, workflow_id)?,
            LoadMode::WithoutServices => self
                .repository
                .read_workflow_without_services(&self.app_id, workflow_id)?,
        };
        let workflow = loaded.ok_or_else(|| ResolveError::not_found("Workflow does not exist"))?;
        if workflow.orchestration_workflow.is_none() {
            return Err(ResolveError::not_found("Orchestration workflow does not exist"));
        }

        let workflow = Rc::new(workflow);
        self.entries
            .insert(workflow_id.to_string(), Rc::clone(&workflow));
        Ok(workflow)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Integration tests for deployment metadata aggregation and required entities.

mod helpers;

use helpers::*;
use resolver::config::HELM_CHART_AS_ARTIFACT;
use resolver::model::{
    ArtifactEntityType, ArtifactVariable, DeploymentMetadata, DeploymentType, Include,
    ManifestVariable, RequiredEntity,
};
use resolver::{Collaborators, InMemoryStore, MetadataRequest, PipelineResolver};

fn artifact(name: &str, service: &str) -> ArtifactVariable {
    ArtifactVariable {
        name: name.into(),
        entity_type: Some(ArtifactEntityType::Service),
        entity_id: Some(service.into()),
        value: Some(format!("{}-default", name)),
        allowed_list: vec![],
        workflow_ids: vec![],
    }
}

fn canned(services: &[&str], artifacts: Vec<ArtifactVariable>) -> DeploymentMetadata {
    DeploymentMetadata {
        artifact_required_service_ids: services.iter().map(|s| s.to_string()).collect(),
        env_ids: vec!["env-prod".into()],
        deployment_types: vec![DeploymentType::Kubernetes],
        artifact_variables: artifacts,
        ..Default::default()
    }
}

fn metadata_store(stages: Vec<resolver::model::PipelineStage>) -> InMemoryStore {
    store(
        vec![pipeline("p", stages)],
        vec![
            workflow("wf-1", vec![]),
            workflow("wf-2", vec![]),
            build_workflow("wf-build", vec![]),
        ],
    )
    .with_deployment_metadata("wf-1", canned(&["svc-1"], vec![artifact("V1", "svc-1")]))
    .with_deployment_metadata(
        "wf-2",
        canned(&["svc-2"], vec![artifact("V1", "svc-1"), artifact("V2", "svc-2")]),
    )
    .with_deployment_metadata(
        "wf-build",
        canned(&["svc-build"], vec![artifact("B1", "svc-build")]),
    )
}

fn fetch(store: &InMemoryStore, request: &MetadataRequest) -> DeploymentMetadata {
    PipelineResolver::new(Collaborators::from_store(store))
        .fetch_deployment_metadata(APP_ID, "p", request)
        .unwrap()
}

#[test]
fn metadata_merges_across_stages() {
    let store = metadata_store(vec![stage("One", "wf-1", &[]), stage("Two", "wf-2", &[])]);
    let metadata = fetch(&store, &MetadataRequest::default());

    assert_eq!(
        metadata.artifact_required_service_ids,
        vec!["svc-1".to_string(), "svc-2".to_string()]
    );
    assert_eq!(metadata.env_ids, vec!["env-prod".to_string()]);
    assert_eq!(metadata.deployment_types, vec![DeploymentType::Kubernetes]);

    let summary: Vec<String> = metadata
        .artifact_variables
        .iter()
        .map(|v| format!("{}@{}", v.name, v.workflow_ids.join("+")))
        .collect();
    insta::assert_snapshot!(summary.join(" "), @"V1@wf-1+wf-2 V2@wf-2");
    assert!(metadata.artifact_variables.iter().all(|v| v.value.is_none()));
}

#[test]
fn default_artifact_values_are_kept_on_request() {
    let store = metadata_store(vec![stage("One", "wf-1", &[])]);
    let metadata = fetch(
        &store,
        &MetadataRequest {
            with_default_artifact: true,
            ..Default::default()
        },
    );
    assert_eq!(metadata.artifact_variables[0].value.as_deref(), Some("V1-default"));
}

#[test]
fn build_stage_drops_artifact_metadata() {
    let store = metadata_store(vec![
        stage("One", "wf-1", &[]),
        stage("Build", "wf-build", &[]),
        stage("Two", "wf-2", &[]),
    ]);
    let metadata = fetch(&store, &MetadataRequest::default());

    assert!(metadata.artifact_variables.is_empty());
    assert_eq!(metadata.artifact_required_service_ids, vec!["svc-1".to_string()]);
    assert_eq!(metadata.env_ids, vec!["env-prod".to_string()]);
}

#[test]
fn hints_seed_the_result() {
    let store = metadata_store(vec![stage("One", "wf-1", &[])]);
    let metadata = fetch(
        &store,
        &MetadataRequest {
            service_hints: vec!["svc-hint".into(), "svc-1".into()],
            env_hints: vec!["env-hint".into()],
            ..Default::default()
        },
    );
    assert_eq!(
        metadata.artifact_required_service_ids,
        vec!["svc-hint".to_string(), "svc-1".to_string()]
    );
    assert_eq!(metadata.env_ids, vec!["env-hint".to_string(), "env-prod".to_string()]);
}

#[test]
fn include_restricts_slices() {
    let store = metadata_store(vec![stage("One", "wf-1", &[])]);
    let metadata = fetch(
        &store,
        &MetadataRequest {
            include: vec![Include::DeploymentType],
            ..Default::default()
        },
    );
    assert!(metadata.artifact_required_service_ids.is_empty());
    assert!(metadata.env_ids.is_empty());
    assert_eq!(metadata.deployment_types, vec![DeploymentType::Kubernetes]);
}

#[test]
fn disabled_stages_are_skipped() {
    let store = metadata_store(vec![disabled_stage("One", "wf-1", &[]), stage("Two", "wf-2", &[])]);
    let metadata = fetch(&store, &MetadataRequest::default());
    assert_eq!(metadata.artifact_required_service_ids, vec!["svc-2".to_string()]);
}

#[test]
fn manifest_variables_need_the_feature_flag() {
    let manifest = DeploymentMetadata {
        manifest_required_service_ids: vec!["svc-1".into()],
        manifest_variables: vec![ManifestVariable {
            name: "chart".into(),
            service_id: "svc-1".into(),
            service_name: Some("web".into()),
            workflow_ids: vec![],
        }],
        ..Default::default()
    };
    let base = store(
        vec![pipeline("p", vec![stage("One", "wf-1", &[]), stage("Two", "wf-2", &[])])],
        vec![workflow("wf-1", vec![]), workflow("wf-2", vec![])],
    )
    .with_deployment_metadata("wf-1", manifest.clone())
    .with_deployment_metadata("wf-2", manifest);

    let without_flag = fetch(&base, &MetadataRequest::default());
    assert!(without_flag.manifest_variables.is_empty());
    assert_eq!(without_flag.manifest_required_service_ids, vec!["svc-1".to_string()]);

    let flagged = base.with_feature_flag(HELM_CHART_AS_ARTIFACT, ACCOUNT_ID);
    let with_flag = fetch(&flagged, &MetadataRequest::default());
    assert_eq!(with_flag.manifest_variables.len(), 1);
    assert_eq!(
        with_flag.manifest_variables[0].workflow_ids,
        vec!["wf-1".to_string(), "wf-2".to_string()]
    );
}

#[test]
fn required_entities_follow_artifact_needs() {
    let resolver_for = |store: &InMemoryStore| {
        PipelineResolver::new(Collaborators::from_store(store))
            .required_entities(APP_ID, "p")
            .unwrap()
    };

    let deploy = metadata_store(vec![stage("One", "wf-1", &[])]);
    assert_eq!(resolver_for(&deploy), vec![RequiredEntity::Artifact]);

    let with_build =
        metadata_store(vec![stage("One", "wf-1", &[]), stage("Build", "wf-build", &[])]);
    assert!(resolver_for(&with_build).is_empty());

    let no_artifacts = store(
        vec![pipeline("p", vec![stage("One", "wf-1", &[])])],
        vec![workflow("wf-1", vec![])],
    );

    assert!(resolver_for(&no_artifacts).is_empty());
}

#[test]
fn derived_metadata_uses_resolved_services() {
    let mut wf = workflow(
        "wf",
        vec![resolver::model::Variable::entity("Service", resolver::model::EntityType::Service)],
    );
    if let Some(orchestration) = wf.orchestration_workflow.as_mut() {
        orchestration.env_id = Some("env-qa".into());
    }
    let store = store(
        vec![pipeline("p", vec![stage("Deploy", "wf", &[("Service", "${svc}")])])],
        vec![wf],
    )
    .with_service(service("svc-docker", Some("DOCKER")));

    let metadata = fetch(
        &store,
        &MetadataRequest {
            pipeline_variables: values(&[("svc", "svc-docker")]),
            ..Default::default()
        },
    );
    assert_eq!(metadata.artifact_required_service_ids, vec!["svc-docker".to_string()]);
    assert_eq!(metadata.env_ids, vec!["env-qa".to_string()]);
}

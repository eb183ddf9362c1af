//! End-to-end release pipeline: Parse → Expose variables → Validate → Resolve → Metadata.

use resolver::model::{self, DeploymentType, EntityType, Pipeline};
use resolver::wasm::{deployment_metadata_json, pipeline_variables_json, resolve_pipeline_json};
use resolver::{Collaborators, InMemoryStore, MetadataRequest, Overrides, PipelineResolver};
use serde_json::json;

fn release_pipeline() -> Pipeline {
    model::parse_pipeline(include_str!("fixtures/release_pipeline.json")).unwrap()
}

fn release_store() -> InMemoryStore {
    InMemoryStore::from_json(include_str!("fixtures/release_store.json"))
        .unwrap()
        .with_pipeline(release_pipeline())
}

fn release_values() -> Overrides {
    [("svc", "svc-web"), ("env", "env-prod"), ("infra", "infra-1")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn bundle(extra: serde_json::Value) -> String {
    let mut store: serde_json::Value =
        serde_json::from_str(include_str!("fixtures/release_store.json")).unwrap();
    let pipeline: serde_json::Value =
        serde_json::from_str(include_str!("fixtures/release_pipeline.json")).unwrap();
    store["pipelines"] = json!([pipeline]);

    let mut bundle = json!({
        "appId": "app",
        "pipelineId": "release",
        "store": store
    });
    if let (Some(target), Some(extra)) = (bundle.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    bundle.to_string()
}

#[test]
fn release_pipeline_variables() {
    let store = release_store();
    let variables = PipelineResolver::new(Collaborators::from_store(&store))
        .pipeline_variables("app", "release")
        .unwrap();

    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["approvers", "svc", "env", "infra", "region"]);

    assert_eq!(variables[0].entity_type, Some(EntityType::UserGroup));
    assert_eq!(variables[1].entity_type, Some(EntityType::Service));
    assert!(variables[3].allow_multiple_values);

    let region = &variables[4];
    assert_eq!(region.runtime_input, Some(true));
    assert_eq!(region.value.as_deref(), Some("us-east-1"));
    assert_eq!(
        region.allowed_list,
        Some(vec!["us-east-1".to_string(), "us-west-2".to_string()])
    );
}

#[test]
fn release_pipeline_validates_and_lists_user_groups() {
    let store = release_store();
    let resolver = PipelineResolver::new(Collaborators::from_store(&store));
    let pipeline = release_pipeline();

    resolver.validate_pipeline(&pipeline).unwrap();

    let groups: Vec<String> = resolver.user_groups(&pipeline).unwrap().into_iter().collect();
    assert_eq!(groups, vec!["ug-oncall".to_string(), "ug-release".to_string()]);
}

#[test]
fn release_pipeline_resolves_before_execution() {
    let store = release_store();
    let resolved = PipelineResolver::new(Collaborators::from_store(&store))
        .read_pipeline_with_resolved_variables("app", "release", &release_values(), true)
        .unwrap();

    assert!(resolved.valid);
    assert!(resolved.has_build_workflow);
    assert!(resolved.env_parameterized);
    assert_eq!(resolved.services.len(), 1);
    assert_eq!(resolved.services[0].id, "svc-web");
    assert_eq!(resolved.env_ids, vec!["env-prod".to_string()]);
    assert_eq!(resolved.infra_definition_ids, vec!["infra-1".to_string()]);
    assert_eq!(resolved.workflow_ids, vec!["wf-build".to_string(), "wf-deploy".to_string()]);
    assert!(resolved.pipeline_stages.iter().all(|s| !s.looped));
}

#[test]
fn release_pipeline_metadata() {
    let store = release_store();
    let metadata = PipelineResolver::new(Collaborators::from_store(&store))
        .fetch_deployment_metadata(
            "app",
            "release",
            &MetadataRequest {
                pipeline_variables: release_values(),
                ..Default::default()
            },
        )
        .unwrap();

    // The build stage comes first, so nothing artifact related survives.
    assert!(metadata.artifact_required_service_ids.is_empty());
    assert!(metadata.artifact_variables.is_empty());
    assert_eq!(metadata.env_ids, vec!["env-prod".to_string()]);
    assert_eq!(metadata.deployment_types, vec![DeploymentType::Kubernetes]);

    let required = PipelineResolver::new(Collaborators::from_store(&store))
        .required_entities("app", "release")
        .unwrap();
    assert!(required.is_empty());
}

#[test]
fn release_bundle_through_json_entry_points() {
    let out: serde_json::Value =
        serde_json::from_str(&pipeline_variables_json(&bundle(json!({})))).unwrap();
    assert_eq!(out["status"], "success");
    assert_eq!(out["result"].as_array().map(Vec::len), Some(5));

    let out: serde_json::Value = serde_json::from_str(&resolve_pipeline_json(&bundle(json!({
        "overrides": {"svc": "svc-web", "env": "env-prod", "infra": "infra-1"},
        "preExecutionChecks": true
    }))))
    .unwrap();
    assert_eq!(out["status"], "success");
    assert_eq!(out["result"]["envIds"], json!(["env-prod"]));

    let out: serde_json::Value = serde_json::from_str(&deployment_metadata_json(&bundle(json!({
        "metadata": {
            "pipelineVariables": {"svc": "svc-web", "env": "env-prod", "infra": "infra-1"},
            "include": ["DEPLOYMENT_TYPE"]
        }
    }))))
    .unwrap();
    assert_eq!(out["status"], "success");
    insta::assert_snapshot!(out["result"]["deploymentTypes"].to_string(), @r#"["KUBERNETES"]"#);
    assert_eq!(out["result"]["envIds"], json!([]));
    assert_eq!(out["result"]["artifactRequiredServiceIds"], json!([]));
}

#[test]
fn release_bundle_fails_fast_on_unset_service() {
    let out: serde_json::Value = serde_json::from_str(&resolve_pipeline_json(&bundle(json!({
        "overrides": {"env": "env-prod", "infra": "infra-1"},
        "preExecutionChecks": true
    }))))
    .unwrap();
    assert_eq!(out["status"], "errors");
    assert_eq!(out["errors"][0]["kind"], "InvalidRequest");
    assert_eq!(
        out["errors"][0]["message"],
        "Templatized variable Service is not set for stage Deploy"
    );

    assert_eq!(out["errors"][0]["stage"], "Deploy");
}

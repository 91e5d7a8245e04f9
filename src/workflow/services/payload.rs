//! Builds stage payloads from workflow parameters.

use crate::envelope::{Action, EnvelopeError, TaskPayload};
use crate::workflow::domain::Workflow;
use serde_json::{Map, Value, json};

/// Builds the typed payload for `action` from the workflow's parameters.
///
/// Every field has a default derived from the workflow; a parameter with
/// the same key overrides it. Unrelated parameters are ignored.
///
/// # Errors
///
/// Returns [`EnvelopeError::PayloadMismatch`] when a parameter has the wrong
/// shape for the action.
pub fn build_payload(action: Action, workflow: &Workflow) -> Result<TaskPayload, EnvelopeError> {
    let params = workflow.params();
    let project_name = params
        .get("project_name")
        .and_then(Value::as_str)
        .unwrap_or_else(|| workflow.name())
        .to_owned();
    let project_path = params
        .get("project_path")
        .and_then(Value::as_str)
        .map_or_else(|| format!("./{project_name}"), str::to_owned);

    let (defaults, optional): (Value, &[&str]) = match action {
        Action::Initialize => (
            json!({ "project_name": project_name, "requirements": [] }),
            &["description"],
        ),
        Action::Scaffold => (
            json!({
                "project_name": project_name,
                "template": "default",
                "language": "typescript",
            }),
            &["framework"],
        ),
        Action::Implement => (
            json!({
                "project_name": project_name,
                "feature": workflow.name(),
                "files": [],
            }),
            &[],
        ),
        Action::Validate => (
            json!({
                "project_path": project_path,
                "checks": ["lint", "typecheck", "test"],
                "coverage_threshold": 80,
            }),
            &[],
        ),
        Action::RunE2e => (
            json!({
                "project_path": project_path,
                "browsers": ["chromium"],
                "parallel": false,
            }),
            &[],
        ),
        Action::Merge => (
            json!({
                "repository": project_name,
                "source_branch": format!("stagehand/{}", workflow.id()),
                "target_branch": "main",
                "strategy": "squash",
            }),
            &[],
        ),
        Action::Deploy => (
            json!({
                "image": format!("{project_name}:latest"),
                "environment": "staging",
                "replicas": 1,
            }),
            &[],
        ),
    };

    let mut body = match defaults {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    if let Some(overrides) = params.as_object() {
        for (key, value) in overrides {
            if body.contains_key(key) || optional.contains(&key.as_str()) {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    TaskPayload::from_wire(action, &Value::Object(body))
}

//! Workflow driving loop and final-result assembly.

use capstan_types::WorkflowDefinition;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::ExecutionContext;
use crate::error::{EngineError, ExecutionFailure};
use crate::executor::{execute_step, prepare_input};
use crate::transport::ToolCaller;

/// Execute a workflow definition against the provided input.
///
/// Steps run strictly sequentially in declaration order; there is no retry
/// and no intra-workflow parallelism. On failure the returned
/// [`ExecutionFailure`] carries a partial result in the same shape as the
/// success result whenever any step ran; pre-flight validation failures
/// carry none.
pub async fn execute_workflow(
    definition: &WorkflowDefinition,
    input: JsonMap<String, JsonValue>,
    caller: &dyn ToolCaller,
    cancel: &CancellationToken,
) -> Result<JsonValue, ExecutionFailure> {
    let merged_input = prepare_input(definition, input).map_err(ExecutionFailure::bare)?;
    let mut context = ExecutionContext::new(merged_input);

    info!(
        workflow = definition.name.as_str(),
        steps = definition.steps.len(),
        "starting workflow execution"
    );

    for step in &definition.steps {
        if cancel.is_cancelled() {
            let error = EngineError::Cancelled;
            let partial = assemble_result(definition, &context, "failed", Some(error.to_string()), None);
            return Err(ExecutionFailure {
                error,
                partial_result: Some(partial),
            });
        }

        if let Err(step_error) = execute_step(step, &mut context, caller, cancel).await {
            let error = EngineError::for_step(&step.id, step_error);
            let failed_step = error.failed_step().map(str::to_string);
            let partial = assemble_result(
                definition,
                &context,
                "failed",
                Some(error.to_string()),
                failed_step.as_deref(),
            );
            return Err(ExecutionFailure {
                error,
                partial_result: Some(partial),
            });
        }
    }

    let mut result = assemble_result(definition, &context, "completed", None, None);
    merge_terminal_result(definition, &context, &mut result);
    Ok(result)
}

/// Build the structured result object shared by success and failure paths.
fn assemble_result(
    definition: &WorkflowDefinition,
    context: &ExecutionContext,
    status: &str,
    error: Option<String>,
    failed_step: Option<&str>,
) -> JsonValue {
    let mut map = JsonMap::new();
    map.insert("workflow".into(), json!(definition.name));
    map.insert("input".into(), JsonValue::Object(context.input.clone()));
    map.insert("results".into(), serde_json::to_value(&context.results).unwrap_or_default());
    map.insert("template_vars".into(), json!(context.template_var_list()));
    map.insert("steps".into(), serde_json::to_value(&context.step_metadata).unwrap_or_default());
    map.insert("status".into(), json!(status));
    if let Some(message) = error {
        map.insert("error".into(), json!(message));
    }
    if let Some(step_id) = failed_step {
        map.insert("failed_step".into(), json!(step_id));
    }
    JsonValue::Object(map)
}

/// When the terminal step has no storage slot, merge its object-shaped
/// result into the top level. Flat keys shadow the structural ones.
fn merge_terminal_result(definition: &WorkflowDefinition, context: &ExecutionContext, result: &mut JsonValue) {
    let Some(last_step) = definition.steps.last() else {
        return;
    };
    if last_step.store.is_set() {
        return;
    }
    let Some(entry) = context.step_metadata.last() else {
        return;
    };
    if entry.id != last_step.id {
        return;
    }
    let Some(JsonValue::Object(payload)) = &entry.result else {
        return;
    };
    if let JsonValue::Object(top) = result {
        for (key, value) in payload {
            top.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ToolCallError;
    use async_trait::async_trait;
    use capstan_types::ToolResult;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedCaller {
        responses: Mutex<VecDeque<Result<ToolResult, ToolCallError>>>,
        calls: Mutex<Vec<(String, JsonMap<String, JsonValue>)>>,
    }

    impl ScriptedCaller {
        fn new(responses: Vec<Result<ToolResult, ToolCallError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, JsonMap<String, JsonValue>)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ToolCaller for ScriptedCaller {
        async fn call_tool(&self, name: &str, args: &JsonMap<String, JsonValue>) -> Result<ToolResult, ToolCallError> {
            self.calls.lock().expect("calls lock").push((name.to_string(), args.clone()));
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Ok(ToolResult::default()))
        }
    }

    fn definition(yaml: &str) -> WorkflowDefinition {
        serde_yaml::from_str(yaml).expect("definition yaml")
    }

    fn input(value: JsonValue) -> JsonMap<String, JsonValue> {
        value.as_object().expect("object input").clone()
    }

    #[tokio::test]
    async fn substitutes_templates_and_completes() {
        let caller = ScriptedCaller::new(vec![Ok(ToolResult::text(r#"{"ok": true}"#))]);
        let workflow = definition(
            r#"
name: w1
args:
  cluster:
    type: string
    required: true
steps:
  - id: s1
    tool: core_login
    args:
      cluster: "{{ input.cluster }}"
      action: login
"#,
        );

        let result = execute_workflow(&workflow, input(json!({"cluster": "c-1"})), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes");

        let calls = caller.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "core_login");
        assert_eq!(calls[0].1["cluster"], json!("c-1"));
        assert_eq!(calls[0].1["action"], json!("login"));

        assert_eq!(result["status"], "completed");
        assert_eq!(result["workflow"], "w1");
        assert_eq!(result["template_vars"], json!(["cluster"]));
        assert_eq!(result["steps"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn forwards_stored_results_between_steps() {
        let caller = ScriptedCaller::new(vec![
            Ok(ToolResult::text(r#"{"status": "success", "data": "d"}"#)),
            Ok(ToolResult::text(r#"{"ok": true}"#)),
        ]);
        let workflow = definition(
            r#"
name: forward
steps:
  - id: s1
    tool: core_first
    store: true
  - id: s2
    tool: core_second
    args:
      data: "{{ results.s1.status }}"
"#,
        );

        let result = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes");

        let calls = caller.calls();
        assert_eq!(calls[1].1["data"], json!("success"));
        assert_eq!(result["results"]["s1"]["status"], "success");
    }

    #[tokio::test]
    async fn missing_required_input_fails_before_any_tool_call() {
        let caller = ScriptedCaller::new(vec![]);
        let workflow = definition(
            r#"
name: strict
args:
  x:
    type: string
    required: true
steps:
  - id: s1
    tool: core_tool
"#,
        );

        let failure = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect_err("validation failure");

        assert!(matches!(failure.error, EngineError::Validation(_)));
        assert!(failure.partial_result.is_none());
        assert!(caller.calls().is_empty());
        assert_eq!(failure.error.to_string(), "required field 'x' is missing");
    }

    #[tokio::test]
    async fn failure_returns_partial_result_and_stops() {
        let caller = ScriptedCaller::new(vec![
            Ok(ToolResult::text(r#"{"ok": true}"#)),
            Ok(ToolResult::error_text("boom")),
            Ok(ToolResult::text(r#"{"never": "reached"}"#)),
        ]);
        let workflow = definition(
            r#"
name: fails
steps:
  - id: s1
    tool: core_one
    store: true
  - id: s2
    tool: core_two
  - id: s3
    tool: core_three
"#,
        );

        let failure = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect_err("step failure");

        assert_eq!(failure.error.failed_step(), Some("s2"));
        assert!(failure.error.to_string().contains("boom"));

        let partial = failure.partial_result.expect("partial result");
        assert_eq!(partial["status"], "failed");
        assert_eq!(partial["failed_step"], "s2");
        let steps = partial["steps"].as_array().expect("steps array");
        assert_eq!(steps.len(), 2, "s3 must not appear");
        assert_eq!(steps[0]["status"], "completed");
        assert_eq!(steps[1]["status"], "failed");
        assert!(steps[1]["error"].as_str().expect("error").contains("boom"));
        assert_eq!(caller.calls().len(), 2);
    }

    #[tokio::test]
    async fn allow_failure_continues_with_subsequent_steps() {
        let caller = ScriptedCaller::new(vec![
            Ok(ToolResult::error_text("flaky")),
            Ok(ToolResult::text(r#"{"ok": true}"#)),
        ]);
        let workflow = definition(
            r#"
name: tolerant
steps:
  - id: s1
    tool: core_flaky
    allow_failure: true
  - id: s2
    tool: core_solid
"#,
        );

        let result = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes despite allowed failure");

        assert_eq!(result["status"], "completed");
        assert_eq!(result["steps"][0]["status"], "failed");
        assert_eq!(result["steps"][1]["status"], "completed");
        assert_eq!(caller.calls().len(), 2);
    }

    #[tokio::test]
    async fn terminal_step_without_store_merges_into_top_level() {
        let caller = ScriptedCaller::new(vec![Ok(ToolResult::text(r#"{"summary": "done", "count": 2}"#))]);
        let workflow = definition(
            r#"
name: merging
steps:
  - id: last
    tool: core_report
"#,
        );

        let result = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes");

        assert_eq!(result["summary"], "done");
        assert_eq!(result["count"], 2);
        assert_eq!(result["status"], "completed");
    }

    #[tokio::test]
    async fn stored_terminal_step_is_not_merged() {
        let caller = ScriptedCaller::new(vec![Ok(ToolResult::text(r#"{"summary": "done"}"#))]);
        let workflow = definition(
            r#"
name: stored
steps:
  - id: last
    tool: core_report
    store: true
"#,
        );

        let result = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes");

        assert!(result.get("summary").is_none());
        assert_eq!(result["results"]["last"]["summary"], "done");
    }

    #[tokio::test]
    async fn cancellation_between_steps_fails_the_run() {
        let caller = ScriptedCaller::new(vec![]);
        let workflow = definition(
            r#"
name: cancelled
steps:
  - id: s1
    tool: core_tool
"#,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = execute_workflow(&workflow, JsonMap::new(), &caller, &cancel)
            .await
            .expect_err("cancelled run");

        assert!(matches!(failure.error, EngineError::Cancelled));
        let partial = failure.partial_result.expect("partial result");
        assert_eq!(partial["status"], "failed");
        assert_eq!(partial["steps"], json!([]));
        assert!(caller.calls().is_empty());
    }

    #[tokio::test]
    async fn skipped_condition_step_continues_the_run() {
        let caller = ScriptedCaller::new(vec![
            Ok(ToolResult::text(r#"{"phase": "absent"}"#)),
            Ok(ToolResult::text(r#"{"ok": true}"#)),
        ]);
        let workflow = definition(
            r#"
name: gated
steps:
  - id: optional
    tool: core_apply
    condition:
      tool: core_probe
      expect:
        json_path:
          phase: present
  - id: always
    tool: core_finish
"#,
        );

        let result = execute_workflow(&workflow, JsonMap::new(), &caller, &CancellationToken::new())
            .await
            .expect("workflow completes");

        assert_eq!(result["status"], "completed");
        assert_eq!(result["steps"][0]["status"], "skipped");
        assert_eq!(result["steps"][1]["status"], "completed");
        let calls = caller.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "core_probe");
        assert_eq!(calls[1].0, "core_finish");
    }
}

//! Input pre-flight: default application and coarse type checking.

use capstan_types::{ValidationError, WorkflowDefinition};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Merge declared defaults into the caller input and validate the result.
///
/// Defaults are applied before the required-presence check, so an optional
/// argument with a default always arrives populated. Provided values must
/// satisfy their declared coarse type; unknown argument names pass through
/// untouched for forward compatibility.
pub fn prepare_input(
    definition: &WorkflowDefinition,
    input: JsonMap<String, JsonValue>,
) -> Result<JsonMap<String, JsonValue>, ValidationError> {
    let mut merged = input;

    for (argument_name, specification) in &definition.args {
        if !merged.contains_key(argument_name)
            && let Some(default_value) = &specification.default
        {
            merged.insert(argument_name.clone(), default_value.clone());
        }
    }

    for (argument_name, specification) in &definition.args {
        match merged.get(argument_name) {
            None if specification.required => {
                return Err(ValidationError::MissingRequiredInput {
                    name: argument_name.clone(),
                });
            }
            Some(value) if !specification.r#type.accepts(value) => {
                return Err(ValidationError::InputTypeMismatch {
                    name: argument_name.clone(),
                    expected: specification.r#type.as_str(),
                });
            }
            _ => {}
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_types::{ArgumentSpec, ArgumentType};
    use indexmap::IndexMap;
    use serde_json::json;

    fn definition_with_args(args: IndexMap<String, ArgumentSpec>) -> WorkflowDefinition {
        serde_yaml::from_str::<WorkflowDefinition>("name: demo\nsteps:\n  - id: s1\n    tool: t\n")
            .map(|mut definition| {
                definition.args = args;
                definition
            })
            .expect("definition")
    }

    fn spec(argument_type: ArgumentType, required: bool, default: Option<JsonValue>) -> ArgumentSpec {
        ArgumentSpec {
            r#type: argument_type,
            required,
            description: None,
            default,
        }
    }

    #[test]
    fn defaults_are_applied_before_required_check() {
        let mut args = IndexMap::new();
        args.insert("x".into(), spec(ArgumentType::String, true, None));
        args.insert("n".into(), spec(ArgumentType::Number, false, Some(json!(42))));
        let definition = definition_with_args(args);

        let mut input = JsonMap::new();
        input.insert("x".into(), json!("a"));
        let merged = prepare_input(&definition, input).expect("prepare");
        assert_eq!(merged["x"], json!("a"));
        assert_eq!(merged["n"], json!(42));
    }

    #[test]
    fn missing_required_input_is_rejected() {
        let mut args = IndexMap::new();
        args.insert("x".into(), spec(ArgumentType::String, true, None));
        let definition = definition_with_args(args);

        let error = prepare_input(&definition, JsonMap::new()).expect_err("missing required");
        assert_eq!(error, ValidationError::MissingRequiredInput { name: "x".into() });
        assert_eq!(error.to_string(), "required field 'x' is missing");
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut args = IndexMap::new();
        args.insert("replicas".into(), spec(ArgumentType::Integer, true, None));
        let definition = definition_with_args(args);

        let mut input = JsonMap::new();
        input.insert("replicas".into(), json!("three"));
        let error = prepare_input(&definition, input).expect_err("type mismatch");
        assert_eq!(
            error,
            ValidationError::InputTypeMismatch {
                name: "replicas".into(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn unknown_argument_names_pass_through() {
        let definition = definition_with_args(IndexMap::new());
        let mut input = JsonMap::new();
        input.insert("extra".into(), json!({"anything": true}));
        let merged = prepare_input(&definition, input).expect("prepare");
        assert_eq!(merged["extra"], json!({"anything": true}));
    }
}

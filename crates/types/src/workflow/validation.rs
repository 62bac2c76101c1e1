//! Validation rules applied to workflow definitions before they are accepted
//! by the registry, and the shared input-validation error surface used by the
//! engine's pre-flight checks.

use regex::Regex;
use thiserror::Error;

use super::WorkflowDefinition;

/// Maximum accepted length for a workflow description.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

const NAME_PATTERN: &str = "^[A-Za-z0-9][A-Za-z0-9_-]*$";

/// Errors produced while validating workflow definitions or caller input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workflow name cannot be empty")]
    EmptyName,

    #[error("workflow name '{name}' is not a valid entity name")]
    InvalidName { name: String },

    #[error("workflow description exceeds {MAX_DESCRIPTION_LENGTH} characters ({length})")]
    DescriptionTooLong { length: usize },

    #[error("workflow must declare at least one step")]
    NoSteps,

    #[error("step at index {index} has an empty id")]
    EmptyStepId { index: usize },

    #[error("duplicate step id '{id}'")]
    DuplicateStepId { id: String },

    #[error("step '{id}' does not name a tool")]
    EmptyStepTool { id: String },

    #[error("argument '{name}' is not a valid entity name")]
    InvalidArgumentName { name: String },

    #[error("default for argument '{name}' is not a {expected}")]
    InvalidArgumentDefault { name: String, expected: &'static str },

    #[error("condition on step '{step_id}' must name a tool or reference a prior step")]
    ConditionWithoutSource { step_id: String },

    #[error("condition on step '{step_id}' names both a tool and a prior step")]
    ConditionSourceConflict { step_id: String },

    #[error("condition on step '{step_id}' declares no expectation")]
    ConditionWithoutExpectation { step_id: String },

    #[error("expectation on step '{step_id}' is empty")]
    EmptyExpectation { step_id: String },

    #[error("required field '{name}' is missing")]
    MissingRequiredInput { name: String },

    #[error("input '{name}' is not a {expected}")]
    InputTypeMismatch { name: String, expected: &'static str },
}

/// Validate a workflow definition against the registry's acceptance rules.
///
/// The checks are exhaustive: name syntax, description length, step identity
/// and uniqueness, argument defaults against their declared types, and
/// condition well-formedness.
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), ValidationError> {
    if definition.name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !is_valid_entity_name(&definition.name) {
        return Err(ValidationError::InvalidName {
            name: definition.name.clone(),
        });
    }

    if let Some(description) = &definition.description {
        let length = description.chars().count();
        if length > MAX_DESCRIPTION_LENGTH {
            return Err(ValidationError::DescriptionTooLong { length });
        }
    }

    for (argument_name, specification) in &definition.args {
        if !is_valid_entity_name(argument_name) {
            return Err(ValidationError::InvalidArgumentName {
                name: argument_name.clone(),
            });
        }
        if let Some(default_value) = &specification.default
            && !specification.r#type.accepts(default_value)
        {
            return Err(ValidationError::InvalidArgumentDefault {
                name: argument_name.clone(),
                expected: specification.r#type.as_str(),
            });
        }
    }

    if definition.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }

    let mut seen_step_ids = std::collections::HashSet::new();
    for (index, step) in definition.steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(ValidationError::EmptyStepId { index });
        }
        if !seen_step_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId { id: step.id.clone() });
        }
        if step.tool.is_empty() {
            return Err(ValidationError::EmptyStepTool { id: step.id.clone() });
        }
        if let Some(condition) = &step.condition {
            validate_condition(&step.id, condition)?;
        }
    }

    Ok(())
}

fn validate_condition(step_id: &str, condition: &super::StepCondition) -> Result<(), ValidationError> {
    let has_tool = condition.tool.as_deref().is_some_and(|tool| !tool.is_empty());
    let has_from_step = condition.from_step.as_deref().is_some_and(|step| !step.is_empty());

    match (has_tool, has_from_step) {
        (false, false) => {
            return Err(ValidationError::ConditionWithoutSource {
                step_id: step_id.to_string(),
            });
        }
        (true, true) => {
            return Err(ValidationError::ConditionSourceConflict {
                step_id: step_id.to_string(),
            });
        }
        _ => {}
    }

    if condition.expect.is_none() && condition.expect_not.is_none() {
        return Err(ValidationError::ConditionWithoutExpectation {
            step_id: step_id.to_string(),
        });
    }

    for expectation in [condition.expect.as_ref(), condition.expect_not.as_ref()].into_iter().flatten() {
        if expectation.is_empty() {
            return Err(ValidationError::EmptyExpectation {
                step_id: step_id.to_string(),
            });
        }
    }

    Ok(())
}

/// Returns true when the identifier satisfies the entity-name rules shared by
/// workflow and argument names.
pub fn is_valid_entity_name(candidate: &str) -> bool {
    let pattern = Regex::new(NAME_PATTERN).expect("entity name pattern is valid");
    pattern.is_match(candidate)
}

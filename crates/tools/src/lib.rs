//! Uniform invocation contract for the scoring and lookup capabilities.
//!
//! Each capability implements [`Tool`] and is registered once at startup.
//! The registry validates every invocation's input and output against the
//! tool's declared Draft-7 schemas, so malformed calls never reach the
//! wrapped function and malformed results never reach the caller.

mod specs;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use specs::{
    KnowledgeLookupArgs, KnowledgeLookupReply, KnowledgeLookupTool, ScoreReworkArgs,
    ScoreReworkTool, UrgencyTool, KNOWLEDGE_LOOKUP_TOOL, SCORE_REWORK_TOOL, URGENCY_TOOL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    Input,
    Output,
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("invalid {side} for tool `{tool}`: field `{field}`: {message}")]
    Validation {
        tool: String,
        side: SchemaSide,
        field: String,
        message: String,
    },

    #[error("tool `{tool}` failed: {message}")]
    Invocation { tool: String, message: String },
}

#[derive(Debug, Error)]
#[error("tool `{0}` is already registered")]
pub struct DuplicateToolError(pub String);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateToolError),

    #[error("tool `{tool}` declares an invalid {side} schema: {message}")]
    InvalidSchema {
        tool: String,
        side: SchemaSide,
        message: String,
    },
}

/// A schema-validated, independently invocable capability. Implementations
/// hold no mutable state: identical input must yield identical output.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Value;
    fn call(&self, input: Value) -> Result<Value, ToolError>;
}

/// Discovery record for one registered tool: the wire contract the
/// orchestration agent programs against.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

struct RegisteredTool {
    spec: ToolSpec,
    input_validator: JSONSchema,
    output_validator: JSONSchema,
    tool: Arc<dyn Tool>,
}

/// The single boundary between the orchestration agent and the scoring
/// capabilities. Populated at startup, immutable afterwards; invocations
/// share no state so concurrent calls need no locking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, compiling both declared schemas. A name conflict
    /// fails with [`DuplicateToolError`] and leaves the first registration
    /// active.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(DuplicateToolError(name).into());
        }

        let spec = ToolSpec {
            name: name.clone(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
            output_schema: tool.output_schema(),
        };

        let input_validator = compile_schema(&name, SchemaSide::Input, &spec.input_schema)?;
        let output_validator = compile_schema(&name, SchemaSide::Output, &spec.output_schema)?;

        self.tools.insert(
            name,
            RegisteredTool {
                spec,
                input_validator,
                output_validator,
                tool,
            },
        );
        Ok(())
    }

    /// Validates `input`, dispatches to the wrapped function, validates its
    /// output. Wrapped-function errors surface as [`ToolError`] variants,
    /// never raw.
    pub fn invoke(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        check_schema(name, SchemaSide::Input, &registered.input_validator, &input)?;
        let output = registered.tool.call(input)?;
        check_schema(name, SchemaSide::Output, &registered.output_validator, &output)?;

        Ok(output)
    }

    pub fn list_tools(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

fn compile_schema(
    tool: &str,
    side: SchemaSide,
    schema: &Value,
) -> Result<JSONSchema, RegistryError> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|error| RegistryError::InvalidSchema {
            tool: tool.to_string(),
            side,
            message: error.to_string(),
        })
}

fn check_schema(
    tool: &str,
    side: SchemaSide,
    validator: &JSONSchema,
    value: &Value,
) -> Result<(), ToolError> {
    if let Err(mut errors) = validator.validate(value) {
        if let Some(first) = errors.next() {
            let pointer = first.instance_path.to_string();
            return Err(ToolError::Validation {
                tool: tool.to_string(),
                side,
                field: if pointer.is_empty() {
                    "<root>".to_string()
                } else {
                    pointer
                },
                message: first.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "echoes its message back"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"],
                "additionalProperties": false
            })
        }

        fn output_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }

        fn call(&self, input: Value) -> Result<Value, ToolError> {
            Ok(input)
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_fails_and_first_stays_active() {
        let mut registry = registry();
        let error = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(error, RegistryError::Duplicate(_)));
        assert!(registry.contains("echo"));
        assert_eq!(registry.list_tools().len(), 1);
    }

    #[test]
    fn invoke_validates_input_and_names_the_field() {
        let registry = registry();
        let error = registry
            .invoke("echo", json!({ "message": 7 }))
            .unwrap_err();

        match error {
            ToolError::Validation { side, field, .. } => {
                assert_eq!(side, SchemaSide::Input);
                assert_eq!(field, "/message");
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn unknown_tool_is_reported() {
        let error = registry().invoke("nope", json!({})).unwrap_err();
        assert!(matches!(error, ToolError::UnknownTool(_)));
    }

    #[test]
    fn invoke_is_idempotent_for_identical_input() {
        let registry = registry();
        let input = json!({ "message": "boiler room check" });
        let first = registry.invoke("echo", input.clone()).unwrap();
        let second = registry.invoke("echo", input).unwrap();
        assert_eq!(first, second);
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Tool Registry: a name-keyed table of tool handlers,
//! registered before any tool-capable agent executes and read-only
//! during execution.

use crate::error::{Error, Result};
use crate::model::ToolSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool handler: a function from an argument object to a JSON-shaped
/// result, or a handler-raised error message.
pub trait ToolHandler: Send + Sync {
    /// Invokes the handler. The result is an arbitrary JSON-shaped return
    /// value, or a handler-raised error captured as a message for the
    /// model loop (not a crate [`Error`]).
    fn call(&self, arguments: Value) -> std::result::Result<Value, String>;
}

impl<F> ToolHandler for F
where
    F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync,
{
    fn call(&self, arguments: Value) -> std::result::Result<Value, String> {
        self(arguments)
    }
}

/// Name-keyed table of tool handlers, each paired with the schema offered
/// to the model. Registered once before any tool-capable agent executes;
/// read-only thereafter.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, (ToolSchema, Arc<dyn ToolHandler>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `schema.name`, replacing any prior entry
    /// under the same name.
    pub fn register(mut self, schema: ToolSchema, handler: Arc<dyn ToolHandler>) -> Self {
        self.entries.insert(schema.name.clone(), (schema, handler));
        self
    }

    /// Invokes the named tool. Missing name is `tool_not_found`.
    pub fn invoke(&self, name: &str, arguments: Value) -> Result<std::result::Result<Value, String>> {
        let (_, handler) = self
            .entries
            .get(name)
            .ok_or_else(|| Error::tool_not_found(format!("tool '{name}' is not registered")))?;
        Ok(handler.call(arguments))
    }

    /// The schema list offered to the model for every registered tool.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.entries.values().map(|(schema, _)| schema.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoking_unregistered_tool_is_tool_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("search", json!({})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ToolNotFound);
    }

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: json!({ "type": "object" }),
        }
    }

    #[test]
    fn invoking_registered_tool_calls_handler() {
        let registry = ToolRegistry::new().register(
            schema("double"),
            Arc::new(|args: Value| {
                let n = args.get("n").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!({ "result": n * 2 }))
            }),
        );

        let result = registry.invoke("double", json!({ "n": 21 })).unwrap();
        assert_eq!(result.unwrap(), json!({ "result": 42 }));
        assert_eq!(registry.schemas().len(), 1);
    }

    #[test]
    fn handler_raised_error_is_surfaced_as_a_message() {
        let registry = ToolRegistry::new().register(
            schema("flaky"),
            Arc::new(|_args: Value| Err("handler exploded".to_string())),
        );

        let result = registry.invoke("flaky", json!({})).unwrap();
        assert_eq!(result.unwrap_err(), "handler exploded");
    }
}

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use luna_model::ModelTool;

use super::object::{ToolObject, ToolObjectImpl};
use super::{Arguments, FunctionTool, ParameterSchema, Tool, ToolResult};

/// Errors returned when registering a tool.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A tool with the same name is already registered.
    #[error("tool `{0}` is already registered")]
    Duplicate(String),
    /// The name is not 1 to 64 characters of `[A-Za-z0-9_-]`.
    #[error("invalid tool name `{0}`")]
    InvalidName(String),
}

/// The table of tools the model may call, in registration order.
///
/// The registry is filled once and then shared between agents through an
/// `Arc`, it is never mutated per conversation.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolObject>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.insert(Arc::new(ToolObjectImpl(tool)))
    }

    /// Registers a closure as a tool.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        parameters: ParameterSchema,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        self.register(FunctionTool::new(name, description, parameters, func))
    }

    fn insert(&mut self, tool: Arc<dyn ToolObject>) -> Result<(), RegistryError> {
        let name = tool.name();
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        if self.by_name.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_owned()));
        }
        debug!("registered tool: {name}");
        self.by_name.insert(name.to_owned(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Looks up a tool by name.
    #[inline]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolObject>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.tools[index]))
    }

    /// Returns the tool definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Returns the names of the registered tools.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn is_valid_name(name: &str) -> bool {
    (1..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde_json::json;

    use super::*;
    use crate::tool::ParamType;

    fn echo(registry: &mut ToolRegistry, name: &str) -> Result<(), RegistryError> {
        let parameters = ParameterSchema::builder()
            .required("text", ParamType::String)
            .build()
            .unwrap();
        registry.register_fn(name, "Echoes the text", parameters, |args| {
            ready(Ok(json!(args.get_str("text").unwrap_or_default())))
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        echo(&mut registry, "echo").unwrap();
        echo(&mut registry, "get-time_2").unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("foo").is_none());

        let definitions = registry.definitions();
        assert_eq!(definitions[0].name, "echo");
        assert_eq!(definitions[1].name, "get-time_2");
        assert_eq!(
            definitions[0].parameters["properties"]["text"]["description"],
            json!("Parameter: text")
        );
    }

    #[test]
    fn test_register_errors() {
        let mut registry = ToolRegistry::new();
        echo(&mut registry, "echo").unwrap();
        assert_eq!(
            echo(&mut registry, "echo"),
            Err(RegistryError::Duplicate("echo".to_owned()))
        );
        let too_long = "x".repeat(65);
        for name in ["", "has space", "dot.name", too_long.as_str()] {
            assert_eq!(
                echo(&mut registry, name),
                Err(RegistryError::InvalidName(name.to_owned()))
            );
        }
        assert!(echo(&mut registry, &"x".repeat(64)).is_ok());
    }

    #[tokio::test]
    async fn test_resolved_tool_runs() {
        let mut registry = ToolRegistry::new();
        echo(&mut registry, "echo").unwrap();
        let tool = registry.resolve("echo").unwrap();
        let args = serde_json::from_value(json!({"text": "hi"})).unwrap();
        assert_eq!(tool.execute(args).await, Ok(json!("hi")));
    }
}

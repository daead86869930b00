//! Built-in tools.

mod clock;

use luna_core::tool::{RegistryError, SchemaError, ToolRegistry};

pub use clock::{ClockInput, ClockTool};

/// An error raised while assembling the built-in tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolSetupError {
    /// A tool declares a schema that can't be described to the model.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A tool couldn't be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Creates a registry holding every built-in tool.
pub fn builtin_registry() -> Result<ToolRegistry, ToolSetupError> {
    let mut registry = ToolRegistry::new();
    registry.register(ClockTool::new()?)?;
    Ok(registry)
}

use std::future::ready;
use std::pin::Pin;

use luna_model::ModelTool;
use serde_json::Value;
use tracing::Instrument;

use super::{Arguments, Error, ParameterSchema, Tool, ToolResult};

/// A type-erased tool, as stored in a [`ToolRegistry`](super::ToolRegistry).
pub trait ToolObject: Send + Sync + 'static {
    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameters of the tool.
    fn parameters(&self) -> &ParameterSchema;

    /// Validates the arguments and starts the tool.
    fn execute(
        &self,
        arguments: Arguments,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;

    /// Returns the definition advertised to the model.
    fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters().to_json_schema(),
        }
    }
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameters(&self) -> &ParameterSchema {
        self.0.parameters()
    }

    fn execute(
        &self,
        arguments: Arguments,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        if let Err(err) = self.0.parameters().validate(&arguments) {
            return Box::pin(ready(Err(err)));
        }
        let input: T::Input =
            match serde_json::from_value(Value::Object(arguments.into_inner()))
            {
                Ok(input) => input,
                Err(err) => {
                    let reason = format!("{err}");
                    return Box::pin(ready(ToolResult::Err(
                        Error::invalid_input().with_reason(reason),
                    )));
                }
            };

        let span = debug_span!("tool execute", tool = self.0.name());
        Box::pin(self.0.execute(input).instrument(span))
    }
}

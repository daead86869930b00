use std::sync::Arc;

use luna_model::{ModelTool, ToolCallRequest};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::tool::{Arguments, Error, ToolRegistry};

/// An executor that handles tool call requests from the model.
///
/// Every failure is turned into text for the model, the executor itself
/// never fails.
#[derive(Clone, Debug, Default)]
pub struct Executor {
    registry: Arc<ToolRegistry>,
}

impl Executor {
    #[inline]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.registry.definitions()
    }

    /// Runs one tool call and returns the content of its tool message.
    pub async fn execute(&self, call: &ToolCallRequest) -> String {
        let span = debug_span!("tool executor", id = %call.id, name = %call.name);
        async move {
            let arguments = parse_arguments(&call.arguments);
            let Some(tool) = self.registry.resolve(&call.name) else {
                warn!("tool not found: {}", call.name);
                return format!("Unknown function: {}", call.name);
            };

            trace!("spawning a tool with args: {arguments:?}");
            // The tool runs on its own task so that a panic only fails the
            // call. The task is aborted if this future is dropped.
            let mut task = AbortOnDrop(tokio::spawn(async move {
                tool.execute(arguments).await
            }));
            let result = match (&mut task.0).await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    Err(Error::execution_error().with_reason("tool panicked"))
                }
                Err(_) => {
                    Err(Error::execution_error().with_reason("tool was cancelled"))
                }
            };

            match result {
                Ok(value) => render(value),
                Err(err) => {
                    warn!("tool failed: {err}");
                    format!("Error executing {}: {}", call.name, err.reason())
                }
            }
        }
        .instrument(span)
        .await
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Parses the raw arguments text into named arguments.
///
/// Empty text means no arguments. Malformed text or a value that isn't an
/// object falls back to no arguments as well.
fn parse_arguments(raw: &str) -> Arguments {
    if raw.trim().is_empty() {
        return Arguments::default();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Arguments::from(map),
        Ok(other) => {
            warn!("tool arguments are not an object: {other}");
            Arguments::default()
        }
        Err(err) => {
            warn!("malformed tool arguments ({err}): {raw}");
            Arguments::default()
        }
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

use std::future::ready;

use chrono::{Local, Utc};
use luna_core::tool::{ParameterSchema, SchemaError, Tool, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Input of [`ClockTool`].
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ClockInput {
    #[schemars(
        description = "Report the time in UTC instead of the local time zone, default to false."
    )]
    #[serde(default)]
    utc: Option<bool>,
}

/// A tool reporting the current date and time.
pub struct ClockTool {
    parameters: ParameterSchema,
}

impl ClockTool {
    /// Creates a new clock tool.
    #[inline]
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            parameters: ParameterSchema::for_input::<ClockInput>()?,
        })
    }
}

impl Tool for ClockTool {
    type Input = ClockInput;

    fn name(&self) -> &str {
        "get_current_in_local_time"
    }

    fn description(&self) -> &str {
        "Returns the current date and time, in the local time zone unless UTC is requested."
    }

    #[inline]
    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let time = if input.utc.unwrap_or(false) {
            Utc::now().format(TIME_FORMAT).to_string()
        } else {
            Local::now().format(TIME_FORMAT).to_string()
        };
        ready(Ok(json!({ "time": time })))
    }
}

//! Tool call supports.
//!
//! A tool is declared with a name, a description and a [`ParameterSchema`],
//! and registered into a [`ToolRegistry`] shared by the agents. The model
//! passes named arguments, which are validated against the schema before
//! the tool runs.

mod error;
mod executor;
mod object;
mod registry;
mod schema;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use error::{Error, ErrorKind};
pub(crate) use executor::Executor;
pub use object::ToolObject;
pub use registry::{RegistryError, ToolRegistry};
pub use schema::{
    ParamType, Parameter, ParameterSchema, ParameterSchemaBuilder, SchemaError,
};

/// The result of a tool call.
///
/// A string value is handed to the model verbatim, any other value is
/// serialized as JSON.
pub type ToolResult = Result<Value, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    ///
    /// It is deserialized from the named arguments after they pass the
    /// schema check.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameters of the tool.
    fn parameters(&self) -> &ParameterSchema;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// Named arguments passed by the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Returns the value of the argument `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the argument `name` if it is a string.
    #[inline]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns the argument `name` if it is an integer.
    #[inline]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Returns the argument `name` if it is a number.
    #[inline]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Returns the argument `name` if it is a boolean.
    #[inline]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Iterates over the arguments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the number of arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no arguments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    #[inline]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Arguments {
    #[inline]
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A tool backed by a closure receiving the raw [`Arguments`].
pub struct FunctionTool<F> {
    name: String,
    description: String,
    parameters: ParameterSchema,
    func: F,
}

impl<F, Fut> FunctionTool<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    /// Creates a new function tool.
    pub fn new<S1, S2>(
        name: S1,
        description: S2,
        parameters: ParameterSchema,
        func: F,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func,
        }
    }
}

impl<F, Fut> Tool for FunctionTool<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    type Input = Arguments;

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    #[inline]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        (self.func)(input)
    }
}

use std::collections::HashSet;
use std::fmt::{self, Display};

use schemars::JsonSchema;
use serde_json::{Map, Value, json};

use super::{Arguments, Error};

/// The type of a tool parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// A JSON string.
    String,
    /// A JSON number without fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// A JSON array whose items all have the given type.
    Array(Box<ParamType>),
    /// Any JSON object.
    Object,
}

impl ParamType {
    /// Shorthand for `ParamType::Array(Box::new(item))`.
    #[inline]
    pub fn array_of(item: ParamType) -> Self {
        Self::Array(Box::new(item))
    }

    fn to_json_schema(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Array(item) => {
                json!({"type": "array", "items": item.to_json_schema()})
            }
            ParamType::Object => json!({"type": "object"}),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array(item) => value
                .as_array()
                .is_some_and(|values| values.iter().all(|v| item.matches(v))),
            ParamType::Object => value.is_object(),
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Array(item) => write!(f, "array of {item}"),
            ParamType::Object => write!(f, "object"),
        }
    }
}

/// A named tool parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// The name the model passes the value under.
    pub name: String,
    /// The expected type.
    pub ty: ParamType,
    /// Whether the model must always pass the parameter.
    pub required: bool,
    /// What the parameter means, shown to the model.
    pub description: Option<String>,
}

impl Parameter {
    /// Creates a required parameter.
    #[inline]
    pub fn required<S: Into<String>>(name: S, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
        }
    }

    /// Creates an optional parameter.
    #[inline]
    pub fn optional<S: Into<String>>(name: S, ty: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    /// Sets the description.
    #[inline]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Errors detected while declaring a parameter schema.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A parameter has an empty name.
    #[error("parameter name must not be empty")]
    EmptyName,
    /// Two parameters share a name.
    #[error("duplicate parameter `{0}`")]
    DuplicateName(String),
    /// The input schema is not a JSON object schema.
    #[error("tool input must be an object schema")]
    NotAnObject,
    /// A parameter uses a construct that cannot be expressed.
    #[error("unsupported schema for parameter `{name}`: {reason}")]
    Unsupported {
        /// The offending parameter.
        name: String,
        /// What is not supported.
        reason: String,
    },
}

impl SchemaError {
    fn unsupported(name: &str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

/// The ordered list of parameters a tool accepts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParameterSchema {
    parameters: Vec<Parameter>,
}

impl ParameterSchema {
    /// Returns a builder to declare parameters one by one.
    #[inline]
    pub fn builder() -> ParameterSchemaBuilder {
        ParameterSchemaBuilder::default()
    }

    /// Returns a schema without parameters.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derives the schema from the `JsonSchema` implementation of a tool's
    /// input type.
    pub fn for_input<T: JsonSchema>() -> Result<Self, SchemaError> {
        let schema = schemars::schema_for!(T);
        Self::from_json_schema(schema.as_value())
    }

    /// Reads a JSON schema of `"type": "object"`.
    ///
    /// Each property becomes a parameter. A property is required when it is
    /// listed in `required`, is not nullable, and has no default.
    pub fn from_json_schema(schema: &Value) -> Result<Self, SchemaError> {
        let Some(root) = schema.as_object() else {
            return Err(SchemaError::NotAnObject);
        };
        if root.get("type").and_then(Value::as_str) != Some("object") {
            return Err(SchemaError::NotAnObject);
        }
        let required: HashSet<&str> = root
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut builder = Self::builder();
        let properties = root.get("properties").and_then(Value::as_object);
        for (name, property) in properties.into_iter().flatten() {
            let parsed = parse_property(name, property)?;
            let is_required = required.contains(name.as_str())
                && !parsed.nullable
                && !parsed.has_default;
            builder = builder.parameter(Parameter {
                name: name.clone(),
                ty: parsed.ty,
                required: is_required,
                description: parsed.description,
            });
        }
        builder.build()
    }

    /// Returns the parameters in declaration order.
    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Renders the schema advertised to the model.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = vec![];
        for param in &self.parameters {
            let mut property = param.ty.to_json_schema();
            let description = param
                .description
                .clone()
                .unwrap_or_else(|| format!("Parameter: {}", param.name));
            property["description"] = Value::String(description);
            properties.insert(param.name.clone(), property);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Checks named arguments against the schema.
    pub fn validate(&self, arguments: &Arguments) -> Result<(), Error> {
        for (name, _) in arguments.iter() {
            if !self.parameters.iter().any(|param| &param.name == name) {
                return Err(Error::invalid_input()
                    .with_reason(format!("unknown parameter `{name}`")));
            }
        }
        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) if !param.required => {}
                None => {
                    return Err(Error::invalid_input().with_reason(format!(
                        "missing required parameter `{}`",
                        param.name
                    )));
                }
                Some(value) if !param.ty.matches(value) => {
                    return Err(Error::invalid_input().with_reason(format!(
                        "parameter `{}` expects {}, got {value}",
                        param.name, param.ty
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Builder of [`ParameterSchema`].
#[derive(Debug, Default)]
pub struct ParameterSchemaBuilder {
    parameters: Vec<Parameter>,
}

impl ParameterSchemaBuilder {
    /// Appends a parameter.
    #[inline]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Appends a required parameter.
    #[inline]
    pub fn required<S: Into<String>>(self, name: S, ty: ParamType) -> Self {
        self.parameter(Parameter::required(name, ty))
    }

    /// Appends an optional parameter.
    #[inline]
    pub fn optional<S: Into<String>>(self, name: S, ty: ParamType) -> Self {
        self.parameter(Parameter::optional(name, ty))
    }

    /// Checks parameter names and builds the schema.
    pub fn build(self) -> Result<ParameterSchema, SchemaError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !seen.insert(param.name.as_str()) {
                return Err(SchemaError::DuplicateName(param.name.clone()));
            }
        }
        Ok(ParameterSchema {
            parameters: self.parameters,
        })
    }
}

struct ParsedProperty {
    ty: ParamType,
    nullable: bool,
    has_default: bool,
    description: Option<String>,
}

fn parse_property(
    name: &str,
    property: &Value,
) -> Result<ParsedProperty, SchemaError> {
    let Some(object) = property.as_object() else {
        return Err(SchemaError::unsupported(name, "schema is not an object"));
    };
    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let has_default = object.contains_key("default");

    for key in ["anyOf", "oneOf"] {
        let Some(variants) = object.get(key).and_then(Value::as_array) else {
            continue;
        };
        let (nulls, others): (Vec<&Value>, Vec<&Value>) =
            variants.iter().partition(|variant| is_null_schema(variant));
        if nulls.is_empty() || others.len() != 1 {
            return Err(SchemaError::unsupported(
                name,
                "unions other than `T | null` are not supported",
            ));
        }
        let inner = parse_property(name, others[0])?;
        return Ok(ParsedProperty {
            nullable: true,
            has_default: has_default || inner.has_default,
            description: description.or(inner.description),
            ty: inner.ty,
        });
    }

    let (ty, nullable) = parse_type(name, object)?;
    Ok(ParsedProperty {
        ty,
        nullable,
        has_default,
        description,
    })
}

fn parse_type(
    name: &str,
    object: &Map<String, Value>,
) -> Result<(ParamType, bool), SchemaError> {
    if object.contains_key("$ref") {
        return Err(SchemaError::unsupported(
            name,
            "references are not supported",
        ));
    }

    let (type_name, nullable) = match object.get("type") {
        Some(Value::String(type_name)) => (type_name.as_str(), false),
        Some(Value::Array(type_names)) => {
            let mut nullable = false;
            let mut others = vec![];
            for type_name in type_names {
                match type_name.as_str() {
                    Some("null") => nullable = true,
                    Some(type_name) => others.push(type_name),
                    None => {
                        return Err(SchemaError::unsupported(
                            name,
                            "type names must be strings",
                        ));
                    }
                }
            }
            if others.len() != 1 {
                return Err(SchemaError::unsupported(
                    name,
                    "unions other than `T | null` are not supported",
                ));
            }
            (others[0], nullable)
        }
        _ => return Err(SchemaError::unsupported(name, "missing type")),
    };

    let ty = match type_name {
        "string" => ParamType::String,
        "integer" => ParamType::Integer,
        "number" => ParamType::Number,
        "boolean" => ParamType::Boolean,
        "object" => ParamType::Object,
        "array" => {
            let Some(items) = object.get("items").and_then(Value::as_object)
            else {
                return Err(SchemaError::unsupported(
                    name,
                    "arrays need an item type",
                ));
            };
            let (item, _) = parse_type(name, items)?;
            ParamType::array_of(item)
        }
        other => {
            return Err(SchemaError::unsupported(
                name,
                format!("unknown type `{other}`"),
            ));
        }
    };
    Ok((ty, nullable))
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

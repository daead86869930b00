use std::env;
use std::fmt::{self, Debug};

use luna_core::DEFAULT_MAX_ROUNDS;
use luna_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// How answers are produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Text is forwarded to the sink as it is generated.
    #[default]
    Stream,
    /// The whole answer is forwarded once it is complete.
    Blocking,
}

/// Where answers are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputKind {
    /// Decorated output for an interactive terminal.
    #[default]
    Terminal,
    /// Undecorated text on stdout.
    Plain,
}

/// An error raised while reading the configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable holds a value that can't be used.
    #[error("invalid value {value:?} for {name}, expected {expected}")]
    Invalid {
        /// The variable.
        name: &'static str,
        /// The offending value.
        value: String,
        /// What the variable accepts.
        expected: &'static str,
    },
}

/// The shell configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// The API key of the provider.
    pub api_key: String,
    /// A custom base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// The model to use, the provider's default if unset.
    pub model: Option<String>,
    /// How answers are produced.
    pub mode: Mode,
    /// Where answers are written.
    pub output: OutputKind,
    /// How many model requests one prompt may issue.
    pub max_rounds: usize,
    /// Whether tool calls are announced in streamed answers.
    pub tool_notices: bool,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let mode = match get("LUNA_MODE") {
            None => Mode::default(),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "stream" => Mode::Stream,
                "blocking" => Mode::Blocking,
                _ => return Err(invalid("LUNA_MODE", value, "stream or blocking")),
            },
        };

        let output = match get("LUNA_OUTPUT") {
            None => OutputKind::default(),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "terminal" => OutputKind::Terminal,
                "plain" => OutputKind::Plain,
                _ => return Err(invalid("LUNA_OUTPUT", value, "terminal or plain")),
            },
        };

        let max_rounds = match get("LUNA_MAX_ROUNDS") {
            None => DEFAULT_MAX_ROUNDS,
            Some(value) => match value.parse::<usize>() {
                Ok(rounds) if rounds > 0 => rounds,
                _ => {
                    return Err(invalid(
                        "LUNA_MAX_ROUNDS",
                        value,
                        "a positive integer",
                    ));
                }
            },
        };

        let tool_notices = match get("LUNA_TOOL_NOTICES") {
            None => false,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(invalid(
                        "LUNA_TOOL_NOTICES",
                        value,
                        "1, true, yes, 0, false or no",
                    ));
                }
            },
        };

        Ok(Self {
            api_key,
            base_url: get("OPENAI_BASE_URL"),
            model: get("OPENAI_MODEL"),
            mode,
            output,
            max_rounds,
            tool_notices,
        })
    }

    /// Returns the configuration of the OpenAI-compatible provider.
    pub fn openai_config(&self) -> OpenAIConfig {
        let mut builder = OpenAIConfigBuilder::with_api_key(&self.api_key);
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        builder.build()
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("mode", &self.mode)
            .field("output", &self.output)
            .field("max_rounds", &self.max_rounds)
            .field("tool_notices", &self.tool_notices)
            .finish()
    }
}

#[inline]
fn invalid(name: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value,
        expected,
    }
}

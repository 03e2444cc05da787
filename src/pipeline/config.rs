use super::token::AssignKey;
use crate::error::{StepchainError, StepchainResult};
use crate::logger::{LogLevel, LogSink, TracingSink};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// When stateful steps have their `init` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum InitMode {
    /// Once, while the pipeline is assembled; the result is embedded in the chain
    #[default]
    AheadOfTime,
    /// On every invocation of the pipeline, from the declared options
    PerInvocation,
}

impl InitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitMode::AheadOfTime => "ahead-of-time",
            InitMode::PerInvocation => "per-invocation",
        }
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitMode {
    type Err = StepchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ahead-of-time" | "compile" => Ok(InitMode::AheadOfTime),
            "per-invocation" | "runtime" => Ok(InitMode::PerInvocation),
            other => Err(StepchainError::InvalidConfig(format!(
                "unknown init mode '{}', expected 'ahead-of-time' or 'per-invocation'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for InitMode {
    type Error = StepchainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Serializable part of [`BuilderConfig`]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuilderConfig {
    #[serde(default)]
    init_mode: InitMode,
    #[serde(default)]
    log_on_halt: Option<LogLevel>,
    #[serde(default)]
    copy_options_to_assign: Option<AssignKey>,
}

/// Assembly options for a compiled pipeline
#[derive(Clone)]
pub struct BuilderConfig {
    pub init_mode: InitMode,
    pub log_on_halt: Option<LogLevel>,
    pub copy_options_to_assign: Option<AssignKey>,
    pub sink: Arc<dyn LogSink>,
}

impl BuilderConfig {
    pub fn new() -> Self {
        Self {
            init_mode: InitMode::default(),
            log_on_halt: None,
            copy_options_to_assign: None,
            sink: Arc::new(TracingSink),
        }
    }

    /// Read `{init_mode, log_on_halt, copy_options_to_assign}` from JSON
    ///
    /// Unknown keys and unrecognized values fail with
    /// [`StepchainError::InvalidConfig`].
    pub fn from_value(value: Value) -> StepchainResult<Self> {
        let raw: RawBuilderConfig = serde_json::from_value(value)
            .map_err(|e| StepchainError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            init_mode: raw.init_mode,
            log_on_halt: raw.log_on_halt,
            copy_options_to_assign: raw.copy_options_to_assign,
            ..Self::new()
        })
    }

    pub fn init_mode(mut self, mode: InitMode) -> Self {
        self.init_mode = mode;
        self
    }

    pub fn log_on_halt(mut self, level: LogLevel) -> Self {
        self.log_on_halt = Some(level);
        self
    }

    /// Store the pipeline's invocation options under `key` before any step runs
    pub fn copy_options_to_assign(mut self, key: &str) -> StepchainResult<Self> {
        self.copy_options_to_assign = Some(AssignKey::parse(key)?);
        Ok(self)
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuilderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderConfig")
            .field("init_mode", &self.init_mode)
            .field("log_on_halt", &self.log_on_halt)
            .field("copy_options_to_assign", &self.copy_options_to_assign)
            .finish_non_exhaustive()
    }
}

/// Options for the runtime runner
#[derive(Clone)]
pub struct RunConfig {
    pub log_on_halt: Option<LogLevel>,
    /// Name of the containing unit, reported in halt records
    pub context: String,
    pub sink: Arc<dyn LogSink>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self {
            log_on_halt: None,
            context: "runtime".to_string(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn log_on_halt(mut self, level: LogLevel) -> Self {
        self.log_on_halt = Some(level);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("log_on_halt", &self.log_on_halt)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_mode_parsing() {
        assert_eq!("compile".parse::<InitMode>().unwrap(), InitMode::AheadOfTime);
        assert_eq!("runtime".parse::<InitMode>().unwrap(), InitMode::PerInvocation);
        assert_eq!(InitMode::default(), InitMode::AheadOfTime);
        assert!(matches!(
            "lazy".parse::<InitMode>(),
            Err(StepchainError::InvalidConfig(msg)) if msg.contains("lazy")
        ));
    }

    #[test]
    fn test_from_value() {
        let config = BuilderConfig::from_value(json!({
            "init_mode": "per-invocation",
            "log_on_halt": "debug",
            "copy_options_to_assign": "stack"
        }))
        .unwrap();

        assert_eq!(config.init_mode, InitMode::PerInvocation);
        assert_eq!(config.log_on_halt, Some(LogLevel::Debug));
        assert_eq!(config.copy_options_to_assign.unwrap().as_str(), "stack");
    }

    #[test]
    fn test_from_value_defaults() {
        let config = BuilderConfig::from_value(json!({})).unwrap();
        assert_eq!(config.init_mode, InitMode::AheadOfTime);
        assert!(config.log_on_halt.is_none());
        assert!(config.copy_options_to_assign.is_none());
    }

    #[test]
    fn test_from_value_rejects_bad_input() {
        for value in [
            json!({"init_mode": "eventually"}),
            json!({"log_on_halt": "loud"}),
            json!({"copy_options_to_assign": "not a key"}),
            json!({"retries": 3}),
        ] {
            assert!(
                matches!(BuilderConfig::from_value(value.clone()), Err(StepchainError::InvalidConfig(_))),
                "{} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_copy_options_key_validated() {
        assert!(BuilderConfig::new().copy_options_to_assign("stack").is_ok());
        assert!(matches!(
            BuilderConfig::new().copy_options_to_assign("1stack"),
            Err(StepchainError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new().log_on_halt(LogLevel::Warn).context("Router");
        assert_eq!(config.log_on_halt, Some(LogLevel::Warn));
        assert_eq!(config.context, "Router");
    }
}

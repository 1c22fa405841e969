//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, GlobalOverrides, RenderArgs, RunArgs, TerminalArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fencerun";
pub(crate) const DEFAULT_CACHE_PATH: &str = ".fencerun/results.json";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// JSON file holding cached run results.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Interpreter per lowercase language tag.
    pub interpreters: BTreeMap<String, InterpreterSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterSettings {
    pub command: String,
    pub args: Vec<String>,
    pub interactive_args: Vec<String>,
}

impl InterpreterSettings {
    fn new(command: &str, interactive_args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            interactive_args: interactive_args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Interpreters available without any configuration.
pub fn default_interpreters() -> BTreeMap<String, InterpreterSettings> {
    let mut interpreters = BTreeMap::new();
    interpreters.insert("sh".to_string(), InterpreterSettings::new("sh", &[]));
    interpreters.insert("bash".to_string(), InterpreterSettings::new("bash", &[]));
    interpreters.insert(
        "python".to_string(),
        InterpreterSettings::new("python3", &["-i"]),
    );
    for alias in ["node", "js", "javascript"] {
        interpreters.insert(alias.to_string(), InterpreterSettings::new("node", &[]));
    }
    interpreters
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FENCERUN").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    execution: RawExecutionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.cache_path.as_ref() {
            self.cache.path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            execution,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let execution = build_execution_settings(execution)?;

        Ok(Self {
            logging,
            cache,
            execution,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let path = cache
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid("cache.path", "path must not be empty"));
    }

    Ok(CacheSettings { path })
}

fn build_execution_settings(
    execution: RawExecutionSettings,
) -> Result<ExecutionSettings, LoadError> {
    let mut interpreters = default_interpreters();

    for (language, raw) in execution.interpreters {
        let language = language.trim().to_ascii_lowercase();
        if language.is_empty() {
            return Err(LoadError::invalid(
                "execution.interpreters",
                "language tag must not be empty",
            ));
        }

        let key = format!("execution.interpreters.{language}.command");
        let command = raw
            .command
            .map(|command| command.trim().to_string())
            .filter(|command| !command.is_empty())
            .ok_or_else(|| LoadError::invalid(key, "command must not be empty"))?;

        interpreters.insert(
            language,
            InterpreterSettings {
                command,
                args: raw.args,
                interactive_args: raw.interactive_args,
            },
        );
    }

    Ok(ExecutionSettings { interpreters })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExecutionSettings {
    interpreters: BTreeMap<String, RawInterpreterSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawInterpreterSettings {
    command: Option<String>,
    args: Vec<String>,
    interactive_args: Vec<String>,
}

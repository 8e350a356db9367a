//! Resolution of the workdir, preferences and tokens, remembering where
//! each value came from.
//!
//! ## Workdir Precedence (highest to lowest)
//!
//! 1. `--workdir` CLI flag
//! 2. `TRELLOSA_WORKDIR` environment variable
//! 3. `~/.trellosa`
//!
//! ## Token Precedence (highest to lowest)
//!
//! 1. `--trello-token` / `--bugzilla-token` CLI flags
//! 2. `TRELLOSA_TRELLO_TOKEN` / `TRELLOSA_BUGZILLA_TOKEN` environment variables
//! 3. state.kdl
//!
//! ## Config Precedence (highest to lowest)
//!
//! 1. `--board` / `--human`
//! 2. config.kdl
//! 3. compiled-in defaults

use std::path::{Path, PathBuf};

use crate::config::schema::{NoiseField, OutputFormat};
use crate::config::Workdir;
use crate::diff::NoiseFilter;
use crate::remote::TrackerFilter;
use crate::remote::bugzilla::{DEFAULT_BUGZILLA_URL, DEFAULT_COMPONENT, DEFAULT_PRODUCT};
use crate::remote::trello::{DEFAULT_BOARD_ID, TRELLO_API_BASE};
use crate::{Error, Result};

/// Environment variable overriding the working directory.
pub const WORKDIR_ENV: &str = "TRELLOSA_WORKDIR";

/// Environment variable overriding the board token.
pub const TRELLO_TOKEN_ENV: &str = "TRELLOSA_TRELLO_TOKEN";

/// Environment variable overriding the tracker API key.
pub const BUGZILLA_TOKEN_ENV: &str = "TRELLOSA_BUGZILLA_TOKEN";

/// Directory name under `$HOME` used when nothing else is configured.
pub const DEFAULT_WORKDIR_NAME: &str = ".trellosa";

/// Origin of a resolved value, shown by `trellosa setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    CliFlag,
    /// Named environment variable
    EnvVar(String),
    State,
    Config,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::State => write!(f, "state"),
            ValueSource::Config => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A value and where it came from.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Pick the first of CLI, env, file, default.
fn pick(
    cli: Option<&String>,
    env: Option<&str>,
    file: Option<&String>,
    file_source: ValueSource,
    default: Option<&str>,
) -> Option<Resolved<String>> {
    if let Some(value) = cli {
        return Some(Resolved::new(value.clone(), ValueSource::CliFlag));
    }
    if let Some(name) = env
        && let Some(value) = env_value(name)
    {
        return Some(Resolved::new(value, ValueSource::EnvVar(name.to_string())));
    }
    if let Some(value) = file {
        return Some(Resolved::new(value.clone(), file_source));
    }
    default.map(|d| Resolved::new(d.to_string(), ValueSource::Default))
}

/// Resolve the working directory. Does not create it.
pub fn resolve_workdir(cli: Option<&Path>) -> Result<Resolved<PathBuf>> {
    if let Some(path) = cli {
        return Ok(Resolved::new(path.to_path_buf(), ValueSource::CliFlag));
    }
    if let Some(path) = env_value(WORKDIR_ENV) {
        return Ok(Resolved::new(
            PathBuf::from(path),
            ValueSource::EnvVar(WORKDIR_ENV.to_string()),
        ));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Other("Cannot determine home directory".to_string()))?;
    Ok(Resolved::new(
        home.join(DEFAULT_WORKDIR_NAME),
        ValueSource::Default,
    ))
}

/// Effective preferences for one run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub board: Resolved<String>,
    pub trello_url: Resolved<String>,
    pub bugzilla_url: Resolved<String>,
    pub tracker_product: Resolved<String>,
    pub tracker_component: Resolved<String>,
    /// Noise denylist entries added on top of the built-in ones
    pub noise_fields: Vec<NoiseField>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let default = |v: &str| Resolved::new(v.to_string(), ValueSource::Default);
        Self {
            board: default(DEFAULT_BOARD_ID),
            trello_url: default(TRELLO_API_BASE),
            bugzilla_url: default(DEFAULT_BUGZILLA_URL),
            tracker_product: default(DEFAULT_PRODUCT),
            tracker_component: default(DEFAULT_COMPONENT),
            noise_fields: Vec::new(),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    /// Which tracker bugs belong to the board.
    pub fn tracker_filter(&self) -> TrackerFilter {
        TrackerFilter {
            product: self.tracker_product.value.clone(),
            component: self.tracker_component.value.clone(),
        }
    }

    /// Built-in noise filter extended with the configured fields.
    pub fn noise_filter(&self) -> NoiseFilter {
        let mut filter = NoiseFilter::default();
        for noise in &self.noise_fields {
            filter.deny(&noise.category, &noise.field);
        }
        filter
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// Preference flags given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub board: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(mut self, board: impl Into<String>) -> Self {
        self.board = Some(board.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Merge `overrides`, config.kdl and the defaults, first one set wins.
pub fn resolve_config(workdir: &Workdir, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let file = workdir.read_config()?;
    let mut result = ResolvedConfig::default();

    if let Some(board) = pick(
        overrides.board.as_ref(),
        None,
        file.board.as_ref(),
        ValueSource::Config,
        None,
    ) {
        result.board = board;
    }
    let from_file = [
        (&file.trello_url, &mut result.trello_url),
        (&file.bugzilla_url, &mut result.bugzilla_url),
        (&file.tracker_product, &mut result.tracker_product),
        (&file.tracker_component, &mut result.tracker_component),
    ];
    for (value, slot) in from_file {
        if let Some(value) = value {
            *slot = Resolved::new(value.clone(), ValueSource::Config);
        }
    }
    result.noise_fields = file.noise_fields;

    if let Some(format) = overrides.output_format {
        result.output_format = Resolved::new(format, ValueSource::CliFlag);
    } else if let Some(format) = file.output_format {
        result.output_format = Resolved::new(format, ValueSource::Config);
    }

    Ok(result)
}

/// CLI token overrides.
#[derive(Debug, Clone, Default)]
pub struct TokenOverrides {
    pub trello_token: Option<String>,
    pub bugzilla_token: Option<String>,
}

/// Effective tokens for one run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedState {
    pub trello_token: Option<Resolved<String>>,
    pub bugzilla_token: Option<Resolved<String>>,
    pub token_validated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ResolvedState {
    /// Board token, or `MissingToken` if none is configured.
    pub fn trello_token(&self) -> Result<&str> {
        self.trello_token
            .as_ref()
            .map(|r| r.value.as_str())
            .ok_or(Error::MissingToken("Trello"))
    }

    /// Tracker API key, or `MissingToken` if none is configured.
    pub fn bugzilla_token(&self) -> Result<&str> {
        self.bugzilla_token
            .as_ref()
            .map(|r| r.value.as_str())
            .ok_or(Error::MissingToken("Bugzilla"))
    }
}

/// Pick each token from `overrides`, then the environment, then state.kdl.
pub fn resolve_state(workdir: &Workdir, overrides: &TokenOverrides) -> Result<ResolvedState> {
    let file = workdir.read_state()?;
    Ok(ResolvedState {
        trello_token: pick(
            overrides.trello_token.as_ref(),
            Some(TRELLO_TOKEN_ENV),
            file.trello_token.as_ref(),
            ValueSource::State,
            None,
        ),
        bugzilla_token: pick(
            overrides.bugzilla_token.as_ref(),
            Some(BUGZILLA_TOKEN_ENV),
            file.bugzilla_token.as_ref(),
            ValueSource::State,
            None,
        ),
        token_validated_at: file.token_validated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrellosaConfig, TrellosaState};
    use crate::test_utils::TestEnv;
    use serial_test::serial;

    fn workdir(env: &TestEnv) -> Workdir {
        Workdir::open(env.path()).unwrap()
    }

    fn clear_env() {
        // SAFETY: We're in a test environment and this test should run serially
        unsafe {
            std::env::remove_var(WORKDIR_ENV);
            std::env::remove_var(TRELLO_TOKEN_ENV);
            std::env::remove_var(BUGZILLA_TOKEN_ENV);
        }
    }


    #[test]
    fn test_value_source_display() {
        assert_eq!(
            format!("{}", ValueSource::EnvVar("FOO".to_string())),
            "env:FOO"
        );
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::State), "state");
        assert_eq!(format!("{}", ValueSource::Config), "config");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    // ==================== Workdir Tests ====================

    #[test]
    #[serial]
    fn test_resolve_workdir_precedence() {
        clear_env();
        let cli = PathBuf::from("/tmp/from-cli");
        // SAFETY: We're in a test environment and this test should run serially
        unsafe { std::env::set_var(WORKDIR_ENV, "/tmp/from-env") };

        let resolved = resolve_workdir(Some(&cli)).unwrap();
        assert_eq!(resolved.value, cli);
        assert_eq!(resolved.source, ValueSource::CliFlag);

        let resolved = resolve_workdir(None).unwrap();
        assert_eq!(resolved.value, PathBuf::from("/tmp/from-env"));
        assert_eq!(resolved.source.to_string(), "env:TRELLOSA_WORKDIR");

        clear_env();
        let resolved = resolve_workdir(None).unwrap();
        assert!(resolved.value.ends_with(DEFAULT_WORKDIR_NAME));
        assert_eq!(resolved.source, ValueSource::Default);
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_resolve_config_defaults() {
        let env = TestEnv::new();
        let config = resolve_config(&workdir(&env), &ConfigOverrides::new()).unwrap();

        assert_eq!(config.board.value, DEFAULT_BOARD_ID);
        assert_eq!(config.board.source, ValueSource::Default);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.tracker_filter().product, DEFAULT_PRODUCT);
        assert_eq!(config.noise_filter(), NoiseFilter::default());
    }

    #[test]
    fn test_resolve_config_file_and_cli() {
        let env = TestEnv::new();
        let wd = workdir(&env);
        wd.write_config(&TrellosaConfig {
            board: Some("from-file".to_string()),
            tracker_component: Some("Security".to_string()),
            noise_fields: vec![NoiseField {
                category: "cards".to_string(),
                field: "pos".to_string(),
            }],
            output_format: Some(OutputFormat::Human),
            ..Default::default()
        })
        .unwrap();

        let config = resolve_config(&wd, &ConfigOverrides::new()).unwrap();
        assert_eq!(config.board.value, "from-file");
        assert_eq!(config.board.source, ValueSource::Config);
        assert_eq!(config.tracker_component.value, "Security");
        assert_eq!(config.tracker_product.source, ValueSource::Default);
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_ne!(config.noise_filter(), NoiseFilter::default());

        let overrides = ConfigOverrides::new()
            .with_board("from-cli")
            .with_output_format(OutputFormat::Json);
        let config = resolve_config(&wd, &overrides).unwrap();
        assert_eq!(config.board.value, "from-cli");
        assert_eq!(config.board.source, ValueSource::CliFlag);
        assert_eq!(config.output_format.source, ValueSource::CliFlag);
    }

    // ==================== State Tests ====================

    #[test]
    #[serial]
    fn test_resolve_state_precedence() {
        clear_env();
        let env = TestEnv::new();
        let wd = workdir(&env);
        wd.write_state(&TrellosaState {
            trello_token: Some("state-trello".to_string()),
            bugzilla_token: Some("state-bugzilla".to_string()),
            token_validated_at: None,
        })
        .unwrap();

        let state = resolve_state(&wd, &TokenOverrides::default()).unwrap();
        assert_eq!(state.trello_token().unwrap(), "state-trello");
        assert_eq!(
            state.bugzilla_token.as_ref().unwrap().source,
            ValueSource::State
        );

        // SAFETY: We're in a test environment and this test should run serially
        unsafe { std::env::set_var(TRELLO_TOKEN_ENV, "env-trello") };
        let state = resolve_state(&wd, &TokenOverrides::default()).unwrap();
        assert_eq!(state.trello_token().unwrap(), "env-trello");
        assert_eq!(
            state.trello_token.as_ref().unwrap().source.to_string(),
            "env:TRELLOSA_TRELLO_TOKEN"
        );

        let overrides = TokenOverrides {
            trello_token: Some("cli-trello".to_string()),
            bugzilla_token: None,
        };
        let state = resolve_state(&wd, &overrides).unwrap();
        assert_eq!(state.trello_token().unwrap(), "cli-trello");
        assert_eq!(state.bugzilla_token().unwrap(), "state-bugzilla");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_resolve_state_missing_token() {
        clear_env();
        let env = TestEnv::new();
        let state = resolve_state(&workdir(&env), &TokenOverrides::default()).unwrap();
        assert!(matches!(
            state.trello_token(),
            Err(Error::MissingToken("Trello"))
        ));
        assert!(state.bugzilla_token().is_err());
    }
}

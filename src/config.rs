use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::{Cli, CliCommand};
use crate::cluster::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::{Error, Result};
use crate::fetcher::{DEFAULT_API_URL, DEFAULT_GRAPHQL_URL};
use crate::github::comments::DEFAULT_BOT_LOGIN;

pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub bot_login: Option<String>,
    pub api_url: Option<String>,
    pub graphql_url: Option<String>,
    pub token_env: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_pause_ms: Option<u64>,
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bot_login: String,
    pub api_url: String,
    pub graphql_url: String,
    pub token_env: String,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub similarity_threshold: f64,
    pub state_dir: PathBuf,
}

impl Config {
    /// Load the config file (if any) and merge CLI flags over it.
    ///
    /// An explicit `--config` path must exist; the default location under the
    /// state directory is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match &cli.config {
            Some(path) => read_config(path)?,
            None => {
                let default_path = cli.state_dir.join("config.toml");
                if default_path.exists() {
                    read_config(&default_path)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let config = merge(file_config, cli);
        validate_threshold(config.similarity_threshold)?;
        if config.batch_size == 0 {
            return Err(Error::ConfigValidation("batch_size must be > 0".to_string()));
        }
        Ok(config)
    }

    /// Token read from the configured environment variable; empty counts as unset.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(size) = config.batch_size
        && size == 0
    {
        return Err(Error::ConfigValidation(
            "batch_size must be > 0".to_string(),
        ));
    }
    if let Some(threshold) = config.similarity_threshold {
        validate_threshold(threshold)?;
    }
    for (name, value) in [
        ("bot_login", &config.bot_login),
        ("token_env", &config.token_env),
    ] {
        if let Some(v) = value
            && v.trim().is_empty()
        {
            return Err(Error::ConfigValidation(format!("{name} must not be empty")));
        }
    }
    for (name, value) in [("api_url", &config.api_url), ("graphql_url", &config.graphql_url)] {
        if let Some(url) = value
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(Error::ConfigValidation(format!(
                "{name} must be an http(s) URL, got: {url}"
            )));
        }
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(Error::ConfigValidation(format!(
            "similarity_threshold must be in (0, 1], got {threshold}"
        )))
    }
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Config {
    let (cli_bot_login, cli_batch_size) = match &cli.command {
        CliCommand::Analyze {
            bot_login,
            batch_size,
            ..
        } => (bot_login.clone(), *batch_size),
        _ => (None, None),
    };

    Config {
        bot_login: cli_bot_login
            .or(file.bot_login)
            .unwrap_or_else(|| DEFAULT_BOT_LOGIN.to_string()),
        api_url: file
            .api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        graphql_url: file
            .graphql_url
            .unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
        token_env: file
            .token_env
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
        batch_size: cli_batch_size
            .or(file.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE),
        batch_pause: Duration::from_millis(file.batch_pause_ms.unwrap_or(DEFAULT_BATCH_PAUSE_MS)),
        similarity_threshold: cli
            .threshold
            .or(file.similarity_threshold)
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        state_dir: cli.state_dir.clone(),
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use ::config::{Config, Environment};
use serde::Deserialize;

use crate::error::ArchiveError;

const DEFAULT_DATA_PATH: &str = "data/links.json";
const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";
const DEFAULT_OUTPUT_DIR: &str = ".";

/// Process configuration, read from the environment only.
///
/// `DISCORD_BOT_TOKEN` and `TARGET_THREAD_ID` feed the extractor; the
/// `ARCHIVE_*` variables relocate the data file and generated output.
#[derive(Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    bot_token: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

pub struct DiscordCredentials {
    pub token: String,
    pub thread_id: String,
}

fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SCREENSHOT_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::build(None)
    }

    /// `vars` replaces the process environment when given.
    fn build(vars: Option<::config::Map<String, String>>) -> Result<Self> {
        let source = |prefix: &str| {
            Environment::with_prefix(prefix)
                .ignore_empty(true)
                .source(vars.clone())
        };
        Config::builder()
            .add_source(source("DISCORD"))
            .add_source(source("TARGET"))
            .add_source(source("ARCHIVE"))
            .build()
            .context("Failed to read environment configuration")?
            .try_deserialize()
            .context("Invalid environment configuration")
    }

    /// Both Discord variables, or the name of the first one missing.
    pub fn discord(&self) -> Result<DiscordCredentials, ArchiveError> {
        let token = self
            .bot_token
            .clone()
            .ok_or(ArchiveError::MissingEnv("DISCORD_BOT_TOKEN"))?;
        let thread_id = self
            .thread_id
            .clone()
            .ok_or(ArchiveError::MissingEnv("TARGET_THREAD_ID"))?;
        Ok(DiscordCredentials { token, thread_id })
    }

    #[cfg(test)]
    pub fn for_paths(data_path: PathBuf, screenshot_dir: PathBuf, output_dir: PathBuf) -> Self {
        Settings {
            bot_token: None,
            thread_id: None,
            data_path,
            screenshot_dir,
            output_dir,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join("index.html")
    }

    pub fn tags_page_path(&self) -> PathBuf {
        self.output_dir.join("tags.html")
    }
}

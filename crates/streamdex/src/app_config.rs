//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." - every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Env vars (`SDX_*`, nested with `__`) and an optional TOML file.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::BackendConfig;
use crate::config::HandlerConfig;

/// 📦 Everything the CLI needs: how to build actions, where to send them,
/// and what to do with records that won't cooperate.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub handler: HandlerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub record_errors: RecordErrorMode,
}

/// ⚖️ `Abort` fails the batch on the first bad record. `Skip` logs it and carries on.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorMode {
    #[default]
    Abort,
    Skip,
}

/// 🚀 Load the config from env vars, plus a TOML file when one is given.
///
/// 📐 No file means env vars only. With a file, the TOML wins on conflicts.
///
/// 💀 Returns an error if the merged config doesn't parse. The message says which sources were involved.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SDX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SDX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SDX_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::NODE_DIFFER;
use crate::normalize::NormalizeOptions;

static APP_NAME: &str = "fixture-normalizer";
pub const CONFIG_FILE: &str = "fixture-normalizer.toml";
pub const ENV_PREFIX: &str = "FIXTURE_NORMALIZER_";

/// Settings layered as defaults < TOML file < `FIXTURE_NORMALIZER_*` env < CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// `DiffType` tags whose package maps are keyed by layer path.
    #[serde(default = "default_diff_types")]
    pub diff_types: Vec<String>,
    #[serde(default = "default_indent")]
    pub indent: usize,
    #[serde(default)]
    pub trailing_newline: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            diff_types: default_diff_types(),
            indent: default_indent(),
            trailing_newline: false,
        }
    }
}

fn default_diff_types() -> Vec<String> {
    vec![NODE_DIFFER.to_string()]
}

fn default_indent() -> usize {
    4
}

impl NormalizerConfig {
    pub fn load(explicit_path: Option<&Utf8Path>) -> Result<Self> {
        Self::figment(explicit_path)?
            .extract()
            .context("failed to load fixture-normalizer configuration")
    }

    pub fn figment(explicit_path: Option<&Utf8Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = explicit_path {
            if !path.is_file() {
                bail!("config file {path} does not exist");
            }
            figment = figment.merge(Toml::file(path));
        } else if let Some(path) = resolve_default_config_path() {
            debug!(%path, "using discovered config file");
            figment = figment.merge(Toml::file(path));
        } else {
            debug!("no config file found; relying on defaults + env overrides");
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn options(&self) -> NormalizeOptions {
        NormalizeOptions {
            diff_types: self.diff_types.clone(),
            indent: self.indent,
            trailing_newline: self.trailing_newline,
        }
    }
}

fn resolve_default_config_path() -> Option<Utf8PathBuf> {
    let local = Utf8PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    if let Some(dirs) = ProjectDirs::from("dev", "ContainerTools", APP_NAME)
        && let Ok(path) = Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.toml"))
        && path.exists()
    {
        return Some(path);
    }

    None
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WizardError};
use crate::types::ExecutionMode;

/// Top-level wizrun configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WizrunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Extra subtype registries, consulted after the built-in ones.
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run wizards interactively by default.
    #[serde(default)]
    pub interactive: bool,
    /// Base directory for relative wizard references.
    #[serde(default)]
    pub wizard_dir: Option<String>,
}

impl EngineConfig {
    pub fn default_mode(&self) -> ExecutionMode {
        ExecutionMode::from_batch_flag(!self.interactive)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// A user-declared subtype registry: kind → direct parent kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub name: String,
    pub root: String,
    #[serde(default)]
    pub kinds: HashMap<String, Vec<String>>,
}

impl WizrunConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WizardError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| WizardError::Config(e.to_string()))
    }

    /// Resolve the wizard directory (expand ~). Defaults to the current directory.
    pub fn wizard_dir(&self) -> PathBuf {
        let Some(dir) = self.engine.wizard_dir.as_deref() else {
            return PathBuf::from(".");
        };
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

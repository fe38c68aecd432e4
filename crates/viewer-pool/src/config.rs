//! Pool configuration: JSON file, environment overrides, validation.
//!
//! The core never caches these values. Every operation reads a fresh
//! snapshot from [`SharedConfig`], so an update applies on the next call.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::directory::EntityState;
use crate::error::ConfigError;
use crate::ingest::PermissionLevel;
use crate::pool::SelectionPolicy;

const ENV_PREFIX: &str = "VIEWER_POOL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamesConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("predefined_names.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 0 means unlimited.
    pub max_pool_size: usize,
    pub selection: SelectionPolicy,
    /// 0 disables the cooldown.
    pub cooldown_seconds: u64,
    pub overwrite_idle_on_empty: bool,
    pub excluded_states: Vec<EntityState>,
    pub immediate_spawn: bool,
    pub sweep_interval_ms: u64,
    pub command_prefix: String,
    pub visit_command: String,
    pub visit_permission: PermissionLevel,
    pub predefined_names: NamesConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 300,
            selection: SelectionPolicy::Random,
            cooldown_seconds: 60,
            overwrite_idle_on_empty: false,
            excluded_states: vec![
                EntityState::new("leaving"),
                EntityState::new("incapacitated"),
            ],
            immediate_spawn: false,
            sweep_interval_ms: 5000,
            command_prefix: "!".to_string(),
            visit_command: "visit".to_string(),
            visit_permission: PermissionLevel::Everyone,
            predefined_names: NamesConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Load from a JSON file, apply `VIEWER_POOL_*` overrides, validate.
    ///
    /// Warnings are logged; errors fail the load.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: PoolConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_env_overrides();
        config.checked()
    }

    /// Defaults plus `VIEWER_POOL_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.checked()
    }

    fn checked(self) -> Result<Self, ConfigError> {
        let report = self.validate();
        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "Configuration warning");
        }
        if report.has_errors() {
            return Err(ConfigError::Invalid(report));
        }
        Ok(self)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which is handed full variable names.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value.trim().to_string()))
        };

        if let Some((key, value)) = get("MAX_POOL_SIZE") {
            parse_into(&key, &value, &mut self.max_pool_size);
        }
        if let Some((key, value)) = get("SELECTION") {
            match value.to_lowercase().as_str() {
                "random" => self.selection = SelectionPolicy::Random,
                "fifo" => self.selection = SelectionPolicy::Fifo,
                _ => tracing::warn!(key = %key, value = %value, "Ignoring unknown selection policy"),
            }
        }
        if let Some((key, value)) = get("COOLDOWN_SECONDS") {
            parse_into(&key, &value, &mut self.cooldown_seconds);
        }
        if let Some((key, value)) = get("OVERWRITE_IDLE_ON_EMPTY") {
            parse_bool_into(&key, &value, &mut self.overwrite_idle_on_empty);
        }
        if let Some((key, value)) = get("IMMEDIATE_SPAWN") {
            parse_bool_into(&key, &value, &mut self.immediate_spawn);
        }
        if let Some((key, value)) = get("SWEEP_INTERVAL_MS") {
            parse_into(&key, &value, &mut self.sweep_interval_ms);
        }
        if let Some((_, value)) = get("COMMAND_PREFIX") {
            self.command_prefix = value;
        }
        if let Some((_, value)) = get("VISIT_COMMAND") {
            self.visit_command = value;
        }
        if let Some((key, value)) = get("VISIT_PERMISSION") {
            match value.to_lowercase().as_str() {
                "everyone" => self.visit_permission = PermissionLevel::Everyone,
                "subscriber" => self.visit_permission = PermissionLevel::Subscriber,
                "vip" => self.visit_permission = PermissionLevel::Vip,
                "moderator" => self.visit_permission = PermissionLevel::Moderator,
                "broadcaster" => self.visit_permission = PermissionLevel::Broadcaster,
                _ => tracing::warn!(key = %key, value = %value, "Ignoring unknown permission level"),
            }
        }
        if let Some((_, value)) = get("EXCLUDED_STATES") {
            self.excluded_states = value
                .split(',')
                .map(str::trim)
                .filter(|state| !state.is_empty())
                .map(EntityState::new)
                .collect();
        }
        if let Some((key, value)) = get("NAMES_ENABLED") {
            parse_bool_into(&key, &value, &mut self.predefined_names.enabled);
        }
        if let Some((_, value)) = get("NAMES_PATH") {
            self.predefined_names.path = PathBuf::from(value);
        }
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        // Chat text is trimmed before matching, so whitespace never matches.
        if self.command_prefix.trim().is_empty() {
            report.error("command_prefix must not be empty or whitespace");
        } else if self.command_prefix.chars().count() > 1 {
            report.warn(format!(
                "command_prefix {:?} is longer than one character",
                self.command_prefix
            ));
        }

        let command = self.visit_command.trim();
        if command.is_empty() {
            report.error("visit_command must not be empty");
        } else if !command.chars().all(char::is_alphanumeric) {
            report.warn(format!(
                "visit_command {:?} contains non-alphanumeric characters",
                self.visit_command
            ));
        }

        if self.sweep_interval_ms == 0 {
            report.error("sweep_interval_ms must be greater than zero");
        }

        let names = &self.predefined_names;
        if names.enabled {
            if names.path.as_os_str().is_empty() {
                report.error("predefined_names.path must be set when the fallback is enabled");
            } else if !names.path.exists() {
                report.warn(format!(
                    "predefined names file {} does not exist and will be created",
                    names.path.display()
                ));
            }
        }

        report
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(key = %key, value = %value, "Ignoring unparseable override"),
    }
}

fn parse_bool_into(key: &str, value: &str, slot: &mut bool) {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *slot = true,
        "0" | "false" | "no" | "off" => *slot = false,
        _ => tracing::warn!(key = %key, value = %value, "Ignoring unparseable override"),
    }
}

/// Outcome of [`PoolConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// One line: counts, then the errors.
    pub fn summary(&self) -> String {
        let counts = format!(
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        );
        if self.errors.is_empty() {
            counts
        } else {
            format!("{counts}: {}", self.errors.join("; "))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("configuration ok");
        }
        for error in &self.errors {
            writeln!(f, "error: {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        Ok(())
    }
}

/// Shared, updatable configuration handle.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<PoolConfig>>);

impl SharedConfig {
    pub fn new(config: PoolConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn snapshot(&self) -> PoolConfig {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut PoolConfig)) {
        let mut config = self.0.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut config);
    }
}

impl From<PoolConfig> for SharedConfig {
    fn from(config: PoolConfig) -> Self {
        Self::new(config)
    }
}

//! # ModelVault Configuration Module
//!
//! This module provides configuration management for ModelVault, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! Unlike a process-wide singleton, a [`Config`] is loaded once by the host
//! application and handed to the components that need it.
//!
//! ## Usage
//!
//! ```no_run
//! use mvconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! let level = config.get_log_level()?;
//! config.set_log_level("debug".to_string())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Each component crate adds its own getters through an extension trait
//! (`CatalogConfigExt`, `StoreConfigExt`, ...), built on the generic
//! [`Config::get_usize`], [`Config::get_bool`] and [`Config::get_string`].

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("modelvault.yaml");

const ENV_CONFIG_DIR: &str = "MODELVAULT_CONFIG";
const ENV_PREFIX: &str = "MODELVAULT_CONFIG__";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SLOT_LIMIT_MB: usize = 100;

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            Ok(self.get_string($path, $default))
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager for ModelVault
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.lock_data().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".modelvault").exists() {
            return ".modelvault".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".modelvault");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".modelvault".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `MODELVAULT_CONFIG` environment variable
    /// 3. `.modelvault` in the current directory
    /// 4. `.modelvault` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Returns the directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, Value> {
        // Une valeur YAML ne peut pas être laissée dans un état incohérent
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.lock_data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["catalog", "base_url"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock_data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        Self::get_value_internal(&self.lock_data(), path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                if let Some(next) = map.get(&Value::String(key.to_lowercase())) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads a non-negative integer, falling back to `default` when absent or mistyped
    pub fn get_usize(&self, path: &[&str], default: usize) -> usize {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid integer '{}' at {}, using {}", s, path.join("."), default);
                default
            }),
            _ => default,
        }
    }

    pub fn set_usize(&self, path: &[&str], value: usize) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value as u64)))
    }

    /// Reads a boolean, falling back to `default` when absent or mistyped
    pub fn get_bool(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            _ => default,
        }
    }

    pub fn set_bool(&self, path: &[&str], value: bool) -> Result<()> {
        self.set_value(path, Value::Bool(value))
    }

    /// Reads a string, falling back to `default` when absent or mistyped
    pub fn get_string(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Null) | Err(_) => default.to_string(),
            Ok(other) => serde_yaml::to_string(&other)
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| default.to_string()),
        }
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Résout un chemin de fichier géré par la configuration
    ///
    /// Le chemin peut être absolu ou relatif au répertoire de configuration.
    /// Le répertoire parent est créé s'il n'existe pas.
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin dans l'arbre de configuration (ex: `&["store", "path"]`)
    /// * `default` - Nom de fichier par défaut si non configuré
    pub fn get_managed_file(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let file_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_value(path, Value::String(default.to_string()))?;
                default.to_string()
            }
        };

        let candidate = Path::new(&file_path);
        let absolute_path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(candidate)
        };

        if let Some(parent) = absolute_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(directory=%parent.display(), "Created data directory");
            }
        }

        Ok(absolute_path)
    }

    impl_string_config!(
        get_log_level,
        set_log_level,
        &["log", "level"],
        DEFAULT_LOG_LEVEL
    );

    /// Taille maximale (en Mo) acceptée pour un emplacement binaire
    ///
    /// Ces limites sont appliquées par la couche de validation, pas par le moteur
    /// de synchronisation ; elles sont exposées ici pour que l'hôte les transmette.
    pub fn get_slot_limit_mb(&self, slot: &str) -> usize {
        let key = format!("{slot}_mb");
        self.get_usize(&["limits", &key], DEFAULT_SLOT_LIMIT_MB)
    }

    pub fn set_slot_limit_mb(&self, slot: &str, size: usize) -> Result<()> {
        let key = format!("{slot}_mb");
        self.set_usize(&["limits", &key], size)
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

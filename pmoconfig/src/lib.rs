//! # PMOMusic Configuration Module
//!
//! This module provides configuration management for the PMOMusic streaming
//! layer, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//!
//! let delay = config.get_status_update_delay_seconds()?;
//! let airplay = config.get_airplay_enabled()?;
//!
//! config.set_status_update_delay_seconds(5)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmomusic.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOMusic configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOMUSIC_CONFIG";
const ENV_PREFIX: &str = "PMOMUSIC_CONFIG__";

// Default values for configuration
const DEFAULT_STATUS_UPDATE_DELAY_SECONDS: i64 = 3;
const DEFAULT_UPNP_ENABLED: bool = true;
const DEFAULT_AIRPLAY_ENABLED: bool = true;
const DEFAULT_AIRPLAY_SOCKET_TIMEOUT_SECONDS: usize = 10;
const DEFAULT_AIRPLAY_WORKER_POOL_SIZE: usize = 4;
const DEFAULT_UPNP_HTTP_TIMEOUT_SECONDS: usize = 10;
const DEFAULT_UPNP_WORKER_POOL_SIZE: usize = 4;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value_or_null($path)? {
                Value::Number(n) => match n.as_u64() {
                    Some(v) => Ok(v as usize),
                    None => Ok($default),
                },
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for signed values with default
macro_rules! impl_i64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<i64> {
            match self.get_value_or_null($path)? {
                Value::Number(n) => match n.as_i64() {
                    Some(v) => Ok(v),
                    None => Ok($default),
                },
                Value::String(s) => Ok(s.trim().parse::<i64>().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: i64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value_or_null($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for PMOMusic
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let delay = config.get_status_update_delay_seconds()?;
/// println!("Status polling every {}s", delay);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.lock_data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
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
        if Path::new(".pmomusic").exists() {
            return ".pmomusic".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".pmomusic");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".pmomusic".to_string()
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
    /// 2. The `PMOMUSIC_CONFIG` environment variable
    /// 3. `.pmomusic` in the current directory
    /// 4. `.pmomusic` in the user's home directory
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

        // An empty file parses as Null and leaves the defaults untouched
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        if !external_value.is_null() {
            merge_yaml(&mut default_value, &external_value);
        }
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

    fn lock_data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory the configuration was loaded from.
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = {
            let data = self.lock_data();
            serde_yaml::to_string(&*data)?
        };
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path
    ///   (e.g., `&["streaming", "airplay", "enabled"]`)
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
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
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
        let data = self.lock_data();
        Self::get_value_internal(&data, path)
    }

    /// Like [`Config::get_value`], but a missing path yields `Value::Null` so
    /// typed getters can fall back on their default.
    fn get_value_or_null(&self, path: &[&str]) -> Result<Value> {
        match self.get_value(path) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(path = %path.join("."), error = %err, "Using default configuration value");
                Ok(Value::Null)
            }
        }
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
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

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, error = %err, "Ignoring configuration override");
                }
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
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        new_map.insert(new_key, Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    impl_i64_config!(
        get_status_update_delay_seconds,
        set_status_update_delay_seconds,
        &["streaming", "status_update_delay_seconds"],
        DEFAULT_STATUS_UPDATE_DELAY_SECONDS
    );

    impl_bool_config!(
        get_upnp_enabled,
        set_upnp_enabled,
        &["streaming", "upnp", "enabled"],
        DEFAULT_UPNP_ENABLED
    );

    impl_usize_config!(
        get_upnp_http_timeout_seconds,
        set_upnp_http_timeout_seconds,
        &["streaming", "upnp", "http_timeout_seconds"],
        DEFAULT_UPNP_HTTP_TIMEOUT_SECONDS
    );

    impl_usize_config!(
        get_upnp_worker_pool_size,
        set_upnp_worker_pool_size,
        &["streaming", "upnp", "worker_pool_size"],
        DEFAULT_UPNP_WORKER_POOL_SIZE
    );

    impl_bool_config!(
        get_airplay_enabled,
        set_airplay_enabled,
        &["streaming", "airplay", "enabled"],
        DEFAULT_AIRPLAY_ENABLED
    );

    impl_usize_config!(
        get_airplay_socket_timeout_seconds,
        set_airplay_socket_timeout_seconds,
        &["streaming", "airplay", "socket_timeout_seconds"],
        DEFAULT_AIRPLAY_SOCKET_TIMEOUT_SECONDS
    );

    impl_usize_config!(
        get_airplay_worker_pool_size,
        set_airplay_worker_pool_size,
        &["streaming", "airplay", "worker_pool_size"],
        DEFAULT_AIRPLAY_WORKER_POOL_SIZE
    );
}

/// Returns the global configuration instance
///
/// The instance is lazily loaded on first access.
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let enabled = config.get_upnp_enabled()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
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

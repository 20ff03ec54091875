use std::path::PathBuf;
use std::sync::Arc;
use std::{fs, time::Duration};

use common::prelude::{ChatConfig, Context, FileLocalStore, FsStore, Identity, StaticAuth};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "cipherchat";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOCAL_DIR_NAME: &str = "local";
pub const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stable id of the profile's identity
    pub uid: String,
    /// Display label, e.g. an email address
    pub label: String,
    /// Root of the shared document store
    pub store_path: PathBuf,
    /// How often subscriptions poll the shared store
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Default log level, overridable with RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write a daily rolling log file into `<profile>/logs`
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl AppConfig {
    pub fn new(uid: String, label: String, store_path: PathBuf) -> Self {
        Self {
            uid,
            label,
            store_path,
            poll_interval_ms: default_poll_interval_ms(),
            log_level: default_log_level(),
            log_to_file: false,
            chat: ChatConfig::default(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.uid.clone(), self.label.clone())
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the profile directory (~/.cipherchat)
    pub profile_dir: PathBuf,
    /// Path to the device-local key store
    pub local_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the profile directory path (custom or default ~/.cipherchat)
    pub fn profile_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new profile directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let profile_dir = Self::profile_dir(custom_path)?;

        if profile_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&profile_dir)?;

        let local_path = profile_dir.join(LOCAL_DIR_NAME);
        fs::create_dir_all(&local_path)?;

        let config_path = profile_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            profile_dir,
            local_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the profile directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let profile_dir = Self::profile_dir(custom_path)?;

        if !profile_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let local_path = profile_dir.join(LOCAL_DIR_NAME);
        let config_path = profile_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !local_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", LOCAL_DIR_NAME)));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            profile_dir,
            local_path,
            config_path,
            config,
        })
    }

    pub fn logs_path(&self) -> Option<PathBuf> {
        self.config
            .log_to_file
            .then(|| self.profile_dir.join(LOGS_DIR_NAME))
    }

    /// Wire the profile up to the shared store as a signed-in context
    pub async fn context(&self) -> Result<Arc<Context<FsStore>>, StateError> {
        let store = FsStore::open(&self.config.store_path)
            .await
            .map_err(|e| StateError::Store(e.to_string()))?
            .with_poll_interval(Duration::from_millis(self.config.poll_interval_ms));
        let local = FileLocalStore::open(&self.local_path)
            .map_err(|e| StateError::Store(e.to_string()))?;
        let auth = StaticAuth::new(Some(self.config.identity()));

        Ok(Arc::new(Context::new(
            store,
            Arc::new(local),
            Arc::new(auth),
            self.config.chat.clone(),
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to determine home directory")]
    NoHomeDirectory,

    #[error("profile already initialized")]
    AlreadyInitialized,

    #[error("profile not initialized. Run 'cipherchat init' first")]
    NotInitialized,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let temp = TempDir::new().unwrap();
        let profile = temp.path().join("profile");
        let config = AppConfig::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            temp.path().join("shared"),
        );

        let state = AppState::init(Some(profile.clone()), config).unwrap();
        assert!(state.local_path.exists());
        assert!(matches!(
            AppState::init(Some(profile.clone()), state.config.clone()),
            Err(StateError::AlreadyInitialized)
        ));

        let loaded = AppState::load(Some(profile)).unwrap();
        assert_eq!(loaded.config.uid, "alice");
        assert_eq!(loaded.config.poll_interval_ms, 500);
        assert!(loaded.config.chat.encryption_enabled);
        assert!(loaded.logs_path().is_none());
    }

    #[test]
    fn test_load_missing_profile() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("nope"))),
            Err(StateError::NotInitialized)
        ));
    }
}

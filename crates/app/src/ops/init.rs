use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Stable id of the identity this profile signs in as
    #[arg(long)]
    pub uid: String,

    /// Display label (defaults to the uid)
    #[arg(long)]
    pub label: Option<String>,

    /// Shared store directory all participants point at
    #[arg(long)]
    pub store: PathBuf,

    /// Send every message in plain text
    #[arg(long)]
    pub no_encryption: bool,

    /// Also write logs to <profile>/logs
    #[arg(long)]
    pub log_to_file: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::new(
            self.uid.clone(),
            self.label.clone().unwrap_or_else(|| self.uid.clone()),
            self.store.clone(),
        );
        config.chat.encryption_enabled = !self.no_encryption;
        config.log_to_file = self.log_to_file;

        let state = AppState::init(ctx.config_path.clone(), config)?;

        let output = format!(
            "Initialized cipherchat profile at: {}\n\
             - Identity: {}\n\
             - Local keys: {}\n\
             - Shared store: {}\n\
             - Config: {}\n\
             - Encryption: {}",
            state.profile_dir.display(),
            state.config.identity(),
            state.local_path.display(),
            state.config.store_path.display(),
            state.config_path.display(),
            if state.config.chat.encryption_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(output)
    }
}

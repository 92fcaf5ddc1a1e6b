use crate::infrastructure::config::{
    ensure_default_configs, load_app_config, load_generation_config, AppConfig, GenerationConfig,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub database_path: PathBuf,
    pub app_config: AppConfig,
    pub generation_config: GenerationConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("tracker.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let app_config = load_app_config(&config_dir)?;
    let generation_config = load_generation_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        database_path,
        app_config,
        generation_config,
    })
}

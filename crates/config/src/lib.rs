//! Configuration loading, environment overrides, and persistence.
//!
//! Config file: `~/.agents/config.json` (or `SKILLS_CONFIG_PATH`).
//! `.toml` and `.yaml` files are accepted too, chosen by extension.
//!
//! Priority: environment variables > config file > defaults.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{
        AGENTS_DIR, CONFIG_FILE, LOCK_FILE, agents_dir, apply_env_overrides,
        apply_env_overrides_with, config_path, config_path_with, default_agents, default_config,
        home_dir, is_telemetry_enabled, load, load_config, read_config, save_config,
        set_default_agents, skill_lock_path, update_config,
    },
    schema::{
        CURRENT_CONFIG_VERSION, PlatformConfig, PlatformEndpoint, PrivateRepoConfig,
        RegistryConfig, SkillsConfig, TelemetryConfig,
    },
};

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    schema::SkillsConfig,
};

/// Directory under `$HOME` holding config, lock file and canonical skills.
pub const AGENTS_DIR: &str = ".agents";
pub const CONFIG_FILE: &str = "config.json";
pub const LOCK_FILE: &str = ".skill-lock.json";

const ENV_CONFIG_PATH: &str = "SKILLS_CONFIG_PATH";
const ENV_LOCK_PATH: &str = "SKILLS_LOCK_PATH";
const ENV_PLATFORM_URL: &str = "SKILLS_PLATFORM_URL";
const ENV_TELEMETRY_ENDPOINT: &str = "SKILLS_TELEMETRY_ENDPOINT";
const ENV_SEARCH_ENDPOINT: &str = "SKILLS_SEARCH_ENDPOINT";
const ENV_CHECK_UPDATES_ENDPOINT: &str = "SKILLS_CHECK_UPDATES_ENDPOINT";
const ENV_DEFAULT_AGENTS: &str = "SKILLS_DEFAULT_AGENTS";
const ENV_PRIVATE_REPO_ALWAYS_UPDATE: &str = "SKILLS_PRIVATE_REPO_ALWAYS_UPDATE";
const ENV_INSTALL_INTERNAL: &str = "INSTALL_INTERNAL_SKILLS";
const ENV_DISABLE_TELEMETRY: &str = "DISABLE_TELEMETRY";
const ENV_DO_NOT_TRACK: &str = "DO_NOT_TRACK";

/// The user's home directory, if one can be determined.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// `~/.agents`, falling back to `./.agents` when there is no home directory.
pub fn agents_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(AGENTS_DIR)
}

/// Path of the config file: `SKILLS_CONFIG_PATH` or `~/.agents/config.json`.
pub fn config_path() -> PathBuf {
    config_path_with(|name| std::env::var(name).ok())
}

/// [`config_path`] with a custom environment lookup.
pub fn config_path_with(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    match lookup(ENV_CONFIG_PATH).map(|v| v.trim().to_string()) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => agents_dir().join(CONFIG_FILE),
    }
}

/// Lock file location: the configured override or `~/.agents/.skill-lock.json`.
pub fn skill_lock_path(config: &SkillsConfig) -> PathBuf {
    config
        .lock_file
        .clone()
        .unwrap_or_else(|| agents_dir().join(LOCK_FILE))
}

/// The built-in defaults.
pub fn default_config() -> SkillsConfig {
    SkillsConfig::default()
}

/// Load config from the standard location and apply environment overrides.
pub fn load() -> SkillsConfig {
    apply_env_overrides(load_config(&config_path()))
}

/// Load config from `path`, returning defaults if it is missing or invalid.
pub fn load_config(path: &Path) -> SkillsConfig {
    if !path.exists() {
        debug!(path = %path.display(), "no config file found, using defaults");
        return SkillsConfig::default();
    }
    match read_config(path) {
        Ok(cfg) => {
            debug!(path = %path.display(), "loaded config");
            cfg
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            SkillsConfig::default()
        },
    }
}

/// Strictly read and parse a config file.
pub fn read_config(path: &Path) -> Result<SkillsConfig> {
    let raw = std::fs::read_to_string(path)?;
    let value = parse_config_value(&raw, path)?;
    if !value.get("version").is_some_and(serde_json::Value::is_u64) {
        return Err(Error::MissingVersion {
            path: path.to_path_buf(),
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// Write `config` to `path` in the format implied by its extension.
///
/// Creates parent directories if needed.
pub fn save_config(config: &SkillsConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = match extension(path) {
        "toml" => toml::to_string_pretty(config)?,
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        other => return Err(Error::unsupported_format(other, path)),
    };
    std::fs::write(path, serialized)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Load the file config (without env overrides), apply `f`, save it back and
/// return the result with env overrides applied.
pub fn update_config<F>(path: &Path, f: F) -> Result<SkillsConfig>
where
    F: FnOnce(&mut SkillsConfig),
{
    let mut config = load_config(path);
    f(&mut config);
    save_config(&config, path)?;
    Ok(apply_env_overrides(config))
}

/// Default agents from the config at `path`, env overrides applied.
pub fn default_agents(path: &Path) -> Vec<String> {
    apply_env_overrides(load_config(path)).default_agents
}

/// Persist `agents` as the default agent list.
pub fn set_default_agents(path: &Path, agents: &[String]) -> Result<SkillsConfig> {
    update_config(path, |config| config.default_agents = agents.to_vec())
}

/// Telemetry is on unless disabled by env or config.
pub fn is_telemetry_enabled(config: &SkillsConfig) -> bool {
    !telemetry_disabled_by(&|name: &str| std::env::var(name).ok()) && config.telemetry.enabled
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: SkillsConfig) -> SkillsConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply environment variable overrides using a custom lookup function.
pub fn apply_env_overrides_with(
    mut config: SkillsConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> SkillsConfig {
    let non_empty = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(url) = non_empty(ENV_PLATFORM_URL) {
        config.platform.base_url = url;
    }
    if let Some(path) = non_empty(ENV_TELEMETRY_ENDPOINT) {
        config.platform.telemetry_endpoint = path;
    }
    if let Some(path) = non_empty(ENV_SEARCH_ENDPOINT) {
        config.platform.search_endpoint = path;
    }
    if let Some(path) = non_empty(ENV_CHECK_UPDATES_ENDPOINT) {
        config.platform.check_updates_endpoint = path;
    }

    if telemetry_disabled_by(&lookup) {
        config.telemetry.enabled = false;
    }

    if let Some(list) = non_empty(ENV_DEFAULT_AGENTS) {
        config.default_agents = parse_env_list(&list);
    }

    if let Some(value) = lookup(ENV_PRIVATE_REPO_ALWAYS_UPDATE) {
        config.private_repo.always_update =
            parse_env_bool(&value, config.private_repo.always_update);
    }
    if let Some(value) = lookup(ENV_INSTALL_INTERNAL) {
        config.install_internal_skills = parse_env_bool(&value, config.install_internal_skills);
    }

    if let Some(path) = non_empty(ENV_LOCK_PATH) {
        config.lock_file = Some(PathBuf::from(path));
    }

    config
}

fn telemetry_disabled_by(lookup: &dyn Fn(&str) -> Option<String>) -> bool {
    [ENV_DISABLE_TELEMETRY, ENV_DO_NOT_TRACK]
        .iter()
        .any(|name| lookup(name).is_some_and(|v| !v.is_empty()))
}

fn parse_env_bool(value: &str, default: bool) -> bool {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return default;
    }
    matches!(value.as_str(), "1" | "true" | "yes")
}

fn parse_env_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("json")
}

fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    match extension(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::unsupported_format(other, path)),
    }
}

//! Config schema types (agents, registries, platform, telemetry, private repos).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkillsConfig {
    /// Schema version of the file this was loaded from.
    pub version: u32,
    /// Agents to install into when none are given explicitly (kebab-case ids).
    pub default_agents: Vec<String>,
    /// Extra registries for skill discovery.
    pub registries: Vec<RegistryConfig>,
    pub platform: PlatformConfig,
    pub telemetry: TelemetryConfig,
    pub private_repo: PrivateRepoConfig,
    /// Whether skills marked `metadata.internal: true` may be installed.
    pub install_internal_skills: bool,
    /// Override for the lock file location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            default_agents: Vec::new(),
            registries: Vec::new(),
            platform: PlatformConfig::default(),
            telemetry: TelemetryConfig::default(),
            private_repo: PrivateRepoConfig::default(),
            install_internal_skills: false,
            lock_file: None,
        }
    }
}

impl SkillsConfig {
    /// Full URL for a platform endpoint (`baseUrl` + path).
    pub fn platform_url(&self, endpoint: PlatformEndpoint) -> String {
        let base = self.platform.base_url.trim_end_matches('/');
        match endpoint {
            PlatformEndpoint::Base => self.platform.base_url.clone(),
            PlatformEndpoint::Telemetry => format!("{base}{}", self.platform.telemetry_endpoint),
            PlatformEndpoint::Search => format!("{base}{}", self.platform.search_endpoint),
            PlatformEndpoint::CheckUpdates => {
                format!("{base}{}", self.platform.check_updates_endpoint)
            },
        }
    }
}

/// A custom registry for skill discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub name: String,
    pub url: String,
    /// Lower value = consulted first.
    #[serde(default)]
    pub priority: i32,
}

/// Platform API location for custom deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlatformConfig {
    pub base_url: String,
    pub telemetry_endpoint: String,
    pub search_endpoint: String,
    pub check_updates_endpoint: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://add-skill.vercel.sh".into(),
            telemetry_endpoint: "/t".into(),
            search_endpoint: "/search".into(),
            check_updates_endpoint: "/check-updates".into(),
        }
    }
}

/// Which platform URL to build with [`SkillsConfig::platform_url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEndpoint {
    Base,
    Telemetry,
    Search,
    CheckUpdates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Private repository handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrivateRepoConfig {
    /// Re-copy private repo skills on every install, skipping the hash check.
    pub always_update: bool,
}

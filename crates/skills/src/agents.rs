//! Agent registry: known coding agents and where each one reads skills from.

use std::{
    convert::Infallible,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A coding agent that can receive skills.
///
/// Unknown names round-trip through [`AgentType::Other`] so a lock file written
/// by a newer release never fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentType {
    Amp,
    Antigravity,
    ClaudeCode,
    Cline,
    Codex,
    Cursor,
    Droid,
    GeminiCli,
    GithubCopilot,
    Goose,
    Kilo,
    Opencode,
    Roo,
    Windsurf,
    Other(String),
}

impl AgentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Amp => "amp",
            Self::Antigravity => "antigravity",
            Self::ClaudeCode => "claude-code",
            Self::Cline => "cline",
            Self::Codex => "codex",
            Self::Cursor => "cursor",
            Self::Droid => "droid",
            Self::GeminiCli => "gemini-cli",
            Self::GithubCopilot => "github-copilot",
            Self::Goose => "goose",
            Self::Kilo => "kilo",
            Self::Opencode => "opencode",
            Self::Roo => "roo",
            Self::Windsurf => "windsurf",
            Self::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl FromStr for AgentType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(AGENTS
            .iter()
            .find(|a| a.agent_type.as_str() == normalized)
            .map(|a| a.agent_type.clone())
            .unwrap_or(Self::Other(normalized)))
    }
}

impl From<&str> for AgentType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(agent) => agent,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AgentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// Static description of an agent's skill directory conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub agent_type: AgentType,
    pub display_name: &'static str,
    /// Skills directory relative to a project root.
    pub skills_dir: &'static str,
    /// Skills directory relative to the home directory.
    pub global_skills_dir: &'static str,
    /// Home-relative paths whose presence means the agent is installed.
    pub detect_dirs: &'static [&'static str],
}

impl AgentConfig {
    /// Whether this agent appears to be installed for the user at `home`.
    pub fn detect(&self, home: &Path) -> bool {
        self.detect_dirs.iter().any(|dir| home.join(dir).is_dir())
    }

    pub fn project_skills_dir(&self, cwd: &Path) -> PathBuf {
        cwd.join(self.skills_dir)
    }

    pub fn global_skills_dir(&self, home: &Path) -> PathBuf {
        home.join(self.global_skills_dir)
    }
}

const AGENTS: &[AgentConfig] = &[
    AgentConfig {
        agent_type: AgentType::Amp,
        display_name: "Amp",
        skills_dir: ".agents/skills",
        global_skills_dir: ".config/agents/skills",
        detect_dirs: &[".config/amp"],
    },
    AgentConfig {
        agent_type: AgentType::Antigravity,
        display_name: "Antigravity",
        skills_dir: ".agent/skills",
        global_skills_dir: ".gemini/antigravity/skills",
        detect_dirs: &[".gemini/antigravity"],
    },
    AgentConfig {
        agent_type: AgentType::ClaudeCode,
        display_name: "Claude Code",
        skills_dir: ".claude/skills",
        global_skills_dir: ".claude/skills",
        detect_dirs: &[".claude"],
    },
    AgentConfig {
        agent_type: AgentType::Cline,
        display_name: "Cline",
        skills_dir: ".cline/skills",
        global_skills_dir: ".cline/skills",
        detect_dirs: &[".cline"],
    },
    AgentConfig {
        agent_type: AgentType::Codex,
        display_name: "Codex",
        skills_dir: ".codex/skills",
        global_skills_dir: ".codex/skills",
        detect_dirs: &[".codex"],
    },
    AgentConfig {
        agent_type: AgentType::Cursor,
        display_name: "Cursor",
        skills_dir: ".cursor/skills",
        global_skills_dir: ".cursor/skills",
        detect_dirs: &[".cursor"],
    },
    AgentConfig {
        agent_type: AgentType::Droid,
        display_name: "Droid",
        skills_dir: ".factory/skills",
        global_skills_dir: ".factory/skills",
        detect_dirs: &[".factory"],
    },
    AgentConfig {
        agent_type: AgentType::GeminiCli,
        display_name: "Gemini CLI",
        skills_dir: ".gemini/skills",
        global_skills_dir: ".gemini/skills",
        detect_dirs: &[".gemini"],
    },
    AgentConfig {
        agent_type: AgentType::GithubCopilot,
        display_name: "GitHub Copilot",
        skills_dir: ".github/skills",
        global_skills_dir: ".copilot/skills",
        detect_dirs: &[".copilot"],
    },
    AgentConfig {
        agent_type: AgentType::Goose,
        display_name: "Goose",
        skills_dir: ".goose/skills",
        global_skills_dir: ".config/goose/skills",
        detect_dirs: &[".config/goose"],
    },
    AgentConfig {
        agent_type: AgentType::Kilo,
        display_name: "Kilo Code",
        skills_dir: ".kilocode/skills",
        global_skills_dir: ".kilocode/skills",
        detect_dirs: &[".kilocode"],
    },
    AgentConfig {
        agent_type: AgentType::Opencode,
        display_name: "OpenCode",
        skills_dir: ".opencode/skills",
        global_skills_dir: ".config/opencode/skills",
        detect_dirs: &[".config/opencode"],
    },
    AgentConfig {
        agent_type: AgentType::Roo,
        display_name: "Roo Code",
        skills_dir: ".roo/skills",
        global_skills_dir: ".roo/skills",
        detect_dirs: &[".roo"],
    },
    AgentConfig {
        agent_type: AgentType::Windsurf,
        display_name: "Windsurf",
        skills_dir: ".windsurf/skills",
        global_skills_dir: ".codeium/windsurf/skills",
        detect_dirs: &[".codeium/windsurf"],
    },
];

/// All known agents.
pub fn agents() -> &'static [AgentConfig] {
    AGENTS
}

/// Look up an agent's configuration. `None` for [`AgentType::Other`].
pub fn get_agent_config(agent: &AgentType) -> Option<&'static AgentConfig> {
    AGENTS.iter().find(|a| &a.agent_type == agent)
}

/// Agents whose config directories exist under `home`, in registry order.
pub fn detect_installed_agents(home: &Path) -> Vec<AgentType> {
    AGENTS
        .iter()
        .filter(|a| a.detect(home))
        .map(|a| a.agent_type.clone())
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_roundtrips_through_json() {
        let json = serde_json::to_string(&AgentType::ClaudeCode).unwrap();
        assert_eq!(json, "\"claude-code\"");
        let parsed: AgentType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, AgentType::ClaudeCode);
    }

    #[test]
    fn unknown_agent_is_preserved() {
        let parsed: AgentType = serde_json::from_str("\"future-agent\"").unwrap();
        assert_eq!(parsed, AgentType::Other("future-agent".into()));
        assert!(!parsed.is_known());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"future-agent\"");
        assert!(get_agent_config(&parsed).is_none());
    }

    #[test]
    fn every_known_agent_has_a_config() {
        for config in agents() {
            assert_eq!(AgentType::from(config.agent_type.as_str()), config.agent_type);
            assert!(config.skills_dir.ends_with("skills"));
        }
    }

    #[test]
    fn detect_uses_home_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".config/opencode")).unwrap();
        assert_eq!(
            detect_installed_agents(tmp.path()),
            vec![AgentType::ClaudeCode, AgentType::Opencode]
        );
    }
}

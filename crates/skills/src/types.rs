use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::agents::AgentType;

// ── Parsed sources ──────────────────────────────────────────────────────────

/// Git hosting provider of a git source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitHost {
    Github,
    Gitlab,
    /// Any other host, e.g. a self-hosted Gitea.
    Other(String),
}

impl GitHost {
    pub fn domain(&self) -> &str {
        match self {
            Self::Github => "github.com",
            Self::Gitlab => "gitlab.com",
            Self::Other(host) => host,
        }
    }

    pub fn from_domain(domain: &str) -> Self {
        match domain.to_ascii_lowercase().trim_start_matches("www.") {
            "github.com" => Self::Github,
            "gitlab.com" => Self::Gitlab,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A classified skill source.
///
/// Every downstream component matches exhaustively on this enum; git variants
/// always carry an owner/repo pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParsedSource {
    /// `owner/repo[/subpath][#ref]` on GitHub.
    GitShorthand {
        owner: String,
        repo: String,
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subpath: Option<String>,
        /// `owner/repo@skill` selects a single skill.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skill: Option<String>,
    },
    /// A full git URL on a known or generic host.
    GitUrl {
        host: GitHost,
        /// Clone URL.
        url: String,
        owner: String,
        repo: String,
        #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subpath: Option<String>,
    },
    /// A documentation-site skill export (a single `skill.md`).
    DocSite { url: String },
    /// Any other HTTP(S) URL: a markdown file or a gzipped tarball.
    RemoteBundle { url: String },
    /// A `/.well-known/skills` index.
    WellKnown { url: String },
}

impl ParsedSource {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::GitShorthand { .. } => "gitShorthand",
            Self::GitUrl { .. } => "gitUrl",
            Self::DocSite { .. } => "docSite",
            Self::RemoteBundle { .. } => "remoteBundle",
            Self::WellKnown { .. } => "wellKnown",
        }
    }

    pub fn is_git(&self) -> bool {
        matches!(self, Self::GitShorthand { .. } | Self::GitUrl { .. })
    }

    pub fn host(&self) -> Option<GitHost> {
        match self {
            Self::GitShorthand { .. } => Some(GitHost::Github),
            Self::GitUrl { host, .. } => Some(host.clone()),
            Self::DocSite { .. } | Self::RemoteBundle { .. } | Self::WellKnown { .. } => None,
        }
    }

    pub fn git_ref(&self) -> Option<&str> {
        match self {
            Self::GitShorthand { git_ref, .. } | Self::GitUrl { git_ref, .. } => git_ref.as_deref(),
            Self::DocSite { .. } | Self::RemoteBundle { .. } | Self::WellKnown { .. } => None,
        }
    }

    pub fn subpath(&self) -> Option<&str> {
        match self {
            Self::GitShorthand { subpath, .. } | Self::GitUrl { subpath, .. } => subpath.as_deref(),
            Self::DocSite { .. } | Self::RemoteBundle { .. } | Self::WellKnown { .. } => None,
        }
    }

    /// Name of a single skill requested with `owner/repo@skill`.
    pub fn skill_filter(&self) -> Option<&str> {
        match self {
            Self::GitShorthand { skill, .. } => skill.as_deref(),
            Self::GitUrl { .. }
            | Self::DocSite { .. }
            | Self::RemoteBundle { .. }
            | Self::WellKnown { .. } => None,
        }
    }

    /// URL to hand to `git clone`, for git variants.
    pub fn clone_url(&self) -> Option<String> {
        match self {
            Self::GitShorthand { owner, repo, .. } => {
                Some(format!("https://github.com/{owner}/{repo}.git"))
            },
            Self::GitUrl { url, .. } => Some(url.clone()),
            Self::DocSite { .. } | Self::RemoteBundle { .. } | Self::WellKnown { .. } => None,
        }
    }

    /// Stable identity of the source, ignoring ref/subpath. Used to group lock
    /// entries by the repository or URL they came from.
    pub fn identity(&self) -> String {
        match self {
            Self::GitShorthand { owner, repo, .. } => format!("{owner}/{repo}"),
            Self::GitUrl {
                host, owner, repo, ..
            } => match host {
                GitHost::Github => format!("{owner}/{repo}"),
                GitHost::Gitlab | GitHost::Other(_) => {
                    format!("{}/{owner}/{repo}", host.domain())
                },
            },
            Self::DocSite { url } | Self::RemoteBundle { url } | Self::WellKnown { url } => {
                url.clone()
            },
        }
    }
}

impl fmt::Display for ParsedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())?;
        if let Some(subpath) = self.subpath() {
            write!(f, "/{subpath}")?;
        }
        if let Some(git_ref) = self.git_ref() {
            write!(f, "#{git_ref}")?;
        }
        Ok(())
    }
}

// ── Skills ──────────────────────────────────────────────────────────────────

/// A skill parsed from a `SKILL.md` file. Immutable after parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    /// Name from frontmatter. Sanitized before it reaches the filesystem.
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Directory containing `SKILL.md`.
    pub source_path: PathBuf,
    /// Agents this skill declares support for. `None` = all agents.
    pub agents: Option<Vec<AgentType>>,
    /// Internal skills are hidden unless explicitly enabled.
    pub internal: bool,
    pub raw_frontmatter: serde_yaml::Mapping,
    /// Markdown instructions after the frontmatter.
    pub body: String,
}

impl Skill {
    pub fn supports(&self, agent: &AgentType) -> bool {
        self.agents
            .as_ref()
            .is_none_or(|agents| agents.contains(agent))
    }
}

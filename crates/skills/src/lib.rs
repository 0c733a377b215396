//! Skill installation: source parsing, fetching, discovery, hashing, the lock
//! file, and per-agent installs.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions.

pub mod agents;
pub mod discover;
pub mod error;
pub mod git;
pub mod hash;
pub mod install;
pub mod lock;
pub mod parse;
pub mod remote;
pub mod source;
pub mod types;

pub use {
    agents::{AgentConfig, AgentType},
    error::{Error, Result},
    install::{InstallAction, InstallMode, InstallReport, InstallScope, Installer},
    lock::{LockStore, SkillLockEntry, SkillLockFile},
    source::parse_source,
    types::{GitHost, ParsedSource, Skill},
};

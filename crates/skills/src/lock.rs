//! The skill lock file: what is installed, from where, for which agents.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    agents::AgentType,
    error::{Error, Result},
    types::ParsedSource,
};

pub const CURRENT_LOCK_VERSION: u32 = 1;

type Extra = serde_json::Map<String, serde_json::Value>;

/// One installed skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLockEntry {
    pub name: String,
    pub source: ParsedSource,
    pub content_hash: String,
    /// Agents the skill is installed for, in installation order.
    #[serde(default)]
    pub agents: Vec<AgentType>,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Remote tree SHA of the skill folder, when the host exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_hash: Option<String>,
    /// Path of the skill folder inside its source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl SkillLockEntry {
    pub fn new(
        name: impl Into<String>,
        source: ParsedSource,
        content_hash: impl Into<String>,
        agent: AgentType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            content_hash: content_hash.into(),
            agents: vec![agent],
            installed_at: now,
            updated_at: None,
            folder_hash: None,
            skill_path: None,
            extra: Extra::new(),
        }
    }

    pub fn has_agent(&self, agent: &AgentType) -> bool {
        self.agents.contains(agent)
    }
}

/// The whole lock document. Helpers take and return values; persist with
/// [`LockStore::write_skill_lock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillLockFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub skills: BTreeMap<String, SkillLockEntry>,
    #[serde(default)]
    pub dismissed_prompts: BTreeSet<String>,
    #[serde(default)]
    pub last_selected_agents: Vec<AgentType>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for SkillLockFile {
    fn default() -> Self {
        Self {
            version: CURRENT_LOCK_VERSION,
            skills: BTreeMap::new(),
            dismissed_prompts: BTreeSet::new(),
            last_selected_agents: Vec::new(),
            extra: Extra::new(),
        }
    }
}

impl SkillLockFile {
    /// Insert or merge an entry.
    ///
    /// Merging unions the agent lists (existing order first), keeps the
    /// original `installedAt` and stamps `updatedAt` with the new entry's
    /// timestamp.
    #[must_use]
    pub fn add_skill_to_lock(mut self, entry: SkillLockEntry) -> Self {
        let merged = match self.skills.remove(&entry.name) {
            None => entry,
            Some(existing) => {
                let mut agents = existing.agents;
                for agent in entry.agents {
                    if !agents.contains(&agent) {
                        agents.push(agent);
                    }
                }
                let mut extra = existing.extra;
                extra.extend(entry.extra);
                SkillLockEntry {
                    agents,
                    installed_at: existing.installed_at,
                    updated_at: Some(entry.updated_at.unwrap_or(entry.installed_at)),
                    folder_hash: entry.folder_hash.or(existing.folder_hash),
                    skill_path: entry.skill_path.or(existing.skill_path),
                    extra,
                    ..entry
                }
            },
        };
        self.skills.insert(merged.name.clone(), merged);
        self
    }

    #[must_use]
    pub fn remove_skill_from_lock(mut self, name: &str) -> Self {
        self.skills.remove(name);
        self
    }

    /// Drop one agent from an entry; the entry goes away with its last agent.
    #[must_use]
    pub fn remove_agent_from_lock(mut self, name: &str, agent: &AgentType) -> Self {
        if let Some(entry) = self.skills.get_mut(name) {
            entry.agents.retain(|a| a != agent);
            if entry.agents.is_empty() {
                self.skills.remove(name);
            }
        }
        self
    }

    pub fn get_skill_from_lock(&self, name: &str) -> Option<&SkillLockEntry> {
        self.skills.get(name)
    }

    pub fn get_all_locked_skills(&self) -> impl Iterator<Item = &SkillLockEntry> {
        self.skills.values()
    }

    /// Entries grouped by the repository or URL they came from.
    pub fn get_skills_by_source(&self) -> BTreeMap<String, Vec<&SkillLockEntry>> {
        let mut grouped: BTreeMap<String, Vec<&SkillLockEntry>> = BTreeMap::new();
        for entry in self.skills.values() {
            grouped
                .entry(entry.source.identity())
                .or_default()
                .push(entry);
        }
        grouped
    }

    pub fn is_prompt_dismissed(&self, prompt: &str) -> bool {
        self.dismissed_prompts.contains(prompt)
    }

    #[must_use]
    pub fn dismiss_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.dismissed_prompts.insert(prompt.into());
        self
    }

    pub fn get_last_selected_agents(&self) -> &[AgentType] {
        &self.last_selected_agents
    }

    #[must_use]
    pub fn save_selected_agents(mut self, agents: &[AgentType]) -> Self {
        self.last_selected_agents.clear();
        for agent in agents {
            if !self.last_selected_agents.contains(agent) {
                self.last_selected_agents.push(agent.clone());
            }
        }
        self
    }
}

/// Reads and writes the lock file at a fixed path.
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing, unreadable, or corrupt file yields an empty
    /// lock.
    pub fn read_skill_lock(&self) -> SkillLockFile {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no lock file yet");
                return SkillLockFile::default();
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable lock file, starting empty");
                return SkillLockFile::default();
            },
        };

        let lock: SkillLockFile = match serde_json::from_str(&data) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt lock file, starting empty");
                return SkillLockFile::default();
            },
        };

        if lock.version == 0 {
            warn!(path = %self.path.display(), "lock file has no version, starting empty");
            return SkillLockFile::default();
        }
        if lock.version > CURRENT_LOCK_VERSION {
            warn!(
                path = %self.path.display(),
                version = lock.version,
                supported = CURRENT_LOCK_VERSION,
                "lock file written by a newer version"
            );
        }
        lock
    }

    /// Overwrite the lock file atomically via temp file + rename.
    pub fn write_skill_lock(&self, lock: &SkillLockFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(lock)?;
        std::fs::write(&tmp, data).map_err(|e| Error::filesystem(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::filesystem(&self.path, e))?;
        debug!(path = %self.path.display(), skills = lock.skills.len(), "wrote lock file");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    fn source() -> ParsedSource {
        ParsedSource::GitShorthand {
            owner: "acme".into(),
            repo: "pack".into(),
            git_ref: Some("main".into()),
            subpath: None,
            skill: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn missing_file_reads_default() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("missing.json"));
        assert_eq!(store.read_skill_lock(), SkillLockFile::default());
    }

    #[test]
    fn write_creates_parent_and_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("nested/dir/.skill-lock.json"));
        let lock = SkillLockFile::default().add_skill_to_lock(SkillLockEntry::new(
            "pdf",
            source(),
            "abc",
            AgentType::ClaudeCode,
            at(10),
        ));
        store.write_skill_lock(&lock).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"contentHash\": \"abc\""));
        assert!(raw.contains("\"kind\": \"gitShorthand\""));
        assert!(!store.path().with_extension("json.tmp").exists());
        assert_eq!(store.read_skill_lock(), lock);
    }

    #[test]
    fn corrupt_or_versionless_file_degrades_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("lock.json"));

        std::fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.read_skill_lock(), SkillLockFile::default());

        std::fs::write(store.path(), r#"{"skills":{}}"#).unwrap();
        assert_eq!(store.read_skill_lock(), SkillLockFile::default());

        std::fs::write(store.path(), r#"{"version":0,"skills":{}}"#).unwrap();
        assert_eq!(store.read_skill_lock(), SkillLockFile::default());
    }

    #[test]
    fn newer_version_is_read_as_is() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("lock.json"));
        std::fs::write(store.path(), r#"{"version":7,"dismissedPrompts":["x"]}"#).unwrap();
        let lock = store.read_skill_lock();
        assert_eq!(lock.version, 7);
        assert!(lock.is_prompt_dismissed("x"));
    }

    #[test]
    fn unknown_fields_survive_read_modify_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LockStore::new(tmp.path().join("lock.json"));
        std::fs::write(
            store.path(),
            r#"{
  "version": 1,
  "futureTopLevel": {"a": 1},
  "skills": {
    "pdf": {
      "name": "pdf",
      "source": {"kind": "gitShorthand", "owner": "acme", "repo": "pack"},
      "contentHash": "h1",
      "agents": ["claude-code", "brand-new-agent"],
      "installedAt": "2025-01-01T00:00:00Z",
      "pinned": true
    }
  }
}"#,
        )
        .unwrap();

        let lock = store.read_skill_lock().dismiss_prompt("find-skills");
        store.write_skill_lock(&lock).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["futureTopLevel"]["a"], 1);
        assert_eq!(value["skills"]["pdf"]["pinned"], true);
        assert_eq!(value["skills"]["pdf"]["agents"][1], "brand-new-agent");
        assert_eq!(value["dismissedPrompts"][0], "find-skills");
    }

    #[test]
    fn add_merges_agents_and_keeps_installed_at() {
        let lock = SkillLockFile::default()
            .add_skill_to_lock(SkillLockEntry::new("pdf", source(), "h1", AgentType::ClaudeCode, at(1)))
            .add_skill_to_lock(SkillLockEntry::new("pdf", source(), "h2", AgentType::Cursor, at(2)))
            .add_skill_to_lock(SkillLockEntry::new("pdf", source(), "h2", AgentType::ClaudeCode, at(3)));

        let entry = lock.get_skill_from_lock("pdf").unwrap();
        assert_eq!(entry.agents, vec![AgentType::ClaudeCode, AgentType::Cursor]);
        assert_eq!(entry.installed_at, at(1));
        assert_eq!(entry.updated_at, Some(at(3)));
        assert_eq!(entry.content_hash, "h2");
        assert_eq!(lock.get_all_locked_skills().count(), 1);
    }

    #[test]
    fn remove_helpers() {
        let lock = SkillLockFile::default()
            .add_skill_to_lock(SkillLockEntry::new("a", source(), "h", AgentType::ClaudeCode, at(1)))
            .add_skill_to_lock(SkillLockEntry::new("a", source(), "h", AgentType::Codex, at(1)))
            .add_skill_to_lock(SkillLockEntry::new("b", source(), "h", AgentType::Codex, at(1)));

        let lock = lock.remove_agent_from_lock("a", &AgentType::Codex);
        assert_eq!(lock.get_skill_from_lock("a").unwrap().agents, vec![AgentType::ClaudeCode]);
        let lock = lock.remove_agent_from_lock("a", &AgentType::ClaudeCode);
        assert!(lock.get_skill_from_lock("a").is_none());
        let lock = lock.remove_skill_from_lock("b");
        assert!(lock.skills.is_empty());
    }

    #[test]
    fn groups_by_source_identity() {
        let other = ParsedSource::DocSite {
            url: "https://docs.acme.dev/skill.md".into(),
        };
        let lock = SkillLockFile::default()
            .add_skill_to_lock(SkillLockEntry::new("a", source(), "h", AgentType::Amp, at(1)))
            .add_skill_to_lock(SkillLockEntry::new("b", source(), "h", AgentType::Amp, at(1)))
            .add_skill_to_lock(SkillLockEntry::new("c", other, "h", AgentType::Amp, at(1)));

        let grouped = lock.get_skills_by_source();
        assert_eq!(grouped["acme/pack"].len(), 2);
        assert_eq!(grouped["https://docs.acme.dev/skill.md"].len(), 1);
    }

    #[test]
    fn selected_agents_are_deduplicated() {
        let lock = SkillLockFile::default().save_selected_agents(&[
            AgentType::Cursor,
            AgentType::ClaudeCode,
            AgentType::Cursor,
        ]);
        assert_eq!(lock.get_last_selected_agents(), &[
            AgentType::Cursor,
            AgentType::ClaudeCode
        ]);
        assert!(!lock.is_prompt_dismissed("x"));
    }
}

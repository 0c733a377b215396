//! Installing discovered skills into agent directories.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use {
    chrono::Utc,
    skillpack_config::SkillsConfig,
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use crate::{
    agents::{AgentType, get_agent_config},
    discover::{self, DiscoverOptions, SkillFilter},
    error::{Error, Result},
    hash::{compute_content_hash, fetch_skill_folder_hash_from},
    lock::{LockStore, SkillLockEntry, SkillLockFile},
    remote::{DefaultFetcher, SourceFetcher},
    source::{RepoProbe, VisibilityProbe, parse_source},
    types::{GitHost, ParsedSource, Skill},
};

/// Canonical skills directory shared by all agents, relative to the scope root.
pub const CANONICAL_SKILLS_DIR: &str = ".agents/skills";

/// Project-scope lock file, relative to the project root.
pub const PROJECT_LOCK_FILE: &str = ".agents/.skill-lock.json";

const MAX_NAME_LEN: usize = 255;
const UNNAMED_SKILL: &str = "unnamed-skill";

// ── Modes, scopes, reports ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Write the files into each agent's directory.
    #[default]
    Copy,
    /// Write once to the canonical directory and link agent directories to it.
    Symlink,
}

impl FromStr for InstallMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "symlink" | "link" => Ok(Self::Symlink),
            other => Err(Error::message(format!(
                "unknown install mode '{other}' (expected copy or symlink)"
            ))),
        }
    }
}

/// Where installed skills live: a project checkout or the user's home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallScope {
    Project(PathBuf),
    Global(PathBuf),
}

impl InstallScope {
    pub fn root(&self) -> &Path {
        match self {
            Self::Project(cwd) => cwd,
            Self::Global(home) => home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    Install,
    Update,
    Skip,
    AddAgent,
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "installed",
            Self::Update => "updated",
            Self::Skip => "unchanged",
            Self::AddAgent => "added agent",
        })
    }
}

/// Outcome for one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub skill: String,
    pub action: InstallAction,
    /// Installed location for the requested agent.
    pub path: PathBuf,
}

// ── Paths ───────────────────────────────────────────────────────────────────

/// Filesystem-safe skill name.
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9._]` into a
/// single `-`, trims leading/trailing `-` and `.`, and caps the length.
/// Idempotent; never returns an empty string.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' {
            out.push(c);
            pending_dash = false;
        } else if !pending_dash {
            out.push('-');
            pending_dash = true;
        }
    }
    let trim = |s: &str| s.trim_matches(['-', '.']).to_string();
    let mut out = trim(&out);
    if out.len() > MAX_NAME_LEN {
        out.truncate(MAX_NAME_LEN);
        out = trim(&out);
    }
    if out.is_empty() {
        UNNAMED_SKILL.to_string()
    } else {
        out
    }
}

/// Lock file recording installs in `scope`.
///
/// Project installs are tracked next to the project's canonical skills
/// directory; global installs use the configured lock path.
pub fn scope_lock_path(scope: &InstallScope, config: &SkillsConfig) -> PathBuf {
    match scope {
        InstallScope::Project(cwd) => cwd.join(PROJECT_LOCK_FILE),
        InstallScope::Global(_) => skillpack_config::skill_lock_path(config),
    }
}

pub fn get_canonical_skills_dir(scope: &InstallScope) -> PathBuf {
    scope.root().join(CANONICAL_SKILLS_DIR)
}

pub fn get_canonical_path(scope: &InstallScope, name: &str) -> PathBuf {
    get_canonical_skills_dir(scope).join(sanitize_name(name))
}

/// Where `agent` reads the skill `name` from in `scope`.
pub fn get_install_path(scope: &InstallScope, agent: &AgentType, name: &str) -> Result<PathBuf> {
    let config = get_agent_config(agent)
        .ok_or_else(|| Error::message(format!("unknown agent '{agent}'")))?;
    let dir = match scope {
        InstallScope::Project(cwd) => config.project_skills_dir(cwd),
        InstallScope::Global(home) => config.global_skills_dir(home),
    };
    Ok(dir.join(sanitize_name(name)))
}

// ── Installer ───────────────────────────────────────────────────────────────

/// Fetches a source, discovers its skills and installs them for an agent,
/// recording the result in the lock file.
pub struct Installer {
    config: SkillsConfig,
    scope: InstallScope,
    lock_store: LockStore,
    fetcher: Arc<dyn SourceFetcher>,
    probe: Arc<dyn VisibilityProbe>,
    folder_hash_api: Option<(reqwest::Client, String)>,
}

impl Installer {
    pub fn new(config: SkillsConfig, scope: InstallScope, lock_store: LockStore) -> Self {
        Self {
            config,
            scope,
            lock_store,
            fetcher: Arc::new(DefaultFetcher::default()),
            probe: Arc::new(RepoProbe::default()),
            folder_hash_api: None,
        }
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: impl VisibilityProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Record GitHub tree SHAs (`folderHash`) using the given API base.
    #[must_use]
    pub fn with_folder_hashes(mut self, client: reqwest::Client, api_base: impl Into<String>) -> Self {
        self.folder_hash_api = Some((client, api_base.into()));
        self
    }

    pub fn scope(&self) -> &InstallScope {
        &self.scope
    }

    pub fn lock_store(&self) -> &LockStore {
        &self.lock_store
    }

    /// Install every matching skill in `source` for `agent`.
    pub async fn install_skill_for_agent(
        &self,
        source: &ParsedSource,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<Vec<InstallReport>> {
        if get_agent_config(agent).is_none() {
            return Err(Error::message(format!("unknown agent '{agent}'")));
        }

        let checkout = self.fetcher.materialize(source).await?;
        let content_root = checkout.content_root()?;
        let discovery = discover::discover_skills(&content_root, &DiscoverOptions::default())?;
        if !discovery.errors.is_empty() {
            warn!(%source, errors = discovery.errors.len(), "some skills could not be parsed");
        }
        let skills = discover::filter_skills(discovery.skills, &SkillFilter {
            agent: Some(agent.clone()),
            include_internal: discover::should_install_internal_skills(&self.config),
            skill: source.skill_filter().map(ToOwned::to_owned),
        });
        if skills.is_empty() {
            return Err(Error::NoSkillsFound {
                source_id: source.to_string(),
            });
        }

        let mut run = InstallRun {
            lock: self.lock_store.read_skill_lock(),
            changed: false,
            private: None,
        };
        let mut reports = Vec::with_capacity(skills.len());
        for skill in &skills {
            match self
                .install_one(&mut run, source, checkout.root(), skill, agent, mode)
                .await
            {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // Record the skills that did complete before failing.
                    if run.changed
                        && let Err(write_err) = self.lock_store.write_skill_lock(&run.lock)
                    {
                        warn!(error = %write_err, "failed to record partial install");
                    }
                    return Err(e);
                },
            }
        }

        if run.changed {
            self.lock_store.write_skill_lock(&run.lock)?;
        }
        if let Err(e) = checkout.cleanup() {
            warn!(error = %e, "failed to remove temporary checkout");
        }
        Ok(reports)
    }

    /// Parse `raw` with [`parse_source`] and install it for `agent`.
    pub async fn install_source_for_agent(
        &self,
        raw: &str,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<Vec<InstallReport>> {
        let source = parse_source(raw)?;
        self.install_skill_for_agent(&source, agent, mode).await
    }

    pub async fn install_mintlify_skill_for_agent(
        &self,
        source: &ParsedSource,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<Vec<InstallReport>> {
        require_kind(source, matches!(source, ParsedSource::DocSite { .. }), "doc-site")?;
        self.install_skill_for_agent(source, agent, mode).await
    }

    pub async fn install_remote_skill_for_agent(
        &self,
        source: &ParsedSource,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<Vec<InstallReport>> {
        require_kind(source, matches!(source, ParsedSource::RemoteBundle { .. }), "remote bundle")?;
        self.install_skill_for_agent(source, agent, mode).await
    }

    pub async fn install_well_known_skill_for_agent(
        &self,
        source: &ParsedSource,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<Vec<InstallReport>> {
        require_kind(source, matches!(source, ParsedSource::WellKnown { .. }), "well-known")?;
        self.install_skill_for_agent(source, agent, mode).await
    }

    /// Remove `name` for `agent`. Returns `false` when it was not installed.
    pub async fn remove_skill_for_agent(&self, name: &str, agent: &AgentType) -> Result<bool> {
        let name = sanitize_name(name);
        let lock = self.lock_store.read_skill_lock();
        let Some(entry) = lock.get_skill_from_lock(&name) else {
            return Ok(false);
        };
        if !entry.has_agent(agent) {
            return Ok(false);
        }

        let install_path = get_install_path(&self.scope, agent, &name)?;
        let canonical = get_canonical_path(&self.scope, &name);
        let lock = lock.remove_agent_from_lock(&name, agent);
        let others_remain = lock.get_skill_from_lock(&name).is_some();

        // Agents whose directory is the canonical one share it with symlinked agents.
        if install_path != canonical || !others_remain {
            remove_path(install_path.clone()).await?;
        }
        if !others_remain && canonical != install_path {
            remove_path(canonical).await?;
        }
        self.lock_store.write_skill_lock(&lock)?;
        info!(skill = %name, %agent, "removed skill");
        Ok(true)
    }

    /// Locked skills installed for `agent`. Reads only the lock file.
    pub fn list_installed_skills(&self, agent: &AgentType) -> Vec<SkillLockEntry> {
        self.lock_store
            .read_skill_lock()
            .get_all_locked_skills()
            .filter(|e| e.has_agent(agent))
            .cloned()
            .collect()
    }

    /// Whether the lock records `name` for `agent`. Reads only the lock file.
    pub fn is_skill_installed(&self, agent: &AgentType, name: &str) -> bool {
        self.lock_store
            .read_skill_lock()
            .get_skill_from_lock(&sanitize_name(name))
            .is_some_and(|e| e.has_agent(agent))
    }

    async fn install_one(
        &self,
        run: &mut InstallRun,
        source: &ParsedSource,
        checkout_root: &Path,
        skill: &Skill,
        agent: &AgentType,
        mode: InstallMode,
    ) -> Result<InstallReport> {
        let name = sanitize_name(&skill.name);
        let hash = compute_content_hash(skill)?;
        let path = get_install_path(&self.scope, agent, &name)?;

        let forced = if run.lock.get_skill_from_lock(&name).is_some() {
            self.always_update(run, source).await
        } else {
            false
        };
        let (action, targets) = match run.lock.get_skill_from_lock(&name) {
            None => (InstallAction::Install, vec![agent.clone()]),
            Some(entry) if forced || entry.content_hash != hash => {
                let mut targets: Vec<AgentType> = entry
                    .agents
                    .iter()
                    .filter(|a| a.is_known())
                    .cloned()
                    .collect();
                if !targets.contains(agent) {
                    targets.push(agent.clone());
                }
                (InstallAction::Update, targets)
            },
            // The lock says installed but this scope has no copy: restore it.
            Some(entry) if entry.has_agent(agent) && !path.exists() => {
                (InstallAction::Install, vec![agent.clone()])
            },
            Some(entry) if entry.has_agent(agent) => (InstallAction::Skip, Vec::new()),
            Some(_) => (InstallAction::AddAgent, vec![agent.clone()]),
        };
        debug!(skill = %name, %agent, ?action, "install decision");

        if action == InstallAction::Skip {
            return Ok(InstallReport {
                skill: name,
                action,
                path,
            });
        }

        for target in &targets {
            let dest = get_install_path(&self.scope, target, &name)?;
            let canonical = get_canonical_path(&self.scope, &name);
            write_skill_files(skill.source_path.clone(), dest, canonical, mode).await?;
        }

        let skill_path = relative_skill_path(checkout_root, &skill.source_path);
        let mut entry = SkillLockEntry::new(&name, source.clone(), hash, agent.clone(), Utc::now());
        entry.agents = targets;
        entry.folder_hash = self.folder_hash(source, &skill_path).await;
        entry.skill_path = Some(skill_path);

        run.lock = std::mem::take(&mut run.lock).add_skill_to_lock(entry);
        run.changed = true;
        info!(skill = %name, %agent, %action, path = %path.display(), "installed skill");
        Ok(InstallReport {
            skill: name,
            action,
            path,
        })
    }

    /// Whether the private-repository policy forces an update. The probe runs
    /// at most once per install.
    async fn always_update(&self, run: &mut InstallRun, source: &ParsedSource) -> bool {
        if !self.config.private_repo.always_update || !source.is_git() {
            return false;
        }
        if let Some(private) = run.private {
            return private;
        }
        let private = match self.probe.is_private(source).await {
            Ok(private) => private,
            Err(e) => {
                warn!(%source, error = %e, "visibility probe failed, treating source as private");
                true
            },
        };
        run.private = Some(private);
        private
    }

    async fn folder_hash(&self, source: &ParsedSource, skill_path: &str) -> Option<String> {
        let (client, api) = self.folder_hash_api.as_ref()?;
        if source.host() != Some(GitHost::Github) {
            return None;
        }
        match fetch_skill_folder_hash_from(client, api, source, skill_path).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%source, skill_path, error = %e, "could not resolve remote folder hash");
                None
            },
        }
    }
}

struct InstallRun {
    lock: SkillLockFile,
    changed: bool,
    private: Option<bool>,
}

fn require_kind(source: &ParsedSource, ok: bool, expected: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_source(
            source.to_string(),
            format!("expected a {expected} source, got {}", source.kind_name()),
        ))
    }
}

fn relative_skill_path(root: &Path, skill_dir: &Path) -> String {
    skill_dir
        .strip_prefix(root)
        .unwrap_or(skill_dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ── Filesystem ──────────────────────────────────────────────────────────────

async fn write_skill_files(
    source: PathBuf,
    dest: PathBuf,
    canonical: PathBuf,
    mode: InstallMode,
) -> Result<()> {
    tokio::task::spawn_blocking(move || match mode {
        InstallMode::Copy => replace_with_copy(&source, &dest),
        InstallMode::Symlink => {
            replace_with_copy(&source, &canonical)?;
            if dest == canonical {
                return Ok(());
            }
            if let Err(e) = link_dir(&canonical, &dest) {
                warn!(dest = %dest.display(), error = %e, "symlink failed, copying instead");
                return replace_with_copy(&source, &dest);
            }
            Ok(())
        },
    })
    .await
    .map_err(|e| Error::message(format!("install task failed: {e}")))?
}

async fn remove_path(path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || remove_existing(&path).map_err(|e| Error::filesystem(&path, e)))
        .await
        .map_err(|e| Error::message(format!("remove task failed: {e}")))?
}

fn remove_existing(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Replace `dest` with a copy of `source`, skipping `.git` and links.
fn replace_with_copy(source: &Path, dest: &Path) -> Result<()> {
    remove_existing(dest).map_err(|e| Error::filesystem(dest, e))?;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            Error::filesystem(&path, std::io::Error::other(e.to_string()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::message(e.to_string()))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| Error::filesystem(&target, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| Error::filesystem(&target, e))?;
        }
    }
    Ok(())
}

fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    remove_existing(link)?;
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::other("symlinks are not supported on this platform"))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("My Cool Skill!! v2", "my-cool-skill-v2")]
    #[case("pdf", "pdf")]
    #[case("  --Weird__Name..  ", "weird__name")]
    #[case("../../etc/passwd", "etc-passwd")]
    #[case("v1.2.0", "v1.2.0")]
    #[case("日本語", "unnamed-skill")]
    #[case("", "unnamed-skill")]
    fn sanitizes_names(#[case] input: &str, #[case] expected: &str) {
        let once = sanitize_name(input);
        assert_eq!(once, expected);
        assert_eq!(sanitize_name(&once), once);
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_name(&long).len(), 255);
        let dotted = format!("{}.b", "a".repeat(254));
        let capped = sanitize_name(&dotted);
        assert_eq!(capped.len(), 254);
        assert_eq!(sanitize_name(&capped), capped);
    }

    #[test]
    fn path_functions() {
        let project = InstallScope::Project(PathBuf::from("/work/app"));
        let global = InstallScope::Global(PathBuf::from("/home/me"));

        assert_eq!(
            get_canonical_path(&project, "My Skill"),
            PathBuf::from("/work/app/.agents/skills/my-skill")
        );
        assert_eq!(
            get_install_path(&project, &AgentType::ClaudeCode, "pdf").unwrap(),
            PathBuf::from("/work/app/.claude/skills/pdf")
        );
        assert_eq!(
            get_install_path(&global, &AgentType::Opencode, "pdf").unwrap(),
            PathBuf::from("/home/me/.config/opencode/skills/pdf")
        );
        assert!(get_install_path(&global, &AgentType::Other("nope".into()), "pdf").is_err());
    }

    #[test]
    fn lock_path_follows_scope() {
        let mut config = SkillsConfig::default();
        config.lock_file = Some(PathBuf::from("/home/me/.agents/.skill-lock.json"));
        assert_eq!(
            scope_lock_path(&InstallScope::Project(PathBuf::from("/work/a")), &config),
            PathBuf::from("/work/a/.agents/.skill-lock.json")
        );
        assert_eq!(
            scope_lock_path(&InstallScope::Global(PathBuf::from("/home/me")), &config),
            PathBuf::from("/home/me/.agents/.skill-lock.json")
        );
    }

    #[test]
    fn install_mode_parses() {
        assert_eq!("copy".parse::<InstallMode>().unwrap(), InstallMode::Copy);
        assert_eq!("Symlink".parse::<InstallMode>().unwrap(), InstallMode::Symlink);
        assert!("git".parse::<InstallMode>().is_err());
    }

    #[test]
    fn copy_replaces_previous_contents_and_skips_git() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("SKILL.md"), "new").unwrap();
        std::fs::create_dir_all(src.path().join(".git")).unwrap();
        std::fs::write(src.path().join(".git/HEAD"), "x").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("skill");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.md"), "old").unwrap();

        replace_with_copy(src.path(), &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "new");
        assert!(!dest.join("stale.md").exists());
        assert!(!dest.join(".git").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_mode_links_to_canonical() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("SKILL.md"), "body").unwrap();
        let out = tempfile::tempdir().unwrap();
        let canonical = out.path().join(".agents/skills/pdf");
        let dest = out.path().join(".claude/skills/pdf");

        write_skill_files(src.path().to_path_buf(), dest.clone(), canonical.clone(), InstallMode::Symlink)
            .await
            .unwrap();
        assert!(std::fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "body");

        remove_path(dest.clone()).await.unwrap();
        assert!(!dest.exists());
        assert!(canonical.join("SKILL.md").is_file());
    }
}

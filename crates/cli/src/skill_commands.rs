//! Handlers for `skills add | list | remove | agents`.

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Args, ValueEnum},
    skillpack_config::SkillsConfig,
    skillpack_skills::{
        AgentType, InstallMode, InstallScope, Installer, LockStore, SkillLockFile,
        agents::{agents, detect_installed_agents, get_agent_config},
        install::scope_lock_path,
        parse_source,
        remote::DefaultFetcher,
        source::{GITHUB_API, RepoProbe},
    },
    tracing::{debug, warn},
};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ModeArg {
    #[default]
    Copy,
    Symlink,
}

impl From<ModeArg> for InstallMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Copy => Self::Copy,
            ModeArg::Symlink => Self::Symlink,
        }
    }
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// owner/repo, a git URL, a docs site, a well-known endpoint, or a bundle URL.
    pub source: String,
    /// Target agent; repeat for several.
    #[arg(short, long = "agent")]
    pub agents: Vec<String>,
    /// Install into the home directory instead of the current project.
    #[arg(short, long)]
    pub global: bool,
    #[arg(long, value_enum, default_value_t)]
    pub mode: ModeArg,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(short, long)]
    pub agent: Option<String>,
    #[arg(short, long)]
    pub global: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Skill name.
    pub name: String,
    #[arg(short, long)]
    pub agent: String,
    #[arg(short, long)]
    pub global: bool,
}

pub struct CliContext {
    pub config: SkillsConfig,
    pub home: PathBuf,
    pub cwd: PathBuf,
    /// Global lock; also holds `lastSelectedAgents`.
    pub lock_store: LockStore,
}

impl CliContext {
    pub fn load() -> anyhow::Result<Self> {
        let config = skillpack_config::load();
        let home = skillpack_config::home_dir().context("could not determine home directory")?;
        let cwd = std::env::current_dir()?;
        let lock_store = LockStore::new(skillpack_config::skill_lock_path(&config));
        Ok(Self {
            config,
            home,
            cwd,
            lock_store,
        })
    }

    fn scope(&self, global: bool) -> InstallScope {
        if global {
            InstallScope::Global(self.home.clone())
        } else {
            InstallScope::Project(self.cwd.clone())
        }
    }

    /// Lock file for installs in the chosen scope.
    fn scope_lock(&self, global: bool) -> LockStore {
        LockStore::new(scope_lock_path(&self.scope(global), &self.config))
    }

    fn installer(&self, global: bool) -> Installer {
        let client = reqwest::Client::new();
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .ok();
        Installer::new(self.config.clone(), self.scope(global), self.scope_lock(global))
            .with_fetcher(DefaultFetcher::new(client.clone()))
            .with_probe(RepoProbe::new(client.clone()).with_token(token))
            .with_folder_hashes(client, GITHUB_API)
    }
}

/// Explicit flags, then configured defaults, then the last selection, then
/// whatever is installed on this machine.
pub fn resolve_agents(
    flags: &[String],
    config: &SkillsConfig,
    lock: &SkillLockFile,
    detected: impl FnOnce() -> Vec<AgentType>,
) -> Vec<AgentType> {
    let from_names = |names: &[String]| -> Vec<AgentType> {
        let mut out: Vec<AgentType> = Vec::new();
        for agent in names.iter().map(|n| AgentType::from(n.as_str())) {
            if !out.contains(&agent) {
                out.push(agent);
            }
        }
        out
    };
    if !flags.is_empty() {
        return from_names(flags);
    }
    if !config.default_agents.is_empty() {
        return from_names(&config.default_agents);
    }
    if !lock.get_last_selected_agents().is_empty() {
        return lock.get_last_selected_agents().to_vec();
    }
    detected()
}

pub async fn handle_add(ctx: &CliContext, args: AddArgs) -> anyhow::Result<()> {
    let source = parse_source(&args.source)?;
    let lock = ctx.lock_store.read_skill_lock();
    let agents = resolve_agents(&args.agents, &ctx.config, &lock, || {
        detect_installed_agents(&ctx.home)
    });
    if agents.is_empty() {
        anyhow::bail!("no agents selected or detected; pass --agent <name>");
    }
    for agent in &agents {
        if get_agent_config(agent).is_none() {
            anyhow::bail!("unknown agent '{agent}' (see `skills agents`)");
        }
    }
    debug!(%source, agents = ?agents, "resolved install targets");

    let installer = ctx.installer(args.global);
    for agent in &agents {
        let reports = installer
            .install_skill_for_agent(&source, agent, args.mode.into())
            .await
            .with_context(|| format!("installing {source} for {agent}"))?;
        for report in reports {
            println!(
                "{agent}: {} {} -> {}",
                report.action,
                report.skill,
                report.path.display()
            );
        }
    }

    let lock = ctx.lock_store.read_skill_lock();
    if lock.get_last_selected_agents() != agents.as_slice() {
        let lock = lock.save_selected_agents(&agents);
        if let Err(e) = ctx.lock_store.write_skill_lock(&lock) {
            warn!(error = %e, "failed to remember selected agents");
        }
    }
    Ok(())
}

pub fn handle_list(ctx: &CliContext, args: ListArgs) -> anyhow::Result<()> {
    let entries = match &args.agent {
        Some(agent) => ctx
            .installer(args.global)
            .list_installed_skills(&AgentType::from(agent.as_str())),
        None => ctx
            .scope_lock(args.global)
            .read_skill_lock()
            .get_all_locked_skills()
            .cloned()
            .collect(),
    };
    if entries.is_empty() {
        println!("No skills installed.");
        return Ok(());
    }
    for entry in entries {
        let agents: Vec<&str> = entry.agents.iter().map(AgentType::as_str).collect();
        println!("  {} [{}] from {}", entry.name, agents.join(", "), entry.source);
    }
    Ok(())
}

pub async fn handle_remove(ctx: &CliContext, args: RemoveArgs) -> anyhow::Result<()> {
    let agent = AgentType::from(args.agent.as_str());
    if ctx
        .installer(args.global)
        .remove_skill_for_agent(&args.name, &agent)
        .await?
    {
        println!("Removed '{}' for {agent}.", args.name);
    } else {
        println!("'{}' is not installed for {agent}.", args.name);
    }
    Ok(())
}

pub fn handle_agents(ctx: &CliContext) {
    let detected = detect_installed_agents(&ctx.home);
    for config in agents() {
        let marker = if detected.contains(&config.agent_type) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<16} {:<16} {}",
            config.agent_type.as_str(),
            config.display_name,
            config.skills_dir
        );
    }
}

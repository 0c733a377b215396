use std::{
    collections::HashSet,
    path::{Component, Path},
};

use {skillpack_config::SkillsConfig, tracing::warn, walkdir::WalkDir};

use crate::{
    agents::AgentType,
    error::{Error, Result},
    install::sanitize_name,
    parse,
    types::Skill,
};

/// Directories never scanned for skills.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "dist", "build", "__pycache__"];

pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Start the walk below the root.
    pub subpath: Option<String>,
    /// Keep walking even when the root itself is a skill.
    pub full_depth: bool,
    pub max_depth: usize,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            subpath: None,
            full_depth: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Skills found under a root, plus the files that failed to parse.
#[derive(Debug, Default)]
pub struct Discovery {
    pub skills: Vec<Skill>,
    pub errors: Vec<Error>,
}

/// Find every SKILL.md under `root`.
///
/// A directory containing SKILL.md is a skill and is not descended into. A
/// malformed file does not abort the walk; it lands in [`Discovery::errors`].
/// Duplicate names keep the first skill in walk order. Results are sorted by
/// name.
pub fn discover_skills(root: &Path, options: &DiscoverOptions) -> Result<Discovery> {
    let start = match &options.subpath {
        Some(subpath) => {
            if Path::new(subpath)
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
            {
                return Err(Error::invalid_source(subpath.as_str(), "subpath escapes the source root"));
            }
            root.join(subpath)
        },
        None => root.to_path_buf(),
    };
    if !start.is_dir() {
        return Err(Error::filesystem(
            &start,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    if start.join("SKILL.md").is_file() && !options.full_depth {
        collect(&start, &mut discovery, &mut seen);
        return Ok(discovery);
    }

    let mut walker = WalkDir::new(&start)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(&start).to_path_buf();
                warn!(path = %path.display(), error = %e, "skipping unreadable path");
                discovery.errors.push(Error::skill_parse(&path, e.to_string()));
                continue;
            },
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_root = entry.depth() == 0;
        if !is_root && SKIP_DIRS.iter().any(|skip| entry.file_name() == *skip) {
            walker.skip_current_dir();
            continue;
        }
        if entry.path().join("SKILL.md").is_file() {
            collect(entry.path(), &mut discovery, &mut seen);
            if !is_root {
                walker.skip_current_dir();
            }
        }
    }

    discovery.skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(discovery)
}

fn collect(dir: &Path, discovery: &mut Discovery, seen: &mut HashSet<String>) {
    let skill_md = dir.join("SKILL.md");
    let parsed = std::fs::read_to_string(&skill_md)
        .map_err(|e| Error::skill_parse(&skill_md, e.to_string()))
        .and_then(|content| parse::parse_skill_md(&content, dir));

    match parsed {
        Ok(skill) => {
            if seen.insert(sanitize_name(&skill.name)) {
                discovery.skills.push(skill);
            } else {
                warn!(skill = %skill.name, path = %dir.display(), "duplicate skill name, keeping the first");
            }
        },
        Err(e) => {
            warn!(path = %skill_md.display(), error = %e, "failed to parse SKILL.md");
            discovery.errors.push(e);
        },
    }
}

/// Which discovered skills an install should keep.
#[derive(Debug, Clone, Default)]
pub struct SkillFilter {
    pub agent: Option<AgentType>,
    pub include_internal: bool,
    /// Keep only the skill with this (sanitized) name.
    pub skill: Option<String>,
}

pub fn filter_skills(skills: Vec<Skill>, filter: &SkillFilter) -> Vec<Skill> {
    let wanted = filter.skill.as_deref().map(sanitize_name);
    skills
        .into_iter()
        .filter(|s| filter.agent.as_ref().is_none_or(|agent| s.supports(agent)))
        .filter(|s| filter.include_internal || !s.internal)
        .filter(|s| wanted.as_ref().is_none_or(|w| sanitize_name(&s.name) == *w))
        .collect()
}

pub fn should_install_internal_skills(config: &SkillsConfig) -> bool {
    config.install_internal_skills
}

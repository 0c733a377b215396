use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::{
    agents::AgentType,
    error::{Error, Result},
    types::Skill,
};

/// Parse a SKILL.md file found in `skill_dir`.
///
/// `name` and `description` are required. `metadata.internal: true` marks an
/// internal skill; `agents` (top level or under `metadata`) restricts the
/// skill to the listed agents.
pub fn parse_skill_md(content: &str, skill_dir: &Path) -> Result<Skill> {
    let skill_md = skill_dir.join("SKILL.md");
    let (frontmatter, body) =
        split_frontmatter(content).map_err(|reason| Error::skill_parse(&skill_md, reason))?;

    let raw: Mapping = if frontmatter.is_empty() {
        Mapping::new()
    } else {
        serde_yaml::from_str(frontmatter)
            .map_err(|e| Error::skill_parse(&skill_md, format!("invalid frontmatter: {e}")))?
    };

    let name = required_str(&raw, "name").ok_or_else(|| Error::skill_parse(&skill_md, "missing 'name'"))?;
    let description = required_str(&raw, "description")
        .ok_or_else(|| Error::skill_parse(&skill_md, "missing 'description'"))?;

    let metadata = raw.get("metadata").and_then(Value::as_mapping);
    let internal = metadata
        .and_then(|m| m.get("internal"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let agents = raw
        .get("agents")
        .or_else(|| metadata.and_then(|m| m.get("agents")))
        .and_then(agent_list);

    Ok(Skill {
        display_name: skill_display_name(&raw, &name),
        name,
        description,
        source_path: skill_dir.to_path_buf(),
        agents,
        internal,
        raw_frontmatter: raw,
        body: body.to_string(),
    })
}

/// Human-facing name: `display-name`, then `title`, then `name`.
pub fn skill_display_name(frontmatter: &Mapping, name: &str) -> String {
    ["display-name", "displayName", "title"]
        .iter()
        .find_map(|key| required_str(frontmatter, key))
        .unwrap_or_else(|| name.to_string())
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
pub fn split_frontmatter(content: &str) -> std::result::Result<(&str, &str), String> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err("SKILL.md must start with YAML frontmatter delimited by ---".into());
    };
    let close = after_open
        .find("\n---")
        .ok_or_else(|| "missing closing --- for frontmatter".to_string())?;

    let frontmatter = after_open[..close].trim();
    let rest = &after_open[close + 4..];
    // Drop the remainder of the closing delimiter line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    Ok((frontmatter, body.trim()))
}

fn required_str(map: &Mapping, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn agent_list(value: &Value) -> Option<Vec<AgentType>> {
    match value {
        Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(AgentType::from)
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(AgentType::from)
                .collect(),
        ),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_skill() {
        let content = "---\nname: pdf\ndescription: Work with PDFs\n---\n# PDF\n\nUse it.\n";
        let skill = parse_skill_md(content, Path::new("/tmp/pdf")).unwrap();
        assert_eq!(skill.name, "pdf");
        assert_eq!(skill.display_name, "pdf");
        assert_eq!(skill.description, "Work with PDFs");
        assert_eq!(skill.body, "# PDF\n\nUse it.");
        assert!(!skill.internal);
        assert!(skill.agents.is_none());
        assert!(skill.supports(&AgentType::Cursor));
    }

    #[test]
    fn reads_metadata_and_agents() {
        let content = r#"---
name: release
description: Cut a release
title: Release Helper
metadata:
  internal: true
  agents: [claude-code, codex]
---
Body
"#;
        let skill = parse_skill_md(content, Path::new("/s")).unwrap();
        assert!(skill.internal);
        assert_eq!(skill.display_name, "Release Helper");
        assert_eq!(
            skill.agents,
            Some(vec![AgentType::ClaudeCode, AgentType::Codex])
        );
        assert!(!skill.supports(&AgentType::Cursor));
        assert!(skill.raw_frontmatter.contains_key("metadata"));
    }

    #[test]
    fn top_level_agents_string() {
        let content = "---\nname: a\ndescription: b\nagents: cursor, windsurf\n---\n";
        let skill = parse_skill_md(content, Path::new("/s")).unwrap();
        assert_eq!(
            skill.agents,
            Some(vec![AgentType::Cursor, AgentType::Windsurf])
        );
    }

    #[test]
    fn missing_required_fields() {
        let no_desc = parse_skill_md("---\nname: x\n---\n", Path::new("/s")).unwrap_err();
        assert!(matches!(no_desc, Error::SkillParse { ref reason, .. } if reason.contains("description")));

        let no_name = parse_skill_md("---\ndescription: x\n---\n", Path::new("/s")).unwrap_err();
        assert!(matches!(no_name, Error::SkillParse { ref reason, .. } if reason.contains("name")));
    }

    #[test]
    fn rejects_missing_frontmatter() {
        assert!(parse_skill_md("# Just markdown", Path::new("/s")).is_err());
        assert!(parse_skill_md("---\nname: x\n", Path::new("/s")).is_err());
        assert!(parse_skill_md("---\n: [bad\n---\n", Path::new("/s")).is_err());
    }

    #[test]
    fn split_handles_bom_and_empty_body() {
        let (fm, body) = split_frontmatter("\u{feff}---\nname: a\n---").unwrap();
        assert_eq!(fm, "name: a");
        assert_eq!(body, "");
    }
}

//! Content hashes used for change detection.

use std::path::Path;

use {
    serde::Deserialize,
    sha2::{Digest, Sha256},
    tracing::debug,
    walkdir::WalkDir,
};

use crate::{
    error::{Error, Result},
    source::{GITHUB_API, USER_AGENT, get_owner_repo},
    types::{GitHost, ParsedSource, Skill},
};

/// Hash of a skill's folder on disk.
pub fn compute_content_hash(skill: &Skill) -> Result<String> {
    compute_folder_hash(&skill.source_path)
}

/// SHA-256 over every regular file below `dir`, excluding `.git/`.
///
/// Files are visited in order of their `/`-joined relative path and fed as
/// `path \0 len(u64 LE) bytes`, so the digest depends only on paths and
/// contents, never on walk order or timestamps.
pub fn compute_folder_hash(dir: &Path) -> Result<String> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::filesystem(&path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::message(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (relative, path) in &files {
        let bytes = std::fs::read(path).map_err(|e| Error::filesystem(path, e))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

/// Remote tree SHA of a skill folder, via the GitHub git trees API.
pub async fn fetch_skill_folder_hash(
    client: &reqwest::Client,
    source: &ParsedSource,
    skill_path: &str,
) -> Result<Option<String>> {
    fetch_skill_folder_hash_from(client, GITHUB_API, source, skill_path).await
}

/// Same as [`fetch_skill_folder_hash`] against an explicit API base.
///
/// `Ok(None)` when the folder is not in the tree.
pub async fn fetch_skill_folder_hash_from(
    client: &reqwest::Client,
    api_base: &str,
    source: &ParsedSource,
    skill_path: &str,
) -> Result<Option<String>> {
    if source.host() != Some(GitHost::Github) {
        return Err(Error::unsupported("fetch_skill_folder_hash", source.kind_name()));
    }
    let (owner, repo) = get_owner_repo(source)?;
    let git_ref = source.git_ref().unwrap_or("HEAD");
    let url = format!("{api_base}/repos/{owner}/{repo}/git/trees/{git_ref}?recursive=1");

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .map_err(|e| Error::network(format!("fetching tree for {owner}/{repo}"), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url,
            status: status.as_u16(),
        });
    }
    let tree: TreeResponse = response
        .json()
        .await
        .map_err(|e| Error::network(format!("reading tree for {owner}/{repo}"), e))?;

    let folder = skill_path.trim_matches('/');
    let folder = folder.strip_suffix("/SKILL.md").unwrap_or(folder);
    if folder.is_empty() || folder == "SKILL.md" {
        return Ok(Some(tree.sha));
    }
    let sha = tree
        .tree
        .into_iter()
        .find(|e| e.kind == "tree" && e.path == folder)
        .map(|e| e.sha);
    debug!(%owner, %repo, folder, found = sha.is_some(), "resolved remote folder hash");
    Ok(sha)
}

//! Downloads for URL-based sources, plus the fetcher seam the installer uses.

use std::path::{Component, Path, PathBuf};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    git::{self, TempCheckout},
    source::USER_AGENT,
    types::ParsedSource,
};

const WELL_KNOWN_PATH: &str = "/.well-known/skills";

/// Materializes a parsed source into a scoped temporary directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn materialize(&self, source: &ParsedSource) -> Result<TempCheckout>;
}

/// Clones git sources and downloads everything else over HTTP.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn materialize(&self, source: &ParsedSource) -> Result<TempCheckout> {
        match source {
            ParsedSource::GitShorthand { .. } | ParsedSource::GitUrl { .. } => {
                git::clone_repo(source).await
            },
            ParsedSource::DocSite { .. }
            | ParsedSource::RemoteBundle { .. }
            | ParsedSource::WellKnown { .. } => download_source(&self.client, source).await,
        }
    }
}

/// Download a doc-site, well-known, or remote-bundle source.
pub async fn download_source(client: &reqwest::Client, source: &ParsedSource) -> Result<TempCheckout> {
    let checkout = TempCheckout::new()?;
    match source {
        ParsedSource::DocSite { url } => {
            let url = doc_site_skill_url(url);
            let body = get_text(client, &url).await?;
            write_file(checkout.root(), Path::new("SKILL.md"), body.as_bytes()).await?;
        },
        ParsedSource::WellKnown { url } => {
            download_well_known(client, url, checkout.root()).await?;
        },
        ParsedSource::RemoteBundle { url } => {
            let bytes = get_bytes(client, url).await?;
            if is_tarball(url) {
                extract_tarball(bytes, checkout.root().to_path_buf()).await?;
            } else {
                write_file(checkout.root(), Path::new("SKILL.md"), &bytes).await?;
            }
        },
        ParsedSource::GitShorthand { .. } | ParsedSource::GitUrl { .. } => {
            return Err(Error::unsupported("download_source", source.kind_name()));
        },
    }
    info!(source = %source, path = %checkout.root().display(), "downloaded remote source");
    Ok(checkout)
}

// ── Well-known index ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WellKnownIndex {
    #[serde(default)]
    skills: Vec<WellKnownSkill>,
}

#[derive(Debug, Deserialize)]
struct WellKnownSkill {
    name: String,
    #[serde(default)]
    files: Vec<String>,
}

async fn download_well_known(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let base = well_known_base(url);
    let index_url = format!("{base}{WELL_KNOWN_PATH}/index.json");
    let index: WellKnownIndex = serde_json::from_str(&get_text(client, &index_url).await?)?;

    // Validate the whole index before any file is fetched.
    let mut plan = Vec::with_capacity(index.skills.len());
    for skill in &index.skills {
        let skill_dir = safe_relative(&skill.name)
            .filter(|p| p.components().count() == 1)
            .ok_or_else(|| Error::invalid_source(url, format!("unsafe skill name '{}'", skill.name)))?;
        let mut files = skill.files.clone();
        if !files.iter().any(|f| f == "SKILL.md") {
            files.insert(0, "SKILL.md".into());
        }
        let files = files
            .into_iter()
            .map(|file| -> Result<(String, PathBuf)> {
                let relative = safe_relative(&file)
                    .ok_or_else(|| Error::invalid_source(url, format!("unsafe file path '{file}'")))?;
                Ok((file, relative))
            })
            .collect::<Result<Vec<_>>>()?;
        plan.push((skill, skill_dir, files));
    }

    for (skill, skill_dir, files) in plan {
        for (file, relative) in &files {
            let file_url = format!(
                "{base}{WELL_KNOWN_PATH}/{}/{}",
                urlencoding::encode(&skill.name),
                encode_path(file)
            );
            let bytes = get_bytes(client, &file_url).await?;
            write_file(dest, &skill_dir.join(relative), &bytes).await?;
        }
        debug!(skill = %skill.name, files = files.len(), "fetched well-known skill");
    }
    Ok(())
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn well_known_base(url: &str) -> &str {
    url.find(WELL_KNOWN_PATH)
        .map_or(url.trim_end_matches('/'), |idx| &url[..idx])
}

fn doc_site_skill_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.to_ascii_lowercase().ends_with("/skill.md") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/skill.md")
    }
}

fn is_tarball(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

fn safe_relative(raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw);
    if raw.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(path.to_path_buf())
}

// ── HTTP ────────────────────────────────────────────────────────────────────

async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::network(format!("GET {url}"), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    get(client, url)
        .await?
        .text()
        .await
        .map_err(|e| Error::network(format!("reading {url}"), e))
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    get(client, url)
        .await?
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| Error::network(format!("reading {url}"), e))
}

async fn write_file(root: &Path, relative: &Path, contents: &[u8]) -> Result<()> {
    let dest = root.join(relative);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::filesystem(parent, e))?;
    }
    tokio::fs::write(&dest, contents)
        .await
        .map_err(|e| Error::filesystem(&dest, e))
}

// ── Tarballs ────────────────────────────────────────────────────────────────

async fn extract_tarball(bytes: Vec<u8>, target: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || unpack_tarball(&bytes, &target))
        .await
        .map_err(|e| Error::message(format!("tarball extraction task failed: {e}")))?
}

fn unpack_tarball(bytes: &[u8], target: &Path) -> Result<()> {
    let io_err = |e: std::io::Error| Error::filesystem(target, e);
    let canonical_target = std::fs::canonicalize(target).map_err(io_err)?;
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("skipping link entry in skill bundle");
            continue;
        }

        let path = entry.path().map_err(io_err)?.into_owned();
        let Some(relative) = sanitize_archive_path(&path)? else {
            continue;
        };
        let dest = target.join(&relative);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
            let canonical_parent =
                std::fs::canonicalize(parent).map_err(|e| Error::filesystem(parent, e))?;
            if !canonical_parent.starts_with(&canonical_target) {
                return Err(Error::message(format!(
                    "bundle entry {} escapes the extraction directory",
                    path.display()
                )));
            }
        }

        if entry_type.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::filesystem(&dest, e))?;
        } else if entry_type.is_file() {
            entry.unpack(&dest).map_err(|e| Error::filesystem(&dest, e))?;
        }
    }
    Ok(())
}

fn sanitize_archive_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::message(format!(
                    "bundle contains unsafe path {}",
                    path.display()
                )));
            },
        }
    }
    Ok((!clean.as_os_str().is_empty()).then_some(clean))
}

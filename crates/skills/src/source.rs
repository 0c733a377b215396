//! Source string classification and repository visibility probes.

use {async_trait::async_trait, tracing::warn, url::Url};

use crate::{
    error::{Error, Result},
    types::{GitHost, ParsedSource},
};

pub const GITHUB_API: &str = "https://api.github.com";
pub const GITLAB_API: &str = "https://gitlab.com/api/v4";
pub(crate) const USER_AGENT: &str = concat!("skillpack/", env!("CARGO_PKG_VERSION"));

/// Classify a source string.
///
/// First match wins: `owner/repo` shorthand, git URL, doc-site export,
/// well-known index, then any other HTTP(S) URL.
pub fn parse_source(raw: &str) -> Result<ParsedSource> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(Error::invalid_source(raw, "empty source"));
    }
    if let Some(parsed) = parse_shorthand(input)? {
        return Ok(parsed);
    }
    if let Some(parsed) = parse_git_url(input)? {
        return Ok(parsed);
    }

    let url = Url::parse(input)
        .map_err(|_| Error::invalid_source(raw, "expected owner/repo or an http(s) URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid_source(
            raw,
            format!("unsupported URL scheme '{}'", url.scheme()),
        ));
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = url.path();

    if host.ends_with(".mintlify.app") || host.ends_with(".mintlify.dev") || path.ends_with("/skill.md")
    {
        return Ok(ParsedSource::DocSite {
            url: input.to_string(),
        });
    }
    if path.contains("/.well-known/skills") {
        return Ok(ParsedSource::WellKnown {
            url: input.to_string(),
        });
    }
    Ok(ParsedSource::RemoteBundle {
        url: input.to_string(),
    })
}

/// Extract `(owner, repo)` from a git source.
pub fn get_owner_repo(source: &ParsedSource) -> Result<(String, String)> {
    match source {
        ParsedSource::GitShorthand { owner, repo, .. } | ParsedSource::GitUrl { owner, repo, .. } => {
            Ok((owner.clone(), repo.clone()))
        },
        ParsedSource::DocSite { .. }
        | ParsedSource::RemoteBundle { .. }
        | ParsedSource::WellKnown { .. } => {
            Err(Error::unsupported("get_owner_repo", source.kind_name()))
        },
    }
}

/// Parse a source string and extract `(owner, repo)`.
/// Accepts `owner/repo`, `https://github.com/owner/repo`, or with trailing slash/`.git`.
pub fn parse_owner_repo(raw: &str) -> Result<(String, String)> {
    get_owner_repo(&parse_source(raw)?)
}

// ── Shorthand ───────────────────────────────────────────────────────────────

fn parse_shorthand(input: &str) -> Result<Option<ParsedSource>> {
    if input.contains("://") || input.starts_with("git@") || input.contains(char::is_whitespace) {
        return Ok(None);
    }

    let (main, fragment) = match input.split_once('#') {
        Some((main, fragment)) => (main, Some(fragment)),
        None => (input, None),
    };
    let (path, skill) = match main.split_once('@') {
        Some((path, skill)) => (path, Some(skill)),
        None => (main, None),
    };

    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    if segments.len() < 2 || !is_login(segments[0]) {
        return Ok(None);
    }
    let repo = segments[1].trim_end_matches(".git");
    if !is_repo_name(repo) {
        return Ok(None);
    }

    // The whole fragment is the ref; branch names may contain `/`.
    let subpath = join_subpath(&segments[2..]);
    let git_ref = fragment.filter(|f| !f.is_empty()).map(ToOwned::to_owned);
    check_subpath(input, subpath.as_deref())?;

    let skill = match skill {
        Some("") => return Err(Error::invalid_source(input, "empty skill name after '@'")),
        Some(s) => Some(s.to_string()),
        None => None,
    };

    Ok(Some(ParsedSource::GitShorthand {
        owner: segments[0].to_string(),
        repo: repo.to_string(),
        git_ref,
        subpath,
        skill,
    }))
}

/// GitHub-style login: ASCII alphanumerics, `-` and `_`, no dots.
fn is_login(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_repo_name(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn join_subpath(segments: &[&str]) -> Option<String> {
    let parts: Vec<&str> = segments.iter().copied().filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn check_subpath(input: &str, subpath: Option<&str>) -> Result<()> {
    if subpath.is_some_and(|p| p.split('/').any(|seg| seg == ".." || seg == ".")) {
        return Err(Error::invalid_source(
            input,
            "subpath must not contain '.' or '..' segments",
        ));
    }
    Ok(())
}

// ── Git URLs ────────────────────────────────────────────────────────────────

fn parse_git_url(input: &str) -> Result<Option<ParsedSource>> {
    // scp-like: git@host:owner/repo.git
    if let Some(rest) = input.strip_prefix("git@") {
        let Some((host, path)) = rest.split_once(':') else {
            return Err(Error::invalid_source(input, "expected git@host:owner/repo"));
        };
        let (owner, repo) = owner_repo_from_tail(input, path)?;
        return Ok(Some(ParsedSource::GitUrl {
            host: GitHost::from_domain(host),
            url: input.to_string(),
            owner,
            repo,
            git_ref: None,
            subpath: None,
        }));
    }

    let lower = input.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("github.com/") || lower.starts_with("gitlab.com/") {
        format!("https://{input}")
    } else if input.contains("://") {
        input.to_string()
    } else {
        return Ok(None);
    };
    let Ok(url) = Url::parse(&with_scheme) else {
        return Ok(None);
    };
    let Some(domain) = url.host_str() else {
        return Ok(None);
    };

    let host = GitHost::from_domain(domain);
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match host {
        GitHost::Github => parse_github_path(input, &segments).map(Some),
        GitHost::Gitlab => parse_gitlab_path(input, &segments).map(Some),
        GitHost::Other(_) => {
            let is_git_scheme = matches!(url.scheme(), "ssh" | "git");
            if !is_git_scheme && !url.path().ends_with(".git") {
                return Ok(None);
            }
            let (owner, repo) = owner_repo_from_tail(input, url.path())?;
            Ok(Some(ParsedSource::GitUrl {
                host,
                url: input.to_string(),
                owner,
                repo,
                git_ref: None,
                subpath: None,
            }))
        },
    }
}

/// `/owner/repo[.git][/tree|blob/<ref>/<subpath>]`
fn parse_github_path(input: &str, segments: &[&str]) -> Result<ParsedSource> {
    if segments.len() < 2 {
        return Err(Error::invalid_source(
            input,
            "expected 'owner/repo' or GitHub URL",
        ));
    }
    let owner = segments[0].to_string();
    let repo = segments[1].trim_end_matches(".git").to_string();
    let (git_ref, subpath) = ref_and_subpath(&segments[2..]);
    check_subpath(input, subpath.as_deref())?;
    Ok(ParsedSource::GitUrl {
        host: GitHost::Github,
        url: format!("https://github.com/{owner}/{repo}.git"),
        owner,
        repo,
        git_ref,
        subpath,
    })
}

/// `/group[/subgroup...]/repo[.git][/-/tree/<ref>/<subpath>]`
fn parse_gitlab_path(input: &str, segments: &[&str]) -> Result<ParsedSource> {
    let (project, rest) = match segments.iter().position(|s| *s == "-") {
        Some(idx) => (&segments[..idx], &segments[idx + 1..]),
        None => (segments, &[][..]),
    };
    if project.len() < 2 {
        return Err(Error::invalid_source(input, "expected gitlab.com/owner/repo"));
    }
    let repo = project[project.len() - 1].trim_end_matches(".git").to_string();
    let owner = project[..project.len() - 1].join("/");
    let (git_ref, subpath) = ref_and_subpath(rest);
    check_subpath(input, subpath.as_deref())?;
    Ok(ParsedSource::GitUrl {
        host: GitHost::Gitlab,
        url: format!("https://gitlab.com/{owner}/{repo}.git"),
        owner,
        repo,
        git_ref,
        subpath,
    })
}

/// `tree/<ref>/<subpath...>`; a `blob/<ref>/.../SKILL.md` link resolves to
/// the directory holding the file.
fn ref_and_subpath(rest: &[&str]) -> (Option<String>, Option<String>) {
    match rest {
        [kind, git_ref, tail @ ..] if *kind == "tree" || *kind == "blob" => {
            let mut tail = tail.to_vec();
            if *kind == "blob" {
                tail.pop();
            }
            (Some((*git_ref).to_string()), join_subpath(&tail))
        },
        _ => (None, None),
    }
}

fn owner_repo_from_tail(input: &str, path: &str) -> Result<(String, String)> {
    let segments: Vec<&str> = path
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        [.., owner, repo] => Ok(((*owner).to_string(), (*repo).to_string())),
        _ => Err(Error::invalid_source(input, "git URL must name owner/repo")),
    }
}

// ── Visibility probes ───────────────────────────────────────────────────────

/// Decides whether a git source is private. Consumed by the installer.
#[async_trait]
pub trait VisibilityProbe: Send + Sync {
    async fn is_private(&self, source: &ParsedSource) -> Result<bool>;
}

/// Read-only existence probe against the hosting provider's public API.
#[derive(Debug, Clone)]
pub struct RepoProbe {
    client: reqwest::Client,
    github_api: String,
    gitlab_api: String,
    token: Option<String>,
}

impl Default for RepoProbe {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl RepoProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            github_api: GITHUB_API.into(),
            gitlab_api: GITLAB_API.into(),
            token: None,
        }
    }

    #[must_use]
    pub fn with_github_api(mut self, base: impl Into<String>) -> Self {
        self.github_api = base.into();
        self
    }

    #[must_use]
    pub fn with_gitlab_api(mut self, base: impl Into<String>) -> Self {
        self.gitlab_api = base.into();
        self
    }

    /// Bearer token sent with every probe.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// `true` when the repo is private or does not exist.
    ///
    /// 404/403 and any other non-success status count as private; only an
    /// explicit "public" answer returns `false`. Transport failures surface
    /// as [`Error::Network`].
    pub async fn is_repo_private(&self, host: &GitHost, owner: &str, repo: &str) -> Result<bool> {
        let url = match host {
            GitHost::Github => format!("{}/repos/{owner}/{repo}", self.github_api),
            GitHost::Gitlab => format!(
                "{}/projects/{}",
                self.gitlab_api,
                urlencoding::encode(&format!("{owner}/{repo}"))
            ),
            GitHost::Other(domain) => {
                tracing::debug!(%domain, "no visibility API for host, assuming private");
                return Ok(true);
            },
        };

        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::network(format!("probing {owner}/{repo}"), e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(true);
        }
        if !status.is_success() {
            warn!(%owner, %repo, status = status.as_u16(), "ambiguous visibility probe response, assuming private");
            return Ok(true);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::network(format!("reading probe response for {owner}/{repo}"), e))?;
        let public = match host {
            GitHost::Github => body.get("private").and_then(serde_json::Value::as_bool) == Some(false),
            GitHost::Gitlab | GitHost::Other(_) => {
                body.get("visibility").and_then(serde_json::Value::as_str) == Some("public")
            },
        };
        Ok(!public)
    }
}

#[async_trait]
impl VisibilityProbe for RepoProbe {
    async fn is_private(&self, source: &ParsedSource) -> Result<bool> {
        let (owner, repo) = get_owner_repo(source)?;
        let host = source.host().unwrap_or(GitHost::Github);
        self.is_repo_private(&host, &owner, &repo).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn shorthand(owner: &str, repo: &str, git_ref: Option<&str>, subpath: Option<&str>) -> ParsedSource {
        ParsedSource::GitShorthand {
            owner: owner.into(),
            repo: repo.into(),
            git_ref: git_ref.map(Into::into),
            subpath: subpath.map(Into::into),
            skill: None,
        }
    }

    #[rstest]
    #[case("vercel-labs/agent-skills", "vercel-labs", "agent-skills", None, None)]
    #[case("acme/skill-pack#main", "acme", "skill-pack", Some("main"), None)]
    #[case("acme/skill-pack#feature/x", "acme", "skill-pack", Some("feature/x"), None)]
    #[case("acme/skill-pack/skills/pdf#release/1.2", "acme", "skill-pack", Some("release/1.2"), Some("skills/pdf"))]
    #[case("acme/skill-pack/skills/pdf#release", "acme", "skill-pack", Some("release"), Some("skills/pdf"))]
    #[case("acme/skill-pack/skills/pdf/", "acme", "skill-pack", None, Some("skills/pdf"))]
    #[case("under_score/pack.git", "under_score", "pack", None, None)]
    fn shorthand_variants(
        #[case] input: &str,
        #[case] owner: &str,
        #[case] repo: &str,
        #[case] git_ref: Option<&str>,
        #[case] subpath: Option<&str>,
    ) {
        assert_eq!(
            parse_source(input).unwrap(),
            shorthand(owner, repo, git_ref, subpath)
        );
    }

    #[rstest]
    #[case("acme/pack#feature/x")]
    #[case("acme/pack/skills/pdf#release/1.2")]
    #[case("acme/pack#main")]
    fn shorthand_display_keeps_ref_intact(#[case] input: &str) {
        let parsed = parse_source(input).unwrap();
        assert_eq!(parsed.to_string(), input);
        assert_eq!(parse_source(&parsed.to_string()).unwrap(), parsed);
    }

    #[test]
    fn shorthand_skill_selector() {
        let parsed = parse_source("acme/skill-pack@pdf-tools").unwrap();
        assert_eq!(parsed.skill_filter(), Some("pdf-tools"));
        assert_eq!(parsed.identity(), "acme/skill-pack");
        assert!(parse_source("acme/skill-pack@").is_err());
    }

    #[test]
    fn shorthand_rejects_traversal() {
        let err = parse_source("acme/pack/../../etc").unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
    }

    #[test]
    fn github_urls() {
        let parsed = parse_source("https://github.com/remotion-dev/skills").unwrap();
        assert_eq!(get_owner_repo(&parsed).unwrap(), ("remotion-dev".into(), "skills".into()));
        assert_eq!(parsed.clone_url().unwrap(), "https://github.com/remotion-dev/skills.git");

        let parsed = parse_source("https://github.com/owner/repo.git").unwrap();
        assert_eq!(parsed.kind_name(), "gitUrl");
        assert_eq!(get_owner_repo(&parsed).unwrap(), ("owner".into(), "repo".into()));

        let parsed = parse_source("github.com/owner/repo/").unwrap();
        assert_eq!(get_owner_repo(&parsed).unwrap(), ("owner".into(), "repo".into()));
        assert_eq!(parsed.host(), Some(GitHost::Github));
    }

    #[test]
    fn github_tree_url_carries_ref_and_subpath() {
        let parsed =
            parse_source("https://github.com/acme/pack/tree/dev/skills/pdf").unwrap();
        assert_eq!(parsed.git_ref(), Some("dev"));
        assert_eq!(parsed.subpath(), Some("skills/pdf"));

        let blob = parse_source("https://github.com/acme/pack/blob/main/skills/pdf/SKILL.md").unwrap();
        assert_eq!(blob.git_ref(), Some("main"));
        assert_eq!(blob.subpath(), Some("skills/pdf"));
    }

    #[test]
    fn gitlab_urls_support_groups() {
        let parsed =
            parse_source("https://gitlab.com/group/sub/repo/-/tree/main/skills").unwrap();
        assert_eq!(
            get_owner_repo(&parsed).unwrap(),
            ("group/sub".into(), "repo".into())
        );
        assert_eq!(parsed.git_ref(), Some("main"));
        assert_eq!(parsed.subpath(), Some("skills"));
        assert_eq!(parsed.identity(), "gitlab.com/group/sub/repo");
    }

    #[test]
    fn scp_and_generic_git_urls() {
        let parsed = parse_source("git@github.com:acme/pack.git").unwrap();
        assert_eq!(parsed.host(), Some(GitHost::Github));
        assert_eq!(get_owner_repo(&parsed).unwrap(), ("acme".into(), "pack".into()));

        let parsed = parse_source("https://git.example.org/team/skills.git").unwrap();
        assert_eq!(parsed.host(), Some(GitHost::Other("git.example.org".into())));
        assert_eq!(get_owner_repo(&parsed).unwrap(), ("team".into(), "skills".into()));
    }

    #[rstest]
    #[case("https://acme.mintlify.app/skill.md", "docSite")]
    #[case("https://docs.acme.dev/skill.md", "docSite")]
    #[case("https://acme.dev/.well-known/skills/index.json", "wellKnown")]
    #[case("https://acme.dev/.well-known/skills", "wellKnown")]
    #[case("https://cdn.acme.dev/bundles/pdf.tar.gz", "remoteBundle")]
    #[case("https://raw.example.com/skills/SKILL.md", "remoteBundle")]
    fn url_variants(#[case] input: &str, #[case] kind: &str) {
        let parsed = parse_source(input).unwrap();
        assert_eq!(parsed.kind_name(), kind);
        assert!(!parsed.is_git());
    }

    #[rstest]
    #[case("")]
    #[case("noslash")]
    #[case("ftp://example.com/skill.md")]
    #[case("/empty-owner")]
    #[case("https://github.com/only-owner")]
    fn invalid_sources(#[case] input: &str) {
        assert!(matches!(
            parse_source(input).unwrap_err(),
            Error::InvalidSource { .. }
        ));
    }

    #[test]
    fn owner_repo_unsupported_for_urls() {
        let parsed = parse_source("https://acme.dev/.well-known/skills").unwrap();
        assert!(matches!(
            get_owner_repo(&parsed).unwrap_err(),
            Error::UnsupportedOperation { .. }
        ));
        assert!(parse_owner_repo("https://example.com/x.md").is_err());
        assert_eq!(parse_owner_repo("a/b").unwrap(), ("a".into(), "b".into()));
    }

    #[test]
    fn parsed_source_serializes_with_kind_tag() {
        let parsed = parse_source("acme/pack#main").unwrap();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["kind"], "gitShorthand");
        assert_eq!(json["ref"], "main");
        let back: ParsedSource = serde_json::from_value(json).unwrap();
        assert_eq!(back, parsed);
    }

    // ── HTTP probes (with mockito) ──────────────────────────────────────

    #[tokio::test]
    async fn github_public_repo_is_not_private() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/pack")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"private":false}"#)
            .create_async()
            .await;

        let probe = RepoProbe::default().with_github_api(server.url());
        assert!(!probe.is_repo_private(&GitHost::Github, "acme", "pack").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn github_not_found_counts_as_private() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/secret")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let probe = RepoProbe::default().with_github_api(server.url());
        assert!(probe.is_repo_private(&GitHost::Github, "acme", "secret").await.unwrap());
    }

    #[tokio::test]
    async fn server_error_is_conservatively_private() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/pack")
            .with_status(502)
            .create_async()
            .await;

        let probe = RepoProbe::default().with_github_api(server.url());
        assert!(probe.is_repo_private(&GitHost::Github, "acme", "pack").await.unwrap());
    }

    #[tokio::test]
    async fn gitlab_visibility_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/projects/group%2Frepo")
            .with_status(200)
            .with_body(r#"{"visibility":"public"}"#)
            .create_async()
            .await;

        let probe = RepoProbe::default().with_gitlab_api(server.url());
        assert!(!probe.is_repo_private(&GitHost::Gitlab, "group", "repo").await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let probe = RepoProbe::default().with_github_api("http://127.0.0.1:1");
        let err = probe
            .is_repo_private(&GitHost::Github, "acme", "pack")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.is_retryable());
    }
}

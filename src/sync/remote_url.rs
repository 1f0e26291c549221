//! Parsing of remote URLs into GitHub owner/repository pairs.

use url::Url;

use crate::domain::GitHubRepo;

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

fn split_owner_repo(path: &str) -> Option<GitHubRepo> {
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.split('/');
    let owner = parts.next()?.trim();
    let repo = parts.next()?.trim();
    if owner.is_empty() || repo.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(GitHubRepo {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Parse a GitHub remote URL.
///
/// Accepts `https://github.com/owner/repo(.git)`, SCP-style
/// `git@github.com:owner/repo.git` and `ssh://git@github.com/owner/repo`.
/// Returns `None` for any other host.
pub fn parse_github_url(remote_url: &str) -> Option<GitHubRepo> {
    let remote_url = remote_url.trim();

    // SCP-style SSH has no scheme: [user@]host:path
    if !remote_url.contains("://") {
        let (user_host, path) = remote_url.split_once(':')?;
        let host = user_host.rsplit('@').next()?;
        if !GITHUB_HOSTS.contains(&host.to_lowercase().as_str()) {
            return None;
        }
        return split_owner_repo(path);
    }

    let url = Url::parse(remote_url).ok()?;
    if !matches!(url.scheme(), "https" | "http" | "ssh" | "git") {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    if !GITHUB_HOSTS.contains(&host.as_str()) {
        return None;
    }
    split_owner_repo(url.path())
}

//! Repository listing over the Bitbucket Cloud 2.0 API.
//!
//! Pagination is handled here: callers always receive the full accessible
//! listing for a workspace.

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

use crate::context::Repository;

pub trait GitProvider {
    fn list_repositories(&self, workspace: &str) -> Result<Vec<Repository>>;

    fn clone_url(&self, repository: &Repository) -> String {
        repository.clone_url.clone()
    }
}

/// Authentication material for the Bitbucket Cloud API.
#[derive(Debug, Clone)]
pub enum BitbucketAuth {
    Bearer(String),
    Basic {
        username: String,
        app_password: String,
    },
}

impl BitbucketAuth {
    fn header_value(&self) -> String {
        match self {
            BitbucketAuth::Bearer(token) => format!("Bearer {token}"),
            BitbucketAuth::Basic {
                username,
                app_password,
            } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{app_password}"));
                format!("Basic {encoded}")
            }
        }
    }
}

pub struct BitbucketCloudProvider {
    api_base: String,
    auth: BitbucketAuth,
    agent: ureq::Agent,
}

const PAGE_LEN: u32 = 100;

impl BitbucketCloudProvider {
    pub fn new(api_base: &str, auth: BitbucketAuth, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            auth,
            agent,
        }
    }

    fn fetch_page(&self, url: &str) -> Result<RepositoryPage> {
        let authorization = self.auth.header_value();
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", authorization.as_str())
            .header("Accept", "application/json")
            .call()
            .map_err(|err| anyhow!("Bitbucket repositories request failed for {url}: {err}"))?;
        response
            .body_mut()
            .read_json()
            .with_context(|| format!("parse Bitbucket repositories response from {url}"))
    }
}

impl GitProvider for BitbucketCloudProvider {
    fn list_repositories(&self, workspace: &str) -> Result<Vec<Repository>> {
        let encoded_workspace = urlencoding::encode(workspace);
        let mut url = format!(
            "{}/repositories/{}?pagelen={}",
            self.api_base, encoded_workspace, PAGE_LEN
        );
        let mut repositories = Vec::new();

        loop {
            let page = self.fetch_page(&url)?;
            for entry in page.values {
                match repository_from_entry(entry) {
                    Some(repository) => repositories.push(repository),
                    None => tracing::warn!(
                        workspace,
                        "skipping repository entry without a usable clone link"
                    ),
                }
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        tracing::debug!(workspace, count = repositories.len(), "listed repositories");
        Ok(repositories)
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    #[serde(default)]
    values: Vec<RepositoryEntry>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    name: String,
    slug: String,
    #[serde(default)]
    links: RepositoryLinks,
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryLinks {
    #[serde(default)]
    clone: Vec<CloneLink>,
}

#[derive(Debug, Deserialize)]
struct CloneLink {
    name: String,
    href: String,
}

/// Prefer the https clone link, falling back to ssh, then to whatever the
/// entry offers first.
fn repository_from_entry(entry: RepositoryEntry) -> Option<Repository> {
    if entry.slug.trim().is_empty() {
        return None;
    }
    let clone_url = entry
        .links
        .clone
        .iter()
        .find(|link| link.name == "https")
        .or_else(|| entry.links.clone.iter().find(|link| link.name == "ssh"))
        .or_else(|| entry.links.clone.first())
        .map(|link| link.href.clone())?;
    Some(Repository {
        name: entry.name,
        slug: entry.slug,
        clone_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_payload() {
        let payload = r#"{
            "values": [
                {
                    "name": "Billing Service",
                    "slug": "billing-service",
                    "links": {
                        "clone": [
                            {"name": "ssh", "href": "git@bitbucket.org:acme/billing-service.git"},
                            {"name": "https", "href": "https://bitbucket.org/acme/billing-service.git"}
                        ]
                    }
                }
            ],
            "next": "https://api.bitbucket.org/2.0/repositories/acme?pagelen=100&page=2"
        }"#;
        let page: RepositoryPage = serde_json::from_str(payload).unwrap();
        assert!(page.next.is_some());
        let repository = repository_from_entry(page.values.into_iter().next().unwrap()).unwrap();
        assert_eq!(repository.slug, "billing-service");
        assert_eq!(
            repository.clone_url,
            "https://bitbucket.org/acme/billing-service.git",
            "https link preferred over ssh"
        );
    }

    #[test]
    fn falls_back_to_ssh_clone_link() {
        let entry = RepositoryEntry {
            name: "tool".to_string(),
            slug: "tool".to_string(),
            links: RepositoryLinks {
                clone: vec![CloneLink {
                    name: "ssh".to_string(),
                    href: "git@bitbucket.org:acme/tool.git".to_string(),
                }],
            },
        };
        let repository = repository_from_entry(entry).unwrap();
        assert_eq!(repository.clone_url, "git@bitbucket.org:acme/tool.git");
    }

    #[test]
    fn entry_without_links_is_skipped() {
        let entry = RepositoryEntry {
            name: "empty".to_string(),
            slug: "empty".to_string(),
            links: RepositoryLinks::default(),
        };
        assert!(repository_from_entry(entry).is_none());
    }

    #[test]
    fn basic_auth_header_is_base64_encoded() {
        let auth = BitbucketAuth::Basic {
            username: "user".to_string(),
            app_password: "secret".to_string(),
        };
        assert_eq!(auth.header_value(), "Basic dXNlcjpzZWNyZXQ=");
    }
}

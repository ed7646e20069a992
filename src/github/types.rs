use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForkgateError, Result};

/// `owner/name` identity of a hosted repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub owner: String,
    pub name: String,
}

impl RepoIdentity {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub fn parse(full_name: &str) -> Result<Self> {
        let parts: Vec<&str> = full_name.trim().splitn(2, '/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(ForkgateError::Config(format!(
                "expected owner/repo, got {full_name:?}"
            ))),
        }
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Identity of one upstream/fork comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForkKey {
    pub upstream: RepoIdentity,
    pub fork: RepoIdentity,
    pub branch: String,
}

impl fmt::Display for ForkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...{}:{}", self.upstream, self.fork, self.branch)
    }
}

/// Listing metadata of one fork, as returned by the forks endpoint.
///
/// Timestamps that are missing or fail to parse are kept as `None` so a
/// single bad record never fails the whole page.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "ForkListing")]
pub struct ForkRecord {
    pub owner: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub stargazers_count: u32,
    pub forks_count: u32,
    pub watchers_count: u32,
    pub size: u64,
    pub open_issues_count: u32,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub archived: bool,
    pub disabled: bool,
    pub private: bool,
    pub default_branch: String,
}

impl ForkRecord {
    pub fn identity(&self) -> RepoIdentity {
        RepoIdentity::new(&self.owner, &self.name)
    }

    pub fn key(&self, upstream: &RepoIdentity) -> ForkKey {
        ForkKey {
            upstream: upstream.clone(),
            fork: self.identity(),
            branch: self.default_branch.clone(),
        }
    }
}

#[derive(Deserialize)]
struct OwnerListing {
    login: String,
}

#[derive(Deserialize)]
struct ForkListing {
    #[serde(default)]
    owner: Option<OwnerListing>,
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    pushed_at: Option<String>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    forks_count: u32,
    #[serde(default)]
    watchers_count: u32,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    open_issues_count: u32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    default_branch: Option<String>,
}

fn default_branch_name() -> String {
    "main".to_string()
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl From<ForkListing> for ForkRecord {
    fn from(l: ForkListing) -> Self {
        Self {
            owner: l.owner.map(|o| o.login).unwrap_or_default(),
            name: l.name,
            created_at: parse_timestamp(l.created_at.as_deref()),
            updated_at: parse_timestamp(l.updated_at.as_deref()),
            pushed_at: parse_timestamp(l.pushed_at.as_deref()),
            stargazers_count: l.stargazers_count,
            forks_count: l.forks_count,
            watchers_count: l.watchers_count,
            size: l.size,
            open_issues_count: l.open_issues_count,
            language: l.language,
            topics: l.topics.unwrap_or_default(),
            archived: l.archived,
            disabled: l.disabled,
            private: l.private,
            default_branch: l.default_branch.unwrap_or_else(default_branch_name),
        }
    }
}

/// Metadata of the upstream repository every fork is compared against.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RepoMetadata {
    pub full_name: String,
    pub default_branch: String,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
}

/// Ahead/behind counts from the compare endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CompareOutcome {
    #[serde(default)]
    pub status: String,
    pub ahead_by: u32,
    pub behind_by: u32,
    #[serde(default)]
    pub total_commits: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_identity() {
        let id = RepoIdentity::parse("rust-lang/rust").unwrap();
        assert_eq!(id.owner, "rust-lang");
        assert_eq!(id.name, "rust");
        assert_eq!(id.to_string(), "rust-lang/rust");
        assert!(RepoIdentity::parse("no-slash").is_err());
        assert!(RepoIdentity::parse("a/b/c").is_err());
        assert!(RepoIdentity::parse("/b").is_err());
    }

    #[test]
    fn fork_record_from_listing_json() {
        let json = r#"{
            "name": "arachne",
            "owner": { "login": "alice" },
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": "2020-02-01T00:00:00Z",
            "pushed_at": "2020-06-01T00:00:00Z",
            "stargazers_count": 3,
            "forks_count": 1,
            "watchers_count": 3,
            "size": 120,
            "language": "Rust",
            "topics": ["git"],
            "open_issues_count": 0,
            "archived": false,
            "disabled": false,
            "private": false,
            "default_branch": "dev"
        }"#;
        let record: ForkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.owner, "alice");
        assert_eq!(record.default_branch, "dev");
        assert_eq!(record.topics, vec!["git".to_string()]);
        assert!(record.pushed_at > record.created_at);
    }

    #[test]
    fn malformed_timestamp_becomes_none() {
        let json = r#"{
            "name": "x",
            "owner": { "login": "bob" },
            "created_at": "yesterday",
            "pushed_at": null
        }"#;
        let record: ForkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.created_at, None);
        assert_eq!(record.pushed_at, None);
        assert_eq!(record.default_branch, "main");
    }

    #[test]
    fn null_listing_fields_fall_back_to_defaults() {
        let json = r#"[
            {"name": "x", "owner": {"login": "carol"}, "default_branch": null, "topics": null},
            {"name": "y", "owner": {"login": "dave"}, "default_branch": "trunk"}
        ]"#;
        let page: Vec<ForkRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].default_branch, "main");
        assert!(page[0].topics.is_empty());
        assert_eq!(page[1].default_branch, "trunk");
    }
}

//! Pull-request read surface
//!
//! All reads degrade gracefully: a failed metadata fetch yields the
//! "unknown" record, a failed commit fetch yields an empty change list, and
//! a missing file yields `None`. A read failure never aborts a review run.

use crate::GitHubClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Basic information about a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrMetadata {
    /// PR author username
    pub author: String,
    /// PR title
    pub title: String,
    /// PR description text
    pub body: String,
    /// URL of the PR diff
    pub diff_url: String,
    /// PR state (open/closed)
    pub state: String,
    /// When the PR was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the PR was last updated
    pub updated_at: Option<DateTime<Utc>>,
    /// All commit SHAs in the PR, oldest first
    pub commit_shas: Vec<String>,
}

impl PrMetadata {
    /// The degraded record returned when the host cannot be reached
    pub fn unknown() -> Self {
        Self {
            author: "unknown".to_string(),
            title: "unknown".to_string(),
            body: String::new(),
            diff_url: "unknown".to_string(),
            state: "unknown".to_string(),
            created_at: None,
            updated_at: None,
            commit_shas: Vec::new(),
        }
    }

    /// Whether this is the degraded record
    pub fn is_unknown(&self) -> bool {
        self.author == "unknown" && self.commit_shas.is_empty()
    }
}

/// Kind of change a commit applied to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Renamed,
    Other,
}

impl From<&str> for ChangeKind {
    fn from(status: &str) -> Self {
        match status {
            "added" => ChangeKind::Added,
            "modified" | "changed" => ChangeKind::Modified,
            "removed" => ChangeKind::Removed,
            "renamed" => ChangeKind::Renamed,
            _ => ChangeKind::Other,
        }
    }
}

/// One file changed by a commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Full path of the changed file
    pub path: String,
    /// Change type
    pub change_kind: ChangeKind,
    /// Number of added lines
    pub additions: u64,
    /// Number of removed lines
    pub deletions: u64,
    /// Unified diff patch (absent for binary files)
    pub patch: Option<String>,
    /// The commit SHA this change belongs to
    pub sha: String,
}

/// Wire shape of a commit reference in a PR commit list
#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// Wire shape of a single-commit response
#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    files: Vec<CommitFile>,
}

#[derive(Debug, Deserialize)]
struct CommitFile {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    patch: Option<String>,
}

impl GitHubClient {
    /// Get basic information about a pull request
    ///
    /// Degrades to [`PrMetadata::unknown`] on any external failure so a
    /// consuming agent can proceed with partial information.
    pub async fn get_pr_metadata(&self, pr_number: u64) -> PrMetadata {
        debug!(pr_number, "Fetching pull request metadata");

        let pr = match self
            .client()
            .pulls(self.owner(), self.repo())
            .get(pr_number)
            .await
        {
            Ok(pr) => pr,
            Err(e) => {
                warn!(pr_number, error = %e, "Failed to fetch PR; returning unknown record");
                return PrMetadata::unknown();
            }
        };

        let commit_shas = match self.list_pr_commit_shas(pr_number).await {
            Ok(shas) => shas,
            Err(e) => {
                warn!(pr_number, error = %e, "Failed to list PR commits");
                Vec::new()
            }
        };

        PrMetadata {
            author: pr.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string()),
            title: pr.title.unwrap_or_default(),
            body: pr.body.unwrap_or_default(),
            diff_url: pr
                .diff_url
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            state: pr
                .state
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            commit_shas,
        }
    }

    /// List the commit SHAs of a pull request, oldest first
    async fn list_pr_commit_shas(&self, pr_number: u64) -> crate::Result<Vec<String>> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/commits",
            self.owner(),
            self.repo(),
            pr_number
        );
        let commits: Vec<CommitRef> = self
            .client()
            .get(route, None::<&()>)
            .await
            .map_err(crate::Error::Api)?;

        Ok(commits.into_iter().map(|c| c.sha).collect())
    }

    /// Get the list of changed files for a specific commit SHA
    ///
    /// Degrades to an empty list on external failure.
    pub async fn get_commit_changes(&self, sha: &str) -> Vec<ChangedFile> {
        debug!(sha, "Fetching commit changes");

        let route = format!("/repos/{}/{}/commits/{}", self.owner(), self.repo(), sha);
        let detail: CommitDetail = match self.client().get(route, None::<&()>).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(sha, error = %e, "Failed to fetch commit; returning empty change list");
                return Vec::new();
            }
        };

        detail
            .files
            .into_iter()
            .map(|f| ChangedFile {
                change_kind: ChangeKind::from(f.status.as_str()),
                path: f.filename,
                additions: f.additions,
                deletions: f.deletions,
                patch: f.patch,
                sha: sha.to_string(),
            })
            .collect()
    }

    /// Get the contents of a file at a specific revision
    ///
    /// Returns `None` if the path does not exist at that revision, is not a
    /// regular file, or the fetch fails.
    pub async fn get_file_at_revision(&self, path: &str, revision: &str) -> Option<String> {
        debug!(path, revision, "Fetching file content");

        let contents = match self
            .client()
            .repos(self.owner(), self.repo())
            .get_content()
            .path(path)
            .r#ref(revision)
            .send()
            .await
        {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path, revision, error = %e, "Failed to fetch file content");
                return None;
            }
        };

        // A directory path yields multiple items; a non-file item has no
        // decodable content. Both degrade to None.
        if contents.items.len() != 1 {
            return None;
        }

        contents.items.into_iter().next().and_then(|c| c.decoded_content())
    }
}

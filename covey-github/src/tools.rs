//! GitHub-backed tool implementations
//!
//! These bridge the client's read/write surface into the orchestration
//! core. The three read tools degrade gracefully inside the client; the
//! posting tool is the run's terminal write and propagates failure.

use async_trait::async_trait;
use covey_core::{SharedState, SideEffect, Tool, ToolError};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::GitHubClient;

fn require_u64(args: &Value, field: &str) -> Result<u64, ToolError> {
    args.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| ToolError::InvalidArgs(format!("expected integer field `{}`", field)))
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs(format!("expected string field `{}`", field)))
}

/// Read tool: basic pull-request information
pub struct GetPrDetailsTool {
    client: Arc<GitHubClient>,
}

impl GetPrDetailsTool {
    /// Create the tool over an injected client
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetPrDetailsTool {
    fn name(&self) -> &str {
        "get_pr_details"
    }

    fn description(&self) -> &str {
        "Retrieve details of a GitHub pull request by number: author, title, \
         body, diff URL, state, and the list of commit SHAs. The body is not \
         reliable for detecting changed files; call get_commit_details for \
         each SHA instead."
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::ReadExternal
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pr_number": {
                    "type": "integer",
                    "description": "Pull request number"
                }
            },
            "required": ["pr_number"]
        })
    }

    async fn invoke(
        &self,
        args: Value,
        _state: &mut SharedState,
    ) -> Result<Value, ToolError> {
        let pr_number = require_u64(&args, "pr_number")?;
        let metadata = self.client.get_pr_metadata(pr_number).await;
        serde_json::to_value(metadata).map_err(|e| ToolError::ExternalFailure(e.to_string()))
    }
}

/// Read tool: files changed by one commit
pub struct GetCommitDetailsTool {
    client: Arc<GitHubClient>,
}

impl GetCommitDetailsTool {
    /// Create the tool over an injected client
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetCommitDetailsTool {
    fn name(&self) -> &str {
        "get_commit_details"
    }

    fn description(&self) -> &str {
        "Retrieve the files changed by a commit SHA: path, change kind, \
         added/removed line counts, and the unified diff patch. Each entry \
         carries the SHA to pass to get_file_content."
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::ReadExternal
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sha": {
                    "type": "string",
                    "description": "Commit SHA"
                }
            },
            "required": ["sha"]
        })
    }

    async fn invoke(
        &self,
        args: Value,
        _state: &mut SharedState,
    ) -> Result<Value, ToolError> {
        let sha = require_str(&args, "sha")?;
        let changes = self.client.get_commit_changes(sha).await;
        serde_json::to_value(changes).map_err(|e| ToolError::ExternalFailure(e.to_string()))
    }
}

/// Read tool: file contents at a revision
pub struct GetFileContentTool {
    client: Arc<GitHubClient>,
}

impl GetFileContentTool {
    /// Create the tool over an injected client
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetFileContentTool {
    fn name(&self) -> &str {
        "get_file_content"
    }

    fn description(&self) -> &str {
        "Retrieve the contents of a repository file at a specific commit \
         SHA. Content is null if the path does not exist at that revision \
         or is not a regular file."
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::ReadExternal
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Full file path, as returned by get_commit_details"
                },
                "ref": {
                    "type": "string",
                    "description": "Commit SHA to fetch the file from"
                }
            },
            "required": ["path", "ref"]
        })
    }

    async fn invoke(
        &self,
        args: Value,
        _state: &mut SharedState,
    ) -> Result<Value, ToolError> {
        let path = require_str(&args, "path")?;
        let revision = require_str(&args, "ref")?;
        let content = self.client.get_file_at_revision(path, revision).await;

        Ok(json!({
            "path": path,
            "ref": revision,
            "content": content,
        }))
    }
}

/// Terminal write tool: publish the review
pub struct PostReviewTool {
    client: Arc<GitHubClient>,
    max_attempts: u32,
}

impl PostReviewTool {
    /// Create the tool with a posting retry bound
    pub fn new(client: Arc<GitHubClient>, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
        }
    }
}

#[async_trait]
impl Tool for PostReviewTool {
    fn name(&self) -> &str {
        "post_final_review"
    }

    fn description(&self) -> &str {
        "Post the finalized review comment to the pull request. This is the \
         irrevocable final action of the run."
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::TerminalWrite
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pr_number": {
                    "type": "integer",
                    "description": "Pull request number"
                },
                "body": {
                    "type": "string",
                    "description": "The final review comment in markdown"
                }
            },
            "required": ["pr_number", "body"]
        })
    }

    async fn invoke(
        &self,
        args: Value,
        _state: &mut SharedState,
    ) -> Result<Value, ToolError> {
        let pr_number = require_u64(&args, "pr_number")?;
        let body = require_str(&args, "body")?;

        if body.trim().is_empty() {
            return Err(ToolError::InvalidArgs(
                "refusing to post an empty review".to_string(),
            ));
        }

        self.client
            .post_review_with_retry(pr_number, body, self.max_attempts)
            .await
            .map_err(|e| ToolError::ExternalFailure(e.to_string()))?;

        Ok(json!({"posted": true, "pr_number": pr_number}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Arc<GitHubClient> {
        Arc::new(GitHubClient::anonymous("owner", "repo").unwrap())
    }

    #[tokio::test]
    async fn test_side_effect_classes() {
        let client = client();
        assert_eq!(
            GetPrDetailsTool::new(Arc::clone(&client)).side_effect(),
            SideEffect::ReadExternal
        );
        assert_eq!(
            GetCommitDetailsTool::new(Arc::clone(&client)).side_effect(),
            SideEffect::ReadExternal
        );
        assert_eq!(
            GetFileContentTool::new(Arc::clone(&client)).side_effect(),
            SideEffect::ReadExternal
        );
        assert_eq!(
            PostReviewTool::new(client, 3).side_effect(),
            SideEffect::TerminalWrite
        );
    }

    #[tokio::test]
    async fn test_pr_details_rejects_missing_number() {
        let tool = GetPrDetailsTool::new(client());
        let mut state = SharedState::new();
        let result = tool.invoke(json!({}), &mut state).await;
        assert!(matches!(result, Err(ToolError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_commit_details_rejects_missing_sha() {
        let tool = GetCommitDetailsTool::new(client());
        let mut state = SharedState::new();
        let result = tool.invoke(json!({"sha": 42}), &mut state).await;
        assert!(matches!(result, Err(ToolError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_file_content_rejects_missing_ref() {
        let tool = GetFileContentTool::new(client());
        let mut state = SharedState::new();
        let result = tool.invoke(json!({"path": "src/lib.rs"}), &mut state).await;
        assert!(matches!(result, Err(ToolError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_post_review_rejects_empty_body() {
        let tool = PostReviewTool::new(client(), 3);
        let mut state = SharedState::new();
        let result = tool
            .invoke(json!({"pr_number": 7, "body": "   "}), &mut state)
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_parameter_schemas_declare_required_fields() {
        let tool = PostReviewTool::new(client(), 3);
        let params = tool.parameters();
        let required: Vec<&str> = params["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["pr_number", "body"]);
    }
}

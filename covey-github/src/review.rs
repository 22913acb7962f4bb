//! Review posting
//!
//! Posting is the one irrevocable write of a review run. It is retried at
//! most `max_attempts` times to avoid duplicate postings, and its failure
//! always propagates to the caller.

use crate::{Error, GitHubClient, Result};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Delay between posting attempts
const RETRY_DELAY: Duration = Duration::from_secs(2);

impl GitHubClient {
    /// Submit a COMMENT review on a pull request
    pub async fn post_review(&self, pr_number: u64, body: &str) -> Result<()> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/reviews",
            self.owner(),
            self.repo(),
            pr_number
        );

        let _response: serde_json::Value = self
            .client()
            .post(
                route,
                Some(&json!({
                    "body": body,
                    "event": "COMMENT",
                })),
            )
            .await
            .map_err(Error::Api)?;

        info!(pr_number, "Posted review");
        Ok(())
    }

    /// Submit a review, retrying within a fixed bound
    ///
    /// `max_attempts` includes the first attempt and must be at least 1.
    /// After the bound is reached the last error propagates; the write is
    /// never silently dropped and never retried further.
    pub async fn post_review_with_retry(
        &self,
        pr_number: u64,
        body: &str,
        max_attempts: u32,
    ) -> Result<()> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.post_review(pr_number, body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(pr_number, attempt, max_attempts, error = %e, "Review post attempt failed");
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());

        Err(Error::PostFailed {
            pr: pr_number,
            message,
        })
    }
}

//! Review command - run the multi-agent review workflow for one PR

use std::sync::Arc;

use clap::Args;
use covey_core::agent::backends::OpenAiDecider;
use covey_core::{
    AgentDef, Config, Decider, Orchestrator, RunOutcome, SaveStateTool, ScriptedDecider, Secrets,
    SharedState, ToolRegistry, TurnResult,
};
use covey_github::{
    GetCommitDetailsTool, GetFileContentTool, GetPrDetailsTool, GitHubClient, PostReviewTool,
};

const CONTEXT_AGENT: &str = "ContextAgent";
const COMMENTOR_AGENT: &str = "CommentorAgent";
const POSTING_AGENT: &str = "ReviewAndPostingAgent";

const CONTEXT_INSTRUCTIONS: &str = "\
You are the context gathering agent for a pull request review. You MUST gather:
- The PR details: author, title, body, diff URL, state, and commit SHAs.
- The changed files of every commit, including paths and the SHA they belong to.
- The contents of any files that were requested of you.
Store a clear natural-language summary of everything you found with \
save_gathered_context, then hand control back to the CommentorAgent.";

const COMMENTOR_INSTRUCTIONS: &str = "\
You are the commentor agent. You write pull request review comments the way a \
human reviewer would.
- Request the PR details, changed files, and any other repository files you \
  need from the ContextAgent by handing off to it. Do NOT ask the user.
- Once you have the needed information, write a 200-300 word review in \
  markdown covering: what is good about the PR; whether the author followed \
  the contribution rules and what is missing; whether new functionality has \
  tests; whether new endpoints are documented; and which lines could be \
  improved, quoting them with concrete suggestions.
- Address the author directly, for example: \"Thanks for fixing this. Can you \
  roll this fix out everywhere quote is called?\"
- Save the finished draft with save_draft_comment, then hand off to the \
  ReviewAndPostingAgent. Do not produce a final response yourself.";

const POSTING_INSTRUCTIONS: &str = "\
You are the review and posting agent. Use the CommentorAgent to produce a \
draft review, then run a final check before publishing. The review must:
- be a 200-300 word markdown review;
- say what is good about the PR;
- note whether the author followed the contribution rules and what is missing;
- note whether new functionality has tests and new endpoints are documented;
- quote lines that could be improved with concrete suggestions.
If the draft falls short, hand off to the CommentorAgent with your concerns \
and ask for a rewrite. When you are satisfied, store the final text with \
save_final_review, post it with post_final_review, and then report the posted \
review as your final answer.";

/// Arguments for the review command
#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Repository to review (owner/repo or URL)
    #[arg(short, long, env = "REPOSITORY")]
    pub repo: String,

    /// Pull request number
    #[arg(short, long, env = "PR_NUMBER")]
    pub pr: u64,

    /// Turn budget for this run (overrides config)
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Dry run - exercise the workflow wiring without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full event trail as JSON lines
    #[arg(long)]
    pub events: bool,
}

impl ReviewArgs {
    /// Execute the review command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(max_turns) = self.max_turns {
            config.orchestrator.max_turns = max_turns;
        }

        if verbose {
            tracing::info!(
                repo = %self.repo,
                pr = self.pr,
                max_turns = config.orchestrator.max_turns,
                "Starting review run"
            );
        }

        let client = Arc::new(GitHubClient::from_url(&self.repo)?);

        let registry = build_registry(&client, config.orchestrator.post_attempts);
        let agents = build_agents();
        let decider = self.build_decider(&config)?;

        let orchestrator = Orchestrator::new(registry, decider)
            .with_agents(agents)
            .with_config(config.orchestrator.clone());

        let initial_state = SharedState::with_initial([
            ("gathered_context", ""),
            ("draft_comment", ""),
            ("final_review_comment", ""),
        ]);

        let task = format!("Write a review for PR: {}", self.pr);
        let report = orchestrator.run(POSTING_AGENT, &task, initial_state).await;

        for event in &report.events {
            if self.events {
                println!("{}", serde_json::to_string(event)?);
            } else if verbose {
                println!("  {}", event.summary());
            }
        }

        match report.outcome {
            RunOutcome::Success { output } => {
                println!("Review run finished in {} turn(s)", report.turns);
                println!();
                println!("{}", output);
                Ok(())
            }
            RunOutcome::Exhausted => anyhow::bail!(
                "review run exhausted its {} turn budget without posting",
                report.turns
            ),
            RunOutcome::Failed { reason } => anyhow::bail!("review run failed: {}", reason),
        }
    }

    /// Choose the decision backend for this run
    fn build_decider(&self, config: &Config) -> anyhow::Result<Arc<dyn Decider>> {
        if self.dry_run {
            // One canned turn: enough to exercise the wiring end to end
            // without touching the model or posting anything.
            return Ok(Arc::new(ScriptedDecider::new([TurnResult::FinalOutput(
                "Dry run: workflow assembled, no review posted.".to_string(),
            )])));
        }

        let secrets = Secrets::load()?;
        let api_key = secrets.llm_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "No LLM API key found. Set OPENAI_API_KEY or add it to the secrets file."
            )
        })?;

        Ok(Arc::new(
            OpenAiDecider::new(api_key)
                .with_api_base(config.llm.api_base.clone())
                .with_model(config.llm.model.clone())
                .with_timeout(config.llm.request_timeout),
        ))
    }
}

/// Register the GitHub tools and the shared-state tools
fn build_registry(client: &Arc<GitHubClient>, post_attempts: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(GetPrDetailsTool::new(Arc::clone(client))));
    registry.register(Arc::new(GetCommitDetailsTool::new(Arc::clone(client))));
    registry.register(Arc::new(GetFileContentTool::new(Arc::clone(client))));
    registry.register(Arc::new(PostReviewTool::new(
        Arc::clone(client),
        post_attempts,
    )));

    registry.register(Arc::new(SaveStateTool::new(
        "save_gathered_context",
        "Store a natural-language summary of all gathered PR information in \
         shared state so other agents can use it.",
        "gathered_context",
    )));
    registry.register(Arc::new(SaveStateTool::new(
        "save_draft_comment",
        "Store the draft review comment in shared state before final \
         submission.",
        "draft_comment",
    )));
    registry.register(Arc::new(SaveStateTool::new(
        "save_final_review",
        "Store the finalized review comment in shared state so the workflow \
         can track it.",
        "final_review_comment",
    )));

    registry
}

/// Declare the three review agents and their handoff graph
fn build_agents() -> Vec<AgentDef> {
    let context_agent = AgentDef::new(
        CONTEXT_AGENT,
        "Gathers PR details, commit info, and file contents.",
    )
    .with_instructions(CONTEXT_INSTRUCTIONS)
    .with_tools([
        "get_pr_details",
        "get_commit_details",
        "get_file_content",
        "save_gathered_context",
    ])
    .with_handoff_targets([COMMENTOR_AGENT]);

    let commentor_agent = AgentDef::new(
        COMMENTOR_AGENT,
        "Drafts a detailed pull request review using gathered context, \
         requesting more information when needed.",
    )
    .with_instructions(COMMENTOR_INSTRUCTIONS)
    .with_tools(["save_draft_comment"])
    .with_handoff_targets([CONTEXT_AGENT, POSTING_AGENT]);

    let posting_agent = AgentDef::new(
        POSTING_AGENT,
        "Checks draft quality, coordinates rewrites, and publishes the \
         approved review.",
    )
    .with_instructions(POSTING_INSTRUCTIONS)
    .with_tools(["save_final_review", "post_final_review"])
    .with_handoff_targets([COMMENTOR_AGENT]);

    vec![context_agent, commentor_agent, posting_agent]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_agent_graph_matches_tool_registry() {
        let client = Arc::new(GitHubClient::anonymous("owner", "repo").unwrap());
        let registry = build_registry(&client, 3);

        for agent in build_agents() {
            for tool in &agent.tools {
                assert!(
                    registry.get(tool).is_some(),
                    "agent {} references unregistered tool {}",
                    agent.name,
                    tool
                );
            }
        }
    }

    #[test]
    fn test_handoff_targets_are_declared_agents() {
        let agents = build_agents();
        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();

        for agent in &agents {
            for target in &agent.handoff_targets {
                assert!(
                    names.contains(&target.as_str()),
                    "agent {} declares unknown handoff target {}",
                    agent.name,
                    target
                );
            }
        }
    }

    #[test]
    fn test_only_posting_agent_holds_the_terminal_tool() {
        let agents = build_agents();
        let holders: Vec<&str> = agents
            .iter()
            .filter(|a| a.has_tool("post_final_review"))
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(holders, vec![POSTING_AGENT]);
    }
}

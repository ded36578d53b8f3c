//! Self-modification controller
//!
//! The patch/test/merge loop: propose a change, apply it to the working
//! tree, run the test suite, then merge on success or retry with a bounded
//! attempt budget. Decision content lives in the LLM; this module owns the
//! state machine, the retry/termination policy and the contracts against
//! the external collaborators.
//!
//! All collaborator failures are folded into the session's `last_result`
//! text; the controller never propagates them. The only fatal error is the
//! programming-contract violation of advancing an already-terminal session.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::prompts::SYSTEM_SELF_MOD;

/// Default maximum failing patch/test cycles before the session is abandoned
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Marker line a passing test run embeds in its output. Evaluation of the
/// `tested` state is text-based: no marker means a failing cycle.
pub const PASS_MARKER: &str = "TESTS_RC=0";

/// How much failing output is fed back to the proposer on a retry
const RETRY_CONTEXT_CHARS: usize = 2000;

// ============ Collaborator Contracts ============

/// Outcome of applying a proposed change to the working tree
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub success: bool,
    pub diagnostic: String,
}

/// Outcome of one test-suite run
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub passed: bool,
    pub output: String,
}

/// Outcome of integrating the applied change into the main line
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub success: bool,
    pub diagnostic: String,
}

/// Produces a proposed change (expected, not guaranteed, to contain a patch)
#[async_trait]
pub trait ChangeProposer: Send + Sync {
    async fn propose_change(&self, goal: &str, files: &[String], prior_result: &str) -> Result<String>;
}

/// Mutates the working tree with a proposed change. Must be confined to a
/// single repository root.
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply_change(&self, change: &str) -> Result<ApplyOutcome>;
}

/// Runs the project's test suite against the current working tree
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self) -> Result<TestOutcome>;
}

/// Integrates the currently-applied change into the main line of work
#[async_trait]
pub trait MergeCommitter: Send + Sync {
    async fn merge(&self) -> Result<MergeOutcome>;
}

// ============ Session State ============

/// Controller state. `Merged` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Start,
    Patched,
    Tested,
    Merged,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Merged | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Start => write!(f, "start"),
            SessionStatus::Patched => write!(f, "patched"),
            SessionStatus::Tested => write!(f, "tested"),
            SessionStatus::Merged => write!(f, "merged"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One run of the self-modification cycle, from `Start` to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfModSession {
    /// Free-text description of the desired change (immutable for the session)
    pub goal: String,
    /// File paths the change may touch; a hint to the proposer, not enforced
    pub file_list: Vec<String>,
    /// Most recent collaborator output, overwritten every transition
    pub last_result: String,
    /// Current state
    pub status: SessionStatus,
    /// Failing patch/test cycles that triggered a retry so far
    pub attempts: u32,
}

impl SelfModSession {
    pub fn new(goal: impl Into<String>, file_list: Vec<String>) -> Self {
        Self {
            goal: goal.into(),
            file_list,
            last_result: String::new(),
            status: SessionStatus::Start,
            attempts: 0,
        }
    }
}

/// Contract violations. Collaborator failures are never surfaced this way;
/// they become failing cycles inside the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot advance a session already in terminal state `{0}`")]
    AlreadyTerminal(SessionStatus),
}

// ============ Controller ============

/// Sequences the proposer, applier, test runner and merger for one session
/// at a time. Strictly sequential: every step blocks until its collaborator
/// call completes, because they all mutate one shared working tree.
pub struct SelfModController {
    proposer: Arc<dyn ChangeProposer>,
    applier: Arc<dyn PatchApplier>,
    tester: Arc<dyn TestRunner>,
    merger: Arc<dyn MergeCommitter>,
    retry_budget: u32,
}

impl SelfModController {
    pub fn new(
        proposer: Arc<dyn ChangeProposer>,
        applier: Arc<dyn PatchApplier>,
        tester: Arc<dyn TestRunner>,
        merger: Arc<dyn MergeCommitter>,
    ) -> Self {
        Self {
            proposer,
            applier,
            tester,
            merger,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Override the retry budget (defaults to 3 failing cycles)
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Perform exactly one state transition.
    ///
    /// Not idempotent by design: calling it again on the same non-terminal
    /// state performs a fresh side effect against the collaborators.
    pub async fn advance(&self, session: &mut SelfModSession) -> Result<(), SessionError> {
        match session.status {
            SessionStatus::Start => {
                session.last_result = self.propose(session, "").await;
                session.status = SessionStatus::Patched;
                debug!(goal = %session.goal, "proposed initial change");
            }
            SessionStatus::Patched => {
                session.last_result = self.apply_and_test(&session.last_result).await;
                session.status = SessionStatus::Tested;
            }
            SessionStatus::Tested => {
                self.evaluate(session).await;
            }
            terminal => return Err(SessionError::AlreadyTerminal(terminal)),
        }

        Ok(())
    }

    /// Run a fresh session to a terminal state and return it.
    ///
    /// The transition count is capped independently of the retry budget so
    /// a controller bug can never loop forever against real collaborators.
    pub async fn run(&self, goal: &str, file_list: Vec<String>) -> SelfModSession {
        let mut session = SelfModSession::new(goal, file_list);
        let max_transitions = 2 * (self.retry_budget as usize + 1) + 1;

        for _ in 0..max_transitions {
            if session.status.is_terminal() {
                break;
            }
            // Only terminal sessions produce an error, and the loop guard
            // excludes them.
            let _ = self.advance(&mut session).await;
        }

        info!(
            status = %session.status,
            attempts = session.attempts,
            "self-modification session finished"
        );
        session
    }

    /// Ask the proposer for a change, folding any call failure into text.
    /// Empty output is not special-cased: the applier will report the
    /// failure and the normal retry accounting applies.
    async fn propose(&self, session: &SelfModSession, prior_result: &str) -> String {
        match self.proposer
            .propose_change(&session.goal, &session.file_list, prior_result)
            .await
        {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(error = %e, "change proposer failed");
                format!("PROPOSAL_ERROR: {e}")
            }
        }
    }

    /// Apply the proposed change, then run the tests. An apply failure
    /// short-circuits the test run; its diagnostic carries no pass marker,
    /// so it is evaluated exactly like a failing test.
    async fn apply_and_test(&self, change: &str) -> String {
        let applied = match self.applier.apply_change(change).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "patch applier failed");
                ApplyOutcome { success: false, diagnostic: format!("APPLY_ERROR: {e}") }
            }
        };

        if !applied.success {
            return applied.diagnostic;
        }

        match self.tester.run_tests().await {
            Ok(outcome) => {
                // The tested-state evaluation is text-based; make sure a
                // passing run carries the marker even if the runner's raw
                // output lacks one.
                if outcome.passed && !output_indicates_pass(&outcome.output) {
                    format!("{PASS_MARKER}\n{}", outcome.output)
                } else {
                    outcome.output
                }
            }
            Err(e) => {
                warn!(error = %e, "test runner failed to execute");
                format!("TEST_EXEC_ERROR: {e}")
            }
        }
    }

    /// The single branching decision point: merge on a pass marker, retry
    /// while budget remains, otherwise give up.
    async fn evaluate(&self, session: &mut SelfModSession) {
        if output_indicates_pass(&session.last_result) {
            // Merge exactly once. A merge failure is reported in the
            // terminal payload, never retried.
            let diagnostic = match self.merger.merge().await {
                Ok(outcome) if outcome.success => {
                    format!("MERGE_OK\n{}", outcome.diagnostic)
                }
                Ok(outcome) => {
                    warn!("merge failed after passing tests");
                    format!("MERGE_FAILED\n{}", outcome.diagnostic)
                }
                Err(e) => {
                    warn!(error = %e, "merge committer failed");
                    format!("MERGE_FAILED\nMERGE_ERROR: {e}")
                }
            };
            session.last_result = diagnostic;
            session.status = SessionStatus::Merged;
        } else if session.attempts < self.retry_budget {
            session.attempts += 1;
            debug!(
                attempt = session.attempts,
                budget = self.retry_budget,
                "tests failed, proposing a new change"
            );
            let context = crate::tail_chars(&session.last_result, RETRY_CONTEXT_CHARS).to_string();
            session.last_result = self.propose(session, &context).await;
            session.status = SessionStatus::Patched;
        } else {
            session.last_result = format!(
                "RETRY_BUDGET_EXHAUSTED attempts={}\n{}",
                session.attempts, session.last_result
            );
            session.status = SessionStatus::Failed;
        }
    }
}

/// Text-based pass detection on a test run's output.
pub fn output_indicates_pass(output: &str) -> bool {
    output.lines().any(|line| line.trim() == PASS_MARKER)
}

// ============ LLM-backed Change Proposer ============

/// Proposes changes through the LLM with the self-modification prompt.
pub struct LlmProposer {
    llm: LlmClient,
}

impl LlmProposer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ChangeProposer for LlmProposer {
    async fn propose_change(&self, goal: &str, files: &[String], prior_result: &str) -> Result<String> {
        let payload = format!(
            "GOAL:\n{}\n\nFILES:\n{}\n\nPRIOR_RESULT:\n{}",
            goal,
            files.join("\n"),
            prior_result,
        );
        self.llm.chat(SYSTEM_SELF_MOD, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionStatus::Start.is_terminal());
        assert!(!SessionStatus::Patched.is_terminal());
        assert!(!SessionStatus::Tested.is_terminal());
        assert!(SessionStatus::Merged.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Start.to_string(), "start");
        assert_eq!(SessionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_new_session_defaults() {
        let session = SelfModSession::new("fix typo", vec!["a.rs".to_string()]);
        assert_eq!(session.status, SessionStatus::Start);
        assert_eq!(session.attempts, 0);
        assert!(session.last_result.is_empty());
    }

    #[test]
    fn test_pass_marker_detection() {
        assert!(output_indicates_pass("TESTS_RC=0\nall good"));
        assert!(output_indicates_pass("log line\n  TESTS_RC=0  \nmore"));
        assert!(!output_indicates_pass("TESTS_RC=1\n3 failures"));
        assert!(!output_indicates_pass("TESTS_RC=10\nweird code"));
        assert!(!output_indicates_pass("PATCH_FAILED:\ncorrupt diff"));
        assert!(!output_indicates_pass(""));
    }
}

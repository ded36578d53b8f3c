//! Agent abilities and the orchestrator that wires them together
//!
//! Three abilities share one LLM configuration and one knowledge store:
//! goal targeting (plan and execute), information exploration (answer from
//! stored knowledge) and self-modification (patch, test, merge).

pub mod info;
pub mod selfmod;
pub mod targeting;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::llm::{LlmClient, Purpose};
use crate::memory::{open_store, KnowledgeStore};
use crate::tools::{SafeShell, WebSearch};
use crate::workspace::GitWorkspace;

pub use info::{InfoAbility, InfoReport};
pub use selfmod::{
    LlmProposer, SelfModController, SelfModSession, SessionError, SessionStatus,
};
pub use targeting::{TargetingAbility, TargetingReport, TargetMode};

/// How much of the final session output the report carries
const REPORT_TAIL_CHARS: usize = 2000;

/// Final report of a self-modification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfModReport {
    pub status: SessionStatus,
    pub attempts: u32,
    /// Tail of the session's final collaborator output
    pub last_result: String,
}

/// Owns the abilities and the shared knowledge store.
pub struct Orchestrator {
    targeting: TargetingAbility,
    info: InfoAbility,
    selfmod: SelfModController,
    store: Arc<dyn KnowledgeStore>,
}

impl Orchestrator {
    /// Wire up every ability from the loaded configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(&config.memory).await;

        let planner = LlmClient::for_purpose(&config.llm, Purpose::Plan)?;
        let executor = LlmClient::for_purpose(&config.llm, Purpose::Execute)?;
        let researcher = LlmClient::for_purpose(&config.llm, Purpose::Research)?;
        let coder = LlmClient::for_purpose(&config.llm, Purpose::Code)?;

        let workspace = Arc::new(GitWorkspace::from_config(&config.workspace)?);
        let selfmod = SelfModController::new(
            Arc::new(LlmProposer::new(coder)),
            workspace.clone(),
            workspace.clone(),
            workspace,
        )
        .with_retry_budget(config.selfmod.retry_budget);

        let search = WebSearch::new(&config.search)?;
        let shell = SafeShell::new(&config.workspace.repo_root);

        Ok(Self {
            targeting: TargetingAbility::new(planner, executor, store.clone(), search, shell),
            info: InfoAbility::new(researcher, store.clone()),
            selfmod,
            store,
        })
    }

    /// Build an orchestrator from pre-wired abilities.
    pub fn new(
        targeting: TargetingAbility,
        info: InfoAbility,
        selfmod: SelfModController,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self { targeting, info, selfmod, store }
    }

    pub fn store(&self) -> Arc<dyn KnowledgeStore> {
        self.store.clone()
    }

    /// Plan a goal and execute its subtasks sequentially.
    pub async fn run_targeting(&self, goal: &str) -> Result<TargetingReport> {
        self.targeting.run(goal).await
    }

    /// Answer a question from stored knowledge and persist the answer.
    pub async fn run_info(&self, question: &str) -> Result<InfoReport> {
        self.info.explore(question).await
    }

    /// Run one self-modification session to a terminal state.
    pub async fn run_self_mod(&self, goal: &str, file_list: Vec<String>) -> SelfModReport {
        let session = self.selfmod.run(goal, file_list).await;

        SelfModReport {
            status: session.status,
            attempts: session.attempts,
            last_result: crate::tail_chars(&session.last_result, REPORT_TAIL_CHARS).to_string(),
        }
    }
}

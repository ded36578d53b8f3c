//! Goal targeting ability
//!
//! Single-pass planning plus sequential execution: the planner either
//! declares the goal directly executable or decomposes it into a handful
//! of atomic subtasks. Each subtask runs once; its output (success or
//! error text) goes into the execution log and into memory, and the loop
//! advances regardless. No retry logic here.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::LlmClient;
use crate::memory::KnowledgeStore;
use crate::prompts::{SYSTEM_TARGETING, SYSTEM_EXECUTOR};
use crate::tools::{SafeShell, WebSearch, fetch_page, http_get, http_post};

/// Most subtasks a decomposition may produce
const MAX_SUBTASKS: usize = 7;

/// Most tool directives honored per executed task
const MAX_DIRECTIVES: usize = 5;

/// Per-result clip when packing search hits into the executor prompt
const SEARCH_SNIPPET_CHARS: usize = 300;

/// Fallback plan when the planner yields nothing usable
const DEFAULT_TASKS: &[&str] = &[
    "Clarify success metric for the target.",
    "Find 2-3 credible sources via search.",
    "Summarize findings and propose action steps.",
];

/// Where the targeting run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    DecideOrPlan,
    Execute,
    Done,
}

impl std::fmt::Display for TargetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetMode::DecideOrPlan => write!(f, "decide_or_plan"),
            TargetMode::Execute => write!(f, "execute"),
            TargetMode::Done => write!(f, "done"),
        }
    }
}

/// State carried through a targeting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    pub target: String,
    pub tasks: Vec<String>,
    pub current: Option<String>,
    pub mode: TargetMode,
    pub log: Vec<String>,
}

impl TargetState {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tasks: Vec::new(),
            current: None,
            mode: TargetMode::DecideOrPlan,
            log: Vec::new(),
        }
    }
}

/// Final report of a targeting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetingReport {
    pub mode: TargetMode,
    pub log: Vec<String>,
    pub tasks_remaining: Vec<String>,
}

/// The targeting ability
pub struct TargetingAbility {
    planner: LlmClient,
    executor: LlmClient,
    store: Arc<dyn KnowledgeStore>,
    search: WebSearch,
    shell: SafeShell,
}

impl TargetingAbility {
    pub fn new(
        planner: LlmClient,
        executor: LlmClient,
        store: Arc<dyn KnowledgeStore>,
        search: WebSearch,
        shell: SafeShell,
    ) -> Self {
        Self { planner, executor, store, search, shell }
    }

    /// Run the targeting loop for a goal to completion.
    pub async fn run(&self, goal: &str) -> Result<TargetingReport> {
        let mut state = TargetState::new(goal);

        // Plan step
        let tasks = match self.planner.chat(SYSTEM_TARGETING, goal).await {
            Ok(reply) => parse_plan(&reply),
            Err(e) => {
                state.log.push(format!("Planner error, using default plan: {e}"));
                DEFAULT_TASKS.iter().map(|s| s.to_string()).collect()
            }
        };
        state.log.push(format!("Plan:\n{}", tasks.join("\n")));
        state.current = tasks.first().cloned();
        state.tasks = tasks;
        state.mode = TargetMode::Execute;

        debug!(goal = %goal, tasks = state.tasks.len(), "targeting plan ready");

        // Execute steps sequentially; output is logged and persisted
        // whether the step succeeded or not.
        while let Some(task) = state.current.clone() {
            let output = self.execute_task(&state.target, &task).await;

            state.log.push(format!("Executed: {task}\n{output}"));

            let metadata: HashMap<String, String> = [
                ("source".to_string(), "targeting".to_string()),
                ("task".to_string(), task.clone()),
            ].into();
            if let Err(e) = self.store.upsert(crate::tail_chars(&output, 4000), metadata).await {
                state.log.push(format!("Memory error: {e}"));
            }

            state.tasks.remove(0);
            state.current = state.tasks.first().cloned();
        }
        state.mode = TargetMode::Done;

        info!(goal = %goal, steps = state.log.len(), "targeting run finished");

        Ok(TargetingReport {
            mode: state.mode,
            log: state.log,
            tasks_remaining: state.tasks,
        })
    }

    /// Execute one subtask: pack fresh search results into the prompt, let
    /// the executor answer, then honor any tool directives in the reply.
    /// Errors become the step's output text.
    async fn execute_task(&self, target: &str, task: &str) -> String {
        let hits = self.search.search(task).await;
        let research = hits.iter()
            .map(|hit| {
                let snippet: String = hit.content.chars().take(SEARCH_SNIPPET_CHARS).collect();
                format!("{} <{}>\n{}", hit.title, hit.url, snippet)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let payload = format!(
            "TARGET:\n{target}\n\nCURRENT_TASK:\n{task}\n\nSEARCH_RESULTS:\n{research}"
        );
        let reply = match self.executor.chat(SYSTEM_EXECUTOR, &payload).await {
            Ok(output) => output,
            Err(e) => return format!("EXECUTOR_ERROR: {e}"),
        };

        let directives = parse_directives(&reply);
        if directives.is_empty() {
            return reply;
        }

        let mut output = reply.clone();
        output.push_str("\n\nTOOL_OUTPUT:");
        for directive in directives {
            let result = self.run_directive(&directive).await;
            output.push_str(&format!("\n-> {directive}\n{result}"));
        }
        output
    }

    async fn run_directive(&self, directive: &Directive) -> String {
        match directive {
            Directive::Run(cmd) => self.shell.run(cmd).await,
            Directive::Fetch(url) => fetch_page(url).await,
            Directive::Get(url) => http_get(url).await,
            Directive::Post(url, body) => http_post(url, body).await,
        }
    }
}

/// A tool request emitted by the executor inside its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Run(String),
    Fetch(String),
    Get(String),
    Post(String, String),
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::Run(cmd) => write!(f, "RUN: {cmd}"),
            Directive::Fetch(url) => write!(f, "FETCH: {url}"),
            Directive::Get(url) => write!(f, "GET: {url}"),
            Directive::Post(url, _) => write!(f, "POST: {url}"),
        }
    }
}

/// Scan a reply for `RUN:`/`FETCH:`/`GET:`/`POST:` lines, capped per task.
pub fn parse_directives(reply: &str) -> Vec<Directive> {
    reply.lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(cmd) = line.strip_prefix("RUN:") {
                Some(Directive::Run(cmd.trim().to_string()))
            } else if let Some(url) = line.strip_prefix("FETCH:") {
                Some(Directive::Fetch(url.trim().to_string()))
            } else if let Some(url) = line.strip_prefix("GET:") {
                Some(Directive::Get(url.trim().to_string()))
            } else if let Some(rest) = line.strip_prefix("POST:") {
                let rest = rest.trim();
                let (url, body) = rest.split_once(' ').unwrap_or((rest, "{}"));
                Some(Directive::Post(url.to_string(), body.trim().to_string()))
            } else {
                None
            }
        })
        .take(MAX_DIRECTIVES)
        .collect()
}

/// Parse the planner's reply: either an `EXECUTE:` one-liner (directly
/// executable goal) or up to seven subtask lines. Falls back to a default
/// plan when nothing usable comes back.
pub fn parse_plan(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();

    if let Some(approach) = trimmed.strip_prefix("EXECUTE:") {
        return vec![approach.trim().to_string()];
    }

    let tasks: Vec<String> = trimmed
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .take(MAX_SUBTASKS)
        .collect();

    if tasks.is_empty() {
        DEFAULT_TASKS.iter().map(|s| s.to_string()).collect()
    } else {
        tasks
    }
}

/// Strip leading list markers ("- ", "* ", "1. ", "2) ") from a plan line
fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let line = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")).unwrap_or(line);

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_execute_shortcut() {
        let tasks = parse_plan("EXECUTE: run the formatter on src/");
        assert_eq!(tasks, vec!["run the formatter on src/".to_string()]);
    }

    #[test]
    fn test_parse_plan_subtask_lines() {
        let reply = "- find sources\n- read them\n- summarize findings";
        let tasks = parse_plan(reply);
        assert_eq!(tasks, vec!["find sources", "read them", "summarize findings"]);
    }

    #[test]
    fn test_parse_plan_numbered_lines() {
        let reply = "1. first step\n2) second step";
        let tasks = parse_plan(reply);
        assert_eq!(tasks, vec!["first step", "second step"]);
    }

    #[test]
    fn test_parse_plan_caps_at_seven() {
        let reply = (1..=10).map(|i| format!("task {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_plan(&reply).len(), 7);
    }

    #[test]
    fn test_parse_plan_empty_reply_falls_back() {
        let tasks = parse_plan("   \n  ");
        assert_eq!(tasks.len(), DEFAULT_TASKS.len());
        assert_eq!(tasks[0], DEFAULT_TASKS[0]);
    }

    #[test]
    fn test_parse_directives() {
        let reply = "RESULT: done\nRUN: ls src\nFETCH: https://example.com\nGET: https://api.example.com/v1\nPOST: https://api.example.com/v1 {\"a\":1}";
        let directives = parse_directives(reply);
        assert_eq!(directives, vec![
            Directive::Run("ls src".to_string()),
            Directive::Fetch("https://example.com".to_string()),
            Directive::Get("https://api.example.com/v1".to_string()),
            Directive::Post("https://api.example.com/v1".to_string(), "{\"a\":1}".to_string()),
        ]);
    }

    #[test]
    fn test_parse_directives_capped() {
        let reply = (0..10).map(|i| format!("RUN: echo {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_directives(&reply).len(), 5);
    }

    #[test]
    fn test_parse_directives_none_in_plain_reply() {
        assert!(parse_directives("RESULT: nothing to do").is_empty());
    }

    #[test]
    fn test_target_state_initial_mode() {
        let state = TargetState::new("learn about window managers");
        assert_eq!(state.mode, TargetMode::DecideOrPlan);
        assert!(state.tasks.is_empty());
        assert!(state.current.is_none());
    }
}

//! Forge Agent - Self-Modifying Agent Library
//!
//! An LLM-driven agent with three abilities:
//! - Goal targeting: decompose a goal into subtasks and execute them
//! - Info exploration: answer questions with memory-backed synthesis
//! - Self-modification: propose a patch, apply it, run tests, merge or retry
//!
//! The self-modification controller is the only real state machine in here;
//! everything else is a thin wrapper around external collaborators (LLM
//! providers, a git working tree, web search, the knowledge store).
//!
//! # Example
//!
//! ```ignore
//! use forge_agent::abilities::Orchestrator;
//! use forge_agent::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orch = Orchestrator::from_config(&Config::load()?).await?;
//!     let report = orch.run_self_mod("fix typo in README", vec!["README.md".into()]).await;
//!     println!("{}: {}", report.status, report.last_result);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod llm;
pub mod prompts;
pub mod memory;
pub mod workspace;
pub mod tools;
pub mod abilities;
pub mod cli;

// Re-export commonly used types for convenience
pub use abilities::{
    Orchestrator,
    selfmod::{SelfModController, SelfModSession, SessionStatus},
};

pub use memory::{KnowledgeStore, KnowledgeEntry};

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Self-Modifying Agent Library", NAME, VERSION)
}

/// Return the last `max_chars` characters of `text`, respecting UTF-8
/// boundaries. Used to bound collaborator output before it is reported
/// or fed back into a prompt.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_chars_short_input() {
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("", 10), "");
    }

    #[test]
    fn test_tail_chars_truncates_from_front() {
        assert_eq!(tail_chars("abcdef", 3), "def");
    }

    #[test]
    fn test_tail_chars_multibyte() {
        // Must not split inside a multi-byte character
        let s = "héllo wörld";
        let tail = tail_chars(s, 4);
        assert_eq!(tail, "örld");
    }
}

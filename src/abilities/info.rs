//! Information exploration ability
//!
//! One question in, one synthesized answer out. The question is matched
//! against the knowledge store, the best hits are packed into the prompt
//! as internal context, and the answer is written back to the store so
//! later questions can build on it.

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::llm::LlmClient;
use crate::memory::KnowledgeStore;
use crate::prompts::SYSTEM_INFO;

/// How many stored entries to pull into the prompt
const CONTEXT_HITS: usize = 5;

/// Per-entry snippet cap
const SNIPPET_CHARS: usize = 1200;

/// Cap on the persisted synthesis
const SYNTHESIS_CHARS: usize = 4000;

/// Result of one exploration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoReport {
    pub question: String,
    pub answer: String,
    /// How many stored entries fed the synthesis
    pub context_entries: usize,
}

/// The information exploration ability
pub struct InfoAbility {
    llm: LlmClient,
    store: Arc<dyn KnowledgeStore>,
}

impl InfoAbility {
    pub fn new(llm: LlmClient, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { llm, store }
    }

    /// Answer a question from stored knowledge, then persist the answer.
    pub async fn explore(&self, question: &str) -> Result<InfoReport> {
        let hits = self.store.search(question, CONTEXT_HITS).await?;

        let context = if hits.is_empty() {
            "(no stored knowledge matched)".to_string()
        } else {
            hits.iter()
                .map(|entry| clip(&entry.content, SNIPPET_CHARS))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let payload = format!("INTERNAL_CONTEXT:\n{context}\n\nQUESTION:\n{question}");
        let answer = self.llm.chat(SYSTEM_INFO, &payload)
            .await
            .context("Synthesis call failed")?;

        let metadata: HashMap<String, String> = [
            ("source".to_string(), "info_exploration".to_string()),
            ("query".to_string(), question.to_string()),
        ].into();
        self.store.upsert(&clip(&answer, SYNTHESIS_CHARS), metadata).await?;

        info!(question = %question, context_entries = hits.len(), "exploration done");

        Ok(InfoReport {
            question: question.to_string(),
            answer,
            context_entries: hits.len(),
        })
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_short_text_unchanged() {
        assert_eq!(clip("hello", 10), "hello");
    }

    #[test]
    fn test_clip_long_text() {
        assert_eq!(clip("abcdef", 3), "abc");
    }

    #[test]
    fn test_clip_multibyte_boundary() {
        assert_eq!(clip("héllo", 2), "hé");
    }
}

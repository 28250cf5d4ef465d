//! LLM provider abstraction used by query expansion, re-ranking, and RAG synthesis.
//!
//! Mirrors the embedding adapter's shape: a trait plus a `get_llm_client` factory selected by
//! `Config::llm_provider`. Unlike the deterministic embedding placeholder, a configured provider
//! here talks to a real local Ollama runtime via `ollama-rs`; when no provider is configured the
//! query pipeline degrades gracefully rather than failing (see `query` module).

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use thiserror::Error;

use crate::config::{LlmProvider, get_config};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while attempting an LLM call.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider was unreachable or returned a transport error.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error or malformed response.
    #[error("LLM generation failed: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by LLM backends used for expansion/re-rank/synthesis prompts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single-turn completion prompt and return the raw generated text.
    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError>;
}

/// Build an LLM client for the current configuration, or `None` when no provider is configured.
pub fn get_llm_client() -> Option<Box<dyn LlmClient + Send + Sync>> {
    let config = get_config();
    match config.llm_provider {
        LlmProvider::None => None,
        LlmProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            let model = config
                .llm_model
                .clone()
                .unwrap_or_else(|| "llama3.2".to_string());
            Some(Box::new(OllamaLlmClient::new(base_url, model)))
        }
    }
}

struct OllamaLlmClient {
    client: Ollama,
    model: String,
}

impl OllamaLlmClient {
    fn new(base_url: String, model: String) -> Self {
        let (host, port) = split_host_port(&base_url);
        Self {
            client: Ollama::new(host, port),
            model,
        }
    }
}

fn split_host_port(base_url: &str) -> (String, u16) {
    let trimmed = base_url.trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    match without_scheme.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().unwrap_or(11434);
            (format!("http://{host}"), port)
        }
        None => (format!("http://{without_scheme}"), 11434),
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmClientError> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|error| LlmClientError::ProviderUnavailable(error.to_string()))?;

        let text = response.response.trim().to_string();
        if text.is_empty() {
            return Err(LlmClientError::GenerationFailed(
                "provider returned an empty response".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Build the query-expansion prompt: given an original query, ask for up to `max_variants`
/// alternative phrasings that preserve intent, one per line.
pub fn build_expansion_prompt(query: &str, max_variants: usize) -> String {
    format!(
        "System: You generate alternative phrasings of a search query to improve recall \
         against a document index. Preserve the original intent and entities. Return up to \
         {max_variants} alternative phrasings, one per line, with no numbering or extra \
         commentary.\n\nOriginal query: {query}\n"
    )
}

/// Build the re-rank scoring prompt for a single candidate chunk against the query.
pub fn build_rerank_prompt(query: &str, candidate_text: &str) -> String {
    format!(
        "System: You score how relevant a passage is to a search query on a scale from 0.0 \
         (irrelevant) to 1.0 (highly relevant). Return only the number.\n\n\
         Query: {query}\n\nPassage:\n{candidate_text}\n"
    )
}

/// Build the RAG synthesis prompt from assembled context and the user's question.
pub fn build_synthesis_prompt(question: &str, context: &str) -> String {
    format!(
        "System: Answer the question using only the provided context. If the context does not \
         contain the answer, say so plainly instead of guessing. Cite source chunks by their \
         bracketed index, e.g. [1].\n\nContext:\n{context}\n\nQuestion: {question}\n"
    )
}

/// Parse a re-rank score out of a raw LLM response, clamped to `[0.0, 1.0]`.
///
/// Falls back to `None` when no parseable float is found, so callers can fall back to the
/// vector similarity score alone.
pub fn parse_rerank_score(raw: &str) -> Option<f32> {
    raw.split_whitespace()
        .find_map(|token| token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_handles_scheme_and_port() {
        let (host, port) = split_host_port("http://127.0.0.1:11434");
        assert_eq!(host, "http://127.0.0.1");
        assert_eq!(port, 11434);
    }

    #[test]
    fn split_host_port_defaults_when_no_port() {
        let (host, port) = split_host_port("http://ollama.local");
        assert_eq!(host, "http://ollama.local");
        assert_eq!(port, 11434);
    }

    #[test]
    fn parse_rerank_score_extracts_float() {
        assert_eq!(parse_rerank_score("0.82"), Some(0.82));
        assert_eq!(parse_rerank_score("Score: 0.5 out of 1.0"), Some(0.5));
        assert_eq!(parse_rerank_score("not a number"), None);
    }

    #[test]
    fn parse_rerank_score_clamps_range() {
        assert_eq!(parse_rerank_score("5.0"), Some(1.0));
    }

    #[test]
    fn prompts_include_key_inputs() {
        let prompt = build_expansion_prompt("rust ownership", 3);
        assert!(prompt.contains("rust ownership"));
        assert!(prompt.contains("3"));
    }
}

//! Keyword matching over feed entries.

use regex::Regex;
use std::collections::BTreeSet;

/// Queries always searched for in the AWS blog, on top of the base queries.
pub const AWS_EXTRA_QUERIES: [&str; 5] = [
    "agentic coding",
    "amazon q developer",
    "codewhisperer",
    "vibe coding security engineering",
    "vibe coding security",
];

pub const AWS_DEFAULT_QUERIES: [&str; 3] = ["vibe coding", "security engineering", "vibe coding security"];

pub const AI_ENGINEERING_QUERIES: &[&str] = &[
    // Core AI engineering
    "AI engineer", "AI engineering", "LLM engineering",
    "prompt engineering", "RAG pipeline", "vector database",
    "LLMOps", "MLOps", "model evaluation",
    // AI-assisted development tools
    "cursor ide", "windsurf ide", "claude code",
    "github copilot", "amazon q developer", "codewhisperer",
    "aider", "continue dev", "sourcegraph cody",
    "tabnine", "codeium", "amazon bedrock",
    // Frameworks and platforms
    "langchain", "llamaindex", "autogen", "semantic kernel",
    "vercel ai sdk", "openai assistants", "anthropic claude",
    "hugging face", "crew ai", "dspy", "guidance ai",
    // Practices
    "prompt versioning", "prompt management", "prompt testing",
    "AI test driven development", "ATDD AI", "AI pair programming",
    "context engineering", "few shot learning", "chain of thought",
    "retrieval augmented generation", "fine tuning", "PEFT", "LoRA",
    // Infrastructure
    "vector embeddings", "embedding models", "inference optimization",
    "model serving", "model deployment", "token optimization",
    "context window", "semantic search", "hybrid search",
    // Models and providers
    "gpt-4", "claude 3", "llama 3", "deepseek", "gemini",
    "mistral", "qwen", "phi-3", "command r", "grok",
    // Agents
    "AI coding agents", "software development agents", "AI pair programmer",
    "autonomous coding agents", "AI programming assistant", "agentic software",
    "AI developer bots", "AI-powered code agents", "autonomous dev agents",
    "AI dev agents", "software agents with reasoning", "agent-based software engineering",
    "autonomous developer agents", "multi-agent software systems", "LLM-powered agents",
    "self-directed AI agents", "cognitive software agents", "tool-using AI agents",
    "AI software builders",
    // Coding with AI
    "AI-assisted development", "copilot coding", "AI code generation",
    "prompt-based programming", "LLM coding", "generative coding",
    "AI-enhanced development", "natural language programming", "coding with language models",
    "self-coding AI", "autonomous programming", "end-to-end code generation",
    "AI-led development", "agentic software engineering", "closed-loop AI development",
    "autonomous software agents", "full-stack AI engineering", "intelligent code orchestration",
    // Trending
    "GPT engineering", "AI IDEs", "agentic workflows", "small language models",
    "AI copilots for developers", "code synthesis from prompts", "software 2.0",
    "prompt engineering for development", "reasoning agents", "autonomous IDEs",
];

const COMPARISON_TERMS: [&str; 5] = ["vs", "versus", "compare", "comparison", "better than"];
const PRACTICAL_TERMS: [&str; 6] = ["tutorial", "guide", "how to", "example", "implementation", "code"];
const PERFORMANCE_TERMS: [&str; 6] = ["benchmark", "performance", "speed", "cost", "pricing", "optimization"];
const RELEASE_TERMS: [&str; 7] = ["announce", "release", "launch", "update", "new feature", "beta", "preview"];

/// A compiled query. Every word of the query must appear in the text as a
/// whole word, case-insensitively, in any order.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    query: String,
    words: Vec<Regex>,
}

impl QueryMatcher {
    pub fn new(query: &str) -> Self {
        let words = query
            .to_lowercase()
            .split_whitespace()
            .filter_map(|word| Regex::new(&format!(r"\b{}\b", regex::escape(word))).ok())
            .collect();

        Self {
            query: query.to_string(),
            words,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.words.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.words.iter().all(|word| word.is_match(&text))
    }
}

/// Case-insensitive, whole-word query match.
pub fn is_query_match(text: &str, query: &str) -> bool {
    QueryMatcher::new(query).matches(text)
}

/// Score an entry: ten points per matched query, plus small boosts for
/// comparison, practical, performance and release language.
pub fn relevance_score(text: &str, matched_queries: &BTreeSet<String>) -> f64 {
    let text = text.to_lowercase();
    let mentions = |terms: &[&str]| terms.iter().any(|term| text.contains(term));

    let mut score = matched_queries.len() as f64 * 10.0;
    if mentions(&COMPARISON_TERMS) {
        score += 5.0;
    }
    if mentions(&PRACTICAL_TERMS) {
        score += 3.0;
    }
    if mentions(&PERFORMANCE_TERMS) {
        score += 3.0;
    }
    if mentions(&RELEASE_TERMS) {
        score += 2.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_word_is_case_insensitive() {
        assert!(is_query_match("Hello World", "hello"));
        assert!(is_query_match("Hello World", "WORLD"));
    }

    #[test]
    fn phrase_words_all_present() {
        assert!(is_query_match("This is a test phrase", "test phrase"));
        assert!(is_query_match("This is a test phrase", "THIS IS A TEST"));
    }

    #[test]
    fn phrase_words_in_any_order() {
        assert!(is_query_match("Find these words here", "words find here"));
        assert!(is_query_match("Find these WORDS here", "HERE find WoRdS"));
    }

    #[test]
    fn missing_word_does_not_match() {
        assert!(!is_query_match("Hello World", "goodbye"));
        assert!(!is_query_match("Hello World", "hello there world"));
    }

    #[test]
    fn mixed_casing_on_either_side() {
        assert!(is_query_match("Test with Mixed Case", "MiXeD CaSe"));
        assert!(is_query_match("TeSt WiTh MiXeD CaSe", "mixed case"));
    }

    #[test]
    fn partial_words_do_not_match() {
        assert!(!is_query_match("Partial words should not match", "part"));
        assert!(!is_query_match("Partial words should not match", "shoulder"));
        assert!(is_query_match("Partial words should not match", "words match partial"));
    }

    #[test]
    fn punctuation_in_queries_is_literal() {
        assert!(is_query_match("We benchmarked GPT-4 against Claude", "gpt-4"));
        assert!(!is_query_match("We benchmarked GPT-40 today", "gpt-4"));
        assert!(!is_query_match("anything", "   "));
    }

    #[test]
    fn score_counts_matches_and_boosts() {
        let matched: BTreeSet<String> = ["langchain".to_string(), "rag pipeline".to_string()].into();
        assert_eq!(relevance_score("LangChain RAG pipeline", &matched), 20.0);
        assert_eq!(
            relevance_score("LangChain vs LlamaIndex: a tutorial on cost, new release", &matched),
            20.0 + 5.0 + 3.0 + 3.0 + 2.0
        );
        assert_eq!(relevance_score("nothing", &BTreeSet::new()), 0.0);
    }
}

//! Keyword and triplet extractors.
use anyhow::Result;
use std::collections::HashMap;
use tantivy::tokenizer::TextAnalyzer;
use tracing::warn;

use ragdex_core::traits::{KeywordExtractor, LanguageModel, TripletExtractor};
use ragdex_core::Triplet;

use crate::tantivy_utils::{is_stop_word, keyword_analyzer, tokenize};

pub const KEYWORD_EXTRACT_PROMPT: &str = "Some text is provided below. Given the text, extract up to {max_keywords} \
keywords from the text. Avoid stopwords.\n---------------------\n{text}\n---------------------\n\
Provide keywords in the following comma-separated format: 'KEYWORDS: <keywords>'\n";

pub const TRIPLET_EXTRACT_PROMPT: &str = "Some text is provided below. Given the text, extract up to {max_triplets} \
knowledge triplets in the form of (subject, predicate, object). Avoid stopwords.\n---------------------\n{text}\n\
---------------------\nTriplets:\n";

/// Frequency-ranked keywords from the tantivy analyzer. Ties keep the order
/// of first occurrence.
#[derive(Clone)]
pub struct SimpleKeywordExtractor {
    analyzer: TextAnalyzer,
}

impl Default for SimpleKeywordExtractor {
    fn default() -> Self { Self { analyzer: keyword_analyzer() } }
}

impl SimpleKeywordExtractor {
    pub fn new() -> Self { Self::default() }
}

impl KeywordExtractor for SimpleKeywordExtractor {
    fn extract_keywords(&self, text: &str, max_keywords: usize) -> Result<Vec<String>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for token in tokenize(&self.analyzer, text) {
            let count = counts.entry(token.clone()).or_insert(0);
            if *count == 0 { order.push(token); }
            *count += 1;
        }
        order.sort_by(|a, b| counts[b].cmp(&counts[a]));
        order.truncate(max_keywords);
        Ok(order)
    }
}

/// Keywords chosen by a language model, answering `KEYWORDS: a, b, c`.
/// Multi-word keywords are also split into their non-stop-word parts.
pub struct LlmKeywordExtractor<'a> {
    llm: &'a dyn LanguageModel,
}

impl<'a> LlmKeywordExtractor<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self { Self { llm } }
}

impl KeywordExtractor for LlmKeywordExtractor<'_> {
    fn extract_keywords(&self, text: &str, max_keywords: usize) -> Result<Vec<String>> {
        let max = max_keywords.to_string();
        let response = self.llm.predict(KEYWORD_EXTRACT_PROMPT, &[("max_keywords", &max), ("text", text)])?;
        Ok(parse_keyword_response(&response, max_keywords))
    }
}

pub fn parse_keyword_response(response: &str, max_keywords: usize) -> Vec<String> {
    let body = match response.find("KEYWORDS:") {
        Some(pos) => &response[pos + "KEYWORDS:".len()..],
        None => {
            warn!("keyword response had no KEYWORDS: prefix");
            response
        }
    };
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |k: String| if !k.is_empty() && !keywords.contains(&k) { keywords.push(k) };
    for raw in body.split(',').take(max_keywords) {
        let keyword = raw.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '.').to_lowercase();
        let parts: Vec<String> = keyword.split_whitespace().map(str::to_string).collect();
        push(keyword);
        if parts.len() > 1 {
            for part in parts.into_iter().filter(|p| !is_stop_word(p)) { push(part); }
        }
    }
    keywords
}

/// Triplets read from a language model reply of `(subject, predicate, object)` lines.
pub struct LlmTripletExtractor<'a> {
    llm: &'a dyn LanguageModel,
}

impl<'a> LlmTripletExtractor<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self { Self { llm } }
}

impl TripletExtractor for LlmTripletExtractor<'_> {
    fn extract_triplets(&self, text: &str, max_triplets: usize) -> Result<Vec<Triplet>> {
        let max = max_triplets.to_string();
        let response = self.llm.predict(TRIPLET_EXTRACT_PROMPT, &[("max_triplets", &max), ("text", text)])?;
        let mut triplets = parse_triplet_response(&response);
        triplets.truncate(max_triplets);
        Ok(triplets)
    }
}

/// Lines that are not a parenthesized three-part tuple are skipped.
pub fn parse_triplet_response(response: &str) -> Vec<Triplet> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let inner = line.strip_prefix('(')?.strip_suffix(')')?;
            let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
            match parts.as_slice() {
                [s, p, o] if !s.is_empty() && !p.is_empty() && !o.is_empty() => Some(Triplet::new(*s, *p, *o)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(&'static str);

    impl LanguageModel for Scripted {
        fn predict(&self, _template: &str, _vars: &[(&str, &str)]) -> Result<String> { Ok(self.0.to_string()) }
    }

    #[test]
    fn frequency_ranks_keywords() {
        let kws = SimpleKeywordExtractor::new()
            .extract_keywords("rust index. The index is fast; rust rust", 2)
            .unwrap();
        assert_eq!(kws, vec!["rust", "index"]);
    }

    #[test]
    fn llm_keywords_are_parsed_and_split() {
        let llm = Scripted("KEYWORDS: Borrow Checker, rust, rust");
        let kws = LlmKeywordExtractor::new(&llm).extract_keywords("ignored", 10).unwrap();
        assert_eq!(kws, vec!["borrow checker", "borrow", "checker", "rust"]);
    }

    #[test]
    fn triplet_lines_are_parsed() {
        let llm = Scripted("(alice, knows, bob)\nnot a triplet\n(a, b)\n( rust , is , fast )");
        let t = LlmTripletExtractor::new(&llm).extract_triplets("x", 5).unwrap();
        assert_eq!(t, vec![Triplet::new("alice", "knows", "bob"), Triplet::new("rust", "is", "fast")]);
    }
}

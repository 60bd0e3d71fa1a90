//! Tokenizer shared by the keyword index and query parsing.
//!
//! Lowercases, splits on anything that is not alphanumeric, and drops a fixed
//! English stopword list. Positions count every token, stopwords included, so
//! "retry the scope" places `retry` and `scope` two apart.

/// Sorted for binary search.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "how", "i", "if", "in", "into", "is", "it", "its", "may", "me", "my", "no", "not",
    "of", "on", "or", "our", "should", "so", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

/// A non-stopword term and its position in the full token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.binary_search(&term).is_ok()
}

fn raw_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Index-side tokenization with positions.
pub fn tokenize(text: &str) -> Vec<Token> {
    raw_tokens(text)
        .enumerate()
        .filter(|(_, term)| !is_stopword(term))
        .map(|(position, term)| Token {
            term,
            position: position as u32,
        })
        .collect()
}

/// Query-side tokenization: distinct non-stopword terms in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in raw_tokens(query) {
        if !is_stopword(&term) && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Lowercase and collapse whitespace. Used for cache keys, gap queries, and
/// near-duplicate comparison.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

//! FTS5 query sanitization
//!
//! User text goes straight into `MATCH`, and FTS5 has its own query syntax
//! (`AND`, `NEAR`, `*`, quotes, parens). Sanitization reduces the query to
//! quoted bare terms so arbitrary input can never be parsed as operators.

/// Sanitize free text into a safe FTS5 query.
///
/// Each alphanumeric token is double-quoted and the tokens are OR-ed, which
/// maximizes candidate recall for the BM25 signal; ranking sorts out
/// precision.
pub fn sanitize_fts5_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    terms.join(" OR ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_words() {
        assert_eq!(sanitize_fts5_query("best coffee"), "\"best\" OR \"coffee\"");
    }

    #[test]
    fn test_sanitize_strips_operators() {
        let q = sanitize_fts5_query("coffee* AND (\"tea\" NEAR milk)");
        assert!(!q.contains('('));
        assert!(!q.contains('*'));
        // Bare operators survive only as quoted literals
        assert!(q.contains("\"AND\""));
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_fts5_query("   "), "");
        assert_eq!(sanitize_fts5_query("!!! ???"), "");
    }
}

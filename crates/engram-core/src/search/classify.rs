//! Query classification and adaptive signal weighting
//!
//! Short keyword-ish queries lean on BM25, entity lookups lean on the graph
//! signal, and long natural-language queries lean on embeddings. The class
//! picks a weight row; the fusion step does the rest.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// QUERY CLASSES
// ============================================================================

/// Retrieval-relevant shape of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryClass {
    /// 1-2 words - keyword lookup
    Short,
    /// Mentions a named entity or asks "who is / where is / what does"
    Entity,
    /// 5+ words - natural language
    Long,
    /// 3-4 words, no entity signal
    #[default]
    Default,
}

/// Common capitalized words that are not entity mentions
const CAPITALIZED_STOPLIST: [&str; 24] = [
    "I", "I'm", "I'll", "I've", "I'd", "The", "A", "An", "This", "That", "What", "Who", "Where",
    "When", "Why", "How", "Is", "Are", "Do", "Does", "Can", "My", "Tell", "Please",
];

/// "who is X / where is X / what does X" style entity lookups
static INTERROGATIVE_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:who\s+is|who's|where\s+is|where's|what\s+does)\b")
        .expect("interrogative pattern is valid")
});

/// Classify a query for adaptive weighting.
///
/// Word count rules first: two or fewer words is always `Short`, five or
/// more is always `Long`. Only 3-4 word queries are inspected for entity
/// signals.
pub fn classify_query(query: &str) -> QueryClass {
    let words: Vec<&str> = query.split_whitespace().collect();

    if words.len() <= 2 {
        return QueryClass::Short;
    }
    if words.len() >= 5 {
        return QueryClass::Long;
    }

    let has_capitalized = words.iter().any(|word| {
        let starts_upper = word.chars().next().is_some_and(|c| c.is_uppercase());
        starts_upper && !CAPITALIZED_STOPLIST.contains(&word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
    });

    if has_capitalized || INTERROGATIVE_ENTITY.is_match(query) {
        return QueryClass::Entity;
    }

    QueryClass::Default
}

// ============================================================================
// ADAPTIVE WEIGHTS
// ============================================================================

/// Per-signal fusion weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    pub vector: f64,
    pub bm25: f64,
    pub graph: f64,
}

/// Weight row for a query class.
///
/// With the graph signal disabled its weight is forced to zero regardless
/// of class.
pub fn adaptive_weights(class: QueryClass, graph_enabled: bool) -> SignalWeights {
    let (vector, bm25, graph) = match class {
        QueryClass::Short => (0.8, 1.2, 1.0),
        QueryClass::Entity => (0.8, 1.0, 1.3),
        QueryClass::Long => (1.2, 0.7, 0.8),
        QueryClass::Default => (1.0, 1.0, 1.0),
    };

    SignalWeights {
        vector,
        bm25,
        graph: if graph_enabled { graph } else { 0.0 },
    }
}

// ============================================================================
// TESTS
// ============================================================================

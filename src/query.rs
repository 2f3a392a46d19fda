use serde::{Deserialize, Serialize};

use crate::record::{ContentHash, SearchRecord};

/// What the active search is looking for. Exact-hash searches group
/// identical content aggressively and auto-expand result groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKind {
    Keyword,
    Directory,
    ExactHash(ContentHash),
}

impl SearchKind {
    pub fn is_exact(&self) -> bool {
        matches!(self, SearchKind::ExactHash(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Any,
    Directories,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub raw: String,
    pub kind: SearchKind,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            raw: String::new(),
            kind: SearchKind::Keyword,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Relevance predicate applied before a record may enter the
    /// ingestion queue. Exact-hash searches accept only file results
    /// carrying the requested hash; keyword searches require every
    /// include term and reject any exclude term, case-insensitively
    /// against the full remote path.
    pub fn matches(&self, record: &SearchRecord) -> bool {
        match &self.kind {
            SearchKind::ExactHash(hash) => record.is_file() && record.hash.as_ref() == Some(hash),
            SearchKind::Keyword | SearchKind::Directory => {
                let haystack = record.path.to_lowercase();
                for term in &self.include {
                    if !haystack.contains(term.as_str()) {
                        return false;
                    }
                }
                for term in &self.exclude {
                    if haystack.contains(term.as_str()) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// Parse the search box contents. A lone base32 digest (with or without
/// a `tth:` prefix) becomes an exact-content search; otherwise the input
/// splits into whitespace terms, `-term` meaning exclusion.
pub fn parse_input(input: &str, mode: SearchMode) -> SearchQuery {
    let mut query = SearchQuery::default();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return query;
    }

    query.raw = trimmed.to_string();

    if let Some(hash) = parse_exact_hash(trimmed) {
        query.kind = SearchKind::ExactHash(hash);
        return query;
    }

    if mode == SearchMode::Directories {
        query.kind = SearchKind::Directory;
    }

    for token in trimmed.split_whitespace() {
        if let Some(rest) = token.strip_prefix('-') {
            if !rest.is_empty() {
                query.exclude.push(rest.to_lowercase());
                continue;
            }
        }
        query.include.push(token.to_lowercase());
    }

    query
}

fn parse_exact_hash(input: &str) -> Option<ContentHash> {
    if input.split_whitespace().nth(1).is_some() {
        return None;
    }

    let candidate = input
        .strip_prefix("tth:")
        .or_else(|| input.strip_prefix("TTH:"))
        .unwrap_or(input);

    candidate.parse().ok()
}

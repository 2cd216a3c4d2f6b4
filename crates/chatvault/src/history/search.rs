//! Full-text search over decrypted records.
//!
//! Search is a linear scan: every record is decrypted first, then matched
//! in order. Hits come back in journal order, capped at the query limit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::VaultError;
use crate::history::record::{Record, Role};

/// Width of a hit snippet in characters.
pub const SNIPPET_WIDTH: usize = 160;
/// Maximum characters of a neighbouring record shown as context.
pub const CONTEXT_WIDTH: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Every whitespace-separated term must occur.
    #[default]
    And,
    /// At least one term must occur.
    Or,
    /// The query is a regular expression.
    Regex,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::And => "and",
            SearchMode::Or => "or",
            SearchMode::Regex => "regex",
        })
    }
}

impl FromStr for SearchMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(SearchMode::And),
            "or" => Ok(SearchMode::Or),
            "regex" | "re" => Ok(SearchMode::Regex),
            other => Err(VaultError::ValidationFailed(format!(
                "unknown search mode {other:?} (expected and, or, regex)"
            ))),
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    /// Maximum number of hits; values below 1 are treated as 1.
    pub limit: usize,
    /// Attach the neighbouring records to each hit.
    pub with_context: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::And,
            case_sensitive: false,
            limit: 50,
            with_context: true,
        }
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_context(mut self, yes: bool) -> Self {
        self.with_context = yes;
        self
    }
}

/// First line of a neighbouring record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLine {
    pub role: Role,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    /// Zero-based position among the readable records.
    pub idx: usize,
    pub ts: DateTime<Utc>,
    pub role: Role,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<ContextLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<ContextLine>,
}

enum Matcher {
    Terms {
        terms: Vec<String>,
        all: bool,
        case_sensitive: bool,
    },
    Pattern(Regex),
}

impl Matcher {
    /// `None` for an empty query or an invalid pattern.
    fn build(query: &SearchQuery) -> Option<Self> {
        let q = query.query.trim();
        if q.is_empty() {
            return None;
        }
        match query.mode {
            SearchMode::Regex => match RegexBuilder::new(q)
                .case_insensitive(!query.case_sensitive)
                .build()
            {
                Ok(re) => Some(Matcher::Pattern(re)),
                Err(e) => {
                    log::debug!("invalid search pattern: {e}");
                    None
                }
            },
            mode => {
                let terms = q
                    .split_whitespace()
                    .map(|t| fold(t, query.case_sensitive))
                    .collect();
                Some(Matcher::Terms {
                    terms,
                    all: mode == SearchMode::And,
                    case_sensitive: query.case_sensitive,
                })
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Terms {
                terms,
                all,
                case_sensitive,
            } => {
                let haystack = fold(text, *case_sensitive);
                if *all {
                    terms.iter().all(|t| haystack.contains(t.as_str()))
                } else {
                    terms.iter().any(|t| haystack.contains(t.as_str()))
                }
            }
        }
    }

    /// Regex locating the first interesting span for the snippet.
    fn locator(&self) -> Option<Regex> {
        match self {
            Matcher::Pattern(re) => Some(re.clone()),
            Matcher::Terms {
                terms,
                case_sensitive,
                ..
            } => {
                let alternation = terms
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|");
                RegexBuilder::new(&alternation)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .ok()
            }
        }
    }
}

fn fold(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

/// Run `query` over `records` in order.
pub fn search(records: &[Record], query: &SearchQuery) -> Vec<Hit> {
    let Some(matcher) = Matcher::build(query) else {
        return Vec::new();
    };
    let locator = matcher.locator();
    let limit = query.limit.max(1);

    let mut hits = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        if record.content.is_empty() || !matcher.is_match(&record.content) {
            continue;
        }

        let (prev, next) = if query.with_context {
            (
                idx.checked_sub(1).map(|i| context_line(&records[i])),
                records.get(idx + 1).map(context_line),
            )
        } else {
            (None, None)
        };

        hits.push(Hit {
            idx,
            ts: record.ts,
            role: record.role,
            snippet: make_snippet(&record.content, locator.as_ref(), SNIPPET_WIDTH),
            prev,
            next,
        });
        if hits.len() >= limit {
            break;
        }
    }
    hits
}

fn context_line(record: &Record) -> ContextLine {
    let first = record.content.lines().next().unwrap_or("");
    ContextLine {
        role: record.role,
        line: first.chars().take(CONTEXT_WIDTH).collect(),
    }
}

/// Whitespace-collapsed excerpt of `text` around the first match of
/// `locator`: a quarter of `width` before the match, half after.
pub fn make_snippet(text: &str, locator: Option<&Regex>, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return flat;
    }
    let chars: Vec<char> = flat.chars().collect();

    let Some(m) = locator.and_then(|re| re.find(&flat)) else {
        if chars.len() > width {
            let mut head: String = chars[..width].iter().collect();
            head.push('…');
            return head;
        }
        return flat;
    };

    // Byte offsets to char offsets.
    let m_start = flat[..m.start()].chars().count();
    let m_end = m_start + flat[m.start()..m.end()].chars().count();

    let start = m_start.saturating_sub(width / 4);
    let end = (m_end + width / 2).min(chars.len());
    let mut cut: String = chars[start..end].iter().collect();
    if start > 0 {
        cut.insert_str(0, "… ");
    }
    if end < chars.len() {
        cut.push_str(" …");
    }
    cut
}

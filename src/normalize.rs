//! Identity normalization and block attachment.
//!
//! Raw id tokens from every dialect fold into one namespace here, and each
//! attachment block becomes at most one [`Declaration`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use tracing::debug;

use crate::graph::{Dialect, Location};
use crate::parser::{RawStatement, StatementKind};

/// A dependency reference after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub id: String,
    pub declared_at: Location,
}

/// One block that declares a task, with everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: String,
    pub title: Option<String>,
    pub defined_at: Location,
    pub dialect: Dialect,
    pub dependencies: Vec<DependencyRef>,
}

/// Declarations of one file plus what had to be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub declarations: Vec<Declaration>,
    pub orphan_dependencies: usize,
    pub rejected_ids: usize,
}

/// Canonical form of an identifier token.
///
/// Surrounding characters that are neither alphanumeric nor `_` are trimmed
/// (`#`, `:`, brackets, quotes, trailing commas), then the rest is
/// lower-cased. Returns `None` when nothing is left, or when what is left
/// still holds whitespace or a comma (`[#a, #b]`, `[Fix login]`).
pub fn canonical_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'));
    if trimmed.is_empty() || trimmed.contains(|c: char| c == ',' || c.is_whitespace()) {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Turn one file's raw statements into declarations, one per block with a valid id.
pub fn attach(file: &Path, statements: &[RawStatement]) -> Normalized {
    let mut out = Normalized::default();

    for group in statements.chunk_by(|a, b| a.block == b.block) {
        let mut declared: Option<(String, Dialect)> = None;
        let mut title: Option<String> = None;
        let mut dependencies = Vec::new();

        for raw in group {
            let st = &raw.statement;
            match st.kind {
                StatementKind::Id => {
                    let token = st.ids.first().map(String::as_str).unwrap_or_default();
                    match canonical_id(token) {
                        Some(id) if declared.is_none() => declared = Some((id, st.dialect)),
                        Some(_) => {}
                        None => out.rejected_ids += 1,
                    }
                }
                StatementKind::Depends => {
                    for token in &st.ids {
                        match canonical_id(token) {
                            Some(id) => dependencies.push(DependencyRef {
                                id,
                                declared_at: Location::new(file, raw.line),
                            }),
                            None => out.rejected_ids += 1,
                        }
                    }
                }
            }
            if title.is_none() {
                title = st.title.clone();
            }
        }

        let anchor = group[0].anchor;
        match declared {
            Some((id, dialect)) => out.declarations.push(Declaration {
                id,
                title,
                defined_at: Location::new(file, anchor),
                dialect,
                dependencies,
            }),
            None if !dependencies.is_empty() => {
                debug!(
                    file = %file.display(),
                    line = anchor,
                    count = dependencies.len(),
                    "dependency statement without a task id"
                );
                out.orphan_dependencies += dependencies.len();
            }
            None => {}
        }
    }

    out
}

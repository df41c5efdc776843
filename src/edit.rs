//! In-place source edits driven by a snapshot.
//!
//! Two edits are supported: giving bare `TODO` comments a placeholder id, and
//! rewriting the dependency line of a declared task. Both re-parse the file
//! they touch, so a stale snapshot fails with an error instead of editing
//! the wrong line. Callers rescan the returned paths afterwards.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::graph::{Dialect, Location, Snapshot, SourceStatus};
use crate::normalize::canonical_id;
use crate::parser::{classify, parse_source, CommentFamily, DialectTable, LineKind, StatementKind};

const MARKERS: &[&str] = &["todo", "fixme", "hack", "xxx"];

/// Longest first where one opener prefixes another.
const OPENERS: &[&str] = &["<!--", "//", "/*", "\"\"\"", "'''", "--", "#", "*"];

/// What [`fix_missing_ids`] inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    /// Each placeholder id with the line it was written to.
    pub added: Vec<(String, Location)>,
    /// Files that were rewritten, sorted.
    pub files: Vec<PathBuf>,
}

// ─── Placeholder Ids ────────────────────────────────────────────

/// Insert an `@cgraph-id` line under every marker comment (`TODO: ...`,
/// `FIXME[]`) that carries no usable id. A marker already followed by an id
/// line is left alone, so running it twice adds nothing.
///
/// Placeholders are `todo-<relative-path>-<line>`, made unique against the
/// snapshot's ids and each other.
pub fn fix_missing_ids(snapshot: &Snapshot) -> Result<FixReport> {
    let dialects = DialectTable::builtin();
    let roots = canonical_roots(snapshot);
    let mut taken: BTreeSet<String> = snapshot.nodes().iter().map(|n| n.id.clone()).collect();
    let mut report = FixReport::default();

    for (path, record) in snapshot.sources() {
        if record.status != SourceStatus::Parsed {
            continue;
        }
        let text = fs::read_to_string(path)?;
        let missing = missing_id_lines(path, &text, dialects);
        if missing.is_empty() {
            continue;
        }

        let slug = path_slug(relative_to(path, &roots));
        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        for (offset, line) in missing.into_iter().enumerate() {
            let idx = line - 1 + offset;
            let id = unique_placeholder(&slug, line, &mut taken);
            let inserted = annotation_line(&lines[idx], &format!("@cgraph-id {id}"));
            lines.insert(idx + 1, inserted);
            report.added.push((id, Location::new(path, idx + 2)));
        }

        fs::write(path, lines.join("\n"))?;
        debug!(file = %path.display(), "placeholder ids written");
        report.files.push(path.clone());
    }

    info!(added = report.added.len(), files = report.files.len(), "missing ids fixed");
    Ok(report)
}

/// 1-indexed lines of marker comments with no usable id on them or on the
/// line right after.
fn missing_id_lines(path: &Path, text: &str, dialects: &DialectTable) -> Vec<usize> {
    let syntax = CommentFamily::from_path(path).syntax();
    let kinds = classify(text, &syntax);

    let mut missing = Vec::new();
    for (idx, kind) in kinds.iter().enumerate() {
        let LineKind::Comment(comment) = kind else {
            continue;
        };
        if starts_with_marker(comment)
            && !is_annotation(dialects, Some(kind), true)
            && !is_annotation(dialects, kinds.get(idx + 1), false)
        {
            missing.push(idx + 1);
        }
    }
    missing
}

/// Whether `kind` is a comment with a usable id, or with any dependency
/// statement when `any_statement` is set.
fn is_annotation(dialects: &DialectTable, kind: Option<&LineKind<'_>>, any_statement: bool) -> bool {
    let Some(LineKind::Comment(comment)) = kind else {
        return false;
    };
    dialects.match_line(comment).is_some_and(|st| match st.kind {
        StatementKind::Id => st.ids.first().and_then(|t| canonical_id(t)).is_some(),
        _ => any_statement,
    })
}

fn starts_with_marker(comment: &str) -> bool {
    let word_end = comment
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(comment.len());
    let (word, rest) = comment.split_at(word_end);
    MARKERS.iter().any(|m| m.eq_ignore_ascii_case(word))
        && !rest.starts_with(|c: char| c.is_alphanumeric() || c == '-' || c == '_')
}

fn unique_placeholder(slug: &str, line: usize, taken: &mut BTreeSet<String>) -> String {
    let base = format!("todo-{slug}-{line}");
    let mut candidate = base.clone();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn path_slug(rel: &Path) -> String {
    let lowered = rel.to_string_lossy().to_lowercase();
    let slug = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "todo".to_string()
    } else {
        slug
    }
}

fn canonical_roots(snapshot: &Snapshot) -> Vec<PathBuf> {
    snapshot
        .options()
        .roots
        .iter()
        .map(|root| fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
        .collect()
}

fn relative_to<'a>(path: &'a Path, roots: &[PathBuf]) -> &'a Path {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
}

// ─── Dependency Lines ───────────────────────────────────────────

/// Replace the dependencies of task `id` with `deps`.
///
/// Every entry of `deps` must be a declared task and at least one is
/// required. The existing dependency line is rewritten in place, or a new
/// one is inserted under the id line. Returns the edited file.
pub fn update_deps(snapshot: &Snapshot, id: &str, deps: &[&str]) -> Result<PathBuf> {
    let deps = declared_deps(snapshot, deps)?;
    if deps.is_empty() {
        return Err(GraphError::NoDependencies(id.to_string()));
    }
    rewrite_deps(snapshot, id, &deps)
}

/// Like [`update_deps`], but an empty `deps` removes the dependency line.
pub fn update_deps_allow_empty(snapshot: &Snapshot, id: &str, deps: &[&str]) -> Result<PathBuf> {
    let deps = declared_deps(snapshot, deps)?;
    rewrite_deps(snapshot, id, &deps)
}

/// Drop `dependency` from task `id`, or every dependency when it is `None`.
///
/// Remaining dependencies are kept as they are, declared or not.
pub fn detach_deps(snapshot: &Snapshot, id: &str, dependency: Option<&str>) -> Result<PathBuf> {
    let current = snapshot.dependencies_of(id);
    let remaining: Vec<String> = match dependency {
        None => Vec::new(),
        Some(dep) => {
            let target = canonical_id(dep).unwrap_or_default();
            if !current.contains(&target.as_str()) {
                return Err(GraphError::NotADependency {
                    id: id.to_string(),
                    dependency: dep.to_string(),
                });
            }
            current
                .iter()
                .filter(|d| **d != target)
                .map(|d| d.to_string())
                .collect()
        }
    };
    rewrite_deps(snapshot, id, &remaining)
}

/// Canonical, deduplicated ids that all name declared tasks.
fn declared_deps(snapshot: &Snapshot, deps: &[&str]) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for dep in deps {
        let node = snapshot
            .node(dep)
            .ok_or_else(|| GraphError::UnknownTask(dep.to_string()))?;
        if seen.insert(node.id.clone()) {
            out.push(node.id.clone());
        }
    }
    Ok(out)
}

fn rewrite_deps(snapshot: &Snapshot, id: &str, deps: &[String]) -> Result<PathBuf> {
    let node = snapshot
        .node(id)
        .ok_or_else(|| GraphError::UnknownTask(id.to_string()))?;
    let path = node.defined_at.file.clone();
    let stale = || GraphError::StaleLocation {
        id: node.id.clone(),
        location: node.defined_at.clone(),
    };

    let text = fs::read_to_string(&path)?;
    let statements = parse_source(&path, &text, DialectTable::builtin());
    let declaring = statements
        .iter()
        .find(|s| {
            s.anchor == node.defined_at.line
                && s.statement.kind == StatementKind::Id
                && s.statement.ids.first().and_then(|t| canonical_id(t)).as_deref()
                    == Some(node.id.as_str())
        })
        .ok_or_else(stale)?;

    let dep_lines: Vec<_> = statements
        .iter()
        .filter(|s| s.block == declaring.block && s.statement.kind == StatementKind::Depends)
        .collect();
    if dep_lines.len() > 1 {
        return Err(GraphError::AmbiguousDependencies {
            id: node.id.clone(),
            location: node.defined_at.clone(),
            count: dep_lines.len(),
        });
    }

    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    match (dep_lines.first(), deps.is_empty()) {
        (Some(existing), true) => {
            lines.remove(existing.line - 1);
        }
        (Some(existing), false) => {
            let idx = existing.line - 1;
            let body = deps_body(existing.statement.dialect, deps);
            lines[idx] = annotation_line(&lines[idx], &body);
        }
        (None, true) => return Ok(path),
        (None, false) => {
            let idx = declaring.line - 1;
            let body = deps_body(node.dialect, deps);
            let inserted = annotation_line(&lines[idx], &body);
            lines.insert(idx + 1, inserted);
        }
    }

    fs::write(&path, lines.join("\n"))?;
    info!(id = %node.id, file = %path.display(), deps = deps.len(), "dependencies updated");
    Ok(path)
}

/// The dependency statement in the phrasing of `dialect`.
fn deps_body(dialect: Dialect, deps: &[String]) -> String {
    match dialect {
        Dialect::AtTag => format!("@cgraph-deps {}", deps.join(", ")),
        _ => {
            let tagged: Vec<String> = deps.iter().map(|d| format!("#{d}")).collect();
            format!("deps: {}", tagged.join(", "))
        }
    }
}

// ─── Comment Delimiters ─────────────────────────────────────────

/// `body` wrapped in the comment delimiters of the neighbouring `line`.
///
/// A line with no opener of its own sits inside a block comment, so the new
/// line gets its indentation only. Openers that stay open on `line` are
/// continued rather than repeated.
fn annotation_line(line: &str, body: &str) -> String {
    let cr = if line.ends_with('\r') { "\r" } else { "" };
    let line = line.trim_end_matches('\r');
    let rest = line.trim_start();
    let indent = &line[..line.len() - rest.len()];

    let Some(opener) = OPENERS.iter().find(|o| rest.starts_with(**o)) else {
        return format!("{indent}{body}{cr}");
    };
    let after = &rest[opener.len()..];

    let (lead, suffix) = match *opener {
        "/*" if after.contains("*/") => ("/* ".to_string(), " */".to_string()),
        "/*" => (" * ".to_string(), String::new()),
        "<!--" if after.contains("-->") => ("<!-- ".to_string(), " -->".to_string()),
        quote @ ("\"\"\"" | "'''") if after.contains(quote) => {
            (format!("{quote} "), format!(" {quote}"))
        }
        "<!--" | "\"\"\"" | "'''" => (String::new(), String::new()),
        other => (format!("{other} "), String::new()),
    };
    format!("{indent}{lead}{body}{suffix}{cr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;
    use crate::scan::Scanner;

    fn scan(root: &Path) -> Snapshot {
        Scanner::new(ScanOptions::new([root])).scan().unwrap()
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_annotation_line_delimiters() {
        assert_eq!(annotation_line("    // TODO: x", "@cgraph-id a"), "    // @cgraph-id a");
        assert_eq!(annotation_line("/* TODO: x */", "@cgraph-id a"), "/* @cgraph-id a */");
        assert_eq!(annotation_line("/** TODO: x", "@cgraph-id a"), " * @cgraph-id a");
        assert_eq!(annotation_line("  * TODO: x", "@cgraph-id a"), "  * @cgraph-id a");
        assert_eq!(annotation_line("// TODO\r", "@cgraph-id a"), "// @cgraph-id a\r");
        assert_eq!(annotation_line("    task-id: a", "deps: #b"), "    deps: #b");
        assert_eq!(annotation_line("# TODO", "@cgraph-id a"), "# @cgraph-id a");
        assert_eq!(annotation_line("<!-- TODO -->", "@cgraph-id a"), "<!-- @cgraph-id a -->");
    }

    #[test]
    fn test_marker_detection() {
        assert!(starts_with_marker("TODO: clean up"));
        assert!(starts_with_marker("fixme"));
        assert!(starts_with_marker("TODO[] later"));
        assert!(!starts_with_marker("todos for later"));
        assert!(!starts_with_marker("todo-list"));
        assert!(!starts_with_marker("@todo-id a"));
    }

    #[test]
    fn test_path_slug() {
        assert_eq!(path_slug(Path::new("src/Users.ts")), "src-users-ts");
        assert_eq!(path_slug(Path::new("...")), "todo");
    }

    #[test]
    fn test_fix_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(
            &file,
            "// TODO: tidy up\nfn a() {}\n// TODO[#kept] fine\n/*\n * FIXME[] broken\n */\n// todos are prose\n",
        )
        .unwrap();
        let before = scan(dir.path());
        assert_eq!(before.nodes().len(), 1);

        let report = fix_missing_ids(&before).unwrap();
        let ids: Vec<&str> = report.added.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["todo-a-rs-1", "todo-a-rs-5"]);
        assert_eq!(report.files.len(), 1);
        assert_eq!(
            read(&file),
            "// TODO: tidy up\n// @cgraph-id todo-a-rs-1\nfn a() {}\n// TODO[#kept] fine\n/*\n * FIXME[] broken\n * @cgraph-id todo-a-rs-5\n */\n// todos are prose\n"
        );

        let after = scan(dir.path());
        assert_eq!(after.nodes().len(), 3);
        assert!(after.node("todo-a-rs-1").is_some());
        assert_eq!(after.node("todo-a-rs-5").map(|n| n.defined_at.line), Some(7));
        assert!(after.is_clean());

        let again = fix_missing_ids(&after).unwrap();
        assert!(again.added.is_empty());
    }

    #[test]
    fn test_placeholders_stay_unique() {
        let mut taken: BTreeSet<String> = ["todo-a-rs-1".to_string()].into_iter().collect();
        assert_eq!(unique_placeholder("a-rs", 1, &mut taken), "todo-a-rs-1-1");
        assert_eq!(unique_placeholder("a-rs", 1, &mut taken), "todo-a-rs-1-2");
    }

    #[test]
    fn test_update_deps_replaces_and_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.go");
        fs::write(&a, "// @cgraph-id a\n// @cgraph-deps b\nfn a() {}\n").unwrap();
        fs::write(&b, "// TODO[#b] second\nfunc b() {}\n// @cgraph-id c\n").unwrap();
        let snap = scan(dir.path());

        update_deps(&snap, "a", &["#C", "b", "c"]).unwrap();
        assert_eq!(read(&a), "// @cgraph-id a\n// @cgraph-deps c, b\nfn a() {}\n");

        update_deps(&snap, "b", &["c"]).unwrap();
        assert_eq!(read(&b), "// TODO[#b] second\n// deps: #c\nfunc b() {}\n// @cgraph-id c\n");

        let after = scan(dir.path());
        assert_eq!(after.dependencies_of("a"), vec!["b", "c"]);
        assert_eq!(after.dependencies_of("b"), vec!["c"]);
    }

    #[test]
    fn test_update_deps_validation() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        fs::write(&a, "// @cgraph-id a\n// @cgraph-deps b\n// @cgraph-deps c\n\n// @cgraph-id b\n").unwrap();
        let snap = scan(dir.path());

        assert!(matches!(update_deps(&snap, "zz", &["b"]), Err(GraphError::UnknownTask(_))));
        assert!(matches!(update_deps(&snap, "b", &["ghost"]), Err(GraphError::UnknownTask(_))));
        assert!(matches!(update_deps(&snap, "b", &[]), Err(GraphError::NoDependencies(_))));
        assert!(matches!(
            update_deps(&snap, "a", &["b"]),
            Err(GraphError::AmbiguousDependencies { count: 2, .. })
        ));

        fs::write(&a, "\n\n// @cgraph-id b\n").unwrap();
        assert!(matches!(
            update_deps(&snap, "b", &["b"]),
            Err(GraphError::StaleLocation { .. })
        ));
    }

    #[test]
    fn test_detach_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        fs::write(&a, "// @cgraph-id a\n// @cgraph-deps b, ghost\n\n// @cgraph-id b\n").unwrap();
        let snap = scan(dir.path());

        assert!(matches!(
            detach_deps(&snap, "a", Some("c")),
            Err(GraphError::NotADependency { .. })
        ));

        detach_deps(&snap, "a", Some("#B")).unwrap();
        assert_eq!(read(&a), "// @cgraph-id a\n// @cgraph-deps ghost\n\n// @cgraph-id b\n");

        let snap = scan(dir.path());
        detach_deps(&snap, "a", None).unwrap();
        assert_eq!(read(&a), "// @cgraph-id a\n\n// @cgraph-id b\n");

        let snap = scan(dir.path());
        assert!(snap.dependencies_of("a").is_empty());
        update_deps_allow_empty(&snap, "a", &[]).unwrap();
        assert_eq!(read(&a), "// @cgraph-id a\n\n// @cgraph-id b\n");
    }
}

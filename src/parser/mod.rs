//! Dialect parser: comment regions → raw annotation statements.
//!
//! Lines are classified into comment regions, matched against the dialect
//! table, and grouped into attachment blocks. A block is a contiguous run of
//! comment lines; one interior blank comment line is tolerated, a second one
//! (or code, or an empty line outside a block comment) ends the block.
//! Marker-style id lines (`TODO[#id]`) always open a new block, and so does
//! any id statement arriving in a block that already has one.

pub mod comments;
pub mod dialect;
pub mod language;

use std::path::Path;

use tracing::trace;

pub use comments::{classify, LineKind};
pub use dialect::{DialectTable, Extractor, RuleSpec, Statement, StatementKind, BUILTIN_RULES};
pub use language::{CommentFamily, CommentSyntax};

/// A statement together with the block it attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// Block number within the file, starting at 1.
    pub block: usize,
    /// First line of the block; the node anchor.
    pub anchor: usize,
    /// Line of the statement itself.
    pub line: usize,
    pub statement: Statement,
}

/// Parse one file's text into raw statements, in line order.
pub fn parse_source(path: &Path, source: &str, dialects: &DialectTable) -> Vec<RawStatement> {
    let syntax = CommentFamily::from_path(path).syntax();
    let mut statements = Vec::new();

    let mut block = 0;
    let mut anchor = 0;
    let mut open = false;
    let mut has_id = false;
    let mut blank_run = 0;

    for (idx, kind) in classify(source, &syntax).into_iter().enumerate() {
        let line = idx + 1;
        match kind {
            LineKind::Code | LineKind::Blank => open = false,
            LineKind::Delimiter => {}
            LineKind::CommentBlank => {
                if open {
                    blank_run += 1;
                    if blank_run > 1 {
                        open = false;
                    }
                }
            }
            LineKind::Comment(text) => {
                let matched = dialects.match_line(text);
                let splits = open
                    && matched.as_ref().is_some_and(|st| {
                        st.kind == StatementKind::Id && (st.starts_block || has_id)
                    });
                if !open || splits {
                    block += 1;
                    anchor = line;
                    open = true;
                    has_id = false;
                }
                blank_run = 0;

                if let Some(statement) = matched {
                    trace!(file = %path.display(), line, dialect = %statement.dialect, "annotation");
                    has_id |= statement.kind == StatementKind::Id;
                    statements.push(RawStatement {
                        block,
                        anchor,
                        line,
                        statement,
                    });
                }
            }
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, source: &str) -> Vec<RawStatement> {
        parse_source(Path::new(name), source, DialectTable::builtin())
    }

    fn blocks(statements: &[RawStatement]) -> Vec<(usize, usize, usize)> {
        statements
            .iter()
            .map(|s| (s.block, s.anchor, s.line))
            .collect()
    }

    #[test]
    fn test_block_groups_contiguous_comments() {
        let statements = parse(
            "a.ts",
            "// Fetch users\n// @cgraph-id a\n// @cgraph-deps b\nexport function f() {}\n",
        );
        assert_eq!(blocks(&statements), vec![(1, 1, 2), (1, 1, 3)]);
    }

    #[test]
    fn test_code_line_ends_block() {
        let statements = parse("a.go", "// TODO:[#a]\n// DEPS: #b\nconst x = 1\n// DEPS: #c\n");
        assert_eq!(blocks(&statements), vec![(1, 1, 1), (1, 1, 2), (2, 4, 4)]);
    }

    #[test]
    fn test_marker_line_starts_new_block() {
        let statements = parse("a.go", "// TODO:[#a]\n// DEPS: #b\n// TODO:[#c]\n// DEPS: #d\n");
        assert_eq!(
            blocks(&statements),
            vec![(1, 1, 1), (1, 1, 2), (2, 3, 3), (2, 3, 4)]
        );
    }

    #[test]
    fn test_second_id_in_block_starts_new_block() {
        let statements = parse("a.rs", "// @cgraph-id a\n// @cgraph-id b\n");
        assert_eq!(blocks(&statements), vec![(1, 1, 1), (2, 2, 2)]);
    }

    #[test]
    fn test_one_blank_comment_line_is_tolerated() {
        let statements = parse("a.rs", "/*\n * @cgraph-id a\n *\n * @cgraph-deps b\n */\n");
        assert_eq!(blocks(&statements), vec![(1, 2, 2), (1, 2, 4)]);
    }

    #[test]
    fn test_two_blank_comment_lines_split_block() {
        let statements = parse("a.rs", "/*\n * @cgraph-id a\n *\n *\n * @cgraph-deps b\n */\n");
        assert_eq!(blocks(&statements), vec![(1, 2, 2), (2, 5, 5)]);
    }

    #[test]
    fn test_empty_source_line_splits_line_comments() {
        let statements = parse("a.rs", "// @cgraph-id a\n\n// @cgraph-deps b\n");
        assert_eq!(blocks(&statements), vec![(1, 1, 1), (2, 3, 3)]);
    }

    #[test]
    fn test_prose_is_inert() {
        let statements = parse("a.rs", "// just a note\n// TODO: tidy up\nfn f() {}\n");
        assert!(statements.is_empty());
    }

    #[test]
    fn test_trailing_comment_is_ignored() {
        let statements = parse("a.rs", "let x = 1; // @cgraph-id a\n");
        assert!(statements.is_empty());
    }

    #[test]
    fn test_python_docstring_block() {
        let statements = parse("a.py", "\"\"\"\nid: a\ndepends on: #b\n\"\"\"\ndef f():\n    pass\n");
        assert_eq!(blocks(&statements), vec![(1, 2, 2), (1, 2, 3)]);
        assert_eq!(statements[0].statement.dialect, crate::graph::Dialect::Keyword);
    }
}

//! Line classification into comment regions.
//!
//! Only lines that *start* with a comment delimiter (after indentation), or
//! that lie inside an open block comment, carry comment text. Trailing
//! comments after code are not comment lines.

use super::language::CommentSyntax;

/// What a single source line contributes to comment grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Anything that is not a comment.
    Code,
    /// An empty line outside any block comment.
    Blank,
    /// A bare opener or closer such as `/*` or ` */`.
    Delimiter,
    /// A comment line with no text: `//`, ` *`, or an empty line inside a block comment.
    CommentBlank,
    /// Comment text with delimiters and continuation stars removed.
    Comment(&'a str),
}

/// Classify every line of `source` (1-indexed by position + 1).
pub fn classify<'a>(source: &'a str, syntax: &CommentSyntax) -> Vec<LineKind<'a>> {
    let mut kinds = Vec::new();
    let mut open: Option<&'static str> = None;

    for raw in source.lines() {
        let trimmed = raw.trim();

        if let Some(closer) = open {
            let (body, closed) = match trimmed.find(closer) {
                Some(pos) => (&trimmed[..pos], true),
                None => (trimmed, false),
            };
            if closed {
                open = None;
            }
            let text = strip_continuation(body);
            kinds.push(match (text.is_empty(), closed) {
                (true, true) => LineKind::Delimiter,
                (true, false) => LineKind::CommentBlank,
                (false, _) => LineKind::Comment(text),
            });
            continue;
        }

        if trimmed.is_empty() {
            kinds.push(LineKind::Blank);
            continue;
        }

        if let Some(kind) = open_block(trimmed, syntax, &mut open) {
            kinds.push(kind);
            continue;
        }

        let line_comment = syntax.line.iter().find_map(|prefix| {
            trimmed.strip_prefix(prefix).map(|rest| {
                rest.trim_start_matches(|c: char| prefix.contains(c) || c == '!')
                    .trim()
            })
        });

        kinds.push(match line_comment {
            Some("") => LineKind::CommentBlank,
            Some(text) => LineKind::Comment(text),
            None => LineKind::Code,
        });
    }

    kinds
}

/// Handle a line that starts a block comment, possibly closing it again.
fn open_block<'a>(
    trimmed: &'a str,
    syntax: &CommentSyntax,
    open: &mut Option<&'static str>,
) -> Option<LineKind<'a>> {
    let (rest, closer) = syntax
        .block
        .iter()
        .find_map(|(opener, closer)| trimmed.strip_prefix(opener).map(|rest| (rest, *closer)))?;

    let body = match rest.find(closer) {
        Some(pos) => &rest[..pos],
        None => {
            *open = Some(closer);
            rest
        }
    };

    let text = strip_continuation(body);
    Some(if text.is_empty() {
        LineKind::Delimiter
    } else {
        LineKind::Comment(text)
    })
}

fn strip_continuation(body: &str) -> &str {
    body.trim().trim_start_matches('*').trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::language::CommentFamily;

    fn c_style(source: &str) -> Vec<LineKind<'_>> {
        classify(source, &CommentFamily::CStyle.syntax())
    }

    #[test]
    fn test_line_comments() {
        let kinds = c_style("// one\n///   two\n//\nlet x = 1; // trailing\n\n");
        assert_eq!(
            kinds,
            vec![
                LineKind::Comment("one"),
                LineKind::Comment("two"),
                LineKind::CommentBlank,
                LineKind::Code,
                LineKind::Blank,
            ]
        );
    }

    #[test]
    fn test_block_comment_span() {
        let source = "/*\n * @cgraph-id a\n *\n\n * more\n */\nfn main() {}";
        assert_eq!(
            c_style(source),
            vec![
                LineKind::Delimiter,
                LineKind::Comment("@cgraph-id a"),
                LineKind::CommentBlank,
                LineKind::CommentBlank,
                LineKind::Comment("more"),
                LineKind::Delimiter,
                LineKind::Code,
            ]
        );
    }

    #[test]
    fn test_single_line_block() {
        assert_eq!(
            c_style("/* TODO[#a] fix */\n/** */"),
            vec![LineKind::Comment("TODO[#a] fix"), LineKind::Delimiter]
        );
    }

    #[test]
    fn test_block_opener_with_text() {
        assert_eq!(
            c_style("/** @cgraph-id a\n  done */"),
            vec![LineKind::Comment("@cgraph-id a"), LineKind::Comment("done")]
        );
    }

    #[test]
    fn test_python_docstring_and_hash() {
        let syntax = CommentFamily::Python.syntax();
        let kinds = classify("\"\"\"\nid: a\n\"\"\"\n# deps: b\nx = 1", &syntax);
        assert_eq!(
            kinds,
            vec![
                LineKind::Delimiter,
                LineKind::Comment("id: a"),
                LineKind::Delimiter,
                LineKind::Comment("deps: b"),
                LineKind::Code,
            ]
        );
    }

    #[test]
    fn test_rust_attribute_is_code() {
        assert_eq!(c_style("#[derive(Debug)]"), vec![LineKind::Code]);
    }

    #[test]
    fn test_markup_comment() {
        let syntax = CommentFamily::Markup.syntax();
        assert_eq!(
            classify("<!-- TODO #a -->\n<div></div>", &syntax),
            vec![LineKind::Comment("TODO #a"), LineKind::Code]
        );
    }
}

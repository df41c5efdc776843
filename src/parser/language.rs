//! Comment delimiter detection by file extension.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Families of languages that share comment delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentFamily {
    /// `//` and `/* */` (Rust, Go, JS/TS, Java, C, C#, Swift, ...).
    CStyle,
    /// `#` (shell, Ruby, YAML, TOML, ...).
    Hash,
    /// `#` plus `"""` / `'''` docstrings.
    Python,
    /// `--` plus `/* */` (SQL, Lua, Haskell).
    Dash,
    /// `<!-- -->` plus `//` and `/* */` for embedded scripts.
    Markup,
    /// Unknown extension: every delimiter we know.
    Any,
}

/// Line prefixes and block delimiter pairs for one family.
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    /// `(open, close)` pairs, longest openers first.
    pub block: &'static [(&'static str, &'static str)],
}

const C_BLOCKS: &[(&str, &str)] = &[("{/*", "*/}"), ("/*", "*/")];
const PY_BLOCKS: &[(&str, &str)] = &[("\"\"\"", "\"\"\""), ("'''", "'''")];
const MARKUP_BLOCKS: &[(&str, &str)] = &[("<!--", "-->"), ("{/*", "*/}"), ("/*", "*/")];
const ANY_BLOCKS: &[(&str, &str)] = &[
    ("<!--", "-->"),
    ("{/*", "*/}"),
    ("/*", "*/"),
    ("\"\"\"", "\"\"\""),
    ("'''", "'''"),
];

impl CommentFamily {
    /// Detect the comment family from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return CommentFamily::Any;
        };
        match ext.to_ascii_lowercase().as_str() {
            "rs" | "go" | "js" | "mjs" | "cjs" | "jsx" | "ts" | "mts" | "cts" | "tsx"
            | "java" | "kt" | "kts" | "scala" | "c" | "h" | "cc" | "cpp" | "cxx" | "hpp"
            | "cs" | "swift" | "dart" | "php" | "css" | "scss" | "less" | "proto" | "zig" => {
                CommentFamily::CStyle
            }
            "py" | "pyw" | "pyi" => CommentFamily::Python,
            "rb" | "sh" | "bash" | "zsh" | "fish" | "yaml" | "yml" | "toml" | "pl" | "r"
            | "ex" | "exs" | "nix" | "mk" | "cmake" | "ps1" | "tf" => CommentFamily::Hash,
            "sql" | "lua" | "hs" | "elm" => CommentFamily::Dash,
            "html" | "htm" | "xml" | "md" | "markdown" | "vue" | "svelte" | "astro" => {
                CommentFamily::Markup
            }
            _ => CommentFamily::Any,
        }
    }

    pub fn syntax(&self) -> CommentSyntax {
        match self {
            CommentFamily::CStyle => CommentSyntax {
                line: &["//"],
                block: C_BLOCKS,
            },
            CommentFamily::Hash => CommentSyntax {
                line: &["#"],
                block: &[],
            },
            CommentFamily::Python => CommentSyntax {
                line: &["#"],
                block: PY_BLOCKS,
            },
            CommentFamily::Dash => CommentSyntax {
                line: &["--"],
                block: &[("/*", "*/")],
            },
            CommentFamily::Markup => CommentSyntax {
                line: &["//"],
                block: MARKUP_BLOCKS,
            },
            CommentFamily::Any => CommentSyntax {
                line: &["//", "#", "--"],
                block: ANY_BLOCKS,
            },
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            CommentFamily::CStyle => "C-style",
            CommentFamily::Hash => "hash",
            CommentFamily::Python => "Python",
            CommentFamily::Dash => "dash",
            CommentFamily::Markup => "markup",
            CommentFamily::Any => "generic",
        }
    }
}

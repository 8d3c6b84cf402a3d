// providers/comments.rs - Marker-based comment detection
//
// A language-agnostic stand-in for a syntax-aware comment detector. It knows
// the comment markers of common languages and skips double-quoted strings, but
// does not parse anything. Good enough to find URLs in comments; hosts with a
// real parser should supply their own `CommentSpanProvider`.

use std::path::Path;

use super::CommentSpanProvider;
use crate::reference::CommentSpan;

/// Comment markers for one language family
#[derive(Debug, Clone, Copy)]
struct Syntax {
    line: &'static [&'static str],
    block: &'static [(&'static str, &'static str)],
    skip_strings: bool,
}

const C_LIKE: Syntax = Syntax {
    line: &["//"],
    block: &[("/*", "*/")],
    skip_strings: true,
};
const HASH: Syntax = Syntax {
    line: &["#"],
    block: &[],
    skip_strings: true,
};
const DASH: Syntax = Syntax {
    line: &["--"],
    block: &[],
    skip_strings: true,
};
const SEMICOLON: Syntax = Syntax {
    line: &[";"],
    block: &[],
    skip_strings: true,
};
const MARKUP: Syntax = Syntax {
    line: &[],
    block: &[("<!--", "-->")],
    skip_strings: false,
};
const FALLBACK: Syntax = Syntax {
    line: &["//", "#"],
    block: &[("/*", "*/")],
    skip_strings: true,
};

fn syntax_for(language: Option<&str>) -> Syntax {
    match language.map(str::to_ascii_lowercase).as_deref() {
        Some(
            "rust" | "c" | "cpp" | "java" | "javascript" | "typescript" | "go" | "swift"
            | "kotlin" | "scala" | "csharp" | "css",
        ) => C_LIKE,
        Some(
            "python" | "ruby" | "shell" | "r" | "yaml" | "toml" | "perl" | "make" | "dockerfile",
        ) => HASH,
        Some("lua" | "sql" | "haskell") => DASH,
        Some("lisp" | "clojure" | "scheme") => SEMICOLON,
        Some("html" | "xml" | "markdown") => MARKUP,
        _ => FALLBACK,
    }
}

/// Guess a language identifier from a file name
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            "Makefile" | "makefile" | "GNUmakefile" => return Some("make"),
            "Dockerfile" => return Some("dockerfile"),
            _ => {}
        }
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "rs" => "rust",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "java" => "java",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "cs" => "csharp",
        "css" | "scss" => "css",
        "py" | "pyi" => "python",
        "rb" => "ruby",
        "sh" | "bash" | "zsh" => "shell",
        "r" => "r",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "pl" | "pm" => "perl",
        "lua" => "lua",
        "sql" => "sql",
        "hs" => "haskell",
        "lisp" | "el" => "lisp",
        "clj" | "cljs" => "clojure",
        "scm" | "ss" => "scheme",
        "html" | "htm" => "html",
        "xml" | "svg" => "xml",
        "md" | "markdown" => "markdown",
        _ => return None,
    };
    Some(language)
}

/// Count line breaks in `text` (CRLF and lone CR count once). Returns the
/// count and the byte offset just past the last break.
fn count_breaks(text: &str) -> (usize, usize) {
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut after_last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                count += 1;
                after_last = i + 1;
            }
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => {
                count += 1;
                after_last = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    (count, after_last)
}

/// Comment detection by marker lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerCommentSpans;

impl CommentSpanProvider for MarkerCommentSpans {
    fn spans(&self, text: &str, language: Option<&str>) -> Vec<CommentSpan> {
        let syntax = syntax_for(language);
        let mut spans = Vec::new();
        let mut pos = 0;
        let mut line = 1;
        let mut line_start = 0;

        while pos < text.len() {
            let rest = &text[pos..];

            if rest.starts_with('\n') || rest.starts_with("\r\n") || rest.starts_with('\r') {
                pos += if rest.starts_with("\r\n") { 2 } else { 1 };
                line += 1;
                line_start = pos;
                continue;
            }

            if let Some((open, close)) = syntax.block.iter().find(|(open, _)| rest.starts_with(open)) {
                let body_start = pos + open.len();
                let end = text[body_start..]
                    .find(close)
                    .map(|i| body_start + i + close.len())
                    .unwrap_or(text.len());
                let comment = &text[pos..end];
                spans.push(CommentSpan::new(comment, line, pos - line_start));

                let (breaks, after_last) = count_breaks(comment);
                if breaks > 0 {
                    line += breaks;
                    line_start = pos + after_last;
                }
                pos = end;
                continue;
            }

            if syntax.line.iter().any(|marker| rest.starts_with(marker)) {
                let end = rest
                    .find(['\n', '\r'])
                    .map(|i| pos + i)
                    .unwrap_or(text.len());
                spans.push(CommentSpan::new(&text[pos..end], line, pos - line_start));
                pos = end;
                continue;
            }

            if syntax.skip_strings && rest.starts_with('"') {
                pos += string_len(rest);
                continue;
            }

            pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
        }

        spans
    }
}

/// Length of a double-quoted string literal at the start of `rest`, stopping
/// at the end of the line when unterminated.
fn string_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' | b'\r' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

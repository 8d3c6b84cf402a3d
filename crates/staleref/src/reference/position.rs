//
// reference/position.rs
//
// Map offsets inside a comment back to absolute source positions
//

/// Absolute position in the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    /// 1-indexed line
    pub line: usize,
    /// 0-indexed byte column
    pub column: usize,
}

/// Convert a byte offset inside a comment into an absolute line/column.
///
/// `start_line`/`start_column` locate the first byte of `text` in the source.
/// Line breaks strictly before `offset` are counted, with `\r\n` counting as a
/// single break (a lone `\r` also counts as one). On the comment's first line
/// the column is relative to `start_column`; on later lines it is relative to
/// the start of that line, because the comment text carries the source's own
/// leading whitespace for continuation lines.
///
/// An offset sitting right after a break belongs to the following line.
/// Offsets past the end of `text` are clamped.
///
/// # Examples
///
/// ```
/// use staleref::reference::remap_position;
///
/// let text = "/* first\r\n   see here */";
/// let pos = remap_position(1, 4, text, text.find("see").unwrap());
/// assert_eq!((pos.line, pos.column), (2, 3));
/// ```
pub fn remap_position(
    start_line: usize,
    start_column: usize,
    text: &str,
    offset: usize,
) -> SourcePosition {
    let bytes = text.as_bytes();
    let offset = offset.min(bytes.len());

    let mut breaks = 0;
    let mut line_start = 0;
    for i in 0..offset {
        let is_break = match bytes[i] {
            b'\n' => true,
            // CR only counts when it is not the first half of a CRLF pair
            b'\r' => bytes.get(i + 1) != Some(&b'\n'),
            _ => false,
        };
        if is_break {
            breaks += 1;
            line_start = i + 1;
        }
    }

    if breaks == 0 {
        SourcePosition {
            line: start_line,
            column: start_column + offset,
        }
    } else {
        SourcePosition {
            line: start_line + breaks,
            column: offset - line_start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_adds_start_column() {
        let pos = remap_position(10, 4, "// see https://x", 7);
        assert_eq!(pos, SourcePosition { line: 10, column: 11 });
    }

    #[test]
    fn test_second_line_ignores_start_column() {
        let text = "/*\n * see url\n */";
        let offset = text.find("url").unwrap();
        let pos = remap_position(1, 8, text, offset);
        assert_eq!(pos, SourcePosition { line: 2, column: 7 });
    }

    #[test]
    fn test_crlf_counts_as_one_break() {
        let lf = "/*\n * see url\n */";
        let crlf = "/*\r\n * see url\r\n */";
        let a = remap_position(1, 0, lf, lf.find("url").unwrap());
        let b = remap_position(1, 0, crlf, crlf.find("url").unwrap());
        assert_eq!(a, b);
        assert_eq!(a, SourcePosition { line: 2, column: 7 });
    }

    #[test]
    fn test_offset_at_line_start_belongs_to_next_line() {
        let text = "a\nb";
        assert_eq!(remap_position(3, 5, text, 2), SourcePosition { line: 4, column: 0 });
        let text = "a\r\nb";
        assert_eq!(remap_position(3, 5, text, 3), SourcePosition { line: 4, column: 0 });
    }

    #[test]
    fn test_offset_at_break_stays_on_current_line() {
        let text = "ab\ncd";
        assert_eq!(remap_position(1, 2, text, 2), SourcePosition { line: 1, column: 4 });
    }

    #[test]
    fn test_lone_cr_is_a_break() {
        let text = "a\rb";
        assert_eq!(remap_position(1, 0, text, 2), SourcePosition { line: 2, column: 0 });
    }

    #[test]
    fn test_third_line() {
        let text = "x\ny\n   z";
        let pos = remap_position(5, 2, text, text.len() - 1);
        assert_eq!(pos, SourcePosition { line: 7, column: 3 });
    }

    #[test]
    fn test_offset_clamped_to_text() {
        let pos = remap_position(1, 0, "abc", 99);
        assert_eq!(pos, SourcePosition { line: 1, column: 3 });
    }
}

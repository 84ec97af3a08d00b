//! Text helpers shared by the built-in scanners.

use super::{MacroTable, RawModule, SourceRange};

/// What a scanner found in one file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceScan {
    pub modules: Vec<RawModule>,
    pub macros: MacroTable,
    pub errors: Vec<String>,
}

/// Byte offset to 1-based line lookup.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { starts }
    }

    pub(crate) fn line(&self, offset: usize) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }

    pub(crate) fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange {
            start: self.line(start),
            end: self.line(end.max(start)),
        }
    }
}

/// Replace every match of a comment pattern with blank lines so offsets keep mapping to
/// the same line numbers.
pub(crate) fn blank_out(text: &str, pattern: &regex::Regex) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures| {
            "\n".repeat(caps[0].matches('\n').count())
        })
        .into_owned()
}

/// Given `open` pointing at a `(`, return the offset just past its matching `)`.
pub(crate) fn skip_balanced(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the first `;` at parenthesis depth zero, starting from `from`.
pub(crate) fn statement_end(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in text[from..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ';' if depth <= 0 => return Some(from + i),
            _ => {}
        }
    }
    None
}

/// End offset of a declaration list starting at `from`: the first `;` at depth zero, the
/// `)` closing an enclosing list, or `limit`, whichever comes first.
pub(crate) fn list_end(text: &str, from: usize, limit: usize) -> usize {
    let limit = limit.min(text.len());
    let mut depth = 0i32;
    for (i, c) in text[from..limit].char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                if depth == 0 {
                    return from + i;
                }
                depth -= 1;
            }
            ';' if depth == 0 => return from + i,
            _ => {}
        }
    }
    limit
}

/// Split on `sep` where it is not nested inside brackets.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                pieces.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line(0), 1);
        assert_eq!(index.line(2), 2);
        assert_eq!(index.line(3), 2);
        assert_eq!(index.line(5), 3);
        assert_eq!(index.line(6), 4);
    }

    #[test]
    fn test_skip_balanced() {
        let text = "#(.W(8), .D(f(2))) u0 (";
        assert_eq!(skip_balanced(text, 1), Some(18));
        assert_eq!(skip_balanced("(()", 0), None);
    }

    #[test]
    fn test_list_end_and_split() {
        let text = "input [7:0] a, b, output c) ;";
        let end = list_end(text, 5, text.len());
        assert_eq!(&text[5..end], " [7:0] a, b, output c");
        assert_eq!(
            split_top_level("W = f(1, 2), D = 4", ','),
            vec!["W = f(1, 2)", " D = 4"]
        );
    }

    #[test]
    fn test_statement_end_ignores_nested() {
        let text = "module m (input a; ) ; body";
        assert_eq!(statement_end(text, 0), Some(21));
    }
}

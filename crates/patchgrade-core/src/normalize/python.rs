//! Line-oriented Python lexing: just enough to tell code from strings and
//! comments and to follow bracket nesting across lines.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lex {
    Code,
    /// Inside a `"""`/`'''` string.
    Triple(char),
    /// Inside a one-quote string continued with a trailing backslash.
    Single(char),
}

/// Lexer position at a line boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LexState {
    pub lex: Lex,
    pub depth: i32,
    /// Previous line ended with an explicit `\` continuation.
    pub continued: bool,
}

impl LexState {
    pub const START: LexState = LexState {
        lex: Lex::Code,
        depth: 0,
        continued: false,
    };

    /// A new logical line begins here.
    pub fn at_statement_start(&self) -> bool {
        self.lex == Lex::Code && self.depth == 0 && !self.continued
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LineScan {
    pub end: LexState,
    /// Byte offset of a `#` comment, if the line has one.
    pub comment_at: Option<usize>,
}

pub(crate) fn scan_line(text: &str, start: LexState) -> LineScan {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut lex = start.lex;
    let mut depth = start.depth;
    let mut comment_at = None;
    let mut continued = false;
    let mut i = 0;

    let is_triple = |i: usize, q: char| {
        chars.get(i).map(|c| c.1) == Some(q)
            && chars.get(i + 1).map(|c| c.1) == Some(q)
            && chars.get(i + 2).map(|c| c.1) == Some(q)
    };

    while i < chars.len() {
        let (pos, c) = chars[i];
        match lex {
            Lex::Code => match c {
                '#' => {
                    comment_at = Some(pos);
                    break;
                }
                '"' | '\'' if is_triple(i, c) => {
                    lex = Lex::Triple(c);
                    i += 3;
                    continue;
                }
                '"' | '\'' => lex = Lex::Single(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '\\' if text[pos + 1..].trim().is_empty() => continued = true,
                _ => {}
            },
            Lex::Triple(q) => {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if is_triple(i, q) {
                    lex = Lex::Code;
                    i += 3;
                    continue;
                }
            }
            Lex::Single(q) => {
                if c == '\\' {
                    if i + 1 == chars.len() {
                        continued = true;
                    }
                    i += 2;
                    continue;
                }
                if c == q {
                    lex = Lex::Code;
                }
            }
        }
        i += 1;
    }

    // An unterminated one-quote string ends at the newline unless escaped.
    if matches!(lex, Lex::Single(_)) && !continued {
        lex = Lex::Code;
    }

    LineScan {
        end: LexState {
            lex,
            depth: depth.max(0),
            continued,
        },
        comment_at,
    }
}

/// Lexer state at the start of every line, plus the state after the last one.
pub(crate) fn line_states<S: AsRef<str>>(texts: &[S]) -> (Vec<LexState>, LexState) {
    line_states_from(texts, LexState::START)
}

/// As [`line_states`], for text that begins in state `start`.
pub(crate) fn line_states_from<S: AsRef<str>>(texts: &[S], start: LexState) -> (Vec<LexState>, LexState) {
    let mut states = Vec::with_capacity(texts.len());
    let mut state = start;
    for text in texts {
        states.push(state);
        state = scan_line(text.as_ref(), state).end;
    }
    (states, state)
}

/// Comments that change how tools or the interpreter treat the file.
pub(crate) fn is_functional_comment(comment: &str) -> bool {
    let body = comment.trim_start_matches('#').trim_start();
    comment.starts_with("#!")
        || comment.contains("coding:")
        || comment.contains("coding=")
        || ["type:", "noqa", "pylint:", "pragma", "fmt:", "mypy:", "isort:", "pyright:"]
            .iter()
            .any(|p| body.starts_with(p))
}

pub(crate) fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Blank or comment-only.
pub(crate) fn is_insignificant(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || t.starts_with('#')
}

/// Code part of a line with any trailing comment removed.
pub(crate) fn code_part(text: &str, start: LexState) -> &str {
    match scan_line(text, start).comment_at {
        Some(p) => &text[..p],
        None => text,
    }
}

/// If `texts[0]` opens a statement that is a lone triple-quoted string
/// literal (no f-prefix, nothing after the closing quotes but a comment),
/// returns the index of the line holding the closing quotes.
pub(crate) fn string_statement_end<S: AsRef<str>>(texts: &[S]) -> Option<usize> {
    let first = texts.first()?.as_ref().trim_start();
    let prefix_len = first
        .chars()
        .take_while(|c| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B'))
        .count();
    if prefix_len > 2 {
        return None;
    }
    let rest = &first[prefix_len..];
    let quote = if rest.starts_with("\"\"\"") {
        '"'
    } else if rest.starts_with("'''") {
        '\''
    } else {
        return None;
    };
    let delim: String = std::iter::repeat(quote).take(3).collect();

    let mut body = &rest[3..];
    for (idx, _) in texts.iter().enumerate() {
        if idx > 0 {
            body = texts[idx].as_ref();
        }
        if let Some(close) = find_unescaped(body, &delim) {
            let after = body[close + 3..].trim();
            return (after.is_empty() || after.starts_with('#')).then_some(idx);
        }
    }
    None
}

fn find_unescaped(text: &str, delim: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(delim.as_bytes()) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Text with string literal contents blanked out, for structural checks.
pub(crate) fn without_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match in_string {
            None if c == '"' || c == '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            None if c == '#' => break,
            None => out.push(c),
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    in_string = None;
                    out.push(c);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_outside_strings_is_found() {
        let scan = scan_line("x = '#not' + y  # real", LexState::START);
        assert_eq!(scan.comment_at, Some(16));
        assert_eq!(scan.end.lex, Lex::Code);
    }

    #[test]
    fn triple_string_state_spans_lines() {
        let (states, end) = line_states(&["s = \"\"\"", "# inside", "\"\"\""]);
        assert_eq!(states[1].lex, Lex::Triple('"'));
        assert!(scan_line("# inside", states[1]).comment_at.is_none());
        assert_eq!(end.lex, Lex::Code);
    }

    #[test]
    fn lexing_can_start_inside_a_string() {
        let start = LexState {
            lex: Lex::Triple('"'),
            ..LexState::START
        };
        let (states, end) = line_states_from(&["    >>> g()  # doctest: +SKIP", "    \"\"\"", "x = 1  # c"], start);
        assert!(scan_line("    >>> g()  # doctest: +SKIP", states[0]).comment_at.is_none());
        assert_eq!(states[2].lex, Lex::Code);
        assert_eq!(end.lex, Lex::Code);
    }

    #[test]
    fn bracket_depth_is_tracked() {
        let (states, end) = line_states(&["call(", "    a,", ")"]);
        assert_eq!(states[1].depth, 1);
        assert!(!states[1].at_statement_start());
        assert!(end.at_statement_start());
    }

    #[test]
    fn backslash_continuation_is_tracked() {
        let (states, _) = line_states(&["x = 1 + \\", "    2"]);
        assert!(states[1].continued);
        assert!(!states[1].at_statement_start());
    }

    #[test]
    fn functional_comments_are_recognised() {
        assert!(is_functional_comment("#!/usr/bin/env python"));
        assert!(is_functional_comment("# -*- coding: utf-8 -*-"));
        assert!(is_functional_comment("# type: ignore"));
        assert!(is_functional_comment("# pylint: disable=eval-used"));
        assert!(is_functional_comment("#noqa"));
        assert!(!is_functional_comment("# explain the loop"));
    }

    #[test]
    fn string_statement_end_handles_single_and_multi_line() {
        assert_eq!(string_statement_end(&["    \"\"\"One line.\"\"\""]), Some(0));
        assert_eq!(string_statement_end(&["    '''Start", "    end.'''", "x"]), Some(1));
        assert_eq!(string_statement_end(&["    r\"\"\"raw\"\"\"  # c"]), Some(0));
    }

    #[test]
    fn string_statement_end_rejects_expressions() {
        assert_eq!(string_statement_end(&["f\"\"\"{x}\"\"\""]), None);
        assert_eq!(string_statement_end(&["\"\"\"a\"\"\".strip()"]), None);
        assert_eq!(string_statement_end(&["x = \"\"\"a\"\"\""]), None);
        assert_eq!(string_statement_end(&["\"\"\"never closed"]), None);
    }

    #[test]
    fn without_strings_blanks_literals_and_comments() {
        assert_eq!(without_strings("f('(', x)  # (c)"), "f('', x)  ");
    }
}

//! Where each hunk starts, lexically.
//!
//! A hunk is a window into a file. Whether its first line sits in code or
//! inside a triple-quoted string depends on text the hunk does not show, so
//! a hunk is only edited when that state is known: the hunk starts at the
//! top of the file, or the unpatched file is available and its lines match
//! the hunk's pre-image.

use std::collections::HashSet;

use super::diff::{FilePatch, Hunk, HunkLine};
use super::python::{line_states, line_states_from, LexState};
use super::passes::{identifiers, is_python};

/// Supplies unpatched file contents by repository-relative path.
pub(crate) type BaseReader<'a> = &'a dyn Fn(&str) -> Option<String>;

/// The unpatched text of one file.
#[derive(Debug)]
pub(crate) struct BaseFile {
    lines: Vec<String>,
    /// Lexer state at the start of each line, then after the last one.
    states: Vec<LexState>,
    names: HashSet<String>,
}

impl BaseFile {
    pub fn load(file: &FilePatch, read: BaseReader<'_>) -> Option<Self> {
        if file.is_new || !is_python(file) {
            return None;
        }
        let text = read(file.old_path.as_deref()?)?;
        Some(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let (mut states, end) = line_states(&lines);
        states.push(end);
        let names = identifiers(text).map(str::to_string).collect();
        Self { lines, states, names }
    }

    /// Lexer state where `hunk` begins, if its pre-image is found there.
    fn state_at(&self, hunk: &Hunk) -> Option<LexState> {
        // A hunk without pre-image lines inserts after line `old_start`.
        let at = if hunk.old_count == 0 {
            hunk.old_start
        } else {
            hunk.old_start.checked_sub(1)?
        };
        let matches = hunk
            .lines
            .iter()
            .filter(|l| l.in_pre_image())
            .enumerate()
            .all(|(i, l)| self.lines.get(at + i) == Some(&l.text));
        if matches {
            self.states.get(at).copied()
        } else {
            None
        }
    }

    /// The name appears anywhere in the unpatched file.
    pub fn mentions(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

fn at_top(hunk: &Hunk) -> bool {
    hunk.old_start == 0 || (hunk.old_start == 1 && hunk.old_count > 0)
}

/// Lexer state at the first line of each hunk of `file`, where it can be
/// known. Once a hunk leaves the lexer somewhere else than the unpatched
/// text did, later hunks are unknown too.
pub(crate) fn hunk_starts(file: &FilePatch, base: Option<&BaseFile>) -> Vec<Option<LexState>> {
    let mut drifted = false;
    file.hunks
        .iter()
        .map(|hunk| {
            let start = if drifted {
                None
            } else if at_top(hunk) {
                Some(LexState::START)
            } else {
                base.and_then(|b| b.state_at(hunk))
            };
            match start {
                Some(s) => {
                    let side = |keep: fn(&HunkLine) -> bool| {
                        let texts: Vec<&str> = hunk
                            .lines
                            .iter()
                            .filter(|&l| keep(l))
                            .map(|l| l.text.as_str())
                            .collect();
                        line_states_from(&texts, s).1
                    };
                    drifted = side(HunkLine::in_pre_image) != side(HunkLine::in_post_image);
                }
                None => drifted = true,
            }
            start
        })
        .collect()
}

//! Removal passes over Python hunks.
//!
//! Every pass edits or drops `+` lines only, and only when the change is
//! a no-op for the interpreter: comments, string-literal statements that
//! do not leave a block empty, and private top-level definitions that are
//! new to their file and that nothing else in the patch refers to.
//!
//! A hunk whose starting lexer state is unknown is left alone.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use super::base::BaseFile;
use super::diff::{FilePatch, Hunk, LineKind, PatchSet};
use super::python::{
    code_part, indent_of, is_functional_comment, is_insignificant, line_states_from, scan_line,
    string_statement_end, without_strings, Lex, LexState,
};

fn private_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:async\s+)?def\s+(_\w*)\s*\(").expect("valid def regex"))
}

fn private_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^class\s+(_\w*)\s*(?:\(\s*(?:object)?\s*\))?\s*:\s*(?:#.*)?$")
            .expect("valid class regex")
    })
}

fn private_assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(_\w*)\s*(?::[^=]*)?=([^=].*|)$").expect("valid assign regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z_]\w*").expect("valid identifier regex"))
}

fn class_member_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:pass|\.\.\.|@(?:staticmethod|classmethod|property))\s*(?:#.*)?$")
            .expect("valid member regex")
    })
}

pub(crate) fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    identifier_re().find_iter(text).map(|m| m.as_str())
}

pub(crate) fn is_python(file: &FilePatch) -> bool {
    file.path
        .as_deref()
        .is_some_and(|p| p.ends_with(".py") || p.ends_with(".pyi"))
}

/// Post-image of one hunk with the lexer state at each line start.
struct View {
    idx: Vec<usize>,
    texts: Vec<String>,
    states: Vec<LexState>,
    end: LexState,
    /// Nearest earlier line that is code or string content.
    prev: Vec<Option<usize>>,
    /// Nothing of the file precedes the hunk.
    at_top: bool,
}

impl View {
    /// `None` when the lexer state at the start of the hunk is unknown.
    fn of(hunk: &Hunk, start: Option<LexState>) -> Option<Self> {
        let start = start?;
        let (idx, texts): (Vec<usize>, Vec<String>) = hunk
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.in_post_image())
            .map(|(i, l)| (i, l.text.clone()))
            .unzip();
        let (states, end) = line_states_from(&texts, start);

        let mut prev = Vec::with_capacity(texts.len());
        let mut last = None;
        for (k, text) in texts.iter().enumerate() {
            prev.push(last);
            if states[k].lex != Lex::Code || !is_insignificant(text) {
                last = Some(k);
            }
        }

        Some(Self {
            idx,
            texts,
            states,
            end,
            prev,
            at_top: hunk.old_start == 0 || (hunk.old_start == 1 && hunk.old_count > 0),
        })
    }

    fn len(&self) -> usize {
        self.texts.len()
    }

    fn text(&self, k: usize) -> &str {
        &self.texts[k]
    }

    fn significant(&self, k: usize) -> bool {
        self.states[k].lex != Lex::Code || !is_insignificant(&self.texts[k])
    }

    fn prev_significant(&self, k: usize) -> Option<usize> {
        self.prev[k]
    }

    /// Lines `from..=to` are all additions and none is the file's last line.
    fn removable(&self, hunk: &Hunk, from: usize, to: usize) -> bool {
        (from..=to).all(|k| hunk.lines[self.idx[k]].kind == LineKind::Added)
            && !hunk.is_last_in_file(self.idx[to])
    }
}

fn remove_lines(hunk: &mut Hunk, doomed: &BTreeSet<usize>) {
    let mut i = 0;
    hunk.lines.retain(|_| {
        let keep = !doomed.contains(&i);
        i += 1;
        keep
    });
}

/// Drop `#` comments from added lines; comment-only lines disappear.
pub(crate) fn strip_comments(file: &mut FilePatch, starts: &[Option<LexState>]) {
    for (hunk, &start) in file.hunks.iter_mut().zip(starts) {
        let Some(view) = View::of(hunk, start) else {
            continue;
        };
        let mut doomed = BTreeSet::new();
        for k in 0..view.len() {
            let idx = view.idx[k];
            if hunk.lines[idx].kind != LineKind::Added {
                continue;
            }
            let text = view.text(k);
            let Some(at) = scan_line(text, view.states[k]).comment_at else {
                continue;
            };
            if is_functional_comment(&text[at..]) {
                continue;
            }
            let code = text[..at].trim_end();
            if code.is_empty() && !hunk.is_last_in_file(idx) {
                doomed.insert(idx);
            } else {
                hunk.lines[idx].text = code.to_string();
            }
        }
        remove_lines(hunk, &doomed);
    }
}

/// Drop added string-literal statements in docstring position.
pub(crate) fn strip_docstrings(file: &mut FilePatch, starts: &[Option<LexState>]) {
    for (hunk, &start) in file.hunks.iter_mut().zip(starts) {
        let Some(view) = View::of(hunk, start) else {
            continue;
        };
        let mut doomed = BTreeSet::new();
        let mut k = 0;
        while k < view.len() {
            match docstring_at(&view, hunk, k) {
                Some(end) => {
                    doomed.extend(view.idx[k..=end].iter().copied());
                    k = end + 1;
                }
                None => k += 1,
            }
        }
        remove_lines(hunk, &doomed);
    }
}

fn docstring_at(view: &View, hunk: &Hunk, k: usize) -> Option<usize> {
    if !view.states[k].at_statement_start() {
        return None;
    }
    let end = k + string_statement_end(&view.texts[k..])?;
    if !view.removable(hunk, k, end) {
        return None;
    }

    let indent = indent_of(view.text(k));
    match view.prev_significant(k) {
        Some(p) => {
            let opener = code_part(view.text(p), view.states[p]).trim_end();
            if view.states[p].lex != Lex::Code
                || !opener.ends_with(':')
                || indent_of(view.text(p)) >= indent
            {
                return None;
            }
        }
        // Module docstring.
        None if view.at_top && indent == 0 => {}
        None => return None,
    }

    // The block must go on after the docstring, at the same depth.
    let next = (end + 1..view.len()).find(|&p| view.significant(p))?;
    (indent_of(view.text(next)) == indent).then_some(end)
}

/// A private top-level definition found in one hunk.
struct Candidate {
    file: usize,
    hunk: usize,
    name: String,
    lines: Vec<usize>,
}

/// Drop private top-level definitions the patch adds but never uses.
///
/// `starts` and `bases` run parallel to `set.files`. A name is only a
/// candidate when its file is new or the unpatched file never mentions it:
/// otherwise the definition may rebind something read outside the hunks.
pub(crate) fn strip_unused_private(
    set: &mut PatchSet,
    starts: &[Vec<Option<LexState>>],
    bases: &[Option<BaseFile>],
) {
    let mut candidates = Vec::new();
    for (f, file) in set.files.iter().enumerate() {
        if !is_python(file) {
            continue;
        }
        let base = bases.get(f).and_then(Option::as_ref);
        let is_new_name = |name: &str| file.is_new || base.is_some_and(|b| !b.mentions(name));
        let last = file.hunks.len().saturating_sub(1);
        for (h, hunk) in file.hunks.iter().enumerate() {
            let start = starts.get(f).and_then(|s| s.get(h)).copied().flatten();
            let Some(view) = View::of(hunk, start) else {
                continue;
            };
            let reaches_eof = file.is_new && h == last;
            for (name, from, to) in private_blocks(&view, hunk, reaches_eof) {
                if is_new_name(&name) {
                    candidates.push(Candidate {
                        file: f,
                        hunk: h,
                        name,
                        lines: view.idx[from..=to].to_vec(),
                    });
                }
            }
        }
    }
    if candidates.is_empty() {
        return;
    }

    let unused: Vec<Candidate> = {
        let mentions = Mentions::of(set);
        candidates
            .into_iter()
            .filter(|c| !mentions.referenced(set, c))
            .collect()
    };

    // Indices shift once a hunk loses lines, so each hunk is cut once.
    let mut doomed: BTreeMap<(usize, usize), BTreeSet<usize>> = BTreeMap::new();
    for c in unused {
        doomed.entry((c.file, c.hunk)).or_default().extend(c.lines);
    }
    for ((f, h), lines) in doomed {
        remove_lines(&mut set.files[f].hunks[h], &lines);
    }
}

/// How often each identifier occurs across every line of the patch.
struct Mentions<'a> {
    counts: HashMap<&'a str, usize>,
}

impl<'a> Mentions<'a> {
    fn of(set: &'a PatchSet) -> Self {
        let mut counts = HashMap::new();
        let lines = set
            .files
            .iter()
            .flat_map(|f| &f.hunks)
            .flat_map(|h| &h.lines)
            .filter(|l| l.kind != LineKind::NoNewline);
        for line in lines {
            for name in identifiers(&line.text) {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    /// Any line of the patch outside the candidate's own block, on either
    /// side, mentions the name.
    fn referenced(&self, set: &PatchSet, c: &Candidate) -> bool {
        let total = self.counts.get(c.name.as_str()).copied().unwrap_or(0);
        let hunk = &set.files[c.file].hunks[c.hunk];
        let own: usize = c
            .lines
            .iter()
            .map(|&i| identifiers(&hunk.lines[i].text).filter(|n| *n == c.name).count())
            .sum();
        total > own
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn private_blocks(view: &View, hunk: &Hunk, reaches_eof: bool) -> Vec<(String, usize, usize)> {
    let mut blocks = Vec::new();
    let mut k = 0;

    while k < view.len() {
        let text = view.text(k);
        let eligible = view.states[k].at_statement_start()
            && indent_of(text) == 0
            && hunk.lines[view.idx[k]].kind == LineKind::Added;
        if !eligible {
            k += 1;
            continue;
        }

        // A decorator could register the definition; an unseen line above
        // the hunk could be one.
        let decorated = match view.prev_significant(k) {
            Some(p) => view.text(p).trim_start().starts_with('@'),
            None => !view.at_top,
        };

        let found = if let Some(caps) = private_def_re().captures(text) {
            let name = caps[1].to_string();
            block_end(view, k, reaches_eof)
                .filter(|_| !decorated && signature_is_inert(view, k))
                .map(|end| (name, end))
        } else if let Some(caps) = private_class_re().captures(text) {
            let name = caps[1].to_string();
            block_end(view, k, reaches_eof)
                .filter(|&end| !decorated && class_body_is_inert(view, k, end))
                .map(|end| (name, end))
        } else if let Some(caps) = private_assign_re().captures(text) {
            let name = caps[1].to_string();
            statement_end(view, k).filter(|&end| assignment_is_inert(view, k, end)).map(|end| (name, end))
        } else {
            None
        };

        match found {
            Some((name, end)) if name != "_" && !is_dunder(&name) && view.removable(hunk, k, end) => {
                blocks.push((name, k, end));
                k = end + 1;
            }
            _ => k += 1,
        }
    }
    blocks
}

/// Last line of the compound statement opened at `k`, with trailing blank
/// and comment lines excluded.
fn block_end(view: &View, k: usize, reaches_eof: bool) -> Option<usize> {
    let terminator = (k + 1..view.len()).find(|&j| {
        view.states[j].at_statement_start()
            && indent_of(view.text(j)) == 0
            && !is_insignificant(view.text(j))
    });
    let stop = match terminator {
        Some(j) => j,
        None if reaches_eof && view.end.at_statement_start() => view.len(),
        None => return None,
    };
    let mut end = stop - 1;
    while end > k && !view.significant(end) {
        end -= 1;
    }
    Some(end)
}

/// Last line of the simple statement starting at `k`.
fn statement_end(view: &View, k: usize) -> Option<usize> {
    match (k + 1..view.len()).find(|&j| view.states[j].at_statement_start()) {
        Some(j) => Some(j - 1),
        None if view.end.at_statement_start() => Some(view.len() - 1),
        None => None,
    }
}

/// Header lines of a `def` starting at `k`, up to the closing `:`.
fn signature(view: &View, k: usize) -> String {
    let mut sig = String::new();
    for j in k..view.len() {
        sig.push_str(&without_strings(view.text(j)));
        sig.push(' ');
        let closes = match view.states.get(j + 1) {
            Some(next) => next.depth == 0,
            None => view.end.depth == 0,
        };
        if closes {
            break;
        }
    }
    sig
}

/// Defining the function evaluates nothing that could have side effects:
/// no calls in defaults or annotations.
fn signature_is_inert(view: &View, k: usize) -> bool {
    signature(view, k).matches('(').count() <= 1
}

fn class_body_is_inert(view: &View, k: usize, end: usize) -> bool {
    let Some(first) = (k + 1..=end).find(|&j| view.significant(j)) else {
        return false;
    };
    let body_indent = indent_of(view.text(first));

    let mut j = first;
    while j <= end {
        let text = view.text(j);
        let at_member = view.states[j].at_statement_start()
            && !is_insignificant(text)
            && indent_of(text) == body_indent;
        if at_member {
            let member = text.trim_start();
            let ok = if member.starts_with("def ") || member.starts_with("async def ") {
                signature_is_inert(view, j)
            } else if let Some(doc_end) = string_statement_end(&view.texts[j..=end]) {
                j += doc_end;
                true
            } else {
                class_member_re().is_match(member) || literal_assignment(member)
            };
            if !ok {
                return false;
            }
        } else if view.states[j].at_statement_start()
            && !is_insignificant(text)
            && indent_of(text) < body_indent
        {
            return false;
        }
        j += 1;
    }
    true
}

fn assignment_is_inert(view: &View, k: usize, end: usize) -> bool {
    let joined: Vec<&str> = (k..=end).map(|j| view.text(j)).collect();
    literal_assignment(&joined.join("\n"))
}

/// `name = <literal>` where the right-hand side names nothing.
fn literal_assignment(statement: &str) -> bool {
    let code = without_strings(statement);
    let Some(eq) = code.find('=') else {
        return false;
    };
    let (target, rhs) = (&code[..eq], &code[eq + 1..]);
    let name = target.split(':').next().unwrap_or_default().trim();
    let plain_name = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if rhs.starts_with('=') || !plain_name {
        return false;
    }
    identifier_re()
        .find_iter(rhs)
        .all(|m| matches!(m.as_str(), "True" | "False" | "None"))
        && !rhs.trim().is_empty()
}

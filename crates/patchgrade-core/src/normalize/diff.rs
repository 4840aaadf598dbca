//! Unified diff model: parse, edit added lines, recount, render.
//!
//! Only what a normalizing pass needs is modelled. Anything outside hunks
//! (git extended headers, binary patch payloads, mail preambles) is carried
//! through verbatim.

use std::sync::OnceLock;

use regex::Regex;

use super::NormalizeError;

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").expect("valid hunk regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Context,
    Added,
    Removed,
    /// `\ No newline at end of file`, applies to the preceding line.
    NoNewline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HunkLine {
    pub kind: LineKind,
    pub text: String,
}

impl HunkLine {
    /// Part of the file after the patch is applied.
    pub fn in_post_image(&self) -> bool {
        matches!(self.kind, LineKind::Context | LineKind::Added)
    }

    /// Part of the file before the patch is applied.
    pub fn in_pre_image(&self) -> bool {
        matches!(self.kind, LineKind::Context | LineKind::Removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub section: String,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    pub fn has_changes(&self) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l.kind, LineKind::Added | LineKind::Removed))
    }

    fn post_image_len(&self) -> usize {
        self.lines.iter().filter(|l| l.in_post_image()).count()
    }

    /// Whether the line at `idx` is the last line of its side of the file.
    pub fn is_last_in_file(&self, idx: usize) -> bool {
        self.lines
            .get(idx + 1)
            .is_some_and(|l| l.kind == LineKind::NoNewline)
    }

    fn render_header(&self) -> String {
        format!(
            "@@ -{} +{} @@{}",
            range(self.old_start, self.old_count),
            range(self.new_start, self.new_count),
            self.section
        )
    }
}

fn range(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilePatch {
    /// Everything from `diff --git` (or `---`) up to the first hunk.
    pub header: Vec<String>,
    /// Post-image path with the `b/` prefix stripped, if known.
    pub path: Option<String>,
    /// Pre-image path with the `a/` prefix stripped; `None` for `/dev/null`.
    pub old_path: Option<String>,
    /// The pre-image is `/dev/null`.
    pub is_new: bool,
    pub hunks: Vec<Hunk>,
    /// Non-hunk lines after the last hunk (binary payloads and the like).
    pub trailer: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatchSet {
    pub preamble: Vec<String>,
    pub files: Vec<FilePatch>,
}

impl PatchSet {
    pub fn parse(text: &str) -> Result<Self, NormalizeError> {
        let mut lines: Vec<&str> = text.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }

        let mut preamble = Vec::new();
        let mut files: Vec<FilePatch> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            if starts_file(&lines, i) {
                // `diff --git` may be followed by `---`; only one file starts here.
                let mut file = FilePatch {
                    header: vec![line.to_string()],
                    path: None,
                    old_path: None,
                    is_new: false,
                    hunks: Vec::new(),
                    trailer: Vec::new(),
                };
                i += 1;
                while i < lines.len() && !ends_header(&file.header, &lines, i) {
                    file.header.push(lines[i].to_string());
                    i += 1;
                }
                file.path = header_path(&file.header, "+++ ", "b/");
                file.old_path = header_path(&file.header, "--- ", "a/").filter(|p| p != "/dev/null");
                file.is_new = file
                    .header
                    .iter()
                    .any(|h| h.starts_with("--- /dev/null") || h.starts_with("new file mode"));
                files.push(file);
                continue;
            }

            if line.starts_with("@@ ") {
                let file = files.last_mut().ok_or_else(|| {
                    NormalizeError::Malformed(format!("hunk before any file header at line {}", i + 1))
                })?;
                if !file.trailer.is_empty() {
                    return Err(NormalizeError::Malformed(format!(
                        "hunk after non-hunk content at line {}",
                        i + 1
                    )));
                }
                let (hunk, next) = parse_hunk(&lines, i)?;
                file.hunks.push(hunk);
                i = next;
                continue;
            }

            match files.last_mut() {
                Some(file) if file.hunks.is_empty() => file.header.push(line.to_string()),
                Some(file) => file.trailer.push(line.to_string()),
                None => preamble.push(line.to_string()),
            }
            i += 1;
        }

        if files.is_empty() {
            return Err(NormalizeError::Malformed("no file sections found".into()));
        }
        Ok(Self { preamble, files })
    }

    pub fn render(&self) -> String {
        let mut out: Vec<String> = self.preamble.clone();
        for file in &self.files {
            out.extend(file.header.iter().cloned());
            for hunk in &file.hunks {
                out.push(hunk.render_header());
                for line in &hunk.lines {
                    let prefix = match line.kind {
                        LineKind::Context => ' ',
                        LineKind::Added => '+',
                        LineKind::Removed => '-',
                        LineKind::NoNewline => '\\',
                    };
                    out.push(format!("{prefix}{}", line.text));
                }
            }
            out.extend(file.trailer.iter().cloned());
        }
        out.join("\n")
    }
}

impl FilePatch {
    /// Recompute hunk headers after added lines were dropped.
    ///
    /// `before` is the same file as it was parsed. A hunk left without
    /// changes is dropped; if every hunk would go, or a post-image became
    /// empty, the affected hunks are restored from `before`.
    pub fn settle(&mut self, before: &FilePatch) {
        let changed = self.hunks.iter().filter(|h| h.has_changes()).count();
        let mut settled = Vec::with_capacity(self.hunks.len());
        let mut shift = 0isize;

        for (hunk, original) in self.hunks.drain(..).zip(&before.hunks) {
            let mut hunk = hunk;
            if !hunk.has_changes() && changed > 0 {
                // The region now reads as it did before the patch.
                shift += original.new_count as isize - original.old_count as isize;
                continue;
            }
            let new_count = hunk.post_image_len();
            if !hunk.has_changes() || (new_count == 0 && original.new_count > 0) {
                hunk = original.clone();
            } else {
                hunk.new_count = new_count;
            }
            hunk.new_start = (original.new_start as isize - shift).max(0) as usize;
            shift += original.new_count as isize - hunk.new_count as isize;
            settled.push(hunk);
        }
        self.hunks = settled;
    }
}

fn header_path(header: &[String], marker: &str, prefix: &str) -> Option<String> {
    header.iter().find_map(|h| {
        h.strip_prefix(marker).map(|p| {
            let p = p.split('\t').next().unwrap_or(p).trim();
            p.strip_prefix(prefix).unwrap_or(p).to_string()
        })
    })
}

fn starts_file(lines: &[&str], i: usize) -> bool {
    let line = lines[i];
    line.starts_with("diff --git ")
        || (line.starts_with("--- ") && lines.get(i + 1).is_some_and(|n| n.starts_with("+++ ")))
}

/// Header lines end at the first hunk, at the next `diff --git`, or at a
/// second `---`/`+++` pair (a bare unified diff without git headers).
fn ends_header(header: &[String], lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("@@ ")
        || lines[i].starts_with("diff --git ")
        || (starts_file(lines, i) && header.iter().any(|h| h.starts_with("--- ")))
}

fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize), NormalizeError> {
    let caps = hunk_header_re()
        .captures(lines[start])
        .ok_or_else(|| NormalizeError::Malformed(format!("bad hunk header: {}", lines[start])))?;
    let num = |idx: usize, default: usize| -> Result<usize, NormalizeError> {
        caps.get(idx)
            .map(|m| {
                m.as_str()
                    .parse::<usize>()
                    .map_err(|e| NormalizeError::Malformed(e.to_string()))
            })
            .unwrap_or(Ok(default))
    };

    let mut hunk = Hunk {
        old_start: num(1, 0)?,
        old_count: num(2, 1)?,
        new_start: num(3, 0)?,
        new_count: num(4, 1)?,
        section: caps.get(5).map(|m| m.as_str().to_string()).unwrap_or_default(),
        lines: Vec::new(),
    };

    let mut old_left = hunk.old_count;
    let mut new_left = hunk.new_count;
    let mut i = start + 1;

    while i < lines.len() && (old_left > 0 || new_left > 0) {
        let line = lines[i];
        let (kind, text) = match line.chars().next() {
            Some(' ') => (LineKind::Context, &line[1..]),
            None => (LineKind::Context, ""),
            Some('+') => (LineKind::Added, &line[1..]),
            Some('-') => (LineKind::Removed, &line[1..]),
            Some('\\') => (LineKind::NoNewline, &line[1..]),
            Some(_) => {
                return Err(NormalizeError::Malformed(format!(
                    "unexpected line inside hunk at line {}",
                    i + 1
                )))
            }
        };
        match kind {
            LineKind::Context if old_left > 0 && new_left > 0 => {
                old_left -= 1;
                new_left -= 1;
            }
            LineKind::Added if new_left > 0 => new_left -= 1,
            LineKind::Removed if old_left > 0 => old_left -= 1,
            LineKind::NoNewline => {}
            _ => {
                return Err(NormalizeError::Malformed(format!(
                    "hunk line counts do not match header at line {}",
                    i + 1
                )))
            }
        }
        hunk.lines.push(HunkLine {
            kind,
            text: text.to_string(),
        });
        i += 1;
    }

    if old_left > 0 || new_left > 0 {
        // Trailing blank context lines are commonly lost to whitespace
        // trimming; anything else is truncation.
        if old_left != new_left {
            return Err(NormalizeError::Malformed("truncated hunk".into()));
        }
        for _ in 0..old_left {
            hunk.lines.push(HunkLine {
                kind: LineKind::Context,
                text: String::new(),
            });
        }
    }

    if lines.get(i).is_some_and(|l| l.starts_with('\\')) {
        hunk.lines.push(HunkLine {
            kind: LineKind::NoNewline,
            text: lines[i][1..].to_string(),
        });
        i += 1;
    }

    Ok((hunk, i))
}

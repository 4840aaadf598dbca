//! Patch normalization.
//!
//! Strips non-functional text from the lines a patch adds to Python files,
//! so that patches doing the same thing read the same to the grader:
//!
//! 1. comments (except pragmas such as `# type:` or `# noqa`)
//! 2. docstrings that are not the only statement of their block
//! 3. private top-level definitions the patch adds and never uses
//!
//! Only added lines are touched, so the patch still applies to the same
//! base. Hunk headers are recomputed afterwards. Input that does not parse
//! as a unified diff is returned as-is.
//!
//! A hunk is only edited where its lexical context is known. Without the
//! unpatched files that means new files and hunks at the top of a file;
//! [`normalize_with`] reads the unpatched files to reach every other hunk.

mod base;
mod diff;
mod passes;
mod python;

use thiserror::Error;
use tracing::debug;

use base::{hunk_starts, BaseFile};
use diff::PatchSet;

/// Passes run until the patch stops changing; this bounds the loop.
const MAX_ROUNDS: usize = 64;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed patch: {0}")]
    Malformed(String),
}

/// Normalize a raw unified diff.
///
/// Deterministic and idempotent. Never fails: a patch that cannot be parsed
/// comes back unchanged, and sandbox verification decides its fate.
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, &no_base)
}

/// As [`normalize`], reading unpatched files through `base`, which maps a
/// repository-relative path to the file's contents.
pub fn normalize_with(raw: &str, base: &dyn Fn(&str) -> Option<String>) -> String {
    match try_normalize_with(raw, base) {
        Ok(normalized) => normalized,
        Err(e) => {
            debug!(error = %e, "leaving patch unnormalized");
            raw.to_string()
        }
    }
}

/// Normalize a raw unified diff, reporting parse failures.
pub fn try_normalize(raw: &str) -> Result<String, NormalizeError> {
    try_normalize_with(raw, &no_base)
}

/// As [`try_normalize`], reading unpatched files through `base`.
pub fn try_normalize_with(
    raw: &str,
    base: &dyn Fn(&str) -> Option<String>,
) -> Result<String, NormalizeError> {
    let mut set = PatchSet::parse(raw)?;
    let mut rendered = set.render();
    let bases: Vec<Option<BaseFile>> = set.files.iter().map(|f| BaseFile::load(f, base)).collect();

    for _ in 0..MAX_ROUNDS {
        let before = set.clone();
        let starts: Vec<_> = set
            .files
            .iter()
            .zip(&bases)
            .map(|(file, base)| hunk_starts(file, base.as_ref()))
            .collect();
        for (file, starts) in set.files.iter_mut().zip(&starts) {
            if passes::is_python(file) {
                passes::strip_comments(file, starts);
                passes::strip_docstrings(file, starts);
            }
        }
        passes::strip_unused_private(&mut set, &starts, &bases);
        for (file, original) in set.files.iter_mut().zip(&before.files) {
            file.settle(original);
        }

        let next = set.render();
        if next == rendered {
            break;
        }
        // Re-parse so the next round sees exactly what the output says.
        set = PatchSet::parse(&next)?;
        rendered = next;
    }

    Ok(rendered.trim().to_string())
}

fn no_base(_: &str) -> Option<String> {
    None
}

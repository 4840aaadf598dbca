//! Normalization properties over realistic multi-file patches.

use patchgrade_core::normalize::{normalize, normalize_with, try_normalize};
use proptest::prelude::*;

const MULTI_FILE: &str = "diff --git a/pkg/calc.py b/pkg/calc.py
index 3b18e51..b2c4a9f 100644
--- a/pkg/calc.py
+++ b/pkg/calc.py
@@ -1,4 +1,8 @@
 import math
+# helpers for the new API
+_SCALE = 2

 def area(r):
-    return r * r
+    \"\"\"Area of a circle.\"\"\"
+    result = math.pi * r * r  # exact
+    return result
@@ -20,3 +24,4 @@ def volume(r):
     return 0

 def unchanged():
+    return None
diff --git a/docs/notes.md b/docs/notes.md
--- a/docs/notes.md
+++ b/docs/notes.md
@@ -1 +1,2 @@
 # Notes
+# more notes
";

/// `pkg/calc.py` as it stood before `MULTI_FILE`.
fn calc_base(path: &str) -> Option<String> {
    let text = format!(
        "import math\n\ndef area(r):\n    return r * r\n{}def volume(r):\n    return 0\n\ndef unchanged():\n",
        "\n".repeat(14)
    );
    (path == "pkg/calc.py").then_some(text)
}

#[test]
fn normalization_is_idempotent() {
    let once = normalize(MULTI_FILE);
    assert_ne!(once, MULTI_FILE.trim());
    assert_eq!(normalize(&once), once);
}

#[test]
fn only_added_python_lines_change() {
    let out = normalize(MULTI_FILE);
    assert!(!out.contains("helpers for the new API"));
    assert!(!out.contains("Area of a circle"));
    // Without the unpatched file, `_SCALE` might rebind a name used there.
    assert!(out.contains("+_SCALE = 2"));
    assert!(!out.contains("# exact"));
    assert!(out.contains("+    result = math.pi * r * r"));
    assert!(out.contains("-    return r * r"));
    assert!(out.contains(" import math"));
    // Markdown headings are not comments.
    assert!(out.contains("+# more notes"));
}

#[test]
fn later_hunks_shift_with_earlier_removals() {
    let out = normalize(MULTI_FILE);
    // Two added lines went away in the first hunk.
    assert!(out.contains("@@ -1,4 +1,6 @@"), "{out}");
    assert!(out.contains("@@ -20,3 +22,4 @@ def volume(r):"), "{out}");
}

#[test]
fn unpatched_files_allow_removing_new_private_names() {
    let out = normalize_with(MULTI_FILE, &calc_base);
    assert!(!out.contains("_SCALE"));
    assert!(out.contains("@@ -1,4 +1,5 @@"), "{out}");
    assert!(out.contains("@@ -20,3 +21,4 @@ def volume(r):"), "{out}");
    assert_eq!(normalize_with(&out, &calc_base), out);
}

#[test]
fn removed_lines_are_never_touched() {
    let raw = "diff --git a/a.py b/a.py
--- a/a.py
+++ b/a.py
@@ -1,3 +1 @@
-# old comment
-\"\"\"old docstring\"\"\"
 x = 1
";
    assert_eq!(normalize(raw), raw.trim());
}

#[test]
fn bare_unified_diff_is_accepted() {
    let raw = "--- a/b.py
+++ b/b.py
@@ -1 +1,2 @@
 y = 2
+z = 3  # three
";
    let out = try_normalize(raw).unwrap();
    assert!(out.ends_with("+z = 3"), "{out}");
}

#[test]
fn garbage_passes_through() {
    let raw = "@@ not a hunk\n+whatever\n";
    assert_eq!(normalize(raw), raw);
}

const FRAGMENTS: &[&str] = &[
    "x = 1",
    "y = x + 2  # add",
    "# note",
    "    # indented note",
    "",
    "def _helper(a):",
    "def public(a):",
    "    \"\"\"Doc.\"\"\"",
    "    \"\"\"Start",
    "    end.\"\"\"",
    "    return a  # same",
    "    return _helper(a)",
    "class _Marker:",
    "    pass",
    "_LIMIT = 3",
    "s = \"\"\"",
    "# inside?",
    "\"\"\"",
    "t = '#'  # hash",
    "@decorate",
    "call(",
    "    1,  # one",
    ")",
    "import os  # noqa",
];

fn python_lines() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(FRAGMENTS), 1..16)
}

fn new_file(lines: &[&str]) -> String {
    let mut raw = format!("diff --git a/gen.py b/gen.py\nnew file mode 100644\n--- /dev/null\n+++ b/gen.py\n@@ -0,0 +1,{} @@\n", lines.len());
    for line in lines {
        raw.push_str(&format!("+{line}\n"));
    }
    raw
}

fn top_of_file(context: &[&str], added: &[&str]) -> String {
    let mut raw = format!(
        "diff --git a/gen.py b/gen.py\n--- a/gen.py\n+++ b/gen.py\n@@ -1,{} +1,{} @@\n",
        context.len(),
        context.len() + added.len()
    );
    for line in context.iter().take(1) {
        raw.push_str(&format!(" {line}\n"));
    }
    for line in added {
        raw.push_str(&format!("+{line}\n"));
    }
    for line in context.iter().skip(1) {
        raw.push_str(&format!(" {line}\n"));
    }
    raw
}

proptest! {
    #[test]
    fn new_files_normalize_to_a_fixed_point(lines in python_lines()) {
        let raw = new_file(&lines);
        let once = try_normalize(&raw).unwrap();
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(try_normalize(&once).is_ok());
    }

    #[test]
    fn edits_at_the_top_normalize_to_a_fixed_point(
        context in python_lines(),
        added in python_lines(),
    ) {
        let raw = top_of_file(&context, &added);
        let once = try_normalize(&raw).unwrap();
        prop_assert_eq!(normalize(&once), once.clone());
    }
}

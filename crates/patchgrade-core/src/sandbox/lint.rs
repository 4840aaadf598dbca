//! Lint findings and regression detection against the unpatched baseline.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn finding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^:\s][^:]*):(\d+):(?:(\d+):)?\s*([A-Za-z]+\d+)[:\s]\s*(.*)$")
            .expect("valid finding regex")
    })
}

/// One `path:line[:col]: CODE message` line from a linter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFinding {
    pub path: String,
    pub line: u32,
    pub code: String,
    pub message: String,
}

impl LintFinding {
    /// Identity used for baseline comparison. Line numbers shift whenever a
    /// patch adds or removes lines above a finding, so they are left out.
    fn key(&self) -> (String, String, String) {
        (self.path.clone(), self.code.clone(), self.message.clone())
    }

    pub fn describe(&self) -> String {
        format!("{}:{}: {} {}", self.path, self.line, self.code, self.message)
    }
}

/// Parse every recognisable finding from linter output; other lines are ignored.
pub fn parse_findings(output: &str) -> Vec<LintFinding> {
    output
        .lines()
        .filter_map(|line| {
            let caps = finding_re().captures(line.trim_end())?;
            let path = caps[1].trim();
            Some(LintFinding {
                path: path.strip_prefix("./").unwrap_or(path).to_string(),
                line: caps[2].parse().ok()?,
                code: caps[4].to_string(),
                message: caps[5].trim().to_string(),
            })
        })
        .collect()
}

/// Findings of the unpatched reference, as a multiset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintBaseline {
    counts: BTreeMap<(String, String, String), usize>,
}

impl LintBaseline {
    pub fn from_findings(findings: &[LintFinding]) -> Self {
        let mut counts = BTreeMap::new();
        for finding in findings {
            *counts.entry(finding.key()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn len(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Findings beyond what the baseline already had, in output order.
    pub fn regressions(&self, findings: &[LintFinding]) -> Vec<LintFinding> {
        let mut remaining = self.counts.clone();
        findings
            .iter()
            .filter(|finding| match remaining.get_mut(&finding.key()) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    false
                }
                _ => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYLINT: &str = "\
************* Module calc
calc.py:1:0: C0114: Missing module docstring (missing-module-docstring)
calc.py:4:4: W0612: Unused variable 'tmp' (unused-variable)

------------------------------------------------------------------
Your code has been rated at 8.00/10
";

    #[test]
    fn parses_pylint_output() {
        let findings = parse_findings(PYLINT);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].path, "calc.py");
        assert_eq!(findings[0].code, "C0114");
        assert_eq!(findings[1].line, 4);
        assert_eq!(findings[1].message, "Unused variable 'tmp' (unused-variable)");
    }

    #[test]
    fn parses_flake8_output() {
        let findings = parse_findings("./pkg/mod.py:10:80: E501 line too long (88 > 79 characters)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, "pkg/mod.py");
        assert_eq!(findings[0].code, "E501");
    }

    #[test]
    fn moved_findings_are_not_regressions() {
        let baseline = LintBaseline::from_findings(&parse_findings(PYLINT));
        let shifted = PYLINT.replace("calc.py:4:4", "calc.py:9:4");
        assert!(baseline.regressions(&parse_findings(&shifted)).is_empty());
    }

    #[test]
    fn repeated_finding_counts_as_new() {
        let baseline = LintBaseline::from_findings(&parse_findings(PYLINT));
        let doubled = format!("{PYLINT}calc.py:7:4: W0612: Unused variable 'tmp' (unused-variable)\n");
        let new = baseline.regressions(&parse_findings(&doubled));
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].line, 7);
        assert_eq!(baseline.len(), 2);
    }
}

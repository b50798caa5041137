//! Structured test-output parsing.
//!
//! `devforge_core::regression::RegressionGate` only needs a pass/fail
//! boolean per gate step (`looks_like_test_failure`), grounded in the
//! teacher's fail-fast `Verifier`. This module answers a different
//! question — *which* tests failed and why, so a `WorkerExecutor` can put
//! a useful failure excerpt in front of the model on the next `write_code`
//! iteration — and is grounded the same way the teacher's
//! `feedback::error_parser::RustcErrorParser` answers it for `rustc`
//! diagnostics: compiled regexes per category, a parser that extracts
//! structured records, and a summary formatter for the fix prompt.

use devforge_core::config::TestFramework;
use regex::Regex;
use std::sync::LazyLock;

static VITEST_FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:×|✗|FAIL)\s+(.+?)(?:\s+\d+ms)?\s*$").unwrap());
static JEST_FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*✕\s+(.+?)(?:\s+\(\d+\s*ms\))?\s*$").unwrap());
static MOCHA_FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\)\s+(.+?)\s*:?\s*$").unwrap());
static PYTEST_FAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^FAILED\s+(\S+)(?:\s+-\s+(.+))?\s*$").unwrap());
static SUITE_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+(?:tests?\s+)?passed.*?(\d+)\s+(?:tests?\s+)?failed|(\d+)\s+failed.*?(\d+)\s+passed").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailingTest {
    pub name: String,
    pub file: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TestRunSummary {
    pub passed: u32,
    pub failed: u32,
    pub failing_tests: Vec<FailingTest>,
}

impl TestRunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.failing_tests.is_empty()
    }
}

pub struct TestOutputParser;

impl TestOutputParser {
    /// Extracts failing-test names (and, for pytest, the short reason) from
    /// combined stdout/stderr. `TestFramework::Auto` tries every pattern and
    /// keeps whichever produced matches, since the caller hasn't told us
    /// which runner is in play.
    pub fn parse(framework: TestFramework, stdout: &str, stderr: &str) -> TestRunSummary {
        let combined = format!("{stdout}\n{stderr}");
        let failing_tests = match framework {
            TestFramework::Vitest => Self::collect(&VITEST_FAIL_LINE, &combined),
            TestFramework::Jest => Self::collect(&JEST_FAIL_LINE, &combined),
            TestFramework::Mocha => Self::collect(&MOCHA_FAIL_LINE, &combined),
            TestFramework::Pytest => Self::collect_pytest(&combined),
            TestFramework::Auto => {
                let mut found = Self::collect(&VITEST_FAIL_LINE, &combined);
                if found.is_empty() {
                    found = Self::collect(&JEST_FAIL_LINE, &combined);
                }
                if found.is_empty() {
                    found = Self::collect_pytest(&combined);
                }
                if found.is_empty() {
                    found = Self::collect(&MOCHA_FAIL_LINE, &combined);
                }
                found
            }
        };

        let (passed, failed) = Self::suite_counts(&combined).unwrap_or((0, failing_tests.len() as u32));
        TestRunSummary {
            passed,
            failed,
            failing_tests,
        }
    }

    fn collect(pattern: &Regex, text: &str) -> Vec<FailingTest> {
        pattern
            .captures_iter(text)
            .map(|c| FailingTest {
                name: c.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                file: None,
                detail: None,
            })
            .collect()
    }

    fn collect_pytest(text: &str) -> Vec<FailingTest> {
        PYTEST_FAIL_LINE
            .captures_iter(text)
            .map(|c| FailingTest {
                name: c.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                file: c.get(1).map(|m| m.as_str().to_string()),
                detail: c.get(2).map(|m| m.as_str().trim().to_string()),
            })
            .collect()
    }

    fn suite_counts(text: &str) -> Option<(u32, u32)> {
        let caps = SUITE_SUMMARY.captures(text)?;
        if let (Some(p), Some(f)) = (caps.get(1), caps.get(2)) {
            return Some((p.as_str().parse().ok()?, f.as_str().parse().ok()?));
        }
        if let (Some(f), Some(p)) = (caps.get(3), caps.get(4)) {
            return Some((p.as_str().parse().ok()?, f.as_str().parse().ok()?));
        }
        None
    }

    /// Renders a summary into the excerpt handed to the model alongside the
    /// raw stderr tail, so the fix prompt leads with "these N tests failed"
    /// rather than a wall of runner output.
    pub fn format_for_fix_prompt(summary: &TestRunSummary) -> String {
        if summary.failing_tests.is_empty() {
            return format!("{} passed, {} failed (no individual failures parsed)", summary.passed, summary.failed);
        }
        let mut out = format!("{} passed, {} failed:\n", summary.passed, summary.failed);
        for test in &summary.failing_tests {
            out.push_str(&format!("- {}", test.name));
            if let Some(detail) = &test.detail {
                out.push_str(&format!(": {detail}"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vitest_failing_test_names() {
        let stdout = "✗ echo > returns the input string  3ms\n  1 passed | 1 failed";
        let summary = TestOutputParser::parse(TestFramework::Vitest, stdout, "");
        assert_eq!(summary.failing_tests.len(), 1);
        assert_eq!(summary.failing_tests[0].name, "echo > returns the input string");
    }

    #[test]
    fn parses_pytest_failures_with_reason() {
        let stdout = "FAILED tests/test_echo.py::test_returns_input - AssertionError: assert 'hi' == 'HI'";
        let summary = TestOutputParser::parse(TestFramework::Pytest, stdout, "");
        assert_eq!(summary.failing_tests.len(), 1);
        assert!(summary.failing_tests[0].detail.as_deref().unwrap().contains("AssertionError"));
    }

    #[test]
    fn auto_mode_falls_back_across_frameworks() {
        let stdout = "1) addition should sum two numbers:";
        let summary = TestOutputParser::parse(TestFramework::Auto, stdout, "");
        assert_eq!(summary.failing_tests.len(), 1);
    }

    #[test]
    fn clean_run_reports_no_failures() {
        let summary = TestRunSummary::default();
        assert!(summary.is_clean());
    }

    #[test]
    fn suite_counts_parsed_regardless_of_passed_failed_order() {
        let a = TestOutputParser::parse(TestFramework::Vitest, "3 passed, 1 failed", "");
        let b = TestOutputParser::parse(TestFramework::Vitest, "1 failed, 3 passed", "");
        assert_eq!((a.passed, a.failed), (3, 1));
        assert_eq!((b.passed, b.failed), (3, 1));
    }
}

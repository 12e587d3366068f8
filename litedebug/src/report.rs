//! Run report
//!
//! Every test the runner starts (or skips) lands here with its outcome. The
//! report renders as a console summary, JSON, or JUnit XML for CI.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    /// Filtered out by the test pattern
    Skip,
}

/// One test in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultEntry {
    /// Full test name, `"<scenario> (<client>)"`
    pub name: String,
    pub client: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Aggregated results of a suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub results: Vec<TestResultEntry>,
}

impl TestReport {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            started_at: Utc::now(),
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            duration: Duration::ZERO,
            results: Vec::new(),
        }
    }

    pub fn record_pass(&mut self, name: &str, client: &str, duration: Duration) {
        self.record(name, client, TestStatus::Pass, duration, None);
    }

    pub fn record_failure(&mut self, name: &str, client: &str, duration: Duration, error: String) {
        self.record(name, client, TestStatus::Fail, duration, Some(error));
    }

    pub fn record_skip(&mut self, name: &str, client: &str) {
        self.record(name, client, TestStatus::Skip, Duration::ZERO, None);
    }

    fn record(
        &mut self,
        name: &str,
        client: &str,
        status: TestStatus,
        duration: Duration,
        error: Option<String>,
    ) {
        self.total += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
        }

        self.results.push(TestResultEntry {
            name: name.to_string(),
            client: client.to_string(),
            status,
            duration_ms: duration.as_millis() as u64,
            error,
        });
    }

    /// Close the report with the wall time of the whole run
    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
    }

    /// No test failed; skipped tests do not count against the run
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }

    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{}\">\n",
            escape_xml(&self.suite),
            self.total,
            self.failed,
            self.skipped,
            self.duration.as_secs_f64(),
            self.started_at.format("%Y-%m-%dT%H:%M:%S"),
        ));

        for result in &self.results {
            xml.push_str(&format!(
                "  <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\"",
                escape_xml(&result.client),
                escape_xml(&result.name),
                result.duration_ms as f64 / 1000.0
            ));

            match result.status {
                TestStatus::Pass => xml.push_str(" />\n"),
                TestStatus::Fail => {
                    xml.push_str(">\n");
                    let message = result.error.as_deref().unwrap_or("test failed");
                    xml.push_str(&format!(
                        "    <failure message=\"{}\" />\n",
                        escape_xml(message)
                    ));
                    xml.push_str("  </testcase>\n");
                }
                TestStatus::Skip => {
                    xml.push_str(">\n    <skipped />\n  </testcase>\n");
                }
            }
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    /// Write the report to `path`; `.xml` selects JUnit, anything else JSON
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let contents = if is_xml {
            self.to_junit_xml()
        } else {
            self.to_json()?
        };
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write report to {}", path.display()))
    }

    pub fn print_summary(&self) {
        println!("\n=== {} ===\n", self.suite);
        println!(
            "Total: {} | Passed: {} | Failed: {} | Skipped: {}",
            self.total, self.passed, self.failed, self.skipped
        );
        println!("Duration: {:.2}s\n", self.duration.as_secs_f64());

        if self.failed > 0 {
            println!("Failed tests:");
            for result in self
                .results
                .iter()
                .filter(|r| r.status == TestStatus::Fail)
            {
                println!("  - {}", result.name);
                if let Some(error) = &result.error {
                    println!("    Error: {}", error);
                }
            }
            println!();
        }

        println!(
            "Result: {}",
            if self.all_passed() { "PASS" } else { "FAIL" }
        );
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

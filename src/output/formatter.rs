//! Output formatters for test results
//!
//! Provides JSON, Table, and summary output formats.

use std::io::Write;

use crate::models::{RunReport, RunSummary, TestResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> String {
        if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }

    fn status_label(&self, status: TestStatus) -> &'static str {
        match (status, self.colorize) {
            (TestStatus::Pass, true) => "\x1b[32m✓ PASS \x1b[0m",
            (TestStatus::Fail, true) => "\x1b[31m✗ FAIL \x1b[0m",
            (TestStatus::Error, true) => "\x1b[31m! ERROR\x1b[0m",
            (TestStatus::Pass, false) => "✓ PASS ",
            (TestStatus::Fail, false) => "✗ FAIL ",
            (TestStatus::Error, false) => "! ERROR",
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let mut line = format!(
            "{:36} {} [{:>7}ms]",
            result.display_name(),
            self.status_label(result.status),
            result.duration_ms
        );
        if let Some(message) = &result.message {
            line.push_str(&format!("\n      {message}"));
        }
        line
    }

    /// Format a run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(summary),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n════════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(" Suite: {}\n", summary.suite));
        output.push_str("════════════════════════════════════════════════════════════════\n");

        for result in &summary.results {
            output.push_str(&format!(" {}\n", self.format_result_table(result)));
        }

        output.push_str("────────────────────────────────────────────────────────────────\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            " Total: {} | Pass: {} | Fail: {} | Error: {}\n",
            summary.total, pass_str, fail_str, summary.errors
        ));
        output.push_str(&format!(
            " Pass Rate: {:5.1}% | Wall time: {}ms\n",
            summary.pass_rate(),
            summary.wall_time_ms
        ));

        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}: {}/{} passed ({:.1}%), {} failed, {} errors in {}ms",
            summary.suite,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.errors,
            summary.wall_time_ms
        )
    }

    /// Format the outcome of a whole run
    pub fn format_report(&self, report: &RunReport) -> String {
        match (report, self.format) {
            (_, OutputFormat::Json | OutputFormat::JsonPretty) => self.to_json(report),
            (RunReport::Completed(summary), _) => self.format_summary(summary),
            (RunReport::BootstrapFailed { suite, error }, _) => {
                let label = if self.colorize {
                    "\x1b[31mBOOTSTRAP FAILED\x1b[0m"
                } else {
                    "BOOTSTRAP FAILED"
                };
                format!("{suite}: {label}, no tests ran\n  {error}")
            }
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run report to a file, without colors
pub fn write_report_to_file(
    path: &str,
    report: &RunReport,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_report(report);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

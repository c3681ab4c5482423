// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report emission: a colored stdout summary plus an optional JUnit XML
//! file, grounded on `testrunner::reporter::TestReporter`'s use of
//! `termcolor` and `quick_junit` (here against the real, published crate
//! rather than the teacher's internal path dependency).

use crate::classpath::ClassFileIndex;
use crate::ledger::LedgerSnapshot;
use crate::outcome::{Outcome, OutcomeResult};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use termcolor::{BufferWriter, Color as TermColor, ColorChoice, ColorSpec, WriteColor};

/// External collaborator contract (`spec.md` §6: "XmlReportPrinter:
/// generateReports(outcomes) -> int numFiles; may be absent"). The core
/// only ever reaches this boundary through [`ReportEmitter`]; the XML
/// half below is the one concrete implementation this crate ships.
pub trait ReportPrinter: Send + Sync {
    /// Returns the number of report files written.
    fn generate_reports(&self, outcomes: &[Outcome]) -> Result<usize>;
}

/// Writes one JUnit XML file per `emit` call, in the manner of
/// `testrunner::reporter::JUnitReporter`.
pub struct JunitReportPrinter {
    path: Utf8PathBuf,
    suite_name: String,
}

impl JunitReportPrinter {
    pub fn new(path: Utf8PathBuf, suite_name: impl Into<String>) -> Self {
        Self {
            path,
            suite_name: suite_name.into(),
        }
    }
}

impl ReportPrinter for JunitReportPrinter {
    fn generate_reports(&self, outcomes: &[Outcome]) -> Result<usize> {
        let mut testsuite = TestSuite::new(self.suite_name.clone());
        for outcome in outcomes {
            testsuite.add_test_case(outcome_to_testcase(outcome));
        }
        let mut report = Report::new(self.suite_name.clone());
        report.add_test_suite(testsuite);

        let file = File::create(&self.path)
            .with_context(|| format!("failed to open junit file '{}' for writing", self.path))?;
        report
            .serialize(file)
            .with_context(|| format!("failed to serialize junit report to {}", self.path))?;
        Ok(1)
    }
}

/// Coloring mode for the stdout reporter, in the manner of
/// `testrunner::reporter::Color`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Color {
    Always,
    #[default]
    Auto,
    Never,
}

impl Color {
    fn color_choice(self, stream: atty::Stream) -> ColorChoice {
        match self {
            Color::Always => ColorChoice::Always,
            Color::Auto => {
                if atty::is(stream) {
                    ColorChoice::Auto
                } else {
                    ColorChoice::Never
                }
            }
            Color::Never => ColorChoice::Never,
        }
    }
}

/// Prints the final ledger snapshot to stdout, then optionally writes a
/// JUnit report to `junit_path`.
pub struct ReportEmitter {
    stdout: BufferWriter,
    junit_path: Option<Utf8PathBuf>,
    suite_name: String,
    class_file_index: Option<Arc<dyn ClassFileIndex>>,
    existing_classpath: BTreeSet<Utf8PathBuf>,
}

impl ReportEmitter {
    pub fn new(color: Color, junit_path: Option<Utf8PathBuf>, suite_name: impl Into<String>) -> Self {
        Self {
            stdout: BufferWriter::stdout(color.color_choice(atty::Stream::Stdout)),
            junit_path,
            suite_name: suite_name.into(),
            class_file_index: None,
            existing_classpath: BTreeSet::new(),
        }
    }

    /// Attaches a classpath-suggestion index (`spec.md` §4.1 step 12,
    /// §6's `ClassFileIndex`). `existing_classpath` is subtracted from
    /// any suggestion so the summary never recommends an entry that's
    /// already on the classpath.
    pub fn with_class_file_index(
        mut self,
        index: Arc<dyn ClassFileIndex>,
        existing_classpath: impl IntoIterator<Item = Utf8PathBuf>,
    ) -> Self {
        self.class_file_index = Some(index);
        self.existing_classpath = existing_classpath.into_iter().collect();
        self
    }

    pub fn emit(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.print_summary(snapshot)?;
        if let Some(path) = &self.junit_path {
            let printer = JunitReportPrinter::new(path.clone(), self.suite_name.clone());
            printer.generate_reports(&snapshot.outcomes)?;
        }
        Ok(())
    }

    fn print_summary(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let mut buffer = self.stdout.buffer();

        let summary_spec = if snapshot.failures > 0 {
            Self::fail_spec()
        } else {
            Self::pass_spec()
        };
        buffer.set_color(&summary_spec)?;
        write!(buffer, "{:>12} ", "Summary")?;
        buffer.reset()?;

        let count_spec = Self::count_spec();
        buffer.set_color(&count_spec)?;
        write!(buffer, "{}", snapshot.total())?;
        buffer.reset()?;
        write!(buffer, " actions run: ")?;

        buffer.set_color(&count_spec)?;
        write!(buffer, "{}", snapshot.successes)?;
        buffer.set_color(&Self::pass_spec())?;
        write!(buffer, " succeeded")?;
        buffer.reset()?;
        write!(buffer, ", ")?;

        buffer.set_color(&count_spec)?;
        write!(buffer, "{}", snapshot.failures)?;
        buffer.set_color(&Self::fail_spec())?;
        write!(buffer, " failed")?;
        buffer.reset()?;
        write!(buffer, ", ")?;

        buffer.set_color(&count_spec)?;
        write!(buffer, "{}", snapshot.skipped)?;
        buffer.set_color(&Self::skip_spec())?;
        write!(buffer, " skipped")?;
        buffer.reset()?;
        writeln!(buffer)?;

        for name in &snapshot.failure_names {
            buffer.set_color(&Self::fail_spec())?;
            write!(buffer, "{:>12} ", "FAILED")?;
            buffer.reset()?;
            writeln!(buffer, "{name}")?;
        }

        for name in &snapshot.skipped_names {
            buffer.set_color(&Self::skip_spec())?;
            write!(buffer, "{:>12} ", "SKIPPED")?;
            buffer.reset()?;
            writeln!(buffer, "{name}")?;
        }

        if let Some(index) = &self.class_file_index {
            for suggestion in self.classpath_suggestions(index, snapshot) {
                buffer.set_color(&Self::skip_spec())?;
                write!(buffer, "{:>12} ", "SUGGEST")?;
                buffer.reset()?;
                writeln!(buffer, "try adding {suggestion} to the classpath")?;
            }
        }

        self.stdout.print(&buffer).context("error writing summary to stdout")
    }

    /// Suggestions for `COMPILE_FAILED`/`EXEC_FAILED` outcomes only
    /// (`spec.md` §7: "optional classpath suggestions for
    /// COMPILE_FAILED / EXEC_FAILED outcomes"), minus anything already
    /// on the classpath.
    fn classpath_suggestions(&self, index: &Arc<dyn ClassFileIndex>, snapshot: &LedgerSnapshot) -> BTreeSet<Utf8PathBuf> {
        snapshot
            .outcomes
            .iter()
            .filter(|o| matches!(o.result, OutcomeResult::CompileFailed | OutcomeResult::ExecFailed))
            .flat_map(|o| index.suggest_classpaths(&o.output_lines))
            .filter(|path| !self.existing_classpath.contains(path))
            .collect()
    }

    fn count_spec() -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_bold(true);
        spec
    }

    fn pass_spec() -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(TermColor::Green)).set_bold(true);
        spec
    }

    fn fail_spec() -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(TermColor::Red)).set_bold(true);
        spec
    }

    fn skip_spec() -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(TermColor::Yellow)).set_bold(true);
        spec
    }
}

fn outcome_to_testcase(outcome: &Outcome) -> TestCase {
    let status = match outcome.result {
        OutcomeResult::Success => TestCaseStatus::success(),
        OutcomeResult::Unsupported => TestCaseStatus::skipped(),
        OutcomeResult::ExecFailed | OutcomeResult::CompileFailed => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            status.set_type(outcome.result.to_string());
            status
        }
        OutcomeResult::ExecTimeout | OutcomeResult::Error => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
            status.set_type(outcome.result.to_string());
            status
        }
    };

    let mut testcase = TestCase::new(outcome.name.clone(), status);
    if !outcome.output_lines.is_empty() {
        testcase.set_system_out_lossy(outcome.output_lines.join("\n"));
    }
    testcase
}

use crate::archiver::{compress, Archiver, CompressionPlan, CompressionRequest};
use crate::config::BackupTask;
use crate::naming::archive_base_name;
use crate::report::ReportLog;
use crate::signal::InterruptContext;
use crate::Result;
use chrono::Local;
use std::collections::VecDeque;
use std::io::Write;

/// Run-wide parameters shared by every task
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub password: String,
    pub target_folder: String,
    /// Names of the tasks to run; `None` runs every task
    pub task_filter: Option<Vec<String>>,
    pub compression_level: u8,
}

impl RunOptions {
    pub fn should_run(&self, task_name: &str) -> bool {
        match &self.task_filter {
            Some(names) => names.iter().any(|name| name == task_name),
            None => true,
        }
    }
}

/// Parse a comma-separated allow-list. An empty list means no filtering.
pub fn parse_task_filter(value: &str) -> Option<Vec<String>> {
    let names: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    /// Most recent failure first
    pub failures: VecDeque<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.executed - self.failures.len()
    }
}

/// Runs backup tasks one after the other and reports to a console writer
pub struct TaskRunner<'a, W: Write> {
    options: &'a RunOptions,
    archiver: &'a dyn Archiver,
    report: Option<ReportLog>,
    interrupts: InterruptContext,
    out: W,
}

impl<'a, W: Write> TaskRunner<'a, W> {
    pub fn new(options: &'a RunOptions, archiver: &'a dyn Archiver, out: W) -> Self {
        Self {
            options,
            archiver,
            report: None,
            interrupts: InterruptContext::new(),
            out,
        }
    }

    /// Persist outcomes to a rotating report log
    pub fn with_report(mut self, report: ReportLog) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_interrupts(mut self, interrupts: InterruptContext) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run every task in order and print the final report
    pub fn run(&mut self, tasks: &[BackupTask]) -> Result<RunSummary> {
        if let Some(report) = &self.report {
            writeln!(
                self.out,
                "Report rotation: move {} to {}",
                report.current_path().display(),
                report.previous_path().display()
            )?;
            report.rotate()?;
        }

        let mut summary = RunSummary {
            total: tasks.len(),
            ..RunSummary::default()
        };

        for (index, task) in tasks.iter().enumerate() {
            writeln!(
                self.out,
                "\n----------[ executing step {}/{}, backup of {} ]----------",
                index + 1,
                tasks.len(),
                task.name
            )?;

            if !self.options.should_run(&task.name) {
                writeln!(self.out, "✔ Skipped by backup tasks filter (--task-names)")?;
                self.append_report(&format!("{}: skipped by backup tasks filter", task.name))?;
                summary.skipped += 1;
                continue;
            }

            summary.executed += 1;
            if let Some(failure) = self.run_task(task)? {
                summary.failures.push_front(failure);
            }
        }

        self.finalize(&summary)?;
        Ok(summary)
    }

    /// Returns the failure entry when the archiver did not report success
    fn run_task(&mut self, task: &BackupTask) -> Result<Option<String>> {
        let base_name = archive_base_name(&task.source);
        let request = CompressionRequest {
            source: &task.source,
            excludes: &task.excludes,
            target_root: &self.options.target_folder,
            base_name: &base_name,
            password: &self.options.password,
            protect_with_password: task.protects_with_password(),
            compression_level: self.options.compression_level,
            dry_run: self.options.dry_run,
        };

        let plan = CompressionPlan::new(&request, &Local::now().naive_local());
        writeln!(self.out, "Will run {}", plan.command_line(self.archiver.program()))?;
        self.out.flush()?;

        let outcome = compress(&plan, self.archiver, &self.interrupts)?;
        tracing::debug!("{} output:\n{}", task.name, outcome.raw_output);

        self.append_report(&format!("{}:\n{}", task.name, outcome.raw_output))?;

        if outcome.succeeded {
            writeln!(self.out, "✅ Compression completed with success")?;
            Ok(None)
        } else {
            writeln!(self.out, "❌ Compression failed")?;
            Ok(Some(format!(
                "❌ {}:\nBad compression output: {}",
                task.name, outcome.raw_output
            )))
        }
    }

    fn finalize(&mut self, summary: &RunSummary) -> Result<()> {
        if summary.is_success() {
            writeln!(self.out, "\n😎 Everything is OK! 😎")?;
            self.append_report("Everything is OK!")?;
            return Ok(());
        }

        let failed = format!("{} task(s) failed", summary.failures.len());
        writeln!(self.out, "\n----------[ ❌ error report ❌ ]----------")?;
        self.append_report(&failed)?;
        for failure in &summary.failures {
            self.append_report(failure)?;
            writeln!(self.out, "{failure}")?;
        }
        writeln!(self.out, "\n{failed}")?;
        Ok(())
    }

    fn append_report(&self, text: &str) -> Result<()> {
        match &self.report {
            Some(report) => report.append(text),
            None => Ok(()),
        }
    }
}

use crate::error::BackupError;
use crate::utils::normalize_folder;
use crate::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "simple_backup-report.txt";
pub const PREVIOUS_REPORT_FILE_NAME: &str = "simple_backup-report_prev.txt";

const SEPARATOR: &str = "--------------------------------------------------------------------------------";

/// Plain-text report log with one backup generation
#[derive(Debug, Clone)]
pub struct ReportLog {
    folder: PathBuf,
    dry_run: bool,
}

impl ReportLog {
    pub fn new(logs_folder: &str, dry_run: bool) -> Self {
        Self {
            folder: PathBuf::from(normalize_folder(logs_folder)),
            dry_run,
        }
    }

    pub fn current_path(&self) -> PathBuf {
        self.folder.join(REPORT_FILE_NAME)
    }

    pub fn previous_path(&self) -> PathBuf {
        self.folder.join(PREVIOUS_REPORT_FILE_NAME)
    }

    /// Move the current report to the previous slot, discarding the old previous one.
    /// Missing files are expected on the first runs; any other failure is an error.
    pub fn rotate(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let current = self.current_path();
        let previous = self.previous_path();

        ignore_missing(fs::remove_file(&previous), &previous)?;
        if ignore_missing(fs::rename(&current, &previous), &current)? {
            tracing::debug!("Rotated {}", current.display());
        } else {
            tracing::debug!("No report to rotate at {}", current.display());
        }
        Ok(())
    }

    /// Append a timestamped block to the current report
    pub fn append(&self, text: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let path = self.current_path();
        let report_error = |source: io::Error| BackupError::Report {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(report_error)?;

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(file, "\n{SEPARATOR}\n[{stamp}]\n{text}").map_err(report_error)?;
        file.sync_all().map_err(report_error)?;
        Ok(())
    }
}

/// `Ok(true)` when the operation ran, `Ok(false)` when the file was not there
fn ignore_missing(result: io::Result<()>, path: &Path) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(BackupError::Report {
            path: path.to_path_buf(),
            source,
        }),
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Cannot create target folder {path}: {source}")]
    TargetFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write report file {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot launch archiver {program}: {source}")]
    ArchiverLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation interrupted by user")]
    Interrupted,

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl BackupError {
    /// Create a configuration error with a custom message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Check if this error only affects a single task (the run can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackupError::ArchiverLaunch { .. })
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BackupError::Interrupted => 130,
            BackupError::Validation { .. } => 2,
            BackupError::Config { .. } => 2,
            _ => 1,
        }
    }

    /// Provide helpful suggestions for resolving the error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            BackupError::Config { .. } => vec![
                "Check that the task file exists and is readable".to_string(),
                "Validate the task file as a JSON array of task objects".to_string(),
                "Use --dump-config to see the effective settings".to_string(),
            ],
            BackupError::TargetFolder { .. } => vec![
                "Check that the target drive is mounted".to_string(),
                "Ensure the target folder is writable".to_string(),
            ],
            BackupError::Report { path, .. } => vec![
                format!("Ensure {} is writable", path.display()),
                "Choose a different logs folder with --logs-folder".to_string(),
            ],
            BackupError::ArchiverLaunch { program, .. } => vec![
                format!("Install 7-Zip and make sure '{program}' is on the PATH"),
                "Set 'archiver' in the settings file to the full path of 7z".to_string(),
            ],
            _ => vec![],
        }
    }
}

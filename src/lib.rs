pub mod archiver;
pub mod config;
pub mod error;
pub mod naming;
pub mod progress;
pub mod report;
pub mod runner;
pub mod signal;
pub mod sync_client;
pub mod utils;

pub use archiver::{
    compress, is_success_output, Archiver, CompressionOutcome, CompressionPlan,
    CompressionRequest, SevenZip,
};
pub use config::{
    default_settings, dump_config, get_settings_path, load_settings, load_settings_from,
    load_tasks, BackupTask, Settings, TaskList,
};
pub use error::BackupError;
pub use naming::{archive_base_name, archive_path, target_folder};
pub use report::ReportLog;
pub use runner::{parse_task_filter, RunOptions, RunSummary, TaskRunner};
pub use signal::InterruptContext;
pub use sync_client::SyncClient;

/// Main library result type
pub type Result<T> = std::result::Result<T, BackupError>;

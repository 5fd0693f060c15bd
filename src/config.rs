use crate::error::BackupError;
use crate::Result;
use configparser::ini::Ini;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SECTION: &str = "simple-backup";

/// One configured unit of backup work, as read from the task file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupTask {
    #[serde(rename = "task-name")]
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub protect_with_password: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub excludes: Vec<String>,
}

impl BackupTask {
    /// The task file stores this flag as a string; only the exact value "true" enables it.
    pub fn protects_with_password(&self) -> bool {
        self.protect_with_password.as_deref() == Some("true")
    }
}

/// Tasks in file order. The order is the execution order.
pub type TaskList = Vec<BackupTask>;

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Load the backup task list from a JSON file
pub fn load_tasks(path: &Path) -> Result<TaskList> {
    let content = fs::read_to_string(path).map_err(|e| {
        BackupError::config(format!(
            "Failed to read task file {}: {e}",
            path.display()
        ))
    })?;

    let tasks: TaskList = serde_json::from_str(&content).map_err(|e| {
        BackupError::config(format!(
            "Failed to parse task file {}: {e}",
            path.display()
        ))
    })?;

    tracing::debug!("Loaded {} task(s) from {}", tasks.len(), path.display());
    Ok(tasks)
}

/// Run-wide defaults read from the optional settings file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub archiver: String,
    pub compression_level: u8,
    pub target_folder: Option<String>,
    pub config_file: Option<PathBuf>,
    pub logs_folder: Option<String>,
    pub sync_client: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            archiver: default_archiver().to_string(),
            compression_level: 3,
            target_folder: None,
            config_file: None,
            logs_folder: None,
            sync_client: None,
        }
    }
}

fn default_archiver() -> &'static str {
    if cfg!(target_os = "windows") {
        "7z.exe"
    } else {
        "7z"
    }
}

/// Get default settings
pub fn default_settings() -> Settings {
    Settings::default()
}

/// Load settings from the platform settings file, falling back to defaults
pub fn load_settings() -> Result<Settings> {
    let settings_path = get_settings_path()?;
    load_settings_from(&settings_path)
}

/// Load settings from an explicit INI file. A missing file yields defaults.
pub fn load_settings_from(settings_path: &Path) -> Result<Settings> {
    if !settings_path.exists() {
        return Ok(default_settings());
    }

    let mut conf = Ini::new();
    conf.load(settings_path)
        .map_err(|e| BackupError::config(format!("Failed to parse settings file: {e}")))?;

    let mut settings = default_settings();

    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "archiver")) {
        settings.archiver = value;
    }
    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "target_folder")) {
        settings.target_folder = Some(value);
    }
    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "config_file")) {
        settings.config_file = Some(PathBuf::from(value));
    }
    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "logs_folder")) {
        settings.logs_folder = Some(value);
    }
    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "sync_client")) {
        settings.sync_client = Some(PathBuf::from(value));
    }

    if let Some(value) = non_empty(conf.get(SETTINGS_SECTION, "compression_level")) {
        settings.compression_level = parse_level(&value)?;
    }

    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 7-Zip accepts -mx0 through -mx9
fn parse_level(value: &str) -> Result<u8> {
    match value.trim().parse::<u8>() {
        Ok(level) if level <= 9 => Ok(level),
        _ => Err(BackupError::config(format!(
            "Invalid compression_level: {value} (expected 0-9)"
        ))),
    }
}

/// Get the settings file path for the current platform
pub fn get_settings_path() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Ok(PathBuf::from(appdata)
                .join("simple-backup")
                .join("config.ini"));
        }
    }

    if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_dir)
            .join("simple-backup")
            .join("config.ini"))
    } else if let Some(home) = std::env::var_os("HOME") {
        Ok(PathBuf::from(home)
            .join(".config")
            .join("simple-backup")
            .join("config.ini"))
    } else {
        Err(BackupError::config("Could not determine config directory"))
    }
}

/// Create a sample settings file
pub fn create_sample_settings() -> String {
    r#"[simple-backup]
# Archiver executable (7-Zip command line)
archiver = 7z

# 7-Zip compression level, 0 (store) to 9 (ultra)
compression_level = 3

# Root folder receiving the dated archive folders
target_folder = /mnt/backup

# JSON file listing the backup tasks
config_file = /home/user/.config/simple-backup/tasks.json

# Folder receiving the rotating report log
logs_folder = /home/user/.local/state/simple-backup

# Cloud-sync client stopped and restarted by --restart-sync-client
# sync_client = C:\Users\user\AppData\Local\Microsoft\OneDrive\OneDrive.exe
"#
    .to_string()
}

/// Display the effective settings in a user-friendly format
pub fn dump_config(settings: &Settings, settings_path: Option<&Path>) {
    println!("simple-backup Configuration");
    println!("===========================");
    println!();

    let found = settings_path.map(Path::exists).unwrap_or(false);
    match settings_path {
        Some(path) if found => println!("Settings file: {} (found)", path.display()),
        Some(path) => println!(
            "Settings file: {} (not found, using defaults)",
            path.display()
        ),
        None => println!("Settings file: (no config directory, using defaults)"),
    }
    println!();

    println!("Current Settings:");
    println!("----------------");
    println!("archiver          = {}", settings.archiver);
    println!("compression_level = {}", settings.compression_level);
    println!("target_folder     = {}", display_opt(settings.target_folder.as_deref()));
    println!(
        "config_file       = {}",
        display_opt(settings.config_file.as_deref().and_then(Path::to_str))
    );
    println!("logs_folder       = {}", display_opt(settings.logs_folder.as_deref()));
    println!(
        "sync_client       = {}",
        display_opt(settings.sync_client.as_deref().and_then(Path::to_str))
    );
    println!();

    println!("Example archive path with current settings:");
    println!("------------------------------------------");
    println!(
        "{}/YYYYMM/C_Users_me_Documents YYYYMMDD HHMMSS.7z",
        settings.target_folder.as_deref().unwrap_or("<target-folder>")
    );
    println!();

    if !found {
        println!("Sample settings file:");
        println!("--------------------");
        print!("{}", create_sample_settings());
    }
}

fn display_opt(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

use crate::utils::normalize_folder;
use chrono::NaiveDateTime;

/// Extension of the archives produced by 7-Zip in `-t7z` mode
pub const ARCHIVE_EXTENSION: &str = "7z";

/// Derive a filesystem-safe archive base name from a source path.
///
/// Both separator styles map to `_` and the drive colon is dropped, so
/// `C:\Users\x` and `C:/Users/x` give the same name.
pub fn archive_base_name(source: &str) -> String {
    source.replace(['\\', '/'], "_").replace(':', "")
}

/// Dated folder receiving this month's archives: `{root}/{YYYYMM}/`
pub fn target_folder(root: &str, now: &NaiveDateTime) -> String {
    let mut folder = normalize_folder(root);
    folder.push_str(&format_month(now));
    folder.push('/');
    folder
}

/// Full archive path: `{target_folder}{base_name} {YYYYMMDD HHMMSS}.7z`
pub fn archive_path(target_folder: &str, base_name: &str, now: &NaiveDateTime) -> String {
    let timestamp = format_timestamp(now);
    format!("{target_folder}{base_name} {timestamp}.{ARCHIVE_EXTENSION}")
}

/// Format a timestamp at second granularity
pub fn format_timestamp(now: &NaiveDateTime) -> String {
    now.format("%Y%m%d %H%M%S").to_string()
}

fn format_month(now: &NaiveDateTime) -> String {
    now.format("%Y%m").to_string()
}
